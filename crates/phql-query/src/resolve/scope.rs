//! Name resolution scope of one statement.

use crate::model::Model;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// A model visible in a statement under a PHQL alias.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    /// Name columns are qualified with in SQL (table alias or source)
    pub domain: String,
    pub model: Arc<dyn Model>,
    /// Whether the entry came from FROM (as opposed to a join)
    pub from: bool,
    /// Whether `*` expands to this entry
    pub selectable: bool,
}

/// Aliases, models and column aliases visible while resolving a statement.
///
/// A subquery resolves in a child scope that borrows its parent, so it can
/// reference the enclosing statement's aliases.
#[derive(Debug, Default)]
pub struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    entries: IndexMap<String, ScopeEntry>,
    column_aliases: HashSet<String>,
}

impl<'p> Scope<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A nested scope for a subquery.
    pub fn child(&self) -> Scope<'_> {
        Scope {
            parent: Some(self),
            entries: IndexMap::new(),
            column_aliases: HashSet::new(),
        }
    }

    /// Register a model under `alias`. Returns `false` if the alias is taken.
    pub fn add(&mut self, alias: impl Into<String>, entry: ScopeEntry) -> bool {
        let alias = alias.into();
        if self.entries.contains_key(&alias) {
            return false;
        }
        self.entries.insert(alias, entry);
        true
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// Look up an alias here, then in the enclosing scopes.
    pub fn lookup(&self, alias: &str) -> Option<&ScopeEntry> {
        match self.entries.get(alias) {
            Some(entry) => Some(entry),
            None => self.parent.and_then(|parent| parent.lookup(alias)),
        }
    }

    /// Entries of this scope only, in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ScopeEntry)> {
        self.entries.iter().map(|(alias, entry)| (alias.as_str(), entry))
    }

    pub fn parent(&self) -> Option<&'p Scope<'p>> {
        self.parent
    }

    /// PHQL alias under which `model` was registered in this scope.
    pub fn alias_of(&self, model: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.model.name().eq_ignore_ascii_case(model))
            .map(|(alias, _)| alias.as_str())
    }

    pub fn add_column_alias(&mut self, alias: impl Into<String>) {
        self.column_aliases.insert(alias.into());
    }

    pub fn has_column_alias(&self, alias: &str) -> bool {
        self.column_aliases.contains(alias)
    }
}
