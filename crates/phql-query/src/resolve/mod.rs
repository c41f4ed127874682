//! Resolution of parsed PHQL into the intermediate representation.
//!
//! The resolver binds every model, alias and column of a statement against
//! the models manager and its meta-data, derives join conditions from
//! relations, and records the bind types declared by typed placeholders.

mod expr;
mod join;
mod scope;
mod statement;

pub use scope::{Scope, ScopeEntry};

use crate::lang::{ModelName, Statement};
use crate::manager::Manager;
use crate::model::Model;
use phql_core::bind::{BindTypes, Binds};
use phql_core::error::{Error, QueryError};
use phql_core::ir::Intermediate;
use phql_core::Result;
use std::sync::Arc;

/// Resolves one parsed statement.
pub struct Resolver<'a> {
    manager: &'a Manager,
    phql: &'a str,
    binds: &'a Binds,
    bind_types: BindTypes,
    eager_joins: usize,
}

impl<'a> Resolver<'a> {
    /// `binds` are the values known at preparation time; array placeholders
    /// must already have a value.
    pub fn new(manager: &'a Manager, phql: &'a str, binds: &'a Binds) -> Self {
        Self {
            manager,
            phql,
            binds,
            bind_types: BindTypes::new(),
            eager_joins: 0,
        }
    }

    #[tracing::instrument(level = "debug", skip(self, statement), fields(phql = %self.phql))]
    pub fn prepare(&mut self, statement: &Statement) -> Result<Intermediate> {
        let intermediate = match statement {
            Statement::Select(select) => Intermediate::Select(self.select(Scope::new(), select)?),
            Statement::Insert(insert) => Intermediate::Insert(self.insert(insert)?),
            Statement::Update(update) => Intermediate::Update(self.update(update)?),
            Statement::Delete(delete) => Intermediate::Delete(self.delete(delete)?),
        };
        tracing::debug!(
            kind = intermediate.kind().as_str(),
            binds = self.bind_types.len(),
            "Resolved statement"
        );
        Ok(intermediate)
    }

    /// Bind types declared by typed placeholders so far.
    pub fn bind_types(&self) -> &BindTypes {
        &self.bind_types
    }

    pub fn into_bind_types(self) -> BindTypes {
        self.bind_types
    }

    fn resolution(&self, message: impl Into<String>) -> Error {
        Error::resolution(message, self.phql)
    }

    fn configuration(&self, message: impl Into<String>) -> Error {
        Error::configuration(message, self.phql)
    }

    /// Tie a query error raised by the manager to the statement.
    fn in_statement(&self, err: Error) -> Error {
        match err {
            Error::Query(QueryError {
                kind,
                message,
                phql: None,
                source,
            }) => Error::Query(QueryError {
                kind,
                message,
                phql: Some(self.phql.to_string()),
                source,
            }),
            other => other,
        }
    }

    /// Full model name, expanding `alias:Model` namespace aliases.
    fn model_name(&self, name: &ModelName) -> Result<String> {
        match &name.namespace {
            Some(alias) => {
                let namespace = self
                    .manager
                    .namespace_alias(alias)
                    .map_err(|e| self.in_statement(e))?;
                Ok(format!("{namespace}\\{}", name.name))
            }
            None => Ok(name.name.clone()),
        }
    }

    fn load(&self, name: &str) -> Result<Arc<dyn Model>> {
        self.manager.load(name).map_err(|e| self.in_statement(e))
    }

    /// Storage column of a PHQL attribute, checked against the meta-data.
    fn storage_column(&self, model: &str, attribute: &str, domain: &str) -> Result<String> {
        let metadata = self.manager.metadata();
        if self.manager.settings().column_renaming {
            if let Some(map) = metadata.reverse_column_map(model)? {
                return map.get(attribute).cloned().ok_or_else(|| {
                    self.resolution(format!(
                        "Column '{attribute}' doesn't belong to the model or alias '{domain}'"
                    ))
                });
            }
        }
        if !metadata.has_attribute(model, attribute)? {
            return Err(self.resolution(format!(
                "Column '{attribute}' doesn't belong to the model or alias '{domain}'"
            )));
        }
        Ok(attribute.to_string())
    }
}

/// Result name of a model object column: the model name with a lowercase
/// first letter, without namespace.
pub(crate) fn lcfirst(model: &str) -> String {
    let name = model.rsplit('\\').next().unwrap_or(model);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
