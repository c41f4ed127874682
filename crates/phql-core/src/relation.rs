//! Relation definitions between models.
//!
//! Relations are registered once on the models manager and are immutable
//! afterwards. The join resolver consults them to derive join conditions when
//! a PHQL join has no explicit `ON` clause.

use crate::Result;
use crate::error::Error;

/// The type of association between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Many-to-one: a `RobotsParts` row belongs to one `Robots`.
    BelongsTo,
    /// One-to-one from the referenced side.
    HasOne,
    /// One-to-many: one `Robots` has many `RobotsParts`.
    HasMany,
    /// One-to-one through an intermediate model.
    HasOneThrough,
    /// Many-to-many through an intermediate model.
    HasManyThrough,
}

impl RelationKind {
    pub const fn is_through(self) -> bool {
        matches!(self, RelationKind::HasOneThrough | RelationKind::HasManyThrough)
    }

    /// Whether the relation yields a collection of records.
    pub const fn is_many(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::HasManyThrough)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongs-to",
            RelationKind::HasOne => "has-one",
            RelationKind::HasMany => "has-many",
            RelationKind::HasOneThrough => "has-one-through",
            RelationKind::HasManyThrough => "has-many-through",
        }
    }
}

/// An ordered list of key fields, single or compound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Keys(Vec<String>);

impl Keys {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_compound(&self) -> bool {
        self.0.len() > 1
    }
}

impl From<&str> for Keys {
    fn from(field: &str) -> Self {
        Keys(vec![field.to_string()])
    }
}

impl From<String> for Keys {
    fn from(field: String) -> Self {
        Keys(vec![field])
    }
}

impl From<&[&str]> for Keys {
    fn from(fields: &[&str]) -> Self {
        Keys(fields.iter().map(|f| (*f).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Keys {
    fn from(fields: [&str; N]) -> Self {
        Keys(fields.iter().map(|f| (*f).to_string()).collect())
    }
}

impl From<Vec<String>> for Keys {
    fn from(fields: Vec<String>) -> Self {
        Keys(fields)
    }
}

/// Registration options of a relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationOptions {
    /// Name the relation is looked up by; defaults to the referenced model
    pub alias: Option<String>,
    /// Whether related records may be memoized per parent record
    pub reusable: bool,
    /// Extra PHQL conditions applied when fetching related records
    pub params: Option<String>,
}

impl RelationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn reusable(mut self, reusable: bool) -> Self {
        self.reusable = reusable;
        self
    }

    pub fn params(mut self, conditions: impl Into<String>) -> Self {
        self.params = Some(conditions.into());
        self
    }
}

/// The intermediate model of a through relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    pub model: String,
    /// Intermediate fields matching the owner's fields
    pub fields: Keys,
    /// Intermediate fields matching the referenced model's fields
    pub referenced_fields: Keys,
}

impl Through {
    pub fn new(
        model: impl Into<String>,
        fields: impl Into<Keys>,
        referenced_fields: impl Into<Keys>,
    ) -> Self {
        Self {
            model: model.into(),
            fields: fields.into(),
            referenced_fields: referenced_fields.into(),
        }
    }
}

/// One declared association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    kind: RelationKind,
    model: String,
    fields: Keys,
    referenced_model: String,
    referenced_fields: Keys,
    through: Option<Through>,
    options: RelationOptions,
}

impl Relation {
    /// Define a direct relation.
    ///
    /// Local and referenced key lists must have the same length.
    pub fn new(
        kind: RelationKind,
        model: impl Into<String>,
        fields: impl Into<Keys>,
        referenced_model: impl Into<String>,
        referenced_fields: impl Into<Keys>,
        options: RelationOptions,
    ) -> Result<Self> {
        if kind.is_through() {
            return Err(Error::config(format!(
                "A {} relation requires an intermediate model",
                kind.as_str()
            )));
        }
        let relation = Self {
            kind,
            model: model.into(),
            fields: fields.into(),
            referenced_model: referenced_model.into(),
            referenced_fields: referenced_fields.into(),
            through: None,
            options,
        };
        check_arity(&relation.fields, &relation.referenced_fields)?;
        Ok(relation)
    }

    /// Define a relation through an intermediate model.
    pub fn through(
        kind: RelationKind,
        model: impl Into<String>,
        fields: impl Into<Keys>,
        through: Through,
        referenced_model: impl Into<String>,
        referenced_fields: impl Into<Keys>,
        options: RelationOptions,
    ) -> Result<Self> {
        if !kind.is_through() {
            return Err(Error::config(format!(
                "A {} relation cannot have an intermediate model",
                kind.as_str()
            )));
        }
        let relation = Self {
            kind,
            model: model.into(),
            fields: fields.into(),
            referenced_model: referenced_model.into(),
            referenced_fields: referenced_fields.into(),
            through: Some(through),
            options,
        };
        if let Some(through) = &relation.through {
            check_arity(&relation.fields, &through.fields)?;
            check_arity(&through.referenced_fields, &relation.referenced_fields)?;
        }
        Ok(relation)
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// The model declaring the relation.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fields(&self) -> &[String] {
        self.fields.as_slice()
    }

    pub fn referenced_model(&self) -> &str {
        &self.referenced_model
    }

    pub fn referenced_fields(&self) -> &[String] {
        self.referenced_fields.as_slice()
    }

    pub fn intermediate(&self) -> Option<&Through> {
        self.through.as_ref()
    }

    pub fn is_through(&self) -> bool {
        self.through.is_some()
    }

    pub fn options(&self) -> &RelationOptions {
        &self.options
    }

    /// The lookup alias: the explicit alias or the referenced model name.
    pub fn alias(&self) -> &str {
        self.options
            .alias
            .as_deref()
            .unwrap_or(&self.referenced_model)
    }

    pub fn is_reusable(&self) -> bool {
        self.options.reusable
    }

    pub fn params(&self) -> Option<&str> {
        self.options.params.as_deref()
    }
}

fn check_arity(fields: &Keys, referenced: &Keys) -> Result<()> {
    if fields.is_empty() || referenced.is_empty() {
        return Err(Error::config("Relation fields cannot be empty"));
    }
    if fields.len() != referenced.len() {
        return Err(Error::config(
            "Number of referenced fields are not the same",
        ));
    }
    Ok(())
}
