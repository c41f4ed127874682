//! Model meta-data introspection.
//!
//! The engine never inspects model types directly; attribute lists, column
//! maps and data types are obtained through the [`MetaData`] trait.
//! Attribute lists are storage column names. A column map translates storage
//! columns to the attribute names used in PHQL, and the reverse column map
//! goes the other way.

use crate::Result;
use crate::error::Error;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    BigInteger,
    Decimal,
    Double,
    Float,
    Boolean,
    Char,
    Varchar,
    Text,
    Date,
    DateTime,
    Blob,
    Json,
}

impl DataType {
    /// Whether input filters should match this column with `LIKE`.
    pub const fn is_textual(self) -> bool {
        matches!(self, DataType::Char | DataType::Varchar | DataType::Text)
    }

    /// Bind type used when writing a value of this column.
    pub const fn bind_type(self) -> crate::bind::BindType {
        use crate::bind::BindType;
        match self {
            DataType::Integer | DataType::BigInteger => BindType::Int,
            DataType::Decimal => BindType::Decimal,
            DataType::Double | DataType::Float => BindType::Double,
            DataType::Boolean => BindType::Bool,
            DataType::Blob => BindType::Blob,
            _ => BindType::Str,
        }
    }
}

/// Meta-data service consulted during resolution, execution and hydration.
pub trait MetaData: Send + Sync {
    /// Storage columns of the model, in declaration order.
    fn attributes(&self, model: &str) -> Result<Vec<String>>;

    /// Whether `attribute` (a PHQL-facing name) exists on the model.
    fn has_attribute(&self, model: &str, attribute: &str) -> Result<bool>;

    /// Column -> attribute map, if the model renames columns.
    fn column_map(&self, model: &str) -> Result<Option<IndexMap<String, String>>>;

    /// Attribute -> column map, if the model renames columns.
    fn reverse_column_map(&self, model: &str) -> Result<Option<IndexMap<String, String>>>;

    /// Column -> data type.
    fn data_types(&self, model: &str) -> Result<IndexMap<String, DataType>>;

    /// Primary key columns.
    fn primary_key(&self, model: &str) -> Result<Vec<String>>;
}

/// Meta-data for one model held by [`MemoryMetaData`].
#[derive(Debug, Clone, Default)]
pub struct ModelMeta {
    columns: IndexMap<String, DataType>,
    primary_key: Vec<String>,
    column_map: Option<IndexMap<String, String>>,
}

impl ModelMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.insert(name.into(), data_type);
        self
    }

    /// Add a primary key column.
    pub fn primary(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        self.primary_key.push(name.clone());
        self.columns.insert(name, data_type);
        self
    }

    /// Rename a storage column to a PHQL attribute.
    ///
    /// Once any column is renamed, every column must appear in the map.
    pub fn rename(mut self, column: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.column_map
            .get_or_insert_with(IndexMap::new)
            .insert(column.into(), attribute.into());
        self
    }

    fn has_attribute(&self, attribute: &str) -> bool {
        match &self.column_map {
            Some(map) => map.values().any(|a| a == attribute),
            None => self.columns.contains_key(attribute),
        }
    }
}

/// In-memory meta-data registry.
#[derive(Debug, Default)]
pub struct MemoryMetaData {
    models: RwLock<HashMap<String, ModelMeta>>,
}

impl MemoryMetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the meta-data of a model.
    pub fn register(&self, model: impl Into<String>, meta: ModelMeta) {
        let model = model.into();
        tracing::trace!(model = %model, columns = meta.columns.len(), "Registering model meta-data");
        if let Ok(mut models) = self.models.write() {
            models.insert(model, meta);
        }
    }

    /// Builder-style registration.
    pub fn with(self, model: impl Into<String>, meta: ModelMeta) -> Self {
        self.register(model, meta);
        self
    }

    fn read<T>(&self, model: &str, f: impl FnOnce(&ModelMeta) -> T) -> Result<T> {
        let models = self
            .models
            .read()
            .map_err(|_| Error::metadata(model, "The meta-data is invalid or is corrupt"))?;
        models
            .get(model)
            .map(f)
            .ok_or_else(|| Error::metadata(model, "The meta-data is invalid or is corrupt"))
    }
}

impl MetaData for MemoryMetaData {
    fn attributes(&self, model: &str) -> Result<Vec<String>> {
        self.read(model, |m| m.columns.keys().cloned().collect())
    }

    fn has_attribute(&self, model: &str, attribute: &str) -> Result<bool> {
        self.read(model, |m| m.has_attribute(attribute))
    }

    fn column_map(&self, model: &str) -> Result<Option<IndexMap<String, String>>> {
        self.read(model, |m| m.column_map.clone())
    }

    fn reverse_column_map(&self, model: &str) -> Result<Option<IndexMap<String, String>>> {
        self.read(model, |m| {
            m.column_map.as_ref().map(|map| {
                map.iter()
                    .map(|(column, attribute)| (attribute.clone(), column.clone()))
                    .collect()
            })
        })
    }

    fn data_types(&self, model: &str) -> Result<IndexMap<String, DataType>> {
        self.read(model, |m| m.columns.clone())
    }

    fn primary_key(&self, model: &str) -> Result<Vec<String>> {
        self.read(model, |m| m.primary_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robots() -> MemoryMetaData {
        MemoryMetaData::new().with(
            "Robots",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("name", DataType::Varchar)
                .column("price", DataType::Decimal),
        )
    }

    #[test]
    fn test_attributes_in_declaration_order() {
        let meta = robots();
        assert_eq!(meta.attributes("Robots").unwrap(), vec!["id", "name", "price"]);
        assert_eq!(meta.primary_key("Robots").unwrap(), vec!["id"]);
        assert!(meta.has_attribute("Robots", "name").unwrap());
        assert!(!meta.has_attribute("Robots", "type").unwrap());
        assert!(meta.column_map("Robots").unwrap().is_none());
    }

    #[test]
    fn test_column_map_and_reverse() {
        let meta = MemoryMetaData::new().with(
            "Parts",
            ModelMeta::new()
                .primary("part_id", DataType::Integer)
                .column("part_name", DataType::Varchar)
                .rename("part_id", "id")
                .rename("part_name", "name"),
        );
        assert!(meta.has_attribute("Parts", "name").unwrap());
        assert!(!meta.has_attribute("Parts", "part_name").unwrap());
        let reverse = meta.reverse_column_map("Parts").unwrap().unwrap();
        assert_eq!(reverse.get("name").map(String::as_str), Some("part_name"));
        let map = meta.column_map("Parts").unwrap().unwrap();
        assert_eq!(map.get("part_id").map(String::as_str), Some("id"));
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let err = robots().attributes("Nope").unwrap_err();
        assert!(matches!(err, Error::MetaData(ref e) if e.model == "Nope"));
    }

    #[test]
    fn test_textual_types() {
        assert!(DataType::Varchar.is_textual());
        assert!(!DataType::Integer.is_textual());
        assert_eq!(DataType::Integer.bind_type(), crate::bind::BindType::Int);
    }
}
