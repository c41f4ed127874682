//! Models, records and the optional model capabilities.
//!
//! A [`Model`] describes where a model is stored and may opt into extra
//! behavior by returning a [`ConnectionSelector`] or a [`CustomResultset`].
//! A [`Record`] is one hydrated or new instance of a model, addressed by
//! attribute name.

use crate::manager::Manager;
use crate::resultset::{Resultset, Simple};
use indexmap::IndexMap;
use phql_core::bind::{BindTypes, Binds};
use phql_core::connection::Connection;
use phql_core::dialect::SqlAssignment;
use phql_core::error::Error;
use phql_core::ir::{Intermediate, TableRef};
use phql_core::metadata::DataType;
use phql_core::value::Value;
use phql_core::{BindType, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A declared model.
pub trait Model: Send + Sync + fmt::Debug {
    /// Model name used in PHQL (`Robots`, `Store\Robots`).
    fn name(&self) -> &str;

    /// Table or view backing the model.
    fn source(&self) -> &str;

    fn schema(&self) -> Option<&str> {
        None
    }

    /// Validate a record before it is written. Any message rejects the write.
    fn validation(&self, _record: &Record, _operation: Operation) -> Vec<Message> {
        Vec::new()
    }

    /// Per-statement connection routing, if the model shards its data.
    fn connection_selector(&self) -> Option<&dyn ConnectionSelector> {
        None
    }

    /// Result set wrapper used when this model is the only object selected.
    fn custom_resultset(&self) -> Option<&dyn CustomResultset> {
        None
    }
}

/// Chooses connections for a model per statement.
pub trait ConnectionSelector: Send + Sync {
    fn select_read_connection(
        &self,
        intermediate: Option<&Intermediate>,
        binds: &Binds,
        types: &BindTypes,
    ) -> Option<Arc<dyn Connection>>;

    fn select_write_connection(
        &self,
        intermediate: Option<&Intermediate>,
        binds: &Binds,
        types: &BindTypes,
    ) -> Option<Arc<dyn Connection>>;
}

/// Wraps the simple result set of a model in a model-specific type.
pub trait CustomResultset: Send + Sync {
    fn wrap(&self, resultset: Simple) -> Box<dyn Resultset>;
}

/// A model declared by name and source only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDefinition {
    name: String,
    source: String,
    schema: Option<String>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            schema: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl Model for ModelDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

/// Table reference of a model, without alias.
pub fn model_table(model: &dyn Model) -> TableRef {
    TableRef::new(model.source()).schema(model.schema().map(str::to_string))
}

/// The write being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// A validation or persistence message attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub message: String,
    pub field: Option<String>,
    pub kind: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            kind: "InvalidValue".to_string(),
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Persistence state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// Loaded from or written to storage
    Persistent,
    /// Not yet stored
    #[default]
    Transient,
    /// Deleted from storage
    Detached,
}

/// One instance of a model.
#[derive(Clone)]
pub struct Record {
    manager: Manager,
    model: Arc<dyn Model>,
    fields: IndexMap<String, Value>,
    snapshot: Option<IndexMap<String, Value>>,
    related: IndexMap<String, Vec<Record>>,
    messages: Vec<Message>,
    state: DirtyState,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model.name())
            .field("fields", &self.fields)
            .field("related", &self.related)
            .field("state", &self.state)
            .field("messages", &self.messages)
            .finish_non_exhaustive()
    }
}

impl Record {
    /// A new record that has not been stored yet.
    pub fn new(manager: &Manager, model: Arc<dyn Model>) -> Self {
        Self {
            manager: manager.clone(),
            model,
            fields: IndexMap::new(),
            snapshot: None,
            related: IndexMap::new(),
            messages: Vec::new(),
            state: DirtyState::Transient,
        }
    }

    /// A record built from fetched attribute values.
    pub fn hydrated(
        manager: &Manager,
        model: Arc<dyn Model>,
        fields: IndexMap<String, Value>,
        keep_snapshot: bool,
    ) -> Self {
        let snapshot = keep_snapshot.then(|| fields.clone());
        Self {
            manager: manager.clone(),
            model,
            fields,
            snapshot,
            related: IndexMap::new(),
            messages: Vec::new(),
            state: DirtyState::Persistent,
        }
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.fields.get(attribute)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(attribute.into(), value.into());
        self
    }

    /// Builder-style `set`.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    /// Assign several attributes at once.
    pub fn assign(&mut self, data: &IndexMap<String, Value>) -> &mut Self {
        for (attribute, value) in data {
            self.fields.insert(attribute.clone(), value.clone());
        }
        self
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    /// Attribute values as fetched, if the model keeps snapshots.
    pub fn snapshot(&self) -> Option<&IndexMap<String, Value>> {
        self.snapshot.as_ref()
    }

    /// Whether an attribute differs from the snapshot. Always true without one.
    pub fn has_changed(&self, attribute: &str) -> bool {
        match &self.snapshot {
            Some(snapshot) => snapshot.get(attribute) != self.fields.get(attribute),
            None => true,
        }
    }

    pub fn state(&self) -> DirtyState {
        self.state
    }

    pub fn related(&self, alias: &str) -> Option<&[Record]> {
        self.related
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(alias))
            .map(|(_, records)| records.as_slice())
    }

    pub fn set_related(&mut self, alias: impl Into<String>, records: Vec<Record>) {
        self.related.insert(alias.into(), records);
    }

    pub(crate) fn push_related(&mut self, alias: &str, record: Record) {
        self.related.entry(alias.to_string()).or_default().push(record);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (attribute, value) in &self.fields {
            map.insert(attribute.clone(), value.to_json());
        }
        for (alias, records) in &self.related {
            map.insert(
                alias.clone(),
                serde_json::Value::Array(records.iter().map(Record::to_json).collect()),
            );
        }
        serde_json::Value::Object(map)
    }

    /// Insert the record, or update it if it was loaded from storage.
    pub fn save(&mut self) -> Result<bool> {
        match self.state {
            DirtyState::Persistent => self.update(),
            DirtyState::Transient | DirtyState::Detached => self.create(),
        }
    }

    /// Insert the record. Returns `false` with messages when validation fails.
    #[tracing::instrument(level = "debug", skip(self), fields(model = %self.model.name()))]
    pub fn create(&mut self) -> Result<bool> {
        if !self.validate(Operation::Create) {
            return Ok(false);
        }

        let name = self.model.name().to_string();
        let metadata = self.manager.metadata();
        let column_map = metadata.column_map(&name)?;
        let data_types = metadata.data_types(&name)?;

        let mut assignments = Vec::new();
        let mut binds = Binds::new();
        let mut types = BindTypes::new();
        for column in metadata.attributes(&name)? {
            let attribute = attribute_of(column_map.as_ref(), &column);
            let Some(value) = self.fields.get(attribute) else {
                continue;
            };
            match value {
                Value::Default => {}
                Value::Raw(sql) => assignments.push(SqlAssignment::raw(&column, sql)),
                value => {
                    types.insert(column.as_str(), bind_type(value, data_types.get(&column)));
                    binds.insert(column.as_str(), value.clone());
                    assignments.push(SqlAssignment::bound(&column));
                }
            }
        }
        if assignments.is_empty() {
            return Err(Error::execution(
                format!("Record of model '{name}' has no values to insert"),
                None,
            ));
        }

        let connection = self.write_connection()?;
        let sql = connection
            .dialect()
            .insert(&model_table(self.model.as_ref()), &assignments);
        tracing::debug!(sql = %sql, "Inserting record");
        connection.execute(&sql, &binds, &types)?;

        let primary_key = metadata.primary_key(&name)?;
        if let [key] = primary_key.as_slice() {
            let attribute = attribute_of(column_map.as_ref(), key).to_string();
            if self.fields.get(&attribute).is_none_or(Value::is_null) {
                if let Some(id) = connection.last_insert_id() {
                    self.fields.insert(attribute, id);
                }
            }
        }
        self.mark_persistent();
        Ok(true)
    }

    /// Update the stored row. Returns `false` with messages when rejected.
    #[tracing::instrument(level = "debug", skip(self), fields(model = %self.model.name()))]
    pub fn update(&mut self) -> Result<bool> {
        if !self.validate(Operation::Update) {
            return Ok(false);
        }
        let Some((keys, mut binds, mut types)) = self.key_binds("updated")? else {
            return Ok(false);
        };

        let name = self.model.name().to_string();
        let metadata = self.manager.metadata();
        let column_map = metadata.column_map(&name)?;
        let data_types = metadata.data_types(&name)?;

        let mut assignments = Vec::new();
        for column in metadata.attributes(&name)? {
            if keys.contains(&column) {
                continue;
            }
            let attribute = attribute_of(column_map.as_ref(), &column);
            if !self.has_changed(attribute) {
                continue;
            }
            let Some(value) = self.fields.get(attribute) else {
                continue;
            };
            match value {
                Value::Default => {}
                Value::Raw(sql) => assignments.push(SqlAssignment::raw(&column, sql)),
                value => {
                    types.insert(column.as_str(), bind_type(value, data_types.get(&column)));
                    binds.insert(column.as_str(), value.clone());
                    assignments.push(SqlAssignment::bound(&column));
                }
            }
        }
        if assignments.is_empty() {
            return Ok(true);
        }

        let connection = self.write_connection()?;
        let sql = connection
            .dialect()
            .update(&model_table(self.model.as_ref()), &assignments, &keys);
        tracing::debug!(sql = %sql, "Updating record");
        connection.execute(&sql, &binds, &types)?;
        self.mark_persistent();
        Ok(true)
    }

    /// Delete the stored row. Returns `false` with messages when rejected.
    #[tracing::instrument(level = "debug", skip(self), fields(model = %self.model.name()))]
    pub fn delete(&mut self) -> Result<bool> {
        if !self.validate(Operation::Delete) {
            return Ok(false);
        }
        let Some((keys, binds, types)) = self.key_binds("deleted")? else {
            return Ok(false);
        };

        let connection = self.write_connection()?;
        let sql = connection
            .dialect()
            .delete(&model_table(self.model.as_ref()), &keys);
        tracing::debug!(sql = %sql, "Deleting record");
        connection.execute(&sql, &binds, &types)?;
        self.state = DirtyState::Detached;
        Ok(true)
    }

    fn validate(&mut self, operation: Operation) -> bool {
        self.messages.clear();
        let messages = self.model.validation(self, operation);
        if messages.is_empty() {
            return true;
        }
        tracing::debug!(
            model = %self.model.name(),
            messages = messages.len(),
            "Record rejected by validation"
        );
        self.messages = messages;
        false
    }

    /// Primary key columns with their bound values, or `None` after recording
    /// why the record cannot be addressed.
    fn key_binds(&mut self, action: &str) -> Result<Option<(Vec<String>, Binds, BindTypes)>> {
        let name = self.model.name().to_string();
        let metadata = self.manager.metadata();
        let keys = metadata.primary_key(&name)?;
        if keys.is_empty() {
            self.messages.push(
                Message::new(
                    "A primary key must be defined in the model in order to perform the operation",
                )
                .kind("InvalidPrimaryKey"),
            );
            return Ok(None);
        }

        let column_map = metadata.column_map(&name)?;
        let data_types = metadata.data_types(&name)?;
        let mut binds = Binds::new();
        let mut types = BindTypes::new();
        for key in &keys {
            let attribute = attribute_of(column_map.as_ref(), key);
            match self.fields.get(attribute) {
                Some(value) if !value.is_null() => {
                    types.insert(key.as_str(), bind_type(value, data_types.get(key)));
                    binds.insert(key.as_str(), value.clone());
                }
                _ => {
                    self.messages.push(
                        Message::new(format!(
                            "Record cannot be {action} because it does not exist"
                        ))
                        .kind("InvalidUpdateAttempt"),
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some((keys, binds, types)))
    }

    pub(crate) fn write_connection(&self) -> Result<Arc<dyn Connection>> {
        self.manager
            .write_connection(self.model.as_ref(), None, &Binds::new(), &BindTypes::new())
    }

    fn mark_persistent(&mut self) {
        self.state = DirtyState::Persistent;
        if self.snapshot.is_some() || self.manager.is_keeping_snapshots(self.model.name()) {
            self.snapshot = Some(self.fields.clone());
        }
    }
}

fn attribute_of<'a>(column_map: Option<&'a IndexMap<String, String>>, column: &'a str) -> &'a str {
    column_map
        .and_then(|map| map.get(column))
        .map_or(column, String::as_str)
}

fn bind_type(value: &Value, data_type: Option<&DataType>) -> BindType {
    if value.is_null() {
        return BindType::Null;
    }
    match data_type {
        Some(data_type) => data_type.bind_type(),
        None => match value {
            Value::Bool(_) => BindType::Bool,
            Value::Int(_) | Value::BigInt(_) => BindType::Int,
            Value::Double(_) => BindType::Double,
            Value::Decimal(_) => BindType::Decimal,
            Value::Bytes(_) => BindType::Blob,
            _ => BindType::Str,
        },
    }
}
