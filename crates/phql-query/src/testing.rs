//! Shared fixtures for unit tests: the robots schema and a recording connection.

use crate::manager::Manager;
use crate::model::{Message, Model, ModelDefinition, Operation, Record};
use phql_core::bind::{BindTypes, Binds};
use phql_core::connection::{Connection, Cursor, RowsCursor};
use phql_core::dialect::{Dialect, Flavor, SqlDialect};
use phql_core::metadata::{DataType, MemoryMetaData, ModelMeta};
use phql_core::relation::{RelationOptions, Through};
use phql_core::row::Row;
use phql_core::value::Value;
use phql_core::{Error, Result};
use std::sync::{Arc, Mutex};

/// The `Robots` model. Rejects empty names and deleting protected robots.
#[derive(Debug, Default)]
pub struct Robots;

impl Model for Robots {
    fn name(&self) -> &str {
        "Robots"
    }

    fn source(&self) -> &str {
        "robots"
    }

    fn validation(&self, record: &Record, operation: Operation) -> Vec<Message> {
        let mut messages = Vec::new();
        match operation {
            Operation::Create | Operation::Update => {
                if record.get("name").is_some_and(Value::is_blank) {
                    messages.push(Message::new("name is required").field("name"));
                }
            }
            Operation::Delete => {
                if record.get("type").and_then(Value::as_str) == Some("protected") {
                    messages.push(Message::new("Protected robots cannot be deleted").field("type"));
                }
            }
        }
        messages
    }
}

pub fn robots_metadata() -> MemoryMetaData {
    MemoryMetaData::new()
        .with(
            "Robots",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("name", DataType::Varchar)
                .column("type", DataType::Varchar)
                .column("year", DataType::Integer)
                .column("price", DataType::Decimal),
        )
        .with(
            "RobotsParts",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("robots_id", DataType::Integer)
                .column("parts_id", DataType::Integer),
        )
        .with(
            "Parts",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("name", DataType::Varchar),
        )
        .with(
            "Customers",
            ModelMeta::new()
                .primary("cst_id", DataType::Integer)
                .column("cst_name", DataType::Varchar)
                .rename("cst_id", "id")
                .rename("cst_name", "name"),
        )
}

/// A manager over the robots schema, with a recording Postgres connection
/// as the default connection.
pub fn robots_manager() -> (Manager, Arc<RecordingConnection>) {
    let manager = Manager::new(Arc::new(robots_metadata()));
    register_robots_schema(&manager);
    let connection = Arc::new(RecordingConnection::new());
    manager.set_default_connection(connection.clone());
    (manager, connection)
}

pub fn register_robots_schema(manager: &Manager) {
    manager.register_model(Robots);
    manager.register_model(ModelDefinition::new("RobotsParts", "robots_parts"));
    manager.register_model(ModelDefinition::new("Parts", "parts"));
    manager.register_model(ModelDefinition::new("Customers", "customers"));

    let relations = [
        manager.add_has_many("Robots", "id", "RobotsParts", "robots_id", RelationOptions::new()),
        manager.add_belongs_to(
            "RobotsParts",
            "robots_id",
            "Robots",
            "id",
            RelationOptions::new().alias("robot"),
        ),
        manager.add_belongs_to(
            "RobotsParts",
            "parts_id",
            "Parts",
            "id",
            RelationOptions::new().alias("part"),
        ),
        manager.add_has_many_to_many(
            "Robots",
            "id",
            Through::new("RobotsParts", "robots_id", "parts_id"),
            "Parts",
            "id",
            RelationOptions::new().alias("parts"),
        ),
    ];
    for relation in relations {
        if let Err(e) = relation {
            panic!("invalid fixture relation: {e}");
        }
    }
}

/// One statement seen by a [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub sql: String,
    pub binds: Binds,
    pub types: BindTypes,
}

#[derive(Debug, Default)]
struct MockState {
    responses: Vec<(String, Vec<Row>)>,
    queried: Vec<Recorded>,
    executed: Vec<Recorded>,
    events: Vec<&'static str>,
    in_transaction: bool,
    fail_on: Option<String>,
    next_id: i64,
}

/// A connection that records statements and answers queries with canned rows.
#[derive(Debug)]
pub struct RecordingConnection {
    state: Arc<Mutex<MockState>>,
    dialect: SqlDialect,
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::with_flavor(Flavor::Postgres)
    }
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sqlite() -> Self {
        Self::with_flavor(Flavor::Sqlite)
    }

    pub fn mysql() -> Self {
        Self::with_flavor(Flavor::Mysql)
    }

    pub fn with_flavor(flavor: Flavor) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect: SqlDialect::new(flavor),
        }
    }

    /// Answer queries whose SQL contains `pattern` with `rows`.
    pub fn respond(&self, pattern: &str, rows: Vec<Row>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.responses.push((pattern.to_string(), rows));
    }

    /// Fail `execute` for statements containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fail_on = Some(pattern.to_string());
    }

    pub fn queried(&self) -> Vec<Recorded> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).queried.clone()
    }

    pub fn executed(&self) -> Vec<Recorded> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).executed.clone()
    }

    /// Transaction calls in order (`begin`, `commit`, `rollback`).
    pub fn events(&self) -> Vec<&'static str> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).events.clone()
    }
}

impl Connection for RecordingConnection {
    fn db_type(&self) -> &str {
        self.dialect.flavor().db_type()
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn query(&self, sql: &str, binds: &Binds, types: &BindTypes) -> Result<Option<Box<dyn Cursor>>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queried.push(Recorded {
            sql: sql.to_string(),
            binds: binds.clone(),
            types: types.clone(),
        });
        let rows = state
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(Some(Box::new(RowsCursor::new(rows))))
    }

    fn execute(&self, sql: &str, binds: &Binds, types: &BindTypes) -> Result<u64> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_on.as_deref().is_some_and(|p| sql.contains(p)) {
            return Err(Error::connection("Statement failed", Some(sql)));
        }
        state.executed.push(Recorded {
            sql: sql.to_string(),
            binds: binds.clone(),
            types: types.clone(),
        });
        if sql.starts_with("INSERT") {
            state.next_id += 1;
        }
        Ok(1)
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_transaction = true;
        state.events.push("begin");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_transaction = false;
        state.events.push("commit");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_transaction = false;
        state.events.push("rollback");
        Ok(())
    }

    fn is_under_transaction(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).in_transaction
    }

    fn last_insert_id(&self) -> Option<Value> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.next_id > 0).then_some(Value::BigInt(state.next_id))
    }
}
