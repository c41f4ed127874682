//! PHQL - an object query language over declared models and relations.
//!
//! Statements name models and their attributes instead of tables and
//! columns. The engine parses them, resolves them against a registry of
//! models and relations, renders SQL through the connection's dialect and
//! returns records, rows or a write status.
//!
//! # Quick Start
//!
//! ```ignore
//! use phql::prelude::*;
//!
//! let metadata = MemoryMetaData::new().with(
//!     "Robots",
//!     ModelMeta::new()
//!         .primary("id", DataType::Integer)
//!         .column("name", DataType::Varchar),
//! );
//! let manager = Manager::builder()
//!     .metadata(Arc::new(metadata))
//!     .connection(connection)
//!     .build()?;
//! manager.register_model(ModelDefinition::new("Robots", "robots"));
//!
//! let mut robots = manager
//!     .execute_query("SELECT * FROM Robots WHERE id > :id:", &binds! { "id" => 10 }, &BindTypes::new())?
//!     .into_resultset()?;
//! while let Some(robot) = robots.current()? {
//!     println!("{}", robot.to_json());
//!     robots.next();
//! }
//! ```
//!
//! # Crates
//!
//! - `phql-core`: values, rows, binds, the intermediate representation,
//!   relations and the metadata, connection and dialect traits
//! - `phql-query`: the parser, the resolver, the executors, result sets,
//!   the builder and criteria

pub use phql_core::{
    BindKey, BindType, BindTypes, Binds, ColumnInfo, Connection, Cursor, DataType, Dialect, Error,
    Flavor, Intermediate, MemoryMetaData, MetaData, ModelMeta, Relation, RelationKind,
    RelationOptions, Result, Row, RowsCursor, SqlDialect, StatementKind, Through, Value,
};
pub use phql_core::binds;
pub use phql_query::{
    Builder, CacheBackend, CacheOptions, Complex, ComplexColumn, ConnectionSelector, Criteria,
    CustomResultset, DirtyState, HydrateMode, Hydrated, JoinSpec, Manager, ManagerBuilder,
    MemoryCache, Message, Model, ModelDefinition, ModelRef, Operation, Params, PhqlParser, Query,
    QueryResult, Record, Resultset, Settings, Simple, Snapshot, SqlStatement, Status,
};

/// The types most programs need.
pub mod prelude {
    pub use crate::{
        BindType, BindTypes, Binds, Builder, CacheOptions, Connection, Criteria, DataType, Error,
        HydrateMode, Hydrated, Manager, MemoryMetaData, Message, Model, ModelDefinition,
        ModelMeta, Operation, Params, Query, QueryResult, Record, RelationOptions, Result,
        Resultset, Settings, Status, Through, Value,
    };
    pub use crate::binds;
    pub use std::sync::Arc;
}

/// Run a one-off PHQL statement against `manager`.
///
/// Equivalent to creating a [`Query`] and executing it with `binds`.
pub fn execute(manager: &Manager, phql: &str, binds: &Binds) -> Result<QueryResult> {
    tracing::debug!(phql = %phql, "Executing PHQL");
    manager.execute_query(phql, binds, &BindTypes::new())
}
