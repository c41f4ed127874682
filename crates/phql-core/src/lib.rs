//! Core types and traits for the PHQL engine.
//!
//! This crate provides the foundations shared by the parser, the resolver and
//! the executor:
//!
//! - `Value` and `Row` for data flowing in and out of storage
//! - `Binds` and `BindTypes` for bind parameters
//! - The resolved intermediate representation (`Intermediate`)
//! - `Relation` definitions between models
//! - `MetaData`, `Connection` and `Dialect` collaborator traits

pub mod bind;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod ir;
pub mod metadata;
pub mod relation;
pub mod row;
pub mod value;

pub use bind::{BindKey, BindMap, BindType, BindTypes, Binds};
pub use connection::{Connection, Cursor, RowsCursor};
pub use dialect::{Dialect, Flavor, SqlAssignment, SqlDialect};
pub use error::{
    CacheError, ConfigError, ConnectionError, Error, MetaDataError, ParseError, QueryError,
    QueryErrorKind, Result, TransactionError, TransactionErrorKind, TypeError,
};
pub use ir::{
    AssignmentIr, BinaryOp, ColumnIr, ColumnKind, DeleteIr, Eager, InsertIr, Intermediate,
    IrExpr, JoinIr, JoinType, LimitIr, Literal, OrderDirection, OrderIr, SelectIr,
    StatementKind, TableRef, UnaryOp, UpdateIr,
};
pub use metadata::{DataType, MemoryMetaData, MetaData, ModelMeta};
pub use relation::{Keys, Relation, RelationKind, RelationOptions, Through};
pub use row::{ColumnInfo, Row};
pub use value::Value;
