//! PHQL parsing, resolution and execution.
//!
//! A statement goes through four stages:
//!
//! 1. [`lang`] parses PHQL text into a [`lang::Statement`]
//! 2. [`resolve`] checks it against the registered models and produces a
//!    database-independent `Intermediate`
//! 3. The executors render the intermediate through the connection's
//!    dialect and run it
//! 4. SELECTs come back as a [`Resultset`], writes as a [`Status`]
//!
//! [`Manager`] ties the stages together and owns the model and relation
//! registry. [`Builder`] and [`Criteria`] assemble PHQL programmatically.

pub mod builder;
pub mod cache;
pub mod criteria;
mod exec;
pub mod lang;
pub mod manager;
pub mod model;
pub mod query;
pub mod resolve;
pub mod resultset;
pub mod settings;
pub mod status;

#[cfg(test)]
mod testing;

pub use builder::{Builder, JoinSpec, ModelRef, Params};
pub use cache::{CacheBackend, CacheOptions, IrCache, MemoryCache, Prepared};
pub use criteria::Criteria;
pub use exec::SqlStatement;
pub use lang::{Parser, PhqlParser};
pub use manager::{Manager, ManagerBuilder};
pub use model::{
    ConnectionSelector, CustomResultset, DirtyState, Message, Model, ModelDefinition, Operation,
    Record,
};
pub use query::{Query, QueryResult};
pub use resolve::Resolver;
pub use resultset::{
    Complex, ComplexColumn, HydrateMode, Hydrated, Resultset, ResultsetCore, Simple, Snapshot,
};
pub use settings::Settings;
pub use status::Status;
