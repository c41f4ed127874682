//! A PHQL statement bound to a manager: parse, resolve, execute.

use crate::cache::{phql_key, CacheBackend, CacheOptions, Prepared};
use crate::exec::insert::execute_insert;
use crate::exec::mutate::{execute_delete, execute_update};
use crate::exec::select::SelectRun;
use crate::exec::SqlStatement;
use crate::manager::Manager;
use crate::resolve::Resolver;
use crate::resultset::{Hydrated, Resultset};
use crate::status::Status;
use phql_core::bind::{BindTypes, Binds};
use phql_core::error::Error;
use phql_core::ir::{Intermediate, StatementKind};
use phql_core::Result;
use std::fmt;
use std::sync::Arc;

/// What running a statement produced.
pub enum QueryResult {
    /// Rows of a SELECT
    Resultset(Box<dyn Resultset>),
    /// First row of a SELECT run with a unique row
    Row(Option<Hydrated>),
    /// Outcome of an INSERT, UPDATE or DELETE
    Status(Status),
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Resultset(resultset) => f
                .debug_struct("Resultset")
                .field("count", &resultset.count())
                .field("fresh", &resultset.is_fresh())
                .finish(),
            QueryResult::Row(row) => f.debug_tuple("Row").field(row).finish(),
            QueryResult::Status(status) => f.debug_tuple("Status").field(status).finish(),
        }
    }
}

impl QueryResult {
    pub fn into_resultset(self) -> Result<Box<dyn Resultset>> {
        match self {
            QueryResult::Resultset(resultset) => Ok(resultset),
            _ => Err(Error::execution("The statement did not return a result set", None)),
        }
    }

    pub fn into_row(self) -> Result<Option<Hydrated>> {
        match self {
            QueryResult::Row(row) => Ok(row),
            QueryResult::Resultset(mut resultset) => resultset.first(),
            QueryResult::Status(_) => {
                Err(Error::execution("The statement did not return a row", None))
            }
        }
    }

    pub fn into_status(self) -> Result<Status> {
        match self {
            QueryResult::Status(status) => Ok(status),
            _ => Err(Error::execution("The statement did not return a status", None)),
        }
    }
}

/// One PHQL statement and its default binds, cache options and flags.
///
/// The statement is prepared on first use. Prepared statements are shared
/// through the manager's IR cache, keyed by the normalized PHQL text.
pub struct Query {
    manager: Manager,
    phql: String,
    prepared: Option<Prepared>,
    binds: Binds,
    bind_types: BindTypes,
    cache_options: Option<CacheOptions>,
    unique_row: bool,
    shared_lock: bool,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("phql", &self.phql)
            .field("binds", &self.binds)
            .field("cache_options", &self.cache_options)
            .field("unique_row", &self.unique_row)
            .field("shared_lock", &self.shared_lock)
            .finish_non_exhaustive()
    }
}

impl Query {
    pub fn new(phql: impl Into<String>, manager: &Manager) -> Self {
        Self {
            manager: manager.clone(),
            phql: phql.into(),
            prepared: None,
            binds: Binds::new(),
            bind_types: BindTypes::new(),
            cache_options: None,
            unique_row: false,
            shared_lock: false,
        }
    }

    /// A query over an already resolved statement.
    pub fn from_intermediate(manager: &Manager, intermediate: Intermediate) -> Self {
        let mut query = Self::new(String::new(), manager);
        query.prepared = Some(Prepared {
            intermediate: Arc::new(intermediate),
            bind_types: BindTypes::new(),
        });
        query
    }

    pub fn phql(&self) -> &str {
        &self.phql
    }

    pub fn set_unique_row(&mut self, unique: bool) -> &mut Self {
        self.unique_row = unique;
        self
    }

    pub fn unique_row(&self) -> bool {
        self.unique_row
    }

    /// Lock the selected rows in shared mode.
    pub fn set_shared_lock(&mut self, shared: bool) -> &mut Self {
        self.shared_lock = shared;
        self
    }

    /// Default binds, replaced or merged into the current ones.
    pub fn set_bind_params(&mut self, binds: Binds, merge: bool) -> &mut Self {
        if merge {
            self.binds.merge(&binds);
        } else {
            self.binds = binds;
        }
        self
    }

    pub fn set_bind_types(&mut self, types: BindTypes, merge: bool) -> &mut Self {
        if merge {
            self.bind_types.merge(&types);
        } else {
            self.bind_types = types;
        }
        self
    }

    pub fn bind_params(&self) -> &Binds {
        &self.binds
    }

    pub fn bind_types(&self) -> &BindTypes {
        &self.bind_types
    }

    /// Cache the rows of this SELECT.
    pub fn cache(&mut self, options: CacheOptions) -> &mut Self {
        self.cache_options = Some(options);
        self
    }

    pub fn cache_options(&self) -> Option<&CacheOptions> {
        self.cache_options.as_ref()
    }

    /// The resolved statement, once prepared.
    pub fn intermediate(&self) -> Option<&Intermediate> {
        self.prepared.as_ref().map(|p| p.intermediate.as_ref())
    }

    pub fn statement_kind(&self) -> Option<StatementKind> {
        self.intermediate().map(Intermediate::kind)
    }

    /// Parse and resolve the statement with the default binds.
    pub fn parse(&mut self) -> Result<Arc<Intermediate>> {
        let binds = self.binds.clone();
        Ok(self.prepare(&binds)?.intermediate)
    }

    fn prepare(&mut self, binds: &Binds) -> Result<Prepared> {
        if let Some(prepared) = &self.prepared {
            return Ok(prepared.clone());
        }
        let key = phql_key(&self.phql);
        let prepared = match self.manager.cached_statement(key) {
            Some(prepared) => {
                tracing::trace!(phql = %self.phql, "Prepared statement cache hit");
                prepared
            }
            None => {
                let statement = self.manager.parser().parse(&self.phql)?;
                let mut resolver = Resolver::new(&self.manager, &self.phql, binds);
                let intermediate = resolver.prepare(&statement)?;
                let prepared = Prepared {
                    intermediate: Arc::new(intermediate),
                    bind_types: resolver.into_bind_types(),
                };
                self.manager.store_statement(key, prepared)
            }
        };
        self.prepared = Some(prepared.clone());
        Ok(prepared)
    }

    /// Run the statement. `binds` and `types` are merged over the defaults.
    #[tracing::instrument(level = "debug", skip(self, binds, types), fields(phql = %self.phql))]
    pub fn execute(&mut self, binds: &Binds, types: &BindTypes) -> Result<QueryResult> {
        let binds = self.binds.merged(binds);

        let cache = match &self.cache_options {
            Some(options) => {
                let backend = self.cache_backend(options)?;
                if let Some(snapshot) = backend.get(&options.key, options.lifetime)? {
                    tracing::debug!(key = %options.key, "Result cache hit");
                    let resultset = snapshot.thaw(&self.manager)?;
                    return self.select_result(resultset);
                }
                Some((backend, options.clone()))
            }
            None => None,
        };

        let prepared = self.prepare(&binds)?;
        let types = prepared
            .bind_types
            .merged(&self.bind_types)
            .merged(types);
        if cache.is_some() && prepared.intermediate.kind() != StatementKind::Select {
            return Err(Error::configuration(
                "Only PHQL statements that return resultsets can be cached",
                &self.phql,
            ));
        }

        match prepared.intermediate.as_ref() {
            Intermediate::Select(ir) => {
                let mut resultset = self.select_run().execute(ir, &binds, &types)?;
                if let Some((backend, options)) = cache {
                    let snapshot = resultset.freeze()?;
                    backend.save(&options.key, &snapshot, options.lifetime)?;
                    tracing::debug!(key = %options.key, rows = snapshot.len(), "Result cached");
                }
                self.select_result(resultset)
            }
            Intermediate::Insert(ir) => Ok(QueryResult::Status(execute_insert(
                &self.manager,
                ir,
                &binds,
                &types,
                &self.phql,
            )?)),
            Intermediate::Update(ir) => Ok(QueryResult::Status(execute_update(
                &self.manager,
                ir,
                &binds,
                &types,
                &self.phql,
            )?)),
            Intermediate::Delete(ir) => Ok(QueryResult::Status(execute_delete(
                &self.manager,
                ir,
                &binds,
                &types,
                &self.phql,
            )?)),
        }
    }

    /// The first row of the result.
    pub fn single_result(&mut self, binds: &Binds, types: &BindTypes) -> Result<Option<Hydrated>> {
        self.execute(binds, types)?.into_row()
    }

    /// The SQL this SELECT runs, with its expanded binds.
    pub fn sql(&mut self) -> Result<SqlStatement> {
        let binds = self.binds.clone();
        let prepared = self.prepare(&binds)?;
        let types = prepared.bind_types.merged(&self.bind_types);
        match prepared.intermediate.as_ref() {
            Intermediate::Select(ir) => self.select_run().simulate(ir, &binds, &types),
            _ => Err(Error::configuration(
                "This type of statement generates multiple SQL statements",
                &self.phql,
            )),
        }
    }

    fn select_run(&self) -> SelectRun<'_> {
        SelectRun {
            manager: &self.manager,
            phql: &self.phql,
            shared_lock: self.shared_lock,
        }
    }

    fn select_result(&self, mut resultset: Box<dyn Resultset>) -> Result<QueryResult> {
        if self.unique_row {
            Ok(QueryResult::Row(resultset.first()?))
        } else {
            Ok(QueryResult::Resultset(resultset))
        }
    }

    fn cache_backend(&self, options: &CacheOptions) -> Result<Arc<dyn CacheBackend>> {
        let service = options.service_name();
        self.manager.cache(service).ok_or_else(|| {
            Error::configuration(
                format!("Cache service '{service}' is not registered"),
                &self.phql,
            )
        })
    }
}
