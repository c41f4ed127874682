//! The models manager.
//!
//! [`Manager`] is the registry every query resolves against: models, their
//! relations, namespace aliases, connections, cache services and the shared
//! IR cache. It is a cheap handle; clones share the same registry.

use crate::builder::{Builder, Params};
use crate::cache::{CacheBackend, IrCache, Prepared};
use crate::lang::{Parser, PhqlParser};
use crate::model::{Model, Record};
use crate::query::{Query, QueryResult};
use crate::resultset::Hydrated;
use crate::settings::Settings;
use phql_core::bind::{BindTypes, Binds};
use phql_core::connection::Connection;
use phql_core::error::{Error, QueryError, QueryErrorKind};
use phql_core::ir::Intermediate;
use phql_core::metadata::MetaData;
use phql_core::relation::{Keys, Relation, RelationKind, RelationOptions, Through};
use phql_core::value::Value;
use phql_core::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

type PairKey = (String, String);

#[derive(Default)]
struct RelationRegistry {
    belongs_to: HashMap<PairKey, Vec<Arc<Relation>>>,
    has_one: HashMap<PairKey, Vec<Arc<Relation>>>,
    has_many: HashMap<PairKey, Vec<Arc<Relation>>>,
    has_one_through: HashMap<PairKey, Vec<Arc<Relation>>>,
    has_many_through: HashMap<PairKey, Vec<Arc<Relation>>>,
    aliases: HashMap<PairKey, Arc<Relation>>,
    by_model: HashMap<String, Vec<Arc<Relation>>>,
}

impl RelationRegistry {
    fn bucket_mut(&mut self, kind: RelationKind) -> &mut HashMap<PairKey, Vec<Arc<Relation>>> {
        match kind {
            RelationKind::BelongsTo => &mut self.belongs_to,
            RelationKind::HasOne => &mut self.has_one,
            RelationKind::HasMany => &mut self.has_many,
            RelationKind::HasOneThrough => &mut self.has_one_through,
            RelationKind::HasManyThrough => &mut self.has_many_through,
        }
    }

    fn add(&mut self, relation: Relation) -> Arc<Relation> {
        let relation = Arc::new(relation);
        let model = relation.model().to_lowercase();
        let key = (model.clone(), relation.referenced_model().to_lowercase());
        self.bucket_mut(relation.kind())
            .entry(key)
            .or_default()
            .push(Arc::clone(&relation));
        self.aliases.insert(
            (model.clone(), relation.alias().to_lowercase()),
            Arc::clone(&relation),
        );
        self.by_model
            .entry(model)
            .or_default()
            .push(Arc::clone(&relation));
        relation
    }

    fn between(&self, model: &str, referenced: &str) -> Vec<Arc<Relation>> {
        let key = (model.to_lowercase(), referenced.to_lowercase());
        [
            &self.belongs_to,
            &self.has_many,
            &self.has_one,
            &self.has_one_through,
            &self.has_many_through,
        ]
        .into_iter()
        .filter_map(|bucket| bucket.get(&key))
        .flatten()
        .cloned()
        .collect()
    }
}

struct Inner {
    metadata: Arc<dyn MetaData>,
    parser: Arc<dyn PhqlParser>,
    settings: Settings,
    models: RwLock<HashMap<String, Arc<dyn Model>>>,
    default_connection: RwLock<Option<Arc<dyn Connection>>>,
    read_connections: RwLock<HashMap<String, Arc<dyn Connection>>>,
    write_connections: RwLock<HashMap<String, Arc<dyn Connection>>>,
    relations: RwLock<RelationRegistry>,
    namespaces: RwLock<HashMap<String, String>>,
    snapshots: RwLock<HashSet<String>>,
    caches: RwLock<HashMap<String, Arc<dyn CacheBackend>>>,
    ir_cache: Mutex<IrCache>,
}

/// Registry of models, relations and services shared by all queries.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Manager`].
#[derive(Default)]
pub struct ManagerBuilder {
    metadata: Option<Arc<dyn MetaData>>,
    parser: Option<Arc<dyn PhqlParser>>,
    settings: Settings,
    connection: Option<Arc<dyn Connection>>,
    caches: Vec<(String, Arc<dyn CacheBackend>)>,
}

impl ManagerBuilder {
    pub fn metadata(mut self, metadata: Arc<dyn MetaData>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn PhqlParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Connection used by models without a dedicated one.
    pub fn connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn cache(mut self, name: impl Into<String>, backend: Arc<dyn CacheBackend>) -> Self {
        self.caches.push((name.into(), backend));
        self
    }

    pub fn build(self) -> Result<Manager> {
        let metadata = self
            .metadata
            .ok_or_else(|| Error::config("A meta-data service is required"))?;
        let manager = Manager {
            inner: Arc::new(Inner {
                metadata,
                parser: self.parser.unwrap_or_else(|| Arc::new(Parser)),
                ir_cache: Mutex::new(IrCache::new(self.settings.ir_cache_capacity)),
                settings: self.settings,
                models: RwLock::default(),
                default_connection: RwLock::new(self.connection),
                read_connections: RwLock::default(),
                write_connections: RwLock::default(),
                relations: RwLock::default(),
                namespaces: RwLock::default(),
                snapshots: RwLock::default(),
                caches: RwLock::new(self.caches.into_iter().collect()),
            }),
        };
        Ok(manager)
    }
}

impl Manager {
    /// A manager with default settings and the stock parser.
    pub fn new(metadata: Arc<dyn MetaData>) -> Self {
        let settings = Settings::default();
        Self {
            inner: Arc::new(Inner {
                metadata,
                parser: Arc::new(Parser),
                ir_cache: Mutex::new(IrCache::new(settings.ir_cache_capacity)),
                settings,
                models: RwLock::default(),
                default_connection: RwLock::default(),
                read_connections: RwLock::default(),
                write_connections: RwLock::default(),
                relations: RwLock::default(),
                namespaces: RwLock::default(),
                snapshots: RwLock::default(),
                caches: RwLock::default(),
            }),
        }
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    pub fn metadata(&self) -> &dyn MetaData {
        self.inner.metadata.as_ref()
    }

    pub fn parser(&self) -> &dyn PhqlParser {
        self.inner.parser.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    // ==================== Models ====================

    /// Register a model under its name.
    pub fn register_model(&self, model: impl Model + 'static) -> Arc<dyn Model> {
        self.register_model_arc(Arc::new(model))
    }

    pub fn register_model_arc(&self, model: Arc<dyn Model>) -> Arc<dyn Model> {
        tracing::trace!(model = %model.name(), source = %model.source(), "Registering model");
        let mut models = self.inner.models.write().unwrap_or_else(|e| e.into_inner());
        models.insert(model.name().to_lowercase(), Arc::clone(&model));
        model
    }

    /// Look up a registered model.
    pub fn get_model(&self, name: &str) -> Option<Arc<dyn Model>> {
        let models = self.inner.models.read().unwrap_or_else(|e| e.into_inner());
        models.get(&name.to_lowercase()).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.get_model(name).is_some()
    }

    /// Load a model by name.
    pub fn load(&self, name: &str) -> Result<Arc<dyn Model>> {
        self.get_model(name).ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::Configuration,
                format!("Model '{name}' could not be loaded"),
            ))
        })
    }

    // ==================== Relations ====================

    /// Register a relation built elsewhere.
    pub fn add_relation(&self, relation: Relation) -> Arc<Relation> {
        tracing::trace!(
            kind = relation.kind().as_str(),
            model = %relation.model(),
            referenced = %relation.referenced_model(),
            alias = %relation.alias(),
            "Registering relation"
        );
        let mut registry = self.inner.relations.write().unwrap_or_else(|e| e.into_inner());
        registry.add(relation)
    }

    pub fn add_belongs_to(
        &self,
        model: &str,
        fields: impl Into<Keys>,
        referenced_model: &str,
        referenced_fields: impl Into<Keys>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        let relation = Relation::new(
            RelationKind::BelongsTo,
            model,
            fields,
            referenced_model,
            referenced_fields,
            options,
        )?;
        Ok(self.add_relation(relation))
    }

    pub fn add_has_one(
        &self,
        model: &str,
        fields: impl Into<Keys>,
        referenced_model: &str,
        referenced_fields: impl Into<Keys>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        let relation = Relation::new(
            RelationKind::HasOne,
            model,
            fields,
            referenced_model,
            referenced_fields,
            options,
        )?;
        Ok(self.add_relation(relation))
    }

    pub fn add_has_many(
        &self,
        model: &str,
        fields: impl Into<Keys>,
        referenced_model: &str,
        referenced_fields: impl Into<Keys>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        let relation = Relation::new(
            RelationKind::HasMany,
            model,
            fields,
            referenced_model,
            referenced_fields,
            options,
        )?;
        Ok(self.add_relation(relation))
    }

    pub fn add_has_one_through(
        &self,
        model: &str,
        fields: impl Into<Keys>,
        through: Through,
        referenced_model: &str,
        referenced_fields: impl Into<Keys>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        let relation = Relation::through(
            RelationKind::HasOneThrough,
            model,
            fields,
            through,
            referenced_model,
            referenced_fields,
            options,
        )?;
        Ok(self.add_relation(relation))
    }

    pub fn add_has_many_to_many(
        &self,
        model: &str,
        fields: impl Into<Keys>,
        through: Through,
        referenced_model: &str,
        referenced_fields: impl Into<Keys>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        let relation = Relation::through(
            RelationKind::HasManyThrough,
            model,
            fields,
            through,
            referenced_model,
            referenced_fields,
            options,
        )?;
        Ok(self.add_relation(relation))
    }

    /// The relation registered on `model` under `alias`. Case-insensitive.
    pub fn relation_by_alias(&self, model: &str, alias: &str) -> Option<Arc<Relation>> {
        let registry = self.inner.relations.read().unwrap_or_else(|e| e.into_inner());
        registry
            .aliases
            .get(&(model.to_lowercase(), alias.to_lowercase()))
            .cloned()
    }

    /// Every relation declared from `model` to `referenced`, of any kind.
    pub fn relations_between(&self, model: &str, referenced: &str) -> Vec<Arc<Relation>> {
        let registry = self.inner.relations.read().unwrap_or_else(|e| e.into_inner());
        registry.between(model, referenced)
    }

    /// Every relation declared on `model`, in registration order.
    pub fn relations(&self, model: &str) -> Vec<Arc<Relation>> {
        let registry = self.inner.relations.read().unwrap_or_else(|e| e.into_inner());
        registry
            .by_model
            .get(&model.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Whether `model` declares any relation towards `referenced`.
    pub fn exists_relation(&self, model: &str, referenced: &str) -> bool {
        !self.relations_between(model, referenced).is_empty()
    }

    // ==================== Namespaces ====================

    /// Register `alias` so `alias:Model` resolves to `namespace\Model`.
    pub fn register_namespace_alias(&self, alias: impl Into<String>, namespace: impl Into<String>) {
        let mut namespaces = self.inner.namespaces.write().unwrap_or_else(|e| e.into_inner());
        namespaces.insert(alias.into(), namespace.into());
    }

    pub fn namespace_alias(&self, alias: &str) -> Result<String> {
        let namespaces = self.inner.namespaces.read().unwrap_or_else(|e| e.into_inner());
        namespaces.get(alias).cloned().ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::Configuration,
                format!("Namespace alias '{alias}' is not registered"),
            ))
        })
    }

    // ==================== Snapshots ====================

    pub fn keep_snapshots(&self, model: &str, keep: bool) {
        let mut snapshots = self.inner.snapshots.write().unwrap_or_else(|e| e.into_inner());
        if keep {
            snapshots.insert(model.to_lowercase());
        } else {
            snapshots.remove(&model.to_lowercase());
        }
    }

    pub fn is_keeping_snapshots(&self, model: &str) -> bool {
        let snapshots = self.inner.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.contains(&model.to_lowercase())
    }

    // ==================== Connections ====================

    pub fn set_default_connection(&self, connection: Arc<dyn Connection>) {
        let mut default = self
            .inner
            .default_connection
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *default = Some(connection);
    }

    pub fn set_read_connection(&self, model: &str, connection: Arc<dyn Connection>) {
        let mut map = self.inner.read_connections.write().unwrap_or_else(|e| e.into_inner());
        map.insert(model.to_lowercase(), connection);
    }

    pub fn set_write_connection(&self, model: &str, connection: Arc<dyn Connection>) {
        let mut map = self.inner.write_connections.write().unwrap_or_else(|e| e.into_inner());
        map.insert(model.to_lowercase(), connection);
    }

    /// Connection used to read `model`.
    pub fn read_connection(
        &self,
        model: &dyn Model,
        intermediate: Option<&Intermediate>,
        binds: &Binds,
        types: &BindTypes,
    ) -> Result<Arc<dyn Connection>> {
        if let Some(selector) = model.connection_selector() {
            return selector
                .select_read_connection(intermediate, binds, types)
                .ok_or_else(|| {
                    Error::execution(
                        "The connection selector didn't return a valid read connection",
                        None,
                    )
                });
        }
        self.lookup_connection(&self.inner.read_connections, model.name())
    }

    /// Connection used to write `model`.
    pub fn write_connection(
        &self,
        model: &dyn Model,
        intermediate: Option<&Intermediate>,
        binds: &Binds,
        types: &BindTypes,
    ) -> Result<Arc<dyn Connection>> {
        if let Some(selector) = model.connection_selector() {
            return selector
                .select_write_connection(intermediate, binds, types)
                .ok_or_else(|| {
                    Error::execution(
                        "The connection selector didn't return a valid write connection",
                        None,
                    )
                });
        }
        self.lookup_connection(&self.inner.write_connections, model.name())
    }

    fn lookup_connection(
        &self,
        map: &RwLock<HashMap<String, Arc<dyn Connection>>>,
        model: &str,
    ) -> Result<Arc<dyn Connection>> {
        let dedicated = {
            let map = map.read().unwrap_or_else(|e| e.into_inner());
            map.get(&model.to_lowercase()).cloned()
        };
        if let Some(connection) = dedicated {
            return Ok(connection);
        }
        let default = self
            .inner
            .default_connection
            .read()
            .unwrap_or_else(|e| e.into_inner());
        default.clone().ok_or_else(|| {
            Error::execution(
                format!("No connection is registered for model '{model}'"),
                None,
            )
        })
    }

    // ==================== Caches ====================

    pub fn register_cache(&self, name: impl Into<String>, backend: Arc<dyn CacheBackend>) {
        let mut caches = self.inner.caches.write().unwrap_or_else(|e| e.into_inner());
        caches.insert(name.into(), backend);
    }

    pub fn cache(&self, name: &str) -> Option<Arc<dyn CacheBackend>> {
        let caches = self.inner.caches.read().unwrap_or_else(|e| e.into_inner());
        caches.get(name).cloned()
    }

    pub(crate) fn cached_statement(&self, key: u64) -> Option<Prepared> {
        let mut cache = self.inner.ir_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(key)
    }

    pub(crate) fn store_statement(&self, key: u64, prepared: Prepared) -> Prepared {
        let mut cache = self.inner.ir_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(key, prepared)
    }

    /// Drop every prepared statement.
    pub fn clear_ir_cache(&self) {
        let mut cache = self.inner.ir_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
    }

    /// Number of prepared statements currently cached.
    pub fn ir_cache_len(&self) -> usize {
        let cache = self.inner.ir_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.len()
    }

    // ==================== Queries ====================

    pub fn create_query(&self, phql: impl Into<String>) -> Query {
        Query::new(phql, self)
    }

    /// Prepare and run one PHQL statement.
    pub fn execute_query(
        &self,
        phql: &str,
        binds: &Binds,
        types: &BindTypes,
    ) -> Result<QueryResult> {
        self.create_query(phql).execute(binds, types)
    }

    pub fn create_builder(&self, params: Params) -> Builder {
        Builder::new(params, self)
    }

    /// Fetch the records related to `record` through the relation `alias`.
    pub fn related_records(&self, record: &Record, alias: &str) -> Result<Vec<Record>> {
        let relation = self.relation_by_alias(record.model_name(), alias).ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::Configuration,
                format!(
                    "There is no defined relations for the model '{}' using alias '{}'",
                    record.model_name(),
                    alias
                ),
            ))
        })?;

        let referenced = relation.referenced_model();
        let mut conditions = Vec::new();
        let mut phql = format!("SELECT [{referenced}].* FROM [{referenced}]");
        let mut binds = Binds::new();

        match relation.intermediate() {
            Some(through) => {
                let on: Vec<String> = through
                    .referenced_fields
                    .as_slice()
                    .iter()
                    .zip(relation.referenced_fields())
                    .map(|(middle, target)| {
                        format!("[{}].[{middle}] = [{referenced}].[{target}]", through.model)
                    })
                    .collect();
                phql.push_str(&format!(
                    " INNER JOIN [{}] ON {}",
                    through.model,
                    on.join(" AND ")
                ));
                for (i, (field, middle)) in relation
                    .fields()
                    .iter()
                    .zip(through.fields.as_slice())
                    .enumerate()
                {
                    conditions.push(format!("[{}].[{middle}] = :APR{i}:", through.model));
                    binds.insert(format!("APR{i}"), related_value(record, field));
                }
            }
            None => {
                for (i, (field, target)) in relation
                    .fields()
                    .iter()
                    .zip(relation.referenced_fields())
                    .enumerate()
                {
                    conditions.push(format!("[{referenced}].[{target}] = :APR{i}:"));
                    binds.insert(format!("APR{i}"), related_value(record, field));
                }
            }
        }
        if let Some(params) = relation.params() {
            conditions.push(format!("({params})"));
        }
        phql.push_str(" WHERE ");
        phql.push_str(&conditions.join(" AND "));

        tracing::debug!(model = %record.model_name(), alias = %alias, phql = %phql, "Fetching related records");
        let mut resultset = self
            .execute_query(&phql, &binds, &BindTypes::new())?
            .into_resultset()?;
        let mut records = Vec::new();
        for item in resultset.to_array()? {
            if let Hydrated::Record(related) = item {
                records.push(related);
            }
        }
        Ok(records)
    }
}

fn related_value(record: &Record, field: &str) -> Value {
    record.get(field).cloned().unwrap_or(Value::Null)
}
