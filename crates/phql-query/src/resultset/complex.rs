use super::{
    fields_json, HydrateMode, Hydrated, Resultset, ResultsetCore, Snapshot, SnapshotColumn,
    SnapshotShape,
};
use crate::manager::Manager;
use crate::model::{Model, Record};
use indexmap::IndexMap;
use phql_core::metadata::DataType;
use phql_core::row::Row;
use phql_core::value::Value;
use phql_core::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One output column of a complex row.
#[derive(Clone)]
pub enum ComplexColumn {
    /// A whole model, read from the `_{domain}_{column}` aliases of the row
    Object {
        key: String,
        model: Arc<dyn Model>,
        domain: String,
        columns: Vec<String>,
        column_map: Option<IndexMap<String, String>>,
        data_types: Option<IndexMap<String, DataType>>,
        keep_snapshots: bool,
        /// Domain of the record this one is eagerly loaded into
        eager_parent: Option<String>,
    },
    /// A single value read from `sql_alias`
    Scalar { key: String, sql_alias: String },
}

impl fmt::Debug for ComplexColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplexColumn::Object {
                key,
                model,
                domain,
                eager_parent,
                ..
            } => f
                .debug_struct("Object")
                .field("key", key)
                .field("model", &model.name())
                .field("domain", domain)
                .field("eager_parent", eager_parent)
                .finish_non_exhaustive(),
            ComplexColumn::Scalar { key, sql_alias } => f
                .debug_struct("Scalar")
                .field("key", key)
                .field("sql_alias", sql_alias)
                .finish(),
        }
    }
}

impl ComplexColumn {
    /// A model column, loading the metadata it needs to hydrate.
    pub fn object(
        manager: &Manager,
        key: impl Into<String>,
        model: Arc<dyn Model>,
        domain: impl Into<String>,
        eager_parent: Option<String>,
    ) -> Result<Self> {
        let settings = manager.settings();
        let metadata = manager.metadata();
        let columns = metadata.attributes(model.name())?;
        let column_map = if settings.column_renaming {
            metadata.column_map(model.name())?
        } else {
            None
        };
        let data_types = if settings.cast_on_hydrate {
            Some(metadata.data_types(model.name())?)
        } else {
            None
        };
        Ok(ComplexColumn::Object {
            key: key.into(),
            keep_snapshots: manager.is_keeping_snapshots(model.name()),
            model,
            domain: domain.into(),
            columns,
            column_map,
            data_types,
            eager_parent,
        })
    }

    pub fn scalar(key: impl Into<String>, sql_alias: impl Into<String>) -> Self {
        ComplexColumn::Scalar {
            key: key.into(),
            sql_alias: sql_alias.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ComplexColumn::Object { key, .. } | ComplexColumn::Scalar { key, .. } => key,
        }
    }

    fn describe(&self) -> SnapshotColumn {
        match self {
            ComplexColumn::Object {
                key,
                model,
                domain,
                eager_parent,
                ..
            } => SnapshotColumn::Object {
                key: key.clone(),
                model: model.name().to_string(),
                domain: domain.clone(),
                eager_parent: eager_parent.clone(),
            },
            ComplexColumn::Scalar { key, sql_alias } => SnapshotColumn::Scalar {
                key: key.clone(),
                sql_alias: sql_alias.clone(),
            },
        }
    }
}

/// Result set of a query mixing models and scalars, or selecting several
/// models. Each row hydrates into a [`Hydrated::Composite`].
pub struct Complex {
    core: ResultsetCore,
    manager: Manager,
    columns: Vec<ComplexColumn>,
}

impl fmt::Debug for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Complex")
            .field("core", &self.core)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl Complex {
    pub fn new(manager: &Manager, columns: Vec<ComplexColumn>, core: ResultsetCore) -> Self {
        Self {
            core,
            manager: manager.clone(),
            columns,
        }
    }

    pub(crate) fn from_snapshot(
        manager: &Manager,
        columns: &[SnapshotColumn],
        core: ResultsetCore,
    ) -> Result<Self> {
        let mut resolved = Vec::with_capacity(columns.len());
        for column in columns {
            resolved.push(match column {
                SnapshotColumn::Object {
                    key,
                    model,
                    domain,
                    eager_parent,
                } => ComplexColumn::object(
                    manager,
                    key,
                    manager.load(model)?,
                    domain,
                    eager_parent.clone(),
                )?,
                SnapshotColumn::Scalar { key, sql_alias } => ComplexColumn::scalar(key, sql_alias),
            });
        }
        Ok(Self::new(manager, resolved, core))
    }

    pub fn columns(&self) -> &[ComplexColumn] {
        &self.columns
    }
}

impl Resultset for Complex {
    fn core(&self) -> &ResultsetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResultsetCore {
        &mut self.core
    }

    fn hydrate(&self, row: Row, mode: HydrateMode) -> Result<Hydrated> {
        let mut members: IndexMap<String, Hydrated> = IndexMap::with_capacity(self.columns.len());
        let mut domains: HashMap<&str, &str> = HashMap::new();
        let mut eager = Vec::new();

        for column in &self.columns {
            match column {
                ComplexColumn::Object {
                    key,
                    model,
                    domain,
                    columns,
                    column_map,
                    data_types,
                    keep_snapshots,
                    eager_parent,
                } => {
                    let mut fields = IndexMap::with_capacity(columns.len());
                    for name in columns {
                        let value = row
                            .get_by_name(&format!("_{domain}_{name}"))
                            .cloned()
                            .unwrap_or(Value::Null);
                        let value = match data_types.as_ref().and_then(|types| types.get(name)) {
                            Some(data_type) => value.cast(*data_type),
                            None => value,
                        };
                        let attribute = column_map
                            .as_ref()
                            .and_then(|map| map.get(name))
                            .unwrap_or(name);
                        fields.insert(attribute.clone(), value);
                    }
                    let item = match mode {
                        HydrateMode::Records => Hydrated::Record(Record::hydrated(
                            &self.manager,
                            Arc::clone(model),
                            fields,
                            *keep_snapshots,
                        )),
                        HydrateMode::Arrays => Hydrated::Array(fields),
                        HydrateMode::Objects => Hydrated::Object(fields_json(&fields)),
                    };
                    match eager_parent {
                        Some(parent) => eager.push((parent.as_str(), key.as_str(), item)),
                        None => {
                            domains.insert(domain.as_str(), key.as_str());
                            members.insert(key.clone(), item);
                        }
                    }
                }
                ComplexColumn::Scalar { key, sql_alias } => {
                    let value = row.get_by_name(sql_alias).cloned().unwrap_or(Value::Null);
                    members.insert(key.clone(), Hydrated::Value(value));
                }
            }
        }

        for (parent, key, item) in eager {
            let owner = domains
                .get(parent)
                .and_then(|owner| members.get_mut(*owner));
            match owner {
                Some(owner) => attach(owner, key, item),
                None => {
                    members.insert(key.to_string(), item);
                }
            }
        }

        Ok(match mode {
            HydrateMode::Objects => Hydrated::Object(serde_json::Value::Object(
                members
                    .into_iter()
                    .map(|(key, member)| (key, member.to_json()))
                    .collect(),
            )),
            HydrateMode::Records | HydrateMode::Arrays => Hydrated::Composite(members),
        })
    }

    fn freeze(&mut self) -> Result<Snapshot> {
        let shape = SnapshotShape::Complex {
            columns: self.columns.iter().map(ComplexColumn::describe).collect(),
        };
        let mode = self.core.hydrate_mode;
        let rows = self.core.rows()?;
        Ok(Snapshot::capture(shape, mode, rows))
    }
}

/// Add an eagerly loaded record to the related list of its owner.
fn attach(owner: &mut Hydrated, key: &str, item: Hydrated) {
    match (owner, item) {
        (Hydrated::Record(owner), Hydrated::Record(related)) => owner.push_related(key, related),
        (Hydrated::Array(fields), item) => {
            let entry = fields
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                items.push(Value::Json(item.to_json()));
            }
        }
        (Hydrated::Object(serde_json::Value::Object(object)), item) => {
            let entry = object
                .entry(key.to_string())
                .or_insert_with(|| serde_json::Value::Array(Vec::new()));
            if let serde_json::Value::Array(items) = entry {
                items.push(item.to_json());
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::robots_manager;

    fn columns(manager: &Manager) -> Vec<ComplexColumn> {
        vec![
            ComplexColumn::object(
                manager,
                "robots",
                manager.load("Robots").unwrap(),
                "robots",
                None,
            )
            .unwrap(),
            ComplexColumn::scalar("total", "total"),
        ]
    }

    fn row() -> Row {
        Row::from_pairs([
            ("_robots_id", Value::BigInt(1)),
            ("_robots_name", Value::from("Astro")),
            ("_robots_type", Value::from("mechanical")),
            ("_robots_year", Value::BigInt(1952)),
            ("_robots_price", Value::Null),
            ("total", Value::BigInt(3)),
        ])
    }

    #[test]
    fn test_composite_rows() {
        let (manager, _) = robots_manager();
        let mut resultset = Complex::new(
            &manager,
            columns(&manager),
            ResultsetCore::from_rows(vec![row()]),
        );
        let item = resultset.first().unwrap().unwrap();
        let robot = item.component("robots").and_then(Hydrated::as_record).unwrap();
        assert_eq!(robot.get("name"), Some(&Value::from("Astro")));
        assert_eq!(robot.get("year"), Some(&Value::BigInt(1952)));
        assert_eq!(item.get("total"), Some(Value::BigInt(3)));
    }

    #[test]
    fn test_objects_mode() {
        let (manager, _) = robots_manager();
        let mut resultset = Complex::new(
            &manager,
            columns(&manager),
            ResultsetCore::from_rows(vec![row()]).hydrate_mode(HydrateMode::Objects),
        );
        let json = resultset.to_json().unwrap();
        assert_eq!(json[0]["robots"]["name"], "Astro");
        assert_eq!(json[0]["total"], 3);
    }

    #[test]
    fn test_eager_records_attach_to_owner() {
        let (manager, _) = robots_manager();
        let mut columns = columns(&manager);
        columns.push(
            ComplexColumn::object(
                &manager,
                "robotsParts",
                manager.load("RobotsParts").unwrap(),
                "AA0",
                Some("robots".into()),
            )
            .unwrap(),
        );
        let mut pairs: Vec<(String, Value)> = row()
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        pairs.push(("_AA0_id".into(), Value::BigInt(10)));
        pairs.push(("_AA0_robots_id".into(), Value::BigInt(1)));
        pairs.push(("_AA0_parts_id".into(), Value::BigInt(5)));
        let row = Row::from_pairs(pairs);

        let mut resultset = Complex::new(&manager, columns, ResultsetCore::from_rows(vec![row]));
        let item = resultset.first().unwrap().unwrap();
        assert!(item.component("robotsParts").is_none());
        let robot = item.component("robots").and_then(Hydrated::as_record).unwrap();
        let parts = robot.related("robotsParts").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].get("parts_id"), Some(&Value::BigInt(5)));
    }
}
