use super::{fields_json, HydrateMode, Hydrated, Resultset, ResultsetCore, Snapshot, SnapshotShape};
use crate::manager::Manager;
use crate::model::{Model, Record};
use indexmap::IndexMap;
use phql_core::metadata::DataType;
use phql_core::row::Row;
use phql_core::value::Value;
use phql_core::Result;
use std::fmt;
use std::sync::Arc;

/// Result set of a query selecting one whole model, or only scalars.
///
/// With a model every row becomes a [`Record`] whose attributes are renamed
/// through the column map. Without one rows are returned as fetched.
pub struct Simple {
    core: ResultsetCore,
    manager: Manager,
    model: Option<Arc<dyn Model>>,
    column_map: Option<IndexMap<String, String>>,
    data_types: Option<IndexMap<String, DataType>>,
    keep_snapshots: bool,
}

impl fmt::Debug for Simple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simple")
            .field("core", &self.core)
            .field("model", &self.model.as_ref().map(|model| model.name()))
            .finish_non_exhaustive()
    }
}

impl Simple {
    /// Rows of scalar columns.
    pub fn rows(manager: &Manager, core: ResultsetCore) -> Self {
        Self {
            core,
            manager: manager.clone(),
            model: None,
            column_map: None,
            data_types: None,
            keep_snapshots: false,
        }
    }

    /// Rows of `model`.
    pub fn records(manager: &Manager, model: Arc<dyn Model>, core: ResultsetCore) -> Result<Self> {
        let settings = manager.settings();
        let metadata = manager.metadata();
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
        let keep_snapshots = manager.is_keeping_snapshots(model.name());
        Ok(Self {
            core,
            manager: manager.clone(),
            model: Some(model),
            column_map,
            data_types,
            keep_snapshots,
        })
    }

    pub fn model(&self) -> Option<&Arc<dyn Model>> {
        self.model.as_ref()
    }

    /// Box the result set, letting the model wrap it in its own type.
    pub fn boxed(self) -> Box<dyn Resultset> {
        let custom = self.model.clone();
        match custom.as_deref().and_then(|model| model.custom_resultset()) {
            Some(custom) => custom.wrap(self),
            None => Box::new(self),
        }
    }

    fn fields(&self, row: Row) -> IndexMap<String, Value> {
        let columns = row.column_info();
        let mut fields = IndexMap::with_capacity(row.len());
        for (name, value) in columns.names().iter().zip(row.into_values()) {
            let value = match self.data_types.as_ref().and_then(|types| types.get(name)) {
                Some(data_type) => value.cast(*data_type),
                None => value,
            };
            let attribute = self
                .column_map
                .as_ref()
                .and_then(|map| map.get(name))
                .unwrap_or(name);
            fields.insert(attribute.clone(), value);
        }
        fields
    }
}

impl Resultset for Simple {
    fn core(&self) -> &ResultsetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResultsetCore {
        &mut self.core
    }

    fn hydrate(&self, row: Row, mode: HydrateMode) -> Result<Hydrated> {
        Ok(match (mode, &self.model) {
            (HydrateMode::Records, Some(model)) => Hydrated::Record(Record::hydrated(
                &self.manager,
                Arc::clone(model),
                self.fields(row),
                self.keep_snapshots,
            )),
            (HydrateMode::Records, None) => Hydrated::Row(row),
            (HydrateMode::Arrays, _) => Hydrated::Array(self.fields(row)),
            (HydrateMode::Objects, _) => Hydrated::Object(fields_json(&self.fields(row))),
        })
    }

    fn freeze(&mut self) -> Result<Snapshot> {
        let shape = match &self.model {
            Some(model) => SnapshotShape::Records {
                model: model.name().to_string(),
            },
            None => SnapshotShape::Rows,
        };
        let mode = self.core.hydrate_mode;
        let rows = self.core.rows()?;
        Ok(Snapshot::capture(shape, mode, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::robots_manager;
    use phql_core::metadata::{MemoryMetaData, ModelMeta};
    use crate::model::ModelDefinition;
    use crate::settings::Settings;

    fn robot_rows() -> Vec<Row> {
        vec![
            Row::from_pairs([("id", Value::BigInt(1)), ("name", Value::from("Astro"))]),
            Row::from_pairs([("id", Value::BigInt(2)), ("name", Value::from("Robotina"))]),
        ]
    }

    #[test]
    fn test_records_are_hydrated_per_row() {
        let (manager, _) = robots_manager();
        let model = manager.load("Robots").unwrap();
        let mut resultset =
            Simple::records(&manager, model, ResultsetCore::from_rows(robot_rows())).unwrap();

        assert_eq!(resultset.count(), 2);
        let first = resultset.first().unwrap().unwrap();
        let record = first.as_record().unwrap();
        assert_eq!(record.model_name(), "Robots");
        assert_eq!(record.get("name"), Some(&Value::from("Astro")));

        let last = resultset.last().unwrap().unwrap();
        assert_eq!(last.get("id"), Some(Value::BigInt(2)));
    }

    #[test]
    fn test_iteration_and_bounds() {
        let (manager, _) = robots_manager();
        let mut resultset = Simple::rows(&manager, ResultsetCore::from_rows(robot_rows()));

        let mut names = Vec::new();
        resultset.rewind();
        while resultset.valid() {
            let key = resultset.key().unwrap();
            let row = resultset.current().unwrap().unwrap();
            names.push((key, row.get("name").unwrap()));
            resultset.next();
        }
        assert_eq!(names.len(), 2);
        assert_eq!(names[1], (1, Value::from("Robotina")));
        assert_eq!(resultset.key(), None);
        assert!(resultset.current().unwrap().is_none());

        let err = resultset.get(2).unwrap_err();
        assert_eq!(err.to_string(), "The index does not exist in the cursor");
        assert!(resultset.offset_exists(1));
        assert!(!resultset.offset_exists(2));
        assert!(resultset.offset_unset(0).is_err());
        let err = resultset
            .offset_set(0, Hydrated::Value(Value::Null))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cursor is an immutable ArrayAccess object");
    }

    #[test]
    fn test_renamed_columns_and_casting() {
        let metadata = MemoryMetaData::new().with(
            "Customers",
            ModelMeta::new()
                .primary("cst_id", DataType::Integer)
                .column("cst_name", DataType::Varchar)
                .rename("cst_id", "id")
                .rename("cst_name", "name"),
        );
        let manager = Manager::builder()
            .metadata(Arc::new(metadata))
            .settings(Settings::new().cast_on_hydrate(true))
            .build()
            .unwrap();
        let model = manager.register_model(ModelDefinition::new("Customers", "customers"));
        let rows = vec![Row::from_pairs([
            ("cst_id", Value::from("12")),
            ("cst_name", Value::from("Ana")),
        ])];
        let mut resultset =
            Simple::records(&manager, model, ResultsetCore::from_rows(rows)).unwrap();

        resultset.set_hydrate_mode(HydrateMode::Arrays);
        let Hydrated::Array(fields) = resultset.get(0).unwrap() else {
            panic!("expected an array");
        };
        assert_eq!(fields.get("id"), Some(&Value::BigInt(12)));
        assert_eq!(fields.get("name"), Some(&Value::from("Ana")));

        resultset.set_hydrate_mode(HydrateMode::Objects);
        assert_eq!(
            resultset.to_json().unwrap(),
            serde_json::json!([{"id": 12, "name": "Ana"}])
        );
    }

    #[test]
    fn test_filter_keeps_returned_rows() {
        let (manager, _) = robots_manager();
        let mut resultset = Simple::rows(&manager, ResultsetCore::from_rows(robot_rows()));
        let kept = resultset
            .filter(&mut |item| (item.get("id") == Some(Value::BigInt(2))).then_some(item))
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].get("name"), Some(Value::from("Robotina")));

        let names = resultset
            .filter(&mut |item| item.get("name").map(Hydrated::Value))
            .unwrap();
        assert!(names.is_empty());

        resultset.set_hydrate_mode(HydrateMode::Objects);
        let objects = resultset.filter(&mut |item| Some(item)).unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn test_freeze_keeps_rows_and_shape() {
        let (manager, _) = robots_manager();
        let model = manager.load("Robots").unwrap();
        let mut resultset =
            Simple::records(&manager, model, ResultsetCore::from_rows(robot_rows())).unwrap();
        let snapshot = resultset.freeze().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.shape,
            SnapshotShape::Records {
                model: "Robots".into()
            }
        );
    }
}
