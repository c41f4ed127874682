use super::{Complex, HydrateMode, Resultset, ResultsetCore, Simple};
use crate::manager::Manager;
use phql_core::row::{ColumnInfo, Row};
use phql_core::value::Value;
use phql_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a snapshot rebuilds into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotShape {
    /// Plain rows of scalar columns
    Rows,
    /// Records of one model
    Records { model: String },
    /// Composite rows
    Complex { columns: Vec<SnapshotColumn> },
}

/// A complex column, by model name instead of a loaded model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotColumn {
    Object {
        key: String,
        model: String,
        domain: String,
        eager_parent: Option<String>,
    },
    Scalar {
        key: String,
        sql_alias: String,
    },
}

/// The rows of a result set with enough shape to rebuild it.
///
/// Stored by result cache services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub shape: SnapshotShape,
    pub hydrate_mode: HydrateMode,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Snapshot {
    /// A snapshot without rows.
    pub fn empty() -> Self {
        Self {
            shape: SnapshotShape::Rows,
            hydrate_mode: HydrateMode::default(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn capture(shape: SnapshotShape, hydrate_mode: HydrateMode, rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.column_info().names().to_vec())
            .unwrap_or_default();
        Self {
            shape,
            hydrate_mode,
            columns,
            rows: rows.into_iter().map(Row::into_values).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rebuild the result set. It is not fresh: its rows came from a cache.
    pub fn thaw(&self, manager: &Manager) -> Result<Box<dyn Resultset>> {
        let columns = Arc::new(ColumnInfo::new(self.columns.clone()));
        let rows = self
            .rows
            .iter()
            .map(|values| Row::with_columns(Arc::clone(&columns), values.clone()))
            .collect();
        let core = ResultsetCore::from_rows(rows)
            .hydrate_mode(self.hydrate_mode)
            .fresh(false);
        Ok(match &self.shape {
            SnapshotShape::Rows => Box::new(Simple::rows(manager, core)),
            SnapshotShape::Records { model } => {
                Simple::records(manager, manager.load(model)?, core)?.boxed()
            }
            SnapshotShape::Complex { columns } => {
                Box::new(Complex::from_snapshot(manager, columns, core)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::robots_manager;

    fn snapshot() -> Snapshot {
        Snapshot {
            shape: SnapshotShape::Records {
                model: "Robots".into(),
            },
            hydrate_mode: HydrateMode::Records,
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![Value::BigInt(1), Value::from("Astro")],
                vec![Value::BigInt(2), Value::from("Robotina")],
            ],
        }
    }

    #[test]
    fn test_thawed_resultset_is_not_fresh() {
        let (manager, _) = robots_manager();
        let mut resultset = snapshot().thaw(&manager).unwrap();
        assert!(!resultset.is_fresh());
        assert_eq!(resultset.count(), 2);
        let record = resultset.get(1).unwrap().into_record().unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Robotina")));
    }

    #[test]
    fn test_serde_round_trip() {
        let snapshot = snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_unknown_model_fails_to_thaw() {
        let (manager, _) = robots_manager();
        let mut snapshot = snapshot();
        snapshot.shape = SnapshotShape::Records {
            model: "Boats".into(),
        };
        assert!(snapshot.thaw(&manager).is_err());
    }
}
