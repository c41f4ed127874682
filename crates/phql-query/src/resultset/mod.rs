//! Result sets returned by SELECT statements.
//!
//! A result set walks the rows of a cursor and hydrates each one on demand.
//! [`Simple`] yields one record (or plain row) per row, [`Complex`] yields a
//! composite of several records and scalar values.

mod complex;
mod simple;
mod snapshot;

pub use complex::{Complex, ComplexColumn};
pub use simple::Simple;
pub use snapshot::{Snapshot, SnapshotColumn, SnapshotShape};

use crate::exec::mutate::{mutate_records, MutationOutcome};
use crate::model::{Message, Record};
use indexmap::IndexMap;
use phql_core::connection::Cursor;
use phql_core::error::Error;
use phql_core::row::Row;
use phql_core::value::Value;
use phql_core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape each row is hydrated into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrateMode {
    /// Model records (plain rows when no model applies)
    #[default]
    Records,
    /// Ordered maps of attribute values
    Arrays,
    /// JSON objects
    Objects,
}

/// One hydrated row.
#[derive(Debug, Clone)]
pub enum Hydrated {
    Record(Record),
    Row(Row),
    /// Records and scalars of a complex row, keyed by column
    Composite(IndexMap<String, Hydrated>),
    Array(IndexMap<String, Value>),
    Object(serde_json::Value),
    Value(Value),
}

impl Hydrated {
    /// Whether the item is an array or an object rather than a scalar.
    pub fn is_structured(&self) -> bool {
        match self {
            Hydrated::Value(_) => false,
            Hydrated::Object(json) => json.is_object() || json.is_array(),
            _ => true,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Hydrated::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Hydrated::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Hydrated::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Hydrated::Value(value) => Some(value),
            _ => None,
        }
    }

    /// A member of a composite row.
    pub fn component(&self, key: &str) -> Option<&Hydrated> {
        match self {
            Hydrated::Composite(members) => members.get(key),
            _ => None,
        }
    }

    /// A field by name, whatever the shape.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Hydrated::Record(record) => record.get(name).cloned(),
            Hydrated::Row(row) => row.get_by_name(name).cloned(),
            Hydrated::Composite(members) => members.get(name).map(|member| match member {
                Hydrated::Value(value) => value.clone(),
                other => Value::Json(other.to_json()),
            }),
            Hydrated::Array(fields) => fields.get(name).cloned(),
            Hydrated::Object(object) => object.get(name).cloned().map(Value::from),
            Hydrated::Value(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Hydrated::Record(record) => record.to_json(),
            Hydrated::Row(row) => row.to_json(),
            Hydrated::Composite(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(key, member)| (key.clone(), member.to_json()))
                    .collect(),
            ),
            Hydrated::Array(fields) => fields_json(fields),
            Hydrated::Object(object) => object.clone(),
            Hydrated::Value(value) => value.to_json(),
        }
    }
}

pub(crate) fn fields_json(fields: &IndexMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

enum Source {
    Rows(Vec<Row>),
    Cursor(Box<dyn Cursor>),
}

/// Cursor state shared by every result set.
///
/// Small results are fetched eagerly into memory. Larger ones keep the
/// cursor and fetch rows as the pointer moves, seeking back when needed.
pub struct ResultsetCore {
    source: Source,
    count: usize,
    pointer: usize,
    row: Option<Row>,
    row_position: Option<usize>,
    cursor_position: usize,
    hydrate_mode: HydrateMode,
    fresh: bool,
    messages: Vec<Message>,
}

impl fmt::Debug for ResultsetCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultsetCore")
            .field("count", &self.count)
            .field("pointer", &self.pointer)
            .field("hydrate_mode", &self.hydrate_mode)
            .field("fresh", &self.fresh)
            .finish_non_exhaustive()
    }
}

impl ResultsetCore {
    /// Wrap the cursor of a query. A missing cursor is an empty result.
    pub fn from_cursor(cursor: Option<Box<dyn Cursor>>, eager_threshold: usize) -> Self {
        match cursor {
            None => Self::from_rows(Vec::new()),
            Some(mut cursor) if cursor.num_rows() <= eager_threshold => {
                Self::from_rows(cursor.fetch_all())
            }
            Some(cursor) => {
                let count = cursor.num_rows();
                Self::with_source(Source::Cursor(cursor), count)
            }
        }
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        let count = rows.len();
        Self::with_source(Source::Rows(rows), count)
    }

    fn with_source(source: Source, count: usize) -> Self {
        Self {
            source,
            count,
            pointer: 0,
            row: None,
            row_position: None,
            cursor_position: 0,
            hydrate_mode: HydrateMode::default(),
            fresh: true,
            messages: Vec::new(),
        }
    }

    pub fn hydrate_mode(mut self, mode: HydrateMode) -> Self {
        self.hydrate_mode = mode;
        self
    }

    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The row at `position`, moving the cursor as needed.
    fn load(&mut self, position: usize) -> Result<Option<Row>> {
        if position >= self.count {
            return Ok(None);
        }
        if self.row_position == Some(position) {
            return Ok(self.row.clone());
        }
        let row = match &mut self.source {
            Source::Rows(rows) => rows.get(position).cloned(),
            Source::Cursor(cursor) => {
                if position < self.cursor_position {
                    cursor.data_seek(position)?;
                    self.cursor_position = position;
                }
                let mut row = None;
                while self.cursor_position <= position {
                    row = cursor.fetch();
                    self.cursor_position += 1;
                    if row.is_none() {
                        break;
                    }
                }
                row
            }
        };
        self.row.clone_from(&row);
        self.row_position = Some(position);
        Ok(row)
    }

    /// Every row, switching a cursor-backed result to memory.
    pub(crate) fn rows(&mut self) -> Result<Vec<Row>> {
        let rows = match &mut self.source {
            Source::Rows(rows) => return Ok(rows.clone()),
            Source::Cursor(cursor) => {
                cursor.data_seek(0)?;
                cursor.fetch_all()
            }
        };
        self.cursor_position = rows.len();
        self.source = Source::Rows(rows.clone());
        Ok(rows)
    }
}

/// A navigable, read-only sequence of hydrated rows.
pub trait Resultset: Send {
    fn core(&self) -> &ResultsetCore;

    fn core_mut(&mut self) -> &mut ResultsetCore;

    /// Build the value of one row in `mode`.
    fn hydrate(&self, row: Row, mode: HydrateMode) -> Result<Hydrated>;

    /// Capture the rows and their shape so they can be cached.
    fn freeze(&mut self) -> Result<Snapshot>;

    fn count(&self) -> usize {
        self.core().count
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Position of the pointer, `None` past the end.
    fn key(&self) -> Option<usize> {
        self.valid().then_some(self.core().pointer)
    }

    fn valid(&self) -> bool {
        self.core().pointer < self.core().count
    }

    fn next(&mut self) {
        self.core_mut().pointer += 1;
    }

    fn rewind(&mut self) {
        self.core_mut().pointer = 0;
    }

    /// Move the pointer to `position`.
    fn seek(&mut self, position: usize) -> Result<()> {
        let core = self.core_mut();
        core.load(position)?;
        core.pointer = position;
        Ok(())
    }

    /// The row under the pointer.
    fn current(&mut self) -> Result<Option<Hydrated>> {
        if !self.valid() {
            return Ok(None);
        }
        let core = self.core_mut();
        let (pointer, mode) = (core.pointer, core.hydrate_mode);
        match core.load(pointer)? {
            Some(row) => self.hydrate(row, mode).map(Some),
            None => Ok(None),
        }
    }

    fn get(&mut self, index: usize) -> Result<Hydrated> {
        if index >= self.count() {
            return Err(Error::execution("The index does not exist in the cursor", None));
        }
        self.seek(index)?;
        self.current()?
            .ok_or_else(|| Error::execution("The index does not exist in the cursor", None))
    }

    fn offset_exists(&self, index: usize) -> bool {
        index < self.count()
    }

    fn offset_set(&mut self, _index: usize, _value: Hydrated) -> Result<()> {
        Err(Error::execution("Cursor is an immutable ArrayAccess object", None))
    }

    fn offset_unset(&mut self, _index: usize) -> Result<()> {
        Err(Error::execution("Cursor is an immutable ArrayAccess object", None))
    }

    fn first(&mut self) -> Result<Option<Hydrated>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.seek(0)?;
        self.current()
    }

    fn last(&mut self) -> Result<Option<Hydrated>> {
        let count = self.count();
        if count == 0 {
            return Ok(None);
        }
        self.seek(count - 1)?;
        self.current()
    }

    /// Every row hydrated in the current mode.
    fn to_array(&mut self) -> Result<Vec<Hydrated>> {
        let mut items = Vec::with_capacity(self.count());
        self.rewind();
        while self.valid() {
            if let Some(item) = self.current()? {
                items.push(item);
            }
            self.next();
        }
        self.rewind();
        Ok(items)
    }

    fn to_json(&mut self) -> Result<serde_json::Value> {
        let items = self.to_array()?;
        Ok(serde_json::Value::Array(
            items.iter().map(Hydrated::to_json).collect(),
        ))
    }

    /// Map every row through `filter`, keeping the arrays and objects it
    /// returns. Scalars are dropped.
    fn filter(
        &mut self,
        filter: &mut dyn FnMut(Hydrated) -> Option<Hydrated>,
    ) -> Result<Vec<Hydrated>> {
        Ok(self
            .to_array()?
            .into_iter()
            .filter_map(filter)
            .filter(Hydrated::is_structured)
            .collect())
    }

    /// The rows as records, whatever the hydration mode.
    fn records(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(self.count());
        for position in 0..self.count() {
            let Some(row) = self.core_mut().load(position)? else {
                break;
            };
            match self.hydrate(row, HydrateMode::Records)? {
                Hydrated::Record(record) => records.push(record),
                _ => {
                    return Err(Error::execution(
                        "Only result sets of records can be modified",
                        None,
                    ));
                }
            }
        }
        Ok(records)
    }

    /// Assign `data` to every record accepted by `predicate` and update them
    /// in one transaction. Returns `false` with messages if one fails.
    fn update(
        &mut self,
        data: &IndexMap<String, Value>,
        predicate: Option<&mut dyn FnMut(&Record) -> bool>,
    ) -> Result<bool> {
        let records = self.records()?;
        let outcome = mutate_records(
            records,
            &mut |record| {
                record.assign(data);
                record.update()
            },
            predicate,
        )?;
        Ok(self.settle(outcome))
    }

    /// Delete every record accepted by `predicate` in one transaction.
    fn delete(&mut self, predicate: Option<&mut dyn FnMut(&Record) -> bool>) -> Result<bool> {
        let records = self.records()?;
        let outcome = mutate_records(records, &mut |record| record.delete(), predicate)?;
        Ok(self.settle(outcome))
    }

    #[doc(hidden)]
    fn settle(&mut self, outcome: MutationOutcome) -> bool {
        match outcome {
            MutationOutcome::Failed(record) => {
                self.core_mut().messages = record.messages().to_vec();
                false
            }
            MutationOutcome::Empty | MutationOutcome::Committed => true,
        }
    }

    /// Messages left by the last failed update or delete.
    fn messages(&self) -> &[Message] {
        &self.core().messages
    }

    /// Whether the rows come from the database rather than a result cache.
    fn is_fresh(&self) -> bool {
        self.core().fresh
    }

    fn hydrate_mode(&self) -> HydrateMode {
        self.core().hydrate_mode
    }

    fn set_hydrate_mode(&mut self, mode: HydrateMode) {
        self.core_mut().hydrate_mode = mode;
    }
}
