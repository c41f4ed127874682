//! Outcome of INSERT, UPDATE and DELETE statements.

use crate::model::{Message, Record};

/// Whether a write statement succeeded, with the record it concerns.
///
/// For INSERT the record is the created one. For a failed bulk UPDATE or
/// DELETE it is the record that was rejected; its messages say why.
#[derive(Debug, Clone)]
pub struct Status {
    success: bool,
    record: Option<Record>,
}

impl Status {
    pub fn new(success: bool, record: Option<Record>) -> Self {
        Self { success, record }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<Record> {
        self.record
    }

    /// Messages of the record, empty when there is none.
    pub fn messages(&self) -> &[Message] {
        self.record.as_ref().map(Record::messages).unwrap_or_default()
    }
}
