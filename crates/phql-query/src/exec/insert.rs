use super::write_value;
use crate::manager::Manager;
use crate::model::Record;
use crate::status::Status;
use phql_core::bind::{BindTypes, Binds};
use phql_core::error::Error;
use phql_core::ir::{InsertIr, Intermediate};
use phql_core::Result;

/// Run an INSERT by creating one record, so model validation applies.
#[tracing::instrument(level = "debug", skip_all, fields(model = %ir.model))]
pub(crate) fn execute_insert(
    manager: &Manager,
    ir: &InsertIr,
    binds: &Binds,
    types: &BindTypes,
    phql: &str,
) -> Result<Status> {
    let model = manager.load(&ir.model)?;
    let intermediate = Intermediate::Insert(ir.clone());
    let connection = manager.write_connection(model.as_ref(), Some(&intermediate), binds, types)?;
    let metadata = manager.metadata();

    // Without a field list values follow the storage columns, which are then
    // renamed to attributes.
    let (fields, automatic) = match &ir.fields {
        Some(fields) => (fields.clone(), false),
        None => (metadata.attributes(&ir.model)?, true),
    };
    if fields.len() != ir.values.len() {
        return Err(Error::execution(
            "The column count does not match the values count",
            Some(phql),
        ));
    }
    let column_map = if automatic && manager.settings().column_renaming {
        metadata.column_map(&ir.model)?
    } else {
        None
    };

    let mut record = Record::new(manager, model);
    for (field, expr) in fields.iter().zip(&ir.values) {
        let value = write_value(expr, binds, connection.dialect(), phql)?;
        let attribute = match &column_map {
            Some(map) => map.get(field).cloned().ok_or_else(|| {
                Error::execution(
                    format!("Column '{field}' isn't part of the column map"),
                    Some(phql),
                )
            })?,
            None => field.clone(),
        };
        record.set(attribute, value);
    }

    let success = record.create()?;
    tracing::debug!(success, "INSERT executed");
    Ok(Status::new(success, Some(record)))
}
