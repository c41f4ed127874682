use super::select::SelectRun;
use super::write_value;
use crate::manager::Manager;
use crate::model::Record;
use crate::resolve::lcfirst;
use crate::status::Status;
use indexmap::IndexMap;
use phql_core::bind::{BindTypes, Binds};
use phql_core::connection::Connection;
use phql_core::error::Error;
use phql_core::ir::{
    ColumnIr, DeleteIr, Intermediate, IrExpr, LimitIr, SelectIr, TableRef, UpdateIr,
};
use phql_core::Result;
use std::sync::Arc;

/// How a bulk modification ended.
#[derive(Debug)]
pub(crate) enum MutationOutcome {
    /// No record was accepted, nothing was written
    Empty,
    Committed,
    /// The record whose update or delete returned `false`; rolled back
    Failed(Record),
}

/// Apply `apply` to every record accepted by `predicate` inside one
/// transaction on the write connection of the first record.
pub(crate) fn mutate_records(
    records: Vec<Record>,
    apply: &mut dyn FnMut(&mut Record) -> Result<bool>,
    mut predicate: Option<&mut dyn FnMut(&Record) -> bool>,
) -> Result<MutationOutcome> {
    let mut transaction: Option<Arc<dyn Connection>> = None;
    for mut record in records {
        if let Some(predicate) = predicate.as_deref_mut() {
            if !predicate(&record) {
                continue;
            }
        }
        if transaction.is_none() {
            let connection = record.write_connection()?;
            connection.begin()?;
            transaction = Some(connection);
        }
        match apply(&mut record) {
            Ok(true) => {}
            Ok(false) => {
                rollback(transaction.as_deref());
                return Ok(MutationOutcome::Failed(record));
            }
            Err(err) => {
                rollback(transaction.as_deref());
                return Err(err);
            }
        }
    }
    match transaction {
        Some(connection) => {
            connection.commit()?;
            Ok(MutationOutcome::Committed)
        }
        None => Ok(MutationOutcome::Empty),
    }
}

fn rollback(connection: Option<&dyn Connection>) {
    if let Some(connection) = connection {
        if let Err(err) = connection.rollback() {
            tracing::warn!(error = %err, "Rollback failed");
        }
    }
}

/// Run an UPDATE: select the matching records, assign the new values and
/// update each one.
#[tracing::instrument(level = "debug", skip_all, fields(phql = %phql))]
pub(crate) fn execute_update(
    manager: &Manager,
    ir: &UpdateIr,
    binds: &Binds,
    types: &BindTypes,
    phql: &str,
) -> Result<Status> {
    let (model_name, table) = single_model(&ir.models, &ir.tables, phql, "Updating")?;
    let model = manager.load(model_name)?;
    let intermediate = Intermediate::Update(ir.clone());
    let connection = manager.write_connection(model.as_ref(), Some(&intermediate), binds, types)?;
    let column_map = if manager.settings().column_renaming {
        manager.metadata().column_map(model_name)?
    } else {
        None
    };

    let mut values = IndexMap::with_capacity(ir.assignments.len());
    let mut select_binds = binds.clone();
    let mut select_types = types.clone();
    for assignment in &ir.assignments {
        let IrExpr::Qualified { name, .. } = &assignment.column else {
            return Err(Error::execution(
                "Only columns can be assigned in an UPDATE",
                Some(phql),
            ));
        };
        let attribute = match &column_map {
            Some(map) => map.get(name).cloned().ok_or_else(|| {
                Error::execution(
                    format!("Column '{name}' isn't part of the column map"),
                    Some(phql),
                )
            })?,
            None => name.clone(),
        };
        let value = write_value(&assignment.value, binds, connection.dialect(), phql)?;
        if let IrExpr::Placeholder { key, .. } = &assignment.value {
            let filtered_on = ir.where_.as_ref().is_some_and(|e| e.mentions(key))
                || ir.limit.as_ref().is_some_and(|l| l.mentions(key));
            if !filtered_on {
                select_binds.remove(key);
                select_types.remove(key);
            }
        }
        values.insert(attribute, value);
    }

    let records = related_records(
        manager,
        phql,
        (model_name, table),
        (ir.where_.clone(), ir.limit.clone()),
        &select_binds,
        &select_types,
    )?;
    let outcome = mutate_records(
        records,
        &mut |record| {
            record.assign(&values);
            record.update()
        },
        None,
    )?;
    Ok(status(outcome))
}

/// Run a DELETE: select the matching records and delete each one.
#[tracing::instrument(level = "debug", skip_all, fields(phql = %phql))]
pub(crate) fn execute_delete(
    manager: &Manager,
    ir: &DeleteIr,
    binds: &Binds,
    types: &BindTypes,
    phql: &str,
) -> Result<Status> {
    let (model_name, table) = single_model(&ir.models, &ir.tables, phql, "Delete from")?;
    let records = related_records(
        manager,
        phql,
        (model_name, table),
        (ir.where_.clone(), ir.limit.clone()),
        binds,
        types,
    )?;
    let outcome = mutate_records(records, &mut |record| record.delete(), None)?;
    Ok(status(outcome))
}

fn single_model<'a>(
    models: &'a [String],
    tables: &'a [TableRef],
    phql: &str,
    action: &str,
) -> Result<(&'a str, &'a TableRef)> {
    match (models, tables) {
        ([model], [table]) => Ok((model.as_str(), table)),
        _ => Err(Error::execution(
            format!("{action} several models at the same time is still not supported"),
            Some(phql),
        )),
    }
}

/// The records an UPDATE or DELETE applies to, selected with its own
/// WHERE and LIMIT.
fn related_records(
    manager: &Manager,
    phql: &str,
    (model, table): (&str, &TableRef),
    (where_, limit): (Option<IrExpr>, Option<LimitIr>),
    binds: &Binds,
    types: &BindTypes,
) -> Result<Vec<Record>> {
    let key = lcfirst(model);
    let mut column = ColumnIr::object(model, table.domain());
    column.balias = Some(key.clone());
    let mut columns = IndexMap::new();
    columns.insert(key, column);
    let select = SelectIr {
        models: vec![model.to_string()],
        tables: vec![table.clone()],
        columns,
        where_,
        limit,
        ..SelectIr::default()
    };
    let run = SelectRun {
        manager,
        phql,
        shared_lock: false,
    };
    run.execute(&select, binds, types)?.records()
}

fn status(outcome: MutationOutcome) -> Status {
    match outcome {
        MutationOutcome::Failed(record) => Status::new(false, Some(record)),
        MutationOutcome::Empty | MutationOutcome::Committed => Status::new(true, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::robots_manager;
    use phql_core::value::Value;

    fn robot(manager: &Manager, id: i64, kind: &str) -> Record {
        let model = manager.load("Robots").unwrap();
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Value::BigInt(id));
        fields.insert("name".to_string(), Value::from("Astro"));
        fields.insert("type".to_string(), Value::from(kind));
        Record::hydrated(manager, model, fields, false)
    }

    #[test]
    fn test_all_records_commit_once() {
        let (manager, connection) = robots_manager();
        let records = vec![robot(&manager, 1, "mechanical"), robot(&manager, 2, "virtual")];
        let outcome = mutate_records(records, &mut |record| record.delete(), None).unwrap();
        assert!(matches!(outcome, MutationOutcome::Committed));
        assert_eq!(connection.events(), vec!["begin", "commit"]);
        assert_eq!(connection.executed().len(), 2);
    }

    #[test]
    fn test_rejected_record_rolls_back() {
        let (manager, connection) = robots_manager();
        let records = vec![robot(&manager, 1, "mechanical"), robot(&manager, 2, "protected")];
        let outcome = mutate_records(records, &mut |record| record.delete(), None).unwrap();
        let MutationOutcome::Failed(record) = outcome else {
            panic!("expected a failed record");
        };
        assert_eq!(record.get("id"), Some(&Value::BigInt(2)));
        assert_eq!(
            record.messages()[0].message,
            "Protected robots cannot be deleted"
        );
        assert_eq!(connection.events(), vec!["begin", "rollback"]);
    }

    #[test]
    fn test_predicate_skips_records() {
        let (manager, connection) = robots_manager();
        let records = vec![robot(&manager, 1, "mechanical"), robot(&manager, 2, "protected")];
        let mut keep = |record: &Record| record.get("type") != Some(&Value::from("protected"));
        let outcome =
            mutate_records(records, &mut |record| record.delete(), Some(&mut keep)).unwrap();
        assert!(matches!(outcome, MutationOutcome::Committed));
        assert_eq!(connection.executed().len(), 1);

        let outcome = mutate_records(Vec::new(), &mut |record| record.delete(), None).unwrap();
        assert!(matches!(outcome, MutationOutcome::Empty));
        assert_eq!(connection.events(), vec!["begin", "commit"]);
    }

    #[test]
    fn test_statement_errors_roll_back() {
        let (manager, connection) = robots_manager();
        connection.fail_on("DELETE");
        let records = vec![robot(&manager, 1, "mechanical")];
        assert!(mutate_records(records, &mut |record| record.delete(), None).is_err());
        assert_eq!(connection.events(), vec!["begin", "rollback"]);
    }
}
