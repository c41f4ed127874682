use crate::manager::Manager;
use crate::model::Model;
use crate::resultset::{Complex, ComplexColumn, Resultset, ResultsetCore, Simple};
use indexmap::IndexMap;
use phql_core::bind::{BindKey, BindType, BindTypes, Binds};
use phql_core::connection::Connection;
use phql_core::error::Error;
use phql_core::ir::{ColumnIr, ColumnKind, Intermediate, IrExpr, SelectIr};
use phql_core::value::Value;
use phql_core::Result;
use std::sync::Arc;

/// SQL generated for a SELECT, with the binds it runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Binds,
    pub bind_types: BindTypes,
}

/// Which result set the rows are hydrated by.
enum Shape {
    Rows,
    Records(Arc<dyn Model>),
    Complex,
}

struct Plan {
    connection: Arc<dyn Connection>,
    statement: SqlStatement,
    shape: Shape,
}

/// Options of one SELECT run.
pub(crate) struct SelectRun<'a> {
    pub manager: &'a Manager,
    pub phql: &'a str,
    pub shared_lock: bool,
}

impl SelectRun<'_> {
    /// The SQL a SELECT would run, without running it.
    pub(crate) fn simulate(&self, ir: &SelectIr, binds: &Binds, types: &BindTypes) -> Result<SqlStatement> {
        Ok(self.plan(ir, binds, types)?.statement)
    }

    /// Run a SELECT and wrap its cursor in a result set.
    #[tracing::instrument(level = "debug", skip_all, fields(phql = %self.phql))]
    pub(crate) fn execute(
        &self,
        ir: &SelectIr,
        binds: &Binds,
        types: &BindTypes,
    ) -> Result<Box<dyn Resultset>> {
        let plan = self.plan(ir, binds, types)?;
        let statement = &plan.statement;
        let cursor = plan
            .connection
            .query(&statement.sql, &statement.binds, &statement.bind_types)?;
        let core = ResultsetCore::from_cursor(cursor, self.manager.settings().eager_threshold);
        tracing::debug!(rows = core.count(), "SELECT executed");

        Ok(match plan.shape {
            Shape::Rows => Box::new(Simple::rows(self.manager, core)),
            Shape::Records(model) => Simple::records(self.manager, model, core)?.boxed(),
            Shape::Complex => {
                let mut columns = Vec::with_capacity(ir.columns.len());
                for (key, column) in &ir.columns {
                    columns.push(match &column.kind {
                        ColumnKind::Object { model, domain } => ComplexColumn::object(
                            self.manager,
                            key,
                            self.load(model)?,
                            domain,
                            column.eager.as_ref().map(|eager| eager.parent.clone()),
                        )?,
                        ColumnKind::Scalar(_) => ComplexColumn::scalar(key, key),
                    });
                }
                Box::new(Complex::new(self.manager, columns, core))
            }
        })
    }

    fn plan(&self, ir: &SelectIr, binds: &Binds, types: &BindTypes) -> Result<Plan> {
        let connection = self.read_connection(ir, binds, types)?;
        let shape = self.shape(ir)?;
        let complex = matches!(shape, Shape::Complex);

        let metadata = self.manager.metadata();
        let mut sql_ir = ir.clone();
        sql_ir.columns = IndexMap::with_capacity(ir.columns.len());
        for (key, column) in &ir.columns {
            match &column.kind {
                ColumnKind::Object { model, domain } => {
                    for name in metadata.attributes(model)? {
                        let expr = IrExpr::qualified(domain.clone(), name.clone());
                        let (key, sql_alias) = if complex {
                            let alias = format!("_{domain}_{name}");
                            (alias.clone(), Some(alias))
                        } else {
                            (name, None)
                        };
                        sql_ir.columns.insert(
                            key,
                            ColumnIr {
                                kind: ColumnKind::Scalar(expr),
                                balias: None,
                                sql_alias,
                                eager: None,
                            },
                        );
                    }
                }
                ColumnKind::Scalar(_) => {
                    let mut column = column.clone();
                    column.sql_alias = Some(key.clone());
                    sql_ir.columns.insert(key.clone(), column);
                }
            }
        }

        let (binds, bind_types, counts) = expand_binds(binds, types, self.phql)?;
        sql_ir.bind_counts = counts;

        let dialect = connection.dialect();
        let mut sql = dialect.select(&sql_ir)?;
        if self.shared_lock {
            sql = dialect.shared_lock(&sql);
        }
        tracing::debug!(sql = %sql, "Generated SELECT");

        Ok(Plan {
            connection,
            statement: SqlStatement {
                sql,
                binds,
                bind_types,
            },
            shape,
        })
    }

    /// The read connection of the FROM models, which must share a database
    /// system.
    fn read_connection(
        &self,
        ir: &SelectIr,
        binds: &Binds,
        types: &BindTypes,
    ) -> Result<Arc<dyn Connection>> {
        let intermediate = Intermediate::Select(ir.clone());
        let mut selected: Option<Arc<dyn Connection>> = None;
        for name in &ir.models {
            let model = self.load(name)?;
            let connection =
                self.manager
                    .read_connection(model.as_ref(), Some(&intermediate), binds, types)?;
            match &selected {
                None => selected = Some(connection),
                Some(first) if first.db_type() != connection.db_type() => {
                    return Err(Error::execution(
                        "Cannot use models of different database systems in the same query",
                        Some(self.phql),
                    ));
                }
                Some(_) => {}
            }
        }
        selected.ok_or_else(|| {
            Error::execution("At least one model is required to run a query", Some(self.phql))
        })
    }

    /// One whole model gives records, only named scalars give plain rows,
    /// anything else is complex.
    fn shape(&self, ir: &SelectIr) -> Result<Shape> {
        let mut objects = Vec::new();
        let mut scalars = false;
        let mut complex = false;
        for column in ir.columns.values() {
            match &column.kind {
                ColumnKind::Object { model, .. } => objects.push(model),
                ColumnKind::Scalar(_) => {
                    scalars = true;
                    complex |= column.balias.is_none();
                }
            }
        }
        Ok(match objects.as_slice() {
            [] if !complex => Shape::Rows,
            [model] if !scalars => Shape::Records(self.load(model)?),
            _ => Shape::Complex,
        })
    }

    fn load(&self, name: &str) -> Result<Arc<dyn Model>> {
        self.manager.load(name).map_err(|err| match err {
            Error::Query(query) if query.phql.is_none() => {
                Error::Query(query.with_phql(self.phql))
            }
            other => other,
        })
    }
}

/// Expand array binds into one key per element and record how many
/// placeholders each array placeholder renders as.
pub(crate) fn expand_binds(
    binds: &Binds,
    types: &BindTypes,
    phql: &str,
) -> Result<(Binds, BindTypes, IndexMap<BindKey, usize>)> {
    for (key, bind_type) in types.iter() {
        if !bind_type.is_array() {
            continue;
        }
        match binds.get(key) {
            Some(Value::Array(items)) if !items.is_empty() => {}
            _ => {
                return Err(Error::execution(
                    format!(
                        "Bind value is required for array type placeholder: {}",
                        key.name()
                    ),
                    Some(phql),
                ));
            }
        }
    }

    let mut expanded = Binds::new();
    let mut expanded_types = BindTypes::new();
    let mut counts = IndexMap::new();
    for (key, value) in binds.iter() {
        let declared = types.get(key).copied();
        match value {
            Value::Array(items) => {
                counts.insert(key.clone(), items.len());
                let element_type = declared.and_then(BindType::element_type);
                for (index, item) in items.iter().enumerate() {
                    let element = key.element(index);
                    if let Some(element_type) = element_type {
                        expanded_types.insert(element.clone(), element_type);
                    }
                    expanded.insert(element, item.clone());
                }
            }
            value => {
                if let Some(bind_type) = declared {
                    expanded_types.insert(key.clone(), bind_type);
                }
                expanded.insert(key.clone(), value.clone());
            }
        }
    }
    Ok((expanded, expanded_types, counts))
}
