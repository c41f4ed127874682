use super::join::EagerJoin;
use super::{lcfirst, Resolver, Scope, ScopeEntry};
use crate::lang::{DeleteStmt, FromItem, InsertStmt, SelectItem, SelectStmt, UpdateStmt};
use crate::model::{model_table, Model};
use indexmap::IndexMap;
use phql_core::ir::{
    AssignmentIr, ColumnIr, DeleteIr, Eager, InsertIr, IrExpr, OrderIr, SelectIr, TableRef,
    UpdateIr,
};
use phql_core::Result;
use std::sync::Arc;

/// A FROM, UPDATE or DELETE source registered in scope.
struct Source {
    alias: String,
    model: Arc<dyn Model>,
    table: TableRef,
}

impl Resolver<'_> {
    fn source(&self, scope: &mut Scope<'_>, item: &FromItem) -> Result<Source> {
        let name = self.model_name(&item.model)?;
        let model = self.load(&name)?;
        let (alias, table) = match &item.alias {
            Some(alias) => (alias.clone(), model_table(model.as_ref()).alias(alias)),
            None => (model.name().to_string(), model_table(model.as_ref())),
        };
        let entry = ScopeEntry {
            domain: table.domain().to_string(),
            model: Arc::clone(&model),
            from: true,
            selectable: true,
        };
        if !scope.add(alias.clone(), entry) {
            return Err(self.resolution(format!(
                "Alias '{alias}' is used more than once"
            )));
        }
        Ok(Source { alias, model, table })
    }

    pub(super) fn select(&mut self, mut scope: Scope<'_>, stmt: &SelectStmt) -> Result<SelectIr> {
        let mut ir = SelectIr {
            distinct: stmt.distinct,
            for_update: stmt.for_update,
            ..SelectIr::default()
        };

        let mut from_aliases = Vec::with_capacity(stmt.from.len());
        let mut eager = Vec::new();
        for item in &stmt.from {
            let source = self.source(&mut scope, item)?;
            for relation_alias in &item.with {
                let relation = self
                    .manager
                    .relation_by_alias(source.model.name(), relation_alias)
                    .ok_or_else(|| {
                        self.configuration(format!(
                            "Can't find a relationship between '{}' and '{relation_alias}'",
                            source.model.name()
                        ))
                    })?;
                eager.push(EagerJoin {
                    parent_alias: source.alias.clone(),
                    relation,
                    alias: format!("AA{}", self.eager_joins),
                });
                self.eager_joins += 1;
            }
            ir.models.push(source.model.name().to_string());
            ir.tables.push(source.table);
            from_aliases.push(source.alias);
        }

        ir.joins = self.joins(&mut scope, &from_aliases, &stmt.joins, &eager)?;

        let mut columns: IndexMap<String, ColumnIr> = IndexMap::new();
        let mut push = |position: usize, column: ColumnIr| {
            let key = match &column.balias {
                Some(balias) if !columns.contains_key(balias) => balias.clone(),
                _ => format!("_{position}"),
            };
            columns.insert(key, column);
        };
        let mut position = 0;
        for item in &stmt.columns {
            match item {
                SelectItem::All => {
                    let objects: Vec<ColumnIr> = scope
                        .entries()
                        .filter(|(_, entry)| entry.selectable)
                        .map(|(_, entry)| object_column(entry, lcfirst(entry.model.name())))
                        .collect();
                    for column in objects {
                        push(position, column);
                        position += 1;
                    }
                }
                SelectItem::DomainAll(alias) => {
                    let entry = scope.lookup(alias).ok_or_else(|| {
                        self.resolution(format!("Unknown model or alias '{alias}'"))
                    })?;
                    let balias = if alias == entry.model.name() {
                        lcfirst(entry.model.name())
                    } else {
                        alias.clone()
                    };
                    push(position, object_column(entry, balias));
                    position += 1;
                }
                SelectItem::Expr { expr, alias } => {
                    let expr = self.expression(&scope, expr, true)?;
                    let mut column = ColumnIr::scalar(expr);
                    if let Some(alias) = alias {
                        column.balias = Some(alias.clone());
                        column.sql_alias = Some(alias.clone());
                        scope.add_column_alias(alias.clone());
                    }
                    push(position, column);
                    position += 1;
                }
            }
        }
        for join in &eager {
            let Some(entry) = scope.lookup(&join.alias) else {
                continue;
            };
            let parent = scope
                .lookup(&join.parent_alias)
                .map(|parent| parent.domain.clone())
                .unwrap_or_else(|| join.parent_alias.clone());
            let mut column = object_column(entry, join.relation.alias().to_string());
            column.eager = Some(Eager {
                parent,
                kind: join.relation.kind(),
            });
            push(position, column);
            position += 1;
        }
        ir.columns = columns;

        if let Some(where_) = &stmt.where_ {
            ir.where_ = Some(self.expression(&scope, where_, true)?);
        }
        ir.group = self.expressions(&scope, &stmt.group_by, true)?;
        if let Some(having) = &stmt.having {
            ir.having = Some(self.expression(&scope, having, true)?);
        }
        for item in &stmt.order_by {
            ir.order.push(OrderIr {
                expr: self.expression(&scope, &item.expr, true)?,
                direction: item.direction,
            });
        }
        if let Some(limit) = &stmt.limit {
            ir.limit = Some(self.limit(&scope, limit)?);
        }
        Ok(ir)
    }

    pub(super) fn insert(&mut self, stmt: &InsertStmt) -> Result<InsertIr> {
        let name = self.model_name(&stmt.model)?;
        let model = self.load(&name)?;
        let table = model_table(model.as_ref());
        let mut scope = Scope::new();
        scope.add(
            model.name(),
            ScopeEntry {
                domain: table.domain().to_string(),
                model: Arc::clone(&model),
                from: true,
                selectable: true,
            },
        );

        if let Some(fields) = &stmt.fields {
            let metadata = self.manager.metadata();
            for field in fields {
                if !metadata.has_attribute(model.name(), field)? {
                    return Err(self.resolution(format!(
                        "The model '{}' doesn't have the attribute '{field}'",
                        model.name()
                    )));
                }
            }
        }
        let values = self.expressions(&scope, &stmt.values, false)?;
        Ok(InsertIr {
            model: model.name().to_string(),
            table,
            fields: stmt.fields.clone(),
            values,
        })
    }

    pub(super) fn update(&mut self, stmt: &UpdateStmt) -> Result<UpdateIr> {
        if stmt.tables.len() > 1 {
            return Err(self.configuration(
                "Updating several models at the same time is still not supported",
            ));
        }
        let mut scope = Scope::new();
        let mut models = Vec::new();
        let mut tables = Vec::new();
        for item in &stmt.tables {
            let source = self.source(&mut scope, item)?;
            models.push(source.model.name().to_string());
            tables.push(source.table);
        }

        let mut assignments = Vec::with_capacity(stmt.assignments.len());
        for assignment in &stmt.assignments {
            let column = self.expression(&scope, &assignment.column, true)?;
            if !matches!(column, IrExpr::Qualified { .. }) {
                return Err(self.resolution("Only columns can be assigned in an UPDATE"));
            }
            assignments.push(AssignmentIr {
                column,
                value: self.expression(&scope, &assignment.value, false)?,
            });
        }

        let where_ = match &stmt.where_ {
            Some(where_) => Some(self.expression(&scope, where_, true)?),
            None => None,
        };
        let limit = match &stmt.limit {
            Some(limit) => Some(self.limit(&scope, limit)?),
            None => None,
        };
        Ok(UpdateIr {
            models,
            tables,
            assignments,
            where_,
            limit,
        })
    }

    pub(super) fn delete(&mut self, stmt: &DeleteStmt) -> Result<DeleteIr> {
        if stmt.tables.len() > 1 {
            return Err(self.configuration(
                "Delete from several models at the same time is still not supported",
            ));
        }
        let mut scope = Scope::new();
        let mut models = Vec::new();
        let mut tables = Vec::new();
        for item in &stmt.tables {
            let source = self.source(&mut scope, item)?;
            models.push(source.model.name().to_string());
            tables.push(source.table);
        }

        let where_ = match &stmt.where_ {
            Some(where_) => Some(self.expression(&scope, where_, true)?),
            None => None,
        };
        let limit = match &stmt.limit {
            Some(limit) => Some(self.limit(&scope, limit)?),
            None => None,
        };
        Ok(DeleteIr {
            models,
            tables,
            where_,
            limit,
        })
    }
}

fn object_column(entry: &ScopeEntry, balias: String) -> ColumnIr {
    let mut column = ColumnIr::object(entry.model.name(), entry.domain.clone());
    column.balias = Some(balias);
    column
}
