use super::{Resolver, Scope, ScopeEntry};
use crate::lang::{Expr, JoinClause};
use crate::model::{model_table, Model};
use phql_core::ir::{BinaryOp, IrExpr, JoinIr, JoinType, TableRef};
use phql_core::relation::{Relation, Through};
use phql_core::Result;
use std::sync::Arc;

/// A join synthesized from a `WITH` annotation on a FROM model.
pub(super) struct EagerJoin {
    pub parent_alias: String,
    pub relation: Arc<Relation>,
    pub alias: String,
}

struct PendingJoin<'s> {
    join_type: JoinType,
    alias: String,
    model: Arc<dyn Model>,
    table: TableRef,
    on: Option<&'s Expr>,
    relation: Option<(String, Arc<Relation>)>,
}

impl Resolver<'_> {
    /// Register every joined model in `scope`, then resolve the join
    /// conditions: explicit `ON` clauses as written, missing ones from the
    /// relations declared by the FROM models.
    pub(super) fn joins(
        &mut self,
        scope: &mut Scope<'_>,
        from_aliases: &[String],
        joins: &[JoinClause],
        eager: &[EagerJoin],
    ) -> Result<Vec<JoinIr>> {
        let mut pending = Vec::with_capacity(joins.len() + eager.len());
        for join in joins {
            let name = self.model_name(&join.model)?;
            let model = self.load(&name)?;
            let (alias, table) = match &join.alias {
                Some(alias) => (alias.clone(), model_table(model.as_ref()).alias(alias)),
                None => (model.name().to_string(), model_table(model.as_ref())),
            };
            self.register_join(scope, &alias, &model, &table, true)?;
            pending.push(PendingJoin {
                join_type: join.join_type,
                alias,
                model,
                table,
                on: join.on.as_ref(),
                relation: None,
            });
        }
        for join in eager {
            let model = self.load(join.relation.referenced_model())?;
            let table = model_table(model.as_ref()).alias(&join.alias);
            self.register_join(scope, &join.alias, &model, &table, false)?;
            pending.push(PendingJoin {
                join_type: JoinType::Inner,
                alias: join.alias.clone(),
                model,
                table,
                on: None,
                relation: Some((join.parent_alias.clone(), Arc::clone(&join.relation))),
            });
        }

        let implicit = self.manager.settings().enable_implicit_joins;
        let mut resolved = Vec::with_capacity(pending.len());
        for join in pending {
            if let Some(on) = join.on {
                let condition = self.expression(scope, on, true)?;
                resolved.push(JoinIr {
                    join_type: join.join_type,
                    table: join.table,
                    conditions: vec![condition],
                });
                continue;
            }

            let relation = match join.relation.clone() {
                Some(relation) => Some(relation),
                None if implicit && join.join_type != JoinType::Cross => {
                    self.find_relation(scope, from_aliases, &join)?
                }
                None => None,
            };
            match relation {
                Some((from_alias, relation)) => match relation.intermediate() {
                    Some(through) => {
                        let joins = self.through_join(scope, &from_alias, &join, &relation, through)?;
                        resolved.extend(joins);
                    }
                    None => {
                        let conditions = self.key_conditions(
                            scope,
                            (&from_alias, relation.fields()),
                            (&join.alias, relation.referenced_fields()),
                        )?;
                        resolved.push(JoinIr {
                            join_type: join.join_type,
                            table: join.table,
                            conditions,
                        });
                    }
                },
                None => resolved.push(JoinIr {
                    join_type: join.join_type,
                    table: join.table,
                    conditions: Vec::new(),
                }),
            }
        }
        Ok(resolved)
    }

    fn register_join(
        &self,
        scope: &mut Scope<'_>,
        alias: &str,
        model: &Arc<dyn Model>,
        table: &TableRef,
        selectable: bool,
    ) -> Result<()> {
        let entry = ScopeEntry {
            domain: table.domain().to_string(),
            model: Arc::clone(model),
            from: false,
            selectable,
        };
        if !scope.add(alias, entry) {
            return Err(self.resolution(format!(
                "Cannot use '{alias}' as join alias because it was already used"
            )));
        }
        Ok(())
    }

    /// The relation a FROM model declares towards a joined model: by the
    /// join alias first, then the single relation between the two models.
    fn find_relation(
        &self,
        scope: &Scope<'_>,
        from_aliases: &[String],
        join: &PendingJoin<'_>,
    ) -> Result<Option<(String, Arc<Relation>)>> {
        let joined = join.model.name();
        for from_alias in from_aliases {
            let Some(entry) = scope.lookup(from_alias) else {
                continue;
            };
            let from_model = entry.model.name();
            let by_alias = self
                .manager
                .relation_by_alias(from_model, &join.alias)
                .filter(|relation| relation.referenced_model().eq_ignore_ascii_case(joined));
            if let Some(relation) = by_alias {
                return Ok(Some((from_alias.clone(), relation)));
            }

            let mut relations = self.manager.relations_between(from_model, joined);
            match relations.len() {
                0 => continue,
                1 => return Ok(relations.pop().map(|relation| (from_alias.clone(), relation))),
                _ => {
                    return Err(self.configuration(format!(
                        "There is more than one relation between models '{from_model}' and '{joined}', the join must be done using an alias"
                    )));
                }
            }
        }
        Ok(None)
    }

    /// `left.a = right.x AND left.b = right.y` for paired key lists.
    fn key_conditions(
        &self,
        scope: &Scope<'_>,
        (left_alias, left_fields): (&str, &[String]),
        (right_alias, right_fields): (&str, &[String]),
    ) -> Result<Vec<IrExpr>> {
        if left_fields.len() != right_fields.len() {
            return Err(self.configuration(format!(
                "The number of fields must be equal to the number of referenced fields in join {left_alias}-{right_alias}"
            )));
        }
        let mut conditions = Vec::with_capacity(left_fields.len());
        for (left, right) in left_fields.iter().zip(right_fields) {
            conditions.push(IrExpr::binary(
                BinaryOp::Eq,
                self.qualified(scope, Some(left_alias), left)?,
                self.qualified(scope, Some(right_alias), right)?,
            ));
        }
        Ok(conditions)
    }

    /// Two joins for a relation through an intermediate model: owner to
    /// intermediate, then intermediate to the joined model.
    fn through_join(
        &self,
        scope: &mut Scope<'_>,
        from_alias: &str,
        join: &PendingJoin<'_>,
        relation: &Relation,
        through: &Through,
    ) -> Result<[JoinIr; 2]> {
        let intermediate = self.load(&through.model)?;
        let alias = intermediate.name().to_string();
        let table = model_table(intermediate.as_ref());
        if !scope.contains(&alias) {
            scope.add(
                alias.clone(),
                ScopeEntry {
                    domain: table.domain().to_string(),
                    model: Arc::clone(&intermediate),
                    from: false,
                    selectable: false,
                },
            );
        }

        let first = self.key_conditions(
            scope,
            (from_alias, relation.fields()),
            (&alias, through.fields.as_slice()),
        )?;
        let second = self.key_conditions(
            scope,
            (&alias, through.referenced_fields.as_slice()),
            (&join.alias, relation.referenced_fields()),
        )?;
        Ok([
            JoinIr {
                join_type: join.join_type,
                table,
                conditions: first,
            },
            JoinIr {
                join_type: join.join_type,
                table: join.table.clone(),
                conditions: second,
            },
        ])
    }
}
