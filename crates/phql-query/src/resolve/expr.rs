use super::{Resolver, Scope};
use crate::lang::{Expr, Limit, Placeholder};
use phql_core::bind::BindType;
use phql_core::ir::{IrExpr, LimitIr, Literal};
use phql_core::value::Value;
use phql_core::Result;

/// A column found by scanning the models in scope.
struct Owner {
    domain: String,
    model: String,
}

impl Resolver<'_> {
    /// Resolve an expression. With `quoting` off, string literals are kept
    /// raw so INSERT and UPDATE can bind them as values.
    pub(super) fn expression(
        &mut self,
        scope: &Scope<'_>,
        expr: &Expr,
        quoting: bool,
    ) -> Result<IrExpr> {
        Ok(match expr {
            Expr::Binary { op, left, right } => IrExpr::binary(
                *op,
                self.expression(scope, left, quoting)?,
                self.expression(scope, right, quoting)?,
            ),
            Expr::Unary { op, operand } => IrExpr::Unary {
                op: *op,
                operand: Box::new(self.expression(scope, operand, quoting)?),
            },
            Expr::Qualified { domain, name } => self.qualified(scope, domain.as_deref(), name)?,
            Expr::Integer(value) => {
                self.check_literals()?;
                IrExpr::Literal(Literal::Integer(*value))
            }
            Expr::Double(value) => {
                self.check_literals()?;
                IrExpr::Literal(Literal::Double(*value))
            }
            Expr::String(value) => {
                self.check_literals()?;
                if quoting {
                    IrExpr::Literal(Literal::Quoted(quote(value)))
                } else {
                    IrExpr::Literal(Literal::String(value.clone()))
                }
            }
            Expr::Bool(value) => {
                self.check_literals()?;
                IrExpr::Literal(Literal::Bool(*value))
            }
            Expr::Null => IrExpr::Literal(Literal::Null),
            Expr::Placeholder(placeholder) => self.placeholder(placeholder)?,
            Expr::Function {
                name,
                args,
                distinct,
            } => IrExpr::FunctionCall {
                name: name.clone(),
                args: self.expressions(scope, args, quoting)?,
                distinct: *distinct,
            },
            Expr::Case {
                subject,
                whens,
                otherwise,
            } => {
                let subject = match subject {
                    Some(subject) => Some(Box::new(self.expression(scope, subject, quoting)?)),
                    None => None,
                };
                let mut resolved = Vec::with_capacity(whens.len());
                for (when, then) in whens {
                    resolved.push((
                        self.expression(scope, when, quoting)?,
                        self.expression(scope, then, quoting)?,
                    ));
                }
                let otherwise = match otherwise {
                    Some(otherwise) => Some(Box::new(self.expression(scope, otherwise, quoting)?)),
                    None => None,
                };
                IrExpr::Case {
                    subject,
                    whens: resolved,
                    otherwise,
                }
            }
            Expr::Cast { expr, type_name } => IrExpr::Cast {
                expr: Box::new(self.expression(scope, expr, quoting)?),
                type_name: type_name.clone(),
            },
            Expr::Convert { expr, charset } => IrExpr::Convert {
                expr: Box::new(self.expression(scope, expr, quoting)?),
                charset: charset.clone(),
            },
            Expr::Parentheses(inner) => {
                IrExpr::Parentheses(Box::new(self.expression(scope, inner, quoting)?))
            }
            Expr::Subquery(select) => IrExpr::Select(Box::new(self.select(scope.child(), select)?)),
            Expr::List(items) => IrExpr::List(self.expressions(scope, items, quoting)?),
            Expr::All => IrExpr::All,
        })
    }

    pub(super) fn expressions(
        &mut self,
        scope: &Scope<'_>,
        exprs: &[Expr],
        quoting: bool,
    ) -> Result<Vec<IrExpr>> {
        exprs
            .iter()
            .map(|expr| self.expression(scope, expr, quoting))
            .collect()
    }

    pub(super) fn limit(&mut self, scope: &Scope<'_>, limit: &Limit) -> Result<LimitIr> {
        Ok(LimitIr {
            number: self.expression(scope, &limit.number, true)?,
            offset: match &limit.offset {
                Some(offset) => Some(self.expression(scope, offset, true)?),
                None => None,
            },
        })
    }

    fn check_literals(&self) -> Result<()> {
        if self.manager.settings().enable_literals {
            Ok(())
        } else {
            Err(self.resolution("Literals are disabled in PHQL statements"))
        }
    }

    fn placeholder(&mut self, placeholder: &Placeholder) -> Result<IrExpr> {
        let key = placeholder.key.clone();
        let Some(type_name) = &placeholder.type_name else {
            return Ok(IrExpr::Placeholder { key, array: false });
        };
        let bind_type = BindType::from_phql(type_name)
            .ok_or_else(|| self.resolution(format!("Unknown bind type '{type_name}'")))?;
        if bind_type.is_array() {
            match self.binds.get(&key) {
                Some(Value::Array(items)) if !items.is_empty() => {}
                _ => {
                    return Err(self.resolution(format!(
                        "Bind value is required for array type placeholder: {}",
                        key.name()
                    )));
                }
            }
        }
        self.bind_types.insert(key.clone(), bind_type);
        Ok(IrExpr::Placeholder {
            key,
            array: bind_type.is_array(),
        })
    }

    /// Resolve `domain.name` or a bare `name` to a storage column.
    pub(super) fn qualified(
        &self,
        scope: &Scope<'_>,
        domain: Option<&str>,
        name: &str,
    ) -> Result<IrExpr> {
        let Some(domain) = domain else {
            return self.unqualified(scope, name);
        };
        let entry = scope
            .lookup(domain)
            .ok_or_else(|| self.resolution(format!("Unknown model or alias '{domain}'")))?;
        let column = self.storage_column(entry.model.name(), name, domain)?;
        Ok(IrExpr::Qualified {
            domain: Some(entry.domain.clone()),
            name: column,
            balias: Some(name.to_string()),
        })
    }

    fn unqualified(&self, scope: &Scope<'_>, name: &str) -> Result<IrExpr> {
        if scope.has_column_alias(name) {
            return Ok(IrExpr::Qualified {
                domain: None,
                name: name.to_string(),
                balias: Some(name.to_string()),
            });
        }
        let owner = self.owner(scope, name)?.ok_or_else(|| {
            self.resolution(format!(
                "Column '{name}' doesn't belong to any of the selected models"
            ))
        })?;
        let column = self.storage_column(&owner.model, name, &owner.domain)?;
        Ok(IrExpr::Qualified {
            domain: Some(owner.domain),
            name: column,
            balias: Some(name.to_string()),
        })
    }

    /// The single model in the nearest scope that has `attribute`.
    fn owner(&self, scope: &Scope<'_>, attribute: &str) -> Result<Option<Owner>> {
        let metadata = self.manager.metadata();
        let mut found = None;
        let mut matches = 0;
        for (_, entry) in scope.entries().filter(|(_, entry)| entry.selectable) {
            if metadata.has_attribute(entry.model.name(), attribute)? {
                matches += 1;
                found = Some(Owner {
                    domain: entry.domain.clone(),
                    model: entry.model.name().to_string(),
                });
            }
        }
        match (matches, scope.parent()) {
            (0, Some(parent)) => self.owner(parent, attribute),
            (0, None) => Ok(None),
            (1, _) => Ok(found),
            _ => Err(self.resolution(format!("The column '{attribute}' is ambiguous"))),
        }
    }
}

/// Quote a string literal, doubling single quotes not already escaped.
fn quote(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('\'');
    let mut escaped = false;
    for c in raw.chars() {
        if c == '\'' && !escaped {
            quoted.push('\'');
        }
        escaped = c == '\\' && !escaped;
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
