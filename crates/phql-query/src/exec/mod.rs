//! Executors: turn a resolved statement into SQL and run it.

pub(crate) mod insert;
pub(crate) mod mutate;
pub(crate) mod select;

pub use select::SqlStatement;

use indexmap::IndexMap;
use phql_core::bind::Binds;
use phql_core::dialect::Dialect;
use phql_core::error::Error;
use phql_core::ir::{IrExpr, Literal};
use phql_core::value::Value;
use phql_core::Result;

/// The value an INSERT or UPDATE writes for one expression.
///
/// Literals and placeholders become plain values. Anything else is kept as
/// raw SQL and written unbound.
pub(crate) fn write_value(
    expr: &IrExpr,
    binds: &Binds,
    dialect: &dyn Dialect,
    phql: &str,
) -> Result<Value> {
    Ok(match expr {
        IrExpr::Literal(literal) => match literal {
            Literal::Null => Value::Null,
            Literal::Bool(value) => Value::Bool(*value),
            Literal::Integer(value) => Value::BigInt(*value),
            Literal::Double(value) => Value::Double(*value),
            Literal::String(value) => Value::Text(value.clone()),
            Literal::Quoted(value) => Value::Raw(value.clone()),
        },
        IrExpr::Placeholder { key, .. } => binds.get(key).cloned().ok_or_else(|| {
            Error::execution(
                format!("Bind value is required for placeholder '{}'", key.name()),
                Some(phql),
            )
        })?,
        other => Value::Raw(dialect.sql_expression(other, &IndexMap::new())?),
    })
}
