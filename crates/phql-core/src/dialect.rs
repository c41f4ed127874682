//! SQL dialects.
//!
//! A [`Dialect`] turns resolved IR into SQL text. [`SqlDialect`] is the stock
//! renderer used by the bundled connections; drivers may supply their own.

use crate::Result;
use crate::bind::BindKey;
use crate::ir::{BinaryOp, ColumnKind, IrExpr, JoinType, Literal, SelectIr, TableRef, UnaryOp};
use indexmap::IndexMap;

/// A column written by a record INSERT or UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlAssignment {
    pub column: String,
    /// Raw SQL written instead of the `:column` placeholder
    pub raw: Option<String>,
}

impl SqlAssignment {
    pub fn bound(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            raw: None,
        }
    }

    pub fn raw(column: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            raw: Some(sql.into()),
        }
    }
}

/// Renders IR into SQL.
pub trait Dialect: Send + Sync {
    /// Render a full SELECT. Columns must already be expanded to scalars,
    /// object columns render as `domain.*`.
    fn select(&self, ir: &SelectIr) -> Result<String>;

    /// Wrap a SELECT so it takes a shared lock.
    fn shared_lock(&self, sql: &str) -> String;

    /// Wrap a SELECT so it locks the selected rows for update.
    fn for_update(&self, sql: &str) -> String {
        format!("{sql} FOR UPDATE")
    }

    /// Render one expression.
    fn sql_expression(&self, expr: &IrExpr, bind_counts: &IndexMap<BindKey, usize>)
    -> Result<String>;

    /// Escape an identifier if the dialect is configured to do so.
    fn escape_identifier(&self, name: &str) -> String;

    /// `INSERT INTO table (a, b) VALUES (:a, :b)`
    fn insert(&self, table: &TableRef, columns: &[SqlAssignment]) -> String {
        let names: Vec<String> = columns
            .iter()
            .map(|c| self.escape_identifier(&c.column))
            .collect();
        let values: Vec<String> = columns
            .iter()
            .map(|c| c.raw.clone().unwrap_or_else(|| format!(":{}", c.column)))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_name(table),
            names.join(", "),
            values.join(", ")
        )
    }

    /// `UPDATE table SET a = :a WHERE id = :id`
    fn update(&self, table: &TableRef, columns: &[SqlAssignment], keys: &[String]) -> String {
        let sets: Vec<String> = columns
            .iter()
            .map(|c| {
                let value = c.raw.clone().unwrap_or_else(|| format!(":{}", c.column));
                format!("{} = {}", self.escape_identifier(&c.column), value)
            })
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {}",
            self.table_name(table),
            sets.join(", "),
            self.key_conditions(keys)
        )
    }

    /// `DELETE FROM table WHERE id = :id`
    fn delete(&self, table: &TableRef, keys: &[String]) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            self.table_name(table),
            self.key_conditions(keys)
        )
    }

    /// `schema.source`, without alias.
    fn table_name(&self, table: &TableRef) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.escape_identifier(schema),
                self.escape_identifier(&table.source)
            ),
            None => self.escape_identifier(&table.source),
        }
    }

    fn key_conditions(&self, keys: &[String]) -> String {
        keys.iter()
            .map(|k| format!("{} = :{}", self.escape_identifier(k), k))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Database families understood by [`SqlDialect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flavor {
    #[default]
    Postgres,
    Sqlite,
    Mysql,
}

impl Flavor {
    /// The connection type reported for this family.
    pub const fn db_type(self) -> &'static str {
        match self {
            Flavor::Postgres => "postgresql",
            Flavor::Sqlite => "sqlite",
            Flavor::Mysql => "mysql",
        }
    }

    /// Check if this family supports ILIKE.
    pub const fn supports_ilike(self) -> bool {
        matches!(self, Flavor::Postgres)
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Flavor::Postgres | Flavor::Sqlite => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Flavor::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }
}

/// The stock SQL renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqlDialect {
    flavor: Flavor,
    escape_identifiers: bool,
}

impl SqlDialect {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            escape_identifiers: false,
        }
    }

    /// Quote every identifier in rendered SQL.
    pub fn escape_identifiers(mut self, escape: bool) -> Self {
        self.escape_identifiers = escape;
        self
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn table(&self, table: &TableRef) -> String {
        let name = self.table_name(table);
        match &table.alias {
            Some(alias) => format!("{} AS {}", name, self.escape_identifier(alias)),
            None => name,
        }
    }

    fn list(&self, items: &[IrExpr], counts: &IndexMap<BindKey, usize>) -> Result<String> {
        let parts = items
            .iter()
            .map(|item| self.sql_expression(item, counts))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(", "))
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &IrExpr,
        right: &IrExpr,
        counts: &IndexMap<BindKey, usize>,
    ) -> Result<String> {
        let left_sql = self.sql_expression(left, counts)?;
        let right_sql = self.sql_expression(right, counts)?;
        let sql = match op {
            BinaryOp::ILike | BinaryOp::NotILike if !self.flavor.supports_ilike() => {
                let not_str = if op == BinaryOp::NotILike { "NOT " } else { "" };
                format!("LOWER({left_sql}) {not_str}LIKE LOWER({right_sql})")
            }
            BinaryOp::Against if self.flavor == Flavor::Mysql => {
                format!("MATCH({left_sql}) AGAINST ({right_sql})")
            }
            _ => format!("{left_sql} {} {right_sql}", op.as_str()),
        };
        Ok(sql)
    }
}

fn is_same_column(expr: &IrExpr, alias: &str) -> bool {
    matches!(expr, IrExpr::Qualified { name, .. } if name == alias)
}

impl Dialect for SqlDialect {
    fn select(&self, ir: &SelectIr) -> Result<String> {
        let counts = &ir.bind_counts;
        let mut sql = String::from("SELECT ");
        match ir.distinct {
            Some(true) => sql.push_str("DISTINCT "),
            Some(false) => sql.push_str("ALL "),
            None => {}
        }

        let mut columns = Vec::with_capacity(ir.columns.len());
        for column in ir.columns.values() {
            let rendered = match &column.kind {
                ColumnKind::Object { domain, .. } => {
                    format!("{}.*", self.escape_identifier(domain))
                }
                ColumnKind::Scalar(expr) => {
                    let expr_sql = self.sql_expression(expr, counts)?;
                    match &column.sql_alias {
                        Some(alias) if !is_same_column(expr, alias) => {
                            format!("{} AS {}", expr_sql, self.escape_identifier(alias))
                        }
                        _ => expr_sql,
                    }
                }
            };
            columns.push(rendered);
        }
        sql.push_str(&columns.join(", "));

        let tables: Vec<String> = ir.tables.iter().map(|t| self.table(t)).collect();
        sql.push_str(" FROM ");
        sql.push_str(&tables.join(", "));

        for join in &ir.joins {
            sql.push(' ');
            sql.push_str(join.join_type.as_str());
            sql.push(' ');
            sql.push_str(&self.table(&join.table));
            if !join.conditions.is_empty() && join.join_type != JoinType::Cross {
                let conditions = join
                    .conditions
                    .iter()
                    .map(|c| self.sql_expression(c, counts))
                    .collect::<Result<Vec<_>>>()?;
                sql.push_str(" ON ");
                sql.push_str(&conditions.join(" AND "));
            }
        }

        if let Some(where_) = &ir.where_ {
            sql.push_str(" WHERE ");
            sql.push_str(&self.sql_expression(where_, counts)?);
        }
        if !ir.group.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.list(&ir.group, counts)?);
        }
        if let Some(having) = &ir.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.sql_expression(having, counts)?);
        }
        if !ir.order.is_empty() {
            let items = ir
                .order
                .iter()
                .map(|o| {
                    let expr_sql = self.sql_expression(&o.expr, counts)?;
                    Ok(match o.direction {
                        Some(direction) => format!("{expr_sql} {}", direction.as_str()),
                        None => expr_sql,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&items.join(", "));
        }
        if let Some(limit) = &ir.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(&self.sql_expression(&limit.number, counts)?);
            if let Some(offset) = &limit.offset {
                sql.push_str(" OFFSET ");
                sql.push_str(&self.sql_expression(offset, counts)?);
            }
        }
        if ir.for_update {
            sql = self.for_update(&sql);
        }
        Ok(sql)
    }

    fn shared_lock(&self, sql: &str) -> String {
        match self.flavor {
            Flavor::Mysql => format!("{sql} LOCK IN SHARE MODE"),
            Flavor::Postgres => format!("{sql} FOR SHARE"),
            Flavor::Sqlite => sql.to_string(),
        }
    }

    fn for_update(&self, sql: &str) -> String {
        match self.flavor {
            Flavor::Sqlite => sql.to_string(),
            Flavor::Postgres | Flavor::Mysql => format!("{sql} FOR UPDATE"),
        }
    }

    fn sql_expression(
        &self,
        expr: &IrExpr,
        bind_counts: &IndexMap<BindKey, usize>,
    ) -> Result<String> {
        let sql = match expr {
            IrExpr::Binary { op, left, right } => self.binary(*op, left, right, bind_counts)?,
            IrExpr::Unary { op, operand } => {
                let operand_sql = self.sql_expression(operand, bind_counts)?;
                match op {
                    UnaryOp::Not => format!("NOT {operand_sql}"),
                    UnaryOp::Minus => format!("-{operand_sql}"),
                    UnaryOp::BitNot => format!("~{operand_sql}"),
                    UnaryOp::IsNull => format!("{operand_sql} IS NULL"),
                    UnaryOp::IsNotNull => format!("{operand_sql} IS NOT NULL"),
                    UnaryOp::Exists => format!("EXISTS {operand_sql}"),
                }
            }
            IrExpr::Qualified { domain, name, .. } => match domain {
                Some(domain) => format!(
                    "{}.{}",
                    self.escape_identifier(domain),
                    self.escape_identifier(name)
                ),
                None => self.escape_identifier(name),
            },
            IrExpr::Literal(literal) => match literal {
                Literal::Null => "NULL".to_string(),
                Literal::Bool(true) => "TRUE".to_string(),
                Literal::Bool(false) => "FALSE".to_string(),
                Literal::Integer(v) => v.to_string(),
                Literal::Double(v) => format!("{v:?}"),
                Literal::String(s) | Literal::Quoted(s) => s.clone(),
            },
            IrExpr::Placeholder { key, .. } => match bind_counts.get(key) {
                Some(&count) => (0..count)
                    .map(|i| key.element(i).wildcard())
                    .collect::<Vec<_>>()
                    .join(", "),
                None => key.wildcard(),
            },
            IrExpr::FunctionCall {
                name,
                args,
                distinct,
            } => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                format!("{name}({distinct}{})", self.list(args, bind_counts)?)
            }
            IrExpr::Case {
                subject,
                whens,
                otherwise,
            } => {
                let mut sql = String::from("CASE");
                if let Some(subject) = subject {
                    sql.push(' ');
                    sql.push_str(&self.sql_expression(subject, bind_counts)?);
                }
                for (condition, result) in whens {
                    let cond_sql = self.sql_expression(condition, bind_counts)?;
                    let result_sql = self.sql_expression(result, bind_counts)?;
                    sql.push_str(&format!(" WHEN {cond_sql} THEN {result_sql}"));
                }
                if let Some(otherwise) = otherwise {
                    let else_sql = self.sql_expression(otherwise, bind_counts)?;
                    sql.push_str(&format!(" ELSE {else_sql}"));
                }
                sql.push_str(" END");
                sql
            }
            IrExpr::Cast { expr, type_name } => {
                format!(
                    "CAST({} AS {type_name})",
                    self.sql_expression(expr, bind_counts)?
                )
            }
            IrExpr::Convert { expr, charset } => {
                format!(
                    "CONVERT({} USING {charset})",
                    self.sql_expression(expr, bind_counts)?
                )
            }
            IrExpr::Parentheses(inner) => {
                format!("({})", self.sql_expression(inner, bind_counts)?)
            }
            IrExpr::Select(select) => format!("({})", self.select(select)?),
            IrExpr::List(items) => format!("({})", self.list(items, bind_counts)?),
            IrExpr::All => "*".to_string(),
        };
        Ok(sql)
    }

    fn escape_identifier(&self, name: &str) -> String {
        if self.escape_identifiers {
            self.flavor.quote_identifier(name)
        } else {
            name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ColumnIr, JoinIr, LimitIr, OrderDirection, OrderIr};

    fn robots_select() -> SelectIr {
        let mut ir = SelectIr {
            models: vec!["Robots".into()],
            tables: vec![TableRef::new("robots")],
            ..SelectIr::default()
        };
        let name = IrExpr::Qualified {
            domain: Some("robots".into()),
            name: "name".into(),
            balias: Some("name".into()),
        };
        ir.columns.insert("name".into(), ColumnIr::scalar(name));
        ir
    }

    #[test]
    fn test_alias_equal_to_column_is_omitted() {
        let mut ir = robots_select();
        ir.where_ = Some(IrExpr::binary(
            BinaryOp::Gt,
            IrExpr::qualified("robots", "price"),
            IrExpr::Placeholder {
                key: BindKey::from("min"),
                array: false,
            },
        ));
        let sql = SqlDialect::default().select(&ir).unwrap();
        assert_eq!(sql, "SELECT robots.name FROM robots WHERE robots.price > :min");
    }

    #[test]
    fn test_joins_order_limit_and_locks() {
        let mut ir = robots_select();
        ir.tables = vec![TableRef::new("robots").alias("r")];
        ir.joins.push(JoinIr {
            join_type: JoinType::Left,
            table: TableRef::new("robots_parts").alias("p"),
            conditions: vec![IrExpr::binary(
                BinaryOp::Eq,
                IrExpr::qualified("r", "id"),
                IrExpr::qualified("p", "robots_id"),
            )],
        });
        ir.order.push(OrderIr {
            expr: IrExpr::qualified("r", "name"),
            direction: Some(OrderDirection::Desc),
        });
        ir.limit = Some(LimitIr {
            number: IrExpr::Literal(Literal::Integer(10)),
            offset: Some(IrExpr::Literal(Literal::Integer(5))),
        });
        ir.for_update = true;
        let dialect = SqlDialect::new(Flavor::Mysql);
        let sql = dialect.select(&ir).unwrap();
        assert_eq!(
            sql,
            "SELECT robots.name FROM robots AS r LEFT JOIN robots_parts AS p ON r.id = p.robots_id ORDER BY r.name DESC LIMIT 10 OFFSET 5 FOR UPDATE"
        );
        assert_eq!(dialect.shared_lock("SELECT 1"), "SELECT 1 LOCK IN SHARE MODE");
        assert_eq!(
            SqlDialect::new(Flavor::Sqlite).shared_lock("SELECT 1"),
            "SELECT 1"
        );
    }

    #[test]
    fn test_array_placeholder_expansion() {
        let expr = IrExpr::binary(
            BinaryOp::In,
            IrExpr::qualified("robots", "id"),
            IrExpr::List(vec![IrExpr::Placeholder {
                key: BindKey::from("ids"),
                array: true,
            }]),
        );
        let mut counts = IndexMap::new();
        counts.insert(BindKey::from("ids"), 3);
        let sql = SqlDialect::default().sql_expression(&expr, &counts).unwrap();
        assert_eq!(sql, "robots.id IN (:ids0, :ids1, :ids2)");
    }

    #[test]
    fn test_escaped_identifiers() {
        let dialect = SqlDialect::new(Flavor::Postgres).escape_identifiers(true);
        let sql = dialect
            .sql_expression(&IrExpr::qualified("r", "na\"me"), &IndexMap::new())
            .unwrap();
        assert_eq!(sql, "\"r\".\"na\"\"me\"");
        let mysql = SqlDialect::new(Flavor::Mysql).escape_identifiers(true);
        assert_eq!(mysql.escape_identifier("id"), "`id`");
    }

    #[test]
    fn test_ilike_fallback() {
        let expr = IrExpr::binary(
            BinaryOp::ILike,
            IrExpr::qualified("r", "name"),
            IrExpr::Literal(Literal::Quoted("'%a%'".into())),
        );
        let counts = IndexMap::new();
        assert_eq!(
            SqlDialect::new(Flavor::Postgres)
                .sql_expression(&expr, &counts)
                .unwrap(),
            "r.name ILIKE '%a%'"
        );
        assert_eq!(
            SqlDialect::new(Flavor::Sqlite)
                .sql_expression(&expr, &counts)
                .unwrap(),
            "LOWER(r.name) LIKE LOWER('%a%')"
        );
    }

    #[test]
    fn test_case_cast_and_functions() {
        let counts = IndexMap::new();
        let dialect = SqlDialect::default();
        let case = IrExpr::Case {
            subject: Some(Box::new(IrExpr::qualified("r", "type"))),
            whens: vec![(
                IrExpr::Literal(Literal::Quoted("'a'".into())),
                IrExpr::Literal(Literal::Integer(1)),
            )],
            otherwise: Some(Box::new(IrExpr::Literal(Literal::Integer(0)))),
        };
        assert_eq!(
            dialect.sql_expression(&case, &counts).unwrap(),
            "CASE r.type WHEN 'a' THEN 1 ELSE 0 END"
        );
        let count = IrExpr::FunctionCall {
            name: "COUNT".into(),
            args: vec![IrExpr::qualified("r", "id")],
            distinct: true,
        };
        assert_eq!(
            dialect.sql_expression(&count, &counts).unwrap(),
            "COUNT(DISTINCT r.id)"
        );
        let cast = IrExpr::Cast {
            expr: Box::new(IrExpr::qualified("r", "price")),
            type_name: "INTEGER".into(),
        };
        assert_eq!(
            dialect.sql_expression(&cast, &counts).unwrap(),
            "CAST(r.price AS INTEGER)"
        );
    }

    #[test]
    fn test_record_statements() {
        let dialect = SqlDialect::default();
        let table = TableRef::new("robots");
        assert_eq!(
            dialect.insert(
                &table,
                &[SqlAssignment::bound("name"), SqlAssignment::raw("created", "NOW()")]
            ),
            "INSERT INTO robots (name, created) VALUES (:name, NOW())"
        );
        assert_eq!(
            dialect.update(&table, &[SqlAssignment::bound("name")], &["id".to_string()]),
            "UPDATE robots SET name = :name WHERE id = :id"
        );
        assert_eq!(
            dialect.delete(&table.clone().schema(Some("shop".into())), &["id".to_string()]),
            "DELETE FROM shop.robots WHERE id = :id"
        );
    }
}
