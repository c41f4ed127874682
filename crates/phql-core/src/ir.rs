//! Intermediate representation of resolved PHQL statements.
//!
//! Every column reference in the IR is already resolved to a concrete SQL
//! domain (alias or source) and a storage column name, so dialects can render
//! it without consulting models or meta-data.

use crate::bind::BindKey;
use crate::relation::RelationKind;
use indexmap::IndexMap;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Comparison
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,

    // Logical
    And,
    Or,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,

    // Pattern and set membership
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    /// Right side is an `And` of the two bounds
    Between,
    NotBetween,
    /// Full-text match (`AGAINST`)
    Against,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::ILike => "ILIKE",
            BinaryOp::NotILike => "NOT ILIKE",
            BinaryOp::In => "IN",
            BinaryOp::NotIn => "NOT IN",
            BinaryOp::Between => "BETWEEN",
            BinaryOp::NotBetween => "NOT BETWEEN",
            BinaryOp::Against => "AGAINST",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Minus,
    BitNot,
    IsNull,
    IsNotNull,
    Exists,
}

/// Join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Cross,
    FullOuter,
}

impl JoinType {
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::FullOuter => "FULL OUTER JOIN",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    /// Unquoted string content, kept raw when quoting is off
    String(String),
    /// Quoted and escaped SQL string literal, rendered verbatim
    Quoted(String),
}

/// A resolved expression.
#[derive(Debug, Clone, PartialEq)]
pub enum IrExpr {
    Binary {
        op: BinaryOp,
        left: Box<IrExpr>,
        right: Box<IrExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<IrExpr>,
    },
    /// A resolved column. `domain` is `None` for a reference to a select alias.
    Qualified {
        domain: Option<String>,
        name: String,
        /// Name as written in PHQL
        balias: Option<String>,
    },
    Literal(Literal),
    /// A bind placeholder. Array placeholders expand to one marker per element.
    Placeholder { key: BindKey, array: bool },
    FunctionCall {
        name: String,
        args: Vec<IrExpr>,
        distinct: bool,
    },
    Case {
        subject: Option<Box<IrExpr>>,
        whens: Vec<(IrExpr, IrExpr)>,
        otherwise: Option<Box<IrExpr>>,
    },
    Cast {
        expr: Box<IrExpr>,
        type_name: String,
    },
    Convert {
        expr: Box<IrExpr>,
        charset: String,
    },
    Parentheses(Box<IrExpr>),
    Select(Box<SelectIr>),
    List(Vec<IrExpr>),
    /// `*` as a function argument
    All,
}

impl IrExpr {
    pub fn binary(op: BinaryOp, left: IrExpr, right: IrExpr) -> Self {
        IrExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn qualified(domain: impl Into<String>, name: impl Into<String>) -> Self {
        IrExpr::Qualified {
            domain: Some(domain.into()),
            name: name.into(),
            balias: None,
        }
    }

    /// The PHQL-facing name of a qualified column.
    pub fn balias(&self) -> Option<&str> {
        match self {
            IrExpr::Qualified { balias, .. } => balias.as_deref(),
            _ => None,
        }
    }

    /// Whether the placeholder `key` appears anywhere in the expression,
    /// subqueries included.
    pub fn mentions(&self, key: &BindKey) -> bool {
        match self {
            IrExpr::Placeholder { key: own, .. } => own == key,
            IrExpr::Binary { left, right, .. } => left.mentions(key) || right.mentions(key),
            IrExpr::Unary { operand, .. } => operand.mentions(key),
            IrExpr::FunctionCall { args, .. } | IrExpr::List(args) => {
                args.iter().any(|arg| arg.mentions(key))
            }
            IrExpr::Case {
                subject,
                whens,
                otherwise,
            } => {
                subject.as_deref().is_some_and(|e| e.mentions(key))
                    || whens
                        .iter()
                        .any(|(when, then)| when.mentions(key) || then.mentions(key))
                    || otherwise.as_deref().is_some_and(|e| e.mentions(key))
            }
            IrExpr::Cast { expr, .. } | IrExpr::Convert { expr, .. } | IrExpr::Parentheses(expr) => {
                expr.mentions(key)
            }
            IrExpr::Select(select) => select.mentions(key),
            IrExpr::Qualified { .. } | IrExpr::Literal(_) | IrExpr::All => false,
        }
    }
}

/// A table in FROM, JOIN, UPDATE or DELETE.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub source: String,
    pub schema: Option<String>,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            schema: None,
            alias: None,
        }
    }

    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name columns of this table are qualified with.
    pub fn domain(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.source)
    }
}

/// Marks a column synthesized by a `WITH` eager-load annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Eager {
    /// SQL domain of the parent table
    pub parent: String,
    pub kind: RelationKind,
}

/// What a select column yields.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// Every attribute of a model, hydrated as a record
    Object { model: String, domain: String },
    /// A single expression
    Scalar(IrExpr),
}

/// A resolved select column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnIr {
    pub kind: ColumnKind,
    /// Name the column is exposed under in results
    pub balias: Option<String>,
    /// Alias rendered in SQL
    pub sql_alias: Option<String>,
    pub eager: Option<Eager>,
}

impl ColumnIr {
    pub fn object(model: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            kind: ColumnKind::Object {
                model: model.into(),
                domain: domain.into(),
            },
            balias: None,
            sql_alias: None,
            eager: None,
        }
    }

    pub fn scalar(expr: IrExpr) -> Self {
        Self {
            balias: expr.balias().map(str::to_string),
            sql_alias: expr.balias().map(str::to_string),
            kind: ColumnKind::Scalar(expr),
            eager: None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, ColumnKind::Object { .. })
    }
}

/// A resolved join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinIr {
    pub join_type: JoinType,
    pub table: TableRef,
    /// ANDed together; empty means no ON clause
    pub conditions: Vec<IrExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderIr {
    pub expr: IrExpr,
    pub direction: Option<OrderDirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitIr {
    pub number: IrExpr,
    pub offset: Option<IrExpr>,
}

impl LimitIr {
    pub fn mentions(&self, key: &BindKey) -> bool {
        self.number.mentions(key) || self.offset.as_ref().is_some_and(|e| e.mentions(key))
    }
}

/// A resolved SELECT.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectIr {
    /// `Some(true)` for DISTINCT, `Some(false)` for ALL
    pub distinct: Option<bool>,
    pub models: Vec<String>,
    pub tables: Vec<TableRef>,
    /// Keyed by the name each column is exposed under
    pub columns: IndexMap<String, ColumnIr>,
    pub joins: Vec<JoinIr>,
    pub where_: Option<IrExpr>,
    pub group: Vec<IrExpr>,
    pub having: Option<IrExpr>,
    pub order: Vec<OrderIr>,
    pub limit: Option<LimitIr>,
    pub for_update: bool,
    /// Number of elements of each array bind, filled in at execution
    pub bind_counts: IndexMap<BindKey, usize>,
}

impl SelectIr {
    /// Whether the placeholder `key` appears in any clause.
    pub fn mentions(&self, key: &BindKey) -> bool {
        let in_columns = self.columns.values().any(|column| match &column.kind {
            ColumnKind::Scalar(expr) => expr.mentions(key),
            ColumnKind::Object { .. } => false,
        });
        in_columns
            || self
                .joins
                .iter()
                .flat_map(|join| &join.conditions)
                .any(|e| e.mentions(key))
            || self.where_.as_ref().is_some_and(|e| e.mentions(key))
            || self.group.iter().any(|e| e.mentions(key))
            || self.having.as_ref().is_some_and(|e| e.mentions(key))
            || self.order.iter().any(|o| o.expr.mentions(key))
            || self.limit.as_ref().is_some_and(|l| l.mentions(key))
    }
}

/// A resolved INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertIr {
    pub model: String,
    pub table: TableRef,
    /// Explicit field list; `None` inserts every attribute in order
    pub fields: Option<Vec<String>>,
    pub values: Vec<IrExpr>,
}

/// One `SET column = value` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentIr {
    pub column: IrExpr,
    pub value: IrExpr,
}

/// A resolved UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateIr {
    pub models: Vec<String>,
    pub tables: Vec<TableRef>,
    pub assignments: Vec<AssignmentIr>,
    pub where_: Option<IrExpr>,
    pub limit: Option<LimitIr>,
}

/// A resolved DELETE.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteIr {
    pub models: Vec<String>,
    pub tables: Vec<TableRef>,
    pub where_: Option<IrExpr>,
    pub limit: Option<LimitIr>,
}

/// Statement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        }
    }
}

/// A resolved statement of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Intermediate {
    Select(SelectIr),
    Insert(InsertIr),
    Update(UpdateIr),
    Delete(DeleteIr),
}

impl Intermediate {
    pub fn kind(&self) -> StatementKind {
        match self {
            Intermediate::Select(_) => StatementKind::Select,
            Intermediate::Insert(_) => StatementKind::Insert,
            Intermediate::Update(_) => StatementKind::Update,
            Intermediate::Delete(_) => StatementKind::Delete,
        }
    }

    /// Models touched by the statement.
    pub fn models(&self) -> Vec<&str> {
        match self {
            Intermediate::Select(ir) => ir.models.iter().map(String::as_str).collect(),
            Intermediate::Insert(ir) => vec![ir.model.as_str()],
            Intermediate::Update(ir) => ir.models.iter().map(String::as_str).collect(),
            Intermediate::Delete(ir) => ir.models.iter().map(String::as_str).collect(),
        }
    }
}
