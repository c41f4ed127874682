//! PHQL syntax tree.
//!
//! Names in the tree are exactly as written; nothing here has been checked
//! against models or meta-data.

use phql_core::bind::BindKey;
use phql_core::ir::{BinaryOp, JoinType, OrderDirection, UnaryOp};

/// A parsed PHQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

/// A model reference, optionally through a namespace alias (`ns:Robots`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName {
    pub namespace: Option<String>,
    /// Model name, possibly backslash-qualified (`Store\Robots`)
    pub name: String,
}

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStmt {
    /// `Some(true)` for DISTINCT, `Some(false)` for ALL
    pub distinct: Option<bool>,
    pub columns: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    pub joins: Vec<JoinClause>,
    pub where_: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<Limit>,
    pub for_update: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    All,
    /// `alias.*`
    DomainAll(String),
    Expr { expr: Expr, alias: Option<String> },
}

/// A model in FROM, UPDATE or DELETE.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub model: ModelName,
    pub alias: Option<String>,
    /// Relation aliases eager-loaded through `WITH`
    pub with: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub model: ModelName,
    pub alias: Option<String>,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub direction: Option<OrderDirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub number: Expr,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub model: ModelName,
    pub fields: Option<Vec<String>>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub tables: Vec<FromItem>,
    pub assignments: Vec<Assignment>,
    pub where_: Option<Expr>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub tables: Vec<FromItem>,
    pub where_: Option<Expr>,
    pub limit: Option<Limit>,
}

/// A bind placeholder as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub key: BindKey,
    /// Type name of `{name:type}` and `:name:type`
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Qualified {
        domain: Option<String>,
        name: String,
    },
    Integer(i64),
    Double(f64),
    /// String content between the quotes, escapes untouched
    String(String),
    Bool(bool),
    Null,
    Placeholder(Placeholder),
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Case {
        subject: Option<Box<Expr>>,
        whens: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        type_name: String,
    },
    Convert {
        expr: Box<Expr>,
        charset: String,
    },
    Parentheses(Box<Expr>),
    Subquery(Box<SelectStmt>),
    List(Vec<Expr>),
    /// `*` as a function argument
    All,
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expr::Qualified {
            domain: None,
            name: name.into(),
        }
    }

    pub fn qualified(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Qualified {
            domain: Some(domain.into()),
            name: name.into(),
        }
    }
}
