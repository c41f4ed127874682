//! PHQL language front end: tokens, syntax tree and parser.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{
    Assignment, DeleteStmt, Expr, FromItem, InsertStmt, JoinClause, Limit, ModelName, OrderItem,
    Placeholder, SelectItem, SelectStmt, Statement, UpdateStmt,
};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{Parser, PhqlParser};
