//! Recursive-descent PHQL parser.

use super::ast::{
    Assignment, DeleteStmt, Expr, FromItem, InsertStmt, JoinClause, Limit, ModelName, OrderItem,
    SelectItem, SelectStmt, Statement, UpdateStmt,
};
use super::lexer::{Lexer, Token, TokenKind};
use phql_core::error::{Error, ParseError};
use phql_core::ir::{BinaryOp, JoinType, OrderDirection, UnaryOp};
use phql_core::Result;

/// Turns PHQL text into a [`Statement`].
pub trait PhqlParser: Send + Sync {
    fn parse(&self, phql: &str) -> Result<Statement>;
}

/// The stock PHQL parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }
}

impl PhqlParser for Parser {
    #[tracing::instrument(level = "trace", skip(self))]
    fn parse(&self, phql: &str) -> Result<Statement> {
        let tokens = Lexer::new(phql).tokenize()?;
        let mut state = ParseState {
            phql,
            tokens,
            pos: 0,
        };
        let statement = state.statement()?;
        state.expect_eof()?;
        Ok(statement)
    }
}

const RESERVED: &[&str] = &[
    "AGAINST", "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CONVERT", "CROSS",
    "DELETE", "DESC", "DISTINCT", "ELSE", "END", "EXISTS", "FALSE", "FOR", "FROM", "FULL",
    "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTO", "IS", "JOIN", "LEFT", "LIKE",
    "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "RIGHT", "SELECT", "SET",
    "THEN", "TRUE", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|k| k.eq_ignore_ascii_case(word))
}

static EOF: TokenKind = TokenKind::Eof;

struct ParseState<'a> {
    phql: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl ParseState<'_> {
    fn statement(&mut self) -> Result<Statement> {
        if self.is_keyword("SELECT") {
            Ok(Statement::Select(self.select()?))
        } else if self.is_keyword("INSERT") {
            Ok(Statement::Insert(self.insert()?))
        } else if self.is_keyword("UPDATE") {
            Ok(Statement::Update(self.update()?))
        } else if self.is_keyword("DELETE") {
            Ok(Statement::Delete(self.delete()?))
        } else {
            Err(self.unexpected())
        }
    }

    fn select(&mut self) -> Result<SelectStmt> {
        self.expect_keyword("SELECT")?;
        let mut stmt = SelectStmt::default();

        if self.eat_keyword("DISTINCT") {
            stmt.distinct = Some(true);
        } else if self.eat_keyword("ALL") {
            stmt.distinct = Some(false);
        }

        stmt.columns.push(self.select_item()?);
        while self.eat(&TokenKind::Comma) {
            stmt.columns.push(self.select_item()?);
        }

        self.expect_keyword("FROM")?;
        stmt.from.push(self.source(true)?);
        while self.eat(&TokenKind::Comma) {
            stmt.from.push(self.source(true)?);
        }

        while let Some(join_type) = self.join_type()? {
            stmt.joins.push(self.join(join_type)?);
        }

        if self.eat_keyword("WHERE") {
            stmt.where_ = Some(self.expr()?);
        }
        if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            stmt.group_by = self.expr_list()?;
        }
        if self.eat_keyword("HAVING") {
            stmt.having = Some(self.expr()?);
        }
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            stmt.order_by.push(self.order_item()?);
            while self.eat(&TokenKind::Comma) {
                stmt.order_by.push(self.order_item()?);
            }
        }
        if self.is_keyword("LIMIT") {
            stmt.limit = Some(self.limit(true)?);
        }
        if self.eat_keyword("FOR") {
            self.expect_keyword("UPDATE")?;
            stmt.for_update = true;
        }
        Ok(stmt)
    }

    fn select_item(&mut self) -> Result<SelectItem> {
        if self.eat(&TokenKind::Star) {
            return Ok(SelectItem::All);
        }
        if self.peek_ident().is_some()
            && *self.peek_nth(1) == TokenKind::Dot
            && *self.peek_nth(2) == TokenKind::Star
        {
            let domain = self.ident()?;
            self.bump();
            self.bump();
            return Ok(SelectItem::DomainAll(domain));
        }
        let expr = self.expr()?;
        let alias = self.alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    /// `[AS] ident`, where a bare identifier must not be a keyword.
    fn alias(&mut self) -> Result<Option<String>> {
        if self.eat_keyword("AS") {
            return self.ident().map(Some);
        }
        Ok(match self.peek_ident() {
            Some(_) => Some(self.ident()?),
            None => None,
        })
    }

    fn source(&mut self, allow_with: bool) -> Result<FromItem> {
        let model = self.model_name()?;
        let alias = self.alias()?;
        let mut with = Vec::new();
        if allow_with && self.eat_keyword("WITH") {
            if self.eat(&TokenKind::LParen) {
                with.push(self.ident()?);
                while self.eat(&TokenKind::Comma) {
                    with.push(self.ident()?);
                }
                self.expect(&TokenKind::RParen)?;
            } else {
                with.push(self.ident()?);
            }
        }
        Ok(FromItem { model, alias, with })
    }

    fn model_name(&mut self) -> Result<ModelName> {
        let first = self.ident()?;
        if self.eat(&TokenKind::Colon) {
            let name = self.ident()?;
            return Ok(ModelName::namespaced(first, name));
        }
        Ok(ModelName::new(first))
    }

    fn join_type(&mut self) -> Result<Option<JoinType>> {
        let join_type = if self.eat_keyword("JOIN") {
            return Ok(Some(JoinType::Inner));
        } else if self.eat_keyword("INNER") {
            JoinType::Inner
        } else if self.eat_keyword("CROSS") {
            JoinType::Cross
        } else if self.eat_keyword("LEFT") {
            self.eat_keyword("OUTER");
            JoinType::Left
        } else if self.eat_keyword("RIGHT") {
            self.eat_keyword("OUTER");
            JoinType::Right
        } else if self.eat_keyword("FULL") {
            self.eat_keyword("OUTER");
            JoinType::FullOuter
        } else {
            return Ok(None);
        };
        self.expect_keyword("JOIN")?;
        Ok(Some(join_type))
    }

    fn join(&mut self, join_type: JoinType) -> Result<JoinClause> {
        let model = self.model_name()?;
        let alias = self.alias()?;
        let on = if self.eat_keyword("ON") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(JoinClause {
            join_type,
            model,
            alias,
            on,
        })
    }

    fn order_item(&mut self) -> Result<OrderItem> {
        let expr = self.expr()?;
        let direction = if self.eat_keyword("ASC") {
            Some(OrderDirection::Asc)
        } else if self.eat_keyword("DESC") {
            Some(OrderDirection::Desc)
        } else {
            None
        };
        Ok(OrderItem { expr, direction })
    }

    /// `LIMIT n [OFFSET m]`, or `LIMIT m, n` when offsets are allowed.
    fn limit(&mut self, allow_offset: bool) -> Result<Limit> {
        self.expect_keyword("LIMIT")?;
        let first = self.unary()?;
        if allow_offset {
            if self.eat_keyword("OFFSET") {
                let offset = self.unary()?;
                return Ok(Limit {
                    number: first,
                    offset: Some(offset),
                });
            }
            if self.eat(&TokenKind::Comma) {
                let number = self.unary()?;
                return Ok(Limit {
                    number,
                    offset: Some(first),
                });
            }
        }
        Ok(Limit {
            number: first,
            offset: None,
        })
    }

    fn insert(&mut self) -> Result<InsertStmt> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let model = self.model_name()?;

        let mut fields = None;
        if self.eat(&TokenKind::LParen) {
            let mut names = vec![self.ident()?];
            while self.eat(&TokenKind::Comma) {
                names.push(self.ident()?);
            }
            self.expect(&TokenKind::RParen)?;
            fields = Some(names);
        }

        self.expect_keyword("VALUES")?;
        self.expect(&TokenKind::LParen)?;
        let values = self.expr_list()?;
        self.expect(&TokenKind::RParen)?;
        Ok(InsertStmt {
            model,
            fields,
            values,
        })
    }

    fn update(&mut self) -> Result<UpdateStmt> {
        self.expect_keyword("UPDATE")?;
        let mut tables = vec![self.source(false)?];
        while self.eat(&TokenKind::Comma) {
            tables.push(self.source(false)?);
        }

        self.expect_keyword("SET")?;
        let mut assignments = vec![self.assignment()?];
        while self.eat(&TokenKind::Comma) {
            assignments.push(self.assignment()?);
        }

        let where_ = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        let limit = if self.is_keyword("LIMIT") {
            Some(self.limit(false)?)
        } else {
            None
        };
        Ok(UpdateStmt {
            tables,
            assignments,
            where_,
            limit,
        })
    }

    fn assignment(&mut self) -> Result<Assignment> {
        let column = self.qualified_name()?;
        self.expect(&TokenKind::Eq)?;
        let value = self.expr()?;
        Ok(Assignment { column, value })
    }

    fn delete(&mut self) -> Result<DeleteStmt> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let mut tables = vec![self.source(false)?];
        while self.eat(&TokenKind::Comma) {
            tables.push(self.source(false)?);
        }
        let where_ = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        let limit = if self.is_keyword("LIMIT") {
            Some(self.limit(false)?)
        } else {
            None
        };
        Ok(DeleteStmt {
            tables,
            where_,
            limit,
        })
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut items = vec![self.expr()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.expr()?);
        }
        Ok(items)
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("OR") {
            let right = self.and_expr()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("AND") {
            let right = self.not_expr()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            let operand = self.not_expr()?;
            return Ok(Expr::unary(UnaryOp::Not, operand));
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Expr> {
        let mut left = self.bit_or()?;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => Some(BinaryOp::Eq),
                TokenKind::Ne => Some(BinaryOp::Ne),
                TokenKind::Lt => Some(BinaryOp::Lt),
                TokenKind::Le => Some(BinaryOp::Le),
                TokenKind::Gt => Some(BinaryOp::Gt),
                TokenKind::Ge => Some(BinaryOp::Ge),
                _ => None,
            };
            if let Some(op) = op {
                self.bump();
                let right = self.bit_or()?;
                left = Expr::binary(op, left, right);
                continue;
            }

            if self.eat_keyword("IS") {
                let op = if self.eat_keyword("NOT") {
                    UnaryOp::IsNotNull
                } else {
                    UnaryOp::IsNull
                };
                self.expect_keyword("NULL")?;
                left = Expr::unary(op, left);
                continue;
            }

            if self.eat_keyword("AGAINST") {
                let right = self.bit_or()?;
                left = Expr::binary(BinaryOp::Against, left, right);
                continue;
            }

            let negated = self.is_keyword("NOT")
                && ["LIKE", "ILIKE", "IN", "BETWEEN"]
                    .iter()
                    .any(|k| self.is_keyword_nth(1, k));
            if negated {
                self.bump();
            }

            if self.eat_keyword("LIKE") {
                let op = if negated { BinaryOp::NotLike } else { BinaryOp::Like };
                let right = self.bit_or()?;
                left = Expr::binary(op, left, right);
            } else if self.eat_keyword("ILIKE") {
                let op = if negated { BinaryOp::NotILike } else { BinaryOp::ILike };
                let right = self.bit_or()?;
                left = Expr::binary(op, left, right);
            } else if self.eat_keyword("IN") {
                let op = if negated { BinaryOp::NotIn } else { BinaryOp::In };
                let right = self.in_list()?;
                left = Expr::binary(op, left, right);
            } else if self.eat_keyword("BETWEEN") {
                let op = if negated {
                    BinaryOp::NotBetween
                } else {
                    BinaryOp::Between
                };
                let low = self.bit_or()?;
                self.expect_keyword("AND")?;
                let high = self.bit_or()?;
                left = Expr::binary(op, left, Expr::binary(BinaryOp::And, low, high));
            } else {
                return Ok(left);
            }
        }
    }

    fn in_list(&mut self) -> Result<Expr> {
        self.expect(&TokenKind::LParen)?;
        if self.is_keyword("SELECT") {
            let select = self.select()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(Expr::Subquery(Box::new(select)));
        }
        let items = self.expr_list()?;
        self.expect(&TokenKind::RParen)?;
        Ok(Expr::List(items))
    }

    fn bit_or(&mut self) -> Result<Expr> {
        let mut left = self.bit_xor()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.bit_xor()?;
            left = Expr::binary(BinaryOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn bit_xor(&mut self) -> Result<Expr> {
        let mut left = self.bit_and()?;
        while self.eat(&TokenKind::Caret) {
            let right = self.bit_and()?;
            left = Expr::binary(BinaryOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        while self.eat(&TokenKind::Amp) {
            let right = self.additive()?;
            left = Expr::binary(BinaryOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            return Ok(match self.unary()? {
                Expr::Integer(v) => Expr::Integer(-v),
                Expr::Double(v) => Expr::Double(-v),
                operand => Expr::unary(UnaryOp::Minus, operand),
            });
        }
        if self.eat(&TokenKind::Tilde) {
            let operand = self.unary()?;
            return Ok(Expr::unary(UnaryOp::BitNot, operand));
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            TokenKind::Integer(v) => {
                self.bump();
                Ok(Expr::Integer(v))
            }
            TokenKind::Double(v) => {
                self.bump();
                Ok(Expr::Double(v))
            }
            TokenKind::String(s) => {
                self.bump();
                Ok(Expr::String(s))
            }
            TokenKind::Placeholder(p) => {
                self.bump();
                Ok(Expr::Placeholder(p))
            }
            TokenKind::LParen => {
                self.bump();
                if self.is_keyword("SELECT") {
                    let select = self.select()?;
                    self.expect(&TokenKind::RParen)?;
                    return Ok(Expr::Subquery(Box::new(select)));
                }
                let first = self.expr()?;
                if self.eat(&TokenKind::Comma) {
                    let mut items = vec![first];
                    items.extend(self.expr_list()?);
                    self.expect(&TokenKind::RParen)?;
                    return Ok(Expr::List(items));
                }
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::Parentheses(Box::new(first)))
            }
            TokenKind::Bracketed(_) => self.qualified_name(),
            TokenKind::Ident(word) => self.word(&word),
            _ => Err(self.unexpected()),
        }
    }

    /// Keyword-led expressions, function calls and column names.
    fn word(&mut self, word: &str) -> Result<Expr> {
        let upper = word.to_ascii_uppercase();
        match upper.as_str() {
            "TRUE" => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            "FALSE" => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            "NULL" => {
                self.bump();
                Ok(Expr::Null)
            }
            "EXISTS" => {
                self.bump();
                self.expect(&TokenKind::LParen)?;
                let select = self.select()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::unary(UnaryOp::Exists, Expr::Subquery(Box::new(select))))
            }
            "CASE" => {
                self.bump();
                self.case()
            }
            "CAST" => {
                self.bump();
                self.expect(&TokenKind::LParen)?;
                let expr = self.expr()?;
                self.expect_keyword("AS")?;
                let type_name = self.type_name()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::Cast {
                    expr: Box::new(expr),
                    type_name,
                })
            }
            "CONVERT" => {
                self.bump();
                self.expect(&TokenKind::LParen)?;
                let expr = self.expr()?;
                self.expect_keyword("USING")?;
                let charset = self.ident()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::Convert {
                    expr: Box::new(expr),
                    charset,
                })
            }
            _ if is_reserved(word) => Err(self.unexpected()),
            _ if *self.peek_nth(1) == TokenKind::LParen => {
                self.bump();
                self.bump();
                self.function(word.to_string())
            }
            _ => self.qualified_name(),
        }
    }

    fn function(&mut self, name: String) -> Result<Expr> {
        let distinct = self.eat_keyword("DISTINCT");
        let args = if self.eat(&TokenKind::RParen) {
            return Ok(Expr::Function {
                name,
                args: Vec::new(),
                distinct,
            });
        } else if self.eat(&TokenKind::Star) {
            vec![Expr::All]
        } else {
            self.expr_list()?
        };
        self.expect(&TokenKind::RParen)?;
        Ok(Expr::Function {
            name,
            args,
            distinct,
        })
    }

    fn case(&mut self) -> Result<Expr> {
        let subject = if self.is_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let mut whens = Vec::new();
        while self.eat_keyword("WHEN") {
            let condition = self.expr()?;
            self.expect_keyword("THEN")?;
            let result = self.expr()?;
            whens.push((condition, result));
        }
        if whens.is_empty() {
            return Err(self.unexpected());
        }
        let otherwise = if self.eat_keyword("ELSE") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(Expr::Case {
            subject,
            whens,
            otherwise,
        })
    }

    /// `INTEGER`, `DECIMAL(10, 2)`, `CHAR(5)`
    fn type_name(&mut self) -> Result<String> {
        let mut name = self.ident()?;
        if self.eat(&TokenKind::LParen) {
            let mut sizes = Vec::new();
            loop {
                match self.bump() {
                    TokenKind::Integer(v) => sizes.push(v.to_string()),
                    _ => return Err(self.unexpected_previous()),
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
            name = format!("{}({})", name, sizes.join(", "));
        }
        Ok(name)
    }

    fn qualified_name(&mut self) -> Result<Expr> {
        let first = self.ident()?;
        if self.eat(&TokenKind::Dot) {
            let name = self.ident()?;
            return Ok(Expr::qualified(first, name));
        }
        Ok(Expr::column(first))
    }

    /// A non-keyword identifier or a bracketed one.
    fn ident(&mut self) -> Result<String> {
        match self.peek_ident() {
            Some(name) => {
                self.bump();
                Ok(name)
            }
            None => Err(self.unexpected()),
        }
    }

    fn peek_ident(&self) -> Option<String> {
        match self.peek() {
            TokenKind::Ident(name) if !is_reserved(name) => Some(name.clone()),
            TokenKind::Bracketed(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        self.tokens.get(self.pos + n).map_or(&EOF, |t| &t.kind)
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.is_keyword_nth(0, keyword)
    }

    fn is_keyword_nth(&self, n: usize, keyword: &str) -> bool {
        matches!(self.peek_nth(n), TokenKind::Ident(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.peek() {
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    fn unexpected(&self) -> Error {
        self.error_at(self.pos)
    }

    fn unexpected_previous(&self) -> Error {
        self.error_at(self.pos.saturating_sub(1))
    }

    fn error_at(&self, index: usize) -> Error {
        let (message, position) = match self.tokens.get(index) {
            None => ("Syntax error, unexpected EOF".to_string(), self.phql.len()),
            Some(token) if token.kind == TokenKind::Eof => {
                ("Syntax error, unexpected EOF".to_string(), token.offset)
            }
            Some(token) => {
                let near = self.phql.get(token.offset..).unwrap_or_default();
                (
                    format!("Syntax error, unexpected {}, near to '{}'", token.kind, near),
                    token.offset,
                )
            }
        };
        Error::Parse(ParseError {
            message,
            phql: self.phql.to_string(),
            position: Some(position),
        })
    }
}
