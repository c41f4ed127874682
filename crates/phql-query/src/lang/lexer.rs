//! PHQL tokenizer.

use super::ast::Placeholder;
use phql_core::bind::BindKey;
use phql_core::error::{Error, ParseError};
use phql_core::Result;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare identifier or keyword
    Ident(String),
    /// `[identifier]`, never a keyword
    Bracketed(String),
    Integer(i64),
    Double(f64),
    String(String),
    Placeholder(Placeholder),
    Comma,
    Dot,
    /// Namespace separator in `ns:Model`
    Colon,
    LParen,
    RParen,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "IDENTIFIER({s})"),
            TokenKind::Bracketed(s) => write!(f, "IDENTIFIER([{s}])"),
            TokenKind::Integer(v) => write!(f, "INTEGER({v})"),
            TokenKind::Double(v) => write!(f, "DOUBLE({v})"),
            TokenKind::String(s) => write!(f, "STRING({s})"),
            TokenKind::Placeholder(p) => write!(f, "PLACEHOLDER({})", p.key),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::Amp => f.write_str("&"),
            TokenKind::Pipe => f.write_str("|"),
            TokenKind::Caret => f.write_str("^"),
            TokenKind::Tilde => f.write_str("~"),
            TokenKind::Eq => f.write_str("="),
            TokenKind::Ne => f.write_str("<>"),
            TokenKind::Lt => f.write_str("<"),
            TokenKind::Le => f.write_str("<="),
            TokenKind::Gt => f.write_str(">"),
            TokenKind::Ge => f.write_str(">="),
            TokenKind::Eof => f.write_str("EOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub offset: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

pub struct Lexer<'a> {
    phql: &'a str,
    src: &'a str,
    next_positional: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(phql: &'a str) -> Lexer<'a> {
        Lexer {
            phql,
            src: phql,
            next_positional: 0,
        }
    }

    /// Split the whole statement into tokens. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens: Vec<Token> = Vec::new();

        loop {
            self.skip_whitespace();
            let offset = self.offset();
            let glued = tokens.last().is_some_and(|t| {
                t.end == offset && matches!(t.kind, TokenKind::Ident(_) | TokenKind::Bracketed(_))
            });

            let Some(ch) = self.try_next_char() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    offset,
                    end: offset,
                });
                return Ok(tokens);
            };

            let kind = match ch {
                ',' => TokenKind::Comma,
                '.' => TokenKind::Dot,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '*' => TokenKind::Star,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '&' => TokenKind::Amp,
                '|' => TokenKind::Pipe,
                '^' => TokenKind::Caret,
                '~' => TokenKind::Tilde,
                '=' => TokenKind::Eq,
                '<' => {
                    if self.take_if(|c| c == '=').is_some() {
                        TokenKind::Le
                    } else if self.take_if(|c| c == '>').is_some() {
                        TokenKind::Ne
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    if self.take_if(|c| c == '=').is_some() {
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '!' => {
                    if self.take_if(|c| c == '=').is_some() {
                        TokenKind::Ne
                    } else {
                        return Err(self.error(offset));
                    }
                }
                ':' if glued => TokenKind::Colon,
                ':' => self.colon_placeholder(offset)?,
                '?' => self.numeric_placeholder(),
                '{' => self.brace_placeholder(offset)?,
                '[' => {
                    let name = self.take_until(']').ok_or_else(|| self.error(offset))?;
                    TokenKind::Bracketed(name.to_string())
                }
                '\'' | '"' => self.string(ch, offset)?,
                ch if ch.is_ascii_digit() => self.number(ch, offset)?,
                ch if ident_start(ch) => {
                    let mut ident = String::new();
                    ident.push(ch);
                    while let Some(ch) = self.take_if(ident_ch) {
                        ident.push(ch);
                    }
                    TokenKind::Ident(ident)
                }
                _ => return Err(self.error(offset)),
            };

            tokens.push(Token {
                kind,
                offset,
                end: self.offset(),
            });
        }
    }

    /// `:name:`, `:name:type` or `:0:`
    fn colon_placeholder(&mut self, offset: usize) -> Result<TokenKind> {
        let mut name = String::new();
        while let Some(ch) = self.take_if(|c| c == '_' || c.is_alphanumeric()) {
            name.push(ch);
        }
        if name.is_empty() {
            return Err(self.error(offset));
        }

        let mut type_name = None;
        if self.take_if(|c| c == ':').is_some() {
            let mut ty = String::new();
            while let Some(ch) = self.take_if(|c| c == '_' || c == '-' || c.is_alphanumeric()) {
                ty.push(ch);
            }
            if !ty.is_empty() {
                type_name = Some(ty);
            }
        }

        Ok(TokenKind::Placeholder(Placeholder {
            key: BindKey::parse(&name),
            type_name,
        }))
    }

    /// `?0`, or a bare `?` numbered in order of appearance
    fn numeric_placeholder(&mut self) -> TokenKind {
        let mut digits = String::new();
        while let Some(ch) = self.take_if(|c| c.is_ascii_digit()) {
            digits.push(ch);
        }
        let position = match digits.parse::<usize>() {
            Ok(position) => position,
            Err(_) => {
                let position = self.next_positional;
                self.next_positional += 1;
                position
            }
        };
        TokenKind::Placeholder(Placeholder {
            key: BindKey::Positional(position),
            type_name: None,
        })
    }

    /// `{name}` or `{name:type}`
    fn brace_placeholder(&mut self, offset: usize) -> Result<TokenKind> {
        let body = self.take_until('}').ok_or_else(|| self.error(offset))?;
        let (name, type_name) = match body.split_once(':') {
            Some((name, ty)) => (name.trim(), Some(ty.trim().to_string())),
            None => (body.trim(), None),
        };
        if name.is_empty() {
            return Err(self.error(offset));
        }
        Ok(TokenKind::Placeholder(Placeholder {
            key: BindKey::parse(name),
            type_name,
        }))
    }

    fn string(&mut self, quote: char, offset: usize) -> Result<TokenKind> {
        let mut s = String::new();
        loop {
            match self.try_next_char() {
                None => return Err(self.error(offset)),
                Some('\\') => {
                    s.push('\\');
                    if let Some(escaped) = self.try_next_char() {
                        s.push(escaped);
                    }
                }
                Some(ch) if ch == quote => break,
                Some(ch) => s.push(ch),
            }
        }
        Ok(TokenKind::String(s))
    }

    fn number(&mut self, first: char, offset: usize) -> Result<TokenKind> {
        if first == '0' && matches!(self.peek_char(), Some('x' | 'X')) {
            self.consume(1);
            let mut hex = String::new();
            while let Some(ch) = self.take_if(|c| c.is_ascii_hexdigit()) {
                hex.push(ch);
            }
            return i64::from_str_radix(&hex, 16)
                .map(TokenKind::Integer)
                .map_err(|_| self.error(offset));
        }

        let mut digits = String::new();
        digits.push(first);
        while let Some(ch) = self.take_if(|c| c.is_ascii_digit()) {
            digits.push(ch);
        }

        let fraction = self.peek_char() == Some('.')
            && self.peek_char_n(1).is_some_and(|c| c.is_ascii_digit());
        if fraction {
            self.consume(1);
            digits.push('.');
            while let Some(ch) = self.take_if(|c| c.is_ascii_digit()) {
                digits.push(ch);
            }
            return digits
                .parse::<f64>()
                .map(TokenKind::Double)
                .map_err(|_| self.error(offset));
        }

        digits
            .parse::<i64>()
            .map(TokenKind::Integer)
            .map_err(|_| self.error(offset))
    }

    fn error(&self, offset: usize) -> Error {
        let near = self.phql.get(offset..).unwrap_or_default();
        Error::Parse(ParseError {
            message: format!("Scanning error before '{near}'"),
            phql: self.phql.to_string(),
            position: Some(offset),
        })
    }

    fn offset(&self) -> usize {
        self.phql.len() - self.src.len()
    }

    fn try_next_char(&mut self) -> Option<char> {
        match self.src.chars().next() {
            Some(ch) => {
                self.consume(ch.len_utf8());
                Some(ch)
            }
            None => None,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.peek_char_n(0)
    }

    fn peek_char_n(&self, n: usize) -> Option<char> {
        self.src.chars().nth(n)
    }

    fn take_if<P>(&mut self, predicate: P) -> Option<char>
    where
        P: FnOnce(char) -> bool,
    {
        match self.peek_char() {
            Some(ch) if predicate(ch) => {
                self.consume(ch.len_utf8());
                Some(ch)
            }
            _ => None,
        }
    }

    /// Consume up to and including `end`, returning what came before it.
    fn take_until(&mut self, end: char) -> Option<&'a str> {
        let index = self.src.find(end)?;
        let (body, rest) = self.src.split_at(index);
        self.src = rest.get(end.len_utf8()..).unwrap_or_default();
        Some(body)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            match ch {
                '/' if self.peek_char_n(1) == Some('*') => {
                    self.consume(2);
                    self.skip_block_comment();
                }
                '-' if self.peek_char_n(1) == Some('-') => self.skip_line_comment(),
                ch if ch.is_whitespace() => self.consume(ch.len_utf8()),
                _ => return,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            self.consume(ch.len_utf8());
            if ch == '*' && self.peek_char() == Some('/') {
                self.consume(1);
                return;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            self.consume(ch.len_utf8());
            if ch == '\n' {
                return;
            }
        }
    }

    fn consume(&mut self, amount: usize) {
        self.src = self.src.get(amount..).unwrap_or_default();
    }
}

fn ident_start(ch: char) -> bool {
    ch == '_' || ch == '\\' || ch.is_alphabetic()
}

fn ident_ch(ch: char) -> bool {
    ch == '_' || ch == '\\' || ch.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(phql: &str) -> Vec<TokenKind> {
        Lexer::new(phql)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn placeholder(key: impl Into<BindKey>, type_name: Option<&str>) -> TokenKind {
        TokenKind::Placeholder(Placeholder {
            key: key.into(),
            type_name: type_name.map(str::to_string),
        })
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            kinds(":min: ?1 {id} {ids:array-int} :x:int ? ?"),
            vec![
                placeholder("min", None),
                placeholder(1_usize, None),
                placeholder("id", None),
                placeholder("ids", Some("array-int")),
                placeholder("x", Some("int")),
                placeholder(0_usize, None),
                placeholder(1_usize, None),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_namespace_colon_is_glued() {
        assert_eq!(
            kinds("store:Robots"),
            vec![
                TokenKind::Ident("store".into()),
                TokenKind::Colon,
                TokenKind::Ident("Robots".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds(r"Store\Robots"),
            vec![TokenKind::Ident(r"Store\Robots".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_literals_and_operators() {
        assert_eq!(
            kinds("r.price >= 1.5 AND id <> 0x1F OR name != 'it\\'s'"),
            vec![
                TokenKind::Ident("r".into()),
                TokenKind::Dot,
                TokenKind::Ident("price".into()),
                TokenKind::Ge,
                TokenKind::Double(1.5),
                TokenKind::Ident("AND".into()),
                TokenKind::Ident("id".into()),
                TokenKind::Ne,
                TokenKind::Integer(31),
                TokenKind::Ident("OR".into()),
                TokenKind::Ident("name".into()),
                TokenKind::Ne,
                TokenKind::String("it\\'s".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_brackets_and_comments() {
        assert_eq!(
            kinds("[from] /* hidden */ -- trailing\n [x y]"),
            vec![
                TokenKind::Bracketed("from".into()),
                TokenKind::Bracketed("x y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_offsets() {
        let tokens = Lexer::new("SELECT  name").tokenize().unwrap();
        assert_eq!(tokens[1].offset, 8);
        assert_eq!(tokens[1].end, 12);
        assert_eq!(tokens[2].offset, 12);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("SELECT 'abc").tokenize().unwrap_err();
        assert!(matches!(err, Error::Parse(ref e) if e.position == Some(7)));
    }
}
