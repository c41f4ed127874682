//! Error types for PHQL operations.

use std::fmt;

/// The primary error type for all PHQL operations.
#[derive(Debug)]
pub enum Error {
    /// Statement resolution, configuration and execution failures
    Query(QueryError),
    /// Malformed PHQL text
    Parse(ParseError),
    /// Storage connection failures
    Connection(ConnectionError),
    /// Transaction misuse (commit without begin, etc.)
    Transaction(TransactionError),
    /// Model meta-data lookups
    MetaData(MetaDataError),
    /// Result cache backend failures
    Cache(CacheError),
    /// Type conversion errors
    Type(TypeError),
    /// Configuration errors (relation registration, namespaces)
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// The PHQL statement being prepared or executed, when known
    pub phql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Unknown or ambiguous columns, aliases, models and bind parameters
    Resolution,
    /// Relations, namespaces or statement shapes that cannot be supported
    Configuration,
    /// Failures while running a prepared statement
    Execution,
}

impl QueryErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            QueryErrorKind::Resolution => "resolution",
            QueryErrorKind::Configuration => "configuration",
            QueryErrorKind::Execution => "execution",
        }
    }
}

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub phql: String,
    /// Byte offset of the offending token
    pub position: Option<usize>,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub message: String,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already open on the connection
    AlreadyActive,
    /// Commit or rollback without an open transaction
    NotActive,
}

#[derive(Debug)]
pub struct MetaDataError {
    pub model: String,
    pub message: String,
}

#[derive(Debug)]
pub struct CacheError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// A resolution failure raised while preparing `phql`.
    pub fn resolution(message: impl Into<String>, phql: &str) -> Self {
        Error::Query(QueryError::new(QueryErrorKind::Resolution, message).with_phql(phql))
    }

    /// A configuration failure raised while preparing or executing `phql`.
    pub fn configuration(message: impl Into<String>, phql: &str) -> Self {
        Error::Query(QueryError::new(QueryErrorKind::Configuration, message).with_phql(phql))
    }

    /// An execution failure, optionally tied to a statement.
    pub fn execution(message: impl Into<String>, phql: Option<&str>) -> Self {
        let mut err = QueryError::new(QueryErrorKind::Execution, message);
        if let Some(phql) = phql {
            err = err.with_phql(phql);
        }
        Error::Query(err)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    pub fn connection(message: impl Into<String>, sql: Option<&str>) -> Self {
        Error::Connection(ConnectionError {
            message: message.into(),
            sql: sql.map(str::to_string),
            source: None,
        })
    }

    pub fn metadata(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MetaData(MetaDataError {
            model: model.into(),
            message: message.into(),
        })
    }

    /// The query error kind, if this is a query error.
    pub fn query_kind(&self) -> Option<QueryErrorKind> {
        match self {
            Error::Query(q) => Some(q.kind),
            _ => None,
        }
    }

    /// The bare message without category prefix or statement suffix.
    pub fn message(&self) -> &str {
        match self {
            Error::Query(e) => &e.message,
            Error::Parse(e) => &e.message,
            Error::Connection(e) => &e.message,
            Error::Transaction(e) => &e.message,
            Error::MetaData(e) => &e.message,
            Error::Cache(e) => &e.message,
            Error::Type(e) => e.expected,
            Error::Config(e) => &e.message,
            Error::Serde(msg) | Error::Custom(msg) => msg,
        }
    }

    /// Get the PHQL that caused this error, if available
    pub fn phql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.phql.as_deref(),
            Error::Parse(p) => Some(&p.phql),
            _ => None,
        }
    }
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            phql: None,
            source: None,
        }
    }

    pub fn with_phql(mut self, phql: impl Into<String>) -> Self {
        self.phql = Some(phql.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => match &e.phql {
                Some(phql) => write!(f, "{}, when preparing: {}", e.message, phql),
                None => write!(f, "{}", e.message),
            },
            Error::Parse(e) => match e.position {
                Some(pos) => write!(
                    f,
                    "{} at offset {}, when parsing: {}",
                    e.message, pos, e.phql
                ),
                None => write!(f, "{}, when parsing: {}", e.message, e.phql),
            },
            Error::Connection(e) => match &e.sql {
                Some(sql) => write!(f, "Connection error: {} (sql: {})", e.message, sql),
                None => write!(f, "Connection error: {}", e.message),
            },
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::MetaData(e) => write!(f, "Meta-data error for '{}': {}", e.model, e.message),
            Error::Cache(e) => write!(f, "Cache error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Cache(e) => e
                .source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
