//! Error types for pgpipe

use std::fmt;
use thiserror::Error;

/// Result type alias for pgpipe operations
pub type PipeResult<T> = Result<T, PipeError>;

/// Pipeline position attached to statement errors, rendered as ` at #n` when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position(pub Option<usize>);

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, " at #{n}"),
            None => Ok(()),
        }
    }
}

/// Error types for statement execution and pipelines
#[derive(Debug, Error)]
pub enum PipeError {
    /// Key/value argument list with an odd number of items
    #[error("kv got the odd number of input pairs {0}")]
    InvalidArgumentCount(usize),

    /// An INSERT ran but produced no identifier
    #[error("insert returned no identifier")]
    InsertNoIdentifier,

    /// Preparing a statement failed
    #[error("prepare failed{position}: {source}")]
    StatementPreparation {
        position: Position,
        #[source]
        source: Box<PipeError>,
    },

    /// Executing a prepared statement failed
    #[error("execute failed{position}: {source}")]
    StatementExecution {
        position: Position,
        #[source]
        source: Box<PipeError>,
    },

    /// A pipeline statement failed and the transaction was rolled back
    #[error("transaction aborted at statement #{position} ({statement}): {source}")]
    TransactionAborted {
        position: usize,
        statement: String,
        #[source]
        source: Box<PipeError>,
    },

    /// A named placeholder has no bound value
    #[error("missing value for named parameter ':{0}'")]
    MissingParameter(String),

    /// A statement uses both `:name` and positional `$n` placeholders
    #[error("statement mixes :name and positional $n placeholders")]
    MixedPlaceholders,

    /// A result reference was used where no execution result exists
    #[error("result reference to '{0}' cannot be resolved outside a pipeline")]
    UnresolvedReference(String),

    /// The run was cancelled between statements
    #[error("pipeline cancelled")]
    Cancelled,

    /// The run deadline passed between statements
    #[error("pipeline deadline exceeded")]
    DeadlineExceeded,

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Builder used the wrong way (e.g. `exec` on a pipeline)
    #[error("{0}")]
    Misuse(&'static str),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl PipeError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap a driver error raised while preparing.
    pub fn preparation(source: PipeError) -> Self {
        Self::StatementPreparation {
            position: Position::default(),
            source: Box::new(source),
        }
    }

    /// Wrap a driver error raised while executing.
    pub fn execution(source: PipeError) -> Self {
        Self::StatementExecution {
            position: Position::default(),
            source: Box::new(source),
        }
    }

    /// Stamp the pipeline position on prepare/execute errors; other errors pass through.
    pub fn at_position(self, n: usize) -> Self {
        match self {
            Self::StatementPreparation { source, .. } => Self::StatementPreparation {
                position: Position(Some(n)),
                source,
            },
            Self::StatementExecution { source, .. } => Self::StatementExecution {
                position: Position(Some(n)),
                source,
            },
            other => other,
        }
    }

    /// Follow `TransactionAborted` / statement wrappers down to the underlying error.
    pub fn root_cause(&self) -> &PipeError {
        match self {
            Self::TransactionAborted { source, .. }
            | Self::StatementPreparation { source, .. }
            | Self::StatementExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this error (or its root cause) is a missing insert identifier
    pub fn is_insert_no_identifier(&self) -> bool {
        matches!(self.root_cause(), Self::InsertNoIdentifier)
    }

    /// Check if this error aborted a pipeline transaction
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, Self::TransactionAborted { .. })
    }

    /// Check if this is a cancellation or deadline error
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.root_cause(), Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound(_))
    }

    /// Parse a tokio_postgres error into a more specific PipeError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for PipeError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
