//! Error types for the engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Unsupported column type {data_type} for column '{column}'")]
    UnsupportedType {
        column: String,
        data_type: arrow::datatypes::DataType,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Engine is closed")]
    EngineClosed,

    #[error("Cursor already consumed")]
    CursorConsumed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlparser::parser::ParserError> for EngineError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        EngineError::Parse(e.to_string())
    }
}
