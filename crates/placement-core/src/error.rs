//! Error types for the placement policy engine.
//!
//! Errors only ever surface while configuration is being loaded. Looking up a
//! placement never fails: unknown identifiers resolve to a deny-all filter.
//! All errors implement `std::error::Error` and are serializable so that they
//! can be reported by tooling in structured form.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias using PlacementError as the error type.
pub type Result<T> = std::result::Result<T, PlacementError>;

/// Top-level error type for all placement operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum PlacementError {
    /// Placement definitions could not be parsed or evaluated
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Errors raised while loading a `id:expression;...` definition string.
///
/// Every variant carries the offending entry text so the operator can find
/// it in the configuration.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ParseError {
    /// Entry has no `:` separating the identifier from the expression
    #[error("Malformed placement entry {entry:?}: expected <id>:<expression>")]
    MalformedEntry { entry: String },

    /// Identifier is not a valid placement number
    #[error("Invalid placement id {value:?} in entry {entry:?}")]
    InvalidPlacementId { entry: String, value: String },

    /// Expression failed to evaluate
    #[error("Invalid placement definition {entry:?}: {source}")]
    Definition {
        entry: String,
        source: ExpressionError,
    },
}

impl ParseError {
    /// Creates a definition error for an entry.
    pub fn definition(entry: impl Into<String>, source: ExpressionError) -> Self {
        Self::Definition {
            entry: entry.into(),
            source,
        }
    }

    /// Returns the entry text that caused the error.
    pub fn entry(&self) -> &str {
        match self {
            ParseError::MalformedEntry { entry }
            | ParseError::InvalidPlacementId { entry, .. }
            | ParseError::Definition { entry, .. } => entry,
        }
    }
}

/// Errors raised by the rule expression language.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExpressionError {
    /// Lexical or grammatical error
    #[error("syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Call to a function outside the builtin table
    #[error("unknown function {name:?}")]
    UnknownFunction { name: String },

    /// Wrong number of arguments
    #[error("{function}() expects {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Argument of the wrong type
    #[error("argument {position} of {function}() should be {expected}, got {actual}")]
    ArgumentType {
        function: String,
        position: usize,
        expected: String,
        actual: String,
    },

    /// Country token that is neither an alias nor an ISO 3166-1 alpha-2 code
    #[error("invalid country code {code:?}")]
    InvalidCountryCode { code: String },

    /// Node identifier in tag() is not valid
    #[error("invalid node id {value:?}: {reason}")]
    InvalidNodeId { value: String, reason: String },

    /// placement() called with a number outside the identifier range
    #[error("invalid placement reference {value}")]
    InvalidPlacementReference { value: i64 },

    /// `&&` applied to something that is not a filter
    #[error("&& is supported only between filters, got {left} && {right}")]
    AndOperand { left: String, right: String },

    /// Expression evaluated to something other than a filter
    #[error("expression should evaluate to a filter, got {actual}")]
    NotAFilter { actual: String },

    /// Resulting filter nests deeper than a definition may
    #[error("filter nests {depth} calls deep, the limit is {limit}")]
    TooDeep { depth: usize, limit: usize },
}

impl ExpressionError {
    /// Creates a syntax error.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Creates an argument type error.
    pub fn argument_type(
        function: impl Into<String>,
        position: usize,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ArgumentType {
            function: function.into(),
            position,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Same placement id configured twice
    #[error("Duplicate placement id: {id}")]
    DuplicatePlacement { id: u16 },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Wrapper for I/O errors to make them serializable.
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("I/O error: {kind:?}: {message}")]
pub struct IoError {
    pub kind: IoErrorKind,
    pub message: String,
}

impl From<io::Error> for IoError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: err.kind().into(),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for PlacementError {
    fn from(err: io::Error) -> Self {
        PlacementError::Io(err.into())
    }
}

/// Serializable subset of std::io::ErrorKind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    InvalidInput,
    InvalidData,
    UnexpectedEof,
    Other,
}

impl From<io::ErrorKind> for IoErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => IoErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => IoErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput => IoErrorKind::InvalidInput,
            io::ErrorKind::InvalidData => IoErrorKind::InvalidData,
            io::ErrorKind::UnexpectedEof => IoErrorKind::UnexpectedEof,
            _ => IoErrorKind::Other,
        }
    }
}
