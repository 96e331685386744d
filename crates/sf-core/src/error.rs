//! Error types for skimflow

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Namespace in which a name collision was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// Source or derived column.
    Column,
    /// Named cut stage.
    Stage,
    /// Monitor histogram (`<column>_<checkpoint>`).
    Histogram,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Column => f.write_str("column"),
            NameKind::Stage => f.write_str("stage"),
            NameKind::Histogram => f.write_str("histogram"),
        }
    }
}

/// skimflow error type
#[derive(Error, Debug)]
pub enum Error {
    /// A predicate, derivation or output list references a column that is not
    /// part of the current schema.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// A derived column, stage or histogram name collides with an existing one.
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName {
        /// Namespace of the collision.
        kind: NameKind,
        /// The offending name.
        name: String,
    },

    /// The resolved list of input locators is empty.
    #[error("no input sources for '{0}'")]
    EmptySource(String),

    /// The output destination cannot be created, opened or finalized.
    #[error("cannot write {}: {message}", .path.display())]
    IoWrite {
        /// Destination path.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// The event loop failed while materializing a view.
    #[error(
        "execution failed on source '{source_name}' after {events_processed} events: {message}"
    )]
    EngineExecution {
        /// Locator (or partition label) being processed when the failure happened.
        source_name: String,
        /// Events fully processed before the failure, summed over all partitions.
        events_processed: u64,
        /// Underlying failure.
        message: String,
    },

    /// Expression parse, type or evaluation error.
    #[error("Expression error: {0}")]
    Expression(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not permitted in the pipeline's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::DuplicateName`].
    pub fn duplicate(kind: NameKind, name: impl Into<String>) -> Self {
        Error::DuplicateName { kind, name: name.into() }
    }

    /// Shorthand for [`Error::IoWrite`].
    pub fn io_write(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Error::IoWrite { path: path.into(), message: message.to_string() }
    }

    /// True for errors raised while building a pipeline, before any event is read.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownColumn(_)
                | Error::DuplicateName { .. }
                | Error::Expression(_)
                | Error::Validation(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
