//! Error taxonomy for building and running pipelines.
//!
//! Exactly one kind of failure is recoverable: [`ActionError::Content`], a
//! content-shape mismatch such as a query that matched zero or several nodes
//! where one was required. Only `|?` (optional sequence) intercepts it.
//! Everything else aborts the evaluation.

/// A failure raised by a leaf action (or by a combinator rejecting its input).
#[derive(thiserror::Error, Debug)]
pub enum ActionError {
    /// Content-shape mismatch. The only recoverable error.
    #[error("{0}")]
    Content(String),

    #[error("expected {expected}, got {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed {what}: {message}")]
    Malformed { what: &'static str, message: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    /// Whether `|?` may absorb this error into an absent result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ActionError::Content(_))
    }

    pub(crate) fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        ActionError::Type { expected, found }
    }
}

/// Pipeline text could not be compiled. Always fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    /// Byte offset of the offending token.
    pub position: usize,
    /// 1-based line of `position`.
    pub line: usize,
    /// 1-based column (in characters) of `position`.
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn at(source: &str, position: usize, message: impl Into<String>) -> Self {
        let position = position.min(source.len());
        let before = &source[..position];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = source[line_start..position].chars().count() + 1;
        Self {
            position,
            line,
            column,
            message: message.into(),
        }
    }

    /// The offending source line with a caret under the failing column.
    pub fn snippet(&self, source: &str) -> String {
        let line = source.lines().nth(self.line - 1).unwrap_or("");
        format!("{line}\n{}^", " ".repeat(self.column - 1))
    }
}

/// A combinator was composed incorrectly.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("duplicate field name '{0}'")]
    DuplicateField(String),
}

/// An evaluation failed. Carries the innermost failing node.
#[derive(thiserror::Error, Debug)]
#[error("{node} failed on {input}: {source}")]
pub struct EvalError {
    /// Textual form (or label) of the node that failed.
    pub node: String,
    /// Summary of the value the node was given.
    pub input: String,
    #[source]
    pub source: ActionError,
}

impl EvalError {
    pub fn new(node: String, input: String, source: ActionError) -> Self {
        Self {
            node,
            input,
            source,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.source.is_recoverable()
    }
}

/// Any failure observable from the top-level entry points.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl Error {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Eval(e) if e.is_recoverable())
    }
}
