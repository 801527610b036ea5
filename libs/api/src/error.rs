/// Category of a codec error. Lets the orchestrator tell a benign format
/// miss apart from a degraded dependency or a broken internal contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes are not in this codec's format. Soft rejection.
    Mismatch,
    /// A collaborator (schema registry, BSR, descriptor registry) failed.
    Dependency,
    /// The codec is missing configuration it needs.
    Config,
    /// The caller's context was cancelled or its deadline passed.
    Cancelled,
    /// A closed, versioned framing was violated (e.g. `__consumer_offsets`).
    Structural,
    /// Anything else (invalid arguments, unsupported operation).
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Mismatch => f.write_str("mismatch"),
            ErrorKind::Dependency => f.write_str("dependency"),
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::Structural => f.write_str("structural"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Unified error type for all codec operations.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// `From` impls assign the appropriate kind automatically and allow
/// ergonomic `?` in codec implementations.
#[derive(Clone, PartialEq, Eq)]
pub struct SerdeError {
    kind: ErrorKind,
    message: String,
}

impl SerdeError {
    /// Generic logic error (default kind).
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    /// The payload is not in the codec's format.
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Mismatch, message: msg.into() }
    }

    /// A registry or other collaborator failed.
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Dependency, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Cancelled, message: msg.into() }
    }

    pub fn structural(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Structural, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for failures that point at a degraded collaborator rather than
    /// at the payload itself.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::Dependency | ErrorKind::Cancelled)
    }

    /// Add context to the error, preserving the original `ErrorKind`.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl std::fmt::Debug for SerdeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for SerdeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SerdeError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → SerdeError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<String> for SerdeError {
    fn from(s: String) -> Self { Self { kind: ErrorKind::Logic, message: s } }
}

impl From<&str> for SerdeError {
    fn from(s: &str) -> Self { Self { kind: ErrorKind::Logic, message: s.to_string() } }
}

impl From<std::io::Error> for SerdeError {
    fn from(e: std::io::Error) -> Self { Self { kind: ErrorKind::Dependency, message: e.to_string() } }
}

impl From<serde_json::Error> for SerdeError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ErrorKind::Mismatch, message: e.to_string() } }
}

impl From<std::str::Utf8Error> for SerdeError {
    fn from(e: std::str::Utf8Error) -> Self { Self { kind: ErrorKind::Mismatch, message: e.to_string() } }
}

impl From<std::string::FromUtf8Error> for SerdeError {
    fn from(e: std::string::FromUtf8Error) -> Self { Self { kind: ErrorKind::Mismatch, message: e.to_string() } }
}
