//! The main Error type for stepcraft

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all stepcraft operations.
///
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the error is retryable
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use stepcraft_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::InferenceFailed, "model returned empty response")
///     .with_operation("interpreter::step")
///     .with_status(ErrorStatus::Temporary)
///     .with_context("agent", "planner")
///     .with_context("model", "gpt-4o");
///
/// assert_eq!(err.kind(), ErrorKind::InferenceFailed);
/// assert!(err.status().is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up a context value by key
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark as permanent (not retryable)
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }

    /// True for errors that stem from setup rather than from the run itself
    pub fn is_config(&self) -> bool {
        self.kind == ErrorKind::ConfigInvalid
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn agent_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::AgentNotFound, format!("agent '{}' not found", name))
            .with_context("agent", name)
    }

    pub fn already_exists(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::AlreadyExists, format!("'{}' is already registered", name))
            .with_context("name", name)
    }

    pub fn cancelled(operation: &'static str) -> Self {
        Self::new(ErrorKind::Cancelled, "run cancelled").with_operation(operation)
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    pub fn tool_timeout(name: impl Into<String>, secs: u64) -> Self {
        let name = name.into();
        Self::new(ErrorKind::ToolTimeout, format!("tool '{}' timed out after {}s", name, secs))
            .with_context("tool", name)
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }

    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationFailed, message)
    }
}
