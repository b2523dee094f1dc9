//! Error kinds for stepcraft operations

use std::fmt;

/// The kind of error that occurred.
///
/// Only a handful of these ever cross a run boundary: the interpreter turns
/// tool failures, access denials and output-parse failures into data. What
/// remains here is what a caller has to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration (missing credentials, limits exceeded, bad definitions)
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Registry errors
    // =========================================================================
    /// No agent with the requested name is registered
    AgentNotFound,

    /// An item with the same name is already registered
    AlreadyExists,

    // =========================================================================
    // Execution errors
    // =========================================================================
    /// The run was cancelled from outside
    Cancelled,

    /// A tool call failed in a way the dispatcher could not express as a result
    ToolFailed,

    /// A tool call exceeded its deadline
    ToolTimeout,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Context too large for model
    ContextTooLarge,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            ErrorKind::AgentNotFound => "AgentNotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",

            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::ToolFailed => "ToolFailed",
            ErrorKind::ToolTimeout => "ToolTimeout",

            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ContextTooLarge => "ContextTooLarge",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",

            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ToolTimeout
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
