//! Engine error helpers
//!
//! Re-exports stepcraft-error and adds the constructors the interpreter and
//! providers share.

pub use stepcraft_error::{Error, ErrorKind, ErrorStatus, Result};

/// A `GenerateN` asked for more completions than the engine allows
pub fn generate_n_too_large(n: usize, max: usize) -> Error {
    Error::config_invalid(format!("GenerateN({}) exceeds the limit of {}", n, max))
        .with_context("n", n.to_string())
        .with_context("max", max.to_string())
}

/// A model call exceeded its deadline
pub fn model_timeout(model: &str, secs: u64) -> Error {
    Error::inference_failed(format!("model call timed out after {}s", secs))
        .with_context("model", model)
        .temporary()
}

/// Create a ContextTooLarge error
pub fn context_too_large(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ContextTooLarge, message)
}

/// Create a NetworkFailed error
pub fn network_failed(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::NetworkFailed, message).temporary()
}

/// Create a RateLimited error
pub fn rate_limited(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::RateLimited, message).temporary()
}

/// Create a ProviderUnavailable error
pub fn provider_unavailable(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ProviderUnavailable, message).temporary()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_n_too_large_is_config() {
        let err = generate_n_too_large(40, 16);
        assert!(err.is_config());
        assert_eq!(err.context_value("n"), Some("40"));
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(model_timeout("gpt-4o", 30).is_retryable());
        assert!(rate_limited("slow down").is_retryable());
        assert!(!context_too_large("prompt exceeds window").is_retryable());
    }
}
