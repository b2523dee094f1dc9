//! Error status - how a caller should react to an error

use std::fmt;

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    /// Retrying will not help
    Permanent,
    /// Retrying may succeed (timeouts, rate limits)
    Temporary,
    /// Was temporary, but retries have been exhausted
    Persistent,
}

impl ErrorStatus {
    /// Check if the status allows a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorStatus::Temporary)
    }

    /// Transition after a failed retry: temporary errors become persistent
    pub fn persist(self) -> Self {
        match self {
            ErrorStatus::Temporary => ErrorStatus::Persistent,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
            ErrorStatus::Persistent => "persistent",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_only_affects_temporary() {
        assert_eq!(ErrorStatus::Temporary.persist(), ErrorStatus::Persistent);
        assert_eq!(ErrorStatus::Permanent.persist(), ErrorStatus::Permanent);
        assert_eq!(ErrorStatus::Persistent.persist(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorStatus::Temporary.to_string(), "temporary");
        assert!(!ErrorStatus::Persistent.is_retryable());
    }
}
