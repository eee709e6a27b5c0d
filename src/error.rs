//! Shared error-classification glue.
//!
//! Prefer typed transport errors where the transport surfaces them;
//! [`classify_text`] is the substring-matching fallback for the rest,
//! used by the fan-out sinks to decide whether a dead subscriber should
//! be detached outright or just logged and retained.

/// Whether a send failure means the peer is genuinely gone (`Fatal`, detach
/// the subscriber) or is likely transient (`Transient`, log and retain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    Fatal(String),
    Transient(String),
}

impl SendFailure {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SendFailure::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            SendFailure::Fatal(m) | SendFailure::Transient(m) => m,
        }
    }
}

const FATAL_SUBSTRINGS: &[&str] = &["connection closed", "broken pipe", "connection reset"];

/// Classify an untyped error string. Aggressive eviction on transient errors
/// has been observed (in the source system) to drop healthy clients during
/// bursts, so anything that doesn't match a known-fatal phrase is kept.
pub fn classify_text(message: impl Into<String>) -> SendFailure {
    let message = message.into();
    let lower = message.to_lowercase();
    if FATAL_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        SendFailure::Fatal(message)
    } else {
        SendFailure::Transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_fatal_phrases() {
        assert!(classify_text("Connection reset by peer").is_fatal());
        assert!(classify_text("broken pipe").is_fatal());
        assert!(classify_text("the connection was closed").is_fatal());
    }

    #[test]
    fn treats_unknown_errors_as_transient() {
        assert!(!classify_text("temporary unavailable").is_fatal());
    }
}
