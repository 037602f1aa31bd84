//! Transient/permanent classification of AI dependency failures.
//!
//! Best-effort substring matching over opaque remote error text. The only
//! consumer is the retry controller, which uses it to decide retry
//! eligibility.

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Presumed to succeed on retry (overload, timeout, rate limit).
    Transient,
    /// Will not succeed on retry (bad credentials, malformed request).
    Permanent,
}

/// Indicators of a transient failure, matched case-insensitively.
const TRANSIENT_INDICATORS: &[&str] = &[
    "503", "502", "504", "500", // server errors
    "429", // rate limit
    "timeout",
    "connection",
    "network",
    "quota exceeded",
];

/// Classify a raw error signal. Anything without a transient indicator is
/// treated as permanent.
pub fn classify(signal: &str) -> FailureKind {
    let lower = signal.to_lowercase();
    if TRANSIENT_INDICATORS.iter().any(|ind| lower.contains(ind)) {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        assert_eq!(classify("AI API error (503): overloaded"), FailureKind::Transient);
        assert_eq!(classify("HTTP 502 bad gateway"), FailureKind::Transient);
        assert_eq!(classify("got 429 from upstream"), FailureKind::Transient);
    }

    #[test]
    fn test_network_signals_are_transient() {
        assert_eq!(classify("request timeout after 120s"), FailureKind::Transient);
        assert_eq!(classify("Connection refused"), FailureKind::Transient);
        assert_eq!(classify("NETWORK unreachable"), FailureKind::Transient);
        assert_eq!(classify("Quota Exceeded for project"), FailureKind::Transient);
    }

    #[test]
    fn test_auth_errors_are_permanent() {
        assert_eq!(classify("invalid api key"), FailureKind::Permanent);
        assert_eq!(classify("AI API error (401): unauthorized"), FailureKind::Permanent);
        assert_eq!(classify("permission denied"), FailureKind::Permanent);
    }

    #[test]
    fn test_empty_signal_is_permanent() {
        assert_eq!(classify(""), FailureKind::Permanent);
    }
}
