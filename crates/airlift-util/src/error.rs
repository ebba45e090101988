use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all airlift operations.
///
/// Variants map to the user-facing error kinds: a request can be rejected
/// outright, an index can be unreachable, a platform can have no matching
/// artifact, a fetch can fail, or the whole session can be cancelled.
/// Version conflicts and cycles are data, not errors; they live in
/// `airlift_core::tree::Conflict`.
#[derive(Debug, Error, Diagnostic)]
pub enum AirliftError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown ecosystem, malformed name or version specifier.
    #[error("Invalid request: {message}")]
    #[diagnostic(help("Check the package name, version and ecosystem"))]
    InvalidRequest { message: String },

    /// No artifact satisfies the target platform profile.
    #[error("No compatible artifact: {message}")]
    PlatformIncompatible { message: String },

    /// An ecosystem index could not be reached within the retry budget.
    #[error("Index unavailable: {message}")]
    IndexUnavailable { message: String },

    /// Artifact body stream failed, checksum mismatched, or disk write failed.
    #[error("Fetch failed: {message}")]
    FetchFailed { message: String },

    /// Malformed index document or manifest.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Network request failed (transport-level, before taxonomy applies).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The session's cancellation token tripped.
    #[error("Operation cancelled")]
    Cancelled,
}

impl AirliftError {
    /// Whether this error terminates the session regardless of severity
    /// policy.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AirliftError::Cancelled)
    }
}

/// Convenience alias for `miette::Result<T>`.
pub type AirliftResult<T> = miette::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_domain_oriented() {
        let err = AirliftError::PlatformIncompatible {
            message: "no manylinux wheel for numpy 1.26.0 matching cp311 on linux/aarch64"
                .to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("numpy 1.26.0"));
        assert!(!rendered.contains("panicked"));
    }

    #[test]
    fn cancelled_detection() {
        assert!(AirliftError::Cancelled.is_cancelled());
        assert!(!AirliftError::Network {
            message: "x".into()
        }
        .is_cancelled());
    }
}
