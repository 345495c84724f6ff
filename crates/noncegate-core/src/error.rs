//! Error types for the nonce service.

/// Nonce service errors.
///
/// Only construction and issuance can fail. Redemption outcomes are a plain
/// `bool` and never surface through this type.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NonceError {
    /// The random byte source failed.
    #[error("entropy source failed: {message}")]
    Entropy { message: String },

    /// The AEAD context could not be created from the sampled key.
    #[error("cipher initialisation failed: {message}")]
    CipherInit { message: String },

    /// Sealing a token failed.
    #[error("token seal failed: {message}")]
    Seal { message: String },

    /// The validity period is zero or cannot be represented.
    #[error("invalid validity period: {message}")]
    InvalidValidity { message: String },

    /// The clock reported an instant that cannot be encoded in a token.
    #[error("clock out of range: {timestamp}")]
    ClockOutOfRange { timestamp: i64 },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl NonceError {
    /// Whether retrying the same call may succeed.
    ///
    /// Entropy failures are treated as transient; everything else indicates a
    /// broken instance or bad input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Entropy { .. })
    }
}

impl From<rand::Error> for NonceError {
    fn from(err: rand::Error) -> Self {
        Self::Entropy {
            message: err.to_string(),
        }
    }
}

/// Result type for nonce service operations.
pub type NonceResult<T> = Result<T, NonceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_entropy_is_retryable() {
        assert!(NonceError::Entropy {
            message: "x".into()
        }
        .is_retryable());
        assert!(!NonceError::Seal {
            message: "x".into()
        }
        .is_retryable());
        assert!(!NonceError::ClockOutOfRange { timestamp: -1 }.is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = NonceError::InvalidValidity {
            message: "must be positive".into(),
        };
        assert_eq!(err.to_string(), "invalid validity period: must be positive");
    }
}
