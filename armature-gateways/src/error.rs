//! Error types for gateway operations

use thiserror::Error;

/// Gateway error types
///
/// Payment declines are not errors: a rejected or failed payment comes back as
/// a [`TransactionResult`](crate::TransactionResult). These variants describe
/// integration bugs, malformed wire data and transport outages.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A field the gateway needs was not supplied
    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    /// Card brand has no mapping for this gateway
    #[error("Unsupported card brand: {0}")]
    UnsupportedCardBrand(String),

    /// Currency has no mapping for this gateway
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Amount is zero or negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Details reference token could not be decoded
    #[error("Malformed reference: {0}")]
    MalformedReference(String),

    /// Response body could not be parsed
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Response status class is not one the gateway defines
    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    /// Gateway does not offer this operation
    #[error("{gateway} does not support {operation}")]
    UnsupportedOperation {
        /// Gateway name.
        gateway: &'static str,
        /// Operation name.
        operation: &'static str,
    },

    /// Request body could not be serialized
    #[error("Failed to encode request: {0}")]
    Encoding(String),

    /// Network error, timeout or other transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether the error was raised while validating input, before any
    /// request left the process.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredField(_)
                | Self::UnsupportedCardBrand(_)
                | Self::UnsupportedCurrency(_)
                | Self::InvalidAmount(_)
                | Self::MalformedReference(_)
                | Self::UnsupportedOperation { .. }
        )
    }

    /// Whether repeating the call might succeed.
    ///
    /// Only transport failures qualify. Retrying is the caller's decision;
    /// a retry must generate a fresh gateway reference.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL but never the request body
        GatewayError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Config(err.to_string())
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::MissingRequiredField("currency");
        assert_eq!(err.to_string(), "Missing required field: currency");

        let err = GatewayError::UnexpectedStatus(500);
        assert_eq!(err.to_string(), "Unexpected HTTP status: 500");

        let err = GatewayError::UnsupportedOperation {
            gateway: "paydollar",
            operation: "fetch status",
        };
        assert_eq!(err.to_string(), "paydollar does not support fetch status");
    }

    #[test]
    fn test_error_classification() {
        assert!(GatewayError::UnsupportedCardBrand("laser".into()).is_validation());
        assert!(GatewayError::MissingRequiredField("order_id").is_validation());
        assert!(!GatewayError::MalformedResponse("empty".into()).is_validation());
        assert!(!GatewayError::UnexpectedStatus(404).is_validation());

        assert!(GatewayError::Transport("timed out".into()).is_retryable());
        assert!(!GatewayError::UnexpectedStatus(503).is_retryable());
    }
}
