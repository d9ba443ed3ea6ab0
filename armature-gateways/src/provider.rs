//! Gateway adapter trait and configuration-time selection

use crate::error::{GatewayError, GatewayResult};
use crate::providers::{
    GlobalCollectConfig, GlobalCollectGateway, PayDollarConfig, PayDollarGateway,
};
use crate::reference::DetailsReference;
use crate::sanitize::SanitizedResponse;
use crate::types::{PaymentIntent, TransactionResult};
use chrono::{DateTime, Utc};
use http::header::{CONTENT_TYPE, HeaderValue};
use http::HeaderMap;
use serde::Deserialize;
use std::fmt;

/// One caller-facing operation
#[derive(Debug, Clone, Copy)]
pub enum GatewayRequest<'a> {
    /// Authorize and capture immediately
    Purchase(&'a PaymentIntent),
    /// Authorize only
    Authorize(&'a PaymentIntent),
    /// Prepare a hosted payment page and return its action URL
    HostedPurchase(&'a PaymentIntent),
    /// Look up the outcome of a hosted payment
    FetchStatus(&'a DetailsReference),
}

impl<'a> GatewayRequest<'a> {
    /// Operation name for logs and errors
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Purchase(_) => "purchase",
            Self::Authorize(_) => "authorize",
            Self::HostedPurchase(_) => "hosted purchase",
            Self::FetchStatus(_) => "fetch status",
        }
    }

    /// Intent carried by payment operations
    pub fn intent(&self) -> Option<&'a PaymentIntent> {
        match *self {
            Self::Purchase(intent) | Self::Authorize(intent) | Self::HostedPurchase(intent) => {
                Some(intent)
            }
            Self::FetchStatus(_) => None,
        }
    }
}

impl fmt::Display for GatewayRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// Provider-native request body
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    /// Body text
    pub body: String,
    /// Content type of the body
    pub content_type: &'static str,
}

impl EncodedRequest {
    pub fn new(body: String, content_type: &'static str) -> Self {
        Self { body, content_type }
    }

    /// Headers to send with the body
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        headers
    }
}

/// Encode/interpret capability of one payment gateway
///
/// Implement this trait for each processor. Both halves are pure: encoding
/// validates the request and builds the body, interpreting classifies a
/// sanitized response. Network access belongs to the
/// [`Transport`](crate::Transport).
pub trait GatewayAdapter: Send + Sync {
    /// Get gateway name
    fn name(&self) -> &'static str;

    /// Endpoint for the configured mode (test or live)
    fn endpoint(&self) -> &str;

    /// Is test/sandbox mode
    fn is_test(&self) -> bool;

    /// Validate and encode a request
    fn encode(&self, request: &GatewayRequest<'_>, now: DateTime<Utc>)
    -> GatewayResult<EncodedRequest>;

    /// Classify a sanitized response. Everything the classification needs
    /// is in the response itself.
    fn interpret(&self, response: &SanitizedResponse) -> GatewayResult<TransactionResult>;

    /// Error for operations the gateway does not offer
    fn unsupported(&self, request: &GatewayRequest<'_>) -> GatewayError {
        GatewayError::UnsupportedOperation {
            gateway: self.name(),
            operation: request.operation(),
        }
    }
}

/// Gateway selected from configuration
#[derive(Debug, Clone)]
pub enum Adapter {
    GlobalCollect(GlobalCollectGateway),
    PayDollar(PayDollarGateway),
}

impl Adapter {
    fn inner(&self) -> &dyn GatewayAdapter {
        match self {
            Self::GlobalCollect(gateway) => gateway,
            Self::PayDollar(gateway) => gateway,
        }
    }
}

impl GatewayAdapter for Adapter {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn endpoint(&self) -> &str {
        self.inner().endpoint()
    }

    fn is_test(&self) -> bool {
        self.inner().is_test()
    }

    fn encode(
        &self,
        request: &GatewayRequest<'_>,
        now: DateTime<Utc>,
    ) -> GatewayResult<EncodedRequest> {
        self.inner().encode(request, now)
    }

    fn interpret(&self, response: &SanitizedResponse) -> GatewayResult<TransactionResult> {
        self.inner().interpret(response)
    }
}

impl From<GatewayConfig> for Adapter {
    fn from(config: GatewayConfig) -> Self {
        match config {
            GatewayConfig::GlobalCollect(config) => {
                Self::GlobalCollect(GlobalCollectGateway::new(config))
            }
            GatewayConfig::PayDollar(config) => Self::PayDollar(PayDollarGateway::new(config)),
        }
    }
}

/// Gateway configuration, tagged by `provider`
///
/// ```json
/// { "provider": "pay_dollar", "merchant_id": "1", "success_url": "...",
///   "fail_url": "...", "error_url": "...", "test_mode": false }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum GatewayConfig {
    GlobalCollect(GlobalCollectConfig),
    PayDollar(PayDollarConfig),
}

impl GatewayConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> GatewayResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from environment variables for the named provider
    /// (`global_collect` or `pay_dollar`)
    pub fn from_env(provider: &str) -> GatewayResult<Self> {
        match provider {
            "global_collect" => Ok(Self::GlobalCollect(GlobalCollectConfig::from_env()?)),
            "pay_dollar" => Ok(Self::PayDollar(PayDollarConfig::from_env()?)),
            other => Err(GatewayError::Config(format!("Unknown provider: {}", other))),
        }
    }
}

/// Parse a boolean environment flag (`1`/`true`)
pub(crate) fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.to_lowercase() == "true")
}

/// Read a required environment variable
pub(crate) fn env_required(name: &str) -> GatewayResult<String> {
    std::env::var(name).map_err(|_| GatewayError::Config(format!("{} not set", name)))
}

pub(crate) fn default_test_mode() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json_pay_dollar() {
        let config = GatewayConfig::from_json(
            r#"{
                "provider": "pay_dollar",
                "merchant_id": "abc123",
                "success_url": "http://example.com/success",
                "fail_url": "http://example.com/fail",
                "error_url": "http://example.com/error"
            }"#,
        )
        .unwrap();

        let adapter = Adapter::from(config);
        assert_eq!(adapter.name(), "paydollar");
        assert!(adapter.is_test());
        assert!(adapter.endpoint().contains("test.paydollar.com"));
    }

    #[test]
    fn test_config_from_json_global_collect_live() {
        let config = GatewayConfig::from_json(
            r#"{ "provider": "global_collect", "merchant_id": "4567", "test_mode": false }"#,
        )
        .unwrap();

        let adapter = Adapter::from(config);
        assert_eq!(adapter.name(), "globalcollect");
        assert!(!adapter.is_test());
        assert_eq!(adapter.endpoint(), "https://ps.gcsip.com/wdl/wdl");
    }

    #[test]
    fn test_config_unknown_provider() {
        let err = GatewayConfig::from_json(r#"{ "provider": "stripe" }"#).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        let err = GatewayConfig::from_env("stripe").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_encoded_request_headers() {
        let request = EncodedRequest::new("a=b".into(), "application/x-www-form-urlencoded");
        let headers = request.headers();
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
    }
}
