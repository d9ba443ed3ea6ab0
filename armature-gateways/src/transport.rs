//! HTTP transport collaborator
//!
//! The core never opens connections itself. It hands an encoded body to a
//! [`Transport`] and gets back status, headers and body for every status
//! class, including redirects, which carry payment results for some
//! gateways.

use crate::error::GatewayResult;
use async_trait::async_trait;
use http::HeaderMap;
use std::fmt;
use std::time::Duration;

/// Response exactly as received from the wire
///
/// The body may contain card data echoed by the processor. It is only
/// reachable through [`RawWireResponse::sanitize`](crate::sanitize) and
/// `Debug` prints its length, not its content.
pub struct RawWireResponse {
    status: u16,
    headers: HeaderMap,
    body: String,
}

impl RawWireResponse {
    /// Create a response
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    pub(crate) fn into_parts(self) -> (u16, HeaderMap, String) {
        (self.status, self.headers, self.body)
    }
}

impl fmt::Debug for RawWireResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawWireResponse")
            .field("status", &self.status)
            .field("headers", &self.headers.len())
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Executes one request/response exchange.
///
/// Implementations own connection handling, TLS, timeouts and any retry
/// policy. Network failures must be returned as
/// [`GatewayError::Transport`](crate::GatewayError::Transport); non-2xx
/// statuses are not failures at this level.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `endpoint`
    async fn post(
        &self,
        endpoint: &str,
        body: String,
        headers: HeaderMap,
    ) -> GatewayResult<RawWireResponse>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("armature-gateways/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`Transport`] backed by `reqwest`
///
/// Redirects are never followed: a 3xx is handed back as is.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create with default configuration
    pub fn new() -> GatewayResult<Self> {
        Self::with_config(TransportConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(config: TransportConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an existing client. It should not follow redirects.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(
        &self,
        endpoint: &str,
        body: String,
        headers: HeaderMap,
    ) -> GatewayResult<RawWireResponse> {
        let response = self
            .client
            .post(endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        tracing::trace!(status, body_len = body.len(), "Transport response received");

        Ok(RawWireResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_debug_hides_body() {
        let raw = RawWireResponse::new(200, HeaderMap::new(), "<CVV>123</CVV>");
        let debug = format!("{:?}", raw);
        assert!(!debug.contains("123"));
        assert!(debug.contains("body_len"));
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("armature-gateways/"));
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
    }
}
