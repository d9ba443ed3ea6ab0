//! Card Payment Gateway Adapters for Armature Framework
//!
//! Turns one normalized payment intent into the wire dialect of a card
//! processor and turns the processor's answer back into one uniform
//! transaction result. Two processors are supported: GlobalCollect (XML
//! envelope) and PayDollar (flat form post).
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       PaymentGateway                            │
//! │  purchase() | authorize() | setup_purchase() | details_for()    │
//! └─────────────────────────────────────────────────────────────────┘
//!          │ encode (validation, no I/O)          ▲ interpret
//!          ▼                                      │
//! ┌──────────────────┐   ┌────────────┐   ┌──────────────────┐
//! │  GatewayAdapter  │──▶│ Transport  │──▶│    Sanitizer     │
//! │ GlobalCollect    │   │  (reqwest) │   │ card data masked │
//! │ PayDollar        │   └────────────┘   └──────────────────┘
//! └──────────────────┘
//! ```
//!
//! Declines are results, not errors: a `Rejected` or `Failed`
//! [`TransactionResult`] comes back as `Ok`. Errors are reserved for invalid
//! input, malformed responses and transport failures.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_gateways::{
//!     CreditCard, GatewayConfig, PaymentGateway, PaymentIntent, ReqwestTransport,
//! };
//!
//! let config = GatewayConfig::from_env("global_collect")?;
//! let gateway = PaymentGateway::from_config(config, ReqwestTransport::new()?);
//!
//! let intent = PaymentIntent::builder()
//!     .amount(2999)
//!     .currency("HKD")
//!     .order_id("1001")
//!     .language("en")
//!     .country("HK")
//!     .card(CreditCard::new("4444333322221111", 1, 2027).verification_value("123"))
//!     .build();
//!
//! let result = gateway.purchase(&intent).await?;
//! if result.is_success() {
//!     println!("authorized: {:?}", result.authorization());
//! }
//! ```

pub mod error;
pub mod money;
pub mod provider;
pub mod providers;
pub mod reference;
pub mod sanitize;
pub mod transport;
pub mod types;

pub use error::*;
pub use money::*;
pub use provider::*;
pub use providers::{GlobalCollectConfig, GlobalCollectGateway, PayDollarConfig, PayDollarGateway};
pub use reference::*;
pub use sanitize::*;
pub use transport::*;
pub use types::*;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Main gateway client
///
/// Cheap to clone; clones share the adapter and transport.
pub struct PaymentGateway<A: GatewayAdapter> {
    adapter: Arc<A>,
    transport: Arc<dyn Transport>,
}

impl<A: GatewayAdapter> PaymentGateway<A> {
    /// Create a new gateway client
    pub fn new(adapter: A, transport: impl Transport + 'static) -> Self {
        Self {
            adapter: Arc::new(adapter),
            transport: Arc::new(transport),
        }
    }

    /// Create with a shared transport
    pub fn with_shared_transport(adapter: A, transport: Arc<dyn Transport>) -> Self {
        Self {
            adapter: Arc::new(adapter),
            transport,
        }
    }

    /// Get the adapter
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Authorize and capture in one step
    pub async fn purchase(&self, intent: &PaymentIntent) -> GatewayResult<TransactionResult> {
        self.execute(GatewayRequest::Purchase(intent)).await
    }

    /// Authorize without capturing
    pub async fn authorize(&self, intent: &PaymentIntent) -> GatewayResult<TransactionResult> {
        self.execute(GatewayRequest::Authorize(intent)).await
    }

    /// Prepare a hosted payment page.
    ///
    /// A `Pending` result carries the URL to send the customer to in
    /// [`TransactionResult::action_url`].
    pub async fn setup_purchase(&self, intent: &PaymentIntent) -> GatewayResult<TransactionResult> {
        self.execute(GatewayRequest::HostedPurchase(intent)).await
    }

    /// Fetch the outcome of a hosted payment from the details token the
    /// customer came back with
    pub async fn details_for(&self, token: &str) -> GatewayResult<TransactionResult> {
        let reference = DetailsReference::decode(token)?;
        self.execute(GatewayRequest::FetchStatus(&reference)).await
    }

    async fn execute(&self, request: GatewayRequest<'_>) -> GatewayResult<TransactionResult> {
        let gateway = self.adapter.name();
        let operation = request.operation();

        let encoded = self.adapter.encode(&request, Utc::now())?;
        let headers = encoded.headers();

        let sanitizer = match request.intent().and_then(|intent| intent.card()) {
            Some(card) => Sanitizer::new().with_card_number(card.number()),
            None => Sanitizer::new(),
        };

        debug!(
            gateway,
            operation,
            endpoint = self.adapter.endpoint(),
            test = self.adapter.is_test(),
            "Sending gateway request"
        );

        let raw = match self
            .transport
            .post(self.adapter.endpoint(), encoded.body, headers)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(gateway, operation, error = %err, "Gateway request failed");
                return Err(err);
            }
        };

        let response = raw.sanitize(&sanitizer);
        trace!(
            gateway,
            status = response.status(),
            body = response.body(),
            "Gateway response"
        );

        let result = match self.adapter.interpret(&response) {
            Ok(result) => result.with_raw_response(response.body().to_string()),
            Err(err) => {
                warn!(
                    gateway,
                    operation,
                    status = response.status(),
                    error = %err,
                    "Could not interpret gateway response"
                );
                return Err(err);
            }
        };

        info!(
            gateway,
            operation,
            outcome = %result.outcome(),
            order_id = result.order_id().unwrap_or_default(),
            "Gateway call completed"
        );

        Ok(result)
    }
}

impl PaymentGateway<Adapter> {
    /// Create a client for the gateway named in the configuration
    pub fn from_config(config: GatewayConfig, transport: impl Transport + 'static) -> Self {
        Self::new(Adapter::from(config), transport)
    }
}

impl<A: GatewayAdapter> Clone for PaymentGateway<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            transport: Arc::clone(&self.transport),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::HeaderMap;
    use std::sync::Mutex;

    /// Replays one canned response and records what was sent
    struct MockTransport {
        status: u16,
        headers: HeaderMap,
        body: String,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                headers: HeaderMap::new(),
                body: body.to_string(),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(
            &self,
            endpoint: &str,
            body: String,
            _headers: HeaderMap,
        ) -> GatewayResult<RawWireResponse> {
            self.sent.lock().unwrap().push((endpoint.to_string(), body));
            Ok(RawWireResponse::new(
                self.status,
                self.headers.clone(),
                self.body.clone(),
            ))
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn post(
            &self,
            _endpoint: &str,
            _body: String,
            _headers: HeaderMap,
        ) -> GatewayResult<RawWireResponse> {
            Err(GatewayError::Transport("connection refused".to_string()))
        }
    }

    fn global_collect(transport: Arc<dyn Transport>) -> PaymentGateway<Adapter> {
        let config = GatewayConfig::GlobalCollect(GlobalCollectConfig::new("4567"));
        PaymentGateway::with_shared_transport(Adapter::from(config), transport)
    }

    fn intent() -> PaymentIntent {
        PaymentIntent::builder()
            .amount(100)
            .order_id("1001")
            .currency("HKD")
            .language("en")
            .country("HK")
            .card(CreditCard::new("4444333322221111", 1, 2030).verification_value("123"))
            .build()
    }

    const ECHOING_SUCCESS: &str = "<XML><REQUEST><PARAMS><PAYMENT>\
        <CREDITCARDNUMBER>4444333322221111</CREDITCARDNUMBER><CVV>123</CVV>\
        </PAYMENT></PARAMS><RESPONSE><RESULT>OK</RESULT>\
        <ROW><STATUSID>800</STATUSID><AUTHORISATIONCODE>654321</AUTHORISATIONCODE>\
        <ORDERID>1001</ORDERID><CVVRESULT>M</CVVRESULT></ROW>\
        <NOTE>card 4444333322221111 accepted</NOTE>\
        </RESPONSE></REQUEST></XML>";

    #[tokio::test]
    async fn test_purchase_success_sanitizes_raw_response() {
        let transport = MockTransport::new(200, ECHOING_SUCCESS);
        let gateway = global_collect(transport.clone());

        let result = gateway.purchase(&intent()).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.authorization(), Some("654321"));
        assert!(result.is_test());

        let raw = result.raw_response().unwrap();
        assert!(!raw.contains("4444333322221111"));
        assert!(raw.contains("<CVV>OMITTED</CVV>"));
        assert!(raw.contains("card OMITTED accepted"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, providers::global_collect::TEST_URL);
        assert!(sent[0].1.contains("<ACTION>INSERT_ORDERWITHPAYMENT</ACTION>"));
    }

    #[tokio::test]
    async fn test_validation_happens_before_transport() {
        let transport = MockTransport::new(200, ECHOING_SUCCESS);
        let gateway = global_collect(transport.clone());

        let intent = PaymentIntent::builder()
            .amount(100)
            .order_id("1001")
            .language("en")
            .country("HK")
            .build();

        let err = gateway.purchase(&intent).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingRequiredField("currency")));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let gateway = global_collect(Arc::new(FailingTransport));

        let err = gateway.purchase(&intent()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_details_for_decodes_token() {
        let body = "<XML><REQUEST><RESPONSE><RESULT>OK</RESULT>\
                    <STATUS><STATUSID>20</STATUSID><ORDERID>85114</ORDERID></STATUS>\
                    </RESPONSE></REQUEST></XML>";
        let transport = MockTransport::new(200, body);
        let gateway = global_collect(transport.clone());

        let result = gateway
            .details_for("0000004567000008511400001")
            .await
            .unwrap();

        assert!(result.is_pending());
        assert_eq!(result.message(), "Pending");
        assert!(transport.sent()[0].1.contains("<ORDERID>85114</ORDERID><EFFORTID>1</EFFORTID>"));
    }

    #[tokio::test]
    async fn test_details_for_rejects_short_token() {
        let transport = MockTransport::new(200, "");
        let gateway = global_collect(transport.clone());

        let err = gateway.details_for("12345").await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedReference(_)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let transport = MockTransport::new(200, "");
        let gateway = global_collect(transport.clone());

        let err = gateway.authorize(&intent()).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::UnsupportedOperation {
                gateway: "globalcollect",
                operation: "authorize"
            }
        ));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_from_config_pay_dollar_setup_unsupported() {
        let config = GatewayConfig::PayDollar(PayDollarConfig::new(
            "abc123",
            "http://example.com/success",
            "http://example.com/fail",
            "http://example.com/error",
        ));
        let transport = MockTransport::new(200, "");
        let gateway = PaymentGateway::from_config(config, SharedMock(transport.clone()));
        let cloned = gateway.clone();

        let err = tokio_test::block_on(cloned.setup_purchase(&intent())).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedOperation { .. }));
        assert_eq!(gateway.adapter().name(), "paydollar");
        assert!(transport.sent().is_empty());
    }

    struct SharedMock(Arc<MockTransport>);

    #[async_trait]
    impl Transport for SharedMock {
        async fn post(
            &self,
            endpoint: &str,
            body: String,
            headers: HeaderMap,
        ) -> GatewayResult<RawWireResponse> {
            self.0.post(endpoint, body, headers).await
        }
    }
}
