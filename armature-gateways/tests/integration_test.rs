//! End-to-end tests through the reqwest transport against a mock processor.

use armature_gateways::*;
use async_trait::async_trait;
use http::HeaderMap;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CARD_NUMBER: &str = "4444333322221111";

/// Sends every request to the mock server, keeping the gateway's path
struct MockServerTransport {
    inner: ReqwestTransport,
    base: Url,
}

impl MockServerTransport {
    fn new(server: &MockServer) -> Self {
        Self {
            inner: ReqwestTransport::new().unwrap(),
            base: Url::parse(&server.uri()).unwrap(),
        }
    }
}

#[async_trait]
impl Transport for MockServerTransport {
    async fn post(
        &self,
        endpoint: &str,
        body: String,
        headers: HeaderMap,
    ) -> GatewayResult<RawWireResponse> {
        let endpoint = Url::parse(endpoint).unwrap();
        let target = self.base.join(endpoint.path()).unwrap();
        self.inner.post(target.as_str(), body, headers).await
    }
}

fn global_collect(server: &MockServer) -> PaymentGateway<GlobalCollectGateway> {
    let config = GlobalCollectConfig::new("4567").ip_address("127.0.0.1");
    PaymentGateway::new(GlobalCollectGateway::new(config), MockServerTransport::new(server))
}

fn pay_dollar(server: &MockServer) -> PaymentGateway<Adapter> {
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
    PaymentGateway::from_config(config, MockServerTransport::new(server))
}

fn card() -> CreditCard {
    CreditCard::new(CARD_NUMBER, 9, 2030)
        .verification_value("987")
        .holder("Longbob", "Longsen")
}

fn intent() -> PaymentIntent {
    PaymentIntent::builder()
        .amount(1000)
        .order_id("1001")
        .currency("HKD")
        .language("en")
        .country("HK")
        .card(card())
        .build()
}

fn assert_no_card_data(debug: &str) {
    assert!(!debug.contains(CARD_NUMBER), "card number leaked: {}", debug);
    assert!(!debug.contains("987"), "cvv leaked: {}", debug);
}

// =============================================================================
// GlobalCollect
// =============================================================================

#[tokio::test]
async fn test_global_collect_purchase_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/wdl/wdl"))
        .and(header("content-type", "text/xml; charset=utf-8"))
        .and(body_string_contains("<ACTION>INSERT_ORDERWITHPAYMENT</ACTION>"))
        .and(body_string_contains("<AMOUNT>1000</AMOUNT>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<XML><REQUEST><PARAMS><PAYMENT>\
             <CREDITCARDNUMBER>{}</CREDITCARDNUMBER><EXPIRYDATE>0930</EXPIRYDATE><CVV>987</CVV>\
             </PAYMENT></PARAMS><RESPONSE><RESULT>OK</RESULT>\
             <ROW><STATUSID>800</STATUSID><AUTHORISATIONCODE>654321</AUTHORISATIONCODE>\
             <ORDERID>1001</ORDERID><FRAUDRESULT>A</FRAUDRESULT><CVVRESULT>M</CVVRESULT></ROW>\
             </RESPONSE></REQUEST></XML>",
            CARD_NUMBER
        )))
        .expect(1)
        .mount(&server)
        .await;

    let result = global_collect(&server).purchase(&intent()).await.unwrap();

    assert_eq!(result.outcome(), Outcome::Success);
    assert_eq!(result.message(), "Success");
    assert_eq!(result.authorization(), Some("654321"));
    assert_eq!(result.order_id(), Some("1001"));
    assert_eq!(result.fraud_review(), Some("A"));
    assert_eq!(result.cvv_result(), Some("M"));
    assert_no_card_data(&format!("{:?}", result));
}

#[tokio::test]
async fn test_global_collect_purchase_declined() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/wdl/wdl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<XML><REQUEST><RESPONSE><RESULT>NOK</RESULT>\
             <ERROR><CODE>430285</CODE><MESSAGE>Not authorised</MESSAGE></ERROR>\
             <ROW><AUTHORISATIONCODE>111111</AUTHORISATIONCODE></ROW>\
             </RESPONSE></REQUEST></XML>",
        ))
        .mount(&server)
        .await;

    let result = global_collect(&server).purchase(&intent()).await.unwrap();

    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(result.message(), "430285: Not authorised");
    assert_eq!(result.authorization(), None);
}

#[tokio::test]
async fn test_global_collect_hosted_then_details() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("<HOSTEDINDICATOR>1</HOSTEDINDICATOR>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<XML><REQUEST><RESPONSE><RESULT>OK</RESULT>\
             <ROW><FORMACTION>https://ps.gcsip.nl/orb/orb?REF=85114</FORMACTION>\
             <ORDERID>85114</ORDERID></ROW></RESPONSE></REQUEST></XML>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("<ACTION>GET_ORDERSTATUS</ACTION>"))
        .and(body_string_contains("<EFFORTID>1</EFFORTID>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<XML><REQUEST><RESPONSE><RESULT>OK</RESULT>\
             <STATUS><STATUSID>800</STATUSID><ORDERID>85114</ORDERID></STATUS>\
             </RESPONSE></REQUEST></XML>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = global_collect(&server);
    let intent = PaymentIntent::builder()
        .amount(1000)
        .order_id("85114")
        .currency("HKD")
        .language("en")
        .country("HK")
        .return_url("http://example.com/return")
        .build();

    let setup = gateway.setup_purchase(&intent).await.unwrap();
    assert!(setup.is_pending());
    assert_eq!(setup.action_url(), Some("https://ps.gcsip.nl/orb/orb?REF=85114"));

    let token = gateway
        .adapter()
        .details_token(&DetailsReference::new("85114", "1").unwrap())
        .unwrap();
    let details = gateway.details_for(&token).await.unwrap();
    assert!(details.is_success());
    assert_eq!(details.order_id(), Some("85114"));
}

#[tokio::test]
async fn test_global_collect_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = global_collect(&server).purchase(&intent()).await.unwrap_err();

    assert!(matches!(err, GatewayError::UnexpectedStatus(500)));
    assert!(!err.is_retryable());
    assert_no_card_data(&format!("{:?}", err));
}

#[tokio::test]
async fn test_validation_errors_never_reach_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = global_collect(&server);

    let jcb = PaymentIntent::builder()
        .amount(1000)
        .order_id("1001")
        .currency("HKD")
        .language("en")
        .country("HK")
        .card(CreditCard::new(CARD_NUMBER, 9, 2030).brand("jcb"))
        .build();
    let err = gateway.purchase(&jcb).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedCardBrand(_)));
    assert!(err.is_validation());

    let no_country = PaymentIntent::builder()
        .amount(1000)
        .order_id("1001")
        .currency("HKD")
        .language("en")
        .card(card())
        .build();
    let err = gateway.purchase(&no_country).await.unwrap_err();
    assert!(matches!(err, GatewayError::MissingRequiredField("country")));

    let err = gateway.details_for("not-a-token").await.unwrap_err();
    assert!(matches!(err, GatewayError::MalformedReference(_)));

    assert!(server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// PayDollar
// =============================================================================

#[tokio::test]
async fn test_pay_dollar_purchase_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/b2cDemo/eng/dPayment/payComp.jsp"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("amount=10.00"))
        .and(body_string_contains("currCode=344"))
        .and(body_string_contains("payType=N"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><form name="pageRedirect" method="post" action="pageRedirect.jsp">
<input type="hidden" name="oId" value="1020353">
<input type="hidden" name="urlRedirect" value="http://example.com/success?Ref=000000000006">
</form></body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = pay_dollar(&server).purchase(&intent()).await.unwrap();

    assert_eq!(result.outcome(), Outcome::Success);
    assert_eq!(result.authorization(), Some("1020353"));
    assert!(result.is_test());
}

#[tokio::test]
async fn test_pay_dollar_redirect_is_not_followed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/b2cDemo/eng/dPayment/payComp.jsp"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            "/error?Ref=000000000006&errorMsg=This card has expired",
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/error"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = pay_dollar(&server).purchase(&intent()).await.unwrap();

    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(result.message(), "This card has expired");
    assert_eq!(result.order_id(), Some("000000000006"));
    assert_eq!(result.authorization(), None);
}

#[tokio::test]
async fn test_pay_dollar_redirect_echoing_card_is_sanitized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!(
                "http://example.com/error?cardNo={}&errorMsg=Invalid%20card",
                CARD_NUMBER
            )
            .as_str(),
        ))
        .mount(&server)
        .await;

    let result = pay_dollar(&server).authorize(&intent()).await.unwrap();

    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(result.message(), "Invalid card");
    assert_no_card_data(&format!("{:?}", result));
}

#[tokio::test]
async fn test_pay_dollar_unexpected_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = pay_dollar(&server).purchase(&intent()).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnexpectedStatus(404)));
}

#[tokio::test]
async fn test_transport_failure() {
    // A pooled server would be recycled on drop and keep accepting connections
    let server = MockServer::builder().start().await;
    let gateway = global_collect(&server);
    drop(server);

    let err = gateway.purchase(&intent()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
    assert!(err.is_retryable());
    assert_no_card_data(&format!("{:?}", err));
}
