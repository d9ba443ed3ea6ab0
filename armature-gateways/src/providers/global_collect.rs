//! GlobalCollect payment gateway implementation
//!
//! XML in, XML out. Every business outcome comes back as HTTP 200 with a
//! `RESULT` of `OK` or `NOK`; an `OK` result still needs its status id
//! looked up before it means anything.

use crate::{
    error::{GatewayError, GatewayResult},
    provider::{
        EncodedRequest, GatewayAdapter, GatewayRequest, default_test_mode, env_flag, env_required,
    },
    reference::{DetailsReference, generate_gateway_reference},
    sanitize::SanitizedResponse,
    types::{CardBrand, Outcome, PaymentIntent, TransactionResult, non_blank, required},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Test endpoint
pub const TEST_URL: &str = "https://ps.gcsip.nl/wdl/wdl";
/// Live endpoint
pub const LIVE_URL: &str = "https://ps.gcsip.com/wdl/wdl";

const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

const ACTION_INSERT_ORDER: &str = "INSERT_ORDERWITHPAYMENT";
const ACTION_ORDER_STATUS: &str = "GET_ORDERSTATUS";

/// Payment product ids by card brand
const PAYMENT_PRODUCTS: &[(CardBrand, u16)] = &[
    (CardBrand::Visa, 1),
    (CardBrand::AmericanExpress, 2),
    (CardBrand::MasterCard, 3),
];

/// How an `OK` response's status id maps to an outcome.
///
/// A rule without a message takes it from the response's error node.
struct StatusRule {
    status: &'static str,
    outcome: Outcome,
    message: Option<&'static str>,
}

const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        status: "20",
        outcome: Outcome::Pending,
        message: Some("Pending"),
    },
    StatusRule {
        status: "25",
        outcome: Outcome::Pending,
        message: Some("Cancelled"),
    },
    StatusRule {
        status: "100",
        outcome: Outcome::Rejected,
        message: None,
    },
    StatusRule {
        status: "800",
        outcome: Outcome::Success,
        message: Some("Success"),
    },
];

/// Error codes whose processor text is replaced by a stable message
const ERROR_MESSAGES: &[(&str, &str)] = &[
    ("430306", "Card expired"),
    ("430330", "Invalid card number"),
];

/// GlobalCollect configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalCollectConfig {
    /// Merchant id.
    pub merchant_id: String,
    /// Merchant server IP address, sent in the request meta.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Use the test endpoint.
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
}

impl GlobalCollectConfig {
    /// Create a test-mode configuration
    pub fn new(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            ip_address: None,
            test_mode: default_test_mode(),
        }
    }

    /// Set the merchant IP address
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Use the live endpoint
    pub fn production(mut self) -> Self {
        self.test_mode = false;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// - `ARMATURE_GLOBALCOLLECT_MERCHANT_ID`: required
    /// - `ARMATURE_GLOBALCOLLECT_IP_ADDRESS`: optional
    /// - `ARMATURE_GLOBALCOLLECT_TEST_MODE`: `1`/`true` (default true)
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = Self::new(env_required("ARMATURE_GLOBALCOLLECT_MERCHANT_ID")?);
        config.ip_address = std::env::var("ARMATURE_GLOBALCOLLECT_IP_ADDRESS").ok();
        if let Some(test_mode) = env_flag("ARMATURE_GLOBALCOLLECT_TEST_MODE") {
            config.test_mode = test_mode;
        }
        Ok(config)
    }
}

/// GlobalCollect gateway
#[derive(Debug, Clone)]
pub struct GlobalCollectGateway {
    config: GlobalCollectConfig,
}

impl GlobalCollectGateway {
    /// Create a new GlobalCollect gateway
    pub fn new(config: GlobalCollectConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &GlobalCollectConfig {
        &self.config
    }

    /// Details token for a hosted payment, as the caller receives it
    pub fn details_token(&self, reference: &DetailsReference) -> GatewayResult<String> {
        reference.to_token(&self.config.merchant_id)
    }

    /// The client IP on the intent wins over the configured one
    fn envelope<'a>(
        &'a self,
        action: &'a str,
        client_ip: Option<&'a str>,
        params: Params<'a>,
    ) -> RequestEnvelope<'a> {
        let version = match action {
            ACTION_ORDER_STATUS => "2.0",
            _ => "1.0",
        };

        RequestEnvelope {
            request: RequestNode {
                action,
                meta: Meta {
                    merchant_id: &self.config.merchant_id,
                    ip_address: client_ip
                        .or(self.config.ip_address.as_deref())
                        .unwrap_or_default(),
                    version,
                },
                params,
            },
        }
    }

    fn encode_purchase<'a>(
        &'a self,
        intent: &'a PaymentIntent,
        reference: &'a str,
    ) -> GatewayResult<RequestEnvelope<'a>> {
        let order = order_node(intent, reference)?;
        let card = intent.require_card()?;
        let product_id = payment_product_id(card.resolve_brand()?)?;

        let payment = PaymentNode {
            payment_product_id: product_id,
            hosted_indicator: None,
            return_url: None,
            amount: order.amount,
            currency_code: order.currency_code,
            language_code: order.language_code,
            country_code: order.country_code,
            credit_card_number: Some(card.number()),
            expiry_date: Some(card.expiry_mmyy()),
            cvv: card.cvv(),
        };

        Ok(self.envelope(
            ACTION_INSERT_ORDER,
            intent.ip_address(),
            Params {
                order,
                payment: Some(payment),
            },
        ))
    }

    fn encode_hosted<'a>(
        &'a self,
        intent: &'a PaymentIntent,
        reference: &'a str,
    ) -> GatewayResult<RequestEnvelope<'a>> {
        let order = order_node(intent, reference)?;
        let return_url = required(intent.return_url(), "return_url")?;
        let brand = match intent.card() {
            Some(card) => card.resolve_brand()?,
            None => CardBrand::Visa,
        };

        let payment = PaymentNode {
            payment_product_id: payment_product_id(brand)?,
            hosted_indicator: Some(1),
            return_url: Some(return_url),
            amount: order.amount,
            currency_code: order.currency_code,
            language_code: order.language_code,
            country_code: order.country_code,
            credit_card_number: None,
            expiry_date: None,
            cvv: None,
        };

        Ok(self.envelope(
            ACTION_INSERT_ORDER,
            intent.ip_address(),
            Params {
                order,
                payment: Some(payment),
            },
        ))
    }

    fn encode_status<'a>(&'a self, reference: &'a DetailsReference) -> RequestEnvelope<'a> {
        let order = OrderNode {
            order_id: reference.order_id(),
            effort_id: Some(reference.effort_id()),
            ..OrderNode::default()
        };

        self.envelope(
            ACTION_ORDER_STATUS,
            None,
            Params {
                order,
                payment: None,
            },
        )
    }
}

impl GatewayAdapter for GlobalCollectGateway {
    fn name(&self) -> &'static str {
        "globalcollect"
    }

    fn endpoint(&self) -> &str {
        if self.config.test_mode {
            TEST_URL
        } else {
            LIVE_URL
        }
    }

    fn is_test(&self) -> bool {
        self.config.test_mode
    }

    fn encode(
        &self,
        request: &GatewayRequest<'_>,
        now: DateTime<Utc>,
    ) -> GatewayResult<EncodedRequest> {
        let reference = request
            .intent()
            .and_then(|intent| intent.order_id())
            .map(|order_id| generate_gateway_reference(order_id, now))
            .unwrap_or_default();

        let envelope = match request {
            GatewayRequest::Purchase(intent) => self.encode_purchase(intent, &reference)?,
            GatewayRequest::HostedPurchase(intent) => self.encode_hosted(intent, &reference)?,
            GatewayRequest::FetchStatus(details) => self.encode_status(details),
            GatewayRequest::Authorize(_) => return Err(self.unsupported(request)),
        };

        let body = quick_xml::se::to_string_with_root("XML", &envelope)
            .map_err(|e| GatewayError::Encoding(e.to_string()))?;

        debug!(
            gateway = self.name(),
            action = envelope.request.action,
            merchant_reference = %reference,
            "Encoded GlobalCollect request"
        );

        Ok(EncodedRequest::new(body, CONTENT_TYPE))
    }

    fn interpret(&self, response: &SanitizedResponse) -> GatewayResult<TransactionResult> {
        if !(200..300).contains(&response.status()) {
            return Err(GatewayError::UnexpectedStatus(response.status()));
        }

        let document: ResponseDocument = quick_xml::de::from_str(response.body())
            .map_err(|e| GatewayError::MalformedResponse(format!("invalid XML: {}", e)))?;

        let node = document
            .request
            .and_then(|request| request.response)
            .ok_or_else(|| GatewayError::MalformedResponse("missing RESPONSE node".to_string()))?;

        let status = node.first(|row| &row.status_id);
        let action_url = node.first(|row| &row.form_action);
        let errors = node.errors();

        let (outcome, message) = match node.result.trim() {
            "OK" => classify_status(status.as_deref(), action_url.is_some(), &errors),
            "NOK" => (
                Outcome::Failed,
                error_message(&errors).unwrap_or_else(|| "Unknown error".to_string()),
            ),
            other => {
                return Err(GatewayError::MalformedResponse(format!(
                    "unexpected RESULT '{}'",
                    other
                )))
            }
        };

        Ok(TransactionResult::new(outcome, message)
            .with_authorization(node.first(|row| &row.authorisation_code))
            .with_order_id(node.first(|row| &row.order_id))
            .with_action_url(action_url)
            .with_status(status)
            .with_verdicts(
                node.first(|row| &row.fraud_result),
                node.first(|row| &row.avs_result),
                node.first(|row| &row.cvv_result),
            )
            .with_test(self.is_test()))
    }
}

fn payment_product_id(brand: CardBrand) -> GatewayResult<u16> {
    PAYMENT_PRODUCTS
        .iter()
        .find(|(b, _)| *b == brand)
        .map(|(_, id)| *id)
        .ok_or_else(|| GatewayError::UnsupportedCardBrand(brand.to_string()))
}

fn order_node<'a>(intent: &'a PaymentIntent, reference: &'a str) -> GatewayResult<OrderNode<'a>> {
    let order_id = required(intent.order_id(), "order_id")?;
    let currency = required(intent.currency(), "currency")?;
    let language = required(intent.language(), "language")?;
    let country = required(intent.country(), "country")?;
    let amount = intent.require_amount()?;

    let billing = intent.billing();
    let first_name = billing
        .first_name
        .as_deref()
        .or_else(|| intent.card().map(|c| c.first_name()).filter(|s| !s.is_empty()));
    let surname = billing
        .last_name
        .as_deref()
        .or_else(|| intent.card().map(|c| c.last_name()).filter(|s| !s.is_empty()));

    Ok(OrderNode {
        order_id,
        merchant_reference: Some(reference),
        amount: Some(amount.minor_units()),
        currency_code: Some(currency),
        language_code: Some(language),
        country_code: Some(country),
        first_name,
        surname,
        street: billing.street.as_deref(),
        city: billing.city.as_deref(),
        state: billing.state.as_deref(),
        zip: billing.postal_code.as_deref(),
        effort_id: None,
    })
}

fn classify_status(
    status: Option<&str>,
    has_action_url: bool,
    errors: &[&ErrorNode],
) -> (Outcome, String) {
    let rule = status.and_then(|s| STATUS_RULES.iter().find(|rule| rule.status == s));

    match (rule, status) {
        (Some(StatusRule { outcome, message: Some(message), .. }), _) => {
            (*outcome, message.to_string())
        }
        // Hosted setup answers without a status id, only a form action
        (None, None) if has_action_url => (Outcome::Pending, "Pending".to_string()),
        (_, status) => {
            let message = error_message(errors).unwrap_or_else(|| match status {
                Some(code) => format!("Rejected (status {})", code),
                None => "Unknown error".to_string(),
            });
            (Outcome::Rejected, message)
        }
    }
}

fn error_message(errors: &[&ErrorNode]) -> Option<String> {
    let error = errors.first()?;
    let code = non_blank(error.code.clone());
    let text = non_blank(error.message.clone());

    if let Some(known) = code
        .as_deref()
        .and_then(|c| ERROR_MESSAGES.iter().find(|(known, _)| *known == c))
    {
        return Some(known.1.to_string());
    }

    match (code, text) {
        (Some(code), Some(text)) => Some(format!("{}: {}", code, text)),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => Some("Unknown error".to_string()),
    }
}

// Request shape

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    #[serde(rename = "REQUEST")]
    request: RequestNode<'a>,
}

#[derive(Serialize)]
struct RequestNode<'a> {
    #[serde(rename = "ACTION")]
    action: &'a str,
    #[serde(rename = "META")]
    meta: Meta<'a>,
    #[serde(rename = "PARAMS")]
    params: Params<'a>,
}

#[derive(Serialize)]
struct Meta<'a> {
    #[serde(rename = "MERCHANTID")]
    merchant_id: &'a str,
    #[serde(rename = "IPADDRESS")]
    ip_address: &'a str,
    #[serde(rename = "VERSION")]
    version: &'a str,
}

#[derive(Serialize)]
struct Params<'a> {
    #[serde(rename = "ORDER")]
    order: OrderNode<'a>,
    #[serde(rename = "PAYMENT", skip_serializing_if = "Option::is_none")]
    payment: Option<PaymentNode<'a>>,
}

#[derive(Serialize, Default)]
struct OrderNode<'a> {
    #[serde(rename = "ORDERID")]
    order_id: &'a str,
    #[serde(rename = "EFFORTID", skip_serializing_if = "Option::is_none")]
    effort_id: Option<&'a str>,
    #[serde(rename = "MERCHANTREFERENCE", skip_serializing_if = "Option::is_none")]
    merchant_reference: Option<&'a str>,
    #[serde(rename = "AMOUNT", skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
    #[serde(rename = "CURRENCYCODE", skip_serializing_if = "Option::is_none")]
    currency_code: Option<&'a str>,
    #[serde(rename = "LANGUAGECODE", skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    #[serde(rename = "COUNTRYCODE", skip_serializing_if = "Option::is_none")]
    country_code: Option<&'a str>,
    #[serde(rename = "FIRSTNAME", skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(rename = "SURNAME", skip_serializing_if = "Option::is_none")]
    surname: Option<&'a str>,
    #[serde(rename = "STREET", skip_serializing_if = "Option::is_none")]
    street: Option<&'a str>,
    #[serde(rename = "CITY", skip_serializing_if = "Option::is_none")]
    city: Option<&'a str>,
    #[serde(rename = "STATE", skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(rename = "ZIP", skip_serializing_if = "Option::is_none")]
    zip: Option<&'a str>,
}

#[derive(Serialize)]
struct PaymentNode<'a> {
    #[serde(rename = "PAYMENTPRODUCTID")]
    payment_product_id: u16,
    #[serde(rename = "HOSTEDINDICATOR", skip_serializing_if = "Option::is_none")]
    hosted_indicator: Option<u8>,
    #[serde(rename = "RETURNURL", skip_serializing_if = "Option::is_none")]
    return_url: Option<&'a str>,
    #[serde(rename = "AMOUNT", skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
    #[serde(rename = "CURRENCYCODE", skip_serializing_if = "Option::is_none")]
    currency_code: Option<&'a str>,
    #[serde(rename = "LANGUAGECODE", skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    #[serde(rename = "COUNTRYCODE", skip_serializing_if = "Option::is_none")]
    country_code: Option<&'a str>,
    #[serde(rename = "CREDITCARDNUMBER", skip_serializing_if = "Option::is_none")]
    credit_card_number: Option<&'a str>,
    #[serde(rename = "EXPIRYDATE", skip_serializing_if = "Option::is_none")]
    expiry_date: Option<String>,
    #[serde(rename = "CVV", skip_serializing_if = "Option::is_none")]
    cvv: Option<&'a str>,
}

// Response shape. Fields are read from ROW (payment calls) or STATUS
// (status lookups), whichever carries them. ERROR may sit directly under
// RESPONSE, under either of those, or inside an ERRORS wrapper, and the
// lists may be interleaved with other elements.

#[derive(Deserialize)]
struct ResponseDocument {
    #[serde(rename = "REQUEST")]
    request: Option<RequestEcho>,
}

#[derive(Deserialize)]
struct RequestEcho {
    #[serde(rename = "RESPONSE")]
    response: Option<ResponseNode>,
}

#[derive(Deserialize)]
struct ResponseNode {
    #[serde(rename = "RESULT", default)]
    result: String,
    #[serde(rename = "ERROR", default)]
    errors: Vec<ErrorNode>,
    #[serde(rename = "ERRORS", default)]
    error_lists: Vec<ErrorList>,
    #[serde(rename = "ROW", default)]
    rows: Vec<RowNode>,
    #[serde(rename = "STATUS", default)]
    statuses: Vec<RowNode>,
}

impl ResponseNode {
    /// First non-blank value of a field across all ROW and STATUS nodes
    fn first(&self, field: impl Fn(&RowNode) -> &Option<String>) -> Option<String> {
        self.rows
            .iter()
            .chain(self.statuses.iter())
            .find_map(|row| non_blank(field(row).clone()))
    }

    /// Every ERROR node, the response's own first and then those under
    /// ROW and STATUS
    fn errors(&self) -> Vec<&ErrorNode> {
        let rows = self.rows.iter().chain(self.statuses.iter());
        collect_errors(&self.errors, &self.error_lists)
            .chain(rows.flat_map(|row| collect_errors(&row.errors, &row.error_lists)))
            .collect()
    }
}

fn collect_errors<'a>(
    direct: &'a [ErrorNode],
    lists: &'a [ErrorList],
) -> impl Iterator<Item = &'a ErrorNode> {
    direct.iter().chain(lists.iter().flat_map(|list| list.errors.iter()))
}

#[derive(Deserialize, Default)]
struct ErrorList {
    #[serde(rename = "ERROR", default)]
    errors: Vec<ErrorNode>,
}

#[derive(Deserialize)]
struct ErrorNode {
    #[serde(rename = "CODE", default)]
    code: Option<String>,
    #[serde(rename = "MESSAGE", default)]
    message: Option<String>,
}

#[derive(Deserialize, Default)]
struct RowNode {
    #[serde(rename = "STATUSID", default)]
    status_id: Option<String>,
    #[serde(rename = "AUTHORISATIONCODE", default)]
    authorisation_code: Option<String>,
    #[serde(rename = "ORDERID", default)]
    order_id: Option<String>,
    #[serde(rename = "FORMACTION", default)]
    form_action: Option<String>,
    #[serde(rename = "FRAUDRESULT", default)]
    fraud_result: Option<String>,
    #[serde(rename = "AVSRESULT", default)]
    avs_result: Option<String>,
    #[serde(rename = "CVVRESULT", default)]
    cvv_result: Option<String>,
    #[serde(rename = "ERROR", default)]
    errors: Vec<ErrorNode>,
    #[serde(rename = "ERRORS", default)]
    error_lists: Vec<ErrorList>,
}
