//! PayDollar payment gateway implementation
//!
//! Flat form post. The outcome is carried by the response status class:
//! a 2xx is an HTML page that redirects the browser to the merchant's success
//! or fail URL, a 3xx points straight at the error URL.

use crate::{
    error::{GatewayError, GatewayResult},
    provider::{
        EncodedRequest, GatewayAdapter, GatewayRequest, default_test_mode, env_flag, env_required,
    },
    reference::generate_gateway_reference,
    sanitize::SanitizedResponse,
    types::{CardBrand, Outcome, PaymentIntent, TransactionResult, required},
};
use chrono::{DateTime, Utc};
use http::header::LOCATION;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Test endpoint
pub const TEST_URL: &str = "https://test.paydollar.com/b2cDemo/eng/dPayment/payComp.jsp";
/// Live endpoint
pub const LIVE_URL: &str = "https://www.paydollar.com/b2c2/eng/dPayment/payComp.jsp";

const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

const PAY_TYPE_PURCHASE: &str = "N";
const PAY_TYPE_AUTHORIZE: &str = "H";

const DEFAULT_LANGUAGE: &str = "E";

const CARD_BRANDS: &[(CardBrand, &str)] = &[
    (CardBrand::Visa, "VISA"),
    (CardBrand::MasterCard, "Master"),
    (CardBrand::DinersClub, "Diners"),
    (CardBrand::Jcb, "JCB"),
];

/// ISO 4217 numeric codes
const CURRENCY_CODES: &[(&str, &str)] = &[
    ("HKD", "344"),
    ("USD", "840"),
    ("SGD", "702"),
    ("CNY", "156"),
    ("RMB", "156"),
    ("JPY", "392"),
    ("TWD", "901"),
    ("AUD", "036"),
    ("EUR", "978"),
    ("GBP", "826"),
    ("CAD", "124"),
];

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "E"),
    ("zh-tw", "C"),
    ("zh-hk", "C"),
    ("zh-cn", "X"),
    ("zh", "X"),
    ("ja", "J"),
    ("ko", "K"),
    ("th", "T"),
    ("fr", "F"),
    ("de", "G"),
    ("ru", "R"),
    ("es", "S"),
    ("vi", "V"),
];

static ORDER_ID_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="oId"]"#).unwrap());
static REDIRECT_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="urlRedirect"]"#).unwrap());

/// PayDollar configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PayDollarConfig {
    /// Merchant id.
    pub merchant_id: String,
    /// Where PayDollar sends the browser after an approved payment.
    pub success_url: String,
    /// Where PayDollar sends the browser after a declined payment.
    pub fail_url: String,
    /// Where PayDollar sends the browser after a processing error.
    pub error_url: String,
    /// Use the test endpoint.
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
}

impl PayDollarConfig {
    /// Create a test-mode configuration
    pub fn new(
        merchant_id: impl Into<String>,
        success_url: impl Into<String>,
        fail_url: impl Into<String>,
        error_url: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            success_url: success_url.into(),
            fail_url: fail_url.into(),
            error_url: error_url.into(),
            test_mode: default_test_mode(),
        }
    }

    /// Use the live endpoint
    pub fn production(mut self) -> Self {
        self.test_mode = false;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// `ARMATURE_PAYDOLLAR_MERCHANT_ID`, `ARMATURE_PAYDOLLAR_SUCCESS_URL`,
    /// `ARMATURE_PAYDOLLAR_FAIL_URL` and `ARMATURE_PAYDOLLAR_ERROR_URL` are
    /// required. `ARMATURE_PAYDOLLAR_TEST_MODE` defaults to true.
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = Self::new(
            env_required("ARMATURE_PAYDOLLAR_MERCHANT_ID")?,
            env_required("ARMATURE_PAYDOLLAR_SUCCESS_URL")?,
            env_required("ARMATURE_PAYDOLLAR_FAIL_URL")?,
            env_required("ARMATURE_PAYDOLLAR_ERROR_URL")?,
        );
        if let Some(test_mode) = env_flag("ARMATURE_PAYDOLLAR_TEST_MODE") {
            config.test_mode = test_mode;
        }
        Ok(config)
    }
}

/// PayDollar gateway
#[derive(Debug, Clone)]
pub struct PayDollarGateway {
    config: PayDollarConfig,
}

impl PayDollarGateway {
    /// Create a new PayDollar gateway
    pub fn new(config: PayDollarConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &PayDollarConfig {
        &self.config
    }

    fn form<'a>(
        &'a self,
        intent: &'a PaymentIntent,
        reference: &'a str,
        pay_type: &'static str,
    ) -> GatewayResult<PaymentForm<'a>> {
        required(intent.order_id(), "order_id")?;
        let currency = required(intent.currency(), "currency")?;
        let card = intent.require_card()?;
        let amount = intent.require_amount()?;

        let curr_code = currency_code(currency)?;
        let p_method = payment_method(card.resolve_brand()?)?;

        debug!(order_ref = reference, "Built PayDollar form");

        Ok(PaymentForm {
            merchant_id: &self.config.merchant_id,
            amount: amount.format_major(currency),
            order_ref: reference,
            curr_code,
            lang: language_code(intent.language()),
            p_method,
            card_holder: card.holder_name(),
            card_no: card.number(),
            ep_month: card.month().to_string(),
            ep_year: card.year().to_string(),
            security_code: card.cvv().unwrap_or_default(),
            pay_type,
            success_url: &self.config.success_url,
            fail_url: &self.config.fail_url,
            error_url: &self.config.error_url,
        })
    }

    /// Resolve a redirect target, tolerating the unescaped spaces PayDollar
    /// puts in its URLs
    fn resolve(&self, target: &str) -> GatewayResult<Url> {
        let target = target.trim().replace(' ', "%20");
        Url::parse(self.endpoint())
            .and_then(|base| base.join(&target))
            .map_err(|e| GatewayError::MalformedResponse(format!("invalid redirect URL: {}", e)))
    }

    fn interpret_page(&self, body: &str) -> GatewayResult<TransactionResult> {
        let (order_id, redirect) = {
            let document = Html::parse_document(body);
            (
                input_value(&document, &ORDER_ID_INPUT, "oId")?,
                input_value(&document, &REDIRECT_INPUT, "urlRedirect")?,
            )
        };

        if redirect.contains(self.config.success_url.as_str()) {
            return Ok(TransactionResult::new(Outcome::Success, "Success")
                .with_authorization(Some(order_id.clone()))
                .with_order_id(Some(order_id)));
        }

        let target = self.resolve(&redirect)?;
        Ok(
            TransactionResult::new(Outcome::Failed, failure_message(&target))
                .with_order_id(Some(order_id)),
        )
    }

    fn interpret_redirect(&self, response: &SanitizedResponse) -> GatewayResult<TransactionResult> {
        let location = response.header(LOCATION).ok_or_else(|| {
            GatewayError::MalformedResponse("redirect without Location header".to_string())
        })?;
        let target = self.resolve(&location)?;

        Ok(
            TransactionResult::new(Outcome::Failed, failure_message(&target))
                .with_order_id(query_param(&target, "Ref")),
        )
    }
}

impl GatewayAdapter for PayDollarGateway {
    fn name(&self) -> &'static str {
        "paydollar"
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
        let (intent, pay_type) = match *request {
            GatewayRequest::Purchase(intent) => (intent, PAY_TYPE_PURCHASE),
            GatewayRequest::Authorize(intent) => (intent, PAY_TYPE_AUTHORIZE),
            GatewayRequest::HostedPurchase(_) | GatewayRequest::FetchStatus(_) => {
                return Err(self.unsupported(request));
            }
        };

        let reference = intent
            .order_id()
            .map(|order_id| generate_gateway_reference(order_id, now))
            .unwrap_or_default();
        let form = self.form(intent, &reference, pay_type)?;

        let body = serde_urlencoded::to_string(&form)
            .map_err(|e| GatewayError::Encoding(e.to_string()))?;

        Ok(EncodedRequest::new(body, CONTENT_TYPE))
    }

    fn interpret(&self, response: &SanitizedResponse) -> GatewayResult<TransactionResult> {
        let result = match response.status() {
            200..=299 => self.interpret_page(response.body())?,
            300..=399 => self.interpret_redirect(response)?,
            status => return Err(GatewayError::UnexpectedStatus(status)),
        };

        Ok(result.with_test(self.is_test()))
    }
}

fn currency_code(currency: &str) -> GatewayResult<&'static str> {
    let currency = currency.trim().to_uppercase();
    CURRENCY_CODES
        .iter()
        .find(|(code, _)| *code == currency)
        .map(|(_, numeric)| *numeric)
        .ok_or(GatewayError::UnsupportedCurrency(currency))
}

fn payment_method(brand: CardBrand) -> GatewayResult<&'static str> {
    CARD_BRANDS
        .iter()
        .find(|(b, _)| *b == brand)
        .map(|(_, method)| *method)
        .ok_or_else(|| GatewayError::UnsupportedCardBrand(brand.to_string()))
}

fn language_code(language: Option<&str>) -> &'static str {
    let Some(language) = language else {
        warn!("No language given, defaulting PayDollar language to English");
        return DEFAULT_LANGUAGE;
    };

    let normalized = language.trim().to_lowercase().replace('_', "-");
    match LANGUAGES.iter().find(|(iso, _)| *iso == normalized) {
        Some((_, code)) => *code,
        None => {
            warn!(language, "Unmapped language, defaulting PayDollar language to English");
            DEFAULT_LANGUAGE
        }
    }
}

fn input_value(document: &Html, selector: &Selector, name: &str) -> GatewayResult<String> {
    document
        .select(selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GatewayError::MalformedResponse(format!("missing {} input", name)))
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
}

fn failure_message(target: &Url) -> String {
    query_param(target, "errorMsg").unwrap_or_else(|| "Failed".to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentForm<'a> {
    merchant_id: &'a str,
    amount: String,
    order_ref: &'a str,
    curr_code: &'static str,
    lang: &'static str,
    p_method: &'static str,
    card_holder: String,
    card_no: &'a str,
    ep_month: String,
    ep_year: String,
    security_code: &'a str,
    pay_type: &'static str,
    success_url: &'a str,
    fail_url: &'a str,
    error_url: &'a str,
}
