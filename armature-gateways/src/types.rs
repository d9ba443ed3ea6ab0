//! Payment types and data structures

use crate::error::{GatewayError, GatewayResult};
use crate::money::Money;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;

/// Card brand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    MasterCard,
    AmericanExpress,
    DinersClub,
    Jcb,
    Discover,
}

impl CardBrand {
    /// Parse from a brand name, accepting the usual aliases
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "visa" => Some(Self::Visa),
            "master" | "master_card" | "mastercard" | "mc" => Some(Self::MasterCard),
            "amex" | "american_express" | "americanexpress" => Some(Self::AmericanExpress),
            "diners" | "diners_club" | "dinersclub" => Some(Self::DinersClub),
            "jcb" => Some(Self::Jcb),
            "discover" => Some(Self::Discover),
            _ => None,
        }
    }

    /// Detect brand from the card number prefix
    pub fn detect(number: &str) -> Option<Self> {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        let prefix = |len: usize| -> u32 {
            digits
                .get(..len)
                .and_then(|p| p.parse().ok())
                .unwrap_or(0)
        };

        match (prefix(1), prefix(2), prefix(3), prefix(4)) {
            (4, ..) => Some(Self::Visa),
            (_, 34 | 37, ..) => Some(Self::AmericanExpress),
            (_, 51..=55, ..) | (.., 2221..=2720) => Some(Self::MasterCard),
            (_, 36 | 38, ..) | (_, _, 300..=305, _) => Some(Self::DinersClub),
            (.., 3528..=3589) => Some(Self::Jcb),
            (.., 6011) | (_, 65, ..) => Some(Self::Discover),
            _ => None,
        }
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visa => "visa",
            Self::MasterCard => "master",
            Self::AmericanExpress => "american_express",
            Self::DinersClub => "diners_club",
            Self::Jcb => "jcb",
            Self::Discover => "discover",
        }
    }
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Card details
///
/// Number and verification code are secrets and never show up in `Debug`.
#[derive(Debug)]
pub struct CreditCard {
    number: SecretString,
    month: u8,
    year: u16,
    verification_value: Option<SecretString>,
    first_name: String,
    last_name: String,
    brand: Option<String>,
}

impl CreditCard {
    /// Create a card from number and expiry
    pub fn new(number: impl Into<String>, month: u8, year: u16) -> Self {
        Self {
            number: SecretString::new(number.into().into()),
            month,
            year,
            verification_value: None,
            first_name: String::new(),
            last_name: String::new(),
            brand: None,
        }
    }

    /// With verification code (CVV/CVC)
    pub fn verification_value(mut self, value: impl Into<String>) -> Self {
        self.verification_value = Some(SecretString::new(value.into().into()));
        self
    }

    /// With holder name
    pub fn holder(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    /// With explicit brand name (otherwise detected from the number)
    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Card number
    pub fn number(&self) -> &str {
        self.number.expose_secret()
    }

    /// Verification code
    pub fn cvv(&self) -> Option<&str> {
        self.verification_value.as_ref().map(|v| v.expose_secret())
    }

    /// Expiry month (1-12)
    pub fn month(&self) -> u8 {
        self.month
    }

    /// Expiry year (four digits)
    pub fn year(&self) -> u16 {
        self.year
    }

    /// Expiry as `MMYY`
    pub fn expiry_mmyy(&self) -> String {
        format!("{:02}{:02}", self.month, self.year % 100)
    }

    /// Holder first name
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    /// Holder last name
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// Full holder name
    pub fn holder_name(&self) -> String {
        [self.first_name.as_str(), self.last_name.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Resolve the brand: the explicit name if one was given, else the number
    /// prefix.
    pub fn resolve_brand(&self) -> GatewayResult<CardBrand> {
        match &self.brand {
            Some(name) => CardBrand::from_name(name)
                .ok_or_else(|| GatewayError::UnsupportedCardBrand(name.clone())),
            None => CardBrand::detect(self.number())
                .ok_or_else(|| GatewayError::UnsupportedCardBrand("unknown".to_string())),
        }
    }
}

/// Billing address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillingAddress {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// Normalized payment intent
///
/// Built once through [`PaymentIntent::builder`] and read-only afterwards.
/// Presence of gateway-specific required fields is checked when the intent
/// is encoded, so one intent type serves every gateway.
#[derive(Debug)]
pub struct PaymentIntent {
    amount: Money,
    currency: Option<String>,
    order_id: Option<String>,
    card: Option<CreditCard>,
    billing: BillingAddress,
    language: Option<String>,
    country: Option<String>,
    return_url: Option<String>,
    ip_address: Option<String>,
}

impl PaymentIntent {
    /// Start building an intent
    pub fn builder() -> PaymentIntentBuilder {
        PaymentIntentBuilder::default()
    }

    /// Amount in smallest currency unit
    pub fn amount(&self) -> Money {
        self.amount
    }

    /// Currency code
    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    /// Caller-assigned order id
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    /// Card
    pub fn card(&self) -> Option<&CreditCard> {
        self.card.as_ref()
    }

    /// Billing address
    pub fn billing(&self) -> &BillingAddress {
        &self.billing
    }

    /// Language code
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Country code
    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Return URL for hosted flows
    pub fn return_url(&self) -> Option<&str> {
        self.return_url.as_deref()
    }

    /// Customer IP address
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Positive amount or `InvalidAmount`
    pub(crate) fn require_amount(&self) -> GatewayResult<Money> {
        if self.amount.is_positive() {
            Ok(self.amount)
        } else {
            Err(GatewayError::InvalidAmount(self.amount.minor_units()))
        }
    }

    /// Card or `MissingRequiredField("card")`
    pub(crate) fn require_card(&self) -> GatewayResult<&CreditCard> {
        self.card
            .as_ref()
            .ok_or(GatewayError::MissingRequiredField("card"))
    }
}

/// Builder for [`PaymentIntent`]
#[derive(Debug, Default)]
pub struct PaymentIntentBuilder {
    amount: Option<Money>,
    currency: Option<String>,
    order_id: Option<String>,
    card: Option<CreditCard>,
    billing: BillingAddress,
    language: Option<String>,
    country: Option<String>,
    return_url: Option<String>,
    ip_address: Option<String>,
}

impl PaymentIntentBuilder {
    /// Amount in smallest currency unit
    pub fn amount(mut self, amount: impl Into<Money>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    /// Currency code (ISO 4217)
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Order id
    pub fn order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Card
    pub fn card(mut self, card: CreditCard) -> Self {
        self.card = Some(card);
        self
    }

    /// Billing address
    pub fn billing(mut self, billing: BillingAddress) -> Self {
        self.billing = billing;
        self
    }

    /// Language code
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Country code (ISO 3166 alpha-2)
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Return URL for hosted flows
    pub fn return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    /// Customer IP address
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Finish building
    pub fn build(self) -> PaymentIntent {
        PaymentIntent {
            amount: self.amount.unwrap_or(Money::new(0)),
            currency: non_blank(self.currency),
            order_id: non_blank(self.order_id),
            card: self.card,
            billing: self.billing,
            language: non_blank(self.language),
            country: non_blank(self.country),
            return_url: non_blank(self.return_url),
            ip_address: non_blank(self.ip_address),
        }
    }
}

/// Canonical transaction outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Pending,
    Rejected,
    Failed,
}

impl Outcome {
    fn default_message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Pending => "Pending",
            Self::Rejected => "Rejected",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_message())
    }
}

/// Uniform result of one gateway call
///
/// Blank optional values are stored as `None`. An authorization code is
/// never kept on a rejected or failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    outcome: Outcome,
    message: String,
    authorization: Option<String>,
    order_id: Option<String>,
    action_url: Option<String>,
    status: Option<String>,
    fraud_review: Option<String>,
    avs_result: Option<String>,
    cvv_result: Option<String>,
    test: bool,
    raw_response: Option<String>,
}

impl TransactionResult {
    /// Create a result; a blank message is replaced by the outcome's name
    pub fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            outcome.default_message().to_string()
        } else {
            message
        };

        Self {
            outcome,
            message,
            authorization: None,
            order_id: None,
            action_url: None,
            status: None,
            fraud_review: None,
            avs_result: None,
            cvv_result: None,
            test: false,
            raw_response: None,
        }
    }

    /// With authorization code (dropped for rejected/failed outcomes)
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = match self.outcome {
            Outcome::Rejected | Outcome::Failed => None,
            Outcome::Success | Outcome::Pending => non_blank(authorization),
        };
        self
    }

    /// With provider-reported order id
    pub fn with_order_id(mut self, order_id: Option<String>) -> Self {
        self.order_id = non_blank(order_id);
        self
    }

    /// With action URL for hosted flows
    pub fn with_action_url(mut self, action_url: Option<String>) -> Self {
        self.action_url = non_blank(action_url);
        self
    }

    /// With provider status id
    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.status = non_blank(status);
        self
    }

    /// With fraud, AVS and CVV verdicts
    pub fn with_verdicts(
        mut self,
        fraud_review: Option<String>,
        avs_result: Option<String>,
        cvv_result: Option<String>,
    ) -> Self {
        self.fraud_review = non_blank(fraud_review);
        self.avs_result = non_blank(avs_result);
        self.cvv_result = non_blank(cvv_result);
        self
    }

    /// Mark as produced by the test endpoint
    pub fn with_test(mut self, test: bool) -> Self {
        self.test = test;
        self
    }

    /// Attach the sanitized response body
    pub(crate) fn with_raw_response(mut self, body: String) -> Self {
        self.raw_response = Some(body);
        self
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn action_url(&self) -> Option<&str> {
        self.action_url.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn fraud_review(&self) -> Option<&str> {
        self.fraud_review.as_deref()
    }

    pub fn avs_result(&self) -> Option<&str> {
        self.avs_result.as_deref()
    }

    pub fn cvv_result(&self) -> Option<&str> {
        self.cvv_result.as_deref()
    }

    pub fn is_test(&self) -> bool {
        self.test
    }

    /// Sanitized response body
    pub fn raw_response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == Outcome::Pending
    }
}

/// Trim and drop empty strings
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Borrowed required value or `MissingRequiredField`
pub(crate) fn required<'a>(value: Option<&'a str>, field: &'static str) -> GatewayResult<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(GatewayError::MissingRequiredField(field))
}
