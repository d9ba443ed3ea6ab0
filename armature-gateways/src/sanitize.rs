//! Sensitive-field redaction
//!
//! Every response body passes through [`Sanitizer`] exactly once, before it
//! is interpreted, logged or attached to a result. The only way to obtain a
//! [`SanitizedResponse`] is [`RawWireResponse::sanitize`], and interpreters
//! accept nothing else.

use crate::transport::RawWireResponse;
use http::HeaderMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Replacement text for redacted values
pub const PLACEHOLDER: &str = "OMITTED";

// Element content up to the next tag, or a whole CDATA section. The open tag
// may carry attributes but the name must end there, so CVVRESULT is left alone.
static XML_FIELDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["CREDITCARDNUMBER", "EXPIRYDATE", "CVV"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(
                r"(?s)(<{tag}(?:\s[^>]*)?>)(?:<!\[CDATA\[.*?\]\]>|[^<]*)(</{tag}>)"
            ))
            .unwrap()
        })
        .collect()
});

// key=value pairs in form bodies and query strings
static FORM_FIELDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\b(?:cardNo|epMonth|epYear|securityCode)=)[^&\s'\x22<>]*").unwrap()
});

// <input> tags in HTML pages, attributes in any order
static HTML_INPUTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<input\b[^>]*>").unwrap());

static SENSITIVE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\sname\s*=\s*["']?(?:cardNo|epMonth|epYear|securityCode)(?:["'\s/>]|$)"#)
        .unwrap()
});

static INPUT_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(\svalue\s*=\s*)("[^"]*"|'[^']*'|[^\s"'>]*)"#).unwrap()
});

/// Redacts card data from response bodies
#[derive(Default)]
pub struct Sanitizer {
    card_numbers: Vec<String>,
}

impl Sanitizer {
    /// Create a sanitizer that only knows the structural fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Also redact every verbatim occurrence of this card number.
    ///
    /// Numbers shorter than 12 digits are ignored, they would match too much.
    pub fn with_card_number(mut self, number: &str) -> Self {
        let number = number.trim();
        if number.len() >= 12 {
            self.card_numbers.push(number.to_string());
        }
        self
    }

    /// Redact a body. Idempotent.
    pub fn sanitize(&self, body: &str) -> String {
        let mut sanitized = body.to_string();

        for pattern in XML_FIELDS.iter() {
            sanitized = pattern
                .replace_all(&sanitized, format!("${{1}}{PLACEHOLDER}${{2}}").as_str())
                .into_owned();
        }

        sanitized = FORM_FIELDS
            .replace_all(&sanitized, format!("${{1}}{PLACEHOLDER}").as_str())
            .into_owned();
        sanitized = HTML_INPUTS
            .replace_all(&sanitized, |caps: &Captures<'_>| redact_input(&caps[0]))
            .into_owned();

        for number in &self.card_numbers {
            sanitized = sanitized.replace(number.as_str(), PLACEHOLDER);
        }

        sanitized
    }
}

fn redact_input(tag: &str) -> String {
    if !SENSITIVE_NAME.is_match(tag) {
        return tag.to_string();
    }

    INPUT_VALUE
        .replace_all(tag, |caps: &Captures<'_>| {
            let quote = match caps[2].chars().next() {
                Some(q @ ('"' | '\'')) => q.to_string(),
                _ => String::new(),
            };
            format!("{}{quote}{PLACEHOLDER}{quote}", &caps[1])
        })
        .into_owned()
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer")
            .field("card_numbers", &self.card_numbers.len())
            .finish()
    }
}

/// Response whose body has been through the [`Sanitizer`]
#[derive(Debug, Clone)]
pub struct SanitizedResponse {
    status: u16,
    headers: HeaderMap,
    body: String,
}

impl SanitizedResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Header value as text, tolerating bytes outside visible ASCII
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<String> {
        self.headers
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }
}

impl RawWireResponse {
    /// Redact the body and consume the raw response
    pub fn sanitize(self, sanitizer: &Sanitizer) -> SanitizedResponse {
        let (status, mut headers, body) = self.into_parts();

        for value in headers.values_mut() {
            let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
            let redacted = sanitizer.sanitize(&text);
            if redacted != text {
                if let Ok(replacement) = http::HeaderValue::from_str(&redacted) {
                    *value = replacement;
                }
            }
        }

        SanitizedResponse {
            status,
            headers,
            body: sanitizer.sanitize(&body),
        }
    }
}
