//! Order references
//!
//! Two kinds of reference cross the wire:
//!
//! - the **gateway reference** sent with every payment request, built from the
//!   caller's order id plus the time of day so that retries of the same order
//!   look like new orders to the processor;
//! - the **details reference** handed back to the caller after a hosted
//!   redirect, a fixed-width token carrying the processor order id and effort
//!   id at fixed offsets.

use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use std::fmt;

const MERCHANT_WIDTH: usize = 10;
const ORDER_OFFSET: usize = 10;
const ORDER_WIDTH: usize = 10;
const EFFORT_OFFSET: usize = 20;
const EFFORT_WIDTH: usize = 5;

/// Minimum token length accepted by [`DetailsReference::decode`]
pub const DETAILS_REFERENCE_LEN: usize = EFFORT_OFFSET + EFFORT_WIDTH;

/// Build the per-attempt reference for an order.
///
/// The suffix has one-second granularity: two attempts for the same order id
/// within the same second produce the same reference and the processor will
/// treat the second one as a duplicate.
pub fn generate_gateway_reference(order_id: &str, now: DateTime<Utc>) -> String {
    format!("{}{}", order_id, now.format("%H%M%S"))
}

/// Decode a details token into `(order_id, effort_id)`
pub fn decode_details_reference(token: &str) -> GatewayResult<(String, String)> {
    let reference = DetailsReference::decode(token)?;
    Ok((reference.order_id, reference.effort_id))
}

/// Processor order id and effort id of a hosted payment attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailsReference {
    order_id: String,
    effort_id: String,
}

impl DetailsReference {
    /// Create a reference, checking each id fits its field
    pub fn new(order_id: impl Into<String>, effort_id: impl Into<String>) -> GatewayResult<Self> {
        let order_id = order_id.into();
        let effort_id = effort_id.into();

        check_segment("order id", &order_id, ORDER_WIDTH)?;
        check_segment("effort id", &effort_id, EFFORT_WIDTH)?;

        Ok(Self {
            order_id,
            effort_id,
        })
    }

    /// Decode a token.
    ///
    /// Order id is read from offset 10 (10 chars), effort id from offset 20
    /// (5 chars). Leading zeros are stripped; an all-zero field reads as `"0"`.
    /// Anything past offset 25 is ignored.
    pub fn decode(token: &str) -> GatewayResult<Self> {
        if token.len() < DETAILS_REFERENCE_LEN {
            return Err(GatewayError::MalformedReference(format!(
                "expected at least {} characters, got {}",
                DETAILS_REFERENCE_LEN,
                token.len()
            )));
        }

        let order_id = field(token, ORDER_OFFSET, ORDER_WIDTH)?;
        let effort_id = field(token, EFFORT_OFFSET, EFFORT_WIDTH)?;

        Ok(Self {
            order_id: strip_padding(order_id),
            effort_id: strip_padding(effort_id),
        })
    }

    /// Encode as a token, with the merchant id in the leading field
    pub fn to_token(&self, merchant_id: &str) -> GatewayResult<String> {
        check_segment("merchant id", merchant_id, MERCHANT_WIDTH)?;

        Ok(format!(
            "{:0>mw$}{:0>ow$}{:0>ew$}",
            merchant_id,
            self.order_id,
            self.effort_id,
            mw = MERCHANT_WIDTH,
            ow = ORDER_WIDTH,
            ew = EFFORT_WIDTH,
        ))
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn effort_id(&self) -> &str {
        &self.effort_id
    }
}

impl fmt::Display for DetailsReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {} effort {}", self.order_id, self.effort_id)
    }
}

fn field(token: &str, offset: usize, width: usize) -> GatewayResult<&str> {
    token.get(offset..offset + width).ok_or_else(|| {
        GatewayError::MalformedReference(format!(
            "field at offset {} is not on a character boundary",
            offset
        ))
    })
}

fn strip_padding(segment: &str) -> String {
    let stripped = segment.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

fn check_segment(name: &str, value: &str, width: usize) -> GatewayResult<()> {
    if value.is_empty() || !value.is_ascii() || value.len() > width {
        return Err(GatewayError::MalformedReference(format!(
            "{} must be 1 to {} ASCII characters",
            name, width
        )));
    }
    Ok(())
}
