use std::collections::HashSet;

use anyhow::Result;
use warehouse::RawTable;

use crate::cascade::KeySet;
use crate::impute::{median_fill, parse_number, Bounds, PERCENT};
use crate::rules::{apply_rules, first_occurrence, RejectLog, RejectReason, Rule, Staged};

#[derive(Debug, Clone, PartialEq)]
pub struct CleanPayment {
    pub payment_id: String,
    pub ride_id: String,
    pub payment_method: Option<String>,
    pub fare: f64,
    pub discount_percent: f64,
    pub discount_amount: f64,
    pub final_amount: f64,
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentDraft {
    payment_id: Option<String>,
    ride_id: Option<String>,
    payment_method: Option<String>,
    fare: Option<f64>,
    discount_percent: Option<f64>,
    discount_amount: Option<f64>,
    final_amount: Option<f64>,
    payment_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRule {
    NullRideId,
    UnknownRide,
    NullPaymentId,
    DuplicatePaymentId,
}

impl PaymentRule {
    pub const ORDER: [PaymentRule; 4] = [
        PaymentRule::NullRideId,
        PaymentRule::UnknownRide,
        PaymentRule::NullPaymentId,
        PaymentRule::DuplicatePaymentId,
    ];
}

impl Rule for PaymentRule {
    type Draft = PaymentDraft;
    /// Accepted ride ids.
    type Context = KeySet;

    fn reason(self) -> RejectReason {
        match self {
            PaymentRule::NullRideId => RejectReason::NullOrEmptyRideId,
            PaymentRule::UnknownRide => RejectReason::InvalidRideIdNotInRides,
            PaymentRule::NullPaymentId => RejectReason::NullOrEmptyPaymentId,
            PaymentRule::DuplicatePaymentId => RejectReason::DuplicatePaymentId,
        }
    }

    fn admits(self, d: &PaymentDraft, rides: &KeySet, seen: &mut HashSet<String>) -> bool {
        match self {
            PaymentRule::NullRideId => d.ride_id.is_some(),
            PaymentRule::UnknownRide => d.ride_id.as_deref().is_some_and(|k| rides.contains(k)),
            PaymentRule::NullPaymentId => d.payment_id.is_some(),
            PaymentRule::DuplicatePaymentId => first_occurrence(d.payment_id.as_deref(), seen),
        }
    }
}

pub fn validate(raw: &RawTable, rides: &KeySet, log: &mut RejectLog) -> Result<Vec<CleanPayment>> {
    let payment_id = raw.column_index("payment_id")?;
    let ride_id = raw.column_index("ride_id")?;
    let payment_method = raw.column_index("payment_method")?;
    let fare = raw.column_index("fare")?;
    let discount_percent = raw.column_index("discount_percent")?;
    let discount_amount = raw.column_index("discount_amount")?;
    let final_amount = raw.column_index("final_amount")?;
    let payment_status = raw.column_index("payment_status")?;

    let staged = raw
        .rows
        .iter()
        .map(|r| Staged {
            draft: PaymentDraft {
                payment_id: r.text(payment_id).map(str::to_string),
                ride_id: r.text(ride_id).map(str::to_string),
                payment_method: r.text(payment_method).map(str::to_string),
                fare: parse_number(r.text(fare), Bounds::NonNegative),
                discount_percent: parse_number(r.text(discount_percent), PERCENT),
                discount_amount: parse_number(r.text(discount_amount), Bounds::NonNegative),
                final_amount: parse_number(r.text(final_amount), Bounds::NonNegative),
                payment_status: r.text(payment_status).map(str::to_string),
            },
            raw: r.clone(),
        })
        .collect();

    let survivors = apply_rules(&PaymentRule::ORDER, staged, rides, log);
    let fare_fill = median_fill(survivors.iter().map(|s| &s.draft.fare));
    tracing::debug!(fare_fill, "payment imputation values");

    Ok(survivors
        .into_iter()
        .filter_map(|s| {
            let d = s.draft;
            Some(CleanPayment {
                payment_id: d.payment_id?,
                ride_id: d.ride_id?,
                payment_method: d.payment_method,
                fare: d.fare.unwrap_or(fare_fill),
                discount_percent: d.discount_percent.unwrap_or(0.0),
                discount_amount: d.discount_amount.unwrap_or(0.0),
                final_amount: d.final_amount.unwrap_or(0.0),
                payment_status: d.payment_status,
            })
        })
        .collect())
}
