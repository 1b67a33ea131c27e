//! Ordered rule tables and the engine that applies them.
//!
//! Every entity declares a `Copy` rule enum whose `ORDER` constant is its
//! rule table. [`apply_rules`] walks the table left to right: each rule
//! partitions the current survivors, rejected rows move to the
//! [`RejectLog`] with that rule's reason, and only survivors reach the next
//! rule. A row therefore carries the reason of the first rule it failed.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use time::OffsetDateTime;
use warehouse::{Entity, RawRow, RawTable};

/// Stable reason codes written to the audit layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectReason {
    NullUserId,
    InvalidSignupDate,
    DuplicateUserId,
    NullCaptainId,
    DuplicateCaptainId,
    NullOrEmptyName,
    NullOrEmptyRideId,
    NullOrEmptyUserId,
    NullOrEmptyCaptainId,
    NullOrInvalidRideDate,
    InvalidUserIdNotInUsers,
    InvalidCaptainIdNotInCaptains,
    DuplicateRideId,
    InvalidRideIdNotInRides,
    NullOrEmptyPaymentId,
    DuplicatePaymentId,
    NullOrEmptyFeedbackId,
    RideIdNotInRides,
    DuplicateFeedbackId,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::NullUserId => "null_user_id",
            RejectReason::InvalidSignupDate => "invalid_signup_date",
            RejectReason::DuplicateUserId => "duplicate_user_id",
            RejectReason::NullCaptainId => "null_captain_id",
            RejectReason::DuplicateCaptainId => "duplicate_captain_id",
            RejectReason::NullOrEmptyName => "null_or_empty_name",
            RejectReason::NullOrEmptyRideId => "null_or_empty_ride_id",
            RejectReason::NullOrEmptyUserId => "null_or_empty_user_id",
            RejectReason::NullOrEmptyCaptainId => "null_or_empty_captain_id",
            RejectReason::NullOrInvalidRideDate => "null_or_invalid_ride_date",
            RejectReason::InvalidUserIdNotInUsers => "invalid_user_id_not_in_users",
            RejectReason::InvalidCaptainIdNotInCaptains => "invalid_captain_id_not_in_captains",
            RejectReason::DuplicateRideId => "duplicate_ride_id",
            RejectReason::InvalidRideIdNotInRides => "invalid_ride_id_not_in_rides",
            RejectReason::NullOrEmptyPaymentId => "null_or_empty_payment_id",
            RejectReason::DuplicatePaymentId => "duplicate_payment_id",
            RejectReason::NullOrEmptyFeedbackId => "null_or_empty_feedback_id",
            RejectReason::RideIdNotInRides => "ride_id_not_in_rides",
            RejectReason::DuplicateFeedbackId => "duplicate_feedback_id",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A predicate of a rule table, tagged with the reason it rejects with.
pub trait Rule: Copy + fmt::Debug {
    /// The typed draft the rule inspects.
    type Draft;
    /// Read-only inputs shared by all rows (upstream key sets).
    type Context;

    fn reason(self) -> RejectReason;

    /// Whether `draft` survives. `seen` is private to this rule's pass and
    /// lets duplicate rules keep the first occurrence.
    fn admits(self, draft: &Self::Draft, ctx: &Self::Context, seen: &mut HashSet<String>) -> bool;
}

/// A raw row travelling with its typed draft until it is cleaned or rejected.
#[derive(Debug, Clone)]
pub struct Staged<D> {
    pub raw: RawRow,
    pub draft: D,
}

/// Keep-first duplicate check for a key that earlier rules made non-null.
pub fn first_occurrence(key: Option<&str>, seen: &mut HashSet<String>) -> bool {
    match key {
        Some(k) => seen.insert(k.to_string()),
        None => true,
    }
}

pub fn apply_rules<R: Rule>(
    rules: &[R],
    rows: Vec<Staged<R::Draft>>,
    ctx: &R::Context,
    log: &mut RejectLog,
) -> Vec<Staged<R::Draft>> {
    let mut survivors = rows;
    for &rule in rules {
        if survivors.is_empty() {
            break;
        }
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(survivors.len());
        for row in survivors {
            if rule.admits(&row.draft, ctx, &mut seen) {
                kept.push(row);
            } else {
                log.reject(row.raw, rule.reason());
            }
        }
        survivors = kept;
    }
    survivors
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub raw: RawRow,
    pub reason: RejectReason,
    pub run_ts: OffsetDateTime,
}

/// Rejected rows of one entity for one run.
#[derive(Debug, Clone)]
pub struct RejectLog {
    pub entity: Entity,
    /// Raw column names, in the order of [`RawRow::values`].
    pub columns: Vec<String>,
    pub run_ts: OffsetDateTime,
    pub records: Vec<RejectedRecord>,
}

impl RejectLog {
    pub fn for_table(raw: &RawTable, run_ts: OffsetDateTime) -> Self {
        Self {
            entity: raw.entity,
            columns: raw.columns.clone(),
            run_ts,
            records: Vec::new(),
        }
    }

    pub fn reject(&mut self, raw: RawRow, reason: RejectReason) {
        self.records.push(RejectedRecord {
            raw,
            reason,
            run_ts: self.run_ts,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counts_by_reason(&self) -> BTreeMap<RejectReason, u64> {
        let mut out = BTreeMap::new();
        for r in &self.records {
            *out.entry(r.reason).or_insert(0) += 1;
        }
        out
    }

    pub fn reasons(&self) -> Vec<RejectReason> {
        self.records.iter().map(|r| r.reason).collect()
    }
}
