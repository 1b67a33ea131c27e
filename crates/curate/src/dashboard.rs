//! Denormalized ride-level table for BI dashboards.
//!
//! One row per user × ride × payment × feedback combination, with the ride's
//! captain attached. Users without rides keep a single row with empty ride
//! columns, and captains without rides are appended as captain-only rows.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use validate::{CleanCaptain, CleanFeedback, CleanPayment, CleanRide, CleanUser, SilverTables};

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRow {
    pub user: Option<CleanUser>,
    pub ride: Option<CleanRide>,
    pub payment: Option<CleanPayment>,
    pub feedback: Option<CleanFeedback>,
    pub captain: Option<CleanCaptain>,
}

impl DashboardRow {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }

    pub fn captain_id(&self) -> Option<&str> {
        self.ride
            .as_ref()
            .map(|r| r.captain_id.as_str())
            .or_else(|| self.captain.as_ref().map(|c| c.captain_id.as_str()))
    }
}

fn group_by<'a, T>(rows: &'a [T], key: impl Fn(&T) -> &str) -> HashMap<&'a str, Vec<&'a T>> {
    let mut out: HashMap<&str, Vec<&T>> = HashMap::new();
    for r in rows {
        out.entry(key(r)).or_default().push(r);
    }
    out
}

/// `Some` per element, or a single `None` for an empty group.
fn or_none<'a, T>(group: Option<&Vec<&'a T>>) -> Vec<Option<&'a T>> {
    match group {
        Some(g) if !g.is_empty() => g.iter().copied().map(Some).collect(),
        _ => vec![None],
    }
}

/// Nulls sort after every value.
fn nulls_last(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn build_dashboard(silver: &SilverTables) -> Vec<DashboardRow> {
    let captains: HashMap<&str, &CleanCaptain> =
        silver.captains.iter().map(|c| (c.captain_id.as_str(), c)).collect();
    let rides = group_by(&silver.rides, |r| r.user_id.as_str());
    let payments = group_by(&silver.payments, |p| p.ride_id.as_str());
    let feedback = group_by(&silver.feedback, |f| f.ride_id.as_str());

    let mut out = Vec::new();
    for user in &silver.users {
        for ride in or_none(rides.get(user.user_id.as_str())) {
            let captain = ride.and_then(|r| captains.get(r.captain_id.as_str()).copied());
            let (pays, fbs) = match ride {
                Some(r) => (
                    or_none(payments.get(r.ride_id.as_str())),
                    or_none(feedback.get(r.ride_id.as_str())),
                ),
                None => (vec![None], vec![None]),
            };
            for &payment in &pays {
                for &fb in &fbs {
                    out.push(DashboardRow {
                        user: Some(user.clone()),
                        ride: ride.cloned(),
                        payment: payment.cloned(),
                        feedback: fb.cloned(),
                        captain: captain.cloned(),
                    });
                }
            }
        }
    }

    let riding: HashSet<&str> = silver.rides.iter().map(|r| r.captain_id.as_str()).collect();
    out.extend(
        silver
            .captains
            .iter()
            .filter(|c| !riding.contains(c.captain_id.as_str()))
            .map(|c| DashboardRow {
                user: None,
                ride: None,
                payment: None,
                feedback: None,
                captain: Some(c.clone()),
            }),
    );

    out.sort_by(|a, b| {
        nulls_last(a.user_id(), b.user_id()).then_with(|| nulls_last(a.captain_id(), b.captain_id()))
    });
    out
}
