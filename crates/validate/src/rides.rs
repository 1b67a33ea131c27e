use std::collections::HashSet;

use anyhow::Result;
use time::Date;
use warehouse::RawTable;

use crate::cascade::KeySet;
use crate::dates::DateParser;
use crate::impute::{median_fill, mode, parse_number, Bounds};
use crate::rules::{apply_rules, first_occurrence, RejectLog, RejectReason, Rule, Staged};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct CleanRide {
    pub ride_id: String,
    pub user_id: String,
    pub captain_id: String,
    pub ride_date: Date,
    pub pickup_loc: String,
    pub drop_loc: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub ride_status: String,
}

#[derive(Debug, Clone)]
pub struct RideDraft {
    ride_id: Option<String>,
    user_id: Option<String>,
    captain_id: Option<String>,
    ride_date: Option<Date>,
    pickup_loc: Option<String>,
    drop_loc: Option<String>,
    distance_km: Option<f64>,
    duration_min: Option<f64>,
    ride_status: Option<String>,
}

/// Accepted keys of the entities a ride references.
#[derive(Debug, Clone, Default)]
pub struct RideUpstream {
    pub users: KeySet,
    pub captains: KeySet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideRule {
    NullRideId,
    NullUserId,
    NullCaptainId,
    InvalidRideDate,
    UnknownUser,
    UnknownCaptain,
    DuplicateRideId,
}

impl RideRule {
    pub const ORDER: [RideRule; 7] = [
        RideRule::NullRideId,
        RideRule::NullUserId,
        RideRule::NullCaptainId,
        RideRule::InvalidRideDate,
        RideRule::UnknownUser,
        RideRule::UnknownCaptain,
        RideRule::DuplicateRideId,
    ];
}

impl Rule for RideRule {
    type Draft = RideDraft;
    type Context = RideUpstream;

    fn reason(self) -> RejectReason {
        match self {
            RideRule::NullRideId => RejectReason::NullOrEmptyRideId,
            RideRule::NullUserId => RejectReason::NullOrEmptyUserId,
            RideRule::NullCaptainId => RejectReason::NullOrEmptyCaptainId,
            RideRule::InvalidRideDate => RejectReason::NullOrInvalidRideDate,
            RideRule::UnknownUser => RejectReason::InvalidUserIdNotInUsers,
            RideRule::UnknownCaptain => RejectReason::InvalidCaptainIdNotInCaptains,
            RideRule::DuplicateRideId => RejectReason::DuplicateRideId,
        }
    }

    fn admits(self, d: &RideDraft, up: &RideUpstream, seen: &mut HashSet<String>) -> bool {
        match self {
            RideRule::NullRideId => d.ride_id.is_some(),
            RideRule::NullUserId => d.user_id.is_some(),
            RideRule::NullCaptainId => d.captain_id.is_some(),
            RideRule::InvalidRideDate => d.ride_date.is_some(),
            RideRule::UnknownUser => d.user_id.as_deref().is_some_and(|k| up.users.contains(k)),
            RideRule::UnknownCaptain => d
                .captain_id
                .as_deref()
                .is_some_and(|k| up.captains.contains(k)),
            RideRule::DuplicateRideId => first_occurrence(d.ride_id.as_deref(), seen),
        }
    }
}

pub fn validate(raw: &RawTable, upstream: &RideUpstream, log: &mut RejectLog) -> Result<Vec<CleanRide>> {
    let ride_id = raw.column_index("ride_id")?;
    let user_id = raw.column_index("user_id")?;
    let captain_id = raw.column_index("captain_id")?;
    let ride_date = raw.column_index("ride_date")?;
    let pickup_loc = raw.column_index("pickup_loc")?;
    let drop_loc = raw.column_index("drop_loc")?;
    let distance_km = raw.column_index("distance_km")?;
    let duration_min = raw.column_index("duration_min")?;
    let ride_status = raw.column_index("ride_status")?;
    let dates = DateParser::ride()?;

    let staged = raw
        .rows
        .iter()
        .map(|r| Staged {
            draft: RideDraft {
                ride_id: r.text(ride_id).map(str::to_string),
                user_id: r.text(user_id).map(str::to_string),
                captain_id: r.text(captain_id).map(str::to_string),
                ride_date: dates.parse(r.text(ride_date)),
                pickup_loc: r.text(pickup_loc).map(str::to_string),
                drop_loc: r.text(drop_loc).map(str::to_string),
                distance_km: parse_number(r.text(distance_km), Bounds::NonNegative),
                duration_min: parse_number(r.text(duration_min), Bounds::NonNegative),
                ride_status: r.text(ride_status).map(str::to_string),
            },
            raw: r.clone(),
        })
        .collect();

    let survivors = apply_rules(&RideRule::ORDER, staged, upstream, log);

    let distance_fill = median_fill(survivors.iter().map(|s| &s.draft.distance_km));
    let duration_fill = median_fill(survivors.iter().map(|s| &s.draft.duration_min));
    let status_fill = mode(survivors.iter().filter_map(|s| s.draft.ride_status.as_deref()))
        .unwrap_or_else(|| UNKNOWN.to_string());
    tracing::debug!(distance_fill, duration_fill, %status_fill, "ride imputation values");

    Ok(survivors
        .into_iter()
        .filter_map(|s| {
            let d = s.draft;
            Some(CleanRide {
                ride_id: d.ride_id?,
                user_id: d.user_id?,
                captain_id: d.captain_id?,
                ride_date: d.ride_date?,
                pickup_loc: d.pickup_loc.unwrap_or_else(|| UNKNOWN.to_string()),
                drop_loc: d.drop_loc.unwrap_or_else(|| UNKNOWN.to_string()),
                distance_km: d.distance_km.unwrap_or(distance_fill),
                duration_min: d.duration_min.unwrap_or(duration_fill),
                ride_status: d.ride_status.unwrap_or_else(|| status_fill.clone()),
            })
        })
        .collect())
}
