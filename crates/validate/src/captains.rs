use std::collections::HashSet;

use anyhow::Result;
use warehouse::RawTable;

use crate::impute::{median_fill, parse_number, round1, Bounds, RATING};
use crate::rules::{apply_rules, first_occurrence, RejectLog, RejectReason, Rule, Staged};

pub const UNKNOWN_CITY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct CleanCaptain {
    pub captain_id: String,
    pub name: String,
    pub age: i32,
    pub city: String,
    pub rating: f64,
}

#[derive(Debug, Clone)]
pub struct CaptainDraft {
    captain_id: Option<String>,
    name: Option<String>,
    age: Option<f64>,
    city: Option<String>,
    rating: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptainRule {
    NullId,
    DuplicateId,
    NullOrEmptyName,
}

impl CaptainRule {
    pub const ORDER: [CaptainRule; 3] = [
        CaptainRule::NullId,
        CaptainRule::DuplicateId,
        CaptainRule::NullOrEmptyName,
    ];

    /// Rules that run before age and rating are imputed.
    const BEFORE_FILL: usize = 2;
}

impl Rule for CaptainRule {
    type Draft = CaptainDraft;
    type Context = ();

    fn reason(self) -> RejectReason {
        match self {
            CaptainRule::NullId => RejectReason::NullCaptainId,
            CaptainRule::DuplicateId => RejectReason::DuplicateCaptainId,
            CaptainRule::NullOrEmptyName => RejectReason::NullOrEmptyName,
        }
    }

    fn admits(self, d: &CaptainDraft, _: &(), seen: &mut HashSet<String>) -> bool {
        match self {
            CaptainRule::NullId => d.captain_id.is_some(),
            CaptainRule::DuplicateId => first_occurrence(d.captain_id.as_deref(), seen),
            CaptainRule::NullOrEmptyName => d.name.is_some(),
        }
    }
}

/// Validates raw captains. Age and rating medians are taken over the rows
/// that survived the id rules, before the name rule runs.
pub fn validate(raw: &RawTable, log: &mut RejectLog) -> Result<Vec<CleanCaptain>> {
    let captain_id = raw.column_index("captain_id")?;
    let name = raw.column_index("name")?;
    let age = raw.column_index("age")?;
    let city = raw.column_index("city")?;
    let rating = raw.column_index("rating")?;

    let staged = raw
        .rows
        .iter()
        .map(|r| Staged {
            draft: CaptainDraft {
                captain_id: r.text(captain_id).map(str::to_string),
                name: r.text(name).map(str::to_string),
                age: parse_number(r.text(age), Bounds::Positive),
                city: r.text(city).map(str::to_string),
                rating: parse_number(r.text(rating), RATING),
            },
            raw: r.clone(),
        })
        .collect();

    let (before, after) = CaptainRule::ORDER.split_at(CaptainRule::BEFORE_FILL);
    let mut survivors = apply_rules(before, staged, &(), log);

    let age_fill = median_fill(survivors.iter().map(|s| &s.draft.age));
    let rating_fill = median_fill(survivors.iter().map(|s| &s.draft.rating));
    tracing::debug!(age_fill, rating_fill, "captain imputation values");
    for s in survivors.iter_mut() {
        let d = &mut s.draft;
        d.city.get_or_insert_with(|| UNKNOWN_CITY.to_string());
        d.age = Some(d.age.unwrap_or(age_fill).trunc());
        d.rating = Some(round1(d.rating.unwrap_or(rating_fill)));
    }

    let survivors = apply_rules(after, survivors, &(), log);

    Ok(survivors
        .into_iter()
        .filter_map(|s| {
            let d = s.draft;
            Some(CleanCaptain {
                captain_id: d.captain_id?,
                name: d.name?,
                age: d.age? as i32,
                city: d.city?,
                rating: d.rating?,
            })
        })
        .collect())
}
