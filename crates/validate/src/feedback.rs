use std::collections::HashSet;

use anyhow::Result;
use warehouse::RawTable;

use crate::cascade::KeySet;
use crate::impute::{median_fill, parse_number, RATING};
use crate::rules::{apply_rules, first_occurrence, RejectLog, RejectReason, Rule, Staged};

pub const NO_ISSUES: &str = "No issues";
pub const NO_COMMENTS: &str = "No comments";

#[derive(Debug, Clone, PartialEq)]
pub struct CleanFeedback {
    pub feedback_id: String,
    pub ride_id: String,
    pub user_rating: f64,
    pub captain_rating: f64,
    pub issue_category: String,
    pub comments: String,
}

#[derive(Debug, Clone)]
pub struct FeedbackDraft {
    feedback_id: Option<String>,
    ride_id: Option<String>,
    user_rating: Option<f64>,
    captain_rating: Option<f64>,
    issue_category: Option<String>,
    comments: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackRule {
    NullFeedbackId,
    NullRideId,
    UnknownRide,
    DuplicateFeedbackId,
}

impl FeedbackRule {
    pub const ORDER: [FeedbackRule; 4] = [
        FeedbackRule::NullFeedbackId,
        FeedbackRule::NullRideId,
        FeedbackRule::UnknownRide,
        FeedbackRule::DuplicateFeedbackId,
    ];
}

impl Rule for FeedbackRule {
    type Draft = FeedbackDraft;
    type Context = KeySet;

    fn reason(self) -> RejectReason {
        match self {
            FeedbackRule::NullFeedbackId => RejectReason::NullOrEmptyFeedbackId,
            FeedbackRule::NullRideId => RejectReason::NullOrEmptyRideId,
            FeedbackRule::UnknownRide => RejectReason::RideIdNotInRides,
            FeedbackRule::DuplicateFeedbackId => RejectReason::DuplicateFeedbackId,
        }
    }

    fn admits(self, d: &FeedbackDraft, rides: &KeySet, seen: &mut HashSet<String>) -> bool {
        match self {
            FeedbackRule::NullFeedbackId => d.feedback_id.is_some(),
            FeedbackRule::NullRideId => d.ride_id.is_some(),
            FeedbackRule::UnknownRide => d.ride_id.as_deref().is_some_and(|k| rides.contains(k)),
            FeedbackRule::DuplicateFeedbackId => first_occurrence(d.feedback_id.as_deref(), seen),
        }
    }
}

pub fn validate(raw: &RawTable, rides: &KeySet, log: &mut RejectLog) -> Result<Vec<CleanFeedback>> {
    let feedback_id = raw.column_index("feedback_id")?;
    let ride_id = raw.column_index("ride_id")?;
    let user_rating = raw.column_index("user_rating")?;
    let captain_rating = raw.column_index("captain_rating")?;
    let issue_category = raw.column_index("issue_category")?;
    let comments = raw.column_index("comments")?;

    let staged = raw
        .rows
        .iter()
        .map(|r| Staged {
            draft: FeedbackDraft {
                feedback_id: r.text(feedback_id).map(str::to_string),
                ride_id: r.text(ride_id).map(str::to_string),
                user_rating: parse_number(r.text(user_rating), RATING),
                captain_rating: parse_number(r.text(captain_rating), RATING),
                issue_category: r.text(issue_category).map(str::to_string),
                comments: r.text(comments).map(str::to_string),
            },
            raw: r.clone(),
        })
        .collect();

    let survivors = apply_rules(&FeedbackRule::ORDER, staged, rides, log);
    let user_fill = median_fill(survivors.iter().map(|s| &s.draft.user_rating));
    let captain_fill = median_fill(survivors.iter().map(|s| &s.draft.captain_rating));
    tracing::debug!(user_fill, captain_fill, "feedback imputation values");

    Ok(survivors
        .into_iter()
        .filter_map(|s| {
            let d = s.draft;
            Some(CleanFeedback {
                feedback_id: d.feedback_id?,
                ride_id: d.ride_id?,
                user_rating: d.user_rating.unwrap_or(user_fill),
                captain_rating: d.captain_rating.unwrap_or(captain_fill),
                issue_category: d.issue_category.unwrap_or_else(|| NO_ISSUES.to_string()),
                comments: d.comments.unwrap_or_else(|| NO_COMMENTS.to_string()),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use warehouse::Entity;

    const COLS: [&str; 6] = [
        "feedback_id",
        "ride_id",
        "user_rating",
        "captain_rating",
        "issue_category",
        "comments",
    ];

    fn run(rows: Vec<[Option<&str>; 6]>) -> (Vec<CleanFeedback>, RejectLog) {
        let raw = RawTable::from_rows(Entity::Feedback, &COLS, rows);
        let mut log = RejectLog::for_table(&raw, OffsetDateTime::UNIX_EPOCH);
        let clean = validate(&raw, &KeySet::from_iter(["R1", "R2"]), &mut log).unwrap();
        assert_eq!(clean.len() + log.len(), raw.len());
        (clean, log)
    }

    #[test]
    fn empty_issue_becomes_no_issues() {
        let (clean, log) = run(vec![
            [Some("F1"), Some("R1"), Some("5"), Some("4"), Some(""), Some("great")],
            [Some("F2"), Some("R2"), Some("3"), Some("2"), Some("billing"), None],
        ]);
        assert!(log.is_empty());
        assert_eq!(clean[0].issue_category, NO_ISSUES);
        assert_eq!(clean[1].issue_category, "billing");
        assert_eq!(clean[1].comments, NO_COMMENTS);
    }

    #[test]
    fn rules_and_rating_medians() {
        let (clean, log) = run(vec![
            [None, Some("R1"), Some("1"), Some("1"), None, None],
            [Some("F1"), None, Some("1"), Some("1"), None, None],
            [Some("F2"), Some("R7"), Some("1"), Some("1"), None, None],
            [Some("F3"), Some("R1"), Some("4"), Some("x"), None, None],
            [Some("F3"), Some("R2"), Some("1"), Some("1"), None, None],
            [Some("F4"), Some("R2"), Some("8"), Some("3"), None, None],
        ]);
        assert_eq!(
            log.reasons(),
            vec![
                RejectReason::NullOrEmptyFeedbackId,
                RejectReason::NullOrEmptyRideId,
                RejectReason::RideIdNotInRides,
                RejectReason::DuplicateFeedbackId,
            ]
        );
        // F3 keeps its user rating and takes the captain median (3), F4 the reverse
        assert_eq!((clean[0].user_rating, clean[0].captain_rating), (4.0, 3.0));
        assert_eq!((clean[1].user_rating, clean[1].captain_rating), (4.0, 3.0));
    }
}
