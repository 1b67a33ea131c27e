use std::collections::HashSet;

use anyhow::Result;
use time::Date;
use warehouse::RawTable;

use crate::dates::DateParser;
use crate::impute::{parse_number, Bounds};
use crate::rules::{apply_rules, first_occurrence, RejectLog, RejectReason, Rule, Staged};

#[derive(Debug, Clone, PartialEq)]
pub struct CleanUser {
    pub user_id: String,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub signup_date: Date,
    pub city: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserDraft {
    user_id: Option<String>,
    name: Option<String>,
    gender: Option<String>,
    age: Option<i32>,
    signup_date: Option<Date>,
    city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRule {
    NullId,
    InvalidSignupDate,
    DuplicateId,
}

impl UserRule {
    pub const ORDER: [UserRule; 3] = [
        UserRule::NullId,
        UserRule::InvalidSignupDate,
        UserRule::DuplicateId,
    ];
}

impl Rule for UserRule {
    type Draft = UserDraft;
    type Context = ();

    fn reason(self) -> RejectReason {
        match self {
            UserRule::NullId => RejectReason::NullUserId,
            UserRule::InvalidSignupDate => RejectReason::InvalidSignupDate,
            UserRule::DuplicateId => RejectReason::DuplicateUserId,
        }
    }

    fn admits(self, d: &UserDraft, _: &(), seen: &mut HashSet<String>) -> bool {
        match self {
            UserRule::NullId => d.user_id.is_some(),
            UserRule::InvalidSignupDate => d.signup_date.is_some(),
            UserRule::DuplicateId => first_occurrence(d.user_id.as_deref(), seen),
        }
    }
}

/// Validates raw users. With `reject_duplicates` off, repeated ids are
/// dropped without an audit record.
pub fn validate(raw: &RawTable, reject_duplicates: bool, log: &mut RejectLog) -> Result<Vec<CleanUser>> {
    let user_id = raw.column_index("user_id")?;
    let name = raw.column_index("name")?;
    let gender = raw.column_index("gender")?;
    let age = raw.column_index("age")?;
    let signup_date = raw.column_index("signup_date")?;
    let city = raw.column_index("city")?;
    let dates = DateParser::signup()?;

    let staged = raw
        .rows
        .iter()
        .map(|r| Staged {
            draft: UserDraft {
                user_id: r.text(user_id).map(str::to_string),
                name: r.text(name).map(str::to_string),
                gender: r.text(gender).map(str::to_string),
                age: parse_number(r.text(age), Bounds::Positive).map(|a| a as i32),
                signup_date: dates.parse(r.text(signup_date)),
                city: r.text(city).map(str::to_string),
            },
            raw: r.clone(),
        })
        .collect();

    let mut survivors = if reject_duplicates {
        apply_rules(&UserRule::ORDER, staged, &(), log)
    } else {
        apply_rules(&UserRule::ORDER[..2], staged, &(), log)
    };
    if !reject_duplicates {
        let before = survivors.len();
        let mut seen = HashSet::new();
        survivors.retain(|s| first_occurrence(s.draft.user_id.as_deref(), &mut seen));
        tracing::debug!(dropped = before - survivors.len(), "silently dropped duplicate users");
    }

    Ok(survivors
        .into_iter()
        .filter_map(|s| {
            let d = s.draft;
            Some(CleanUser {
                user_id: d.user_id?,
                name: d.name,
                gender: d.gender,
                age: d.age,
                signup_date: d.signup_date?,
                city: d.city,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Month, OffsetDateTime};
    use warehouse::Entity;

    const COLS: [&str; 6] = ["user_id", "name", "gender", "age", "signup_date", "city"];

    fn table(rows: Vec<[Option<&str>; 6]>) -> RawTable {
        RawTable::from_rows(Entity::Users, &COLS, rows)
    }

    fn user<'a>(id: Option<&'a str>, date: &'a str) -> [Option<&'a str>; 6] {
        [id, Some("n"), Some("F"), Some("30"), Some(date), Some("Pune")]
    }

    #[test]
    fn null_id_rejected_and_duplicate_routed_to_audit() {
        let raw = table(vec![
            user(Some("U1"), "2023-01-15"),
            user(Some(""), "2023-02-01"),
            user(Some("U1"), "2023-03-01"),
        ]);
        let mut log = RejectLog::for_table(&raw, OffsetDateTime::UNIX_EPOCH);
        let clean = validate(&raw, true, &mut log).unwrap();

        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].user_id, "U1");
        assert_eq!(
            clean[0].signup_date,
            Date::from_calendar_date(2023, Month::January, 15).unwrap()
        );
        assert_eq!(
            log.reasons(),
            vec![RejectReason::NullUserId, RejectReason::DuplicateUserId]
        );
        assert_eq!(clean.len() + log.len(), raw.len());
    }

    #[test]
    fn legacy_mode_drops_duplicates_silently() {
        let raw = table(vec![
            user(Some("U1"), "2023-01-15"),
            user(Some(""), "2023-02-01"),
            user(Some("U1"), "2023-03-01"),
        ]);
        let mut log = RejectLog::for_table(&raw, OffsetDateTime::UNIX_EPOCH);
        let clean = validate(&raw, false, &mut log).unwrap();

        assert_eq!(clean.len(), 1);
        assert_eq!(log.reasons(), vec![RejectReason::NullUserId]);
    }

    #[test]
    fn unparseable_signup_date_rejected_and_bad_age_nulled() {
        let mut bad_age = user(Some("U2"), "15/01/2023");
        bad_age[3] = Some("-4");
        let raw = table(vec![user(Some("U1"), "someday"), bad_age]);
        let mut log = RejectLog::for_table(&raw, OffsetDateTime::UNIX_EPOCH);
        let clean = validate(&raw, true, &mut log).unwrap();

        assert_eq!(log.reasons(), vec![RejectReason::InvalidSignupDate]);
        assert_eq!(clean[0].user_id, "U2");
        assert_eq!(clean[0].age, None);
    }

    #[test]
    fn missing_column_is_fatal() {
        let raw = RawTable::from_rows(Entity::Users, &["user_id"], vec![vec![Some("U1")]]);
        let mut log = RejectLog::for_table(&raw, OffsetDateTime::UNIX_EPOCH);
        let err = validate(&raw, true, &mut log).unwrap_err();
        assert!(err.to_string().contains("missing column in users: name"));
    }
}
