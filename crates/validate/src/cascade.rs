//! Referential cascade: validators run in dependency order and hand their
//! accepted primary keys downstream as read-only snapshots.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use time::OffsetDateTime;
use warehouse::config::ValidationSettings;
use warehouse::{Entity, TableReader};

use crate::rides::RideUpstream;
use crate::rules::RejectLog;
use crate::silver::SilverTables;
use crate::{captains, feedback, payments, rides, users};

/// Accepted primary keys of an entity.
#[derive(Debug, Clone, Default)]
pub struct KeySet(Arc<HashSet<String>>);

impl KeySet {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for KeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        KeySet(Arc::new(iter.into_iter().map(Into::into).collect()))
    }
}

/// Clean record sets of all entities plus the rejects of this run.
#[derive(Debug, Clone)]
pub struct ValidatedLayers {
    pub silver: SilverTables,
    pub rejects: BTreeMap<Entity, RejectLog>,
    pub rows_in: BTreeMap<Entity, usize>,
}

pub fn validate_all(
    reader: &dyn TableReader,
    settings: &ValidationSettings,
    run_ts: OffsetDateTime,
) -> Result<ValidatedLayers> {
    let mut rejects = BTreeMap::new();
    let mut rows_in = BTreeMap::new();

    let raw = reader.read_raw(Entity::Users)?;
    let mut log = RejectLog::for_table(&raw, run_ts);
    let users = users::validate(&raw, settings.reject_duplicate_users, &mut log)?;
    rows_in.insert(Entity::Users, raw.len());
    rejects.insert(Entity::Users, log);

    let raw = reader.read_raw(Entity::Captains)?;
    let mut log = RejectLog::for_table(&raw, run_ts);
    let captains = captains::validate(&raw, &mut log)?;
    rows_in.insert(Entity::Captains, raw.len());
    rejects.insert(Entity::Captains, log);

    let upstream = RideUpstream {
        users: users.iter().map(|u| u.user_id.as_str()).collect(),
        captains: captains.iter().map(|c| c.captain_id.as_str()).collect(),
    };
    let raw = reader.read_raw(Entity::Rides)?;
    let mut log = RejectLog::for_table(&raw, run_ts);
    let rides = rides::validate(&raw, &upstream, &mut log)?;
    rows_in.insert(Entity::Rides, raw.len());
    rejects.insert(Entity::Rides, log);

    let ride_keys: KeySet = rides.iter().map(|r| r.ride_id.as_str()).collect();

    let raw = reader.read_raw(Entity::Payments)?;
    let mut log = RejectLog::for_table(&raw, run_ts);
    let payments = payments::validate(&raw, &ride_keys, &mut log)?;
    rows_in.insert(Entity::Payments, raw.len());
    rejects.insert(Entity::Payments, log);

    let raw = reader.read_raw(Entity::Feedback)?;
    let mut log = RejectLog::for_table(&raw, run_ts);
    let feedback = feedback::validate(&raw, &ride_keys, &mut log)?;
    rows_in.insert(Entity::Feedback, raw.len());
    rejects.insert(Entity::Feedback, log);

    Ok(ValidatedLayers {
        silver: SilverTables {
            users,
            captains,
            rides,
            payments,
            feedback,
        },
        rejects,
        rows_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse::RawTable;

    struct Fixture(BTreeMap<Entity, RawTable>);

    impl TableReader for Fixture {
        fn read_raw(&self, entity: Entity) -> Result<RawTable> {
            self.0
                .get(&entity)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no fixture for {entity}"))
        }
    }

    fn t(entity: Entity, rows: Vec<Vec<Option<&str>>>) -> (Entity, RawTable) {
        (entity, RawTable::from_rows(entity, entity.raw_columns(), rows))
    }

    fn fixture() -> Fixture {
        let s = Some;
        Fixture(BTreeMap::from([
            t(
                Entity::Users,
                vec![
                    vec![s("U1"), s("Asha"), s("F"), s("29"), s("2023-01-15"), s("Pune")],
                    vec![s("U2"), s("Bilal"), s("M"), s("34"), s("bad"), s("Pune")],
                ],
            ),
            t(
                Entity::Captains,
                vec![vec![s("C1"), s("Ravi"), s("40"), s("10"), s("Pune"), s("4.5")]],
            ),
            t(
                Entity::Rides,
                vec![
                    vec![s("R1"), s("U1"), s("C1"), s("2024-01-02"), s("A"), s("B"), s("5"), s("12"), s("completed")],
                    // U2 failed its own validation, so R2 cascades out
                    vec![s("R2"), s("U2"), s("C1"), s("2024-01-02"), s("A"), s("B"), s("5"), s("12"), s("completed")],
                ],
            ),
            t(
                Entity::Payments,
                vec![
                    vec![s("P1"), s("R1"), s("UPI"), s("100"), s("0"), s("0"), s("100"), s("paid")],
                    vec![s("P2"), s("R2"), s("UPI"), s("100"), s("0"), s("0"), s("100"), s("paid")],
                ],
            ),
            t(
                Entity::Feedback,
                vec![
                    vec![s("F1"), s("R1"), s("5"), s("4"), None, None],
                    vec![s("F2"), s("R2"), s("5"), s("4"), None, None],
                ],
            ),
        ]))
    }

    #[test]
    fn rejection_cascades_downstream() {
        let layers =
            validate_all(&fixture(), &ValidationSettings::default(), OffsetDateTime::UNIX_EPOCH).unwrap();
        let reasons = |e: Entity| layers.rejects[&e].reasons();

        assert_eq!(reasons(Entity::Users), vec![crate::RejectReason::InvalidSignupDate]);
        assert_eq!(reasons(Entity::Rides), vec![crate::RejectReason::InvalidUserIdNotInUsers]);
        assert_eq!(reasons(Entity::Payments), vec![crate::RejectReason::InvalidRideIdNotInRides]);
        assert_eq!(reasons(Entity::Feedback), vec![crate::RejectReason::RideIdNotInRides]);
        assert_eq!(layers.silver.payments.len(), 1);
        assert_eq!(layers.silver.feedback[0].ride_id, "R1");
    }

    #[test]
    fn every_raw_row_is_either_clean_or_rejected() {
        let layers =
            validate_all(&fixture(), &ValidationSettings::default(), OffsetDateTime::UNIX_EPOCH).unwrap();
        for entity in Entity::ALL {
            assert_eq!(
                layers.silver.len(entity) + layers.rejects[&entity].len(),
                layers.rows_in[&entity],
                "{entity}"
            );
        }
    }

    #[test]
    fn missing_source_stops_the_cascade() {
        let mut f = fixture();
        f.0.remove(&Entity::Rides);
        let err = validate_all(&f, &ValidationSettings::default(), OffsetDateTime::UNIX_EPOCH).unwrap_err();
        assert!(err.to_string().contains("rides"));
    }
}
