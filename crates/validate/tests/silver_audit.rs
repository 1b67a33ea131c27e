use std::collections::BTreeMap;

use anyhow::Result;
use tempfile::TempDir;
use time::OffsetDateTime;
use validate::silver::{audit_row_count, read_silver};
use validate::{validate_warehouse, RejectReason};
use warehouse::config::ValidationSettings;
use warehouse::ipc::read_ipc;
use warehouse::{Entity, Layer, RawTable, RunContext, TableReader, Warehouse, WarehouseLayout, WriteMode};

struct Fixture(BTreeMap<Entity, RawTable>);

impl TableReader for Fixture {
    fn read_raw(&self, entity: Entity) -> Result<RawTable> {
        Ok(self.0[&entity].clone())
    }
}

fn fixture() -> Fixture {
    let t = |e: Entity, rows: Vec<Vec<Option<&str>>>| (e, RawTable::from_rows(e, e.raw_columns(), rows));
    let s = Some;
    Fixture(BTreeMap::from([
        t(
            Entity::Users,
            vec![
                vec![s("U1"), s("Asha"), s("F"), s("29"), s("2023-01-15"), s("Pune")],
                vec![None, s("Nobody"), None, None, s("2023-01-15"), None],
                vec![s("U2"), s("Bilal"), s("M"), None, s("12/31/2023"), None],
            ],
        ),
        t(
            Entity::Captains,
            vec![
                vec![s("C1"), s("Ravi"), s("40"), s("10"), s("Pune"), s("4.5")],
                vec![s("C2"), s("Meena"), None, s("2"), None, None],
            ],
        ),
        t(
            Entity::Rides,
            vec![
                vec![s("R1"), s("U1"), s("C1"), s("2024-01-02"), s("A"), s("B"), s("5"), s("12"), s("completed")],
                vec![s("R2"), s("U2"), s("C2"), s("03.01.2024"), None, s("B"), None, s("8"), None],
                vec![s("R3"), s("U9"), s("C1"), s("2024-01-02"), s("A"), s("B"), s("5"), s("12"), s("completed")],
            ],
        ),
        t(
            Entity::Payments,
            vec![
                vec![s("P1"), s("R1"), s("UPI"), s("100"), s("10"), s("10"), s("90"), s("paid")],
                vec![s("P2"), s("R2"), s("Cash"), None, None, None, None, s("paid")],
            ],
        ),
        t(
            Entity::Feedback,
            vec![
                vec![s("F1"), s("R1"), s("5"), s("4"), None, None],
                vec![s("F2"), s("R3"), s("5"), s("4"), s("billing"), None],
            ],
        ),
    ]))
}

fn open(root: &std::path::Path, secs: i64) -> Warehouse {
    let ts = OffsetDateTime::from_unix_timestamp(secs).unwrap();
    Warehouse::open(WarehouseLayout::with_root(root), RunContext::new(ts, ts.date()).unwrap()).unwrap()
}

#[test]
fn silver_reads_back_what_validation_produced() {
    let tmp = TempDir::new().unwrap();
    let wh = open(tmp.path(), 1_700_000_000);
    let (layers, stats) = validate_warehouse(
        &wh,
        &fixture(),
        &ValidationSettings::default(),
        WriteMode::Append,
    )
    .unwrap();

    let silver = read_silver(&wh).unwrap();
    assert_eq!(silver, layers.silver);
    assert_eq!(silver.rides.len(), 2);
    assert_eq!(silver.rides[1].pickup_loc, "Unknown");
    assert_eq!(silver.payments[1].fare, 100.0);

    let rides = stats.iter().find(|s| s.entity == Some(Entity::Rides)).unwrap();
    assert_eq!((rides.rows_in, rides.rows_out, rides.rejects), (3, 2, 1));
    assert_eq!(rides.by_reason[&RejectReason::InvalidUserIdNotInUsers], 1);
    for s in &stats {
        assert_eq!(s.rows_out + s.rejects, s.rows_in);
    }
}

#[test]
fn audit_rows_carry_raw_values_reason_and_run_ts() {
    let tmp = TempDir::new().unwrap();
    let wh = open(tmp.path(), 0);
    let (_, stats) = validate_warehouse(&wh, &fixture(), &ValidationSettings::default(), WriteMode::Append).unwrap();

    let users = &stats[0];
    let (schema, batches) = read_ipc(&users.audit_out).unwrap();
    let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(
        names,
        vec!["user_id", "name", "gender", "age", "signup_date", "city", "row_number", "reason", "run_ts"]
    );
    let b = &batches[0];
    let reason = warehouse::columns::utf8(b, "reason").unwrap();
    let run_ts = warehouse::columns::utf8(b, "run_ts").unwrap();
    let name = warehouse::columns::utf8(b, "name").unwrap();
    let row = warehouse::columns::int64(b, "row_number").unwrap();
    assert_eq!(reason.value(0), "null_user_id");
    assert_eq!(name.value(0), "Nobody");
    assert_eq!(row.value(0), 2);
    assert_eq!(run_ts.value(0), "1970-01-01T00:00:00Z");
}

#[test]
fn rerun_on_same_input_is_identical_apart_from_run_ts() {
    let tmp = TempDir::new().unwrap();

    let wh = open(tmp.path(), 1_000);
    let (first, a) = validate_warehouse(&wh, &fixture(), &ValidationSettings::default(), WriteMode::Append).unwrap();
    wh.close().unwrap();

    let wh = open(tmp.path(), 2_000);
    let (second, b) = validate_warehouse(&wh, &fixture(), &ValidationSettings::default(), WriteMode::Append).unwrap();

    assert_eq!(first.silver, second.silver);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.digest, y.digest);
        assert_eq!(x.by_reason, y.by_reason);
    }
    for entity in Entity::ALL {
        let r1: Vec<_> = first.rejects[&entity].records.iter().map(|r| (&r.raw, r.reason)).collect();
        let r2: Vec<_> = second.rejects[&entity].records.iter().map(|r| (&r.raw, r.reason)).collect();
        assert_eq!(r1, r2);
    }

    // appended audit keeps both runs
    assert_eq!(wh.appended_parts(Layer::Audit, "users").unwrap().len(), 2);
    assert_eq!(audit_row_count(&wh, Entity::Users).unwrap(), 2);
}

#[test]
fn appended_runs_in_the_same_second_keep_every_reject() {
    let tmp = TempDir::new().unwrap();
    for _ in 0..2 {
        let wh = open(tmp.path(), 5_000);
        validate_warehouse(&wh, &fixture(), &ValidationSettings::default(), WriteMode::Append).unwrap();
        wh.close().unwrap();
    }
    let wh = open(tmp.path(), 6_000);
    assert_eq!(wh.appended_parts(Layer::Audit, "users").unwrap().len(), 2);
    assert_eq!(audit_row_count(&wh, Entity::Users).unwrap(), 2);
}

#[test]
fn replace_mode_keeps_only_the_latest_audit_run() {
    let tmp = TempDir::new().unwrap();
    for secs in [10, 20] {
        let wh = open(tmp.path(), secs);
        validate_warehouse(&wh, &fixture(), &ValidationSettings::default(), WriteMode::Replace).unwrap();
        wh.close().unwrap();
    }
    let wh = open(tmp.path(), 30);
    let parts = wh.appended_parts(Layer::Audit, "rides").unwrap();
    assert_eq!(parts.len(), 1);
    assert!(parts[0].to_string_lossy().contains("run_id=19700101T000020000000Z"));
}

#[test]
fn reading_silver_before_validation_is_source_missing() {
    let tmp = TempDir::new().unwrap();
    let wh = open(tmp.path(), 0);
    let err = read_silver(&wh).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<warehouse::WarehouseError>(),
        Some(warehouse::WarehouseError::SourceMissing { entity: Entity::Users, .. })
    ));
}
