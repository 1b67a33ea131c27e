use std::fs::read_to_string;

use reconcile::{emit_report, run_reconciliation, MetricValue, ReconciliationReport, Status};
use tempfile::TempDir;
use time::{Date, Month, OffsetDateTime};
use validate::{CleanCaptain, CleanFeedback, CleanPayment, CleanRide, CleanUser, SilverTables};
use warehouse::config::ReconcileSettings;
use warehouse::{RunContext, Warehouse, WarehouseLayout};

fn day(d: u8) -> Date {
    Date::from_calendar_date(2024, Month::March, d).unwrap()
}

fn silver() -> SilverTables {
    let user = |id: &str| CleanUser {
        user_id: id.into(),
        name: Some(id.to_lowercase()),
        gender: None,
        age: Some(30),
        signup_date: day(1),
        city: None,
    };
    let captain = |id: &str| CleanCaptain {
        captain_id: id.into(),
        name: id.to_lowercase(),
        age: 40,
        city: "Pune".into(),
        rating: 4.5,
    };
    let ride = |id: &str, user: &str, captain: &str, date: Date, status: &str| CleanRide {
        ride_id: id.into(),
        user_id: user.into(),
        captain_id: captain.into(),
        ride_date: date,
        pickup_loc: "A".into(),
        drop_loc: "B".into(),
        distance_km: 5.0,
        duration_min: 12.0,
        ride_status: status.into(),
    };
    let payment = |id: &str, ride: &str, amount: f64| CleanPayment {
        payment_id: id.into(),
        ride_id: ride.into(),
        payment_method: Some("cash".into()),
        fare: amount,
        discount_percent: 0.0,
        discount_amount: 0.0,
        final_amount: amount,
        payment_status: None,
    };
    let feedback = |id: &str, ride: &str, user_rating: f64, captain_rating: f64| CleanFeedback {
        feedback_id: id.into(),
        ride_id: ride.into(),
        user_rating,
        captain_rating,
        issue_category: "late".into(),
        comments: "No comments".into(),
    };

    SilverTables {
        users: vec![user("U1"), user("U2"), user("U3")],
        captains: vec![captain("C1"), captain("C2")],
        rides: vec![
            ride("R1", "U1", "C1", day(2), "completed"),
            ride("R2", "U1", "C2", day(20), "completed"),
            ride("R3", "U2", "C1", day(25), "cancelled"),
        ],
        payments: vec![payment("P1", "R1", 100.0), payment("P2", "R2", 50.0), payment("P3", "R3", 30.0)],
        feedback: vec![feedback("F1", "R1", 5.0, 4.0), feedback("F2", "R2", 4.0, 5.0), feedback("F3", "R3", 3.0, 0.0)],
    }
}

fn run() -> RunContext {
    RunContext::new(OffsetDateTime::UNIX_EPOCH, day(26)).unwrap()
}

fn metric<'a>(report: &'a ReconciliationReport, entity: &str, name: &str) -> &'a reconcile::MetricResult {
    report
        .metrics
        .iter()
        .find(|m| m.entity == entity && m.metric == name)
        .unwrap()
}

#[tokio::test]
async fn persisted_gold_reconciles_with_silver() {
    let tmp = TempDir::new().unwrap();
    let wh = Warehouse::open(WarehouseLayout::with_root(tmp.path()), run()).unwrap();
    let settings = ReconcileSettings::default();
    let silver = silver();

    curate::curate(&wh, &silver, settings.activity_window_days).unwrap();
    let gold = curate::read_gold(&wh, None).unwrap();
    let report = run_reconciliation(&silver, &gold, wh.run(), &settings).unwrap();

    assert_eq!(report.metrics.len(), 18);
    assert!(report.is_clean(), "{:?}", report.mismatches().collect::<Vec<_>>());
    assert_eq!(metric(&report, "users", "total_revenue").source_a, MetricValue::Number(180.0));
    assert_eq!(metric(&report, "users", "avg_revenue_per_ride").source_b, MetricValue::Number(60.0));
    assert_eq!(metric(&report, "users", "avg_captain_rating").source_a, MetricValue::Number(4.5));
    assert_eq!(metric(&report, "captains", "active_captains").source_b, MetricValue::Number(2.0));
    assert_eq!(
        metric(&report, "captains", "most_frequent_issue").source_b,
        MetricValue::Text("late".into())
    );

    let paths = emit_report(&wh, &report).await.unwrap();
    assert!(paths.json.ends_with("reports/reconciliation_19700101T000000000000Z.json"));
    let back: ReconciliationReport = serde_json::from_str(&read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(back, report);

    let csv = read_to_string(&paths.csv).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Entity,Metric,Silver,Gold,Difference,Status"));
    assert_eq!(lines.next(), Some("users,total_users,3,3,0,OK"));
    assert_eq!(csv.lines().count(), 19);
    wh.close().unwrap();
}

#[test]
fn drifted_gold_is_reported_not_raised() {
    let silver = silver();
    let mut gold = curate::build_gold(&silver, day(26), 30);
    gold.users[0].total_revenue += 5.0;
    gold.captains.pop();

    let report = run_reconciliation(&silver, &gold, &run(), &ReconcileSettings::default()).unwrap();
    let revenue = metric(&report, "users", "total_revenue");
    assert_eq!(revenue.status, Status::Mismatch);
    assert_eq!(revenue.difference, Some(-5.0));
    assert_eq!(metric(&report, "captains", "total_captains").status, Status::Mismatch);
    assert_eq!(metric(&report, "users", "total_rides").status, Status::Ok);
}
