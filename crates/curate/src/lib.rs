//! Gold layer: aggregate tables derived from the silver layer.

pub mod aggregate;
pub mod dashboard;
pub mod gold;

use anyhow::Result;
use time::Date;
use validate::SilverTables;
use warehouse::Warehouse;

pub use aggregate::{AggregateRow, CaptainAggregate, Cell, UserAggregate};
pub use dashboard::{build_dashboard, DashboardRow};
pub use gold::{read_gold, write_gold_snapshot, CurateStats, GoldTables, LatestJson};

pub fn build_gold(silver: &SilverTables, snapshot_date: Date, activity_window_days: i64) -> GoldTables {
    GoldTables {
        snapshot_date,
        users: aggregate::build_user_aggregates(silver, snapshot_date, activity_window_days),
        captains: aggregate::build_captain_aggregates(silver),
        dashboard: dashboard::build_dashboard(silver),
    }
}

/// Builds and writes the gold snapshot for the run's `as_of` date.
pub fn curate(wh: &Warehouse, silver: &SilverTables, activity_window_days: i64) -> Result<(GoldTables, CurateStats)> {
    let gold = build_gold(silver, wh.run().as_of, activity_window_days);
    let stats = write_gold_snapshot(wh, &gold)?;
    tracing::info!(
        users = gold.users.len(),
        captains = gold.captains.len(),
        dashboard_rows = gold.dashboard.len(),
        snapshot_date = %gold.snapshot_date,
        "gold curated"
    );
    Ok((gold, stats))
}
