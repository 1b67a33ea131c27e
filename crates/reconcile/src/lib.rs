//! Aggregate reconciliation: every metric is computed once from the silver
//! record sets and once from the gold aggregates, then compared.

pub mod defs;
pub mod engine;
pub mod metric;
pub mod sink;
pub mod source;

use std::path::PathBuf;

use anyhow::Result;
use curate::GoldTables;
use validate::SilverTables;
use warehouse::config::ReconcileSettings;
use warehouse::{RunContext, Warehouse};

pub use defs::{captain_metrics, user_metrics, AggregateMetric, MetricDef};
pub use engine::{reconcile, MetricResult, ReconciliationReport};
pub use metric::{compare, MetricValue, Status};
pub use sink::{write_report_csv, JsonReportSink, LogReportSink, ReportSink};
pub use source::{GoldQuery, GoldSource, QueryRunner, SilverQuery, SilverSource};

pub const USERS: &str = "users";
pub const CAPTAINS: &str = "captains";

/// Reconciles the user metrics, then the captain metrics.
pub fn run_reconciliation(
    silver: &SilverTables,
    gold: &GoldTables,
    run: &RunContext,
    settings: &ReconcileSettings,
) -> Result<ReconciliationReport> {
    let source_a = SilverSource::new(silver, run.as_of, settings.activity_window_days);
    let mut metrics = reconcile(
        USERS,
        &user_metrics(),
        &source_a,
        &GoldSource::new(&gold.users),
        settings.tolerance,
    )?;
    metrics.extend(reconcile(
        CAPTAINS,
        &captain_metrics(),
        &source_a,
        &GoldSource::new(&gold.captains),
        settings.tolerance,
    )?);

    let report = ReconciliationReport {
        run_id: run.run_id.clone(),
        generated_at: run.run_ts_rfc3339()?,
        tolerance: settings.tolerance,
        metrics,
    };
    tracing::info!(
        metrics = report.metrics.len(),
        mismatches = report.mismatches().count(),
        "reconciliation done"
    );
    Ok(report)
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Emits the report to the log and to `reports/reconciliation_<run_id>.{json,csv}`.
pub async fn emit_report(wh: &Warehouse, report: &ReconciliationReport) -> Result<ReportPaths> {
    let stem = wh.reports_dir().join(format!("reconciliation_{}", report.run_id));
    let paths = ReportPaths {
        json: stem.with_extension("json"),
        csv: stem.with_extension("csv"),
    };
    LogReportSink.emit(report)?;
    JsonReportSink::new(&paths.json).emit(report)?;
    write_report_csv(report, &paths.csv).await?;
    Ok(paths)
}
