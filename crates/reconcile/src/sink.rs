use std::fs::write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv_async::AsyncWriterBuilder;
use tokio::fs::File;

use crate::engine::ReconciliationReport;
use crate::metric::Status;

/// Consumer of a finished report.
pub trait ReportSink {
    fn emit(&self, report: &ReconciliationReport) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonReportSink {
    pub path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonReportSink {
    fn emit(&self, report: &ReconciliationReport) -> Result<()> {
        let json = serde_json::to_vec_pretty(report)?;
        write(&self.path, json).with_context(|| format!("write {}", self.path.display()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn emit(&self, report: &ReconciliationReport) -> Result<()> {
        for m in &report.metrics {
            match m.status {
                Status::Ok => tracing::info!(
                    entity = %m.entity,
                    metric = %m.metric,
                    silver = %m.source_a,
                    gold = %m.source_b,
                    difference = ?m.difference,
                    "OK"
                ),
                Status::Mismatch => tracing::warn!(
                    entity = %m.entity,
                    metric = %m.metric,
                    silver = %m.source_a,
                    gold = %m.source_b,
                    difference = ?m.difference,
                    "MISMATCH"
                ),
            }
        }
        tracing::info!(
            run_id = %report.run_id,
            metrics = report.metrics.len(),
            mismatches = report.mismatches().count(),
            "reconciliation report"
        );
        Ok(())
    }
}

pub const CSV_HEADER: [&str; 6] = ["Entity", "Metric", "Silver", "Gold", "Difference", "Status"];

/// Flat merged report, one row per metric. Nulls are empty cells.
pub async fn write_report_csv(report: &ReconciliationReport, path: &Path) -> Result<()> {
    let file = File::create(path)
        .await
        .with_context(|| format!("create {}", path.display()))?;
    let mut wtr = AsyncWriterBuilder::new().create_writer(file);
    wtr.write_record(&CSV_HEADER).await?;
    for m in &report.metrics {
        let difference = m.difference.map(|d| d.to_string()).unwrap_or_default();
        wtr.write_record(&[
            m.entity.clone(),
            m.metric.clone(),
            m.source_a.to_string(),
            m.source_b.to_string(),
            difference,
            m.status.to_string(),
        ])
        .await?;
    }
    wtr.flush().await.with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}
