use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use curate::GoldTables;
use time::{format_description, Date};
use tracing_subscriber::EnvFilter;
use validate::SilverTables;
use warehouse::{Entity, PipelineConfig, RunContext, Warehouse};

#[derive(Parser, Debug)]
#[command(name = "ridewarehouse", version, about = "Ride-sharing warehouse pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args, Debug, Clone)]
struct Common {
    /// TOML pipeline config; defaults apply to every missing field.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Warehouse root (where bronze/, silver/, audit/, gold/ live).
    #[arg(long)]
    root: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ReconcileArgs {
    /// Absolute tolerance for numeric metrics.
    #[arg(long)]
    tolerance: Option<f64>,
    /// Exit non-zero when any metric mismatches.
    #[arg(long)]
    fail_on_mismatch: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// CSV exports -> Bronze IPC
    Ingest {
        #[command(flatten)]
        common: Common,
        /// Directory holding `<entity>.csv` files.
        #[arg(long)]
        source: Option<PathBuf>,
        /// Ingest only this entity; repeatable. Defaults to all five.
        #[arg(long, value_name = "ENTITY", value_parser = parse_entity)]
        only: Vec<Entity>,
    },
    /// Bronze IPC -> Silver IPC (+ audit of rejected records)
    Validate {
        #[command(flatten)]
        common: Common,
        /// Drop duplicate user ids silently instead of auditing them.
        #[arg(long)]
        legacy_user_dedupe: bool,
    },
    /// Silver IPC -> Gold Parquet snapshot + manifests
    Curate {
        #[command(flatten)]
        common: Common,
        /// Snapshot date and reference date of the activity window.
        #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
        as_of: Option<Date>,
    },
    /// Compare silver-derived metrics with the gold snapshot.
    Reconcile {
        #[command(flatten)]
        common: Common,
        #[command(flatten)]
        checks: ReconcileArgs,
        /// Gold snapshot to check. Defaults to manifests/gold/latest.json.
        #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
        snapshot_date: Option<Date>,
    },
    /// Full pipeline: [ingest] -> validate -> curate -> reconcile.
    Run {
        #[command(flatten)]
        common: Common,
        #[command(flatten)]
        checks: ReconcileArgs,
        /// Ingest the CSV exports of this directory first.
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
        as_of: Option<Date>,
        #[arg(long)]
        legacy_user_dedupe: bool,
    },
    /// Update a DuckDB catalog file with views over a gold snapshot.
    DuckdbRefresh {
        #[command(flatten)]
        common: Common,
        /// Optionally force a specific snapshot date (YYYY-MM-DD).
        #[arg(long)]
        snapshot_date: Option<String>,
        /// Path to the .duckdb file.
        #[arg(long, default_value = "./bi/warehouse.duckdb")]
        db: PathBuf,
    },
}

fn parse_date(s: &str) -> Result<Date, String> {
    let fmt = format_description::parse("[year]-[month]-[day]").map_err(|e| e.to_string())?;
    Date::parse(s, &fmt).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn parse_entity(s: &str) -> Result<Entity, String> {
    s.parse().map_err(|e: warehouse::WarehouseError| e.to_string())
}

fn load_config(common: &Common) -> Result<PipelineConfig> {
    let mut cfg = PipelineConfig::load_or_default(common.config.as_deref())?;
    if let Some(root) = &common.root {
        cfg.layout.root = root.clone();
    }
    Ok(cfg)
}

fn apply_reconcile_args(cfg: &mut PipelineConfig, args: &ReconcileArgs) {
    if let Some(t) = args.tolerance {
        cfg.reconcile.tolerance = t;
    }
}

fn open(cfg: &PipelineConfig, as_of: Option<Date>) -> Result<Warehouse> {
    Warehouse::open(cfg.layout.clone(), RunContext::start(as_of)?)
}

async fn ingest_stage(wh: &Warehouse, source: &Path, entities: &[Entity]) -> Result<()> {
    for st in ingest::ingest_selected(wh, source, entities).await? {
        println!(
            "INGEST OK entity={} rows_in={} bytes_in={} out={}",
            display_entity(st.entity),
            st.rows_in,
            st.bytes_in,
            st.out_path.display()
        );
    }
    Ok(())
}

fn validate_stage(wh: &Warehouse, cfg: &PipelineConfig) -> Result<SilverTables> {
    let reader = ingest::BronzeReader::new(wh);
    let (layers, stats) = validate::validate_warehouse(wh, &reader, &cfg.validation, cfg.audit.mode)?;
    for st in stats {
        println!(
            "VALIDATE OK entity={} rows_in={} rows_out={} rejects={} digest={}",
            display_entity(st.entity),
            st.rows_in,
            st.rows_out,
            st.rejects,
            st.digest
        );
    }
    Ok(layers.silver)
}

fn curate_stage(wh: &Warehouse, cfg: &PipelineConfig, silver: &SilverTables) -> Result<GoldTables> {
    let (gold, st) = curate::curate(wh, silver, cfg.reconcile.activity_window_days)?;
    println!(
        "CURATE OK snapshot_date={} files_written={} rows_written={} commit={}",
        gold.snapshot_date,
        st.files_written,
        st.rows_written,
        st.commit_path.display()
    );
    Ok(gold)
}

/// Emits the report, then fails if asked to and the report is not clean.
async fn reconcile_stage(
    wh: &Warehouse,
    cfg: &PipelineConfig,
    silver: &SilverTables,
    gold: &GoldTables,
    fail_on_mismatch: bool,
) -> Result<()> {
    let report = reconcile::run_reconciliation(silver, gold, wh.run(), &cfg.reconcile)?;
    let paths = reconcile::emit_report(wh, &report).await?;
    let mismatches = report.mismatches().count();
    println!(
        "RECONCILE {} metrics={} mismatches={} json={} csv={}",
        if report.is_clean() { "OK" } else { "MISMATCH" },
        report.metrics.len(),
        mismatches,
        paths.json.display(),
        paths.csv.display()
    );
    if fail_on_mismatch && mismatches > 0 {
        bail!("reconciliation found {mismatches} mismatching metrics");
    }
    Ok(())
}

fn display_entity(entity: Option<Entity>) -> String {
    entity.map(|e| e.to_string()).unwrap_or_default()
}

/// Closes the warehouse whatever the stage outcome; the stage error wins.
fn finish(wh: Warehouse, outcome: Result<()>) -> Result<()> {
    let closed = wh.close();
    outcome?;
    closed
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let start = std::time::Instant::now();
    match cli.cmd {
        Commands::Ingest { common, source, only } => {
            let mut cfg = load_config(&common)?;
            if let Some(source) = source {
                cfg.source_dir = source;
            }
            let wh = open(&cfg, None)?;
            let entities = if only.is_empty() { Entity::ALL.to_vec() } else { only };
            let outcome = ingest_stage(&wh, &cfg.source_dir, &entities).await;
            finish(wh, outcome)?;
        }
        Commands::Validate { common, legacy_user_dedupe } => {
            let mut cfg = load_config(&common)?;
            if legacy_user_dedupe {
                cfg.validation.reject_duplicate_users = false;
            }
            let wh = open(&cfg, None)?;
            let outcome = validate_stage(&wh, &cfg).map(drop);
            finish(wh, outcome)?;
        }
        Commands::Curate { common, as_of } => {
            let cfg = load_config(&common)?;
            let wh = open(&cfg, as_of)?;
            let outcome = validate::read_silver(&wh).and_then(|silver| curate_stage(&wh, &cfg, &silver).map(drop));
            finish(wh, outcome)?;
        }
        Commands::Reconcile { common, checks, snapshot_date } => {
            let mut cfg = load_config(&common)?;
            apply_reconcile_args(&mut cfg, &checks);
            let snapshot_date = match snapshot_date {
                Some(d) => d,
                None => {
                    let latest = curate::gold::read_latest_in(&cfg.layout)?;
                    curate::gold::parse_snapshot_date(&latest.snapshot_date)?
                }
            };
            // the activity window ends at the snapshot date, as it did when curated
            let wh = open(&cfg, Some(snapshot_date))?;
            let outcome: Result<()> = async {
                let silver = validate::read_silver(&wh)?;
                let gold = curate::read_gold(&wh, Some(snapshot_date))?;
                reconcile_stage(&wh, &cfg, &silver, &gold, checks.fail_on_mismatch).await
            }
            .await;
            finish(wh, outcome)?;
        }
        Commands::Run { common, checks, source, as_of, legacy_user_dedupe } => {
            let mut cfg = load_config(&common)?;
            apply_reconcile_args(&mut cfg, &checks);
            if legacy_user_dedupe {
                cfg.validation.reject_duplicate_users = false;
            }
            let wh = open(&cfg, as_of)?;
            let outcome: Result<()> = async {
                if let Some(source) = &source {
                    ingest_stage(&wh, source, &Entity::ALL).await?;
                }
                let silver = validate_stage(&wh, &cfg)?;
                curate_stage(&wh, &cfg, &silver)?;
                let gold = curate::read_gold(&wh, Some(wh.run().as_of))?;
                reconcile_stage(&wh, &cfg, &silver, &gold, checks.fail_on_mismatch).await
            }
            .await;
            finish(wh, outcome)?;
        }
        Commands::DuckdbRefresh { common, snapshot_date, db } => {
            let cfg = load_config(&common)?;
            let refresh = duckdb_catalog::RefreshCfg::new(cfg.layout, snapshot_date, db);
            let init_sql = duckdb_catalog::refresh_duckdb(&refresh)?;
            println!("DUCKDB REFRESH OK db={} init={}", refresh.duckdb_path.display(), init_sql.display());
        }
    }
    let duration_pretty = humantime::format_duration(start.elapsed());
    println!("DONE in {}", duration_pretty);
    Ok(())
}
