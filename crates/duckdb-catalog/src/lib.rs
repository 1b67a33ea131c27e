//! Publishes a gold snapshot as DuckDB views through the `duckdb` CLI.

use std::env;
use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use curate::gold::{read_latest_in, CAPTAIN_AGGREGATE, DASHBOARD_DATA, GOLD_PART, USER_AGGREGATE};
use warehouse::{Layer, WarehouseLayout};

pub const DUCKDB_BIN_ENV: &str = "DUCKDB_BIN";

#[derive(Debug, Clone)]
pub struct RefreshCfg {
    pub layout: WarehouseLayout,
    /// Defaults to the snapshot named by `manifests/gold/latest.json`.
    pub snapshot_date: Option<String>,
    pub duckdb_path: PathBuf,
    pub duckdb_bin: PathBuf,
}

impl RefreshCfg {
    pub fn new(layout: WarehouseLayout, snapshot_date: Option<String>, duckdb_path: PathBuf) -> Self {
        Self {
            layout,
            snapshot_date,
            duckdb_path,
            duckdb_bin: duckdb_bin_from_env(),
        }
    }
}

/// `$DUCKDB_BIN`, or `duckdb` from the `PATH`.
pub fn duckdb_bin_from_env() -> PathBuf {
    env::var_os(DUCKDB_BIN_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("duckdb"))
}

pub fn resolve_snapshot(layout: &WarehouseLayout, snapshot_date: Option<&str>) -> Result<String> {
    if let Some(s) = snapshot_date {
        return Ok(s.to_string());
    }
    Ok(read_latest_in(layout)?.snapshot_date)
}

fn parquet_path(layout: &WarehouseLayout, table: &str, snapshot: &str) -> String {
    let path = layout
        .layer_root(Layer::Gold)
        .join(table)
        .join(format!("snapshot_date={snapshot}"))
        .join(GOLD_PART);
    escape_single_quotes(&normalize_for_duckdb_path(&path.to_string_lossy()))
}

/// Init script creating the gold views of one snapshot. The schema is named
/// after the gold layer directory.
pub fn render_init_sql(layout: &WarehouseLayout, snapshot: &str) -> String {
    format!(
        r#"
PRAGMA disable_progress_bar;

CREATE SCHEMA IF NOT EXISTS {schema};

CREATE OR REPLACE VIEW {schema}.{users} AS
SELECT * FROM read_parquet('{users_path}');

CREATE OR REPLACE VIEW {schema}.{captains} AS
SELECT * FROM read_parquet('{captains_path}');

CREATE OR REPLACE VIEW {schema}.{dashboard} AS
SELECT * FROM read_parquet('{dashboard_path}');

-- Dashboard tiles
CREATE OR REPLACE VIEW {schema}.dashboard_summary AS
SELECT
  (SELECT COUNT(*) FROM {schema}.{users})::BIGINT                             AS total_users,
  (SELECT SUM(is_active) FROM {schema}.{users})::BIGINT                       AS active_users,
  (SELECT SUM(total_rides) FROM {schema}.{users})::BIGINT                     AS total_rides,
  (SELECT SUM(total_revenue) FROM {schema}.{users})::DOUBLE                   AS total_revenue,
  (SELECT COUNT(*) FROM {schema}.{captains} WHERE status = 'active')::BIGINT  AS active_captains,
  (SELECT SUM(completed_rides) FROM {schema}.{captains})::BIGINT              AS completed_rides,
  (SELECT SUM(cancelled_rides) FROM {schema}.{captains})::BIGINT              AS cancelled_rides,
  '{snapshot}'                                                                AS snapshot_date;

CREATE OR REPLACE VIEW {schema}.captain_city_summary AS
SELECT
  city,
  COUNT(*)::BIGINT                     AS captains,
  SUM(total_rides)::BIGINT             AS total_rides,
  SUM(total_final_amount)::DOUBLE      AS total_final_amount,
  AVG(avg_user_rating)::DOUBLE         AS avg_user_rating
FROM {schema}.{captains}
GROUP BY 1 ORDER BY 1;
"#,
        schema = escape_identifier(&layout.gold_dir),
        users = USER_AGGREGATE,
        captains = CAPTAIN_AGGREGATE,
        dashboard = DASHBOARD_DATA,
        users_path = parquet_path(layout, USER_AGGREGATE, snapshot),
        captains_path = parquet_path(layout, CAPTAIN_AGGREGATE, snapshot),
        dashboard_path = parquet_path(layout, DASHBOARD_DATA, snapshot),
        snapshot = escape_single_quotes(snapshot),
    )
}

/// Writes `<db>.init.sql` next to the database and runs it.
pub fn refresh_duckdb(cfg: &RefreshCfg) -> Result<PathBuf> {
    let snapshot = resolve_snapshot(&cfg.layout, cfg.snapshot_date.as_deref())?;
    let sql = render_init_sql(&cfg.layout, &snapshot);

    if let Some(parent) = cfg.duckdb_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let init_sql = cfg.duckdb_path.with_extension("init.sql");
    write(&init_sql, sql.as_bytes()).with_context(|| format!("write {}", init_sql.display()))?;

    run_init_script(&cfg.duckdb_bin, &cfg.duckdb_path, &init_sql)?;
    tracing::info!(snapshot = %snapshot, db = %cfg.duckdb_path.display(), "duckdb views refreshed");
    Ok(init_sql)
}

fn run_init_script(bin: &Path, db: &Path, init_sql: &Path) -> Result<()> {
    // `-c` makes the CLI execute and exit
    let output = Command::new(bin)
        .arg(db)
        .arg("-c")
        .arg(format!(".read '{}'", normalize_for_duckdb_path(&init_sql.to_string_lossy())))
        .output()
        .map_err(|e| anyhow!("failed to spawn {}: {e}. Is DuckDB installed? Set {DUCKDB_BIN_ENV} to override.", bin.display()))?;

    if !output.status.success() {
        bail!(
            "duckdb cli failed (code {:?})\nSTDERR:\n{}\nSTDOUT:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
    }
    Ok(())
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "''")
}

fn escape_identifier(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn normalize_for_duckdb_path(s: &str) -> String {
    // DuckDB accepts forward slashes on all platforms
    s.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn views_point_at_the_snapshot_parquet() {
        let layout = WarehouseLayout::with_root("/data/o'brien");
        let sql = render_init_sql(&layout, "2024-03-26");
        assert!(sql.contains("CREATE OR REPLACE VIEW \"gold\".user_aggregate AS"));
        assert!(sql.contains("CREATE OR REPLACE VIEW \"gold\".captain_aggregate AS"));
        assert!(sql.contains(
            "read_parquet('/data/o''brien/gold/captain_aggregate/snapshot_date=2024-03-26/part-000000.parquet')"
        ));
        assert!(sql.contains("\"gold\".dashboard_summary"));
        assert!(sql.contains(
            "CREATE OR REPLACE VIEW \"gold\".dashboard_data AS\nSELECT * FROM read_parquet('/data/o''brien/gold/dashboard_data/snapshot_date=2024-03-26/part-000000.parquet');"
        ));
    }

    #[test]
    fn snapshot_defaults_to_latest_manifest() {
        let tmp = TempDir::new().unwrap();
        let layout = WarehouseLayout::with_root(tmp.path());
        let dir = tmp.path().join("manifests").join("gold");
        create_dir_all(&dir).unwrap();
        write(
            dir.join("latest.json"),
            r#"{"snapshot_date":"2024-03-26","run_id":"20240326T010000000000Z"}"#,
        )
        .unwrap();

        assert_eq!(resolve_snapshot(&layout, None).unwrap(), "2024-03-26");
        assert_eq!(resolve_snapshot(&layout, Some("2024-01-01")).unwrap(), "2024-01-01");
    }

    #[test]
    fn missing_manifest_or_binary_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let layout = WarehouseLayout::with_root(tmp.path());
        assert!(resolve_snapshot(&layout, None).is_err());

        let cfg = RefreshCfg {
            layout,
            snapshot_date: Some("2024-03-26".into()),
            duckdb_path: tmp.path().join("bi").join("warehouse.duckdb"),
            duckdb_bin: tmp.path().join("no-such-duckdb"),
        };
        let err = refresh_duckdb(&cfg).unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
        assert!(tmp.path().join("bi").join("warehouse.init.sql").exists());
    }
}
