use std::fs::{create_dir_all, remove_dir_all, remove_file, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{format_description, Date, OffsetDateTime};

use crate::error::WarehouseError;

pub const PART_FILE: &str = "part-000000.arrow";
const LOCK_FILE: &str = ".run.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Bronze,
    Silver,
    Audit,
    Gold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Drop whatever the table held and write a fresh part.
    Replace,
    /// Add a new part under the run's `run_id=` partition, keeping earlier parts.
    #[default]
    Append,
}

/// Directory names of the warehouse layers under `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseLayout {
    pub root: PathBuf,
    pub bronze_dir: String,
    pub silver_dir: String,
    pub audit_dir: String,
    pub gold_dir: String,
    pub manifests_dir: String,
    pub reports_dir: String,
}

impl Default for WarehouseLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            bronze_dir: "bronze".to_string(),
            silver_dir: "silver".to_string(),
            audit_dir: "audit".to_string(),
            gold_dir: "gold".to_string(),
            manifests_dir: "manifests".to_string(),
            reports_dir: "reports".to_string(),
        }
    }
}

impl WarehouseLayout {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn layer_root(&self, layer: Layer) -> PathBuf {
        let dir = match layer {
            Layer::Bronze => &self.bronze_dir,
            Layer::Silver => &self.silver_dir,
            Layer::Audit => &self.audit_dir,
            Layer::Gold => &self.gold_dir,
        };
        self.root.join(dir)
    }
}

/// Identity of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
    /// Stamped on every rejected record of the run.
    pub run_ts: OffsetDateTime,
    /// Reference date for time-window metrics.
    pub as_of: Date,
}

impl RunContext {
    pub fn new(run_ts: OffsetDateTime, as_of: Date) -> Result<Self> {
        let fmt = format_description::parse("[year][month][day]T[hour][minute][second][subsecond digits:6]Z")?;
        let run_id = run_ts.format(&fmt)?;
        Ok(Self {
            run_id,
            run_ts,
            as_of,
        })
    }

    /// A run starting now; `as_of` defaults to today (UTC).
    pub fn start(as_of: Option<Date>) -> Result<Self> {
        let now = OffsetDateTime::now_utc();
        Self::new(now, as_of.unwrap_or_else(|| now.date()))
    }

    pub fn run_ts_rfc3339(&self) -> Result<String> {
        Ok(self.run_ts.format(&Rfc3339)?)
    }
}

/// Data-access context of a run. Opened once at run start, passed to every
/// stage, closed at run end. Holding it means holding the warehouse lock.
#[derive(Debug)]
pub struct Warehouse {
    layout: WarehouseLayout,
    run: RunContext,
    lock_path: PathBuf,
    locked: bool,
}

impl Warehouse {
    pub fn open(layout: WarehouseLayout, run: RunContext) -> Result<Self> {
        create_dir_all(&layout.root)
            .with_context(|| format!("mkdir -p {}", layout.root.display()))?;

        let lock_path = layout.root.join(LOCK_FILE);
        let mut lock = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(WarehouseError::RunLocked { path: lock_path }.into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("create {}", lock_path.display()));
            }
        };

        let wh = Self {
            layout,
            run,
            lock_path,
            locked: true,
        }
        .stamp_lock(&mut lock)?;
        for layer in [Layer::Bronze, Layer::Silver, Layer::Audit, Layer::Gold] {
            let dir = wh.layout.layer_root(layer);
            create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        }
        create_dir_all(wh.manifests_dir())?;
        create_dir_all(wh.reports_dir())?;

        tracing::info!(
            root = %wh.layout.root.display(),
            run_id = %wh.run.run_id,
            "warehouse opened"
        );
        Ok(wh)
    }

    /// Writes the run id into the lock file. On failure `self` is dropped,
    /// which removes the lock again.
    fn stamp_lock(self, mut lock: impl Write) -> Result<Self> {
        lock.write_all(self.run.run_id.as_bytes())
            .with_context(|| format!("write {}", self.lock_path.display()))?;
        Ok(self)
    }

    pub fn layout(&self) -> &WarehouseLayout {
        &self.layout
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    pub fn table_dir(&self, layer: Layer, table: &str) -> PathBuf {
        self.layout.layer_root(layer).join(table)
    }

    /// The single part of a table written in replace mode.
    pub fn current_part(&self, layer: Layer, table: &str) -> PathBuf {
        self.table_dir(layer, table).join(PART_FILE)
    }

    /// Prepares the directory for a new part and returns its path. An
    /// appended part never reuses the path of an existing one.
    pub fn part_path(&self, layer: Layer, table: &str, mode: WriteMode) -> Result<PathBuf> {
        let table_dir = self.table_dir(layer, table);
        match mode {
            WriteMode::Replace => {
                self.clear_table(layer, table)?;
                create_dir_all(&table_dir).with_context(|| format!("mkdir -p {}", table_dir.display()))?;
                Ok(table_dir.join(PART_FILE))
            }
            WriteMode::Append => {
                let dir = table_dir.join(format!("run_id={}", self.run.run_id));
                create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
                let mut n = 0;
                loop {
                    let path = dir.join(part_file(n));
                    if !path.exists() {
                        return Ok(path);
                    }
                    n += 1;
                }
            }
        }
    }

    /// Removes every part of a table, whatever mode wrote it.
    pub fn clear_table(&self, layer: Layer, table: &str) -> Result<()> {
        let table_dir = self.table_dir(layer, table);
        if table_dir.exists() {
            remove_dir_all(&table_dir).with_context(|| format!("rm -r {}", table_dir.display()))?;
        }
        Ok(())
    }

    /// All parts of an appended table, oldest run first.
    pub fn appended_parts(&self, layer: Layer, table: &str) -> Result<Vec<PathBuf>> {
        let table_dir = self.table_dir(layer, table);
        if !table_dir.exists() {
            return Ok(Vec::new());
        }
        let mut run_dirs = list_dir(&table_dir)?;
        run_dirs.retain(|p| p.is_dir());
        run_dirs.sort();

        let mut parts = Vec::new();
        for dir in run_dirs {
            let mut in_run = list_dir(&dir)?;
            in_run.retain(|p| is_part_file(p));
            in_run.sort();
            parts.extend(in_run);
        }
        Ok(parts)
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.layout.root.join(&self.layout.manifests_dir)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.layout.root.join(&self.layout.reports_dir)
    }

    /// Ends the run and releases the lock.
    pub fn close(mut self) -> Result<()> {
        self.release()
            .with_context(|| format!("remove {}", self.lock_path.display()))?;
        tracing::info!(run_id = %self.run.run_id, "warehouse closed");
        Ok(())
    }

    fn release(&mut self) -> std::io::Result<()> {
        if self.locked {
            self.locked = false;
            remove_file(&self.lock_path)?;
        }
        Ok(())
    }
}

/// File name of the `n`th part of a partition; `part_file(0)` is [`PART_FILE`].
pub fn part_file(n: usize) -> String {
    format!("part-{n:06}.arrow")
}

fn is_part_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|e| e == "arrow")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("part-"))
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(std::fs::read_dir(dir)
        .with_context(|| format!("read_dir {}", dir.display()))?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect())
}

impl Drop for Warehouse {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release warehouse lock");
        }
    }
}
