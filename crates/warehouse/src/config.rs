use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::{WarehouseLayout, WriteMode};

/// Pipeline settings, read from an optional TOML file. Every field has a
/// default so an empty file (or no file) is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(flatten)]
    pub layout: WarehouseLayout,
    /// Directory holding one `<entity>.csv` export per entity.
    pub source_dir: PathBuf,
    pub validation: ValidationSettings,
    pub reconcile: ReconcileSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Route duplicate user ids to the audit layer. `false` drops them
    /// silently, the way the first version of the pipeline did.
    pub reject_duplicate_users: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            reject_duplicate_users: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Absolute epsilon for numeric metrics.
    pub tolerance: f64,
    pub activity_window_days: i64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            activity_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub mode: WriteMode,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_toml(&txt).with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_toml(txt: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(txt)?;
        if cfg.source_dir.as_os_str().is_empty() {
            cfg.source_dir = PathBuf::from("./bronze_inputs");
        }
        Ok(cfg)
    }

    /// Config file if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::from_toml(""),
        }
    }
}
