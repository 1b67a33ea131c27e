//! Silver layer: per-entity record validators, the referential cascade
//! between them and the silver/audit writers.

pub mod captains;
pub mod cascade;
pub mod dates;
pub mod feedback;
pub mod impute;
pub mod payments;
pub mod rides;
pub mod rules;
pub mod silver;
pub mod users;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use warehouse::config::ValidationSettings;
use warehouse::{Entity, TableReader, Warehouse, WriteMode};

pub use captains::CleanCaptain;
pub use cascade::{validate_all, KeySet, ValidatedLayers};
pub use feedback::CleanFeedback;
pub use payments::CleanPayment;
pub use rides::CleanRide;
pub use rules::{RejectLog, RejectReason, RejectedRecord};
pub use silver::{read_silver, SilverRecord, SilverTables};
pub use users::CleanUser;

#[derive(Debug, Default, Clone)]
pub struct ValidationStats {
    pub entity: Option<Entity>,
    pub rows_in: u64,
    pub rows_out: u64,
    pub rejects: u64,
    pub by_reason: BTreeMap<RejectReason, u64>,
    /// blake3 of the clean rows; stable across reruns on the same input.
    pub digest: String,
    pub silver_out: PathBuf,
    pub audit_out: PathBuf,
}

/// Runs the validation stage: reads raw tables, validates in cascade order,
/// replaces the silver tables and records the rejects.
pub fn validate_warehouse(
    wh: &Warehouse,
    reader: &dyn TableReader,
    settings: &ValidationSettings,
    audit_mode: WriteMode,
) -> Result<(ValidatedLayers, Vec<ValidationStats>)> {
    let layers = validate_all(reader, settings, wh.run().run_ts)?;
    let stats = write_layers(wh, &layers, audit_mode)?;
    Ok((layers, stats))
}

pub fn write_layers(
    wh: &Warehouse,
    layers: &ValidatedLayers,
    audit_mode: WriteMode,
) -> Result<Vec<ValidationStats>> {
    let silver = &layers.silver;
    let mut out = Vec::with_capacity(Entity::ALL.len());
    for entity in Entity::ALL {
        let (silver_out, digest) = match entity {
            Entity::Users => silver::write_clean(wh, &silver.users)?,
            Entity::Captains => silver::write_clean(wh, &silver.captains)?,
            Entity::Rides => silver::write_clean(wh, &silver.rides)?,
            Entity::Payments => silver::write_clean(wh, &silver.payments)?,
            Entity::Feedback => silver::write_clean(wh, &silver.feedback)?,
        };

        let mut stats = ValidationStats {
            entity: Some(entity),
            rows_in: layers.rows_in.get(&entity).copied().unwrap_or(0) as u64,
            rows_out: silver.len(entity) as u64,
            digest,
            silver_out,
            ..Default::default()
        };
        if let Some(log) = layers.rejects.get(&entity) {
            stats.rejects = log.len() as u64;
            stats.by_reason = log.counts_by_reason();
            stats.audit_out = silver::write_rejects(wh, log, audit_mode)?;
        }
        for (reason, n) in &stats.by_reason {
            tracing::debug!(%entity, %reason, count = n, "rejects by reason");
        }
        tracing::info!(
            %entity,
            rows_in = stats.rows_in,
            rows_out = stats.rows_out,
            rejects = stats.rejects,
            "silver written"
        );
        out.push(stats);
    }
    Ok(out)
}
