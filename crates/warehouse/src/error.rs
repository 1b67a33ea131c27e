use std::path::PathBuf;

use thiserror::Error;

use crate::entity::Entity;

/// Fatal conditions of a pipeline run. Data-quality problems never show up
/// here; they are routed to the audit layer instead.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The export or bronze table an entity is read from does not exist.
    #[error("source for {entity} not found: {}", path.display())]
    SourceMissing { entity: Entity, path: PathBuf },

    /// A raw table lacks a column the validator needs.
    #[error("missing column in {entity}: {column}")]
    MissingColumn { entity: Entity, column: String },

    /// Another run currently holds the warehouse.
    #[error("warehouse is locked by another run: {}", path.display())]
    RunLocked { path: PathBuf },

    #[error("unknown entity: {0}")]
    UnknownEntity(String),
}
