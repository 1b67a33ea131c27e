//! Shared vocabulary of the ride warehouse: the entity catalog, raw tables,
//! the explicitly opened warehouse context and pipeline configuration.

pub mod columns;
pub mod config;
pub mod entity;
pub mod error;
pub mod ipc;
pub mod layout;
pub mod raw;

pub use config::PipelineConfig;
pub use entity::Entity;
pub use error::WarehouseError;
pub use ipc::TableWriter;
pub use layout::{Layer, RunContext, Warehouse, WarehouseLayout, WriteMode};
pub use raw::{RawRow, RawTable, TableReader};
