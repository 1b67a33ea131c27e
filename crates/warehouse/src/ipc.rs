//! Arrow IPC file helpers shared by the bronze, silver and audit layers.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::datatypes::{Schema, SchemaRef};
use arrow::ipc::reader::FileReader as IpcReader;
use arrow::ipc::writer::FileWriter as IpcWriter;
use arrow::record_batch::RecordBatch;

use crate::layout::{Layer, Warehouse, WriteMode};

pub fn write_ipc(path: &Path, schema: &Arc<Schema>, batches: &[RecordBatch]) -> Result<u64> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_batches(file, schema, batches)
}

/// Like [`write_ipc`] but refuses to overwrite an existing file.
pub fn write_new_ipc(path: &Path, schema: &Arc<Schema>, batches: &[RecordBatch]) -> Result<u64> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("create new {}", path.display()))?;
    write_batches(file, schema, batches)
}

fn write_batches(file: File, schema: &Arc<Schema>, batches: &[RecordBatch]) -> Result<u64> {
    let mut writer = IpcWriter::try_new(file, schema)?;
    let mut rows = 0u64;
    for b in batches {
        rows += b.num_rows() as u64;
        writer.write(b)?;
    }
    writer.finish()?;
    Ok(rows)
}

pub fn read_ipc(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = IpcReader::try_new(f, None)?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("read {}", path.display()))?;
    Ok((schema, batches))
}

/// Writes a table of a warehouse layer.
pub trait TableWriter {
    fn write_table(
        &self,
        layer: Layer,
        table: &str,
        schema: &Arc<Schema>,
        batches: &[RecordBatch],
        mode: WriteMode,
    ) -> Result<PathBuf>;
}

impl TableWriter for Warehouse {
    fn write_table(
        &self,
        layer: Layer,
        table: &str,
        schema: &Arc<Schema>,
        batches: &[RecordBatch],
        mode: WriteMode,
    ) -> Result<PathBuf> {
        let path = self.part_path(layer, table, mode)?;
        let rows = match mode {
            WriteMode::Replace => write_ipc(&path, schema, batches)?,
            WriteMode::Append => write_new_ipc(&path, schema, batches)?,
        };
        tracing::debug!(table, rows, path = %path.display(), "table written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, StringArray};
    use arrow::datatypes::{DataType, Field};
    use tempfile::TempDir;
    use time::OffsetDateTime;

    use crate::layout::{RunContext, WarehouseLayout};

    #[test]
    fn written_table_reads_back() {
        let tmp = TempDir::new().unwrap();
        let ts = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let wh = Warehouse::open(
            WarehouseLayout::with_root(tmp.path()),
            RunContext::new(ts, ts.date()).unwrap(),
        )
        .unwrap();

        let schema = Arc::new(Schema::new(vec![Field::new("city", DataType::Utf8, true)]));
        let col: ArrayRef = Arc::new(StringArray::from(vec![Some("Pune"), None]));
        let batch = RecordBatch::try_new(schema.clone(), vec![col]).unwrap();

        let path = wh
            .write_table(Layer::Silver, "users", &schema, &[batch], WriteMode::Replace)
            .unwrap();
        assert_eq!(path, wh.current_part(Layer::Silver, "users"));

        let (read_schema, batches) = read_ipc(&path).unwrap();
        assert_eq!(read_schema, schema);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
    }

    #[test]
    fn appends_never_overwrite_earlier_parts() {
        let tmp = TempDir::new().unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("city", DataType::Utf8, true)]));
        let col: ArrayRef = Arc::new(StringArray::from(vec![Some("Goa")]));
        let batch = RecordBatch::try_new(schema.clone(), vec![col]).unwrap();

        let path = tmp.path().join("part-000000.arrow");
        assert_eq!(write_new_ipc(&path, &schema, &[batch.clone()]).unwrap(), 1);
        assert!(write_new_ipc(&path, &schema, &[batch]).is_err());
    }
}
