//! Bronze layer: spreadsheet exports (one CSV per entity) land here as
//! all-text Arrow IPC tables with lineage columns, and are read back as
//! [`RawTable`]s for validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, ArrayRef, Int64Array, Int64Builder, RecordBatch, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use csv_async::{AsyncReaderBuilder, StringRecord};
use futures::StreamExt;
use tokio::io::BufReader;
use warehouse::ipc::read_ipc;
use warehouse::{Entity, Layer, RawRow, RawTable, TableReader, Warehouse, WarehouseError, WriteMode};

pub const LINEAGE_RUN: &str = "ingest_run";
pub const LINEAGE_SOURCE: &str = "source_file";
pub const LINEAGE_ROW: &str = "row_number";

const BATCH_SIZE: usize = 65_536;

#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub entity: Option<Entity>,
    pub rows_in: u64,
    pub bytes_in: u64,
    pub out_path: PathBuf,
}

/// Loads every entity export from `source_dir`. A missing export halts the
/// whole ingestion.
pub async fn ingest_all(wh: &Warehouse, source_dir: &Path) -> Result<Vec<IngestStats>> {
    ingest_selected(wh, source_dir, &Entity::ALL).await
}

/// Loads only the given entities' exports, in the order given.
pub async fn ingest_selected(
    wh: &Warehouse,
    source_dir: &Path,
    entities: &[Entity],
) -> Result<Vec<IngestStats>> {
    let mut out = Vec::with_capacity(entities.len());
    for &entity in entities {
        let source = source_dir.join(entity.source_file());
        out.push(ingest_entity(wh, entity, &source).await?);
    }
    Ok(out)
}

pub async fn ingest_entity(wh: &Warehouse, entity: Entity, source_path: &Path) -> Result<IngestStats> {
    if !source_path.exists() {
        return Err(WarehouseError::SourceMissing {
            entity,
            path: source_path.to_path_buf(),
        }
        .into());
    }

    let out_path = wh.part_path(Layer::Bronze, entity.name(), WriteMode::Replace)?;

    let f = tokio::fs::File::open(source_path)
        .await
        .with_context(|| format!("open {}", source_path.display()))?;
    let bytes_in = f.metadata().await?.len();
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .flexible(true)
        .create_reader(BufReader::new(f));

    let headers: StringRecord = rdr.headers().await?.clone();
    if headers.is_empty() {
        return Err(anyhow!("empty CSV header in {}", source_path.display()));
    }
    let src_col_count = headers.len();

    // Source columns as nullable Utf8, then lineage
    let mut fields: Vec<Field> = headers
        .iter()
        .map(|name| Field::new(name.trim(), DataType::Utf8, true))
        .collect();
    fields.push(Field::new(LINEAGE_RUN, DataType::Utf8, false));
    fields.push(Field::new(LINEAGE_SOURCE, DataType::Utf8, false));
    fields.push(Field::new(LINEAGE_ROW, DataType::Int64, false));
    let schema = Arc::new(Schema::new(fields));

    let out_file = std::fs::File::create(&out_path)
        .with_context(|| format!("create {}", out_path.display()))?;
    let mut writer = FileWriter::try_new(out_file, &schema)?;

    let mut batch = BronzeBatch::new(src_col_count);
    let mut rows_in: u64 = 0;
    let source_file = source_path.display().to_string();
    let run_id = wh.run().run_id.clone();

    let mut records = rdr.records();
    while let Some(rec_res) = records.next().await {
        let rec = rec_res.with_context(|| format!("read {}", source_path.display()))?;
        rows_in += 1;
        batch.push(&rec, &run_id, &source_file, rows_in as i64);
        if batch.rows == BATCH_SIZE {
            writer.write(&batch.finish(&schema)?)?;
        }
    }
    if batch.rows > 0 {
        writer.write(&batch.finish(&schema)?)?;
    }
    writer.finish()?;

    tracing::info!(%entity, rows_in, bytes_in, out = %out_path.display(), "bronze ingested");
    Ok(IngestStats {
        entity: Some(entity),
        rows_in,
        bytes_in,
        out_path,
    })
}

struct BronzeBatch {
    cols: Vec<StringBuilder>,
    run: StringBuilder,
    source: StringBuilder,
    row_number: Int64Builder,
    rows: usize,
}

impl BronzeBatch {
    fn new(n_cols: usize) -> Self {
        Self {
            cols: (0..n_cols).map(|_| StringBuilder::new()).collect(),
            run: StringBuilder::new(),
            source: StringBuilder::new(),
            row_number: Int64Builder::new(),
            rows: 0,
        }
    }

    fn push(&mut self, rec: &StringRecord, run_id: &str, source_file: &str, row_number: i64) {
        for (i, b) in self.cols.iter_mut().enumerate() {
            match rec.get(i).map(str::trim) {
                Some(v) if !v.is_empty() => b.append_value(v),
                _ => b.append_null(),
            }
        }
        self.run.append_value(run_id);
        self.source.append_value(source_file);
        self.row_number.append_value(row_number);
        self.rows += 1;
    }

    fn finish(&mut self, schema: &Arc<Schema>) -> Result<RecordBatch> {
        let mut cols: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        for b in self.cols.iter_mut() {
            cols.push(Arc::new(b.finish()) as ArrayRef);
        }
        cols.push(Arc::new(self.run.finish()) as ArrayRef);
        cols.push(Arc::new(self.source.finish()) as ArrayRef);
        cols.push(Arc::new(self.row_number.finish()) as ArrayRef);
        self.rows = 0;
        Ok(RecordBatch::try_new(schema.clone(), cols)?)
    }
}

/// Reads bronze tables of the warehouse as raw record sets.
pub struct BronzeReader<'a> {
    wh: &'a Warehouse,
}

impl<'a> BronzeReader<'a> {
    pub fn new(wh: &'a Warehouse) -> Self {
        Self { wh }
    }
}

impl TableReader for BronzeReader<'_> {
    fn read_raw(&self, entity: Entity) -> Result<RawTable> {
        let path = self.wh.current_part(Layer::Bronze, entity.name());
        if !path.exists() {
            return Err(WarehouseError::SourceMissing { entity, path }.into());
        }
        let (schema, batches) = read_ipc(&path)?;

        let data_cols: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| ![LINEAGE_RUN, LINEAGE_SOURCE, LINEAGE_ROW].contains(&f.name().as_str()))
            .map(|(i, _)| i)
            .collect();
        let row_idx = schema
            .index_of(LINEAGE_ROW)
            .with_context(|| format!("missing lineage column in bronze {entity}"))?;

        let mut table = RawTable::new(
            entity,
            data_cols.iter().map(|&i| schema.field(i).name().clone()).collect(),
        );
        for batch in &batches {
            let row_numbers = batch
                .column(row_idx)
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| anyhow!("expected Int64 for {LINEAGE_ROW}"))?;
            let texts = data_cols
                .iter()
                .map(|&i| {
                    batch
                        .column(i)
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .ok_or_else(|| anyhow!("expected Utf8 for bronze column {}", schema.field(i).name()))
                })
                .collect::<Result<Vec<_>>>()?;
            for row in 0..batch.num_rows() {
                let values = texts
                    .iter()
                    .map(|a| (!a.is_null(row)).then(|| a.value(row).to_string()))
                    .collect();
                table.rows.push(RawRow::new(row_numbers.value(row), values));
            }
        }
        tracing::debug!(%entity, rows = table.len(), "bronze read");
        Ok(table)
    }
}
