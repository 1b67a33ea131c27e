//! Typed access to named columns of a record batch.

use anyhow::{anyhow, Context, Result};
use arrow::array::{
    Array, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::record_batch::RecordBatch;
use time::{Date, Duration};

/// Julian day of 1970-01-01, the Date32 epoch.
const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str, ty: &str) -> Result<&'a T> {
    let idx = batch
        .schema()
        .index_of(name)
        .with_context(|| format!("missing column: {name}"))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("expected {ty} for column {name}"))
}

pub fn utf8<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    column(batch, name, "Utf8")
}

pub fn float64<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    column(batch, name, "Float64")
}

pub fn int32<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    column(batch, name, "Int32")
}

pub fn int64<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    column(batch, name, "Int64")
}

pub fn date32<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Date32Array> {
    column(batch, name, "Date32")
}

pub fn opt_str(arr: &StringArray, row: usize) -> Option<String> {
    (!arr.is_null(row)).then(|| arr.value(row).to_string())
}

pub fn req_str(arr: &StringArray, row: usize, name: &str) -> Result<String> {
    opt_str(arr, row).ok_or_else(|| anyhow!("null in non-nullable column {name} at row {row}"))
}

pub fn opt_f64(arr: &Float64Array, row: usize) -> Option<f64> {
    (!arr.is_null(row)).then(|| arr.value(row))
}

pub fn opt_i32(arr: &Int32Array, row: usize) -> Option<i32> {
    (!arr.is_null(row)).then(|| arr.value(row))
}

pub fn opt_date(arr: &Date32Array, row: usize) -> Result<Option<Date>> {
    if arr.is_null(row) {
        return Ok(None);
    }
    date_from_days(arr.value(row)).map(Some)
}

pub fn date_to_days(d: Date) -> i32 {
    d.to_julian_day() - UNIX_EPOCH_JULIAN_DAY
}

pub fn date_from_days(days: i32) -> Result<Date> {
    Date::from_julian_day(days + UNIX_EPOCH_JULIAN_DAY)
        .map_err(|e| anyhow!("date32 out of range ({days}): {e}"))
}

/// `d` shifted back by `days`, saturating at the earliest representable date.
pub fn days_before(d: Date, days: i64) -> Date {
    d.checked_sub(Duration::days(days)).unwrap_or(Date::MIN)
}
