//! Silver (clean) and audit (rejected) tables on disk.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int32Array, Int64Builder, RecordBatch, StringArray,
    StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use blake3::Hasher;
use warehouse::columns::{
    date32, date_from_days, date_to_days, float64, int32, opt_i32, opt_str, req_str, utf8,
};
use warehouse::ipc::read_ipc;
use warehouse::{Entity, Layer, TableWriter, Warehouse, WarehouseError, WriteMode};

use crate::captains::CleanCaptain;
use crate::feedback::CleanFeedback;
use crate::payments::CleanPayment;
use crate::rides::CleanRide;
use crate::rules::RejectLog;
use crate::users::CleanUser;

/// A clean record type with a fixed silver schema.
pub trait SilverRecord: Sized {
    const ENTITY: Entity;

    fn schema() -> Schema;

    fn to_batch(rows: &[Self]) -> Result<RecordBatch>;

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;
}

/// The validated layer: one clean record set per entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SilverTables {
    pub users: Vec<CleanUser>,
    pub captains: Vec<CleanCaptain>,
    pub rides: Vec<CleanRide>,
    pub payments: Vec<CleanPayment>,
    pub feedback: Vec<CleanFeedback>,
}

impl SilverTables {
    pub fn len(&self, entity: Entity) -> usize {
        match entity {
            Entity::Users => self.users.len(),
            Entity::Captains => self.captains.len(),
            Entity::Rides => self.rides.len(),
            Entity::Payments => self.payments.len(),
            Entity::Feedback => self.feedback.len(),
        }
    }
}

fn batch(schema: Schema, cols: Vec<ArrayRef>) -> Result<RecordBatch> {
    Ok(RecordBatch::try_new(Arc::new(schema), cols)?)
}

fn strs<T>(rows: &[T], f: impl Fn(&T) -> &str) -> ArrayRef {
    Arc::new(rows.iter().map(|r| Some(f(r))).collect::<StringArray>())
}

fn opt_strs<T>(rows: &[T], f: impl Fn(&T) -> Option<&str>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<StringArray>())
}

fn f64s<T>(rows: &[T], f: impl Fn(&T) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn days<T>(rows: &[T], f: impl Fn(&T) -> time::Date) -> ArrayRef {
    Arc::new(Date32Array::from(
        rows.iter().map(|r| date_to_days(f(r))).collect::<Vec<_>>(),
    ))
}

impl SilverRecord for CleanUser {
    const ENTITY: Entity = Entity::Users;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("user_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("gender", DataType::Utf8, true),
            Field::new("age", DataType::Int32, true),
            Field::new("signup_date", DataType::Date32, false),
            Field::new("city", DataType::Utf8, true),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        batch(
            Self::schema(),
            vec![
                strs(rows, |r| &r.user_id),
                opt_strs(rows, |r| r.name.as_deref()),
                opt_strs(rows, |r| r.gender.as_deref()),
                Arc::new(rows.iter().map(|r| r.age).collect::<Int32Array>()),
                days(rows, |r| r.signup_date),
                opt_strs(rows, |r| r.city.as_deref()),
            ],
        )
    }

    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let (user_id, name, gender) = (utf8(b, "user_id")?, utf8(b, "name")?, utf8(b, "gender")?);
        let (age, signup_date, city) = (int32(b, "age")?, date32(b, "signup_date")?, utf8(b, "city")?);
        (0..b.num_rows())
            .map(|i| {
                Ok(CleanUser {
                    user_id: req_str(user_id, i, "user_id")?,
                    name: opt_str(name, i),
                    gender: opt_str(gender, i),
                    age: opt_i32(age, i),
                    signup_date: date_from_days(signup_date.value(i))?,
                    city: opt_str(city, i),
                })
            })
            .collect()
    }
}

impl SilverRecord for CleanCaptain {
    const ENTITY: Entity = Entity::Captains;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("captain_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("age", DataType::Int32, false),
            Field::new("city", DataType::Utf8, false),
            Field::new("rating", DataType::Float64, false),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        batch(
            Self::schema(),
            vec![
                strs(rows, |r| &r.captain_id),
                strs(rows, |r| &r.name),
                Arc::new(Int32Array::from(rows.iter().map(|r| r.age).collect::<Vec<_>>())),
                strs(rows, |r| &r.city),
                f64s(rows, |r| r.rating),
            ],
        )
    }

    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let (captain_id, name, age) = (utf8(b, "captain_id")?, utf8(b, "name")?, int32(b, "age")?);
        let (city, rating) = (utf8(b, "city")?, float64(b, "rating")?);
        (0..b.num_rows())
            .map(|i| {
                Ok(CleanCaptain {
                    captain_id: req_str(captain_id, i, "captain_id")?,
                    name: req_str(name, i, "name")?,
                    age: age.value(i),
                    city: req_str(city, i, "city")?,
                    rating: rating.value(i),
                })
            })
            .collect()
    }
}

impl SilverRecord for CleanRide {
    const ENTITY: Entity = Entity::Rides;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("ride_id", DataType::Utf8, false),
            Field::new("user_id", DataType::Utf8, false),
            Field::new("captain_id", DataType::Utf8, false),
            Field::new("ride_date", DataType::Date32, false),
            Field::new("pickup_loc", DataType::Utf8, false),
            Field::new("drop_loc", DataType::Utf8, false),
            Field::new("distance_km", DataType::Float64, false),
            Field::new("duration_min", DataType::Float64, false),
            Field::new("ride_status", DataType::Utf8, false),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        batch(
            Self::schema(),
            vec![
                strs(rows, |r| &r.ride_id),
                strs(rows, |r| &r.user_id),
                strs(rows, |r| &r.captain_id),
                days(rows, |r| r.ride_date),
                strs(rows, |r| &r.pickup_loc),
                strs(rows, |r| &r.drop_loc),
                f64s(rows, |r| r.distance_km),
                f64s(rows, |r| r.duration_min),
                strs(rows, |r| &r.ride_status),
            ],
        )
    }

    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let (ride_id, user_id, captain_id) = (utf8(b, "ride_id")?, utf8(b, "user_id")?, utf8(b, "captain_id")?);
        let (ride_date, pickup_loc, drop_loc) = (date32(b, "ride_date")?, utf8(b, "pickup_loc")?, utf8(b, "drop_loc")?);
        let (distance_km, duration_min) = (float64(b, "distance_km")?, float64(b, "duration_min")?);
        let ride_status = utf8(b, "ride_status")?;
        (0..b.num_rows())
            .map(|i| {
                Ok(CleanRide {
                    ride_id: req_str(ride_id, i, "ride_id")?,
                    user_id: req_str(user_id, i, "user_id")?,
                    captain_id: req_str(captain_id, i, "captain_id")?,
                    ride_date: date_from_days(ride_date.value(i))?,
                    pickup_loc: req_str(pickup_loc, i, "pickup_loc")?,
                    drop_loc: req_str(drop_loc, i, "drop_loc")?,
                    distance_km: distance_km.value(i),
                    duration_min: duration_min.value(i),
                    ride_status: req_str(ride_status, i, "ride_status")?,
                })
            })
            .collect()
    }
}

impl SilverRecord for CleanPayment {
    const ENTITY: Entity = Entity::Payments;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("payment_id", DataType::Utf8, false),
            Field::new("ride_id", DataType::Utf8, false),
            Field::new("payment_method", DataType::Utf8, true),
            Field::new("fare", DataType::Float64, false),
            Field::new("discount_percent", DataType::Float64, false),
            Field::new("discount_amount", DataType::Float64, false),
            Field::new("final_amount", DataType::Float64, false),
            Field::new("payment_status", DataType::Utf8, true),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        batch(
            Self::schema(),
            vec![
                strs(rows, |r| &r.payment_id),
                strs(rows, |r| &r.ride_id),
                opt_strs(rows, |r| r.payment_method.as_deref()),
                f64s(rows, |r| r.fare),
                f64s(rows, |r| r.discount_percent),
                f64s(rows, |r| r.discount_amount),
                f64s(rows, |r| r.final_amount),
                opt_strs(rows, |r| r.payment_status.as_deref()),
            ],
        )
    }

    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let (payment_id, ride_id, method) = (utf8(b, "payment_id")?, utf8(b, "ride_id")?, utf8(b, "payment_method")?);
        let (fare, pct) = (float64(b, "fare")?, float64(b, "discount_percent")?);
        let (amount, final_amount) = (float64(b, "discount_amount")?, float64(b, "final_amount")?);
        let status = utf8(b, "payment_status")?;
        (0..b.num_rows())
            .map(|i| {
                Ok(CleanPayment {
                    payment_id: req_str(payment_id, i, "payment_id")?,
                    ride_id: req_str(ride_id, i, "ride_id")?,
                    payment_method: opt_str(method, i),
                    fare: fare.value(i),
                    discount_percent: pct.value(i),
                    discount_amount: amount.value(i),
                    final_amount: final_amount.value(i),
                    payment_status: opt_str(status, i),
                })
            })
            .collect()
    }
}

impl SilverRecord for CleanFeedback {
    const ENTITY: Entity = Entity::Feedback;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("feedback_id", DataType::Utf8, false),
            Field::new("ride_id", DataType::Utf8, false),
            Field::new("user_rating", DataType::Float64, false),
            Field::new("captain_rating", DataType::Float64, false),
            Field::new("issue_category", DataType::Utf8, false),
            Field::new("comments", DataType::Utf8, false),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        batch(
            Self::schema(),
            vec![
                strs(rows, |r| &r.feedback_id),
                strs(rows, |r| &r.ride_id),
                f64s(rows, |r| r.user_rating),
                f64s(rows, |r| r.captain_rating),
                strs(rows, |r| &r.issue_category),
                strs(rows, |r| &r.comments),
            ],
        )
    }

    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let (feedback_id, ride_id) = (utf8(b, "feedback_id")?, utf8(b, "ride_id")?);
        let (user_rating, captain_rating) = (float64(b, "user_rating")?, float64(b, "captain_rating")?);
        let (issue, comments) = (utf8(b, "issue_category")?, utf8(b, "comments")?);
        (0..b.num_rows())
            .map(|i| {
                Ok(CleanFeedback {
                    feedback_id: req_str(feedback_id, i, "feedback_id")?,
                    ride_id: req_str(ride_id, i, "ride_id")?,
                    user_rating: user_rating.value(i),
                    captain_rating: captain_rating.value(i),
                    issue_category: req_str(issue, i, "issue_category")?,
                    comments: req_str(comments, i, "comments")?,
                })
            })
            .collect()
    }
}

/// Content digest of a batch, independent of how it is laid out in files.
pub fn digest_batch(batch: &RecordBatch) -> Result<String> {
    let opts = FormatOptions::default().with_null("\u{0}");
    let formatters = batch
        .columns()
        .iter()
        .map(|c| ArrayFormatter::try_new(c.as_ref(), &opts))
        .collect::<Result<Vec<_>, _>>()?;
    let mut hasher = Hasher::new();
    for row in 0..batch.num_rows() {
        for f in &formatters {
            hasher.update(f.value(row).to_string().as_bytes());
            hasher.update(b"|");
        }
        hasher.update(b"\n");
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Replaces the silver table of `T`'s entity. Returns the part path and the
/// content digest.
pub fn write_clean<T: SilverRecord>(wh: &Warehouse, rows: &[T]) -> Result<(PathBuf, String)> {
    let batch = T::to_batch(rows)?;
    let digest = digest_batch(&batch)?;
    let path = wh.write_table(
        Layer::Silver,
        T::ENTITY.name(),
        &batch.schema(),
        &[batch],
        WriteMode::Replace,
    )?;
    Ok((path, digest))
}

pub fn audit_schema(columns: &[String]) -> Schema {
    let mut fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(c, DataType::Utf8, true))
        .collect();
    fields.push(Field::new("row_number", DataType::Int64, false));
    fields.push(Field::new("reason", DataType::Utf8, false));
    fields.push(Field::new("run_ts", DataType::Utf8, false));
    Schema::new(fields)
}

pub fn audit_batch(log: &RejectLog) -> Result<RecordBatch> {
    let schema = Arc::new(audit_schema(&log.columns));
    let cap = log.len();
    let mut cols: Vec<StringBuilder> = (0..log.columns.len())
        .map(|_| StringBuilder::with_capacity(cap, cap * 8))
        .collect();
    let mut row_number = Int64Builder::with_capacity(cap);
    let mut reason = StringBuilder::with_capacity(cap, cap * 16);
    let mut run_ts = StringBuilder::with_capacity(cap, cap * 20);

    for rec in &log.records {
        for (i, b) in cols.iter_mut().enumerate() {
            match rec.raw.values.get(i).and_then(|v| v.as_deref()) {
                Some(v) => b.append_value(v),
                None => b.append_null(),
            }
        }
        row_number.append_value(rec.raw.row_number);
        reason.append_value(rec.reason.code());
        run_ts.append_value(rec.run_ts.format(&time::format_description::well_known::Rfc3339)?);
    }

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(cols.len() + 3);
    for b in cols.iter_mut() {
        arrays.push(Arc::new(b.finish()) as ArrayRef);
    }
    arrays.push(Arc::new(row_number.finish()) as ArrayRef);
    arrays.push(Arc::new(reason.finish()) as ArrayRef);
    arrays.push(Arc::new(run_ts.finish()) as ArrayRef);
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Writes the rejects of one entity under the run's audit partition.
/// `Replace` drops the audit history of the entity first.
pub fn write_rejects(wh: &Warehouse, log: &RejectLog, mode: WriteMode) -> Result<PathBuf> {
    let table = log.entity.name();
    if mode == WriteMode::Replace {
        wh.clear_table(Layer::Audit, table)?;
    }
    let batch = audit_batch(log)?;
    wh.write_table(Layer::Audit, table, &batch.schema(), &[batch], WriteMode::Append)
}

pub fn read_clean<T: SilverRecord>(wh: &Warehouse) -> Result<Vec<T>> {
    let entity = T::ENTITY;
    let path = wh.current_part(Layer::Silver, entity.name());
    if !path.exists() {
        return Err(WarehouseError::SourceMissing { entity, path }.into());
    }
    let (_, batches) = read_ipc(&path)?;
    let mut out = Vec::new();
    for b in &batches {
        out.extend(T::from_batch(b).with_context(|| format!("decode silver {entity}"))?);
    }
    Ok(out)
}

pub fn read_silver(wh: &Warehouse) -> Result<SilverTables> {
    Ok(SilverTables {
        users: read_clean(wh)?,
        captains: read_clean(wh)?,
        rides: read_clean(wh)?,
        payments: read_clean(wh)?,
        feedback: read_clean(wh)?,
    })
}

/// Every rejected row recorded for an entity, across all audit partitions.
pub fn audit_row_count(wh: &Warehouse, entity: Entity) -> Result<usize> {
    let mut n = 0;
    for part in wh.appended_parts(Layer::Audit, entity.name())? {
        let (_, batches) = read_ipc(&part)?;
        n += batches.iter().map(|b| b.num_rows()).sum::<usize>();
    }
    Ok(n)
}
