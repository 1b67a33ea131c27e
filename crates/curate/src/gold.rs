//! Gold snapshot on disk: one Parquet file per aggregate table under
//! `snapshot_date=`, plus `commit.json` and an atomically replaced
//! `latest.json`.

use std::fs::{create_dir_all, remove_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use time::{format_description, Date};
use validate::{CleanCaptain, CleanFeedback, CleanPayment, CleanRide, CleanUser};
use warehouse::columns::{
    date32, date_from_days, date_to_days, float64, int32, int64, opt_date, opt_f64, opt_i32,
    opt_str, req_str, utf8,
};
use warehouse::{Layer, Warehouse, WarehouseLayout};

use crate::aggregate::{CaptainAggregate, UserAggregate};
use crate::dashboard::DashboardRow;

pub const GOLD_PART: &str = "part-000000.parquet";
pub const USER_AGGREGATE: &str = "user_aggregate";
pub const CAPTAIN_AGGREGATE: &str = "captain_aggregate";
pub const DASHBOARD_DATA: &str = "dashboard_data";

/// An aggregate row type persisted as a gold table.
pub trait GoldRecord: Sized {
    const TABLE: &'static str;

    fn schema() -> Schema;

    fn to_batch(rows: &[Self]) -> Result<RecordBatch>;

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoldTables {
    pub snapshot_date: Date,
    pub users: Vec<UserAggregate>,
    pub captains: Vec<CaptainAggregate>,
    pub dashboard: Vec<DashboardRow>,
}

#[derive(Debug, Default, Clone)]
pub struct CurateStats {
    pub files_written: u32,
    pub rows_written: u64,
    pub commit_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitFile {
    pub table: String,
    pub path: String,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitJson {
    pub dataset: String,
    pub snapshot_date: String,
    pub run_id: String,
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestJson {
    pub snapshot_date: String,
    pub run_id: String,
}

fn strs<T>(rows: &[T], f: impl Fn(&T) -> Option<&str>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<StringArray>())
}

fn f64s<T>(rows: &[T], f: impl Fn(&T) -> Option<f64>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<Float64Array>())
}

fn i32s<T>(rows: &[T], f: impl Fn(&T) -> Option<i32>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<Int32Array>())
}

fn i64s<T>(rows: &[T], f: impl Fn(&T) -> i64) -> ArrayRef {
    Arc::new(Int64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn dates<T>(rows: &[T], f: impl Fn(&T) -> Option<Date>) -> ArrayRef {
    Arc::new(
        rows.iter()
            .map(|r| f(r).map(date_to_days))
            .collect::<Date32Array>(),
    )
}

impl GoldRecord for UserAggregate {
    const TABLE: &'static str = USER_AGGREGATE;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("user_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("age", DataType::Int32, true),
            Field::new("gender", DataType::Utf8, true),
            Field::new("city", DataType::Utf8, true),
            Field::new("signup_date", DataType::Date32, false),
            Field::new("first_ride_date", DataType::Date32, true),
            Field::new("last_ride_date", DataType::Date32, true),
            Field::new("total_rides", DataType::Int64, false),
            Field::new("total_revenue", DataType::Float64, false),
            Field::new("avg_revenue_per_ride", DataType::Float64, true),
            Field::new("booking_frequency", DataType::Int64, false),
            Field::new("is_active", DataType::Int32, false),
            Field::new("avg_captain_rating", DataType::Float64, true),
            Field::new("rated_feedback_count", DataType::Int64, false),
            Field::new("most_frequent_issue", DataType::Utf8, true),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let cols: Vec<ArrayRef> = vec![
            strs(rows, |r| Some(r.user_id.as_str())),
            strs(rows, |r| r.name.as_deref()),
            Arc::new(rows.iter().map(|r| r.age).collect::<Int32Array>()),
            strs(rows, |r| r.gender.as_deref()),
            strs(rows, |r| r.city.as_deref()),
            dates(rows, |r| Some(r.signup_date)),
            dates(rows, |r| r.first_ride_date),
            dates(rows, |r| r.last_ride_date),
            i64s(rows, |r| r.total_rides),
            f64s(rows, |r| Some(r.total_revenue)),
            f64s(rows, |r| r.avg_revenue_per_ride),
            i64s(rows, |r| r.booking_frequency),
            Arc::new(Int32Array::from(rows.iter().map(|r| r.is_active).collect::<Vec<_>>())),
            f64s(rows, |r| r.avg_captain_rating),
            i64s(rows, |r| r.rated_feedback_count),
            strs(rows, |r| r.most_frequent_issue.as_deref()),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), cols)?)
    }

    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let user_id = utf8(b, "user_id")?;
        let name = utf8(b, "name")?;
        let age = int32(b, "age")?;
        let gender = utf8(b, "gender")?;
        let city = utf8(b, "city")?;
        let signup_date = date32(b, "signup_date")?;
        let first_ride_date = date32(b, "first_ride_date")?;
        let last_ride_date = date32(b, "last_ride_date")?;
        let total_rides = int64(b, "total_rides")?;
        let total_revenue = float64(b, "total_revenue")?;
        let avg_revenue = float64(b, "avg_revenue_per_ride")?;
        let booking_frequency = int64(b, "booking_frequency")?;
        let is_active = int32(b, "is_active")?;
        let avg_captain_rating = float64(b, "avg_captain_rating")?;
        let rated = int64(b, "rated_feedback_count")?;
        let issue = utf8(b, "most_frequent_issue")?;
        (0..b.num_rows())
            .map(|i| {
                Ok(UserAggregate {
                    user_id: req_str(user_id, i, "user_id")?,
                    name: opt_str(name, i),
                    age: opt_i32(age, i),
                    gender: opt_str(gender, i),
                    city: opt_str(city, i),
                    signup_date: date_from_days(signup_date.value(i))?,
                    first_ride_date: opt_date(first_ride_date, i)?,
                    last_ride_date: opt_date(last_ride_date, i)?,
                    total_rides: total_rides.value(i),
                    total_revenue: total_revenue.value(i),
                    avg_revenue_per_ride: opt_f64(avg_revenue, i),
                    booking_frequency: booking_frequency.value(i),
                    is_active: is_active.value(i),
                    avg_captain_rating: opt_f64(avg_captain_rating, i),
                    rated_feedback_count: rated.value(i),
                    most_frequent_issue: opt_str(issue, i),
                })
            })
            .collect()
    }
}

impl GoldRecord for CaptainAggregate {
    const TABLE: &'static str = CAPTAIN_AGGREGATE;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("captain_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("age", DataType::Int32, false),
            Field::new("city", DataType::Utf8, false),
            Field::new("average_rating", DataType::Float64, false),
            Field::new("total_rides", DataType::Int64, false),
            Field::new("completed_rides", DataType::Int64, false),
            Field::new("cancelled_rides", DataType::Int64, false),
            Field::new("total_distance_km", DataType::Float64, false),
            Field::new("total_duration_min", DataType::Float64, false),
            Field::new("total_final_amount", DataType::Float64, false),
            Field::new("avg_captain_rating", DataType::Float64, true),
            Field::new("avg_user_rating", DataType::Float64, true),
            Field::new("status", DataType::Utf8, false),
            Field::new("most_frequent_issue", DataType::Utf8, true),
            Field::new("most_frequent_comment", DataType::Utf8, true),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let cols: Vec<ArrayRef> = vec![
            strs(rows, |r| Some(r.captain_id.as_str())),
            strs(rows, |r| Some(r.name.as_str())),
            Arc::new(Int32Array::from(rows.iter().map(|r| r.age).collect::<Vec<_>>())),
            strs(rows, |r| Some(r.city.as_str())),
            f64s(rows, |r| Some(r.average_rating)),
            i64s(rows, |r| r.total_rides),
            i64s(rows, |r| r.completed_rides),
            i64s(rows, |r| r.cancelled_rides),
            f64s(rows, |r| Some(r.total_distance_km)),
            f64s(rows, |r| Some(r.total_duration_min)),
            f64s(rows, |r| Some(r.total_final_amount)),
            f64s(rows, |r| r.avg_captain_rating),
            f64s(rows, |r| r.avg_user_rating),
            strs(rows, |r| Some(r.status.as_str())),
            strs(rows, |r| r.most_frequent_issue.as_deref()),
            strs(rows, |r| r.most_frequent_comment.as_deref()),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), cols)?)
    }

    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let captain_id = utf8(b, "captain_id")?;
        let name = utf8(b, "name")?;
        let age = int32(b, "age")?;
        let city = utf8(b, "city")?;
        let average_rating = float64(b, "average_rating")?;
        let total_rides = int64(b, "total_rides")?;
        let completed = int64(b, "completed_rides")?;
        let cancelled = int64(b, "cancelled_rides")?;
        let distance = float64(b, "total_distance_km")?;
        let duration = float64(b, "total_duration_min")?;
        let amount = float64(b, "total_final_amount")?;
        let avg_captain_rating = float64(b, "avg_captain_rating")?;
        let avg_user_rating = float64(b, "avg_user_rating")?;
        let status = utf8(b, "status")?;
        let issue = utf8(b, "most_frequent_issue")?;
        let comment = utf8(b, "most_frequent_comment")?;
        (0..b.num_rows())
            .map(|i| {
                Ok(CaptainAggregate {
                    captain_id: req_str(captain_id, i, "captain_id")?,
                    name: req_str(name, i, "name")?,
                    age: age.value(i),
                    city: req_str(city, i, "city")?,
                    average_rating: average_rating.value(i),
                    total_rides: total_rides.value(i),
                    completed_rides: completed.value(i),
                    cancelled_rides: cancelled.value(i),
                    total_distance_km: distance.value(i),
                    total_duration_min: duration.value(i),
                    total_final_amount: amount.value(i),
                    avg_captain_rating: opt_f64(avg_captain_rating, i),
                    avg_user_rating: opt_f64(avg_user_rating, i),
                    status: req_str(status, i, "status")?,
                    most_frequent_issue: opt_str(issue, i),
                    most_frequent_comment: opt_str(comment, i),
                })
            })
            .collect()
    }
}

impl GoldRecord for DashboardRow {
    const TABLE: &'static str = DASHBOARD_DATA;

    fn schema() -> Schema {
        let text = |name: &str| Field::new(name, DataType::Utf8, true);
        let num = |name: &str| Field::new(name, DataType::Float64, true);
        Schema::new(vec![
            text("user_id"),
            text("user_name"),
            text("gender"),
            Field::new("user_age", DataType::Int32, true),
            Field::new("signup_date", DataType::Date32, true),
            text("user_city"),
            text("ride_id"),
            text("captain_id"),
            Field::new("ride_date", DataType::Date32, true),
            text("pickup_loc"),
            text("drop_loc"),
            num("distance_km"),
            num("duration_min"),
            text("ride_status"),
            text("payment_id"),
            text("payment_method"),
            num("fare"),
            num("discount_percent"),
            num("discount_amount"),
            num("final_amount"),
            text("payment_status"),
            text("feedback_id"),
            num("user_rating"),
            num("feedback_captain_rating"),
            text("issue_category"),
            text("comments"),
            text("captain_name"),
            Field::new("captain_age", DataType::Int32, true),
            text("captain_city"),
            num("captain_overall_rating"),
        ])
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let cols: Vec<ArrayRef> = vec![
            strs(rows, |r| r.user_id()),
            strs(rows, |r| r.user.as_ref().and_then(|u| u.name.as_deref())),
            strs(rows, |r| r.user.as_ref().and_then(|u| u.gender.as_deref())),
            i32s(rows, |r| r.user.as_ref().and_then(|u| u.age)),
            dates(rows, |r| r.user.as_ref().map(|u| u.signup_date)),
            strs(rows, |r| r.user.as_ref().and_then(|u| u.city.as_deref())),
            strs(rows, |r| r.ride.as_ref().map(|x| x.ride_id.as_str())),
            strs(rows, |r| r.captain_id()),
            dates(rows, |r| r.ride.as_ref().map(|x| x.ride_date)),
            strs(rows, |r| r.ride.as_ref().map(|x| x.pickup_loc.as_str())),
            strs(rows, |r| r.ride.as_ref().map(|x| x.drop_loc.as_str())),
            f64s(rows, |r| r.ride.as_ref().map(|x| x.distance_km)),
            f64s(rows, |r| r.ride.as_ref().map(|x| x.duration_min)),
            strs(rows, |r| r.ride.as_ref().map(|x| x.ride_status.as_str())),
            strs(rows, |r| r.payment.as_ref().map(|p| p.payment_id.as_str())),
            strs(rows, |r| r.payment.as_ref().and_then(|p| p.payment_method.as_deref())),
            f64s(rows, |r| r.payment.as_ref().map(|p| p.fare)),
            f64s(rows, |r| r.payment.as_ref().map(|p| p.discount_percent)),
            f64s(rows, |r| r.payment.as_ref().map(|p| p.discount_amount)),
            f64s(rows, |r| r.payment.as_ref().map(|p| p.final_amount)),
            strs(rows, |r| r.payment.as_ref().and_then(|p| p.payment_status.as_deref())),
            strs(rows, |r| r.feedback.as_ref().map(|f| f.feedback_id.as_str())),
            f64s(rows, |r| r.feedback.as_ref().map(|f| f.user_rating)),
            f64s(rows, |r| r.feedback.as_ref().map(|f| f.captain_rating)),
            strs(rows, |r| r.feedback.as_ref().map(|f| f.issue_category.as_str())),
            strs(rows, |r| r.feedback.as_ref().map(|f| f.comments.as_str())),
            strs(rows, |r| r.captain.as_ref().map(|c| c.name.as_str())),
            i32s(rows, |r| r.captain.as_ref().map(|c| c.age)),
            strs(rows, |r| r.captain.as_ref().map(|c| c.city.as_str())),
            f64s(rows, |r| r.captain.as_ref().map(|c| c.rating)),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), cols)?)
    }

    /// A part is present when its key column is set.
    fn from_batch(b: &RecordBatch) -> Result<Vec<Self>> {
        let user_id = utf8(b, "user_id")?;
        let user_name = utf8(b, "user_name")?;
        let gender = utf8(b, "gender")?;
        let user_age = int32(b, "user_age")?;
        let signup_date = date32(b, "signup_date")?;
        let user_city = utf8(b, "user_city")?;
        let ride_id = utf8(b, "ride_id")?;
        let captain_id = utf8(b, "captain_id")?;
        let ride_date = date32(b, "ride_date")?;
        let pickup = utf8(b, "pickup_loc")?;
        let drop = utf8(b, "drop_loc")?;
        let distance = float64(b, "distance_km")?;
        let duration = float64(b, "duration_min")?;
        let ride_status = utf8(b, "ride_status")?;
        let payment_id = utf8(b, "payment_id")?;
        let method = utf8(b, "payment_method")?;
        let fare = float64(b, "fare")?;
        let discount_percent = float64(b, "discount_percent")?;
        let discount_amount = float64(b, "discount_amount")?;
        let final_amount = float64(b, "final_amount")?;
        let payment_status = utf8(b, "payment_status")?;
        let feedback_id = utf8(b, "feedback_id")?;
        let user_rating = float64(b, "user_rating")?;
        let fb_captain_rating = float64(b, "feedback_captain_rating")?;
        let issue = utf8(b, "issue_category")?;
        let comments = utf8(b, "comments")?;
        let captain_name = utf8(b, "captain_name")?;
        let captain_age = int32(b, "captain_age")?;
        let captain_city = utf8(b, "captain_city")?;
        let captain_rating = float64(b, "captain_overall_rating")?;
        (0..b.num_rows())
            .map(|i| {
                let user = match opt_str(user_id, i) {
                    Some(id) => Some(CleanUser {
                        user_id: id,
                        name: opt_str(user_name, i),
                        gender: opt_str(gender, i),
                        age: opt_i32(user_age, i),
                        signup_date: date_from_days(signup_date.value(i))?,
                        city: opt_str(user_city, i),
                    }),
                    None => None,
                };
                let ride = match opt_str(ride_id, i) {
                    Some(id) => Some(CleanRide {
                        ride_id: id,
                        user_id: req_str(user_id, i, "user_id")?,
                        captain_id: req_str(captain_id, i, "captain_id")?,
                        ride_date: date_from_days(ride_date.value(i))?,
                        pickup_loc: req_str(pickup, i, "pickup_loc")?,
                        drop_loc: req_str(drop, i, "drop_loc")?,
                        distance_km: distance.value(i),
                        duration_min: duration.value(i),
                        ride_status: req_str(ride_status, i, "ride_status")?,
                    }),
                    None => None,
                };
                let payment = match opt_str(payment_id, i) {
                    Some(id) => Some(CleanPayment {
                        payment_id: id,
                        ride_id: req_str(ride_id, i, "ride_id")?,
                        payment_method: opt_str(method, i),
                        fare: fare.value(i),
                        discount_percent: discount_percent.value(i),
                        discount_amount: discount_amount.value(i),
                        final_amount: final_amount.value(i),
                        payment_status: opt_str(payment_status, i),
                    }),
                    None => None,
                };
                let feedback = match opt_str(feedback_id, i) {
                    Some(id) => Some(CleanFeedback {
                        feedback_id: id,
                        ride_id: req_str(ride_id, i, "ride_id")?,
                        user_rating: user_rating.value(i),
                        captain_rating: fb_captain_rating.value(i),
                        issue_category: req_str(issue, i, "issue_category")?,
                        comments: req_str(comments, i, "comments")?,
                    }),
                    None => None,
                };
                let captain = match opt_str(captain_name, i) {
                    Some(name) => Some(CleanCaptain {
                        captain_id: req_str(captain_id, i, "captain_id")?,
                        name,
                        age: captain_age.value(i),
                        city: req_str(captain_city, i, "captain_city")?,
                        rating: captain_rating.value(i),
                    }),
                    None => None,
                };
                Ok(DashboardRow {
                    user,
                    ride,
                    payment,
                    feedback,
                    captain,
                })
            })
            .collect()
    }
}

pub fn snapshot_dir(wh: &Warehouse, table: &str, snapshot_date: Date) -> PathBuf {
    wh.table_dir(Layer::Gold, table)
        .join(format!("snapshot_date={snapshot_date}"))
}

pub fn gold_manifests_dir(wh: &Warehouse) -> PathBuf {
    wh.manifests_dir().join("gold")
}

pub fn latest_path(wh: &Warehouse) -> PathBuf {
    latest_path_in(wh.layout())
}

/// `latest.json` of a warehouse that is not opened by this process.
pub fn latest_path_in(layout: &WarehouseLayout) -> PathBuf {
    layout
        .root
        .join(&layout.manifests_dir)
        .join("gold")
        .join("latest.json")
}

fn write_parquet<T: GoldRecord>(wh: &Warehouse, rows: &[T], snapshot_date: Date, props: &WriterProperties) -> Result<CommitFile> {
    let dir = snapshot_dir(wh, T::TABLE, snapshot_date);
    // a rerun on the same day replaces the snapshot
    if dir.exists() {
        remove_dir_all(&dir).with_context(|| format!("rm -r {}", dir.display()))?;
    }
    create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;

    let batch = T::to_batch(rows)?;
    let file_path = dir.join(GOLD_PART);
    let mut file = File::create(&file_path).with_context(|| format!("create {}", file_path.display()))?;
    let mut writer = ArrowWriter::try_new(&mut file, batch.schema(), Some(props.clone()))?;
    writer.write(&batch)?;
    writer.close()?;
    file.flush()?;

    tracing::info!(table = T::TABLE, rows = rows.len(), path = %file_path.display(), "gold table written");
    Ok(CommitFile {
        table: T::TABLE.to_string(),
        path: file_path.to_string_lossy().to_string(),
        rows: rows.len() as u64,
    })
}

fn write_json<S: Serialize>(path: &Path, value: &S) -> Result<()> {
    let mut out = File::create(path).with_context(|| format!("create {}", path.display()))?;
    out.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
    out.flush()?;
    Ok(())
}

pub fn write_gold_snapshot(wh: &Warehouse, gold: &GoldTables) -> Result<CurateStats> {
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
        .set_dictionary_enabled(true)
        .build();

    let files = vec![
        write_parquet(wh, &gold.users, gold.snapshot_date, &props)?,
        write_parquet(wh, &gold.captains, gold.snapshot_date, &props)?,
        write_parquet(wh, &gold.dashboard, gold.snapshot_date, &props)?,
    ];
    let rows_written = files.iter().map(|f| f.rows).sum();
    let run_id = wh.run().run_id.clone();

    let commit_dir = gold_manifests_dir(wh).join(format!("snapshot_date={}", gold.snapshot_date));
    create_dir_all(&commit_dir)?;
    let commit_path = commit_dir.join("commit.json");
    let files_written = files.len() as u32;
    write_json(
        &commit_path,
        &CommitJson {
            dataset: "gold".to_string(),
            snapshot_date: gold.snapshot_date.to_string(),
            run_id: run_id.clone(),
            files,
        },
    )?;

    // replace latest.json atomically
    let latest = latest_path(wh);
    let latest_tmp = latest.with_extension("json.tmp");
    write_json(
        &latest_tmp,
        &LatestJson {
            snapshot_date: gold.snapshot_date.to_string(),
            run_id,
        },
    )?;
    std::fs::rename(&latest_tmp, &latest)
        .with_context(|| format!("rename {} -> {}", latest_tmp.display(), latest.display()))?;

    Ok(CurateStats {
        files_written,
        rows_written,
        commit_path,
    })
}

pub fn read_latest(wh: &Warehouse) -> Result<LatestJson> {
    read_latest_in(wh.layout())
}

pub fn read_latest_in(layout: &WarehouseLayout) -> Result<LatestJson> {
    let path = latest_path_in(layout);
    let txt = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&txt).with_context(|| format!("parse {}", path.display()))
}

pub fn parse_snapshot_date(s: &str) -> Result<Date> {
    let fmt = format_description::parse("[year]-[month]-[day]")?;
    Date::parse(s.trim(), &fmt).with_context(|| format!("invalid snapshot date: {s}"))
}

fn read_parquet<T: GoldRecord>(wh: &Warehouse, snapshot_date: Date) -> Result<Vec<T>> {
    let path = snapshot_dir(wh, T::TABLE, snapshot_date).join(GOLD_PART);
    let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.with_context(|| format!("read {}", path.display()))?;
        out.extend(T::from_batch(&batch)?);
    }
    Ok(out)
}

/// Loads a gold snapshot; the one named by `latest.json` when no date is given.
pub fn read_gold(wh: &Warehouse, snapshot_date: Option<Date>) -> Result<GoldTables> {
    let snapshot_date = match snapshot_date {
        Some(d) => d,
        None => parse_snapshot_date(&read_latest(wh)?.snapshot_date)?,
    };
    Ok(GoldTables {
        snapshot_date,
        users: read_parquet(wh, snapshot_date)?,
        captains: read_parquet(wh, snapshot_date)?,
        dashboard: read_parquet(wh, snapshot_date)?,
    })
}
