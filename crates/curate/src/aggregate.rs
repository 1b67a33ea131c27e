//! Per-user and per-captain aggregate rows computed from the silver layer.

use std::collections::HashMap;

use time::Date;
use validate::impute::mode;
use validate::{CleanFeedback, CleanRide, SilverTables};
use warehouse::columns::days_before;

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const CAPTAIN_ACTIVE: &str = "active";
pub const CAPTAIN_INACTIVE: &str = "inactive";

/// A typed value of a named aggregate column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Number(Option<f64>),
    Text(Option<&'a str>),
}

/// An aggregate row whose columns can be looked up by name.
pub trait AggregateRow {
    /// `None` when the row type has no such column.
    fn cell(&self, column: &str) -> Option<Cell<'_>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserAggregate {
    pub user_id: String,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub signup_date: Date,
    pub first_ride_date: Option<Date>,
    pub last_ride_date: Option<Date>,
    pub total_rides: i64,
    pub total_revenue: f64,
    pub avg_revenue_per_ride: Option<f64>,
    /// Rides inside the activity window ending at the snapshot date.
    pub booking_frequency: i64,
    pub is_active: i32,
    pub avg_captain_rating: Option<f64>,
    pub rated_feedback_count: i64,
    pub most_frequent_issue: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptainAggregate {
    pub captain_id: String,
    pub name: String,
    pub age: i32,
    pub city: String,
    pub average_rating: f64,
    pub total_rides: i64,
    pub completed_rides: i64,
    pub cancelled_rides: i64,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
    pub total_final_amount: f64,
    pub avg_captain_rating: Option<f64>,
    pub avg_user_rating: Option<f64>,
    pub status: String,
    pub most_frequent_issue: Option<String>,
    pub most_frequent_comment: Option<String>,
}

fn num(v: f64) -> Option<Cell<'static>> {
    Some(Cell::Number(Some(v)))
}

impl AggregateRow for UserAggregate {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            "user_id" => Some(Cell::Text(Some(self.user_id.as_str()))),
            "name" => Some(Cell::Text(self.name.as_deref())),
            "gender" => Some(Cell::Text(self.gender.as_deref())),
            "city" => Some(Cell::Text(self.city.as_deref())),
            "age" => Some(Cell::Number(self.age.map(f64::from))),
            "total_rides" => num(self.total_rides as f64),
            "total_revenue" => num(self.total_revenue),
            "avg_revenue_per_ride" => Some(Cell::Number(self.avg_revenue_per_ride)),
            "booking_frequency" => num(self.booking_frequency as f64),
            "is_active" => num(f64::from(self.is_active)),
            "avg_captain_rating" => Some(Cell::Number(self.avg_captain_rating)),
            "rated_feedback_count" => num(self.rated_feedback_count as f64),
            "most_frequent_issue" => Some(Cell::Text(self.most_frequent_issue.as_deref())),
            _ => None,
        }
    }
}

impl AggregateRow for CaptainAggregate {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            "captain_id" => Some(Cell::Text(Some(self.captain_id.as_str()))),
            "name" => Some(Cell::Text(Some(self.name.as_str()))),
            "city" => Some(Cell::Text(Some(self.city.as_str()))),
            "age" => num(f64::from(self.age)),
            "average_rating" => num(self.average_rating),
            "total_rides" => num(self.total_rides as f64),
            "completed_rides" => num(self.completed_rides as f64),
            "cancelled_rides" => num(self.cancelled_rides as f64),
            "total_distance_km" => num(self.total_distance_km),
            "total_duration_min" => num(self.total_duration_min),
            "total_final_amount" => num(self.total_final_amount),
            "avg_captain_rating" => Some(Cell::Number(self.avg_captain_rating)),
            "avg_user_rating" => Some(Cell::Number(self.avg_user_rating)),
            "status" => Some(Cell::Text(Some(self.status.as_str()))),
            "most_frequent_issue" => Some(Cell::Text(self.most_frequent_issue.as_deref())),
            "most_frequent_comment" => Some(Cell::Text(self.most_frequent_comment.as_deref())),
            _ => None,
        }
    }
}

pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Ratings of zero mean "not rated".
fn rated(v: f64) -> Option<f64> {
    (v != 0.0).then_some(v)
}

pub fn is_terminal_status(status: &str) -> bool {
    status == STATUS_COMPLETED || status == STATUS_CANCELLED
}

/// Lookups shared by both aggregates.
struct RideIndex<'a> {
    revenue_by_ride: HashMap<&'a str, f64>,
    feedback_by_ride: HashMap<&'a str, Vec<&'a CleanFeedback>>,
}

impl<'a> RideIndex<'a> {
    fn new(silver: &'a SilverTables) -> Self {
        let mut revenue_by_ride: HashMap<&str, f64> = HashMap::new();
        for p in &silver.payments {
            *revenue_by_ride.entry(p.ride_id.as_str()).or_insert(0.0) += p.final_amount;
        }
        let mut feedback_by_ride: HashMap<&str, Vec<&CleanFeedback>> = HashMap::new();
        for f in &silver.feedback {
            feedback_by_ride.entry(f.ride_id.as_str()).or_default().push(f);
        }
        Self {
            revenue_by_ride,
            feedback_by_ride,
        }
    }

    fn revenue(&self, rides: &[&CleanRide]) -> f64 {
        rides
            .iter()
            .map(|r| self.revenue_by_ride.get(r.ride_id.as_str()).copied().unwrap_or(0.0))
            .sum()
    }

    fn feedback(&self, rides: &[&'a CleanRide]) -> Vec<&'a CleanFeedback> {
        rides
            .iter()
            .flat_map(|r| {
                self.feedback_by_ride
                    .get(r.ride_id.as_str())
                    .into_iter()
                    .flatten()
                    .copied()
            })
            .collect()
    }
}

fn rides_by<'a>(rides: &'a [CleanRide], key: impl Fn(&CleanRide) -> &str) -> HashMap<String, Vec<&'a CleanRide>> {
    let mut out: HashMap<String, Vec<&CleanRide>> = HashMap::new();
    for r in rides {
        out.entry(key(r).to_string()).or_default().push(r);
    }
    out
}

pub fn build_user_aggregates(silver: &SilverTables, as_of: Date, window_days: i64) -> Vec<UserAggregate> {
    let index = RideIndex::new(silver);
    let by_user = rides_by(&silver.rides, |r| r.user_id.as_str());
    let window_start = days_before(as_of, window_days);

    silver
        .users
        .iter()
        .map(|u| {
            let rides: &[&CleanRide] = by_user.get(&u.user_id).map(Vec::as_slice).unwrap_or(&[]);
            let feedback = index.feedback(rides);
            let total_rides = rides.len() as i64;
            let total_revenue = index.revenue(rides);
            let captain_ratings: Vec<f64> = feedback.iter().filter_map(|f| rated(f.captain_rating)).collect();

            UserAggregate {
                user_id: u.user_id.clone(),
                name: u.name.clone(),
                age: u.age,
                gender: u.gender.clone(),
                city: u.city.clone(),
                signup_date: u.signup_date,
                first_ride_date: rides.iter().map(|r| r.ride_date).min(),
                last_ride_date: rides.iter().map(|r| r.ride_date).max(),
                total_rides,
                total_revenue,
                avg_revenue_per_ride: (total_rides > 0).then(|| total_revenue / total_rides as f64),
                booking_frequency: rides.iter().filter(|r| r.ride_date >= window_start).count() as i64,
                is_active: i32::from(rides.iter().any(|r| is_terminal_status(&r.ride_status))),
                avg_captain_rating: mean(captain_ratings.iter().copied()),
                rated_feedback_count: captain_ratings.len() as i64,
                most_frequent_issue: mode(feedback.iter().map(|f| f.issue_category.as_str())),
            }
        })
        .collect()
}

pub fn build_captain_aggregates(silver: &SilverTables) -> Vec<CaptainAggregate> {
    let index = RideIndex::new(silver);
    let by_captain = rides_by(&silver.rides, |r| r.captain_id.as_str());

    silver
        .captains
        .iter()
        .map(|c| {
            let rides: &[&CleanRide] = by_captain.get(&c.captain_id).map(Vec::as_slice).unwrap_or(&[]);
            let feedback = index.feedback(rides);
            let count_status = |s: &str| rides.iter().filter(|r| r.ride_status == s).count() as i64;
            let active = rides.iter().any(|r| is_terminal_status(&r.ride_status));

            CaptainAggregate {
                captain_id: c.captain_id.clone(),
                name: c.name.clone(),
                age: c.age,
                city: c.city.clone(),
                average_rating: c.rating,
                total_rides: rides.len() as i64,
                completed_rides: count_status(STATUS_COMPLETED),
                cancelled_rides: count_status(STATUS_CANCELLED),
                total_distance_km: rides.iter().map(|r| r.distance_km).sum(),
                total_duration_min: rides.iter().map(|r| r.duration_min).sum(),
                total_final_amount: index.revenue(rides),
                avg_captain_rating: mean(feedback.iter().filter_map(|f| rated(f.captain_rating))),
                avg_user_rating: mean(feedback.iter().filter_map(|f| rated(f.user_rating))),
                status: if active { CAPTAIN_ACTIVE } else { CAPTAIN_INACTIVE }.to_string(),
                most_frequent_issue: mode(feedback.iter().map(|f| f.issue_category.as_str())),
                most_frequent_comment: mode(feedback.iter().map(|f| f.comments.as_str())),
            }
        })
        .collect()
}
