//! The two independent sides of a reconciliation: row-level joins over the
//! silver record sets, and summaries of a persisted gold table.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{anyhow, Result};
use curate::aggregate::{is_terminal_status, mean, STATUS_CANCELLED, STATUS_COMPLETED};
use curate::{AggregateRow, Cell};
use time::Date;
use validate::impute::mode;
use validate::{CleanFeedback, CleanRide, SilverTables};
use warehouse::columns::days_before;

use crate::metric::MetricValue;

/// Runs one aggregate query and returns its single value.
pub trait QueryRunner {
    type Query;

    fn run_aggregate_query(&self, query: &Self::Query) -> Result<MetricValue>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilverQuery {
    CountUsers,
    CountCaptains,
    CountRides,
    CountRidesWithStatus(&'static str),
    /// Rides dated inside the activity window ending at `as_of`.
    CountRidesInWindow,
    /// Distinct users with a completed or cancelled ride.
    ActiveUsers,
    ActiveCaptains,
    TotalRevenue,
    AvgRevenuePerRide,
    TotalDistanceKm,
    TotalDurationMin,
    /// Mean of non-zero captain ratings over all ride feedback.
    AvgCaptainRating,
    /// Per-captain mean of non-zero user ratings, averaged over captains.
    AvgUserRatingPerCaptain,
    MostFrequentIssue,
}

pub struct SilverSource<'a> {
    silver: &'a SilverTables,
    as_of: Date,
    activity_window_days: i64,
}

impl<'a> SilverSource<'a> {
    pub fn new(silver: &'a SilverTables, as_of: Date, activity_window_days: i64) -> Self {
        Self {
            silver,
            as_of,
            activity_window_days,
        }
    }

    fn rides(&self) -> HashMap<&'a str, &'a CleanRide> {
        self.silver
            .rides
            .iter()
            .map(|r| (r.ride_id.as_str(), r))
            .collect()
    }

    /// Feedback joined to its ride.
    fn ride_feedback(&self) -> Vec<(&'a CleanRide, &'a CleanFeedback)> {
        let rides = self.rides();
        self.silver
            .feedback
            .iter()
            .filter_map(|f| rides.get(f.ride_id.as_str()).map(|r| (*r, f)))
            .collect()
    }

    /// Sum of payment amounts over rides; rides without payments add 0.
    fn total_revenue(&self) -> f64 {
        let rides = self.rides();
        self.silver
            .payments
            .iter()
            .filter(|p| rides.contains_key(p.ride_id.as_str()))
            .map(|p| p.final_amount)
            .sum()
    }

    fn distinct_active<F: Fn(&CleanRide) -> &str>(&self, key: F) -> usize {
        self.silver
            .rides
            .iter()
            .filter(|r| is_terminal_status(&r.ride_status))
            .map(key)
            .collect::<HashSet<_>>()
            .len()
    }
}

fn count(n: usize) -> MetricValue {
    MetricValue::Number(n as f64)
}

impl QueryRunner for SilverSource<'_> {
    type Query = SilverQuery;

    fn run_aggregate_query(&self, query: &SilverQuery) -> Result<MetricValue> {
        let s = self.silver;
        Ok(match *query {
            SilverQuery::CountUsers => count(s.users.len()),
            SilverQuery::CountCaptains => count(s.captains.len()),
            SilverQuery::CountRides => count(s.rides.len()),
            SilverQuery::CountRidesWithStatus(status) => {
                count(s.rides.iter().filter(|r| r.ride_status == status).count())
            }
            SilverQuery::CountRidesInWindow => {
                let start = days_before(self.as_of, self.activity_window_days);
                count(s.rides.iter().filter(|r| r.ride_date >= start).count())
            }
            SilverQuery::ActiveUsers => count(self.distinct_active(|r| r.user_id.as_str())),
            SilverQuery::ActiveCaptains => count(self.distinct_active(|r| r.captain_id.as_str())),
            SilverQuery::TotalRevenue => MetricValue::Number(self.total_revenue()),
            SilverQuery::AvgRevenuePerRide => {
                let n = s.rides.len();
                MetricValue::from_opt((n > 0).then(|| self.total_revenue() / n as f64))
            }
            SilverQuery::TotalDistanceKm => MetricValue::Number(s.rides.iter().map(|r| r.distance_km).sum()),
            SilverQuery::TotalDurationMin => MetricValue::Number(s.rides.iter().map(|r| r.duration_min).sum()),
            SilverQuery::AvgCaptainRating => MetricValue::from_opt(mean(
                self.ride_feedback()
                    .into_iter()
                    .map(|(_, f)| f.captain_rating)
                    .filter(|v| *v != 0.0),
            )),
            SilverQuery::AvgUserRatingPerCaptain => {
                let mut per_captain: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
                for (r, f) in self.ride_feedback() {
                    if f.user_rating != 0.0 {
                        per_captain.entry(r.captain_id.as_str()).or_default().push(f.user_rating);
                    }
                }
                MetricValue::from_opt(mean(
                    per_captain.values().filter_map(|v| mean(v.iter().copied())),
                ))
            }
            SilverQuery::MostFrequentIssue => MetricValue::from_text(mode(
                self.ride_feedback()
                    .into_iter()
                    .map(|(_, f)| f.issue_category.as_str()),
            )),
        })
    }
}

pub const COMPLETED: &str = STATUS_COMPLETED;
pub const CANCELLED: &str = STATUS_CANCELLED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoldQuery {
    CountRows,
    Sum(&'static str),
    /// Mean over rows where the column is present.
    Mean(&'static str),
    /// `SUM(value * weight) / SUM(weight)`, the global mean behind a column
    /// of per-row means.
    WeightedMean {
        value: &'static str,
        weight: &'static str,
    },
    CountEq(&'static str, &'static str),
    Mode(&'static str),
}

/// Summaries over a persisted aggregate table.
pub struct GoldSource<'a, T> {
    rows: &'a [T],
}

impl<'a, T: AggregateRow> GoldSource<'a, T> {
    pub fn new(rows: &'a [T]) -> Self {
        Self { rows }
    }

    fn numbers(&self, column: &str) -> Result<Vec<Option<f64>>> {
        self.rows
            .iter()
            .map(|r| match r.cell(column) {
                Some(Cell::Number(v)) => Ok(v),
                Some(Cell::Text(_)) => Err(anyhow!("column {column} is not numeric")),
                None => Err(anyhow!("unknown aggregate column: {column}")),
            })
            .collect()
    }

    fn texts(&self, column: &str) -> Result<Vec<Option<&'a str>>> {
        self.rows
            .iter()
            .map(|r| match r.cell(column) {
                Some(Cell::Text(v)) => Ok(v),
                Some(Cell::Number(_)) => Err(anyhow!("column {column} is not text")),
                None => Err(anyhow!("unknown aggregate column: {column}")),
            })
            .collect()
    }
}

impl<T: AggregateRow> QueryRunner for GoldSource<'_, T> {
    type Query = GoldQuery;

    fn run_aggregate_query(&self, query: &GoldQuery) -> Result<MetricValue> {
        Ok(match *query {
            GoldQuery::CountRows => count(self.rows.len()),
            GoldQuery::Sum(col) => MetricValue::Number(self.numbers(col)?.into_iter().flatten().sum()),
            GoldQuery::Mean(col) => MetricValue::from_opt(mean(self.numbers(col)?.into_iter().flatten())),
            GoldQuery::WeightedMean { value, weight } => {
                let (mut num, mut den) = (0.0, 0.0);
                for (v, w) in self.numbers(value)?.into_iter().zip(self.numbers(weight)?) {
                    if let (Some(v), Some(w)) = (v, w) {
                        num += v * w;
                        den += w;
                    }
                }
                MetricValue::from_opt((den != 0.0).then(|| num / den))
            }
            GoldQuery::CountEq(col, expected) => {
                count(self.texts(col)?.into_iter().filter(|v| *v == Some(expected)).count())
            }
            GoldQuery::Mode(col) => MetricValue::from_text(mode(self.texts(col)?.into_iter().flatten())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curate::UserAggregate;
    use time::Month;

    fn agg(id: &str, rides: i64, avg: Option<f64>, issue: Option<&str>) -> UserAggregate {
        UserAggregate {
            user_id: id.into(),
            name: None,
            age: None,
            gender: None,
            city: None,
            signup_date: Date::from_calendar_date(2024, Month::January, 1).unwrap(),
            first_ride_date: None,
            last_ride_date: None,
            total_rides: rides,
            total_revenue: avg.unwrap_or(0.0) * rides as f64,
            avg_revenue_per_ride: avg,
            booking_frequency: 0,
            is_active: i32::from(rides > 0),
            avg_captain_rating: None,
            rated_feedback_count: 0,
            most_frequent_issue: issue.map(str::to_string),
        }
    }

    #[test]
    fn weighted_mean_is_not_a_mean_of_means() {
        let rows = vec![agg("U1", 1, Some(100.0), None), agg("U2", 3, Some(20.0), None), agg("U3", 0, None, None)];
        let gold = GoldSource::new(&rows);
        let weighted = gold
            .run_aggregate_query(&GoldQuery::WeightedMean {
                value: "avg_revenue_per_ride",
                weight: "total_rides",
            })
            .unwrap();
        assert_eq!(weighted, MetricValue::Number(40.0));
        assert_eq!(
            gold.run_aggregate_query(&GoldQuery::Mean("avg_revenue_per_ride")).unwrap(),
            MetricValue::Number(60.0)
        );
    }

    #[test]
    fn sums_counts_and_modes() {
        let rows = vec![
            agg("U1", 2, Some(1.0), Some("billing")),
            agg("U2", 3, Some(1.0), Some("late")),
            agg("U3", 0, None, None),
        ];
        let gold = GoldSource::new(&rows);
        let q = |q| gold.run_aggregate_query(&q).unwrap();
        assert_eq!(q(GoldQuery::CountRows), MetricValue::Number(3.0));
        assert_eq!(q(GoldQuery::Sum("total_rides")), MetricValue::Number(5.0));
        assert_eq!(q(GoldQuery::Sum("is_active")), MetricValue::Number(2.0));
        assert_eq!(q(GoldQuery::CountEq("most_frequent_issue", "late")), MetricValue::Number(1.0));
        assert_eq!(q(GoldQuery::Mode("most_frequent_issue")), MetricValue::Text("billing".into()));
        assert_eq!(q(GoldQuery::Mean("avg_captain_rating")), MetricValue::Null);
    }

    #[test]
    fn unknown_or_mistyped_columns_are_errors() {
        let rows = vec![agg("U1", 1, None, None)];
        let gold = GoldSource::new(&rows);
        assert!(gold.run_aggregate_query(&GoldQuery::Sum("nope")).is_err());
        assert!(gold.run_aggregate_query(&GoldQuery::Sum("user_id")).is_err());
        assert!(gold.run_aggregate_query(&GoldQuery::Mode("total_rides")).is_err());
    }

    #[test]
    fn empty_tables_give_zero_counts_and_null_means() {
        let silver = SilverTables::default();
        let src = SilverSource::new(&silver, Date::from_calendar_date(2024, Month::January, 1).unwrap(), 30);
        assert_eq!(src.run_aggregate_query(&SilverQuery::CountRides).unwrap(), MetricValue::Number(0.0));
        assert_eq!(src.run_aggregate_query(&SilverQuery::TotalRevenue).unwrap(), MetricValue::Number(0.0));
        assert_eq!(src.run_aggregate_query(&SilverQuery::AvgRevenuePerRide).unwrap(), MetricValue::Null);
        assert_eq!(src.run_aggregate_query(&SilverQuery::MostFrequentIssue).unwrap(), MetricValue::Null);
    }
}
