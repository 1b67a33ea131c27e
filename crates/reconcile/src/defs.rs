//! Fixed, ordered metric lists for the user and captain aggregates.

use crate::source::{GoldQuery, SilverQuery, CANCELLED, COMPLETED};

/// A metric computed two ways that must agree.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDef<A, B> {
    pub name: &'static str,
    pub source_a: A,
    pub source_b: B,
}

pub type AggregateMetric = MetricDef<SilverQuery, GoldQuery>;

const fn metric(name: &'static str, source_a: SilverQuery, source_b: GoldQuery) -> AggregateMetric {
    MetricDef {
        name,
        source_a,
        source_b,
    }
}

pub fn user_metrics() -> Vec<AggregateMetric> {
    vec![
        metric("total_users", SilverQuery::CountUsers, GoldQuery::CountRows),
        metric("total_rides", SilverQuery::CountRides, GoldQuery::Sum("total_rides")),
        metric("total_revenue", SilverQuery::TotalRevenue, GoldQuery::Sum("total_revenue")),
        metric(
            "avg_revenue_per_ride",
            SilverQuery::AvgRevenuePerRide,
            GoldQuery::WeightedMean {
                value: "avg_revenue_per_ride",
                weight: "total_rides",
            },
        ),
        metric(
            "booking_frequency",
            SilverQuery::CountRidesInWindow,
            GoldQuery::Sum("booking_frequency"),
        ),
        metric("is_active", SilverQuery::ActiveUsers, GoldQuery::Sum("is_active")),
        metric(
            "avg_captain_rating",
            SilverQuery::AvgCaptainRating,
            GoldQuery::WeightedMean {
                value: "avg_captain_rating",
                weight: "rated_feedback_count",
            },
        ),
        metric(
            "most_frequent_issue",
            SilverQuery::MostFrequentIssue,
            GoldQuery::Mode("most_frequent_issue"),
        ),
    ]
}

pub fn captain_metrics() -> Vec<AggregateMetric> {
    vec![
        metric("total_captains", SilverQuery::CountCaptains, GoldQuery::CountRows),
        metric("total_rides_sum", SilverQuery::CountRides, GoldQuery::Sum("total_rides")),
        metric(
            "completed_rides_sum",
            SilverQuery::CountRidesWithStatus(COMPLETED),
            GoldQuery::Sum("completed_rides"),
        ),
        metric(
            "cancelled_rides_sum",
            SilverQuery::CountRidesWithStatus(CANCELLED),
            GoldQuery::Sum("cancelled_rides"),
        ),
        metric(
            "active_captains",
            SilverQuery::ActiveCaptains,
            GoldQuery::CountEq("status", curate::aggregate::CAPTAIN_ACTIVE),
        ),
        metric(
            "total_distance_km_sum",
            SilverQuery::TotalDistanceKm,
            GoldQuery::Sum("total_distance_km"),
        ),
        metric(
            "total_duration_min_sum",
            SilverQuery::TotalDurationMin,
            GoldQuery::Sum("total_duration_min"),
        ),
        metric(
            "total_final_amount_sum",
            SilverQuery::TotalRevenue,
            GoldQuery::Sum("total_final_amount"),
        ),
        metric(
            "avg_user_rating_avg",
            SilverQuery::AvgUserRatingPerCaptain,
            GoldQuery::Mean("avg_user_rating"),
        ),
        metric(
            "most_frequent_issue",
            SilverQuery::MostFrequentIssue,
            GoldQuery::Mode("most_frequent_issue"),
        ),
    ]
}
