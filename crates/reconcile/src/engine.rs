use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::defs::MetricDef;
use crate::metric::{compare, MetricValue, Status};
use crate::source::QueryRunner;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub entity: String,
    pub metric: String,
    pub source_a: MetricValue,
    pub source_b: MetricValue,
    pub difference: Option<f64>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    /// RFC 3339.
    pub generated_at: String,
    pub tolerance: f64,
    pub metrics: Vec<MetricResult>,
}

impl ReconciliationReport {
    pub fn mismatches(&self) -> impl Iterator<Item = &MetricResult> {
        self.metrics.iter().filter(|m| m.status == Status::Mismatch)
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches().next().is_none()
    }
}

/// Evaluates every metric on both sources, in definition order.
pub fn reconcile<A, B>(
    entity: &str,
    defs: &[MetricDef<A::Query, B::Query>],
    source_a: &A,
    source_b: &B,
    tolerance: f64,
) -> Result<Vec<MetricResult>>
where
    A: QueryRunner,
    B: QueryRunner,
{
    let mut out = Vec::with_capacity(defs.len());
    for def in defs {
        let a = source_a
            .run_aggregate_query(&def.source_a)
            .with_context(|| format!("{entity}.{}: source A", def.name))?;
        let b = source_b
            .run_aggregate_query(&def.source_b)
            .with_context(|| format!("{entity}.{}: source B", def.name))?;
        let (difference, status) = compare(&a, &b, tolerance);
        if status == Status::Mismatch {
            tracing::warn!(entity, metric = def.name, silver = %a, gold = %b, ?difference, "reconciliation mismatch");
        }
        out.push(MetricResult {
            entity: entity.to_string(),
            metric: def.name.to_string(),
            source_a: a,
            source_b: b,
            difference,
            status,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers queries from a fixed table.
    struct Fixed(HashMap<&'static str, MetricValue>);

    impl QueryRunner for Fixed {
        type Query = &'static str;

        fn run_aggregate_query(&self, query: &&'static str) -> Result<MetricValue> {
            self.0
                .get(query)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no value for {query}"))
        }
    }

    fn def(name: &'static str) -> MetricDef<&'static str, &'static str> {
        MetricDef {
            name,
            source_a: name,
            source_b: name,
        }
    }

    #[test]
    fn rounding_noise_is_ok_and_a_whole_ride_is_not() {
        let a = Fixed(HashMap::from([
            ("total_rides", MetricValue::Number(1000.0)),
            ("total_revenue", MetricValue::Number(1000.0)),
        ]));
        let b = Fixed(HashMap::from([
            ("total_rides", MetricValue::Number(999.995)),
            ("total_revenue", MetricValue::Number(999.0)),
        ]));
        let out = reconcile("users", &[def("total_rides"), def("total_revenue")], &a, &b, 0.01).unwrap();
        assert_eq!(out[0].status, Status::Ok);
        assert_eq!(out[1].status, Status::Mismatch);
        assert_eq!(out[1].difference, Some(1.0));
    }

    #[test]
    fn identical_sources_agree_exactly() {
        let src = Fixed(HashMap::from([
            ("total_revenue", MetricValue::Number(1234.56)),
            ("most_frequent_issue", MetricValue::Text("late".into())),
            ("avg_captain_rating", MetricValue::Null),
        ]));
        let defs = [def("total_revenue"), def("most_frequent_issue"), def("avg_captain_rating")];
        let out = reconcile("users", &defs, &src, &src, 0.01).unwrap();
        assert!(out.iter().all(|m| m.status == Status::Ok));
        assert_eq!(out[0].difference, Some(0.0));
        assert_eq!(out[1].difference, None);
    }

    #[test]
    fn report_surfaces_mismatches() {
        let a = Fixed(HashMap::from([("m", MetricValue::Text("billing".into()))]));
        let b = Fixed(HashMap::from([("m", MetricValue::Null)]));
        let metrics = reconcile("captains", &[def("m")], &a, &b, 0.01).unwrap();
        let report = ReconciliationReport {
            run_id: "r".into(),
            generated_at: "1970-01-01T00:00:00Z".into(),
            tolerance: 0.01,
            metrics,
        };
        assert!(!report.is_clean());
        assert_eq!(report.mismatches().count(), 1);
    }

    #[test]
    fn query_failure_names_the_metric() {
        let a = Fixed(HashMap::new());
        let err = reconcile("users", &[def("total_users")], &a, &a, 0.01).unwrap_err();
        assert!(format!("{err:#}").contains("users.total_users: source A"));
    }
}
