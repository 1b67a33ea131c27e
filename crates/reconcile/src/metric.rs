use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of one aggregate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Null,
}

impl MetricValue {
    pub fn from_opt(v: Option<f64>) -> Self {
        v.map_or(MetricValue::Null, MetricValue::Number)
    }

    pub fn from_text(v: Option<String>) -> Self {
        v.map_or(MetricValue::Null, MetricValue::Text)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::Null => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Mismatch,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::Mismatch => "MISMATCH",
        })
    }
}

/// Two numbers match when their absolute difference is below `tolerance`.
/// Anything else must be equal; a number never matches a null.
pub fn compare(a: &MetricValue, b: &MetricValue, tolerance: f64) -> (Option<f64>, Status) {
    match (a, b) {
        (MetricValue::Number(x), MetricValue::Number(y)) => {
            let diff = x - y;
            let status = if diff.abs() < tolerance {
                Status::Ok
            } else {
                Status::Mismatch
            };
            (Some(diff), status)
        }
        _ if a == b => (None, Status::Ok),
        _ => (None, Status::Mismatch),
    }
}
