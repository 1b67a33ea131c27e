//! Numeric coercion and the fill values used for missing data.

use std::collections::BTreeMap;

/// Sign/range constraint of a numeric column. Values outside it are treated
/// as missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    Any,
    Positive,
    NonNegative,
    Between(f64, f64),
}

impl Bounds {
    pub fn admits(self, v: f64) -> bool {
        match self {
            Bounds::Any => true,
            Bounds::Positive => v > 0.0,
            Bounds::NonNegative => v >= 0.0,
            Bounds::Between(lo, hi) => (lo..=hi).contains(&v),
        }
    }
}

pub const RATING: Bounds = Bounds::Between(0.0, 5.0);
pub const PERCENT: Bounds = Bounds::Between(0.0, 100.0);

/// Parses numeric text. Unparseable, non-finite or out-of-bounds input
/// yields `None`.
pub fn parse_number(text: Option<&str>, bounds: Bounds) -> Option<f64> {
    text.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && bounds.admits(*v))
}

pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut v: Vec<f64> = values.into_iter().collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Median of the present values, `0.0` when there are none.
pub fn median_fill<'a, I: IntoIterator<Item = &'a Option<f64>>>(values: I) -> f64 {
    median(values.into_iter().flatten().copied()).unwrap_or(0.0)
}

/// Most frequent value. Ties go to the lexicographically smallest value.
pub fn mode<'a, I: IntoIterator<Item = &'a str>>(values: I) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (v, n) in counts {
        if best.map_or(true, |(_, m)| n > m) {
            best = Some((v, n));
        }
    }
    best.map(|(v, _)| v.to_string())
}

/// Rounds to one decimal, ties to even.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round_ties_even() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_failures_and_out_of_range_are_missing() {
        assert_eq!(parse_number(Some(" 4.5 "), RATING), Some(4.5));
        assert_eq!(parse_number(Some("abc"), Bounds::Any), None);
        assert_eq!(parse_number(Some("NaN"), Bounds::Any), None);
        assert_eq!(parse_number(Some("7"), RATING), None);
        assert_eq!(parse_number(Some("0"), Bounds::Positive), None);
        assert_eq!(parse_number(Some("-1"), Bounds::NonNegative), None);
        assert_eq!(parse_number(None, Bounds::Any), None);
    }

    #[test]
    fn median_of_even_and_odd_sets() {
        assert_eq!(median([4.5, 3.0]), Some(3.75));
        assert_eq!(median([5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(Vec::<f64>::new()), None);
        assert_eq!(median_fill(&[None, None]), 0.0);
        assert_eq!(median_fill(&[Some(2.0), None, Some(4.0)]), 3.0);
    }

    #[test]
    fn mode_breaks_ties_lexicographically() {
        assert_eq!(mode(["b", "a", "b"]), Some("b".to_string()));
        assert_eq!(mode(["completed", "cancelled"]), Some("cancelled".to_string()));
        assert_eq!(mode(std::iter::empty::<&str>()), None);
    }

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(round1(3.75), 3.8);
        assert_eq!(round1(4.25), 4.2);
        assert_eq!(round1(4.35), 4.4);
        assert_eq!(round1(4.04), 4.0);
    }
}
