//! Heuristic occupancy forecast used when no history is available.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::domain::error::ForecastError;
use crate::domain::series::ForecastPoint;

pub const BASE_OCCUPANCY: f64 = 0.5;
pub const WEEKEND_FACTOR: f64 = 1.2;
pub const BOUND_MARGIN: f64 = 0.1;
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Seasonal multiplier indexed by `month0` (January = 0).
const MONTHLY_FACTORS: [f64; 12] = [
    0.85, 0.90, 0.95, 1.05, 1.15, 1.30, 1.35, 1.35, 1.20, 1.10, 0.95, 1.00,
];

pub fn seasonal_factor(date: NaiveDate) -> f64 {
    MONTHLY_FACTORS[date.month0() as usize]
}

pub fn weekend_factor(date: NaiveDate) -> f64 {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => WEEKEND_FACTOR,
        _ => 1.0,
    }
}

/// Single fallback point for `date`.
pub fn fallback_point(date: NaiveDate) -> ForecastPoint {
    let predicted = (BASE_OCCUPANCY * seasonal_factor(date) * weekend_factor(date)).clamp(0.0, 1.0);
    ForecastPoint {
        timestamp: date,
        predicted_value: predicted,
        lower_bound: Some((predicted - BOUND_MARGIN).clamp(0.0, 1.0)),
        upper_bound: Some((predicted + BOUND_MARGIN).clamp(0.0, 1.0)),
        confidence: FALLBACK_CONFIDENCE,
    }
}

/// One point per calendar day from `start` to `end` inclusive.
pub fn fallback_forecast(start: NaiveDate, end: NaiveDate) -> Result<Vec<ForecastPoint>, ForecastError> {
    if end < start {
        return Err(ForecastError::validation(format!(
            "endDate {end} is before startDate {start}"
        )));
    }
    Ok(start.iter_days().take_while(|d| *d <= end).map(fallback_point).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn july_saturday() {
        let p = fallback_point(date(2024, 7, 6));
        assert_relative_eq!(p.predicted_value, 0.81, epsilon = 1e-12);
        assert_relative_eq!(p.lower_bound.unwrap(), 0.71, epsilon = 1e-12);
        assert_relative_eq!(p.upper_bound.unwrap(), 0.91, epsilon = 1e-12);
        assert_eq!(p.confidence, 0.5);
    }

    #[test]
    fn january_weekday() {
        // 2024-01-03 is a Wednesday
        let p = fallback_point(date(2024, 1, 3));
        assert_relative_eq!(p.predicted_value, 0.425, epsilon = 1e-12);
    }

    #[test]
    fn single_day_range() {
        let d = date(2024, 3, 15);
        let points = fallback_forecast(d, d).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, d);
    }

    #[test]
    fn spans_month_boundary() {
        let points = fallback_forecast(date(2024, 6, 29), date(2024, 7, 2)).unwrap();
        assert_eq!(points.len(), 4);
        // June factor then July factor on weekdays
        assert_relative_eq!(points[2].predicted_value, 0.5 * 1.35, epsilon = 1e-12);
        assert_relative_eq!(points[3].predicted_value, 0.5 * 1.35, epsilon = 1e-12);
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(matches!(
            fallback_forecast(date(2024, 2, 2), date(2024, 2, 1)),
            Err(ForecastError::Validation { .. })
        ));
    }

    proptest! {
        #[test]
        fn one_bracketed_point_per_day(offset in 0i64..3000, span in 0i64..400) {
            let start = date(2020, 1, 1) + chrono::Duration::days(offset);
            let end = start + chrono::Duration::days(span);
            let points = fallback_forecast(start, end).unwrap();
            prop_assert_eq!(points.len() as i64, span + 1);
            for (i, p) in points.iter().enumerate() {
                prop_assert_eq!(p.timestamp, start + chrono::Duration::days(i as i64));
                prop_assert!((0.0..=1.0).contains(&p.predicted_value));
                let (lo, hi) = (p.lower_bound.unwrap(), p.upper_bound.unwrap());
                prop_assert!(lo >= 0.0 && hi <= 1.0);
                prop_assert!(lo <= p.predicted_value && p.predicted_value <= hi);
            }
        }
    }
}
