//! Small numeric helpers over reading sequences.
//!
//! Every helper that could divide by zero returns `Option` instead.

use serde::{Deserialize, Serialize};

/// Number of leading/trailing months used for the half means.
pub const HALF_WINDOW: usize = 6;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean of the strictly positive readings; `None` when there are none.
pub fn positive_mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| **v > 0.0)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Ordinary least squares slope of `values` against their index.
pub fn ols_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }

    if var == 0.0 { None } else { Some(cov / var) }
}

/// Descriptive figures attached to every finding.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub total: f64,
    pub first_half_mean: f64,
    pub last_half_mean: f64,
}

impl SummaryStats {
    /// Empty sequences summarise to zeros.
    pub fn from_readings(readings: &[f64]) -> Self {
        let head = &readings[..readings.len().min(HALF_WINDOW)];
        let tail = &readings[readings.len().saturating_sub(HALF_WINDOW)..];
        Self {
            mean: mean(readings).unwrap_or(0.0),
            total: readings.iter().sum(),
            first_half_mean: mean(head).unwrap_or(0.0),
            last_half_mean: mean(tail).unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
    }

    #[test]
    fn test_positive_mean_skips_zeros() {
        assert_eq!(positive_mean(&[0.0, 10.0, 0.0, 30.0]), Some(20.0));
        assert_eq!(positive_mean(&[0.0, 0.0]), None);
        assert_eq!(positive_mean(&[]), None);
    }

    #[test]
    fn test_ols_slope_on_exact_line() {
        let data: Vec<f64> = (0..12).map(|i| 100.0 - 7.0 * i as f64).collect();
        let slope = ols_slope(&data).unwrap();
        assert!((slope + 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_ols_slope_flat_and_degenerate() {
        assert_eq!(ols_slope(&[5.0; 12]), Some(0.0));
        assert_eq!(ols_slope(&[5.0]), None);
        assert_eq!(ols_slope(&[]), None);
    }

    #[test]
    fn test_summary_uses_first_and_last_six() {
        let data: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        let s = SummaryStats::from_readings(&data);
        assert_eq!(s.total, 78.0);
        assert_eq!(s.mean, 6.5);
        assert_eq!(s.first_half_mean, 3.5);
        assert_eq!(s.last_half_mean, 9.5);
    }

    #[test]
    fn test_summary_short_and_empty() {
        let s = SummaryStats::from_readings(&[2.0, 4.0]);
        assert_eq!(s.first_half_mean, 3.0);
        assert_eq!(s.last_half_mean, 3.0);
        assert_eq!(SummaryStats::from_readings(&[]), SummaryStats::default());
    }
}
