//! Summary statistics over a chronological window of glucose readings

use serde::{Deserialize, Serialize};

/// Statistical measures for a reading window (mg/dL)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Least-squares slope in mg/dL per reading interval
    pub slope: f64,
}

impl WindowStats {
    /// Calculate statistics from readings in chronological order
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = mean(values);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            count,
            mean,
            std_dev: calculate_std_dev(values, mean),
            min,
            max,
            slope: linear_slope(values),
        })
    }
}

// ============= Helper Functions =============

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate sample standard deviation
fn calculate_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance: f64 = values.iter()
        .map(|&v| (v - mean).powi(2))
        .sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Ordinary least-squares slope of `values` against their index.
///
/// Readings are assumed evenly spaced; fewer than two give a flat slope.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_stats() {
        let values = vec![100.0, 110.0, 120.0, 130.0, 140.0, 150.0];
        let stats = WindowStats::from_values(&values).unwrap();

        assert_eq!(stats.count, 6);
        assert!((stats.mean - 125.0).abs() < 1e-9);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 150.0);
        assert!((stats.slope - 10.0).abs() < 1e-9);
        assert!((stats.std_dev - 18.708).abs() < 0.001);
    }

    #[test]
    fn test_slope_direction() {
        assert!(linear_slope(&[180.0, 160.0, 150.0, 120.0]) < 0.0);
        assert_eq!(linear_slope(&[120.0, 120.0]), 0.0);
        assert_eq!(linear_slope(&[120.0]), 0.0);
        // noisy but flat
        assert!(linear_slope(&[100.0, 110.0, 100.0, 110.0, 100.0, 110.0]).abs() < 2.0);
    }

    #[test]
    fn test_empty_window() {
        assert!(WindowStats::from_values(&[]).is_none());
        assert_eq!(mean(&[]), 0.0);
    }
}
