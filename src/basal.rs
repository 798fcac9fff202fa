//! Basal rate adjustment from recent glucose trend
//!
//! The adjustment percentage combines the least-squares trend of the reading
//! window with the window's average distance from target. The percentage is
//! bounded by [`SafetyLimits::max_adjustment_percent`]; the resulting rate is
//! then clamped to the safe basal range. Clamping leaves the reported
//! percentage untouched and is recorded in [`BasalResult::safety_clamp`].

use serde::{Deserialize, Serialize};

use crate::error::CalculationError;
use crate::policy::{quantize, SafetyLimits, Thresholds};
use crate::profile::PatientProfile;
use crate::stats::WindowStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasalRequest {
    pub patient_id: String,
    /// Chronological, oldest first
    pub glucose_readings: Vec<f64>,
    /// U/h
    pub current_basal_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalResult {
    pub patient_id: String,
    pub adjusted_basal_rate: f64,
    pub adjustment_percentage: f64,
    pub trend: Trend,
    pub action: BasalAction,
    /// Set when the adjusted rate hit a safe-rate limit. Not part of the wire format.
    #[serde(skip)]
    pub safety_clamp: Option<SafetyClamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasalAction {
    Increase,
    Decrease,
    Maintain,
}

impl BasalAction {
    /// The action is a pure sign function of the percentage
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage > 0.0 {
            BasalAction::Increase
        } else if percentage < 0.0 {
            BasalAction::Decrease
        } else {
            BasalAction::Maintain
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    Minimum,
    Maximum,
}

/// Record of a basal rate pulled back into the safe range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyClamp {
    pub limit: RateLimit,
    pub unclamped_rate: f64,
    pub applied_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BasalTrendAdjuster {
    pub thresholds: Thresholds,
    pub limits: SafetyLimits,
}

impl BasalTrendAdjuster {
    pub fn new(thresholds: Thresholds, limits: SafetyLimits) -> Self {
        Self { thresholds, limits }
    }

    pub fn calculate(
        &self,
        request: &BasalRequest,
        profile: &PatientProfile,
    ) -> Result<BasalResult, CalculationError> {
        self.validate(request, profile)?;

        let limits = &self.limits;
        let stats = WindowStats::from_values(&request.glucose_readings)
            .ok_or_else(|| CalculationError::invalid("glucose_readings", "is empty"))?;

        let trend = self.classify_trend(stats.slope);
        let deviation = stats.mean - profile.target_glucose_mg_dl;

        let trend_term = match trend {
            Trend::Stable => 0.0,
            Trend::Rising | Trend::Falling => stats.slope * limits.trend_gain,
        };
        let deviation_term = if deviation.abs() > limits.deviation_tolerance {
            deviation * limits.deviation_gain
        } else {
            0.0
        };

        let bound = limits.max_adjustment_percent;
        let percentage = quantize(
            (trend_term + deviation_term).clamp(-bound, bound),
            SafetyLimits::PERCENT_INCREMENT,
        );
        let action = BasalAction::from_percentage(percentage);

        let unclamped_rate = quantize(
            request.current_basal_rate * (1.0 + percentage / 100.0),
            limits.basal_rate_increment,
        );
        let (adjusted_basal_rate, safety_clamp) = self.clamp_rate(unclamped_rate);

        Ok(BasalResult {
            patient_id: request.patient_id.clone(),
            adjusted_basal_rate,
            adjustment_percentage: percentage,
            trend,
            action,
            safety_clamp,
        })
    }

    pub fn classify_trend(&self, slope: f64) -> Trend {
        if slope > self.limits.trend_threshold {
            Trend::Rising
        } else if slope < -self.limits.trend_threshold {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }

    fn clamp_rate(&self, rate: f64) -> (f64, Option<SafetyClamp>) {
        let limit = if rate < self.limits.min_basal_rate {
            RateLimit::Minimum
        } else if rate > self.limits.max_basal_rate {
            RateLimit::Maximum
        } else {
            return (rate, None);
        };

        let applied_rate = match limit {
            RateLimit::Minimum => self.limits.min_basal_rate,
            RateLimit::Maximum => self.limits.max_basal_rate,
        };
        let clamp = SafetyClamp {
            limit,
            unclamped_rate: rate,
            applied_rate,
        };
        (applied_rate, Some(clamp))
    }

    fn validate(&self, request: &BasalRequest, profile: &PatientProfile) -> Result<(), CalculationError> {
        if request.patient_id.trim().is_empty() {
            return Err(CalculationError::invalid("patient_id", "must not be empty"));
        }
        if request.glucose_readings.len() < 2 {
            return Err(CalculationError::invalid(
                "glucose_readings",
                format!("needs at least 2 readings, got {}", request.glucose_readings.len()),
            ));
        }
        for (i, &reading) in request.glucose_readings.iter().enumerate() {
            Thresholds::check_reading(&format!("glucose_readings[{}]", i), reading)?;
        }
        let rate = request.current_basal_rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CalculationError::invalid(
                "current_basal_rate",
                "must be a positive number",
            ));
        }

        self.thresholds.validate()?;
        self.limits.validate()?;
        profile.check_for(&request.patient_id, &self.thresholds)
    }
}

/// Compute a basal adjustment with the default thresholds and limits
pub fn calculate_basal_adjustment(
    request: &BasalRequest,
    profile: &PatientProfile,
) -> Result<BasalResult, CalculationError> {
    BasalTrendAdjuster::default().calculate(request, profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(readings: &[f64], rate: f64) -> BasalRequest {
        BasalRequest {
            patient_id: "patient-123".to_string(),
            glucose_readings: readings.to_vec(),
            current_basal_rate: rate,
        }
    }

    fn profile() -> PatientProfile {
        PatientProfile::default_for("patient-123")
    }

    #[test]
    fn test_rising_contract_scenario() {
        let req = request(&[100.0, 110.0, 120.0, 130.0, 140.0, 150.0], 10.0);
        let result = calculate_basal_adjustment(&req, &profile()).unwrap();

        assert_eq!(result.patient_id, "patient-123");
        assert_eq!(result.trend, Trend::Rising);
        assert_eq!(result.action, BasalAction::Increase);
        // slope 10 -> +10%, mean 125 is 25 over target -> +2.5%
        assert_eq!(result.adjustment_percentage, 12.5);
        assert_eq!(result.adjusted_basal_rate, 11.25);
        assert!(result.adjusted_basal_rate > 10.0);
        assert!(result.safety_clamp.is_none());
    }

    #[test]
    fn test_two_equal_readings_at_target_are_stable() {
        let result = calculate_basal_adjustment(&request(&[100.0, 100.0], 1.0), &profile()).unwrap();
        assert_eq!(result.trend, Trend::Stable);
        assert_eq!(result.adjustment_percentage, 0.0);
        assert!(result.adjustment_percentage.is_sign_positive());
        assert_eq!(result.action, BasalAction::Maintain);
        assert_eq!(result.adjusted_basal_rate, 1.0);
    }

    #[test]
    fn test_stable_within_tolerance_maintains() {
        let result =
            calculate_basal_adjustment(&request(&[115.0, 118.0, 116.0, 119.0], 0.8), &profile()).unwrap();
        assert_eq!(result.trend, Trend::Stable);
        assert_eq!(result.action, BasalAction::Maintain);
        assert_eq!(result.adjusted_basal_rate, 0.8);
    }

    #[test]
    fn test_stable_but_persistently_high_increases() {
        let result =
            calculate_basal_adjustment(&request(&[200.0, 200.0, 200.0], 1.0), &profile()).unwrap();
        assert_eq!(result.trend, Trend::Stable);
        assert_eq!(result.adjustment_percentage, 10.0);
        assert_eq!(result.action, BasalAction::Increase);
        assert_eq!(result.adjusted_basal_rate, 1.1);
    }

    #[test]
    fn test_two_equal_readings_outside_tolerance() {
        let near = calculate_basal_adjustment(&request(&[115.0, 115.0], 1.0), &profile()).unwrap();
        assert_eq!(near.trend, Trend::Stable);
        assert_eq!(near.adjustment_percentage, 0.0);

        let far = calculate_basal_adjustment(&request(&[200.0, 200.0], 1.0), &profile()).unwrap();
        assert_eq!(far.trend, Trend::Stable);
        assert_eq!(far.adjustment_percentage, 10.0);
        assert_eq!(far.action, BasalAction::Increase);
    }

    #[test]
    fn test_falling_decreases() {
        let result =
            calculate_basal_adjustment(&request(&[120.0, 110.0, 100.0, 90.0, 80.0], 1.0), &profile())
                .unwrap();
        assert_eq!(result.trend, Trend::Falling);
        // slope -10, mean 100 on target
        assert_eq!(result.adjustment_percentage, -10.0);
        assert_eq!(result.action, BasalAction::Decrease);
        assert_eq!(result.adjusted_basal_rate, 0.9);
    }

    #[test]
    fn test_percentage_bounded() {
        let result =
            calculate_basal_adjustment(&request(&[100.0, 200.0, 300.0, 400.0], 1.0), &profile())
                .unwrap();
        assert_eq!(result.adjustment_percentage, 20.0);
        assert_eq!(result.adjusted_basal_rate, 1.2);

        let result =
            calculate_basal_adjustment(&request(&[300.0, 200.0, 100.0, 60.0], 1.0), &profile())
                .unwrap();
        assert_eq!(result.adjustment_percentage, -20.0);
        assert_eq!(result.adjusted_basal_rate, 0.8);
    }

    #[test]
    fn test_clamp_keeps_unclamped_percentage() {
        let adjuster = BasalTrendAdjuster::new(
            Thresholds::default(),
            SafetyLimits {
                max_basal_rate: 2.0,
                ..SafetyLimits::default()
            },
        );
        let req = request(&[100.0, 110.0, 120.0, 130.0, 140.0, 150.0], 1.9);
        let result = adjuster.calculate(&req, &profile()).unwrap();

        assert_eq!(result.adjustment_percentage, 12.5);
        assert_eq!(result.action, BasalAction::Increase);
        assert_eq!(result.adjusted_basal_rate, 2.0);
        let clamp = result.safety_clamp.unwrap();
        assert_eq!(clamp.limit, RateLimit::Maximum);
        assert_eq!(clamp.unclamped_rate, 2.14);
        assert_eq!(clamp.applied_rate, 2.0);
    }

    #[test]
    fn test_clamp_to_minimum() {
        let req = request(&[300.0, 200.0, 100.0, 60.0], 0.05);
        let result = calculate_basal_adjustment(&req, &profile()).unwrap();
        assert_eq!(result.adjustment_percentage, -20.0);
        assert_eq!(result.action, BasalAction::Decrease);
        assert_eq!(result.adjusted_basal_rate, 0.05);
        let clamp = result.safety_clamp.unwrap();
        assert_eq!(clamp.limit, RateLimit::Minimum);
        assert_eq!(clamp.unclamped_rate, 0.04);
    }

    #[test]
    fn test_invalid_inputs() {
        let err = calculate_basal_adjustment(&request(&[120.0], 1.0), &profile()).unwrap_err();
        assert_eq!(err.field(), "glucose_readings");

        let err =
            calculate_basal_adjustment(&request(&[120.0, 130.0, 5.0], 1.0), &profile()).unwrap_err();
        assert_eq!(err.field(), "glucose_readings[2]");

        let err = calculate_basal_adjustment(&request(&[120.0, 130.0], 0.0), &profile()).unwrap_err();
        assert_eq!(err.field(), "current_basal_rate");

        let err =
            calculate_basal_adjustment(&request(&[120.0, 130.0], f64::NAN), &profile()).unwrap_err();
        assert!(matches!(err, CalculationError::InvalidInput { .. }));
    }

    #[test]
    fn test_result_wire_shape() {
        let req = request(&[100.0, 110.0, 120.0, 130.0, 140.0, 150.0], 10.0);
        let result = calculate_basal_adjustment(&req, &profile()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "patient_id": "patient-123",
                "adjusted_basal_rate": 11.25,
                "adjustment_percentage": 12.5,
                "trend": "rising",
                "action": "increase"
            })
        );
    }
}
