//! Shared clinical thresholds and dosing safety limits
//!
//! Both calculators read glucose danger levels from [`Thresholds`] and dose
//! ceilings from [`SafetyLimits`]. The values are passed into every
//! calculation; nothing here is process-wide state.

use serde::{Deserialize, Serialize};

use crate::error::CalculationError;

/// Glucose threshold table in mg/dL
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Low threshold in mg/dL - default 70
    pub low_mgdl: f64,
    /// High threshold in mg/dL - default 180
    pub high_mgdl: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_mgdl: 70.0,
            high_mgdl: 180.0,
        }
    }
}

impl Thresholds {
    /// Revision of the clinical constants below
    pub const VERSION: &'static str = "2024.1";

    /// Readings outside this band are meter/sensor errors, not clinical events
    pub const MIN_PHYSIOLOGICAL_MGDL: f64 = 20.0;
    pub const MAX_PHYSIOLOGICAL_MGDL: f64 = 600.0;

    /// Clinical constant: severe hypoglycemia threshold
    pub const VERY_LOW_MGDL: f64 = 54.0;

    /// Clinical constant: severe hyperglycemia threshold
    pub const VERY_HIGH_MGDL: f64 = 300.0;

    /// Classify a reading in mg/dL
    pub fn classify(&self, mg_dl: f64) -> GlucoseRange {
        if mg_dl < Self::VERY_LOW_MGDL {
            GlucoseRange::VeryLow
        } else if mg_dl < self.low_mgdl {
            GlucoseRange::Low
        } else if mg_dl <= self.high_mgdl {
            GlucoseRange::InRange
        } else if mg_dl <= Self::VERY_HIGH_MGDL {
            GlucoseRange::High
        } else {
            GlucoseRange::VeryHigh
        }
    }

    /// The configurable target range must sit inside the fixed severe levels
    pub fn validate(&self) -> Result<(), CalculationError> {
        if !self.low_mgdl.is_finite() || self.low_mgdl < Self::VERY_LOW_MGDL {
            return Err(CalculationError::configuration(
                "low_threshold",
                format!("{} mg/dL must be at least {} mg/dL", self.low_mgdl, Self::VERY_LOW_MGDL),
            ));
        }
        if !self.high_mgdl.is_finite() || self.high_mgdl > Self::VERY_HIGH_MGDL {
            return Err(CalculationError::configuration(
                "high_threshold",
                format!("{} mg/dL must be at most {} mg/dL", self.high_mgdl, Self::VERY_HIGH_MGDL),
            ));
        }
        if self.low_mgdl >= self.high_mgdl {
            return Err(CalculationError::configuration(
                "low_threshold",
                format!("{} mg/dL must be below high_threshold {} mg/dL", self.low_mgdl, self.high_mgdl),
            ));
        }
        Ok(())
    }

    /// Check that a glucose value is a usable measurement
    pub fn check_reading(field: &str, mg_dl: f64) -> Result<(), CalculationError> {
        if !mg_dl.is_finite() {
            return Err(CalculationError::invalid(field, "must be a finite number"));
        }
        if !(Self::MIN_PHYSIOLOGICAL_MGDL..=Self::MAX_PHYSIOLOGICAL_MGDL).contains(&mg_dl) {
            return Err(CalculationError::invalid(
                field,
                format!(
                    "{} mg/dL is outside the measurable range {}-{} mg/dL",
                    mg_dl,
                    Self::MIN_PHYSIOLOGICAL_MGDL,
                    Self::MAX_PHYSIOLOGICAL_MGDL
                ),
            ));
        }
        Ok(())
    }
}

/// Classification of glucose value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseRange {
    VeryLow,  // < 54 mg/dL - severe hypoglycemia
    Low,      // 54 to low threshold
    InRange,  // low threshold to high threshold
    High,     // high threshold to 300
    VeryHigh, // > 300 mg/dL - risk of ketoacidosis
}

impl GlucoseRange {
    pub fn label(self) -> &'static str {
        match self {
            GlucoseRange::VeryLow => "Very Low",
            GlucoseRange::Low => "Low",
            GlucoseRange::InRange => "In Range",
            GlucoseRange::High => "High",
            GlucoseRange::VeryHigh => "Very High",
        }
    }
}

/// Dose ceilings, rounding granularity and basal adjustment tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Bolus rounding step in units - default 0.1
    pub dosing_increment: f64,
    /// Largest single bolus reported without a high-risk flag
    pub max_single_bolus_units: f64,
    /// Basal rate floor in U/h
    pub min_basal_rate: f64,
    /// Basal rate ceiling in U/h
    pub max_basal_rate: f64,
    /// Basal rate rounding step in U/h - default 0.01
    pub basal_rate_increment: f64,
    /// Largest absolute basal adjustment in percent
    pub max_adjustment_percent: f64,
    /// Slope (mg/dL per reading) beyond which a trend is rising or falling
    pub trend_threshold: f64,
    /// Percent adjustment per mg/dL-per-reading of slope
    pub trend_gain: f64,
    /// Percent adjustment per mg/dL of average deviation from target
    pub deviation_gain: f64,
    /// Average deviation from target treated as on-target, in mg/dL
    pub deviation_tolerance: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            dosing_increment: 0.1,
            max_single_bolus_units: 20.0,
            min_basal_rate: 0.05,
            max_basal_rate: 35.0,
            basal_rate_increment: 0.01,
            max_adjustment_percent: 20.0,
            trend_threshold: 2.0,
            trend_gain: 1.0,
            deviation_gain: 0.1,
            deviation_tolerance: 20.0,
        }
    }
}

impl SafetyLimits {
    /// Percent rounding step for basal adjustments
    pub const PERCENT_INCREMENT: f64 = 0.1;

    pub fn validate(&self) -> Result<(), CalculationError> {
        let positive = [
            ("dosing_increment", self.dosing_increment),
            ("max_single_bolus_units", self.max_single_bolus_units),
            ("min_basal_rate", self.min_basal_rate),
            ("max_basal_rate", self.max_basal_rate),
            ("basal_rate_increment", self.basal_rate_increment),
            ("max_adjustment_percent", self.max_adjustment_percent),
            ("trend_threshold", self.trend_threshold),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(CalculationError::configuration(field, "must be a positive number"));
            }
        }

        let non_negative = [
            ("trend_gain", self.trend_gain),
            ("deviation_gain", self.deviation_gain),
            ("deviation_tolerance", self.deviation_tolerance),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(CalculationError::configuration(field, "must be zero or positive"));
            }
        }

        for (field, value) in [
            ("dosing_increment", self.dosing_increment),
            ("basal_rate_increment", self.basal_rate_increment),
        ] {
            if !divides_one(value) {
                return Err(CalculationError::configuration(
                    field,
                    "must divide one unit evenly (e.g. 0.1, 0.05, 0.025)",
                ));
            }
        }

        if self.min_basal_rate >= self.max_basal_rate {
            return Err(CalculationError::configuration(
                "min_basal_rate",
                "must be below max_basal_rate",
            ));
        }
        if self.max_adjustment_percent >= 100.0 {
            return Err(CalculationError::configuration(
                "max_adjustment_percent",
                "must be below 100",
            ));
        }
        Ok(())
    }
}

fn divides_one(increment: f64) -> bool {
    let steps = 1.0 / increment;
    steps >= 1.0 && (steps - steps.round()).abs() < 1e-9
}

/// Round half-up to a multiple of `increment`.
///
/// `increment` must divide one evenly; the result is computed as
/// `steps / steps_per_unit` so that e.g. 3 × 0.1 comes out as exactly `0.3`.
pub fn quantize(value: f64, increment: f64) -> f64 {
    let steps_per_unit = (1.0 / increment).round();
    let steps = (value * steps_per_unit + 0.5 + 1e-9).floor();
    let rounded = steps / steps_per_unit;
    // -0.0 would serialize as "-0.0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
