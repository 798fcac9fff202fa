//! Bolus dose calculation
//!
//! Correction for glucose above target plus carbohydrate coverage, offset by
//! insulin still on board, rounded to the pump's dosing increment. Every
//! result carries a risk level and the warnings that produced it.

use serde::{Deserialize, Serialize};

use crate::error::CalculationError;
use crate::policy::{quantize, GlucoseRange, SafetyLimits, Thresholds};
use crate::profile::PatientProfile;

pub const WARNING_CRITICALLY_LOW: &str = "glucose critically low, do not dose";
pub const WARNING_LOW: &str = "glucose below target range, consider reducing dose";
pub const WARNING_SEVERELY_HIGH: &str = "glucose severely high, check ketones";
pub const WARNING_DOSE_CEILING: &str = "recommended dose exceeds single bolus safety ceiling";
pub const WARNING_STACKING: &str = "insulin stacking risk";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BolusRequest {
    pub patient_id: String,
    pub current_glucose_mg_dl: f64,
    pub carbs_grams: f64,
    pub insulin_on_board_units: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BolusResult {
    pub patient_id: String,
    pub recommended_bolus_units: f64,
    pub correction_units: f64,
    pub carb_coverage_units: f64,
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
}

/// Dosing risk, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BolusCalculator {
    pub thresholds: Thresholds,
    pub limits: SafetyLimits,
}

impl BolusCalculator {
    pub fn new(thresholds: Thresholds, limits: SafetyLimits) -> Self {
        Self { thresholds, limits }
    }

    pub fn calculate(
        &self,
        request: &BolusRequest,
        profile: &PatientProfile,
    ) -> Result<BolusResult, CalculationError> {
        self.validate(request, profile)?;

        let glucose = request.current_glucose_mg_dl;
        let iob = request.insulin_on_board_units;

        let correction_units =
            ((glucose - profile.target_glucose_mg_dl) / profile.correction_factor).max(0.0);
        let carb_coverage_units = request.carbs_grams / profile.carb_ratio;
        let raw_total = (correction_units + carb_coverage_units - iob).max(0.0);
        let mut recommended = quantize(raw_total, self.limits.dosing_increment);

        let mut risk = RiskLevel::Low;
        let mut warnings = Vec::new();

        match self.thresholds.classify(glucose) {
            GlucoseRange::VeryLow => {
                recommended = 0.0;
                risk = risk.max(RiskLevel::Critical);
                warnings.push(WARNING_CRITICALLY_LOW.to_string());
            }
            GlucoseRange::Low => warnings.push(WARNING_LOW.to_string()),
            GlucoseRange::VeryHigh => {
                risk = risk.max(RiskLevel::High);
                warnings.push(WARNING_SEVERELY_HIGH.to_string());
            }
            GlucoseRange::InRange | GlucoseRange::High => {}
        }

        if recommended > self.limits.max_single_bolus_units {
            risk = risk.max(RiskLevel::High);
            warnings.push(WARNING_DOSE_CEILING.to_string());
        }

        if iob > correction_units {
            risk = risk.max(RiskLevel::Moderate);
            warnings.push(WARNING_STACKING.to_string());
        }

        Ok(BolusResult {
            patient_id: request.patient_id.clone(),
            recommended_bolus_units: recommended,
            correction_units,
            carb_coverage_units,
            risk_level: risk,
            warnings,
        })
    }

    fn validate(&self, request: &BolusRequest, profile: &PatientProfile) -> Result<(), CalculationError> {
        if request.patient_id.trim().is_empty() {
            return Err(CalculationError::invalid("patient_id", "must not be empty"));
        }
        Thresholds::check_reading("current_glucose_mg_dl", request.current_glucose_mg_dl)?;
        check_non_negative("carbs_grams", request.carbs_grams)?;
        check_non_negative("insulin_on_board_units", request.insulin_on_board_units)?;

        self.thresholds.validate()?;
        self.limits.validate()?;
        profile.check_for(&request.patient_id, &self.thresholds)
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), CalculationError> {
    if !value.is_finite() {
        return Err(CalculationError::invalid(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(CalculationError::invalid(field, format!("{} is negative", value)));
    }
    Ok(())
}

/// Compute a bolus with the default thresholds and limits
pub fn calculate_bolus(
    request: &BolusRequest,
    profile: &PatientProfile,
) -> Result<BolusResult, CalculationError> {
    BolusCalculator::default().calculate(request, profile)
}
