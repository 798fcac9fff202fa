//! Patient dosing profiles

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CalculationError;
use crate::policy::Thresholds;

/// Plausible correction factor range in mg/dL per unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for SensitivityBounds {
    fn default() -> Self {
        Self { min: 5.0, max: 200.0 }
    }
}

/// Per-patient dosing parameters, owned by the profile store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub patient_id: String,
    pub target_glucose_mg_dl: f64,
    /// mg/dL lowered by one unit of insulin
    pub correction_factor: f64,
    /// grams of carbohydrate covered by one unit
    pub carb_ratio: f64,
    pub sensitivity: SensitivityBounds,
}

impl PatientProfile {
    /// Profile used when the store has no entry for a patient
    pub fn default_for(patient_id: &str) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            target_glucose_mg_dl: 100.0,
            correction_factor: 10.0,
            carb_ratio: 10.0,
            sensitivity: SensitivityBounds::default(),
        }
    }

    /// Check every field the calculators divide by or compare against
    pub fn validate(&self, thresholds: &Thresholds) -> Result<(), CalculationError> {
        if self.patient_id.trim().is_empty() {
            return Err(CalculationError::configuration("profile.patient_id", "is empty"));
        }

        let target = self.target_glucose_mg_dl;
        if !target.is_finite() || target < thresholds.low_mgdl || target > thresholds.high_mgdl {
            return Err(CalculationError::configuration(
                "profile.target_glucose_mg_dl",
                format!(
                    "{} mg/dL is outside the target range {}-{} mg/dL",
                    target, thresholds.low_mgdl, thresholds.high_mgdl
                ),
            ));
        }

        let SensitivityBounds { min, max } = self.sensitivity;
        if !min.is_finite() || !max.is_finite() || min <= 0.0 || min > max {
            return Err(CalculationError::configuration(
                "profile.sensitivity",
                format!("invalid bounds {}-{}", min, max),
            ));
        }

        let cf = self.correction_factor;
        if !cf.is_finite() || cf <= 0.0 {
            return Err(CalculationError::configuration(
                "profile.correction_factor",
                "must be a positive number",
            ));
        }
        if cf < min || cf > max {
            return Err(CalculationError::configuration(
                "profile.correction_factor",
                format!("{} is outside the sensitivity bounds {}-{}", cf, min, max),
            ));
        }

        if !self.carb_ratio.is_finite() || self.carb_ratio <= 0.0 {
            return Err(CalculationError::configuration(
                "profile.carb_ratio",
                "must be a positive number",
            ));
        }

        Ok(())
    }

    /// Validate and make sure the profile belongs to the requesting patient
    pub fn check_for(&self, patient_id: &str, thresholds: &Thresholds) -> Result<(), CalculationError> {
        self.validate(thresholds)?;
        if self.patient_id != patient_id {
            return Err(CalculationError::configuration(
                "profile.patient_id",
                format!("profile for '{}' used for '{}'", self.patient_id, patient_id),
            ));
        }
        Ok(())
    }
}

/// Partial profile from the config file; unset fields fall back to the default profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileOverrides {
    pub target_glucose_mg_dl: Option<f64>,
    pub correction_factor: Option<f64>,
    pub carb_ratio: Option<f64>,
    pub sensitivity_min: Option<f64>,
    pub sensitivity_max: Option<f64>,
}

impl ProfileOverrides {
    /// Field names accepted in the config file
    pub const FIELDS: [&'static str; 5] = [
        "target_glucose",
        "correction_factor",
        "carb_ratio",
        "sensitivity_min",
        "sensitivity_max",
    ];

    /// Set a field by its config-file name; returns false for unknown names
    pub fn set(&mut self, field: &str, value: f64) -> bool {
        let slot = match field {
            "target_glucose" => &mut self.target_glucose_mg_dl,
            "correction_factor" => &mut self.correction_factor,
            "carb_ratio" => &mut self.carb_ratio,
            "sensitivity_min" => &mut self.sensitivity_min,
            "sensitivity_max" => &mut self.sensitivity_max,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    fn apply(&self, profile: &mut PatientProfile) {
        if let Some(v) = self.target_glucose_mg_dl {
            profile.target_glucose_mg_dl = v;
        }
        if let Some(v) = self.correction_factor {
            profile.correction_factor = v;
        }
        if let Some(v) = self.carb_ratio {
            profile.carb_ratio = v;
        }
        if let Some(v) = self.sensitivity_min {
            profile.sensitivity.min = v;
        }
        if let Some(v) = self.sensitivity_max {
            profile.sensitivity.max = v;
        }
    }
}

/// Resolves patient ids to profiles: per-patient overrides layered on a default
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileStore {
    pub defaults: ProfileOverrides,
    pub patients: HashMap<String, ProfileOverrides>,
}

impl ProfileStore {
    pub fn profile_for(&self, patient_id: &str) -> PatientProfile {
        let mut profile = PatientProfile::default_for(patient_id);
        self.defaults.apply(&mut profile);
        if let Some(overrides) = self.patients.get(patient_id) {
            overrides.apply(&mut profile);
        }
        profile
    }

    pub fn is_known(&self, patient_id: &str) -> bool {
        self.patients.contains_key(patient_id)
    }

    /// Profile for dosing. Once any patient is configured, unlisted ids are
    /// refused instead of silently dosed with the defaults.
    pub fn resolve(&self, patient_id: &str) -> Result<PatientProfile, CalculationError> {
        if !self.patients.is_empty() && !patient_id.trim().is_empty() && !self.is_known(patient_id) {
            return Err(CalculationError::configuration(
                "patient_id",
                format!("no profile configured for '{}'", patient_id),
            ));
        }
        Ok(self.profile_for(patient_id))
    }
}
