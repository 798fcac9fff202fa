//! Insulin dosing core for the RiskAlgo service
//!
//! [`calculate_bolus`] and [`calculate_basal_adjustment`] are pure functions
//! of their request, the patient profile and the safety policy. The
//! [`handler`] module maps them onto the service's JSON endpoints.

pub mod basal;
pub mod bolus;
pub mod config;
pub mod contract;
pub mod error;
pub mod handler;
pub mod policy;
pub mod profile;
pub mod stats;

pub use basal::{calculate_basal_adjustment, BasalAction, BasalRequest, BasalResult, BasalTrendAdjuster, Trend};
pub use bolus::{calculate_bolus, BolusCalculator, BolusRequest, BolusResult, RiskLevel};
pub use error::{CalculationError, RiskAlgoError};
pub use policy::{SafetyLimits, Thresholds};
pub use profile::PatientProfile;
