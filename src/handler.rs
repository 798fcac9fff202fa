//! Request routing for the RiskAlgo service endpoints
//!
//! Transport-agnostic: callers hand in method, path and body text and get a
//! status code plus JSON body back. Bodies are parsed into strict request
//! types before any calculation runs.

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::basal::{BasalRequest, BasalTrendAdjuster};
use crate::bolus::{BolusCalculator, BolusRequest};
use crate::config::Config;
use crate::error::CalculationError;
use crate::profile::{PatientProfile, ProfileStore};
use crate::stats::WindowStats;

pub const SERVICE_NAME: &str = "RiskAlgoService";

pub const PATH_HEALTH: &str = "/health";
pub const PATH_BOLUS: &str = "/calculate/bolus";
pub const PATH_BASAL: &str = "/calculate/basal-adjustment";

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(500, None, format!("could not serialize response: {}", e)),
        }
    }

    fn error(status: u16, field: Option<&str>, message: String) -> Self {
        let body = match field {
            Some(field) => json!({ "error": message, "field": field }),
            None => json!({ "error": message }),
        };
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

impl Health {
    pub fn current() -> Self {
        Self {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestHandler {
    bolus: BolusCalculator,
    basal: BasalTrendAdjuster,
    profiles: ProfileStore,
}

impl RequestHandler {
    pub fn new(config: &Config) -> Self {
        Self {
            bolus: BolusCalculator::new(config.thresholds, config.limits),
            basal: BasalTrendAdjuster::new(config.thresholds, config.limits),
            profiles: config.profiles.clone(),
        }
    }

    pub fn handle(&self, method: &str, path: &str, body: Option<&str>) -> Response {
        debug!("{} {}", method, path);
        let method = method.to_ascii_uppercase();

        let expected = match path {
            PATH_HEALTH => "GET",
            PATH_BOLUS | PATH_BASAL => "POST",
            _ => return Response::error(404, None, format!("no route for {}", path)),
        };
        if method != expected {
            return Response::error(405, None, format!("{} not allowed on {}", method, path));
        }

        match path {
            PATH_HEALTH => Response::ok(&Health::current()),
            PATH_BOLUS => self.handle_bolus(body),
            _ => self.handle_basal(body),
        }
    }

    fn handle_bolus(&self, body: Option<&str>) -> Response {
        let request: BolusRequest = match parse_body(body) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let profile = match self.profile_for(&request.patient_id) {
            Ok(profile) => profile,
            Err(e) => return calculation_failure(e),
        };
        debug!(
            "Glucose {} mg/dL is {}",
            request.current_glucose_mg_dl,
            self.bolus.thresholds.classify(request.current_glucose_mg_dl).label()
        );

        match self.bolus.calculate(&request, &profile) {
            Ok(result) => {
                info!(
                    "Bolus for '{}': {} U ({})",
                    result.patient_id,
                    result.recommended_bolus_units,
                    result.risk_level.label()
                );
                for warning in &result.warnings {
                    warn!("Bolus warning for '{}': {}", result.patient_id, warning);
                }
                Response::ok(&result)
            }
            Err(e) => calculation_failure(e),
        }
    }

    fn handle_basal(&self, body: Option<&str>) -> Response {
        let request: BasalRequest = match parse_body(body) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let profile = match self.profile_for(&request.patient_id) {
            Ok(profile) => profile,
            Err(e) => return calculation_failure(e),
        };

        if let Some(stats) = WindowStats::from_values(&request.glucose_readings) {
            debug!(
                "Basal window for '{}': n={} mean={:.1} sd={:.1} slope={:.2}",
                request.patient_id, stats.count, stats.mean, stats.std_dev, stats.slope
            );
        }

        match self.basal.calculate(&request, &profile) {
            Ok(result) => {
                info!(
                    "Basal for '{}': {:?} {:+.1}% -> {} U/h",
                    result.patient_id, result.action, result.adjustment_percentage, result.adjusted_basal_rate
                );
                if let Some(clamp) = &result.safety_clamp {
                    warn!(
                        "Basal rate for '{}' clamped to {:?} {} U/h (computed {} U/h)",
                        result.patient_id, clamp.limit, clamp.applied_rate, clamp.unclamped_rate
                    );
                }
                Response::ok(&result)
            }
            Err(e) => calculation_failure(e),
        }
    }

    fn profile_for(&self, patient_id: &str) -> Result<PatientProfile, CalculationError> {
        let profile = self.profiles.resolve(patient_id)?;
        if !self.profiles.is_known(patient_id) {
            warn!("No profile for '{}', dosing with the default profile", patient_id);
        }
        Ok(profile)
    }
}

fn parse_body<T: DeserializeOwned>(body: Option<&str>) -> Result<T, Response> {
    let body = body.ok_or_else(|| Response::error(400, None, "request body is required".to_string()))?;
    serde_json::from_str(body).map_err(|e| {
        warn!("Rejected request body: {}", e);
        Response::error(400, None, format!("invalid request body: {}", e))
    })
}

fn calculation_failure(error: CalculationError) -> Response {
    warn!("Calculation rejected: {}", error);
    let status = match error {
        CalculationError::InvalidInput { .. } => 400,
        CalculationError::Configuration { .. } => 500,
    };
    Response::error(status, Some(error.field()), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SafetyLimits;

    fn handler() -> RequestHandler {
        RequestHandler::default()
    }

    #[test]
    fn test_health() {
        let response = handler().handle("GET", PATH_HEALTH, None);
        assert_eq!(response.status, 200);
        assert_eq!(response.body["status"], "healthy");
        assert_eq!(response.body["service"], SERVICE_NAME);
        assert_eq!(response.body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_bolus_round_trip() {
        let body = r#"{"patient_id":"patient-123","current_glucose_mg_dl":150,"carbs_grams":30,"insulin_on_board_units":5}"#;
        let response = handler().handle("post", PATH_BOLUS, Some(body));

        assert!(response.is_success());
        assert_eq!(response.body["patient_id"], "patient-123");
        assert_eq!(response.body["recommended_bolus_units"], 3.0);
        assert_eq!(response.body["risk_level"], "low");
        assert_eq!(response.body["warnings"], json!([]));
    }

    #[test]
    fn test_basal_round_trip() {
        let body = r#"{"patient_id":"patient-123","glucose_readings":[100,110,120,130,140,150],"current_basal_rate":10}"#;
        let response = handler().handle("POST", PATH_BASAL, Some(body));

        assert_eq!(response.status, 200);
        assert_eq!(response.body["trend"], "rising");
        assert_eq!(response.body["action"], "increase");
        assert!(response.body["adjusted_basal_rate"].as_f64().unwrap() > 10.0);
        assert!(response.body.get("safety_clamp").is_none());
    }

    #[test]
    fn test_schema_violations_rejected() {
        let h = handler();

        let missing = r#"{"patient_id":"p","current_glucose_mg_dl":150,"carbs_grams":30}"#;
        assert_eq!(h.handle("POST", PATH_BOLUS, Some(missing)).status, 400);

        let extra = r#"{"patient_id":"p","current_glucose_mg_dl":150,"carbs_grams":30,"insulin_on_board_units":0,"dose":9}"#;
        assert_eq!(h.handle("POST", PATH_BOLUS, Some(extra)).status, 400);

        let wrong_type = r#"{"patient_id":"p","glucose_readings":"100,120","current_basal_rate":1}"#;
        assert_eq!(h.handle("POST", PATH_BASAL, Some(wrong_type)).status, 400);

        assert_eq!(h.handle("POST", PATH_BASAL, None).status, 400);
    }

    #[test]
    fn test_out_of_range_names_field() {
        let body = r#"{"patient_id":"p","current_glucose_mg_dl":900,"carbs_grams":0,"insulin_on_board_units":0}"#;
        let response = handler().handle("POST", PATH_BOLUS, Some(body));
        assert_eq!(response.status, 400);
        assert_eq!(response.body["field"], "current_glucose_mg_dl");
    }

    #[test]
    fn test_bad_limits_are_server_errors() {
        let config = Config {
            limits: SafetyLimits {
                dosing_increment: 0.0,
                ..SafetyLimits::default()
            },
            ..Config::default()
        };
        let body = r#"{"patient_id":"p","current_glucose_mg_dl":150,"carbs_grams":0,"insulin_on_board_units":0}"#;
        let response = RequestHandler::new(&config).handle("POST", PATH_BOLUS, Some(body));
        assert_eq!(response.status, 500);
        assert_eq!(response.body["field"], "dosing_increment");
    }

    #[test]
    fn test_threshold_table_checked_before_dosing() {
        let body = r#"{"patient_id":"p","current_glucose_mg_dl":350,"carbs_grams":0,"insulin_on_board_units":0}"#;

        let raised = Config::parse("high_threshold 400\nmax_single_bolus_units 50\n").unwrap();
        let response = RequestHandler::new(&raised).handle("POST", PATH_BOLUS, Some(body));
        assert_eq!(response.status, 500);
        assert_eq!(response.body["field"], "high_threshold");

        let inverted = Config::parse("low_threshold 200\nhigh_threshold 150\n").unwrap();
        let response = RequestHandler::new(&inverted).handle("POST", PATH_BOLUS, Some(body));
        assert_eq!(response.status, 500);
        assert_eq!(response.body["field"], "low_threshold");

        let readings = r#"{"patient_id":"p","glucose_readings":[150,160],"current_basal_rate":1}"#;
        let response = RequestHandler::new(&raised).handle("POST", PATH_BASAL, Some(readings));
        assert_eq!(response.status, 500);
        assert_eq!(response.body["field"], "high_threshold");
    }

    #[test]
    fn test_severe_high_keeps_high_risk() {
        let body = r#"{"patient_id":"p","current_glucose_mg_dl":350,"carbs_grams":0,"insulin_on_board_units":0}"#;
        let response = handler().handle("POST", PATH_BOLUS, Some(body));
        assert_eq!(response.status, 200);
        assert_eq!(response.body["risk_level"], "high");
        assert!(!response.body["warnings"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_unlisted_patient_rejected_when_store_has_patients() {
        let config = Config::parse("patient-9.carb_ratio 15\n").unwrap();
        let h = RequestHandler::new(&config);
        let body = r#"{"patient_id":"patient-10","current_glucose_mg_dl":150,"carbs_grams":30,"insulin_on_board_units":0}"#;
        let response = h.handle("POST", PATH_BOLUS, Some(body));
        assert_eq!(response.status, 500);
        assert_eq!(response.body["field"], "patient_id");

        let readings = r#"{"patient_id":"patient-10","glucose_readings":[150,160],"current_basal_rate":1}"#;
        assert_eq!(h.handle("POST", PATH_BASAL, Some(readings)).status, 500);

        // No per-patient entries: everyone gets the default profile
        assert_eq!(handler().handle("POST", PATH_BOLUS, Some(body)).status, 200);
    }

    #[test]
    fn test_routing_errors() {
        let h = handler();
        assert_eq!(h.handle("GET", "/calculate/everything", None).status, 404);
        assert_eq!(h.handle("GET", PATH_BOLUS, None).status, 405);
        assert_eq!(h.handle("POST", PATH_HEALTH, None).status, 405);
    }

    #[test]
    fn test_configured_profile_used() {
        let config = Config::parse("patient-9.carb_ratio 15\n").unwrap();
        let body = r#"{"patient_id":"patient-9","current_glucose_mg_dl":100,"carbs_grams":45,"insulin_on_board_units":0}"#;
        let response = RequestHandler::new(&config).handle("POST", PATH_BOLUS, Some(body));
        assert_eq!(response.body["carb_coverage_units"], 3.0);
    }
}
