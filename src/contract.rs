//! Consumer contract verification
//!
//! Contract files record the requests a client makes and the responses it
//! relies on. Verification replays every interaction through the
//! [`RequestHandler`] and checks the response against the recorded one.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::error::RiskAlgoError;
use crate::handler::RequestHandler;

const NUMBER_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Deserialize)]
pub struct Pacticipant {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractFile {
    pub consumer: Pacticipant,
    pub provider: Pacticipant,
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub description: String,
    #[serde(rename = "providerState", default)]
    pub provider_state: Option<String>,
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedResponse {
    pub status: u16,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Outcome of replaying one interaction
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionOutcome {
    pub description: String,
    pub mismatches: Vec<String>,
}

impl InteractionOutcome {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub file: PathBuf,
    pub consumer: String,
    pub provider: String,
    pub outcomes: Vec<InteractionOutcome>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(InteractionOutcome::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &InteractionOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}

/// Check the required top-level fields before deserializing
pub fn validate_structure(value: &Value) -> Result<(), String> {
    for field in ["consumer", "provider", "interactions"] {
        if value.get(field).is_none() {
            return Err(format!("missing '{}' field", field));
        }
    }
    for field in ["consumer", "provider"] {
        if value[field].get("name").and_then(Value::as_str).is_none() {
            return Err(format!("'{}' has no name", field));
        }
    }
    match value["interactions"].as_array() {
        Some(list) if !list.is_empty() => Ok(()),
        Some(_) => Err("no interactions defined".to_string()),
        None => Err("'interactions' is not an array".to_string()),
    }
}

pub fn load_contract<P: AsRef<Path>>(path: P) -> Result<ContractFile, RiskAlgoError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    validate_structure(&value)
        .map_err(|e| RiskAlgoError::Contract(format!("{}: {}", path.display(), e)))?;
    Ok(serde_json::from_value(value)?)
}

/// Contract files in `dir`, sorted, skipping dot-files
pub fn contract_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>, RiskAlgoError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if is_json && !hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn verify_contract(contract: &ContractFile, handler: &RequestHandler) -> Vec<InteractionOutcome> {
    contract
        .interactions
        .iter()
        .map(|interaction| replay(interaction, handler))
        .collect()
}

pub fn verify_file<P: AsRef<Path>>(
    path: P,
    handler: &RequestHandler,
) -> Result<VerificationReport, RiskAlgoError> {
    let path = path.as_ref();
    let contract = load_contract(path)?;
    info!(
        "Verifying {} ({} -> {}, {} interactions)",
        path.display(),
        contract.consumer.name,
        contract.provider.name,
        contract.interactions.len()
    );

    let outcomes = verify_contract(&contract, handler);
    for outcome in outcomes.iter().filter(|o| !o.passed()) {
        warn!("'{}' failed: {}", outcome.description, outcome.mismatches.join("; "));
    }

    Ok(VerificationReport {
        file: path.to_path_buf(),
        consumer: contract.consumer.name,
        provider: contract.provider.name,
        outcomes,
    })
}

/// Verify every contract file in a directory
pub fn verify_dir<P: AsRef<Path>>(
    dir: P,
    handler: &RequestHandler,
) -> Result<Vec<VerificationReport>, RiskAlgoError> {
    let dir = dir.as_ref();
    let files = contract_files(dir)?;
    if files.is_empty() {
        return Err(RiskAlgoError::Contract(format!(
            "no contract files found in {}",
            dir.display()
        )));
    }
    files.iter().map(|file| verify_file(file, handler)).collect()
}

fn replay(interaction: &Interaction, handler: &RequestHandler) -> InteractionOutcome {
    let body = interaction.request.body.as_ref().map(Value::to_string);
    let response = handler.handle(&interaction.request.method, &interaction.request.path, body.as_deref());

    let mut mismatches = Vec::new();
    if response.status != interaction.response.status {
        mismatches.push(format!(
            "status: expected {}, got {}",
            interaction.response.status, response.status
        ));
    }
    if let Some(expected) = &interaction.response.body {
        compare("$", expected, &response.body, &mut mismatches);
    }

    InteractionOutcome {
        description: interaction.description.clone(),
        mismatches,
    }
}

/// Expected objects only constrain the keys they list; everything else must match.
fn compare(path: &str, expected: &Value, actual: &Value, mismatches: &mut Vec<String>) {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            for (key, exp_value) in exp {
                let child = format!("{}.{}", path, key);
                match act.get(key) {
                    Some(act_value) => compare(&child, exp_value, act_value, mismatches),
                    None => mismatches.push(format!("{}: missing", child)),
                }
            }
        }
        (Value::Array(exp), Value::Array(act)) => {
            if exp.len() != act.len() {
                mismatches.push(format!(
                    "{}: expected {} elements, got {}",
                    path,
                    exp.len(),
                    act.len()
                ));
                return;
            }
            for (i, (e, a)) in exp.iter().zip(act).enumerate() {
                compare(&format!("{}[{}]", path, i), e, a, mismatches);
            }
        }
        (Value::Number(e), Value::Number(a)) => {
            let same = match (e.as_f64(), a.as_f64()) {
                (Some(e), Some(a)) => (e - a).abs() <= NUMBER_TOLERANCE,
                _ => false,
            };
            if !same {
                mismatches.push(format!("{}: expected {}, got {}", path, e, a));
            }
        }
        _ if expected == actual => {}
        _ => mismatches.push(format!("{}: expected {}, got {}", path, expected, actual)),
    }
}
