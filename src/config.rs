//! Configuration file parsing
//!
//! `config.txt` holds one `key value` pair per line; `#` starts a comment.
//! Safety limits and thresholds use bare keys, profiles use
//! `default.<field>` or `<patient_id>.<field>`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::RiskAlgoError;
use crate::policy::{SafetyLimits, Thresholds};
use crate::profile::{ProfileOverrides, ProfileStore};

const DEFAULT_CONFIG: &str = "\
# RiskAlgo configuration
#
# Bolus rounding step (units) and single-dose ceiling
dosing_increment 0.1
max_single_bolus_units 20

# Safe basal range and rounding (U/h)
min_basal_rate 0.05
max_basal_rate 35
basal_rate_increment 0.01

# Basal trend tuning
max_adjustment_percent 20
trend_threshold 2      # mg/dL per reading
trend_gain 1           # percent per mg/dL per reading
deviation_gain 0.1     # percent per mg/dL from target
deviation_tolerance 20 # mg/dL

# Target range (mg/dL)
low_threshold 70
high_threshold 180

# Default patient profile
default.target_glucose 100
default.correction_factor 10
default.carb_ratio 10
default.sensitivity_min 5
default.sensitivity_max 200

# Per-patient overrides, e.g.
# patient-123.carb_ratio 12
";

/// Configuration loaded from config.txt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub limits: SafetyLimits,
    pub thresholds: Thresholds,
    pub profiles: ProfileStore,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RiskAlgoError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut config = Config::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            config.apply_line(index + 1, &line)?;
        }

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self, RiskAlgoError> {
        let mut config = Config::default();
        for (index, line) in text.lines().enumerate() {
            config.apply_line(index + 1, line)?;
        }
        Ok(config)
    }

    /// Write the commented default configuration
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<(), RiskAlgoError> {
        let mut file = File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;
        Ok(())
    }

    fn apply_line(&mut self, line_no: usize, line: &str) -> Result<(), RiskAlgoError> {
        // Drop trailing comment, skip blanks
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(());
        }

        let (key, raw) = Self::parse_line(line).ok_or_else(|| RiskAlgoError::Config {
            line: line_no,
            message: format!("expected `key value`, got '{}'", line),
        })?;
        let value: f64 = raw.parse().map_err(|_| RiskAlgoError::Config {
            line: line_no,
            message: format!("'{}' is not a number for key '{}'", raw, key),
        })?;

        if self.set_limit(key, value) {
            return Ok(());
        }

        if let Some((owner, field)) = key
            .rsplit_once('.')
            .filter(|(_, field)| ProfileOverrides::FIELDS.iter().any(|f| f == field))
        {
            let overrides = if owner == "default" {
                &mut self.profiles.defaults
            } else {
                self.profiles
                    .patients
                    .entry(owner.to_string())
                    .or_insert_with(ProfileOverrides::default)
            };
            if overrides.set(field, value) {
                return Ok(());
            }
        }

        warn!("Ignoring unknown config key '{}' on line {}", key, line_no);
        Ok(())
    }

    fn set_limit(&mut self, key: &str, value: f64) -> bool {
        let limits = &mut self.limits;
        let slot = match key {
            "dosing_increment" => &mut limits.dosing_increment,
            "max_single_bolus_units" => &mut limits.max_single_bolus_units,
            "min_basal_rate" => &mut limits.min_basal_rate,
            "max_basal_rate" => &mut limits.max_basal_rate,
            "basal_rate_increment" => &mut limits.basal_rate_increment,
            "max_adjustment_percent" => &mut limits.max_adjustment_percent,
            "trend_threshold" => &mut limits.trend_threshold,
            "trend_gain" => &mut limits.trend_gain,
            "deviation_gain" => &mut limits.deviation_gain,
            "deviation_tolerance" => &mut limits.deviation_tolerance,
            "low_threshold" => &mut self.thresholds.low_mgdl,
            "high_threshold" => &mut self.thresholds.high_mgdl,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Parse a single config line, returning (key, value)
    fn parse_line(line: &str) -> Option<(&str, &str)> {
        // Find first whitespace to separate key from value
        let mut parts = line.splitn(2, |c: char| c.is_whitespace());
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();

        if key.is_empty() || value.is_empty() {
            return None;
        }

        Some((key, value))
    }
}

/// Per-user data directory
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("riskalgo")
}

pub fn ensure_data_dir() -> std::io::Result<()> {
    fs::create_dir_all(get_data_dir())
}

pub fn config_file_path() -> PathBuf {
    get_data_dir().join("config.txt")
}

/// Contract files shipped next to the working directory
pub fn default_pact_dir() -> PathBuf {
    PathBuf::from("pacts")
}
