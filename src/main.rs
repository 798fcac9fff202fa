//! RiskAlgo dosing service
//!
//! Computes insulin bolus recommendations and basal-rate adjustments with a
//! risk classification, and verifies consumer contracts against them.
//!
//! Usage:
//!   riskalgo bolus '<json>'     - Bolus calculation (`-` reads stdin)
//!   riskalgo basal '<json>'     - Basal adjustment (`-` reads stdin)
//!   riskalgo verify [dir]       - Replay contract files
//!   RISKALGO_DBG=1 riskalgo ... - Enable debug output

use std::env;
use std::io::Read;
use std::path::PathBuf;

use log::{info, warn};

use riskalgo::config::{config_file_path, default_pact_dir, ensure_data_dir, get_data_dir, Config};
use riskalgo::contract;
use riskalgo::error::RiskAlgoError;
use riskalgo::handler::{RequestHandler, PATH_BASAL, PATH_BOLUS, PATH_HEALTH};
use riskalgo::policy::Thresholds;

fn main() -> Result<(), RiskAlgoError> {
    let args: Vec<String> = env::args().collect();

    // Check for debug mode
    let debug_mode = env::var("RISKALGO_DBG").is_ok();

    // Initialize logger
    if debug_mode {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .init();
    }

    if let Err(e) = ensure_data_dir() {
        eprintln!("Warning: Could not create data directory: {}", e);
    }

    // Create default config if it doesn't exist
    let cfg_path = config_file_path();
    if !cfg_path.exists() {
        if let Err(e) = Config::create_default(&cfg_path) {
            warn!("Could not create default config: {}", e);
        }
    }

    // Try loading config from data directory first, then current directory
    let config = match Config::load(&cfg_path) {
        Ok(config) => config,
        Err(RiskAlgoError::Io(_)) => match Config::load("config.txt") {
            Ok(config) => config,
            Err(RiskAlgoError::Io(e)) => {
                warn!("Could not load config: {}. Using defaults.", e);
                Config::default()
            }
            Err(e) => return Err(e),
        },
        // A config that exists but does not parse must not silently fall back
        Err(e) => return Err(e),
    };

    let handler = RequestHandler::new(&config);

    match args.get(1).map(|s| s.as_str()) {
        Some("bolus") => cmd_calculate(&handler, PATH_BOLUS, args.get(2))?,
        Some("basal") | Some("basal-adjustment") => cmd_calculate(&handler, PATH_BASAL, args.get(2))?,
        Some("health") => cmd_calculate(&handler, PATH_HEALTH, None)?,
        Some("verify") => cmd_verify(&handler, args.get(2))?,
        Some("path") | Some("paths") => cmd_show_paths(),
        Some("--version") | Some("-V") => {
            println!("riskalgo {}", env!("CARGO_PKG_VERSION"));
        }
        _ => print_help(),
    }

    Ok(())
}

/// Run one request through the handler and print the response body
fn cmd_calculate(handler: &RequestHandler, path: &str, input: Option<&String>) -> Result<(), RiskAlgoError> {
    let (method, body) = if path == PATH_HEALTH {
        ("GET", None)
    } else {
        ("POST", Some(read_input(input)?))
    };

    let response = handler.handle(method, path, body.as_deref());
    let json = serde_json::to_string_pretty(&response.body)?;
    if !response.is_success() {
        return Err(RiskAlgoError::Request {
            status: response.status,
            body: json,
        });
    }
    println!("{}", json);
    Ok(())
}

fn read_input(input: Option<&String>) -> Result<String, RiskAlgoError> {
    match input.map(|s| s.as_str()) {
        Some("-") | None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        Some(text) => Ok(text.to_string()),
    }
}

fn cmd_verify(handler: &RequestHandler, dir: Option<&String>) -> Result<(), RiskAlgoError> {
    let dir = dir.map(PathBuf::from).unwrap_or_else(default_pact_dir);
    let reports = contract::verify_dir(&dir, handler)?;

    let mut failed = 0;
    for report in &reports {
        eprintln!(
            "{} ({} -> {}): {} interactions, {}",
            report.file.display(),
            report.consumer,
            report.provider,
            report.outcomes.len(),
            if report.passed() { "ok" } else { "FAILED" }
        );
        for outcome in report.failures() {
            failed += 1;
            eprintln!("  FAIL  {}", outcome.description);
            for mismatch in &outcome.mismatches {
                eprintln!("        {}", mismatch);
            }
        }
    }

    if failed > 0 {
        return Err(RiskAlgoError::Contract(format!("{} interaction(s) failed", failed)));
    }
    info!("All {} contract file(s) verified", reports.len());
    eprintln!("Provider satisfies all consumer contracts");
    Ok(())
}

/// Show data paths
fn cmd_show_paths() {
    println!("RiskAlgo Data Paths:");
    println!("  Data directory:  {}", get_data_dir().display());
    println!("  Config file:     {}", config_file_path().display());
    println!("  Contracts:       {}", default_pact_dir().display());
}

fn print_help() {
    eprintln!("RiskAlgo dosing service v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Clinical thresholds revision {}", Thresholds::VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  riskalgo bolus [JSON|-]     Calculate a bolus recommendation");
    eprintln!("  riskalgo basal [JSON|-]     Calculate a basal rate adjustment");
    eprintln!("  riskalgo health             Show service health");
    eprintln!("  riskalgo verify [DIR]       Verify contract files (default ./pacts)");
    eprintln!("  riskalgo path               Show data file locations");
    eprintln!("  riskalgo help               Show this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("  RISKALGO_DBG=1              Enable debug output");
    eprintln!();
    eprintln!("CONFIG:");
    eprintln!("  {}", config_file_path().display());
}
