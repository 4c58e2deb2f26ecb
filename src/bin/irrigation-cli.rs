//! # Irrigation CLI
//!
//! Command-line front end for the irrigation core: decide for one or all
//! configured fields, inspect a field's resolved soil state, and validate or
//! print the layered configuration.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use irrigation_core::config::ConfigManager;
use irrigation_core::decision::IrrigationService;
use irrigation_core::logging::init_structured_logging;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "irrigation-cli")]
#[command(about = "Irrigation decisions from soil sensors and crop-model output")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory (default: $IRRIGATION_CONFIG_DIR or ./config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (default: $IRRIGATION_ENV, $APP_ENV or development)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Make an irrigation decision for one field
    Decide {
        #[arg(long)]
        field_id: String,

        /// Use this humidity (%) instead of the sensor's latest reading
        #[arg(long)]
        humidity: Option<f64>,
    },

    /// Make decisions for every configured field concurrently
    DecideAll,

    /// Show the resolved soil state of one field
    Soil {
        #[arg(long)]
        field_id: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load and validate configuration, reporting warnings
    Validate,

    /// Print the sanitized configuration as JSON
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if std::env::var("RUST_LOG").is_err() {
        let level = match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }
    init_structured_logging();

    match run(cli).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("irrigation-cli failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let manager = load_config(&cli)?;

    match cli.command {
        Commands::Decide { field_id, humidity } => {
            let service = IrrigationService::from_manager(&manager)?;
            let decision = match humidity {
                Some(value) => {
                    let device_id = manager
                        .config()
                        .device_for_field(&field_id)
                        .unwrap_or(field_id.as_str())
                        .to_string();
                    service
                        .make_irrigation_decision_with_reading(&field_id, &device_id, value)
                        .await?
                }
                None => service.make_irrigation_decision(&field_id).await?,
            };
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::DecideAll => decide_all(&manager).await?,
        Commands::Soil { field_id } => {
            let service = IrrigationService::from_manager(&manager)?;
            let snapshot = service.soil_snapshot(&field_id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate => {
                let warnings = manager.config().validation_warnings();
                println!("🔧 Configuration valid");
                println!("Environment: {}", manager.environment());
                println!("Config Directory: {}", manager.config_directory().display());
                println!("Fields: {}", manager.config().fields.len());
                for warning in &warnings {
                    println!("⚠️  {}", warning);
                }
            }
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
            }
        },
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Arc<ConfigManager>> {
    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    };
    manager.context("failed to load configuration")
}

async fn decide_all(manager: &ConfigManager) -> anyhow::Result<()> {
    let service = IrrigationService::from_manager(manager)?;
    let field_ids: Vec<String> = manager
        .config()
        .fields
        .iter()
        .map(|field| field.field_id.clone())
        .collect();
    if field_ids.is_empty() {
        bail!("no fields configured");
    }

    info!(fields = field_ids.len(), "Deciding all configured fields");
    let results = join_all(
        field_ids
            .iter()
            .map(|field_id| service.make_irrigation_decision(field_id)),
    )
    .await;

    let mut failures = 0;
    let mut report = Vec::with_capacity(results.len());
    for (field_id, result) in field_ids.iter().zip(results) {
        match result {
            Ok(decision) => report.push(serde_json::to_value(&decision)?),
            Err(e) => {
                failures += 1;
                report.push(serde_json::json!({
                    "field_id": field_id,
                    "error": e.to_string(),
                }));
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    let breakers = service.client().breakers().system_metrics();
    for (name, metrics) in &breakers.circuit_breakers {
        info!(breaker = %name, "{}", metrics.format_summary());
    }
    if !breakers.is_healthy() {
        eprintln!(
            "⚠️  Sensor API circuit breakers open: {}",
            breakers.open_circuits().join(", ")
        );
    }

    if failures > 0 {
        bail!("{failures} of {} field decisions failed", field_ids.len());
    }
    Ok(())
}
