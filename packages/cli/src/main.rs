#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for healthcare provider search.
//!
//! `search`, `geocode` and `reverse` build the engine from the environment,
//! run one operation and print the result as pretty JSON on stdout.
//! `serve` starts the HTTP API.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use medlocate_provider_models::ErrorKind;
use medlocate_search::{SearchConfig, SearchError, SearchOrchestrator, SearchRequest};
use serde::Serialize;

/// Find healthcare providers near a place or by name.
#[derive(Parser)]
#[command(name = "medlocate")]
#[command(about = "Find healthcare providers near a place or by name")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Search by coordinates, address or facility name.
    Search {
        /// Origin latitude. Requires `--lon`.
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Origin longitude. Requires `--lat`.
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Free-text origin address.
        #[arg(long)]
        address: Option<String>,

        /// Facility name.
        #[arg(long)]
        name: Option<String>,

        /// Result-set scope.
        #[arg(long)]
        scope: Option<String>,
    },

    /// Forward-geocode an address.
    Geocode {
        /// Address to resolve.
        address: String,
    },

    /// Reverse-geocode a coordinate pair.
    Reverse {
        /// Latitude.
        #[arg(allow_negative_numbers = true)]
        lat: f64,

        /// Longitude.
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },

    /// Start the HTTP API server.
    Serve,
}

/// Process exit code for a failure class.
const fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidInput => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::RateLimited => 4,
        ErrorKind::Upstream => 5,
        ErrorKind::Configuration | ErrorKind::Internal => 1,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), SearchError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| SearchError::Internal {
        message: format!("Failed to serialize output: {e}"),
    })?;
    println!("{json}");
    Ok(())
}

fn build_engine() -> Result<SearchOrchestrator, Box<dyn std::error::Error>> {
    let config = SearchConfig::from_env()?;
    Ok(medlocate_search::engine::from_config(&config)?)
}

async fn run_command(engine: &SearchOrchestrator, command: Commands) -> Result<(), SearchError> {
    match command {
        Commands::Search {
            lat,
            lon,
            address,
            name,
            scope,
        } => {
            let request = SearchRequest {
                latitude: lat,
                longitude: lon,
                address,
                name,
                scope,
            };
            print_json(&engine.search(&request).await?)
        }
        Commands::Geocode { address } => print_json(&engine.geocode_address(&address).await?),
        Commands::Reverse { lat, lon } => print_json(&engine.reverse_geocode(lat, lon).await?),
        // Handled in `main` before the engine is built.
        Commands::Serve => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Serve) {
        // The server uses actix-web's runtime, so run it on a blocking
        // thread to avoid nesting runtimes.
        let served = tokio::task::spawn_blocking(|| {
            actix_web::rt::System::new()
                .block_on(medlocate_server::run_from_env())
                .map_err(|e| e.to_string())
        })
        .await;
        return match served {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(e)) => {
                log::error!("Server failed: {e}");
                ExitCode::FAILURE
            }
            Err(e) => {
                log::error!("Server task failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let engine = match build_engine() {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(exit_code(ErrorKind::Configuration));
        }
    };

    match run_command(&engine, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(exit_code(e.kind()))
        }
    }
}
