//! GCP Exporter - Prometheus exporter for Google Cloud Platform resources
//!
//! Periodically lists Compute Engine instances and region quotas with a
//! service account token and serves them as gauges.

mod api;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::builder::BoolishValueParser;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use commands::{get_token, start};
use exporter_lib::{default_registry, OptionValues, VersionInfo};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Prometheus exporter for Google Cloud Platform resources
#[derive(Parser)]
#[command(name = "gcp-exporter", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, env = "DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR", value_parser = BoolishValueParser::new())]
    pub no_color: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the exporter service
    Start(start::StartArgs),

    /// Request an access token for the service account and print it
    GetToken(get_token::GetTokenArgs),
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line (default)
    #[default]
    Json,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_ansi(!cli.no_color)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let version = VersionInfo::current(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    // Collector options extend the start command at runtime
    let registry = default_registry();
    let options = registry.options();

    let matches = Cli::command()
        .version(version.short_line())
        .long_version(version.extended())
        .mut_subcommand("start", |start| commands::with_options(start, &options))
        .get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    if cli.no_color {
        output::disable_color();
    }
    init_tracing(&cli);

    info!("Starting {}", version.line());

    let result = match cli.command {
        Commands::Start(args) => {
            let values = matches
                .subcommand_matches("start")
                .map(|start| commands::option_values(&options, start))
                .unwrap_or_else(OptionValues::new);
            start::run(args, values, registry, version).await
        }
        Commands::GetToken(args) => get_token::run(args, &version).await,
    };

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Command failed");
    }
    result
}
