//! # Teamforge Configuration Validator
//!
//! Command-line tool for checking a Teamforge TOML file (plus `TEAMFORGE_*`
//! environment overrides) before deploying it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use teamforge_core::config::ConfigManager;
use teamforge_core::constants::operation_types;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate Teamforge configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (defaults only when omitted)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Environment variable prefix for overrides
    #[arg(long, default_value = "TEAMFORGE")]
    env_prefix: String,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the effective configuration with secrets masked
    Show,

    /// Print the bulk run options derived from the configuration
    Options,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Show) => show_config(&cli),
        Some(Commands::Options) => show_options(&cli),
        Some(Commands::Validate) | None => validate(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration check completed");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration check failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<std::sync::Arc<ConfigManager>> {
    let source = cli
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());

    ConfigManager::load_with_env_prefix(cli.file.as_deref(), &cli.env_prefix)
        .with_context(|| format!("loading configuration from {source}"))
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    let config = manager.config();

    println!("🔧 Validating Teamforge configuration");
    println!("Environment: {}", manager.environment());
    if let Some(path) = manager.source_file() {
        println!("File: {}", path.display());
    }
    println!();
    println!(
        "✅ Session: {} (connect timeout {}s)",
        config.session.graph_base_url, config.session.connect_timeout_seconds
    );
    println!(
        "✅ Resilience: {} retries, read timeout {}s, write timeout {}s",
        config.resilience.retry.max_retries,
        config.resilience.read_timeout_seconds,
        config.resilience.write_timeout_seconds
    );
    println!(
        "✅ Circuit breakers: {} ({} component override(s))",
        if config.resilience.circuit_breakers.enabled { "enabled" } else { "disabled" },
        config.resilience.circuit_breakers.component_configs.len()
    );
    println!(
        "✅ Bulk defaults: batch {} / concurrency {} / timeout {}m",
        config.bulk.default_batch_size,
        config.bulk.default_max_concurrency,
        config.bulk.default_timeout_minutes
    );
    println!(
        "✅ Registry: retention {}m, sweep every {}s",
        config.registry.retention_minutes, config.registry.sweep_interval_seconds
    );
    Ok(())
}

fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    let rendered = serde_json::to_string_pretty(&manager.debug_config())
        .context("rendering configuration")?;
    println!("{rendered}");
    Ok(())
}

fn show_options(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    let options = manager.config().bulk.default_options();
    options
        .validate()
        .context("configured bulk defaults are not valid run options")?;

    println!("Default run options for: {}", operation_types::ALL.join(", "));
    let rendered = serde_json::to_string_pretty(&options).context("rendering options")?;
    println!("{rendered}");
    Ok(())
}
