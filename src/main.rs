//! WolfLog - Segmented Commit Log
//!
//! Serves an append-only commit log over HTTP.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolflog::api::HttpServer;
use wolflog::config::WolfLogConfig;
use wolflog::error::Result;
use wolflog::log::Log;

/// WolfLog - Segmented Commit Log
#[derive(Parser)]
#[command(name = "wolflog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolflog.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the log and serve the HTTP API
    Serve {
        /// Override the data directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Override the HTTP listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolflog.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show log offsets and segments
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init writes the config file, so it cannot require one
    let config = match cli.command {
        Commands::Init { .. } => WolfLogConfig::default(),
        _ => load_config(&cli.config)?,
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level);

    match cli.command {
        Commands::Init { output } => run_init(output),
        Commands::Serve { data_dir, listen } => run_serve(config, data_dir, listen).await,
        Commands::Validate => run_validate(&cli.config, config),
        Commands::Info => run_info(config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: &Path) -> Result<WolfLogConfig> {
    match WolfLogConfig::from_file(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            eprintln!("Failed to load configuration from {:?}: {}", path, e);
            eprintln!("Run `wolflog init` to generate one");
            Err(e)
        }
    }
}

/// Open the log and serve it until Ctrl+C
async fn run_serve(
    mut config: WolfLogConfig,
    data_dir: Option<PathBuf>,
    listen: Option<String>,
) -> Result<()> {
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(address) = listen {
        config.api.bind_address = address;
    }

    tracing::info!("Starting WolfLog...");

    if let Err(e) = std::fs::create_dir_all(config.data_dir()) {
        tracing::error!("Failed to create data directory {:?}: {}", config.data_dir(), e);
        return Err(e.into());
    }

    let log = match Log::new(config.data_dir().clone(), config.log.clone()) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::error!("Failed to open log: {}", e);
            return Err(e);
        }
    };

    let server = HttpServer::new(config.api.clone(), Arc::clone(&log));
    let served = server.start(shutdown_signal()).await;

    // Close cleanly so index files are shrunk to their written entries
    log.close()?;
    tracing::info!("WolfLog stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}

/// Write a default configuration file
fn run_init(output: PathBuf) -> Result<()> {
    if output.exists() {
        eprintln!("Configuration file {:?} already exists", output);
        return Err(wolflog::Error::Config(format!("{:?} already exists", output)));
    }

    let content = format!(
        "# WolfLog Configuration\n# Generated configuration file\n\n{}",
        WolfLogConfig::default().to_toml()?
    );
    std::fs::write(&output, content)?;

    println!("✓ Configuration written to {:?}", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(path: &Path, config: WolfLogConfig) -> Result<()> {
    println!("✓ Configuration {:?} is valid", path);
    println!("  Data Directory:   {:?}", config.data_dir());
    println!("  Max Store Bytes:  {}", config.log.segment.max_store_bytes);
    println!("  Max Index Bytes:  {}", config.log.segment.max_index_bytes);
    println!("  Initial Offset:   {}", config.log.segment.initial_offset);
    println!("  API Address:      {}", config.api.bind_address);
    Ok(())
}

/// Show log information
fn run_info(config: WolfLogConfig) -> Result<()> {
    let log = Log::new(config.data_dir().clone(), config.log.clone())?;

    println!("WolfLog Information");
    println!("===================");
    println!();
    println!("Data Directory:   {:?}", log.dir());
    println!("Lowest Offset:    {}", log.lowest_offset()?);
    println!("Highest Offset:   {}", log.highest_offset()?);
    println!("Segments:         {}", log.segment_count()?);
    println!();

    for info in log.segments_info()? {
        println!(
            "  [{:>10}..{:>10})  store {:>8} B  index {:>6} B",
            info.base_offset, info.next_offset, info.store_bytes, info.index_bytes
        );
    }

    log.close()
}
