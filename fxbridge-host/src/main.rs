//! fxbridge — CLI Entry Point
//!
//! Exercises the bridge from the command line: host discovery, entry point
//! resolution and the managed log sink.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fxbridge_host::locator::locator_for;
use fxbridge_host::logging::Stderr;
use fxbridge_host::{
    telemetry, BridgeConfig, HostfxrLoader, HostingContextManager, LogBridge, LogLevel, LogTarget,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bridge configuration file (JSON).
    #[arg(short, long, env = "FXBRIDGE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the host library path discovered for a reference file.
    Locate { reference: PathBuf },
    /// Initialize the runtime and resolve one managed entry point.
    Resolve {
        #[arg(long)]
        runtime_config: Option<PathBuf>,
        #[arg(short, long)]
        assembly: PathBuf,
        #[arg(short = 't', long = "type")]
        type_name: String,
        #[arg(short, long)]
        method: String,
    },
    /// Send one record through the managed log sink.
    Log {
        #[arg(short, long, default_value = "info")]
        level: LogLevel,
        message: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init("info");

    let config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    let manager = Arc::new(HostingContextManager::new(Box::new(
        HostfxrLoader::from_config(&config.host),
    )));

    match args.command {
        Command::Locate { reference } => {
            let path = locator_for(&config.host)
                .locate(&reference)
                .context("host library discovery failed")?;
            println!("{}", path.display());
        }
        Command::Resolve {
            runtime_config,
            assembly,
            type_name,
            method,
        } => {
            let runtime_config = runtime_config.unwrap_or_else(|| config.runtime_config_path());
            manager
                .acquire(&runtime_config)
                .with_context(|| format!("failed to initialize from {}", runtime_config.display()))?;
            let entry = manager.resolve(&assembly, &type_name, &method);
            manager.release();
            let entry = entry.context("entry point resolution failed")?;
            println!("{type_name}::{method} -> {:p}", entry.as_ptr());
        }
        Command::Log { level, message } => {
            let bridge = LogBridge::new(manager, Arc::new(Stderr));
            if let Err(e) = bridge.init(&LogTarget::from_config(&config)) {
                warn!(error = %e, "Writing to stderr instead");
            }
            bridge.log(level, message.as_bytes());
            bridge.shutdown();
        }
    }

    Ok(())
}
