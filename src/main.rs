use std::process;
use std::sync::Arc;

use clap::Parser;
use rime::config::{self, CliArgs, Command, StatusArgs};
use rime::engine::CacheEngine;
use rime::storage::MemoryStorage;
use rime::telemetry;
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Telemetry(#[from] telemetry::TelemetryError),
    #[error("failed to serialize status report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("one or more invalidation patterns failed to execute")]
    ClearFailed,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_cli_error(&error);
        process::exit(1);
    }
}

fn report_cli_error(error: &CliError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "command failed");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "command failed");
    });
}

async fn run() -> Result<(), CliError> {
    let cli = CliArgs::parse();
    let settings = config::load(&cli)?;

    telemetry::init(&settings.logging)?;

    let command = cli.command.unwrap_or(Command::Status(StatusArgs::default()));
    let engine = CacheEngine::new(settings, Arc::new(MemoryStorage::new()));

    match command {
        Command::Status(args) => run_status(&engine, &args).await,
        Command::Clear(args) => run_clear(&engine, &args.pattern).await,
    }
}

async fn run_status(engine: &CacheEngine, args: &StatusArgs) -> Result<(), CliError> {
    let report = engine.status().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    Ok(())
}

async fn run_clear(engine: &CacheEngine, pattern: &str) -> Result<(), CliError> {
    if engine.clear(pattern).execute_queue().await {
        Ok(())
    } else {
        Err(CliError::ClearFailed)
    }
}
