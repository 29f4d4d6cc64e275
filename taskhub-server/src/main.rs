use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod commands;
mod config;
mod hub;
mod remote;
mod replica;

use cli::{Args, Mode};
use config::Config;

/// Initialize tracing with dual output:
/// 1. Console output (stdout)
/// 2. File output (~/.taskhub/server.log)
fn initialize_tracing() -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,\
         taskhub_core=debug,\
         taskhub_server=debug,\
         taskhub_orchestrations=info"
            .into()
    });

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let taskhub_dir = PathBuf::from(home).join(".taskhub");
    std::fs::create_dir_all(&taskhub_dir).ok();

    let file_appender = tracing_appender::rolling::never(&taskhub_dir, "server.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops file logging, so it lives for the whole process
    std::mem::forget(guard);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let stdout_layer = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    initialize_tracing()?;

    match args.mode {
        Mode::Standalone { port, role } => commands::server::run_standalone_mode(config, port, role).await,
        Mode::Run {
            orchestration_type,
            input,
            timeout,
        } => commands::orchestration::run(&config.api_url, &orchestration_type, input, timeout).await,
        Mode::Get { instance_id, output } => {
            commands::orchestration::get(&config.api_url, &instance_id, &output).await
        }
        Mode::Purge => commands::orchestration::purge(&config.api_url).await,
    }
}
