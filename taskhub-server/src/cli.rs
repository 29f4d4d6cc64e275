use clap::{Parser, Subcommand};
use taskhub_models::ReplicaRole;

/// Taskhub - orchestration worker hosted in a leader-elected replica
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Run as standalone server (API + replica controller + worker)
    Standalone {
        /// API port (default: TASKHUB_PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Role delivered to the controller at startup (default: TASKHUB_INITIAL_ROLE or primary)
        #[arg(short, long)]
        role: Option<ReplicaRole>,
    },

    /// Run an orchestration on a running server and wait for it
    Run {
        /// Orchestration type name (e.g., "TestOrchestration")
        orchestration_type: String,

        /// JSON input (default: null)
        #[arg(short, long)]
        input: Option<String>,

        /// Seconds to wait for completion
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },

    /// Show the latest execution of an instance
    Get {
        /// Instance id
        instance_id: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Purge history of orchestrations completed before now
    Purge,
}
