//! # markflow CLI Module
//!
//! This module implements the CLI interface for markflow.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new record database
//! - `status` - Show store status
//! - `show` - Show one mark record
//! - `audit` - Show a record's audit trail

mod commands;

use clap::{Parser, Subcommand};
use markflow_core::MarkflowError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// markflow - exam-marks workflow server
///
/// A deterministic, role-gated marks lifecycle and outcome-attainment
/// engine. Every state change is audited; every attainment result is a
/// value or an explicit "not computable".
#[derive(Parser, Debug)]
#[command(name = "markflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the record database
    #[arg(short = 'D', long, global = true, default_value = "markflow.db")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "memory" (volatile)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Path to the academic configuration TOML
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Initialize a new empty record database
    Init {
        /// Force initialization even if the database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show store status
    Status,

    /// Show one mark record
    Show {
        /// Record id
        #[arg(short, long)]
        record: u64,
    },

    /// Show a record's audit trail
    Audit {
        /// Record id
        #[arg(short, long)]
        record: u64,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), MarkflowError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port, config }) => {
            cmd_server(&cli.database, backend, &host, port, config.as_deref()).await
        }
        Some(Commands::Init { force }) => cmd_init(&cli.database, force),
        Some(Commands::Status) => cmd_status(&cli.database, backend, json_mode),
        Some(Commands::Show { record }) => cmd_show(&cli.database, backend, json_mode, record),
        Some(Commands::Audit { record }) => cmd_audit(&cli.database, backend, json_mode, record),
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.database, backend, json_mode)
        }
    }
}
