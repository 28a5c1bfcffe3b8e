//! # markflow - Exam-Marks Workflow Server
//!
//! The main binary for the markflow marks engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for store operations
//! - Academic configuration loading
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                apps/markflow (THE BINARY)               │
//! │                                                         │
//! │   ┌─────────────┐            ┌─────────────┐            │
//! │   │   CLI       │            │   HTTP API  │            │
//! │   │  (clap)     │            │   (axum)    │            │
//! │   └──────┬──────┘            └──────┬──────┘            │
//! │          │                          │                   │
//! │          └────────────┬─────────────┘                   │
//! │                       ▼                                 │
//! │              ┌─────────────────┐                        │
//! │              │  markflow-core  │                        │
//! │              │   (THE LOGIC)   │                        │
//! │              └─────────────────┘                        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server with academic configuration
//! markflow server --host 0.0.0.0 --port 8080 --config academic.toml
//!
//! # CLI operations
//! markflow status
//! markflow show --record 42
//! markflow audit --record 42
//! ```

use clap::Parser;
use markflow::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — MARKFLOW_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MARKFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "markflow=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the markflow startup banner.
fn print_banner() {
    println!(
        r#"
  ███╗   ███╗ █████╗ ██████╗ ██╗  ██╗███████╗██╗      ██████╗ ██╗    ██╗
  ████╗ ████║██╔══██╗██╔══██╗██║ ██╔╝██╔════╝██║     ██╔═══██╗██║    ██║
  ██╔████╔██║███████║██████╔╝█████╔╝ █████╗  ██║     ██║   ██║██║ █╗ ██║
  ██║╚██╔╝██║██╔══██║██╔══██╗██╔═██╗ ██╔══╝  ██║     ██║   ██║██║███╗██║
  ██║ ╚═╝ ██║██║  ██║██║  ██║██║  ██╗██║     ███████╗╚██████╔╝╚███╔███╔╝
  ╚═╝     ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚══════╝ ╚═════╝  ╚══╝╚══╝

  Exam-Marks Workflow Server v{}

  Deterministic • Role-gated • Auditable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
