//! # claimgraph - Claim Resolution Server
//!
//! The main binary for the claimgraph claim-resolution and identity-graph
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               apps/claimgraph (THE BINARY)           │
//! │                                                      │
//! │   ┌─────────────┐            ┌─────────────┐         │
//! │   │    CLI      │            │  HTTP API   │         │
//! │   │   (clap)    │            │   (axum)    │         │
//! │   └──────┬──────┘            └──────┬──────┘         │
//! │          └─────────────┬────────────┘                │
//! │                        ▼                             │
//! │               ┌─────────────────┐                    │
//! │               │ claimgraph-core │                    │
//! │               │   (THE LOGIC)   │                    │
//! │               └─────────────────┘                    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! claimgraph server --host 0.0.0.0 --port 8080 --config claimgraph.toml
//!
//! # CLI operations
//! claimgraph status
//! claimgraph resolve "CE285A" --brand HP
//! claimgraph compat CE285A "LaserJet P1102"
//! claimgraph populate -f research.json --item-id item-1 --job-id job-1
//! ```

use clap::Parser;
use claimgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // CLAIMGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("CLAIMGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "claimgraph=info,claimgraph_core=info,tower_http=debug".into());

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

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  claimgraph v{}
  trust-weighted claims • identity graph
"#,
        env!("CARGO_PKG_VERSION")
    );
}
