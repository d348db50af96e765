//! # claimgraph CLI Module
//!
//! This module implements the CLI interface for claimgraph.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show graph row counts
//! - `init` - Create the database schema
//! - `resolve` - Resolve free text to a canonical entity
//! - `compat` - Check consumable/printer compatibility
//! - `link` - Bind an alias to an entity
//! - `populate` - Write resolved research from a JSON file into the graph
//! - `frontier-stats` - Task counts for a job
//! - `reclaim` - Return stale processing tasks to pending

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use claimgraph_core::{ClaimGraphError, LinkSource};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// claimgraph - trust-weighted claim resolution and identity graph.
#[derive(Parser, Debug)]
#[command(name = "claimgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the redb database
    #[arg(short = 'D', long, global = true, default_value = "claimgraph.redb")]
    pub database: PathBuf,

    /// Optional TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Who asserted a link, as given on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkSourceArg {
    Explicit,
    Inferred,
}

impl From<LinkSourceArg> for LinkSource {
    fn from(arg: LinkSourceArg) -> Self {
        match arg {
            LinkSourceArg::Explicit => Self::Explicit,
            LinkSourceArg::Inferred => Self::Inferred,
        }
    }
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
    },

    /// Show graph row counts
    Status,

    /// Create the database schema
    Init {
        /// Succeed even if the database file already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Resolve free text to a canonical entity
    Resolve {
        /// Identifier, cross reference or name to look up
        query: String,

        /// Prefer entities linked to this brand
        #[arg(short, long)]
        brand: Option<String>,
    },

    /// Check whether a consumable fits a printer, or list what it fits
    Compat {
        /// Consumable reference
        consumable: String,

        /// Printer reference; omit to list every compatible entity
        printer: Option<String>,
    },

    /// Bind an alias to the entity with the given canonical name
    Link {
        /// Alias text
        alias: String,

        /// Canonical name of the target entity (created if missing)
        canonical_name: String,

        /// Brand recorded on a newly created entity
        #[arg(short, long)]
        brand: Option<String>,

        /// Who asserted the link
        #[arg(short, long, value_enum, default_value = "explicit")]
        source: LinkSourceArg,
    },

    /// Write resolved research from a JSON file into the graph
    Populate {
        /// Path to a JSON resolved item
        #[arg(short, long)]
        file: PathBuf,

        /// Catalog item the research belongs to
        #[arg(long)]
        item_id: String,

        /// Job that produced the research
        #[arg(long)]
        job_id: String,
    },

    /// Show frontier task counts for a job
    FrontierStats {
        /// Job identifier
        job_id: String,
    },

    /// Return processing tasks claimed too long ago to pending
    Reclaim {
        /// Age threshold in seconds (defaults to the configured stale age)
        #[arg(long)]
        older_than_secs: Option<u32>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), ClaimGraphError> {
    let ctx = Context {
        db_path: cli.database,
        config: crate::config::AppConfig::load(cli.config.as_deref())?,
        json_mode: cli.json_mode,
    };

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(ctx, &host, port).await,
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Resolve { query, brand }) => cmd_resolve(&ctx, &query, brand.as_deref()),
        Some(Commands::Compat {
            consumable,
            printer,
        }) => cmd_compat(&ctx, &consumable, printer.as_deref()),
        Some(Commands::Link {
            alias,
            canonical_name,
            brand,
            source,
        }) => cmd_link(
            &ctx,
            &alias,
            &canonical_name,
            brand.as_deref(),
            source.into(),
        ),
        Some(Commands::Populate {
            file,
            item_id,
            job_id,
        }) => cmd_populate(&ctx, &file, &item_id, &job_id),
        Some(Commands::FrontierStats { job_id }) => cmd_frontier_stats(&ctx, &job_id),
        Some(Commands::Reclaim { older_than_secs }) => cmd_reclaim(&ctx, older_than_secs),
    }
}
