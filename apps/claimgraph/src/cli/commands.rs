//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Read-only graph commands attach to the database without creating the
//! schema, so pointing them at a fresh path reports an empty graph instead of
//! initializing one.

use crate::api::{self, AppState};
use crate::config::AppConfig;
use claimgraph_core::{
    ClaimGraphError, Frontier, GraphPopulator, GraphService, LinkSource, ResolvedItem, Store,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Maximum size of a resolved-item JSON file (10 MB).
const MAX_POPULATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    pub db_path: PathBuf,
    pub config: AppConfig,
    pub json_mode: bool,
}

impl Context {
    fn open(&self) -> Result<Store, ClaimGraphError> {
        Store::open(&self.db_path)
    }

    fn attach(&self) -> Result<Store, ClaimGraphError> {
        Store::attach(&self.db_path)
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Validate an input file path: it must exist, be a regular file and stay
/// under `max_size` bytes.
fn validate_input_file(path: &Path, max_size: u64) -> Result<PathBuf, ClaimGraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        ClaimGraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(ClaimGraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| ClaimGraphError::IoError(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > max_size {
        return Err(ClaimGraphError::InvalidInput(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(canonical)
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(ctx: Context, host: &str, port: u16) -> Result<(), ClaimGraphError> {
    let store = ctx.open()?;

    println!("claimgraph server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Database: {}", ctx.db_path.display());
    println!(
        "  Conflict: runner-up >= {}% of winner",
        ctx.config.trust.conflict_ratio_percent
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = AppState::new(store, ctx.config);
    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, state).await
}

// =============================================================================
// STATUS / INIT
// =============================================================================

/// Show graph row counts.
pub fn cmd_status(ctx: &Context) -> Result<(), ClaimGraphError> {
    let stats = GraphService::new(ctx.attach()?).stats()?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "database": ctx.db_path.to_string_lossy(),
            "entities": stats.entities,
            "aliases": stats.aliases,
            "edges": stats.edges,
            "evidence": stats.evidence,
        }));
        return Ok(());
    }

    println!("claimgraph Status");
    println!("=================");
    println!("Database: {}", ctx.db_path.display());
    println!();
    println!("Entities: {}", stats.entities);
    println!("Aliases:  {}", stats.aliases);
    println!("Edges:    {}", stats.edges);
    println!("Evidence: {}", stats.evidence);
    Ok(())
}

/// Create the database schema.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), ClaimGraphError> {
    if ctx.db_path.exists() && !force {
        return Err(ClaimGraphError::InvalidInput(
            "Database already exists. Use --force to initialize it anyway.".to_string(),
        ));
    }
    ctx.open()?;
    println!("Initialized database at {}", ctx.db_path.display());
    Ok(())
}

// =============================================================================
// IDENTITY COMMANDS
// =============================================================================

/// Resolve free text to a canonical entity.
pub fn cmd_resolve(ctx: &Context, query: &str, brand: Option<&str>) -> Result<(), ClaimGraphError> {
    let found = GraphService::new(ctx.attach()?).resolve_identity(query, brand)?;

    if ctx.json_mode {
        print_json(&found);
        return Ok(());
    }

    match found {
        Some(m) => {
            println!(
                "{} -> entity {} '{}' ({})",
                query,
                m.entity.id,
                m.entity.canonical_name,
                m.entity.kind.as_str()
            );
            println!(
                "  via alias '{}' [{:?}], confidence {}",
                m.alias.alias, m.match_kind, m.confidence
            );
        }
        None => println!("{}: no match", query),
    }
    Ok(())
}

/// Check one consumable/printer pair, or list everything the consumable fits.
pub fn cmd_compat(
    ctx: &Context,
    consumable: &str,
    printer: Option<&str>,
) -> Result<(), ClaimGraphError> {
    let graph = GraphService::new(ctx.attach()?);

    if let Some(printer) = printer {
        let compatible = graph.check_compatibility(consumable, printer)?;
        if ctx.json_mode {
            print_json(&serde_json::json!({ "compatible": compatible }));
        } else {
            let verdict = if compatible { "compatible" } else { "not known to be compatible" };
            println!("{} / {}: {}", consumable, printer, verdict);
        }
        return Ok(());
    }

    let entities = graph.compatible_with(consumable)?;
    if ctx.json_mode {
        print_json(&entities);
    } else if entities.is_empty() {
        println!("{}: no compatible entities", consumable);
    } else {
        for entity in &entities {
            println!("  {:>6}  {}", entity.id, entity.canonical_name);
        }
    }
    Ok(())
}

/// Bind an alias to an entity.
pub fn cmd_link(
    ctx: &Context,
    alias: &str,
    canonical_name: &str,
    brand: Option<&str>,
    source: LinkSource,
) -> Result<(), ClaimGraphError> {
    let outcome = GraphService::new(ctx.open()?).link_alias(alias, canonical_name, brand, source)?;

    if ctx.json_mode {
        print_json(&outcome);
        return Ok(());
    }

    println!(
        "'{}' -> entity {} '{}'{}{}",
        outcome.alias.alias,
        outcome.entity.id,
        outcome.entity.canonical_name,
        if outcome.entity_created { " (new entity)" } else { "" },
        if outcome.alias_created { "" } else { " (alias already known)" },
    );
    Ok(())
}

/// Write resolved research from a JSON file into the graph.
pub fn cmd_populate(
    ctx: &Context,
    file: &Path,
    item_id: &str,
    job_id: &str,
) -> Result<(), ClaimGraphError> {
    let path = validate_input_file(file, MAX_POPULATE_FILE_SIZE)?;
    let text = std::fs::read_to_string(&path)
        .map_err(|e| ClaimGraphError::IoError(format!("Read file: {}", e)))?;
    let item: ResolvedItem = serde_json::from_str(&text)
        .map_err(|e| ClaimGraphError::InvalidInput(format!("Invalid resolved item: {}", e)))?;

    let report = GraphPopulator::new(ctx.open()?).populate_from_research(item_id, &item, job_id)?;

    if ctx.json_mode {
        print_json(&report);
        return Ok(());
    }

    println!("Populated entity {} for item {}", report.entity_id, item_id);
    println!("  Entities created:  {}", report.entities_created);
    println!("  Edges created:     {}", report.edges_created);
    println!("  Aliases created:   {}", report.aliases_created);
    println!("  Evidence attached: {}", report.evidence_attached);
    Ok(())
}

// =============================================================================
// FRONTIER COMMANDS
// =============================================================================

/// Show task counts for a job.
pub fn cmd_frontier_stats(ctx: &Context, job_id: &str) -> Result<(), ClaimGraphError> {
    let stats = Frontier::new(ctx.open()?).stats(job_id)?;

    if ctx.json_mode {
        print_json(&stats);
        return Ok(());
    }

    println!("Frontier: {}", stats.job_id);
    println!("  Pending:    {}", stats.pending);
    println!("  Processing: {}", stats.processing);
    println!("  Completed:  {}", stats.completed);
    println!("  Failed:     {}", stats.failed);
    println!("  Total:      {}", stats.total);
    Ok(())
}

/// Return stale processing tasks to pending.
pub fn cmd_reclaim(ctx: &Context, older_than_secs: Option<u32>) -> Result<(), ClaimGraphError> {
    let older_than = older_than_secs.map_or_else(
        || ctx.config.frontier.stale_after(),
        |secs| chrono::Duration::seconds(i64::from(secs)),
    );
    let reclaimed = Frontier::new(ctx.open()?).reclaim_stale(older_than)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "reclaimed": reclaimed }));
    } else {
        println!("Reclaimed {} stale task(s)", reclaimed);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn context(dir: &tempfile::TempDir) -> Context {
        Context {
            db_path: dir.path().join("claimgraph.redb"),
            config: AppConfig::default(),
            json_mode: true,
        }
    }

    #[test]
    fn init_refuses_existing_database_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        cmd_init(&ctx, false).unwrap();
        assert!(matches!(
            cmd_init(&ctx, false),
            Err(ClaimGraphError::InvalidInput(_))
        ));
        cmd_init(&ctx, true).unwrap();
    }

    #[test]
    fn populate_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let file = dir.path().join("item.json");
        std::fs::write(
            &file,
            r#"{"primary_id":"CE285A","brand":"HP","compatible_devices":["LaserJet P1102"]}"#,
        )
        .unwrap();

        cmd_populate(&ctx, &file, "item-1", "job-1").unwrap();
        let graph = GraphService::new(ctx.attach().unwrap());
        assert!(graph.check_compatibility("CE285A", "LaserJet P1102").unwrap());
    }

    #[test]
    fn populate_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let file = dir.path().join("item.json");
        std::fs::write(&file, "{not json").unwrap();
        assert!(matches!(
            cmd_populate(&ctx, &file, "item-1", "job-1"),
            Err(ClaimGraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn status_on_fresh_path_reports_empty_graph() {
        let dir = tempfile::tempdir().unwrap();
        cmd_status(&context(&dir)).unwrap();
    }

    #[test]
    fn read_only_commands_leave_fresh_path_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        cmd_status(&ctx).unwrap();
        cmd_resolve(&ctx, "CE285A", None).unwrap();
        assert!(!ctx.db_path.exists());
    }
}
