//! ConceptDB: rebuilds the derived concept and category graph.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use conceptdb_core::RebuildConfig;
use conceptdb_rebuild::{RebuildOrchestrator, RebuildReport};
use conceptdb_store::{CatalogDocument, SqliteStore};

fn resolve_data_dir(arg: Option<&String>) -> PathBuf {
    if let Some(dir) = arg {
        return PathBuf::from(dir);
    }
    std::env::var("CONCEPTDB_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("ConceptDB: derived concept and category graph");
    println!();
    println!("Usage: conceptdb <command> [data-dir] [--json]");
    println!();
    println!("Commands:");
    println!("  rebuild [data-dir]       Rebuild concepts and categories from the source tables");
    println!("  validate [data-dir]      Check referential integrity of a rebuilt store");
    println!("  stats [data-dir]         Show per-table row counts");
    println!("  load <file> [data-dir]   Load catalog rows from a JSON array, ids from sources");
    println!("  help                     Show this help message");
    println!();
    println!("Environment:");
    println!("  CONCEPTDB_DATA_DIR, CONCEPTDB_TAXONOMY, CONCEPTDB_MIN_WORD_LENGTH,");
    println!("  CONCEPTDB_MAX_RELATED, CONCEPTDB_MAX_ADJACENT,");
    println!("  CONCEPTDB_MAX_RELATED_CATEGORIES, CONCEPTDB_COLLISION_ATTEMPTS");
}

fn print_rebuild(report: &RebuildReport) {
    let c = &report.counts;
    println!("\n=== ConceptDB Rebuild {} ===\n", report.run_id);
    println!("  State:            {}", report.state);
    if let Some(stage) = report.failed_in {
        println!("  Failed in:        {}", stage);
    }
    println!("  Catalog read:     {}", c.catalog_rows_read);
    println!("  Passages read:    {}", c.passage_rows_read);
    println!("  Concepts:         {}", c.concepts);
    println!("  Categories:       {}", c.categories);
    println!("  Adjacency edges:  {}", c.adjacency_edges);
    println!("  Related edges:    {}", c.related_edges);
    println!("  Dangling dropped: {}", c.dangling_references);
    println!("  Index failures:   {}", c.index_failures);
    if let Some(digest) = &report.concept_digest {
        println!("  Concept digest:   {}", digest);
    }
    println!("  Duration:         {}ms", report.duration_ms);

    if !report.warnings.is_empty() {
        println!("\n  Warnings:");
        for w in &report.warnings {
            println!("    - {}", w);
        }
    }
    if let Some(e) = &report.error {
        println!("\n  Error: {}", e);
    }
    println!();
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let json = args.iter().any(|a| a == "--json");
    let positional: Vec<&String> = args.iter().skip(1).filter(|a| !a.starts_with("--")).collect();

    let Some(command) = positional.first() else {
        print_help();
        return Ok(());
    };
    let data_arg = if command.as_str() == "load" { 2 } else { 1 };
    let data_dir = resolve_data_dir(positional.get(data_arg).copied());

    match command.as_str() {
        "rebuild" => {
            info!("Data directory: {}", data_dir.display());
            let config = RebuildConfig::from_env(&data_dir)?;
            let store = SqliteStore::open(&config.data_paths.root)
                .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
            let mut orchestrator = RebuildOrchestrator::new(&store, config)?;
            let outcome = orchestrator.run();
            let report = orchestrator.report();
            if json {
                println!("{}", serde_json::to_string_pretty(report)?);
            } else {
                print_rebuild(report);
            }
            if outcome.is_err() {
                std::process::exit(1);
            }
        }
        "validate" => {
            let config = RebuildConfig::from_env(&data_dir)?;
            let store = SqliteStore::open(&config.data_paths.root)
                .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
            let report =
                conceptdb_rebuild::validate(&store, config.min_word_length, config.max_related)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                conceptdb_rebuild::print_report(&report);
            }
            std::process::exit(if report.is_valid() { 0 } else { 1 });
        }
        "stats" => {
            let store = SqliteStore::open(&data_dir)
                .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
            info!("Database: {}", store.path().display());
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "load" => {
            let Some(file) = positional.get(1) else {
                eprintln!("Usage: conceptdb load <file> [data-dir]");
                std::process::exit(1);
            };
            let config = RebuildConfig::from_env(&data_dir)?;
            let rows: Vec<CatalogDocument> = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            let store = SqliteStore::open(&config.data_paths.root)
                .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
            let loaded = store.load_catalog(rows, config.collision_attempts)?;
            info!("Loaded {} catalog rows into {}", loaded.len(), store.path().display());
            if json {
                println!("{}", serde_json::to_string_pretty(&loaded)?);
            } else {
                for doc in &loaded {
                    println!("  {:>10}  {}", doc.id, doc.source);
                }
            }
        }
        "help" | "-h" => print_help(),
        other => {
            eprintln!("Unknown command: {}. Use 'conceptdb help' for usage.", other);
            std::process::exit(1);
        }
    }

    Ok(())
}
