//! `bd import` -- merge an NDJSON batch of issues into the local database.

use std::fs::File;
use std::io::{self, BufReader};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use beads_config::config::load_config;
use beads_storage::SqliteStore;
use beads_sync::route;
use beads_sync::{ImportOptions, ImportReport, MergeOptions, OrphanHandling};

use crate::cli::ImportArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd import` command.
pub fn run(ctx: &RuntimeContext, args: &ImportArgs) -> Result<()> {
    if args.format != "json" {
        bail!("unsupported import format '{}': only 'json' (NDJSON) is implemented", args.format);
    }
    if ctx.readonly && !args.dry_run {
        bail!("cannot import in read-only mode (pass --dry-run to validate only)");
    }

    let beads_dir = ctx
        .resolve_db_path()
        .context("no beads database found. Run 'bd init' to create one.")?;
    let db_path = beads_dir.join("beads.db");
    if !db_path.exists() {
        bail!(
            "no beads database found at {}\nHint: run 'bd init' to create a database",
            db_path.display()
        );
    }

    let config = load_config(&beads_dir).context("failed to load .beads/config.yaml")?;
    let local_prefix = config.prefix.clone().unwrap_or_else(|| "bd".to_string());
    let orphan_handling = args
        .orphan_handling
        .as_deref()
        .unwrap_or(&config.hierarchy.orphan_handling);

    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let (town_routes, _town_root) = route::load_town_routes(&beads_dir, &cwd);
    let town_prefixes: Vec<String> = town_routes.into_iter().map(|r| r.prefix).collect();

    let opts = ImportOptions {
        local_prefix: local_prefix.clone(),
        allowed_prefixes: config.allowed_prefixes(),
        town_prefixes,
        multi_replica: args.multi_replica || config.multi_replica,
        rename_on_import: args.rename_on_import,
        skip_prefix_validation: args.skip_prefix_validation,
        clear_duplicate_external_refs: args.clear_duplicate_external_refs,
        merge: MergeOptions {
            actor: ctx.actor.clone(),
            dry_run: args.dry_run,
            skip_update: args.skip_update,
            strict: args.strict,
            orphan_handling: OrphanHandling::parse(orphan_handling),
            ..MergeOptions::default()
        },
    };

    let _lock = if args.dry_run {
        None
    } else {
        Some(
            beads_lockfile::FileLock::acquire(beads_dir.join("beads.lock"))
                .context("another bd process is writing to this database")?,
        )
    };

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;

    let report = match &args.source {
        Some(path) if path != "-" => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
            beads_sync::import_batch(&store, BufReader::new(file), &opts)
        }
        _ => {
            let stdin = io::stdin();
            beads_sync::import_batch(&store, stdin.lock(), &opts)
        }
    }
    .context("import failed")?;

    if ctx.json {
        output_json(&ImportReportView::from(&report));
    } else {
        print_summary(&report, args.dry_run);
    }

    Ok(())
}

fn print_summary(report: &ImportReport, dry_run: bool) {
    if dry_run {
        println!("Import (dry run):");
    } else {
        println!("Import complete:");
    }
    println!("  created:   {}", report.merge.created);
    println!("  updated:   {}", report.merge.updated);
    println!("  unchanged: {}", report.merge.unchanged);
    println!("  skipped:   {}", report.merge.skipped);
    println!("  collisions: {}", report.merge.collisions);
    if !report.merge.id_mapping.is_empty() {
        println!("  renamed:");
        for (old, new) in &report.merge.id_mapping {
            println!("    {} -> {}", old, new);
        }
    }
    if !report.skipped_lines.is_empty() {
        println!("  skipped lines: {}", report.skipped_lines.len());
    }
    if !report.merge.mismatch_prefixes.is_empty() {
        println!("  mismatched prefixes:");
        for (prefix, count) in &report.merge.mismatch_prefixes {
            println!("    {}: {}", prefix, count);
        }
    }
    if report.associations.dependencies_added > 0 || report.associations.labels_added > 0 || report.associations.comments_added > 0 {
        println!(
            "  associations: {} dependencies, {} labels, {} comments",
            report.associations.dependencies_added, report.associations.labels_added, report.associations.comments_added
        );
    }
    if !report.associations.skipped_dependencies.is_empty() {
        println!("  skipped dependencies:");
        for d in &report.associations.skipped_dependencies {
            println!("    {}", d);
        }
    }
}

/// JSON view of an [`ImportReport`], field names chosen to match the rest of
/// the CLI's `--json` output conventions.
#[derive(Serialize)]
struct ImportReportView {
    created: usize,
    updated: usize,
    unchanged: usize,
    skipped: usize,
    collisions: usize,
    id_mapping: Vec<(String, String)>,
    skipped_lines: usize,
    mismatch_prefixes: Vec<(String, usize)>,
    dependencies_added: usize,
    labels_added: usize,
    comments_added: usize,
    skipped_dependencies: Vec<String>,
}

impl From<&ImportReport> for ImportReportView {
    fn from(r: &ImportReport) -> Self {
        Self {
            created: r.merge.created,
            updated: r.merge.updated,
            unchanged: r.merge.unchanged,
            skipped: r.merge.skipped,
            collisions: r.merge.collisions,
            id_mapping: r.merge.id_mapping.clone(),
            skipped_lines: r.skipped_lines.len(),
            mismatch_prefixes: r.merge.mismatch_prefixes.clone(),
            dependencies_added: r.associations.dependencies_added,
            labels_added: r.associations.labels_added,
            comments_added: r.associations.comments_added,
            skipped_dependencies: r.associations.skipped_dependencies.clone(),
        }
    }
}
