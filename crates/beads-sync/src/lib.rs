//! Import/merge synchronization core.
//!
//! Wires the transport reader, prefix gate, batch validator, merge engine,
//! and associations importer into one `import_batch` entry point. Each
//! stage is also exposed individually for callers (tests, the `bd import`
//! command) that need finer control.

pub mod associations;
pub mod error;
pub mod merge;
pub mod prefix_gate;
pub mod route;
pub mod transport;
pub mod validator;

use std::io::BufRead;

use beads_core::issue::Issue;
use beads_storage::traits::Storage;
use tracing::info;

pub use error::{Result, SyncError};
pub use merge::{MergeOptions, MergeResult, OrphanHandling};
pub use prefix_gate::{AllowedPrefixes, GateOptions};
pub use transport::{SkippedLine, TransportError};

/// End-to-end options for [`import_batch`], covering every stage from the
/// prefix gate through the associations import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub local_prefix: String,
    pub allowed_prefixes: Vec<String>,
    pub town_prefixes: Vec<String>,
    /// Distinguished "allow all prefixes" mode for federated multi-replica
    /// deployments; see [`crate::prefix_gate::AllowedPrefixes::All`].
    pub multi_replica: bool,
    pub rename_on_import: bool,
    pub skip_prefix_validation: bool,
    pub clear_duplicate_external_refs: bool,
    pub merge: MergeOptions,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            local_prefix: String::new(),
            allowed_prefixes: Vec::new(),
            town_prefixes: Vec::new(),
            multi_replica: false,
            rename_on_import: false,
            skip_prefix_validation: false,
            clear_duplicate_external_refs: false,
            merge: MergeOptions::default(),
        }
    }
}

/// Combined report of one `import_batch` run.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub skipped_lines: Vec<SkippedLine>,
    pub renames: Vec<(String, String)>,
    pub mismatch_prefixes: Vec<(String, usize)>,
    pub merge: MergeResult,
    pub associations: associations::AssociationResult,
}

/// Reads, gates, validates, merges, and reconciles associations for one
/// NDJSON batch in a single call.
pub fn import_batch<R: BufRead>(store: &dyn Storage, reader: R, opts: &ImportOptions) -> Result<ImportReport> {
    let (records, skipped_lines) =
        transport::read_batch(reader).map_err(|e| SyncError::Storage(beads_storage::error::StorageError::validation(e.to_string())))?;
    info!(count = records.len(), skipped = skipped_lines.len(), "read import batch");

    let gate = run_gate_and_validate(records, opts)?;
    let gate_records = gate.records;

    let merge_result = merge::merge(store, gate_records.clone(), &opts.merge)?;
    let assoc_result = if opts.merge.dry_run {
        associations::AssociationResult::default()
    } else {
        associations::import_associations(store, &gate_records, &opts.merge.actor, opts.merge.strict)?
    };

    Ok(ImportReport {
        skipped_lines,
        renames: gate.renames,
        mismatch_prefixes: gate.mismatch_prefixes,
        merge: merge_result,
        associations: assoc_result,
    })
}

fn run_gate_and_validate(mut records: Vec<Issue>, opts: &ImportOptions) -> Result<prefix_gate::GateResult> {
    validator::validate_batch(&mut records, opts.clear_duplicate_external_refs)?;

    let allowed = AllowedPrefixes::build(&opts.local_prefix, &opts.allowed_prefixes, &opts.town_prefixes, opts.multi_replica);
    let gate_opts = GateOptions {
        local_prefix: &opts.local_prefix,
        rename_on_import: opts.rename_on_import,
        skip_prefix_validation: opts.skip_prefix_validation,
        dry_run: opts.merge.dry_run,
    };
    prefix_gate::apply(records, &allowed, &gate_opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use std::io::Cursor;

    #[test]
    fn import_options_default_has_allow_orphans() {
        let opts = ImportOptions::default();
        assert!(matches!(opts.merge.orphan_handling, OrphanHandling::Allow));
    }

    #[test]
    fn run_gate_and_validate_rejects_foreign_prefix_by_default() {
        let records = vec![IssueBuilder::new("Foreign").id("zz-1").build()];
        let opts = ImportOptions {
            local_prefix: "bd".to_string(),
            ..Default::default()
        };
        let err = run_gate_and_validate(records, &opts).unwrap_err();
        assert!(matches!(err, SyncError::PrefixMismatch(_)));
    }

    #[test]
    fn transport_error_reading_empty_batch_is_empty() {
        let (issues, skipped) = transport::read_batch(Cursor::new("")).unwrap();
        assert!(issues.is_empty());
        assert!(skipped.is_empty());
    }
}
