//! The reconciliation engine (C5): the multi-phase per-record merge of an
//! incoming batch against the local store.
//!
//! This is the heart of the synchronization core. Everything upstream
//! (transport, prefix gate, validator) exists to hand this module a clean
//! batch; everything downstream (associations) depends on the issues this
//! module creates already being present.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use beads_core::enums::Status;
use beads_core::filter::IssueFilter;
use beads_core::issue::Issue;
use beads_storage::error::StorageError;
use beads_storage::traits::{IssueUpdates, Storage, Transaction};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::route::extract_prefix;

/// Orphan-handling mode for hierarchical (dotted) IDs whose parent is
/// missing from both the local store and the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanHandling {
    Strict,
    /// Not implemented; treated identically to `Allow` with a warning.
    Resurrect,
    Skip,
    Allow,
}

impl OrphanHandling {
    pub fn parse(s: &str) -> Self {
        match s {
            "strict" => Self::Strict,
            "resurrect" => Self::Resurrect,
            "skip" => Self::Skip,
            _ => Self::Allow,
        }
    }
}

/// Options accepted by the merge engine.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub actor: String,
    pub dry_run: bool,
    pub skip_update: bool,
    pub strict: bool,
    pub orphan_handling: OrphanHandling,
    /// Caller-supplied `id -> localSnapshotTimestamp` map. A record passes
    /// protection iff its `updated_at` is strictly newer than the entry.
    pub protect_local_export_ids: HashMap<String, DateTime<Utc>>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            actor: "import".to_string(),
            dry_run: false,
            skip_update: false,
            strict: false,
            orphan_handling: OrphanHandling::Allow,
            protect_local_export_ids: HashMap::new(),
        }
    }
}

/// Result of a merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub collisions: usize,
    /// `oldId -> newId` for every rename performed (cross-prefix-safe
    /// content-hash renames under the same prefix).
    pub id_mapping: Vec<(String, String)>,
    pub collision_ids: Vec<String>,
    pub skipped_dependencies: Vec<String>,
    /// Prefixes that were flagged as mismatched upstream in C3, carried
    /// through for the final report.
    pub mismatch_prefixes: Vec<(String, usize)>,
}

/// Write surface the merge loop needs. Implemented once against a real
/// transaction and once as a no-op for dry runs, so the decision logic in
/// [`process_record`] never has to branch on `dry_run` itself.
trait Mutator {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()>;
    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<()>;
    fn delete_issue(&self, id: &str) -> Result<()>;
    /// Attempts a create, surfacing the raw storage error so the caller can
    /// inspect it for a unique-constraint race.
    fn try_create(&self, issue: &Issue, actor: &str) -> std::result::Result<(), StorageError>;
    fn get_issue(&self, id: &str) -> std::result::Result<Issue, StorageError>;
}

struct TxMutator<'a> {
    tx: &'a dyn Transaction,
}

impl Mutator for TxMutator<'_> {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        Ok(self.tx.create_issue(issue, actor)?)
    }
    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<()> {
        Ok(self.tx.update_issue(id, updates, actor)?)
    }
    fn delete_issue(&self, id: &str) -> Result<()> {
        Ok(self.tx.delete_issue(id)?)
    }
    fn try_create(&self, issue: &Issue, actor: &str) -> std::result::Result<(), StorageError> {
        self.tx.create_issue(issue, actor)
    }
    fn get_issue(&self, id: &str) -> std::result::Result<Issue, StorageError> {
        self.tx.get_issue(id)
    }
}

/// A mutator that records nothing; used to compute a dry-run's `MergeResult`
/// without touching the store.
struct DryMutator;

impl Mutator for DryMutator {
    fn create_issue(&self, _issue: &Issue, _actor: &str) -> Result<()> {
        Ok(())
    }
    fn update_issue(&self, _id: &str, _updates: &IssueUpdates, _actor: &str) -> Result<()> {
        Ok(())
    }
    fn delete_issue(&self, _id: &str) -> Result<()> {
        Ok(())
    }
    fn try_create(&self, _issue: &Issue, _actor: &str) -> std::result::Result<(), StorageError> {
        Ok(())
    }
    fn get_issue(&self, id: &str) -> std::result::Result<Issue, StorageError> {
        Err(StorageError::not_found("issue", id))
    }
}

/// Editable fields copied from an incoming record onto a local match,
/// shared by P1 (external-ref resync) and P3 (same-ID new content).
fn build_updates(existing: &Issue, incoming: &Issue) -> IssueUpdates {
    let mut u = IssueUpdates::default();
    if incoming.title != existing.title {
        u.title = Some(incoming.title.clone());
    }
    if incoming.description != existing.description {
        u.description = Some(incoming.description.clone());
    }
    if incoming.design != existing.design {
        u.design = Some(incoming.design.clone());
    }
    if incoming.acceptance_criteria != existing.acceptance_criteria {
        u.acceptance_criteria = Some(incoming.acceptance_criteria.clone());
    }
    if incoming.notes != existing.notes {
        u.notes = Some(incoming.notes.clone());
    }
    if incoming.status != existing.status {
        u.status = Some(incoming.status.clone());
        if incoming.status == Status::Closed && existing.status != Status::Closed {
            u.closed_at = Some(Some(incoming.closed_at.unwrap_or_else(Utc::now)));
        }
    }
    if incoming.priority != existing.priority {
        u.priority = Some(incoming.priority);
    }
    if incoming.issue_type != existing.issue_type {
        u.issue_type = Some(incoming.issue_type.clone());
    }
    if incoming.assignee.is_empty() {
        if !existing.assignee.is_empty() {
            u.assignee = Some(String::new());
        }
    } else if incoming.assignee != existing.assignee {
        u.assignee = Some(incoming.assignee.clone());
    }
    let incoming_ref = incoming.external_ref.as_deref().filter(|e| !e.is_empty());
    match incoming_ref {
        None => {
            if existing.external_ref.is_some() {
                u.external_ref = Some(None);
            }
        }
        Some(r) if existing.external_ref.as_deref() != Some(r) => {
            u.external_ref = Some(Some(r.to_string()));
        }
        Some(_) => {}
    }
    if incoming.pinned && !existing.pinned {
        u.pinned = Some(true);
    }
    u
}

fn updates_is_empty(u: &IssueUpdates) -> bool {
    u.title.is_none()
        && u.description.is_none()
        && u.design.is_none()
        && u.acceptance_criteria.is_none()
        && u.notes.is_none()
        && u.status.is_none()
        && u.closed_at.is_none()
        && u.priority.is_none()
        && u.issue_type.is_none()
        && u.assignee.is_none()
        && u.external_ref.is_none()
        && u.pinned.is_none()
}

/// Returns `true` if the caller's protect-local map shields `id` against
/// `incoming_updated_at`.
fn is_protected(opts: &MergeOptions, id: &str, incoming_updated_at: DateTime<Utc>) -> bool {
    match opts.protect_local_export_ids.get(id) {
        Some(local_ts) => incoming_updated_at <= *local_ts,
        None => false,
    }
}

/// Depth of a hierarchical ID: the number of `.`-separated segments past the
/// root (a bare `bd-1` is depth 0; `bd-1.2` is depth 1).
fn hierarchy_depth(id: &str) -> usize {
    id.matches('.').count()
}

fn parent_id(id: &str) -> Option<String> {
    id.rfind('.').map(|idx| id[..idx].to_string())
}

/// Snapshot of local state used to make merge decisions. Loaded once at the
/// start of a batch; not re-queried mid-batch.
struct Snapshot {
    by_hash: HashMap<String, Issue>,
    by_id: HashMap<String, Issue>,
    by_external_ref: HashMap<String, Issue>,
}

impl Snapshot {
    fn load(store: &dyn Storage) -> Result<Self> {
        let filter = IssueFilter {
            include_tombstones: true,
            ..Default::default()
        };
        let issues = store.search_issues("", &filter)?;
        let mut by_hash = HashMap::new();
        let mut by_id = HashMap::new();
        let mut by_external_ref = HashMap::new();
        for issue in issues {
            by_hash.insert(issue.content_hash.clone(), issue.clone());
            if let Some(ext) = &issue.external_ref {
                if !ext.is_empty() {
                    by_external_ref.insert(ext.clone(), issue.clone());
                }
            }
            by_id.insert(issue.id.clone(), issue);
        }
        Ok(Self {
            by_hash,
            by_id,
            by_external_ref,
        })
    }
}

/// All state mutated over the course of one batch, held behind a single
/// `RefCell` so the closure handed to `run_in_transaction` only needs a
/// shared capture (the transaction API requires `Fn`, not `FnMut`).
struct BatchState {
    snapshot: Snapshot,
    seen_hashes: HashSet<String>,
    seen_ids: HashSet<String>,
    new_issues: Vec<Issue>,
    result: MergeResult,
}

/// Runs the merge engine over an already-gated, already-validated batch.
///
/// `records` must already have passed the prefix gate (C3) and the batch
/// validator (C4) -- this engine does not re-run either.
pub fn merge(store: &dyn Storage, records: Vec<Issue>, opts: &MergeOptions) -> Result<MergeResult> {
    if !opts.dry_run {
        store.clear_all_export_hashes()?;
    }

    let state = RefCell::new(BatchState {
        snapshot: Snapshot::load(store)?,
        seen_hashes: HashSet::new(),
        seen_ids: HashSet::new(),
        new_issues: Vec::new(),
        result: MergeResult::default(),
    });

    if opts.dry_run {
        let mutator = DryMutator;
        run_batch(&mutator, &state, records, opts)?;
    } else {
        // `run_in_transaction` requires a closure returning
        // `Result<(), StorageError>`, but `run_batch` can also fail with a
        // business-rule `SyncError`. Stash the original error here so it can
        // be rethrown unchanged after the transaction unwinds (the
        // transaction is rolled back on drop regardless of which `Err` is
        // returned from the closure).
        let sync_err: RefCell<Option<SyncError>> = RefCell::new(None);
        let tx_result = store.run_in_transaction(&|tx| {
            let mutator = TxMutator { tx };
            run_batch(&mutator, &state, records.clone(), opts).map_err(|e| match e {
                SyncError::Storage(storage_err) => storage_err,
                other => {
                    let placeholder = StorageError::Internal(other.to_string());
                    *sync_err.borrow_mut() = Some(other);
                    placeholder
                }
            })
        });
        if let Some(e) = sync_err.into_inner() {
            return Err(e);
        }
        tx_result?;
        if let Err(e) = store.checkpoint_wal() {
            warn!(error = %e, "WAL checkpoint failed after merge");
        }
    }

    Ok(state.into_inner().result)
}

fn run_batch(
    mutator: &dyn Mutator,
    state: &RefCell<BatchState>,
    records: Vec<Issue>,
    opts: &MergeOptions,
) -> Result<()> {
    for record in records {
        process_record(mutator, state, record, opts)?;
    }
    create_new_issues(mutator, state, opts)
}

fn process_record(
    mutator: &dyn Mutator,
    state: &RefCell<BatchState>,
    record: Issue,
    opts: &MergeOptions,
) -> Result<()> {
    let mut s = state.borrow_mut();
    let s = &mut *s;

    if s.seen_hashes.contains(&record.content_hash) || s.seen_ids.contains(&record.id) {
        s.result.skipped += 1;
        return Ok(());
    }

    // P0 -- Tombstone Shield.
    if let Some(existing) = s.snapshot.by_id.get(&record.id) {
        if existing.status == Status::Tombstone {
            debug!(id = %record.id, "tombstone shield: dropping resurrection attempt");
            s.result.skipped += 1;
            s.seen_ids.insert(record.id.clone());
            return Ok(());
        }
    }

    // P1 -- External-Ref Match.
    if let Some(ext) = record.external_ref.as_deref().filter(|e| !e.is_empty()) {
        if let Some(existing) = s.snapshot.by_external_ref.get(ext).cloned() {
            s.seen_hashes.insert(record.content_hash.clone());
            s.seen_ids.insert(record.id.clone());

            if opts.skip_update {
                s.result.skipped += 1;
                return Ok(());
            }
            if is_protected(opts, &existing.id, record.updated_at) {
                debug!(id = %existing.id, "protected by local export timestamp");
                s.result.skipped += 1;
                return Ok(());
            }
            if record.updated_at <= existing.updated_at {
                s.result.unchanged += 1;
                return Ok(());
            }
            let updates = build_updates(&existing, &record);
            if updates_is_empty(&updates) {
                s.result.unchanged += 1;
            } else {
                mutator.update_issue(&existing.id, &updates, &opts.actor)?;
                apply_updates_to_snapshot(&mut s.snapshot, &existing.id, &updates);
                s.result.updated += 1;
            }
            return Ok(());
        }
    }

    // P2 -- Content-Hash Match.
    if let Some(existing) = s.snapshot.by_hash.get(&record.content_hash).cloned() {
        s.seen_hashes.insert(record.content_hash.clone());

        if existing.id == record.id {
            s.seen_ids.insert(record.id.clone());
            s.result.unchanged += 1;
            return Ok(());
        }

        if extract_prefix(&existing.id) != extract_prefix(&record.id) {
            debug!(old = %existing.id, new = %record.id, "cross-prefix content match, skipping rename");
            s.result.skipped += 1;
            s.result.collisions += 1;
            s.result.collision_ids.push(record.id.clone());
            return Ok(());
        }

        if opts.skip_update {
            s.result.skipped += 1;
            return Ok(());
        }

        rename(mutator, s, &existing, &record, opts)?;
        s.seen_ids.insert(record.id.clone());
        return Ok(());
    }

    // P3 -- Same-ID, New Content.
    if let Some(existing) = s.snapshot.by_id.get(&record.id).cloned() {
        s.seen_hashes.insert(record.content_hash.clone());
        s.seen_ids.insert(record.id.clone());

        if opts.skip_update {
            s.result.skipped += 1;
            return Ok(());
        }
        if is_protected(opts, &existing.id, record.updated_at) {
            s.result.skipped += 1;
            return Ok(());
        }
        let updates = build_updates(&existing, &record);
        if updates_is_empty(&updates) {
            s.result.unchanged += 1;
        } else {
            mutator.update_issue(&existing.id, &updates, &opts.actor)?;
            apply_updates_to_snapshot(&mut s.snapshot, &existing.id, &updates);
            s.result.updated += 1;
        }
        return Ok(());
    }

    // P4 -- New Record.
    s.seen_hashes.insert(record.content_hash.clone());
    s.seen_ids.insert(record.id.clone());
    s.new_issues.push(record);
    Ok(())
}

/// Performs a content-hash rename: delete the old ID, create under the new
/// one. Handles the cross-replica race where another writer already won the
/// rename by the time we attempt it.
fn rename(
    mutator: &dyn Mutator,
    s: &mut BatchState,
    existing: &Issue,
    incoming: &Issue,
    opts: &MergeOptions,
) -> Result<()> {
    mutator.delete_issue(&existing.id)?;
    match mutator.try_create(incoming, &opts.actor) {
        Ok(()) => {
            s.snapshot.by_id.remove(&existing.id);
            s.snapshot.by_id.insert(incoming.id.clone(), incoming.clone());
            s.result.id_mapping.push((existing.id.clone(), incoming.id.clone()));
            s.result.updated += 1;
            Ok(())
        }
        Err(e) if e.is_unique_violation() => {
            let target = mutator.get_issue(&incoming.id)?;
            if target.content_hash == incoming.content_hash {
                debug!(old = %existing.id, new = %incoming.id, "rename race: another replica already created target");
                s.snapshot.by_id.remove(&existing.id);
                s.snapshot.by_id.insert(target.id.clone(), target);
                s.result.id_mapping.push((existing.id.clone(), incoming.id.clone()));
                s.result.updated += 1;
                Ok(())
            } else if incoming.updated_at > target.updated_at {
                let updates = build_updates(&target, incoming);
                if !updates_is_empty(&updates) {
                    mutator.update_issue(&target.id, &updates, &opts.actor)?;
                    apply_updates_to_snapshot(&mut s.snapshot, &target.id, &updates);
                    s.result.updated += 1;
                } else {
                    s.result.unchanged += 1;
                }
                Ok(())
            } else {
                Err(SyncError::RenameConflict {
                    old_id: existing.id.clone(),
                    new_id: incoming.id.clone(),
                })
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Reflects an applied `IssueUpdates` delta back into the in-memory snapshot
/// so later records in the same batch see the current state.
fn apply_updates_to_snapshot(snapshot: &mut Snapshot, id: &str, updates: &IssueUpdates) {
    let Some(issue) = snapshot.by_id.get_mut(id) else {
        return;
    };
    if let Some(v) = &updates.title {
        issue.title = v.clone();
    }
    if let Some(v) = &updates.description {
        issue.description = v.clone();
    }
    if let Some(v) = &updates.status {
        issue.status = v.clone();
    }
    if let Some(v) = &updates.closed_at {
        issue.closed_at = *v;
    }
    if let Some(v) = &updates.priority {
        issue.priority = *v;
    }
    if let Some(v) = &updates.issue_type {
        issue.issue_type = v.clone();
    }
    if let Some(v) = &updates.assignee {
        issue.assignee = v.clone();
    }
    if let Some(v) = &updates.external_ref {
        issue.external_ref = v.clone();
    }
    if let Some(v) = &updates.pinned {
        issue.pinned = *v;
    }
}

/// Applies orphan-handling policy and materializes brand-new records in
/// depth-banded passes so that parents are always created before children.
fn create_new_issues(mutator: &dyn Mutator, state: &RefCell<BatchState>, opts: &MergeOptions) -> Result<()> {
    let mut s = state.borrow_mut();
    let s = &mut *s;
    let mut new_issues = std::mem::take(&mut s.new_issues);

    let incoming_ids: HashSet<String> = new_issues.iter().map(|i| i.id.clone()).collect();

    if opts.orphan_handling == OrphanHandling::Resurrect {
        warn!("orphan-handling=resurrect is not implemented; treating as allow");
    }

    if matches!(opts.orphan_handling, OrphanHandling::Strict | OrphanHandling::Skip) {
        let mut kept = Vec::with_capacity(new_issues.len());
        for issue in new_issues {
            if let Some(parent) = parent_id(&issue.id) {
                let parent_exists = incoming_ids.contains(&parent) || s.snapshot.by_id.contains_key(&parent);
                if !parent_exists {
                    if opts.orphan_handling == OrphanHandling::Strict {
                        return Err(SyncError::OrphanParentMissing {
                            id: issue.id.clone(),
                            parent_id: parent,
                        });
                    }
                    debug!(id = %issue.id, parent = %parent, "dropping orphan, parent missing");
                    s.result.skipped += 1;
                    continue;
                }
            }
            kept.push(issue);
        }
        new_issues = kept;
    }

    new_issues.sort_by(|a, b| {
        hierarchy_depth(&a.id)
            .cmp(&hierarchy_depth(&b.id))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut start = 0;
    while start < new_issues.len() {
        let depth = hierarchy_depth(&new_issues[start].id);
        let mut end = start;
        while end < new_issues.len() && hierarchy_depth(&new_issues[end].id) == depth {
            end += 1;
        }
        for issue in &new_issues[start..end] {
            mutator.create_issue(issue, &opts.actor)?;
        }
        s.result.created += end - start;
        start = end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_depth_counts_dots() {
        assert_eq!(hierarchy_depth("bd-1"), 0);
        assert_eq!(hierarchy_depth("bd-1.2"), 1);
        assert_eq!(hierarchy_depth("bd-1.2.3"), 2);
    }

    #[test]
    fn parent_id_splits_on_last_dot() {
        assert_eq!(parent_id("bd-1.2.3").as_deref(), Some("bd-1.2"));
        assert_eq!(parent_id("bd-1"), None);
    }

    #[test]
    fn orphan_handling_parses_known_modes() {
        assert!(matches!(OrphanHandling::parse("strict"), OrphanHandling::Strict));
        assert!(matches!(OrphanHandling::parse("skip"), OrphanHandling::Skip));
        assert!(matches!(OrphanHandling::parse("resurrect"), OrphanHandling::Resurrect));
        assert!(matches!(OrphanHandling::parse("bogus"), OrphanHandling::Allow));
    }

    #[test]
    fn updates_is_empty_detects_no_delta() {
        assert!(updates_is_empty(&IssueUpdates::default()));
        let mut u = IssueUpdates::default();
        u.title = Some("x".to_string());
        assert!(!updates_is_empty(&u));
    }
}
