//! Batch validation and normalization (C4).
//!
//! Runs ahead of the merge engine proper: canonicalizes external
//! references, recomputes content hashes (never trusting the transport's
//! value), flags ephemeral wisp instances, and resolves duplicate external
//! references within the batch.

use std::collections::HashMap;

use beads_core::content_hash::compute_content_hash;
use beads_core::issue::Issue;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Marker substring identifying an ephemeral wisp instance ID.
const WISP_MARKER: &str = "-wisp-";

/// Canonicalizes a GitHub issue/PR URL to `github:org/repo#number`; leaves
/// anything else untouched. This is the one "known foreign-system pattern"
/// this core recognizes; other external-ref formats pass through as-is
/// since the source replica is trusted to have already normalized them.
pub fn canonicalize_external_ref(raw: &str) -> String {
    let Some(rest) = raw
        .strip_prefix("https://github.com/")
        .or_else(|| raw.strip_prefix("http://github.com/"))
    else {
        return raw.to_string();
    };
    let mut parts = rest.trim_end_matches('/').splitn(4, '/');
    let (Some(org), Some(repo), Some(kind), Some(number)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return raw.to_string();
    };
    if kind != "issues" && kind != "pull" {
        return raw.to_string();
    }
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return raw.to_string();
    }
    format!("github:{org}/{repo}#{number}")
}

/// Runs the batch validator over `records`, mutating them in place.
///
/// Returns the number of duplicate-external-ref records whose reference was
/// cleared (only nonzero when `clear_duplicate_external_refs` is set).
pub fn validate_batch(
    records: &mut [Issue],
    clear_duplicate_external_refs: bool,
) -> Result<usize> {
    for record in records.iter_mut() {
        if let Some(ext) = record.external_ref.take() {
            if !ext.is_empty() {
                record.external_ref = Some(canonicalize_external_ref(&ext));
            } else {
                record.external_ref = None;
            }
        }
        record.content_hash = compute_content_hash(record);
        if record.id.contains(WISP_MARKER) {
            record.ephemeral = true;
        }
    }

    resolve_duplicate_external_refs(records, clear_duplicate_external_refs)
}

/// Builds `externalRef -> [ids]` and resolves duplicates.
fn resolve_duplicate_external_refs(
    records: &mut [Issue],
    clear_duplicate_external_refs: bool,
) -> Result<usize> {
    let mut by_ref: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if let Some(ref ext) = record.external_ref {
            by_ref.entry(ext.clone()).or_default().push(idx);
        }
    }

    let duplicates: Vec<(String, Vec<usize>)> = by_ref
        .into_iter()
        .filter(|(_, idxs)| idxs.len() > 1)
        .collect();

    if duplicates.is_empty() {
        return Ok(0);
    }

    if !clear_duplicate_external_refs {
        let mut refs: Vec<&str> = duplicates.iter().map(|(r, _)| r.as_str()).collect();
        refs.sort();
        return Err(SyncError::DuplicateExternalRef(format!(
            "{} external reference(s) used by more than one record: {}",
            refs.len(),
            refs.join(", ")
        )));
    }

    let mut cleared = 0usize;
    for (ext, mut idxs) in duplicates {
        idxs.sort();
        for &idx in idxs.iter().skip(1) {
            debug!(external_ref = %ext, id = %records[idx].id, "clearing duplicate external reference");
            records[idx].external_ref = None;
            cleared += 1;
        }
    }
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    #[test]
    fn canonicalizes_github_issue_url() {
        assert_eq!(
            canonicalize_external_ref("https://github.com/acme/widgets/issues/42"),
            "github:acme/widgets#42"
        );
    }

    #[test]
    fn leaves_unknown_refs_alone() {
        assert_eq!(canonicalize_external_ref("JIRA-123"), "JIRA-123");
    }

    #[test]
    fn marks_wisp_ephemeral() {
        let mut issues = vec![IssueBuilder::new("W").id("bd-wisp-abc1").build()];
        validate_batch(&mut issues, false).unwrap();
        assert!(issues[0].ephemeral);
    }

    #[test]
    fn recomputes_content_hash() {
        let mut issues = vec![IssueBuilder::new("T").id("bd-abc1").build()];
        issues[0].content_hash = "stale".to_string();
        validate_batch(&mut issues, false).unwrap();
        assert_ne!(issues[0].content_hash, "stale");
    }

    #[test]
    fn duplicate_external_ref_fails_without_clear_flag() {
        let mut issues = vec![
            IssueBuilder::new("A").id("bd-a1").external_ref("ext-1").build(),
            IssueBuilder::new("B").id("bd-b1").external_ref("ext-1").build(),
        ];
        assert!(validate_batch(&mut issues, false).is_err());
    }

    #[test]
    fn duplicate_external_ref_clears_when_requested() {
        let mut issues = vec![
            IssueBuilder::new("A").id("bd-a1").external_ref("ext-1").build(),
            IssueBuilder::new("B").id("bd-b1").external_ref("ext-1").build(),
        ];
        let cleared = validate_batch(&mut issues, true).unwrap();
        assert_eq!(cleared, 1);
        assert!(issues[0].external_ref.is_some());
        assert!(issues[1].external_ref.is_none());
    }
}
