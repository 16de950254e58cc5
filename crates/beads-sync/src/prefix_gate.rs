//! Prefix validation and rename-on-import rewriting (C3).

use std::collections::HashSet;

use beads_core::enums::Status;
use beads_core::issue::Issue;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::route::extract_prefix;

/// Boundary bytes for rename-on-import token-boundary rewriting: whitespace,
/// common punctuation, and (implicitly) string start/end.
const BOUNDARY_BYTES: &[u8] = b" \t\n\r,.!?:;()[]{}";

fn is_boundary(byte: Option<u8>) -> bool {
    match byte {
        None => true,
        Some(b) => BOUNDARY_BYTES.contains(&b),
    }
}

/// Returns `true` if `suffix` is a syntactically valid ID suffix: non-empty,
/// every character in `[0-9a-z.]`, with non-empty dot-separated segments.
pub fn is_valid_suffix(suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }
    if !suffix
        .bytes()
        .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'.')
    {
        return false;
    }
    suffix.split('.').all(|seg| !seg.is_empty())
}

/// The allowed-prefix set. `All` means multi-replica mode: every prefix is
/// accepted.
#[derive(Debug, Clone)]
pub enum AllowedPrefixes {
    All,
    Set(HashSet<String>),
}

impl AllowedPrefixes {
    /// Builds the allowed-prefix set. When `multi_replica` is set, the
    /// result is always [`AllowedPrefixes::All`] ("allow all") regardless
    /// of the other arguments, per the distinguished multi-replica mode.
    pub fn build(local_prefix: &str, allowed_prefixes: &[String], town_prefixes: &[String], multi_replica: bool) -> Self {
        if multi_replica {
            return Self::All;
        }
        let mut set = HashSet::new();
        if !local_prefix.is_empty() {
            set.insert(normalize(local_prefix));
        }
        for p in allowed_prefixes {
            if !p.is_empty() {
                set.insert(normalize(p));
            }
        }
        for p in town_prefixes {
            if !p.is_empty() {
                set.insert(normalize(p));
            }
        }
        Self::Set(set)
    }

    pub fn allows(&self, prefix: &str) -> bool {
        match self {
            Self::All => true,
            Self::Set(set) => set.contains(prefix),
        }
    }
}

/// Normalizes a prefix to always end in `-`.
fn normalize(prefix: &str) -> String {
    if prefix.ends_with('-') {
        prefix.to_string()
    } else {
        format!("{prefix}-")
    }
}

/// Outcome of running the prefix gate over a batch.
#[derive(Debug)]
pub struct GateResult {
    /// Records that passed the gate (after any rename rewriting).
    pub records: Vec<Issue>,
    /// IDs that were renamed, `old -> new`.
    pub renames: Vec<(String, String)>,
    /// Prefixes seen among real (non-tombstone) mismatches, with counts.
    pub mismatch_prefixes: Vec<(String, usize)>,
}

/// Options controlling mismatch-tolerant behavior.
pub struct GateOptions<'a> {
    pub local_prefix: &'a str,
    pub rename_on_import: bool,
    pub skip_prefix_validation: bool,
    pub dry_run: bool,
}

/// Runs the prefix gate over `records`.
pub fn apply(
    records: Vec<Issue>,
    allowed: &AllowedPrefixes,
    opts: &GateOptions,
) -> Result<GateResult> {
    let mut passed = Vec::with_capacity(records.len());
    let mut tombstone_mismatches = 0usize;
    let mut real_mismatches: Vec<String> = Vec::new();

    for record in records {
        let prefix = extract_prefix(&record.id);
        if allowed.allows(&prefix) {
            passed.push(record);
            continue;
        }
        if record.status == Status::Tombstone {
            debug!(id = %record.id, "dropping tombstone with foreign prefix");
            tombstone_mismatches += 1;
            continue;
        }
        real_mismatches.push(prefix);
        passed.push(record);
    }

    if real_mismatches.is_empty() {
        if tombstone_mismatches > 0 {
            debug!(count = tombstone_mismatches, "cleared tombstone-only prefix mismatches");
        }
        return Ok(GateResult {
            records: passed,
            renames: Vec::new(),
            mismatch_prefixes: Vec::new(),
        });
    }

    if opts.rename_on_import && !opts.dry_run {
        if opts.local_prefix.is_empty() {
            return Err(SyncError::NoLocalPrefix);
        }
        let local = normalize(opts.local_prefix);
        let mut renames = Vec::new();
        let mut rewritten = Vec::with_capacity(passed.len());
        for mut record in passed {
            let prefix = extract_prefix(&record.id);
            if !prefix.is_empty() && !allowed.allows(&prefix) {
                let old_id = record.id.clone();
                let new_id = format!("{local}{}", &old_id[prefix.len()..]);
                record.id = new_id.clone();
                renames.push((old_id, new_id));
            }
            rewritten.push(record);
        }
        for (old_id, new_id) in &renames {
            for record in rewritten.iter_mut() {
                rewrite_references(record, old_id, new_id);
            }
        }
        return Ok(GateResult {
            records: rewritten,
            renames,
            mismatch_prefixes: Vec::new(),
        });
    }

    if opts.skip_prefix_validation || opts.dry_run {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for prefix in &real_mismatches {
            match counts.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, n)) => *n += 1,
                None => counts.push((prefix.clone(), 1)),
            }
        }
        warn!(mismatches = real_mismatches.len(), "proceeding with prefix mismatches flagged");
        return Ok(GateResult {
            records: passed,
            renames: Vec::new(),
            mismatch_prefixes: counts,
        });
    }

    let mut sorted = real_mismatches.clone();
    sorted.sort();
    sorted.dedup();
    Err(SyncError::PrefixMismatch(format!(
        "prefix mismatch: {} record(s) with foreign prefixes: {}",
        real_mismatches.len(),
        sorted.join(", ")
    )))
}

/// Rewrites every occurrence of `old_id` at token boundaries to `new_id` in
/// the record's dependency targets and comment text.
fn rewrite_references(record: &mut Issue, old_id: &str, new_id: &str) {
    for dep in record.dependencies.iter_mut() {
        if dep.depends_on_id == old_id {
            dep.depends_on_id = new_id.to_string();
        }
        if dep.issue_id == old_id {
            dep.issue_id = new_id.to_string();
        }
    }
    for comment in record.comments.iter_mut() {
        comment.text = replace_at_boundaries(&comment.text, old_id, new_id);
    }
    record.description = replace_at_boundaries(&record.description, old_id, new_id);
    record.notes = replace_at_boundaries(&record.notes, old_id, new_id);
}

/// Replaces every boundary-delimited occurrence of `needle` in `haystack`
/// with `replacement`. A match only counts if the byte before and after it
/// are boundary bytes (or string start/end) -- this prevents `old-1` from
/// matching inside `old-10`.
fn replace_at_boundaries(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let bytes = haystack.as_bytes();
    let needle_bytes = needle.as_bytes();
    let mut result = String::with_capacity(haystack.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(needle_bytes) {
            let before = if i == 0 { None } else { Some(bytes[i - 1]) };
            let after_idx = i + needle_bytes.len();
            let after = bytes.get(after_idx).copied();
            if is_boundary(before) && is_boundary(after) {
                result.push_str(replacement);
                i = after_idx;
                continue;
            }
        }
        // Safe: we only ever skip ahead on a confirmed ASCII-only needle
        // match; otherwise advance one UTF-8 char at a time.
        let ch_len = haystack[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        result.push_str(&haystack[i..i + ch_len]);
        i += ch_len;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_validity() {
        assert!(is_valid_suffix("abc123"));
        assert!(is_valid_suffix("abc.1"));
        assert!(!is_valid_suffix(""));
        assert!(!is_valid_suffix("abc."));
        assert!(!is_valid_suffix("ABC"));
        assert!(!is_valid_suffix("abc_1"));
    }

    #[test]
    fn boundary_replace_avoids_prefix_overlap() {
        let result = replace_at_boundaries("see old-1 and old-10", "old-1", "new-1");
        assert_eq!(result, "see new-1 and old-10");
    }

    #[test]
    fn boundary_replace_at_string_edges() {
        let result = replace_at_boundaries("old-1", "old-1", "new-1");
        assert_eq!(result, "new-1");
    }

    #[test]
    fn allowed_prefixes_build_and_check() {
        let allowed = AllowedPrefixes::build("bd", &["ext".to_string()], &[], false);
        assert!(allowed.allows("bd-"));
        assert!(allowed.allows("ext-"));
        assert!(!allowed.allows("foo-"));
    }

    #[test]
    fn allowed_prefixes_multi_replica_allows_everything() {
        let allowed = AllowedPrefixes::build("bd", &[], &[], true);
        assert!(allowed.allows("bd-"));
        assert!(allowed.allows("anything-"));
    }
}
