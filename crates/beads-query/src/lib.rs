//! In-memory [`IssueFilter`] matching for the beads system.
//!
//! `beads-storage` translates most of `IssueFilter` into SQL directly; this
//! crate implements the same predicate against a single already-loaded
//! [`Issue`], for callers that hold a batch of issues in memory rather than
//! a live connection (the merge engine's snapshot, `bd` subcommands that
//! post-filter a search result, tests).

use chrono::Utc;
use regex::Regex;
use thiserror::Error;

use beads_core::enums::DependencyType;
use beads_core::filter::IssueFilter;
use beads_core::issue::Issue;

/// Errors raised while compiling a filter (currently only invalid regexes).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid label regex '{pattern}': {source}")]
    InvalidRegex { pattern: String, source: regex::Error },
}

/// Returns `true` if `issue` satisfies every condition in `filter`.
///
/// Mirrors `beads_storage::sqlite::issues::search_issues_on_conn`'s
/// WHERE-clause semantics field-for-field, plus the glob/regex/range/parent
/// filters that crate leaves unimplemented at the SQL layer.
pub fn matches(issue: &Issue, filter: &IssueFilter) -> Result<bool, QueryError> {
    if !filter.include_tombstones && issue.status == beads_core::enums::Status::Tombstone {
        return Ok(false);
    }
    if let Some(ref status) = filter.status {
        if issue.status != *status {
            return Ok(false);
        }
    }
    if filter.exclude_status.contains(&issue.status) {
        return Ok(false);
    }
    if let Some(priority) = filter.priority {
        if issue.priority != priority {
            return Ok(false);
        }
    }
    if let Some(min) = filter.priority_min {
        if issue.priority < min {
            return Ok(false);
        }
    }
    if let Some(max) = filter.priority_max {
        if issue.priority > max {
            return Ok(false);
        }
    }
    if let Some(ref issue_type) = filter.issue_type {
        if issue.issue_type != *issue_type {
            return Ok(false);
        }
    }
    if filter.exclude_types.contains(&issue.issue_type) {
        return Ok(false);
    }
    if let Some(ref assignee) = filter.assignee {
        if &issue.assignee != assignee {
            return Ok(false);
        }
    }
    if filter.no_assignee && !issue.assignee.is_empty() {
        return Ok(false);
    }
    if filter.empty_description && !issue.description.is_empty() {
        return Ok(false);
    }
    if let Some(ref id_prefix) = filter.id_prefix {
        if !issue.id.starts_with(id_prefix.as_str()) {
            return Ok(false);
        }
    }
    if !filter.ids.is_empty() && !filter.ids.iter().any(|id| id == &issue.id) {
        return Ok(false);
    }
    if let Some(ref spec_prefix) = filter.spec_id_prefix {
        if !issue.spec_id.starts_with(spec_prefix.as_str()) {
            return Ok(false);
        }
    }
    if let Some(ephemeral) = filter.ephemeral {
        if issue.ephemeral != ephemeral {
            return Ok(false);
        }
    }
    if let Some(pinned) = filter.pinned {
        if issue.pinned != pinned {
            return Ok(false);
        }
    }
    if let Some(is_template) = filter.is_template {
        if issue.is_template != is_template {
            return Ok(false);
        }
    }
    if let Some(ref mol_type) = filter.mol_type {
        if issue.mol_type != *mol_type {
            return Ok(false);
        }
    }
    if let Some(ref wisp_type) = filter.wisp_type {
        if issue.wisp_type != *wisp_type {
            return Ok(false);
        }
    }
    if let Some(ref source_repo) = filter.source_repo {
        if &issue.source_repo != source_repo {
            return Ok(false);
        }
    }

    if let Some(ref needle) = filter.title_search {
        if !issue.title.to_lowercase().contains(&needle.to_lowercase())
            && !issue.description.to_lowercase().contains(&needle.to_lowercase())
            && !issue.notes.to_lowercase().contains(&needle.to_lowercase())
        {
            return Ok(false);
        }
    }
    if let Some(ref needle) = filter.title_contains {
        if !issue.title.contains(needle.as_str()) {
            return Ok(false);
        }
    }
    if let Some(ref needle) = filter.description_contains {
        if !issue.description.contains(needle.as_str()) {
            return Ok(false);
        }
    }
    if let Some(ref needle) = filter.notes_contains {
        if !issue.notes.contains(needle.as_str()) {
            return Ok(false);
        }
    }

    if let Some(t) = filter.created_after {
        if issue.created_at < t {
            return Ok(false);
        }
    }
    if let Some(t) = filter.created_before {
        if issue.created_at > t {
            return Ok(false);
        }
    }
    if let Some(t) = filter.updated_after {
        if issue.updated_at < t {
            return Ok(false);
        }
    }
    if let Some(t) = filter.updated_before {
        if issue.updated_at > t {
            return Ok(false);
        }
    }
    if let Some(t) = filter.closed_after {
        if issue.closed_at.is_none_or(|c| c < t) {
            return Ok(false);
        }
    }
    if let Some(t) = filter.closed_before {
        if issue.closed_at.is_none_or(|c| c > t) {
            return Ok(false);
        }
    }
    if filter.deferred && issue.defer_until.is_none() {
        return Ok(false);
    }
    if let Some(t) = filter.defer_after {
        if issue.defer_until.is_none_or(|d| d < t) {
            return Ok(false);
        }
    }
    if let Some(t) = filter.defer_before {
        if issue.defer_until.is_none_or(|d| d > t) {
            return Ok(false);
        }
    }
    if let Some(t) = filter.due_after {
        if issue.due_at.is_none_or(|d| d < t) {
            return Ok(false);
        }
    }
    if let Some(t) = filter.due_before {
        if issue.due_at.is_none_or(|d| d > t) {
            return Ok(false);
        }
    }
    if filter.overdue {
        let overdue = issue.due_at.is_some_and(|d| d < Utc::now()) && issue.status != beads_core::enums::Status::Closed;
        if !overdue {
            return Ok(false);
        }
    }

    if filter.no_labels && !issue.labels.is_empty() {
        return Ok(false);
    }
    if !filter.labels.iter().all(|l| issue.labels.contains(l)) {
        return Ok(false);
    }
    if !filter.labels_any.is_empty() && !filter.labels_any.iter().any(|l| issue.labels.contains(l)) {
        return Ok(false);
    }
    if let Some(ref pattern) = filter.label_pattern {
        if !issue.labels.iter().any(|l| glob_match(pattern, l)) {
            return Ok(false);
        }
    }
    if let Some(ref pattern) = filter.label_regex {
        let re = Regex::new(pattern).map_err(|source| QueryError::InvalidRegex { pattern: pattern.clone(), source })?;
        if !issue.labels.iter().any(|l| re.is_match(l)) {
            return Ok(false);
        }
    }

    if let Some(ref parent_id) = filter.parent_id {
        let is_child_of = issue
            .dependencies
            .iter()
            .any(|d| d.dep_type == DependencyType::ParentChild && &d.depends_on_id == parent_id);
        if !is_child_of {
            return Ok(false);
        }
    }
    if filter.no_parent {
        let has_parent = issue.dependencies.iter().any(|d| d.dep_type == DependencyType::ParentChild);
        if has_parent {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Filters `issues` in place, keeping only those that satisfy `filter`.
pub fn filter_issues(issues: Vec<Issue>, filter: &IssueFilter) -> Result<Vec<Issue>, QueryError> {
    let mut kept = Vec::with_capacity(issues.len());
    for issue in issues {
        if matches(&issue, filter)? {
            kept.push(issue);
        }
    }
    if let Some(limit) = filter.limit {
        kept.truncate(limit.max(0) as usize);
    }
    Ok(kept)
}

/// Minimal glob matcher supporting `*` (any run of characters) and `?` (any
/// single character), anchored to the whole string.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_at(&p, &t, 0, 0)
}

fn glob_match_at(p: &[char], t: &[char], pi: usize, ti: usize) -> bool {
    if pi == p.len() {
        return ti == t.len();
    }
    match p[pi] {
        '*' => (ti..=t.len()).any(|i| glob_match_at(p, t, pi + 1, i)),
        '?' => ti < t.len() && glob_match_at(p, t, pi + 1, ti + 1),
        c => ti < t.len() && t[ti] == c && glob_match_at(p, t, pi + 1, ti + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    #[test]
    fn glob_matches_star_and_question() {
        assert!(glob_match("tech-*", "tech-debt"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "abcd"));
        assert!(!glob_match("tech-*", "feature-x"));
    }

    #[test]
    fn status_and_priority_filter() {
        let issue = IssueBuilder::new("t").id("bd-1").priority(2).build();
        let mut filter = IssueFilter::default();
        filter.priority = Some(2);
        assert!(matches(&issue, &filter).unwrap());
        filter.priority = Some(3);
        assert!(!matches(&issue, &filter).unwrap());
    }

    #[test]
    fn tombstones_excluded_unless_requested() {
        let mut issue = IssueBuilder::new("t").id("bd-1").build();
        issue.status = beads_core::enums::Status::Tombstone;
        let filter = IssueFilter::default();
        assert!(!matches(&issue, &filter).unwrap());
        let filter = IssueFilter { include_tombstones: true, ..Default::default() };
        assert!(matches(&issue, &filter).unwrap());
    }

    #[test]
    fn label_regex_filters() {
        let mut issue = IssueBuilder::new("t").id("bd-1").build();
        issue.labels = vec!["tech-debt".to_string()];
        let filter = IssueFilter { label_regex: Some("^tech-".to_string()), ..Default::default() };
        assert!(matches(&issue, &filter).unwrap());
        let filter = IssueFilter { label_regex: Some("^feature-".to_string()), ..Default::default() };
        assert!(!matches(&issue, &filter).unwrap());
    }
}
