//! NDJSON transport for import batches.
//!
//! Extends `beads_core::jsonl`'s blank-line skipping with tolerance for
//! `#`-comments and leftover git conflict markers, since import batches
//! commonly arrive as the contents of a JSONL file that went through a
//! merge conflict.

use std::io::BufRead;

use beads_core::issue::Issue;

/// A line skipped during transport parsing, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedLine {
    /// A `#`-prefixed comment line.
    Comment { line: usize },
    /// A git conflict marker (`<<<<<<< `, `=======`, `>>>>>>> `).
    ConflictMarker { line: usize, text: String },
}

/// Error parsing one line of the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying reader failed.
    #[error("I/O error reading batch at line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
    /// A line was not valid JSON.
    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl TransportError {
    /// The 1-based line number the error occurred at.
    pub fn line(&self) -> usize {
        match self {
            Self::Io { line, .. } | Self::Json { line, .. } => *line,
        }
    }
}

/// Reads an NDJSON batch, returning the parsed issues and a log of the
/// non-content lines that were skipped.
///
/// Blank lines, `#`-comments, and git conflict-marker lines are skipped
/// without being treated as errors. Any other malformed line is a hard
/// error -- conflict markers are the only "non-JSON but expected" shape.
pub fn read_batch<R: BufRead>(reader: R) -> Result<(Vec<Issue>, Vec<SkippedLine>), TransportError> {
    let mut issues = Vec::new();
    let mut skipped = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.map_err(|e| TransportError::Io {
            line: line_number,
            source: e,
        })?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            skipped.push(SkippedLine::Comment { line: line_number });
            continue;
        }
        if is_conflict_marker(trimmed) {
            skipped.push(SkippedLine::ConflictMarker {
                line: line_number,
                text: trimmed.to_string(),
            });
            continue;
        }

        let issue: Issue = serde_json::from_str(trimmed).map_err(|e| TransportError::Json {
            line: line_number,
            source: e,
        })?;
        issues.push(issue);
    }

    Ok((issues, skipped))
}

/// Returns `true` if `line` is a git conflict-marker line.
fn is_conflict_marker(line: &str) -> bool {
    line.starts_with("<<<<<<< ") || line.starts_with(">>>>>>> ") || line == "======="
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn skips_blank_and_comment_lines() {
        let data = "{\"title\":\"A\"}\n\n# a note\n{\"title\":\"B\"}\n";
        let (issues, skipped) = read_batch(Cursor::new(data)).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert!(matches!(skipped[0], SkippedLine::Comment { line: 3 }));
    }

    #[test]
    fn skips_conflict_markers() {
        let data = "<<<<<<< HEAD\n{\"title\":\"Ours\"}\n=======\n{\"title\":\"Theirs\"}\n>>>>>>> branch\n";
        let (issues, skipped) = read_batch(Cursor::new(data)).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(skipped.len(), 3);
    }

    #[test]
    fn propagates_malformed_json() {
        let data = "{\"title\":\"A\"}\nnot-json\n";
        let err = read_batch(Cursor::new(data)).unwrap_err();
        assert_eq!(err.line(), 2);
    }
}
