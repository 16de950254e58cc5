//! Prefix and route resolution across a federated "town" of replicas.
//!
//! A town is a set of cooperating replicas, each owning one or more ID
//! prefixes. Route tables live as NDJSON files and are loaded relative to
//! a town root discovered by walking up from the working directory looking
//! for a `mayor/town.json` marker, mirroring `beads_git::gitdir::find_git_root`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

/// A single route entry: a prefix and the directory (relative to the town
/// root) that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: String,
    pub path: String,
}

/// Returns everything up to and including the first hyphen in `id`, or an
/// empty string if `id` contains no hyphen.
pub fn extract_prefix(id: &str) -> String {
    match id.find('-') {
        Some(idx) => id[..=idx].to_string(),
        None => String::new(),
    }
}

/// Reads `<dir>/routes.jsonl`, ignoring blank and `#`-commented lines and
/// silently dropping malformed or incomplete entries.
pub fn load_routes(dir: &Path) -> Vec<Route> {
    let path = dir.join("routes.jsonl");
    let Ok(content) = fs::read_to_string(&path) else {
        return Vec::new();
    };

    let mut routes = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        let prefix = value.get("prefix").and_then(|v| v.as_str()).unwrap_or("");
        let path = value.get("path").and_then(|v| v.as_str()).unwrap_or("");
        if prefix.is_empty() || path.is_empty() {
            continue;
        }
        routes.push(Route {
            prefix: prefix.to_string(),
            path: path.to_string(),
        });
    }
    routes
}

/// Walks up from `start` looking for a `mayor/town.json` marker, returning
/// the directory that contains it.
pub fn find_town_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;
    let mut current = start.as_path();
    loop {
        if current.join("mayor").join("town.json").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => return None,
        }
    }
}

/// Loads routes, trying `dir` first and falling back to the town root's
/// `.beads/routes.jsonl`.
///
/// The town-root lookup starts at `cwd` (not `dir`), so a symlinked replica
/// directory still resolves to the logical town it belongs to.
pub fn load_town_routes(dir: &Path, cwd: &Path) -> (Vec<Route>, Option<PathBuf>) {
    let local = load_routes(dir);
    if !local.is_empty() {
        let town_root = find_town_root(cwd);
        return (local, town_root);
    }

    match find_town_root(cwd) {
        Some(town_root) => {
            let routes = load_routes(&town_root.join(".beads"));
            (routes, Some(town_root))
        }
        None => (Vec::new(), None),
    }
}

/// Follows a `redirect` file inside `dir` once, if present.
///
/// The redirect file contains a single line naming an absolute or
/// `dir`-relative path. Returns the followed directory, or `dir` itself if
/// no redirect file exists.
fn follow_redirect(dir: &Path) -> PathBuf {
    let redirect_path = dir.join("redirect");
    let Ok(content) = fs::read_to_string(&redirect_path) else {
        return dir.to_path_buf();
    };
    let target = content.trim();
    if target.is_empty() {
        return dir.to_path_buf();
    }
    let target_path = Path::new(target);
    if target_path.is_absolute() {
        target_path.to_path_buf()
    } else {
        dir.join(target_path)
    }
}

/// Resolves the `.beads` directory that owns `id`, given the local
/// replica's own `.beads` directory and the process working directory.
///
/// Returns `(targetDir, routed)` where `routed` is `true` if a route table
/// entry was actually followed (as opposed to falling back to `localDir`).
pub fn resolve_beads_dir_for_id(id: &str, local_dir: &Path, cwd: &Path) -> (PathBuf, bool) {
    let prefix = extract_prefix(id);
    if prefix.is_empty() {
        return (local_dir.to_path_buf(), false);
    }

    let (routes, town_root) = load_town_routes(local_dir, cwd);
    let Some(route) = routes.iter().find(|r| r.prefix == prefix) else {
        trace!(prefix, "no route found, using local directory");
        return (local_dir.to_path_buf(), false);
    };

    let candidate = if route.path == "." {
        match &town_root {
            Some(root) => root.join(".beads"),
            None => local_dir.to_path_buf(),
        }
    } else {
        match &town_root {
            Some(root) => root.join(&route.path).join(".beads"),
            None => {
                debug!(prefix, "route matched but no town root found");
                return (local_dir.to_path_buf(), false);
            }
        }
    };

    let resolved = follow_redirect(&candidate);
    if resolved.is_dir() {
        (resolved, true)
    } else {
        debug!(?resolved, "route target does not exist, falling back to local");
        (local_dir.to_path_buf(), false)
    }
}

/// Forgiving lookup of a `.beads` directory by rig name or prefix.
///
/// Accepts `"foo"`, `"foo-"`, or a rig name (the first path segment of a
/// route's path). Returns the resolved directory and the prefix it owns,
/// if found.
pub fn resolve_beads_dir_for_rig(
    rig_or_prefix: &str,
    local_dir: &Path,
    cwd: &Path,
) -> Option<(PathBuf, String)> {
    let needle = rig_or_prefix.trim_end_matches('-');
    let (routes, town_root) = load_town_routes(local_dir, cwd);

    for route in &routes {
        let route_prefix = route.prefix.trim_end_matches('-');
        let rig_name = route.path.split('/').next().unwrap_or(&route.path);
        if route_prefix == needle || rig_name == needle {
            let dir = match &town_root {
                Some(root) if route.path == "." => root.join(".beads"),
                Some(root) => root.join(&route.path).join(".beads"),
                None => continue,
            };
            let resolved = follow_redirect(&dir);
            if resolved.is_dir() {
                return Some((resolved, route.prefix.clone()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extract_prefix_basic() {
        assert_eq!(extract_prefix("bd-abc123"), "bd-");
        assert_eq!(extract_prefix("no-hyphen-less"), "no-");
        assert_eq!(extract_prefix("noprefix"), "");
    }

    #[test]
    fn load_routes_skips_comments_and_blanks() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("routes.jsonl"),
            "# a comment\n\n{\"prefix\":\"bd-\",\"path\":\".\"}\n{\"prefix\":\"\",\"path\":\"x\"}\n",
        )
        .unwrap();
        let routes = load_routes(dir.path());
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].prefix, "bd-");
    }

    #[test]
    fn find_town_root_via_marker() {
        let dir = tempdir().unwrap();
        let town = dir.path().join("town");
        let nested = town.join("nested").join("deeper");
        fs::create_dir_all(nested.join("mayor")).unwrap();
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(town.join("mayor")).unwrap();
        fs::write(town.join("mayor").join("town.json"), "{}").unwrap();

        let found = find_town_root(&nested).unwrap();
        assert_eq!(found, town.canonicalize().unwrap());
    }

    #[test]
    fn resolve_beads_dir_for_id_no_route_falls_back() {
        let dir = tempdir().unwrap();
        let local = dir.path().join(".beads");
        fs::create_dir_all(&local).unwrap();
        let (resolved, routed) = resolve_beads_dir_for_id("bd-abc", &local, dir.path());
        assert!(!routed);
        assert_eq!(resolved, local);
    }
}
