//! File discovery for ingestion
//!
//! Walks a workspace root, applies include/exclude globs plus a fixed
//! deny-list of build and dependency directories, and returns candidates
//! sorted by relative path for deterministic runs.

use crate::error::{Result, ZmemError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory names that are never descended into.
const DENY_LIST: &[&str] = &[
    "node_modules",
    ".git",
    ".cache",
    "vendor",
    "dist",
    "build",
    ".env",
    "coverage",
];

/// Patterns used when a workspace does not configure any.
const DEFAULT_PATTERNS: &[&str] = &["**/*.md", "**/*.markdown", "**/*.txt"];

/// One candidate file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub abs_path: PathBuf,
    /// Path relative to the workspace root; the item's `source`
    pub rel_path: String,
    pub size: u64,
    /// Modification time, Unix epoch seconds
    pub mtime: i64,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| ZmemError::Validation(format!("invalid glob {}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ZmemError::Validation(format!("invalid glob set: {}", e)))
}

/// A path component is denied when it is on the deny-list or dot-prefixed.
fn is_denied_component(name: &str) -> bool {
    DENY_LIST.contains(&name) || name.starts_with('.')
}

/// Walk `root` and return matching files sorted by relative path.
pub fn discover_files(
    root: &Path,
    patterns: &[String],
    excludes: &[String],
) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Err(ZmemError::Validation(format!(
            "ingest root does not exist: {}",
            root.display()
        )));
    }

    let defaults: Vec<String> = DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();
    let include_set = build_globset(if patterns.is_empty() {
        &defaults
    } else {
        patterns
    })?;
    let exclude_set = build_globset(excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        // Keep the root itself; prune denied directories early.
        if entry.depth() == 0 {
            return true;
        }
        match entry.file_name().to_str() {
            Some(name) => !(entry.file_type().is_dir() && is_denied_component(name)),
            None => false,
        }
    });

    for entry in walker {
        let entry = entry.map_err(|e| ZmemError::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(is_denied_component)
        {
            continue;
        }
        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| {
            ZmemError::Io(std::io::Error::other(e))
        })?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        files.push(DiscoveredFile {
            abs_path: path.to_path_buf(),
            rel_path: rel_str,
            size: metadata.len(),
            mtime,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "# Note\n\nBody.\n").unwrap();
    }

    #[test]
    fn test_discovery_is_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "b/second.md");
        touch(root, "a/first.md");
        touch(root, "readme.txt");
        touch(root, "ignored.rs");
        touch(root, "node_modules/dep/readme.md");
        touch(root, ".git/config.md");
        touch(root, ".hidden/note.md");

        let files = discover_files(root, &[], &[]).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["a/first.md", "b/second.md", "readme.txt"]);
    }

    #[test]
    fn test_custom_patterns_and_excludes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "docs/keep.md");
        touch(root, "docs/drafts/skip.md");
        touch(root, "notes.txt");

        let files = discover_files(
            root,
            &["**/*.md".to_string()],
            &["docs/drafts/**".to_string()],
        )
        .unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["docs/keep.md"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(discover_files(&missing, &[], &[]).is_err());
    }

    #[test]
    fn test_dotfiles_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, ".secret.md");
        touch(root, "visible.md");

        let files = discover_files(root, &[], &[]).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["visible.md"]);
    }
}
