//! Content fingerprint tracking for the watched document directory.
//!
//! Each scan computes a SHA-256 digest over the raw bytes of every regular
//! file directly under the directory (non-recursive) and compares the result
//! against the previous [`Snapshot`]. Collision resistance is irrelevant
//! here; all that matters is that the digest is stable across runs for
//! unchanged content, so adds, edits, and deletions are all detected.
//! A rename shows up as a delete plus an add.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Mapping from file path to content fingerprint, representing the exact
/// file state an index was built from. Replaced wholesale, never patched.
pub type Snapshot = HashMap<PathBuf, String>;

/// Scan `dir` and report whether its content differs from `previous`.
///
/// A missing directory is created and reported as changed unconditionally
/// (bootstrap case). Files that cannot be read are logged and treated as
/// absent from the current snapshot; they never abort the scan.
///
/// The caller decides whether to adopt the returned snapshot as the new
/// baseline.
pub fn scan(dir: &Path, previous: &Snapshot) -> Result<(Snapshot, bool)> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create docs directory: {}", dir.display()))?;
        return Ok((Snapshot::new(), true));
    }

    let mut current = Snapshot::new();
    let mut changed = false;

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read docs directory: {}", dir.display()))?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let hash = match fingerprint_file(&path) {
            Ok(h) => h,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        if previous.get(&path) != Some(&hash) {
            changed = true;
        }
        current.insert(path, hash);
    }

    // Deletions: any previously tracked path absent from the current set.
    if !changed && previous.keys().any(|p| !current.contains_key(p)) {
        changed = true;
    }

    Ok((current, changed))
}

fn fingerprint_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_is_bootstrap() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        assert!(!dir.exists());

        let (snapshot, changed) = scan(&dir, &Snapshot::new()).unwrap();
        assert!(changed);
        assert!(snapshot.is_empty());
        assert!(dir.exists());
    }

    #[test]
    fn test_second_scan_without_changes_is_clean() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "The sky is blue.").unwrap();

        let (first, changed) = scan(tmp.path(), &Snapshot::new()).unwrap();
        assert!(changed);
        assert_eq!(first.len(), 1);

        let (second, changed) = scan(tmp.path(), &first).unwrap();
        assert!(!changed);
        assert_eq!(second, first);
    }

    #[test]
    fn test_added_file_detected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        let (snapshot, _) = scan(tmp.path(), &Snapshot::new()).unwrap();

        std::fs::write(tmp.path().join("b.txt"), "beta").unwrap();
        let (next, changed) = scan(tmp.path(), &snapshot).unwrap();
        assert!(changed);
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_modified_file_detected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "alpha").unwrap();
        let (snapshot, _) = scan(tmp.path(), &Snapshot::new()).unwrap();

        std::fs::write(&path, "alpha, revised").unwrap();
        let (_, changed) = scan(tmp.path(), &snapshot).unwrap();
        assert!(changed);
    }

    #[test]
    fn test_deleted_file_detected() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        std::fs::write(&a, "alpha").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "beta").unwrap();
        let (snapshot, _) = scan(tmp.path(), &Snapshot::new()).unwrap();

        std::fs::remove_file(&a).unwrap();
        let (next, changed) = scan(tmp.path(), &snapshot).unwrap();
        assert!(changed);
        assert_eq!(next.len(), 1);

        // And scanning again with the adopted snapshot is clean.
        let (_, changed) = scan(tmp.path(), &next).unwrap();
        assert!(!changed);
    }

    #[test]
    fn test_subdirectories_ignored() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("a.txt"), "hidden").unwrap();

        let (snapshot, changed) = scan(tmp.path(), &Snapshot::new()).unwrap();
        assert!(!changed);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_identical_content_same_fingerprint() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "same bytes").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "same bytes").unwrap();

        let (snapshot, _) = scan(tmp.path(), &Snapshot::new()).unwrap();
        let hashes: Vec<_> = snapshot.values().collect();
        assert_eq!(hashes[0], hashes[1]);
    }
}
