//! Project store layout: resolves `<project>/.ace/` and its fixed
//! sub-paths (spec.md §6 "Persisted state layout").
//!
//! Grounded on the teacher's `Store`/`StoreKind` handle (`core/store.rs`):
//! a thin, behavior-free path resolver that every subsystem threads
//! through rather than hard-coding paths of its own.

use std::path::{Path, PathBuf};

/// Handle to a project's `.ace/` state directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    /// Project root (the directory containing `.ace/`).
    pub project_root: PathBuf,
    /// Absolute path to `<project_root>/.ace`.
    pub root: PathBuf,
}

impl ProjectStore {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let root = project_root.join(".ace");
        Self { project_root, root }
    }

    pub fn symbols_path(&self) -> PathBuf {
        self.root.join("symbols.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root.join("cache.db")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    pub fn learn_path(&self) -> PathBuf {
        self.root.join("learn.json")
    }

    pub fn skiplist_path(&self) -> PathBuf {
        self.root.join("skiplist.json")
    }

    pub fn journals_dir(&self) -> PathBuf {
        self.root.join("journals")
    }

    pub fn journal_path(&self, run_id: &str) -> PathBuf {
        self.journals_dir().join(format!("{run_id}.jsonl"))
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.root.join("receipts")
    }

    pub fn receipt_path(&self, plan_id: &str) -> PathBuf {
        self.receipts_dir().join(format!("{plan_id}.json"))
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.root.join("baseline.json")
    }

    pub fn policy_path(&self) -> PathBuf {
        self.root.join("policy.toml")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    pub fn blob_path(&self, content_sha256_hex: &str) -> PathBuf {
        self.blobs_dir().join(content_sha256_hex)
    }

    /// Creates every directory this store will ever write into. Idempotent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.journals_dir())?;
        std::fs::create_dir_all(self.receipts_dir())?;
        std::fs::create_dir_all(self.blobs_dir())?;
        Ok(())
    }

    /// Resolves a project-relative POSIX path against the project root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.project_root.join(relative)
    }
}

/// Normalizes a path to a POSIX-separated, project-relative string, as
/// required for `Finding.file` (spec.md §3).
pub fn normalize_relative_path(project_root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(project_root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_rooted_under_dot_ace() {
        let store = ProjectStore::new("/tmp/proj");
        assert_eq!(store.root, PathBuf::from("/tmp/proj/.ace"));
        assert_eq!(store.learn_path(), PathBuf::from("/tmp/proj/.ace/learn.json"));
        assert_eq!(
            store.journal_path("run-1"),
            PathBuf::from("/tmp/proj/.ace/journals/run-1.jsonl")
        );
    }

    #[test]
    fn test_normalize_relative_path_uses_posix_separators() {
        let root = Path::new("/tmp/proj");
        let path = Path::new("/tmp/proj/src/main.rs");
        assert_eq!(normalize_relative_path(root, path), "src/main.rs");
    }
}
