//! Read-only fragment access with a batch-scoped, content-addressed cache.
//!
//! Fragment paths resolve against a single configured root. Relative paths
//! that escape the root are rejected up front; ambiguity about which
//! directory an include is relative to has to stay impossible.

use crate::config::validate_relative_path;
use crate::errors::CompileError;
use crate::util::sha256_hex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// One included text file. Shared read-only across every document that
/// includes it; cached for the duration of a batch compile.
#[derive(Debug)]
pub struct Fragment {
    pub rel_path: String,
    pub path: PathBuf,
    pub text: String,
    pub content_hash: String,
}

type FragmentCell = Arc<OnceLock<Result<Arc<Fragment>, CompileError>>>;

pub struct FragmentStore {
    root: PathBuf,
    entries: Mutex<HashMap<String, FragmentCell>>,
}

impl FragmentStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch a fragment by root-relative path.
    ///
    /// The first reader for a path performs the disk read; concurrent
    /// readers for the same uncached path block on the same cell, so the
    /// underlying file is read at most once per batch.
    pub fn get(&self, rel_path: &str) -> Result<Arc<Fragment>, CompileError> {
        let cell = {
            let mut entries = self.entries.lock().expect("fragment cache poisoned");
            entries.entry(rel_path.to_string()).or_default().clone()
        };
        cell.get_or_init(|| self.read_fragment(rel_path)).clone()
    }

    fn read_fragment(&self, rel_path: &str) -> Result<Arc<Fragment>, CompileError> {
        if validate_relative_path(rel_path, "fragment").is_err() {
            return Err(CompileError::NotFound {
                path: rel_path.to_string(),
            });
        }
        let path = self.root.join(rel_path);
        if !path.is_file() {
            return Err(CompileError::NotFound {
                path: rel_path.to_string(),
            });
        }
        let text = fs::read_to_string(&path).map_err(|err| CompileError::Read {
            path: rel_path.to_string(),
            message: err.to_string(),
        })?;
        let content_hash = sha256_hex(text.as_bytes());
        tracing::debug!(fragment = rel_path, hash = %content_hash, "fragment loaded");
        Ok(Arc::new(Fragment {
            rel_path: rel_path.to_string(),
            path,
            text,
            content_hash,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_fragment_root(name: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("{name}-{}-{now}", std::process::id()));
        std::fs::create_dir_all(&root).expect("create fragment root");
        root
    }

    #[test]
    fn get_returns_cached_fragment_on_second_read() {
        let root = temp_fragment_root("ppack-fragments-cache");
        std::fs::write(root.join("core.md"), "core principles\n").expect("write fragment");

        let store = FragmentStore::new(root.clone());
        let first = store.get("core.md").expect("first read");
        // Mutate the file after the first read; the cache must not notice.
        std::fs::write(root.join("core.md"), "changed\n").expect("rewrite fragment");
        let second = store.get("core.md").expect("second read");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.text, "core principles\n");

        std::fs::remove_dir_all(root).expect("cleanup");
    }

    #[test]
    fn missing_fragment_reports_exact_path() {
        let root = temp_fragment_root("ppack-fragments-missing");
        let store = FragmentStore::new(root.clone());
        let err = store.get("core/missing.md").expect_err("must fail");
        match err {
            CompileError::NotFound { path } => assert_eq!(path, "core/missing.md"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        std::fs::remove_dir_all(root).expect("cleanup");
    }

    #[test]
    fn rejects_paths_escaping_the_root() {
        let root = temp_fragment_root("ppack-fragments-escape");
        let store = FragmentStore::new(root.clone());
        assert!(matches!(
            store.get("../outside.md"),
            Err(CompileError::NotFound { .. })
        ));
        assert!(matches!(
            store.get("/etc/hostname"),
            Err(CompileError::NotFound { .. })
        ));
        std::fs::remove_dir_all(root).expect("cleanup");
    }

    #[test]
    fn content_hash_matches_text() {
        let root = temp_fragment_root("ppack-fragments-hash");
        std::fs::write(root.join("a.md"), "alpha\n").expect("write fragment");
        let store = FragmentStore::new(root.clone());
        let fragment = store.get("a.md").expect("read");
        assert_eq!(fragment.content_hash, sha256_hex(b"alpha\n"));
        std::fs::remove_dir_all(root).expect("cleanup");
    }
}
