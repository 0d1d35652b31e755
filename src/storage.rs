//! Local file storage for render byproducts.
//!
//! The renderer needs scratch space twice: a throwaway `$HOME` for a
//! locally launched browser, and somewhere to put finished PDFs when
//! the caller wants a file instead of bytes. [`TempStorage`] backs both
//! with one temporary directory that is removed on drop.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Storage
// ============================================================================

/// Local file storage capability.
pub trait Storage: Send + Sync {
    /// Writes `content` under `name` and returns the absolute path.
    fn create(&self, name: &str, content: &[u8]) -> Result<PathBuf>;

    /// Resolves `name` to an absolute path inside the storage root,
    /// creating the entry as a directory if nothing exists there yet.
    fn resolve_dir(&self, name: &str) -> Result<PathBuf>;

    /// Whether `name` has been created in this storage.
    fn has(&self, name: &str) -> bool;
}

// ============================================================================
// TempStorage
// ============================================================================

/// Storage rooted in a fresh temporary directory.
///
/// Everything created through it disappears when the storage is
/// dropped.
#[derive(Debug)]
pub struct TempStorage {
    root: TempDir,
    files: Mutex<FxHashMap<String, PathBuf>>,
}

impl TempStorage {
    /// Creates a new temporary directory to store files in.
    pub fn new() -> Result<Self> {
        let root = TempDir::with_prefix("chrome-pdf-")
            .map_err(|e| Error::storage(format!("Failed to create temporary directory: {e}")))?;
        debug!(root = %root.path().display(), "Created temporary storage");
        Ok(Self {
            root,
            files: Mutex::new(FxHashMap::default()),
        })
    }

    /// The storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Produces a name that cannot collide with earlier ones.
    #[must_use]
    pub fn unique_name(extension: &str) -> String {
        format!("{}.{extension}", Uuid::new_v4())
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        // Names must stay inside the root.
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(Error::storage(format!("Invalid storage name: {name:?}")));
        }
        Ok(self.root.path().join(name))
    }
}

impl Storage for TempStorage {
    fn create(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.entry_path(name)?;
        std::fs::write(&path, content)
            .map_err(|e| Error::storage(format!("Failed to write {}: {e}", path.display())))?;
        self.files.lock().insert(name.to_string(), path.clone());
        debug!(path = %path.display(), bytes = content.len(), "Stored file");
        Ok(path)
    }

    fn resolve_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.entry_path(name)?;
        if !path.exists() {
            std::fs::create_dir(&path).map_err(|e| {
                Error::storage(format!("Failed to create {}: {e}", path.display()))
            })?;
            self.files.lock().insert(name.to_string(), path.clone());
        }
        Ok(path)
    }

    fn has(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_resolve() {
        let storage = TempStorage::new().expect("storage");
        assert!(!storage.has("out.pdf"));

        let path = storage.create("out.pdf", b"%PDF-1.4").expect("create");
        assert!(path.starts_with(storage.root()));
        assert_eq!(std::fs::read(&path).expect("read back"), b"%PDF-1.4");
        assert!(storage.has("out.pdf"));
    }

    #[test]
    fn test_resolve_dir_creates_once() {
        let storage = TempStorage::new().expect("storage");
        let first = storage.resolve_dir("HOME").expect("resolve");
        assert!(first.is_dir());
        let second = storage.resolve_dir("HOME").expect("resolve again");
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let storage = TempStorage::new().expect("storage");
        assert!(storage.create("", b"x").is_err());
        assert!(storage.create("../escape", b"x").is_err());
        assert!(storage.create("a/b", b"x").is_err());
    }

    #[test]
    fn test_cleanup_on_drop() {
        let storage = TempStorage::new().expect("storage");
        let path = storage.create("out.pdf", b"%PDF-1.4").expect("create");
        let root = storage.root().to_path_buf();
        drop(storage);
        assert!(!path.exists());
        assert!(!root.exists());
    }

    #[test]
    fn test_unique_names_differ() {
        assert_ne!(TempStorage::unique_name("pdf"), TempStorage::unique_name("pdf"));
    }
}
