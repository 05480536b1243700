//! Key → document storage for rendered pages and device records.
//!
//! Keys are relative slash-separated paths (`wibs/np04-wib-101.html`).
//! Storage is last-writer-wins with no versioning.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

/// Dashboard page key.
pub const DASHBOARD_KEY: &str = "index.html";

/// Machine-readable fleet snapshot key.
pub const SNAPSHOT_KEY: &str = "status.json";

/// Directory holding per-device pages and records.
pub const DEVICE_DIR: &str = "wibs";

/// Key of a device's rendered page.
pub fn page_key(name: &str) -> String {
    format!("{DEVICE_DIR}/{name}.html")
}

/// Key of a device's persisted record.
pub fn record_key(name: &str) -> String {
    format!("{DEVICE_DIR}/{name}.json")
}

/// Document storage used by the poller and the dashboard server.
pub trait DocumentStore: Send + Sync {
    /// Read a document; `Ok(None)` when it doesn't exist.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Create or replace a document.
    fn write(&self, key: &str, text: &str) -> Result<()>;
}

/// Documents stored as files under a root directory.
///
/// Writes go to a temporary file in the target directory and are renamed
/// into place, so readers never see a partially written page.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, rejecting anything that could
    /// escape it.
    fn path(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let clean = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid document key '{key}'"),
            )
            .into());
        }
        Ok(self.root.join(rel))
    }
}

impl DocumentStore for DirStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, text: &str) -> Result<()> {
        let path = self.path(key)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.docs.lock().unwrap().keys().cloned().collect()
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.docs.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, text: &str) -> Result<()> {
        self.docs
            .lock()
            .unwrap()
            .insert(key.to_string(), text.to_string());
        Ok(())
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, text: &str) -> Result<()> {
        (**self).write(key, text)
    }
}
