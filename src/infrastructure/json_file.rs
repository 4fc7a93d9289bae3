use crate::domain::ports::StateStore;
use crate::error::StorageFault;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A durable store keeping all entries in one JSON object on disk.
///
/// Every `set` or `remove` rewrites the file through a temporary file in the same
/// directory followed by a rename, so a crash leaves either the old or the
/// new contents, never a torn file.
pub struct JsonFileStateStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStateStore {
    /// Opens the store at `path`, creating it lazily on first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageFault> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                StorageFault::new(format!("{} is corrupt: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StorageFault::new(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes under the caller's lock; the file IO runs on the
    /// blocking pool so the event loop keeps turning.
    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageFault> {
        let body = serde_json::to_vec_pretty(entries)
            .map_err(|e| StorageFault::new(format!("serialization error: {e}")))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &body))
            .await
            .map_err(|e| StorageFault::new(format!("state file writer failed: {e}")))?
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<(), StorageFault> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let io_fault =
        |e: std::io::Error| StorageFault::new(format!("cannot write {}: {e}", path.display()));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_fault)?;
    tmp.write_all(body).map_err(io_fault)?;
    tmp.as_file().sync_all().map_err(io_fault)?;
    tmp.persist(path).map_err(|e| io_fault(e.error))?;
    Ok(())
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageFault> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageFault> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(fault) = self.persist(&entries).await {
            // Keep memory in line with what is on disk.
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(fault);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageFault> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(fault) = self.persist(&entries).await {
            entries.insert(key.to_string(), previous);
            return Err(fault);
        }
        Ok(())
    }
}
