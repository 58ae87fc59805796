//! Warden Config FS - Shared-filesystem backend
//!
//! Hosts a configuration namespace on a directory visible to every
//! supervisor instance (NFS or similar). Keys map to files, `/` in a key to a
//! subdirectory. Writes go through a temp file plus rename so a reader never
//! observes a half-written value; visibility then has the consistency of the
//! underlying filesystem, which is exactly what the pseudo-lock's settle
//! interval exists to absorb.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;
use warden_common::{Result, WardenError};
use warden_config::{KvBackend, KvEntry};

/// Directory-backed [`KvBackend`].
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path under the root, rejecting keys that would
    /// escape it.
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(WardenError::IllegalArgument(format!(
                "invalid backend key: {key:?}"
            )));
        }
        Ok(self.root.join(key))
    }

    /// Key for a file path under the root, with `/` separators.
    fn path_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut key = String::new();
        for seg in rel.iter() {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(seg.to_str()?);
        }
        Some(key)
    }
}

fn io_err(err: std::io::Error, what: &str) -> WardenError {
    WardenError::BackendUnavailable(format!("{what}: {err}"))
}

/// Temp files staged by in-flight puts; never surfaced as entries.
fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

#[async_trait]
impl KvBackend for FsBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(err, "read")),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| WardenError::IllegalArgument(format!("invalid backend key: {key:?}")))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(e, "mkdir"))?;

        let staging = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, value)
            .await
            .map_err(|e| io_err(e, "write"))?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_err(err, "rename"));
        }
        debug!(key, "fs backend wrote key");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>> {
        // Walk from the deepest directory the prefix fully names.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.key_path(dir_part)?
        };

        let mut out = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(err, "readdir")),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(e, "readdir"))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| io_err(e, "stat"))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let name = entry.file_name();
                if is_staging_name(&name.to_string_lossy()) {
                    continue;
                }
                let Some(key) = self.path_key(&path) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }
                let value = match tokio::fs::read_to_string(&path).await {
                    Ok(value) => value,
                    // Deleted between readdir and read; not an error.
                    Err(err) if err.kind() == ErrorKind::NotFound => continue,
                    Err(err) => return Err(io_err(err, "read")),
                };
                let modified_at = entry
                    .metadata()
                    .await
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from);
                out.push(KvEntry {
                    key,
                    value,
                    modified_at,
                });
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(err, "unlink")),
        }
    }
}
