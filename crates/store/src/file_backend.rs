//! File-based persistence backend. One pretty-printed JSON document.
//!
//! The document maps user id → conversation id → conversation, so it stays
//! human-inspectable and diffable.
//!
//! Storage location: `~/.relaychat/chat_histories.json` unless configured.

use async_trait::async_trait;
use relaychat_core::error::StoreError;
use relaychat_core::persistence::{PersistenceBackend, StoreSnapshot};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A file-backed persistence backend.
///
/// Saves write a sibling temp file and rename it over the target, so a crash
/// mid-write leaves the previous snapshot intact.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// First free `<file>.unreadable[.N]` sibling of the history file.
    fn quarantine_path(&self) -> PathBuf {
        let mut base = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        base.push(".unreadable");

        let mut candidate = self.path.with_file_name(&base);
        let mut n = 1;
        while candidate.exists() {
            let mut name = base.clone();
            name.push(format!(".{n}"));
            candidate = self.path.with_file_name(name);
            n += 1;
        }
        candidate
    }

    /// Move an unparseable history file aside so the next save cannot
    /// overwrite it.
    async fn quarantine(&self) -> Option<PathBuf> {
        let target = self.quarantine_path();
        match tokio::fs::rename(&self.path, &target).await {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to move unreadable history aside");
                None
            }
        }
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No chat history file yet, starting empty");
                return Ok(StoreSnapshot::new());
            }
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(StoreSnapshot::new());
        }

        let snapshot: StoreSnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let kept = match self.quarantine().await {
                    Some(target) => {
                        warn!(path = %self.path.display(), kept = %target.display(), "Unreadable chat history moved aside");
                        format!("; kept as {}", target.display())
                    }
                    None => String::new(),
                };
                return Err(StoreError::Storage(format!(
                    "Failed to parse {}: {e}{kept}",
                    self.path.display()
                )));
            }
        };

        debug!(path = %self.path.display(), users = snapshot.len(), "Chat histories loaded");
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create history directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize chat histories: {e}")))?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            StoreError::Storage(format!("Failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "Chat histories saved");
        Ok(())
    }
}
