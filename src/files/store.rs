//!
//! csvdeck file store
//! ------------------
//! Flat on-disk store for uploaded files. Every upload is written once under
//! its stored identity directly inside the configured upload folder; files are
//! never rewritten. Listing is a directory scan, so anything dropped into the
//! folder with a well-formed identity name shows up too.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::identity::StoredIdentity;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct FileStore {
    /// Folder holding one file per stored identity.
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the folder if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create or access upload folder: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root_path(&self) -> &Path { &self.root }

    pub fn path_for(&self, id: &StoredIdentity) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Persist an upload stamped with the current time.
    pub async fn persist(&self, original_name: &str, bytes: &[u8]) -> AppResult<StoredIdentity> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.persist_at(original_name, bytes, now_ms).await
    }

    /// Persist an upload stamped with `now_ms`.
    ///
    /// An identity that already exists on disk is reported as a conflict and the
    /// existing file is left untouched.
    pub async fn persist_at(&self, original_name: &str, bytes: &[u8], now_ms: i64) -> AppResult<StoredIdentity> {
        let id = StoredIdentity::generate(original_name, now_ms)?;
        let path = self.path_for(&id);
        let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(AppError::conflict(
                    "identity_conflict".to_string(),
                    format!("A file named {} already exists", id),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            // Drop the partial file so it never shows up in listings
            let _ = tokio::fs::remove_file(&path).await;
            return Err(AppError::io("io_error".to_string(), format!("Error writing file: {}", e)));
        }
        info!(target: "csvdeck::store", identity = %id, bytes = bytes.len(), "stored upload");
        Ok(id)
    }

    /// Enumerate stored identities, sorted by name.
    ///
    /// Entries that are not regular files or whose names are not well-formed
    /// identities are skipped.
    pub async fn list(&self) -> AppResult<Vec<StoredIdentity>> {
        let mut rd = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AppError::io("io_error".to_string(), format!("Error reading files: {}", e)))?;
        let mut out = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| AppError::io("io_error".to_string(), format!("Error reading files: {}", e)))?
        {
            let is_file = entry.file_type().await.map(|ft| ft.is_file()).unwrap_or(false);
            if !is_file { continue; }
            let name = entry.file_name().to_string_lossy().to_string();
            match StoredIdentity::parse(&name) {
                Ok(id) => out.push(id),
                Err(_) => debug!(target: "csvdeck::store", "list: skipping foreign entry '{}'", name),
            }
        }
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(out)
    }

    /// Read the raw bytes stored under `identity`.
    pub async fn read(&self, identity: &str) -> AppResult<Vec<u8>> {
        let id = StoredIdentity::parse(identity)?;
        let bytes = tokio::fs::read(self.path_for(&id)).await?;
        debug!(target: "csvdeck::store", identity = %id, bytes = bytes.len(), "read stored file");
        Ok(bytes)
    }

    /// Delete the file stored under `identity`.
    ///
    /// Of two concurrent deletes of one identity, the one that loses the race
    /// gets a not-found error.
    pub async fn delete(&self, identity: &str) -> AppResult<StoredIdentity> {
        let id = StoredIdentity::parse(identity)?;
        tokio::fs::remove_file(self.path_for(&id)).await?;
        info!(target: "csvdeck::store", identity = %id, "deleted stored file");
        Ok(id)
    }
}
