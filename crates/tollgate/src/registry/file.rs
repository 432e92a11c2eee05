//! JSON-file-backed client store.
//!
//! Records live in memory for reads. Every write first persists a snapshot
//! that already contains the change, through a temp file and a rename, and
//! only then applies it to the in-memory map. Readers therefore never see a
//! record that is not on disk. Writers are serialized by a mutex.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::{ClientRecord, ClientStore, CreateOutcome, MemoryClientStore};
use crate::error::{RegistryError, RegistryResult};

/// Client registry persisted to a JSON array of [`ClientRecord`]s.
pub struct FileClientStore {
    path: PathBuf,
    inner: MemoryClientStore,
    write_lock: Mutex<()>,
}

impl FileClientStore {
    /// Open the registry file, starting empty if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the file cannot be read and `InvalidRecord`
    /// if it does not parse.
    pub async fn open(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<ClientRecord>>(&bytes).map_err(|e| {
                RegistryError::invalid_record(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(RegistryError::unavailable(format!("{}: {e}", path.display())));
            }
        };

        tracing::info!(
            path = %path.display(),
            clients = records.len(),
            "Opened client registry file"
        );

        Ok(Self {
            path,
            inner: MemoryClientStore::from_records(records),
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &[ClientRecord]) -> RegistryResult<()> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| RegistryError::unavailable(format!("serialize registry: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RegistryError::unavailable(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RegistryError::unavailable(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait::async_trait]
impl ClientStore for FileClientStore {
    async fn find_by_id(&self, client_id: &str) -> RegistryResult<Option<ClientRecord>> {
        self.inner.find_by_id(client_id).await
    }

    async fn create_if_absent(&self, record: ClientRecord) -> RegistryResult<CreateOutcome> {
        let _guard = self.write_lock.lock().await;

        if self.inner.find_by_id(&record.client_id).await?.is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let mut snapshot = self.inner.records().await;
        snapshot.push(record.clone());
        if let Err(e) = self.persist(&snapshot).await {
            tracing::error!(
                client_id = %record.client_id,
                error = %e,
                "Failed to persist new client"
            );
            return Err(e);
        }

        // Writers are serialized, so the id is still absent here.
        self.inner.create_if_absent(record).await
    }

    async fn update_display_name(
        &self,
        client_id: &str,
        display_name: &str,
    ) -> RegistryResult<bool> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = self.inner.records().await;
        let Some(client) = snapshot.iter_mut().find(|c| c.client_id == client_id) else {
            return Ok(false);
        };
        client.set_display_name(display_name);

        self.persist(&snapshot).await?;
        self.inner.update_display_name(client_id, display_name).await
    }

    async fn len(&self) -> RegistryResult<usize> {
        self.inner.len().await
    }
}

impl std::fmt::Debug for FileClientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileClientStore")
            .field("path", &self.path)
            .finish()
    }
}
