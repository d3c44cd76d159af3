//! Storage for per-attachment CDN metadata

use crate::models::MediaRecord;
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Returns the stored record, or a clean one for an unknown id.
    async fn get(&self, id: u64) -> Result<MediaRecord>;
    async fn put(&self, record: &MediaRecord) -> Result<()>;
}

/// Keeps every record in a single JSON object keyed by id.
pub struct JsonMediaStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    lock: AsyncMutex<()>,
}

impl JsonMediaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: AsyncMutex::new(()),
        }
    }

    /// Sibling file each write lands in before it replaces the database.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_all(&self) -> Result<BTreeMap<u64, MediaRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MediaStore for JsonMediaStore {
    async fn get(&self, id: u64) -> Result<MediaRecord> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        Ok(records.remove(&id).unwrap_or_else(|| MediaRecord::new(id)))
    }

    async fn put(&self, record: &MediaRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(record.id, record.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers see either the old or the new file, never a partial one.
        let staging = self.staging_path();
        tokio::fs::write(&staging, serde_json::to_string_pretty(&records)?).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryMediaStore {
    records: Arc<Mutex<BTreeMap<u64, MediaRecord>>>,
    put_count: Arc<Mutex<usize>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, record: MediaRecord) -> Self {
        self.records.lock().unwrap().insert(record.id, record);
        self
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn get(&self, id: u64) -> Result<MediaRecord> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| MediaRecord::new(id)))
    }

    async fn put(&self, record: &MediaRecord) -> Result<()> {
        *self.put_count.lock().unwrap() += 1;
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }
}
