use shared::{AnalysisResult, SavedScan, ScanRecord};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::{MetadataStore, NewScan, RepositoryError};
use crate::inference::upload::Upload;
use crate::storage::{ObjectStore, StorageError};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 50;
pub const MAX_COMPARED_SCANS: usize = 4;
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Scan not found")]
    NotFound,
    #[error("You can compare up to 4 scans at a time")]
    TooManyScans,
    #[error("Select at least one scan")]
    NoScansSelected,
}

/// Saved analyses per user: blob in object storage, row in the metadata store.
#[derive(Clone)]
pub struct ScanHistoryService {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
}

impl ScanHistoryService {
    pub fn new(metadata: Arc<dyn MetadataStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { metadata, objects }
    }

    pub async fn save(
        &self,
        owner: &str,
        upload: &Upload,
        result: &AnalysisResult,
    ) -> Result<SavedScan, HistoryError> {
        let location = self
            .objects
            .store(&upload.bytes, owner, &upload.media_type)
            .await?;

        let scan = NewScan {
            file_name: &upload.file_name,
            file_size: upload.bytes.len() as u64,
            result,
        };
        let record_id = self.metadata.insert(owner, &location, scan).await?;

        Ok(SavedScan {
            record_id,
            location,
        })
    }

    pub async fn list(&self, owner: &str, limit: Option<usize>) -> Result<Vec<ScanRecord>, HistoryError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.metadata.query(owner, limit).await?)
    }

    pub async fn get(&self, owner: &str, record_id: Uuid) -> Result<ScanRecord, HistoryError> {
        self.metadata
            .get(record_id, owner)
            .await?
            .ok_or(HistoryError::NotFound)
    }

    /// The row goes first; a blob that then fails to delete is left orphaned.
    pub async fn delete(&self, owner: &str, record_id: Uuid) -> Result<(), HistoryError> {
        let record = self.get(owner, record_id).await?;

        self.metadata
            .delete(record_id, owner)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => HistoryError::NotFound,
                other => HistoryError::Repository(other),
            })?;

        if let Err(e) = self.objects.delete(&record.image_location).await {
            log::warn!(
                "Scan {} deleted but its image {} could not be removed: {}",
                record_id,
                record.image_location,
                e
            );
        }

        Ok(())
    }

    /// Records in the requested order, for side-by-side comparison.
    pub async fn compare(&self, owner: &str, ids: &[Uuid]) -> Result<Vec<ScanRecord>, HistoryError> {
        if ids.is_empty() {
            return Err(HistoryError::NoScansSelected);
        }
        if ids.len() > MAX_COMPARED_SCANS {
            return Err(HistoryError::TooManyScans);
        }

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.get(owner, *id).await?);
        }
        Ok(records)
    }

    pub async fn image_url(&self, owner: &str, record_id: Uuid) -> Result<String, HistoryError> {
        let record = self.get(owner, record_id).await?;
        Ok(self
            .objects
            .signed_url(&record.image_location, SIGNED_URL_TTL)
            .await?)
    }
}
