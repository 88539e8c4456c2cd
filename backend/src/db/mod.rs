pub mod dynamodb_repository;

use futures::future::BoxFuture;
use shared::{AnalysisResult, ScanRecord};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found")]
    NotFound,
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Row contents supplied by the caller when persisting an analysis.
#[derive(Debug, Clone, Copy)]
pub struct NewScan<'a> {
    pub file_name: &'a str,
    pub file_size: u64,
    pub result: &'a AnalysisResult,
}

/// Scan history rows. Every lookup and delete is filtered by owner.
pub trait MetadataStore: Send + Sync {
    fn insert<'a>(
        &'a self,
        owner: &'a str,
        location: &'a str,
        scan: NewScan<'a>,
    ) -> BoxFuture<'a, Result<Uuid, RepositoryError>>;

    /// Newest first, at most `limit` rows.
    fn query<'a>(
        &'a self,
        owner: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ScanRecord>, RepositoryError>>;

    fn get<'a>(
        &'a self,
        record_id: Uuid,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<Option<ScanRecord>, RepositoryError>>;

    /// Fails with `NotFound` when the row is missing or belongs to someone else.
    fn delete<'a>(
        &'a self,
        record_id: Uuid,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;
}

pub fn new_record(owner: &str, location: &str, scan: NewScan<'_>) -> ScanRecord {
    ScanRecord {
        id: Uuid::new_v4(),
        user_id: owner.to_string(),
        image_location: location.to_string(),
        file_name: scan.file_name.to_string(),
        file_size: scan.file_size,
        created_at: chrono::Utc::now(),
        result: scan.result.clone(),
    }
}
