pub mod s3_service;

use futures::future::BoxFuture;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid presigning configuration: {0}")]
    Presign(String),
}

/// Blob storage for uploaded scans, namespaced per owner.
pub trait ObjectStore: Send + Sync {
    fn store<'a>(
        &'a self,
        bytes: &'a [u8],
        owner: &'a str,
        media_type: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>>;

    fn delete<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;

    fn signed_url<'a>(
        &'a self,
        location: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<String, StorageError>>;
}
