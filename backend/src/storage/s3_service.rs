use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::{ObjectStore, StorageError};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn extension_for(media_type: &str) -> &'static str {
        match media_type {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "bin",
        }
    }

    /// `scans/{owner}/{unix_millis}_{sha256}.{ext}`; the owner prefix keeps
    /// tenants apart.
    pub fn generate_s3_key(owner: &str, timestamp_millis: i64, image_hash: &str, ext: &str) -> String {
        format!("scans/{}/{}_{}.{}", owner, timestamp_millis, image_hash, ext)
    }

    pub async fn upload_image(
        &self,
        image_data: &[u8],
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from(image_data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        log::info!("Uploaded {} bytes to s3://{}/{}", image_data.len(), self.bucket_name, s3_key);
        Ok(())
    }

    pub async fn delete_image(&self, s3_key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }

    pub async fn presign_image(&self, s3_key: &str, ttl: Duration) -> Result<String, StorageError> {
        if let Err(e) = self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
        {
            if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                log::warn!("Refusing to sign URL for missing object {}", s3_key);
                return Err(StorageError::NotFound(s3_key.to_string()));
            }
            return Err(StorageError::S3(e.to_string()));
        }

        let config =
            PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .presigned(config)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

impl ObjectStore for S3Service {
    fn store<'a>(
        &'a self,
        bytes: &'a [u8],
        owner: &'a str,
        media_type: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            let image_hash = S3Service::calculate_image_hash(bytes);
            let s3_key = S3Service::generate_s3_key(
                owner,
                chrono::Utc::now().timestamp_millis(),
                &image_hash,
                S3Service::extension_for(media_type),
            );
            self.upload_image(bytes, &s3_key, media_type).await?;
            Ok(s3_key)
        })
    }

    fn delete<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.delete_image(location))
    }

    fn signed_url<'a>(
        &'a self,
        location: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(self.presign_image(location, ttl))
    }
}
