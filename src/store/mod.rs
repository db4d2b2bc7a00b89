//! Object store access layer.
//!
//! The object store is the data bus between pipeline stages: every stage
//! reads its declared input keys and writes its declared output keys, and no
//! stage calls another stage's code directly. This module provides:
//!
//! - [`ArtifactStore`]: the typed read/write/exists seam the orchestrator
//!   depends on, so the stage runner and catalog are testable with fakes
//! - [`MinioClient`]: the reqwest-backed MinIO/S3 implementation
//! - [`keys`]: the object key contract between stages
//! - [`catalog`]: garment catalog queries over the clothes bucket
//! - [`init`]: bucket provisioning and catalog seeding

pub mod catalog;
pub mod client;
pub mod init;
pub mod keys;
mod sign;

#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use catalog::GarmentCatalog;
pub use client::MinioClient;
pub use keys::Gender;

/// Typed operations against bucket+key object storage.
///
/// The orchestrator only ever stats, reads, writes, and lists keys; the
/// store holds no pipeline state of its own.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Checks whether a bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError>;

    /// Creates a bucket. Creating a bucket that already exists is not an error.
    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Checks whether an object exists (stat call, no body transfer).
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// Uploads an object.
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    /// Downloads an object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Lists object keys, optionally restricted to a prefix.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StoreError>;

    /// Generates a time-boxed presigned GET URL for an object.
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> Result<String, StoreError>;
}
