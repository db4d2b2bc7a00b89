//! In-memory artifact store used by unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::ArtifactStore;

/// A fake store backed by a map, for exercising orchestration logic
/// without a running MinIO.
#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<HashSet<String>>,
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor seeding a set of empty objects.
    pub fn with_objects<I, S>(bucket: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut buckets = store.buckets.lock().unwrap();
            buckets.insert(bucket.to_string());
            let mut objects = store.objects.lock().unwrap();
            for key in keys {
                objects.insert((bucket.to_string(), key.into()), Vec::new());
            }
        }
        store
    }

    /// Inserts an object directly, creating the bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
    }

    /// Removes an object.
    pub fn remove(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        Ok(self.buckets.lock().unwrap().contains(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.insert(bucket, key, data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter(|(b, k)| b == bucket && prefix.map_or(true, |p| k.starts_with(p)))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> Result<String, StoreError> {
        Ok(format!(
            "http://minio:9000/{bucket}/{key}?X-Amz-Expires={}&X-Amz-Signature=test",
            expiry.as_secs()
        ))
    }
}
