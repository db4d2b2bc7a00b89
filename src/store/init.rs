//! Bucket provisioning and garment catalog seeding.
//!
//! Run once at deployment time: creates the artifact and catalog buckets if
//! absent and uploads the local garment catalog, skipping keys that already
//! exist in the store.

use std::path::Path;

use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::store::ArtifactStore;

/// Creates each bucket that does not exist yet.
pub async fn create_buckets(
    store: &dyn ArtifactStore,
    buckets: &[&str],
) -> Result<(), StoreError> {
    for bucket in buckets {
        if store.bucket_exists(bucket).await? {
            info!(bucket, "bucket already exists");
        } else {
            store.make_bucket(bucket).await?;
            info!(bucket, "created bucket");
        }
    }
    Ok(())
}

/// Uploads every file under `dir` into `bucket`, keyed by its path relative
/// to `dir`. Existing keys are left untouched.
///
/// # Returns
///
/// The number of files uploaded.
pub async fn seed_catalog(
    store: &dyn ArtifactStore,
    bucket: &str,
    dir: &Path,
) -> Result<usize, StoreError> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "catalog directory does not exist; nothing to seed");
        return Ok(0);
    }

    let mut uploaded = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let key = relative.to_string_lossy().replace('\\', "/");

        if store.exists(bucket, &key).await? {
            info!(bucket, key = %key, "catalog file already exists");
            continue;
        }

        let data = fs::read(entry.path()).await?;
        store.put_object(bucket, &key, data).await?;
        info!(bucket, key = %key, "uploaded catalog file");
        uploaded += 1;
    }

    info!(bucket, uploaded, dir = %dir.display(), "catalog seeding complete");
    Ok(uploaded)
}
