//! Garment catalog queries over the clothes bucket.
//!
//! The catalog bucket holds garment blend files laid out as
//! `{clothing}/{gender}/{size}_{Name}.blend` plus rendered previews under
//! `previews/`. These queries back request validation (available garments
//! and sizes) and preview generation (which garments still need a render).

use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::store::keys::Gender;
use crate::store::ArtifactStore;

/// Read-only view of the garment catalog.
pub struct GarmentCatalog<'a> {
    store: &'a dyn ArtifactStore,
    bucket: &'a str,
}

impl<'a> GarmentCatalog<'a> {
    /// Creates a catalog view over the given bucket.
    pub fn new(store: &'a dyn ArtifactStore, bucket: &'a str) -> Self {
        Self { store, bucket }
    }

    /// Lists blend files for a gender in one size.
    ///
    /// Previews are only rendered for one reference size, so callers pass
    /// that size here when computing missing previews.
    pub async fn blend_files(&self, gender: Gender, size: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.store.list_objects(self.bucket, None).await?;
        let size_prefix = format!("{size}_");

        Ok(objects
            .into_iter()
            .filter(|key| {
                key.ends_with(".blend")
                    && basename(key).starts_with(&size_prefix)
                    && key.split('/').nth(1) == Some(gender.as_str())
            })
            .collect())
    }

    /// Lists preview renders for a gender.
    pub async fn preview_files(&self, gender: Gender) -> Result<Vec<String>, StoreError> {
        let objects = self.store.list_objects(self.bucket, Some("previews")).await?;
        let wanted = format!("{gender}.png");

        Ok(objects
            .into_iter()
            .filter(|key| key.ends_with(".png") && basename(key) == wanted)
            .collect())
    }

    /// Returns the blend files that have no corresponding preview render.
    pub fn missing_previews(blend_files: &[String], preview_files: &[String]) -> Vec<String> {
        blend_files
            .iter()
            .filter(|blend| {
                let mut parts = blend.split('/');
                match (parts.next(), parts.next()) {
                    (Some(clothing), Some(gender)) => {
                        let preview = format!("previews/{clothing}/{gender}.png");
                        !preview_files.contains(&preview)
                    }
                    _ => false,
                }
            })
            .cloned()
            .collect()
    }

    /// Enumerates garment slugs available in the catalog.
    pub async fn available_garments(&self) -> Result<Vec<String>, StoreError> {
        let objects = self.store.list_objects(self.bucket, None).await?;

        let garments: BTreeSet<String> = objects
            .iter()
            .filter(|key| key.ends_with(".blend") && !key.starts_with("previews/"))
            .filter_map(|key| key.split('/').next())
            .map(str::to_string)
            .collect();

        Ok(garments.into_iter().collect())
    }

    /// Enumerates the sizes stocked for one garment and gender.
    pub async fn available_sizes(
        &self,
        clothing: &str,
        gender: Gender,
    ) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{clothing}/{gender}/");
        let objects = self.store.list_objects(self.bucket, Some(&prefix)).await?;

        let sizes: BTreeSet<String> = objects
            .iter()
            .filter(|key| key.ends_with(".blend"))
            .filter_map(|key| basename(key).split('_').next())
            .map(str::to_string)
            .collect();

        Ok(sizes.into_iter().collect())
    }

}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
