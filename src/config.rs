//! Pipeline configuration.
//!
//! This module provides configuration for the stage orchestrator: object
//! store credentials, bucket names, the shared container network, the
//! persistent volume excluded from reclamation, and per-stage timeouts.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Object store settings
    /// Store endpoint as `host:port` (plain HTTP, internal network address).
    pub store_endpoint: String,
    /// Store access key.
    pub store_access_key: String,
    /// Store secret key.
    pub store_secret_key: String,
    /// Signing region for the store (MinIO default).
    pub store_region: String,
    /// Bucket holding per-request artifacts (photos, meshes, fits).
    pub data_bucket: String,
    /// Bucket holding the garment catalog and previews.
    pub clothes_bucket: String,
    /// Externally reachable base URL presigned links are rewritten to.
    pub external_store_url: String,
    /// Lifetime of presigned GET URLs.
    pub presign_expiry: Duration,

    // Container settings
    /// Named bridge network shared by stage containers and the store.
    pub network: String,
    /// The one long-lived volume excluded from reclamation.
    pub persistent_volume: String,
    /// Wall-clock budget for a single stage run.
    pub stage_timeout: Duration,

    // Catalog seeding
    /// Local directory with garment blend files uploaded by `init`.
    pub catalog_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_endpoint: "minio:9000".to_string(),
            store_access_key: "minioadmin".to_string(),
            store_secret_key: "minioadmin".to_string(),
            store_region: "us-east-1".to_string(),
            data_bucket: "data".to_string(),
            clothes_bucket: "clothes".to_string(),
            external_store_url: "http://minio.localhost".to_string(),
            presign_expiry: Duration::from_secs(600), // 10 minutes
            network: "virtufit_app-network".to_string(),
            persistent_volume: "virtufit_minio-data".to_string(),
            stage_timeout: Duration::from_secs(1800), // 30 minutes
            catalog_path: PathBuf::from("./init_data/models"),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MINIO_ENDPOINT`: Store endpoint as host:port (required)
    /// - `MINIO_ACCESS_KEY`: Store access key (required)
    /// - `MINIO_SECRET_KEY`: Store secret key (required)
    /// - `VIRTUFIT_STORE_REGION`: Signing region (default: us-east-1)
    /// - `VIRTUFIT_DATA_BUCKET`: Artifact bucket (default: data)
    /// - `VIRTUFIT_CLOTHES_BUCKET`: Garment catalog bucket (default: clothes)
    /// - `VIRTUFIT_EXTERNAL_STORE_URL`: External presign base (default: http://minio.localhost)
    /// - `VIRTUFIT_PRESIGN_EXPIRY_SECS`: Presign lifetime (default: 600)
    /// - `VIRTUFIT_NETWORK`: Shared container network (default: virtufit_app-network)
    /// - `VIRTUFIT_PERSISTENT_VOLUME`: Volume excluded from reclamation (default: virtufit_minio-data)
    /// - `VIRTUFIT_STAGE_TIMEOUT_SECS`: Per-stage timeout (default: 1800)
    /// - `VIRTUFIT_CATALOG_PATH`: Local garment catalog directory (default: ./init_data/models)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Store credentials are required: every stage container receives them.
        config.store_endpoint = require_env("MINIO_ENDPOINT")?;
        config.store_access_key = require_env("MINIO_ACCESS_KEY")?;
        config.store_secret_key = require_env("MINIO_SECRET_KEY")?;

        if let Ok(val) = std::env::var("VIRTUFIT_STORE_REGION") {
            config.store_region = val;
        }

        if let Ok(val) = std::env::var("VIRTUFIT_DATA_BUCKET") {
            config.data_bucket = val;
        }

        if let Ok(val) = std::env::var("VIRTUFIT_CLOTHES_BUCKET") {
            config.clothes_bucket = val;
        }

        if let Ok(val) = std::env::var("VIRTUFIT_EXTERNAL_STORE_URL") {
            config.external_store_url = val;
        }

        if let Ok(val) = std::env::var("VIRTUFIT_PRESIGN_EXPIRY_SECS") {
            let secs: u64 = parse_env_value(&val, "VIRTUFIT_PRESIGN_EXPIRY_SECS")?;
            config.presign_expiry = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("VIRTUFIT_NETWORK") {
            config.network = val;
        }

        if let Ok(val) = std::env::var("VIRTUFIT_PERSISTENT_VOLUME") {
            config.persistent_volume = val;
        }

        if let Ok(val) = std::env::var("VIRTUFIT_STAGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "VIRTUFIT_STAGE_TIMEOUT_SECS")?;
            config.stage_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("VIRTUFIT_CATALOG_PATH") {
            config.catalog_path = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_endpoint.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "store_endpoint cannot be empty".to_string(),
            ));
        }

        if self.store_endpoint.contains("://") {
            return Err(ConfigError::ValidationFailed(
                "store_endpoint must be host:port without a scheme".to_string(),
            ));
        }

        if self.store_access_key.is_empty() || self.store_secret_key.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "store credentials cannot be empty".to_string(),
            ));
        }

        if self.data_bucket.is_empty() || self.clothes_bucket.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "bucket names cannot be empty".to_string(),
            ));
        }

        if self.data_bucket == self.clothes_bucket {
            return Err(ConfigError::ValidationFailed(
                "data_bucket and clothes_bucket must differ".to_string(),
            ));
        }

        if self.network.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "network cannot be empty".to_string(),
            ));
        }

        if self.persistent_volume.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "persistent_volume cannot be empty".to_string(),
            ));
        }

        if self.stage_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "stage_timeout must be greater than 0".to_string(),
            ));
        }

        if self.presign_expiry.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "presign_expiry must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the store endpoint.
    pub fn with_store_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.store_endpoint = endpoint.into();
        self
    }

    /// Builder method to set the store credentials.
    pub fn with_store_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.store_access_key = access_key.into();
        self.store_secret_key = secret_key.into();
        self
    }

    /// Builder method to set the shared container network.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Builder method to set the persistent volume name.
    pub fn with_persistent_volume(mut self, volume: impl Into<String>) -> Self {
        self.persistent_volume = volume.into();
        self
    }

    /// Builder method to set the per-stage timeout.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Builder method to set the bucket names.
    pub fn with_buckets(
        mut self,
        data_bucket: impl Into<String>,
        clothes_bucket: impl Into<String>,
    ) -> Self {
        self.data_bucket = data_bucket.into();
        self.clothes_bucket = clothes_bucket.into();
        self
    }

    /// The three environment variables passed to every stage container.
    pub fn container_store_env(&self) -> Vec<String> {
        vec![
            format!("MINIO_ENDPOINT={}", self.store_endpoint),
            format!("MINIO_ACCESS_KEY={}", self.store_access_key),
            format!("MINIO_SECRET_KEY={}", self.store_secret_key),
        ]
    }
}

/// Requires an environment variable to be present.
fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.data_bucket, "data");
        assert_eq!(config.clothes_bucket, "clothes");
        assert_eq!(config.stage_timeout, Duration::from_secs(1800));
        assert_eq!(config.presign_expiry, Duration::from_secs(600));
    }

    #[test]
    fn test_builder_methods() {
        let config = PipelineConfig::new()
            .with_store_endpoint("store:9000")
            .with_store_credentials("ak", "sk")
            .with_network("test-net")
            .with_persistent_volume("store-data")
            .with_stage_timeout(Duration::from_secs(60))
            .with_buckets("artifacts", "garments");

        assert_eq!(config.store_endpoint, "store:9000");
        assert_eq!(config.store_access_key, "ak");
        assert_eq!(config.store_secret_key, "sk");
        assert_eq!(config.network, "test-net");
        assert_eq!(config.persistent_volume, "store-data");
        assert_eq!(config.stage_timeout, Duration::from_secs(60));
        assert_eq!(config.data_bucket, "artifacts");
        assert_eq!(config.clothes_bucket, "garments");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_scheme_in_endpoint() {
        let config = PipelineConfig::new().with_store_endpoint("http://minio:9000");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_identical_buckets() {
        let config = PipelineConfig::new().with_buckets("data", "data");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = PipelineConfig::new().with_stage_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_credentials() {
        let config = PipelineConfig::new().with_store_credentials("", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_container_store_env() {
        let config = PipelineConfig::new()
            .with_store_endpoint("minio:9000")
            .with_store_credentials("ak", "sk");
        let env = config.container_store_env();

        assert_eq!(env.len(), 3);
        assert!(env.contains(&"MINIO_ENDPOINT=minio:9000".to_string()));
        assert!(env.contains(&"MINIO_ACCESS_KEY=ak".to_string()));
        assert!(env.contains(&"MINIO_SECRET_KEY=sk".to_string()));
    }
}
