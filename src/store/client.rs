//! MinIO/S3 object store client.
//!
//! A thin reqwest-backed client speaking the S3 REST API with SigV4 request
//! signing. Requests go path-style to the internal endpoint; presigned URLs
//! are optionally host-rewritten to the external reverse-proxy address so
//! callers outside the container network can fetch previews.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::{Method, StatusCode};

use crate::config::PipelineConfig;
use crate::error::StoreError;
use crate::store::sign::{
    presign_get, sha256_hex, sign_request, uri_encode_path, SigningContext,
};
use crate::store::ArtifactStore;

/// Object store client for a single MinIO endpoint.
pub struct MinioClient {
    http: reqwest::Client,
    endpoint: String,
    access_key: String,
    secret_key: String,
    region: String,
    external_url: String,
}

impl MinioClient {
    /// Creates a client from the pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::from_parts(
            &config.store_endpoint,
            &config.store_access_key,
            &config.store_secret_key,
            &config.store_region,
            &config.external_store_url,
        )
    }

    /// Creates a client from explicit connection parts.
    ///
    /// `endpoint` is `host:port` without a scheme; the client always speaks
    /// plain HTTP on the internal network, matching the store deployment.
    pub fn from_parts(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
        external_url: &str,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: region.to_string(),
            external_url: external_url.trim_end_matches('/').to_string(),
        }
    }

    fn signing_context(&self) -> SigningContext<'_> {
        SigningContext {
            access_key: &self.access_key,
            secret_key: &self.secret_key,
            region: &self.region,
        }
    }

    /// Rewrites a presigned URL from the internal endpoint to the external
    /// reverse-proxy base, leaving path and signature untouched.
    pub fn rewrite_external(&self, url: &str) -> String {
        url.replacen(
            &format!("http://{}", self.endpoint),
            &self.external_url,
            1,
        )
    }

    /// Presigns a GET URL and rewrites it for external consumption.
    pub async fn presigned_external_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> Result<String, StoreError> {
        let url = self.presigned_get_url(bucket, key, expiry).await?;
        Ok(self.rewrite_external(&url))
    }

    /// Issues a signed request and returns the response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StoreError> {
        let encoded_path = uri_encode_path(path);
        let payload_hash = if body.is_empty() {
            sha256_hex(b"")
        } else {
            sha256_hex(&body)
        };

        let headers = sign_request(
            &self.signing_context(),
            method.as_str(),
            &self.endpoint,
            &encoded_path,
            query,
            &payload_hash,
            Utc::now(),
        )?;

        let mut url = format!("http://{}{encoded_path}", self.endpoint);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        let response = self
            .http
            .request(method, &url)
            .header("x-amz-date", &headers.amz_date)
            .header("x-amz-content-sha256", &headers.content_sha256)
            .header("authorization", &headers.authorization)
            .body(body)
            .send()
            .await?;

        Ok(response)
    }

    async fn unexpected(path: &str, response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::UnexpectedStatus {
            status,
            path: path.to_string(),
            body,
        }
    }
}

#[async_trait]
impl ArtifactStore for MinioClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        let path = format!("/{bucket}");
        let response = self.send(Method::HEAD, &path, "", Vec::new()).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::unexpected(&path, response).await),
        }
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let path = format!("/{bucket}");
        let response = self.send(Method::PUT, &path, "", Vec::new()).await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            // Bucket already owned by us: creation is idempotent.
            StatusCode::CONFLICT => Ok(()),
            _ => Err(Self::unexpected(&path, response).await),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let path = format!("/{bucket}/{key}");
        let response = self.send(Method::HEAD, &path, "", Vec::new()).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::unexpected(&path, response).await),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let path = format!("/{bucket}/{key}");
        let response = self.send(Method::PUT, &path, "", data).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::unexpected(&path, response).await)
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = format!("/{bucket}/{key}");
        let response = self.send(Method::GET, &path, "", Vec::new()).await?;
        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(Self::unexpected(&path, response).await),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let path = format!("/{bucket}");
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            // Canonical query parameters in sorted order.
            let mut query = String::new();
            if let Some(token) = &continuation {
                query.push_str(&format!(
                    "continuation-token={}&",
                    urlencoding::encode(token)
                ));
            }
            query.push_str("list-type=2");
            if let Some(prefix) = prefix {
                query.push_str(&format!("&prefix={}", urlencoding::encode(prefix)));
            }

            let response = self.send(Method::GET, &path, &query, Vec::new()).await?;
            if response.status() != StatusCode::OK {
                return Err(Self::unexpected(&path, response).await);
            }

            let xml = response.text().await?;
            keys.extend(tag_values(&xml, "Key"));

            if xml.contains("<IsTruncated>true</IsTruncated>") {
                continuation = tag_values(&xml, "NextContinuationToken").into_iter().next();
                if continuation.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(keys)
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> Result<String, StoreError> {
        let encoded_path = uri_encode_path(&format!("/{bucket}/{key}"));
        let query = presign_get(
            &self.signing_context(),
            &self.endpoint,
            &encoded_path,
            expiry.as_secs(),
            Utc::now(),
        )?;
        Ok(format!("http://{}{encoded_path}?{query}", self.endpoint))
    }
}

/// Extracts the text content of every `<tag>` element in an S3 XML response.
fn tag_values(xml: &str, tag: &str) -> Vec<String> {
    let Ok(re) = Regex::new(&format!("<{tag}>([^<]*)</{tag}>")) else {
        return Vec::new();
    };
    re.captures_iter(xml).map(|c| xml_unescape(&c[1])).collect()
}

/// Undoes the XML entity escaping S3 applies to key names.
fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
