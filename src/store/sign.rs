//! AWS Signature Version 4 signing for object store requests.
//!
//! MinIO speaks the S3 API, which authenticates every request with a SigV4
//! signature derived from the canonical request. Header signing covers the
//! normal client calls; query signing produces presigned GET URLs.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash marker for presigned requests.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Credential material and scope for signing.
pub struct SigningContext<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
}

/// Headers to attach to a header-signed request.
pub struct SignedHeaders {
    pub amz_date: String,
    pub content_sha256: String,
    pub authorization: String,
}

/// Hex-encoded SHA-256 of a payload.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encodes one path, keeping `/` separators intact.
///
/// Each segment is encoded with the S3 rules (unreserved characters pass
/// through, everything else is percent-encoded).
pub fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| StoreError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derives the per-day signing key: HMAC chain over date, region, service.
fn signing_key(secret_key: &str, date: &str, region: &str) -> Result<Vec<u8>, StoreError> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, b"s3")?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn credential_scope(date: &str, region: &str) -> String {
    format!("{date}/{region}/s3/aws4_request")
}

fn sign(
    ctx: &SigningContext<'_>,
    date: &str,
    amz_date: &str,
    canonical_request: &str,
) -> Result<String, StoreError> {
    let scope = credential_scope(date, ctx.region);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );
    let key = signing_key(ctx.secret_key, date, ctx.region)?;
    Ok(hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?))
}

/// Signs a request via headers.
///
/// `encoded_path` must already be URI-encoded (see [`uri_encode_path`]) and
/// `canonical_query` must list parameters in sorted, encoded form.
pub fn sign_request(
    ctx: &SigningContext<'_>,
    method: &str,
    host: &str,
    encoded_path: &str,
    canonical_query: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> Result<SignedHeaders, StoreError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let canonical_headers =
        format!("host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n");
    let signed_headers = "host;x-amz-content-sha256;x-amz-date";
    let canonical_request = format!(
        "{method}\n{encoded_path}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );

    let signature = sign(ctx, &date, &amz_date, &canonical_request)?;
    let scope = credential_scope(&date, ctx.region);
    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        ctx.access_key
    );

    Ok(SignedHeaders {
        amz_date,
        content_sha256: payload_hash.to_string(),
        authorization,
    })
}

/// Builds the query string of a presigned GET URL.
///
/// The returned string contains the five `X-Amz-*` parameters plus the
/// signature, ready to append to `http://{host}/{encoded_path}?`.
pub fn presign_get(
    ctx: &SigningContext<'_>,
    host: &str,
    encoded_path: &str,
    expires_secs: u64,
    now: DateTime<Utc>,
) -> Result<String, StoreError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let credential = format!("{}/{}", ctx.access_key, credential_scope(&date, ctx.region));

    // Parameters must appear in sorted order in the canonical query.
    let query = format!(
        "X-Amz-Algorithm={ALGORITHM}\
         &X-Amz-Credential={}\
         &X-Amz-Date={amz_date}\
         &X-Amz-Expires={expires_secs}\
         &X-Amz-SignedHeaders=host",
        urlencoding::encode(&credential)
    );

    let canonical_request =
        format!("GET\n{encoded_path}\n{query}\nhost:{host}\n\nhost\n{UNSIGNED_PAYLOAD}");
    let signature = sign(ctx, &date, &amz_date, &canonical_request)?;

    Ok(format!("{query}&X-Amz-Signature={signature}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_ctx() -> SigningContext<'static> {
        SigningContext {
            access_key: "minioadmin",
            secret_key: "minioadmin",
            region: "us-east-1",
        }
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_sha256_hex_empty_payload() {
        // Well-known SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_uri_encode_path_keeps_separators() {
        assert_eq!(uri_encode_path("/data/images/a.jpg"), "/data/images/a.jpg");
        assert_eq!(
            uri_encode_path("/clothes/summer dress/f.blend"),
            "/clothes/summer%20dress/f.blend"
        );
    }

    #[test]
    fn test_sign_request_headers() {
        let headers = sign_request(
            &test_ctx(),
            "GET",
            "minio:9000",
            "/data/images/a.jpg",
            "",
            UNSIGNED_PAYLOAD,
            test_time(),
        )
        .unwrap();

        assert_eq!(headers.amz_date, "20240517T123000Z");
        assert!(headers.authorization.starts_with("AWS4-HMAC-SHA256 Credential=minioadmin/20240517/us-east-1/s3/aws4_request"));
        assert!(headers
            .authorization
            .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert!(headers.authorization.contains("Signature="));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let run = || {
            sign_request(
                &test_ctx(),
                "PUT",
                "minio:9000",
                "/data/output/a.obj",
                "",
                &sha256_hex(b"obj-bytes"),
                test_time(),
            )
            .unwrap()
            .authorization
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_signature_varies_with_payload() {
        let sign_with = |payload: &[u8]| {
            sign_request(
                &test_ctx(),
                "PUT",
                "minio:9000",
                "/data/output/a.obj",
                "",
                &sha256_hex(payload),
                test_time(),
            )
            .unwrap()
            .authorization
        };
        assert_ne!(sign_with(b"a"), sign_with(b"b"));
    }

    #[test]
    fn test_presign_get_query_shape() {
        let query = presign_get(
            &test_ctx(),
            "minio:9000",
            "/clothes/previews/summer-dress/female.png",
            600,
            test_time(),
        )
        .unwrap();

        assert!(query.starts_with("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(query.contains("X-Amz-Expires=600"));
        assert!(query.contains("X-Amz-SignedHeaders=host"));
        assert!(query.contains("X-Amz-Date=20240517T123000Z"));
        // The credential scope slashes must be percent-encoded.
        assert!(query.contains("X-Amz-Credential=minioadmin%2F20240517%2Fus-east-1%2Fs3%2Faws4_request"));
        assert!(query.contains("&X-Amz-Signature="));
    }
}
