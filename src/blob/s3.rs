//! S3-compatible [`BlobStore`] adapter.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication,
//! using pure-Rust signing (`hmac` + `sha2`). Custom endpoints (MinIO,
//! LocalStack) are supported through path-style addressing; plain AWS uses
//! virtual-hosted addressing.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use super::{BlobError, BlobStore};

type HmacSha256 = Hmac<Sha256>;

/// Connection and signing settings for an S3-compatible backend.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Optional endpoint override (e.g. `http://localhost:9000` for MinIO).
    /// When unset, the standard AWS hostname for the bucket/region is used.
    pub endpoint: Option<String>,
    /// Bucket receiving document blobs.
    pub bucket: String,
    /// Region used in the credential scope.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Key prefix prepended to every object (defaults to `documents`).
    pub prefix: String,
}

/// Blob store speaking the S3 REST API with SigV4-signed requests.
pub struct S3BlobStore {
    client: Client,
    settings: S3Settings,
}

impl S3BlobStore {
    /// Construct a store from connection settings.
    pub fn new(settings: S3Settings) -> Result<Self, BlobError> {
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        Ok(Self { client, settings })
    }

    fn object_url(&self, key: &str) -> (String, String, String) {
        let object_key = if self.settings.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.settings.prefix.trim_end_matches('/'), key)
        };
        let encoded_key: String = object_key
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");

        match &self.settings.endpoint {
            Some(endpoint) => {
                let trimmed = endpoint.trim_end_matches('/');
                let scheme = if trimmed.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = trimmed
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .to_string();
                // Path-style addressing for S3-compatible services.
                let path = format!("/{}/{}", uri_encode(&self.settings.bucket), encoded_key);
                (format!("{scheme}://{host}{path}"), host, path)
            }
            None => {
                let host = format!(
                    "{}.s3.{}.amazonaws.com",
                    self.settings.bucket, self.settings.region
                );
                let path = format!("/{encoded_key}");
                (format!("https://{host}{path}"), host, path)
            }
        }
    }

    async fn signed_request(
        &self,
        method: Method,
        key: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, BlobError> {
        let (url, host, canonical_uri) = self.object_url(key);

        let now = OffsetDateTime::now_utc();
        let date_stamp = format_date_stamp(now);
        let amz_date = format_amz_date(now);
        let payload_hash = hex_sha256(&body);

        let mut headers = vec![
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.settings.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.settings.secret_access_key,
            &date_stamp,
            &self.settings.region,
            "s3",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.settings.access_key_id, credential_scope, signed_headers, signature
        );

        let response = self
            .client
            .request(method, url)
            .header("Authorization", authorization)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let response = self
            .signed_request(Method::PUT, key, bytes.to_vec())
            .await?;

        if response.status().is_success() {
            tracing::debug!(key, bytes = bytes.len(), "Blob stored");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(BlobError::UnexpectedStatus { status, body })
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let response = self.signed_request(Method::GET, key, Vec::new()).await?;

        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(BlobError::NotFound(key.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(BlobError::UnexpectedStatus { status, body })
            }
        }
    }
}

fn format_date_stamp(now: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day()
    )
}

fn format_amz_date(now: OffsetDateTime) -> String {
    format!(
        "{}T{:02}{:02}{:02}Z",
        format_date_stamp(now),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{secret_key}").as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986, leaving only unreserved characters.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::PUT, MockServer};

    fn settings(server: &MockServer) -> S3Settings {
        S3Settings {
            endpoint: Some(server.base_url()),
            bucket: "uploads".into(),
            region: "us-east-1".into(),
            access_key_id: "test-key".into(),
            secret_access_key: "test-secret".into(),
            prefix: "documents".into(),
        }
    }

    #[tokio::test]
    async fn put_signs_and_targets_path_style_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/uploads/documents/doc-1")
                    .header_exists("authorization")
                    .header_exists("x-amz-date");
                then.status(200);
            })
            .await;

        let store = S3BlobStore::new(settings(&server)).expect("client");
        store.put("doc-1", b"raw bytes").await.expect("put");
        mock.assert();
    }

    #[tokio::test]
    async fn get_returns_body_and_maps_missing_keys() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/uploads/documents/doc-1");
                then.status(200).body("stored bytes");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/uploads/documents/absent");
                then.status(404);
            })
            .await;

        let store = S3BlobStore::new(settings(&server)).expect("client");
        assert_eq!(store.get("doc-1").await.unwrap(), b"stored bytes");
        assert!(store.get("absent").await.unwrap_err().is_not_found());
    }

    #[test]
    fn uri_encode_escapes_reserved_characters() {
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(uri_encode("safe-key_1.txt~"), "safe-key_1.txt~");
    }

    #[test]
    fn signing_key_is_deterministic() {
        let first = derive_signing_key("secret", "20260101", "us-east-1", "s3");
        let second = derive_signing_key("secret", "20260101", "us-east-1", "s3");
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }
}
