//! Object-store storage driver, modeled after an S3-compatible REST
//! surface.
//!
//! A bucket-scoped client issuing plain REST calls with a computed
//! signature header. Full AWS SigV4 signing is out of scope here — signing
//! is delegated to an injected [`super::http::CredentialProvider`] so a
//! real deployment can plug in proper request signing without changing
//! this driver.

use super::http::CredentialProvider;
use super::{DriverError, Namespace, StorageDriver};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub struct ObjectStoreDriver {
    client: Client,
    base_url: String,
    bucket: String,
    credentials: Box<dyn CredentialProvider>,
}

impl ObjectStoreDriver {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        credentials: Box<dyn CredentialProvider>,
        request_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            client,
            base_url: base_url.into(),
            bucket: bucket.into(),
            credentials,
        }
    }

    fn object_url(&self, namespace: Namespace, key: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            namespace.as_str(),
            key
        )
    }

    async fn auth_header(&self) -> Result<String, String> {
        Ok(self.credentials.credentials().await?.0)
    }

    fn server_down(namespace: Namespace, key: &str, method: &'static str, err: reqwest::Error) -> DriverError {
        if err.is_timeout() || err.is_connect() {
            DriverError::ServerDown {
                namespace,
                key: key.to_string(),
                method,
                cause: err.to_string(),
            }
        } else {
            DriverError::Io {
                namespace,
                key: key.to_string(),
                method,
                cause: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl StorageDriver for ObjectStoreDriver {
    async fn exists(&self, namespace: Namespace, key: &str) -> Result<bool, DriverError> {
        let signature = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "HEAD",
            cause,
        })?;
        let response = self
            .client
            .head(self.object_url(namespace, key))
            .header("authorization", signature)
            .send()
            .await
            .map_err(|e| Self::server_down(namespace, key, "HEAD", e))?;
        Ok(response.status() == StatusCode::OK)
    }

    async fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, DriverError> {
        let signature = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "GET",
            cause,
        })?;
        let response = self
            .client
            .get(self.object_url(namespace, key))
            .header("authorization", signature)
            .send()
            .await
            .map_err(|e| Self::server_down(namespace, key, "GET", e))?;
        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(|e| Self::server_down(namespace, key, "GET", e))?;
                let trimmed = bytes.strip_suffix(b"\n").map(|b| b.to_vec()).unwrap_or_else(|| bytes.to_vec());
                Ok(Some(trimmed))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "GET",
                cause: format!("unexpected status {status}"),
            }),
        }
    }

    async fn write(
        &self,
        namespace: Namespace,
        key: &str,
        bytes: Vec<u8>,
        allow_overwrite: bool,
        digest: Option<&crate::model::Digest>,
    ) -> Result<(), DriverError> {
        let signature = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "PUT",
            cause,
        })?;

        let mut envelope = bytes;
        if !envelope.ends_with(b"\n") {
            envelope.push(b'\n');
        }

        let mut request = self
            .client
            .put(self.object_url(namespace, key))
            .header("authorization", signature)
            .header("content-type", "application/bali");

        // Mirrors `HttpDriver`'s `nebula-digest`: the citation's own digest,
        // carried as object metadata for stores that support it.
        if let Some(digest) = digest {
            request = request.header("x-amz-meta-nebula-digest", digest.to_hex());
        }

        // Conditional write delegated to the object store itself rather than
        // a client-side exists-then-put: the latter is a TOCTOU race between
        // concurrent callers. Modern S3-compatible stores honor `If-None-Match:
        // *` on PutObject the same way `HttpDriver` relies on it.
        if !allow_overwrite {
            request = request.header("if-none-match", "*");
        }

        let response = request
            .body(envelope)
            .send()
            .await
            .map_err(|e| Self::server_down(namespace, key, "PUT", e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Err(DriverError::Conflict {
                namespace,
                key: key.to_string(),
            }),
            status => Err(DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "PUT",
                cause: format!("unexpected status {status}"),
            }),
        }
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, DriverError> {
        let signature = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "DELETE",
            cause,
        })?;
        let response = self
            .client
            .delete(self.object_url(namespace, key))
            .header("authorization", signature)
            .send()
            .await
            .map_err(|e| Self::server_down(namespace, key, "DELETE", e))?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "DELETE",
                cause: format!("unexpected status {status}"),
            }),
        }
    }

    async fn list(&self, namespace: Namespace, prefix: &str, max_keys: usize) -> Result<Vec<String>, DriverError> {
        let signature = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: prefix.to_string(),
            method: "GET",
            cause,
        })?;
        let url = format!(
            "{}/{}?list-type=2&prefix={}/{}&max-keys={}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            namespace.as_str(),
            prefix,
            max_keys
        );
        let response = self
            .client
            .get(url)
            .header("authorization", signature)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| Self::server_down(namespace, prefix, "GET", e))?;

        if response.status() != StatusCode::OK {
            return Err(DriverError::Io {
                namespace,
                key: prefix.to_string(),
                method: "GET",
                cause: format!("unexpected status {}", response.status()),
            });
        }

        #[derive(serde::Deserialize)]
        struct ListResponse {
            keys: Vec<String>,
        }

        let parsed: ListResponse = response.json().await.map_err(|e| DriverError::Io {
            namespace,
            key: prefix.to_string(),
            method: "GET",
            cause: e.to_string(),
        })?;
        Ok(parsed.keys)
    }
}
