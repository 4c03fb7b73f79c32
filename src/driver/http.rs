//! Remote HTTP storage driver.
//!
//! Implements a wire table directly: `HEAD` for `exists`, `GET`
//! for `read`, `PUT` for `write` (carrying `If-None-Match: *` when
//! `allow_overwrite` is false), `DELETE` for `delete`. `list` has no entry
//! in the wire table; this driver extends `GET` with `?list=true` query
//! parameters, documented in DESIGN.md as an addition necessary to satisfy
//! the capability set, not a spec-mandated endpoint.

use super::{DriverError, Namespace, StorageDriver};
use crate::notary::Credentials;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Supplies fresh credentials for each outbound request. Implemented by
/// [`crate::notary::Notary`] in the common case, but kept separate so the
/// driver does not need the full notary surface.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, String>;
}

#[async_trait]
impl<T: crate::notary::Notary> CredentialProvider for T {
    async fn credentials(&self) -> Result<Credentials, String> {
        crate::notary::Notary::credentials(self).await.map_err(|e| e.to_string())
    }
}

const USER_AGENT: &str = concat!("nebula-repository/", env!("CARGO_PKG_VERSION"));
const CONTENT_TYPE: &str = "application/bali";

pub struct HttpDriver {
    client: Client,
    base_url: String,
    credentials: Box<dyn CredentialProvider>,
}

impl HttpDriver {
    pub fn new(base_url: impl Into<String>, credentials: Box<dyn CredentialProvider>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            client,
            base_url: base_url.into(),
            credentials,
        }
    }

    fn url_for(&self, namespace: Namespace, key: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), namespace.as_str(), key)
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
impl StorageDriver for HttpDriver {
    async fn exists(&self, namespace: Namespace, key: &str) -> Result<bool, DriverError> {
        let credentials = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "HEAD",
            cause,
        })?;
        let response = self
            .client
            .head(self.url_for(namespace, key))
            .header("user-agent", USER_AGENT)
            .header("nebula-credentials", credentials)
            .send()
            .await
            .map_err(|e| Self::server_down(namespace, key, "HEAD", e))?;
        Ok(response.status() == StatusCode::OK)
    }

    async fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, DriverError> {
        let credentials = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "GET",
            cause,
        })?;
        let response = self
            .client
            .get(self.url_for(namespace, key))
            .header("user-agent", USER_AGENT)
            .header("nebula-credentials", credentials)
            .header("accept", CONTENT_TYPE)
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
        let credentials = self.auth_header().await.map_err(|cause| DriverError::Io {
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
            .put(self.url_for(namespace, key))
            .header("user-agent", USER_AGENT)
            .header("nebula-credentials", credentials)
            .header("accept", CONTENT_TYPE)
            .header("content-type", CONTENT_TYPE)
            .header("content-length", envelope.len().to_string());

        // The citation's own digest, not a hash of the wire envelope — the
        // header is meant to let a server verify content against the
        // citation it names, which only the caller-supplied digest can do.
        if let Some(digest) = digest {
            request = request.header("nebula-digest", digest.to_hex());
        }

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
        let credentials = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "DELETE",
            cause,
        })?;
        let response = self
            .client
            .delete(self.url_for(namespace, key))
            .header("user-agent", USER_AGENT)
            .header("nebula-credentials", credentials)
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
        let credentials = self.auth_header().await.map_err(|cause| DriverError::Io {
            namespace,
            key: prefix.to_string(),
            method: "GET",
            cause,
        })?;
        let url = format!(
            "{}/{}?list=true&prefix={}&max_keys={}",
            self.base_url.trim_end_matches('/'),
            namespace.as_str(),
            prefix,
            max_keys
        );
        let response = self
            .client
            .get(url)
            .header("user-agent", USER_AGENT)
            .header("nebula-credentials", credentials)
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
