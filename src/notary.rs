//! The notary boundary: an injected, pure-compute dependency that
//! turns unsigned content into a citation and a signature, and supplies
//! fresh credentials for outbound requests.
//!
//! [`InMemoryNotary`] is a reference implementation suitable for tests and
//! single-process deployments. It is not a PKI: production deployments are
//! expected to inject their own `Notary` backed by a real signing service,
//! treating [`Signature`] as a pluggable algorithm rather than a fixed
//! implementation.

use crate::model::{Citation, Digest, Tag, Version};
use async_trait::async_trait;
use sha2::{Digest as _, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum NotaryError {
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("credential issuance failed: {0}")]
    Credentials(String),
}

/// A detached signature over a citation, produced by a [`Notary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Opaque bearer material carried in the `nebula-credentials` request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials(pub String);

/// Produces citations and signatures for content about to be notarized, and
/// supplies the credentials drivers attach to outbound requests.
#[async_trait]
pub trait Notary: Send + Sync {
    /// Notarizes `content` under `tag`/`version`, returning the citation
    /// that will address it plus a detached signature over that citation.
    async fn notarize(
        &self,
        tag: Tag,
        version: Version,
        content: &serde_json::Value,
    ) -> Result<(Citation, Signature), NotaryError>;

    /// Issues credentials for the current caller, to be attached to the next
    /// outbound request.
    async fn credentials(&self) -> Result<Credentials, NotaryError>;
}

/// A reference notary backed by a shared secret and SHA-256, for tests and
/// single-process deployments that have no external signing service.
pub struct InMemoryNotary {
    secret: Vec<u8>,
}

impl InMemoryNotary {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn sign(&self, citation: &Citation) -> Signature {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(citation.to_string().as_bytes());
        Signature(hasher.finalize().to_vec())
    }
}

#[async_trait]
impl Notary for InMemoryNotary {
    async fn notarize(
        &self,
        tag: Tag,
        version: Version,
        content: &serde_json::Value,
    ) -> Result<(Citation, Signature), NotaryError> {
        let bytes = serde_json::to_vec(content).map_err(|e| NotaryError::Signing(e.to_string()))?;
        let digest = Digest::of(&bytes);
        let citation = Citation::new(tag, version, digest);
        let signature = self.sign(&citation);
        Ok((citation, signature))
    }

    async fn credentials(&self) -> Result<Credentials, NotaryError> {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        let digest = hasher.finalize();
        Ok(Credentials(base32::encode(
            base32::Alphabet::RFC4648 { padding: false },
            digest.as_slice(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notarize_is_deterministic_for_same_content() {
        let notary = InMemoryNotary::new(b"test-secret".to_vec());
        let content = serde_json::json!({"a": 1});
        let (c1, s1) = notary
            .notarize(Tag::generate(), Version::initial(), &content)
            .await
            .unwrap();
        let (c2, s2) = notary
            .notarize(c1.tag.clone(), Version::initial(), &content)
            .await
            .unwrap();
        assert_eq!(c1.digest, c2.digest);
        assert_eq!(s1, s2);
    }

    #[tokio::test]
    async fn credentials_are_stable() {
        let notary = InMemoryNotary::new(b"test-secret".to_vec());
        let a = notary.credentials().await.unwrap();
        let b = notary.credentials().await.unwrap();
        assert_eq!(a, b);
    }
}
