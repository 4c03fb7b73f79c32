//! The storage driver abstraction: a single capability set —
//! `exists`/`read`/`write`/`delete`/`list` — implemented polymorphically
//! over local filesystem, remote HTTP and object-store backends.
//!
//! A small async_trait capability set that every backend implements
//! identically, so the facade never branches on backend kind.

pub mod http;
pub mod local;
pub mod object_store;

use crate::model::Digest;
use async_trait::async_trait;
use std::fmt;

/// Which logical namespace a key belongs to. Drivers may use this to choose
/// storage location, permission bits or wire headers, but the key space
/// within a namespace is otherwise opaque to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Names,
    Drafts,
    Documents,
    Contracts,
    Messages,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Names => "names",
            Namespace::Drafts => "drafts",
            Namespace::Documents => "documents",
            Namespace::Contracts => "contracts",
            Namespace::Messages => "messages",
        }
    }

    /// Names, documents and contracts are immutable once written; drafts
    /// and messages are not. Drivers use this to choose permission bits and
    /// cacheability.
    pub fn is_immutable(&self) -> bool {
        matches!(self, Namespace::Names | Namespace::Documents | Namespace::Contracts)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure at the storage driver boundary, independent of what the
/// facade was trying to accomplish.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("conflict writing {namespace}/{key}: object already exists")]
    Conflict { namespace: Namespace, key: String },
    #[error("{method} {namespace}/{key} failed: {cause}")]
    Io {
        namespace: Namespace,
        key: String,
        method: &'static str,
        cause: String,
    },
    #[error("{method} {namespace}/{key}: server unreachable: {cause}")]
    ServerDown {
        namespace: Namespace,
        key: String,
        method: &'static str,
        cause: String,
    },
}

/// The capability set every storage backend must provide.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Returns whether `key` is present in `namespace`.
    async fn exists(&self, namespace: Namespace, key: &str) -> Result<bool, DriverError>;

    /// Reads the bytes stored at `key`, or `None` if absent.
    async fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, DriverError>;

    /// Writes `bytes` to `key`. When `allow_overwrite` is false, an existing
    /// object at `key` causes [`DriverError::Conflict`] rather than being
    /// replaced — this is how the facade enforces append-only namespaces.
    ///
    /// `digest` is the content hash extracted from the citation addressing
    /// this write, when the key belongs to a citation-addressed namespace
    /// (documents, contracts, messages); it is `None` for names and drafts.
    /// Drivers that carry an integrity header (e.g. `HttpDriver`'s
    /// `nebula-digest`) emit it from this value rather than rehashing the
    /// wire envelope, so the header actually names the citation's digest.
    async fn write(
        &self,
        namespace: Namespace,
        key: &str,
        bytes: Vec<u8>,
        allow_overwrite: bool,
        digest: Option<&Digest>,
    ) -> Result<(), DriverError>;

    /// Deletes `key`, returning whether it existed beforehand.
    async fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, DriverError>;

    /// Lists up to `max_keys` keys in `namespace` whose key starts with
    /// `prefix`. Order is not guaranteed across drivers.
    async fn list(&self, namespace: Namespace, prefix: &str, max_keys: usize) -> Result<Vec<String>, DriverError>;
}
