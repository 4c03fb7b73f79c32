//! Crate-wide error taxonomy.
//!
//! [`DriverError`] is the narrow, driver-facing error type. [`RepositoryError`]
//! is what the facade and repository layers return to callers: every
//! variant records module, procedure, exception kind, arguments and
//! underlying cause, captured at construction so no field is ever
//! reconstructed after the fact at a catch site.

use crate::driver::{DriverError, Namespace};
use std::fmt;

/// The kind of failure a repository operation encountered, independent of
/// which procedure raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Conflict,
    UnknownType,
    BagFull,
    LeaseExpired,
    NoBag,
    InvalidCredentials,
    MalformedRequest,
    ServerDown,
    Io,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExceptionKind::Conflict => "conflict",
            ExceptionKind::UnknownType => "unknownType",
            ExceptionKind::BagFull => "bagFull",
            ExceptionKind::LeaseExpired => "leaseExpired",
            ExceptionKind::NoBag => "noBag",
            ExceptionKind::InvalidCredentials => "invalidCredentials",
            ExceptionKind::MalformedRequest => "malformedRequest",
            ExceptionKind::ServerDown => "serverDown",
            ExceptionKind::Io => "io",
        };
        write!(f, "{s}")
    }
}

/// A single `name=value` argument captured at the error site, for diagnostics.
pub type Argument = (&'static str, String);

/// A domain exception raised by the facade or repository layers.
#[derive(Debug, thiserror::Error)]
#[error("{module}::{procedure} [{kind}] {cause}")]
pub struct RepositoryError {
    pub module: &'static str,
    pub procedure: &'static str,
    pub kind: ExceptionKind,
    pub arguments: Vec<Argument>,
    pub cause: String,
    #[source]
    pub source: Option<DriverError>,
}

impl RepositoryError {
    pub fn new(
        module: &'static str,
        procedure: &'static str,
        kind: ExceptionKind,
        arguments: Vec<Argument>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            module,
            procedure,
            kind,
            arguments,
            cause: cause.into(),
            source: None,
        }
    }

    /// Wraps a driver-layer failure with operation context, exactly once.
    pub fn from_driver(module: &'static str, procedure: &'static str, arguments: Vec<Argument>, err: DriverError) -> Self {
        let kind = match &err {
            DriverError::Conflict { .. } => ExceptionKind::Conflict,
            DriverError::ServerDown { .. } => ExceptionKind::ServerDown,
            DriverError::Io { .. } => ExceptionKind::Io,
        };
        let cause = err.to_string();
        Self {
            module,
            procedure,
            kind,
            arguments,
            cause,
            source: Some(err),
        }
    }

    pub fn name_exists(procedure: &'static str, name: &str) -> Self {
        Self::new(
            "facade",
            procedure,
            ExceptionKind::Conflict,
            vec![("name", name.to_string())],
            format!("name already bound: {name}"),
        )
    }

    pub fn contract_exists(procedure: &'static str, key: &str) -> Self {
        Self::new(
            "facade",
            procedure,
            ExceptionKind::Conflict,
            vec![("key", key.to_string())],
            format!("contract already committed: {key}"),
        )
    }

    /// A `writeDocument` under a (tag, version) key already occupied by a
    /// document with *different* content — a non-idempotent rewrite, which
    /// invariant 2 forbids. Byte-identical rewrites are not an error.
    pub fn document_exists(procedure: &'static str, key: &str) -> Self {
        Self::new(
            "facade",
            procedure,
            ExceptionKind::Conflict,
            vec![("key", key.to_string())],
            format!("document already exists with different content: {key}"),
        )
    }

    pub fn message_exists(procedure: &'static str, key: &str) -> Self {
        Self::new(
            "facade",
            procedure,
            ExceptionKind::Conflict,
            vec![("key", key.to_string())],
            format!("message already present: {key}"),
        )
    }

    pub fn unknown_type(procedure: &'static str, type_name: &str) -> Self {
        Self::new(
            "repository",
            procedure,
            ExceptionKind::UnknownType,
            vec![("type", type_name.to_string())],
            format!("unknown type: {type_name}"),
        )
    }

    pub fn bag_full(procedure: &'static str, bag: &str, capacity: u64) -> Self {
        Self::new(
            "facade",
            procedure,
            ExceptionKind::BagFull,
            vec![("bag", bag.to_string()), ("capacity", capacity.to_string())],
            format!("bag {bag} is at capacity {capacity}"),
        )
    }

    pub fn lease_expired(procedure: &'static str, key: &str) -> Self {
        Self::new(
            "facade",
            procedure,
            ExceptionKind::LeaseExpired,
            vec![("key", key.to_string())],
            format!("lease no longer held: {key}"),
        )
    }

    pub fn no_bag(procedure: &'static str, bag: &str) -> Self {
        Self::new(
            "facade",
            procedure,
            ExceptionKind::NoBag,
            vec![("bag", bag.to_string())],
            format!("no such bag: {bag}"),
        )
    }

    pub fn invalid_credentials(procedure: &'static str) -> Self {
        Self::new(
            "notary",
            procedure,
            ExceptionKind::InvalidCredentials,
            vec![],
            "invalid credentials",
        )
    }

    pub fn malformed_request(procedure: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            "repository",
            procedure,
            ExceptionKind::MalformedRequest,
            vec![("reason", reason.clone())],
            reason,
        )
    }

    /// Wraps this error one more time with caller-argument context, as the
    /// Repository API layer does atop whatever the facade raised.
    pub fn with_repository_context(mut self, procedure: &'static str, extra: Vec<Argument>) -> Self {
        self.procedure = procedure;
        self.arguments.extend(extra);
        self
    }
}

pub(crate) fn namespace_key_args(namespace: Namespace, key: &str) -> Vec<Argument> {
    vec![("namespace", namespace.as_str().to_string()), ("key", key.to_string())]
}
