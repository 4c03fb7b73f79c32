//! # nebula-repository
//!
//! A content-addressed document repository: a storage facade that unifies
//! local-filesystem, remote-HTTP and object-store backends behind one
//! capability set, a name → citation → draft → document → contract object
//! lifecycle, and a lease-based message-bag protocol with at-most-once
//! delivery.
//!
//! ## Architecture
//!
//! - [`model`]: domain types — tags, versions, citations, names, drafts,
//!   documents, contracts, bags and messages.
//! - [`identifier`]: pure key-derivation functions shared by every driver.
//! - [`driver`]: the polymorphic storage capability set and its three
//!   backends (local filesystem, HTTP, object store).
//! - [`cache`]: the bounded, insertion-order cache fronting immutable
//!   namespaces.
//! - [`notary`]: the injected notarization boundary.
//! - [`facade`]: namespace protocol and object state machine atop a driver
//!   and cache.
//! - [`sweeper`]: the optional out-of-band lease sweeper.
//! - [`repository`]: the public, caller-facing API.
//! - [`config`]: ambient configuration.
//! - [`error`]: the crate-wide error taxonomy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod facade;
pub mod identifier;
pub mod model;
pub mod notary;
pub mod repository;
pub mod sweeper;

pub use error::{ExceptionKind, RepositoryError};
pub use facade::StorageFacade;
pub use model::{Bag, Citation, Contract, Digest, Document, Draft, Message, MessageState, Name, Tag, Version};
pub use repository::Repository;

/// Re-export version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
