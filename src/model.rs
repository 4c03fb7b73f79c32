//! Domain types for the document repository: names, citations, drafts,
//! documents, contracts, bags and messages.
//!
//! These are plain data carriers. The state machine that governs how they
//! may be created, read and transitioned lives in [`crate::facade`].

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Strips the leading sigil (`/` or `#`) so that names and tags produce the
/// same canonical key form regardless of which sigil the caller used.
pub(crate) fn strip_sigil(raw: &str) -> &str {
    raw.trim_start_matches(['/', '#'])
}

/// A globally unique opaque identifier for a document family.
///
/// Rendered with a leading `#`, matching the wire convention used throughout
/// the repository (as opposed to [`Name`], which is rendered with `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    /// Generates a new, randomly chosen tag.
    pub fn generate() -> Self {
        Tag(format!("#{}", uuid::Uuid::new_v4().simple()))
    }

    /// Wraps a caller-supplied tag string, normalizing the leading sigil.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with('#') {
            Tag(raw)
        } else {
            Tag(format!("#{raw}"))
        }
    }

    /// The tag with its sigil stripped, suitable for use as a storage key segment.
    pub fn without_sigil(&self) -> &str {
        strip_sigil(&self.0)
    }

    /// The tag as written on the wire, including its sigil.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered version string within a tag, e.g. `v1.2.3`.
///
/// Internally backed by [`semver::Version`] so that versions compare and
/// bump correctly; the wire form always carries the `v` prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(semver::Version);

impl Version {
    /// The first version in a new tag's history.
    pub fn initial() -> Self {
        Version(semver::Version::new(1, 0, 0))
    }

    /// Parses a version string, tolerating a leading `v` and a missing patch
    /// component (`v3.4` is accepted as `3.4.0`), both of which appear in the
    /// wild in this system's citations.
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        let trimmed = raw.trim_start_matches('v');
        let normalized = match trimmed.matches('.').count() {
            0 => format!("{trimmed}.0.0"),
            1 => format!("{trimmed}.0"),
            _ => trimmed.to_string(),
        };
        Ok(Version(semver::Version::parse(&normalized)?))
    }

    /// Returns the next monotonic version, bumping the patch component.
    ///
    /// Used by `returnMessage` to re-version a message before it is placed
    /// back into the `available` state.
    pub fn next(&self) -> Self {
        let mut bumped = self.0.clone();
        bumped.patch += 1;
        Version(bumped)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.0.major, self.0.minor, self.0.patch)
    }
}

/// The cryptographic hash of a document's canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Computes the digest of a byte string.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let result = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&result);
        Digest(out)
    }

    /// Renders the digest as lowercase hex, the form carried in the
    /// `nebula-digest` request header.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// An immutable record that uniquely names a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub tag: Tag,
    pub version: Version,
    pub digest: Digest,
}

impl Citation {
    pub fn new(tag: Tag, version: Version, digest: Digest) -> Self {
        Self { tag, version, digest }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tag, self.version)
    }
}

/// A hierarchical, human-readable label bound once to a citation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name(String);

impl Name {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with('/') {
            Name(raw)
        } else {
            Name(format!("/{raw}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mutable, unsigned working copy keyed by an author-chosen (tag, version).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub tag: Tag,
    pub version: Version,
    pub content: serde_json::Value,
}

/// An immutable notarized payload addressed by its citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub citation: Citation,
    pub content: serde_json::Value,
}

/// A committed document, promoted into the terminal namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub citation: Citation,
    pub content: serde_json::Value,
}

/// The state a message currently occupies within its bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageState {
    Available,
    Processing,
}

impl MessageState {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            MessageState::Available => "available",
            MessageState::Processing => "processing",
        }
    }
}

/// A notarized document inside a bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub bag: Citation,
    pub citation: Citation,
    pub content: serde_json::Value,
    /// Unix-epoch seconds at which this message last entered `processing`.
    /// Absent while the message sits in `available`. Drivers that cannot
    /// report object mtimes rely on this embedded timestamp for lease
    /// expiry instead.
    #[serde(default)]
    pub borrowed_at: Option<i64>,
}

/// A contract whose declared role is to hold messages.
///
/// Wraps the citation of the committed `$capacity`-bearing contract; bag
/// identity and contract identity are the same citation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bag {
    pub citation: Citation,
}

impl Bag {
    pub fn new(citation: Citation) -> Self {
        Self { citation }
    }
}

/// Encodes a domain value as the `application/bali` wire envelope: compact
/// JSON followed by a single trailing newline.
pub fn encode_envelope<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes a value previously produced by [`encode_envelope`], tolerating
/// the trailing newline stripped or retained by the driver.
pub fn decode_envelope<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    serde_json::from_slice(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_normalizes_sigil() {
        let a = Tag::new("abc123");
        let b = Tag::new("#abc123");
        assert_eq!(a, b);
        assert_eq!(a.without_sigil(), "abc123");
    }

    #[test]
    fn version_parses_short_forms() {
        assert_eq!(Version::parse("v3.4").unwrap().to_string(), "v3.4.0");
        assert_eq!(Version::parse("1.2.3").unwrap().to_string(), "v1.2.3");
    }

    #[test]
    fn version_bumps_patch() {
        let v = Version::parse("v1.2.3").unwrap();
        assert_eq!(v.next().to_string(), "v1.2.4");
    }

    #[test]
    fn name_normalizes_leading_slash() {
        assert_eq!(Name::new("a/b").as_str(), "/a/b");
        assert_eq!(Name::new("/a/b").as_str(), "/a/b");
    }

    #[test]
    fn envelope_round_trips() {
        let value = serde_json::json!({"a": 1});
        let bytes = encode_envelope(&value).unwrap();
        assert!(bytes.ends_with(b"\n"));
        let decoded: serde_json::Value = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    proptest::proptest! {
        #[test]
        fn version_next_is_always_strictly_greater(major in 0u64..50, minor in 0u64..50, patch in 0u64..50) {
            let v = Version::parse(&format!("{major}.{minor}.{patch}")).unwrap();
            let bumped = v.next();
            prop_assert!(bumped > v);
        }

        #[test]
        fn version_parse_is_stable_under_display_round_trip(major in 0u64..50, minor in 0u64..50, patch in 0u64..50) {
            let v = Version::parse(&format!("{major}.{minor}.{patch}")).unwrap();
            let reparsed = Version::parse(&v.to_string()).unwrap();
            prop_assert_eq!(v, reparsed);
        }
    }
}
