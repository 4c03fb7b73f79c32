//! Pure key-derivation functions shared by every storage driver.
//!
//! No function here touches storage; they only turn domain identifiers into
//! the canonical key strings that drivers key on. Keeping this logic in one
//! place is what lets the same key address an object under the local,
//! remote and object-store drivers interchangeably.

use crate::model::{Bag, Citation, MessageState, Name};

/// Canonical path form of a name: leading separator stripped, hierarchy preserved.
pub fn name_key(name: &Name) -> String {
    name.as_str().trim_start_matches('/').to_string()
}

/// `<tag-without-sigil>/<version>`.
pub fn doc_key(citation: &Citation) -> String {
    format!("{}/{}", citation.tag.without_sigil(), citation.version)
}

/// `<bag-tag>/<bag-version>/<state>`.
pub fn bag_prefix(bag: &Bag, state: MessageState) -> String {
    format!(
        "{}/{}/{}",
        bag.citation.tag.without_sigil(),
        bag.citation.version,
        state.as_str()
    )
}

/// `bagPrefix(bag, state) + "/" + docKey(msgCitation)`.
pub fn message_key(bag: &Bag, state: MessageState, msg_citation: &Citation) -> String {
    format!("{}/{}", bag_prefix(bag, state), doc_key(msg_citation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Digest, Tag, Version};

    fn citation(tag: &str, version: &str) -> Citation {
        Citation::new(Tag::new(tag), Version::parse(version).unwrap(), Digest::of(b"x"))
    }

    #[test]
    fn name_key_strips_leading_slash_only() {
        let name = Name::new("/examples/name/v1.2.3");
        assert_eq!(name_key(&name), "examples/name/v1.2.3");
    }

    #[test]
    fn doc_key_joins_tag_and_version() {
        let c = citation("BXC15F", "v1.2.3");
        assert_eq!(doc_key(&c), "BXC15F/v1.2.3");
    }

    #[test]
    fn message_key_nests_under_bag_and_state() {
        let bag = Bag::new(citation("bagtag", "v1.0.0"));
        let msg = citation("msgtag", "v1.0.0");
        assert_eq!(
            message_key(&bag, MessageState::Available, &msg),
            "bagtag/v1.0.0/available/msgtag/v1.0.0"
        );
    }
}
