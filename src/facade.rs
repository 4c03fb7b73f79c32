//! The storage facade: enforces the namespace protocol and the object
//! state machine atop a [`StorageDriver`] and three read caches.
//!
//! This is where citation derivation, conflict semantics and the
//! at-most-once `borrowMessage` race loop live. [`crate::repository`] is a
//! thin caller-facing wrapper around this module; nothing here reaches
//! back up to it.

use crate::cache::Cache;
use crate::driver::{DriverError, Namespace, StorageDriver};
use crate::error::{namespace_key_args, RepositoryError};
use crate::identifier::{bag_prefix, doc_key, message_key, name_key};
use crate::model::{decode_envelope, encode_envelope, Bag, Citation, Contract, Document, Draft, Message, MessageState, Name, Tag};
use crate::notary::Notary;
use rand::Rng;
use std::sync::Arc;

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Default page size for the unbounded listings in `messageCount` and
/// `borrowMessage`: large enough that a bag well under capacity never pages,
/// small enough that a pathological bag can't force a single `list` call to
/// walk the entire namespace.
const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Composes a driver, a notary and three write-through caches into the
/// name → citation → draft → document → contract lifecycle.
pub struct StorageFacade {
    driver: Arc<dyn StorageDriver>,
    notary: Arc<dyn Notary>,
    name_cache: Cache<String, Citation>,
    document_cache: Cache<String, Document>,
    contract_cache: Cache<String, Contract>,
    list_page_size: usize,
}

impl StorageFacade {
    pub fn new(driver: Arc<dyn StorageDriver>, notary: Arc<dyn Notary>, cache_capacity: usize) -> Self {
        Self::with_list_page_size(driver, notary, cache_capacity, DEFAULT_LIST_PAGE_SIZE)
    }

    /// As [`Self::new`], but with an explicit cap on how many keys a single
    /// `list` call against the `messages` namespace may return, instead of
    /// the built-in default.
    pub fn with_list_page_size(driver: Arc<dyn StorageDriver>, notary: Arc<dyn Notary>, cache_capacity: usize, list_page_size: usize) -> Self {
        Self {
            driver,
            notary,
            name_cache: Cache::new(cache_capacity),
            document_cache: Cache::new(cache_capacity),
            contract_cache: Cache::new(cache_capacity),
            list_page_size,
        }
    }

    /// Notarizes `content` under `tag`/`version` without persisting
    /// anything, for callers (such as `saveDocument`) that only need the
    /// derived citation.
    pub async fn notarize(&self, tag: Tag, version: crate::model::Version, content: &serde_json::Value) -> Result<Citation, RepositoryError> {
        let (citation, _signature) = self.notary.notarize(tag, version, content).await.map_err(|e| {
            RepositoryError::invalid_credentials("notarize").with_repository_context("notarize", vec![("cause", e.to_string())])
        })?;
        Ok(citation)
    }

    // ---- name operations -------------------------------------------------

    pub async fn name_exists(&self, name: &Name) -> Result<bool, RepositoryError> {
        let key = name_key(name);
        if self.name_cache.get(&key).await.is_some() {
            return Ok(true);
        }
        self.driver
            .exists(Namespace::Names, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "nameExists", namespace_key_args(Namespace::Names, &key), e))
    }

    pub async fn read_name(&self, name: &Name) -> Result<Option<Citation>, RepositoryError> {
        let key = name_key(name);
        if let Some(citation) = self.name_cache.get(&key).await {
            log::debug!("nameCache hit for {key}");
            return Ok(Some(citation));
        }
        let bytes = self
            .driver
            .read(Namespace::Names, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "readName", namespace_key_args(Namespace::Names, &key), e))?;
        let Some(bytes) = bytes else { return Ok(None) };
        let citation: Citation = decode_envelope(&bytes)
            .map_err(|e| RepositoryError::malformed_request("readName", e.to_string()))?;
        self.name_cache.put(key, citation.clone()).await;
        Ok(Some(citation))
    }

    pub async fn write_name(&self, name: &Name, citation: &Citation) -> Result<(), RepositoryError> {
        let key = name_key(name);
        let bytes = encode_envelope(citation).map_err(|e| RepositoryError::malformed_request("writeName", e.to_string()))?;
        match self.driver.write(Namespace::Names, &key, bytes, false, None).await {
            Ok(()) => {
                self.name_cache.put(key, citation.clone()).await;
                log::debug!("wrote name {}", name.as_str());
                Ok(())
            }
            Err(DriverError::Conflict { .. }) => Err(RepositoryError::name_exists("writeName", name.as_str())),
            Err(e) => Err(RepositoryError::from_driver("facade", "writeName", namespace_key_args(Namespace::Names, &key), e)),
        }
    }

    // ---- draft operations --------------------------------------------------

    pub async fn draft_exists(&self, citation: &Citation) -> Result<bool, RepositoryError> {
        let key = doc_key(citation);
        self.driver
            .exists(Namespace::Drafts, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "draftExists", namespace_key_args(Namespace::Drafts, &key), e))
    }

    pub async fn read_draft(&self, citation: &Citation) -> Result<Option<Draft>, RepositoryError> {
        let key = doc_key(citation);
        let bytes = self
            .driver
            .read(Namespace::Drafts, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "readDraft", namespace_key_args(Namespace::Drafts, &key), e))?;
        let Some(bytes) = bytes else { return Ok(None) };
        let draft: Draft = decode_envelope(&bytes).map_err(|e| RepositoryError::malformed_request("readDraft", e.to_string()))?;
        Ok(Some(draft))
    }

    pub async fn write_draft(&self, draft: &Draft) -> Result<(), RepositoryError> {
        let citation = Citation::new(draft.tag.clone(), draft.version.clone(), crate::model::Digest::of(b""));
        let key = doc_key(&citation);
        let bytes = encode_envelope(draft).map_err(|e| RepositoryError::malformed_request("writeDraft", e.to_string()))?;
        self.driver
            .write(Namespace::Drafts, &key, bytes, true, None)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "writeDraft", namespace_key_args(Namespace::Drafts, &key), e))
    }

    pub async fn delete_draft(&self, citation: &Citation) -> Result<bool, RepositoryError> {
        let key = doc_key(citation);
        self.driver
            .delete(Namespace::Drafts, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "deleteDraft", namespace_key_args(Namespace::Drafts, &key), e))
    }

    // ---- document operations -----------------------------------------------

    pub async fn document_exists(&self, citation: &Citation) -> Result<bool, RepositoryError> {
        let key = doc_key(citation);
        if self.document_cache.get(&key).await.is_some() {
            return Ok(true);
        }
        self.driver
            .exists(Namespace::Documents, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "documentExists", namespace_key_args(Namespace::Documents, &key), e))
    }

    pub async fn read_document(&self, citation: &Citation) -> Result<Option<Document>, RepositoryError> {
        let key = doc_key(citation);
        if let Some(document) = self.document_cache.get(&key).await {
            return Ok(Some(document));
        }
        let bytes = self.driver.read(Namespace::Documents, &key).await.map_err(|e| {
            RepositoryError::from_driver("facade", "readDocument", namespace_key_args(Namespace::Documents, &key), e)
        })?;
        let Some(bytes) = bytes else { return Ok(None) };
        let document: Document =
            decode_envelope(&bytes).map_err(|e| RepositoryError::malformed_request("readDocument", e.to_string()))?;
        self.document_cache.put(key, document.clone()).await;
        Ok(Some(document))
    }

    /// Notarizes `content` under `tag`/`version`, rejects it if a contract
    /// already occupies the same key, and rejects a non-idempotent rewrite —
    /// a different document already staged under the same key — before
    /// staging it as a document. `doc_key` is derived from `tag`/`version`
    /// alone, so two different contents under the same key collide on
    /// storage key even though their citations (and digests) differ;
    /// invariant 2 requires that collision to be rejected rather than
    /// silently overwritten.
    pub async fn write_document(&self, tag: Tag, version: crate::model::Version, content: serde_json::Value) -> Result<Citation, RepositoryError> {
        let (citation, _signature) = self
            .notary
            .notarize(tag, version, &content)
            .await
            .map_err(|e| RepositoryError::invalid_credentials("writeDocument").with_repository_context("writeDocument", vec![("cause", e.to_string())]))?;
        let key = doc_key(&citation);

        let contract_present = self
            .driver
            .exists(Namespace::Contracts, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "writeDocument", namespace_key_args(Namespace::Contracts, &key), e))?;
        if contract_present {
            return Err(RepositoryError::contract_exists("writeDocument", &key));
        }

        if let Some(existing) = self.read_document(&citation).await? {
            if existing.citation.digest != citation.digest {
                return Err(RepositoryError::document_exists("writeDocument", &key));
            }
        }

        let document = Document { citation: citation.clone(), content };
        let bytes = encode_envelope(&document).map_err(|e| RepositoryError::malformed_request("writeDocument", e.to_string()))?;
        self.driver
            .write(Namespace::Documents, &key, bytes, true, Some(&citation.digest))
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "writeDocument", namespace_key_args(Namespace::Documents, &key), e))?;
        self.document_cache.put(key.clone(), document).await;

        // A draft under the same (tag, version) is superseded by promotion
        // to document (invariant 3): clear it so the two can never coexist.
        if let Err(e) = self.driver.delete(Namespace::Drafts, &key).await {
            log::warn!("writeDocument left a draft shadow at {key}: {e}");
        }

        log::debug!("wrote document {citation}");
        Ok(citation)
    }

    // ---- contract operations -----------------------------------------------

    pub async fn contract_exists(&self, citation: &Citation) -> Result<bool, RepositoryError> {
        let key = doc_key(citation);
        if self.contract_cache.get(&key).await.is_some() {
            return Ok(true);
        }
        self.driver
            .exists(Namespace::Contracts, &key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "contractExists", namespace_key_args(Namespace::Contracts, &key), e))
    }

    pub async fn read_contract(&self, citation: &Citation) -> Result<Option<Contract>, RepositoryError> {
        let key = doc_key(citation);
        if let Some(contract) = self.contract_cache.get(&key).await {
            return Ok(Some(contract));
        }
        let bytes = self.driver.read(Namespace::Contracts, &key).await.map_err(|e| {
            RepositoryError::from_driver("facade", "readContract", namespace_key_args(Namespace::Contracts, &key), e)
        })?;
        let Some(bytes) = bytes else { return Ok(None) };
        let contract: Contract =
            decode_envelope(&bytes).map_err(|e| RepositoryError::malformed_request("readContract", e.to_string()))?;
        self.contract_cache.put(key, contract.clone()).await;
        Ok(Some(contract))
    }

    /// Promotes a staged document into a committed contract under the same
    /// key, then removes the staging document. Not transactional: a crash
    /// between the two steps leaves a harmless document shadow.
    pub async fn write_contract(&self, citation: Citation, content: serde_json::Value) -> Result<Citation, RepositoryError> {
        let key = doc_key(&citation);
        let contract = Contract { citation: citation.clone(), content };
        let bytes = encode_envelope(&contract).map_err(|e| RepositoryError::malformed_request("writeContract", e.to_string()))?;

        match self.driver.write(Namespace::Contracts, &key, bytes, false, Some(&citation.digest)).await {
            Ok(()) => {}
            Err(DriverError::Conflict { .. }) => return Err(RepositoryError::contract_exists("writeContract", &key)),
            Err(e) => {
                return Err(RepositoryError::from_driver(
                    "facade",
                    "writeContract",
                    namespace_key_args(Namespace::Contracts, &key),
                    e,
                ))
            }
        }

        self.contract_cache.put(key.clone(), contract).await;
        self.document_cache.invalidate(&key).await;
        if let Err(e) = self.driver.delete(Namespace::Documents, &key).await {
            log::warn!("promotion left a document shadow at {key}: {e}");
        }
        log::debug!("promoted contract {citation}");
        Ok(citation)
    }

    // ---- bag/message operations ---------------------------------------------

    /// Estimated count of `available` messages; racy under contention.
    pub async fn message_count(&self, bag: &Bag) -> Result<usize, RepositoryError> {
        let prefix = bag_prefix(bag, MessageState::Available);
        let keys = self
            .driver
            .list(Namespace::Messages, &prefix, self.list_page_size)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "messageCount", namespace_key_args(Namespace::Messages, &prefix), e))?;
        Ok(keys.len())
    }

    pub async fn add_message(&self, bag: &Bag, capacity: u64, content: serde_json::Value) -> Result<Citation, RepositoryError> {
        let current = self.message_count(bag).await?;
        if current as u64 >= capacity {
            return Err(RepositoryError::bag_full("addMessage", &bag.citation.to_string(), capacity));
        }

        let (msg_citation, _signature) = self
            .notary
            .notarize(Tag::generate(), crate::model::Version::initial(), &content)
            .await
            .map_err(|e| RepositoryError::invalid_credentials("addMessage").with_repository_context("addMessage", vec![("cause", e.to_string())]))?;

        let avail_key = message_key(bag, MessageState::Available, &msg_citation);
        let proc_key = message_key(bag, MessageState::Processing, &msg_citation);

        for key in [&avail_key, &proc_key] {
            if self.driver.exists(Namespace::Messages, key).await.map_err(|e| {
                RepositoryError::from_driver("facade", "addMessage", namespace_key_args(Namespace::Messages, key), e)
            })? {
                return Err(RepositoryError::message_exists("addMessage", key));
            }
        }

        let message = Message {
            bag: bag.citation.clone(),
            citation: msg_citation.clone(),
            content,
        };
        let bytes = encode_envelope(&message).map_err(|e| RepositoryError::malformed_request("addMessage", e.to_string()))?;
        self.driver
            .write(Namespace::Messages, &avail_key, bytes, true, Some(&msg_citation.digest))
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "addMessage", namespace_key_args(Namespace::Messages, &avail_key), e))?;
        log::debug!("enqueued message {msg_citation} into bag {}", bag.citation);
        Ok(msg_citation)
    }

    /// The at-most-once borrow race: random candidate selection,
    /// read-then-delete to resolve concurrent borrowers, retrying only on a
    /// genuinely lost race.
    pub async fn borrow_message(&self, bag: &Bag) -> Result<Option<Message>, RepositoryError> {
        loop {
            let avail_prefix = bag_prefix(bag, MessageState::Available);
            let candidates = self
                .driver
                .list(Namespace::Messages, &avail_prefix, self.list_page_size)
                .await
                .map_err(|e| RepositoryError::from_driver("facade", "borrowMessage", namespace_key_args(Namespace::Messages, &avail_prefix), e))?;
            if candidates.is_empty() {
                return Ok(None);
            }

            let index = rand::thread_rng().gen_range(0..candidates.len());
            let key = candidates[index].clone();

            let bytes = self
                .driver
                .read(Namespace::Messages, &key)
                .await
                .map_err(|e| RepositoryError::from_driver("facade", "borrowMessage", namespace_key_args(Namespace::Messages, &key), e))?;
            let Some(bytes) = bytes else {
                log::warn!("borrowMessage lost the read race on {key}, retrying");
                continue;
            };

            let existed = self
                .driver
                .delete(Namespace::Messages, &key)
                .await
                .map_err(|e| RepositoryError::from_driver("facade", "borrowMessage", namespace_key_args(Namespace::Messages, &key), e))?;
            if !existed {
                log::warn!("borrowMessage lost the delete race on {key}, retrying");
                continue;
            }

            let mut message: Message =
                decode_envelope(&bytes).map_err(|e| RepositoryError::malformed_request("borrowMessage", e.to_string()))?;
            message.borrowed_at = Some(now_unix());
            let proc_key = message_key(bag, MessageState::Processing, &message.citation);
            let proc_bytes = encode_envelope(&message).map_err(|e| RepositoryError::malformed_request("borrowMessage", e.to_string()))?;
            self.driver
                .write(Namespace::Messages, &proc_key, proc_bytes, true, Some(&message.citation.digest))
                .await
                .map_err(|e| RepositoryError::from_driver("facade", "borrowMessage", namespace_key_args(Namespace::Messages, &proc_key), e))?;

            log::debug!("borrowed message {} from bag {}", message.citation, bag.citation);
            return Ok(Some(message));
        }
    }

    pub async fn return_message(&self, bag: &Bag, mut message: Message) -> Result<(), RepositoryError> {
        let proc_key = message_key(bag, MessageState::Processing, &message.citation);
        let existed = self
            .driver
            .delete(Namespace::Messages, &proc_key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "returnMessage", namespace_key_args(Namespace::Messages, &proc_key), e))?;
        if !existed {
            return Err(RepositoryError::lease_expired("returnMessage", &proc_key));
        }

        let next_version = message.citation.version.next();
        let (next_citation, _signature) = self
            .notary
            .notarize(message.citation.tag.clone(), next_version, &message.content)
            .await
            .map_err(|e| RepositoryError::invalid_credentials("returnMessage").with_repository_context("returnMessage", vec![("cause", e.to_string())]))?;
        message.citation = next_citation.clone();

        let avail_key = message_key(bag, MessageState::Available, &next_citation);
        let bytes = encode_envelope(&message).map_err(|e| RepositoryError::malformed_request("returnMessage", e.to_string()))?;
        self.driver
            .write(Namespace::Messages, &avail_key, bytes, true, Some(&next_citation.digest))
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "returnMessage", namespace_key_args(Namespace::Messages, &avail_key), e))?;
        log::debug!("returned message {next_citation} to bag {}", bag.citation);
        Ok(())
    }

    pub async fn delete_message(&self, bag: &Bag, citation: &Citation) -> Result<Message, RepositoryError> {
        let proc_key = message_key(bag, MessageState::Processing, citation);
        let bytes = self
            .driver
            .read(Namespace::Messages, &proc_key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "deleteMessage", namespace_key_args(Namespace::Messages, &proc_key), e))?;
        let Some(bytes) = bytes else {
            return Err(RepositoryError::lease_expired("deleteMessage", &proc_key));
        };
        let existed = self
            .driver
            .delete(Namespace::Messages, &proc_key)
            .await
            .map_err(|e| RepositoryError::from_driver("facade", "deleteMessage", namespace_key_args(Namespace::Messages, &proc_key), e))?;
        if !existed {
            return Err(RepositoryError::lease_expired("deleteMessage", &proc_key));
        }
        let message: Message =
            decode_envelope(&bytes).map_err(|e| RepositoryError::malformed_request("deleteMessage", e.to_string()))?;
        log::debug!("acknowledged message {} in bag {}", message.citation, bag.citation);
        Ok(message)
    }

    /// Re-promotes `processing` entries older than `ttl_secs` back to
    /// `available`, bumping their version exactly as `returnMessage` does.
    /// Called on an interval by [`crate::sweeper::LeaseSweeper`]; never
    /// invoked from the facade's own call path.
    pub async fn reclaim_expired_leases(&self, bag: &Bag, ttl_secs: i64) -> Result<usize, RepositoryError> {
        let proc_prefix = bag_prefix(bag, MessageState::Processing);
        let keys = self
            .driver
            .list(Namespace::Messages, &proc_prefix, self.list_page_size)
            .await
            .map_err(|e| RepositoryError::from_driver("sweeper", "reclaimExpiredLeases", namespace_key_args(Namespace::Messages, &proc_prefix), e))?;

        let deadline = now_unix() - ttl_secs;
        let mut reclaimed = 0usize;
        for key in keys {
            let bytes = match self.driver.read(Namespace::Messages, &key).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("sweeper failed to read {key}: {e}");
                    continue;
                }
            };
            let message: Message = match decode_envelope(&bytes) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("sweeper failed to decode {key}: {e}");
                    continue;
                }
            };
            let is_stale = message.borrowed_at.map(|ts| ts <= deadline).unwrap_or(true);
            if !is_stale {
                continue;
            }

            if !self.driver.delete(Namespace::Messages, &key).await.unwrap_or(false) {
                continue; // reclaimed by the lease holder's own returnMessage/deleteMessage in the meantime
            }

            let mut message = message;
            message.borrowed_at = None;
            let next_version = message.citation.version.next();
            let (next_citation, _signature) = match self.notary.notarize(message.citation.tag.clone(), next_version, &message.content).await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("sweeper failed to renotarize {key}: {e}");
                    continue;
                }
            };
            message.citation = next_citation.clone();
            let avail_key = message_key(bag, MessageState::Available, &next_citation);
            let bytes = match encode_envelope(&message) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("sweeper failed to encode {key}: {e}");
                    continue;
                }
            };
            if let Err(e) = self.driver.write(Namespace::Messages, &avail_key, bytes, true, Some(&next_citation.digest)).await {
                log::warn!("sweeper failed to requeue {key}: {e}");
                continue;
            }
            log::warn!("sweeper reclaimed expired lease {key} -> {avail_key}");
            reclaimed += 1;
        }
        Ok(reclaimed)
    }
}
