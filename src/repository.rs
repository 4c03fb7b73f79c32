//! The public repository API: the caller-facing surface composed
//! from the facade's primitives, plus the bag-lifecycle operations this
//! expansion adds (`createBag`, `bagCapacity`, `bagAvailableCount`).
//!
//! The Repository owns the Facade owns the Driver and the Cache; nothing
//! here points back up.

use crate::error::RepositoryError;
use crate::facade::StorageFacade;
use crate::model::{Bag, Citation, Message, Name, Tag, Version};
use std::sync::Arc;

/// A fully-assembled document repository: driver, cache and notary wired up
/// behind the facade, exposed through the operations callers actually use.
pub struct Repository {
    facade: Arc<StorageFacade>,
}

impl Repository {
    pub fn new(facade: Arc<StorageFacade>) -> Self {
        Self { facade }
    }

    pub fn facade(&self) -> &Arc<StorageFacade> {
        &self.facade
    }

    /// Fetches `type_name`'s citation and document, merges its default
    /// attributes with `template`, and returns an un-notarized draft ready
    /// for [`Self::save_document`].
    pub async fn create_document(
        &self,
        type_name: &Name,
        permissions: serde_json::Value,
        template: serde_json::Value,
    ) -> Result<(Tag, Version, serde_json::Value), RepositoryError> {
        let citation = self
            .facade
            .read_name(type_name)
            .await
            .map_err(|e| e.with_repository_context("createDocument", vec![("typeName", type_name.to_string())]))?
            .ok_or_else(|| RepositoryError::unknown_type("createDocument", type_name.as_str()))?;

        let type_document = self
            .facade
            .read_document(&citation)
            .await
            .map_err(|e| e.with_repository_context("createDocument", vec![("typeName", type_name.to_string())]))?
            .ok_or_else(|| RepositoryError::unknown_type("createDocument", type_name.as_str()))?;

        let mut content = type_document.content;
        if let (Some(defaults), Some(overrides)) = (content.as_object_mut(), template.as_object()) {
            for (key, value) in overrides {
                defaults.insert(key.clone(), value.clone());
            }
        }
        if let Some(object) = content.as_object_mut() {
            object.insert("$permissions".to_string(), permissions);
        }

        Ok((Tag::generate(), Version::initial(), content))
    }

    /// Notarizes and persists a draft, returning its citation.
    pub async fn save_document(&self, tag: Tag, version: Version, content: serde_json::Value) -> Result<Citation, RepositoryError> {
        let citation = self
            .facade
            .notarize(tag.clone(), version.clone(), &content)
            .await
            .map_err(|e| e.with_repository_context("saveDocument", vec![("tag", tag.to_string())]))?;

        self.facade
            .write_draft(&crate::model::Draft { tag, version, content })
            .await
            .map_err(|e| e.with_repository_context("saveDocument", vec![("citation", citation.to_string())]))?;

        Ok(citation)
    }

    pub async fn retrieve_document(&self, citation: &Citation) -> Result<Option<serde_json::Value>, RepositoryError> {
        let draft = self
            .facade
            .read_draft(citation)
            .await
            .map_err(|e| e.with_repository_context("retrieveDocument", vec![("citation", citation.to_string())]))?;
        Ok(draft.map(|d| d.content))
    }

    pub async fn discard_document(&self, citation: &Citation) -> Result<bool, RepositoryError> {
        self.facade
            .delete_draft(citation)
            .await
            .map_err(|e| e.with_repository_context("discardDocument", vec![("citation", citation.to_string())]))
    }

    /// Binds `name` to a freshly committed document, failing `nameExists`
    /// if the name is already bound.
    pub async fn commit_document(&self, name: &Name, tag: Tag, version: Version, content: serde_json::Value) -> Result<Citation, RepositoryError> {
        if self
            .facade
            .name_exists(name)
            .await
            .map_err(|e| e.with_repository_context("commitDocument", vec![("name", name.to_string())]))?
        {
            return Err(RepositoryError::name_exists("commitDocument", name.as_str()));
        }

        let citation = self
            .facade
            .write_document(tag, version, content)
            .await
            .map_err(|e| e.with_repository_context("commitDocument", vec![("name", name.to_string())]))?;

        self.facade
            .write_name(name, &citation)
            .await
            .map_err(|e| e.with_repository_context("commitDocument", vec![("name", name.to_string())]))?;

        Ok(citation)
    }

    pub async fn retrieve_name(&self, name: &Name) -> Result<Option<serde_json::Value>, RepositoryError> {
        let Some(citation) = self
            .facade
            .read_name(name)
            .await
            .map_err(|e| e.with_repository_context("retrieveName", vec![("name", name.to_string())]))?
        else {
            return Ok(None);
        };
        let document = self
            .facade
            .read_document(&citation)
            .await
            .map_err(|e| e.with_repository_context("retrieveName", vec![("name", name.to_string())]))?;
        Ok(document.map(|d| d.content))
    }

    pub async fn message_available(&self, bag: &Bag) -> Result<bool, RepositoryError> {
        Ok(self
            .facade
            .message_count(bag)
            .await
            .map_err(|e| e.with_repository_context("messageAvailable", vec![("bag", bag.citation.to_string())]))?
            > 0)
    }

    pub async fn message_count(&self, bag: &Bag) -> Result<usize, RepositoryError> {
        self.facade
            .message_count(bag)
            .await
            .map_err(|e| e.with_repository_context("messageCount", vec![("bag", bag.citation.to_string())]))
    }

    pub async fn add_message(&self, bag: &Bag, content: serde_json::Value) -> Result<Citation, RepositoryError> {
        let capacity = self.bag_capacity(bag).await?;
        self.facade
            .add_message(bag, capacity, content)
            .await
            .map_err(|e| e.with_repository_context("addMessage", vec![("bag", bag.citation.to_string())]))
    }

    pub async fn borrow_message(&self, bag: &Bag) -> Result<Option<Message>, RepositoryError> {
        self.facade
            .borrow_message(bag)
            .await
            .map_err(|e| e.with_repository_context("borrowMessage", vec![("bag", bag.citation.to_string())]))
    }

    pub async fn return_message(&self, bag: &Bag, message: Message) -> Result<(), RepositoryError> {
        self.facade
            .return_message(bag, message)
            .await
            .map_err(|e| e.with_repository_context("returnMessage", vec![("bag", bag.citation.to_string())]))
    }

    pub async fn delete_message(&self, bag: &Bag, citation: &Citation) -> Result<Message, RepositoryError> {
        self.facade
            .delete_message(bag, citation)
            .await
            .map_err(|e| e.with_repository_context("deleteMessage", vec![("bag", bag.citation.to_string())]))
    }

    // ---- bag lifecycle -----------------------------------------------------

    /// Commits a new bag contract with the given capacity, reusing the
    /// existing document/name machinery rather than a parallel path.
    pub async fn create_bag(&self, name: &Name, capacity: u64) -> Result<Bag, RepositoryError> {
        let content = serde_json::json!({ "$capacity": capacity, "$available": 0 });
        let (tag, version, merged) = (Tag::generate(), Version::initial(), content);
        let citation = self
            .facade
            .write_document(tag, version, merged)
            .await
            .map_err(|e| e.with_repository_context("createBag", vec![("name", name.to_string())]))?;
        let citation = self
            .facade
            .write_contract(citation, serde_json::json!({ "$capacity": capacity, "$available": 0 }))
            .await
            .map_err(|e| e.with_repository_context("createBag", vec![("name", name.to_string())]))?;
        self.facade
            .write_name(name, &citation)
            .await
            .map_err(|e| e.with_repository_context("createBag", vec![("name", name.to_string())]))?;
        Ok(Bag::new(citation))
    }

    pub async fn bag_capacity(&self, bag: &Bag) -> Result<u64, RepositoryError> {
        let contract = self
            .facade
            .read_contract(&bag.citation)
            .await
            .map_err(|e| e.with_repository_context("bagCapacity", vec![("bag", bag.citation.to_string())]))?
            .ok_or_else(|| RepositoryError::no_bag("bagCapacity", &bag.citation.to_string()))?;
        contract
            .content
            .get("$capacity")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| RepositoryError::malformed_request("bagCapacity", "bag contract missing $capacity"))
    }

    pub async fn bag_available_count(&self, bag: &Bag) -> Result<usize, RepositoryError> {
        self.facade
            .message_count(bag)
            .await
            .map_err(|e| e.with_repository_context("bagAvailableCount", vec![("bag", bag.citation.to_string())]))
    }
}
