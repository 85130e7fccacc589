//! Staging store: the key/value system of record during an import run.
//!
//! Entities are staged under `type:id:language`, the per-type id index under
//! `type-ids`, and derived reverse references under dedicated keys. Every
//! access goes through the async [`StagingStore`] capability; nothing reaches
//! into the backing map directly.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreResult;
use crate::models::{Item, ItemType};

// =============================================================================
// Key scheme
// =============================================================================

/// Staging key construction. One entity value per (type, id, language).
pub mod keys {
    use crate::models::ItemType;

    /// `type:id:language`, the staged entity itself.
    pub fn entity(item_type: ItemType, id: &str, language: &str) -> String {
        format!("{}:{}:{}", item_type.as_str(), id, language)
    }

    /// `type-ids`, deduplicated list of ids seen for a type.
    pub fn ids(item_type: ItemType) -> String {
        format!("{}-ids", item_type.as_str())
    }

    /// Sessions a performer appears in.
    pub fn performer_sessions(performer_id: &str) -> String {
        format!("performer2sessions:{performer_id}")
    }

    /// Venues a performer appears at (derived from their sessions).
    pub fn performer_venues(performer_id: &str) -> String {
        format!("performer2venues:{performer_id}")
    }

    /// Parent session(s) of a subsession.
    pub fn session_parent(session_id: &str) -> String {
        format!("session2parent:{session_id}")
    }

    /// Performers belonging to a group.
    pub fn group_performers(group_id: &str) -> String {
        format!("group2performers:{group_id}")
    }

    /// Sessions belonging to a group.
    pub fn group_sessions(group_id: &str) -> String {
        format!("group2sessions:{group_id}")
    }

    /// Ids of the typed group documents published this run.
    pub fn group_doc_ids() -> String {
        "group-doc-ids".to_string()
    }
}

// =============================================================================
// Capability
// =============================================================================

/// Key/value staging capability.
///
/// `set` overwrites (last write wins); `get` returns the latest value.
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;
}

/// Staged item for (type, id, language), decoded.
pub async fn get_item(
    store: &dyn StagingStore,
    item_type: ItemType,
    id: &str,
    language: &str,
) -> StoreResult<Option<Item>> {
    let value = store.get(&keys::entity(item_type, id, language)).await?;
    match value {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// String list under `key`; absent means empty.
pub async fn get_string_list(store: &dyn StagingStore, key: &str) -> StoreResult<Vec<String>> {
    let value = store.get(key).await?;
    match value {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(Vec::new()),
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Default in-memory staging store.
///
/// Each access yields to the scheduler once, so sequential ingestion
/// interleaves fairly with the rest of the run.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StagingStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        tokio::task::yield_now().await;
        Ok(self.map.lock().expect("staging map poisoned").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.map.lock().expect("staging map poisoned").insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_overwrites_last_write_wins() {
        let store = MemoryStore::new();
        store.set("venue:v1:en", json!({ "name": "First" })).await.unwrap();
        store.set("venue:v1:en", json!({ "name": "Second" })).await.unwrap();
        let value = store.get("venue:v1:en").await.unwrap();
        assert_eq!(value, Some(json!({ "name": "Second" })));
    }

    #[tokio::test]
    async fn test_get_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
        assert!(get_string_list(&store, "nope-ids").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_item_decodes() {
        let store = MemoryStore::new();
        let item = Item::new(ItemType::Venue, "v1", "en", json!({ "id": "v1", "name": "Hall" }));
        store
            .set(&keys::entity(ItemType::Venue, "v1", "en"), serde_json::to_value(&item).unwrap())
            .await
            .unwrap();
        let loaded = get_item(&store, ItemType::Venue, "v1", "en").await.unwrap().unwrap();
        assert_eq!(loaded, item);
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(keys::entity(ItemType::VenueCategory, "c1", "cs"), "venueCategory:c1:cs");
        assert_eq!(keys::ids(ItemType::Performer), "performer-ids");
        assert_eq!(keys::performer_sessions("p1"), "performer2sessions:p1");
        assert_eq!(keys::session_parent("s2"), "session2parent:s2");
        assert_eq!(keys::group_performers("g1"), "group2performers:g1");
    }
}
