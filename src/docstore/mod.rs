//! Target document store: the publish/prune side of the pipeline.
//!
//! The importer only touches the store through the narrow [`DocumentStore`]
//! capability: merge-upsert at a path, append to a collection, paginated id
//! listing and batched deletes. Paths are built from the templates in
//! [`paths`], parameterized by language, id and group id.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::DocStoreResult;
use crate::models::ItemType;
use crate::util::create_date;

pub mod http;

pub use http::HttpDocumentStore;

// =============================================================================
// Path templates
// =============================================================================

/// Path construction for published documents.
pub mod paths {
    use crate::models::ItemType;

    /// Document of one language, `languages/{lang}`.
    pub fn language_doc(lang: &str) -> String {
        format!("languages/{lang}")
    }

    /// Entity collection of one language, `languages/{lang}/<collection>`.
    pub fn collection(lang: &str, item_type: ItemType) -> String {
        format!("languages/{lang}/{}", item_type.collection())
    }

    /// Entity document, `languages/{lang}/<collection>/{id}`.
    pub fn entity_doc(lang: &str, item_type: ItemType, id: &str) -> String {
        format!("languages/{lang}/{}/{id}", item_type.collection())
    }

    /// Ordered items of a published group document.
    pub fn group_items_collection(lang: &str, group_doc_id: &str) -> String {
        format!("languages/{lang}/groups/{group_doc_id}/items")
    }

    /// One ordered item of a published group document.
    pub fn group_item_doc(lang: &str, group_doc_id: &str, id: &str) -> String {
        format!("languages/{lang}/groups/{group_doc_id}/items/{id}")
    }

    /// Snapshot of the latest import, shared by observers.
    pub fn imports_info() -> String {
        "imports/info".to_string()
    }

    /// Snapshot of one import run.
    pub fn import_doc(import_id: &str) -> String {
        format!("imports/{import_id}")
    }

    /// Log collection of one import run.
    pub fn import_logs(import_id: &str) -> String {
        format!("imports/{import_id}/logs")
    }
}

// =============================================================================
// Key conversion
// =============================================================================

/// Normalize date-valued keys to RFC 3339 strings; unparseable values become
/// null so stale values cannot survive a merge-upsert.
pub fn convert_date_keys(doc: &mut Value, keys: &[&str]) {
    let Some(map) = doc.as_object_mut() else { return };
    for key in keys {
        if let Some(value) = map.get(*key) {
            let converted = match create_date(Some(value)) {
                Some(dt) => Value::String(dt.to_rfc3339()),
                None => Value::Null,
            };
            map.insert((*key).to_string(), converted);
        }
    }
}

/// Normalize geo-point keys to `{lat, lng}` numbers; anything non-numeric
/// becomes null.
pub fn convert_geo_keys(doc: &mut Value, keys: &[&str]) {
    let Some(map) = doc.as_object_mut() else { return };
    for key in keys {
        if let Some(value) = map.get(*key) {
            map.insert((*key).to_string(), to_geo(value));
        }
    }
}

fn to_geo(value: &Value) -> Value {
    let lat = numeric(value.get("lat"));
    let lng = numeric(value.get("lng"));
    match (lat, lng) {
        (Some(lat), Some(lng)) => serde_json::json!({ "lat": lat, "lng": lng }),
        _ => Value::Null,
    }
}

fn numeric(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    value.as_str().and_then(|s| s.trim().parse::<f64>().ok())
}

// =============================================================================
// Capability
// =============================================================================

/// Narrow document-store capability consumed at publish/prune time.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Merge-upsert `doc` at `path`. Empty documents are skipped.
    async fn save(&self, path: &str, doc: Value) -> DocStoreResult<()>;

    /// Append `doc` to the collection at `path` under a generated id.
    async fn add(&self, path: &str, doc: Value) -> DocStoreResult<()>;

    /// Ids of all documents in a collection, fetched page by page.
    async fn list_ids(&self, collection: &str) -> DocStoreResult<Vec<String>>;

    /// Delete documents by id, committed in fixed-size batches.
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> DocStoreResult<()>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// In-memory document store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document at `path`, if published.
    pub fn document(&self, path: &str) -> Option<Value> {
        self.documents.lock().expect("docstore map poisoned").get(path).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.lock().expect("docstore map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn merge_fields(existing: Option<&Value>, doc: Value) -> Value {
    let mut merged: Map<String, Value> = existing
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Value::Object(fields) = doc {
        for (key, value) in fields {
            merged.insert(key, value);
        }
    }
    Value::Object(merged)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn save(&self, path: &str, doc: Value) -> DocStoreResult<()> {
        if doc.as_object().map(Map::is_empty).unwrap_or(true) {
            return Ok(());
        }
        let mut documents = self.documents.lock().expect("docstore map poisoned");
        let merged = merge_fields(documents.get(path), doc);
        documents.insert(path.to_string(), merged);
        Ok(())
    }

    async fn add(&self, path: &str, doc: Value) -> DocStoreResult<()> {
        if doc.as_object().map(Map::is_empty).unwrap_or(true) {
            return Ok(());
        }
        let id = Uuid::new_v4().to_string();
        self.documents
            .lock()
            .expect("docstore map poisoned")
            .insert(format!("{path}/{id}"), doc);
        Ok(())
    }

    async fn list_ids(&self, collection: &str) -> DocStoreResult<Vec<String>> {
        let prefix = format!("{collection}/");
        let documents = self.documents.lock().expect("docstore map poisoned");
        Ok(documents
            .keys()
            .filter_map(|path| {
                let rest = path.strip_prefix(&prefix)?;
                // Direct children only; subcollection documents keep their slashes.
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> DocStoreResult<()> {
        let mut documents = self.documents.lock().expect("docstore map poisoned");
        for id in ids {
            documents.remove(&format!("{collection}/{id}"));
        }
        Ok(())
    }
}

/// Entity collection path for a language, kept close to the trait so callers
/// do not rebuild format strings.
pub fn entity_collection(lang: &str, item_type: ItemType) -> String {
    paths::collection(lang, item_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_merges_fields() {
        let store = MemoryDocumentStore::new();
        store.save("languages/en/venues/v1", json!({ "name": "Hall" })).await.unwrap();
        store.save("languages/en/venues/v1", json!({ "order": 2 })).await.unwrap();
        assert_eq!(
            store.document("languages/en/venues/v1"),
            Some(json!({ "name": "Hall", "order": 2 }))
        );
    }

    #[tokio::test]
    async fn test_save_skips_empty() {
        let store = MemoryDocumentStore::new();
        store.save("languages/en/venues/v1", json!({})).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_ids_direct_children_only() {
        let store = MemoryDocumentStore::new();
        store.save("languages/en/groups/g1", json!({ "a": 1 })).await.unwrap();
        store.save("languages/en/groups/g1/items/g1:0", json!({ "b": 2 })).await.unwrap();
        store.save("languages/en/groups/g2", json!({ "a": 1 })).await.unwrap();
        let ids = store.list_ids("languages/en/groups").await.unwrap();
        assert_eq!(ids, vec!["g1", "g2"]);
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let store = MemoryDocumentStore::new();
        store.save("languages/en/venues/v1", json!({ "a": 1 })).await.unwrap();
        store.save("languages/en/venues/v2", json!({ "a": 1 })).await.unwrap();
        store
            .delete_by_ids("languages/en/venues", &["v1".to_string()])
            .await
            .unwrap();
        assert_eq!(store.list_ids("languages/en/venues").await.unwrap(), vec!["v2"]);
    }

    #[test]
    fn test_convert_date_keys() {
        let mut doc = json!({ "timeFrom": "2026-06-05 10:00", "timeTo": "garbage", "name": "x" });
        convert_date_keys(&mut doc, &["timeFrom", "timeTo"]);
        assert_eq!(doc["timeFrom"], json!("2026-06-05T10:00:00+00:00"));
        assert_eq!(doc["timeTo"], Value::Null);
        assert_eq!(doc["name"], json!("x"));
    }

    #[test]
    fn test_convert_geo_keys() {
        let mut doc = json!({ "location": { "lat": "50.1", "lng": 14.4 } });
        convert_geo_keys(&mut doc, &["location"]);
        assert_eq!(doc["location"], json!({ "lat": 50.1, "lng": 14.4 }));

        let mut bad = json!({ "location": { "lat": "fifty", "lng": 14.4 } });
        convert_geo_keys(&mut bad, &["location"]);
        assert_eq!(bad["location"], Value::Null);
    }

    #[test]
    fn test_paths() {
        assert_eq!(paths::entity_doc("en", ItemType::VenueCategory, "c1"), "languages/en/venueCategories/c1");
        assert_eq!(paths::group_item_doc("cs", "g1:SESSION", "g1:SESSION:0"), "languages/cs/groups/g1:SESSION/items/g1:SESSION:0");
        assert_eq!(paths::import_logs("abc"), "imports/abc/logs");
    }
}
