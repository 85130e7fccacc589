//! Reference resolution: complete per-language data for staged ids.
//!
//! A resolved entity is the language payload deep-merged over its
//! default-language counterpart. References to entities already marked
//! invalid resolve to nothing and leave a single warning per occurrence.

use futures::future::join_all;

use super::EventImporter;
use crate::error::{ImportError, ImportErrorKind};
use crate::merge::deep_merge;
use crate::models::{Item, ItemType};
use crate::store::get_item;

async fn lookup(
    importer: &EventImporter,
    item_type: ItemType,
    id: &str,
    language: &str,
) -> Option<Item> {
    if importer.is_invalid(item_type, id) {
        importer.record_warning(ImportError::new(ImportErrorKind::InvalidItemReference));
        return None;
    }
    let store = importer.store.as_ref();
    // A failed lookup behaves like missing data; it never aborts siblings.
    let language_item = get_item(store, item_type, id, language).await.ok().flatten();
    let default_item = get_item(store, item_type, id, &importer.settings.default_language)
        .await
        .ok()
        .flatten();
    if language_item.is_none() && default_item.is_none() {
        return None;
    }
    let default_data = default_item.map(|x| x.data).unwrap_or(serde_json::Value::Null);
    let language_data = language_item.map(|x| x.data).unwrap_or(serde_json::Value::Null);
    Some(Item::new(
        item_type,
        id,
        language,
        deep_merge(&default_data, &language_data),
    ))
}

/// Resolve a single optional reference.
pub async fn populate_one(
    importer: &EventImporter,
    item_type: ItemType,
    id: Option<&str>,
    language: &str,
) -> Option<Item> {
    lookup(importer, item_type, id?, language).await
}

/// Resolve a list of references, dropping unresolved ones (no gaps).
pub async fn populate_many(
    importer: &EventImporter,
    item_type: ItemType,
    ids: &[String],
    language: &str,
) -> Vec<Item> {
    join_all(ids.iter().map(|id| lookup(importer, item_type, id, language)))
        .await
        .into_iter()
        .flatten()
        .collect()
}
