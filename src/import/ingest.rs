//! Ingestion: staging items and maintaining the derived reverse indices.
//!
//! Reverse references are derived incrementally from forward-declared
//! relations while items arrive, so no second ingestion pass is needed. The
//! index updates are read-modify-write on shared lists, which is why a batch
//! is processed strictly one item at a time.

use std::sync::Arc;

use super::progress::Stage;
use super::EventImporter;
use crate::error::StoreResult;
use crate::models::{Item, ItemType};
use crate::store::{get_string_list, keys, StagingStore};

/// Append `value` to the list at `key`, deduplicated.
async fn add_uniq(store: &dyn StagingStore, key: &str, value: &str) -> StoreResult<()> {
    let mut ids = get_string_list(store, key).await?;
    if !ids.iter().any(|x| x == value) {
        ids.push(value.to_string());
        store.set(key, serde_json::to_value(ids)?).await?;
    }
    Ok(())
}

/// Stage one item and update every index it participates in.
pub async fn add_item(importer: &Arc<EventImporter>, item: &Item) -> StoreResult<()> {
    importer.set_stage(Stage::CollectingData);
    let store = importer.store.as_ref();

    // The entity itself, `type:id:language`.
    store
        .set(
            &keys::entity(item.item_type, &item.id, &item.language),
            serde_json::to_value(item)?,
        )
        .await?;

    // Per-type id index.
    add_uniq(store, &keys::ids(item.item_type), &item.id).await?;

    if item.item_type == ItemType::Session {
        let performer_ids = item.data_str_vec("performerIds");

        // Sessions a performer appears in.
        for performer_id in &performer_ids {
            add_uniq(store, &keys::performer_sessions(performer_id), &item.id).await?;
        }

        // Venues a performer appears at, derived from the session venue.
        if let Some(venue_id) = item.data_str("venueId") {
            for performer_id in &performer_ids {
                add_uniq(store, &keys::performer_venues(performer_id), venue_id).await?;
            }
        }

        // Parent relation declared on the parent side.
        for subsession_id in item.data_str_vec("subsessionIds") {
            add_uniq(store, &keys::session_parent(&subsession_id), &item.id).await?;
        }

        // Parent relation declared on the child side.
        if let Some(parent_id) = item.data_str("parentId") {
            add_uniq(store, &keys::session_parent(&item.id), parent_id).await?;
        }

        if let Some(group_id) = item.data_str("groupId") {
            add_uniq(store, &keys::group_sessions(group_id), &item.id).await?;
        }
    }

    if item.item_type == ItemType::Group {
        for performer_id in item.data_str_vec("performerIds") {
            add_uniq(store, &keys::group_performers(&item.id), &performer_id).await?;
        }
        for session_id in item.data_str_vec("sessionIds") {
            add_uniq(store, &keys::group_sessions(&item.id), &session_id).await?;
        }
    }

    if item.item_type == ItemType::Performer {
        if let Some(group_id) = item.data_str("groupId") {
            add_uniq(store, &keys::group_performers(group_id), &item.id).await?;
        }
    }

    Ok(())
}

/// Stage a batch, one item at a time, yielding to the scheduler between
/// items. The index maintenance has no atomic increment, so ingestion trades
/// throughput for correctness here.
pub async fn add_items(importer: &Arc<EventImporter>, items: &[Item]) -> StoreResult<()> {
    for item in items {
        tokio::task::yield_now().await;
        add_item(importer, item).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryDocumentStore;
    use crate::import::{create_importer, Settings};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn importer() -> Arc<EventImporter> {
        create_importer(
            Settings::new(vec!["en".into(), "cs".into()], "en"),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_item_stages_entity_and_index() {
        let importer = importer().await;
        let item = Item::new(ItemType::Venue, "v1", "en", json!({ "id": "v1", "name": "Hall" }));
        add_item(&importer, &item).await.unwrap();

        let staged = crate::store::get_item(importer.store.as_ref(), ItemType::Venue, "v1", "en")
            .await
            .unwrap();
        assert_eq!(staged, Some(item));
        let ids = get_string_list(importer.store.as_ref(), &keys::ids(ItemType::Venue))
            .await
            .unwrap();
        assert_eq!(ids, vec!["v1"]);
        assert_eq!(importer.progress(), 0.05);
    }

    #[tokio::test]
    async fn test_readd_overwrites_without_duplicating_index() {
        let importer = importer().await;
        let first = Item::new(ItemType::Venue, "v1", "en", json!({ "id": "v1", "name": "First" }));
        let second = Item::new(ItemType::Venue, "v1", "en", json!({ "id": "v1", "name": "Second" }));
        add_items(&importer, &[first, second.clone()]).await.unwrap();

        let staged = crate::store::get_item(importer.store.as_ref(), ItemType::Venue, "v1", "en")
            .await
            .unwrap();
        assert_eq!(staged, Some(second));
        let ids = get_string_list(importer.store.as_ref(), &keys::ids(ItemType::Venue))
            .await
            .unwrap();
        assert_eq!(ids, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_session_builds_reverse_indices() {
        let importer = importer().await;
        let session = Item::new(
            ItemType::Session,
            "s1",
            "en",
            json!({
                "id": "s1",
                "performerIds": ["p1", "p2"],
                "venueId": "v1",
                "subsessionIds": ["s2"],
                "groupId": "g1"
            }),
        );
        add_item(&importer, &session).await.unwrap();

        let store = importer.store.as_ref();
        assert_eq!(get_string_list(store, &keys::performer_sessions("p1")).await.unwrap(), vec!["s1"]);
        assert_eq!(get_string_list(store, &keys::performer_sessions("p2")).await.unwrap(), vec!["s1"]);
        assert_eq!(get_string_list(store, &keys::performer_venues("p1")).await.unwrap(), vec!["v1"]);
        assert_eq!(get_string_list(store, &keys::session_parent("s2")).await.unwrap(), vec!["s1"]);
        assert_eq!(get_string_list(store, &keys::group_sessions("g1")).await.unwrap(), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_child_declared_parent() {
        let importer = importer().await;
        let child = Item::new(
            ItemType::Session,
            "s2",
            "en",
            json!({ "id": "s2", "parentId": "s1" }),
        );
        add_item(&importer, &child).await.unwrap();
        let parents = get_string_list(importer.store.as_ref(), &keys::session_parent("s2"))
            .await
            .unwrap();
        assert_eq!(parents, vec!["s1"]);
    }

    #[tokio::test]
    async fn test_group_and_performer_memberships() {
        let importer = importer().await;
        let group = Item::new(
            ItemType::Group,
            "g1",
            "en",
            json!({ "id": "g1", "performerIds": ["p1"], "sessionIds": ["s1"] }),
        );
        let performer = Item::new(
            ItemType::Performer,
            "p2",
            "en",
            json!({ "id": "p2", "groupId": "g1" }),
        );
        add_items(&importer, &[group, performer]).await.unwrap();

        let store = importer.store.as_ref();
        assert_eq!(get_string_list(store, &keys::group_performers("g1")).await.unwrap(), vec!["p1", "p2"]);
        assert_eq!(get_string_list(store, &keys::group_sessions("g1")).await.unwrap(), vec!["s1"]);
    }
}
