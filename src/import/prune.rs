//! Pruning: delete published documents no longer referenced by the current
//! run.
//!
//! The delete set for a type and language is everything currently in the
//! target collection minus the ids seen this run that were not invalidated.
//! Deletions are committed in fixed-size batches by the document store.

use futures::future::join_all;
use std::sync::Arc;

use super::probe;
use super::EventImporter;
use crate::error::{DocStoreError, ImportError, ImportErrorKind};
use crate::docstore::paths;
use crate::models::ItemType;
use crate::store::{get_string_list, keys};
use crate::util::difference;

/// Types subject to pruning; languages are never pruned.
const PRUNED_TYPES: [ItemType; 6] = [
    ItemType::Performer,
    ItemType::Session,
    ItemType::Venue,
    ItemType::Group,
    ItemType::Day,
    ItemType::VenueCategory,
];

/// Ids of a type that survive this run: staged minus invalid. Groups keep
/// the published typed-document ids instead of the staged ids.
async fn keep_ids(importer: &EventImporter, item_type: ItemType) -> Vec<String> {
    let store = importer.store.as_ref();
    if item_type == ItemType::Group {
        return get_string_list(store, &keys::group_doc_ids())
            .await
            .unwrap_or_default();
    }
    let staged = get_string_list(store, &keys::ids(item_type))
        .await
        .unwrap_or_default();
    let invalid = importer.invalid_ids(item_type);
    difference(&staged, &invalid)
}

async fn prune_collection(
    importer: &Arc<EventImporter>,
    item_type: ItemType,
    language: &str,
) -> Result<(), DocStoreError> {
    let keep = keep_ids(importer, item_type).await;
    let collection = paths::collection(language, item_type);
    let existing = importer.docstore.list_ids(&collection).await?;
    let delete = difference(&existing, &keep);
    for id in &delete {
        importer.record_warning(
            ImportError::new(ImportErrorKind::DeletedDatabaseItem)
                .with_cause(format!("{collection}/{id}")),
        );
    }
    importer.docstore.delete_by_ids(&collection, &delete).await
}

/// Delete every document of every pruned type that this run did not keep.
pub async fn delete_unreferenced(importer: &Arc<EventImporter>) -> Result<(), DocStoreError> {
    probe::deleting_unreferenced_documents(importer).await;
    for item_type in PRUNED_TYPES {
        let outcomes = join_all(
            importer
                .settings
                .languages
                .iter()
                .map(|language| prune_collection(importer, item_type, language)),
        )
        .await;
        for outcome in outcomes {
            outcome?;
        }
    }
    Ok(())
}
