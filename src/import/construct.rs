//! Per-type construction: fan out over tracked ids × configured languages,
//! resolve each entity and build the denormalized output document.
//!
//! Every outcome is collected before acting, so one item's failure never
//! aborts a sibling. Constructed items are post-processed in fixed-size
//! chunks to bound concurrent image-reupload calls.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;

use super::resolver::populate_one;
use super::EventImporter;
use crate::error::{ImportError, ImportErrorKind};
use crate::models::{Image, Item, ItemType};
use crate::store::{get_string_list, keys};
use crate::util::settle;

/// Constructed items processed per image-reupload round.
pub const REUPLOAD_CHUNK_SIZE: usize = 20;

/// Context handed to a type-specific builder.
pub struct BuildContext {
    pub id: String,
    pub language_code: String,
    /// Position of the id in the tracked id list.
    pub index: usize,
}

/// Build output documents for every tracked id of `item_type`, in every
/// configured language.
///
/// A builder returns the documents derived from one resolved entity (usually
/// one; a group yields up to two). Missing staged data and builder failures
/// become ledger errors that mark the id invalid for the type.
pub async fn construct_items<F, Fut>(
    importer: &Arc<EventImporter>,
    item_type: ItemType,
    build: F,
) -> Vec<Item>
where
    F: Fn(Item, BuildContext) -> Fut,
    Fut: Future<Output = Result<Vec<Item>, ImportError>>,
{
    let ids = get_string_list(importer.store.as_ref(), &keys::ids(item_type))
        .await
        .unwrap_or_default();

    let build = &build;
    let mut futures = Vec::with_capacity(ids.len() * importer.settings.languages.len());
    for (index, id) in ids.iter().enumerate() {
        for language in &importer.settings.languages {
            futures.push(async move {
                let resolved = populate_one(importer, item_type, Some(id), language).await;
                let Some(item) = resolved else {
                    return Err(ImportError::new(ImportErrorKind::NoItemData)
                        .with_item(Item::placeholder(item_type, id, language)));
                };
                build(
                    item,
                    BuildContext {
                        id: id.clone(),
                        language_code: language.clone(),
                        index,
                    },
                )
                .await
            });
        }
    }

    let settled = settle(futures).await;
    importer.record_errors_marking_invalid(settled.errors);
    let mut items: Vec<Item> = settled.results.into_iter().flatten().collect();

    if importer.settings.reupload_image.is_some() {
        for chunk in items.chunks_mut(REUPLOAD_CHUNK_SIZE) {
            join_all(chunk.iter_mut().map(|item| reupload_images(importer, item))).await;
        }
    }

    items
}

/// Validate constructed items; failures mark the entity invalid and the item
/// drops out of the publish set.
pub fn validate_items(importer: &EventImporter, items: Vec<Item>) -> Vec<Item> {
    let mut valid = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for item in items {
        match importer.validator.validate(&item) {
            Ok(()) => valid.push(item),
            Err(error) => errors.push(error),
        }
    }
    importer.record_errors_marking_invalid(errors);
    valid
}

// =============================================================================
// Image reupload
// =============================================================================

fn images_of(item: &Item) -> Vec<Image> {
    match item.item_type {
        ItemType::Performer | ItemType::Session | ItemType::Venue | ItemType::Group => item
            .data
            .get("images")
            .and_then(serde_json::Value::as_array)
            .map(|xs| {
                xs.iter()
                    .filter_map(|x| serde_json::from_value(x.clone()).ok())
                    .collect()
            })
            .unwrap_or_default(),
        ItemType::Day | ItemType::Language | ItemType::VenueCategory => Vec::new(),
    }
}

fn set_images(item: &mut Item, images: Vec<Image>) {
    match item.item_type {
        ItemType::Performer | ItemType::Session | ItemType::Venue | ItemType::Group => {
            if let Some(map) = item.data.as_object_mut() {
                map.insert(
                    "images".to_string(),
                    serde_json::to_value(images).unwrap_or_default(),
                );
            }
        }
        ItemType::Day | ItemType::Language | ItemType::VenueCategory => {}
    }
}

async fn reupload_images(importer: &EventImporter, item: &mut Item) {
    let Some(hook) = importer.settings.reupload_image.clone() else {
        return;
    };
    let images = images_of(item);
    if images.is_empty() {
        return;
    }
    let snapshot = item.clone();
    let hook = hook.as_ref();
    let snapshot = &snapshot;
    let settled = settle(
        images
            .iter()
            .map(|image| async move {
                hook.reupload(image).await.map_err(|cause| {
                    ImportError::new(ImportErrorKind::ImageReuploadFailed)
                        .with_item(snapshot.clone())
                        .with_cause(cause)
                })
            })
            .collect(),
    )
    .await;
    for warning in settled.errors {
        importer.record_warning(warning);
    }
    let reuploaded: Vec<Image> = settled.results.into_iter().flatten().collect();
    set_images(item, reuploaded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::docstore::MemoryDocumentStore;
    use crate::import::ingest::add_item;
    use crate::import::{create_importer, ImageReuploader, Settings};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn importer_with(settings: Settings) -> Arc<EventImporter> {
        create_importer(
            settings,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
        .await
        .unwrap()
    }

    fn passthrough(
        item: Item,
        ctx: BuildContext,
    ) -> impl Future<Output = Result<Vec<Item>, ImportError>> {
        async move {
            let mut data = item.data.clone();
            data["id"] = json!(ctx.id);
            Ok(vec![Item::new(item.item_type, ctx.id, ctx.language_code, data)])
        }
    }

    #[tokio::test]
    async fn test_cross_product_of_ids_and_languages() {
        let importer = importer_with(Settings::new(vec!["en".into(), "cs".into()], "en")).await;
        for id in ["d1", "d2"] {
            add_item(
                &importer,
                &Item::new(ItemType::Day, id, "en", json!({ "id": id, "name": id })),
            )
            .await
            .unwrap();
        }
        let constructed = construct_items(&importer, ItemType::Day, passthrough).await;
        assert_eq!(constructed.len(), 4);
        let cs: Vec<_> = constructed.iter().filter(|x| x.language == "cs").collect();
        assert_eq!(cs.len(), 2);
        assert!(importer.errors_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_marks_id_invalid() {
        let importer = importer_with(Settings::new(vec!["en".into()], "en")).await;
        // Track an id without staging any payload for it.
        importer
            .store
            .set(&keys::ids(ItemType::Day), json!(["ghost"]))
            .await
            .unwrap();
        let constructed = construct_items(&importer, ItemType::Day, passthrough).await;
        assert!(constructed.is_empty());
        assert!(importer.is_invalid(ItemType::Day, "ghost"));
        let errors = importer.errors_snapshot();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ImportErrorKind::NoItemData);
    }

    #[tokio::test]
    async fn test_builder_failure_marks_invalid_but_spares_siblings() {
        let importer = importer_with(Settings::new(vec!["en".into()], "en")).await;
        for id in ["ok", "bad"] {
            add_item(
                &importer,
                &Item::new(ItemType::Venue, id, "en", json!({ "id": id })),
            )
            .await
            .unwrap();
        }
        let constructed = construct_items(&importer, ItemType::Venue, |item, ctx| async move {
            if ctx.id == "bad" {
                return Err(ImportError::new(ImportErrorKind::InvalidItemData).with_item(item));
            }
            Ok(vec![item])
        })
        .await;
        assert_eq!(constructed.len(), 1);
        assert_eq!(constructed[0].id, "ok");
        assert!(importer.is_invalid(ItemType::Venue, "bad"));
        assert!(!importer.is_invalid(ItemType::Venue, "ok"));
    }

    struct RewritingReuploader;

    #[async_trait]
    impl ImageReuploader for RewritingReuploader {
        async fn reupload(&self, image: &Image) -> Result<Option<Image>, String> {
            if image.uri.contains("broken") {
                return Err("fetch failed".to_string());
            }
            Ok(Some(Image {
                uri: image.uri.replace("cdn.old", "cdn.new"),
                title: image.title.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_reupload_rewrites_and_warns() {
        let mut settings = Settings::new(vec!["en".into()], "en");
        settings.reupload_image = Some(Arc::new(RewritingReuploader));
        let importer = importer_with(settings).await;
        add_item(
            &importer,
            &Item::new(
                ItemType::Performer,
                "p1",
                "en",
                json!({
                    "id": "p1",
                    "images": [
                        { "uri": "https://cdn.old/a.jpg" },
                        { "uri": "https://cdn.old/broken.jpg" }
                    ]
                }),
            ),
        )
        .await
        .unwrap();

        let constructed = construct_items(&importer, ItemType::Performer, passthrough).await;
        assert_eq!(constructed.len(), 1);
        let images = constructed[0].data["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["uri"], json!("https://cdn.new/a.jpg"));

        let warnings = importer.warnings_snapshot();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, ImportErrorKind::ImageReuploadFailed);
        // A failed reupload is advisory; the performer itself stays valid.
        assert!(!importer.is_invalid(ItemType::Performer, "p1"));
    }

    #[tokio::test]
    async fn test_validate_items_filters_and_marks() {
        let importer = importer_with(Settings::new(vec!["en".into()], "en")).await;
        let good = Item::new(ItemType::Venue, "v1", "en", json!({ "id": "v1", "name": "Hall" }));
        let bad = Item::new(ItemType::Venue, "v2", "en", json!({ "id": "v2", "name": 42 }));
        let valid = validate_items(&importer, vec![good.clone(), bad]);
        assert_eq!(valid, vec![good]);
        assert!(importer.is_invalid(ItemType::Venue, "v2"));
    }
}
