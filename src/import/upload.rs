//! Publish phase: construct, validate and upsert every entity type, then
//! prune unreferenced documents.
//!
//! Types are published one by one; progress advances with each completed
//! step. Individual document writes are gathered with partial-failure
//! semantics, so a single rejected write never stops the run.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

use super::bounds::report_sessions_out_of_bounds;
use super::construct::{construct_items, validate_items};
use super::probe;
use super::progress::{save_importer_state, saving_progress, Stage};
use super::prune::delete_unreferenced;
use super::resolver::{populate_many, populate_one};
use super::{ingest, EventImporter};
use crate::docstore::{convert_date_keys, convert_geo_keys, paths};
use crate::error::{DocStoreError, ImportError, ImportErrorKind, StoreError};
use crate::models::{native_language_name, GroupType, Item, ItemType, VenueCategoryLayout};
use crate::sanitize::{sanitize_custom_fields, sanitize_links, strip_html};
use crate::store::{get_string_list, keys};
use crate::util::{pluck, run_bounded, uniq};

/// Steps of the publish phase (seven entity types plus pruning).
pub const UPLOAD_STEPS: usize = 8;

/// Concurrently pending document writes per publish fan-out.
const SAVE_CONCURRENCY: usize = 20;

/// Write all documents through the bounded gate; rejected writes surface via
/// pruning/observers on the next run, never by aborting this one.
async fn save_all<F>(writes: Vec<F>)
where
    F: std::future::Future<Output = crate::error::DocStoreResult<()>>,
{
    let _ = run_bounded(SAVE_CONCURRENCY, writes).await;
}

/// Failures that abort the publish phase.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("staging store error: {0}")]
    Store(#[from] StoreError),

    #[error("document store error: {0}")]
    DocStore(#[from] DocStoreError),
}

fn object(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Strip markup from a staged description, leaving absent values alone.
fn cleaned_description(data: &Map<String, Value>) -> Option<Value> {
    match data.get("description") {
        Some(Value::String(text)) if !text.is_empty() => {
            Some(Value::String(strip_html(text).trim().to_string()))
        }
        other => other.cloned(),
    }
}

// =============================================================================
// Languages
// =============================================================================

async fn save_languages(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    let languages: Vec<Item> = importer
        .settings
        .languages
        .iter()
        .map(|code| {
            Item::new(
                ItemType::Language,
                code,
                code,
                json!({
                    "id": code,
                    "isDefault": *code == importer.settings.default_language,
                    "name": native_language_name(code).unwrap_or(code),
                }),
            )
        })
        .collect();
    ingest::add_items(importer, &languages).await?;
    probe::saving_items_of_type(importer, ItemType::Language).await;

    let validated = validate_items(importer, languages);
    save_all(
        validated
            .iter()
            .map(|item| {
                let path = paths::language_doc(&item.id);
                let doc = item.data.clone();
                async move { importer.docstore.save(&path, doc).await }
            })
            .collect(),
    )
    .await;
    probe::saved_items_of_type(importer, ItemType::Language).await;
    Ok(())
}

// =============================================================================
// Days
// =============================================================================

async fn save_days(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    probe::saving_items_of_type(importer, ItemType::Day).await;
    let constructed = construct_items(importer, ItemType::Day, |item, ctx| async move {
        let mut data = object(item.data);
        data.insert("id".into(), json!(ctx.id));
        Ok(vec![Item::new(ItemType::Day, ctx.id, ctx.language_code, Value::Object(data))])
    })
    .await;

    let validated = validate_items(importer, constructed);
    save_all(
        validated
            .iter()
            .map(|item| {
                let mut doc = item.data.clone();
                convert_date_keys(&mut doc, &["timeFrom", "timeTo"]);
                let path = paths::entity_doc(&item.language, ItemType::Day, &item.id);
                async move { importer.docstore.save(&path, doc).await }
            })
            .collect(),
    )
    .await;
    probe::saved_items_of_type(importer, ItemType::Day).await;
    Ok(())
}

// =============================================================================
// Venue categories
// =============================================================================

async fn save_venue_categories(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    probe::saving_items_of_type(importer, ItemType::VenueCategory).await;
    let constructed = construct_items(importer, ItemType::VenueCategory, |item, ctx| async move {
        let layout = VenueCategoryLayout::from_value(item.data.get("layout"));
        let mut data = object(item.data);
        data.insert("id".into(), json!(ctx.id));
        data.insert("layout".into(), json!(layout.as_str()));
        Ok(vec![Item::new(ItemType::VenueCategory, ctx.id, ctx.language_code, Value::Object(data))])
    })
    .await;

    let validated = validate_items(importer, constructed);
    save_all(
        validated
            .iter()
            .map(|item| {
                let path = paths::entity_doc(&item.language, ItemType::VenueCategory, &item.id);
                let doc = item.data.clone();
                async move { importer.docstore.save(&path, doc).await }
            })
            .collect(),
    )
    .await;
    probe::saved_items_of_type(importer, ItemType::VenueCategory).await;
    Ok(())
}

// =============================================================================
// Venues
// =============================================================================

async fn save_venues(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    probe::saving_items_of_type(importer, ItemType::Venue).await;
    let constructed = construct_items(importer, ItemType::Venue, |item, ctx| {
        let importer = importer.clone();
        async move {
            let custom_fields = sanitize_custom_fields(item.data.get("customFields"));
            let links = sanitize_links(item.data.get("links"));
            let category_ids = item.data_str_vec("categoryIds");
            let categories =
                populate_many(&importer, ItemType::VenueCategory, &category_ids, &ctx.language_code)
                    .await;
            if categories.is_empty() {
                importer.record_warning(
                    ImportError::new(ImportErrorKind::MissingVenueCategories).with_item(item.clone()),
                );
            }

            let mut data = object(item.data);
            data.insert("id".into(), json!(ctx.id));
            if data.get("order").map_or(true, Value::is_null) {
                data.insert("order".into(), json!(ctx.index));
            }
            data.remove("categoryIds");
            data.insert(
                "categories".into(),
                Value::Array(
                    categories
                        .iter()
                        .map(|category| {
                            json!({
                                "id": category.id,
                                "name": category.data_str("name").unwrap_or(""),
                                "color": category.data_str("color").unwrap_or(""),
                                "iconUnicode": category.data_str("iconUnicode").unwrap_or(""),
                                "layout": VenueCategoryLayout::from_value(category.data.get("layout")).as_str(),
                            })
                        })
                        .collect(),
                ),
            );
            data.insert("customFields".into(), serde_json::to_value(custom_fields).unwrap_or_default());
            data.insert("links".into(), serde_json::to_value(links).unwrap_or_default());
            Ok(vec![Item::new(ItemType::Venue, ctx.id, ctx.language_code, Value::Object(data))])
        }
    })
    .await;

    let validated = validate_items(importer, constructed);
    save_all(
        validated
            .iter()
            .map(|item| {
                let mut doc = item.data.clone();
                convert_geo_keys(&mut doc, &["location"]);
                let path = paths::entity_doc(&item.language, ItemType::Venue, &item.id);
                async move { importer.docstore.save(&path, doc).await }
            })
            .collect(),
    )
    .await;
    probe::saved_items_of_type(importer, ItemType::Venue).await;
    Ok(())
}

// =============================================================================
// Performers
// =============================================================================

async fn save_performers(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    probe::saving_items_of_type(importer, ItemType::Performer).await;
    let constructed = construct_items(importer, ItemType::Performer, |item, ctx| {
        let importer = importer.clone();
        async move {
            let store = importer.store.as_ref();
            let referenced_session_ids = get_string_list(store, &keys::performer_sessions(&ctx.id))
                .await
                .unwrap_or_default();
            let sessions =
                populate_many(&importer, ItemType::Session, &referenced_session_ids, &ctx.language_code)
                    .await;
            let session_ids = pluck(&sessions, |x| x.data_str("id").map(str::to_owned));

            let referenced_venue_ids = get_string_list(store, &keys::performer_venues(&ctx.id))
                .await
                .unwrap_or_default();
            let venues =
                populate_many(&importer, ItemType::Venue, &referenced_venue_ids, &ctx.language_code)
                    .await;
            let venue_ids = pluck(&venues, |x| Some(x.id.clone()));

            let custom_fields = sanitize_custom_fields(item.data.get("customFields"));
            let links = sanitize_links(item.data.get("links"));

            let mut data = object(item.data);
            data.insert("id".into(), json!(ctx.id));
            if let Some(description) = cleaned_description(&data) {
                data.insert("description".into(), description);
            }
            data.insert("sessionIds".into(), json!(session_ids));
            data.insert("venueIds".into(), json!(venue_ids));
            data.insert("customFields".into(), serde_json::to_value(custom_fields).unwrap_or_default());
            data.insert("links".into(), serde_json::to_value(links).unwrap_or_default());
            Ok(vec![Item::new(ItemType::Performer, ctx.id, ctx.language_code, Value::Object(data))])
        }
    })
    .await;

    let validated = validate_items(importer, constructed);
    save_all(
        validated
            .iter()
            .map(|item| {
                let path = paths::entity_doc(&item.language, ItemType::Performer, &item.id);
                let doc = item.data.clone();
                async move { importer.docstore.save(&path, doc).await }
            })
            .collect(),
    )
    .await;
    probe::saved_items_of_type(importer, ItemType::Performer).await;
    Ok(())
}

// =============================================================================
// Sessions
// =============================================================================

async fn save_sessions(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    probe::saving_items_of_type(importer, ItemType::Session).await;
    let constructed = construct_items(importer, ItemType::Session, |item, ctx| {
        let importer = importer.clone();
        async move {
            let store = importer.store.as_ref();
            let performers = populate_many(
                &importer,
                ItemType::Performer,
                &item.data_str_vec("performerIds"),
                &ctx.language_code,
            )
            .await;
            let venue =
                populate_one(&importer, ItemType::Venue, item.data_str("venueId"), &ctx.language_code)
                    .await;
            let subsession_ids: Vec<String> = populate_many(
                &importer,
                ItemType::Session,
                &item.data_str_vec("subsessionIds"),
                &ctx.language_code,
            )
            .await
            .into_iter()
            .map(|x| x.id)
            .collect();
            let parent_ids = get_string_list(store, &keys::session_parent(&item.id))
                .await
                .unwrap_or_default();
            let parents =
                populate_many(&importer, ItemType::Session, &parent_ids, &ctx.language_code).await;
            let parent = parents.first();

            let performer_names = pluck(&performers, |x| x.data_str("name").map(str::to_owned));
            let performer_ids = pluck(&performers, |x| x.data_str("id").map(str::to_owned));
            let custom_fields = sanitize_custom_fields(item.data.get("customFields"));

            // Explicit name, or the first performer's name; the flag flips
            // which side wins.
            let explicit_name = item
                .data_str("name")
                .filter(|name| !name.is_empty())
                .map(str::to_owned);
            let name = if importer.settings.use_performer_name_as_session_name {
                performer_names.first().cloned().or(explicit_name)
            } else {
                explicit_name.or_else(|| performer_names.first().cloned())
            };

            // Own images, or the first image found on a performer.
            let own_images = item
                .data
                .get("images")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let images: Vec<Value> = if own_images.is_empty() {
                performers
                    .iter()
                    .filter_map(|p| p.data.get("images").and_then(Value::as_array))
                    .flatten()
                    .filter(|image| !image.is_null())
                    .take(1)
                    .cloned()
                    .collect()
            } else {
                own_images
            };

            let mut data = object(item.data);
            data.insert("id".into(), json!(ctx.id));
            match parent {
                Some(parent) => data.insert("parentId".into(), json!(parent.id)),
                None => data.remove("parentId"),
            };
            data.insert("hasParent".into(), json!(parent.is_some()));
            if let Some(description) = cleaned_description(&data) {
                data.insert("description".into(), description);
            }
            data.insert("subsessionIds".into(), json!(subsession_ids));
            data.insert("performerIds".into(), json!(performer_ids));
            data.insert("performerNames".into(), json!(performer_names));
            data.insert("customFields".into(), serde_json::to_value(custom_fields).unwrap_or_default());
            match &venue {
                Some(venue) => {
                    data.insert("venueId".into(), json!(venue.id));
                    match venue.data_str("name") {
                        Some(venue_name) => data.insert("venueName".into(), json!(venue_name)),
                        None => data.remove("venueName"),
                    };
                }
                None => {
                    data.remove("venueId");
                    data.remove("venueName");
                }
            }
            data.insert("images".into(), Value::Array(images));
            match name {
                Some(name) => data.insert("name".into(), json!(name)),
                None => data.remove("name"),
            };
            Ok(vec![Item::new(ItemType::Session, ctx.id, ctx.language_code, Value::Object(data))])
        }
    })
    .await;

    let validated = validate_items(importer, constructed);
    report_sessions_out_of_bounds(importer, &validated).await;
    save_all(
        validated
            .iter()
            .map(|item| {
                let mut doc = item.data.clone();
                convert_date_keys(&mut doc, &["timeFrom", "timeTo"]);
                let path = paths::entity_doc(&item.language, ItemType::Session, &item.id);
                async move { importer.docstore.save(&path, doc).await }
            })
            .collect(),
    )
    .await;
    probe::saved_items_of_type(importer, ItemType::Session).await;
    Ok(())
}

// =============================================================================
// Groups
// =============================================================================

/// Document id of a published (typed) group document.
fn group_doc_id(group: &Item) -> String {
    let group_type = group.data_str("type").unwrap_or_default();
    format!("{}:{}", group.id, group_type)
}

async fn save_groups(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    probe::saving_items_of_type(importer, ItemType::Group).await;
    let constructed = construct_items(importer, ItemType::Group, |item, ctx| {
        let importer = importer.clone();
        async move {
            let store = importer.store.as_ref();
            let session_ids = get_string_list(store, &keys::group_sessions(&ctx.id))
                .await
                .unwrap_or_default();
            let sessions =
                populate_many(&importer, ItemType::Session, &session_ids, &ctx.language_code).await;
            let performer_ids = get_string_list(store, &keys::group_performers(&ctx.id))
                .await
                .unwrap_or_default();
            let performers =
                populate_many(&importer, ItemType::Performer, &performer_ids, &ctx.language_code)
                    .await;

            let mut docs = Vec::new();
            if !sessions.is_empty() {
                let mut data = object(item.data.clone());
                data.insert("id".into(), json!(ctx.id));
                data.insert("type".into(), json!(GroupType::Session.as_str()));
                data.remove("performerIds");
                data.insert(
                    "sessionIds".into(),
                    Value::Array(sessions.iter().map(|x| json!(x.id)).collect()),
                );
                docs.push(Item::new(ItemType::Group, ctx.id.clone(), ctx.language_code.clone(), Value::Object(data)));
            }
            if !performers.is_empty() {
                let mut data = object(item.data);
                data.insert("id".into(), json!(ctx.id));
                data.insert("type".into(), json!(GroupType::Performer.as_str()));
                data.remove("sessionIds");
                data.insert(
                    "performerIds".into(),
                    Value::Array(performers.iter().map(|x| json!(x.id)).collect()),
                );
                docs.push(Item::new(ItemType::Group, ctx.id, ctx.language_code, Value::Object(data)));
            }
            Ok(docs)
        }
    })
    .await;

    let validated = validate_items(importer, constructed);

    // Published group doc ids double as the prune keep-set for groups.
    let doc_ids = uniq(validated.iter().map(group_doc_id).collect());
    importer
        .store
        .set(&keys::group_doc_ids(), serde_json::to_value(doc_ids).map_err(StoreError::from)?)
        .await?;

    save_all(
        validated
            .iter()
            .map(|group| {
                let path = paths::entity_doc(&group.language, ItemType::Group, &group_doc_id(group));
                let doc = group.data.clone();
                async move { importer.docstore.save(&path, doc).await }
            })
            .collect(),
    )
    .await;

    // One ordered item per referenced session/performer, carrying the path
    // to its canonical detail document.
    save_all(
        validated
            .iter()
            .map(|group| {
                let importer = importer.clone();
                async move {
                    let doc_id = group_doc_id(group);
                    let session_items = populate_many(
                        &importer,
                        ItemType::Session,
                        &group.data_str_vec("sessionIds"),
                        &group.language,
                    )
                    .await;
                    let performer_items = populate_many(
                        &importer,
                        ItemType::Performer,
                        &group.data_str_vec("performerIds"),
                        &group.language,
                    )
                    .await;
                    let entries: Vec<Item> = session_items
                        .into_iter()
                        .chain(performer_items)
                        .enumerate()
                        .map(|(order, entry)| {
                            let detail =
                                paths::entity_doc(&entry.language, entry.item_type, &entry.id);
                            let mut data = object(entry.data);
                            data.insert("order".into(), json!(order));
                            data.insert("detail".into(), json!(detail));
                            Item::new(
                                ItemType::Group,
                                format!("{doc_id}:{order}"),
                                group.language.clone(),
                                Value::Object(data),
                            )
                        })
                        .collect();
                    save_all(
                        entries
                            .iter()
                            .map(|entry| {
                                let mut doc = entry.data.clone();
                                convert_date_keys(&mut doc, &["timeFrom", "timeTo"]);
                                let path =
                                    paths::group_item_doc(&entry.language, &doc_id, &entry.id);
                                let importer = &importer;
                                async move { importer.docstore.save(&path, doc).await }
                            })
                            .collect(),
                    )
                    .await;
                    Ok::<(), DocStoreError>(())
                }
            })
            .collect(),
    )
    .await;
    probe::saved_items_of_type(importer, ItemType::Group).await;
    Ok(())
}

// =============================================================================
// Orchestration
// =============================================================================

async fn step_done(importer: &Arc<EventImporter>, completed: usize) {
    importer.set_progress(saving_progress(completed, UPLOAD_STEPS));
    save_importer_state(importer).await;
}

/// Upload all staged data to the document store, type by type, then prune.
pub async fn upload(importer: &Arc<EventImporter>) -> Result<(), UploadError> {
    importer.set_stage(Stage::SavingToDatabase);
    save_importer_state(importer).await;

    save_languages(importer).await?;
    step_done(importer, 1).await;
    save_days(importer).await?;
    step_done(importer, 2).await;
    save_venue_categories(importer).await?;
    step_done(importer, 3).await;
    save_venues(importer).await?;
    step_done(importer, 4).await;
    save_performers(importer).await?;
    step_done(importer, 5).await;
    save_sessions(importer).await?;
    step_done(importer, 6).await;
    save_groups(importer).await?;
    step_done(importer, 7).await;
    delete_unreferenced(importer).await?;
    step_done(importer, 8).await;

    probe::import_finished(importer).await;
    importer.set_stage(Stage::Finished);
    importer.set_ended_now();
    save_importer_state(importer).await;
    Ok(())
}
