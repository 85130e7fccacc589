//! Import probe: structured observability events for a run.
//!
//! Every event goes to the broadcast log channel; unless the importer tracks
//! only data, it is also appended to the run's log collection in the
//! document store so operators can inspect past imports.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use super::EventImporter;
use crate::api::logs::{log_error, log_info};
use crate::docstore::paths;
use crate::error::{ErrorDetail, ImportError, ImportErrorKind};
use crate::models::ItemType;
use crate::store::{get_string_list, keys};

async fn add_docstore_log(importer: &EventImporter, message: &str, severity: &str) {
    if importer.settings.track_only_data_in_docstore {
        return;
    }
    let import_id = importer.import_id();
    if import_id.is_empty() {
        return;
    }
    let doc = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "severity": severity,
        "message": message,
    });
    // Log persistence is best-effort; a failed write never affects the run.
    let _ = importer.docstore.add(&paths::import_logs(&import_id), doc).await;
}

pub async fn import_started(importer: &Arc<EventImporter>) {
    log_info("Import started");
    add_docstore_log(importer, "Import started", "INFO").await;
}

pub async fn saving_items_of_type(importer: &Arc<EventImporter>, item_type: ItemType) {
    let count = get_string_list(importer.store.as_ref(), &keys::ids(item_type))
        .await
        .map(|ids| ids.len())
        .unwrap_or(0);
    let message = format!("Saving {count}x {item_type}");
    log_info(&message);
    add_docstore_log(importer, &message, "INFO").await;
}

pub async fn saved_items_of_type(importer: &Arc<EventImporter>, item_type: ItemType) {
    let samples = importer.settings.error_report_examples;

    let invalid_count = importer.invalid_count(item_type);
    if invalid_count > 0 {
        let examples = invalid_examples(importer, item_type, samples);
        let message = format!("{invalid_count}x invalid {item_type}, for example: {examples}");
        log_error(&message);
        add_docstore_log(importer, &message, "ERROR").await;
    }

    if item_type == ItemType::Session {
        let out_of_bounds: Vec<ImportError> = importer
            .warnings_snapshot()
            .into_iter()
            .filter(|w| w.kind == ImportErrorKind::SessionOutOfBounds)
            .collect();
        if !out_of_bounds.is_empty() {
            let examples: Vec<String> = out_of_bounds
                .iter()
                .take(samples)
                .map(serialize_out_of_bounds)
                .collect();
            let message = format!(
                "{} sessions will not be visible in the app, for example {}",
                out_of_bounds.len(),
                examples.join(", ")
            );
            log_error(&message);
            add_docstore_log(importer, &message, "ERROR").await;
        }
    }
}

pub async fn added_items_updated(importer: &Arc<EventImporter>, counts: &[(ItemType, usize)]) {
    let serialized: Vec<String> = counts
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(item_type, count)| format!("{item_type} {count}x"))
        .collect();
    let message = format!("Loading from remote ({})", serialized.join(", "));
    log_info(&message);
    add_docstore_log(importer, &message, "INFO").await;
}

pub async fn deleting_unreferenced_documents(importer: &Arc<EventImporter>) {
    log_info("Deleting unreferenced documents");
    add_docstore_log(importer, "Deleting unreferenced documents", "INFO").await;
}

pub async fn import_finished(importer: &Arc<EventImporter>) {
    log_info("Import finished");
    add_docstore_log(importer, "Import finished", "INFO").await;
}

pub fn loading_data_failed(error: &str) {
    log_error(format!("Loading data failed: {error}"));
}

// =============================================================================
// Example serialization
// =============================================================================

fn invalid_examples(importer: &EventImporter, item_type: ItemType, samples: usize) -> String {
    importer
        .errors_snapshot()
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                ImportErrorKind::InvalidItemData | ImportErrorKind::NoValidationSchema
            ) && e.item.as_ref().map(|i| i.item_type) == Some(item_type)
        })
        .take(samples)
        .map(serialize_invalid)
        .collect::<Vec<_>>()
        .join(", ")
}

fn serialize_invalid(error: &ImportError) -> String {
    let mut parts = Vec::new();
    if let Some(item) = &error.item {
        parts.push(format!("id={}", item.id));
        if let Some(name) = item.data_str("name") {
            parts.push(format!("name={name}"));
        }
    }
    if let ErrorDetail::Violations(violations) = &error.detail {
        if let Some(first) = violations.first() {
            parts.push(first.clone());
        }
    }
    parts.join(" ")
}

fn serialize_out_of_bounds(warning: &ImportError) -> String {
    let mut parts = Vec::new();
    if let Some(item) = &warning.item {
        parts.push(format!("id={}", item.id));
        if let Some(name) = item.data_str("name") {
            parts.push(format!("name={name}"));
        }
    }
    if let ErrorDetail::OutOfBounds(bounds) = &warning.detail {
        let (from, to) = bounds.session_bounds;
        parts.push(format!("takes place {}-{}", from.to_rfc3339(), to.to_rfc3339()));
        match bounds.day_bounds {
            Some((day_from, day_to)) => parts.push(format!(
                "but day starts on {} and ends {}",
                day_from.to_rfc3339(),
                day_to.to_rfc3339()
            )),
            None => parts.push("but there is no such day in event".to_string()),
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::{DocumentStore, MemoryDocumentStore};
    use crate::error::OutOfBounds;
    use crate::import::{begin_import, create_importer, Settings};
    use crate::models::Item;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    async fn importer_with_docstore() -> (Arc<EventImporter>, Arc<MemoryDocumentStore>) {
        let docstore = Arc::new(MemoryDocumentStore::new());
        let importer = create_importer(
            Settings::new(vec!["en".into()], "en"),
            Arc::new(MemoryStore::new()),
            docstore.clone(),
        )
        .await
        .unwrap();
        (importer, docstore)
    }

    #[tokio::test]
    async fn test_probe_appends_run_log() {
        let (importer, docstore) = importer_with_docstore().await;
        let id = begin_import(&importer).await;
        import_started(&importer).await;
        let logs = docstore.list_ids(&paths::import_logs(&id)).await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_skips_log_without_import_id() {
        let (importer, docstore) = importer_with_docstore().await;
        let before = docstore.len();
        import_started(&importer).await;
        // No import id assigned yet, so nothing beyond the state doc exists.
        assert_eq!(docstore.len(), before);
    }

    #[tokio::test]
    async fn test_invalid_example_serialization() {
        let (importer, _) = importer_with_docstore().await;
        importer.record_errors_marking_invalid(vec![
            ImportError::new(ImportErrorKind::InvalidItemData)
                .with_item(Item::new(
                    ItemType::Venue,
                    "v1",
                    "en",
                    json!({ "id": "v1", "name": "Hall" }),
                ))
                .with_violations(vec!["42 is not of type \"string\"".to_string()]),
        ]);
        let serialized = invalid_examples(&importer, ItemType::Venue, 1);
        assert!(serialized.contains("id=v1"));
        assert!(serialized.contains("name=Hall"));
        assert!(serialized.contains("not of type"));
    }

    #[test]
    fn test_out_of_bounds_serialization_without_day() {
        let warning = ImportError::new(ImportErrorKind::SessionOutOfBounds)
            .with_item(Item::new(ItemType::Session, "s1", "en", json!({ "id": "s1" })))
            .with_bounds(OutOfBounds {
                session_bounds: (
                    Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap(),
                ),
                day_bounds: None,
            });
        let serialized = serialize_out_of_bounds(&warning);
        assert!(serialized.contains("id=s1"));
        assert!(serialized.contains("no such day"));
    }
}
