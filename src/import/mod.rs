//! The event importer: run-scoped aggregate and pipeline stages.
//!
//! An [`EventImporter`] owns the run settings, the staging store handle, the
//! target document store and the diagnostics ledger. It is created fresh (or
//! rehydrated from a persisted snapshot), fed items during an extraction
//! phase, then published during the load phase and discarded once the final
//! state is persisted.

pub mod bounds;
pub mod construct;
pub mod extract;
pub mod ingest;
pub mod probe;
pub mod progress;
pub mod prune;
pub mod resolver;
pub mod upload;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::docstore::DocumentStore;
use crate::error::{ImportError, ImportErrorKind};
use crate::models::{Image, Item, ItemType};
use crate::store::StagingStore;
use crate::validation::Validator;

use progress::{stage_progress, SavedState, Stage};

/// Import examples printed per entity type when reporting failures.
pub const DEFAULT_ERROR_REPORT_EXAMPLES: usize = 1;

// =============================================================================
// Settings
// =============================================================================

/// Optional hook applied to every image during construction.
#[async_trait]
pub trait ImageReuploader: Send + Sync {
    /// Return the image to publish instead, or `None` to drop it.
    async fn reupload(&self, image: &Image) -> Result<Option<Image>, String>;
}

/// Importer configuration.
#[derive(Clone)]
pub struct Settings {
    /// Language codes to publish, e.g. `["en", "cs"]`. Must not be empty.
    pub languages: Vec<String>,
    /// Fallback language for missing translations. Must be in `languages`.
    pub default_language: String,
    /// If true, no import progress/log documents are written, only data.
    pub track_only_data_in_docstore: bool,
    /// If true, session names are overwritten with the first performer name.
    pub use_performer_name_as_session_name: bool,
    /// Number of failure examples reported per entity type.
    pub error_report_examples: usize,
    /// Optional image reupload hook.
    pub reupload_image: Option<Arc<dyn ImageReuploader>>,
}

impl Settings {
    pub fn new(languages: Vec<String>, default_language: impl Into<String>) -> Self {
        Self {
            languages,
            default_language: default_language.into(),
            track_only_data_in_docstore: false,
            use_performer_name_as_session_name: false,
            error_report_examples: DEFAULT_ERROR_REPORT_EXAMPLES,
            reupload_image: None,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.languages.is_empty() {
            return Err(SettingsError::EmptyLanguages);
        }
        if !self.languages.contains(&self.default_language) {
            return Err(SettingsError::UnknownDefaultLanguage(self.default_language.clone()));
        }
        Ok(())
    }
}

/// Invalid importer configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("languages must not be empty")]
    EmptyLanguages,

    #[error("default language '{0}' is not among the configured languages")]
    UnknownDefaultLanguage(String),
}

// =============================================================================
// Aggregate
// =============================================================================

#[derive(Default)]
struct Diagnostics {
    errors: Vec<ImportError>,
    warnings: Vec<ImportError>,
    invalid: HashMap<ItemType, HashMap<String, Item>>,
}

/// Run-scoped importer aggregate.
///
/// The ledger lists only take order-independent appends, so interleaved
/// per-type pipelines can record diagnostics without coordination.
pub struct EventImporter {
    pub settings: Settings,
    pub store: Arc<dyn StagingStore>,
    pub docstore: Arc<dyn DocumentStore>,
    pub validator: Validator,
    import_id: Mutex<String>,
    started_at: DateTime<Utc>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    progress: Mutex<f64>,
    diagnostics: Mutex<Diagnostics>,
}

impl EventImporter {
    fn lock_diagnostics(&self) -> std::sync::MutexGuard<'_, Diagnostics> {
        self.diagnostics.lock().expect("diagnostics poisoned")
    }

    pub fn import_id(&self) -> String {
        self.import_id.lock().expect("import id poisoned").clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        *self.ended_at.lock().expect("ended at poisoned")
    }

    pub(crate) fn set_ended_now(&self) {
        *self.ended_at.lock().expect("ended at poisoned") = Some(Utc::now());
    }

    /// Current progress fraction in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        *self.progress.lock().expect("progress poisoned")
    }

    /// Advance progress. Values below the current one are ignored so the
    /// fraction stays monotonic within a run.
    pub fn set_progress(&self, value: f64) {
        let mut progress = self.progress.lock().expect("progress poisoned");
        if value > *progress {
            *progress = value;
        }
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        self.set_progress(stage_progress(stage));
    }

    /// Append a run-level or per-item error.
    pub fn record_error(&self, error: ImportError) {
        self.lock_diagnostics().errors.push(error);
    }

    /// Append a non-fatal advisory warning.
    pub fn record_warning(&self, warning: ImportError) {
        self.lock_diagnostics().warnings.push(warning);
    }

    /// Append errors and exclude their offending items from publishing.
    pub fn record_errors_marking_invalid(&self, errors: Vec<ImportError>) {
        let mut diagnostics = self.lock_diagnostics();
        for error in errors {
            if let Some(item) = &error.item {
                diagnostics
                    .invalid
                    .entry(item.item_type)
                    .or_default()
                    .insert(item.id.clone(), item.clone());
            }
            diagnostics.errors.push(error);
        }
    }

    /// Whether the id was marked invalid for the type (any language).
    pub fn is_invalid(&self, item_type: ItemType, id: &str) -> bool {
        self.lock_diagnostics()
            .invalid
            .get(&item_type)
            .map(|ids| ids.contains_key(id))
            .unwrap_or(false)
    }

    /// Invalid ids recorded for a type.
    pub fn invalid_ids(&self, item_type: ItemType) -> Vec<String> {
        self.lock_diagnostics()
            .invalid
            .get(&item_type)
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn invalid_count(&self, item_type: ItemType) -> usize {
        self.lock_diagnostics()
            .invalid
            .get(&item_type)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn errors_snapshot(&self) -> Vec<ImportError> {
        self.lock_diagnostics().errors.clone()
    }

    pub fn warnings_snapshot(&self) -> Vec<ImportError> {
        self.lock_diagnostics().warnings.clone()
    }

    /// A loading failure means no data arrived, therefore no import.
    pub fn has_loading_failed(&self) -> bool {
        self.lock_diagnostics()
            .errors
            .iter()
            .any(|e| e.kind == ImportErrorKind::LoadingDataFailed)
    }

    /// Aggregated `"code: Nx"` error summary for the persisted state.
    pub fn error_summary(&self) -> String {
        summarize(&self.lock_diagnostics().errors, "No errors")
    }

    /// Aggregated `"code: Nx"` warning summary for the persisted state.
    pub fn warning_summary(&self) -> String {
        summarize(&self.lock_diagnostics().warnings, "No warnings")
    }
}

fn summarize(entries: &[ImportError], empty: &str) -> String {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        let code = entry.code();
        if !counts.contains_key(&code) {
            order.push(code.clone());
        }
        *counts.entry(code).or_insert(0) += 1;
    }
    if order.is_empty() {
        return empty.to_string();
    }
    order
        .into_iter()
        .map(|code| {
            let count = counts[&code];
            format!("{code}: {count}x")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Create a fresh importer and persist its initial state.
pub async fn create_importer(
    settings: Settings,
    store: Arc<dyn StagingStore>,
    docstore: Arc<dyn DocumentStore>,
) -> Result<Arc<EventImporter>, SettingsError> {
    settings.validate()?;
    let importer = Arc::new(EventImporter {
        settings,
        store,
        docstore,
        validator: Validator::new(),
        import_id: Mutex::new(String::new()),
        started_at: Utc::now(),
        ended_at: Mutex::new(None),
        progress: Mutex::new(stage_progress(Stage::Start)),
        diagnostics: Mutex::new(Diagnostics::default()),
    });
    progress::save_importer_state(&importer).await;
    importer.set_stage(Stage::Ready);
    progress::save_importer_state(&importer).await;
    Ok(importer)
}

/// Rehydrate an importer from a previously persisted snapshot.
pub async fn create_importer_from_state(
    settings: Settings,
    store: Arc<dyn StagingStore>,
    docstore: Arc<dyn DocumentStore>,
    state: &SavedState,
) -> Result<Arc<EventImporter>, SettingsError> {
    settings.validate()?;
    let importer = Arc::new(EventImporter {
        settings,
        store,
        docstore,
        validator: Validator::new(),
        import_id: Mutex::new(state.import_id.clone()),
        started_at: state.start_time,
        ended_at: Mutex::new(state.end_time),
        progress: Mutex::new(stage_progress(Stage::Ready)),
        diagnostics: Mutex::new(Diagnostics::default()),
    });
    probe::import_started(&importer).await;
    progress::save_importer_state(&importer).await;
    Ok(importer)
}

/// Assign a fresh import id to the run and persist the state under it.
pub async fn begin_import(importer: &Arc<EventImporter>) -> String {
    let id = Uuid::new_v4().to_string();
    *importer.import_id.lock().expect("import id poisoned") = id.clone();
    progress::save_importer_state(importer).await;
    id
}

/// Run a complete import for an already-extracted batch of items: stage them,
/// publish everything and return the final persisted state.
pub async fn run_items_import(
    importer: &Arc<EventImporter>,
    items: Vec<Item>,
) -> Result<progress::SavedState, upload::UploadError> {
    begin_import(importer).await;
    extract::start_loading(importer, move |i| async move {
        ingest::add_items(&i, &items).await?;
        Ok(())
    })
    .await;
    if !importer.has_loading_failed() {
        upload::upload(importer).await?;
    }
    Ok(progress::save_importer_state(importer).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryDocumentStore;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn test_settings() -> Settings {
        Settings::new(vec!["en".into(), "cs".into()], "en")
    }

    async fn test_importer() -> Arc<EventImporter> {
        create_importer(
            test_settings(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_settings_validation() {
        assert!(test_settings().validate().is_ok());
        assert!(matches!(
            Settings::new(vec![], "en").validate(),
            Err(SettingsError::EmptyLanguages)
        ));
        assert!(matches!(
            Settings::new(vec!["cs".into()], "en").validate(),
            Err(SettingsError::UnknownDefaultLanguage(_))
        ));
    }

    #[tokio::test]
    async fn test_create_importer_reaches_ready() {
        let importer = test_importer().await;
        assert_eq!(importer.progress(), 0.01);
        assert_eq!(importer.import_id(), "");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let importer = test_importer().await;
        importer.set_progress(0.5);
        importer.set_progress(0.3);
        assert_eq!(importer.progress(), 0.5);
    }

    #[tokio::test]
    async fn test_invalid_marking() {
        let importer = test_importer().await;
        let item = Item::new(ItemType::Venue, "v1", "en", json!({ "id": "v1" }));
        importer.record_errors_marking_invalid(vec![
            ImportError::new(ImportErrorKind::InvalidItemData).with_item(item),
        ]);
        assert!(importer.is_invalid(ItemType::Venue, "v1"));
        assert!(!importer.is_invalid(ItemType::Venue, "v2"));
        assert!(!importer.is_invalid(ItemType::Session, "v1"));
        assert_eq!(importer.invalid_ids(ItemType::Venue), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_summaries_aggregate_by_code() {
        let importer = test_importer().await;
        importer.record_error(ImportError::new(ImportErrorKind::InvalidItemData));
        importer.record_error(ImportError::new(ImportErrorKind::InvalidItemData));
        importer.record_error(ImportError::new(ImportErrorKind::NoItemData));
        assert_eq!(importer.error_summary(), "invalid-item-data: 2x, no-item-data: 1x");
        assert_eq!(importer.warning_summary(), "No warnings");
    }

    #[tokio::test]
    async fn test_begin_import_assigns_uuid() {
        let importer = test_importer().await;
        let id = begin_import(&importer).await;
        assert!(!id.is_empty());
        assert_eq!(importer.import_id(), id);
    }
}
