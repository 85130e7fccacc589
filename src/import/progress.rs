//! Progress computation and importer state persistence.
//!
//! Progress is a monotonic fraction in `[0, 1]`, rounded to two decimals.
//! The publish phase spans 0.3..1 and advances with completed steps. A state
//! snapshot is persisted at every transition for external observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::EventImporter;
use crate::docstore::paths;

/// Stages of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Ready,
    CollectingData,
    SavingToDatabase,
    Finished,
}

/// Progress weight of a stage.
pub fn stage_progress(stage: Stage) -> f64 {
    match stage {
        Stage::Start => 0.0,
        Stage::Ready => 0.01,
        Stage::CollectingData => 0.05,
        Stage::SavingToDatabase => 0.3,
        Stage::Finished => 1.0,
    }
}

/// Progress within the publish phase after `completed` of `total` steps.
pub fn saving_progress(completed: usize, total: usize) -> f64 {
    let base = stage_progress(Stage::SavingToDatabase);
    let span = stage_progress(Stage::Finished) - base;
    round2(base + span * (completed as f64 / total as f64))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// Persisted state
// =============================================================================

/// Importer state snapshot persisted for external observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub import_id: String,
    /// Legacy id attribute used by observers to locate run logs.
    pub id: String,
    pub import_in_progress: bool,
    /// Legacy alias of `import_in_progress`.
    pub is_import_in_process: bool,
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub error_summary: String,
    pub warning_summary: String,
}

/// Persist the current importer state and return the snapshot.
///
/// An import is finished once progress reaches 1, or when loading the data
/// failed (no data, therefore no import). Persistence failures are ignored;
/// observers just see the previous snapshot.
pub async fn save_importer_state(importer: &Arc<EventImporter>) -> SavedState {
    let finished = importer.progress() >= 1.0 || importer.has_loading_failed();
    let progress = if finished { 1.0 } else { importer.progress() };
    let import_id = importer.import_id();

    let state = SavedState {
        import_id: import_id.clone(),
        id: import_id.clone(),
        import_in_progress: !finished,
        is_import_in_process: !finished,
        progress,
        start_time: importer.started_at(),
        end_time: importer.ended_at(),
        error_summary: importer.error_summary(),
        warning_summary: importer.warning_summary(),
    };

    let doc = serde_json::to_value(&state).unwrap_or_default();
    let _ = importer.docstore.save(&paths::imports_info(), doc.clone()).await;
    if !importer.settings.track_only_data_in_docstore && !import_id.is_empty() {
        let _ = importer.docstore.save(&paths::import_doc(&import_id), doc).await;
    }
    state
}
