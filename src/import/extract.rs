//! Extraction wrapping: bounded upstream fan-out, the run-level failure
//! guard and the collection progress ticker.
//!
//! The importer never knows where items come from; callers hand it opaque
//! extraction tasks (table readers, API pagers, file parsers) and the gate
//! bounds how many run at once.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::ingest;
use super::probe;
use super::progress::{save_importer_state, stage_progress, Stage};
use super::EventImporter;
use crate::error::{ImportError, ImportErrorKind};
use crate::models::{Item, ItemType};
use crate::store::{get_string_list, keys};
use crate::util::run_bounded;

/// Upstream extraction tasks running at once, however many are scheduled.
pub const MAX_EXTRACT_CONCURRENCY: usize = 10;

/// One opaque extraction task producing staged items.
pub type ExtractTask = BoxFuture<'static, Result<Vec<Item>, String>>;

/// Run all extraction tasks through the concurrency gate and stage whatever
/// they produced, one item at a time.
///
/// Tasks are never cancelled by a sibling's failure; when any of them
/// failed, the combined error is returned after everything settled.
pub async fn extract_sources(
    importer: &Arc<EventImporter>,
    sources: Vec<ExtractTask>,
) -> Result<usize, String> {
    let outcomes = run_bounded(MAX_EXTRACT_CONCURRENCY, sources).await;
    let mut items = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(batch) => items.extend(batch),
            Err(error) => failures.push(error),
        }
    }
    ingest::add_items(importer, &items)
        .await
        .map_err(|e| e.to_string())?;
    if !failures.is_empty() {
        return Err(failures.join("; "));
    }
    Ok(items.len())
}

/// Run caller-supplied extraction logic for the importer.
///
/// Any failure is caught exactly once: it is recorded as a loading failure,
/// the run is marked finished despite incomplete progress and the state is
/// persisted. The collection ticker reports staged counts while loading.
pub async fn start_loading<F, Fut>(importer: &Arc<EventImporter>, load: F)
where
    F: FnOnce(Arc<EventImporter>) -> Fut,
    Fut: Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>>,
{
    let ticker = start_collection_ticker(importer.clone());
    if let Err(error) = load(importer.clone()).await {
        importer.record_error(
            ImportError::new(ImportErrorKind::LoadingDataFailed).with_cause(&error),
        );
        probe::loading_data_failed(&error.to_string());
        save_importer_state(importer).await;
    }
    drop(ticker);
}

// =============================================================================
// Collection ticker
// =============================================================================

/// Guard of the background count reporter; dropping it stops the task.
pub struct CollectionTicker {
    handle: JoinHandle<()>,
}

impl Drop for CollectionTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Periodically report how many ids of each type were staged so far.
///
/// The task reports only when the counts changed and stops on its own once
/// the publish phase begins.
pub fn start_collection_ticker(importer: Arc<EventImporter>) -> CollectionTicker {
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut last_counts: Vec<(ItemType, usize)> =
            ItemType::ALL.iter().map(|t| (*t, 0)).collect();
        loop {
            interval.tick().await;
            if importer.progress() >= stage_progress(Stage::SavingToDatabase) {
                break;
            }
            let mut counts = Vec::with_capacity(ItemType::ALL.len());
            for item_type in ItemType::ALL {
                let count = get_string_list(importer.store.as_ref(), &keys::ids(item_type))
                    .await
                    .map(|ids| ids.len())
                    .unwrap_or(0);
                counts.push((item_type, count));
            }
            if counts != last_counts {
                probe::added_items_updated(&importer, &counts).await;
                last_counts = counts;
            }
        }
    });
    CollectionTicker { handle }
}
