//! Out-of-bounds reporting: sessions that take place outside every day of
//! the event would be invisible in clients, so the importer flags them.

use std::sync::Arc;

use super::resolver::populate_many;
use super::EventImporter;
use crate::error::{ImportError, ImportErrorKind, OutOfBounds};
use crate::models::{Item, ItemType};
use crate::store::{get_string_list, keys};
use crate::util::{create_date, date_stamp};

/// Warn about every session whose `[start, end]` misses all day ranges.
///
/// The warning carries the session bounds and, when the session's start date
/// (or, failing that, end date) matches a day by calendar date, that day's
/// bounds. Always non-fatal.
pub async fn report_sessions_out_of_bounds(importer: &Arc<EventImporter>, sessions: &[Item]) {
    let day_ids = get_string_list(importer.store.as_ref(), &keys::ids(ItemType::Day))
        .await
        .unwrap_or_default();
    let days = populate_many(
        importer,
        ItemType::Day,
        &day_ids,
        &importer.settings.default_language,
    )
    .await;
    let day_ranges: Vec<_> = days
        .iter()
        .filter_map(|day| {
            let from = create_date(day.data.get("timeFrom"))?;
            let to = create_date(day.data.get("timeTo"))?;
            Some((from, to))
        })
        .collect();
    if day_ranges.is_empty() {
        return;
    }

    for session in sessions {
        let Some(from) = create_date(session.data.get("timeFrom")) else { continue };
        let Some(to) = create_date(session.data.get("timeTo")) else { continue };

        let in_bounds = day_ranges
            .iter()
            .any(|(d0, d1)| (from >= *d0 && from <= *d1) || (to >= *d0 && to <= *d1));
        if in_bounds {
            continue;
        }

        let start_stamp = date_stamp(&from);
        let end_stamp = date_stamp(&to);
        let matches_stamp = |stamp: chrono::NaiveDate| {
            day_ranges
                .iter()
                .find(|(d0, d1)| date_stamp(d0) == stamp || date_stamp(d1) == stamp)
                .copied()
        };
        let day_bounds = matches_stamp(start_stamp).or_else(|| matches_stamp(end_stamp));

        importer.record_warning(
            ImportError::new(ImportErrorKind::SessionOutOfBounds)
                .with_item(session.clone())
                .with_bounds(OutOfBounds {
                    session_bounds: (from, to),
                    day_bounds,
                }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryDocumentStore;
    use crate::error::ErrorDetail;
    use crate::import::ingest::add_item;
    use crate::import::{create_importer, Settings};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn importer_with_days(days: &[(&str, &str, &str)]) -> Arc<EventImporter> {
        let importer = create_importer(
            Settings::new(vec!["en".into()], "en"),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
        .await
        .unwrap();
        for (id, from, to) in days {
            add_item(
                &importer,
                &Item::new(
                    ItemType::Day,
                    *id,
                    "en",
                    json!({ "id": id, "timeFrom": from, "timeTo": to }),
                ),
            )
            .await
            .unwrap();
        }
        importer
    }

    fn session(id: &str, from: &str, to: &str) -> Item {
        Item::new(
            ItemType::Session,
            id,
            "en",
            json!({ "id": id, "timeFrom": from, "timeTo": to }),
        )
    }

    #[tokio::test]
    async fn test_session_inside_a_day_passes() {
        let importer =
            importer_with_days(&[("d1", "2026-06-05T10:00:00Z", "2026-06-05T22:00:00Z")]).await;
        let sessions = vec![session("s1", "2026-06-05T12:00:00Z", "2026-06-05T13:00:00Z")];
        report_sessions_out_of_bounds(&importer, &sessions).await;
        assert!(importer.warnings_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_start_or_end_passes() {
        let importer =
            importer_with_days(&[("d1", "2026-06-05T10:00:00Z", "2026-06-05T22:00:00Z")]).await;
        // Starts before the day but ends inside it.
        let sessions = vec![session("s1", "2026-06-05T08:00:00Z", "2026-06-05T11:00:00Z")];
        report_sessions_out_of_bounds(&importer, &sessions).await;
        assert!(importer.warnings_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_end_date_match_reports_that_days_bounds() {
        let importer = importer_with_days(&[
            ("d1", "2026-06-05T10:00:00Z", "2026-06-05T22:00:00Z"),
            ("d2", "2026-06-06T10:00:00Z", "2026-06-06T22:00:00Z"),
        ])
        .await;
        // Out of every day's time range; starts on a date no day has,
        // ends on d2's date.
        let sessions = vec![session("s1", "2026-06-04T07:00:00Z", "2026-06-06T08:00:00Z")];
        report_sessions_out_of_bounds(&importer, &sessions).await;

        let warnings = importer.warnings_snapshot();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, ImportErrorKind::SessionOutOfBounds);
        match &warnings[0].detail {
            ErrorDetail::OutOfBounds(bounds) => {
                let (d0, d1) = bounds.day_bounds.expect("day bounds");
                assert_eq!(d0.to_rfc3339(), "2026-06-06T10:00:00+00:00");
                assert_eq!(d1.to_rfc3339(), "2026-06-06T22:00:00+00:00");
            }
            other => panic!("expected bounds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_date_match_wins_over_end_date() {
        let importer = importer_with_days(&[
            ("d1", "2026-06-05T10:00:00Z", "2026-06-05T22:00:00Z"),
            ("d2", "2026-06-06T10:00:00Z", "2026-06-06T22:00:00Z"),
        ])
        .await;
        // Early morning slot on d1's date, ending on d2's date.
        let sessions = vec![session("s1", "2026-06-05T07:00:00Z", "2026-06-06T08:00:00Z")];
        report_sessions_out_of_bounds(&importer, &sessions).await;

        let warnings = importer.warnings_snapshot();
        assert_eq!(warnings.len(), 1);
        match &warnings[0].detail {
            ErrorDetail::OutOfBounds(bounds) => {
                let (d0, _) = bounds.day_bounds.expect("day bounds");
                assert_eq!(d0.to_rfc3339(), "2026-06-05T10:00:00+00:00");
            }
            other => panic!("expected bounds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_matching_day_reports_without_bounds() {
        let importer =
            importer_with_days(&[("d1", "2026-06-05T10:00:00Z", "2026-06-05T22:00:00Z")]).await;
        let sessions = vec![session("s1", "2026-07-01T10:00:00Z", "2026-07-01T11:00:00Z")];
        report_sessions_out_of_bounds(&importer, &sessions).await;

        let warnings = importer.warnings_snapshot();
        assert_eq!(warnings.len(), 1);
        match &warnings[0].detail {
            ErrorDetail::OutOfBounds(bounds) => assert!(bounds.day_bounds.is_none()),
            other => panic!("expected bounds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_without_days_nothing_is_reported() {
        let importer = importer_with_days(&[]).await;
        let sessions = vec![session("s1", "2026-07-01T10:00:00Z", "2026-07-01T11:00:00Z")];
        report_sessions_out_of_bounds(&importer, &sessions).await;
        assert!(importer.warnings_snapshot().is_empty());
    }
}
