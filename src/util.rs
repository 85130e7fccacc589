//! Small helpers shared across the pipeline: partial-failure gathering,
//! id-list utilities, bounded fan-out and lenient date parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

// =============================================================================
// Gather with partial failure
// =============================================================================

/// Outcome of [`settle`]: fulfilled values and collected failures, in input
/// order within each list.
#[derive(Debug)]
pub struct Settled<T, E> {
    pub results: Vec<T>,
    pub errors: Vec<E>,
}

/// Await every future and separate the fulfilled from the rejected.
///
/// One failure never cancels or hides its siblings.
pub async fn settle<T, E, F>(futures: Vec<F>) -> Settled<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let mut results = Vec::new();
    let mut errors = Vec::new();
    for outcome in join_all(futures).await {
        match outcome {
            Ok(value) => results.push(value),
            Err(error) => errors.push(error),
        }
    }
    Settled { results, errors }
}

// =============================================================================
// Bounded fan-out
// =============================================================================

/// Run all tasks, at most `limit` of them concurrently pending.
///
/// Results come back in input order.
pub async fn run_bounded<T, F>(limit: usize, tasks: Vec<F>) -> Vec<T>
where
    F: Future<Output = T>,
{
    let gate = Arc::new(Semaphore::new(limit));
    join_all(tasks.into_iter().map(|task| {
        let gate = gate.clone();
        async move {
            let _permit = gate.acquire().await.expect("gate never closes");
            task.await
        }
    }))
    .await
}

// =============================================================================
// Id lists
// =============================================================================

/// Extract a property from each element: no empty values, no repeats, always
/// an array.
pub fn pluck<T, F>(items: &[T], f: F) -> Vec<String>
where
    F: Fn(&T) -> Option<String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if let Some(value) = f(item) {
            if !value.is_empty() && !out.contains(&value) {
                out.push(value);
            }
        }
    }
    out
}

/// Elements of `a` that are not in `b`, keeping `a`'s order.
pub fn difference(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|x| !b.contains(x)).cloned().collect()
}

/// Deduplicate while keeping first-seen order.
pub fn uniq(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

// =============================================================================
// Dates
// =============================================================================

/// Convert a staged value into a timestamp if possible.
///
/// Accepts RFC 3339 strings, a few date/datetime shorthands and epoch
/// milliseconds. Anything else yields `None`.
pub fn create_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Some(ms) = value.as_i64() {
        return Utc.timestamp_millis_opt(ms).single();
    }
    let s = value.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Calendar date of a timestamp, for day matching.
pub fn date_stamp(dt: &DateTime<Utc>) -> NaiveDate {
    dt.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_settle_keeps_both_sides() {
        type Outcome = std::pin::Pin<Box<dyn Future<Output = Result<i32, String>>>>;
        let futures: Vec<Outcome> = vec![
            Box::pin(async { Ok(1) }),
            Box::pin(async { Err("boom".to_string()) }),
            Box::pin(async { Ok(3) }),
        ];
        let settled = settle(futures).await;
        assert_eq!(settled.results, vec![1, 3]);
        assert_eq!(settled.errors, vec!["boom".to_string()]);
    }

    #[tokio::test]
    async fn test_run_bounded_caps_concurrency() {
        static RUNNING: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        let tasks = (0..25)
            .map(|i| async move {
                let now = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
                PEAK.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                RUNNING.fetch_sub(1, Ordering::SeqCst);
                i
            })
            .collect();
        let results = run_bounded(10, tasks).await;
        assert_eq!(results.len(), 25);
        assert_eq!(results[24], 24);
        assert!(PEAK.load(Ordering::SeqCst) <= 10);
    }

    #[test]
    fn test_pluck_filters_and_dedupes() {
        let items = vec![Some("a"), None, Some("b"), Some("a"), Some("")];
        let plucked = pluck(&items, |x| x.map(str::to_owned));
        assert_eq!(plucked, vec!["a", "b"]);
    }

    #[test]
    fn test_difference() {
        let a = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let b = vec!["y".to_string()];
        assert_eq!(difference(&a, &b), vec!["x", "z"]);
    }

    #[test]
    fn test_create_date_variants() {
        assert!(create_date(Some(&json!("2026-06-05T10:00:00Z"))).is_some());
        assert!(create_date(Some(&json!("2026-06-05 10:00"))).is_some());
        assert!(create_date(Some(&json!("2026-06-05"))).is_some());
        assert!(create_date(Some(&json!(1_750_000_000_000_i64))).is_some());
        assert!(create_date(Some(&json!("not a date"))).is_none());
        assert!(create_date(Some(&json!(""))).is_none());
        assert!(create_date(None).is_none());
    }
}
