//! Batch fetcher
//!
//! Runs an injected fetch function once per batch, strictly one after the
//! other, and keeps the non-empty results in batch order. Fetch errors are
//! returned as they are: retry policy belongs to the caller.

use std::future::Future;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::Result;
use crate::executor::QueryParams;
use crate::range::{split_by_days, Batch, DateRange};
use crate::table::ResultTable;

use super::progress::ProgressTracker;

/// Sequential per-batch fetcher
pub struct BatchFetcher {
    tracker: ProgressTracker,
}

impl BatchFetcher {
    pub fn new(tracker: ProgressTracker) -> Self {
        Self { tracker }
    }

    /// Fetch every batch in order
    ///
    /// # Arguments
    /// * `batches` - Windows to fetch, as produced by the splitter
    /// * `params` - Shared parameters; each call gets them narrowed to its batch
    /// * `fetch_fn` - Called with `(batch_range, params)`; `None` or an empty
    ///   table means the batch had no rows
    ///
    /// # Returns
    /// * `Result<Vec<ResultTable>>` - Non-empty results in batch order
    pub async fn fetch_batches<F, Fut>(
        &self,
        batches: &[Batch],
        params: &QueryParams,
        mut fetch_fn: F,
    ) -> Result<Vec<ResultTable>>
    where
        F: FnMut(DateRange, QueryParams) -> Fut,
        Fut: Future<Output = Result<Option<ResultTable>>>,
    {
        let start_time = Instant::now();
        let mut results = Vec::with_capacity(batches.len());

        info!("Fetching {} batches", batches.len());

        for (i, batch) in batches.iter().enumerate() {
            debug!("Fetching batch #{} ({})", i + 1, batch);

            let fetched = fetch_fn(batch.range(), params.for_range(batch.range())).await?;
            let rows = fetched.as_ref().map_or(0, ResultTable::num_rows);
            self.tracker.batch_done(&batch.to_string(), rows as u64);

            match fetched {
                Some(table) if !table.is_empty() => {
                    debug!("Batch {} returned {} rows", batch, rows);
                    results.push(table);
                }
                _ => debug!("Batch {} returned no rows, skipping", batch),
            }
        }

        self.tracker.finish();
        info!(
            "Fetched {} non-empty batches of {} ({} rows) in {} ms",
            results.len(),
            batches.len(),
            self.tracker.rows(),
            start_time.elapsed().as_millis()
        );

        Ok(results)
    }
}

/// Split `range` into `batch_days` windows and fetch each one in order
///
/// Convenience wrapper over [`BatchFetcher`] without progress display.
pub async fn fetch_all<F, Fut>(
    fetch_fn: F,
    range: DateRange,
    batch_days: u32,
    params: &QueryParams,
) -> Result<Vec<ResultTable>>
where
    F: FnMut(DateRange, QueryParams) -> Fut,
    Fut: Future<Output = Result<Option<ResultTable>>>,
{
    let batches = split_by_days(range, batch_days)?;
    BatchFetcher::new(ProgressTracker::hidden())
        .fetch_batches(&batches, params, fetch_fn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutorError, ExportError};
    use crate::table::{Column, Value};
    use std::sync::{Arc, Mutex};

    fn one_row(label: &str) -> ResultTable {
        ResultTable::from_columns(vec![Column::new("batch", vec![Value::from(label)])]).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_all_in_order_and_drops_empty() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let range = DateRange::parse("2024-01-01", "2024-01-21").unwrap();
        let params = QueryParams::new(range).with_storefronts([1, 2]);

        let results = fetch_all(
            move |window: DateRange, p: QueryParams| {
                let seen = seen.clone();
                async move {
                    assert_eq!(p.range, window);
                    assert_eq!(p.storefront_ids, vec![1, 2]);
                    seen.lock().unwrap().push(window.to_string());
                    Ok(match window.start().format("%d").to_string().as_str() {
                        "01" => Some(one_row("first")),
                        "08" => None,
                        _ => Some(ResultTable::empty()),
                    })
                }
            },
            range,
            7,
            &params,
        )
        .await
        .unwrap();

        assert_eq!(results, vec![one_row("first")]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "2024-01-01..2024-01-07",
                "2024-01-08..2024-01-14",
                "2024-01-15..2024-01-21",
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_and_stops() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let range = DateRange::parse("2024-01-01", "2024-01-30").unwrap();

        let err = fetch_all(
            move |_window, _p| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<Option<ResultTable>, _>(
                        ExecutorError::ConnectionFailed("lost".into()).into(),
                    )
                }
            },
            range,
            7,
            &QueryParams::new(range),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ExportError::Executor(ExecutorError::ConnectionFailed(_))
        ));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_batch_days() {
        let range = DateRange::parse("2024-01-01", "2024-01-30").unwrap();
        let result = fetch_all(
            |_w, _p| async { Ok(None) },
            range,
            0,
            &QueryParams::new(range),
        )
        .await;
        assert!(matches!(result, Err(ExportError::InvalidRange(_))));
    }

    #[tokio::test]
    async fn test_tracker_sees_every_batch() {
        let range = DateRange::parse("2024-01-01", "2024-01-10").unwrap();
        let batches = split_by_days(range, 3).unwrap();
        let fetcher = BatchFetcher::new(ProgressTracker::new(batches.len() as u64, false));

        let results = fetcher
            .fetch_batches(&batches, &QueryParams::new(range), |w, _p| async move {
                Ok(Some(one_row(&w.to_string())))
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(fetcher.tracker.completed(), 4);
        assert_eq!(fetcher.tracker.rows(), 4);
    }
}
