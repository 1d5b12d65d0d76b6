//! Export orchestrator
//!
//! Drives an [`ExportSession`] through its stages:
//!
//! ```text
//! initial -> checking_size -> loading_preview -> ready -> exporting -> done
//!                 |                  |                        |
//!                 +-> blocked        +-> error                +-> error
//!                 +-> initial (no data / count failed / connection lost)
//! ```
//!
//! `blocked`, `error` and `done` are left only through [`ExportOrchestrator::reset`].
//! Executor failures never escape as errors: they become a stage plus a
//! [`UserMessage`]. The only `Err` an operation returns is
//! `InvalidTransition`, when it is called from the wrong stage.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{ExportConfig, SplitMode};
use crate::error::{ExportError, Result};
use crate::executor::{count_rows, fetch_data, QueryExecutor};
use crate::range::{split_by_days, split_by_month, Batch};

use super::csv::encode_csv;
use super::fetcher::BatchFetcher;
use super::merge::{MergeEngine, MergeOutcome};
use super::progress::{ProgressTracker, Spinner};
use super::registry::MergeRegistry;
use super::state::{ExportArtifact, ExportRequest, ExportSession, ExportStage, UserMessage};

/// Message when the size check itself fails
pub const SIZE_CHECK_FAILED: &str = "Failed to check data size. Please try again.";

/// Warning when the selection matches nothing
pub const NO_DATA_FOUND: &str = "No data found for the selected criteria.";

/// Coordinates size check, preview, batched fetch, merge and CSV encoding
pub struct ExportOrchestrator<E> {
    executor: E,
    engine: MergeEngine,
    settings: ExportConfig,
}

impl<E: QueryExecutor> ExportOrchestrator<E> {
    /// Create an orchestrator
    ///
    /// # Arguments
    /// * `executor` - Query executor used for count, preview and batch queries
    /// * `registry` - Merge configuration per product
    /// * `settings` - Row limit, preview size and batch sizing
    pub fn new(executor: E, registry: MergeRegistry, settings: ExportConfig) -> Self {
        Self {
            executor,
            engine: MergeEngine::new(registry),
            settings,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn settings(&self) -> &ExportConfig {
        &self.settings
    }

    /// Batch length for a request, from its storefront count
    pub fn batch_days_for(&self, request: &ExportRequest) -> u32 {
        self.settings.sizing.batch_days_for(request.num_storefronts())
    }

    /// Batches the full export of `request` will fetch
    pub fn plan_batches(&self, request: &ExportRequest) -> Result<Vec<Batch>> {
        match self.settings.split_mode {
            SplitMode::Days => split_by_days(request.params.range, self.batch_days_for(request)),
            SplitMode::Month => Ok(split_by_month(request.params.range)),
        }
    }

    /// Bind a request and check its size
    ///
    /// `initial -> checking_size -> {initial, blocked, loading_preview}`
    pub async fn request_export(
        &self,
        session: &mut ExportSession,
        request: ExportRequest,
    ) -> Result<ExportStage> {
        expect_stage(session, ExportStage::Initial, "request an export")?;

        info!(
            "Export requested: {} {} ({} storefronts)",
            request.data_source,
            request.params.range,
            request.num_storefronts()
        );
        session.begin();
        session.set_stage(ExportStage::CheckingSize);

        let count = {
            let _busy = Spinner::start("Checking data size...", self.settings.show_progress);
            count_rows(&self.executor, &request.data_source, &request.params).await
        };
        session.set_request(request);

        let count = match count {
            Ok(n) => n,
            Err(e) => {
                warn!("Row count failed: {}", e);
                session.set_message(Some(UserMessage::error(SIZE_CHECK_FAILED)));
                session.set_stage(ExportStage::Initial);
                return Ok(session.stage());
            }
        };
        session.set_row_count(count);
        debug!("Row count: {}", count);

        if count == 0 {
            session.set_message(Some(UserMessage::warning(NO_DATA_FOUND)));
            session.set_stage(ExportStage::Initial);
        } else if count > self.settings.max_rows {
            info!("Export blocked: {} rows over limit {}", count, self.settings.max_rows);
            session.set_message(Some(UserMessage::error(format!(
                "Data is too large to export ({} rows). Please narrow your selection to under {} rows.",
                count,
                format_thousands(self.settings.max_rows)
            ))));
            session.set_stage(ExportStage::Blocked);
        } else {
            session.set_stage(ExportStage::LoadingPreview);
        }

        Ok(session.stage())
    }

    /// Fetch the first rows for display
    ///
    /// `loading_preview -> {ready, error, initial}`
    pub async fn load_preview(&self, session: &mut ExportSession) -> Result<ExportStage> {
        expect_stage(session, ExportStage::LoadingPreview, "load a preview")?;
        let request = bound_request(session)?;

        let preview = fetch_data(
            &self.executor,
            &request.data_source,
            &request.params,
            Some(self.settings.preview_rows),
        )
        .await;

        match preview {
            Ok(table) => {
                debug!(
                    "Preview loaded: {} rows x {} columns",
                    table.num_rows(),
                    table.num_columns()
                );
                session.set_preview(table);
                session.set_stage(ExportStage::Ready);
            }
            Err(e) => fail(session, &e),
        }

        Ok(session.stage())
    }

    /// Run the full batched export
    ///
    /// `ready -> exporting -> {done, error, initial}`
    pub async fn confirm_export(&self, session: &mut ExportSession) -> Result<ExportStage> {
        expect_stage(session, ExportStage::Ready, "start the export")?;
        let request = bound_request(session)?;
        session.set_stage(ExportStage::Exporting);

        let start_time = Instant::now();
        match self.export(&request).await {
            Ok(artifact) => {
                info!(
                    "Export completed: {} batches, {} rows in, {} rows out, {} bytes, {} ms",
                    artifact.batches,
                    artifact.input_rows,
                    artifact.table.num_rows(),
                    artifact.csv.len(),
                    start_time.elapsed().as_millis()
                );
                let message = match &artifact.degraded {
                    Some(mismatch) => UserMessage::warning(format!(
                        "Merge keys {} not found in the data; rows were not re-aggregated and may contain duplicates.",
                        mismatch.missing_keys.join(", ")
                    )),
                    None => UserMessage::info(format!(
                        "Export ready: {} rows.",
                        artifact.table.num_rows()
                    )),
                };
                session.set_artifact(artifact);
                session.set_message(Some(message));
                session.set_stage(ExportStage::Done);
            }
            Err(e) => fail(session, &e),
        }

        Ok(session.stage())
    }

    /// Chain size check, preview and (when `confirm` is set) the export
    ///
    /// Stops at the first stage that does not lead onward.
    pub async fn run(
        &self,
        session: &mut ExportSession,
        request: ExportRequest,
        confirm: bool,
    ) -> Result<ExportStage> {
        if self.request_export(session, request).await? != ExportStage::LoadingPreview {
            return Ok(session.stage());
        }
        if self.load_preview(session).await? != ExportStage::Ready || !confirm {
            return Ok(session.stage());
        }
        self.confirm_export(session).await
    }

    /// Return to `initial`, discarding all held results
    pub fn reset(&self, session: &mut ExportSession) {
        debug!("Resetting export session from stage {}", session.stage());
        session.reset();
    }

    async fn export(&self, request: &ExportRequest) -> Result<ExportArtifact> {
        let batches = self.plan_batches(request)?;
        let fetcher = BatchFetcher::new(ProgressTracker::new(
            batches.len() as u64,
            self.settings.show_progress,
        ));

        let executor = &self.executor;
        let data_source = request.data_source.as_str();
        let tables = fetcher
            .fetch_batches(&batches, &request.params, |_window, params| async move {
                fetch_data(executor, data_source, &params, None)
                    .await
                    .map(Some)
            })
            .await?;

        let MergeOutcome {
            table,
            input_rows,
            degraded,
        } = {
            let _busy = Spinner::start("Merging batches...", self.settings.show_progress);
            self.engine.merge(tables, request.product())?
        };

        let csv = encode_csv(&table);
        Ok(ExportArtifact {
            table,
            csv,
            batches: batches.len(),
            input_rows,
            degraded,
        })
    }
}

fn expect_stage(session: &ExportSession, expected: ExportStage, action: &str) -> Result<()> {
    if session.stage() == expected {
        Ok(())
    } else {
        Err(ExportError::InvalidTransition {
            from: session.stage().to_string(),
            action: action.to_string(),
        })
    }
}

fn bound_request(session: &ExportSession) -> Result<ExportRequest> {
    session
        .request()
        .cloned()
        .ok_or_else(|| ExportError::Generic("export session has no bound request".to_string()))
}

/// Move the session to the stage and message matching a failure
fn fail(session: &mut ExportSession, err: &ExportError) {
    let (stage, message) = classify_failure(err);
    warn!("Export failed in stage {}: {}", session.stage(), err);
    session.set_message(Some(message));
    session.set_stage(stage);
}

/// Stage and user message for a failure
///
/// Lost connections go back to `initial` so the user can simply retry;
/// anything else ends in `error`.
pub fn classify_failure(err: &ExportError) -> (ExportStage, UserMessage) {
    match err {
        ExportError::Executor(e) if e.is_retryable() => (
            ExportStage::Initial,
            UserMessage::error("Database connection error. Please try again later."),
        ),
        ExportError::Executor(_) => (
            ExportStage::Error,
            UserMessage::error("An error occurred with the data query. Please check your inputs."),
        ),
        ExportError::UnknownProduct { product, .. } => (
            ExportStage::Error,
            UserMessage::error(format!("Export is not configured for report '{product}'.")),
        ),
        ExportError::InvalidRange(msg) => (
            ExportStage::Error,
            UserMessage::error(format!("Invalid date range: {msg}")),
        ),
        other => (
            ExportStage::Error,
            UserMessage::error(format!("An unexpected error occurred: {other}")),
        ),
    }
}

/// `50000` -> `50,000`
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use crate::executor::{QueryKind, QueryParams, QueryRequest};
    use crate::export::registry::{AggOp, MergeConfig};
    use crate::export::state::MessageLevel;
    use crate::export::UTF8_BOM;
    use crate::range::DateRange;
    use crate::table::{ResultTable, Value};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Failure {
        Connection,
        Query,
    }

    impl Failure {
        fn error(self) -> ExportError {
            match self {
                Failure::Connection => ExecutorError::ConnectionFailed("reset by peer".into()),
                Failure::Query => ExecutorError::QueryFailed("syntax error".into()),
            }
            .into()
        }
    }

    /// Answers counts with a fixed number and data queries with two rows per window
    struct ScriptedExecutor {
        count: Option<i64>,
        preview_failure: Option<Failure>,
        export_failure: Option<Failure>,
        calls: Mutex<Vec<QueryRequest>>,
    }

    impl ScriptedExecutor {
        fn counting(count: i64) -> Self {
            Self {
                count: Some(count),
                preview_failure: None,
                export_failure: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<QueryRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(&self, request: &QueryRequest) -> Result<ResultTable> {
            self.calls.lock().unwrap().push(request.clone());
            match request.kind {
                QueryKind::Count => match self.count {
                    Some(n) => ResultTable::from_rows(&["count"], vec![vec![Value::Int(n)]]),
                    None => Err(Failure::Connection.error()),
                },
                QueryKind::Data => {
                    let failure = match request.limit {
                        Some(_) => self.preview_failure,
                        None => self.export_failure,
                    };
                    if let Some(f) = failure {
                        return Err(f.error());
                    }
                    let days = request.params.range.days();
                    let table = ResultTable::from_rows(
                        &["keyword", "impression"],
                        vec![
                            vec!["shoes".into(), Value::Int(days)],
                            vec!["bags".into(), Value::Int(1)],
                        ],
                    )?;
                    Ok(match request.limit {
                        Some(n) => table.head(n),
                        None => table,
                    })
                }
            }
        }
    }

    fn registry() -> MergeRegistry {
        let mut registry = MergeRegistry::empty();
        registry.insert(
            "report",
            MergeConfig::new(["keyword"], &[("impression", AggOp::Sum)]),
        );
        registry.insert(
            "mismatched",
            MergeConfig::new(["storefront_id"], &[("impression", AggOp::Sum)]),
        );
        registry
    }

    fn settings() -> ExportConfig {
        ExportConfig {
            show_progress: false,
            ..ExportConfig::default()
        }
    }

    fn orchestrator(executor: ScriptedExecutor) -> ExportOrchestrator<ScriptedExecutor> {
        ExportOrchestrator::new(executor, registry(), settings())
    }

    /// Ten days over five storefronts: two 7-day batches
    fn request(product: &str) -> ExportRequest {
        let params = QueryParams::new(DateRange::parse("2024-01-01", "2024-01-10").unwrap())
            .with_storefronts([1, 2, 3, 4, 5]);
        ExportRequest::new(product, params)
    }

    #[tokio::test]
    async fn test_full_flow_reaches_done() {
        let orch = orchestrator(ScriptedExecutor::counting(120));
        let mut session = ExportSession::new();

        let stage = orch.request_export(&mut session, request("report")).await;
        assert_eq!(tokio_test::assert_ok!(stage), ExportStage::LoadingPreview);
        assert_eq!(session.row_count(), Some(120));

        assert_eq!(orch.load_preview(&mut session).await.unwrap(), ExportStage::Ready);
        assert_eq!(session.preview().unwrap().num_rows(), 2);

        assert_eq!(orch.confirm_export(&mut session).await.unwrap(), ExportStage::Done);
        let artifact = session.artifact().unwrap();
        assert_eq!(artifact.batches, 2);
        assert_eq!(artifact.input_rows, 4);
        assert!(artifact.degraded.is_none());
        assert_eq!(artifact.table.num_rows(), 2);
        assert_eq!(artifact.table.get(0, "impression"), Some(&Value::Int(10)));
        assert_eq!(artifact.table.get(1, "impression"), Some(&Value::Int(2)));
        assert!(artifact.csv.starts_with(UTF8_BOM));
        assert_eq!(session.message().unwrap().level, MessageLevel::Info);

        let calls = orch.executor().calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].kind, QueryKind::Count);
        assert_eq!(calls[1].limit, Some(500));
        assert_eq!(calls[2].params.range.to_string(), "2024-01-01..2024-01-07");
        assert_eq!(calls[3].params.range.to_string(), "2024-01-08..2024-01-10");
        assert_eq!(calls[3].params.storefront_ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_over_limit_is_blocked() {
        let orch = orchestrator(ScriptedExecutor::counting(50_001));
        let mut session = ExportSession::new();

        let stage = orch.request_export(&mut session, request("report")).await.unwrap();
        assert_eq!(stage, ExportStage::Blocked);

        let message = session.message().unwrap();
        assert_eq!(message.level, MessageLevel::Error);
        assert!(message.text.contains("50001"));
        assert!(message.text.contains("50,000"));

        // Only the count query ran
        assert_eq!(orch.executor().calls().len(), 1);

        let err = orch.load_preview(&mut session).await.unwrap_err();
        assert!(matches!(err, ExportError::InvalidTransition { .. }));

        orch.reset(&mut session);
        assert_eq!(session.stage(), ExportStage::Initial);
        assert!(session.message().is_none());
    }

    #[tokio::test]
    async fn test_exact_limit_is_allowed() {
        let orch = orchestrator(ScriptedExecutor::counting(50_000));
        let mut session = ExportSession::new();
        let stage = orch.request_export(&mut session, request("report")).await.unwrap();
        assert_eq!(stage, ExportStage::LoadingPreview);
    }

    #[tokio::test]
    async fn test_no_rows_returns_to_initial() {
        let orch = orchestrator(ScriptedExecutor::counting(0));
        let mut session = ExportSession::new();

        let stage = orch.request_export(&mut session, request("report")).await.unwrap();
        assert_eq!(stage, ExportStage::Initial);
        assert_eq!(session.message(), Some(&UserMessage::warning(NO_DATA_FOUND)));
    }

    #[tokio::test]
    async fn test_count_failure_returns_to_initial() {
        let mut executor = ScriptedExecutor::counting(0);
        executor.count = None;
        let orch = orchestrator(executor);
        let mut session = ExportSession::new();

        let stage = orch.request_export(&mut session, request("report")).await.unwrap();
        assert_eq!(stage, ExportStage::Initial);
        assert_eq!(session.message(), Some(&UserMessage::error(SIZE_CHECK_FAILED)));
    }

    #[tokio::test]
    async fn test_preview_query_failure_is_error() {
        let mut executor = ScriptedExecutor::counting(10);
        executor.preview_failure = Some(Failure::Query);
        let orch = orchestrator(executor);
        let mut session = ExportSession::new();

        let stage = orch.run(&mut session, request("report"), true).await.unwrap();
        assert_eq!(stage, ExportStage::Error);
        assert!(session.message().unwrap().text.contains("data query"));
        assert!(session.preview().is_none());
    }

    #[tokio::test]
    async fn test_preview_connection_failure_allows_retry() {
        let mut executor = ScriptedExecutor::counting(10);
        executor.preview_failure = Some(Failure::Connection);
        let orch = orchestrator(executor);
        let mut session = ExportSession::new();

        let stage = orch.run(&mut session, request("report"), true).await.unwrap();
        assert_eq!(stage, ExportStage::Initial);
        assert!(session.message().unwrap().text.contains("connection"));

        // A retry starts cleanly from initial
        let stage = orch.request_export(&mut session, request("report")).await.unwrap();
        assert_eq!(stage, ExportStage::LoadingPreview);
    }

    #[tokio::test]
    async fn test_new_request_drops_previous_results() {
        let mut executor = ScriptedExecutor::counting(10);
        executor.export_failure = Some(Failure::Connection);
        let orch = orchestrator(executor);
        let mut session = ExportSession::new();

        let stage = orch.run(&mut session, request("report"), true).await.unwrap();
        assert_eq!(stage, ExportStage::Initial);
        assert_eq!(session.preview().unwrap().num_rows(), 2);

        let params = QueryParams::new(DateRange::parse("2023-01-01", "2023-12-31").unwrap());
        let orch = ExportOrchestrator::new(ScriptedExecutor::counting(50_001), registry(), settings());
        let stage = orch
            .request_export(&mut session, ExportRequest::new("report", params))
            .await
            .unwrap();
        assert_eq!(stage, ExportStage::Blocked);
        assert!(session.preview().is_none());
        assert!(session.artifact().is_none());
        assert_eq!(session.row_count(), Some(50_001));
        assert_eq!(
            session.request().unwrap().params.range.to_string(),
            "2023-01-01..2023-12-31"
        );
    }

    #[tokio::test]
    async fn test_export_failure_is_error() {
        let mut executor = ScriptedExecutor::counting(10);
        executor.export_failure = Some(Failure::Query);
        let orch = orchestrator(executor);
        let mut session = ExportSession::new();

        let stage = orch.run(&mut session, request("report"), true).await.unwrap();
        assert_eq!(stage, ExportStage::Error);
        assert!(session.artifact().is_none());
        // The first batch failed, so the second was never requested
        assert_eq!(orch.executor().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_flagged() {
        let orch = orchestrator(ScriptedExecutor::counting(10));
        let mut session = ExportSession::new();

        let stage = orch.run(&mut session, request("mismatched"), true).await.unwrap();
        assert_eq!(stage, ExportStage::Done);

        let artifact = session.artifact().unwrap();
        let mismatch = artifact.degraded.as_ref().unwrap();
        assert_eq!(mismatch.missing_keys, vec!["storefront_id".to_string()]);
        assert_eq!(artifact.table.num_rows(), 4);
        assert_eq!(session.message().unwrap().level, MessageLevel::Warning);
    }

    #[tokio::test]
    async fn test_unknown_product_is_error() {
        let orch = orchestrator(ScriptedExecutor::counting(10));
        let mut session = ExportSession::new();

        let stage = orch.run(&mut session, request("no_such_report"), true).await.unwrap();
        assert_eq!(stage, ExportStage::Error);
        assert!(session.message().unwrap().text.contains("no_such_report"));
    }

    #[tokio::test]
    async fn test_run_without_confirm_stops_at_ready() {
        let orch = orchestrator(ScriptedExecutor::counting(10));
        let mut session = ExportSession::new();
        let stage = orch.run(&mut session, request("report"), false).await.unwrap();
        assert_eq!(stage, ExportStage::Ready);
        assert!(session.artifact().is_none());
    }

    #[tokio::test]
    async fn test_wrong_stage_leaves_session_untouched() {
        let orch = orchestrator(ScriptedExecutor::counting(10));
        let mut session = ExportSession::new();

        let err = orch.confirm_export(&mut session).await.unwrap_err();
        assert!(err.to_string().contains("initial"));
        assert_eq!(session.stage(), ExportStage::Initial);
        assert!(orch.executor().calls().is_empty());

        orch.run(&mut session, request("report"), false).await.unwrap();
        let err = orch
            .request_export(&mut session, request("report"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidTransition { .. }));
        assert_eq!(session.stage(), ExportStage::Ready);
    }

    #[tokio::test]
    async fn test_month_split_mode() {
        let settings = ExportConfig {
            split_mode: SplitMode::Month,
            ..settings()
        };
        let orch = ExportOrchestrator::new(ScriptedExecutor::counting(10), registry(), settings);
        let params = QueryParams::new(DateRange::parse("2024-01-15", "2024-03-10").unwrap());
        let batches = orch.plan_batches(&ExportRequest::new("report", params)).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].range().to_string(), "2024-02-01..2024-02-29");
    }

    #[test]
    fn test_batch_days_follow_storefront_count() {
        let orch = orchestrator(ScriptedExecutor::counting(10));
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let few = ExportRequest::new("report", QueryParams::new(range).with_storefronts([1]));
        assert_eq!(orch.batch_days_for(&few), 14);
        assert_eq!(orch.batch_days_for(&request("report")), 7);
    }

    #[test]
    fn test_classify_failure_follows_retryability() {
        let (stage, message) = classify_failure(&Failure::Connection.error());
        assert_eq!(stage, ExportStage::Initial);
        assert!(message.text.contains("try again"));

        let (stage, _) = classify_failure(&Failure::Query.error());
        assert_eq!(stage, ExportStage::Error);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(50_000), "50,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
    }
}
