//! Export session state
//!
//! One [`ExportSession`] holds everything a single user-initiated export
//! accumulates: the stage, the bound request, the row count, the preview and
//! the final artifact. It is created explicitly by the caller and passed to
//! the orchestrator; only orchestrator transitions change it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::executor::QueryParams;
use crate::table::ResultTable;

use super::merge::SchemaMismatch;

/// Stage of the export state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    #[default]
    Initial,
    CheckingSize,
    Blocked,
    LoadingPreview,
    Ready,
    Exporting,
    Done,
    Error,
}

impl ExportStage {
    /// Stages that only a reset can leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStage::Blocked | ExportStage::Done | ExportStage::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::Initial => "initial",
            ExportStage::CheckingSize => "checking_size",
            ExportStage::Blocked => "blocked",
            ExportStage::LoadingPreview => "loading_preview",
            ExportStage::Ready => "ready",
            ExportStage::Exporting => "exporting",
            ExportStage::Done => "done",
            ExportStage::Error => "error",
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Message shown to the user after a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl UserMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }
}

/// Everything needed to run one export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Query source the executor resolves
    pub data_source: String,

    /// Merge product; defaults to the data source name
    #[serde(default)]
    pub product: Option<String>,

    /// Date range, storefronts and filters
    pub params: QueryParams,
}

impl ExportRequest {
    pub fn new(data_source: impl Into<String>, params: QueryParams) -> Self {
        Self {
            data_source: data_source.into(),
            product: None,
            params,
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Product used to look up the merge config
    pub fn product(&self) -> &str {
        self.product.as_deref().unwrap_or(&self.data_source)
    }

    pub fn num_storefronts(&self) -> usize {
        self.params.storefront_ids.len()
    }
}

/// Finished export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    /// Merged table
    pub table: ResultTable,
    /// CSV encoding of `table` (UTF-8 with BOM)
    pub csv: Vec<u8>,
    /// Number of batches fetched, including empty ones
    pub batches: usize,
    /// Rows received from all batches before merging
    pub input_rows: usize,
    /// Present when the merge fell back to concatenation
    pub degraded: Option<SchemaMismatch>,
}

/// State of one export, owned by the caller
#[derive(Debug, Clone, Default)]
pub struct ExportSession {
    stage: ExportStage,
    request: Option<ExportRequest>,
    row_count: Option<u64>,
    preview: Option<ResultTable>,
    artifact: Option<ExportArtifact>,
    message: Option<UserMessage>,
}

impl ExportSession {
    /// Fresh session in the `initial` stage
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> ExportStage {
        self.stage
    }

    pub fn request(&self) -> Option<&ExportRequest> {
        self.request.as_ref()
    }

    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    pub fn preview(&self) -> Option<&ResultTable> {
        self.preview.as_ref()
    }

    pub fn artifact(&self) -> Option<&ExportArtifact> {
        self.artifact.as_ref()
    }

    /// Take the finished artifact out of the session
    pub fn take_artifact(&mut self) -> Option<ExportArtifact> {
        self.artifact.take()
    }

    pub fn message(&self) -> Option<&UserMessage> {
        self.message.as_ref()
    }

    /// Discard all held results and return to `initial`
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Drop everything the previous export held, keeping only the stage
    pub(crate) fn begin(&mut self) {
        *self = Self {
            stage: self.stage,
            ..Self::default()
        };
    }

    pub(crate) fn set_stage(&mut self, stage: ExportStage) {
        self.stage = stage;
    }

    pub(crate) fn set_request(&mut self, request: ExportRequest) {
        self.request = Some(request);
    }

    pub(crate) fn set_row_count(&mut self, count: u64) {
        self.row_count = Some(count);
    }

    pub(crate) fn set_preview(&mut self, preview: ResultTable) {
        self.preview = Some(preview);
    }

    pub(crate) fn set_artifact(&mut self, artifact: ExportArtifact) {
        self.artifact = Some(artifact);
    }

    pub(crate) fn set_message(&mut self, message: Option<UserMessage>) {
        self.message = message;
    }
}
