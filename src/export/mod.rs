//! Batched export pipeline
//!
//! Large report exports are cut into date windows, fetched one window at a
//! time, merged back into a single table and encoded as CSV.
//!
//! # Architecture
//!
//! The pipeline is built on four components:
//!
//! 1. **BatchFetcher**: runs one query per window, in order, with progress feedback
//! 2. **MergeEngine**: re-groups rows that straddle window boundaries per product
//! 3. **encode_csv / CsvWriter**: spreadsheet-friendly CSV output (UTF-8 with BOM)
//! 4. **ExportOrchestrator**: the state machine around them, from size check
//!    through preview to the finished artifact
//!
//! # Example
//!
//! ```no_run
//! use batch_export::config::ExportConfig;
//! use batch_export::executor::{CsvSourceExecutor, QueryParams};
//! use batch_export::export::{ExportOrchestrator, ExportRequest, ExportSession, MergeRegistry};
//! use batch_export::range::DateRange;
//!
//! # async fn demo() -> batch_export::Result<()> {
//! let registry = MergeRegistry::builtin();
//! let executor = CsvSourceExecutor::new("daily.csv", Default::default(), registry.clone());
//! let orchestrator = ExportOrchestrator::new(executor, registry, ExportConfig::default());
//!
//! let params = QueryParams::new(DateRange::parse("2024-01-01", "2024-03-31")?).with_storefronts([7]);
//! let mut session = ExportSession::new();
//! orchestrator
//!     .run(&mut session, ExportRequest::new("keyword_lab", params), true)
//!     .await?;
//!
//! if let Some(artifact) = session.artifact() {
//!     std::fs::write("keyword_lab.csv", &artifact.csv)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod csv;
pub mod fetcher;
pub mod merge;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod state;

pub use csv::{encode_csv, CsvWriter, UTF8_BOM};
pub use fetcher::{fetch_all, BatchFetcher};
pub use merge::{MergeEngine, MergeOutcome, SchemaMismatch};
pub use orchestrator::ExportOrchestrator;
pub use progress::{ProgressTracker, Spinner};
pub use registry::{AggOp, MergeConfig, MergeRegistry};
pub use state::{
    ExportArtifact, ExportRequest, ExportSession, ExportStage, MessageLevel, UserMessage,
};
