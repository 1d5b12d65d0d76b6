//! Batch export library
//!
//! Core of the `batch-export` tool: exporting a date-ranged report by
//! splitting the range into batches, fetching each batch sequentially,
//! merging rows that straddle batch boundaries and encoding the result as
//! CSV. It can be used on its own with any [`executor::QueryExecutor`].
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `executor`: Query executor seam, row counting, caching, CSV source
//! - `export`: Batch fetcher, merge engine, CSV output and the export state machine
//! - `formatter`: Terminal output formatting
//! - `range`: Date ranges and batch splitting
//! - `table`: Columnar result tables
//!
//! # Example
//!
//! ```no_run
//! use batch_export::range::{DateRange, split_by_days};
//!
//! let range = DateRange::parse("2024-01-01", "2024-01-10").unwrap();
//! let batches = split_by_days(range, 7).unwrap();
//! assert_eq!(batches.len(), 2);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod export;
pub mod formatter;
pub mod range;
pub mod table;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
pub use executor::{QueryExecutor, QueryParams, QueryRequest};
pub use export::{ExportOrchestrator, ExportRequest, ExportSession, ExportStage, MergeEngine};
pub use range::{Batch, DateRange};
pub use table::{ResultTable, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
