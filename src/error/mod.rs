//! Error handling for batch exports.
//!
//! Splitter and merge failures are contract violations and surface as
//! [`ExportError`] values. Executor failures are classified through
//! [`ExecutorError`] so the orchestrator can turn them into user-facing
//! messages.
//!
//! # Example
//!
//! ```rust
//! use batch_export::error::{ExecutorError, ExportError, Result};
//!
//! fn run_query() -> Result<u64> {
//!     Err(ExecutorError::ConnectionFailed("timed out".into()).into())
//! }
//!
//! match run_query() {
//!     Err(ExportError::Executor(e)) => assert!(e.is_retryable()),
//!     _ => unreachable!(),
//! }
//! ```

pub mod kinds;

pub use kinds::{ConfigError, ExecutorError, ExportError, Result};
