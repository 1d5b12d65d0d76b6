//! Output formatting and colorization for batch-export
//!
//! This module turns engine results into terminal text:
//! - Preview tables
//! - Batch plans and the merge registry listing
//! - Export summaries and user messages, colored by severity

pub mod colorizer;
pub mod table;

use std::fmt::Write;
use std::path::Path;

use crate::export::orchestrator::format_thousands;
use crate::export::{ExportArtifact, MergeRegistry, UserMessage};
use crate::range::Batch;
use crate::table::ResultTable;

pub use colorizer::Colorizer;
pub use table::{TableFormatter, TableStyle};

/// Main formatter for terminal output
pub struct Formatter {
    colorizer: Colorizer,
    table: TableFormatter,
}

impl Formatter {
    /// Create a formatter
    ///
    /// # Arguments
    /// * `use_colors` - Enable colored output
    pub fn new(use_colors: bool) -> Self {
        Self {
            colorizer: Colorizer::new(use_colors),
            table: TableFormatter::with_colors(use_colors),
        }
    }

    /// Replace the table formatter
    pub fn with_table(mut self, table: TableFormatter) -> Self {
        self.table = table;
        self
    }

    pub fn message(&self, message: &UserMessage) -> String {
        self.colorizer.message(message)
    }

    /// Preview table with its row count
    pub fn preview(&self, table: &ResultTable, total_rows: Option<u64>) -> String {
        let mut out = self.table.format(table);
        if let Some(total) = total_rows {
            let _ = write!(
                out,
                "\n{}",
                self.colorizer.dim(&format!(
                    "Previewing {} of {} rows",
                    table.num_rows(),
                    format_thousands(total)
                ))
            );
        }
        out
    }

    /// One line per batch window
    pub fn batches(&self, batches: &[Batch]) -> String {
        let mut out = String::new();
        for (i, batch) in batches.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>4}  {}  {}",
                i + 1,
                batch,
                self.colorizer.dim(&format!("({} days)", batch.days()))
            );
        }
        let _ = write!(out, "{} batches", batches.len());
        out
    }

    /// Registered products with their merge keys
    pub fn products(&self, registry: &MergeRegistry) -> String {
        registry
            .iter()
            .map(|(product, config)| {
                format!(
                    "{}\n  keys: {}\n  aggregated: {}",
                    self.colorizer.bold(product),
                    config.merge_keys.join(", "),
                    config.agg.len()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Summary printed after the CSV is written
    pub fn export_summary(&self, artifact: &ExportArtifact, path: &Path) -> String {
        format!(
            "{}\n  batches: {}\n  rows fetched: {}\n  rows written: {}\n  size: {} bytes",
            self.colorizer
                .success(&format!("Exported to {}", path.display())),
            artifact.batches,
            format_thousands(artifact.input_rows as u64),
            format_thousands(artifact.table.num_rows() as u64),
            format_thousands(artifact.csv.len() as u64)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{split_by_days, DateRange};
    use crate::table::Value;

    #[test]
    fn test_batches_listing() {
        let range = DateRange::parse("2024-01-01", "2024-01-10").unwrap();
        let out = Formatter::new(false).batches(&split_by_days(range, 7).unwrap());
        assert!(out.contains("2024-01-01..2024-01-07  (7 days)"));
        assert!(out.contains("2024-01-08..2024-01-10  (3 days)"));
        assert!(out.ends_with("2 batches"));
    }

    #[test]
    fn test_products_listing() {
        let out = Formatter::new(false).products(&MergeRegistry::builtin());
        assert!(out.contains("keyword_lab"));
        assert!(out.contains("keys:"));
    }

    #[test]
    fn test_preview_counts_rows() {
        let table = ResultTable::from_rows(&["a"], vec![vec![Value::Int(1)]]).unwrap();
        let out = Formatter::new(false).preview(&table, Some(12_345));
        assert!(out.contains("Previewing 1 of 12,345 rows"));
    }
}
