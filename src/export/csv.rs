//! CSV output
//!
//! Exports are spreadsheet-bound, so the encoding is fixed: UTF-8 with a
//! byte-order mark, comma separator, a header row, no row-index column, and
//! values quoted only when they contain a separator, quote or line break.

use std::path::Path;

use chrono::Local;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::table::ResultTable;

/// UTF-8 byte-order mark written at the start of every export
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encode a table as CSV bytes (BOM, header, rows)
pub fn encode_csv(table: &ResultTable) -> Vec<u8> {
    let mut out = Vec::with_capacity(UTF8_BOM.len() + 64 * (table.num_rows() + 1));
    out.extend_from_slice(UTF8_BOM);
    out.extend_from_slice(header_line(table).as_bytes());
    out.push(b'\n');
    for row in 0..table.num_rows() {
        out.extend_from_slice(row_line(table, row).as_bytes());
        out.push(b'\n');
    }
    out
}

fn header_line(table: &ResultTable) -> String {
    table
        .columns()
        .iter()
        .map(|c| escape_csv_value(&c.name))
        .collect::<Vec<_>>()
        .join(",")
}

fn row_line(table: &ResultTable, row: usize) -> String {
    table
        .row(row)
        .into_iter()
        .map(|v| escape_csv_value(&v.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Escape a CSV value if necessary
///
/// # Arguments
/// * `value` - Value to escape
///
/// # Returns
/// * `String` - Escaped value
pub fn escape_csv_value(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        // Wrap in quotes and escape internal quotes by doubling them
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Suggested output filename for a data source
pub fn default_filename(data_source: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    format!("{data_source}-{timestamp}.csv")
}

/// Check that the parent directory of `path` exists
pub fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ExportError::Generic(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }
    Ok(())
}

/// Buffered CSV file writer
///
/// Writes already-encoded export bytes, or encodes a table on the fly.
pub struct CsvWriter {
    /// Buffered file writer
    writer: BufWriter<File>,
    /// Path to the output file
    path: String,
    /// Bytes written so far
    written: u64,
}

impl CsvWriter {
    /// Create a new CSV writer
    ///
    /// # Arguments
    /// * `path` - Output file path
    ///
    /// # Returns
    /// * `Result<Self>` - New writer instance or error
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        validate_path(path)?;
        let file = File::create(path).await.map_err(|e| {
            ExportError::Generic(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        debug!("Created CSV writer for: {}", path.display());

        Ok(Self {
            writer: BufWriter::with_capacity(8 * 1024 * 1024, file),
            path: path.display().to_string(),
            written: 0,
        })
    }

    /// Write pre-encoded CSV bytes
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await.map_err(|e| {
            ExportError::Generic(format!("Failed to write {}: {}", self.path, e))
        })?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flush buffered output
    pub async fn finalize(&mut self) -> Result<u64> {
        self.writer.flush().await.map_err(|e| {
            ExportError::Generic(format!("Failed to flush file {}: {}", self.path, e))
        })?;

        debug!("Finalized CSV file: {} ({} bytes)", self.path, self.written);
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use tokio::fs;

    fn sample() -> ResultTable {
        ResultTable::from_rows(
            &["keyword", "click", "roas"],
            vec![
                vec!["giày, nam".into(), Value::Int(3), Value::Float(1.5)],
                vec!["Quote: \"x\"".into(), Value::Null, Value::Float(2.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_has_bom_header_and_no_index() {
        let bytes = encode_csv(&sample());
        assert!(bytes.starts_with(UTF8_BOM));

        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "keyword,click,roas");
        assert_eq!(lines[1], "\"giày, nam\",3,1.5");
        assert_eq!(lines[2], "\"Quote: \"\"x\"\"\",,2.0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_encode_empty_table() {
        let bytes = encode_csv(&ResultTable::empty());
        assert_eq!(bytes, b"\xEF\xBB\xBF\n".to_vec());
    }

    #[test]
    fn test_csv_escape_value() {
        assert_eq!(escape_csv_value("simple"), "simple");
        assert_eq!(escape_csv_value("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv_value("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv_value("with\nnewline"), "\"with\nnewline\"");
    }

    #[test]
    fn test_default_filename_extension() {
        let name = default_filename("keyword_lab");
        assert!(name.starts_with("keyword_lab-"));
        assert!(name.ends_with(".csv"));
    }

    #[tokio::test]
    async fn test_csv_writer_round_trip_to_disk() {
        let path = std::env::temp_dir().join("batch_export_writer_test.csv");
        let mut writer = CsvWriter::new(&path).await.unwrap();
        writer.write_bytes(&encode_csv(&sample())).await.unwrap();
        let size = writer.finalize().await.unwrap();

        let content = fs::read(&path).await.unwrap();
        assert_eq!(content.len() as u64, size);
        assert_eq!(content, encode_csv(&sample()));

        fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_csv_writer_missing_directory() {
        let path = std::env::temp_dir()
            .join("batch_export_no_such_dir")
            .join("out.csv");
        assert!(CsvWriter::new(&path).await.is_err());
    }
}
