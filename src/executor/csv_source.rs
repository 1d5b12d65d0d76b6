//! Executor over a local CSV file
//!
//! The file holds day-level rows: one date column, an optional storefront
//! column, and any number of dimension and metric columns. A data query
//! keeps the rows inside the window that match the storefronts and filters,
//! then groups them with the product's merge config the way a reporting
//! query groups over its window. A count query returns the number of rows
//! the data query would return.
//!
//! Because every window is grouped on its own, exporting a range in batches
//! and merging the batches gives the same rows as one unbatched query (for
//! every operator except `mean`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::config::SourceConfig;
use crate::error::{ExecutorError, Result};
use crate::export::merge::group_and_aggregate;
use crate::export::registry::MergeRegistry;
use crate::range::parse_date;
use crate::table::{Column, ResultTable, Value};

use super::{QueryExecutor, QueryKind, QueryParams, QueryRequest};

/// [`QueryExecutor`] backed by a CSV file
pub struct CsvSourceExecutor {
    path: PathBuf,
    layout: SourceConfig,
    registry: MergeRegistry,
}

impl CsvSourceExecutor {
    /// Create an executor over `path`
    ///
    /// # Arguments
    /// * `path` - CSV file with a header row
    /// * `layout` - Names of the date and storefront columns
    /// * `registry` - Grouping used per data source; unknown sources are not grouped
    pub fn new(path: impl Into<PathBuf>, layout: SourceConfig, registry: MergeRegistry) -> Self {
        Self {
            path: path.into(),
            layout,
            registry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file into a table
    ///
    /// A file that cannot be read is reported as a lost connection, a file
    /// that cannot be parsed as a failed query.
    pub async fn load(&self) -> Result<ResultTable> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ExecutorError::ConnectionFailed(format!("{}: {}", self.path.display(), e))
        })?;
        parse_csv(&bytes)
    }

    fn select(&self, table: &ResultTable, params: &QueryParams) -> Result<ResultTable> {
        let Some(dates) = table.column(&self.layout.date_column) else {
            return Err(ExecutorError::QueryFailed(format!(
                "date column '{}' not found in {}",
                self.layout.date_column,
                self.path.display()
            ))
            .into());
        };
        let storefronts = table.column(&self.layout.storefront_column);

        let filters: Vec<(&Column, &Value)> = params
            .filters
            .iter()
            .filter_map(|(name, wanted)| match table.column(name) {
                Some(column) => Some((column, wanted)),
                None => {
                    debug!("Ignoring filter on missing column '{}'", name);
                    None
                }
            })
            .collect();

        let mut keep = Vec::new();
        for row in 0..table.num_rows() {
            if !in_window(&dates.values[row], params)? {
                continue;
            }
            if let Some(column) = storefronts {
                if !params.storefront_ids.is_empty() {
                    let id = column.values[row].as_i64();
                    if !id.is_some_and(|id| params.storefront_ids.contains(&id)) {
                        continue;
                    }
                }
            }
            if filters
                .iter()
                .all(|(column, wanted)| column.values[row].total_cmp(wanted).is_eq())
            {
                keep.push(row);
            }
        }

        trace!("Selected {} of {} source rows", keep.len(), table.num_rows());
        Ok(table.take_rows(&keep))
    }

    fn group(&self, data_source: &str, table: ResultTable) -> Result<ResultTable> {
        match self.registry.get(data_source) {
            Ok(config) => group_and_aggregate(&table, config),
            Err(_) => Ok(table),
        }
    }
}

#[async_trait]
impl QueryExecutor for CsvSourceExecutor {
    async fn execute(&self, request: &QueryRequest) -> Result<ResultTable> {
        let source = self.load().await?;
        let selected = self.select(&source, &request.params)?;
        let grouped = self.group(&request.data_source, selected)?;

        debug!(
            "{} query on {} for {}: {} rows",
            request.kind,
            request.data_source,
            request.params.range,
            grouped.num_rows()
        );

        match request.kind {
            QueryKind::Count => ResultTable::from_columns(vec![Column::new(
                "count",
                vec![Value::Int(grouped.num_rows() as i64)],
            )]),
            QueryKind::Data => Ok(match request.limit {
                Some(n) => grouped.head(n),
                None => grouped,
            }),
        }
    }
}

fn in_window(cell: &Value, params: &QueryParams) -> Result<bool> {
    let date = match cell {
        Value::Date(d) => *d,
        Value::Text(s) => parse_date(s.trim()).map_err(|_| {
            ExecutorError::QueryFailed(format!("unparseable date '{s}' in source"))
        })?,
        Value::Null => return Ok(false),
        other => {
            return Err(
                ExecutorError::QueryFailed(format!("unparseable date '{other}' in source")).into(),
            );
        }
    };
    Ok(params.range.contains(date))
}

/// Parse CSV bytes (header row required) into a table of inferred values
pub fn parse_csv(bytes: &[u8]) -> Result<ResultTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| ExecutorError::QueryFailed(format!("invalid CSV header: {e}")))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); header.len()];
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| ExecutorError::QueryFailed(format!("invalid CSV row {}: {e}", line + 1)))?;
        for (i, column) in values.iter_mut().enumerate() {
            column.push(record.get(i).map_or(Value::Null, Value::infer));
        }
    }

    ResultTable::from_columns(
        header
            .into_iter()
            .zip(values)
            .map(|(name, values)| Column::new(name, values))
            .collect(),
    )
}
