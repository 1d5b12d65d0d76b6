//! Query execution seam
//!
//! The export engine never talks to a database directly. It hands a
//! [`QueryRequest`] to a [`QueryExecutor`] and gets a [`ResultTable`] back.
//! This module provides:
//! - The executor trait and request types
//! - The row-count estimator built on a `count` query
//! - [`CachedExecutor`]: TTL memoisation of identical requests
//! - [`CsvSourceExecutor`]: an executor over a local day-level CSV file

pub mod cache;
pub mod csv_source;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExecutorError, Result};
use crate::range::DateRange;
use crate::table::{ResultTable, Value};

pub use cache::CachedExecutor;
pub use csv_source::CsvSourceExecutor;

/// Kind of query the executor should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Rows of the report
    Data,
    /// Single-cell row count of the report
    Count,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Data => f.write_str("data"),
            QueryKind::Count => f.write_str("count"),
        }
    }
}

/// Bound parameters shared by the count, preview and export queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Inclusive date window
    pub range: DateRange,

    /// Selected storefront identifiers
    #[serde(default)]
    pub storefront_ids: Vec<i64>,

    /// Optional equality filters (device type, display type, ...)
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
}

impl QueryParams {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            storefront_ids: Vec::new(),
            filters: BTreeMap::new(),
        }
    }

    pub fn with_storefronts(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.storefront_ids = ids.into_iter().collect();
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Same parameters over a different window
    pub fn for_range(&self, range: DateRange) -> Self {
        Self {
            range,
            storefront_ids: self.storefront_ids.clone(),
            filters: self.filters.clone(),
        }
    }
}

/// One query against a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub kind: QueryKind,
    pub data_source: String,
    /// Row limit, only meaningful for `Data` queries
    pub limit: Option<usize>,
    pub params: QueryParams,
}

impl QueryRequest {
    pub fn data(data_source: impl Into<String>, params: QueryParams) -> Self {
        Self {
            kind: QueryKind::Data,
            data_source: data_source.into(),
            limit: None,
            params,
        }
    }

    pub fn count(data_source: impl Into<String>, params: QueryParams) -> Self {
        Self {
            kind: QueryKind::Count,
            data_source: data_source.into(),
            limit: None,
            params,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Something that can run report queries
///
/// Implementations report failures as [`ExecutorError`] wrapped in the crate
/// error, so callers can tell a dropped connection from a bad query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a query and return its tabular result
    async fn execute(&self, request: &QueryRequest) -> Result<ResultTable>;
}

#[async_trait]
impl<E: QueryExecutor + ?Sized> QueryExecutor for Arc<E> {
    async fn execute(&self, request: &QueryRequest) -> Result<ResultTable> {
        (**self).execute(request).await
    }
}

/// Estimate the number of rows a data query would return
///
/// Runs the `count` query and reads its first cell. An empty count result
/// means zero rows.
pub async fn count_rows<E: QueryExecutor + ?Sized>(
    executor: &E,
    data_source: &str,
    params: &QueryParams,
) -> Result<u64> {
    let table = executor
        .execute(&QueryRequest::count(data_source, params.clone()))
        .await?;

    let Some(first) = table.columns().first().and_then(|c| c.values.first()) else {
        debug!("Count query for {} returned no rows", data_source);
        return Ok(0);
    };

    match first {
        Value::Null => Ok(0),
        other => other
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                ExecutorError::QueryFailed(format!("count query returned non-count value '{other}'"))
                    .into()
            }),
    }
}

/// Fetch report rows for one window, optionally limited
pub async fn fetch_data<E: QueryExecutor + ?Sized>(
    executor: &E,
    data_source: &str,
    params: &QueryParams,
    limit: Option<usize>,
) -> Result<ResultTable> {
    let mut request = QueryRequest::data(data_source, params.clone());
    request.limit = limit;
    executor.execute(&request).await
}
