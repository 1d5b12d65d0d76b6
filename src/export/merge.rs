//! Merge engine: re-aggregation of batch results
//!
//! A logical group (one keyword in one month, say) can receive rows from two
//! adjacent batches when its window straddles a batch boundary. Dropping
//! exact duplicates does not fix that; the partial rows have to be combined
//! again by key with the same operators the source query used. This module
//! does that combination.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::Result;
use crate::table::{Column, ResultTable, Value};

use super::registry::{AggOp, MergeConfig, MergeRegistry};

/// Configured merge keys missing from the fetched columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub product: String,
    pub missing_keys: Vec<String>,
    pub available_columns: Vec<String>,
}

/// Result of merging batch tables
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Merged table
    pub table: ResultTable,
    /// Rows received before merging
    pub input_rows: usize,
    /// Set when the merge fell back to plain concatenation
    pub degraded: Option<SchemaMismatch>,
}

impl MergeOutcome {
    fn exact(table: ResultTable, input_rows: usize) -> Self {
        Self {
            table,
            input_rows,
            degraded: None,
        }
    }

    /// Whether the output may still contain rows sharing a key
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Combines partial result tables per product
#[derive(Debug, Clone)]
pub struct MergeEngine {
    registry: MergeRegistry,
}

impl MergeEngine {
    pub fn new(registry: MergeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MergeRegistry {
        &self.registry
    }

    /// Merge batch tables into one table
    ///
    /// - no tables: empty table
    /// - one table: returned as is, without a grouping pass
    /// - otherwise: concatenated, then grouped by the product's merge keys
    ///
    /// # Arguments
    /// * `tables` - Batch results in batch order
    /// * `product` - Product identifier used to look up the merge config
    ///
    /// # Returns
    /// * `Result<MergeOutcome>` - Merged table, or `UnknownProduct`
    pub fn merge(&self, mut tables: Vec<ResultTable>, product: &str) -> Result<MergeOutcome> {
        match tables.len() {
            0 => return Ok(MergeOutcome::exact(ResultTable::empty(), 0)),
            1 => {
                let table = tables.remove(0);
                let rows = table.num_rows();
                return Ok(MergeOutcome::exact(table, rows));
            }
            _ => {}
        }

        let combined = ResultTable::concat(&tables);
        let input_rows = combined.num_rows();
        let config = self.registry.get(product)?;

        let missing_keys: Vec<String> = config
            .merge_keys
            .iter()
            .filter(|k| !combined.has_column(k))
            .cloned()
            .collect();

        if !missing_keys.is_empty() {
            let available_columns: Vec<String> =
                combined.column_names().into_iter().map(str::to_string).collect();
            warn!(
                "Merge keys {:?} for '{}' not found in columns {:?}; returning unaggregated rows",
                missing_keys, product, available_columns
            );
            return Ok(MergeOutcome {
                table: combined,
                input_rows,
                degraded: Some(SchemaMismatch {
                    product: product.to_string(),
                    missing_keys,
                    available_columns,
                }),
            });
        }

        for column in config.agg.keys() {
            if !combined.has_column(column) {
                debug!("Aggregated column '{}' absent from '{}' results", column, product);
            }
        }

        let table = group_and_aggregate(&combined, config)?;
        debug!(
            "Merged {} batches of '{}': {} rows -> {} rows",
            tables.len(),
            product,
            input_rows,
            table.num_rows()
        );
        Ok(MergeOutcome::exact(table, input_rows))
    }
}

/// Hashable projection of a key cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Date(chrono::NaiveDate),
    Text(String),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Int(i) => KeyPart::Int(*i),
            // 3 and 3.0 must land in the same group
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                KeyPart::Int(*f as i64)
            }
            Value::Float(f) if f.is_nan() => KeyPart::Null,
            Value::Float(f) => KeyPart::Float(f.to_bits()),
            Value::Date(d) => KeyPart::Date(*d),
            Value::Text(s) => KeyPart::Text(s.clone()),
        }
    }
}

/// Group rows by the config's keys and aggregate every other column
///
/// Groups appear in the order their first row appears. Column order is
/// kept from the input table.
pub fn group_and_aggregate(table: &ResultTable, config: &MergeConfig) -> Result<ResultTable> {
    let key_indices: Vec<usize> = config
        .merge_keys
        .iter()
        .filter_map(|k| table.column_index(k))
        .collect();

    let mut group_of: HashMap<Vec<KeyPart>, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for row in 0..table.num_rows() {
        let key: Vec<KeyPart> = key_indices
            .iter()
            .map(|&c| KeyPart::from(&table.columns()[c].values[row]))
            .collect();
        match group_of.get(&key) {
            Some(&g) => groups[g].push(row),
            None => {
                group_of.insert(key, groups.len());
                groups.push(vec![row]);
            }
        }
    }

    let columns = table
        .columns()
        .iter()
        .map(|column| {
            let op = config.op_for(&column.name).unwrap_or(AggOp::First);
            let values = groups
                .iter()
                .map(|rows| aggregate(op, rows.iter().map(|&r| &column.values[r])))
                .collect();
            Column::new(column.name.clone(), values)
        })
        .collect();

    ResultTable::from_columns(columns)
}

/// Apply one operator to the values of a group, in arrival order
pub fn aggregate<'a>(op: AggOp, mut values: impl Iterator<Item = &'a Value>) -> Value {
    match op {
        AggOp::First => values.next().cloned().unwrap_or(Value::Null),
        AggOp::Sum => sum(values),
        AggOp::Mean => {
            let (total, count) = values
                .filter_map(Value::as_f64)
                .fold((0.0, 0usize), |(t, n), v| (t + v, n + 1));
            if count == 0 {
                Value::Null
            } else {
                Value::Float(total / count as f64)
            }
        }
        AggOp::Max => values
            .filter(|v| !is_missing(v))
            .max_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
        AggOp::Min => values
            .filter(|v| !is_missing(v))
            .min_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Float(f) => f.is_nan(),
        _ => false,
    }
}

/// Sum with missing values counted as zero
///
/// Stays integral while every present value is an integer.
fn sum<'a>(values: impl Iterator<Item = &'a Value>) -> Value {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;

    for value in values {
        match value {
            Value::Int(i) => {
                int_total = int_total.and_then(|t| t.checked_add(*i));
                float_total += *i as f64;
            }
            other => {
                if let Some(f) = other.as_f64() {
                    int_total = None;
                    float_total += f;
                }
            }
        }
    }

    match int_total {
        Some(t) => Value::Int(t),
        None => Value::Float(float_total),
    }
}
