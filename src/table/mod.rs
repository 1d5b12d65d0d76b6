//! Column-oriented result tables
//!
//! A [`ResultTable`] is what one query (or one batch of a query) returns: an
//! ordered list of named columns of equal length. Tables from different
//! batches are stitched together with [`ResultTable::concat`].

pub mod value;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

pub use value::Value;

/// A named column of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Tabular query result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<Column>,
    num_rows: usize,
}

impl ResultTable {
    /// Create an empty table with no columns
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from columns
    ///
    /// # Returns
    /// * `Result<Self>` - Table, or an error if columns differ in length or
    ///   a column name repeats
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, |c| c.values.len());
        let mut seen = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if column.values.len() != num_rows {
                return Err(ExportError::Generic(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    num_rows
                )));
            }
            if seen.insert(column.name.as_str(), i).is_some() {
                return Err(ExportError::Generic(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns, num_rows })
    }

    /// Build a table from a header and row-major values
    pub fn from_rows(header: &[&str], rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Column> = header
            .iter()
            .map(|name| Column::new(*name, Vec::with_capacity(rows.len())))
            .collect();
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ExportError::Generic(format!(
                    "row {r} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }
        Self::from_columns(columns)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at (`row`, `column`)
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    /// Values of one row, in column order
    pub fn row(&self, row: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[row]).collect()
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> ResultTable {
        self.take_rows(&(0..n.min(self.num_rows)).collect::<Vec<_>>())
    }

    /// New table holding the given rows, in the given order
    pub fn take_rows(&self, rows: &[usize]) -> ResultTable {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), rows.iter().map(|&r| c.values[r].clone()).collect()))
            .collect();
        ResultTable {
            columns,
            num_rows: rows.len(),
        }
    }

    /// Concatenate tables top to bottom
    ///
    /// Rows keep their order (all rows of the first table, then the second,
    /// ...). The output has the union of all columns in first-seen order;
    /// a table lacking a column contributes `Null` cells for it.
    pub fn concat(tables: &[ResultTable]) -> ResultTable {
        let mut names: Vec<&str> = Vec::new();
        for table in tables {
            for column in &table.columns {
                if !names.contains(&column.name.as_str()) {
                    names.push(&column.name);
                }
            }
        }

        let total_rows: usize = tables.iter().map(|t| t.num_rows).sum();
        let mut columns: Vec<Column> = names
            .iter()
            .map(|name| Column::new(*name, Vec::with_capacity(total_rows)))
            .collect();

        for table in tables {
            for column in columns.iter_mut() {
                match table.column(&column.name) {
                    Some(src) => column.values.extend(src.values.iter().cloned()),
                    None => column
                        .values
                        .extend(std::iter::repeat_n(Value::Null, table.num_rows)),
                }
            }
        }

        ResultTable {
            columns,
            num_rows: total_rows,
        }
    }
}
