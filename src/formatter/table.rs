//! Table formatting for result tables using tabled
//!
//! Renders a [`ResultTable`] (usually an export preview) for the terminal:
//! - Builder pattern over the table's own column order
//! - Per-column wrapping so long keywords do not blow up the layout
//! - Configurable styles and an optional row cap

use tabled::{
    Table,
    builder::Builder,
    settings::{Alignment, Color, Modify, Style, object::Columns, object::Rows, width::Width},
};

use crate::table::{ResultTable, Value};

/// Maximum width for a single column (characters)
const DEFAULT_MAX_COLUMN_WIDTH: usize = 40;

/// Rows rendered before the rest is summarised
const DEFAULT_MAX_ROWS: usize = 20;

/// Table formatter for result tables
pub struct TableFormatter {
    /// Maximum column width
    max_column_width: usize,

    /// Maximum rows rendered
    max_rows: usize,

    /// Table style
    style: TableStyle,

    /// Enable colored output
    use_colors: bool,
}

/// Available table styles
#[derive(Debug, Clone, Copy)]
pub enum TableStyle {
    /// Modern style with rounded corners
    Modern,
    /// ASCII style with basic characters
    Ascii,
    /// Markdown style
    Markdown,
    /// Psql style
    Psql,
}

impl TableFormatter {
    /// Create a new table formatter with default settings
    pub fn new() -> Self {
        Self {
            max_column_width: DEFAULT_MAX_COLUMN_WIDTH,
            max_rows: DEFAULT_MAX_ROWS,
            style: TableStyle::Modern,
            use_colors: false,
        }
    }

    /// Create a new table formatter with color support
    pub fn with_colors(use_colors: bool) -> Self {
        Self {
            use_colors,
            ..Self::new()
        }
    }

    /// Set the table style
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    /// Set the number of rows rendered
    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.max_rows = rows;
        self
    }

    /// Format a result table
    ///
    /// # Arguments
    /// * `table` - Table to render
    ///
    /// # Returns
    /// * `String` - Rendered table, followed by a line counting hidden rows
    pub fn format(&self, table: &ResultTable) -> String {
        if table.num_columns() == 0 {
            return "(empty result set)".to_string();
        }

        let shown = table.num_rows().min(self.max_rows);
        let mut builder = Builder::default();
        builder.push_record(table.column_names());
        for row in 0..shown {
            builder.push_record(table.row(row).into_iter().map(format_cell));
        }

        let mut rendered = builder.build();
        self.apply_style(&mut rendered);

        // Wrap instead of truncate
        for i in 0..table.num_columns() {
            rendered.with(
                Modify::new(Columns::new(i..=i)).with(Width::wrap(self.max_column_width)),
            );
        }
        rendered.with(Modify::new(Rows::first()).with(Alignment::center()));

        if self.use_colors {
            rendered.modify(Rows::first(), Color::FG_CYAN | Color::BOLD);
        }

        let mut out = rendered.to_string();
        if table.num_rows() > shown {
            out.push_str(&format!("\n... {} more rows", table.num_rows() - shown));
        }
        out
    }

    fn apply_style(&self, table: &mut Table) {
        match self.style {
            TableStyle::Modern => table.with(Style::modern()),
            TableStyle::Ascii => table.with(Style::ascii()),
            TableStyle::Markdown => table.with(Style::markdown()),
            TableStyle::Psql => table.with(Style::psql()),
        };
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
