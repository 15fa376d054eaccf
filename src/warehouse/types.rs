//! Statement and result-set types shared by warehouse backends

use serde::Serialize;

/// A single bound parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum Binding {
    Text(String),
}

/// Parameterized SQL statement. Placeholders are positional `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    pub fn bind_text(mut self, value: impl Into<String>) -> Self {
        self.bindings.push(Binding::Text(value.into()));
        self
    }
}

/// Rows returned by a statement. Cells are nullable strings, as the warehouse
/// serializes every column type to text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn first_row(&self) -> Option<Row<'_>> {
        self.rows.first().map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }
}

/// Borrowed view of one row with column lookup
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    cells: &'a [Option<String>],
}

impl<'a> Row<'a> {
    /// Column names are matched case-insensitively, as unquoted warehouse
    /// identifiers are upper-cased.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self
            .columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))?;
        self.cells.get(index)?.as_deref()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns
            .iter()
            .any(|name| name.eq_ignore_ascii_case(column))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Option<&'a str>)> + 'a {
        let (columns, cells) = (self.columns, self.cells);
        columns
            .iter()
            .enumerate()
            .map(move |(i, name)| (name.as_str(), cells.get(i).and_then(|c| c.as_deref())))
    }
}
