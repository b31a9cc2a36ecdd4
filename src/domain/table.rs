// ============================================================
// Layer 3 — Table Domain Type
// ============================================================
// An in-memory, column-oriented view of one CSV dataset.
//
// Each column keeps its own storage so that numeric work
// (medians, scaling, tree splits) never has to re-parse text:
//
//   Numeric → Vec<f64>                   NaN marks a missing cell
//   Text    → Vec<Option<String>>        None marks an empty cell
//   Date    → Vec<Option<NaiveDateTime>> None marks a missing date
//
// Infinities are valid numeric values, not missing ones.
// Column order is significant: it is the order features are
// selected in, and that order ends up in the exported metadata.
//
// Reference: Rust Book §6 (Enums), §8 (Collections)

use anyhow::{bail, Result};
use chrono::NaiveDateTime;

/// Typed storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<NaiveDateTime>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v)    => v.len(),
            Column::Date(v)    => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Column::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Number of missing cells in this column
    pub fn missing_count(&self) -> usize {
        match self {
            Column::Numeric(v) => v.iter().filter(|x| x.is_nan()).count(),
            Column::Text(v)    => v.iter().filter(|x| x.is_none()).count(),
            Column::Date(v)    => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Short type name used in logs and profiles
    pub fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Text(_)    => "text",
            Column::Date(_)    => "date",
        }
    }
}

/// An ordered collection of equally long, named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names:   Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows (0 for a table without columns)
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    /// Iterate `(name, column)` pairs in table order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter_mut())
    }

    /// Append a column at the end, or replace it in place if the name exists.
    /// Fails if the length does not match the existing rows.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            bail!(
                "Column '{}' has {} rows, table has {}",
                name,
                column.len(),
                self.n_rows()
            );
        }
        match self.position(&name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// Remove a column, returning it if it was present
    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let i = self.position(name)?;
        self.names.remove(i);
        Some(self.columns.remove(i))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new();
        t.insert("a", Column::Numeric(vec![1.0, f64::NAN, 3.0])).unwrap();
        t.insert("b", Column::Text(vec![Some("x".into()), None, Some("y".into())])).unwrap();
        t
    }

    #[test]
    fn test_insert_keeps_order() {
        let t = sample();
        assert_eq!(t.column_names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(t.n_rows(), 3);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut t = sample();
        t.insert("a", Column::Numeric(vec![0.0; 3])).unwrap();
        assert_eq!(t.column_names()[0], "a");
        assert_eq!(t.column("a").unwrap().as_numeric().unwrap(), &[0.0; 3]);
    }

    #[test]
    fn test_insert_rejects_wrong_length() {
        let mut t = sample();
        assert!(t.insert("c", Column::Numeric(vec![1.0])).is_err());
    }

    #[test]
    fn test_missing_count_per_kind() {
        let t = sample();
        assert_eq!(t.column("a").unwrap().missing_count(), 1);
        assert_eq!(t.column("b").unwrap().missing_count(), 1);
    }
}
