//! Result sink used by running models
//!
//! The storage backend is a collaborator; models only see the [`DataStore`]
//! trait. Tables are column-ordered rows of JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One output row, keyed by column name
pub type Row = Map<String, Value>;

/// Column name every row written by a simulation carries
pub const SIMULATION_NAME_COLUMN: &str = "SimulationName";

/// A named table read back from a [`DataStore`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Column names in first-seen order
    pub columns: Vec<String>,
    /// Rows, one value per column (`null` where a row lacked the column)
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append a row, widening the column set as needed
    pub fn push(&mut self, row: Row) {
        for key in row.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
                for existing in &mut self.rows {
                    existing.push(Value::Null);
                }
            }
        }
        let values = self
            .columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        self.rows.push(values);
    }

    /// Values of one column
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Tabular sink shared by every unit of a run
///
/// Implementations must tolerate concurrent writes from worker threads.
pub trait DataStore: Send + Sync {
    /// Append a row to a table, creating the table if needed
    fn write_row(&self, table: &str, row: Row);

    /// Snapshot of a table
    fn read_table(&self, table: &str) -> Option<Table>;

    /// Names of all tables
    fn table_names(&self) -> Vec<String>;

    /// Drop rows previously written by the named simulations
    fn clean(&self, simulation_names: &[String]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn push_widens_columns() {
        let mut table = Table::new("Report");
        table.push(row(&[("a", json!(1))]));
        table.push(row(&[("a", json!(2)), ("b", json!("x"))]));

        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows[0], vec![json!(1), Value::Null]);
        assert_eq!(table.rows[1], vec![json!(2), json!("x")]);
    }

    #[test]
    fn column_lookup() {
        let mut table = Table::new("Report");
        table.push(row(&[("a", json!(1))]));
        table.push(row(&[("a", json!(5))]));

        let col = table.column("a").unwrap();
        assert_eq!(col, vec![&json!(1), &json!(5)]);
        assert!(table.column("missing").is_none());
        assert_eq!(table.len(), 2);
    }
}
