//! In-memory result store

use canopy_tree::{DataStore, Row, Table, SIMULATION_NAME_COLUMN};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

/// [`DataStore`] keeping every table in memory
///
/// Tables are listed in creation order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<IndexMap<String, Table>>,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all tables
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.read().values().map(Table::len).sum()
    }
}

impl DataStore for InMemoryStore {
    fn write_row(&self, table: &str, row: Row) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_insert_with(|| Table::new(table))
            .push(row);
    }

    fn read_table(&self, table: &str) -> Option<Table> {
        let tables = self.tables.read();
        tables
            .get(table)
            .or_else(|| {
                tables
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(table))
                    .map(|(_, t)| t)
            })
            .cloned()
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    fn clean(&self, simulation_names: &[String]) {
        let mut tables = self.tables.write();
        for table in tables.values_mut() {
            let Some(idx) = table
                .columns
                .iter()
                .position(|c| c == SIMULATION_NAME_COLUMN)
            else {
                continue;
            };
            let before = table.rows.len();
            table.rows.retain(|row| match &row[idx] {
                Value::String(name) => !simulation_names.contains(name),
                _ => true,
            });
            if table.rows.len() != before {
                tracing::debug!(
                    table = %table.name,
                    removed = before - table.rows.len(),
                    "cleaned rows"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(sim: &str, value: i64) -> Row {
        let mut row = Row::new();
        row.insert(SIMULATION_NAME_COLUMN.to_string(), json!(sim));
        row.insert("Value".to_string(), json!(value));
        row
    }

    #[test]
    fn write_and_read() {
        let store = InMemoryStore::new();
        store.write_row("Report", row("A", 1));
        store.write_row("Report", row("B", 2));
        store.write_row("Other", row("A", 3));

        assert_eq!(store.table_names(), ["Report", "Other"]);
        let table = store.read_table("report").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("Value").unwrap(), [&json!(1), &json!(2)]);
        assert!(store.read_table("Missing").is_none());
    }

    #[test]
    fn clean_drops_named_simulations_only() {
        let store = InMemoryStore::new();
        store.write_row("Report", row("A", 1));
        store.write_row("Report", row("B", 2));
        store.write_row("Other", row("A", 3));

        store.clean(&["A".to_string()]);

        assert_eq!(store.read_table("Report").unwrap().len(), 1);
        assert!(store.read_table("Other").unwrap().is_empty());
        assert_eq!(store.row_count(), 1);
    }
}
