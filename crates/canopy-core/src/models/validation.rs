//! Validation models

use anyhow::{ensure, Context as _};
use canopy_tree::{impl_properties, Capabilities, Model, Properties, RunContext, Runnable};

/// Checks a result table once every simulation and post-run tool is done
///
/// Fails when the table is missing or has fewer than `min_rows` rows. Each
/// name in `columns` must also be a column of the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCheck {
    /// Table to check
    pub table: String,
    /// Smallest acceptable row count
    pub min_rows: usize,
    /// Columns the table must have
    pub columns: Vec<String>,
}

impl TableCheck {
    /// Check that `table` exists
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Builder: require at least `rows` rows
    #[must_use]
    pub fn with_min_rows(mut self, rows: usize) -> Self {
        self.min_rows = rows;
        self
    }

    /// Builder: require `column`
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }
}

impl_properties!(TableCheck {
    table => "Table",
    min_rows => "MinRows",
    columns => "Columns",
});

impl Model for TableCheck {
    fn kind(&self) -> &str {
        "TableCheck"
    }

    fn markers(&self) -> Capabilities {
        Capabilities::VALIDATION
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        Some(self)
    }

    fn runnable(&self) -> Option<&dyn Runnable> {
        Some(self)
    }
}

impl Runnable for TableCheck {
    fn run(&self, ctx: &dyn RunContext) -> anyhow::Result<()> {
        let table = ctx
            .store()
            .read_table(&self.table)
            .with_context(|| format!("table '{}' not found", self.table))?;
        ensure!(
            table.len() >= self.min_rows,
            "table '{}' has {} rows, expected at least {}",
            table.name,
            table.len(),
            self.min_rows
        );
        for column in &self.columns {
            ensure!(
                table.column(column).is_some(),
                "table '{}' has no column '{column}'",
                table.name
            );
        }
        tracing::debug!(table = %table.name, rows = table.len(), "table check passed");
        Ok(())
    }
}
