//! Output models

use super::parameters::Clock;
use anyhow::Context as _;
use canopy_tree::{
    impl_properties, AsAny, Capabilities, Dependent, LinkSlot, Model, NodeId, Properties,
    RunContext, Runnable, Row, SIMULATION_NAME_COLUMN,
};
use serde_json::{json, Value};

/// Writes one row per clock step to the result store
///
/// Each entry of `variables` is a locator path, optionally followed by
/// `as <Column>`. Without an alias the column is named after the path's last
/// segment.
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// Locator paths of the values to record
    pub variables: Vec<String>,
    /// Output table; defaults to the node name
    pub table_name: String,
    clock: Option<NodeId>,
}

impl Report {
    /// Report recording `variables`
    #[must_use]
    pub fn new<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Clock the report is bound to
    #[must_use]
    pub fn clock(&self) -> Option<NodeId> {
        self.clock
    }
}

/// Split `path as Column` into the path and its column name
fn column_of(variable: &str) -> (&str, String) {
    if let Some((path, alias)) = variable.rsplit_once(" as ") {
        return (path.trim(), alias.trim().to_string());
    }
    let path = variable.trim();
    let last = path
        .rsplit('.')
        .next()
        .unwrap_or(path)
        .trim_matches(|c| c == '[' || c == ']');
    (path, last.to_string())
}

impl_properties!(Report {
    variables => "Variables",
    table_name => "TableName",
});

impl Model for Report {
    fn kind(&self) -> &str {
        "Report"
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        Some(self)
    }

    fn dependent(&self) -> Option<&dyn Dependent> {
        Some(self)
    }

    fn dependent_mut(&mut self) -> Option<&mut dyn Dependent> {
        Some(self)
    }

    fn runnable(&self) -> Option<&dyn Runnable> {
        Some(self)
    }
}

impl Dependent for Report {
    fn link_slots(&self) -> Vec<LinkSlot> {
        vec![LinkSlot::by_kind("clock", "Clock")]
    }

    fn bind(&mut self, field: &str, targets: &[NodeId]) {
        if field == "clock" {
            self.clock = targets.first().copied();
        }
    }
}

impl Runnable for Report {
    fn run(&self, ctx: &dyn RunContext) -> anyhow::Result<()> {
        let tree = ctx.tree();
        let clock = self
            .clock
            .and_then(|id| tree.model(id))
            .and_then(|m| m.as_any().downcast_ref::<Clock>())
            .context("report is not linked to a clock")?;

        let columns = self
            .variables
            .iter()
            .map(|variable| {
                let (path, column) = column_of(variable);
                let value = ctx
                    .get(path)
                    .with_context(|| format!("cannot report '{path}'"))?;
                Ok((column, value))
            })
            .collect::<anyhow::Result<Vec<(String, Value)>>>()?;

        let table = if self.table_name.is_empty() {
            tree[ctx.node()].name()
        } else {
            self.table_name.as_str()
        };

        let mut rows = 0_usize;
        for step in clock.steps()? {
            if ctx.is_cancelled() {
                tracing::debug!(table, rows, "report stopped early");
                return Ok(());
            }
            let mut row = Row::new();
            row.insert(SIMULATION_NAME_COLUMN.to_string(), json!(ctx.simulation_name()));
            row.insert("Step".to_string(), json!(step));
            for (column, value) in &columns {
                row.insert(column.clone(), value.clone());
            }
            ctx.store().write_row(table, row);
            rows += 1;
        }
        tracing::debug!(table, rows, "report written");
        Ok(())
    }
}

/// Post-run tool counting rows per simulation in another table
///
/// Writes `{SimulationName, Rows}` rows to a table named after its node.
#[derive(Debug, Clone, Default)]
pub struct TableSummary {
    /// Table to summarise
    pub source_table: String,
}

impl TableSummary {
    /// Summary of `source_table`
    #[must_use]
    pub fn new(source_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
        }
    }
}

impl_properties!(TableSummary { source_table => "SourceTable" });

impl Model for TableSummary {
    fn kind(&self) -> &str {
        "TableSummary"
    }

    fn markers(&self) -> Capabilities {
        Capabilities::POST_RUN
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

impl Runnable for TableSummary {
    fn run(&self, ctx: &dyn RunContext) -> anyhow::Result<()> {
        let source = ctx
            .store()
            .read_table(&self.source_table)
            .with_context(|| format!("table '{}' not found", self.source_table))?;
        let names = source
            .column(SIMULATION_NAME_COLUMN)
            .with_context(|| format!("table '{}' has no {SIMULATION_NAME_COLUMN} column", source.name))?;

        let mut counts: indexmap::IndexMap<String, usize> = indexmap::IndexMap::new();
        for name in names {
            let key = name.as_str().map_or_else(|| name.to_string(), str::to_string);
            *counts.entry(key).or_default() += 1;
        }

        let table = ctx.tree()[ctx.node()].name().to_string();
        for (simulation, rows) in counts {
            let mut row = Row::new();
            row.insert(SIMULATION_NAME_COLUMN.to_string(), json!(simulation));
            row.insert("Rows".to_string(), json!(rows));
            ctx.store().write_row(&table, row);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names() {
        assert_eq!(column_of("[Clock].End"), ("[Clock].End", "End".to_string()));
        assert_eq!(column_of("[Wheat]"), ("[Wheat]", "Wheat".to_string()));
        assert_eq!(
            column_of("[Clock].End as LastDay"),
            ("[Clock].End", "LastDay".to_string())
        );
        assert_eq!(column_of("Rate"), ("Rate", "Rate".to_string()));
    }

    #[test]
    fn report_declares_clock_link() {
        let mut report = Report::new(["[Clock].End"]);
        assert_eq!(report.link_slots(), [LinkSlot::by_kind("clock", "Clock")]);
        report.bind("clock", &[]);
        assert_eq!(report.clock(), None);
    }
}
