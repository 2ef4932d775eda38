//! Commands over a composed tree
//!
//! A command takes the tree and the result store and produces one output.
//! [`RunCommand`] runs simulations, [`ReadCommand`] fetches a result table
//! and [`CheckCommand`] reports broken links without running anything.

use crate::error::{CoreError, Result};
use crate::simulation::SimulationGroup;
use canopy_composition::{LinkError, Override, ReplacementEngine};
use canopy_kernel::{JobRunner, Parallelism, RunEvent, RunSummary, RunnerConfig};
use canopy_scope::{Locator, ScopeResolver};
use canopy_tree::{DataStore, Table, Tree};
use std::sync::Arc;

/// An operation on a tree and a result store
pub trait Command {
    /// What the command produces
    type Output;

    /// Execute against `tree`
    ///
    /// The tree is left as it was found, even when overrides were applied
    /// for the duration of the command.
    ///
    /// # Errors
    /// Setup failures; failures of individual simulations are reported in
    /// the output instead
    fn run(&self, tree: &mut Tree, store: &Arc<dyn DataStore>) -> Result<Self::Output>;
}

type Observer = Arc<dyn Fn(&RunEvent) + Send + Sync>;

/// Run every selected simulation in the tree
#[derive(Clone)]
pub struct RunCommand {
    /// Applied to the tree before simulations are enumerated
    pub overrides: Vec<Override>,
    /// Exact names to run; `None` runs everything
    pub simulation_names: Option<Vec<String>>,
    /// Regular expression over simulation names; wins over names
    pub pattern: Option<String>,
    /// Worker count
    pub parallelism: Parallelism,
    /// Run post-run tools after all simulations
    pub run_post_tools: bool,
    /// Run validation nodes after the post-run tools
    pub run_tests: bool,
    /// Locator configuration for overrides, links and reads
    pub locator: Locator,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for RunCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCommand")
            .field("overrides", &self.overrides)
            .field("simulation_names", &self.simulation_names)
            .field("pattern", &self.pattern)
            .field("parallelism", &self.parallelism)
            .field("run_post_tools", &self.run_post_tools)
            .field("run_tests", &self.run_tests)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Default for RunCommand {
    fn default() -> Self {
        Self {
            overrides: Vec::new(),
            simulation_names: None,
            pattern: None,
            parallelism: Parallelism::AllCores,
            run_post_tools: true,
            run_tests: true,
            locator: Locator::new(),
            observers: Vec::new(),
        }
    }
}

impl RunCommand {
    /// Run everything on all cores
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: overrides applied before the run
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<Override>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Builder: run only these simulations
    #[must_use]
    pub fn with_simulation_names(mut self, names: Vec<String>) -> Self {
        self.simulation_names = Some(names);
        self
    }

    /// Builder: run only simulations matching `pattern`
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Builder: worker count
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Builder: enable or disable post-run tools
    #[must_use]
    pub fn with_post_tools(mut self, enabled: bool) -> Self {
        self.run_post_tools = enabled;
        self
    }

    /// Builder: enable or disable validation nodes
    #[must_use]
    pub fn with_tests(mut self, enabled: bool) -> Self {
        self.run_tests = enabled;
        self
    }

    /// Builder: locator configuration
    #[must_use]
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    /// Builder: receive every run event
    #[must_use]
    pub fn with_observer(mut self, observer: impl Fn(&RunEvent) + Send + Sync + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Simulation group for `tree`, after overrides
    fn group(&self, tree: Arc<Tree>, store: &Arc<dyn DataStore>) -> Result<SimulationGroup> {
        let mut group = SimulationGroup::new(tree, Arc::clone(store))?
            .with_post_tools(self.run_post_tools)
            .with_tests(self.run_tests)
            .with_locator(self.locator);
        if let Some(names) = &self.simulation_names {
            group = group.with_names(names.clone());
        }
        if let Some(pattern) = &self.pattern {
            group = group.with_pattern(pattern)?;
        }
        Ok(group)
    }

    /// Names the command would run, without running them
    ///
    /// # Errors
    /// As [`Command::run`]
    pub fn simulation_names(&self, tree: &Tree) -> Result<Vec<String>> {
        let snapshot = self.snapshot(tree)?;
        let store: Arc<dyn DataStore> = Arc::new(crate::store::InMemoryStore::new());
        Ok(self.group(snapshot, &store)?.simulation_names())
    }

    /// Copy of `tree` with the overrides applied
    ///
    /// Overrides go to the copy, so `tree` is never edited and its arena
    /// does not grow from one command to the next.
    fn snapshot(&self, tree: &Tree) -> Result<Arc<Tree>> {
        let mut snapshot = tree.clone();
        if !self.overrides.is_empty() {
            let scope = ScopeResolver::new();
            let root = snapshot.root();
            let applied = ReplacementEngine::new()
                .with_locator(self.locator)
                .apply(&mut snapshot, &scope, root, &self.overrides)?;
            tracing::debug!(overrides = applied.len(), "overrides applied");
        }
        Ok(Arc::new(snapshot))
    }
}

impl Command for RunCommand {
    type Output = RunSummary;

    fn run(&self, tree: &mut Tree, store: &Arc<dyn DataStore>) -> Result<RunSummary> {
        let snapshot = self.snapshot(tree)?;
        let group = self.group(snapshot, store)?;

        let runner = JobRunner::new(RunnerConfig::default().with_parallelism(self.parallelism));
        for observer in &self.observers {
            let observer = Arc::clone(observer);
            runner.on_event(move |event| observer(event));
        }
        runner.add(group)?;

        let summary = match runner.run(true)? {
            Some(summary) => summary,
            None => runner.wait()?,
        };
        tracing::info!(
            completed = summary.units_completed,
            errors = summary.error_count(),
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );
        Ok(summary)
    }
}

/// Fetch one table from the result store
#[derive(Debug, Clone)]
pub struct ReadCommand {
    /// Table name; matched ignoring case when there is no exact match
    pub table: String,
}

impl ReadCommand {
    /// Read `table`
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl Command for ReadCommand {
    type Output = Table;

    fn run(&self, _tree: &mut Tree, store: &Arc<dyn DataStore>) -> Result<Table> {
        store
            .read_table(&self.table)
            .ok_or_else(|| CoreError::TableNotFound(self.table.clone()))
    }
}

/// Report every link that would fail at run time
///
/// See [`SimulationGroup::check_links`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckCommand {
    /// Locator configuration
    pub locator: Locator,
}

impl Command for CheckCommand {
    type Output = Vec<LinkError>;

    fn run(&self, tree: &mut Tree, store: &Arc<dyn DataStore>) -> Result<Vec<LinkError>> {
        let group = SimulationGroup::new(Arc::new(tree.clone()), Arc::clone(store))?
            .with_locator(self.locator);
        Ok(group.check_links())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clock, Simulation, Simulations};
    use crate::store::InMemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree() -> Tree {
        let mut tree = Tree::new("Simulations", Box::new(Simulations));
        let root = tree.root();
        for name in ["A", "B"] {
            let sim = tree.add_child(root, name, Box::new(Simulation)).unwrap();
            tree.add_child(sim, "Clock", Box::new(Clock::default())).unwrap();
        }
        tree
    }

    #[test]
    fn overrides_do_not_leak_into_the_tree() {
        let mut tree = tree();
        let command = RunCommand::new()
            .with_overrides(vec![Override::set("[Clock].End", json!(9))])
            .with_parallelism(Parallelism::SERIAL);
        let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());

        let summary = command.run(&mut tree, &store).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.units_completed, 2);

        let locator = Locator::new();
        let scope = ScopeResolver::new();
        let a = tree.find("A", tree.root(), false).unwrap();
        assert_eq!(locator.get(&tree, &scope, a, "[Clock].End").unwrap(), json!(1));
    }

    #[test]
    fn names_honour_selection() {
        let tree = tree();
        let names = RunCommand::new()
            .with_simulation_names(vec!["B".into()])
            .simulation_names(&tree)
            .unwrap();
        assert_eq!(names, ["B"]);
    }

    #[test]
    fn read_missing_table() {
        let mut tree = tree();
        let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());
        let err = ReadCommand::new("Report").run(&mut tree, &store).unwrap_err();
        assert!(matches!(err, CoreError::TableNotFound(name) if name == "Report"));
    }

    #[test]
    fn check_reports_without_binding() {
        let mut tree = tree();
        let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());
        assert!(CheckCommand::default().run(&mut tree, &store).unwrap().is_empty());
    }
}
