//! Simulations as schedulable work
//!
//! A [`SimulationGroup`] finds every simulation and experiment under a node
//! and yields one [`SimulationUnit`] per simulation or experiment variant.
//! Variants are produced on demand, so a large experiment never has all of
//! its trees in memory at once.
//!
//! Each unit runs against a detached copy of its simulation: it applies its
//! variant overrides, resolves links inside the copy and runs every runnable
//! model in pre-order. Nothing outside the simulation is visible to it.
//!
//! Once every unit has completed, the group runs post-run tools and then
//! validation nodes against the shared tree. Each failing tool or check is
//! reported on its own.

use crate::error::{CoreError, Result};
use crate::models::{variants_of, Variants};
use anyhow::Context as _;
use canopy_composition::{LinkError, LinkResolver, Override, ReplacementEngine};
use canopy_kernel::{StopToken, WorkBatch, WorkUnit};
use canopy_scope::{Locator, ScopeResolver};
use canopy_tree::{Capabilities, DataStore, NodeId, RunContext, Tree};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// Execution environment of one runnable model
pub(crate) struct SimulationContext<'a> {
    pub(crate) tree: &'a Tree,
    pub(crate) node: NodeId,
    pub(crate) simulation_name: &'a str,
    pub(crate) store: &'a dyn DataStore,
    pub(crate) scope: &'a ScopeResolver,
    pub(crate) locator: Locator,
    pub(crate) stop: Option<&'a StopToken>,
}

impl RunContext for SimulationContext<'_> {
    fn tree(&self) -> &Tree {
        self.tree
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn simulation_name(&self) -> &str {
        self.simulation_name
    }

    fn get(&self, path: &str) -> anyhow::Result<Value> {
        Ok(self.locator.get(self.tree, self.scope, self.node, path)?)
    }

    fn store(&self) -> &dyn DataStore {
        self.store
    }

    fn is_cancelled(&self) -> bool {
        self.stop.is_some_and(StopToken::is_stopped)
    }
}

/// Standalone copy of the simulation at `simulation`
///
/// Links and scoped paths in the copy only see the simulation's own contents.
fn detach(tree: &Tree, simulation: NodeId) -> anyhow::Result<Tree> {
    tree.subtree(simulation)
        .with_context(|| format!("simulation {simulation:?} is no longer in the tree"))
}

/// Resolve every link in `tree`, collecting failures
fn resolve_all(tree: &mut Tree, scope: &ScopeResolver, locator: Locator) -> Vec<LinkError> {
    LinkResolver::new()
        .with_locator(locator)
        .resolve(tree, scope, false)
        .unwrap_or_else(|err| vec![err])
}

/// Prefix the paths in a detached simulation's link failure with `parent`
fn reroot(error: LinkError, parent: &str) -> LinkError {
    if parent.is_empty() {
        return error;
    }
    let full = |path: String| format!("{parent}.{path}");
    match error {
        LinkError::MissingDependency { node, field, wanted } => LinkError::MissingDependency {
            node: full(node),
            field,
            wanted,
        },
        LinkError::AmbiguousDependency {
            node,
            field,
            wanted,
            candidates,
        } => LinkError::AmbiguousDependency {
            node: full(node),
            field,
            wanted,
            candidates: candidates.into_iter().map(full).collect(),
        },
    }
}

fn link_failure(errors: &[LinkError]) -> anyhow::Error {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    anyhow::anyhow!("unresolved links: {}", messages.join("; "))
}

/// Run every runnable node of `nodes` in order
fn run_models(ctx: &mut SimulationContext<'_>, nodes: &[NodeId]) -> anyhow::Result<()> {
    let tree = ctx.tree;
    for &node in nodes {
        if ctx.is_cancelled() {
            tracing::debug!(simulation = ctx.simulation_name, "stopping before {}", tree.path_of(node));
            break;
        }
        let Some(runnable) = tree[node].model().runnable() else {
            continue;
        };
        ctx.node = node;
        runnable
            .run(&*ctx)
            .with_context(|| format!("{} failed", tree.path_of(node)))?;
    }
    Ok(())
}

/// One simulation or experiment variant
pub struct SimulationUnit {
    name: String,
    tree: Arc<Tree>,
    simulation: NodeId,
    overrides: Vec<Override>,
    store: Arc<dyn DataStore>,
    locator: Locator,
}

impl std::fmt::Debug for SimulationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationUnit")
            .field("name", &self.name)
            .field("simulation", &self.simulation)
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

impl SimulationUnit {
    /// Node of the simulation in the shared tree
    #[must_use]
    pub fn simulation(&self) -> NodeId {
        self.simulation
    }

    /// Overrides applied to this unit's copy before it runs
    #[must_use]
    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }
}

impl WorkUnit for SimulationUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, stop: &StopToken) -> anyhow::Result<()> {
        let mut tree = detach(&self.tree, self.simulation)?;
        let scope = ScopeResolver::new();
        let sim = tree.root();

        if tree[sim].name() != self.name {
            tree.rename(sim, self.name.clone())?;
        }
        if !self.overrides.is_empty() {
            let applied = ReplacementEngine::new()
                .with_locator(self.locator)
                .apply(&mut tree, &scope, sim, &self.overrides)?;
            // This copy is discarded after the run; nothing to undo.
            drop(applied);
        }

        let errors = resolve_all(&mut tree, &scope, self.locator);
        if !errors.is_empty() {
            return Err(link_failure(&errors));
        }

        let runnables: Vec<NodeId> = tree
            .walk(sim)
            .filter(|&id| {
                let caps = tree[id].capabilities();
                caps.contains(Capabilities::RUNNABLE)
                    && !caps.intersects(Capabilities::POST_RUN | Capabilities::VALIDATION)
            })
            .collect();
        tracing::debug!(simulation = %self.name, models = runnables.len(), "running simulation");

        let mut ctx = SimulationContext {
            tree: &tree,
            node: sim,
            simulation_name: &self.name,
            store: self.store.as_ref(),
            scope: &scope,
            locator: self.locator,
            stop: Some(stop),
        };
        run_models(&mut ctx, &runnables)
    }
}

#[derive(Debug)]
enum Source {
    Simulation(NodeId),
    Experiment { base: NodeId, variants: Variants },
}

/// Lazy batch of every simulation under a node
pub struct SimulationGroup {
    name: String,
    tree: Arc<Tree>,
    relative_to: NodeId,
    store: Arc<dyn DataStore>,
    locator: Locator,
    sources: Vec<Source>,
    cursor: usize,
    names: Option<Vec<String>>,
    pattern: Option<Regex>,
    run_post_tools: bool,
    run_tests: bool,
}

impl std::fmt::Debug for SimulationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationGroup")
            .field("name", &self.name)
            .field("relative_to", &self.relative_to)
            .field("sources", &self.sources.len())
            .field("run_post_tools", &self.run_post_tools)
            .field("run_tests", &self.run_tests)
            .finish_non_exhaustive()
    }
}

impl SimulationGroup {
    /// Group over every simulation in `tree`
    ///
    /// # Errors
    /// [`CoreError::DuplicateSimulationNames`] when two simulations or two
    /// experiments share a name; [`CoreError::NoBaseSimulation`] for an
    /// experiment without a base simulation
    pub fn new(tree: Arc<Tree>, store: Arc<dyn DataStore>) -> Result<Self> {
        let root = tree.root();
        Self::relative_to(tree, root, store)
    }

    /// Group over the simulations at or below `relative_to`
    ///
    /// # Errors
    /// See [`SimulationGroup::new`]
    pub fn relative_to(tree: Arc<Tree>, relative_to: NodeId, store: Arc<dyn DataStore>) -> Result<Self> {
        check_duplicates(&tree)?;
        let mut sources = Vec::new();
        discover(&tree, relative_to, &mut sources)?;
        let name = tree.path_of(relative_to).to_string();
        tracing::debug!(group = %name, sources = sources.len(), "simulations discovered");
        Ok(Self {
            name,
            tree,
            relative_to,
            store,
            locator: Locator::new(),
            sources,
            cursor: 0,
            names: None,
            pattern: None,
            run_post_tools: true,
            run_tests: true,
        })
    }

    /// Builder: only run simulations with these exact names
    #[must_use]
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    /// Builder: only run simulations whose name matches `pattern`
    ///
    /// Takes precedence over [`SimulationGroup::with_names`].
    ///
    /// # Errors
    /// [`CoreError::InvalidPattern`]
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Builder: run post-run tools in `finish`
    #[must_use]
    pub fn with_post_tools(mut self, enabled: bool) -> Self {
        self.run_post_tools = enabled;
        self
    }

    /// Builder: run validation nodes in `finish`, after post-run tools
    #[must_use]
    pub fn with_tests(mut self, enabled: bool) -> Self {
        self.run_tests = enabled;
        self
    }

    /// Builder: locator used for overrides, links and reads
    #[must_use]
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    fn is_selected(&self, name: &str) -> bool {
        match (&self.pattern, &self.names) {
            (Some(pattern), _) => pattern.is_match(name),
            (None, Some(names)) => names.iter().any(|n| n == name),
            (None, None) => true,
        }
    }

    /// Names of every selected simulation, in run order
    #[must_use]
    pub fn simulation_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for source in &self.sources[self.cursor.min(self.sources.len())..] {
            match source {
                Source::Simulation(node) => names.push(self.tree[*node].name().to_string()),
                Source::Experiment { variants, .. } => {
                    names.extend(variants.clone().map(|v| v.name));
                }
            }
        }
        names.retain(|name| self.is_selected(name));
        names
    }

    fn unit(&self, name: String, simulation: NodeId, overrides: Vec<Override>) -> Box<dyn WorkUnit> {
        Box::new(SimulationUnit {
            name,
            tree: Arc::clone(&self.tree),
            simulation,
            overrides,
            store: Arc::clone(&self.store),
            locator: self.locator,
        })
    }

    fn post_tools(&self, scope: &ScopeResolver) -> Vec<NodeId> {
        scope
            .visible_nodes_of(&self.tree, self.relative_to)
            .iter()
            .copied()
            .filter(|&id| {
                let caps = self.tree[id].capabilities();
                caps.contains(Capabilities::POST_RUN | Capabilities::RUNNABLE)
            })
            .collect()
    }

    /// Every validation node in the tree, in pre-order
    fn validations(&self) -> Vec<NodeId> {
        self.tree
            .walk(self.tree.root())
            .filter(|&id| {
                let caps = self.tree[id].capabilities();
                caps.contains(Capabilities::VALIDATION | Capabilities::RUNNABLE)
            })
            .collect()
    }

    /// Link failures each simulation, post-run tool and validation node would
    /// hit, without running anything
    ///
    /// Simulations are checked as they run: detached from the tree, before
    /// any variant overrides.
    #[must_use]
    pub fn check_links(&self) -> Vec<LinkError> {
        let scope = ScopeResolver::new();
        let mut errors = Vec::new();
        for source in &self.sources {
            let node = match source {
                Source::Simulation(node) => *node,
                Source::Experiment { base, .. } => *base,
            };
            let Ok(mut simulation) = detach(&self.tree, node) else {
                continue;
            };
            let parent = self
                .tree
                .parent(node)
                .map(|p| self.tree.path_of(p))
                .unwrap_or_default();
            errors.extend(
                resolve_all(&mut simulation, &ScopeResolver::new(), self.locator)
                    .into_iter()
                    .map(|err| reroot(err, parent)),
            );
        }

        let mut tree = Tree::clone(&self.tree);
        let resolver = LinkResolver::new().with_locator(self.locator);
        let mut tools = self.post_tools(&scope);
        tools.extend(self.validations());
        for tool in tools {
            match resolver.resolve_from(&mut tree, &scope, tool, false) {
                Ok(failures) => errors.extend(failures),
                Err(err) => errors.push(err),
            }
        }
        errors
    }

    /// Resolve and run each of `tools` against the shared tree
    ///
    /// Returns one error per failing tool, labelled with `role`.
    fn run_tools(&self, scope: &ScopeResolver, tools: &[NodeId], role: &str) -> Vec<anyhow::Error> {
        if tools.is_empty() {
            return Vec::new();
        }

        let mut tree = Tree::clone(&self.tree);
        let resolver = LinkResolver::new().with_locator(self.locator);
        let mut failures = Vec::new();
        for &tool in tools {
            let path = tree.path_of(tool).to_string();
            let errors = match resolver.resolve_from(&mut tree, scope, tool, false) {
                Ok(errors) => errors,
                Err(err) => vec![err],
            };
            if !errors.is_empty() {
                let err = link_failure(&errors).context(format!("{path} failed"));
                failures.push(err.context(format!("{role} failed")));
                continue;
            }

            tracing::info!(tool = %path, "running {role}");
            let mut ctx = SimulationContext {
                tree: &tree,
                node: tool,
                simulation_name: "",
                store: self.store.as_ref(),
                scope,
                locator: self.locator,
                stop: None,
            };
            if let Err(err) = run_models(&mut ctx, &[tool]) {
                failures.push(err.context(format!("{role} failed")));
            }
        }
        failures
    }
}

impl WorkBatch for SimulationGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self) -> anyhow::Result<()> {
        let names = self.simulation_names();
        tracing::info!(group = %self.name, simulations = names.len(), "clearing previous results");
        self.store.clean(&names);
        Ok(())
    }

    fn next_unit(&mut self) -> Option<anyhow::Result<Box<dyn WorkUnit>>> {
        loop {
            let (name, simulation, overrides) = match self.sources.get_mut(self.cursor)? {
                Source::Simulation(node) => {
                    let node = *node;
                    self.cursor += 1;
                    (self.tree[node].name().to_string(), node, Vec::new())
                }
                Source::Experiment { base, variants } => {
                    let base = *base;
                    match variants.next() {
                        Some(variant) => (variant.name, base, variant.overrides),
                        None => {
                            self.cursor += 1;
                            continue;
                        }
                    }
                }
            };
            if self.is_selected(&name) {
                return Some(Ok(self.unit(name, simulation, overrides)));
            }
        }
    }

    fn finish(&mut self) -> Vec<anyhow::Error> {
        let scope = ScopeResolver::new();
        let mut failures = Vec::new();
        if self.run_post_tools {
            let tools = self.post_tools(&scope);
            failures.extend(self.run_tools(&scope, &tools, "post-run tool"));
        }
        if self.run_tests {
            let checks = self.validations();
            failures.extend(self.run_tools(&scope, &checks, "validation"));
        }
        failures
    }
}

/// Collect runnable sources below `node`
fn discover(tree: &Tree, node: NodeId, out: &mut Vec<Source>) -> Result<()> {
    let model = tree[node].model();
    if model.is_kind("Simulation") {
        out.push(Source::Simulation(node));
    } else if model.is_kind("Experiment") {
        let (base, variants) = variants_of(tree, node)?;
        out.push(Source::Experiment { base, variants });
    } else if model.is_kind("Folder") || model.is_kind("Simulations") {
        for &child in tree.children(node) {
            discover(tree, child, out)?;
        }
    }
    Ok(())
}

/// Duplicate names among simulations, among experiments, and between
/// experiment variants and simulations
///
/// Base simulations inside experiments never run under their own name and
/// are not checked.
fn check_duplicates(tree: &Tree) -> Result<()> {
    let mut seen: IndexMap<(&str, &str), usize> = IndexMap::new();
    let mut experiments = Vec::new();
    for id in tree.walk(tree.root()) {
        let node = &tree[id];
        let kind = if node.model().is_kind("Simulation") {
            let in_experiment = tree
                .parent(id)
                .is_some_and(|p| tree[p].model().is_kind("Experiment"));
            if in_experiment {
                continue;
            }
            "Simulation"
        } else if node.model().is_kind("Experiment") {
            experiments.push(id);
            "Experiment"
        } else {
            continue;
        };
        *seen.entry((kind, node.name())).or_default() += 1;
    }

    let mut duplicates: Vec<String> = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|((_, name), _)| (*name).to_string())
        .collect();

    // Variant names start with the experiment name; only enumerate the
    // variants of experiments that prefix some simulation name.
    let simulations: Vec<&str> = seen
        .keys()
        .filter(|(kind, _)| *kind == "Simulation")
        .map(|(_, name)| *name)
        .collect();
    for experiment in experiments {
        let prefix = tree[experiment].name();
        if !simulations.iter().any(|name| name.starts_with(prefix)) {
            continue;
        }
        let Ok((_, variants)) = variants_of(tree, experiment) else {
            continue;
        };
        for variant in variants {
            if simulations.contains(&variant.name.as_str()) && !duplicates.contains(&variant.name) {
                duplicates.push(variant.name);
            }
        }
    }

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(CoreError::DuplicateSimulationNames(duplicates))
    }
}
