//! Built-in models

mod containers;
mod experiment;
mod parameters;
mod report;
mod validation;

pub use containers::{Folder, Simulation, Simulations, Zone};
pub use experiment::{variants_of, Experiment, Factor, Variant, Variants};
pub use parameters::{Clock, Constant};
pub use report::{Report, TableSummary};
pub use validation::TableCheck;

use canopy_tree::{discover_nested, TypeRegistry};

/// Registry with every built-in kind
///
/// `Parameters` is registered as an adapted kind: plain JSON objects whose
/// nested objects become child nodes.
#[must_use]
pub fn default_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Simulations>()
        .register::<Folder>()
        .register::<Simulation>()
        .register::<Zone>()
        .register::<Clock>()
        .register::<Constant>()
        .register::<Report>()
        .register::<TableSummary>()
        .register::<TableCheck>()
        .register::<Experiment>()
        .register::<Factor>()
        .register_adapter("Parameters", discover_nested);
    registry
}
