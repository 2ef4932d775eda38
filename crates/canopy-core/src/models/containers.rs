//! Structural models

use canopy_tree::{Capabilities, Model};

/// Top-level container of a run file
#[derive(Debug, Clone, Default)]
pub struct Simulations;

impl Model for Simulations {
    fn kind(&self) -> &str {
        "Simulations"
    }
}

/// Grouping container, transparent to scope
#[derive(Debug, Clone, Default)]
pub struct Folder;

impl Model for Folder {
    fn kind(&self) -> &str {
        "Folder"
    }
}

/// One runnable simulation
///
/// Bounds scope: nodes inside are not visible from sibling simulations.
#[derive(Debug, Clone, Default)]
pub struct Simulation;

impl Model for Simulation {
    fn kind(&self) -> &str {
        "Simulation"
    }

    fn markers(&self) -> Capabilities {
        Capabilities::SCOPE_BOUNDARY
    }
}

/// Spatial sub-unit of a simulation
#[derive(Debug, Clone, Default)]
pub struct Zone;

impl Model for Zone {
    fn kind(&self) -> &str {
        "Zone"
    }

    fn markers(&self) -> Capabilities {
        Capabilities::SCOPE_BOUNDARY
    }
}
