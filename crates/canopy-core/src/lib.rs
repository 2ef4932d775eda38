//! Canopy Core (canopy-core)
//!
//! Simulations, experiments and the commands that run them.
//!
//! # Overview
//!
//! - **Models**: the built-in kinds ([`models::Simulation`], [`models::Clock`],
//!   [`models::Report`], [`models::Experiment`], ...) and
//!   [`models::default_registry`]
//! - **Simulation runtime**: [`SimulationGroup`] enumerates simulations and
//!   experiment variants as work for a [`canopy_kernel::JobRunner`]; each
//!   [`SimulationUnit`] runs on its own copy of the tree
//! - **Commands**: [`RunCommand`], [`ReadCommand`] and [`CheckCommand`]
//! - **Store**: [`InMemoryStore`], the default result sink
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_core::prelude::*;
//! use std::sync::Arc;
//!
//! let mut tree = load_tree("sims.json", &default_registry())?;
//! let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());
//! let summary = RunCommand::new()
//!     .with_overrides(vec!["[Clock].End=30".parse()?])
//!     .run(&mut tree, &store)?;
//! assert!(summary.is_success());
//! let report = ReadCommand::new("Report").run(&mut tree, &store)?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cli;
pub mod command;
pub mod error;
pub mod load;
pub mod models;
pub mod settings;
pub mod simulation;
pub mod store;

// Re-exports
pub use command::{CheckCommand, Command, ReadCommand, RunCommand};
pub use error::{CoreError, Result};
pub use load::{load_description, load_tree};
pub use settings::Settings;
pub use simulation::{SimulationGroup, SimulationUnit};
pub use store::InMemoryStore;

/// Prelude module for common imports
pub mod prelude {
    //! Everything needed to load and run a tree
    pub use crate::models::default_registry;
    pub use crate::{
        load_tree, CheckCommand, Command, CoreError, InMemoryStore, ReadCommand, RunCommand,
        Settings,
    };
    pub use canopy_tree::{DataStore, Table, Tree};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
