//! Error types for Canopy Core
//!
//! Setup failures (bad configuration, unreadable descriptions, duplicate
//! simulations, failed overrides) are raised as [`CoreError`]. Failures while
//! simulations run are never raised; they are collected in the run summary.

use canopy_composition::OverrideError;
use canopy_kernel::SchedulerError;
use canopy_tree::TreeError;
use std::path::PathBuf;

/// Main error type of this crate
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Two runnable simulations share a name
    #[error("duplicate simulation names found: {}", .0.join(", "))]
    DuplicateSimulationNames(Vec<String>),

    /// Simulation name pattern is not a valid regular expression
    #[error("invalid simulation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// An experiment is missing its base simulation
    #[error("experiment '{0}' has no base simulation")]
    NoBaseSimulation(String),

    /// Tree construction failed
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// An override could not be applied
    #[error("override failed: {0}")]
    Override(#[from] OverrideError),

    /// Runner misuse
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Requested table does not exist
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// File could not be read
    #[error("cannot read '{}'", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for [`crate::Settings`]
    #[error("invalid settings in '{}'", path.display())]
    Settings {
        /// File involved
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: toml::de::Error,
    },

    /// Tree description is not valid JSON
    #[error("invalid tree description in '{}'", path.display())]
    Description {
        /// File involved
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias for this crate
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
