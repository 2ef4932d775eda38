//! Canopy Kernel (canopy-kernel)
//!
//! Executes batches of independent units of work on a bounded worker pool.
//!
//! # Guarantees
//!
//! - A failing or panicking unit never stops its siblings; failures are
//!   collected into the [`RunSummary`]
//! - With [`Parallelism::SERIAL`] units are dispatched in enumeration order
//! - [`JobRunner::stop`] is cooperative: running units finish, nothing new
//!   starts
//! - Enumeration and hook failures are reported apart from unit failures
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use canopy_kernel::prelude::*;
//!
//! let runner = JobRunner::new(RunnerConfig::default().with_parallelism(Parallelism::from_count(4)));
//! runner.add(IterBatch::new("sims", units))?;
//! let events = runner.events();
//! runner.run(false)?;
//! let summary = runner.wait()?;
//! println!("{} errors", summary.error_count());
//! for event in events.try_iter() {
//!     if let RunEvent::UnitCompleted(report) = event {
//!         println!("{} {:?}", report.unit, report.state);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod runner;
pub mod state;
pub mod unit;

// Re-exports
pub use error::{SchedulerError, SchedulerFailure, WorkUnitFailure};
pub use runner::{JobRunner, Parallelism, RunEvent, RunSummary, RunnerConfig, UnitReport};
pub use state::{RunState, UnitState};
pub use unit::{FnUnit, IterBatch, StopToken, WorkBatch, WorkUnit};

/// Common imports
pub mod prelude {
    pub use crate::{
        FnUnit, IterBatch, JobRunner, Parallelism, RunEvent, RunSummary, RunnerConfig, StopToken,
        WorkBatch, WorkUnit,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
