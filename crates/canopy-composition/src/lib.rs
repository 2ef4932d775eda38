//! Canopy composition
//!
//! Wires a composed tree together before it runs.
//!
//! # Core Concepts
//!
//! - [`LinkResolver`]: fills declared link slots by name, kind, ancestry,
//!   descent or path, reporting missing and ambiguous targets
//! - [`ReplacementEngine`]: applies property and subtree [`Override`]s as an
//!   all-or-nothing batch and reverts them on request
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_composition::{LinkResolver, Override, ReplacementEngine};
//! use canopy_scope::ScopeResolver;
//!
//! let scope = ScopeResolver::new();
//! let applied = ReplacementEngine::new().apply(&mut tree, &scope, root, &[
//!     "[Clock].Start=\"2020-01-01\"".parse()?,
//! ])?;
//! let errors = LinkResolver::new().resolve(&mut tree, &scope, false)?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod links;
mod replace;

// Re-exports
pub use links::{LinkError, LinkResolver};
pub use replace::{AppliedOverrides, Override, OverrideError, OverrideOp, ReplacementEngine};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
