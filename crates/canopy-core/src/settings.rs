//! Runtime settings
//!
//! Loaded from a TOML file; command-line flags override individual fields.
//!
//! ```toml
//! parallelism = 4
//! run_post_tools = true
//! run_tests = true
//! case_sensitive_paths = false
//! log_filter = "canopy=debug"
//! ```

use crate::error::{CoreError, Result};
use canopy_kernel::Parallelism;
use canopy_scope::Locator;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by the CLI and embedding applications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Concurrent simulations; `<= 0` uses every core
    pub parallelism: i32,
    /// Run post-run tools after the simulations
    pub run_post_tools: bool,
    /// Run validation nodes after the post-run tools
    pub run_tests: bool,
    /// Compare node and property names exactly
    pub case_sensitive_paths: bool,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallelism: 0,
            run_post_tools: true,
            run_tests: true,
            case_sensitive_paths: false,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Default settings
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from a TOML file
    ///
    /// # Errors
    /// [`CoreError::Io`] or [`CoreError::Settings`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| CoreError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// With parallelism
    #[inline]
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: i32) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// With post-run tools enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_post_tools(mut self, enabled: bool) -> Self {
        self.run_post_tools = enabled;
        self
    }

    /// With validation nodes enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_tests(mut self, enabled: bool) -> Self {
        self.run_tests = enabled;
        self
    }

    /// Worker parallelism
    #[must_use]
    pub fn parallelism(&self) -> Parallelism {
        Parallelism::from_count(self.parallelism)
    }

    /// Path locator honoring `case_sensitive_paths`
    #[must_use]
    pub fn locator(&self) -> Locator {
        Locator::new().with_case_sensitive(self.case_sensitive_paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallelism = 3").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.parallelism, 3);
        assert!(settings.run_post_tools);
        assert!(settings.run_tests);
        assert_eq!(settings.log_filter, "info");
        assert_eq!(settings.parallelism().workers(), 3);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "paralelism = 3").unwrap();

        let err = Settings::load(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::Settings { .. }));
    }

    #[test]
    fn missing_file() {
        let err = Settings::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[test]
    fn builders() {
        let settings = Settings::new()
            .with_parallelism(1)
            .with_post_tools(false)
            .with_tests(false);
        assert!(settings.parallelism().is_serial());
        assert!(!settings.run_post_tools);
        assert!(!settings.run_tests);
    }
}
