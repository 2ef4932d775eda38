//! Parameter-holding models

use canopy_tree::{impl_properties, Model, Properties};
use serde_json::Value;

/// Time span of a simulation, in integer steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    /// First step
    pub start: i64,
    /// Last step, inclusive
    pub end: i64,
    /// Increment between steps
    pub step: i64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            start: 1,
            end: 1,
            step: 1,
        }
    }
}

impl Clock {
    /// Steps from `start` to `end` inclusive
    ///
    /// # Errors
    /// When `step` is not positive
    pub fn steps(&self) -> anyhow::Result<impl Iterator<Item = i64>> {
        let step = usize::try_from(self.step)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| anyhow::anyhow!("clock step must be positive, got {}", self.step))?;
        Ok((self.start..=self.end).step_by(step))
    }
}

impl_properties!(Clock {
    start => "Start",
    end => "End",
    step => "Step",
});

impl Model for Clock {
    fn kind(&self) -> &str {
        "Clock"
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        Some(self)
    }
}

/// A single named value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constant {
    /// The value
    pub value: Value,
}

impl Constant {
    /// Constant holding `value`
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl_properties!(Constant { value => "Value" });

impl Model for Constant {
    fn kind(&self) -> &str {
        "Constant"
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        Some(self)
    }
}
