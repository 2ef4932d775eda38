//! Factorial experiments
//!
//! An [`Experiment`] node holds one base simulation and any number of
//! [`Factor`] children. Every combination of factor levels is a variant: a
//! copy of the base simulation with one property override per factor.

use crate::error::{CoreError, Result};
use canopy_composition::Override;
use canopy_tree::{impl_properties, AsAny, Model, NodeId, Properties, Tree};
use serde_json::Value;

/// Container generating one simulation per factor combination
#[derive(Debug, Clone, Default)]
pub struct Experiment;

impl Model for Experiment {
    fn kind(&self) -> &str {
        "Experiment"
    }
}

/// One experimental dimension: a locator path and the levels it takes
///
/// The path is resolved relative to the base simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Factor {
    /// Locator path of the varied property
    pub path: String,
    /// Levels, in enumeration order
    pub values: Vec<Value>,
}

impl Factor {
    /// Factor varying `path` over `values`
    #[must_use]
    pub fn new(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            values,
        }
    }
}

impl_properties!(Factor {
    path => "Path",
    values => "Values",
});

impl Model for Factor {
    fn kind(&self) -> &str {
        "Factor"
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        Some(self)
    }
}

/// One combination of factor levels
#[derive(Debug, Clone)]
pub struct Variant {
    /// Simulation name: experiment name followed by each factor name and level
    pub name: String,
    /// One assignment per factor
    pub overrides: Vec<Override>,
}

#[derive(Debug, Clone)]
struct Dimension {
    name: String,
    path: String,
    values: Vec<Value>,
}

/// Lazy cartesian product of an experiment's factors
///
/// The last factor varies fastest.
#[derive(Debug, Clone)]
pub struct Variants {
    experiment: String,
    dimensions: Vec<Dimension>,
    odometer: Vec<usize>,
    exhausted: bool,
}

impl Variants {
    /// Number of variants not yet yielded
    #[must_use]
    pub fn remaining(&self) -> usize {
        if self.exhausted {
            return 0;
        }
        // Mixed-radix value of the odometer, subtracted from the total.
        // Both saturate at usize::MAX for very large factor sets.
        let total = self
            .dimensions
            .iter()
            .try_fold(1_usize, |acc, d| acc.checked_mul(d.values.len()))
            .unwrap_or(usize::MAX);
        let consumed = self
            .dimensions
            .iter()
            .zip(&self.odometer)
            .fold(0_usize, |acc, (d, &i)| {
                acc.saturating_mul(d.values.len()).saturating_add(i)
            });
        total.saturating_sub(consumed)
    }

    fn advance(&mut self) {
        for (index, dimension) in self.odometer.iter_mut().zip(&self.dimensions).rev() {
            *index += 1;
            if *index < dimension.values.len() {
                return;
            }
            *index = 0;
        }
        self.exhausted = true;
    }
}

fn level_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Iterator for Variants {
    type Item = Variant;

    fn next(&mut self) -> Option<Variant> {
        if self.exhausted {
            return None;
        }
        let mut name = self.experiment.clone();
        let mut overrides = Vec::with_capacity(self.dimensions.len());
        for (dimension, &index) in self.dimensions.iter().zip(&self.odometer) {
            let value = &dimension.values[index];
            name.push_str(&dimension.name);
            name.push_str(&level_label(value));
            overrides.push(Override::set(dimension.path.clone(), value.clone()));
        }
        self.advance();
        Some(Variant { name, overrides })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

/// Base simulation and variants of the experiment at `experiment`
///
/// # Errors
/// [`CoreError::NoBaseSimulation`] when no child is a simulation
pub fn variants_of(tree: &Tree, experiment: NodeId) -> Result<(NodeId, Variants)> {
    let name = tree[experiment].name().to_string();
    let children = tree.children(experiment);

    let base = children
        .iter()
        .copied()
        .find(|&id| tree[id].model().is_kind("Simulation"))
        .ok_or_else(|| CoreError::NoBaseSimulation(name.clone()))?;

    let dimensions: Vec<Dimension> = children
        .iter()
        .filter_map(|&id| {
            let factor = tree[id].model().as_any().downcast_ref::<Factor>()?;
            Some(Dimension {
                name: tree[id].name().to_string(),
                path: factor.path.clone(),
                values: factor.values.clone(),
            })
        })
        .collect();

    let exhausted = dimensions.iter().any(|d| d.values.is_empty());
    Ok((
        base,
        Variants {
            experiment: name,
            odometer: vec![0; dimensions.len()],
            dimensions,
            exhausted,
        },
    ))
}
