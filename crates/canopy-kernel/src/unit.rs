//! Units of work and the batches that enumerate them

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    /// A token that has not been stopped
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An independently runnable piece of work
///
/// Units run on worker threads. A long-running unit may poll the
/// [`StopToken`] to finish early; the scheduler never interrupts it.
pub trait WorkUnit: Send {
    /// Name reported in events and failures
    fn name(&self) -> &str;

    /// Do the work
    ///
    /// # Errors
    /// Any error; it is recorded against this unit and does not affect
    /// other units
    fn run(&mut self, stop: &StopToken) -> anyhow::Result<()>;
}

/// A lazily enumerated sequence of [`WorkUnit`]s
pub trait WorkBatch: Send {
    /// Batch name
    fn name(&self) -> &str;

    /// Called once before the first unit is requested
    ///
    /// # Errors
    /// A failure skips the batch and is reported as a scheduler failure
    fn prepare(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Next unit, `None` when exhausted
    ///
    /// An `Err` item ends enumeration of this batch and is reported as a
    /// scheduler failure.
    fn next_unit(&mut self) -> Option<anyhow::Result<Box<dyn WorkUnit>>>;

    /// Called once after every unit of the run has completed
    ///
    /// Each returned error is reported as its own scheduler failure.
    fn finish(&mut self) -> Vec<anyhow::Error> {
        Vec::new()
    }
}

/// [`WorkUnit`] backed by a closure
pub struct FnUnit<F> {
    name: String,
    work: F,
}

impl<F> FnUnit<F>
where
    F: FnMut(&StopToken) -> anyhow::Result<()> + Send,
{
    /// Wrap `work` as a unit called `name`
    pub fn new(name: impl Into<String>, work: F) -> Self {
        Self {
            name: name.into(),
            work,
        }
    }

    /// Boxed for use in a batch
    pub fn boxed(name: impl Into<String>, work: F) -> Box<dyn WorkUnit>
    where
        F: 'static,
    {
        Box::new(Self::new(name, work))
    }
}

impl<F> fmt::Debug for FnUnit<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnUnit").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<F> WorkUnit for FnUnit<F>
where
    F: FnMut(&StopToken) -> anyhow::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, stop: &StopToken) -> anyhow::Result<()> {
        (self.work)(stop)
    }
}

/// [`WorkBatch`] over any iterator of units
pub struct IterBatch<I> {
    name: String,
    units: I,
}

impl<I> IterBatch<I>
where
    I: Iterator<Item = Box<dyn WorkUnit>> + Send,
{
    /// Batch `name` enumerating `units` on demand
    pub fn new(name: impl Into<String>, units: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            name: name.into(),
            units: units.into_iter(),
        }
    }
}

impl<I> fmt::Debug for IterBatch<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterBatch").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<I> WorkBatch for IterBatch<I>
where
    I: Iterator<Item = Box<dyn WorkUnit>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn next_unit(&mut self) -> Option<anyhow::Result<Box<dyn WorkUnit>>> {
        self.units.next().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_token_is_shared() {
        let token = StopToken::new();
        let handle = token.clone();
        assert!(!handle.is_stopped());
        token.stop();
        assert!(handle.is_stopped());
    }

    #[test]
    fn iter_batch_yields_in_order() {
        let units: Vec<Box<dyn WorkUnit>> = (1..=3)
            .map(|i| FnUnit::boxed(format!("u{i}"), |_: &StopToken| Ok(())))
            .collect();
        let mut batch = IterBatch::new("b", units);

        let mut names = Vec::new();
        while let Some(unit) = batch.next_unit() {
            names.push(unit.unwrap().name().to_string());
        }
        assert_eq!(names, ["u1", "u2", "u3"]);
        assert!(batch.prepare().is_ok());
        assert!(batch.finish().is_empty());
    }

    #[test]
    fn fn_unit_runs_closure() {
        let mut calls = 0;
        let mut unit = FnUnit::new("count", |_: &StopToken| {
            calls += 1;
            Ok(())
        });
        unit.run(&StopToken::new()).unwrap();
        unit.run(&StopToken::new()).unwrap();
        drop(unit);
        assert_eq!(calls, 2);
    }
}
