//! Job runner
//!
//! Threads involved in one run:
//! - a dispatcher that enumerates batches in insertion order and hands each
//!   unit to the next free worker over a zero-capacity channel
//! - `parallelism` workers that run units and report completions
//! - a coordinator that consumes completions, keeps the books and emits
//!   events; it is the caller's thread for a waiting run
//!
//! Every event is emitted from the coordinator, so observers never run
//! concurrently with each other.

use crate::error::{SchedulerError, SchedulerFailure, WorkUnitFailure};
use crate::state::{RunState, UnitState};
use crate::unit::{StopToken, WorkBatch, WorkUnit};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::Span;
use uuid::Uuid;

/// How many units may run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    /// One worker per available hardware thread
    #[default]
    AllCores,
    /// A fixed number of workers
    Limited(NonZeroUsize),
}

impl Parallelism {
    /// One worker; dispatch follows enumeration order
    pub const SERIAL: Self = Self::Limited(NonZeroUsize::MIN);

    /// Interpret a configured count: `<= 0` means all cores
    #[must_use]
    pub fn from_count(count: i32) -> Self {
        usize::try_from(count)
            .ok()
            .and_then(NonZeroUsize::new)
            .map_or(Self::AllCores, Self::Limited)
    }

    /// Number of worker threads to start
    #[must_use]
    pub fn workers(self) -> usize {
        match self {
            Self::AllCores => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            Self::Limited(n) => n.get(),
        }
    }

    /// Whether units run strictly one after another
    #[must_use]
    pub fn is_serial(self) -> bool {
        self.workers() == 1
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker count
    pub parallelism: Parallelism,
    /// Prefix for spawned thread names
    pub thread_prefix: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::AllCores,
            thread_prefix: "canopy".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Builder: set parallelism
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Builder: set the thread name prefix
    #[must_use]
    pub fn with_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_prefix = prefix.into();
        self
    }
}

/// Outcome of one unit
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// Batch the unit came from
    pub batch: String,
    /// Unit name
    pub unit: String,
    /// `Succeeded`, `Failed` or `Skipped`
    pub state: UnitState,
    /// Wall-clock time inside `run`
    pub elapsed: Duration,
    /// Failure, if any
    pub error: Option<Arc<anyhow::Error>>,
}

impl UnitReport {
    /// Whether the unit succeeded
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == UnitState::Succeeded
    }

    fn pending(batch: String, unit: &dyn WorkUnit) -> Self {
        Self {
            batch,
            unit: unit.name().to_string(),
            state: UnitState::Pending,
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    /// Move to `to`; an illegal move fails the unit
    fn advance(&mut self, to: UnitState) {
        match self.state.transition(to) {
            Ok(state) => self.state = state,
            Err(err) => {
                self.state = UnitState::Failed;
                self.error
                    .get_or_insert_with(|| Arc::new(anyhow::Error::new(err)));
            }
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Identifier carried by the run's tracing span
    pub run_id: Uuid,
    /// One entry per failed unit, in completion order
    pub unit_errors: Vec<WorkUnitFailure>,
    /// Enumeration, hook and startup failures
    pub scheduler_errors: Vec<SchedulerFailure>,
    /// Units that ran, successfully or not
    pub units_completed: usize,
    /// Units dropped after a stop
    pub units_skipped: usize,
    /// Time from `run` to completion
    pub elapsed: Duration,
    /// Whether `stop` was called
    pub cancelled: bool,
}

impl RunSummary {
    /// No unit or scheduler failures
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.unit_errors.is_empty() && self.scheduler_errors.is_empty()
    }

    /// Total number of failures of either kind
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.unit_errors.len() + self.scheduler_errors.len()
    }

    /// Human-readable failure messages, scheduler failures first
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.scheduler_errors
            .iter()
            .map(ToString::to_string)
            .chain(self.unit_errors.iter().map(ToString::to_string))
            .collect()
    }
}

/// Notification emitted by a run
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A unit finished
    UnitCompleted(UnitReport),
    /// A unit was dropped without running after a stop
    UnitSkipped(UnitReport),
    /// The run finished; emitted once
    RunCompleted(RunSummary),
}

type Observer = Arc<dyn Fn(&RunEvent) + Send + Sync>;

struct Job {
    batch: String,
    unit: Box<dyn WorkUnit>,
}

struct Book {
    state: RunState,
    accepting: bool,
    pending: VecDeque<Box<dyn WorkBatch>>,
    drained: Vec<Box<dyn WorkBatch>>,
    enumerated: usize,
    completed: usize,
    skipped: usize,
    unit_errors: Vec<WorkUnitFailure>,
    scheduler_errors: Vec<SchedulerFailure>,
    started: Option<Instant>,
    summary: Option<RunSummary>,
    finished: bool,
}

struct Shared {
    run_id: Uuid,
    config: RunnerConfig,
    stop: StopToken,
    book: Mutex<Book>,
    finished: Condvar,
    observers: RwLock<Vec<Observer>>,
    subscribers: Mutex<Vec<Sender<RunEvent>>>,
}

impl Shared {
    fn record_failure(&self, failure: SchedulerFailure) {
        tracing::warn!(error = %failure, "scheduler failure");
        self.book.lock().scheduler_errors.push(failure);
    }

    fn emit(&self, event: &RunEvent) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer(event);
        }
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Runs batches of independent units with bounded parallelism
///
/// A runner executes exactly one run. Clones share that run, so one clone
/// can `stop` or `add` while another waits.
///
/// # Example
///
/// ```
/// use canopy_kernel::{FnUnit, IterBatch, JobRunner, Parallelism, RunnerConfig, StopToken};
///
/// let runner = JobRunner::new(RunnerConfig::default().with_parallelism(Parallelism::SERIAL));
/// let units = (1..=3).map(|i| FnUnit::boxed(format!("unit-{i}"), |_: &StopToken| Ok(())));
/// runner.add(IterBatch::new("batch", units)).unwrap();
///
/// let summary = runner.run(true).unwrap().unwrap();
/// assert!(summary.is_success());
/// assert_eq!(summary.units_completed, 3);
/// ```
#[derive(Clone)]
pub struct JobRunner {
    shared: Arc<Shared>,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("run_id", &self.shared.run_id)
            .field("state", &self.state())
            .field("parallelism", &self.shared.config.parallelism)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    /// Create an idle runner
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                run_id: Uuid::new_v4(),
                config,
                stop: StopToken::new(),
                book: Mutex::new(Book {
                    state: RunState::Idle,
                    accepting: true,
                    pending: VecDeque::new(),
                    drained: Vec::new(),
                    enumerated: 0,
                    completed: 0,
                    skipped: 0,
                    unit_errors: Vec::new(),
                    scheduler_errors: Vec::new(),
                    started: None,
                    summary: None,
                    finished: false,
                }),
                finished: Condvar::new(),
                observers: RwLock::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.shared.config
    }

    /// Identifier of this run
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.shared.run_id
    }

    /// Current run state
    #[must_use]
    pub fn state(&self) -> RunState {
        self.shared.book.lock().state
    }

    /// Queue a batch
    ///
    /// Allowed before `run` and while the dispatcher is still enumerating.
    ///
    /// # Errors
    /// [`SchedulerError::Closed`] once dispatch has finished
    pub fn add(&self, batch: impl WorkBatch + 'static) -> Result<(), SchedulerError> {
        self.add_boxed(Box::new(batch))
    }

    /// Queue an already boxed batch
    ///
    /// # Errors
    /// [`SchedulerError::Closed`] once dispatch has finished
    pub fn add_boxed(&self, batch: Box<dyn WorkBatch>) -> Result<(), SchedulerError> {
        let mut book = self.shared.book.lock();
        if !book.accepting {
            return Err(SchedulerError::Closed(book.state));
        }
        tracing::debug!(batch = batch.name(), "batch queued");
        book.pending.push_back(batch);
        Ok(())
    }

    /// Register a callback for every event
    ///
    /// Callbacks run on the coordinating thread, one at a time.
    pub fn on_event(&self, observer: impl Fn(&RunEvent) + Send + Sync + 'static) {
        self.shared.observers.write().push(Arc::new(observer));
    }

    /// Subscribe to events through a channel
    ///
    /// Only events emitted after subscribing are delivered.
    #[must_use]
    pub fn events(&self) -> Receiver<RunEvent> {
        let (tx, rx) = channel::unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Stop dispatching new units
    ///
    /// Units already running finish normally.
    pub fn stop(&self) {
        tracing::info!(run_id = %self.shared.run_id, "stop requested");
        self.shared.stop.stop();
    }

    /// Token observed by the dispatcher and passed to every unit
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.shared.stop.clone()
    }

    /// Completed units over units enumerated so far, 1.0 once completed
    #[must_use]
    pub fn progress(&self) -> f64 {
        let book = self.shared.book.lock();
        if book.state == RunState::Completed {
            return 1.0;
        }
        let total = book.enumerated.saturating_sub(book.skipped);
        if total == 0 {
            0.0
        } else {
            (book.completed as f64 / total as f64).min(1.0)
        }
    }

    /// Summary of a completed run
    #[must_use]
    pub fn summary(&self) -> Option<RunSummary> {
        self.shared.book.lock().summary.clone()
    }

    /// Start the run
    ///
    /// With `wait` the calling thread coordinates the run and receives the
    /// summary. Without it a coordinator thread is spawned and `None` is
    /// returned; use [`JobRunner::wait`], events or polling.
    ///
    /// # Errors
    /// [`SchedulerError::AlreadyStarted`] when called twice
    pub fn run(&self, wait: bool) -> Result<Option<RunSummary>, SchedulerError> {
        {
            let mut book = self.shared.book.lock();
            let current = book.state;
            book.state = current
                .transition(RunState::Running)
                .map_err(|_| SchedulerError::AlreadyStarted(current))?;
            book.started = Some(Instant::now());
        }

        let span = tracing::info_span!("run", run_id = %self.shared.run_id);
        let completions = self.start(&span);

        if wait {
            return Ok(Some(coordinate(&self.shared, &completions, &span)));
        }

        let shared = Arc::clone(&self.shared);
        let fallback = completions.clone();
        let coordinator_span = span.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-coordinator", self.shared.config.thread_prefix))
            .spawn(move || {
                coordinate(&shared, &completions, &coordinator_span);
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "coordinator thread unavailable; coordinating inline");
            return Ok(Some(coordinate(&self.shared, &fallback, &span)));
        }
        Ok(None)
    }

    /// Block until the run completes
    ///
    /// # Errors
    /// [`SchedulerError::NotStarted`] before `run`
    pub fn wait(&self) -> Result<RunSummary, SchedulerError> {
        let mut book = self.shared.book.lock();
        if book.state == RunState::Idle {
            return Err(SchedulerError::NotStarted);
        }
        while !book.finished {
            self.shared.finished.wait(&mut book);
        }
        book.summary.clone().ok_or(SchedulerError::NotStarted)
    }

    /// Spawn workers and the dispatcher; returns the completion stream
    fn start(&self, span: &Span) -> Receiver<UnitReport> {
        let config = &self.shared.config;
        let (done_tx, done_rx) = channel::unbounded();
        let (job_tx, job_rx) = channel::bounded::<Job>(0);

        let workers = config.parallelism.workers();
        tracing::info!(parent: span, workers, "run started");

        for index in 0..workers {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let stop = self.shared.stop.clone();
            let worker_span = span.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{index}", config.thread_prefix))
                .spawn(move || work(&jobs, &done, &stop, &worker_span));
            if let Err(err) = spawned {
                self.shared.record_failure(SchedulerFailure::new(
                    None,
                    anyhow::Error::new(err).context(format!("failed to spawn worker {index}")),
                ));
            }
        }
        drop(job_rx);
        drop(done_tx);

        let shared = Arc::clone(&self.shared);
        let dispatch_span = span.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-dispatch", config.thread_prefix))
            .spawn(move || dispatch(&shared, &job_tx, &dispatch_span));
        if let Err(err) = spawned {
            self.shared.book.lock().accepting = false;
            self.shared.record_failure(SchedulerFailure::new(
                None,
                anyhow::Error::new(err).context("failed to spawn dispatcher"),
            ));
        }
        done_rx
    }
}

fn dispatch(shared: &Shared, jobs: &Sender<Job>, span: &Span) {
    let _entered = span.enter();
    loop {
        let next = {
            let mut book = shared.book.lock();
            let next = if shared.stop.is_stopped() {
                None
            } else {
                book.pending.pop_front()
            };
            if next.is_none() {
                book.accepting = false;
            }
            next
        };
        let Some(mut batch) = next else {
            break;
        };

        let name = batch.name().to_string();
        if let Err(err) = batch.prepare() {
            shared.record_failure(SchedulerFailure::new(
                Some(&name),
                err.context("prepare failed"),
            ));
            continue;
        }
        tracing::debug!(batch = %name, "batch prepared");

        let workers_alive = feed(shared, batch.as_mut(), &name, jobs);
        shared.book.lock().drained.push(batch);
        if !workers_alive {
            shared.book.lock().accepting = false;
            break;
        }
    }
    tracing::debug!("dispatch finished");
}

/// Send every unit of `batch`; `false` if no worker is left to receive
fn feed(shared: &Shared, batch: &mut dyn WorkBatch, name: &str, jobs: &Sender<Job>) -> bool {
    while !shared.stop.is_stopped() {
        let unit = match batch.next_unit() {
            None => return true,
            Some(Ok(unit)) => unit,
            Some(Err(err)) => {
                shared.record_failure(SchedulerFailure::new(
                    Some(name),
                    err.context("enumeration failed"),
                ));
                return true;
            }
        };

        shared.book.lock().enumerated += 1;
        let job = Job {
            batch: name.to_string(),
            unit,
        };
        if jobs.send(job).is_err() {
            shared.book.lock().enumerated -= 1;
            shared.record_failure(SchedulerFailure::new(
                Some(name),
                anyhow::anyhow!("no worker available to run units"),
            ));
            return false;
        }
    }
    true
}

fn work(jobs: &Receiver<Job>, done: &Sender<UnitReport>, stop: &StopToken, span: &Span) {
    let _entered = span.enter();
    for Job { batch, mut unit } in jobs.iter() {
        let mut report = UnitReport::pending(batch, unit.as_ref());
        if stop.is_stopped() {
            tracing::debug!(batch = %report.batch, unit = %report.unit, "skipped after stop");
            report.advance(UnitState::Skipped);
        } else {
            report.advance(UnitState::Running);
            run_unit(&mut report, unit.as_mut(), stop);
        }
        if done.send(report).is_err() {
            break;
        }
    }
}

fn run_unit(report: &mut UnitReport, unit: &mut dyn WorkUnit, stop: &StopToken) {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unit.run(stop)));
    report.elapsed = started.elapsed();
    let elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX);

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(payload) => Some(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    };
    match error {
        None => {
            tracing::debug!(batch = %report.batch, unit = %report.unit, elapsed_ms, "unit succeeded");
            report.advance(UnitState::Succeeded);
        }
        Some(err) => {
            tracing::warn!(batch = %report.batch, unit = %report.unit, elapsed_ms, error = %format!("{err:#}"), "unit failed");
            report.error = Some(Arc::new(err));
            report.advance(UnitState::Failed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn coordinate(shared: &Shared, completions: &Receiver<UnitReport>, span: &Span) -> RunSummary {
    let _entered = span.enter();
    for report in completions.iter() {
        if report.state == UnitState::Skipped {
            shared.book.lock().skipped += 1;
            shared.emit(&RunEvent::UnitSkipped(report));
            continue;
        }
        {
            let mut book = shared.book.lock();
            book.completed += 1;
            if let Some(error) = &report.error {
                book.unit_errors.push(WorkUnitFailure {
                    batch: report.batch.clone(),
                    unit: report.unit.clone(),
                    error: Arc::clone(error),
                });
            }
        }
        shared.emit(&RunEvent::UnitCompleted(report));
    }

    // Every worker has exited; nothing else touches the drained batches.
    let drained = std::mem::take(&mut shared.book.lock().drained);
    for mut batch in drained {
        for err in batch.finish() {
            shared.record_failure(SchedulerFailure::new(
                Some(batch.name()),
                err.context("finish failed"),
            ));
        }
    }

    let summary = {
        let mut book = shared.book.lock();
        let summary = RunSummary {
            run_id: shared.run_id,
            unit_errors: book.unit_errors.clone(),
            scheduler_errors: book.scheduler_errors.clone(),
            units_completed: book.completed,
            units_skipped: book.skipped,
            elapsed: book.started.map(|s| s.elapsed()).unwrap_or_default(),
            cancelled: shared.stop.is_stopped(),
        };
        book.state = RunState::Completed;
        book.accepting = false;
        book.summary = Some(summary.clone());
        summary
    };

    tracing::info!(
        units = summary.units_completed,
        unit_errors = summary.unit_errors.len(),
        scheduler_errors = summary.scheduler_errors.len(),
        elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
        cancelled = summary.cancelled,
        "run completed"
    );
    shared.emit(&RunEvent::RunCompleted(summary.clone()));

    shared.book.lock().finished = true;
    shared.finished.notify_all();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{FnUnit, IterBatch};

    #[test]
    fn parallelism_from_count() {
        assert_eq!(Parallelism::from_count(0), Parallelism::AllCores);
        assert_eq!(Parallelism::from_count(-3), Parallelism::AllCores);
        assert_eq!(Parallelism::from_count(1), Parallelism::SERIAL);
        assert!(Parallelism::from_count(1).is_serial());
        assert_eq!(Parallelism::from_count(4).workers(), 4);
        assert!(Parallelism::AllCores.workers() >= 1);
    }

    #[test]
    fn panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn run_twice_is_rejected() {
        let runner = JobRunner::default();
        runner.run(true).unwrap();
        assert!(matches!(
            runner.run(true),
            Err(SchedulerError::AlreadyStarted(RunState::Completed))
        ));
    }

    #[test]
    fn wait_before_run() {
        let runner = JobRunner::default();
        assert!(matches!(runner.wait(), Err(SchedulerError::NotStarted)));
    }

    #[test]
    fn summary_messages_list_scheduler_failures_first() {
        let runner = JobRunner::new(RunnerConfig::default().with_parallelism(Parallelism::SERIAL));
        let units = vec![FnUnit::boxed("bad", |_: &StopToken| -> anyhow::Result<()> {
            anyhow::bail!("nope")
        })];
        runner.add(IterBatch::new("b", units)).unwrap();
        let summary = runner.run(true).unwrap().unwrap();

        assert_eq!(summary.error_count(), 1);
        assert_eq!(summary.messages(), ["bad failed: nope"]);
    }
}
