use canopy_kernel::prelude::*;
use canopy_kernel::{RunState, SchedulerError, UnitReport, UnitState};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn serial() -> JobRunner {
    JobRunner::new(RunnerConfig::default().with_parallelism(Parallelism::SERIAL))
}

/// Units that append their number to `log`; `fail` names the one that errors
fn logged_units(count: usize, fail: Option<usize>, log: &Arc<Mutex<Vec<usize>>>) -> Vec<Box<dyn WorkUnit>> {
    (1..=count)
        .map(|i| {
            let log = Arc::clone(log);
            FnUnit::boxed(format!("unit-{i}"), move |_: &StopToken| -> anyhow::Result<()> {
                log.lock().push(i);
                if fail == Some(i) {
                    anyhow::bail!("unit {i} exploded");
                }
                Ok(())
            })
        })
        .collect()
}

#[test]
fn test_serial_failure_does_not_stop_later_units() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = serial();
    runner.add(IterBatch::new("batch", logged_units(3, Some(2), &log))).unwrap();

    let summary = runner.run(true).unwrap().unwrap();

    assert_eq!(*log.lock(), vec![1, 2, 3]);
    assert_eq!(summary.units_completed, 3);
    assert_eq!(summary.unit_errors.len(), 1);
    assert_eq!(summary.unit_errors[0].unit, "unit-2");
    assert_eq!(summary.unit_errors[0].batch, "batch");
    assert!(summary.scheduler_errors.is_empty());
    assert_eq!(runner.state(), RunState::Completed);
}

#[test]
fn test_single_failure_is_isolated() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = JobRunner::new(RunnerConfig::default().with_parallelism(Parallelism::from_count(4)));
    runner.add(IterBatch::new("batch", logged_units(8, Some(5), &log))).unwrap();
    let events = runner.events();

    let summary = runner.run(true).unwrap().unwrap();

    assert_eq!(summary.unit_errors.len(), 1);
    assert_eq!(summary.unit_errors[0].unit, "unit-5");
    let reports: Vec<UnitReport> = events
        .try_iter()
        .filter_map(|event| match event {
            RunEvent::UnitCompleted(report) => Some(report),
            RunEvent::UnitSkipped(_) | RunEvent::RunCompleted(_) => None,
        })
        .collect();
    assert_eq!(reports.len(), 8);
    for report in &reports {
        if report.unit == "unit-5" {
            assert_eq!(report.state, UnitState::Failed);
            assert!(report.error.is_some());
        } else {
            assert!(report.succeeded(), "{} should succeed", report.unit);
        }
    }
}

#[test]
fn test_panicking_unit_is_caught() {
    let runner = serial();
    let units: Vec<Box<dyn WorkUnit>> = vec![
        FnUnit::boxed("panics", |_: &StopToken| -> anyhow::Result<()> { panic!("kaboom") }),
        FnUnit::boxed("fine", |_: &StopToken| Ok(())),
    ];
    runner.add(IterBatch::new("batch", units)).unwrap();

    let summary = runner.run(true).unwrap().unwrap();

    assert_eq!(summary.units_completed, 2);
    assert_eq!(summary.unit_errors.len(), 1);
    assert!(summary.unit_errors[0].error.to_string().contains("kaboom"));
}

#[test]
fn test_empty_run_completes() {
    let runner = JobRunner::default();
    assert_eq!(runner.progress(), 0.0);

    let summary = runner.run(true).unwrap().unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.units_completed, 0);
    assert_eq!(runner.progress(), 1.0);
}

#[test]
fn test_run_completed_event_fires_once_last() {
    let runner = serial();
    let log = Arc::new(Mutex::new(Vec::new()));
    runner.add(IterBatch::new("batch", logged_units(3, None, &log))).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    runner.on_event(move |event| {
        sink.lock().push(match event {
            RunEvent::UnitCompleted(report) => report.unit.clone(),
            RunEvent::UnitSkipped(report) => format!("skipped {}", report.unit),
            RunEvent::RunCompleted(_) => "done".to_string(),
        });
    });
    runner.run(true).unwrap();

    assert_eq!(*seen.lock(), vec!["unit-1", "unit-2", "unit-3", "done"]);
}

#[test]
fn test_stop_halts_dispatch() {
    let runner = serial();
    let token = runner.stop_token();
    let ran = Arc::new(Mutex::new(Vec::new()));
    let units: Vec<Box<dyn WorkUnit>> = (1..=10)
        .map(|i| {
            let ran = Arc::clone(&ran);
            let token = token.clone();
            FnUnit::boxed(format!("unit-{i}"), move |_: &StopToken| {
                ran.lock().push(i);
                if i == 2 {
                    token.stop();
                }
                Ok(())
            })
        })
        .collect();
    runner.add(IterBatch::new("batch", units)).unwrap();

    let summary = runner.run(true).unwrap().unwrap();

    assert_eq!(*ran.lock(), vec![1, 2]);
    assert!(summary.cancelled);
    assert_eq!(summary.units_completed, 2);
    assert!(summary.units_skipped <= 1);
}

#[test]
fn test_units_dispatched_after_stop_are_skipped() {
    let runner = serial();
    let token = runner.stop_token();
    let (enumerated_tx, enumerated_rx) = crossbeam::channel::unbounded::<()>();
    let units = (1..=3).map(move |i| {
        if i == 2 {
            let _ = enumerated_tx.send(());
        }
        let token = token.clone();
        let enumerated = enumerated_rx.clone();
        FnUnit::boxed(format!("unit-{i}"), move |_: &StopToken| -> anyhow::Result<()> {
            if i == 1 {
                // Stop only once the dispatcher is holding unit-2.
                enumerated.recv()?;
                token.stop();
            }
            Ok(())
        })
    });
    runner.add(IterBatch::new("batch", units)).unwrap();
    let events = runner.events();

    let summary = runner.run(true).unwrap().unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.units_completed, 1);
    assert_eq!(summary.units_skipped, 1);
    let skipped: Vec<UnitReport> = events
        .try_iter()
        .filter_map(|event| match event {
            RunEvent::UnitSkipped(report) => Some(report),
            _ => None,
        })
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].unit, "unit-2");
    assert_eq!(skipped[0].state, UnitState::Skipped);
    assert!(skipped[0].error.is_none());
    assert_eq!(runner.progress(), 1.0);
}

#[test]
fn test_units_see_stop_token() {
    let runner = serial();
    let handle = runner.clone();
    let units: Vec<Box<dyn WorkUnit>> = vec![FnUnit::boxed("long", move |stop: &StopToken| {
        handle.stop();
        while !stop.is_stopped() {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    })];
    runner.add(IterBatch::new("batch", units)).unwrap();

    let summary = runner.run(true).unwrap().unwrap();
    assert!(summary.cancelled);
    assert!(summary.is_success());
}

#[test]
fn test_background_run_and_wait() {
    let runner = JobRunner::new(RunnerConfig::default().with_parallelism(Parallelism::from_count(2)));
    let log = Arc::new(Mutex::new(Vec::new()));
    runner.add(IterBatch::new("batch", logged_units(5, None, &log))).unwrap();
    let events = runner.events();

    assert!(runner.run(false).unwrap().is_none());
    let summary = runner.wait().unwrap();

    assert_eq!(summary.units_completed, 5);
    assert_eq!(runner.progress(), 1.0);
    let last = events.try_iter().last();
    assert!(matches!(last, Some(RunEvent::RunCompleted(_))));
}

#[test]
fn test_add_after_completion_is_rejected() {
    let runner = JobRunner::default();
    runner.run(true).unwrap();
    let late = IterBatch::new("late", Vec::<Box<dyn WorkUnit>>::new());
    assert!(matches!(
        runner.add(late),
        Err(SchedulerError::Closed(RunState::Completed))
    ));
}

#[test]
fn test_add_while_running() {
    let runner = serial();
    let handle = runner.clone();
    let log = Arc::new(Mutex::new(Vec::new()));
    let more = logged_units(2, None, &log);
    let mut pending = Some(more);
    // The second unit keeps the dispatcher inside "first" until the feeder
    // has returned.
    let units: Vec<Box<dyn WorkUnit>> = vec![
        FnUnit::boxed("feeder", move |_: &StopToken| -> anyhow::Result<()> {
            if let Some(units) = pending.take() {
                handle.add(IterBatch::new("more", units))?;
            }
            Ok(())
        }),
        FnUnit::boxed("gate", |_: &StopToken| Ok(())),
    ];
    runner.add(IterBatch::new("first", units)).unwrap();

    let summary = runner.run(true).unwrap().unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.units_completed, 4);
    assert_eq!(*log.lock(), vec![1, 2]);
}

struct HookBatch {
    name: String,
    remaining: usize,
    fail_prepare: bool,
    fail_enumeration_at: Option<usize>,
    finish_errors: usize,
    calls: Arc<Mutex<Vec<String>>>,
}

impl HookBatch {
    fn new(name: &str, remaining: usize, calls: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            remaining,
            fail_prepare: false,
            fail_enumeration_at: None,
            finish_errors: 0,
            calls: Arc::clone(calls),
        }
    }
}

impl WorkBatch for HookBatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self) -> anyhow::Result<()> {
        self.calls.lock().push(format!("{}:prepare", self.name));
        if self.fail_prepare {
            anyhow::bail!("cannot prepare");
        }
        Ok(())
    }

    fn next_unit(&mut self) -> Option<anyhow::Result<Box<dyn WorkUnit>>> {
        if self.remaining == 0 {
            return None;
        }
        if self.fail_enumeration_at == Some(self.remaining) {
            return Some(Err(anyhow::anyhow!("enumeration broke")));
        }
        self.remaining -= 1;
        let calls = Arc::clone(&self.calls);
        let label = format!("{}:unit", self.name);
        Some(Ok(FnUnit::boxed(label.clone(), move |_: &StopToken| {
            calls.lock().push(label.clone());
            Ok(())
        })))
    }

    fn finish(&mut self) -> Vec<anyhow::Error> {
        self.calls.lock().push(format!("{}:finish", self.name));
        (1..=self.finish_errors)
            .map(|i| anyhow::anyhow!("cleanup {i} failed"))
            .collect()
    }
}

#[test]
fn test_batch_hooks_wrap_the_whole_run() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let runner = serial();
    runner.add(HookBatch::new("a", 1, &calls)).unwrap();
    runner.add(HookBatch::new("b", 1, &calls)).unwrap();

    let summary = runner.run(true).unwrap().unwrap();

    assert!(summary.is_success());
    let calls = calls.lock().clone();
    assert_eq!(&calls[calls.len() - 2..], ["a:finish", "b:finish"]);
    let pos = |s: &str| calls.iter().position(|c| c == s).unwrap();
    assert!(pos("a:prepare") < pos("a:unit"));
    assert!(pos("b:prepare") < pos("b:unit"));
    assert!(pos("b:unit") < pos("a:finish"));
}

#[test]
fn test_scheduler_failures_are_separate() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let runner = serial();

    let mut broken = HookBatch::new("broken", 3, &calls);
    broken.fail_prepare = true;
    let mut partial = HookBatch::new("partial", 3, &calls);
    partial.fail_enumeration_at = Some(1);
    runner.add(broken).unwrap();
    runner.add(partial).unwrap();
    runner.add(HookBatch::new("healthy", 2, &calls)).unwrap();

    let summary = runner.run(true).unwrap().unwrap();

    assert!(summary.unit_errors.is_empty());
    assert_eq!(summary.scheduler_errors.len(), 2);
    assert_eq!(summary.scheduler_errors[0].batch.as_deref(), Some("broken"));
    assert_eq!(summary.scheduler_errors[1].batch.as_deref(), Some("partial"));
    // partial yields two units before failing, healthy yields two
    assert_eq!(summary.units_completed, 4);
    assert!(!calls.lock().contains(&"broken:finish".to_string()));
}

#[test]
fn test_each_finish_error_is_reported() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let runner = serial();
    let mut batch = HookBatch::new("tidy", 1, &calls);
    batch.finish_errors = 2;
    runner.add(batch).unwrap();

    let summary = runner.run(true).unwrap().unwrap();

    assert_eq!(summary.units_completed, 1);
    assert!(summary.unit_errors.is_empty());
    let messages = summary.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("cleanup 1 failed"), "{}", messages[0]);
    assert!(messages[1].contains("cleanup 2 failed"), "{}", messages[1]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_all_units_complete(units in 1usize..16, parallelism in 1i32..8) {
        let runner = JobRunner::new(
            RunnerConfig::default().with_parallelism(Parallelism::from_count(parallelism)),
        );
        let counter = Arc::new(AtomicUsize::new(0));
        let batch: Vec<Box<dyn WorkUnit>> = (0..units)
            .map(|i| {
                let counter = Arc::clone(&counter);
                FnUnit::boxed(format!("u{i}"), move |_: &StopToken| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        runner.add(IterBatch::new("batch", batch)).unwrap();
        let events = runner.events();

        let summary = runner.run(true).unwrap().unwrap();

        prop_assert!(summary.unit_errors.is_empty());
        prop_assert_eq!(summary.units_completed, units);
        prop_assert_eq!(counter.load(Ordering::SeqCst), units);
        let completions = events
            .try_iter()
            .filter(|e| matches!(e, RunEvent::UnitCompleted(_)))
            .count();
        prop_assert_eq!(completions, units);
    }
}
