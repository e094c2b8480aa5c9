/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Launching and awaiting a task set.
//!
//! ```text
//! Orchestrator::launch(plans)
//!   ├─ spawn rt-task-<id> ──► apply SchedulingConfig ──► ack ─┐
//!   ├─ spawn rt-task-<id> ──► apply SchedulingConfig ──► ack ─┤
//!   └─ ...                                                    │
//!   all acks Ok?  ── yes ──► Start to every thread ──► PeriodicTask::run
//!                 └─ no ───► Abort to every thread ──► join, LaunchError
//! ```
//!
//! No task enters its periodic loop until every task has its real-time
//! attributes in place, so a privilege problem never leaves a partial task
//! set running.

use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{error, info};

use crate::clock::Clock;
use crate::runtime::{
    PeriodicTask, ReportSink, RunOptions, RuntimeError, ShutdownSignal, TaskSummary,
};
use crate::sched::{ApplyError, SchedApplier, TaskPlan};
use crate::task::TaskId;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn thread for task {task}: {source}")]
    Spawn {
        task: TaskId,
        #[source]
        source: io::Error,
    },

    #[error("task {task}: {source}")]
    Apply {
        task: TaskId,
        #[source]
        source: ApplyError,
    },

    /// A task thread went away without acknowledging its configuration.
    #[error("task {task} exited during startup")]
    LostDuringStartup { task: TaskId },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("task {task} panicked")]
    Panicked { task: TaskId },
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Startup decision sent to each task thread after all acks are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Start,
    Abort,
}

/// Triggers shutdown if dropped while its thread is unwinding.
struct ShutdownOnPanic(ShutdownSignal);

impl Drop for ShutdownOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.trigger();
        }
    }
}

/// Binds plans to OS threads.
pub struct Orchestrator {
    clock: Arc<dyn Clock>,
    applier: Arc<dyn SchedApplier>,
    sink: Arc<dyn ReportSink>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        clock: Arc<dyn Clock>,
        applier: Arc<dyn SchedApplier>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            clock,
            applier,
            sink,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Spawn one thread per plan and release them once every thread has
    /// applied its scheduling attributes.
    ///
    /// # Errors
    /// Any spawn or attribute failure aborts *all* threads before their loop
    /// starts; the first failure is returned.
    pub fn launch(
        &self,
        plans: Vec<TaskPlan>,
        shutdown: ShutdownSignal,
    ) -> Result<RunningTaskSet, LaunchError> {
        let (ack_tx, ack_rx) = mpsc::channel::<(TaskId, Result<(), ApplyError>)>();
        let mut started: Vec<(TaskId, mpsc::Sender<Gate>, JoinHandle<_>)> = Vec::new();
        let mut failure: Option<LaunchError> = None;

        for plan in plans {
            let task = plan.descriptor.task_id;
            let (gate_tx, gate_rx) = mpsc::channel();
            let ack_tx = ack_tx.clone();
            let applier = Arc::clone(&self.applier);
            let periodic = PeriodicTask::new(
                plan.descriptor,
                Arc::clone(&self.clock),
                Arc::clone(&self.sink),
            )
            .with_options(self.options);
            let sched = plan.sched;
            let shutdown = shutdown.clone();

            let spawned = thread::Builder::new()
                .name(format!("rt-task-{task}"))
                .spawn(move || -> Result<TaskSummary, RuntimeError> {
                    let applied = applier.apply(&sched);
                    let ok = applied.is_ok();
                    let _ = ack_tx.send((task, applied));
                    drop(ack_tx);
                    if !ok {
                        return Err(RuntimeError::StartAborted { task });
                    }
                    match gate_rx.recv() {
                        Ok(Gate::Start) => {
                            let _guard = ShutdownOnPanic(shutdown.clone());
                            let result = periodic.run(&shutdown);
                            // A fatal task error stops the rest of the set
                            if result.is_err() {
                                shutdown.trigger();
                            }
                            result
                        }
                        Ok(Gate::Abort) | Err(_) => Err(RuntimeError::StartAborted { task }),
                    }
                });

            match spawned {
                Ok(handle) => started.push((task, gate_tx, handle)),
                Err(source) => {
                    failure = Some(LaunchError::Spawn { task, source });
                    break;
                }
            }
        }
        drop(ack_tx);

        // ── Collect one ack per spawned thread ────────────────────────────────
        let mut acked = Vec::with_capacity(started.len());
        while acked.len() < started.len() {
            match ack_rx.recv() {
                Ok((task, Ok(()))) => acked.push(task),
                Ok((task, Err(source))) => {
                    acked.push(task);
                    error!(task, error = %source, "scheduling attributes rejected");
                    if failure.is_none() {
                        failure = Some(LaunchError::Apply { task, source });
                    }
                }
                Err(_) => {
                    // Every sender is gone: some thread died before acking
                    let task = started
                        .iter()
                        .map(|(t, _, _)| *t)
                        .find(|t| !acked.contains(t))
                        .unwrap_or_default();
                    if failure.is_none() {
                        failure = Some(LaunchError::LostDuringStartup { task });
                    }
                    break;
                }
            }
        }

        // ── Release or abort ──────────────────────────────────────────────────
        let gate = if failure.is_none() {
            Gate::Start
        } else {
            Gate::Abort
        };
        for (_, gate_tx, _) in &started {
            let _ = gate_tx.send(gate);
        }

        let handles: Vec<(TaskId, JoinHandle<_>)> =
            started.into_iter().map(|(t, _, h)| (t, h)).collect();

        if let Some(err) = failure {
            for (_, handle) in handles {
                let _ = handle.join();
            }
            return Err(err);
        }

        info!(tasks = handles.len(), "task set released");
        Ok(RunningTaskSet { handles, shutdown })
    }
}

// ── RunningTaskSet ────────────────────────────────────────────────────────────

/// Handles of a launched task set.
pub struct RunningTaskSet {
    handles: Vec<(TaskId, JoinHandle<Result<TaskSummary, RuntimeError>>)>,
    shutdown: ShutdownSignal,
}

impl RunningTaskSet {
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.handles.iter().map(|(t, _)| *t).collect()
    }

    /// Signal that stops every task at its next release.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Wait for every task thread.
    ///
    /// Without a shutdown or iteration bound this blocks forever.  A task that
    /// fails or panics triggers shutdown of the others itself; the first error is
    /// returned after all threads have stopped.
    pub fn join(self) -> Result<Vec<TaskSummary>, LaunchError> {
        let mut summaries = Vec::with_capacity(self.handles.len());
        let mut first_err = None;

        for (task, handle) in self.handles {
            let outcome = match handle.join() {
                Ok(Ok(summary)) => Ok(summary),
                Ok(Err(e)) => Err(LaunchError::Runtime(e)),
                Err(_) => Err(LaunchError::Panicked { task }),
            };
            match outcome {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!(task, error = %e, "task terminated abnormally");
                    self.shutdown.trigger();
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockError, RealtimeClock, Timestamp};
    use crate::runtime::{ChannelSink, DeadlineOutcome, DeadlineReport};
    use crate::sched::SchedulingConfig;
    use crate::task::{CpuAffinity, SchedPolicy, TaskDescriptor, WorkloadShape};
    use std::cell::Cell;
    use std::sync::Mutex;

    // ── Test helpers ──────────────────────────────────────────────────────────

    /// Records every applied config; optionally refuses one task's priority.
    #[derive(Default)]
    struct RecordingApplier {
        applied: Mutex<Vec<(String, SchedulingConfig)>>,
        refuse_priority: Option<i32>,
    }

    impl SchedApplier for RecordingApplier {
        fn apply(&self, config: &SchedulingConfig) -> Result<(), ApplyError> {
            let thread_name = thread::current().name().unwrap_or_default().to_string();
            self.applied.lock().unwrap().push((thread_name, *config));
            if self.refuse_priority == Some(config.priority) {
                return Err(ApplyError::Policy {
                    policy: config.policy,
                    priority: config.priority,
                    source: io::Error::from_raw_os_error(libc::EPERM),
                });
            }
            Ok(())
        }
    }

    thread_local! {
        static SIM_NOW: Cell<Option<Timestamp>> = Cell::new(None);
    }

    /// Simulated time kept per thread: every task starts at the same instant
    /// and sleeping jumps straight to the target.
    struct PerThreadSimClock;

    impl Clock for PerThreadSimClock {
        fn now(&self) -> Result<Timestamp, ClockError> {
            Ok(SIM_NOW.with(|t| {
                if t.get().is_none() {
                    t.set(Timestamp::new(1_000, 0));
                }
                t.get().unwrap()
            }))
        }

        fn sleep_until(&self, target: Timestamp) -> Result<(), ClockError> {
            SIM_NOW.with(|t| t.set(Some(target)));
            Ok(())
        }
    }

    /// Forwards to a channel, panicking on the first report of one task.
    struct PanickingSink {
        inner: ChannelSink,
        panic_task: TaskId,
    }

    impl ReportSink for PanickingSink {
        fn report(&self, report: &DeadlineReport) {
            if report.task_id == self.panic_task {
                panic!("sink failure for task {}", report.task_id);
            }
            self.inner.report(report);
        }
    }

    fn plan(id: TaskId, period_us: u64, priority: i32) -> TaskPlan {
        TaskPlan {
            descriptor: TaskDescriptor::new(id, period_us, WorkloadShape::new(0, 0)),
            sched: SchedulingConfig {
                policy: SchedPolicy::Fifo,
                priority,
                affinity: CpuAffinity::Pinned(0b10),
            },
            wcet_us: None,
        }
    }

    fn three_plans() -> Vec<TaskPlan> {
        vec![plan(1, 2_000, 30), plan(2, 4_000, 20), plan(3, 6_000, 10)]
    }

    fn orchestrator(
        applier: Arc<RecordingApplier>,
        max_iterations: Option<u64>,
    ) -> (Orchestrator, mpsc::Receiver<DeadlineReport>) {
        let (tx, rx) = mpsc::channel();
        let orch = Orchestrator::new(
            Arc::new(RealtimeClock),
            applier,
            Arc::new(ChannelSink::new(tx)),
        )
        .with_options(RunOptions { max_iterations });
        (orch, rx)
    }

    // ── launch / join ─────────────────────────────────────────────────────────

    #[test]
    fn every_task_applies_its_own_config_on_its_own_thread() {
        let applier = Arc::new(RecordingApplier::default());
        let (orch, _rx) = orchestrator(applier.clone(), Some(2));

        let running = orch.launch(three_plans(), ShutdownSignal::new()).unwrap();
        assert_eq!(running.task_ids(), vec![1, 2, 3]);
        running.join().unwrap();

        let mut applied = applier.applied.lock().unwrap().clone();
        applied.sort_by_key(|(_, c)| -c.priority);
        let names: Vec<&str> = applied.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["rt-task-1", "rt-task-2", "rt-task-3"]);
        assert!(applied
            .iter()
            .all(|(_, c)| c.affinity == CpuAffinity::Pinned(0b10)));
    }

    #[test]
    fn bounded_run_reports_every_period_of_every_task() {
        let applier = Arc::new(RecordingApplier::default());
        let (orch, rx) = orchestrator(applier, Some(3));

        let summaries = orch
            .launch(three_plans(), ShutdownSignal::new())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(summaries.len(), 3);
        assert!(summaries.iter().all(|s| s.iterations == 3));

        let reports: Vec<DeadlineReport> = rx.try_iter().collect();
        assert_eq!(reports.len(), 9);
        for id in 1..=3 {
            assert_eq!(reports.iter().filter(|r| r.task_id == id).count(), 3);
        }
    }

    #[test]
    fn lightly_loaded_three_task_set_meets_every_deadline() {
        let applier = Arc::new(RecordingApplier::default());
        let (tx, rx) = mpsc::channel();
        let orch = Orchestrator::new(
            Arc::new(PerThreadSimClock),
            applier.clone(),
            Arc::new(ChannelSink::new(tx)),
        )
        .with_options(RunOptions {
            max_iterations: Some(50),
        });

        let plans = vec![
            plan(1, 100_000, 30),
            plan(2, 200_000, 20),
            plan(3, 300_000, 10),
        ];
        let summaries = orch
            .launch(plans, ShutdownSignal::new())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(summaries.len(), 3);
        assert!(summaries.iter().all(|s| s.iterations == 50 && s.missed == 0));

        let reports: Vec<DeadlineReport> = rx.try_iter().collect();
        assert_eq!(reports.len(), 150);
        assert!(reports.iter().all(|r| r.outcome == DeadlineOutcome::Met));

        // Shorter period, higher priority; all on the same CPU
        let applied = applier.applied.lock().unwrap().clone();
        let prio = |name: &str| applied.iter().find(|(n, _)| n == name).unwrap().1.priority;
        assert!(prio("rt-task-1") > prio("rt-task-2"));
        assert!(prio("rt-task-2") > prio("rt-task-3"));
        assert!(applied
            .iter()
            .all(|(_, c)| c.affinity == CpuAffinity::Pinned(0b10)));
    }

    #[test]
    fn panicking_task_stops_the_rest_of_an_unbounded_set() {
        let (tx, rx) = mpsc::channel();
        let orch = Orchestrator::new(
            Arc::new(RealtimeClock),
            Arc::new(RecordingApplier::default()),
            Arc::new(PanickingSink {
                inner: ChannelSink::new(tx),
                panic_task: 3,
            }),
        );

        let running = orch.launch(three_plans(), ShutdownSignal::new()).unwrap();
        let err = running.join().unwrap_err();
        assert!(matches!(err, LaunchError::Panicked { task: 3 }), "{err}");
        assert!(rx.try_iter().all(|r| r.task_id != 3));
    }

    #[test]
    fn refused_attributes_abort_the_whole_set() {
        let applier = Arc::new(RecordingApplier {
            refuse_priority: Some(20),
            ..Default::default()
        });
        let (orch, rx) = orchestrator(applier.clone(), None);

        let err = orch
            .launch(three_plans(), ShutdownSignal::new())
            .err()
            .expect("launch must fail");
        assert!(matches!(err, LaunchError::Apply { task: 2, .. }), "{err}");

        // Every thread tried to configure itself, none ran a period
        assert_eq!(applier.applied.lock().unwrap().len(), 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn shutdown_stops_an_unbounded_set() {
        let applier = Arc::new(RecordingApplier::default());
        let (orch, rx) = orchestrator(applier, None);

        let running = orch.launch(three_plans(), ShutdownSignal::new()).unwrap();
        // Wait until the set is demonstrably running
        rx.recv().unwrap();
        running.shutdown_signal().trigger();

        let summaries = running.join().unwrap();
        assert_eq!(summaries.len(), 3);
        assert!(summaries.iter().any(|s| s.iterations >= 1));
    }

    #[test]
    fn empty_plan_list_launches_nothing() {
        let applier = Arc::new(RecordingApplier::default());
        let (orch, _rx) = orchestrator(applier, Some(1));
        let running = orch.launch(Vec::new(), ShutdownSignal::new()).unwrap();
        assert!(running.join().unwrap().is_empty());
    }
}
