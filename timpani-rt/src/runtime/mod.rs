/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The per-task periodic control loop.
//!
//! ```text
//!  Initializing ──► Computing ──► DeadlineCheck ──► Sleeping ─┐
//!  (release = now)  (release += T,  (now > release?   (sleep until │
//!                    run workload)   → miss / met)     release)    │
//!                        ▲                                          │
//!                        └──────────────────────────────────────────┘
//! ```
//!
//! # Release arithmetic
//! `next_release` is only ever moved by [`ExecutionState::advance`], exactly
//! one period per iteration.  It is never recomputed from the current time,
//! so computation time and wake-up latency cannot accumulate as drift.  The
//! flip side is that an overrun is never "caught up": if overload persists,
//! every following period is missed too.
//!
//! # First deadline
//! `next_release` starts at the time the loop is entered and is advanced
//! *before* the first workload runs, so the first deadline is one full
//! period after start, not the start instant itself.
//!
//! # Lifetime
//! Under normal operation the loop never ends.  It stops only when the
//! [`ShutdownSignal`] is triggered (checked before each Computing phase) or
//! when [`RunOptions::max_iterations`] is reached.

pub mod report;
pub mod workload;

pub use report::{
    ChannelSink, DeadlineMonitor, DeadlineOutcome, DeadlineReport, ReportSink, TaskSummary,
    TracingSink,
};
pub use workload::{SyntheticWorkload, Workload};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::clock::{Clock, ClockError, Timestamp};
use crate::task::{TaskDescriptor, TaskId};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Fatal failures of a running task.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("task {task}: {source}")]
    Clock {
        task: TaskId,
        #[source]
        source: ClockError,
    },

    /// The orchestrator aborted startup before the loop began.
    #[error("task {task}: startup aborted before the first release")]
    StartAborted { task: TaskId },
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Shared stop flag for a whole task set.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every task to stop at its next release.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Knobs that bound an otherwise infinite run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this many periods.  `None` runs until shutdown.
    pub max_iterations: Option<u64>,
}

// ── Execution state ───────────────────────────────────────────────────────────

/// Private, per-task timing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionState {
    next_release: Timestamp,
    iteration: u64,
}

impl ExecutionState {
    /// Initializing: the release schedule is anchored at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            next_release: start,
            iteration: 0,
        }
    }

    /// Move the release time forward by exactly one period.
    pub fn advance(&mut self, period_us: u64) -> Timestamp {
        self.next_release = self.next_release.advance(period_us);
        self.iteration += 1;
        self.next_release
    }

    pub fn next_release(&self) -> Timestamp {
        self.next_release
    }

    /// Number of periods started so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

/// Deadline rule: missed iff the check happened strictly after the deadline.
pub fn evaluate_deadline(checked_at: Timestamp, deadline: Timestamp) -> DeadlineOutcome {
    if checked_at > deadline {
        DeadlineOutcome::Missed
    } else {
        DeadlineOutcome::Met
    }
}

// ── PeriodicTask ──────────────────────────────────────────────────────────────

/// One periodic task bound to its clock, workload and report sink.
pub struct PeriodicTask {
    descriptor: TaskDescriptor,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ReportSink>,
    workload: Box<dyn Workload>,
    options: RunOptions,
}

impl PeriodicTask {
    /// Build a task that runs the [`SyntheticWorkload`].
    pub fn new(
        descriptor: TaskDescriptor,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            descriptor,
            clock,
            sink,
            workload: Box::new(SyntheticWorkload),
            options: RunOptions::default(),
        }
    }

    pub fn with_workload(mut self, workload: Box<dyn Workload>) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the periodic loop until `shutdown` fires or the iteration bound is
    /// reached.
    ///
    /// # Errors
    /// [`RuntimeError::Clock`] if the clock cannot be read or the absolute
    /// sleep fails; the task stops immediately.
    pub fn run(mut self, shutdown: &ShutdownSignal) -> Result<TaskSummary, RuntimeError> {
        let task = self.descriptor.task_id;
        let period_us = self.descriptor.period_us;
        let clock_err = |source| RuntimeError::Clock { task, source };

        // ── Initializing ──────────────────────────────────────────────────────
        let start = self.clock.now().map_err(clock_err)?;
        let mut state = ExecutionState::new(start);
        let mut monitor = DeadlineMonitor::new(task, self.descriptor.max_dmiss);

        info!(
            task,
            period_us,
            n1 = self.descriptor.workload.n1,
            n2 = self.descriptor.workload.n2,
            inner_iterations = self.descriptor.workload.iterations(),
            start = %start,
            "periodic task started"
        );

        loop {
            if shutdown.is_triggered() {
                debug!(task, "shutdown requested");
                break;
            }
            if self
                .options
                .max_iterations
                .is_some_and(|max| state.iteration() >= max)
            {
                break;
            }

            // ── Computing ─────────────────────────────────────────────────────
            let deadline = state.advance(period_us);
            self.workload.execute(self.descriptor.workload);

            // ── DeadlineCheck ─────────────────────────────────────────────────
            let checked_at = self.clock.now().map_err(clock_err)?;
            let report = DeadlineReport {
                task_id: task,
                iteration: state.iteration(),
                deadline,
                checked_at,
                outcome: evaluate_deadline(checked_at, deadline),
            };
            self.sink.report(&report);
            monitor.record(&report);

            // ── Sleeping ──────────────────────────────────────────────────────
            self.clock.sleep_until(deadline).map_err(clock_err)?;
        }

        let summary = monitor.into_summary();
        info!(
            task,
            iterations = summary.iterations,
            met = summary.met,
            missed = summary.missed,
            "periodic task stopped"
        );
        Ok(summary)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
