/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deadline reports: the one observable output of a running task.
//!
//! Every completed period produces exactly one [`DeadlineReport`], handed to
//! a [`ReportSink`] synchronously at the end of the DeadlineCheck phase.
//! [`DeadlineMonitor`] keeps the per-task counters used for fault logging and
//! the final [`TaskSummary`].

use std::fmt;
use std::sync::mpsc::Sender;

use tracing::{error, info, warn};

use crate::clock::Timestamp;
use crate::task::TaskId;

// ── Report ────────────────────────────────────────────────────────────────────

/// Result of one deadline check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOutcome {
    Met,
    Missed,
}

/// One period of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineReport {
    pub task_id: TaskId,
    /// 1-based period index.
    pub iteration: u64,
    /// Release time of the next period.
    pub deadline: Timestamp,
    /// When the workload finished.
    pub checked_at: Timestamp,
    pub outcome: DeadlineOutcome,
}

impl DeadlineReport {
    /// `checked_at - deadline` in ns; positive means late.
    pub fn lateness_ns(&self) -> i128 {
        self.checked_at.nanos_since(&self.deadline)
    }
}

impl fmt::Display for DeadlineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            DeadlineOutcome::Met => write!(f, "task {} met its deadline", self.task_id),
            DeadlineOutcome::Missed => write!(f, "task {} missed its deadline", self.task_id),
        }
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Destination for deadline reports.  Called from the task thread.
pub trait ReportSink: Send + Sync {
    fn report(&self, report: &DeadlineReport);
}

/// Logs every report: `info!` when met, `warn!` when missed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, r: &DeadlineReport) {
        match r.outcome {
            DeadlineOutcome::Met => info!(
                task = r.task_id,
                iteration = r.iteration,
                slack_ns = -r.lateness_ns() as i64,
                "{r}"
            ),
            DeadlineOutcome::Missed => warn!(
                task = r.task_id,
                iteration = r.iteration,
                late_ns = r.lateness_ns() as i64,
                "{r}"
            ),
        }
    }
}

/// Forwards reports over a std channel.  A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<DeadlineReport>,
}

impl ChannelSink {
    pub fn new(tx: Sender<DeadlineReport>) -> Self {
        Self { tx }
    }
}

impl ReportSink for ChannelSink {
    fn report(&self, report: &DeadlineReport) {
        let _ = self.tx.send(*report);
    }
}

// ── Monitor ───────────────────────────────────────────────────────────────────

/// Per-task deadline statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub iterations: u64,
    pub met: u64,
    pub missed: u64,
    /// Largest positive lateness seen, in ns.
    pub worst_lateness_ns: i128,
    /// Longest run of consecutive misses.
    pub longest_miss_streak: u64,
}

/// Counts outcomes and logs a fault when a miss streak reaches `max_dmiss`.
///
/// The fault is logged once per streak; a met deadline ends the streak.
/// Misses are only observed; the release schedule is never adjusted.
#[derive(Debug)]
pub struct DeadlineMonitor {
    max_dmiss: u32,
    streak: u64,
    summary: TaskSummary,
}

impl DeadlineMonitor {
    pub fn new(task_id: TaskId, max_dmiss: u32) -> Self {
        Self {
            max_dmiss,
            streak: 0,
            summary: TaskSummary {
                task_id,
                ..Default::default()
            },
        }
    }

    /// Record one report.  Returns `true` if this report raised a fault.
    pub fn record(&mut self, report: &DeadlineReport) -> bool {
        let s = &mut self.summary;
        s.iterations += 1;
        match report.outcome {
            DeadlineOutcome::Met => {
                s.met += 1;
                self.streak = 0;
                false
            }
            DeadlineOutcome::Missed => {
                s.missed += 1;
                s.worst_lateness_ns = s.worst_lateness_ns.max(report.lateness_ns());
                self.streak += 1;
                s.longest_miss_streak = s.longest_miss_streak.max(self.streak);

                let fault = self.max_dmiss > 0 && self.streak == u64::from(self.max_dmiss);
                if fault {
                    error!(
                        task = s.task_id,
                        consecutive = self.streak,
                        max_dmiss = self.max_dmiss,
                        "deadline-miss fault: consecutive misses reached the limit"
                    );
                }
                fault
            }
        }
    }

    pub fn into_summary(self) -> TaskSummary {
        self.summary
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn report(outcome: DeadlineOutcome, late_ns: u32) -> DeadlineReport {
        let deadline = Timestamp::new(10, 0).unwrap();
        let checked_at = match outcome {
            DeadlineOutcome::Met => deadline,
            DeadlineOutcome::Missed => Timestamp::new(10, late_ns).unwrap(),
        };
        DeadlineReport {
            task_id: 4,
            iteration: 1,
            deadline,
            checked_at,
            outcome,
        }
    }

    #[test]
    fn display_matches_report_wording() {
        assert_eq!(
            report(DeadlineOutcome::Met, 0).to_string(),
            "task 4 met its deadline"
        );
        assert_eq!(
            report(DeadlineOutcome::Missed, 5).to_string(),
            "task 4 missed its deadline"
        );
    }

    #[test]
    fn lateness_is_positive_when_missed() {
        assert_eq!(report(DeadlineOutcome::Missed, 1_500).lateness_ns(), 1_500);
        assert_eq!(report(DeadlineOutcome::Met, 0).lateness_ns(), 0);
    }

    #[test]
    fn channel_sink_forwards_and_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        sink.report(&report(DeadlineOutcome::Met, 0));
        assert_eq!(rx.recv().unwrap().outcome, DeadlineOutcome::Met);

        drop(rx);
        sink.report(&report(DeadlineOutcome::Met, 0));
    }

    #[test]
    fn monitor_counts_and_tracks_worst_lateness() {
        let mut m = DeadlineMonitor::new(4, 0);
        m.record(&report(DeadlineOutcome::Met, 0));
        m.record(&report(DeadlineOutcome::Missed, 100));
        m.record(&report(DeadlineOutcome::Missed, 700));
        m.record(&report(DeadlineOutcome::Met, 0));

        let s = m.into_summary();
        assert_eq!(s.task_id, 4);
        assert_eq!(s.iterations, 4);
        assert_eq!(s.met, 2);
        assert_eq!(s.missed, 2);
        assert_eq!(s.worst_lateness_ns, 700);
        assert_eq!(s.longest_miss_streak, 2);
    }

    #[test]
    fn fault_fires_once_per_streak() {
        let mut m = DeadlineMonitor::new(4, 2);
        let miss = report(DeadlineOutcome::Missed, 1);
        let met = report(DeadlineOutcome::Met, 0);

        assert!(!m.record(&miss));
        assert!(m.record(&miss)); // streak reached 2
        assert!(!m.record(&miss)); // same streak, no repeat
        assert!(!m.record(&met));
        assert!(!m.record(&miss));
        assert!(m.record(&miss)); // new streak
    }

    #[test]
    fn zero_max_dmiss_never_faults() {
        let mut m = DeadlineMonitor::new(4, 0);
        for _ in 0..10 {
            assert!(!m.record(&report(DeadlineOutcome::Missed, 1)));
        }
    }
}
