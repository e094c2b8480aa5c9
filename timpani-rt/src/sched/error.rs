/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for scheduling configuration.
//!
//! Two error enums model the two failure layers:
//!
//! * [`ConfigError`]: the task set itself is invalid (detected before any
//!   thread exists).
//! * [`ApplyError`]: the kernel refused the requested attributes while a
//!   task thread was configuring itself.
//!
//! Both are fatal at startup.  Neither is retried: a missing `CAP_SYS_NICE`
//! will not appear on the second attempt.

use std::io;

use thiserror::Error;

use crate::task::{SchedPolicy, TaskId};

// ── Validation ────────────────────────────────────────────────────────────────

/// Reasons a task set is rejected by [`build_plan`](super::build_plan).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("task set is empty")]
    EmptyTaskSet,

    #[error("task id {task} is used more than once")]
    DuplicateTaskId { task: TaskId },

    #[error("task {task} has a zero period")]
    ZeroPeriod { task: TaskId },

    /// CPU list empty or naming a CPU outside the supported mask.
    #[error("task {task} has an invalid CPU affinity {cpus:?}")]
    InvalidAffinity { task: TaskId, cpus: Vec<u32> },

    /// `manual` priority mode, but the task carries no `priority`.
    #[error("task {task} has no priority (required in manual priority mode)")]
    MissingPriority { task: TaskId },

    #[error("task {task} priority {priority} is outside the real-time range {min}..={max}")]
    PriorityOutOfRange {
        task: TaskId,
        priority: i32,
        min: i32,
        max: i32,
    },

    #[error("rate-monotonic step must be at least 1, got {step}")]
    InvalidStep { step: i32 },

    /// Rate-monotonic derivation needs more priority levels than the range
    /// between `highest` and the kernel minimum provides.
    #[error(
        "{levels} distinct periods do not fit below priority {highest} with step {step} \
         (lowest would be {lowest})"
    )]
    PriorityRangeExhausted {
        highest: i32,
        step: i32,
        levels: usize,
        lowest: i64,
    },

    /// A shorter-period task does not have a strictly higher priority than a
    /// longer-period one.
    #[error(
        "rate-monotonic ordering violated: task {shorter} (period {shorter_period_us}µs, \
         priority {shorter_priority}) must outrank task {longer} (period {longer_period_us}µs, \
         priority {longer_priority})"
    )]
    RateMonotonicViolation {
        shorter: TaskId,
        shorter_period_us: u64,
        shorter_priority: i32,
        longer: TaskId,
        longer_period_us: u64,
        longer_priority: i32,
    },
}

// ── OS application ────────────────────────────────────────────────────────────

/// The kernel rejected a scheduling attribute.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to pin thread to CPUs {cpus:?}: {source}")]
    Affinity {
        cpus: Vec<u32>,
        #[source]
        source: io::Error,
    },

    #[error("failed to set {policy} priority {priority}: {source}{}", privilege_hint(.source))]
    Policy {
        policy: SchedPolicy,
        priority: i32,
        #[source]
        source: io::Error,
    },

    #[error("real-time thread attributes are not supported on this platform")]
    Unsupported,
}

fn privilege_hint(err: &io::Error) -> &'static str {
    if err.kind() == io::ErrorKind::PermissionDenied {
        " (real-time policies need root or CAP_SYS_NICE, and a non-zero RLIMIT_RTPRIO)"
    } else {
        ""
    }
}
