/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Static task data for the Timpani-RT periodic executor.
//!
//! ```text
//! config (YAML / built-in) ──► TaskDescriptor ──(sched::build_plan)──► TaskPlan
//!                               ↑ what to run                          ↑ how the OS runs it
//!                               period, workload                       policy, priority, CPUs
//! ```
//!
//! # Ownership model
//! A `TaskDescriptor` is built once at startup and **moved** into the thread
//! that runs it.  Nothing else holds a copy, so there is no shared state
//! between tasks.

use std::fmt;

use serde::Deserialize;

/// Numeric task identity, unique within a task set.
pub type TaskId = u32;

// ── Scheduling policy ─────────────────────────────────────────────────────────

/// Linux real-time scheduling policy, applied to every task of a set.
///
/// Only the two fixed-priority policies are offered; `SCHED_OTHER` would let
/// CFS override the rate-monotonic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    /// `SCHED_FIFO` – run until block or preemption by higher priority.
    #[default]
    #[serde(alias = "SCHED_FIFO")]
    Fifo,
    /// `SCHED_RR` – like FIFO, but time-sliced among equal priorities.
    #[serde(alias = "rr", alias = "SCHED_RR")]
    RoundRobin,
}

impl SchedPolicy {
    /// Kernel policy constant (`SCHED_FIFO = 1`, `SCHED_RR = 2`).
    pub fn to_linux_int(self) -> i32 {
        match self {
            SchedPolicy::Fifo => libc::SCHED_FIFO,
            SchedPolicy::RoundRobin => libc::SCHED_RR,
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedPolicy::Fifo => f.write_str("SCHED_FIFO"),
            SchedPolicy::RoundRobin => f.write_str("SCHED_RR"),
        }
    }
}

// ── CPU affinity ──────────────────────────────────────────────────────────────

/// Highest CPU id (exclusive) representable in a [`CpuAffinity`] mask.
pub const MAX_CPUS: u32 = 64;

/// CPU affinity of one task, as a `u64` bitmask (bit N = CPU N).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No pinning – the thread keeps the affinity of the process.
    #[default]
    Any,

    /// Pinned to the CPUs whose bits are set.  E.g. `0b10` = CPU 1 only.
    Pinned(u64),
}

impl CpuAffinity {
    /// Build a pinned mask from a CPU list.
    ///
    /// Returns `None` if the list is empty or names a CPU ≥ [`MAX_CPUS`].
    pub fn from_cpus(cpus: &[u32]) -> Option<Self> {
        if cpus.is_empty() {
            return None;
        }
        let mut mask = 0u64;
        for &cpu in cpus {
            if cpu >= MAX_CPUS {
                return None;
            }
            mask |= 1 << cpu;
        }
        Some(CpuAffinity::Pinned(mask))
    }

    /// CPU ids in the mask, ascending.  Empty for `Any`.
    pub fn cpus(&self) -> Vec<u32> {
        match self {
            CpuAffinity::Any => Vec::new(),
            CpuAffinity::Pinned(mask) => (0..MAX_CPUS).filter(|c| (mask >> c) & 1 == 1).collect(),
        }
    }
}

impl fmt::Display for CpuAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuAffinity::Any => f.write_str("any"),
            CpuAffinity::Pinned(_) => write!(f, "{:?}", self.cpus()),
        }
    }
}

// ── Workload ──────────────────────────────────────────────────────────────────

/// Size of the synthetic CPU-bound workload run once per period.
///
/// The work performed is proportional to `n1 × n2`; the numbers carry no
/// other meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkloadShape {
    pub n1: u32,
    pub n2: u32,
}

impl WorkloadShape {
    pub fn new(n1: u32, n2: u32) -> Self {
        Self { n1, n2 }
    }

    /// Number of inner-loop iterations (`n1 × n2`).
    pub fn iterations(&self) -> u64 {
        u64::from(self.n1) * u64::from(self.n2)
    }
}

// ── TaskDescriptor ────────────────────────────────────────────────────────────

/// Immutable configuration of one periodic task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Unique task identity.
    pub task_id: TaskId,

    /// Release period in µs.  Always > 0 once validated.
    pub period_us: u64,

    /// Synthetic workload run in every period.
    pub workload: WorkloadShape,

    /// Consecutive deadline misses tolerated before a fault is logged.
    /// `0` disables fault logging.
    pub max_dmiss: u32,
}

impl TaskDescriptor {
    pub fn new(task_id: TaskId, period_us: u64, workload: WorkloadShape) -> Self {
        Self {
            task_id,
            period_us,
            workload,
            max_dmiss: 0,
        }
    }

    pub fn with_max_dmiss(self, max_dmiss: u32) -> Self {
        Self { max_dmiss, ..self }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
