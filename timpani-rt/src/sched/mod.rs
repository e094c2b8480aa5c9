//! Scheduling configuration: maps every task to OS scheduling attributes.
//!
//! [`build_plan`] turns a validated [`TaskSetConfig`] into one [`TaskPlan`]
//! per task: the immutable [`TaskDescriptor`] plus the
//! [`SchedulingConfig`] (policy, priority, CPU affinity) its thread must
//! apply before entering the periodic loop.
//!
//! # Priority assignment
//!
//! | Mode | Priorities come from | Validation |
//! |---|---|---|
//! | `RateMonotonic` | rank of the task's period among distinct periods | range, RM ordering |
//! | `Manual` | `priority` field of every task | range, RM ordering |
//!
//! A per-task `priority` in rate-monotonic mode overrides the derived value;
//! the final set is validated either way, so an override cannot silently
//! break the ordering.
//!
//! The policy is a value of the task set, not a build-time constant, so two
//! task sets in the same process may use different policies.

pub mod error;
pub mod feasibility;
pub mod os;

pub use error::{ApplyError, ConfigError};
pub use os::{OsSchedApplier, SchedApplier};

use std::collections::HashSet;

use tracing::{debug, info};

use crate::config::TaskSetConfig;
use crate::task::{CpuAffinity, SchedPolicy, TaskDescriptor, TaskId};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Lowest `SCHED_FIFO` / `SCHED_RR` priority on Linux.
pub const RT_PRIORITY_MIN: i32 = 1;

/// Highest `SCHED_FIFO` / `SCHED_RR` priority on Linux.
pub const RT_PRIORITY_MAX: i32 = 99;

/// Priority of the shortest-period task under the default assignment.
pub const DEFAULT_HIGHEST_PRIORITY: i32 = 30;

/// Distance between adjacent rate-monotonic priority levels.
pub const DEFAULT_PRIORITY_STEP: i32 = 10;

// ── Types ─────────────────────────────────────────────────────────────────────

/// How task priorities are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityAssignment {
    /// Shortest period gets `highest`, each longer distinct period `step` less.
    RateMonotonic { highest: i32, step: i32 },
    /// Every task must carry an explicit priority.
    Manual,
}

impl Default for PriorityAssignment {
    fn default() -> Self {
        PriorityAssignment::RateMonotonic {
            highest: DEFAULT_HIGHEST_PRIORITY,
            step: DEFAULT_PRIORITY_STEP,
        }
    }
}

/// OS-visible scheduling attributes for one task thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingConfig {
    pub policy: SchedPolicy,
    /// Real-time priority, higher is preferred.
    pub priority: i32,
    pub affinity: CpuAffinity,
}

/// Everything needed to launch one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPlan {
    pub descriptor: TaskDescriptor,
    pub sched: SchedulingConfig,
    /// Optional worst-case execution time estimate, used only for
    /// feasibility warnings.
    pub wcet_us: Option<u64>,
}

// ── Priority derivation ───────────────────────────────────────────────────────

/// Rate-monotonic levels for a task set, one per task in input order.
///
/// Distinct periods are ranked ascending; rank `r` maps to
/// `highest - r * step`.  Equal periods share a level.  Levels are not
/// range-checked on construction and may fall below [`RT_PRIORITY_MIN`];
/// callers check only the levels they actually use.
struct RateMonotonicLevels {
    highest: i32,
    step: i32,
    distinct: usize,
    levels: Vec<i64>,
}

impl RateMonotonicLevels {
    /// # Errors
    /// * [`ConfigError::InvalidStep`] if `step < 1`.
    /// * [`ConfigError::PriorityOutOfRange`] (with `task = 0`) if `highest`
    ///   is outside the kernel range.
    fn derive(periods: &[u64], highest: i32, step: i32) -> Result<Self, ConfigError> {
        if step < 1 {
            return Err(ConfigError::InvalidStep { step });
        }
        if !(RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&highest) {
            return Err(ConfigError::PriorityOutOfRange {
                task: 0,
                priority: highest,
                min: RT_PRIORITY_MIN,
                max: RT_PRIORITY_MAX,
            });
        }

        let mut distinct: Vec<u64> = periods.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let levels = periods
            .iter()
            .map(|p| {
                // binary_search cannot miss: every period is in `distinct`
                let rank = distinct.binary_search(p).unwrap_or_default();
                i64::from(highest) - rank as i64 * i64::from(step)
            })
            .collect();

        Ok(Self {
            highest,
            step,
            distinct: distinct.len(),
            levels,
        })
    }

    /// Fail if the lowest of `used` is below [`RT_PRIORITY_MIN`].
    fn check_lowest(&self, used: impl Iterator<Item = i64>) -> Result<(), ConfigError> {
        match used.min() {
            Some(lowest) if lowest < i64::from(RT_PRIORITY_MIN) => {
                Err(ConfigError::PriorityRangeExhausted {
                    highest: self.highest,
                    step: self.step,
                    levels: self.distinct,
                    lowest,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Check that every shorter-period task strictly outranks every longer-period
/// task.  Input is `(task_id, period_us, priority)`.
///
/// Tasks with equal periods are not constrained relative to each other.
pub fn check_rate_monotonic(tasks: &[(TaskId, u64, i32)]) -> Result<(), ConfigError> {
    for &(a_id, a_period, a_prio) in tasks {
        for &(b_id, b_period, b_prio) in tasks {
            if a_period < b_period && a_prio <= b_prio {
                return Err(ConfigError::RateMonotonicViolation {
                    shorter: a_id,
                    shorter_period_us: a_period,
                    shorter_priority: a_prio,
                    longer: b_id,
                    longer_period_us: b_period,
                    longer_priority: b_prio,
                });
            }
        }
    }
    Ok(())
}

// ── Plan construction ─────────────────────────────────────────────────────────

/// Validate `config` and build one [`TaskPlan`] per task, in config order.
pub fn build_plan(config: &TaskSetConfig) -> Result<Vec<TaskPlan>, ConfigError> {
    if config.tasks.is_empty() {
        return Err(ConfigError::EmptyTaskSet);
    }

    let mut seen = HashSet::new();
    for entry in &config.tasks {
        if !seen.insert(entry.task_id) {
            return Err(ConfigError::DuplicateTaskId {
                task: entry.task_id,
            });
        }
        if entry.period_us == 0 {
            return Err(ConfigError::ZeroPeriod {
                task: entry.task_id,
            });
        }
    }

    // ── Priorities ────────────────────────────────────────────────────────────
    let priorities: Vec<i32> = match config.priorities {
        PriorityAssignment::RateMonotonic { highest, step } => {
            let periods: Vec<u64> = config.tasks.iter().map(|t| t.period_us).collect();
            let derived = RateMonotonicLevels::derive(&periods, highest, step)?;
            // Overridden tasks never use their derived level
            derived.check_lowest(
                config
                    .tasks
                    .iter()
                    .zip(&derived.levels)
                    .filter(|(t, _)| t.priority.is_none())
                    .map(|(_, &l)| l),
            )?;
            config
                .tasks
                .iter()
                .zip(&derived.levels)
                .map(|(t, &d)| match t.priority {
                    Some(p) => {
                        debug!(task = t.task_id, derived = d, manual = p, "priority override");
                        p
                    }
                    None => d as i32,
                })
                .collect()
        }
        PriorityAssignment::Manual => config
            .tasks
            .iter()
            .map(|t| {
                t.priority
                    .ok_or(ConfigError::MissingPriority { task: t.task_id })
            })
            .collect::<Result<_, _>>()?,
    };

    for (entry, &priority) in config.tasks.iter().zip(&priorities) {
        if !(RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&priority) {
            return Err(ConfigError::PriorityOutOfRange {
                task: entry.task_id,
                priority,
                min: RT_PRIORITY_MIN,
                max: RT_PRIORITY_MAX,
            });
        }
    }

    let triples: Vec<(TaskId, u64, i32)> = config
        .tasks
        .iter()
        .zip(&priorities)
        .map(|(t, &p)| (t.task_id, t.period_us, p))
        .collect();
    check_rate_monotonic(&triples)?;

    // ── Assemble ──────────────────────────────────────────────────────────────
    let mut plans = Vec::with_capacity(config.tasks.len());
    for (entry, priority) in config.tasks.iter().zip(priorities) {
        let cpus = entry.cpus.as_deref().unwrap_or(&config.cpus);
        let affinity =
            CpuAffinity::from_cpus(cpus).ok_or_else(|| ConfigError::InvalidAffinity {
                task: entry.task_id,
                cpus: cpus.to_vec(),
            })?;

        let plan = TaskPlan {
            descriptor: TaskDescriptor::new(entry.task_id, entry.period_us, entry.workload)
                .with_max_dmiss(entry.max_dmiss),
            sched: SchedulingConfig {
                policy: config.policy,
                priority,
                affinity,
            },
            wcet_us: entry.wcet_us,
        };

        info!(
            task      = plan.descriptor.task_id,
            period_us = plan.descriptor.period_us,
            policy    = %plan.sched.policy,
            priority  = plan.sched.priority,
            cpus      = %plan.sched.affinity,
            "planned"
        );
        plans.push(plan);
    }

    Ok(plans)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
