/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Rate-monotonic feasibility hints.
//!
//! Workloads are synthetic loops, so execution times are only known when the
//! configuration supplies a `wcet_us` estimate.  With estimates present, the
//! Liu & Layland bound is evaluated per CPU set:
//!
//! $$U = \sum_{i=1}^{n} \frac{C_i}{T_i} \leq n \left(2^{1/n} - 1\right)$$
//!
//! Exceeding the bound is a **warning**, not an error: the set may still be
//! schedulable, and a miss is reported at run time anyway.

use crate::task::CpuAffinity;

use super::TaskPlan;

/// Liu & Layland utilisation bound `n × (2^(1/n) − 1)`; `0.0` for `n = 0`.
pub fn liu_layland_bound(n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    nf * (2.0_f64.powf(1.0 / nf) - 1.0)
}

/// Utilisation of the tasks sharing one CPU set.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationReport {
    pub affinity: CpuAffinity,
    /// Tasks with a `wcet_us` estimate (the others are not counted).
    pub task_count: usize,
    pub total: f64,
    pub bound: f64,
}

impl UtilizationReport {
    /// `true` when the set is provably RM-schedulable (`total ≤ bound`).
    pub fn within_bound(&self) -> bool {
        self.total <= self.bound
    }
}

/// Group `plans` by CPU set and compute the utilisation of each group.
///
/// Groups in which no task has a `wcet_us` estimate are omitted.  Groups are
/// returned in order of first appearance.
pub fn utilization_by_cpu_set(plans: &[TaskPlan]) -> Vec<UtilizationReport> {
    let mut groups: Vec<(CpuAffinity, Vec<f64>)> = Vec::new();

    for plan in plans {
        let Some(wcet) = plan.wcet_us else { continue };
        let u = wcet as f64 / plan.descriptor.period_us as f64;
        match groups.iter_mut().find(|(aff, _)| *aff == plan.sched.affinity) {
            Some((_, utils)) => utils.push(u),
            None => groups.push((plan.sched.affinity, vec![u])),
        }
    }

    groups
        .into_iter()
        .map(|(affinity, utils)| UtilizationReport {
            affinity,
            task_count: utils.len(),
            total: utils.iter().sum(),
            bound: liu_layland_bound(utils.len()),
        })
        .collect()
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple of all periods, in µs.
///
/// This is the window after which the release pattern repeats; one
/// hyperperiod is the natural length for an observation run.  Returns `None`
/// for an empty set or on `u64` overflow.
pub fn hyperperiod_us(plans: &[TaskPlan]) -> Option<u64> {
    let mut periods = plans.iter().map(|p| p.descriptor.period_us);
    let first = periods.next()?;
    periods.try_fold(first, |acc, p| (acc / gcd(acc, p)).checked_mul(p))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::SchedulingConfig;
    use crate::task::{SchedPolicy, TaskDescriptor, WorkloadShape};

    fn plan(id: u32, period_us: u64, wcet_us: Option<u64>, cpus: &[u32]) -> TaskPlan {
        TaskPlan {
            descriptor: TaskDescriptor::new(id, period_us, WorkloadShape::default()),
            sched: SchedulingConfig {
                policy: SchedPolicy::Fifo,
                priority: 10,
                affinity: CpuAffinity::from_cpus(cpus).unwrap(),
            },
            wcet_us,
        }
    }

    #[test]
    fn bound_values() {
        assert_eq!(liu_layland_bound(0), 0.0);
        assert!((liu_layland_bound(1) - 1.0).abs() < 1e-10);
        assert!((liu_layland_bound(3) - 0.7798).abs() < 1e-3);
    }

    #[test]
    fn light_three_task_set_is_within_bound() {
        // 20/100 + 30/200 + 40/300 ≈ 0.483 < 0.780
        let plans = [
            plan(1, 100_000, Some(20_000), &[1]),
            plan(2, 200_000, Some(30_000), &[1]),
            plan(3, 300_000, Some(40_000), &[1]),
        ];
        let reports = utilization_by_cpu_set(&plans);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].task_count, 3);
        assert!(reports[0].within_bound(), "{:?}", reports[0]);
    }

    #[test]
    fn overloaded_set_exceeds_bound() {
        let plans = [
            plan(1, 100_000, Some(60_000), &[1]),
            plan(2, 200_000, Some(80_000), &[1]),
        ];
        let r = &utilization_by_cpu_set(&plans)[0];
        assert!((r.total - 1.0).abs() < 1e-9);
        assert!(!r.within_bound());
    }

    #[test]
    fn groups_split_by_cpu_set_and_skip_unknown_wcet() {
        let plans = [
            plan(1, 100, Some(10), &[1]),
            plan(2, 100, Some(10), &[2]),
            plan(3, 100, None, &[1]),
            plan(4, 100, None, &[3]),
        ];
        let reports = utilization_by_cpu_set(&plans);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].affinity.cpus(), vec![1]);
        assert_eq!(reports[0].task_count, 1);
        assert_eq!(reports[1].affinity.cpus(), vec![2]);
    }

    #[test]
    fn hyperperiod_of_default_periods() {
        let plans = [
            plan(1, 100_000, None, &[1]),
            plan(2, 200_000, None, &[1]),
            plan(3, 300_000, None, &[1]),
        ];
        assert_eq!(hyperperiod_us(&plans), Some(600_000));
    }

    #[test]
    fn hyperperiod_empty_and_overflow() {
        assert_eq!(hyperperiod_us(&[]), None);
        let plans = [
            plan(1, u64::MAX / 2 + 1, None, &[1]),
            plan(2, u64::MAX / 2, None, &[1]),
        ];
        assert_eq!(hyperperiod_us(&plans), None);
    }
}
