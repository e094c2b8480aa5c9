/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Work executed in the Computing phase of every period.

use std::hint::black_box;

use crate::task::WorkloadShape;

/// Something a periodic task runs once per period.
///
/// Implementations must be CPU-bound and must not block; the only blocking
/// point of a task is the absolute-time sleep.
pub trait Workload: Send {
    fn execute(&mut self, shape: WorkloadShape);
}

/// Synthetic nested loop whose duration is proportional to `n1 × n2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticWorkload;

impl Workload for SyntheticWorkload {
    fn execute(&mut self, shape: WorkloadShape) {
        for _ in 0..shape.n1 {
            for j in 0..shape.n2 {
                black_box(f64::from(j) / 2.0);
            }
        }
    }
}
