/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Timpani-RT – periodic real-time task executor
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── clock/         – timestamps, absolute-time sleep
//! ├── task/          – task descriptor, policy, CPU affinity
//! ├── config/        – YAML task set / built-in default
//! ├── sched/         – priority assignment, validation, pthread attributes
//! ├── runtime/       – periodic loop, workload, deadline reports
//! └── orchestrator/  – launch, startup gate, join
//! ```

pub mod clock;
pub mod config;
pub mod orchestrator;
pub mod runtime;
pub mod sched;
pub mod task;
