/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Applying a [`SchedulingConfig`] to the calling thread.
//!
//! Each task thread configures **itself** before its loop body runs:
//!
//! 1. `pthread_setaffinity_np` – restrict to the configured CPUs.
//! 2. `pthread_setschedparam` – switch to `SCHED_FIFO` / `SCHED_RR` with the
//!    configured priority.
//!
//! Both attributes are set explicitly, so the result does not depend on what
//! policy the launching thread happens to run under.
//!
//! # Platform Support
//!
//! - **Linux**: full support.
//! - **Other**: [`ApplyError::Unsupported`] – never silently ignored.

use std::io;

use tracing::debug;

use super::{ApplyError, SchedulingConfig};
use crate::task::CpuAffinity;

/// Seam between the orchestrator and the kernel.
///
/// Implementations are called on the task thread itself, before the periodic
/// loop starts.
pub trait SchedApplier: Send + Sync {
    fn apply(&self, config: &SchedulingConfig) -> Result<(), ApplyError>;
}

/// Applies attributes with the pthread API.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSchedApplier;

impl SchedApplier for OsSchedApplier {
    fn apply(&self, config: &SchedulingConfig) -> Result<(), ApplyError> {
        if let CpuAffinity::Pinned(_) = config.affinity {
            set_current_thread_affinity(&config.affinity)?;
        }
        set_current_thread_policy(config)?;
        debug!(
            policy   = %config.policy,
            priority = config.priority,
            cpus     = %config.affinity,
            "scheduling attributes applied"
        );
        Ok(())
    }
}

/// Pin the calling thread to every CPU in `affinity`.
#[cfg(target_os = "linux")]
pub fn set_current_thread_affinity(affinity: &CpuAffinity) -> Result<(), ApplyError> {
    let cpus = affinity.cpus();

    // SAFETY:
    // - cpu_set_t is valid when zeroed
    // - every id is < MAX_CPUS (64), far below CPU_SETSIZE, so CPU_SET is in bounds
    // - pthread_setaffinity_np returns error codes directly (not via errno)
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &cpu in &cpus {
            libc::CPU_SET(cpu as usize, &mut set);
        }
        libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        )
    };

    if rc != 0 {
        return Err(ApplyError::Affinity {
            cpus,
            source: io::Error::from_raw_os_error(rc),
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_affinity(_affinity: &CpuAffinity) -> Result<(), ApplyError> {
    Err(ApplyError::Unsupported)
}

/// Switch the calling thread to the configured real-time policy and priority.
#[cfg(target_os = "linux")]
pub fn set_current_thread_policy(config: &SchedulingConfig) -> Result<(), ApplyError> {
    // SAFETY: sched_param is plain old data; only sched_priority is meaningful
    // for SCHED_FIFO / SCHED_RR.
    let rc = unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = config.priority;
        libc::pthread_setschedparam(libc::pthread_self(), config.policy.to_linux_int(), &param)
    };

    if rc != 0 {
        return Err(ApplyError::Policy {
            policy: config.policy,
            priority: config.priority,
            source: io::Error::from_raw_os_error(rc),
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_policy(_config: &SchedulingConfig) -> Result<(), ApplyError> {
    Err(ApplyError::Unsupported)
}

/// Read back the calling thread's policy and priority.
#[cfg(target_os = "linux")]
pub fn current_thread_policy() -> io::Result<(i32, i32)> {
    // SAFETY: both out-parameters are valid for writes.
    unsafe {
        let mut policy = 0;
        let mut param: libc::sched_param = std::mem::zeroed();
        let rc = libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param);
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok((policy, param.sched_priority))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
