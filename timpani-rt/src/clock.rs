/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall-clock timestamps and absolute-time sleeping.
//!
//! All release times are absolute `CLOCK_REALTIME` instants.  The runtime
//! never converts a release time back into a relative duration: sleeping is
//! done with `clock_nanosleep(TIMER_ABSTIME)`, so the time spent computing
//! inside one period cannot leak into the next release.
//!
//! ```text
//! t0 ──+period──► r1 ──+period──► r2 ──+period──► r3 ...
//!        (compute, check, sleep_until(r1))
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::io;

use thiserror::Error;

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// Absolute wall-clock instant: seconds plus a sub-second component.
///
/// `nanos` is always normalised to `[0, NANOS_PER_SEC)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Build a timestamp, rejecting a sub-second component of one second or more.
    pub fn new(secs: i64, nanos: u32) -> Option<Self> {
        (nanos < NANOS_PER_SEC).then_some(Self { secs, nanos })
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Total order on timestamps.
    ///
    /// Unequal seconds decide the result on their own; the sub-second
    /// component is only consulted when the seconds are equal.
    pub fn compare(&self, other: &Timestamp) -> Ordering {
        match self.secs.cmp(&other.secs) {
            Ordering::Equal => self.nanos.cmp(&other.nanos),
            unequal => unequal,
        }
    }

    /// Return `self + micros`, carrying sub-second overflow into the seconds.
    ///
    /// For offsets below one second this carries at most one second; larger
    /// offsets carry as many whole seconds as they contain.
    pub fn advance(self, micros: u64) -> Timestamp {
        let total = u128::from(self.nanos) + u128::from(micros) * 1_000;
        let carry = (total / u128::from(NANOS_PER_SEC)) as i64;
        Timestamp {
            secs: self.secs.saturating_add(carry),
            nanos: (total % u128::from(NANOS_PER_SEC)) as u32,
        }
    }

    /// Signed distance `self - earlier` in nanoseconds.
    pub fn nanos_since(&self, earlier: &Timestamp) -> i128 {
        let secs = i128::from(self.secs) - i128::from(earlier.secs);
        secs * i128::from(NANOS_PER_SEC) + i128::from(self.nanos) - i128::from(earlier.nanos)
    }

    fn from_timespec(ts: &libc::timespec) -> Self {
        Timestamp {
            secs: ts.tv_sec as i64,
            nanos: ts.tv_nsec as u32,
        }
    }

    fn to_timespec(self) -> libc::timespec {
        // SAFETY: timespec is plain old data; zeroed is a valid value and
        // covers the padding fields some targets carry.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        ts.tv_sec = self.secs as libc::time_t;
        ts.tv_nsec = self.nanos as _;
        ts
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// Free-function form of [`Timestamp::compare`].
pub fn compare(a: &Timestamp, b: &Timestamp) -> Ordering {
    a.compare(b)
}

/// Free-function form of [`Timestamp::advance`].
pub fn advance(t: Timestamp, micros: u64) -> Timestamp {
    t.advance(micros)
}

/// Read the current `CLOCK_REALTIME` time.
pub fn now() -> Result<Timestamp, ClockError> {
    RealtimeClock.now()
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Clock failures.  Both are fatal for the task that hits them.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("failed to read CLOCK_REALTIME: {0}")]
    Read(#[source] io::Error),

    #[error("absolute sleep until {target} failed: {source}")]
    Sleep {
        target: Timestamp,
        #[source]
        source: io::Error,
    },
}

// ── Clock trait ───────────────────────────────────────────────────────────────

/// Time source used by the periodic runtime.
///
/// The production implementation is [`RealtimeClock`]; tests substitute a
/// simulated clock so deadline behaviour can be checked deterministically.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> Result<Timestamp, ClockError>;

    /// Block until the wall clock reaches `target`.
    ///
    /// Returns immediately if `target` is already in the past.
    fn sleep_until(&self, target: Timestamp) -> Result<(), ClockError>;
}

/// `CLOCK_REALTIME` backed clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeClock;

impl Clock for RealtimeClock {
    fn now(&self) -> Result<Timestamp, ClockError> {
        // SAFETY: zeroed timespec is valid; clock_gettime only writes to it.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        if rc != 0 {
            return Err(ClockError::Read(io::Error::last_os_error()));
        }
        Ok(Timestamp::from_timespec(&ts))
    }

    #[cfg(target_os = "linux")]
    fn sleep_until(&self, target: Timestamp) -> Result<(), ClockError> {
        let ts = target.to_timespec();
        loop {
            // clock_nanosleep reports failures through its return value, not errno.
            // SAFETY: `ts` outlives the call; remain is unused with TIMER_ABSTIME.
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_REALTIME,
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };
            match rc {
                0 => return Ok(()),
                // A signal woke us early; the target is absolute so retry as-is.
                libc::EINTR => continue,
                errno => {
                    return Err(ClockError::Sleep {
                        target,
                        source: io::Error::from_raw_os_error(errno),
                    })
                }
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn sleep_until(&self, target: Timestamp) -> Result<(), ClockError> {
        // No TIMER_ABSTIME here: re-read the clock until the target is reached.
        loop {
            let remaining = target.nanos_since(&self.now()?);
            if remaining <= 0 {
                return Ok(());
            }
            std::thread::sleep(std::time::Duration::from_nanos(remaining as u64));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
