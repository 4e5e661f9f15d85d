//! Host realtime clock access.
//!
//! The realtime clock is host-wide mutable state; callers pair every [`set`]
//! with a restoring [`set`] inside one signal-protected critical section.

use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, clock_settime, ClockId};

use crate::timestamp::Instant;

/// Snapshots the current realtime clock.
pub fn read() -> Result<Instant, Errno> {
    clock_gettime(ClockId::CLOCK_REALTIME).map(Instant::from)
}

/// Moves the host realtime clock. Requires `CAP_SYS_TIME` or root; fails
/// with `EPERM` otherwise.
pub fn set(instant: Instant) -> Result<(), Errno> {
    clock_settime(ClockId::CLOCK_REALTIME, instant.into())
}

impl From<TimeSpec> for Instant {
    fn from(spec: TimeSpec) -> Self {
        Instant::new(spec.tv_sec() as i64, (spec.tv_nsec() / 1000) as i64)
    }
}

impl From<Instant> for TimeSpec {
    fn from(instant: Instant) -> Self {
        TimeSpec::new(instant.sec as libc::time_t, (instant.usec * 1000) as _)
    }
}
