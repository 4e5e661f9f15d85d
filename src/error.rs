use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// A pair of mutually exclusive options that were combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    /// An explicit `-t` timestamp together with the `-a`/`-m` selector.
    #[error("the -a, -m and -t options are mutually exclusive")]
    SelectorWithExplicitTime,
    /// A `-r` reference file together with an explicit `-t` timestamp.
    #[error("the -r and -t options are mutually exclusive")]
    ReferenceWithExplicitTime,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Two of the three instant sources were supplied at once. Raised before
    /// any file or the clock is touched.
    #[error("{0}")]
    ConfigConflict(Conflict),

    /// A timestamp literal that cannot be parsed down to at least seconds.
    #[error("invalid timestamp {0:?}, expected [[[YYYY:]MM:]DD:]hh:mm:ss[.uuuuuu]")]
    Format(String),

    /// A target or reference file could not be stat'd.
    #[error("{}: {errno}", .path.display())]
    Stat { path: PathBuf, errno: Errno },

    /// The mode-bit rewrite that forces the ctime update failed. The clock has
    /// already been restored by the time this is reported.
    #[error("{}: {errno}", .path.display())]
    Touch { path: PathBuf, errno: Errno },

    /// The pre-mutation clock snapshot could not be taken.
    #[error("reading system clock: {0}")]
    ClockRead(Errno),

    /// The clock could not be moved to the target instant. The clock is
    /// untouched; only this file's mutation is abandoned.
    #[error("setting system clock: {0}")]
    ClockSet(Errno),

    /// The clock could not be moved back to its snapshot value. Host time is
    /// now suspect, so the whole run must stop.
    #[error("restoring system clock: {0}")]
    ClockRestore(Errno),

    /// The signal mask could not be changed, so the critical section cannot
    /// be protected from asynchronous interruption.
    #[error("changing signal mask: {0}")]
    SignalMask(Errno),
}

impl Error {
    /// Whether this error must stop the whole run rather than just the
    /// current file's mutation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Touch { .. } | Error::ClockSet(_))
    }
}
