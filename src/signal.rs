//! Scoped suppression of asynchronous signal delivery.

use log::error;
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow};

use crate::error::Error;

/// Blocks every blockable signal on construction and reinstates the previous
/// mask when released, so no handler can interleave with the window in which
/// the host clock is off its real value.
///
/// The normal path releases through [`SignalGuard::restore`], which surfaces
/// a restoration failure; early bail-outs fall back to a best-effort restore
/// in `Drop`.
#[derive(Debug)]
pub struct SignalGuard {
    previous: SigSet,
    restored: bool,
}

impl SignalGuard {
    pub fn block_all() -> Result<Self, Error> {
        let mut previous = SigSet::empty();

        sigprocmask(
            SigmaskHow::SIG_SETMASK,
            Some(&SigSet::all()),
            Some(&mut previous),
        )
        .map_err(Error::SignalMask)?;

        Ok(Self {
            previous,
            restored: false,
        })
    }

    /// Reinstates the mask that was active before [`SignalGuard::block_all`].
    pub fn restore(mut self) -> Result<(), Error> {
        self.restored = true;

        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None)
            .map_err(Error::SignalMask)
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }

        if let Err(errno) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            error!("failed to restore signal mask: {errno}");
        }
    }
}
