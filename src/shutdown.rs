use std::os::fd::{AsFd, BorrowedFd};

use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use tracing::info;

/// SIGINT/SIGTERM delivered as a readable handle, so the poll loop sees them as
/// just another source and stops between iterations.
pub struct ShutdownSignal {
    fd: SignalFd,
}

impl ShutdownSignal {
    /// Blocks SIGINT and SIGTERM for the calling thread and routes them to a signalfd.
    ///
    /// Must run before any other thread is spawned so the mask is inherited.
    pub fn install() -> nix::Result<Self> {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGINT);
        mask.add(Signal::SIGTERM);
        mask.thread_block()?;
        let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)?;
        Ok(Self { fd })
    }

    /// Consumes pending signals; `true` if any arrived.
    pub fn drain(&mut self) -> nix::Result<bool> {
        let mut received = false;
        while let Some(info) = self.fd.read_signal()? {
            let signal = i32::try_from(info.ssi_signo)
                .ok()
                .and_then(|signo| Signal::try_from(signo).ok());
            info!(?signal, "received shutdown signal");
            received = true;
        }
        Ok(received)
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal").finish_non_exhaustive()
    }
}

impl AsFd for ShutdownSignal {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
