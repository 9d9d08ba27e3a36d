//! The monitoring loop: readiness wait, drain, classify, feed the idle machine.

use std::os::fd::AsFd;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::devices::{DeviceRegistry, InputSource};
use crate::error::Error;
use crate::idle::IdleMachine;
use crate::platform::display_power::DisplayPower;
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Default)]
struct Readiness {
    readable: Vec<usize>,
    hung_up: Vec<usize>,
    shutdown: bool,
}

/// Single-threaded loop multiplexing every registered device handle.
///
/// A tick is fed to the machine each time `check_interval` passes without activity;
/// readiness that only carries non-activity events does not postpone it.
#[derive(Debug)]
pub struct Poller<S> {
    registry: DeviceRegistry<S>,
    check_interval: Duration,
    cancel: CancellationToken,
    shutdown: Option<ShutdownSignal>,
}

impl<S: InputSource> Poller<S> {
    pub fn new(
        registry: DeviceRegistry<S>,
        check_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            check_interval,
            cancel,
            shutdown: None,
        }
    }

    /// Adds the signal handle to the wait set; a delivered signal cancels the loop's token.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn registry(&self) -> &DeviceRegistry<S> {
        &self.registry
    }

    /// Runs until the cancellation token fires. No display change is forced on exit.
    pub fn run<D: DisplayPower>(&mut self, machine: &mut IdleMachine<D>) -> Result<(), Error> {
        info!(
            check_interval = %humantime::format_duration(self.check_interval),
            max_attempts = machine.max_attempts(),
            "monitoring for user input"
        );
        for name in self.registry.names() {
            info!(device = name, "monitoring device");
        }

        let mut events = Vec::new();
        let mut deadline = Instant::now() + self.check_interval;

        while !self.cancel.is_cancelled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let readiness = self.wait(remaining)?;

            if readiness.shutdown {
                if let Some(shutdown) = self.shutdown.as_mut() {
                    if shutdown.drain().map_err(Error::Signal)? {
                        self.cancel.cancel();
                        break;
                    }
                }
            }

            let mut activity = 0;
            let mut gone = readiness.hung_up;
            for &index in &readiness.readable {
                let Some(source) = self.registry.get_mut(index) else {
                    continue;
                };
                events.clear();
                let result = source.drain(&mut events);
                let count = events.iter().filter(|kind| kind.is_activity()).count();
                if count > 0 {
                    debug!(device = source.name(), events = count, "input activity");
                }
                activity += count;
                if let Err(err) = result {
                    warn!(device = source.name(), error = %err, "failed to read input device");
                    gone.push(index);
                }
            }
            self.forget(gone);

            // One call per cycle: a burst of motion events plays the wake pulse once.
            let now = Instant::now();
            if activity > 0 {
                machine.on_activity();
                deadline = now + self.check_interval;
            } else if now >= deadline {
                machine.on_tick();
                deadline = now + self.check_interval;
            }
        }

        info!("stopping input monitor");
        Ok(())
    }

    fn wait(&self, timeout: Duration) -> Result<Readiness, Error> {
        let mut fds: Vec<PollFd<'_>> = self
            .registry
            .sources()
            .iter()
            .map(|source| PollFd::new(source.as_fd(), PollFlags::POLLIN))
            .collect();
        if let Some(shutdown) = &self.shutdown {
            fds.push(PollFd::new(shutdown.as_fd(), PollFlags::POLLIN));
        }

        match poll(&mut fds, poll_timeout(timeout)) {
            Ok(0) | Err(Errno::EINTR) => return Ok(Readiness::default()),
            Ok(_) => {}
            Err(err) => return Err(Error::Poll(err)),
        }

        let device_count = self.registry.len();
        let mut readiness = Readiness::default();
        for (index, fd) in fds.iter().enumerate() {
            let Some(revents) = fd.revents() else {
                continue;
            };
            if index == device_count {
                readiness.shutdown |= revents.contains(PollFlags::POLLIN);
            } else if revents.contains(PollFlags::POLLIN) {
                readiness.readable.push(index);
            } else if revents
                .intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL)
            {
                readiness.hung_up.push(index);
            }
        }
        Ok(readiness)
    }

    fn forget(&mut self, mut gone: Vec<usize>) {
        if gone.is_empty() {
            return;
        }
        gone.sort_unstable();
        gone.dedup();
        for index in gone.into_iter().rev() {
            let source = self.registry.remove(index);
            warn!(device = source.name(), "input device disconnected; no longer monitored");
        }
        if self.registry.is_empty() {
            warn!("no input devices left; the display can only be turned off");
        }
    }
}

/// Milliseconds rounded up so a wait never returns before the tick deadline.
fn poll_timeout(timeout: Duration) -> PollTimeout {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    let millis = i32::try_from(millis).unwrap_or(i32::MAX);
    PollTimeout::try_from(millis).unwrap_or(PollTimeout::NONE)
}
