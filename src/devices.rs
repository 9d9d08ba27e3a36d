//! Input device discovery and event classification.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use evdev::{Device, EventType};
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use tracing::{debug, warn};

use crate::error::DeviceAccessError;

/// Coarse classification of a decoded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Key,
    RelativeMotion,
    AbsoluteMotion,
    Other,
}

impl EventKind {
    /// Key presses and pointer/touch motion count as user activity.
    pub fn is_activity(self) -> bool {
        matches!(self, Self::Key | Self::RelativeMotion | Self::AbsoluteMotion)
    }
}

impl From<EventType> for EventKind {
    fn from(kind: EventType) -> Self {
        match kind {
            EventType::KEY => Self::Key,
            EventType::RELATIVE => Self::RelativeMotion,
            EventType::ABSOLUTE => Self::AbsoluteMotion,
            _ => Self::Other,
        }
    }
}

/// A pollable source of input events.
pub trait InputSource: AsFd {
    fn name(&self) -> &str;

    /// Reads every event currently queued on the handle without blocking.
    ///
    /// Returns once the handle reports `WouldBlock`; any other error means the device is gone.
    fn drain(&mut self, events: &mut Vec<EventKind>) -> io::Result<()>;
}

/// An evdev node opened in non-blocking mode.
pub struct EvdevSource {
    path: PathBuf,
    name: String,
    device: Device,
}

impl EvdevSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = Device::open(path)?;
        set_nonblocking(&device)?;
        let name = device.name().unwrap_or_default().to_string();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            device,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for EvdevSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevSource")
            .field("path", &self.path)
            .field("name", &self.name)
            .finish()
    }
}

impl AsFd for EvdevSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.device.as_fd()
    }
}

impl InputSource for EvdevSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn drain(&mut self, events: &mut Vec<EventKind>) -> io::Result<()> {
        loop {
            let before = events.len();
            match self.device.fetch_events() {
                Ok(batch) => {
                    events.extend(batch.map(|event| EventKind::from(event.event_type())));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
            if events.len() == before {
                return Ok(());
            }
        }
    }
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let current = fcntl(device.as_fd(), FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_retain(current);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(device.as_fd(), FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// The set of input sources taking part in the readiness wait, in a stable order.
#[derive(Debug)]
pub struct DeviceRegistry<S> {
    sources: Vec<S>,
}

impl<S: InputSource> DeviceRegistry<S> {
    /// Keeps every source whose name is not in `excluded`, preserving order.
    ///
    /// An empty result is an error: a wait over no devices could never observe activity.
    pub fn from_sources(
        sources: impl IntoIterator<Item = S>,
        excluded: &BTreeSet<String>,
    ) -> Result<Self, DeviceAccessError> {
        let sources: Vec<S> = sources
            .into_iter()
            .filter(|source| {
                let keep = !excluded.contains(source.name());
                if !keep {
                    debug!(device = source.name(), "excluding placeholder input device");
                }
                keep
            })
            .collect();
        if sources.is_empty() {
            return Err(DeviceAccessError::NoDevices);
        }
        Ok(Self { sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(InputSource::name)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut S> {
        self.sources.get_mut(index)
    }

    /// Drops a source that stopped delivering events (unplugged, revoked).
    pub fn remove(&mut self, index: usize) -> S {
        self.sources.remove(index)
    }
}

impl DeviceRegistry<EvdevSource> {
    /// Opens every `event*` node in `dir`, sorted by path.
    pub fn enumerate(dir: &Path, excluded: &BTreeSet<String>) -> Result<Self, DeviceAccessError> {
        let entries = fs::read_dir(dir).map_err(|source| DeviceAccessError::Enumerate {
            dir: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| DeviceAccessError::Enumerate {
                dir: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let is_event_node = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("event"));
            if is_event_node {
                paths.push(path);
            }
        }
        paths.sort();

        let mut denied = 0;
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            match EvdevSource::open(&path) {
                Ok(source) => sources.push(source),
                Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    warn!(device = %path.display(), "no permission to read device");
                    denied += 1;
                }
                Err(err) => {
                    warn!(device = %path.display(), error = %err, "skipping unreadable device");
                }
            }
        }

        match Self::from_sources(sources, excluded) {
            Err(DeviceAccessError::NoDevices) if denied > 0 => {
                Err(DeviceAccessError::PermissionDenied {
                    dir: dir.to_path_buf(),
                    denied,
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[derive(Debug)]
    struct Named {
        name: &'static str,
        socket: UnixStream,
    }

    impl Named {
        fn new(name: &'static str) -> Self {
            let (socket, _) = UnixStream::pair().unwrap();
            Self { name, socket }
        }
    }

    impl AsFd for Named {
        fn as_fd(&self) -> BorrowedFd<'_> {
            self.socket.as_fd()
        }
    }

    impl InputSource for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn drain(&mut self, _events: &mut Vec<EventKind>) -> io::Result<()> {
            Ok(())
        }
    }

    fn excluded() -> BTreeSet<String> {
        BTreeSet::from(["dummy".to_string()])
    }

    #[test]
    fn classifies_key_and_motion_as_activity() {
        assert_eq!(EventKind::from(EventType::KEY), EventKind::Key);
        assert_eq!(EventKind::from(EventType::RELATIVE), EventKind::RelativeMotion);
        assert_eq!(EventKind::from(EventType::ABSOLUTE), EventKind::AbsoluteMotion);
        assert_eq!(EventKind::from(EventType::SYNCHRONIZATION), EventKind::Other);
        assert_eq!(EventKind::from(EventType::MISC), EventKind::Other);

        assert!(EventKind::Key.is_activity());
        assert!(EventKind::RelativeMotion.is_activity());
        assert!(EventKind::AbsoluteMotion.is_activity());
        assert!(!EventKind::Other.is_activity());
    }

    #[test]
    fn registry_drops_dummy_and_keeps_order() {
        let registry = DeviceRegistry::from_sources(
            [Named::new("keyboard"), Named::new("dummy"), Named::new("mouse")],
            &excluded(),
        )
        .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["keyboard", "mouse"]);
    }

    #[test]
    fn registry_with_only_placeholders_is_an_error() {
        let err = DeviceRegistry::from_sources([Named::new("dummy")], &excluded()).unwrap_err();
        assert!(matches!(err, DeviceAccessError::NoDevices));
    }

    #[test]
    fn enumerate_reports_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("input");
        let err = DeviceRegistry::enumerate(&missing, &excluded()).unwrap_err();
        assert!(matches!(err, DeviceAccessError::Enumerate { dir, .. } if dir == missing));
    }

    #[test]
    fn enumerate_ignores_non_event_nodes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("mice"), b"").unwrap();
        std::fs::create_dir(tmp.path().join("by-path")).unwrap();
        let err = DeviceRegistry::enumerate(tmp.path(), &excluded()).unwrap_err();
        assert!(matches!(err, DeviceAccessError::NoDevices));
    }
}
