use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for the idle monitor.
///
/// Only startup failures and OS-level failures of the readiness wait end up here;
/// display and animation failures are logged where they happen and never abort the loop.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings rejected during validation.
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Input devices could not be enumerated or opened.
    #[error(transparent)]
    Device(#[from] DeviceAccessError),

    /// Interrupt/terminate signals could not be routed to the loop.
    #[error("failed to install shutdown signal handling")]
    Signal(#[source] nix::Error),

    /// The readiness wait itself failed.
    #[error("readiness wait on input devices failed")]
    Poll(#[source] nix::Error),
}

impl Error {
    /// Process exit code for this failure, following `sysexits.h`.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Settings(_) => 64,
            Self::Device(_) => 66,
            Self::Signal(_) | Self::Poll(_) => 71,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceAccessError {
    #[error("failed to read input directory {}", .dir.display())]
    Enumerate {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open input device {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "no permission to read the input devices in {} ({denied} skipped)",
        .dir.display()
    )]
    PermissionDenied { dir: PathBuf, denied: usize },

    #[error("no usable input devices found")]
    NoDevices,
}

#[derive(Debug, Error)]
pub enum DisplayControlError {
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with status {}: {stderr}", exit_label(.code))]
    Status {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to access backlight control {}", .path.display())]
    Backlight {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

#[derive(Debug, Error)]
pub enum AnimationError {
    #[error("failed to push frame to LED strip")]
    Show(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_startup_failures() {
        assert_eq!(Error::Settings("zero interval".into()).exit_code(), 64);
        assert_eq!(Error::from(DeviceAccessError::NoDevices).exit_code(), 66);
        assert_eq!(Error::Poll(nix::Error::EBADF).exit_code(), 71);
    }

    #[test]
    fn status_error_mentions_exit_code() {
        let err = DisplayControlError::Status {
            command: "vcgencmd display_power 0".into(),
            code: Some(255),
            stderr: "mailbox unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "`vcgencmd display_power 0` exited with status 255: mailbox unavailable"
        );
    }
}
