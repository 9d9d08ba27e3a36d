use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use tracing::debug;

use crate::error::DisplayControlError;

/// Power control for the single attached display.
pub trait DisplayPower {
    /// Reads the current power state. Output that cannot be interpreted reads as off.
    fn query_power(&mut self) -> Result<bool, DisplayControlError>;

    fn set_power(&mut self, on: bool) -> Result<(), DisplayControlError>;
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

pub type CommandRunner = Arc<dyn Fn(&str, &[&str]) -> io::Result<CommandOutput> + Send + Sync>;

/// Display power through the firmware `vcgencmd display_power [0|1]` interface.
///
/// A query reports on when its output contains `1` (`display_power=1`).
#[derive(Clone)]
pub struct Vcgencmd {
    program: String,
    runner: CommandRunner,
}

impl fmt::Debug for Vcgencmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vcgencmd")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl Vcgencmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, default_runner())
    }

    pub fn with_runner(program: impl Into<String>, runner: CommandRunner) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, DisplayControlError> {
        let command = command_line(&self.program, args);
        let output =
            (self.runner)(&self.program, args).map_err(|source| DisplayControlError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(DisplayControlError::Status {
                command,
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        debug!(command, stdout = output.stdout.trim(), "display power command succeeded");
        Ok(output)
    }
}

impl DisplayPower for Vcgencmd {
    fn query_power(&mut self) -> Result<bool, DisplayControlError> {
        let output = self.run(&["display_power"])?;
        Ok(output.stdout.contains('1'))
    }

    fn set_power(&mut self, on: bool) -> Result<(), DisplayControlError> {
        let value = if on { "1" } else { "0" };
        self.run(&["display_power", value]).map(|_| ())
    }
}

/// Display power through a sysfs backlight attribute such as `bl_power`.
#[derive(Debug, Clone)]
pub struct Backlight {
    pub path: PathBuf,
    pub wake_value: String,
    pub sleep_value: String,
}

impl Backlight {
    /// `bl_power` semantics: `0` unblanks the panel, `1` blanks it.
    pub fn bl_power(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wake_value: "0".to_string(),
            sleep_value: "1".to_string(),
        }
    }

    fn error(&self, source: io::Error) -> DisplayControlError {
        DisplayControlError::Backlight {
            path: self.path.clone(),
            source,
        }
    }
}

impl DisplayPower for Backlight {
    fn query_power(&mut self) -> Result<bool, DisplayControlError> {
        let contents = fs::read_to_string(&self.path).map_err(|err| self.error(err))?;
        Ok(contents.trim() == self.wake_value)
    }

    fn set_power(&mut self, on: bool) -> Result<(), DisplayControlError> {
        let value = if on {
            &self.wake_value
        } else {
            &self.sleep_value
        };
        fs::write(&self.path, value).map_err(|err| self.error(err))?;
        debug!(path = %self.path.display(), value, "wrote backlight value");
        Ok(())
    }
}

impl<T: DisplayPower + ?Sized> DisplayPower for Box<T> {
    fn query_power(&mut self) -> Result<bool, DisplayControlError> {
        (**self).query_power()
    }

    fn set_power(&mut self, on: bool) -> Result<(), DisplayControlError> {
        (**self).set_power(on)
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn default_runner() -> CommandRunner {
    Arc::new(|program: &str, args: &[&str]| {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    })
}
