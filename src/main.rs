use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use display_idled::animator::{ChannelOrder, FrameFileStrip, LedAnimator, WakeSequence};
use display_idled::config::{self, Settings};
use display_idled::devices::DeviceRegistry;
use display_idled::error::Error;
use display_idled::idle::{IdleMachine, WakeAnimation};
use display_idled::platform::display_power::{Backlight, DisplayPower, Vcgencmd};
use display_idled::poller::Poller;
use display_idled::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LedOrder {
    Rgb,
    Grb,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "display-idled",
    version,
    about = "Turns the display off after input inactivity and back on at the next key or touch"
)]
struct Args {
    /// Inactivity tolerated before the display is turned off.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    timeout: Duration,

    /// How often inactivity is checked.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    check_interval: Duration,

    /// Device names ignored entirely (repeatable; replaces the default).
    #[arg(long = "exclude", value_name = "NAME", default_value = config::DEFAULT_EXCLUDED_DEVICE)]
    excluded: Vec<String>,

    /// Directory scanned for evdev `event*` nodes.
    #[arg(long, default_value = config::DEFAULT_INPUT_DIR)]
    input_dir: PathBuf,

    /// Firmware display power tool.
    #[arg(long, default_value = "vcgencmd")]
    vcgencmd: String,

    /// Control the panel through a sysfs `bl_power` attribute instead of vcgencmd.
    #[arg(long, value_name = "PATH")]
    backlight: Option<PathBuf>,

    /// LED strip frame sink; enables the wake/sleep animations.
    #[arg(long, value_name = "PATH")]
    led_frame: Option<PathBuf>,

    /// Number of pixels on the LED strip.
    #[arg(long, default_value_t = 8)]
    led_count: usize,

    /// Global LED brightness during the wake sweep (0.0 - 1.0).
    #[arg(long, default_value_t = 1.0)]
    led_brightness: f32,

    /// Byte order of each pixel in the frame.
    #[arg(long, value_enum, default_value = "grb")]
    led_order: LedOrder,

    /// When the wake animation plays.
    #[arg(long, value_enum, default_value = "every-activity")]
    wake_animation: WakeAnimation,

    /// Logging level (error|warn|info|debug|trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn settings(&self) -> Result<Settings, Error> {
        Settings {
            timeout: self.timeout,
            check_interval: self.check_interval,
            excluded_devices: self.excluded.iter().cloned().collect::<BTreeSet<_>>(),
            input_dir: self.input_dir.clone(),
            wake_animation: self.wake_animation,
        }
        .validated()
    }

    fn display(&self) -> Box<dyn DisplayPower> {
        match &self.backlight {
            Some(path) => Box::new(Backlight::bl_power(path)),
            None => Box::new(Vcgencmd::new(&self.vcgencmd)),
        }
    }

    fn animator(&self) -> Option<LedAnimator<FrameFileStrip>> {
        let path = self.led_frame.as_ref()?;
        let order = match self.led_order {
            LedOrder::Rgb => ChannelOrder::Rgb,
            LedOrder::Grb => ChannelOrder::Grb,
        };
        let strip = FrameFileStrip::new(path, self.led_count, order);
        Some(LedAnimator::new(strip, self.led_brightness, WakeSequence::default()))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_tracing(&args.log_level) {
        eprintln!("{err:#}");
        return ExitCode::from(64);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "display-idled exited with error");
            let code = err.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let settings = args.settings()?;

    // Block SIGINT/SIGTERM before anything else can spawn a thread.
    let shutdown = ShutdownSignal::install().map_err(Error::Signal)?;

    let registry = DeviceRegistry::enumerate(&settings.input_dir, &settings.excluded_devices)
        .map_err(Error::from)
        .with_context(|| {
            format!(
                "failed to set up input devices in {}",
                settings.input_dir.display()
            )
        })?;

    let mut machine = IdleMachine::start(args.display(), settings.max_attempts());
    if let Some(animator) = args.animator() {
        info!(
            frame = %animator.strip().path().display(),
            policy = ?settings.wake_animation,
            "LED animations enabled"
        );
        machine = machine.with_animator(Box::new(animator), settings.wake_animation);
    }

    let cancel = CancellationToken::new();
    let mut poller =
        Poller::new(registry, settings.check_interval, cancel).with_shutdown(shutdown);
    poller.run(&mut machine)?;
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .parse(level)
        .with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}
