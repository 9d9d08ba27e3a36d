//! LED strip cues for the extended variant.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::AnimationError;

/// Visual cues played on wake and sleep transitions.
pub trait Animator {
    /// Bounded animation ending in the solid "awake" state.
    fn play_wake_sequence(&mut self) -> Result<(), AnimationError>;

    fn play_sleep_indicator(&mut self) -> Result<(), AnimationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Position on a 256-step red→green→blue→red color wheel.
    pub fn wheel(pos: u8) -> Self {
        match pos {
            0..=84 => Self::new(255 - pos * 3, pos * 3, 0),
            85..=169 => {
                let pos = pos - 85;
                Self::new(0, 255 - pos * 3, pos * 3)
            }
            _ => {
                let pos = pos - 170;
                Self::new(pos * 3, 0, 255 - pos * 3)
            }
        }
    }

    fn scaled(self, brightness: f32) -> Self {
        let scale = |channel: u8| (f32::from(channel) * brightness).round() as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

/// Addressable LED strip: a fixed-length pixel buffer pushed to hardware by `show`.
pub trait PixelStrip {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_pixel(&mut self, index: usize, color: Rgb);

    fn fill(&mut self, color: Rgb) {
        for index in 0..self.len() {
            self.set_pixel(index, color);
        }
    }

    /// Global brightness in `0.0..=1.0`, applied on `show`.
    fn set_brightness(&mut self, brightness: f32);

    /// The only point where hardware is updated.
    fn show(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    Rgb,
    #[default]
    Grb,
}

/// LED strip whose frames are written to a path (device node, FIFO or file)
/// served by the LED driver.
#[derive(Debug)]
pub struct FrameFileStrip {
    path: PathBuf,
    pixels: Vec<Rgb>,
    brightness: f32,
    order: ChannelOrder,
}

impl FrameFileStrip {
    pub fn new(path: impl Into<PathBuf>, len: usize, order: ChannelOrder) -> Self {
        Self {
            path: path.into(),
            pixels: vec![Rgb::OFF; len],
            brightness: 1.0,
            order,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    fn frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.pixels.len() * 3);
        for pixel in &self.pixels {
            let Rgb { r, g, b } = pixel.scaled(self.brightness);
            match self.order {
                ChannelOrder::Rgb => frame.extend_from_slice(&[r, g, b]),
                ChannelOrder::Grb => frame.extend_from_slice(&[g, r, b]),
            }
        }
        frame
    }
}

impl PixelStrip for FrameFileStrip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    fn show(&mut self) -> io::Result<()> {
        fs::write(&self.path, self.frame())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WakeSequence {
    pub steps: u32,
    pub step_delay: Duration,
    pub awake_color: Rgb,
}

impl Default for WakeSequence {
    fn default() -> Self {
        Self {
            steps: 32,
            step_delay: Duration::from_millis(10),
            awake_color: Rgb::WHITE,
        }
    }
}

/// Plays the wake sweep and sleep blackout on a [`PixelStrip`].
#[derive(Debug)]
pub struct LedAnimator<S> {
    strip: S,
    brightness: f32,
    sequence: WakeSequence,
}

impl<S: PixelStrip> LedAnimator<S> {
    pub fn new(strip: S, brightness: f32, sequence: WakeSequence) -> Self {
        Self {
            strip,
            brightness: brightness.clamp(0.0, 1.0),
            sequence,
        }
    }

    pub fn strip(&self) -> &S {
        &self.strip
    }
}

impl<S: PixelStrip> Animator for LedAnimator<S> {
    fn play_wake_sequence(&mut self) -> Result<(), AnimationError> {
        let len = self.strip.len().max(1);
        self.strip.set_brightness(self.brightness);
        for step in 0..self.sequence.steps {
            let offset = step * 256 / self.sequence.steps.max(1);
            for index in 0..self.strip.len() {
                let pos = (index * 256 / len) as u32 + offset;
                self.strip.set_pixel(index, Rgb::wheel((pos & 0xff) as u8));
            }
            self.strip.show()?;
            if !self.sequence.step_delay.is_zero() {
                thread::sleep(self.sequence.step_delay);
            }
        }

        self.strip.set_brightness(1.0);
        self.strip.fill(self.sequence.awake_color);
        self.strip.show()?;
        debug!(steps = self.sequence.steps, "wake sequence finished");
        Ok(())
    }

    fn play_sleep_indicator(&mut self) -> Result<(), AnimationError> {
        self.strip.fill(Rgb::OFF);
        self.strip.show()?;
        Ok(())
    }
}
