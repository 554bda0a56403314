// LED Matrix Module - Virtual pixel grid with additive blending, decay and frame pacing
use anyhow::Result;
use std::time::{Duration, Instant};

use crate::background::Background;
use crate::display::Display;
use crate::types::Rgb;

/// How a paint call combines with the color already in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blend {
    Add,
    Overwrite,
}

/// Runtime tunables of the matrix, taken from the config file
#[derive(Debug, Clone)]
pub struct MatrixSettings {
    pub fps: f64,
    pub min_fps: f64,
    pub max_fps: f64,
    pub decay_speed: u8,
    pub additive: bool,
    pub brightness: f64,
    pub min_brightness: f64,
}

impl Default for MatrixSettings {
    fn default() -> Self {
        MatrixSettings {
            fps: 60.0,
            min_fps: 5.0,
            max_fps: 100.0,
            decay_speed: 10,
            additive: true,
            brightness: 0.5,
            min_brightness: 0.2,
        }
    }
}

pub struct LedMatrix {
    device: Box<dyn Display>,
    width: usize,
    height: usize,
    cells: Vec<Rgb>,
    background: Background,
    decay_speed: u8,
    additive: bool,
    brightness: f64,
    min_brightness: f64,
    fps: f64,
    min_fps: f64,
    max_fps: f64,
    frame_interval: Duration,
    last_update: Instant,
}

impl LedMatrix {
    pub fn new(mut device: Box<dyn Display>, background: Background, settings: &MatrixSettings) -> Result<Self> {
        let (width, height) = device.bounds();
        if background.width() != width || background.height() != height {
            anyhow::bail!(
                "Background is {}x{} but the display is {}x{}",
                background.width(),
                background.height(),
                width,
                height
            );
        }
        let numbers = [settings.fps, settings.min_fps, settings.max_fps, settings.brightness, settings.min_brightness];
        if numbers.iter().any(|value| !value.is_finite()) {
            anyhow::bail!("Matrix settings must be finite numbers: {:?}", settings);
        }
        if settings.min_fps <= 0.0 || settings.min_fps > settings.max_fps {
            anyhow::bail!("Invalid fps bounds: min {} max {}", settings.min_fps, settings.max_fps);
        }

        let min_brightness = settings.min_brightness.clamp(0.0, 1.0);
        let brightness = settings.brightness.clamp(min_brightness, 1.0);
        let fps = settings.fps.clamp(settings.min_fps, settings.max_fps);
        device.set_global_brightness(brightness);

        Ok(LedMatrix {
            device,
            width,
            height,
            cells: background.pixels().to_vec(),
            background,
            decay_speed: settings.decay_speed,
            additive: settings.additive,
            brightness,
            min_brightness,
            fps,
            min_fps: settings.min_fps,
            max_fps: settings.max_fps,
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            last_update: Instant::now(),
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    #[cfg(test)]
    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    #[cfg(test)]
    pub fn color_at(&self, x: usize, y: usize) -> Rgb {
        self.cells[self.index(x, y)]
    }

    fn index(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "LED ({}, {}) is outside the {}x{} matrix",
            x,
            y,
            self.width,
            self.height
        );
        y * self.width + x
    }

    /// Paint one cell. Out-of-range coordinates are a logic error and panic.
    pub fn set_color(&mut self, x: usize, y: usize, color: Rgb, blend: Blend) {
        let idx = self.index(x, y);
        self.cells[idx] = if self.additive && blend == Blend::Add {
            self.cells[idx].saturating_add(color)
        } else {
            color
        };
    }

    /// Fade every cell toward its background color, then push the whole grid
    /// to the device with a single commit
    pub fn decay_and_flush(&mut self) -> Result<()> {
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = y * self.width + x;
                let decayed = self.cells[idx].decay_toward(self.background.at(x, y), self.decay_speed);
                self.cells[idx] = decayed;
                self.device.set_pixel(x, y, decayed);
            }
        }
        self.device.commit()
    }

    /// True once every cell has faded back to the background
    pub fn is_settled(&self) -> bool {
        self.cells.as_slice() == self.background.pixels()
    }

    /// Turn every LED off right now, bypassing decay
    pub fn black_out(&mut self) -> Result<()> {
        self.cells.fill(Rgb::BLACK);
        for y in 0..self.height {
            for x in 0..self.width {
                self.device.set_pixel(x, y, Rgb::BLACK);
            }
        }
        self.device.commit()
    }

    /// Adjust the global brightness, never dropping below the configured floor
    pub fn change_brightness(&mut self, delta: f64) -> f64 {
        self.brightness = (self.brightness + delta).clamp(self.min_brightness, 1.0);
        self.device.set_global_brightness(self.brightness);
        self.brightness
    }

    /// Adjust the frame rate by `delta` frames per second within the configured bounds
    pub fn change_speed(&mut self, delta: f64) -> f64 {
        self.fps = (self.fps + delta).clamp(self.min_fps, self.max_fps);
        self.frame_interval = Duration::from_secs_f64(1.0 / self.fps);
        self.fps
    }

    /// Block until at least one frame interval has passed since the previous call
    pub fn wait_for_frame(&mut self) {
        let elapsed = self.last_update.elapsed();
        if elapsed < self.frame_interval {
            std::thread::sleep(self.frame_interval - elapsed);
        }
        self.last_update = Instant::now();
    }
}
