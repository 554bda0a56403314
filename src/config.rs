// Configuration Module - Command-line flags and the persisted TOML config
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::led_matrix::MatrixSettings;
use crate::types::{Grid, Rgb};

pub const OUTPUT_MODES: [&str; 3] = ["terminal", "ddp", "both"];

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Ambient worm animation for LED matrices",
    long_about = "Animated worms wander a 2D LED matrix, leaving fading trails.\n\
                  Frames go to a terminal preview, a WLED controller over DDP, or both.\n\
                  Keys: a add, b remove, left/right speed, up/down brightness, q sleep."
)]
pub struct Args {
    /// Matrix width in LEDs
    #[arg(short = 'W', long)]
    pub width: Option<usize>,

    /// Matrix height in LEDs
    #[arg(short = 'H', long)]
    pub height: Option<usize>,

    /// Rows at the top reserved for overlays; worms never enter them
    #[arg(long)]
    pub height_adjust: Option<usize>,

    /// Minimum number of worms kept alive
    #[arg(short = 'm', long)]
    pub min_worms: Option<usize>,

    /// Starting frame rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Starting brightness (0.0 - 1.0)
    #[arg(short, long)]
    pub brightness: Option<f64>,

    /// Output device (terminal, ddp, both)
    #[arg(short, long)]
    pub output: Option<String>,

    /// WLED device address
    #[arg(short, long)]
    pub wled_ip: Option<String>,

    /// Background: hex color (e.g. "000010") or path to an image file
    #[arg(long)]
    pub background: Option<String>,

    /// Random seed (0 = random each run)
    #[arg(long)]
    pub seed: Option<u64>,

    /// LED rows are wired in a serpentine (zig-zag) pattern
    #[arg(long)]
    pub serpentine: Option<bool>,

    /// Log file path (empty = stderr)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Disable keyboard buttons
    #[arg(long)]
    pub no_input: bool,

    /// Config file path or name (e.g., --cfg /full/path or --cfg myconf for ~/.config/rustworms/myconf.conf)
    #[arg(long)]
    pub cfg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WormsConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    pub width: usize,
    pub height: usize,
    pub height_adjust: usize,
    pub min_worms_count: usize,

    pub fps: f64,
    pub min_fps: f64,
    pub max_fps: f64,
    pub speed_step: f64,

    pub decay_speed: u8,
    pub additive: bool,

    pub brightness: f64,
    pub min_brightness: f64,
    pub brightness_step: f64,

    pub background: String,
    pub output: String,
    pub wled_ip: String,
    pub serpentine: bool,

    pub seed: u64,
    pub log_file: String,
}

impl Default for WormsConfig {
    fn default() -> Self {
        WormsConfig {
            config_path: None,
            width: 16,
            height: 16,
            height_adjust: 1,
            min_worms_count: 2,
            fps: 60.0,
            min_fps: 5.0,
            max_fps: 100.0,
            speed_step: 10.0,
            decay_speed: 10,
            additive: true,
            brightness: 0.5,
            min_brightness: 0.2,
            brightness_step: 0.1,
            background: "000000".to_string(),
            output: "terminal".to_string(),
            wled_ip: String::new(),
            serpentine: false,
            seed: 0,
            log_file: "/tmp/rustworms.log".to_string(),
        }
    }
}

impl WormsConfig {
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        // Track if any args were actually provided
        let mut args_provided = false;

        if let Some(width) = args.width {
            self.width = width;
            args_provided = true;
        }

        if let Some(height) = args.height {
            self.height = height;
            args_provided = true;
        }

        if let Some(height_adjust) = args.height_adjust {
            self.height_adjust = height_adjust;
            args_provided = true;
        }

        if let Some(min_worms) = args.min_worms {
            self.min_worms_count = min_worms;
            args_provided = true;
        }

        if let Some(fps) = args.fps {
            self.fps = fps;
            args_provided = true;
        }

        if let Some(brightness) = args.brightness {
            self.brightness = brightness;
            args_provided = true;
        }

        if let Some(ref output) = args.output {
            self.output = output.clone();
            args_provided = true;
        }

        if let Some(ref wled_ip) = args.wled_ip {
            self.wled_ip = wled_ip.clone();
            args_provided = true;
        }

        if let Some(ref background) = args.background {
            self.background = background.clone();
            args_provided = true;
        }

        if let Some(seed) = args.seed {
            self.seed = seed;
            args_provided = true;
        }

        if let Some(serpentine) = args.serpentine {
            self.serpentine = serpentine;
            args_provided = true;
        }

        if let Some(ref log_file) = args.log_file {
            self.log_file = log_file.clone();
            args_provided = true;
        }

        if args_provided {
            self.sanitize();
        }
        args_provided
    }

    /// Resolve `--cfg`: an absolute or relative path is used as-is, a bare name
    /// maps to `~/.config/rustworms/<name>.conf`
    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            let path = PathBuf::from(cfg);
            if path.is_absolute() || cfg.contains('/') || cfg.contains('\\') {
                return Ok(path);
            }

            let filename = if cfg.ends_with(".conf") {
                cfg.to_string()
            } else {
                format!("{}.conf", cfg)
            };
            Ok(Self::config_dir()?.join(filename))
        } else {
            Ok(Self::config_dir()?.join("config.conf"))
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(".config").join("rustworms"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut parsed: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        parsed.config_path = Some(path.to_path_buf());
        parsed.sanitize();
        Ok(parsed)
    }

    /// Sanitize config values to handle common formatting issues
    pub fn sanitize(&mut self) {
        self.background = self.background.trim().trim_start_matches('#').to_string();
        self.output = self.output.trim().to_lowercase();
        self.wled_ip = self.wled_ip.trim().to_string();
        self.log_file = self.log_file.trim().to_string();

        // Non-finite numbers fall back to their defaults before clamping
        let defaults = WormsConfig::default();
        self.fps = finite_or(self.fps, defaults.fps);
        self.min_fps = finite_or(self.min_fps, defaults.min_fps);
        self.max_fps = finite_or(self.max_fps, defaults.max_fps);
        self.speed_step = finite_or(self.speed_step, defaults.speed_step);
        self.brightness = finite_or(self.brightness, defaults.brightness);
        self.min_brightness = finite_or(self.min_brightness, defaults.min_brightness);
        self.brightness_step = finite_or(self.brightness_step, defaults.brightness_step);

        // Clamp numeric values to reasonable ranges
        self.width = self.width.clamp(2, 256);
        self.height = self.height.clamp(2, 256);
        self.height_adjust = self.height_adjust.min(self.height - 2);
        self.min_worms_count = self.min_worms_count.min(100);
        self.min_fps = self.min_fps.clamp(1.0, 500.0);
        self.max_fps = self.max_fps.clamp(self.min_fps, 500.0);
        self.fps = self.fps.clamp(self.min_fps, self.max_fps);
        self.speed_step = self.speed_step.clamp(0.0, 100.0);
        self.brightness = self.brightness.clamp(0.0, 1.0);
        self.min_brightness = self.min_brightness.clamp(0.0, 1.0);
        self.brightness_step = self.brightness_step.clamp(0.0, 1.0);
    }

    /// Reject settings that cannot produce a running display
    pub fn validate(&self) -> Result<()> {
        if !OUTPUT_MODES.contains(&self.output.as_str()) {
            anyhow::bail!("Unknown output '{}' (expected one of: {})", self.output, OUTPUT_MODES.join(", "));
        }
        if self.output != "terminal" && self.wled_ip.is_empty() {
            anyhow::bail!("Output '{}' needs a WLED address (set wled_ip or pass --wled-ip)", self.output);
        }
        self.grid()?;
        Ok(())
    }

    pub fn grid(&self) -> Result<Grid> {
        Grid::new(self.width, self.height, self.height_adjust)
    }

    /// Background as a solid color, when the setting is a hex color rather than a file
    pub fn background_color(&self) -> Option<Rgb> {
        let looks_like_hex = self.background.len() == 6 && self.background.chars().all(|c| c.is_ascii_hexdigit());
        if looks_like_hex {
            Rgb::from_hex(&self.background).ok()
        } else {
            None
        }
    }

    pub fn matrix_settings(&self) -> MatrixSettings {
        MatrixSettings {
            fps: self.fps,
            min_fps: self.min_fps,
            max_fps: self.max_fps,
            decay_speed: self.decay_speed,
            additive: self.additive,
            brightness: self.brightness,
            min_brightness: self.min_brightness,
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::config_path(None)?,
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Sanitize values before saving
        let mut sanitized = self.clone();
        sanitized.sanitize();

        // Build TOML with comments manually for better documentation
        let contents = format!(
            r#"# RustWorms Configuration File
# Command-line flags override these values and are written back here

# Matrix size in LEDs
width = {}
height = {}

# Rows at the top kept free of worms (e.g. for a clock overlay)
height_adjust = {}

# Worms kept alive at all times; more are born at random above this count
min_worms_count = {}

# Frame rate at startup and the range the speed buttons move it in
fps = {}
min_fps = {}
max_fps = {}

# Frames per second added or removed per speed button press
speed_step = {}

# Amount every color channel fades toward the background per frame
decay_speed = {}

# Overlapping worm heads add up their colors
# Options: true (add), false (overwrite)
additive = {}

# Brightness at startup, the lowest the buttons may go, and the step per press
brightness = {}
min_brightness = {}
brightness_step = {}

# Background the trails fade back to
# Hex color like "000010" or a path to an image file (resized to the matrix)
background = {}

# Output device
# Options: "terminal", "ddp", "both"
output = {}

# WLED device IP address or hostname (required for "ddp" and "both")
wled_ip = {}

# Odd LED rows run right to left
serpentine = {}

# Random seed (0 = different animation every run)
seed = {}

# Log file (empty = stderr)
log_file = {}
"#,
            sanitized.width,
            sanitized.height,
            sanitized.height_adjust,
            sanitized.min_worms_count,
            sanitized.fps,
            sanitized.min_fps,
            sanitized.max_fps,
            sanitized.speed_step,
            sanitized.decay_speed,
            sanitized.additive,
            sanitized.brightness,
            sanitized.min_brightness,
            sanitized.brightness_step,
            toml_string(&sanitized.background),
            toml_string(&sanitized.output),
            toml_string(&sanitized.wled_ip),
            sanitized.serpentine,
            sanitized.seed,
            toml_string(&sanitized.log_file),
        );

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }
        std::fs::write(path, contents).with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Quote and escape a string as a TOML value
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
