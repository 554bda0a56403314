// Shared types module - Colors and grid geometry used across the matrix, worms and devices

use anyhow::Result;

// RGB color representation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 50, 50);
    pub const GREEN: Rgb = Rgb::new(50, 255, 50);
    pub const WHITE: Rgb = Rgb::new(250, 250, 250);
    pub const BLUE: Rgb = Rgb::new(50, 50, 255);
    pub const YELLOW: Rgb = Rgb::new(255, 255, 50);
    pub const PURPLE: Rgb = Rgb::new(255, 50, 255);
    pub const ORANGE: Rgb = Rgb::new(255, 120, 50);
    pub const GREY: Rgb = Rgb::new(150, 150, 150);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 {
            anyhow::bail!("Invalid hex color: {}", hex);
        }
        Ok(Rgb {
            r: u8::from_str_radix(&hex[0..2], 16)?,
            g: u8::from_str_radix(&hex[2..4], 16)?,
            b: u8::from_str_radix(&hex[4..6], 16)?,
        })
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_channels(channels: [u8; 3]) -> Self {
        Rgb::new(channels[0], channels[1], channels[2])
    }

    /// Componentwise add, each channel capped at 255
    pub fn saturating_add(self, other: Rgb) -> Rgb {
        Rgb {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
        }
    }

    /// Subtract `amount` from every channel without going below the matching channel of `floor`
    pub fn decay_toward(self, floor: Rgb, amount: u8) -> Rgb {
        let decay = |value: u8, min: u8| value.saturating_sub(amount).max(min);
        Rgb {
            r: decay(self.r, floor.r),
            g: decay(self.g, floor.g),
            b: decay(self.b, floor.b),
        }
    }

    /// Subtract `amount` from every channel, floored at 0
    pub fn dimmed(self, amount: u8) -> Rgb {
        self.decay_toward(Rgb::BLACK, amount)
    }

    pub fn average(&self) -> f64 {
        (self.r as f64 + self.g as f64 + self.b as f64) / 3.0
    }

    /// Multiply every channel by a brightness factor (0.0 to 1.0)
    pub fn scaled(self, brightness: f64) -> Rgb {
        let scale = |value: u8| (value as f64 * brightness).round().clamp(0.0, 255.0) as u8;
        Rgb {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }

    pub fn manhattan_distance(&self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Extent of the matrix that worms live on.
/// Rows below `height_adjust` are never entered by a worm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub height_adjust: usize,
}

impl Grid {
    pub fn new(width: usize, height: usize, height_adjust: usize) -> Result<Self> {
        // A worm needs at least two cells on each axis to be able to move and turn
        if width < 2 {
            anyhow::bail!("Grid width must be at least 2, got {}", width);
        }
        if height < height_adjust + 2 {
            anyhow::bail!(
                "Grid height {} leaves fewer than 2 usable rows with height_adjust {}",
                height,
                height_adjust
            );
        }
        Ok(Grid { width, height, height_adjust })
    }

    pub fn min_x(&self) -> i32 {
        0
    }

    pub fn max_x(&self) -> i32 {
        self.width as i32 - 1
    }

    pub fn min_y(&self) -> i32 {
        self.height_adjust as i32
    }

    pub fn max_y(&self) -> i32 {
        self.height as i32 - 1
    }

    /// True if the position is inside the area worms may occupy
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= self.min_x() && pos.x <= self.max_x() && pos.y >= self.min_y() && pos.y <= self.max_y()
    }
}
