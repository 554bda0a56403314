// Background Module - Static backdrop the matrix starts from and decays back to
use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::path::Path;

use crate::types::Rgb;

#[derive(Debug, Clone)]
pub struct Background {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Background {
    pub fn solid(width: usize, height: usize, color: Rgb) -> Self {
        Background {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    /// Build from row-major pixels (index = y * width + x)
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Rgb>) -> Result<Self> {
        if pixels.len() != width * height {
            anyhow::bail!(
                "Background has {} pixels, expected {}x{} = {}",
                pixels.len(),
                width,
                height,
                width * height
            );
        }
        Ok(Background { width, height, pixels })
    }

    /// Decode an image file and scale it to the matrix size
    pub fn load(path: &Path, width: usize, height: usize) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("Failed to open background image {}", path.display()))?
            .to_rgb8();

        let img = if img.width() as usize != width || img.height() as usize != height {
            image::imageops::resize(&img, width as u32, height as u32, FilterType::Triangle)
        } else {
            img
        };

        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height as u32 {
            for x in 0..width as u32 {
                pixels.push(Rgb::from_channels(img.get_pixel(x, y).0));
            }
        }

        Self::from_pixels(width, height, pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn at(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * self.width + x]
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_background() {
        let bg = Background::solid(4, 3, Rgb::BLUE);
        assert_eq!(bg.width(), 4);
        assert_eq!(bg.height(), 3);
        assert_eq!(bg.pixels().len(), 12);
        assert_eq!(bg.at(3, 2), Rgb::BLUE);
    }

    #[test]
    fn test_from_pixels_rejects_wrong_size() {
        assert!(Background::from_pixels(2, 2, vec![Rgb::BLACK; 3]).is_err());

        let pixels = vec![Rgb::RED, Rgb::GREEN, Rgb::BLUE, Rgb::WHITE];
        let bg = Background::from_pixels(2, 2, pixels).unwrap();
        assert_eq!(bg.at(1, 0), Rgb::GREEN);
        assert_eq!(bg.at(0, 1), Rgb::BLUE);
    }

    #[test]
    fn test_load_png_keeps_orientation() {
        let path = std::env::temp_dir().join(format!("rustworms_bg_{}.png", std::process::id()));
        let mut img = image::RgbImage::new(3, 2);
        img.put_pixel(2, 0, image::Rgb([10, 20, 30]));
        img.put_pixel(0, 1, image::Rgb([200, 0, 0]));
        img.save(&path).unwrap();

        let bg = Background::load(&path, 3, 2).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(bg.at(2, 0), Rgb::new(10, 20, 30));
        assert_eq!(bg.at(0, 1), Rgb::new(200, 0, 0));
        assert_eq!(bg.at(1, 1), Rgb::BLACK);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = Background::load(Path::new("/nonexistent/rustworms.png"), 4, 4).unwrap_err();
        assert!(err.to_string().contains("rustworms.png"));
    }
}
