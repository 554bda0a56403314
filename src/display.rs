// Display Module - Output devices the LED matrix pushes its frames to
use anyhow::{Context, Result};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ddp_rs::connection::DDPConnection;
use ddp_rs::protocol::{PixelConfig, ID};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::net::UdpSocket;

use crate::types::Rgb;

/// A physical (or emulated) pixel display.
/// Pixels are staged with `set_pixel` and only become visible on `commit`.
pub trait Display {
    fn bounds(&self) -> (usize, usize);
    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb);
    fn commit(&mut self) -> Result<()>;
    fn set_global_brightness(&mut self, brightness: f64);
}

/// WLED controller driven over DDP (UDP port 4048)
pub struct DdpDisplay {
    connection: DDPConnection,
    wled_ip: String,
    width: usize,
    height: usize,
    serpentine: bool,
    frame: Vec<u8>,
    brightness: f64,
}

impl DdpDisplay {
    pub fn connect(wled_ip: &str, width: usize, height: usize, serpentine: bool) -> Result<Self> {
        let dest_addr = format!("{}:4048", wled_ip);
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind UDP socket for DDP")?;
        let connection = DDPConnection::try_new(&dest_addr, PixelConfig::default(), ID::Default, socket)
            .with_context(|| format!("Failed to connect to WLED at {}", dest_addr))?;

        Ok(DdpDisplay {
            connection,
            wled_ip: wled_ip.to_string(),
            width,
            height,
            serpentine,
            frame: vec![0u8; width * height * 3],
            brightness: 1.0,
        })
    }

    fn led_index(&self, x: usize, y: usize) -> usize {
        if self.serpentine && y % 2 == 1 {
            // Odd rows run right to left
            y * self.width + (self.width - 1 - x)
        } else {
            y * self.width + x
        }
    }
}

impl Display for DdpDisplay {
    fn bounds(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
        let offset = self.led_index(x, y) * 3;
        self.frame[offset] = color.r;
        self.frame[offset + 1] = color.g;
        self.frame[offset + 2] = color.b;
    }

    fn commit(&mut self) -> Result<()> {
        if self.brightness < 1.0 {
            let brightness = self.brightness;
            let dimmed: Vec<u8> = self.frame.iter().map(|&val| (val as f64 * brightness).round() as u8).collect();
            self.connection
                .write(&dimmed)
                .with_context(|| format!("DDP send to {} failed", self.wled_ip))?;
        } else {
            self.connection
                .write(&self.frame)
                .with_context(|| format!("DDP send to {} failed", self.wled_ip))?;
        }
        Ok(())
    }

    fn set_global_brightness(&mut self, brightness: f64) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }
}

/// Full-screen terminal preview of the matrix
pub struct TerminalDisplay {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
    brightness: f64,
}

impl TerminalDisplay {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        terminal.hide_cursor()?;

        Ok(TerminalDisplay {
            terminal,
            width,
            height,
            pixels: vec![Rgb::BLACK; width * height],
            brightness: 1.0,
        })
    }

    fn matrix_lines(&self) -> Vec<Line<'static>> {
        (0..self.height)
            .map(|y| {
                let spans: Vec<Span<'static>> = (0..self.width)
                    .map(|x| {
                        let color = self.pixels[y * self.width + x].scaled(self.brightness);
                        Span::styled("██", Style::default().fg(Color::Rgb(color.r, color.g, color.b)))
                    })
                    .collect();
                Line::from(spans)
            })
            .collect()
    }
}

impl Display for TerminalDisplay {
    fn bounds(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
        self.pixels[y * self.width + x] = color;
    }

    fn commit(&mut self) -> Result<()> {
        let lines = self.matrix_lines();
        let header = format!(
            "🪱 Worms | {}x{} | Brightness {:.0}%",
            self.width,
            self.height,
            self.brightness * 100.0
        );
        let keys = "a add | b remove | ←/→ speed | ↑/↓ brightness | q quit";

        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),                        // Header
                    Constraint::Length(self.height as u16 + 2),   // Matrix
                    Constraint::Min(0),
                ])
                .split(f.size());

            let header_line = Line::from(vec![
                Span::raw(header),
                Span::raw("  "),
                Span::styled(keys, Style::default().fg(Color::Gray)),
            ]);
            f.render_widget(Paragraph::new(header_line).block(Block::default().borders(Borders::ALL)), chunks[0]);
            f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::ALL)), chunks[1]);
        })?;
        Ok(())
    }

    fn set_global_brightness(&mut self, brightness: f64) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        self.terminal.show_cursor().ok();
        disable_raw_mode().ok();
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen).ok();
    }
}

/// Sends every frame to several devices of the same size
pub struct MultiDisplay {
    devices: Vec<Box<dyn Display>>,
}

impl MultiDisplay {
    pub fn new(devices: Vec<Box<dyn Display>>) -> Result<Self> {
        let Some(first) = devices.first() else {
            anyhow::bail!("No display devices configured");
        };
        let bounds = first.bounds();
        if let Some(mismatch) = devices.iter().find(|d| d.bounds() != bounds) {
            anyhow::bail!("Display sizes differ: {:?} vs {:?}", bounds, mismatch.bounds());
        }
        Ok(MultiDisplay { devices })
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Display for MultiDisplay {
    fn bounds(&self) -> (usize, usize) {
        self.devices[0].bounds()
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
        for device in &mut self.devices {
            device.set_pixel(x, y, color);
        }
    }

    fn commit(&mut self) -> Result<()> {
        for device in &mut self.devices {
            device.commit()?;
        }
        Ok(())
    }

    fn set_global_brightness(&mut self, brightness: f64) {
        for device in &mut self.devices {
            device.set_global_brightness(brightness);
        }
    }
}

#[cfg(test)]
pub use recording::{Recorded, RecordingDisplay};

#[cfg(test)]
mod recording {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// What a `RecordingDisplay` has been asked to do so far
    #[derive(Debug, Default)]
    pub struct Recorded {
        pub width: usize,
        pub pixels: Vec<Rgb>,
        pub pixel_writes: usize,
        pub commits: usize,
        pub brightness: f64,
    }

    impl Recorded {
        pub fn at(&self, x: usize, y: usize) -> Rgb {
            self.pixels[y * self.width + x]
        }
    }

    /// In-memory display for tests; the shared handle stays readable after the
    /// display is moved into a matrix
    pub struct RecordingDisplay {
        width: usize,
        height: usize,
        state: Rc<RefCell<Recorded>>,
    }

    impl RecordingDisplay {
        pub fn new(width: usize, height: usize) -> (Self, Rc<RefCell<Recorded>>) {
            let state = Rc::new(RefCell::new(Recorded {
                width,
                pixels: vec![Rgb::BLACK; width * height],
                brightness: 1.0,
                ..Recorded::default()
            }));
            (RecordingDisplay { width, height, state: Rc::clone(&state) }, state)
        }
    }

    impl Display for RecordingDisplay {
        fn bounds(&self) -> (usize, usize) {
            (self.width, self.height)
        }

        fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
            let mut state = self.state.borrow_mut();
            state.pixels[y * self.width + x] = color;
            state.pixel_writes += 1;
        }

        fn commit(&mut self) -> Result<()> {
            self.state.borrow_mut().commits += 1;
            Ok(())
        }

        fn set_global_brightness(&mut self, brightness: f64) {
            self.state.borrow_mut().brightness = brightness;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_display_fans_out() {
        let (a, a_state) = RecordingDisplay::new(2, 2);
        let (b, b_state) = RecordingDisplay::new(2, 2);
        let mut multi = MultiDisplay::new(vec![Box::new(a), Box::new(b)]).unwrap();
        assert_eq!(multi.device_count(), 2);

        multi.set_pixel(1, 1, Rgb::RED);
        multi.set_global_brightness(0.3);
        multi.commit().unwrap();

        for state in [a_state, b_state] {
            let state = state.borrow();
            assert_eq!(state.at(1, 1), Rgb::RED);
            assert_eq!(state.commits, 1);
            assert_eq!(state.brightness, 0.3);
        }
    }

    #[test]
    fn test_multi_display_rejects_mismatched_sizes() {
        let (a, _) = RecordingDisplay::new(2, 2);
        let (b, _) = RecordingDisplay::new(3, 2);
        assert!(MultiDisplay::new(vec![Box::new(a), Box::new(b)]).is_err());
        assert!(MultiDisplay::new(Vec::new()).is_err());
    }
}
