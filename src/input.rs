// Input Module - Buttons, keyboard emulation and press edge detection
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::info;

use crate::led_matrix::LedMatrix;
use crate::population::Population;

/// Logical buttons of the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    AddWorm,
    RemoveWorm,
    SpeedUp,
    SpeedDown,
    BrightnessUp,
    BrightnessDown,
    Sleep,
}

impl Button {
    pub const ALL: [Button; 7] = [
        Button::AddWorm,
        Button::RemoveWorm,
        Button::SpeedUp,
        Button::SpeedDown,
        Button::BrightnessUp,
        Button::BrightnessDown,
        Button::Sleep,
    ];
}

// Input outcome - tells the frame loop whether to keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Continue,
    Sleep,
}

/// Source of raw (level, not edge) button state
pub trait ButtonDevice {
    /// Refresh the button state; called once per frame before any `is_pressed`
    fn poll(&mut self) -> Result<()>;
    fn is_pressed(&self, button: Button) -> bool;
}

// Terminals only report key presses, then auto-repeat them after a delay.
// A key stays held until this long passes without another event for it.
const KEY_HOLD: Duration = Duration::from_millis(600);

/// Keyboard stand-in for the hardware buttons
pub struct KeyboardButtons {
    last_event: HashMap<Button, Instant>,
    held: HashSet<Button>,
}

impl KeyboardButtons {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        Ok(KeyboardButtons { last_event: HashMap::new(), held: HashSet::new() })
    }

    fn map_key(code: KeyCode, modifiers: KeyModifiers) -> Option<Button> {
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Button::Sleep),
            KeyCode::Char('a') | KeyCode::Char('A') | KeyCode::Char(' ') => Some(Button::AddWorm),
            KeyCode::Char('b') | KeyCode::Char('B') | KeyCode::Backspace => Some(Button::RemoveWorm),
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => Some(Button::SpeedUp),
            KeyCode::Left | KeyCode::Char('-') => Some(Button::SpeedDown),
            KeyCode::Up => Some(Button::BrightnessUp),
            KeyCode::Down => Some(Button::BrightnessDown),
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Button::Sleep),
            _ => None,
        }
    }

    fn record(&mut self, button: Button, at: Instant) {
        self.last_event.insert(button, at);
    }

    /// Rebuild the held set from the key events seen so far
    fn refresh(&mut self, now: Instant) {
        self.last_event.retain(|_, at| now.saturating_duration_since(*at) <= KEY_HOLD);
        self.held = self.last_event.keys().copied().collect();
    }
}

impl ButtonDevice for KeyboardButtons {
    fn poll(&mut self) -> Result<()> {
        while event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                if let Some(button) = Self::map_key(key.code, key.modifiers) {
                    self.record(button, Instant::now());
                }
            }
        }
        self.refresh(Instant::now());
        Ok(())
    }

    fn is_pressed(&self, button: Button) -> bool {
        self.held.contains(&button)
    }
}

impl Drop for KeyboardButtons {
    fn drop(&mut self) {
        disable_raw_mode().ok();
    }
}

/// Turns button levels into single actions on the population and matrix
pub struct InputMapper {
    was_pressed: HashMap<Button, bool>,
    speed_step: f64,
    brightness_step: f64,
}

impl InputMapper {
    pub fn new(speed_step: f64, brightness_step: f64) -> Self {
        InputMapper {
            was_pressed: Button::ALL.iter().map(|&b| (b, false)).collect(),
            speed_step,
            brightness_step,
        }
    }

    /// True only on the poll where the button goes from released to pressed
    pub fn is_pressed(&mut self, device: &dyn ButtonDevice, button: Button) -> bool {
        let pressed = device.is_pressed(button);
        let previously = self.was_pressed.insert(button, pressed).unwrap_or(false);
        pressed && !previously
    }

    pub fn handle_buttons(
        &mut self,
        device: &mut dyn ButtonDevice,
        population: &mut Population,
        leds: &mut LedMatrix,
        rng: &mut impl Rng,
    ) -> Result<InputOutcome> {
        device.poll()?;

        if self.is_pressed(device, Button::AddWorm) {
            population.spawn_check(true, rng);
            info!(worms = population.len(), "Added a worm");
        }
        if self.is_pressed(device, Button::RemoveWorm) {
            if let Some(worm) = population.remove_one() {
                info!(variant = worm.variant().name(), worms = population.len(), "Removed a worm");
            }
        }
        // Speed up means more frames per second
        if self.is_pressed(device, Button::SpeedUp) {
            let fps = leds.change_speed(self.speed_step);
            info!(fps, "Speed changed");
        }
        if self.is_pressed(device, Button::SpeedDown) {
            let fps = leds.change_speed(-self.speed_step);
            info!(fps, "Speed changed");
        }
        if self.is_pressed(device, Button::BrightnessUp) {
            let brightness = leds.change_brightness(self.brightness_step);
            info!(brightness, "Brightness changed");
        }
        if self.is_pressed(device, Button::BrightnessDown) {
            let brightness = leds.change_brightness(-self.brightness_step);
            info!(brightness, "Brightness changed");
        }
        if self.is_pressed(device, Button::Sleep) {
            info!("Sleep requested");
            return Ok(InputOutcome::Sleep);
        }

        Ok(InputOutcome::Continue)
    }
}

#[cfg(test)]
pub use scripted::ScriptedButtons;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::Background;
    use crate::display::RecordingDisplay;
    use crate::led_matrix::MatrixSettings;
    use crate::types::{Grid, Rgb};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn setup() -> (LedMatrix, Population, SmallRng) {
        let (display, _) = RecordingDisplay::new(16, 16);
        let leds = LedMatrix::new(Box::new(display), Background::solid(16, 16, Rgb::BLACK), &MatrixSettings::default()).unwrap();
        let population = Population::new(Grid::new(16, 16, 1).unwrap(), 2);
        (leds, population, SmallRng::seed_from_u64(42))
    }

    #[test]
    fn test_held_button_fires_once() {
        let (mut leds, mut population, mut rng) = setup();
        let mut mapper = InputMapper::new(10.0, 0.1);
        let held = vec![Button::AddWorm];
        let mut device = ScriptedButtons::new(vec![held.clone(), held.clone(), held, vec![], vec![Button::AddWorm]]);

        for _ in 0..5 {
            mapper.handle_buttons(&mut device, &mut population, &mut leds, &mut rng).unwrap();
        }
        assert_eq!(population.len(), 2);
    }

    #[test]
    fn test_remove_speed_and_brightness() {
        let (mut leds, mut population, mut rng) = setup();
        population.spawn_check(true, &mut rng);
        population.spawn_check(true, &mut rng);
        let mut mapper = InputMapper::new(10.0, 0.1);
        let mut device = ScriptedButtons::new(vec![
            vec![Button::RemoveWorm, Button::SpeedDown, Button::BrightnessUp],
            vec![],
            vec![Button::SpeedDown],
        ]);

        for _ in 0..3 {
            let outcome = mapper.handle_buttons(&mut device, &mut population, &mut leds, &mut rng).unwrap();
            assert_eq!(outcome, InputOutcome::Continue);
        }
        assert_eq!(population.len(), 1);
        assert_eq!(leds.fps(), 40.0);
        assert!((leds.brightness() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_sleep_ends_loop() {
        let (mut leds, mut population, mut rng) = setup();
        let mut mapper = InputMapper::new(10.0, 0.1);
        let mut device = ScriptedButtons::new(vec![vec![Button::SpeedUp], vec![Button::Sleep]]);
        let first = mapper.handle_buttons(&mut device, &mut population, &mut leds, &mut rng).unwrap();
        let second = mapper.handle_buttons(&mut device, &mut population, &mut leds, &mut rng).unwrap();
        assert_eq!(first, InputOutcome::Continue);
        assert_eq!(second, InputOutcome::Sleep);
        assert_eq!(leds.fps(), 70.0);
    }

    #[test]
    fn test_auto_repeat_keeps_key_held() {
        let mut keys = KeyboardButtons { last_event: HashMap::new(), held: HashSet::new() };
        let mut mapper = InputMapper::new(10.0, 0.1);
        let start = Instant::now();
        let ms = |n: u64| start + Duration::from_millis(n);

        // Press, a silent repeat delay, then repeats every 30 ms
        let events = [0, 500, 530, 560, 590];
        let mut presses = 0;
        for frame in 0..80u64 {
            let now = ms(frame * 16);
            for &at in events.iter().filter(|&&at| at <= frame * 16 && at + 16 > frame * 16) {
                keys.record(Button::AddWorm, ms(at));
            }
            keys.refresh(now);
            if mapper.is_pressed(&keys, Button::AddWorm) {
                presses += 1;
            }
        }
        assert_eq!(presses, 1);
        assert!(!keys.is_pressed(Button::AddWorm));
    }

    #[test]
    fn test_key_released_after_hold_window() {
        let mut keys = KeyboardButtons { last_event: HashMap::new(), held: HashSet::new() };
        let start = Instant::now();
        keys.record(Button::SpeedUp, start);
        keys.refresh(start + Duration::from_millis(100));
        assert!(keys.is_pressed(Button::SpeedUp));
        assert!(!keys.is_pressed(Button::SpeedDown));
        keys.refresh(start + KEY_HOLD + Duration::from_millis(1));
        assert!(!keys.is_pressed(Button::SpeedUp));
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyboardButtons::map_key(KeyCode::Char('a'), KeyModifiers::NONE), Some(Button::AddWorm));
        assert_eq!(KeyboardButtons::map_key(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(Button::Sleep));
        assert_eq!(KeyboardButtons::map_key(KeyCode::Char('c'), KeyModifiers::NONE), None);
        assert_eq!(KeyboardButtons::map_key(KeyCode::Left, KeyModifiers::NONE), Some(Button::SpeedDown));
        assert_eq!(KeyboardButtons::map_key(KeyCode::Down, KeyModifiers::NONE), Some(Button::BrightnessDown));
    }
}
