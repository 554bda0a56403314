// App Module - Owning context that drives input, worms and the matrix frame by frame
use anyhow::Result;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::input::{ButtonDevice, InputMapper, InputOutcome};
use crate::led_matrix::LedMatrix;
use crate::population::Population;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(10);
// A full-white cell needs 26 decays of 10 to reach black
const MAX_FADE_FRAMES: usize = 300;

pub struct App {
    leds: LedMatrix,
    population: Population,
    mapper: InputMapper,
    buttons: Option<Box<dyn ButtonDevice>>,
    rng: SmallRng,
    frames: u64,
}

impl App {
    /// `seed` 0 draws the generator seed from the OS
    pub fn new(
        leds: LedMatrix,
        population: Population,
        mapper: InputMapper,
        buttons: Option<Box<dyn ButtonDevice>>,
        seed: u64,
    ) -> Self {
        let rng = if seed == 0 { SmallRng::from_entropy() } else { SmallRng::seed_from_u64(seed) };
        App { leds, population, mapper, buttons, rng, frames: 0 }
    }

    #[cfg(test)]
    pub fn leds(&self) -> &LedMatrix {
        &self.leds
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// One tick: buttons, then every worm, then decay and output
    pub fn frame(&mut self) -> Result<InputOutcome> {
        if let Some(buttons) = self.buttons.as_deref_mut() {
            let outcome = self.mapper.handle_buttons(buttons, &mut self.population, &mut self.leds, &mut self.rng)?;
            if outcome == InputOutcome::Sleep {
                return Ok(outcome);
            }
        }

        self.population.step(&mut self.leds, &mut self.rng);
        self.leds.decay_and_flush()?;
        self.frames += 1;
        Ok(InputOutcome::Continue)
    }

    /// Loop frames at the matrix frame rate until a sleep press or `shutdown` is set,
    /// then fade the display out
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let mut frames_since_summary = 0u64;
        let mut time_since_summary = Duration::ZERO;

        while !shutdown.load(Ordering::SeqCst) {
            if self.frame()? == InputOutcome::Sleep {
                break;
            }
            self.leds.wait_for_frame();

            // Measured in frames so the summary follows the configured pace
            frames_since_summary += 1;
            time_since_summary += self.leds.frame_interval();
            if time_since_summary >= SUMMARY_INTERVAL {
                info!(
                    frames = frames_since_summary,
                    worms = self.population.len(),
                    births = self.population.births(),
                    deaths = self.population.deaths(),
                    fps = self.leds.fps(),
                    "Population summary"
                );
                frames_since_summary = 0;
                time_since_summary = Duration::ZERO;
            }
        }

        self.shutdown()
    }

    /// Kill the worms, let their trails decay back to the background, then go dark
    pub fn shutdown(&mut self) -> Result<()> {
        info!(worms = self.population.len(), frames = self.frames, "Shutting down");
        self.population.kill_all();
        self.population.remove_dead();

        let mut fade_frames = 0;
        while !self.leds.is_settled() && fade_frames < MAX_FADE_FRAMES {
            self.leds.decay_and_flush()?;
            self.leds.wait_for_frame();
            fade_frames += 1;
        }

        self.leds.black_out()
    }
}
