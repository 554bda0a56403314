// Population Module - Owns the live worms, steps them, buries the dead and breeds new ones
use rand::Rng;
use tracing::debug;

use crate::led_matrix::LedMatrix;
use crate::types::Grid;
use crate::worm::{Neighbors, Variant, Worm, MAX_AGE};

pub struct Population {
    grid: Grid,
    worms: Vec<Worm>,
    min_worms_count: usize,
    births: u64,
    deaths: u64,
}

impl Population {
    pub fn new(grid: Grid, min_worms_count: usize) -> Self {
        Population {
            grid,
            worms: Vec::new(),
            min_worms_count,
            births: 0,
            deaths: 0,
        }
    }

    #[cfg(test)]
    pub fn worms(&self) -> &[Worm] {
        &self.worms
    }

    pub fn len(&self) -> usize {
        self.worms.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.worms.is_empty()
    }

    pub fn births(&self) -> u64 {
        self.births
    }

    pub fn deaths(&self) -> u64 {
        self.deaths
    }

    /// Add a worm to the end of the collection
    pub fn push(&mut self, worm: Worm) {
        debug!(variant = worm.variant().name(), x = worm.pos().x, y = worm.pos().y, "Worm born");
        self.births += 1;
        self.worms.push(worm);
    }

    /// Advance every worm one tick in insertion order, drop the ones that died,
    /// then see whether a new worm should be born
    pub fn step(&mut self, leds: &mut LedMatrix, rng: &mut impl Rng) {
        // Each worm sees the already-updated positions of the worms before it
        for i in 0..self.worms.len() {
            let (before, rest) = self.worms.split_at_mut(i);
            if let Some((worm, after)) = rest.split_first_mut() {
                worm.step(leds, &Neighbors::new(before, after), rng);
            }
        }

        self.remove_dead();
        self.spawn_check(false, rng);
    }

    /// Drop every worm that has died
    pub fn remove_dead(&mut self) {
        let before = self.worms.len();
        self.worms.retain(|worm| {
            if worm.is_dead() {
                debug!(variant = worm.variant().name(), age = worm.age(), "Worm died");
                false
            } else {
                true
            }
        });
        self.deaths += (before - self.worms.len()) as u64;
    }

    /// Maybe add one worm of a random variant; always when `force` is set.
    /// Below the minimum a worm is always born. At or above it, one trial per
    /// worm over the minimum (plus one) is drawn and any success breeds.
    /// Returns true if a worm was born.
    pub fn spawn_check(&mut self, force: bool, rng: &mut impl Rng) -> bool {
        let birth = force || self.worms.len() < self.min_worms_count || {
            let trials = self.worms.len() - self.min_worms_count + 1;
            (0..trials).any(|_| rng.gen_range(0..=MAX_AGE) == 1)
        };

        if birth {
            let worm = Worm::spawn(Variant::random(rng), self.grid, rng);
            self.push(worm);
        }
        birth
    }

    /// Remove the most recently added worm
    pub fn remove_one(&mut self) -> Option<Worm> {
        let worm = self.worms.pop()?;
        debug!(variant = worm.variant().name(), "Worm removed");
        Some(worm)
    }

    /// Mark every worm dead; they are removed on the next step
    pub fn kill_all(&mut self) {
        for worm in &mut self.worms {
            worm.kill();
        }
    }
}
