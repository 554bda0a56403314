// Worm Module - Autonomous agents that crawl over the matrix, age, fade and die
use rand::Rng;

use crate::led_matrix::{Blend, LedMatrix};
use crate::types::{Grid, Position, Rgb};

pub const MAX_AGE: u32 = 5000;
/// Remaining life below which a worm slows down and fades
pub const DYING_BOUNDARY: u32 = 1000;
pub const AGE_SLOWDOWN: u32 = 6;

const DEFAULT_SPEED: i32 = 1;
const DEFAULT_TURN_CHANCE: f64 = 0.25;
const CHASE_DISTANCE: i32 = 2;
const SCARE_DISTANCE: i32 = 2;
const RAINBOW_DIM: u8 = 50;
const RAINBOW_COLORS: [Rgb; 6] = [Rgb::RED, Rgb::ORANGE, Rgb::YELLOW, Rgb::GREEN, Rgb::BLUE, Rgb::PURPLE];

/// Behavior policy of a worm, fixed at birth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Straight,
    Turny,
    WallHugger,
    Rainbow,
    Slow,
    FixedDiagonal,
    Chaser,
    Evader,
}

impl Variant {
    pub const ALL: [Variant; 8] = [
        Variant::Chaser,
        Variant::Evader,
        Variant::Turny,
        Variant::Straight,
        Variant::WallHugger,
        Variant::Slow,
        Variant::Rainbow,
        Variant::FixedDiagonal,
    ];

    pub fn random(rng: &mut impl Rng) -> Variant {
        Variant::ALL[rng.gen_range(0..Variant::ALL.len())]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Straight => "straight",
            Variant::Turny => "turny",
            Variant::WallHugger => "wall-hugger",
            Variant::Rainbow => "rainbow",
            Variant::Slow => "slow",
            Variant::FixedDiagonal => "fixed-diagonal",
            Variant::Chaser => "chaser",
            Variant::Evader => "evader",
        }
    }

    /// Probability of a spontaneous turn per step
    fn turn_chance(&self) -> f64 {
        match self {
            Variant::Straight => 0.2,
            Variant::Turny | Variant::WallHugger | Variant::Slow => 0.6,
            Variant::Rainbow => 0.3,
            Variant::FixedDiagonal | Variant::Chaser | Variant::Evader => DEFAULT_TURN_CHANCE,
        }
    }

    /// Replacement turn chance while touching any edge
    fn edge_turn_chance(&self) -> Option<f64> {
        match self {
            Variant::WallHugger => Some(0.1),
            _ => None,
        }
    }

    fn head_color(&self) -> Rgb {
        match self {
            Variant::Straight => Rgb::BLUE,
            Variant::Turny | Variant::FixedDiagonal => Rgb::RED,
            Variant::WallHugger | Variant::Chaser => Rgb::GREEN,
            Variant::Slow => Rgb::PURPLE,
            Variant::Evader => Rgb::GREY,
            // Rainbow cycles RAINBOW_COLORS instead
            Variant::Rainbow => Rgb::RED,
        }
    }

    /// Shown instead of the head color on even ages
    fn alternate_color(&self) -> Option<Rgb> {
        match self {
            Variant::Chaser => Some(Rgb::RED),
            Variant::Evader => Some(Rgb::WHITE),
            _ => None,
        }
    }

    /// Trail color left on the cell being vacated
    fn body_color(&self) -> Option<Rgb> {
        match self {
            Variant::FixedDiagonal => Some(Rgb::GREY),
            _ => None,
        }
    }

    fn fixed_turn_sign(&self) -> bool {
        matches!(self, Variant::FixedDiagonal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Left,
    Right,
    Bottom,
    Top,
}

/// Fade a color toward grey and then black as the remaining life shrinks.
/// At `DYING_BOUNDARY` the color is unchanged, at 0 it is black.
pub fn fade_with_age(color: Rgb, life_left: u32) -> Rgb {
    let life_left = life_left.min(DYING_BOUNDARY);
    let average = color.average();
    let inverted = (DYING_BOUNDARY - life_left) as f64;
    // Halves round to even
    let fraction = (average * inverted / DYING_BOUNDARY as f64).round_ties_even();

    let fade = |channel: u8| {
        let mut value = channel as f64;
        if value > average {
            // Primary channels go down to grey first
            value = (value - 2.0 * fraction).max(average);
        } else {
            // Secondary channels come up to grey
            value = (value + fraction).min(average);
        }
        (value - fraction).max(0.0).round_ties_even().min(255.0) as u8
    };

    Rgb::from_channels(color.channels().map(fade))
}

/// The other live worms a chaser or evader can see, in insertion order
pub struct Neighbors<'a> {
    before: &'a [Worm],
    after: &'a [Worm],
}

impl<'a> Neighbors<'a> {
    pub fn new(before: &'a [Worm], after: &'a [Worm]) -> Self {
        Neighbors { before, after }
    }

    #[cfg(test)]
    pub fn none() -> Neighbors<'static> {
        Neighbors { before: &[], after: &[] }
    }

    /// Closest live worm by Manhattan distance; ties go to the first one found
    pub fn nearest(&self, from: Position) -> Option<Position> {
        let mut closest: Option<(Position, i32)> = None;
        for worm in self.before.iter().chain(self.after.iter()).filter(|w| !w.is_dead()) {
            let distance = from.manhattan_distance(worm.pos);
            if closest.map_or(true, |(_, best)| distance < best) {
                closest = Some((worm.pos, distance));
            }
        }
        closest.map(|(pos, _)| pos)
    }
}

#[derive(Debug, Clone)]
pub struct Worm {
    variant: Variant,
    grid: Grid,
    pos: Position,
    x_speed: i32,
    y_speed: i32,
    age: u32,
    wait_move: u32,
    turn_chance: f64,
    rainbow_index: usize,
    move_this_turn: bool,
}

impl Worm {
    /// Create a worm at a given spot. The position must be on the grid and the
    /// velocity a single unit step along one axis.
    pub fn new(variant: Variant, grid: Grid, pos: Position, velocity: (i32, i32)) -> Self {
        assert!(grid.contains(pos), "{} worm placed outside the grid at {:?}", variant.name(), pos);
        assert!(
            velocity.0.abs() + velocity.1.abs() == 1,
            "{} worm needs a unit axis-aligned velocity, got {:?}",
            variant.name(),
            velocity
        );

        Worm {
            variant,
            grid,
            pos,
            x_speed: velocity.0,
            y_speed: velocity.1,
            age: 0,
            wait_move: 0,
            turn_chance: variant.turn_chance(),
            rainbow_index: 0,
            move_this_turn: true,
        }
    }

    /// Random position and heading such that the first move stays on the grid
    pub fn spawn(variant: Variant, grid: Grid, rng: &mut impl Rng) -> Self {
        let (min_x, max_x, min_y, max_y) = (grid.min_x(), grid.max_x(), grid.min_y(), grid.max_y());
        let (velocity, x_range, y_range) = match rng.gen_range(0..4) {
            0 => ((DEFAULT_SPEED, 0), (min_x, max_x - 1), (min_y, max_y)),
            1 => ((-DEFAULT_SPEED, 0), (min_x + 1, max_x), (min_y, max_y)),
            2 => ((0, DEFAULT_SPEED), (min_x, max_x), (min_y, max_y - 1)),
            _ => ((0, -DEFAULT_SPEED), (min_x, max_x), (min_y + 1, max_y)),
        };
        let pos = Position::new(rng.gen_range(x_range.0..=x_range.1), rng.gen_range(y_range.0..=y_range.1));
        Worm::new(variant, grid, pos, velocity)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn pos(&self) -> Position {
        self.pos
    }

    #[cfg(test)]
    pub fn velocity(&self) -> (i32, i32) {
        (self.x_speed, self.y_speed)
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    #[cfg(test)]
    pub fn wait_move(&self) -> u32 {
        self.wait_move
    }

    pub fn life_left(&self) -> u32 {
        MAX_AGE.saturating_sub(self.age)
    }

    pub fn is_dying(&self) -> bool {
        self.life_left() < DYING_BOUNDARY
    }

    pub fn is_dead(&self) -> bool {
        self.age >= MAX_AGE
    }

    pub fn kill(&mut self) {
        self.age = self.age.max(MAX_AGE);
    }

    /// Advance one tick: move, maybe turn, paint, age, then steer relative to
    /// the other worms if this variant cares about them
    pub fn step(&mut self, leds: &mut LedMatrix, neighbors: &Neighbors, rng: &mut impl Rng) {
        if self.variant == Variant::Slow {
            self.move_this_turn = !self.move_this_turn;
            if self.move_this_turn {
                // Off beat: stand still, keep the head lit
                let color = self.color();
                self.draw_head(leds, color);
                return;
            }
        }

        // Only a hand-placed worm can start a tick facing a wall
        if self.is_ramming_edge() {
            self.turn(rng);
        }

        let last_pos = self.pos;
        if !self.wait_for_age() {
            self.pos.x += self.x_speed;
            self.pos.y += self.y_speed;
        }

        if self.is_ramming_edge() || self.wants_to_turn(rng) {
            self.turn(rng);
        }

        let color = self.color();
        self.draw_head(leds, color);
        if let Some(body) = self.variant.body_color() {
            if last_pos != self.pos {
                leds.set_color(last_pos.x as usize, last_pos.y as usize, body, Blend::Overwrite);
            }
        }

        self.age = self.age.saturating_add(1);

        match self.variant {
            Variant::Chaser => self.chase(neighbors),
            Variant::Evader => self.evade(neighbors),
            _ => {}
        }
    }

    /// Dying worms skip moves; the number of skipped ticks grows toward death
    fn wait_for_age(&mut self) -> bool {
        if self.is_dying() {
            if self.wait_move == 0 {
                let inverted_life_left = DYING_BOUNDARY - self.life_left();
                self.wait_move = (inverted_life_left * AGE_SLOWDOWN).div_ceil(DYING_BOUNDARY) + 1;
            }
            self.wait_move -= 1;
        }
        self.wait_move > 0
    }

    fn color(&mut self) -> Rgb {
        let base = match self.variant {
            Variant::Rainbow => {
                let color = RAINBOW_COLORS[self.rainbow_index].dimmed(RAINBOW_DIM);
                self.rainbow_index = (self.rainbow_index + 1) % RAINBOW_COLORS.len();
                color
            }
            variant => match variant.alternate_color() {
                Some(alternate) if self.age % 2 == 0 => alternate,
                _ => variant.head_color(),
            },
        };

        if self.is_dying() {
            fade_with_age(base, self.life_left())
        } else {
            base
        }
    }

    fn draw_head(&self, leds: &mut LedMatrix, color: Rgb) {
        if !self.grid.contains(self.pos) {
            panic!(
                "{} worm out of bounds with X {}, speed {}, Y {}, speed {}",
                self.variant.name(),
                self.pos.x,
                self.x_speed,
                self.pos.y,
                self.y_speed
            );
        }
        leds.set_color(self.pos.x as usize, self.pos.y as usize, color, Blend::Add);
    }

    fn is_touching_edge(&self, edge: Edge) -> bool {
        match edge {
            Edge::Left => self.pos.x <= self.grid.min_x(),
            Edge::Right => self.pos.x >= self.grid.max_x(),
            Edge::Bottom => self.pos.y <= self.grid.min_y(),
            Edge::Top => self.pos.y >= self.grid.max_y(),
        }
    }

    fn is_touching_any_edge(&self) -> bool {
        [Edge::Left, Edge::Top, Edge::Right, Edge::Bottom]
            .into_iter()
            .any(|edge| self.is_touching_edge(edge))
    }

    /// True if the next move in the current direction would leave the grid
    fn is_ramming_edge(&self) -> bool {
        (self.is_touching_edge(Edge::Left) && self.x_speed < 0)
            || (self.is_touching_edge(Edge::Right) && self.x_speed > 0)
            || (self.is_touching_edge(Edge::Bottom) && self.y_speed < 0)
            || (self.is_touching_edge(Edge::Top) && self.y_speed > 0)
    }

    fn wants_to_turn(&self, rng: &mut impl Rng) -> bool {
        let chance = match self.variant.edge_turn_chance() {
            Some(edge_chance) if self.is_touching_any_edge() => edge_chance,
            _ => self.turn_chance,
        };
        rng.gen::<f64>() < chance
    }

    /// Swap the moving axis, heading away from any edge we are touching
    fn turn(&mut self, rng: &mut impl Rng) {
        if self.x_speed != 0 {
            self.x_speed = 0;
            self.y_speed = if self.is_touching_edge(Edge::Bottom) {
                DEFAULT_SPEED
            } else if self.is_touching_edge(Edge::Top) {
                -DEFAULT_SPEED
            } else {
                self.pick_sign(rng)
            };
        } else {
            self.y_speed = 0;
            self.x_speed = if self.is_touching_edge(Edge::Left) {
                DEFAULT_SPEED
            } else if self.is_touching_edge(Edge::Right) {
                -DEFAULT_SPEED
            } else {
                self.pick_sign(rng)
            };
        }
    }

    fn pick_sign(&self, rng: &mut impl Rng) -> i32 {
        if self.variant.fixed_turn_sign() || rng.gen_bool(0.5) {
            DEFAULT_SPEED
        } else {
            -DEFAULT_SPEED
        }
    }

    fn set_velocity(&mut self, x_speed: i32, y_speed: i32) {
        self.x_speed = x_speed;
        self.y_speed = y_speed;
    }

    /// Head for the nearest worm, one axis at a time, while it is more than
    /// CHASE_DISTANCE away on that axis
    fn chase(&mut self, neighbors: &Neighbors) {
        let Some(target) = neighbors.nearest(self.pos) else {
            return;
        };

        if target.x > self.pos.x + CHASE_DISTANCE {
            self.set_velocity(DEFAULT_SPEED, 0);
        } else if target.x < self.pos.x - CHASE_DISTANCE {
            self.set_velocity(-DEFAULT_SPEED, 0);
        } else if target.y > self.pos.y + CHASE_DISTANCE {
            self.set_velocity(0, DEFAULT_SPEED);
        } else if target.y < self.pos.y - CHASE_DISTANCE {
            self.set_velocity(0, -DEFAULT_SPEED);
        }
    }

    /// Move away from the nearest worm once it comes within SCARE_DISTANCE on
    /// an axis. Worms on an edge hold their course so they never steer off the grid.
    fn evade(&mut self, neighbors: &Neighbors) {
        if self.is_touching_any_edge() {
            return;
        }
        let Some(threat) = neighbors.nearest(self.pos) else {
            return;
        };

        let (x, y) = (self.pos.x, self.pos.y);
        if (x..=x + SCARE_DISTANCE).contains(&threat.x) {
            self.set_velocity(-DEFAULT_SPEED, 0);
        } else if (x - SCARE_DISTANCE..=x).contains(&threat.x) {
            self.set_velocity(DEFAULT_SPEED, 0);
        }

        if (y..=y + SCARE_DISTANCE).contains(&threat.y) {
            self.set_velocity(0, -DEFAULT_SPEED);
        } else if (y - SCARE_DISTANCE..=y).contains(&threat.y) {
            self.set_velocity(0, DEFAULT_SPEED);
        }
    }

    #[cfg(test)]
    pub fn set_age(&mut self, age: u32) {
        self.age = age;
    }
}
