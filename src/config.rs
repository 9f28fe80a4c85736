//! Fixed economy rules and the per-run settings the CLI can change.

use crate::error::FactoryError;

/// Currency debited to buy a robot.
pub const ROBOT_COST_EUROS: u64 = 3;
/// Foo units consumed to buy a robot.
pub const ROBOT_COST_FOO: usize = 6;
/// Roster size that ends the simulation.
pub const ROBOT_MAX_NUMBER: usize = 30;

// Durations below are in time units (seconds at speed 1).
pub const SWITCH_ACTIVITY_DELAY: f64 = 5.0;
pub const FOO_MINING_DELAY: f64 = 1.0;
pub const BAR_MINING_MIN_DELAY: f64 = 0.5;
pub const BAR_MINING_MAX_DELAY: f64 = 2.0;
pub const FOOBAR_CREATION_DELAY: f64 = 2.0;
pub const FOOBAR_SELL_DELAY: f64 = 10.0;

pub const FOOBAR_SUCCESS_RATE: f64 = 0.6;
pub const FOOBAR_SELL_MAX: usize = 5;
pub const FOOBAR_PRICE: u64 = 1;
/// Minimum FooBar stock before a robot decides to sell.
pub const FOOBAR_SELL_MIN: usize = 3;

/// Robots the factory starts with unless told otherwise.
pub const DEFAULT_INITIAL_ROBOTS: usize = 2;

/// Settings for a single simulation run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimConfig {
    /// Divides every delay; higher is faster.
    pub speed: f64,
    pub initial_robots: usize,
    /// Seed for the random source; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            initial_robots: DEFAULT_INITIAL_ROBOTS,
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), FactoryError> {
        validate_speed(self.speed)?;
        if self.initial_robots == 0 {
            return Err(FactoryError::NoRobots);
        }
        if self.initial_robots >= ROBOT_MAX_NUMBER {
            return Err(FactoryError::TooManyRobots {
                requested: self.initial_robots,
                cap: ROBOT_MAX_NUMBER,
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_speed(speed: f64) -> Result<(), FactoryError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(FactoryError::InvalidSpeed(speed))
    }
}
