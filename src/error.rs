//! Errors raised while setting up or running a factory.

use crate::types::RobotId;

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("speed multiplier must be finite and > 0, got {0}")]
    InvalidSpeed(f64),

    #[error("a factory needs at least one robot to start")]
    NoRobots,

    #[error("cannot start with {requested} robots, the population cap is {cap}")]
    TooManyRobots { requested: usize, cap: usize },

    #[error("failed to spawn robot thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("robot {0} panicked")]
    RobotPanicked(RobotId),
}
