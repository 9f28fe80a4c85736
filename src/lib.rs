//! A small economy of robots sharing one factory.
//!
//! Robots mine Foo and Bar, assemble FooBar, sell it, and buy more robots
//! until the roster reaches [`config::ROBOT_MAX_NUMBER`]. Selling and buying
//! are each limited to one robot at a time by a [`flags::MutexFlag`].

pub mod config;
pub mod error;
pub mod factory;
pub mod flags;
pub mod logging;
pub mod robot;
pub mod scheduler;
pub mod shared_queue;
pub mod sources;
pub mod types;

pub use config::SimConfig;
pub use error::FactoryError;
pub use factory::{Enlistment, Factory, Progress, ProgressSink, StdoutProgress};
pub use robot::{Robot, SpawnRequest};
pub use scheduler::{RunReport, Scheduler};
pub use types::{Activity, Bar, Foo, FooBar, RobotId};
