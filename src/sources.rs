//! Time, randomness and identity sources injected into a factory.
//!
//! The real implementations sleep the calling thread, draw from a seeded
//! `StdRng` and mint UUIDv4s. The deterministic ones let tests observe every
//! pause and force every random draw.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::types::UnitId;

/// Suspends the calling robot for a (speed-adjusted) duration.
pub trait Clock: Send + Sync {
    fn pause(&self, duration: Duration);
}

/// Random draws used by the bar harvest and FooBar assembly.
pub trait Entropy: Send + Sync {
    /// Uniform draw in `[low, high]`.
    fn uniform(&self, low: f64, high: f64) -> f64;
    /// Uniform draw in `[0, 1)`.
    fn unit(&self) -> f64;
}

/// Mints identities for newly harvested units.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> UnitId;
}

/// Wall-clock pauses via `thread::sleep`.
#[derive(Debug, Default)]
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Records requested pauses without sleeping.
#[derive(Debug, Default)]
pub struct RecordingClock {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, oldest first.
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().expect("clock mutex poisoned").clone()
    }

    pub fn clear(&self) {
        self.pauses.lock().expect("clock mutex poisoned").clear();
    }
}

impl Clock for RecordingClock {
    fn pause(&self, duration: Duration) {
        self.pauses
            .lock()
            .expect("clock mutex poisoned")
            .push(duration);
    }
}

/// `StdRng` behind a mutex so robot threads can share it.
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_os() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Entropy for SeededEntropy {
    fn uniform(&self, low: f64, high: f64) -> f64 {
        self.rng
            .lock()
            .expect("entropy mutex poisoned")
            .gen_range(low..=high)
    }

    fn unit(&self) -> f64 {
        self.rng
            .lock()
            .expect("entropy mutex poisoned")
            .gen_range(0.0..1.0)
    }
}

/// Returns the same draw for every request.
///
/// `uniform` clamps the draw into the requested range.
#[derive(Debug)]
pub struct FixedEntropy {
    draw: Mutex<f64>,
}

impl FixedEntropy {
    pub fn new(draw: f64) -> Self {
        Self {
            draw: Mutex::new(draw),
        }
    }

    pub fn set(&self, draw: f64) {
        *self.draw.lock().expect("entropy mutex poisoned") = draw;
    }

    fn current(&self) -> f64 {
        *self.draw.lock().expect("entropy mutex poisoned")
    }
}

impl Entropy for FixedEntropy {
    fn uniform(&self, low: f64, high: f64) -> f64 {
        self.current().clamp(low, high)
    }

    fn unit(&self) -> f64 {
        self.current()
    }
}

#[derive(Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> UnitId {
        Uuid::new_v4()
    }
}

/// Counter-backed ids: 1, 2, 3... encoded as UUIDs.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> UnitId {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(n as u128)
    }
}
