//! Runs every robot on its own thread until the population cap halts the
//! factory.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ROBOT_MAX_NUMBER;
use crate::error::FactoryError;
use crate::factory::Factory;
use crate::robot::{Robot, SpawnRequest};
use crate::types::RobotId;

// Wall-clock interval between halt checks while no robot is being bought.
const HALT_POLL_MS: u64 = 100;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut usage: rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Factory state once every robot thread has exited.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub robots: usize,
    pub account: u64,
    pub foo: usize,
    pub bar: usize,
    pub foobar: usize,
    pub elapsed: Duration,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
}

/// Owns robot threads: starts the initial staff, starts every bought robot,
/// and joins them all once the factory halts.
pub struct Scheduler {
    factory: Arc<Factory>,
    handles: Vec<(RobotId, thread::JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(factory: Arc<Factory>) -> Self {
        Self {
            factory,
            handles: Vec::new(),
        }
    }

    /// Enroll `initial_robots`, run until the cap is reached, then wait for
    /// every robot to finish its in-flight action.
    pub fn run(mut self, initial_robots: usize) -> Result<RunReport, FactoryError> {
        if initial_robots == 0 {
            return Err(FactoryError::NoRobots);
        }
        if initial_robots >= ROBOT_MAX_NUMBER {
            return Err(FactoryError::TooManyRobots {
                requested: initial_robots,
                cap: ROBOT_MAX_NUMBER,
            });
        }

        let (spawn_tx, spawn_rx) = mpsc::channel::<SpawnRequest>();
        let cpu_start = cpu_times_seconds();
        let start = Instant::now();

        let staff: Vec<Robot> = (0..initial_robots)
            .map(|_| Robot::new(&self.factory))
            .collect();
        for robot in &staff {
            self.factory.enroll(robot);
        }
        for robot in staff {
            self.launch(robot, &spawn_tx)?;
        }
        tracing::info!(robots = initial_robots, speed = self.factory.speed(), "factory started");

        let poll = Duration::from_millis(HALT_POLL_MS);
        loop {
            match spawn_rx.recv_timeout(poll) {
                Ok(request) => {
                    let robot = request.into_robot();
                    if robot.is_stopped() {
                        // Registered just before the cap; it never starts.
                        continue;
                    }
                    self.launch(robot, &spawn_tx)?;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.factory.is_halted() {
                        break;
                    }
                    // Robots only exit once stopped, so an early exit is a panic.
                    if self.handles.iter().any(|(_, handle)| handle.is_finished()) {
                        tracing::error!("robot thread exited before the factory halted");
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        drop(spawn_tx);
        // After a panic the cap was never reached; stop the survivors so the
        // joins below return.
        self.factory.abort();

        let mut failure = None;
        for (id, handle) in self.handles.drain(..) {
            if handle.join().is_err() && failure.is_none() {
                failure = Some(FactoryError::RobotPanicked(id));
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
            (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
                (Some(user_end - user_start), Some(sys_end - sys_start))
            }
            _ => (None, None),
        };
        let factory = &self.factory;
        Ok(RunReport {
            robots: factory.robot_count(),
            account: factory.account().balance(),
            foo: factory.foo().len(),
            bar: factory.bar().len(),
            foobar: factory.foobar().len(),
            elapsed: start.elapsed(),
            cpu_user_s,
            cpu_sys_s,
        })
    }

    fn launch(
        &mut self,
        robot: Robot,
        spawn_tx: &mpsc::Sender<SpawnRequest>,
    ) -> Result<(), FactoryError> {
        let id = robot.id();
        let spawn_tx = spawn_tx.clone();
        let handle = thread::Builder::new()
            .name(format!("robot-{id}"))
            .spawn(move || {
                robot.run(|request| {
                    // The scheduler only stops listening once the factory has
                    // halted, and by then every robot is stopped.
                    let _ = spawn_tx.send(request);
                })
            })?;
        self.handles.push((id, handle));
        Ok(())
    }
}
