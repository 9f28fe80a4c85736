//! Shared state every robot reads and mutates: stocks, account, admission
//! flags and the roster.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{self, ROBOT_MAX_NUMBER, SimConfig};
use crate::error::FactoryError;
use crate::flags::MutexFlag;
use crate::robot::Robot;
use crate::scheduler::{RunReport, Scheduler};
use crate::shared_queue::SharedQueue;
use crate::sources::{Clock, Entropy, IdSource, RandomIds, SeededEntropy, ThreadClock};
use crate::types::{Bar, Foo, FooBar, RobotId};

/// Running balance in whole currency units. Never negative.
#[derive(Debug, Default)]
pub struct Account {
    balance: AtomicU64,
}

impl Account {
    pub fn new(balance: u64) -> Self {
        Self {
            balance: AtomicU64::new(balance),
        }
    }

    pub fn balance(&self) -> u64 {
        self.balance.load(Ordering::SeqCst)
    }

    pub fn credit(&self, amount: u64) {
        self.balance.fetch_add(amount, Ordering::SeqCst);
    }

    /// Withdraw `amount` if the balance covers it; otherwise leave it as is.
    pub fn debit(&self, amount: u64) -> bool {
        self.balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(amount)
            })
            .is_ok()
    }
}

/// Outcome of registering a robot with [`Factory::add_robot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enlistment {
    /// Registered below the cap; carries the new roster size.
    Active(usize),
    /// This registration filled the roster and halted the factory.
    CapReached,
    /// The factory had already halted; the robot was stopped, not added.
    Refused,
}

/// Human-readable progress notice for whoever drives the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Active(usize),
    CapReached,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Active(count) => write!(f, "{count} agents now active"),
            Progress::CapReached => f.write_str("population cap reached"),
        }
    }
}

/// Receives progress notices as they happen.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, progress: Progress);
}

/// Prints each notice on its own stdout line.
#[derive(Debug, Default)]
pub struct StdoutProgress;

impl ProgressSink for StdoutProgress {
    fn notify(&self, progress: Progress) {
        println!("{progress}");
    }
}

/// Forwards notices to the tracing subscriber only.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn notify(&self, progress: Progress) {
        tracing::info!("{progress}");
    }
}

impl ProgressSink for mpsc::Sender<Progress> {
    fn notify(&self, progress: Progress) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(progress);
    }
}

struct RosterEntry {
    id: RobotId,
    stop: Arc<AtomicBool>,
}

/// The factory every robot works for.
pub struct Factory {
    speed: f64,
    foo: SharedQueue<Foo>,
    bar: SharedQueue<Bar>,
    foobar: SharedQueue<FooBar>,
    account: Account,
    sell_lock: MutexFlag,
    buy_lock: MutexFlag,
    roster: Mutex<Vec<RosterEntry>>,
    halted: AtomicBool,
    next_robot_id: AtomicU64,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
    ids: Arc<dyn IdSource>,
    progress: Arc<dyn ProgressSink>,
}

/// Assembles a [`Factory`] with real or injected sources.
pub struct FactoryBuilder {
    speed: f64,
    clock: Option<Arc<dyn Clock>>,
    entropy: Option<Arc<dyn Entropy>>,
    ids: Option<Arc<dyn IdSource>>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl FactoryBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.entropy = Some(entropy);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Result<Arc<Factory>, FactoryError> {
        config::validate_speed(self.speed)?;
        Ok(Arc::new(Factory {
            speed: self.speed,
            foo: SharedQueue::new(),
            bar: SharedQueue::new(),
            foobar: SharedQueue::new(),
            account: Account::default(),
            sell_lock: MutexFlag::new("sell"),
            buy_lock: MutexFlag::new("buy"),
            roster: Mutex::new(Vec::new()),
            halted: AtomicBool::new(false),
            next_robot_id: AtomicU64::new(0),
            clock: self.clock.unwrap_or_else(|| Arc::new(ThreadClock)),
            entropy: self
                .entropy
                .unwrap_or_else(|| Arc::new(SeededEntropy::from_os())),
            ids: self.ids.unwrap_or_else(|| Arc::new(RandomIds)),
            progress: self.progress.unwrap_or_else(|| Arc::new(LogProgress)),
        }))
    }
}

impl Factory {
    pub fn builder(speed: f64) -> FactoryBuilder {
        FactoryBuilder {
            speed,
            clock: None,
            entropy: None,
            ids: None,
            progress: None,
        }
    }

    /// A factory with wall-clock pauses, OS-seeded randomness and UUIDv4 ids.
    pub fn new(speed: f64) -> Result<Arc<Self>, FactoryError> {
        Self::builder(speed).build()
    }

    /// A factory for a CLI run: validated settings, seeded entropy if asked.
    pub fn from_config(
        config: &SimConfig,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Arc<Self>, FactoryError> {
        config.validate()?;
        let entropy: Arc<dyn Entropy> = match config.seed {
            Some(seed) => Arc::new(SeededEntropy::from_seed(seed)),
            None => Arc::new(SeededEntropy::from_os()),
        };
        Self::builder(config.speed)
            .entropy(entropy)
            .progress(progress)
            .build()
    }

    /// Start `initial_robots` robots and block until the population cap halts
    /// the factory.
    pub fn run(self: &Arc<Self>, initial_robots: usize) -> Result<RunReport, FactoryError> {
        Scheduler::new(Arc::clone(self)).run(initial_robots)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn foo(&self) -> &SharedQueue<Foo> {
        &self.foo
    }

    pub fn bar(&self) -> &SharedQueue<Bar> {
        &self.bar
    }

    pub fn foobar(&self) -> &SharedQueue<FooBar> {
        &self.foobar
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn sell_lock(&self) -> &MutexFlag {
        &self.sell_lock
    }

    pub fn buy_lock(&self) -> &MutexFlag {
        &self.buy_lock
    }

    pub fn entropy(&self) -> &dyn Entropy {
        self.entropy.as_ref()
    }

    pub fn mint_foo(&self) -> Foo {
        Foo::new(self.ids.next_id())
    }

    pub fn mint_bar(&self) -> Bar {
        Bar::new(self.ids.next_id())
    }

    /// Suspend the calling robot for `units` of simulated time.
    pub fn wait(&self, units: f64) {
        // Very slow speeds saturate instead of overflowing `Duration`.
        let duration =
            Duration::try_from_secs_f64(units / self.speed).unwrap_or(Duration::MAX);
        self.clock.pause(duration);
    }

    pub(crate) fn next_robot_id(&self) -> RobotId {
        self.next_robot_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn robot_count(&self) -> usize {
        self.roster.lock().expect("roster mutex poisoned").len()
    }

    /// Ids of registered robots in join order.
    pub fn robot_ids(&self) -> Vec<RobotId> {
        let roster = self.roster.lock().expect("roster mutex poisoned");
        roster.iter().map(|entry| entry.id).collect()
    }

    /// Stopped flag of every registered robot, in join order.
    pub fn stopped_flags(&self) -> Vec<bool> {
        let roster = self.roster.lock().expect("roster mutex poisoned");
        roster
            .iter()
            .map(|entry| entry.stop.load(Ordering::SeqCst))
            .collect()
    }

    /// True once the roster has reached the population cap or the run was
    /// aborted. Never reverts.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Register a purchased robot and announce the new head count.
    pub fn add_robot(&self, robot: &Robot) -> Enlistment {
        let enlistment = self.register(robot);
        match enlistment {
            Enlistment::Active(count) => self.progress.notify(Progress::Active(count)),
            Enlistment::CapReached => self.progress.notify(Progress::CapReached),
            Enlistment::Refused => {}
        }
        enlistment
    }

    /// Register one of the starting robots without announcing it.
    pub fn enroll(&self, robot: &Robot) -> Enlistment {
        let enlistment = self.register(robot);
        if enlistment == Enlistment::CapReached {
            self.progress.notify(Progress::CapReached);
        }
        enlistment
    }

    fn register(&self, robot: &Robot) -> Enlistment {
        let mut roster = self.roster.lock().expect("roster mutex poisoned");
        if self.is_halted() {
            robot.stop();
            tracing::warn!(robot = robot.id(), "factory halted, registration refused");
            return Enlistment::Refused;
        }
        roster.push(RosterEntry {
            id: robot.id(),
            stop: robot.stop_flag(),
        });
        let count = roster.len();
        if count < ROBOT_MAX_NUMBER {
            tracing::debug!(robot = robot.id(), count, "robot registered");
            return Enlistment::Active(count);
        }

        self.halt(&roster);
        tracing::info!(count, "population cap reached, stopping all robots");
        Enlistment::CapReached
    }

    /// Halt without reaching the cap: used when the run is abandoned.
    pub(crate) fn abort(&self) {
        let roster = self.roster.lock().expect("roster mutex poisoned");
        if self.is_halted() {
            return;
        }
        self.halt(&roster);
        tracing::warn!(count = roster.len(), "factory aborted, stopping all robots");
    }

    // One-shot: every current member stops, later arrivals are refused.
    fn halt(&self, roster: &[RosterEntry]) {
        self.halted.store(true, Ordering::SeqCst);
        for entry in roster {
            entry.stop.store(true, Ordering::SeqCst);
        }
    }
}

impl fmt::Display for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "robots: {},\naccount: {},\nfoo: {},\nbar: {},\nfoobar: {}",
            self.robot_count(),
            self.account.balance(),
            self.foo.len(),
            self.bar.len(),
            self.foobar.len()
        )
    }
}
