//! Robot decision loop and the actions it can perform.
//!
//! A robot owns nothing but its activity marker and stop flag. Every rule is
//! evaluated against the shared [`Factory`], and every action re-checks its
//! preconditions before touching stock, since other robots may have run in
//! between.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{
    BAR_MINING_MAX_DELAY, BAR_MINING_MIN_DELAY, FOO_MINING_DELAY, FOOBAR_CREATION_DELAY,
    FOOBAR_PRICE, FOOBAR_SELL_DELAY, FOOBAR_SELL_MAX, FOOBAR_SELL_MIN, FOOBAR_SUCCESS_RATE,
    ROBOT_COST_EUROS, ROBOT_COST_FOO, SWITCH_ACTIVITY_DELAY,
};
use crate::factory::{Enlistment, Factory};
use crate::flags::FlagGuard;
use crate::types::{Activity, FooBar, RobotId};

/// Enough money and Foo to buy a robot, and nobody else is buying.
pub fn must_buy_robot(factory: &Factory) -> bool {
    factory.account().balance() >= ROBOT_COST_EUROS
        && factory.foo().len() >= ROBOT_COST_FOO
        && !factory.buy_lock().is_held()
}

/// Not enough Foo in stock to buy a robot.
pub fn must_harvest_foo(factory: &Factory) -> bool {
    factory.foo().len() < ROBOT_COST_FOO
}

/// A batch of FooBar is waiting and nobody else is selling.
pub fn must_sell_foobar(factory: &Factory) -> bool {
    factory.foobar().len() >= FOOBAR_SELL_MIN && !factory.sell_lock().is_held()
}

pub fn must_create_foobar(factory: &Factory) -> bool {
    !factory.foo().is_empty() && !factory.bar().is_empty()
}

/// Pick the highest-priority activity whose condition holds right now.
pub fn decide(factory: &Factory) -> Activity {
    if must_buy_robot(factory) {
        Activity::BuyRobot
    } else if must_harvest_foo(factory) {
        Activity::HarvestFoo
    } else if must_sell_foobar(factory) {
        Activity::SellFooBar
    } else if must_create_foobar(factory) {
        Activity::CreateFooBar
    } else {
        Activity::HarvestBar
    }
}

/// Result of a `create_foobar` attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assembly {
    /// Foo or Bar ran out before the robot could take them.
    Skipped,
    Assembled,
    /// The Bar went back to stock; the Foo is lost.
    Failed,
}

/// A robot bought and registered by `buy_robot` that still has to be started.
pub struct SpawnRequest {
    robot: Robot,
}

impl SpawnRequest {
    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn into_robot(self) -> Robot {
        self.robot
    }
}

pub struct Robot {
    id: RobotId,
    factory: Arc<Factory>,
    activity: Activity,
    stop: Arc<AtomicBool>,
}

impl Robot {
    /// A new robot bound to `factory`. Not registered until enrolled or added.
    pub fn new(factory: &Arc<Factory>) -> Self {
        Self {
            id: factory.next_robot_id(),
            factory: Arc::clone(factory),
            activity: Activity::HarvestFoo,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> RobotId {
        self.id
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Request termination. Idempotent; honoured at the top of the loop.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Decide and act until stopped, handing every bought robot to `on_spawn`.
    pub fn run(mut self, mut on_spawn: impl FnMut(SpawnRequest)) {
        tracing::debug!(robot = self.id, "robot started");
        while !self.is_stopped() {
            if let Some(request) = self.step() {
                on_spawn(request);
            }
        }
        tracing::debug!(robot = self.id, "robot stopped");
    }

    /// Run one decision: evaluate the rules, then perform the chosen action.
    pub fn step(&mut self) -> Option<SpawnRequest> {
        let next = decide(&self.factory);
        tracing::trace!(robot = self.id, activity = %next, "decided");
        match next {
            Activity::BuyRobot => {
                let factory = Arc::clone(&self.factory);
                let Some(hold) = factory.buy_lock().try_hold(self.id) else {
                    tracing::debug!(robot = self.id, "buy flag taken, skipping");
                    return None;
                };
                self.buy_robot(&hold)
            }
            Activity::HarvestFoo => {
                self.harvest_foo();
                None
            }
            Activity::SellFooBar => {
                let factory = Arc::clone(&self.factory);
                let Some(hold) = factory.sell_lock().try_hold(self.id) else {
                    tracing::debug!(robot = self.id, "sell flag taken, skipping");
                    return None;
                };
                self.sell_foobar(&hold);
                None
            }
            Activity::CreateFooBar => {
                self.create_foobar();
                None
            }
            Activity::HarvestBar => {
                self.harvest_bar();
                None
            }
        }
    }

    /// Pay the retooling delay if `next` differs from the current activity.
    /// Returns whether the delay was paid.
    pub fn retool(&mut self, next: Activity) -> bool {
        if self.activity == next {
            return false;
        }
        tracing::debug!(robot = self.id, from = %self.activity, to = %next, "switching activity");
        self.factory.wait(SWITCH_ACTIVITY_DELAY);
        self.activity = next;
        true
    }

    pub fn harvest_foo(&mut self) {
        self.retool(Activity::HarvestFoo);
        self.factory.wait(FOO_MINING_DELAY);
        let foo = self.factory.mint_foo();
        self.factory.foo().put(foo);
        self.report(Activity::HarvestFoo);
    }

    pub fn harvest_bar(&mut self) {
        self.retool(Activity::HarvestBar);
        let delay = self
            .factory
            .entropy()
            .uniform(BAR_MINING_MIN_DELAY, BAR_MINING_MAX_DELAY);
        self.factory.wait(delay);
        let bar = self.factory.mint_bar();
        self.factory.bar().put(bar);
        self.report(Activity::HarvestBar);
    }

    pub fn create_foobar(&mut self) -> Assembly {
        self.retool(Activity::CreateFooBar);
        if self.factory.foo().is_empty() || self.factory.bar().is_empty() {
            tracing::debug!(robot = self.id, "no foo or bar left, skipping assembly");
            return Assembly::Skipped;
        }
        // Foo before Bar, the only pairing order used anywhere.
        let Some((foo, bar)) = self.factory.foo().take_with(self.factory.bar()) else {
            tracing::debug!(robot = self.id, "stock taken by another robot, skipping assembly");
            return Assembly::Skipped;
        };

        self.factory.wait(FOOBAR_CREATION_DELAY);
        let outcome = if self.factory.entropy().unit() <= FOOBAR_SUCCESS_RATE {
            self.factory.foobar().put(FooBar::assemble(foo, bar));
            Assembly::Assembled
        } else {
            self.factory.bar().put(bar);
            Assembly::Failed
        };
        self.report(Activity::CreateFooBar);
        outcome
    }

    /// Sell up to five FooBar. Returns how many were sold.
    pub fn sell_foobar(&mut self, hold: &FlagGuard<'_>) -> usize {
        debug_assert_eq!(hold.flag_name(), "sell", "selling requires the sell flag");
        debug_assert_eq!(hold.robot(), self.id, "sell flag held by another robot");
        self.retool(Activity::SellFooBar);
        self.factory.wait(FOOBAR_SELL_DELAY);
        let mut sold = 0;
        while sold < FOOBAR_SELL_MAX {
            if self.factory.foobar().try_take().is_none() {
                break;
            }
            self.factory.account().credit(FOOBAR_PRICE);
            sold += 1;
        }
        self.report(Activity::SellFooBar);
        sold
    }

    /// Spend money and Foo on a new robot and register it. The caller is
    /// responsible for starting the returned robot.
    pub fn buy_robot(&mut self, hold: &FlagGuard<'_>) -> Option<SpawnRequest> {
        debug_assert_eq!(hold.flag_name(), "buy", "buying requires the buy flag");
        debug_assert_eq!(hold.robot(), self.id, "buy flag held by another robot");
        self.retool(Activity::BuyRobot);
        let factory = Arc::clone(&self.factory);
        if factory.account().balance() < ROBOT_COST_EUROS
            || factory.foo().len() < ROBOT_COST_FOO
        {
            tracing::debug!(robot = self.id, "cannot afford a robot anymore, skipping");
            return None;
        }
        if factory.foo().take_many(ROBOT_COST_FOO).is_none() {
            tracing::debug!(robot = self.id, "foo taken by another robot, skipping purchase");
            return None;
        }
        // Only the buy flag holder debits, so the re-checked balance still holds.
        assert!(
            factory.account().debit(ROBOT_COST_EUROS),
            "account overdrawn while robot {} held the buy flag",
            self.id
        );

        let robot = Robot::new(&factory);
        let outcome = match factory.add_robot(&robot) {
            Enlistment::Active(_) => Some(SpawnRequest { robot }),
            Enlistment::CapReached | Enlistment::Refused => None,
        };
        self.report(Activity::BuyRobot);
        outcome
    }

    fn report(&self, activity: Activity) {
        if self.is_stopped() {
            return;
        }
        tracing::info!("{self} did {activity}");
        tracing::debug!("{}", self.factory);
    }

    #[cfg(test)]
    fn set_activity_for_test(&mut self, activity: Activity) {
        self.activity = activity;
    }
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Robot {}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FixedEntropy, RecordingClock, SequentialIds};
    use crate::types::{Bar, Foo};
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        factory: Arc<Factory>,
        clock: Arc<RecordingClock>,
        entropy: Arc<FixedEntropy>,
        robot: Robot,
    }

    /// Factory at speed 1 with one registered robot and deterministic sources.
    fn fixture() -> Fixture {
        let clock = Arc::new(RecordingClock::new());
        let entropy = Arc::new(FixedEntropy::new(0.5));
        let factory = Factory::builder(1.0)
            .clock(clock.clone())
            .entropy(entropy.clone())
            .ids(Arc::new(SequentialIds::new()))
            .build()
            .expect("valid speed");
        let robot = Robot::new(&factory);
        factory.enroll(&robot);
        Fixture {
            factory,
            clock,
            entropy,
            robot,
        }
    }

    fn unit(n: u128) -> Uuid {
        Uuid::from_u128(1000 + n)
    }

    fn stock_foo(factory: &Factory, count: usize) {
        for n in 0..count {
            factory.foo().put(Foo::new(unit(n as u128)));
        }
    }

    fn stock_foobar(factory: &Factory, count: usize) {
        for n in 0..count {
            let n = n as u128 * 2;
            factory
                .foobar()
                .put(FooBar::assemble(Foo::new(unit(n)), Bar::new(unit(n + 1))));
        }
    }

    fn secs(value: f64) -> Duration {
        Duration::from_secs_f64(value)
    }

    #[test]
    fn starts_harvesting_foo() {
        let f = fixture();
        assert_eq!(f.robot.activity(), Activity::HarvestFoo);
        assert_eq!(f.robot.to_string(), "Robot 0");
    }

    #[test]
    fn stop_is_idempotent() {
        let f = fixture();
        assert!(!f.robot.is_stopped());
        f.robot.stop();
        assert!(f.robot.is_stopped());
        f.robot.stop();
        assert!(f.robot.is_stopped());
        assert_eq!(f.factory.stopped_flags(), vec![true]);
    }

    #[test]
    fn retool_same_activity_is_free() {
        let mut f = fixture();
        assert!(!f.robot.retool(Activity::HarvestFoo));
        assert_eq!(f.robot.activity(), Activity::HarvestFoo);
        assert!(f.clock.pauses().is_empty());
    }

    #[test]
    fn retool_new_activity_pays_penalty_once() {
        let mut f = fixture();
        assert!(f.robot.retool(Activity::HarvestBar));
        assert_eq!(f.robot.activity(), Activity::HarvestBar);
        assert!(!f.robot.retool(Activity::HarvestBar));
        assert_eq!(f.clock.pauses(), vec![secs(5.0)]);
    }

    #[test]
    fn retool_penalty_scales_with_speed() {
        let clock = Arc::new(RecordingClock::new());
        let factory = Factory::builder(10.0)
            .clock(clock.clone())
            .build()
            .expect("valid speed");
        let mut robot = Robot::new(&factory);
        robot.retool(Activity::SellFooBar);
        assert_eq!(clock.pauses(), vec![secs(0.5)]);
    }

    #[test]
    fn harvest_foo_when_stock_is_low() {
        let f = fixture();
        assert!(must_harvest_foo(&f.factory));
        assert_eq!(decide(&f.factory), Activity::HarvestFoo);
        stock_foo(&f.factory, ROBOT_COST_FOO);
        assert!(!must_harvest_foo(&f.factory));
    }

    #[test]
    fn harvest_foo_adds_one_foo() {
        let mut f = fixture();
        f.robot.harvest_foo();
        assert!(f.factory.foo().try_take().is_some());
        assert!(f.factory.foo().is_empty());
        assert_eq!(f.clock.pauses(), vec![secs(1.0)]);
    }

    #[test]
    fn harvest_bar_waits_within_range() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::HarvestBar);
        f.entropy.set(1.25);
        f.robot.harvest_bar();
        assert!(f.factory.bar().try_take().is_some());
        assert!(f.factory.bar().is_empty());
        let pauses = f.clock.pauses();
        assert_eq!(pauses.len(), 1);
        assert!(pauses[0] >= secs(0.5) && pauses[0] <= secs(2.0));
    }

    #[test]
    fn create_foobar_requires_both_units() {
        let f = fixture();
        f.factory.bar().put(Bar::new(unit(1)));
        assert!(!must_create_foobar(&f.factory));
        f.factory.foo().put(Foo::new(unit(2)));
        assert!(must_create_foobar(&f.factory));
    }

    #[test]
    fn create_foobar_success() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::CreateFooBar);
        let (foo, bar) = (Foo::new(unit(1)), Bar::new(unit(2)));
        f.factory.foo().put(foo);
        f.factory.bar().put(bar);
        f.entropy.set(0.5);

        assert_eq!(f.robot.create_foobar(), Assembly::Assembled);

        assert!(f.factory.foo().is_empty());
        assert!(f.factory.bar().is_empty());
        let foobar = f.factory.foobar().try_take().expect("one foobar");
        assert!(f.factory.foobar().is_empty());
        assert_eq!(foobar.to_string(), format!("{} - {}", foo.id, bar.id));
        assert_eq!(f.factory.account().balance(), 0);
        assert_eq!(f.clock.pauses(), vec![secs(2.0)]);
    }

    #[test]
    fn create_foobar_failure_loses_the_foo() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::CreateFooBar);
        let bar = Bar::new(unit(2));
        f.factory.foo().put(Foo::new(unit(1)));
        f.factory.bar().put(bar);
        f.entropy.set(0.7);

        assert_eq!(f.robot.create_foobar(), Assembly::Failed);

        assert!(f.factory.foo().is_empty());
        assert!(f.factory.foobar().is_empty());
        assert_eq!(f.factory.bar().try_take(), Some(bar));
        assert!(f.factory.bar().is_empty());
        assert_eq!(f.clock.pauses(), vec![secs(2.0)]);
    }

    #[test]
    fn create_foobar_without_foo_changes_nothing() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::CreateFooBar);
        f.factory.bar().put(Bar::new(unit(1)));
        assert_eq!(f.robot.create_foobar(), Assembly::Skipped);
        assert_eq!(f.factory.bar().len(), 1);
        assert!(f.clock.pauses().is_empty());
    }

    #[test]
    fn create_foobar_without_bar_changes_nothing() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::CreateFooBar);
        f.factory.foo().put(Foo::new(unit(1)));
        assert_eq!(f.robot.create_foobar(), Assembly::Skipped);
        assert_eq!(f.factory.foo().len(), 1);
    }

    #[test]
    fn sell_needs_three_foobar_and_a_free_flag() {
        let f = fixture();
        stock_foobar(&f.factory, 1);
        assert!(!must_sell_foobar(&f.factory));
        stock_foobar(&f.factory, 2);
        assert!(must_sell_foobar(&f.factory));

        let _hold = f.factory.sell_lock().try_hold(99).expect("flag is clear");
        assert!(!must_sell_foobar(&f.factory));
    }

    #[test]
    fn sell_foobar_sells_at_most_five() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::SellFooBar);
        stock_foobar(&f.factory, 7);

        let factory = Arc::clone(&f.factory);
        let hold = factory.sell_lock().try_hold(f.robot.id()).expect("flag is clear");
        assert_eq!(f.robot.sell_foobar(&hold), 5);
        drop(hold);

        assert_eq!(f.factory.account().balance(), 5);
        assert_eq!(f.factory.foobar().len(), 2);
        assert_eq!(f.clock.pauses(), vec![secs(10.0)]);
        assert!(!f.factory.sell_lock().is_held());
    }

    #[test]
    fn sell_foobar_stops_when_stock_runs_out() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::SellFooBar);
        stock_foobar(&f.factory, 2);
        let factory = Arc::clone(&f.factory);
        let hold = factory.sell_lock().try_hold(f.robot.id()).expect("flag is clear");
        assert_eq!(f.robot.sell_foobar(&hold), 2);
        assert_eq!(f.factory.account().balance(), 2);
        assert!(f.factory.foobar().is_empty());
    }

    #[test]
    fn buy_needs_money_foo_and_a_free_flag() {
        let f = fixture();
        f.factory.account().credit(3);
        stock_foo(&f.factory, 6);
        assert!(must_buy_robot(&f.factory));

        let hold = f.factory.buy_lock().try_hold(99).expect("flag is clear");
        assert!(!must_buy_robot(&f.factory));
        drop(hold);

        assert!(f.factory.account().debit(1));
        assert!(!must_buy_robot(&f.factory));
    }

    #[test]
    fn buy_needs_six_foo() {
        let f = fixture();
        f.factory.account().credit(3);
        stock_foo(&f.factory, 5);
        assert!(!must_buy_robot(&f.factory));
    }

    #[test]
    fn buy_robot_spends_and_registers() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::BuyRobot);
        f.factory.account().credit(5);
        stock_foo(&f.factory, 8);
        assert_eq!(f.factory.robot_count(), 1);

        let factory = Arc::clone(&f.factory);
        let hold = factory.buy_lock().try_hold(f.robot.id()).expect("flag is clear");
        let request = f.robot.buy_robot(&hold).expect("new robot to start");

        assert_eq!(f.factory.account().balance(), 2);
        assert_eq!(f.factory.foo().len(), 2);
        assert_eq!(f.factory.robot_count(), 2);
        assert_eq!(request.robot().id(), 1);
        assert!(!request.robot().is_stopped());
        assert!(f.clock.pauses().is_empty());
    }

    #[test]
    fn buy_robot_without_money_changes_nothing() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::BuyRobot);
        f.factory.account().credit(2);
        stock_foo(&f.factory, 8);

        let factory = Arc::clone(&f.factory);
        let hold = factory.buy_lock().try_hold(f.robot.id()).expect("flag is clear");
        assert!(f.robot.buy_robot(&hold).is_none());

        assert_eq!(f.factory.account().balance(), 2);
        assert_eq!(f.factory.foo().len(), 8);
        assert_eq!(f.factory.robot_count(), 1);
    }

    #[test]
    fn buy_robot_without_foo_changes_nothing() {
        let mut f = fixture();
        f.robot.set_activity_for_test(Activity::BuyRobot);
        f.factory.account().credit(6);
        stock_foo(&f.factory, 2);

        let factory = Arc::clone(&f.factory);
        let hold = factory.buy_lock().try_hold(f.robot.id()).expect("flag is clear");
        assert!(f.robot.buy_robot(&hold).is_none());

        assert_eq!(f.factory.account().balance(), 6);
        assert_eq!(f.factory.foo().len(), 2);
        assert_eq!(f.factory.robot_count(), 1);
    }

    #[test]
    fn decide_follows_priority_order() {
        let f = fixture();
        // Empty factory: not enough foo.
        assert_eq!(decide(&f.factory), Activity::HarvestFoo);

        // Enough foo, nothing else: default to bar.
        stock_foo(&f.factory, 6);
        assert_eq!(decide(&f.factory), Activity::HarvestBar);
        let _ = f.factory.foo().take_many(6);
        f.factory.bar().put(Bar::new(unit(1)));
        assert_eq!(decide(&f.factory), Activity::HarvestFoo);

        stock_foo(&f.factory, 6);
        assert_eq!(decide(&f.factory), Activity::CreateFooBar);

        // Selling outranks creating.
        stock_foobar(&f.factory, 3);
        assert_eq!(decide(&f.factory), Activity::SellFooBar);

        // Buying outranks everything once affordable.
        f.factory.account().credit(3);
        assert_eq!(decide(&f.factory), Activity::BuyRobot);

        // Someone else is buying: fall back to selling.
        let buying = f.factory.buy_lock().try_hold(42).expect("flag is clear");
        assert_eq!(decide(&f.factory), Activity::SellFooBar);

        // Someone else is selling too: create.
        let selling = f.factory.sell_lock().try_hold(43).expect("flag is clear");
        assert_eq!(decide(&f.factory), Activity::CreateFooBar);
        drop(selling);
        drop(buying);
    }

    #[test]
    fn decide_defaults_to_harvesting_bar() {
        let f = fixture();
        stock_foo(&f.factory, 6);
        assert_eq!(decide(&f.factory), Activity::HarvestBar);
    }

    #[test]
    fn step_creates_while_another_robot_sells() {
        let mut f = fixture();
        stock_foo(&f.factory, 6);
        stock_foobar(&f.factory, 3);
        assert_eq!(decide(&f.factory), Activity::SellFooBar);

        let _hold = f.factory.sell_lock().try_hold(7).expect("flag is clear");
        f.factory.bar().put(Bar::new(unit(1)));
        assert!(f.robot.step().is_none());
        assert_eq!(f.factory.foobar().len(), 3 + 1);
        assert_eq!(f.factory.account().balance(), 0);
    }

    #[test]
    fn step_buys_under_the_buy_flag() {
        let mut f = fixture();
        f.factory.account().credit(3);
        stock_foo(&f.factory, 6);

        let request = f.robot.step().expect("robot bought");
        assert_eq!(f.robot.activity(), Activity::BuyRobot);
        assert_eq!(f.factory.robot_count(), 2);
        assert_eq!(f.factory.account().balance(), 0);
        assert!(f.factory.foo().is_empty());
        assert!(!f.factory.buy_lock().is_held());
        assert_eq!(request.into_robot().activity(), Activity::HarvestFoo);
    }

    #[test]
    fn run_exits_immediately_when_stopped() {
        let f = fixture();
        f.robot.stop();
        let mut spawned = 0;
        f.robot.run(|_| spawned += 1);
        assert_eq!(spawned, 0);
        assert!(f.clock.pauses().is_empty());
    }
}
