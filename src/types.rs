//! Shared identifiers and the resource units robots produce and trade.

use std::fmt;

use uuid::Uuid;

/// Ordinal identifier of a robot, assigned when it joins the factory.
pub type RobotId = u64;
/// Unique identity of a single Foo or Bar unit.
pub type UnitId = Uuid;

/// Raw material mined by `harvest_foo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Foo {
    pub id: UnitId,
}

impl Foo {
    pub fn new(id: UnitId) -> Self {
        Self { id }
    }
}

/// Raw material mined by `harvest_bar`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bar {
    pub id: UnitId,
}

impl Bar {
    pub fn new(id: UnitId) -> Self {
        Self { id }
    }
}

/// Product assembled from exactly one Foo and one Bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FooBar {
    /// Identity of the Foo consumed by the assembly.
    pub foo: UnitId,
    /// Identity of the Bar consumed by the assembly.
    pub bar: UnitId,
}

impl FooBar {
    pub fn assemble(foo: Foo, bar: Bar) -> Self {
        Self {
            foo: foo.id,
            bar: bar.id,
        }
    }
}

impl fmt::Display for FooBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.foo, self.bar)
    }
}

/// Kind of action a robot performs; switching kinds costs retooling time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activity {
    HarvestFoo,
    HarvestBar,
    CreateFooBar,
    SellFooBar,
    BuyRobot,
}

impl Activity {
    pub fn name(self) -> &'static str {
        match self {
            Activity::HarvestFoo => "harvest_foo",
            Activity::HarvestBar => "harvest_bar",
            Activity::CreateFooBar => "create_foobar",
            Activity::SellFooBar => "sell_foobar",
            Activity::BuyRobot => "buy_robot",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foobar_keeps_source_identities() {
        let foo = Foo::new(Uuid::from_u128(1));
        let bar = Bar::new(Uuid::from_u128(2));
        let foobar = FooBar::assemble(foo, bar);
        assert_eq!(foobar.foo, foo.id);
        assert_eq!(foobar.bar, bar.id);
        assert_eq!(foobar.to_string(), format!("{} - {}", foo.id, bar.id));
    }
}
