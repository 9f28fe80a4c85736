//! Non-blocking, non-reentrant admission flags guarding the sell and buy
//! actions.

use std::sync::Mutex;

use crate::types::RobotId;

/// Binary flag recording which robot, if any, currently holds it.
pub struct MutexFlag {
    name: &'static str,
    holder: Mutex<Option<RobotId>>,
}

impl MutexFlag {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            holder: Mutex::new(None),
        }
    }

    /// Take the flag for `robot` if it is clear. The returned guard releases
    /// it on drop, including during unwinding.
    pub fn try_hold(&self, robot: RobotId) -> Option<FlagGuard<'_>> {
        let mut guard = self.holder.lock().expect("flag mutex poisoned");
        if guard.is_some() {
            return None;
        }
        *guard = Some(robot);
        Some(FlagGuard { flag: self, robot })
    }

    /// Advisory only: may be stale by the time the caller acts on it.
    pub fn is_held(&self) -> bool {
        self.holder().is_some()
    }

    pub fn holder(&self) -> Option<RobotId> {
        *self.holder.lock().expect("flag mutex poisoned")
    }

    /// Clear the flag. Only the current holder may release it.
    pub fn release(&self, robot: RobotId) -> bool {
        let current = {
            let mut guard = self.holder.lock().expect("flag mutex poisoned");
            if *guard == Some(robot) {
                *guard = None;
                return true;
            }
            *guard
        };
        // The lock is dropped before asserting so a debug panic cannot poison it.
        match current {
            Some(owner) => {
                if !cfg!(debug_assertions) {
                    tracing::error!(
                        flag = self.name,
                        owner,
                        robot,
                        "release by non-owner"
                    );
                }
                debug_assert!(
                    false,
                    "{} flag release by non-owner: owner={owner} robot={robot}",
                    self.name
                );
                false
            }
            None => {
                if !cfg!(debug_assertions) {
                    tracing::error!(flag = self.name, robot, "release of a clear flag");
                }
                debug_assert!(false, "{} flag release while clear: robot={robot}", self.name);
                false
            }
        }
    }
}

/// Scoped hold on a [`MutexFlag`].
#[must_use = "the flag is released as soon as the guard is dropped"]
pub struct FlagGuard<'a> {
    flag: &'a MutexFlag,
    robot: RobotId,
}

impl FlagGuard<'_> {
    pub fn robot(&self) -> RobotId {
        self.robot
    }

    pub fn flag_name(&self) -> &'static str {
        self.flag.name
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.release(self.robot);
    }
}
