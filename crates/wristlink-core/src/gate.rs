//! Background task completion gate
//!
//! The OS grants short background windows to refresh connectivity data. A
//! window must not be closed while the paired device still has inbound data
//! queued, but it must not stay open forever either. The gate parks tasks
//! until the inbound queue drains or a per-cycle watchdog fires, whichever is
//! first.
//!
//! This is a pure state machine: it returns `GateAction`s and leaves timers
//! and task completion to the runtime driver.

use core::time::Duration;
use smallvec::SmallVec;
use tracing::{debug, info};

/// Side effect requested by the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAction<T> {
    /// Mark the task completed
    Complete(T),
    /// Start the watchdog for a drain cycle
    ArmWatchdog { cycle: u64, after: Duration },
    /// Cancel the watchdog of a resolved cycle
    DisarmWatchdog { cycle: u64 },
}

/// Actions from a single gate transition
pub type GateActions<T> = SmallVec<[GateAction<T>; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Draining { cycle: u64 },
}

/// Defers task completion until inbound data has drained
#[derive(Debug)]
pub struct CompletionGate<T> {
    cycle: u64,
    phase: Phase,
    waiting: Vec<T>,
    watchdog_interval: Duration,
}

impl<T> CompletionGate<T> {
    pub fn new(watchdog_interval: Duration) -> Self {
        Self {
            cycle: 0,
            phase: Phase::Idle,
            waiting: Vec::new(),
            watchdog_interval,
        }
    }

    /// Current cycle number
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn is_draining(&self) -> bool {
        matches!(self.phase, Phase::Draining { .. })
    }

    /// Tasks parked on the current cycle
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    /// A background task arrived. Completes it at once when nothing is
    /// pending, otherwise parks it on the current drain cycle.
    pub fn request(&mut self, task: T, has_pending: bool) -> GateActions<T> {
        let mut actions = GateActions::new();
        if !has_pending {
            actions.push(GateAction::Complete(task));
            return actions;
        }

        self.waiting.push(task);
        if self.phase == Phase::Idle {
            self.phase = Phase::Draining { cycle: self.cycle };
            debug!("Gate cycle {} draining", self.cycle);
            actions.push(GateAction::ArmWatchdog {
                cycle: self.cycle,
                after: self.watchdog_interval,
            });
        }
        actions
    }

    /// Inbound data was delivered; resolves the cycle once nothing is pending
    pub fn data_received(&mut self, has_pending: bool) -> GateActions<T> {
        if has_pending {
            return GateActions::new();
        }
        self.resolve()
    }

    /// The watchdog for `cycle` fired. Stale firings are ignored.
    pub fn watchdog_fired(&mut self, cycle: u64) -> GateActions<T> {
        match self.phase {
            Phase::Draining { cycle: current } if current == cycle => {
                info!(
                    "Watchdog expired for gate cycle {}, completing {} task(s) early",
                    cycle,
                    self.waiting.len()
                );
                self.resolve()
            }
            _ => {
                debug!("Ignoring stale watchdog for gate cycle {}", cycle);
                GateActions::new()
            }
        }
    }

    // Tasks are only ever parked while draining, so an idle gate has nothing
    // to resolve.
    fn resolve(&mut self) -> GateActions<T> {
        let Phase::Draining { cycle } = self.phase else {
            return GateActions::new();
        };
        let mut actions: GateActions<T> = self.waiting.drain(..).map(GateAction::Complete).collect();
        actions.push(GateAction::DisarmWatchdog { cycle });
        debug!("Gate cycle {} resolved", cycle);
        self.phase = Phase::Idle;
        self.cycle += 1;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(10);

    fn completed(actions: &GateActions<&'static str>) -> Vec<&'static str> {
        actions
            .iter()
            .filter_map(|a| match a {
                GateAction::Complete(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_idle_completes_immediately() {
        let mut gate = CompletionGate::new(INTERVAL);
        let actions = gate.request("t1", false);
        assert_eq!(actions.as_slice(), &[GateAction::Complete("t1")]);
        assert!(!gate.is_draining());
    }

    #[test]
    fn test_pending_parks_until_drained() {
        let mut gate = CompletionGate::new(INTERVAL);
        let actions = gate.request("t1", true);
        assert_eq!(
            actions.as_slice(),
            &[GateAction::ArmWatchdog { cycle: 0, after: INTERVAL }]
        );

        // Second task joins the same cycle without a second watchdog
        assert!(gate.request("t2", true).is_empty());
        assert_eq!(gate.waiting(), 2);

        assert!(gate.data_received(true).is_empty());

        let actions = gate.data_received(false);
        assert_eq!(completed(&actions), vec!["t1", "t2"]);
        assert!(actions.contains(&GateAction::DisarmWatchdog { cycle: 0 }));
        assert_eq!(gate.cycle(), 1);
        assert!(!gate.is_draining());
    }

    #[test]
    fn test_watchdog_completes_parked_tasks() {
        let mut gate = CompletionGate::new(INTERVAL);
        gate.request("t1", true);
        let actions = gate.watchdog_fired(0);
        assert_eq!(completed(&actions), vec!["t1"]);
        assert_eq!(gate.waiting(), 0);
    }

    #[test]
    fn test_stale_watchdog_is_ignored() {
        let mut gate = CompletionGate::new(INTERVAL);
        gate.request("t1", true);
        gate.data_received(false);

        // Next cycle starts; the old watchdog must not resolve it
        gate.request("t2", true);
        assert!(gate.watchdog_fired(0).is_empty());
        assert_eq!(gate.waiting(), 1);
        assert_eq!(completed(&gate.watchdog_fired(1)), vec!["t2"]);
    }

    #[test]
    fn test_every_task_completed_exactly_once() {
        let mut gate = CompletionGate::new(INTERVAL);
        let mut done = Vec::new();
        done.extend(completed(&gate.request("a", true)));
        done.extend(completed(&gate.request("b", false)));
        done.extend(completed(&gate.data_received(false)));
        done.extend(completed(&gate.watchdog_fired(0)));
        done.extend(completed(&gate.data_received(false)));
        done.sort_unstable();
        assert_eq!(done, vec!["a", "b"]);
    }
}
