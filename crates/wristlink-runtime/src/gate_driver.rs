//! Completion gate driver
//!
//! Executes the actions of the core `CompletionGate`: completes platform
//! background tasks and runs one tokio sleep per drain cycle as the watchdog.
//! A watchdog is aborted as soon as its cycle resolves; if it fires anyway the
//! gate discards the stale cycle number.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use wristlink_core::{BackgroundTask, CompletionGate, GateAction, GateActions};

/// Receives the cycle numbers of fired watchdogs
pub type WatchdogReceiver = mpsc::UnboundedReceiver<u64>;

type Task = Box<dyn BackgroundTask>;

pub struct GateDriver {
    gate: CompletionGate<Task>,
    watchdog: Option<(u64, JoinHandle<()>)>,
    fired: mpsc::UnboundedSender<u64>,
}

impl GateDriver {
    pub fn new(watchdog_interval: Duration) -> (Self, WatchdogReceiver) {
        let (fired, receiver) = mpsc::unbounded_channel();
        (
            Self {
                gate: CompletionGate::new(watchdog_interval),
                watchdog: None,
                fired,
            },
            receiver,
        )
    }

    /// Tasks waiting for the current cycle
    pub fn waiting(&self) -> usize {
        self.gate.waiting()
    }

    pub fn request(&mut self, task: Task, has_pending: bool) {
        debug!("Background task '{}' requested, pending: {}", task.label(), has_pending);
        let actions = self.gate.request(task, has_pending);
        self.apply(actions, true);
    }

    pub fn data_received(&mut self, has_pending: bool) {
        let actions = self.gate.data_received(has_pending);
        self.apply(actions, true);
    }

    pub fn watchdog_fired(&mut self, cycle: u64) {
        let actions = self.gate.watchdog_fired(cycle);
        self.apply(actions, false);
    }

    fn apply(&mut self, actions: GateActions<Task>, drained: bool) {
        for action in actions {
            match action {
                GateAction::Complete(task) => {
                    debug!("Completing background task '{}'", task.label());
                    task.set_task_completed(drained);
                }
                GateAction::ArmWatchdog { cycle, after } => {
                    let fired = self.fired.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = fired.send(cycle);
                    });
                    if let Some((_, previous)) = self.watchdog.replace((cycle, handle)) {
                        previous.abort();
                    }
                }
                GateAction::DisarmWatchdog { cycle } => {
                    if let Some((armed, handle)) = self.watchdog.take() {
                        if armed == cycle {
                            handle.abort();
                        } else {
                            self.watchdog = Some((armed, handle));
                        }
                    }
                }
            }
        }
    }
}
