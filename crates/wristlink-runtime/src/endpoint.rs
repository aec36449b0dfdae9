//! Phone endpoint task
//!
//! A single tokio task owns the router, the completion gate and the listener
//! set. Inbound traffic, background task requests and watchdog expiries are
//! all handled on this task, one at a time, so chunk insertion and gate
//! transitions never interleave.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wristlink_core::{
    BackgroundTask, PairedTransport, Result, Router, TimeSource, WristlinkError,
};

use crate::gate_driver::{GateDriver, WatchdogReceiver};
use crate::listeners::{ListenerSet, MessageListener};
use crate::memory_transport::{InboundEvent, InboundQueue};

// ----------------------------------------------------------------------------
// Control Messages
// ----------------------------------------------------------------------------

/// Requests from the host application to the endpoint task
pub enum Control {
    /// The OS granted a background window
    BackgroundTask(Box<dyn BackgroundTask>),
    AddListener(Weak<dyn MessageListener>),
    Shutdown,
}

// ----------------------------------------------------------------------------
// Endpoint
// ----------------------------------------------------------------------------

/// Counters reported when the endpoint stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub requests: u64,
    pub replies: u64,
    pub messages: u64,
    pub blobs: u64,
}

pub struct PhoneEndpoint<C: TimeSource, T: PairedTransport> {
    router: Arc<Router<C>>,
    transport: Arc<T>,
    inbound: InboundQueue,
    control: mpsc::UnboundedReceiver<Control>,
    gate: GateDriver,
    watchdog: WatchdogReceiver,
    listeners: ListenerSet,
    eviction_interval: Duration,
    stats: EndpointStats,
}

impl<C: TimeSource + 'static, T: PairedTransport + 'static> PhoneEndpoint<C, T> {
    pub fn new(
        router: Arc<Router<C>>,
        transport: Arc<T>,
        inbound: InboundQueue,
        control: mpsc::UnboundedReceiver<Control>,
        watchdog_interval: Duration,
        eviction_interval: Duration,
    ) -> Self {
        let (gate, watchdog) = GateDriver::new(watchdog_interval);
        Self {
            router,
            transport,
            inbound,
            control,
            gate,
            watchdog,
            listeners: ListenerSet::new(),
            eviction_interval,
            stats: EndpointStats::default(),
        }
    }

    /// Run until shutdown or until the transport goes away
    pub async fn run(mut self) -> Result<EndpointStats> {
        info!("Phone endpoint starting");
        let mut eviction = tokio::time::interval(self.eviction_interval);
        eviction.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Host requests are taken before queued traffic
                biased;

                control = self.control.recv() => {
                    match control {
                        Some(Control::BackgroundTask(task)) => {
                            self.gate.request(task, self.transport.has_pending_inbound());
                        }
                        Some(Control::AddListener(listener)) => self.listeners.add(listener),
                        Some(Control::Shutdown) | None => {
                            info!("Phone endpoint shutting down");
                            break;
                        }
                    }
                }

                event = self.inbound.recv() => {
                    match event {
                        Some(event) => self.handle_inbound(event).await,
                        None => {
                            info!("Transport closed, stopping endpoint");
                            break;
                        }
                    }
                }

                Some(cycle) = self.watchdog.recv() => {
                    self.gate.watchdog_fired(cycle);
                }

                _ = eviction.tick() => {
                    let evicted = self.router.evict_stale_sessions().await;
                    if evicted > 0 {
                        debug!("Evicted {} stale chunk session(s)", evicted);
                    }
                }
            }
        }

        if self.gate.waiting() > 0 {
            warn!("{} background task(s) still parked at shutdown", self.gate.waiting());
        }
        Ok(self.stats)
    }

    async fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Request { message, reply } => {
                self.stats.requests += 1;
                self.listeners.notify(&message);
                match self.router.dispatch(&message).await {
                    Some(response) => {
                        self.stats.replies += 1;
                        if reply.send(response).is_err() {
                            debug!("Requester for {} went away", message.identifier);
                        }
                    }
                    // Dropping the reply sender tells the requester there is no reply
                    None => drop(reply),
                }
            }
            InboundEvent::Message(message) => {
                self.stats.messages += 1;
                self.listeners.notify(&message);
                self.router.dispatch_notification(&message).await;
            }
            InboundEvent::Blob(blob) => {
                self.stats.blobs += 1;
                self.listeners.notify(&blob.metadata);
                self.router.dispatch_blob(&blob).await;
            }
        }
        self.gate.data_received(self.transport.has_pending_inbound());
    }
}

// ----------------------------------------------------------------------------
// Endpoint Handle
// ----------------------------------------------------------------------------

/// Handle to a running phone endpoint
pub struct EndpointHandle {
    control: mpsc::UnboundedSender<Control>,
    task: Option<JoinHandle<Result<EndpointStats>>>,
}

impl EndpointHandle {
    pub(crate) fn new(
        control: mpsc::UnboundedSender<Control>,
        task: JoinHandle<Result<EndpointStats>>,
    ) -> Self {
        Self {
            control,
            task: Some(task),
        }
    }

    fn send(&self, control: Control) -> Result<()> {
        self.control
            .send(control)
            .map_err(|_| WristlinkError::channel_error("Phone endpoint is not running"))
    }

    /// Hand an OS background task to the completion gate
    pub fn begin_background_task(&self, task: Box<dyn BackgroundTask>) -> Result<()> {
        self.send(Control::BackgroundTask(task))
    }

    /// Register a listener; the endpoint holds it weakly
    pub fn add_listener(&self, listener: Weak<dyn MessageListener>) -> Result<()> {
        self.send(Control::AddListener(listener))
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the endpoint and wait for it to finish
    pub async fn shutdown(&mut self) -> Result<EndpointStats> {
        let _ = self.send(Control::Shutdown);
        match self.task.take() {
            Some(handle) => handle.await.map_err(|e| {
                WristlinkError::channel_error(format!("Endpoint task panicked: {}", e))
            })?,
            None => Ok(EndpointStats::default()),
        }
    }
}

