//! Endpoint Builder API
//!
//! Collects the collaborators and configuration for a phone endpoint, wires
//! the router to the transport and spawns the endpoint task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use wristlink_core::{
    BackgroundActivity, LocalStore, NoopActivity, PairedTransport, Result, Router,
    ServerDirectory, SystemTimeSource, TimeSource, TransportSink, WristlinkConfig,
    WristlinkError,
};

use crate::endpoint::{EndpointHandle, PhoneEndpoint};
use crate::memory_transport::InboundQueue;

/// Builder for a phone endpoint
pub struct EndpointBuilder {
    config: WristlinkConfig,
    store: Option<Arc<dyn LocalStore>>,
    servers: Option<Arc<dyn ServerDirectory>>,
    activity: Arc<dyn BackgroundActivity>,
}

impl EndpointBuilder {
    pub fn new() -> Self {
        Self {
            config: WristlinkConfig::default(),
            store: None,
            servers: None,
            activity: Arc::new(NoopActivity),
        }
    }

    pub fn with_config(mut self, config: WristlinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_servers(mut self, servers: Arc<dyn ServerDirectory>) -> Self {
        self.servers = Some(servers);
        self
    }

    pub fn with_activity(mut self, activity: Arc<dyn BackgroundActivity>) -> Self {
        self.activity = activity;
        self
    }

    /// Spawn the endpoint using wall-clock time
    pub fn spawn<T: PairedTransport + 'static>(
        self,
        transport: Arc<T>,
        inbound: InboundQueue,
    ) -> Result<EndpointHandle> {
        self.spawn_with_clock(transport, inbound, SystemTimeSource)
    }

    /// Spawn the endpoint with an explicit time source for chunk session ages
    pub fn spawn_with_clock<T: PairedTransport + 'static, C: TimeSource + 'static>(
        self,
        transport: Arc<T>,
        inbound: InboundQueue,
        time_source: C,
    ) -> Result<EndpointHandle> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| WristlinkError::config_error("Endpoint needs a local store"))?;
        let servers = self
            .servers
            .ok_or_else(|| WristlinkError::config_error("Endpoint needs a server directory"))?;

        let sink = Arc::new(TransportSink::new(Arc::clone(&transport)));
        let router = Router::new(
            store,
            servers,
            sink,
            self.config.reassembly.clone(),
            time_source,
        )
        .with_activity(self.activity);

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let endpoint = PhoneEndpoint::new(
            Arc::new(router),
            transport,
            inbound,
            control_rx,
            self.config.gate.watchdog_interval(),
            self.config.reassembly.session_ttl(),
        );

        let task = tokio::spawn(endpoint.run());
        info!("Phone endpoint spawned");
        Ok(EndpointHandle::new(control_tx, task))
    }
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}
