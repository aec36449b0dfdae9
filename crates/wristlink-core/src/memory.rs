//! In-memory collaborators
//!
//! Deterministic stand-ins for the home server, the local datastore and the
//! outbound sink. The simulator wires an endpoint out of these and the test
//! suites use them to observe what the router did.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use async_trait::async_trait;
use core::sync::atomic::{AtomicBool, Ordering};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use crate::assist::{AssistEvent, AssistRequest};
use crate::collaborators::{HomeServer, LocalStore, MessageSink, ServerDirectory};
use crate::errors::{ServiceError, TransportError};
use crate::records::{
    Action, MagicItem, MagicItemInfo, PipelineListing, PushActionInfo, ServiceCall, WatchConfig,
};
use crate::wire::WireMessage;

// ----------------------------------------------------------------------------
// Local Store
// ----------------------------------------------------------------------------

/// Read-only datastore built up front
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    config: Option<WatchConfig>,
    actions: BTreeMap<String, Action>,
    infos: BTreeMap<String, MagicItemInfo>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.insert(action.id.clone(), action);
        self
    }

    pub fn with_info(mut self, info: MagicItemInfo) -> Self {
        self.infos.insert(info.id.clone(), info);
        self
    }
}

impl LocalStore for MemoryStore {
    fn watch_config(&self) -> Option<WatchConfig> {
        self.config.clone()
    }

    fn action(&self, action_id: &str) -> Option<Action> {
        self.actions.get(action_id).cloned()
    }

    fn magic_item_info(&self, item: &MagicItem) -> Option<MagicItemInfo> {
        self.infos.get(&item.id).cloned()
    }
}

// ----------------------------------------------------------------------------
// Home Server
// ----------------------------------------------------------------------------

/// Scripted home server that records everything it is asked to do
#[derive(Default)]
pub struct MemoryHomeServer {
    calls: Mutex<Vec<ServiceCall>>,
    push_actions: Mutex<Vec<PushActionInfo>>,
    assist_requests: Mutex<Vec<AssistRequest>>,
    pipelines: Option<PipelineListing>,
    assist_script: Vec<AssistEvent>,
    reject_calls: AtomicBool,
}

impl MemoryHomeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipelines(mut self, listing: PipelineListing) -> Self {
        self.pipelines = Some(listing);
        self
    }

    /// Events every assist run will stream back
    pub fn with_assist_script(mut self, events: Vec<AssistEvent>) -> Self {
        self.assist_script = events;
        self
    }

    /// Make subsequent service calls fail
    pub fn reject_calls(&self, reject: bool) {
        self.reject_calls.store(reject, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().await.clone()
    }

    pub async fn push_actions(&self) -> Vec<PushActionInfo> {
        self.push_actions.lock().await.clone()
    }

    pub async fn assist_requests(&self) -> Vec<AssistRequest> {
        self.assist_requests.lock().await.clone()
    }
}

#[async_trait]
impl HomeServer for MemoryHomeServer {
    async fn call_service(&self, call: ServiceCall) -> Result<(), ServiceError> {
        if self.reject_calls.load(Ordering::SeqCst) {
            return Err(ServiceError::Rejected {
                domain: call.domain,
                service: call.service,
                reason: "rejected by test server".to_string(),
            });
        }
        self.calls.lock().await.push(call);
        Ok(())
    }

    async fn handle_push_action(&self, info: PushActionInfo) -> Result<(), ServiceError> {
        self.push_actions.lock().await.push(info);
        Ok(())
    }

    async fn fetch_pipelines(&self) -> Result<Option<PipelineListing>, ServiceError> {
        Ok(self.pipelines.clone())
    }

    async fn run_assist(
        &self,
        request: AssistRequest,
    ) -> Result<BoxStream<'static, AssistEvent>, ServiceError> {
        self.assist_requests.lock().await.push(request);
        Ok(stream::iter(self.assist_script.clone()).boxed())
    }
}

// ----------------------------------------------------------------------------
// Server Directory
// ----------------------------------------------------------------------------

/// Fixed mapping of server ids to servers
#[derive(Default, Clone)]
pub struct MemoryDirectory {
    servers: BTreeMap<String, Arc<dyn HomeServer>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server_id: impl Into<String>, server: Arc<dyn HomeServer>) -> Self {
        self.servers.insert(server_id.into(), server);
        self
    }
}

impl ServerDirectory for MemoryDirectory {
    fn server(&self, server_id: &str) -> Option<Arc<dyn HomeServer>> {
        self.servers.get(server_id).cloned()
    }
}

// ----------------------------------------------------------------------------
// Message Sink
// ----------------------------------------------------------------------------

/// Sink that keeps every delivered message
#[derive(Default)]
pub struct CollectingSink {
    delivered: Mutex<Vec<WireMessage>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<WireMessage> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl MessageSink for CollectingSink {
    async fn deliver(&self, message: WireMessage) -> Result<(), TransportError> {
        self.delivered.lock().await.push(message);
        Ok(())
    }
}
