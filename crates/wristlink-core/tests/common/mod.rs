//! Shared fixtures for the core integration tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use wristlink_core::memory::{CollectingSink, MemoryDirectory, MemoryHomeServer, MemoryStore};
use wristlink_core::{
    Action, AssistEvent, Blob, ManualTimeSource, PairedTransport, Pipeline, PipelineListing,
    ReassemblyConfig, Router, TransportError, WireMessage,
};

/// Transport that hands watch traffic straight to a phone-side router
pub struct RouterTransport {
    pub router: Router<ManualTimeSource>,
    pub reachable: AtomicBool,
}

impl RouterTransport {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PairedTransport for RouterTransport {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn has_pending_inbound(&self) -> bool {
        false
    }

    async fn send_message(&self, message: WireMessage) -> Result<(), TransportError> {
        if !self.is_reachable() {
            return Err(TransportError::NotReachable);
        }
        if let Some(task) = self.router.dispatch_notification(&message).await {
            let _ = task.await;
        }
        Ok(())
    }

    async fn send_request(&self, message: WireMessage) -> Result<WireMessage, TransportError> {
        if !self.is_reachable() {
            return Err(TransportError::NotReachable);
        }
        self.router
            .dispatch(&message)
            .await
            .ok_or(TransportError::ReplyDropped {
                identifier: message.identifier,
            })
    }

    async fn transfer_blob(&self, blob: Blob) -> Result<(), TransportError> {
        if let Some(task) = self.router.dispatch_blob(&blob).await {
            let _ = task.await;
        }
        Ok(())
    }
}

/// Transport answering every request with a fixed reply
pub struct CannedTransport {
    pub reply: WireMessage,
}

#[async_trait]
impl PairedTransport for CannedTransport {
    fn is_reachable(&self) -> bool {
        true
    }

    fn has_pending_inbound(&self) -> bool {
        false
    }

    async fn send_message(&self, _message: WireMessage) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_request(&self, _message: WireMessage) -> Result<WireMessage, TransportError> {
        Ok(self.reply.clone())
    }

    async fn transfer_blob(&self, _blob: Blob) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct Fixture {
    pub transport: Arc<RouterTransport>,
    pub server: Arc<MemoryHomeServer>,
    pub sink: Arc<CollectingSink>,
}

pub fn goodnight() -> Action {
    Action {
        id: "a1".into(),
        name: "Goodnight".into(),
        server_id: "home".into(),
    }
}

pub fn fixture(store: MemoryStore) -> Fixture {
    let server = Arc::new(
        MemoryHomeServer::new()
            .with_pipelines(PipelineListing {
                pipelines: vec![Pipeline {
                    id: "p1".into(),
                    name: "Home Assist".into(),
                }],
                preferred_pipeline: "p1".into(),
            })
            .with_assist_script(vec![
                AssistEvent::SpeechToText("what time is it".into()),
                AssistEvent::IntentEnd("It is noon".into()),
            ]),
    );
    let sink = Arc::new(CollectingSink::new());
    let router = Router::new(
        Arc::new(store),
        Arc::new(MemoryDirectory::new().with_server("home", server.clone())),
        sink.clone(),
        ReassemblyConfig::testing(),
        ManualTimeSource::starting_at(0),
    );
    Fixture {
        transport: Arc::new(RouterTransport {
            router,
            reachable: AtomicBool::new(true),
        }),
        server,
        sink,
    }
}
