//! In-process paired transport
//!
//! Connects two endpoints through bounded tokio channels. Each side has an
//! inbox of `InboundEvent`s and a pending counter so that the completion gate
//! can ask whether more inbound data is queued. Reachability is shared by both
//! sides and can be toggled to simulate the watch leaving range.
//!
//! Messages cross the link as bincode frames, so only content that survives
//! the frame codec reaches the peer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};
use wristlink_core::wire::{decode_frame, encode_frame};
use wristlink_core::{Blob, ChannelConfig, PairedTransport, TransportError, WireMessage};

/// Default upper bound on waiting for a reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ----------------------------------------------------------------------------
// Inbound Events
// ----------------------------------------------------------------------------

/// A unit of traffic delivered to one side of the link
#[derive(Debug)]
pub enum InboundEvent {
    /// Immediate message; the reply goes back through `reply`
    Request {
        message: WireMessage,
        reply: oneshot::Sender<WireMessage>,
    },
    /// Fire-and-forget message
    Message(WireMessage),
    /// Store-and-forward binary transfer
    Blob(Blob),
}

impl InboundEvent {
    pub fn identifier(&self) -> &str {
        match self {
            InboundEvent::Request { message, .. } | InboundEvent::Message(message) => {
                &message.identifier
            }
            InboundEvent::Blob(blob) => &blob.metadata.identifier,
        }
    }
}

/// Receiving end of one side's inbox
pub struct InboundQueue {
    receiver: mpsc::Receiver<InboundEvent>,
    pending: Arc<AtomicUsize>,
}

impl InboundQueue {
    /// Next event, or `None` once the peer is gone
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        let event = self.receiver.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(event)
    }

    /// Events queued but not yet received
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Memory Transport
// ----------------------------------------------------------------------------

/// One side of an in-process paired link
#[derive(Clone)]
pub struct MemoryTransport {
    name: &'static str,
    peer_inbox: mpsc::Sender<InboundEvent>,
    peer_pending: Arc<AtomicUsize>,
    own_pending: Arc<AtomicUsize>,
    reachable: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl MemoryTransport {
    /// Create a connected phone/watch pair with their inboxes
    pub fn pair(
        config: &ChannelConfig,
    ) -> ((MemoryTransport, InboundQueue), (MemoryTransport, InboundQueue)) {
        let (phone_tx, phone_rx) = mpsc::channel(config.inbound_buffer_size);
        let (watch_tx, watch_rx) = mpsc::channel(config.outbound_buffer_size);
        let phone_pending = Arc::new(AtomicUsize::new(0));
        let watch_pending = Arc::new(AtomicUsize::new(0));
        let reachable = Arc::new(AtomicBool::new(true));

        let phone = MemoryTransport {
            name: "phone",
            peer_inbox: watch_tx,
            peer_pending: Arc::clone(&watch_pending),
            own_pending: Arc::clone(&phone_pending),
            reachable: Arc::clone(&reachable),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        let watch = MemoryTransport {
            name: "watch",
            peer_inbox: phone_tx,
            peer_pending: Arc::clone(&phone_pending),
            own_pending: Arc::clone(&watch_pending),
            reachable,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };

        (
            (
                phone,
                InboundQueue {
                    receiver: phone_rx,
                    pending: phone_pending,
                },
            ),
            (
                watch,
                InboundQueue {
                    receiver: watch_rx,
                    pending: watch_pending,
                },
            ),
        )
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Toggle reachability for both sides of the link
    pub fn set_reachable(&self, reachable: bool) {
        debug!("Link reachability set to {} by {}", reachable, self.name);
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    async fn deliver(&self, event: InboundEvent) -> Result<(), TransportError> {
        trace!("{} -> peer: {}", self.name, event.identifier());
        let permit = self
            .peer_inbox
            .reserve()
            .await
            .map_err(|_| TransportError::Closed {
                reason: "peer inbox closed".to_string(),
            })?;
        // Counted before the event is visible so the receiver never goes negative
        self.peer_pending.fetch_add(1, Ordering::SeqCst);
        permit.send(event);
        Ok(())
    }
}

/// Round-trip a message through the frame codec
fn framed(message: WireMessage) -> Result<WireMessage, TransportError> {
    encode_frame(&message)
        .and_then(|bytes| decode_frame(&bytes))
        .map_err(|e| TransportError::Frame {
            identifier: message.identifier.clone(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl PairedTransport for MemoryTransport {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn has_pending_inbound(&self) -> bool {
        self.own_pending.load(Ordering::SeqCst) > 0
    }

    async fn send_message(&self, message: WireMessage) -> Result<(), TransportError> {
        if !self.is_reachable() {
            return Err(TransportError::NotReachable);
        }
        self.deliver(InboundEvent::Message(framed(message)?)).await
    }

    async fn send_request(&self, message: WireMessage) -> Result<WireMessage, TransportError> {
        if !self.is_reachable() {
            return Err(TransportError::NotReachable);
        }
        let identifier = message.identifier.clone();
        let message = framed(message)?;
        let (reply, response) = oneshot::channel();
        self.deliver(InboundEvent::Request { message, reply }).await?;

        match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(reply)) => framed(reply),
            Ok(Err(_)) => Err(TransportError::ReplyDropped { identifier }),
            Err(_) => Err(TransportError::Timeout {
                duration_ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    async fn transfer_blob(&self, blob: Blob) -> Result<(), TransportError> {
        // Blob transfers are queued regardless of reachability
        let blob = Blob {
            metadata: framed(blob.metadata)?,
            ..blob
        };
        self.deliver(InboundEvent::Blob(blob)).await
    }
}
