//! Paired-device transport abstraction
//!
//! The session layer between the phone and the watch is provided by the
//! platform. It carries three kinds of traffic: fire-and-forget messages,
//! immediate request/reply exchanges, and binary blob transfers.

use alloc::sync::Arc;
use async_trait::async_trait;

use crate::collaborators::MessageSink;
use crate::errors::TransportError;
use crate::wire::{Blob, WireMessage};

/// Reachability-aware bus to the paired device
#[async_trait]
pub trait PairedTransport: Send + Sync {
    /// Whether the counterpart can currently receive immediate messages
    fn is_reachable(&self) -> bool;

    /// Whether more inbound data is queued for delivery to this side
    fn has_pending_inbound(&self) -> bool;

    /// Fire-and-forget delivery
    async fn send_message(&self, message: WireMessage) -> Result<(), TransportError>;

    /// Immediate request awaiting exactly one reply
    async fn send_request(&self, message: WireMessage) -> Result<WireMessage, TransportError>;

    /// Queue a binary transfer
    async fn transfer_blob(&self, blob: Blob) -> Result<(), TransportError>;
}

/// Uses a transport's fire-and-forget path as a `MessageSink`
pub struct TransportSink<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: PairedTransport + ?Sized> TransportSink<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: PairedTransport + ?Sized> MessageSink for TransportSink<T> {
    async fn deliver(&self, message: WireMessage) -> Result<(), TransportError> {
        self.transport.send_message(message).await
    }
}
