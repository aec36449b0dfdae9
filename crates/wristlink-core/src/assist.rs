//! Assist voice pipeline pathway
//!
//! Audio arrives either as a single `assistAudioData` notification or as a
//! reassembled chunk stream. Both end up here: the submission is handed to the
//! home server's assist pipeline and every pipeline event is relayed back to
//! the watch as a fire-and-forget notification.

use alloc::sync::Arc;
use crc32fast::Hasher;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::collaborators::{MessageSink, ServerDirectory};
use crate::messages::WatchNotification;

/// Sample rate assumed when the watch does not send one
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

// ----------------------------------------------------------------------------
// Submission
// ----------------------------------------------------------------------------

/// Complete recorded audio ready for the assist pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSubmission {
    pub server_id: String,
    pub pipeline_id: String,
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    /// CRC32 of `audio`
    pub checksum: u32,
}

impl AudioSubmission {
    pub fn new(
        server_id: impl Into<String>,
        pipeline_id: impl Into<String>,
        audio: Vec<u8>,
        sample_rate: u32,
    ) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&audio);
        Self {
            server_id: server_id.into(),
            pipeline_id: pipeline_id.into(),
            checksum: hasher.finalize(),
            audio,
            sample_rate,
        }
    }
}

/// Request handed to `HomeServer::run_assist`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistRequest {
    pub pipeline_id: String,
    pub audio: Vec<u8>,
    pub sample_rate: u32,
}

impl From<AudioSubmission> for AssistRequest {
    fn from(submission: AudioSubmission) -> Self {
        Self {
            pipeline_id: submission.pipeline_id,
            audio: submission.audio,
            sample_rate: submission.sample_rate,
        }
    }
}

/// Event emitted by a running assist pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistEvent {
    SpeechToText(String),
    IntentEnd(String),
    TextToSpeech(String),
    Error { code: String, message: String },
}

impl From<AssistEvent> for WatchNotification {
    fn from(event: AssistEvent) -> Self {
        match event {
            AssistEvent::SpeechToText(content) => WatchNotification::SpeechToText { content },
            AssistEvent::IntentEnd(content) => WatchNotification::IntentEnd { content },
            AssistEvent::TextToSpeech(media_url) => WatchNotification::TextToSpeech { media_url },
            AssistEvent::Error { code, message } => WatchNotification::AssistError { code, message },
        }
    }
}

// ----------------------------------------------------------------------------
// Forwarder
// ----------------------------------------------------------------------------

/// Runs submissions against the home server and relays the results
#[derive(Clone)]
pub struct AssistForwarder {
    servers: Arc<dyn ServerDirectory>,
    sink: Arc<dyn MessageSink>,
}

impl AssistForwarder {
    pub fn new(servers: Arc<dyn ServerDirectory>, sink: Arc<dyn MessageSink>) -> Self {
        Self { servers, sink }
    }

    /// Forward on a separate task so that the caller is never delayed
    pub fn submit(&self, submission: AudioSubmission) -> JoinHandle<usize> {
        let forwarder = self.clone();
        tokio::spawn(async move { forwarder.forward(submission).await })
    }

    /// Run the submission and relay every event; returns the number of
    /// notifications delivered to the watch.
    pub async fn forward(&self, submission: AudioSubmission) -> usize {
        debug!(
            server = %submission.server_id,
            pipeline = %submission.pipeline_id,
            bytes = submission.audio.len(),
            checksum = submission.checksum,
            "Submitting audio to assist pipeline"
        );

        let Some(server) = self.servers.server(&submission.server_id) else {
            warn!("Assist submission for unknown server {}", submission.server_id);
            let failure = AssistEvent::Error {
                code: "unknown_server".to_string(),
                message: format!("No server with id {}", submission.server_id),
            };
            return self.relay(failure).await as usize;
        };

        let mut events = match server.run_assist(submission.into()).await {
            Ok(events) => events,
            Err(e) => {
                error!("Assist pipeline failed to start: {}", e);
                let failure = AssistEvent::Error {
                    code: "pipeline_failed".to_string(),
                    message: e.to_string(),
                };
                return self.relay(failure).await as usize;
            }
        };

        let mut delivered = 0;
        while let Some(event) = events.next().await {
            if self.relay(event).await {
                delivered += 1;
            }
        }
        delivered
    }

    async fn relay(&self, event: AssistEvent) -> bool {
        let notification = WatchNotification::from(event);
        match self.sink.deliver(notification.to_message()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping {} for watch: {}", notification.identifier(), e);
                false
            }
        }
    }
}
