//! Watch-side Assist session
//!
//! Tracks one voice interaction from recording through transfer to the
//! streamed pipeline results, and rebuilds the chat transcript shown on the
//! watch from the notifications the phone relays.

use tracing::{debug, warn};

use crate::client::WatchClient;
use crate::errors::ClientError;
use crate::messages::WatchNotification;
use crate::transport::PairedTransport;
use crate::wire::WireMessage;

/// Where the session currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Sending { acked: u32, total: u32 },
    AwaitingResponse,
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
    Info,
    Error,
}

/// One line of the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatItem {
    pub role: ChatRole,
    pub text: String,
}

impl ChatItem {
    fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Result of finishing a recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStep {
    /// Audio should be sent; `chunks` is the expected ack count
    Send { audio: Vec<u8>, chunks: u32 },
    /// The phone is away; nothing was sent
    NotReachable,
    /// No recording was in progress
    Ignored,
}

pub struct AssistSession {
    server_id: String,
    pipeline_id: String,
    chunk_size: usize,
    state: SessionState,
    items: Vec<ChatItem>,
    media_url: Option<String>,
}

impl AssistSession {
    pub fn new(server_id: impl Into<String>, pipeline_id: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            server_id: server_id.into(),
            pipeline_id: pipeline_id.into(),
            chunk_size: chunk_size.max(1),
            state: SessionState::Idle,
            items: Vec::new(),
            media_url: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn chat_items(&self) -> &[ChatItem] {
        &self.items
    }

    /// Most recent text-to-speech audio location
    pub fn media_url(&self) -> Option<&str> {
        self.media_url.as_deref()
    }

    pub fn start_recording(&mut self) {
        self.state = SessionState::Recording;
        self.media_url = None;
    }

    pub fn finish_recording(&mut self, audio: Vec<u8>, reachable: bool) -> SessionStep {
        if self.state != SessionState::Recording {
            return SessionStep::Ignored;
        }
        if !reachable {
            self.items.push(ChatItem::new(ChatRole::Info, "phone not reachable"));
            self.state = SessionState::Idle;
            return SessionStep::NotReachable;
        }
        let chunks = if audio.len() <= self.chunk_size {
            1
        } else {
            audio.len().div_ceil(self.chunk_size) as u32
        };
        self.state = SessionState::Sending { acked: 0, total: chunks };
        SessionStep::Send { audio, chunks }
    }

    pub fn chunk_acked(&mut self, acked: u32, total: u32) {
        if let SessionState::Sending { .. } = self.state {
            self.state = if acked >= total {
                SessionState::AwaitingResponse
            } else {
                SessionState::Sending { acked, total }
            };
        }
    }

    /// All audio is with the phone
    pub fn audio_sent(&mut self) {
        if let SessionState::Sending { .. } = self.state {
            self.state = SessionState::AwaitingResponse;
        }
    }

    pub fn send_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.items.push(ChatItem::new(ChatRole::Error, reason.clone()));
        self.state = SessionState::Failed { reason };
    }

    /// Apply a relayed pipeline event; returns whether it was an assist event
    pub fn on_notification(&mut self, message: &WireMessage) -> bool {
        let notification = match WatchNotification::decode(message) {
            Ok(notification) => notification,
            Err(e) => {
                warn!("Ignoring notification: {}", e);
                return false;
            }
        };
        match notification {
            WatchNotification::SpeechToText { content } => {
                self.items.push(ChatItem::new(ChatRole::User, content));
            }
            WatchNotification::IntentEnd { content } => {
                self.items.push(ChatItem::new(ChatRole::Assistant, content));
                self.state = SessionState::Idle;
            }
            WatchNotification::TextToSpeech { media_url } => {
                self.media_url = Some(media_url);
            }
            WatchNotification::AssistError { code, message } => {
                self.send_failed(format!("{}: {}", code, message));
            }
            WatchNotification::AssistAudio(_) => {
                debug!("Audio notification is phone-bound, ignoring");
                return false;
            }
        }
        true
    }

    /// Finish the recording and push it through `client`
    pub async fn submit<T: PairedTransport>(
        &mut self,
        client: &WatchClient<T>,
        audio: Vec<u8>,
    ) -> Result<SessionStep, ClientError> {
        let step = self.finish_recording(audio, client.is_reachable());
        let SessionStep::Send { audio, .. } = &step else {
            return Ok(step);
        };

        let server_id = self.server_id.clone();
        let pipeline_id = self.pipeline_id.clone();
        let result = client
            .send_audio(audio, &server_id, &pipeline_id, |acked, total| {
                self.chunk_acked(acked, total)
            })
            .await;
        match result {
            Ok(_) => {
                self.audio_sent();
                Ok(step)
            }
            Err(e) => {
                self.send_failed(e.to_string());
                Err(e)
            }
        }
    }
}
