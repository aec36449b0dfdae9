//! Watch-side client
//!
//! Sends immediate requests to the phone and decodes the replies. Requests
//! are only attempted while the phone is reachable; action presses can fall
//! back to calling the home server directly over the watch's own network.

use alloc::sync::Arc;
use tracing::{debug, info, warn};

use crate::assist::DEFAULT_SAMPLE_RATE;
use crate::collaborators::HomeServer;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::identifiers::{NotificationIdentifier, RequestIdentifier, ResponseIdentifier};
use crate::messages::{keys, AudioUpload, WatchNotification, WatchRequest, WatchResponse};
use crate::reassembly::split_audio;
use crate::records::{
    Action, CallSource, MagicItem, MagicItemInfo, PipelineListing, ServiceCall, WatchConfig,
};
use crate::transport::PairedTransport;
use crate::wire::Blob;

/// Outcome of a configuration fetch
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigFetch {
    Config {
        config: WatchConfig,
        infos: Vec<MagicItemInfo>,
    },
    /// The phone has no configuration stored
    Empty,
}

/// How recorded audio travelled to the phone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDelivery {
    SingleShot,
    Chunked { chunks: u32 },
}

/// Requesting side of the phone/watch link
pub struct WatchClient<T: PairedTransport> {
    transport: Arc<T>,
    config: ClientConfig,
    fallback: Option<Arc<dyn HomeServer>>,
}

impl<T: PairedTransport> WatchClient<T> {
    pub fn new(transport: Arc<T>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            fallback: None,
        }
    }

    /// Server used for action presses while the phone is unreachable
    pub fn with_fallback(mut self, server: Arc<dyn HomeServer>) -> Self {
        self.fallback = Some(server);
        self
    }

    pub fn is_reachable(&self) -> bool {
        self.transport.is_reachable()
    }

    /// Send one request and return its checked, decoded reply
    pub async fn request(&self, request: &WatchRequest) -> Result<WatchResponse, ClientError> {
        if !self.transport.is_reachable() {
            return Err(ClientError::NotReachable);
        }
        let identifier = request.identifier();
        let reply = self.transport.send_request(request.to_message()?).await?;

        let legal = reply
            .identifier
            .parse::<ResponseIdentifier>()
            .map(|response| identifier.accepts(response))
            .unwrap_or(false);
        if !legal {
            return Err(ClientError::UnexpectedReply {
                request: identifier,
                reply: reply.identifier,
            });
        }
        Ok(WatchResponse::decode(&reply)?)
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.request(&WatchRequest::Ping).await.map(|_| ())
    }

    pub async fn fetch_config(&self) -> Result<ConfigFetch, ClientError> {
        match self.request(&WatchRequest::WatchConfig).await? {
            WatchResponse::WatchConfig { config, infos } => Ok(ConfigFetch::Config { config, infos }),
            _ => Ok(ConfigFetch::Empty),
        }
    }

    /// Fire an action through the phone, or locally when the phone is away
    pub async fn press_action(&self, action: &Action) -> Result<bool, ClientError> {
        if !self.transport.is_reachable() {
            let Some(server) = &self.fallback else {
                return Err(ClientError::NotReachable);
            };
            info!("Phone unreachable, firing action {} directly", action.id);
            let call = ServiceCall::for_action(action, CallSource::Watch);
            return Ok(match server.call_service(call).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Direct action call failed: {}", e);
                    false
                }
            });
        }

        let request = WatchRequest::ActionRowPressed {
            action_id: action.id.clone(),
        };
        Ok(matches!(
            self.request(&request).await?,
            WatchResponse::ActionPressed { fired: true }
        ))
    }

    pub async fn press_magic_item(&self, item: &MagicItem) -> Result<bool, ClientError> {
        let request = WatchRequest::MagicItemPressed {
            kind: item.kind,
            item_id: item.id.clone(),
            server_id: item.server_id.clone(),
        };
        Ok(matches!(
            self.request(&request).await?,
            WatchResponse::MagicItemPressed { fired: true }
        ))
    }

    /// `None` when the phone could not list pipelines
    pub async fn fetch_pipelines(
        &self,
        server_id: &str,
    ) -> Result<Option<PipelineListing>, ClientError> {
        let request = WatchRequest::AssistPipelinesFetch {
            server_id: server_id.to_string(),
        };
        match self.request(&request).await? {
            WatchResponse::Pipelines(listing) => Ok(Some(listing)),
            _ => Ok(None),
        }
    }

    /// Send recorded audio. Small payloads go as one notification, larger
    /// ones as acknowledged chunks; `on_ack` sees `(acked, total)` after
    /// every chunk.
    pub async fn send_audio(
        &self,
        audio: &[u8],
        server_id: &str,
        pipeline_id: &str,
        mut on_ack: impl FnMut(u32, u32) + Send,
    ) -> Result<AudioDelivery, ClientError> {
        if !self.transport.is_reachable() {
            return Err(ClientError::NotReachable);
        }

        if audio.len() <= self.config.chunk_size {
            let upload = AudioUpload {
                server_id: server_id.to_string(),
                pipeline_id: pipeline_id.to_string(),
                audio: audio.to_vec(),
                sample_rate: Some(DEFAULT_SAMPLE_RATE),
            };
            let message = WatchNotification::AssistAudio(upload).to_message();
            self.transport.send_message(message).await?;
            debug!("Sent {} bytes of audio in one message", audio.len());
            return Ok(AudioDelivery::SingleShot);
        }

        let chunks = split_audio(audio, self.config.chunk_size, server_id, pipeline_id);
        let total = chunks.len() as u32;
        for (acked, chunk) in chunks.into_iter().enumerate() {
            let index = chunk.index;
            match self.request(&WatchRequest::AssistAudioChunk(chunk)).await? {
                WatchResponse::ChunkAck { chunk_index, .. } if chunk_index == index => {
                    on_ack(acked as u32 + 1, total);
                }
                other => {
                    warn!("Chunk {} answered with {:?}", index, other);
                    return Err(ClientError::UnexpectedReply {
                        request: RequestIdentifier::AssistAudioDataChunked,
                        reply: other.identifier().to_string(),
                    });
                }
            }
        }
        debug!("Sent {} bytes of audio in {} chunks", audio.len(), total);
        Ok(AudioDelivery::Chunked { chunks: total })
    }

    /// Queue audio as a background blob transfer; works while unreachable
    pub async fn queue_audio_transfer(
        &self,
        audio: Vec<u8>,
        server_id: &str,
        pipeline_id: &str,
    ) -> Result<(), ClientError> {
        let mut blob = Blob::new(NotificationIdentifier::AssistAudioData.as_str(), audio);
        blob.metadata = blob
            .metadata
            .with(keys::SERVER_ID, server_id)
            .with(keys::PIPELINE_ID, pipeline_id)
            .with(keys::AUDIO_SAMPLE_RATE, DEFAULT_SAMPLE_RATE);
        debug!("Queueing blob {} with {} bytes", blob.id, blob.data.len());
        self.transport.transfer_blob(blob).await?;
        Ok(())
    }
}
