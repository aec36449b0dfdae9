//! Typed requests, responses and notifications
//!
//! Every wire message is decoded exactly once into one of the tagged unions in
//! this module. Missing or mistyped keys surface as a single `DecodeError`
//! instead of being checked ad hoc by each handler.

use crate::assist::AudioSubmission;
use crate::errors::{DecodeError, Result, WristlinkError};
use crate::identifiers::{
    NotificationIdentifier, RequestIdentifier, ResponseIdentifier, UnknownIdentifier,
};
use crate::records::{
    MagicItemInfo, MagicItemKind, Pipeline, PipelineListing, PushActionInfo, WatchConfig,
};
use crate::wire::{Content, ContentReader, MessageKind, Value, WireMessage};

// ----------------------------------------------------------------------------
// Content Keys
// ----------------------------------------------------------------------------

pub mod keys {
    pub const ACTION_ID: &str = "actionId";
    pub const SERVER_ID: &str = "serverId";
    pub const PIPELINE_ID: &str = "pipelineId";
    pub const ITEM_TYPE: &str = "itemType";
    pub const ITEM_ID: &str = "itemId";
    pub const PUSH_ACTION_INFO: &str = "pushActionInfo";
    pub const CHUNK_DATA: &str = "chunkData";
    pub const CHUNK_INDEX: &str = "chunkIndex";
    pub const TOTAL_CHUNKS: &str = "totalChunks";
    pub const ACKNOWLEDGED: &str = "acknowledged";
    pub const AUDIO_DATA: &str = "audioData";
    pub const AUDIO_SAMPLE_RATE: &str = "audioSampleRate";
    pub const FIRED: &str = "fired";
    pub const ERROR: &str = "error";
    pub const PIPELINES: &str = "pipelines";
    pub const PREFERRED_PIPELINE: &str = "preferredPipeline";
    pub const NAME: &str = "name";
    pub const ID: &str = "id";
    pub const CONFIG: &str = "config";
    pub const MAGIC_ITEMS_INFO: &str = "magicItemsInfo";
    pub const CONTENT: &str = "content";
    pub const MEDIA_URL: &str = "mediaUrl";
    pub const CODE: &str = "code";
    pub const MESSAGE: &str = "message";
}

// ----------------------------------------------------------------------------
// Inbound Errors
// ----------------------------------------------------------------------------

/// Why an inbound message could not become a typed request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InboundError {
    /// Identifier is not registered; dropped without reply
    #[error(transparent)]
    Unroutable(#[from] UnknownIdentifier),
    /// Identifier is known but the content is unusable
    #[error("malformed {request}: {error}")]
    Malformed {
        request: RequestIdentifier,
        error: DecodeError,
    },
    /// Notification identifier is known but the content is unusable
    #[error("malformed {notification}: {error}")]
    MalformedNotification {
        notification: NotificationIdentifier,
        error: DecodeError,
    },
}

// ----------------------------------------------------------------------------
// Audio Chunk
// ----------------------------------------------------------------------------

/// One indexed slice of an audio submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub server_id: String,
    pub pipeline_id: String,
    pub index: u32,
    pub total: u32,
    pub data: Vec<u8>,
}

impl AudioChunk {
    fn decode(reader: ContentReader<'_>) -> core::result::Result<Self, DecodeError> {
        let index = reader.u32(keys::CHUNK_INDEX)?;
        let total = reader.u32(keys::TOTAL_CHUNKS)?;
        let identifier = RequestIdentifier::AssistAudioDataChunked.as_str();
        if total == 0 {
            return Err(DecodeError::invalid(identifier, keys::TOTAL_CHUNKS, "must be positive"));
        }
        if index >= total {
            return Err(DecodeError::invalid(
                identifier,
                keys::CHUNK_INDEX,
                format!("{} not below total {}", index, total),
            ));
        }
        Ok(Self {
            server_id: reader.string(keys::SERVER_ID)?.to_string(),
            pipeline_id: reader.string(keys::PIPELINE_ID)?.to_string(),
            index,
            total,
            data: reader.data(keys::CHUNK_DATA)?.to_vec(),
        })
    }

    /// Wire form sent by the watch
    pub fn to_message(&self) -> WireMessage {
        WireMessage::request(RequestIdentifier::AssistAudioDataChunked.as_str())
            .with(keys::CHUNK_DATA, self.data.clone())
            .with(keys::CHUNK_INDEX, self.index)
            .with(keys::TOTAL_CHUNKS, self.total)
            .with(keys::SERVER_ID, self.server_id.as_str())
            .with(keys::PIPELINE_ID, self.pipeline_id.as_str())
    }
}

// ----------------------------------------------------------------------------
// Audio Upload
// ----------------------------------------------------------------------------

/// Whole recording sent in one notification or blob. The sample rate is
/// optional on the wire; the receiver supplies its own fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    pub server_id: String,
    pub pipeline_id: String,
    pub audio: Vec<u8>,
    pub sample_rate: Option<u32>,
}

impl AudioUpload {
    pub fn into_submission(self, default_rate: u32) -> AudioSubmission {
        AudioSubmission::new(
            self.server_id,
            self.pipeline_id,
            self.audio,
            self.sample_rate.unwrap_or(default_rate),
        )
    }
}

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// Inbound request-with-reply, one variant per registered identifier
#[derive(Debug, Clone, PartialEq)]
pub enum WatchRequest {
    Ping,
    WatchConfig,
    ActionRowPressed {
        action_id: String,
    },
    PushAction {
        server_id: String,
        info: PushActionInfo,
    },
    AssistPipelinesFetch {
        server_id: String,
    },
    AssistAudioChunk(AudioChunk),
    MagicItemPressed {
        kind: MagicItemKind,
        item_id: String,
        server_id: String,
    },
}

impl WatchRequest {
    pub fn identifier(&self) -> RequestIdentifier {
        match self {
            WatchRequest::Ping => RequestIdentifier::Ping,
            WatchRequest::WatchConfig => RequestIdentifier::WatchConfig,
            WatchRequest::ActionRowPressed { .. } => RequestIdentifier::ActionRowPressed,
            WatchRequest::PushAction { .. } => RequestIdentifier::PushAction,
            WatchRequest::AssistPipelinesFetch { .. } => RequestIdentifier::AssistPipelinesFetch,
            WatchRequest::AssistAudioChunk(_) => RequestIdentifier::AssistAudioDataChunked,
            WatchRequest::MagicItemPressed { .. } => RequestIdentifier::MagicItemPressed,
        }
    }

    /// Decode an inbound wire message
    pub fn decode(message: &WireMessage) -> core::result::Result<Self, InboundError> {
        let request: RequestIdentifier = message.identifier.parse()?;
        Self::decode_content(request, message.reader())
            .map_err(|error| InboundError::Malformed { request, error })
    }

    fn decode_content(
        request: RequestIdentifier,
        reader: ContentReader<'_>,
    ) -> core::result::Result<Self, DecodeError> {
        Ok(match request {
            RequestIdentifier::Ping => WatchRequest::Ping,
            RequestIdentifier::WatchConfig => WatchRequest::WatchConfig,
            RequestIdentifier::ActionRowPressed => WatchRequest::ActionRowPressed {
                action_id: reader.string(keys::ACTION_ID)?.to_string(),
            },
            RequestIdentifier::PushAction => WatchRequest::PushAction {
                server_id: reader.string(keys::SERVER_ID)?.to_string(),
                info: reader.decode_map(keys::PUSH_ACTION_INFO)?,
            },
            RequestIdentifier::AssistPipelinesFetch => WatchRequest::AssistPipelinesFetch {
                server_id: reader.string(keys::SERVER_ID)?.to_string(),
            },
            RequestIdentifier::AssistAudioDataChunked => {
                WatchRequest::AssistAudioChunk(AudioChunk::decode(reader)?)
            }
            RequestIdentifier::MagicItemPressed => {
                let raw_kind = reader.string(keys::ITEM_TYPE)?;
                let kind = raw_kind.parse::<MagicItemKind>().map_err(|reason| {
                    DecodeError::invalid(request.as_str(), keys::ITEM_TYPE, reason)
                })?;
                WatchRequest::MagicItemPressed {
                    kind,
                    item_id: reader.string(keys::ITEM_ID)?.to_string(),
                    server_id: reader.string(keys::SERVER_ID)?.to_string(),
                }
            }
        })
    }

    /// Wire form of this request, as sent by the watch
    pub fn to_message(&self) -> Result<WireMessage> {
        let message = WireMessage::request(self.identifier().as_str());
        Ok(match self {
            WatchRequest::Ping | WatchRequest::WatchConfig => message,
            WatchRequest::ActionRowPressed { action_id } => {
                message.with(keys::ACTION_ID, action_id.as_str())
            }
            WatchRequest::PushAction { server_id, info } => {
                let json = serde_json::to_value(info)?;
                let info = Value::from_json(&json).ok_or_else(|| {
                    WristlinkError::encoding_error("push action info has no wire form")
                })?;
                message
                    .with(keys::SERVER_ID, server_id.as_str())
                    .with(keys::PUSH_ACTION_INFO, info)
            }
            WatchRequest::AssistPipelinesFetch { server_id } => {
                message.with(keys::SERVER_ID, server_id.as_str())
            }
            WatchRequest::AssistAudioChunk(chunk) => chunk.to_message(),
            WatchRequest::MagicItemPressed {
                kind,
                item_id,
                server_id,
            } => message
                .with(keys::ITEM_TYPE, kind.as_str())
                .with(keys::ITEM_ID, item_id.as_str())
                .with(keys::SERVER_ID, server_id.as_str()),
        })
    }
}

// ----------------------------------------------------------------------------
// Responses
// ----------------------------------------------------------------------------

/// Reply produced by the router, one variant family per request
#[derive(Debug, Clone, PartialEq)]
pub enum WatchResponse {
    Pong,
    WatchConfig {
        config: WatchConfig,
        infos: Vec<MagicItemInfo>,
    },
    EmptyWatchConfig,
    ActionPressed {
        fired: bool,
    },
    PushActionHandled,
    Pipelines(PipelineListing),
    PipelinesUnavailable,
    ChunkAck {
        chunk_index: u32,
        total_chunks: u32,
    },
    MagicItemPressed {
        fired: bool,
    },
}

impl WatchResponse {
    pub fn identifier(&self) -> ResponseIdentifier {
        match self {
            WatchResponse::Pong => ResponseIdentifier::Pong,
            WatchResponse::WatchConfig { .. } => ResponseIdentifier::WatchConfigResponse,
            WatchResponse::EmptyWatchConfig => ResponseIdentifier::EmptyWatchConfigResponse,
            WatchResponse::ActionPressed { .. } => ResponseIdentifier::ActionRowPressedResponse,
            WatchResponse::PushActionHandled => ResponseIdentifier::PushActionResponse,
            WatchResponse::Pipelines(_) | WatchResponse::PipelinesUnavailable => {
                ResponseIdentifier::AssistPipelinesFetchResponse
            }
            WatchResponse::ChunkAck { .. } => ResponseIdentifier::AssistAudioChunkAck,
            WatchResponse::MagicItemPressed { .. } => {
                ResponseIdentifier::MagicItemRowPressedResponse
            }
        }
    }

    /// Failure-shaped reply for a request whose content could not be decoded.
    /// `None` means the protocol has no failure shape and the message is dropped.
    pub fn failure_for(request: RequestIdentifier) -> Option<Self> {
        match request {
            RequestIdentifier::ActionRowPressed => Some(WatchResponse::ActionPressed { fired: false }),
            RequestIdentifier::MagicItemPressed => {
                Some(WatchResponse::MagicItemPressed { fired: false })
            }
            RequestIdentifier::PushAction => Some(WatchResponse::PushActionHandled),
            RequestIdentifier::AssistPipelinesFetch => Some(WatchResponse::PipelinesUnavailable),
            RequestIdentifier::Ping
            | RequestIdentifier::WatchConfig
            | RequestIdentifier::AssistAudioDataChunked => None,
        }
    }

    /// Encode as the reply message
    pub fn to_message(&self) -> Result<WireMessage> {
        let message = WireMessage::new(self.identifier().as_str(), MessageKind::Request);
        Ok(match self {
            WatchResponse::Pong
            | WatchResponse::EmptyWatchConfig
            | WatchResponse::PushActionHandled => message,
            WatchResponse::WatchConfig { config, infos } => {
                let encoded_infos = infos
                    .iter()
                    .map(|info| bincode::serialize(info).map(Value::Data))
                    .collect::<core::result::Result<Vec<_>, _>>()?;
                message
                    .with(keys::CONFIG, bincode::serialize(config)?)
                    .with(keys::MAGIC_ITEMS_INFO, Value::List(encoded_infos))
            }
            WatchResponse::ActionPressed { fired } | WatchResponse::MagicItemPressed { fired } => {
                message.with(keys::FIRED, *fired)
            }
            WatchResponse::Pipelines(listing) => {
                let pipelines = listing
                    .pipelines
                    .iter()
                    .map(|p| {
                        let mut entry = Content::new();
                        entry.insert(keys::NAME.to_string(), Value::from(p.name.as_str()));
                        entry.insert(keys::ID.to_string(), Value::from(p.id.as_str()));
                        Value::Map(entry)
                    })
                    .collect();
                message
                    .with(keys::PIPELINES, Value::List(pipelines))
                    .with(keys::PREFERRED_PIPELINE, listing.preferred_pipeline.as_str())
            }
            WatchResponse::PipelinesUnavailable => message.with(keys::ERROR, true),
            WatchResponse::ChunkAck {
                chunk_index,
                total_chunks,
            } => message
                .with(keys::ACKNOWLEDGED, true)
                .with(keys::CHUNK_INDEX, *chunk_index)
                .with(keys::TOTAL_CHUNKS, *total_chunks),
        })
    }

    /// Decode a reply message, as done by the watch
    pub fn decode(message: &WireMessage) -> core::result::Result<Self, DecodeError> {
        let response: ResponseIdentifier = message
            .identifier
            .parse()
            .map_err(|_| DecodeError::invalid(&message.identifier, "identifier", "not a response"))?;
        let reader = message.reader();
        let id = response.as_str();
        Ok(match response {
            ResponseIdentifier::Pong => WatchResponse::Pong,
            ResponseIdentifier::EmptyWatchConfigResponse => WatchResponse::EmptyWatchConfig,
            ResponseIdentifier::PushActionResponse => WatchResponse::PushActionHandled,
            ResponseIdentifier::WatchConfigResponse => {
                let config = bincode::deserialize(reader.data(keys::CONFIG)?)
                    .map_err(|e| DecodeError::invalid(id, keys::CONFIG, e.to_string()))?;
                let infos = reader
                    .list(keys::MAGIC_ITEMS_INFO)?
                    .iter()
                    .map(|value| match value {
                        Value::Data(bytes) => bincode::deserialize(bytes).map_err(|e| {
                            DecodeError::invalid(id, keys::MAGIC_ITEMS_INFO, e.to_string())
                        }),
                        _ => Err(DecodeError::wrong_type(id, keys::MAGIC_ITEMS_INFO, "data")),
                    })
                    .collect::<core::result::Result<Vec<_>, _>>()?;
                WatchResponse::WatchConfig { config, infos }
            }
            ResponseIdentifier::ActionRowPressedResponse => WatchResponse::ActionPressed {
                fired: reader.bool(keys::FIRED)?,
            },
            ResponseIdentifier::MagicItemRowPressedResponse => WatchResponse::MagicItemPressed {
                fired: reader.bool(keys::FIRED)?,
            },
            ResponseIdentifier::AssistPipelinesFetchResponse => {
                if reader.bool(keys::ERROR).unwrap_or(false) {
                    WatchResponse::PipelinesUnavailable
                } else {
                    let pipelines = reader
                        .list(keys::PIPELINES)?
                        .iter()
                        .map(|value| match value {
                            Value::Map(entry) => {
                                let entry = ContentReader::new(id, entry);
                                Ok(Pipeline {
                                    id: entry.string(keys::ID)?.to_string(),
                                    name: entry.string(keys::NAME)?.to_string(),
                                })
                            }
                            _ => Err(DecodeError::wrong_type(id, keys::PIPELINES, "map")),
                        })
                        .collect::<core::result::Result<Vec<_>, _>>()?;
                    WatchResponse::Pipelines(PipelineListing {
                        pipelines,
                        preferred_pipeline: reader.string(keys::PREFERRED_PIPELINE)?.to_string(),
                    })
                }
            }
            ResponseIdentifier::AssistAudioChunkAck => WatchResponse::ChunkAck {
                chunk_index: reader.u32(keys::CHUNK_INDEX)?,
                total_chunks: reader.u32(keys::TOTAL_CHUNKS)?,
            },
        })
    }
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// Fire-and-forget messages in either direction
#[derive(Debug, Clone, PartialEq)]
pub enum WatchNotification {
    /// Single-shot audio from the watch
    AssistAudio(AudioUpload),
    SpeechToText { content: String },
    IntentEnd { content: String },
    TextToSpeech { media_url: String },
    AssistError { code: String, message: String },
}

impl WatchNotification {
    pub fn identifier(&self) -> NotificationIdentifier {
        match self {
            WatchNotification::AssistAudio(_) => NotificationIdentifier::AssistAudioData,
            WatchNotification::SpeechToText { .. } => NotificationIdentifier::AssistSttResponse,
            WatchNotification::IntentEnd { .. } => NotificationIdentifier::AssistIntentEndResponse,
            WatchNotification::TextToSpeech { .. } => NotificationIdentifier::AssistTtsResponse,
            WatchNotification::AssistError { .. } => NotificationIdentifier::AssistError,
        }
    }

    /// Decode a fire-and-forget message; unknown identifiers are unroutable
    pub fn decode(message: &WireMessage) -> core::result::Result<Self, InboundError> {
        let notification: NotificationIdentifier = message
            .identifier
            .parse()
            .map_err(InboundError::Unroutable)?;
        Self::decode_content(notification, message.reader()).map_err(|error| {
            InboundError::MalformedNotification {
                notification,
                error,
            }
        })
    }

    fn decode_content(
        notification: NotificationIdentifier,
        reader: ContentReader<'_>,
    ) -> core::result::Result<Self, DecodeError> {
        Ok(match notification {
            NotificationIdentifier::AssistAudioData => {
                WatchNotification::AssistAudio(AudioUpload {
                    server_id: reader.string(keys::SERVER_ID)?.to_string(),
                    pipeline_id: reader.string(keys::PIPELINE_ID)?.to_string(),
                    audio: reader.data(keys::AUDIO_DATA)?.to_vec(),
                    sample_rate: reader.optional_u32(keys::AUDIO_SAMPLE_RATE)?,
                })
            }
            NotificationIdentifier::AssistSttResponse => WatchNotification::SpeechToText {
                content: reader.string(keys::CONTENT)?.to_string(),
            },
            NotificationIdentifier::AssistIntentEndResponse => WatchNotification::IntentEnd {
                content: reader.string(keys::CONTENT)?.to_string(),
            },
            NotificationIdentifier::AssistTtsResponse => WatchNotification::TextToSpeech {
                media_url: reader.string(keys::MEDIA_URL)?.to_string(),
            },
            NotificationIdentifier::AssistError => WatchNotification::AssistError {
                code: reader.string(keys::CODE)?.to_string(),
                message: reader.string(keys::MESSAGE)?.to_string(),
            },
        })
    }

    pub fn to_message(&self) -> WireMessage {
        let message = WireMessage::notification(self.identifier().as_str());
        match self {
            WatchNotification::AssistAudio(upload) => {
                let message = message
                    .with(keys::AUDIO_DATA, upload.audio.clone())
                    .with(keys::SERVER_ID, upload.server_id.as_str())
                    .with(keys::PIPELINE_ID, upload.pipeline_id.as_str());
                match upload.sample_rate {
                    Some(rate) => message.with(keys::AUDIO_SAMPLE_RATE, rate),
                    None => message,
                }
            }
            WatchNotification::SpeechToText { content }
            | WatchNotification::IntentEnd { content } => {
                message.with(keys::CONTENT, content.as_str())
            }
            WatchNotification::TextToSpeech { media_url } => {
                message.with(keys::MEDIA_URL, media_url.as_str())
            }
            WatchNotification::AssistError { code, message: text } => message
                .with(keys::CODE, code.as_str())
                .with(keys::MESSAGE, text.as_str()),
        }
    }
}
