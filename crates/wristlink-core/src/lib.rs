//! Wristlink Core Protocol Implementation
//!
//! Message routing between a phone and its paired watch: the wire value
//! model, the identifier registry, typed requests and replies, chunked audio
//! reassembly, the background task completion gate, and the watch-side client
//! with its Assist session state machine.
//!
//! Everything here is transport-agnostic. The tokio endpoint that feeds the
//! router from a paired transport lives in `wristlink-runtime`.

extern crate alloc;

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod assist;
pub mod assist_session;
pub mod client;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod gate;
pub mod identifiers;
pub mod memory;
pub mod messages;
pub mod reassembly;
pub mod records;
pub mod router;
pub mod transport;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use assist::{AssistEvent, AssistForwarder, AssistRequest, AudioSubmission, DEFAULT_SAMPLE_RATE};
pub use assist_session::{AssistSession, ChatItem, ChatRole, SessionState, SessionStep};
pub use client::{AudioDelivery, ConfigFetch, WatchClient};
pub use collaborators::{
    ActivityToken, BackgroundActivity, BackgroundTask, HomeServer, LocalStore, MessageSink,
    NoopActivity, ServerDirectory,
};
pub use config::{ChannelConfig, ClientConfig, GateConfig, ReassemblyConfig, WristlinkConfig};
pub use errors::{
    ClientError, DecodeError, DecodeProblem, Result, ServiceError, TransportError, WristlinkError,
};
pub use gate::{CompletionGate, GateAction, GateActions};
pub use identifiers::{NotificationIdentifier, RequestIdentifier, ResponseIdentifier, UnknownIdentifier};
pub use messages::{
    AudioChunk, AudioUpload, InboundError, WatchNotification, WatchRequest, WatchResponse,
};
pub use reassembly::{split_audio, ChunkOutcome, ChunkReassembler, SessionKey};
pub use records::{
    Action, AssistConfig, CallSource, MagicItem, MagicItemInfo, MagicItemKind, Pipeline,
    PipelineListing, PushActionInfo, ServiceCall, WatchConfig,
};
pub use router::{Router, PUSH_ACTION_ACTIVITY};
pub use transport::{PairedTransport, TransportSink};
pub use types::{ManualTimeSource, SystemTimeSource, TimeSource, Timestamp};
pub use wire::{Blob, Content, MessageKind, Value, WireMessage};
