//! Request router
//!
//! Every request-with-reply from the watch passes through `Router::dispatch`.
//! The message is decoded once into a `WatchRequest`; each request variant is
//! answered by exactly one `WatchResponse`. Decode failures are converted to
//! the request's failure-shaped reply, or dropped when it has none.

use alloc::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::assist::AssistForwarder;
use crate::collaborators::{
    BackgroundActivity, LocalStore, MessageSink, NoopActivity, ServerDirectory,
};
use crate::config::ReassemblyConfig;
use crate::messages::{
    keys, AudioChunk, InboundError, WatchNotification, WatchRequest, WatchResponse,
};
use crate::reassembly::ChunkReassembler;
use crate::records::{CallSource, MagicItemKind, PushActionInfo, ServiceCall};
use crate::types::TimeSource;
use crate::wire::{Blob, MessageKind, Value, WireMessage};

/// Background activity held while a push action is relayed
pub const PUSH_ACTION_ACTIVITY: &str = "watch-push-action";

/// Routes watch requests to their handlers
pub struct Router<C: TimeSource> {
    store: Arc<dyn LocalStore>,
    servers: Arc<dyn ServerDirectory>,
    activity: Arc<dyn BackgroundActivity>,
    assist: AssistForwarder,
    reassembler: Mutex<ChunkReassembler<C>>,
    sample_rate: u32,
}

impl<C: TimeSource> Router<C> {
    pub fn new(
        store: Arc<dyn LocalStore>,
        servers: Arc<dyn ServerDirectory>,
        sink: Arc<dyn MessageSink>,
        reassembly: ReassemblyConfig,
        time_source: C,
    ) -> Self {
        Self {
            store,
            assist: AssistForwarder::new(Arc::clone(&servers), sink),
            servers,
            activity: Arc::new(NoopActivity),
            sample_rate: reassembly.sample_rate,
            reassembler: Mutex::new(ChunkReassembler::new(reassembly, time_source)),
        }
    }

    /// Use a platform background-activity provider
    pub fn with_activity(mut self, activity: Arc<dyn BackgroundActivity>) -> Self {
        self.activity = activity;
        self
    }

    // ---- Entry Points ----

    /// Route one request message; returns the reply to send, if any
    pub async fn dispatch(&self, message: &WireMessage) -> Option<WireMessage> {
        let response = match WatchRequest::decode(message) {
            Ok(request) => {
                debug!("Dispatching {}", request.identifier());
                self.handle(request).await
            }
            Err(InboundError::Unroutable(unknown)) => {
                warn!("Dropping message: {}", unknown);
                return None;
            }
            Err(InboundError::Malformed { request, error }) => {
                warn!("{}", error);
                WatchResponse::failure_for(request)?
            }
            Err(e @ InboundError::MalformedNotification { .. }) => {
                warn!("Unexpected notification on request path: {}", e);
                return None;
            }
        };

        match response.to_message() {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!("Cannot encode {}: {}", response.identifier(), e);
                None
            }
        }
    }

    /// Route one fire-and-forget message. Returns the assist task when the
    /// message started one.
    pub async fn dispatch_notification(&self, message: &WireMessage) -> Option<JoinHandle<usize>> {
        match WatchNotification::decode(message) {
            Ok(WatchNotification::AssistAudio(upload)) => {
                debug!("Single-shot audio, {} bytes", upload.audio.len());
                Some(self.assist.submit(upload.into_submission(self.sample_rate)))
            }
            Ok(other) => {
                debug!("Ignoring {} on phone side", other.identifier());
                None
            }
            Err(e) => {
                warn!("Dropping notification: {}", e);
                None
            }
        }
    }

    /// Route a queued blob transfer. The blob's metadata names a
    /// notification; its data becomes the notification's audio payload.
    pub async fn dispatch_blob(&self, blob: &Blob) -> Option<JoinHandle<usize>> {
        let mut message = blob.metadata.clone();
        message.kind = MessageKind::FireAndForget;
        message
            .content
            .insert(keys::AUDIO_DATA.to_string(), Value::Data(blob.data.clone()));
        debug!("Blob {} carries {}", blob.id, message.identifier);
        self.dispatch_notification(&message).await
    }

    /// Produce the reply for a decoded request
    pub async fn handle(&self, request: WatchRequest) -> WatchResponse {
        match request {
            WatchRequest::Ping => WatchResponse::Pong,
            WatchRequest::WatchConfig => self.watch_config(),
            WatchRequest::ActionRowPressed { action_id } => WatchResponse::ActionPressed {
                fired: self.fire_action(&action_id).await,
            },
            WatchRequest::PushAction { server_id, info } => {
                self.push_action(&server_id, info).await;
                WatchResponse::PushActionHandled
            }
            WatchRequest::AssistPipelinesFetch { server_id } => self.pipelines(&server_id).await,
            WatchRequest::AssistAudioChunk(chunk) => self.audio_chunk(chunk).await,
            WatchRequest::MagicItemPressed {
                kind,
                item_id,
                server_id,
            } => WatchResponse::MagicItemPressed {
                fired: self.magic_item(kind, &item_id, &server_id).await,
            },
        }
    }

    /// Drop chunk sessions past their TTL
    pub async fn evict_stale_sessions(&self) -> usize {
        self.reassembler.lock().await.evict_expired()
    }

    // ---- Handlers ----

    fn watch_config(&self) -> WatchResponse {
        let Some(config) = self.store.watch_config() else {
            debug!("No watch config stored");
            return WatchResponse::EmptyWatchConfig;
        };
        let infos = config
            .items
            .iter()
            .filter_map(|item| {
                let info = self.store.magic_item_info(item);
                if info.is_none() {
                    debug!("Skipping unresolvable item {}", item.id);
                }
                info
            })
            .collect();
        WatchResponse::WatchConfig { config, infos }
    }

    async fn fire_action(&self, action_id: &str) -> bool {
        let Some(action) = self.store.action(action_id) else {
            warn!("Unknown action {}", action_id);
            return false;
        };
        let call = ServiceCall::for_action(&action, CallSource::Phone);
        self.call_service(&action.server_id, call).await
    }

    async fn magic_item(&self, kind: MagicItemKind, item_id: &str, server_id: &str) -> bool {
        if kind == MagicItemKind::Action {
            return self.fire_action(item_id).await;
        }
        match ServiceCall::for_magic_item(kind, item_id, CallSource::Phone) {
            Some(call) => self.call_service(server_id, call).await,
            None => {
                debug!("Magic item {} of kind {} has nothing to run", item_id, kind);
                false
            }
        }
    }

    async fn call_service(&self, server_id: &str, call: ServiceCall) -> bool {
        let Some(server) = self.servers.server(server_id) else {
            warn!("Unknown server {} for {}", server_id, call);
            return false;
        };
        let description = call.to_string();
        match server.call_service(call).await {
            Ok(()) => true,
            Err(e) => {
                error!("Service call {} failed: {}", description, e);
                false
            }
        }
    }

    async fn push_action(&self, server_id: &str, info: PushActionInfo) {
        let _activity = self.activity.begin(PUSH_ACTION_ACTIVITY);
        let Some(server) = self.servers.server(server_id) else {
            warn!("Unknown server {} for push action {}", server_id, info.identifier);
            return;
        };
        if let Err(e) = server.handle_push_action(info).await {
            error!("Push action failed: {}", e);
        }
    }

    async fn pipelines(&self, server_id: &str) -> WatchResponse {
        let Some(server) = self.servers.server(server_id) else {
            warn!("Unknown server {} for pipeline fetch", server_id);
            return WatchResponse::PipelinesUnavailable;
        };
        match server.fetch_pipelines().await {
            Ok(Some(listing)) => WatchResponse::Pipelines(listing),
            Ok(None) => WatchResponse::PipelinesUnavailable,
            Err(e) => {
                error!("Pipeline fetch failed: {}", e);
                WatchResponse::PipelinesUnavailable
            }
        }
    }

    async fn audio_chunk(&self, chunk: AudioChunk) -> WatchResponse {
        let outcome = self.reassembler.lock().await.accept(chunk);
        if let Some(submission) = outcome.completed.clone() {
            // Detached; results reach the watch as notifications
            let _task = self.assist.submit(submission);
        }
        outcome.ack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assist::AssistEvent;
    use crate::identifiers::{RequestIdentifier, ResponseIdentifier};
    use crate::memory::{CollectingSink, MemoryDirectory, MemoryHomeServer, MemoryStore};
    use crate::records::{Action, AssistConfig, MagicItem, MagicItemInfo, Pipeline, PipelineListing, WatchConfig};
    use crate::types::ManualTimeSource;

    struct Fixture {
        router: Router<ManualTimeSource>,
        server: Arc<MemoryHomeServer>,
        sink: Arc<CollectingSink>,
    }

    fn fixture(store: MemoryStore) -> Fixture {
        fixture_with(store, ReassemblyConfig::default())
    }

    fn fixture_with(store: MemoryStore, reassembly: ReassemblyConfig) -> Fixture {
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
                    AssistEvent::SpeechToText("lights off".into()),
                    AssistEvent::IntentEnd("Turned off the lights".into()),
                ]),
        );
        let sink = Arc::new(CollectingSink::new());
        let directory = MemoryDirectory::new().with_server("home", server.clone());
        let router = Router::new(
            Arc::new(store),
            Arc::new(directory),
            sink.clone(),
            reassembly,
            ManualTimeSource::starting_at(0),
        );
        Fixture { router, server, sink }
    }

    fn store_with_action() -> MemoryStore {
        MemoryStore::new().with_action(Action {
            id: "a1".into(),
            name: "Goodnight".into(),
            server_id: "home".into(),
        })
    }

    fn well_formed(request: RequestIdentifier) -> WireMessage {
        let base = WireMessage::request(request.as_str());
        match request {
            RequestIdentifier::Ping | RequestIdentifier::WatchConfig => base,
            RequestIdentifier::ActionRowPressed => base.with(keys::ACTION_ID, "a1"),
            RequestIdentifier::PushAction => {
                let mut info = crate::wire::Content::new();
                info.insert("identifier".into(), Value::from("OPEN"));
                base.with(keys::SERVER_ID, "home")
                    .with(keys::PUSH_ACTION_INFO, Value::Map(info))
            }
            RequestIdentifier::AssistPipelinesFetch => base.with(keys::SERVER_ID, "home"),
            RequestIdentifier::AssistAudioDataChunked => base
                .with(keys::CHUNK_DATA, b"A".to_vec())
                .with(keys::CHUNK_INDEX, 0u32)
                .with(keys::TOTAL_CHUNKS, 2u32)
                .with(keys::SERVER_ID, "home")
                .with(keys::PIPELINE_ID, "p1"),
            RequestIdentifier::MagicItemPressed => base
                .with(keys::ITEM_TYPE, "scene")
                .with(keys::ITEM_ID, "scene.movie")
                .with(keys::SERVER_ID, "home"),
        }
    }

    fn reply_identifier(reply: &WireMessage) -> ResponseIdentifier {
        reply.identifier.parse().unwrap()
    }

    #[tokio::test]
    async fn test_every_request_gets_one_legal_reply() {
        let f = fixture(store_with_action());
        for request in RequestIdentifier::ALL {
            let reply = f.router.dispatch(&well_formed(*request)).await.unwrap();
            assert!(
                request.accepts(reply_identifier(&reply)),
                "{} answered with {}",
                request,
                reply.identifier
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_identifier_gets_no_reply() {
        let f = fixture(MemoryStore::new());
        assert!(f.router.dispatch(&WireMessage::request("openPodBayDoors")).await.is_none());
        assert!(f.server.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_requests_get_failure_shape() {
        let f = fixture(MemoryStore::new());

        let reply = f.router.dispatch(&WireMessage::request("actionRowPressed")).await.unwrap();
        assert_eq!(reply.content[keys::FIRED], Value::Bool(false));

        let reply = f.router.dispatch(&WireMessage::request("assistPipelinesFetch")).await.unwrap();
        assert_eq!(reply.content[keys::ERROR], Value::Bool(true));

        let reply = f.router.dispatch(&WireMessage::request("pushAction")).await.unwrap();
        assert_eq!(reply.identifier, "pushActionResponse");
        assert!(reply.content.is_empty());

        assert!(f
            .router
            .dispatch(&WireMessage::request("assistAudioDataChunked"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_ping() {
        let f = fixture(MemoryStore::new());
        let reply = f.router.dispatch(&WireMessage::request("ping")).await.unwrap();
        assert_eq!(reply.identifier, "pong");
        assert!(reply.content.is_empty());
    }

    #[tokio::test]
    async fn test_watch_config_present_and_absent() {
        let f = fixture(MemoryStore::new());
        assert_eq!(f.router.handle(WatchRequest::WatchConfig).await, WatchResponse::EmptyWatchConfig);

        let items = vec![
            MagicItem {
                id: "scene.movie".into(),
                server_id: "home".into(),
                kind: MagicItemKind::Scene,
            },
            MagicItem {
                id: "script.gone".into(),
                server_id: "home".into(),
                kind: MagicItemKind::Script,
            },
        ];
        let store = MemoryStore::new()
            .with_config(WatchConfig {
                id: "cfg".into(),
                assist: AssistConfig::default(),
                items,
            })
            .with_info(MagicItemInfo {
                id: "scene.movie".into(),
                name: "Movie".into(),
                icon_name: "mdi:movie".into(),
                icon_color: Some("#ff0000".into()),
            });
        let f = fixture(store);
        match f.router.handle(WatchRequest::WatchConfig).await {
            WatchResponse::WatchConfig { config, infos } => {
                assert_eq!(config.items.len(), 2);
                assert_eq!(infos.len(), 1);
                assert_eq!(infos[0].name, "Movie");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_action_press_fires_action_event() {
        let f = fixture(store_with_action());
        let response = f
            .router
            .handle(WatchRequest::ActionRowPressed { action_id: "a1".into() })
            .await;
        assert_eq!(response, WatchResponse::ActionPressed { fired: true });
        let calls = f.server.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to_string(), "ios.action_fired");
        assert_eq!(calls[0].source, CallSource::Phone);
    }

    #[tokio::test]
    async fn test_action_press_failures() {
        let f = fixture(store_with_action());
        let unknown = f
            .router
            .handle(WatchRequest::ActionRowPressed { action_id: "nope".into() })
            .await;
        assert_eq!(unknown, WatchResponse::ActionPressed { fired: false });

        f.server.reject_calls(true);
        let rejected = f
            .router
            .handle(WatchRequest::ActionRowPressed { action_id: "a1".into() })
            .await;
        assert_eq!(rejected, WatchResponse::ActionPressed { fired: false });
    }

    #[tokio::test]
    async fn test_folder_press_is_a_no_op() {
        let f = fixture(MemoryStore::new());
        let response = f
            .router
            .handle(WatchRequest::MagicItemPressed {
                kind: MagicItemKind::Folder,
                item_id: "f1".into(),
                server_id: "home".into(),
            })
            .await;
        assert_eq!(response, WatchResponse::MagicItemPressed { fired: false });
        assert!(f.server.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_magic_item_entity_and_action() {
        let f = fixture(store_with_action());
        let entity = f
            .router
            .handle(WatchRequest::MagicItemPressed {
                kind: MagicItemKind::Entity,
                item_id: "input_button.chime".into(),
                server_id: "home".into(),
            })
            .await;
        assert_eq!(entity, WatchResponse::MagicItemPressed { fired: true });

        let action = f
            .router
            .handle(WatchRequest::MagicItemPressed {
                kind: MagicItemKind::Action,
                item_id: "a1".into(),
                server_id: "home".into(),
            })
            .await;
        assert_eq!(action, WatchResponse::MagicItemPressed { fired: true });

        let calls: Vec<String> = f.server.calls().await.iter().map(|c| c.to_string()).collect();
        assert_eq!(calls, vec!["input_button.press", "ios.action_fired"]);
    }

    #[tokio::test]
    async fn test_magic_item_unknown_server() {
        let f = fixture(MemoryStore::new());
        let response = f
            .router
            .handle(WatchRequest::MagicItemPressed {
                kind: MagicItemKind::Script,
                item_id: "script.goodnight".into(),
                server_id: "cabin".into(),
            })
            .await;
        assert_eq!(response, WatchResponse::MagicItemPressed { fired: false });
    }

    #[tokio::test]
    async fn test_pipelines_fetch() {
        let f = fixture(MemoryStore::new());
        match f
            .router
            .handle(WatchRequest::AssistPipelinesFetch { server_id: "home".into() })
            .await
        {
            WatchResponse::Pipelines(listing) => assert_eq!(listing.preferred_pipeline, "p1"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            f.router
                .handle(WatchRequest::AssistPipelinesFetch { server_id: "cabin".into() })
                .await,
            WatchResponse::PipelinesUnavailable
        );
    }

    #[tokio::test]
    async fn test_push_action_relayed() {
        let f = fixture(MemoryStore::new());
        let reply = f
            .router
            .dispatch(&well_formed(RequestIdentifier::PushAction))
            .await
            .unwrap();
        assert_eq!(reply.identifier, "pushActionResponse");
        let relayed = f.server.push_actions().await;
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].identifier, "OPEN");
    }

    #[tokio::test]
    async fn test_chunked_audio_acks_then_streams_results() {
        let f = fixture(MemoryStore::new());
        let second = AudioChunk {
            server_id: "home".into(),
            pipeline_id: "p1".into(),
            index: 1,
            total: 2,
            data: b"B".to_vec(),
        };
        let first = AudioChunk {
            index: 0,
            data: b"A".to_vec(),
            ..second.clone()
        };

        let ack = f.router.handle(WatchRequest::AssistAudioChunk(second)).await;
        assert_eq!(ack, WatchResponse::ChunkAck { chunk_index: 1, total_chunks: 2 });
        assert!(f.server.assist_requests().await.is_empty());

        let ack = f.router.handle(WatchRequest::AssistAudioChunk(first)).await;
        assert_eq!(ack, WatchResponse::ChunkAck { chunk_index: 0, total_chunks: 2 });

        // The assist run is spawned; wait until both events are relayed
        for _ in 0..100 {
            if f.sink.messages().await.len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let requests = f.server.assist_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].audio, b"AB");

        let relayed: Vec<String> = f.sink.messages().await.into_iter().map(|m| m.identifier).collect();
        assert_eq!(relayed, vec!["assistSTTResponse", "assistIntentEndResponse"]);
    }

    #[tokio::test]
    async fn test_single_shot_audio_notification() {
        let f = fixture(MemoryStore::new());
        let message = WireMessage::notification("assistAudioData")
            .with(keys::AUDIO_DATA, vec![1u8, 2, 3])
            .with(keys::SERVER_ID, "home")
            .with(keys::PIPELINE_ID, "p1")
            .with(keys::AUDIO_SAMPLE_RATE, 44_100u32);
        let task = f.router.dispatch_notification(&message).await.unwrap();
        assert_eq!(task.await.unwrap(), 2);
        assert_eq!(f.server.assist_requests().await[0].sample_rate, 44_100);
    }

    #[tokio::test]
    async fn test_unknown_server_audio_reports_error() {
        let f = fixture(MemoryStore::new());
        let message = WireMessage::notification("assistAudioData")
            .with(keys::AUDIO_DATA, vec![1u8])
            .with(keys::SERVER_ID, "cabin")
            .with(keys::PIPELINE_ID, "p1");
        let task = f.router.dispatch_notification(&message).await.unwrap();
        assert_eq!(task.await.unwrap(), 1);
        assert_eq!(f.sink.messages().await[0].identifier, "assistError");
    }

    #[tokio::test]
    async fn test_blob_audio_transfer() {
        let f = fixture(MemoryStore::new());
        let mut blob = Blob::new("assistAudioData", vec![9u8; 32]);
        blob.metadata = blob
            .metadata
            .with(keys::SERVER_ID, "home")
            .with(keys::PIPELINE_ID, "p1");
        let task = f.router.dispatch_blob(&blob).await.unwrap();
        assert_eq!(task.await.unwrap(), 2);
        assert_eq!(f.server.assist_requests().await[0].audio.len(), 32);
    }

    #[tokio::test]
    async fn test_audio_without_rate_uses_configured_rate() {
        let config = ReassemblyConfig {
            sample_rate: 44_100,
            ..ReassemblyConfig::default()
        };
        let f = fixture_with(MemoryStore::new(), config);

        let message = WireMessage::notification("assistAudioData")
            .with(keys::AUDIO_DATA, vec![1u8, 2])
            .with(keys::SERVER_ID, "home")
            .with(keys::PIPELINE_ID, "p1");
        f.router.dispatch_notification(&message).await.unwrap().await.unwrap();

        let mut blob = Blob::new("assistAudioData", vec![7u8; 8]);
        blob.metadata = blob
            .metadata
            .with(keys::SERVER_ID, "home")
            .with(keys::PIPELINE_ID, "p1");
        f.router.dispatch_blob(&blob).await.unwrap().await.unwrap();

        let rates: Vec<u32> = f
            .server
            .assist_requests()
            .await
            .iter()
            .map(|request| request.sample_rate)
            .collect();
        assert_eq!(rates, vec![44_100, 44_100]);
    }
}
