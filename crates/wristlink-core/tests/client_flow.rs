//! Watch client and Assist session driven against a phone-side router

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fixture, goodnight, CannedTransport};
use wristlink_core::memory::{MemoryHomeServer, MemoryStore};
use wristlink_core::{
    AudioDelivery, CallSource, ChatRole, ClientConfig, ClientError, ConfigFetch, HomeServer,
    RequestIdentifier, SessionState, SessionStep, WatchClient, WatchResponse, WireMessage,
};

#[tokio::test]
async fn test_empty_store_reports_empty_config() {
    let f = fixture(MemoryStore::new());
    let client = WatchClient::new(f.transport.clone(), ClientConfig::testing());
    assert_eq!(client.fetch_config().await.unwrap(), ConfigFetch::Empty);
}

#[tokio::test]
async fn test_press_action_through_phone() {
    let f = fixture(MemoryStore::new().with_action(goodnight()));
    let client = WatchClient::new(f.transport.clone(), ClientConfig::testing());

    assert!(client.press_action(&goodnight()).await.unwrap());
    let calls = f.server.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source, CallSource::Phone);
}

#[tokio::test]
async fn test_press_action_falls_back_when_unreachable() {
    let f = fixture(MemoryStore::new().with_action(goodnight()));
    let direct = Arc::new(MemoryHomeServer::new());
    let fallback: Arc<dyn HomeServer> = direct.clone();
    let client =
        WatchClient::new(f.transport.clone(), ClientConfig::testing()).with_fallback(fallback);

    f.transport.set_reachable(false);
    assert!(client.press_action(&goodnight()).await.unwrap());

    assert!(f.server.calls().await.is_empty());
    let calls = direct.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to_string(), "ios.action_fired");
    assert_eq!(calls[0].source, CallSource::Watch);

    direct.reject_calls(true);
    assert!(!client.press_action(&goodnight()).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_without_fallback() {
    let f = fixture(MemoryStore::new());
    let client = WatchClient::new(f.transport.clone(), ClientConfig::testing());
    f.transport.set_reachable(false);

    assert!(matches!(client.ping().await, Err(ClientError::NotReachable)));
    assert!(matches!(
        client.press_action(&goodnight()).await,
        Err(ClientError::NotReachable)
    ));
}

#[tokio::test]
async fn test_reply_must_answer_the_request() {
    let transport = Arc::new(CannedTransport {
        reply: WireMessage::request("pong"),
    });
    let client = WatchClient::new(transport, ClientConfig::testing());

    client.ping().await.unwrap();
    match client.fetch_config().await {
        Err(ClientError::UnexpectedReply { request, reply }) => {
            assert_eq!(request, RequestIdentifier::WatchConfig);
            assert_eq!(reply, "pong");
        }
        other => panic!("expected an unexpected reply error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chunk_ack_must_echo_index() {
    let reply = WatchResponse::ChunkAck {
        chunk_index: 5,
        total_chunks: 9,
    }
    .to_message()
    .unwrap();
    let client = WatchClient::new(Arc::new(CannedTransport { reply }), ClientConfig::testing());

    let result = client.send_audio(&[0; 12], "home", "p1", |_, _| {}).await;
    assert!(matches!(
        result,
        Err(ClientError::UnexpectedReply {
            request: RequestIdentifier::AssistAudioDataChunked,
            ..
        })
    ));
}

#[tokio::test]
async fn test_assist_session_against_router() {
    let f = fixture(MemoryStore::new());
    let client = WatchClient::new(f.transport.clone(), ClientConfig::testing());
    let mut session = wristlink_core::AssistSession::new("home", "p1", 4);

    session.start_recording();
    let step = session.submit(&client, vec![3; 11]).await.unwrap();
    assert!(matches!(step, SessionStep::Send { chunks: 3, .. }));
    assert_eq!(session.state(), &SessionState::AwaitingResponse);

    let mut relayed = Vec::new();
    for _ in 0..100 {
        relayed = f.sink.messages().await;
        if relayed.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for message in &relayed {
        assert!(session.on_notification(message));
    }

    assert_eq!(session.state(), &SessionState::Idle);
    let transcript: Vec<(ChatRole, &str)> = session
        .chat_items()
        .iter()
        .map(|item| (item.role, item.text.as_str()))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (ChatRole::User, "what time is it"),
            (ChatRole::Assistant, "It is noon"),
        ]
    );
}

#[tokio::test]
async fn test_single_shot_and_blob_paths_reach_pipeline() {
    let f = fixture(MemoryStore::new());
    let client = WatchClient::new(f.transport.clone(), ClientConfig::testing());

    let delivery = client.send_audio(&[1, 2], "home", "p1", |_, _| {}).await.unwrap();
    assert_eq!(delivery, AudioDelivery::SingleShot);

    f.transport.set_reachable(false);
    client.queue_audio_transfer(vec![9; 40], "home", "p1").await.unwrap();

    let requests = f.server.assist_requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].audio, vec![1, 2]);
    assert_eq!(requests[1].audio.len(), 40);
}

#[tokio::test]
async fn test_session_fails_on_pipeline_error() {
    let f = fixture(MemoryStore::new());
    let client = WatchClient::new(f.transport.clone(), ClientConfig::testing());
    let mut session = wristlink_core::AssistSession::new("elsewhere", "p1", 4);

    session.start_recording();
    session.submit(&client, vec![1, 2]).await.unwrap();

    let relayed = f.sink.messages().await;
    assert_eq!(relayed.len(), 1);
    assert!(session.on_notification(&relayed[0]));
    assert!(matches!(session.state(), SessionState::Failed { .. }));
    assert_eq!(session.chat_items().last().map(|item| item.role), Some(ChatRole::Error));
}
