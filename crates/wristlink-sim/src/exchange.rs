//! Scripted phone/watch exchange
//!
//! Spawns a phone endpoint over the in-memory paired transport and drives it
//! from a watch client the way the watch app would: ping, configuration,
//! shortcut presses, pipeline discovery and one Assist interaction.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};
use wristlink_core::memory::MemoryDirectory;
use wristlink_core::{
    AssistSession, BackgroundTask, ConfigFetch, HomeServer, SessionState, SessionStep, WatchClient,
    WristlinkConfig,
};
use wristlink_runtime::{EndpointBuilder, EndpointStats, InboundEvent, InboundQueue, MemoryTransport};

use crate::scenario::Scenario;

/// How long the watch waits for relayed Assist results
const ASSIST_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct Report {
    pub presses_fired: usize,
    pub presses_failed: usize,
    pub transcript: Vec<String>,
    pub stats: EndpointStats,
}

/// Background refresh window that just logs how it ended
struct RefreshTask;

impl BackgroundTask for RefreshTask {
    fn set_task_completed(self: Box<Self>, snapshot_refreshed: bool) {
        info!("Background refresh completed, snapshot refreshed: {}", snapshot_refreshed);
    }

    fn label(&self) -> &str {
        "sim-refresh"
    }
}

pub async fn run(
    config: WristlinkConfig,
    scenario: Scenario,
    audio_bytes: usize,
    go_unreachable: bool,
) -> anyhow::Result<Report> {
    let ((phone, phone_inbox), (watch, mut watch_inbox)) = MemoryTransport::pair(&config.channels);
    let server = scenario.server();
    let directory = MemoryDirectory::new().with_server(scenario.server_id.clone(), server.clone());

    let mut handle = EndpointBuilder::new()
        .with_config(config.clone())
        .with_store(Arc::new(scenario.store()))
        .with_servers(Arc::new(directory))
        .spawn(Arc::new(phone), phone_inbox)
        .context("failed to start phone endpoint")?;
    handle.begin_background_task(Box::new(RefreshTask))?;

    let watch = Arc::new(watch);
    let fallback: Arc<dyn HomeServer> = server.clone();
    let client = WatchClient::new(watch.clone(), config.client.clone()).with_fallback(fallback);
    let mut report = Report::default();

    client.ping().await?;
    info!("Phone answered ping");

    let items = match client.fetch_config().await? {
        ConfigFetch::Config { config, infos } => {
            info!("Watch config {} with {} item(s)", config.id, infos.len());
            config.items
        }
        ConfigFetch::Empty => {
            warn!("Phone has no watch configuration");
            Vec::new()
        }
    };

    if go_unreachable {
        info!("Taking the phone out of range");
        watch.set_reachable(false);
    }

    for action in &scenario.actions {
        match client.press_action(action).await {
            Ok(true) => report.presses_fired += 1,
            Ok(false) => report.presses_failed += 1,
            Err(e) => {
                warn!("Action {} not sent: {}", action.id, e);
                report.presses_failed += 1;
            }
        }
    }

    if go_unreachable {
        let audio = vec![0u8; audio_bytes];
        client
            .queue_audio_transfer(audio, &scenario.server_id, &scenario.preferred_pipeline)
            .await?;
        info!("Queued {} bytes of audio for later delivery", audio_bytes);
        report.stats = handle.shutdown().await?;
        return Ok(report);
    }

    for item in &items {
        match client.press_magic_item(item).await? {
            true => report.presses_fired += 1,
            false => report.presses_failed += 1,
        }
    }

    let Some(listing) = client.fetch_pipelines(&scenario.server_id).await? else {
        bail!("server {} has no pipelines", scenario.server_id);
    };
    info!(
        "{} pipeline(s), preferred: {}",
        listing.pipelines.len(),
        listing.preferred_pipeline
    );

    let mut session = AssistSession::new(
        scenario.server_id.clone(),
        listing.preferred_pipeline.clone(),
        config.client.chunk_size,
    );
    session.start_recording();
    let step = session.submit(&client, vec![0u8; audio_bytes]).await?;
    if let SessionStep::Send { chunks, .. } = step {
        info!("Sent {} bytes as {} chunk(s)", audio_bytes, chunks);
    }

    await_assist(&mut session, &mut watch_inbox).await?;
    report.transcript = session
        .chat_items()
        .iter()
        .map(|item| format!("{:?}: {}", item.role, item.text))
        .collect();

    report.stats = handle.shutdown().await?;
    Ok(report)
}

async fn await_assist(session: &mut AssistSession, inbox: &mut InboundQueue) -> anyhow::Result<()> {
    while matches!(session.state(), SessionState::AwaitingResponse) {
        let event = tokio::time::timeout(ASSIST_WAIT, inbox.recv())
            .await
            .context("timed out waiting for Assist results")?;
        match event {
            Some(InboundEvent::Message(message)) => {
                session.on_notification(&message);
            }
            Some(other) => warn!("Watch ignoring {}", other.identifier()),
            None => bail!("phone went away"),
        }
    }
    if let SessionState::Failed { reason } = session.state() {
        warn!("Assist failed: {}", reason);
    }
    Ok(())
}
