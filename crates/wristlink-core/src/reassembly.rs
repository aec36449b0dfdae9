//! Chunked audio reassembly
//!
//! The watch splits long recordings into indexed chunks and sends each one as
//! an immediate request. Chunks are keyed by `(serverId, pipelineId)` and
//! concatenated by index once every index below `totalChunks` has arrived.

use alloc::collections::BTreeMap;
use core::fmt;
use tracing::{debug, info, warn};

use crate::assist::AudioSubmission;
use crate::config::ReassemblyConfig;
use crate::messages::{AudioChunk, WatchResponse};
use crate::types::{TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Session Key
// ----------------------------------------------------------------------------

/// Identifies one in-flight recording
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    pub server_id: String,
    pub pipeline_id: String,
}

impl SessionKey {
    pub fn new(server_id: impl Into<String>, pipeline_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            pipeline_id: pipeline_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server_id, self.pipeline_id)
    }
}

// ----------------------------------------------------------------------------
// Chunk Splitting
// ----------------------------------------------------------------------------

/// Split audio into chunks of at most `chunk_size` bytes. Empty audio yields
/// no chunks.
pub fn split_audio(
    audio: &[u8],
    chunk_size: usize,
    server_id: &str,
    pipeline_id: &str,
) -> Vec<AudioChunk> {
    let chunk_size = chunk_size.max(1);
    let total = audio.len().div_ceil(chunk_size) as u32;
    audio
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, data)| AudioChunk {
            server_id: server_id.to_string(),
            pipeline_id: pipeline_id.to_string(),
            index: index as u32,
            total,
            data: data.to_vec(),
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Reassembler
// ----------------------------------------------------------------------------

/// Result of accepting one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    /// Index echoed back to the watch
    pub chunk_index: u32,
    /// The session's expected total after this chunk
    pub total_chunks: u32,
    /// Reassembled audio when this chunk completed its session
    pub completed: Option<AudioSubmission>,
}

impl ChunkOutcome {
    /// Acknowledgement reply for the chunk
    pub fn ack(&self) -> WatchResponse {
        WatchResponse::ChunkAck {
            chunk_index: self.chunk_index,
            total_chunks: self.total_chunks,
        }
    }
}

#[derive(Debug)]
struct ChunkSession {
    received: BTreeMap<u32, Vec<u8>>,
    expected_total: u32,
    started_at: Timestamp,
    last_activity: Timestamp,
    buffered_bytes: usize,
}

impl ChunkSession {
    fn new(expected_total: u32, started_at: Timestamp) -> Self {
        Self {
            received: BTreeMap::new(),
            expected_total,
            started_at,
            last_activity: started_at,
            buffered_bytes: 0,
        }
    }

    fn insert(&mut self, index: u32, data: Vec<u8>) {
        self.buffered_bytes += data.len();
        if let Some(previous) = self.received.insert(index, data) {
            self.buffered_bytes -= previous.len();
        }
    }

    /// Apply a new expected total, discarding indices it no longer covers
    fn retotal(&mut self, total: u32) -> usize {
        self.expected_total = total;
        let dropped = self.received.split_off(&total);
        let bytes: usize = dropped.values().map(Vec::len).sum();
        self.buffered_bytes -= bytes;
        dropped.len()
    }

    fn is_complete(&self) -> bool {
        self.received.len() == self.expected_total as usize
    }

    fn assemble(self) -> Vec<u8> {
        let mut audio = Vec::with_capacity(self.buffered_bytes);
        for data in self.received.into_values() {
            audio.extend_from_slice(&data);
        }
        audio
    }
}

/// Accumulates chunks per session until each session is complete
pub struct ChunkReassembler<T: TimeSource> {
    sessions: BTreeMap<SessionKey, ChunkSession>,
    config: ReassemblyConfig,
    time_source: T,
}

impl<T: TimeSource> ChunkReassembler<T> {
    pub fn new(config: ReassemblyConfig, time_source: T) -> Self {
        Self {
            sessions: BTreeMap::new(),
            config,
            time_source,
        }
    }

    /// Number of sessions currently buffering
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Indices received so far for a session
    pub fn received_indices(&self, key: &SessionKey) -> Vec<u32> {
        self.sessions
            .get(key)
            .map(|session| session.received.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Insert a chunk; the outcome always carries an ack and carries the
    /// reassembled audio exactly when this chunk completed the session.
    pub fn accept(&mut self, chunk: AudioChunk) -> ChunkOutcome {
        let now = self.time_source.now();
        self.evict_expired_at(now);

        let key = SessionKey::new(chunk.server_id, chunk.pipeline_id);
        let chunk_index = chunk.index;
        let total_chunks = chunk.total;

        if !self.sessions.contains_key(&key) {
            while self.sessions.len() >= self.config.max_sessions {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        let session = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| ChunkSession::new(total_chunks, now));

        if session.expected_total != total_chunks {
            let dropped = session.retotal(total_chunks);
            warn!(
                "Session {} total changed to {} at chunk {} ({} chunks dropped)",
                key, total_chunks, chunk_index, dropped
            );
        }
        session.last_activity = now;
        session.insert(chunk_index, chunk.data);

        if session.buffered_bytes > self.config.max_session_bytes {
            warn!(
                "Session {} exceeded {} buffered bytes, discarding",
                key, self.config.max_session_bytes
            );
            self.sessions.remove(&key);
            return ChunkOutcome {
                chunk_index,
                total_chunks,
                completed: None,
            };
        }

        debug!(
            "Chunk {}/{} for session {} ({} received)",
            chunk_index + 1,
            total_chunks,
            key,
            session.received.len()
        );

        let completed = if session.is_complete() {
            self.sessions.remove(&key).map(|session| {
                let audio = session.assemble();
                let submission = AudioSubmission::new(
                    key.server_id.as_str(),
                    key.pipeline_id.as_str(),
                    audio,
                    self.config.sample_rate,
                );
                debug!(
                    "Session {} complete: {} bytes, crc32 {:08x}",
                    key,
                    submission.audio.len(),
                    submission.checksum
                );
                submission
            })
        } else {
            None
        };

        ChunkOutcome {
            chunk_index,
            total_chunks,
            completed,
        }
    }

    /// Drop sessions that received no chunk within the configured TTL; returns
    /// how many were dropped
    pub fn evict_expired(&mut self) -> usize {
        let now = self.time_source.now();
        self.evict_expired_at(now)
    }

    fn evict_expired_at(&mut self, now: Timestamp) -> usize {
        let ttl = self.config.session_ttl();
        let before = self.sessions.len();
        self.sessions.retain(|key, session| {
            let alive = now.duration_since(session.last_activity) < ttl;
            if !alive {
                info!(
                    "Evicting stale session {} ({}/{} chunks)",
                    key,
                    session.received.len(),
                    session.expected_total
                );
            }
            alive
        });
        before - self.sessions.len()
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|(_, session)| session.started_at)
            .map(|(key, _)| key.clone());
        match oldest {
            Some(key) => {
                info!("Evicting session {} to make room", key);
                self.sessions.remove(&key);
                true
            }
            None => false,
        }
    }
}
