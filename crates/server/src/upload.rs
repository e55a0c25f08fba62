// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chunked image upload reassembly for a single connection.
//!
//! Sessions are bounded by count, by decoded size and by idle time. Chunks
//! may arrive in any order; a finish with gaps leaves the session in place
//! so the client can send the missing pieces.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::{Duration, Instant};

use base64::Engine;
use tracing::{debug, info};

use crate::error::ChatError;

pub const WEBP_MIME: &str = "image/webp";

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub ttl: Duration,
    pub max_bytes: usize,
    pub max_chunks: u32,
    pub max_sessions: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            max_bytes: 5 * 1024 * 1024,
            max_chunks: 1024,
            max_sessions: 8,
        }
    }
}

#[derive(Debug)]
struct UploadSession {
    room_id: String,
    client_id: String,
    chunks: Vec<Option<Vec<u8>>>,
    bytes: usize,
    last_activity: Instant,
}

impl UploadSession {
    fn missing(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_none()).count()
    }
}

/// A fully received upload, removed from the connection's sessions.
#[derive(Debug)]
pub struct CompletedUpload {
    pub file_id: String,
    pub room_id: String,
    pub client_id: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct Uploads {
    limits: UploadLimits,
    sessions: HashMap<String, UploadSession>,
}

impl Uploads {
    pub fn new(limits: UploadLimits) -> Self {
        Self { limits, sessions: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open a session, replacing any existing one with the same file id.
    pub fn start(
        &mut self,
        file_id: &str,
        total_chunks: u32,
        room_id: &str,
        client_id: &str,
        now: Instant,
    ) -> Result<(), ChatError> {
        if file_id.trim().is_empty() {
            return Err(ChatError::validation("fileId must not be empty"));
        }
        if room_id.trim().is_empty() {
            return Err(ChatError::validation("roomId must not be empty"));
        }
        if total_chunks == 0 || total_chunks > self.limits.max_chunks {
            return Err(ChatError::validation(format!(
                "totalChunks must be between 1 and {}",
                self.limits.max_chunks
            )));
        }

        self.sweep(now);
        if !self.sessions.contains_key(file_id) && self.sessions.len() >= self.limits.max_sessions {
            return Err(ChatError::upload(format!(
                "too many concurrent uploads (max {})",
                self.limits.max_sessions
            )));
        }

        let session = UploadSession {
            room_id: room_id.to_owned(),
            client_id: client_id.to_owned(),
            chunks: vec![None; total_chunks as usize],
            bytes: 0,
            last_activity: now,
        };
        if self.sessions.insert(file_id.to_owned(), session).is_some() {
            debug!(file_id, "replaced existing upload session");
        }
        info!(file_id, total_chunks, room_id, client_id, "image upload started");
        Ok(())
    }

    /// Store one base64 chunk. Re-sending an index overwrites it.
    pub fn add_chunk(
        &mut self,
        file_id: &str,
        index: u32,
        data_b64: &str,
        now: Instant,
    ) -> Result<(), ChatError> {
        self.sweep(now);
        let max_bytes = self.limits.max_bytes;
        let session = self
            .sessions
            .get_mut(file_id)
            .ok_or_else(|| ChatError::upload(format!("no upload session for {file_id}")))?;

        let slot = index as usize;
        if slot >= session.chunks.len() {
            return Err(ChatError::validation(format!(
                "chunk index {index} out of range (totalChunks {})",
                session.chunks.len()
            )));
        }
        let data = base64::engine::general_purpose::STANDARD
            .decode(data_b64.trim())
            .map_err(|e| ChatError::validation(format!("chunk {index} is not valid base64: {e}")))?;

        let previous = session.chunks[slot].as_ref().map_or(0, Vec::len);
        let bytes = session.bytes - previous + data.len();
        if bytes > max_bytes {
            self.sessions.remove(file_id);
            return Err(ChatError::validation(format!(
                "upload exceeds {max_bytes} bytes; session discarded"
            )));
        }

        session.bytes = bytes;
        session.chunks[slot] = Some(data);
        session.last_activity = now;
        debug!(file_id, chunk_index = index, bytes, "image chunk received");
        Ok(())
    }

    /// Take a complete session. Gaps leave the session in place.
    pub fn finish(&mut self, file_id: &str, now: Instant) -> Result<CompletedUpload, ChatError> {
        self.sweep(now);
        let session = self
            .sessions
            .get_mut(file_id)
            .ok_or_else(|| ChatError::upload(format!("no upload session for {file_id}")))?;

        let missing = session.missing();
        if missing > 0 {
            session.last_activity = now;
            return Err(ChatError::upload(format!(
                "not all chunks received ({missing} of {} missing)",
                session.chunks.len()
            )));
        }

        let Some(session) = self.sessions.remove(file_id) else {
            return Err(ChatError::upload(format!("no upload session for {file_id}")));
        };
        let mut bytes = Vec::with_capacity(session.bytes);
        for chunk in session.chunks.into_iter().flatten() {
            bytes.extend_from_slice(&chunk);
        }
        Ok(CompletedUpload {
            file_id: file_id.to_owned(),
            room_id: session.room_id,
            client_id: session.client_id,
            bytes,
        })
    }

    /// Drop sessions idle for longer than the TTL. Returns their file ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let ttl = self.limits.ttl;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_activity) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for file_id in &expired {
            self.sessions.remove(file_id);
            info!(file_id, "image upload expired");
        }
        expired
    }

    /// Drop everything (connection teardown).
    pub fn clear(&mut self) -> usize {
        let dropped = self.sessions.len();
        self.sessions.clear();
        dropped
    }
}

/// Re-encode any supported image as lossless WebP.
pub fn reencode_webp(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let image = image::load_from_memory(bytes)?;
    let rgba = image::DynamicImage::ImageRgba8(image.to_rgba8());
    let mut out = Cursor::new(Vec::new());
    rgba.write_with_encoder(image::codecs::webp::WebPEncoder::new_lossless(&mut out))?;
    Ok(out.into_inner())
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
