//! Host-agnostic replay filter instance.
//!
//! Media passes through untouched while a copy goes to the clip encoder.
//! Saved replays stay frozen in the encoder's buffers until discarded.

use std::collections::HashMap;

use parking_lot::Mutex;
use replay_core::{AudioPacket, ReplayConfig, ReplayError, Result, VideoFrame};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::encoder::{ClipEncoder, ClipExport, EncodedClip, RawEncoder};

/// Summary of a saved replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedReplay {
    pub id: Uuid,
    pub video_frames: usize,
    pub audio_packets: usize,
    pub duration_ns: u64,
}

/// One filter attached to a media source.
pub struct ReplayFilter {
    config: ReplayConfig,
    encoder: Box<dyn ClipEncoder>,
    replays: Mutex<HashMap<Uuid, EncodedClip>>,
}

impl ReplayFilter {
    /// Create a filter backed by a [`RawEncoder`].
    pub fn new(config: ReplayConfig) -> Result<Self> {
        let encoder = RawEncoder::new(&config)?;
        Ok(Self::with_encoder(config, Box::new(encoder)))
    }

    pub fn with_encoder(config: ReplayConfig, encoder: Box<dyn ClipEncoder>) -> Self {
        info!(
            video_bytes = config.video_buffer_bytes,
            audio_bytes = config.audio_buffer_bytes,
            "Replay filter created"
        );
        Self {
            config,
            encoder,
            replays: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Swap the encoder. Replays saved with the old one are released first.
    pub fn set_encoder(&mut self, encoder: Box<dyn ClipEncoder>) -> Result<()> {
        let saved: Vec<EncodedClip> = self.replays.lock().drain().map(|(_, clip)| clip).collect();
        for clip in saved {
            self.encoder.release_clip(clip)?;
        }
        self.encoder = encoder;
        Ok(())
    }

    /// Record a video frame and hand it back unchanged.
    pub fn handle_video(&self, frame: VideoFrame) -> VideoFrame {
        if let Err(err) = self.encoder.encode_frame(&frame) {
            warn!(%err, timestamp_ns = frame.timestamp_ns, "Failed to buffer video frame");
        }
        frame
    }

    /// Record an audio packet and hand it back unchanged.
    pub fn handle_audio(&self, packet: AudioPacket) -> AudioPacket {
        if let Err(err) = self.encoder.encode_audio_packet(&packet) {
            warn!(%err, timestamp_ns = packet.timestamp_ns, "Failed to buffer audio packet");
        }
        packet
    }

    /// Freeze the last `duration_ns` of media, or the configured default.
    pub fn save_replay(&self, duration_ns: Option<u64>) -> Result<SavedReplay> {
        let duration = duration_ns.unwrap_or(self.config.replay_duration_ns);
        let clip = self.encoder.save_clip(duration)?;
        let replay = SavedReplay {
            id: Uuid::new_v4(),
            video_frames: clip.video_frames(),
            audio_packets: clip.audio_packets(),
            duration_ns: clip.duration_ns(),
        };
        self.replays.lock().insert(replay.id, clip);
        info!(id = %replay.id, frames = replay.video_frames, "Replay saved");
        Ok(replay)
    }

    /// Copy a saved replay's media out.
    pub fn export_replay(&self, id: Uuid) -> Result<ClipExport> {
        let replays = self.replays.lock();
        let clip = replays
            .get(&id)
            .ok_or_else(|| ReplayError::NotFound(format!("replay {}", id)))?;
        self.encoder.export_clip(clip)
    }

    /// Release a saved replay's memory back into rotation.
    pub fn discard_replay(&self, id: Uuid) -> Result<()> {
        let clip = self
            .replays
            .lock()
            .remove(&id)
            .ok_or_else(|| ReplayError::NotFound(format!("replay {}", id)))?;
        self.encoder.release_clip(clip)?;
        info!(%id, "Replay discarded");
        Ok(())
    }

    /// Ids of every replay still held.
    pub fn replay_ids(&self) -> Vec<Uuid> {
        self.replays.lock().keys().copied().collect()
    }
}
