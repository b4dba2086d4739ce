//! Clip encoders: turn the host's raw media into buffered clip packets.

use parking_lot::Mutex;
use replay_core::{AudioPacket, ReplayConfig, ReplayError, Result, VideoFrame};
use tracing::debug;

use crate::clip_buffer::{ClipBuffer, Packet, SavedClip};

/// Frozen clips of both streams, as returned by [`ClipEncoder::save_clip`].
#[derive(Debug)]
pub struct EncodedClip {
    pub video: Option<SavedClip>,
    pub audio: Option<SavedClip>,
}

impl EncodedClip {
    pub fn video_frames(&self) -> usize {
        self.video.as_ref().map_or(0, |clip| clip.packet_count)
    }

    pub fn audio_packets(&self) -> usize {
        self.audio.as_ref().map_or(0, |clip| clip.packet_count)
    }

    /// Longest timestamp span across both streams.
    pub fn duration_ns(&self) -> u64 {
        let video = self.video.as_ref().map_or(0, SavedClip::duration_ns);
        let audio = self.audio.as_ref().map_or(0, SavedClip::duration_ns);
        video.max(audio)
    }
}

/// Decoded contents of an [`EncodedClip`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipExport {
    pub frames: Vec<VideoFrame>,
    pub audio: Vec<AudioPacket>,
}

/// Receives media from a filter and keeps the most recent stretch of it.
///
/// Methods take `&self` so video and audio can arrive on different threads.
pub trait ClipEncoder: Send + Sync {
    fn encode_frame(&self, frame: &VideoFrame) -> Result<()>;

    fn encode_audio_packet(&self, packet: &AudioPacket) -> Result<()>;

    /// Freeze the last `duration_ns` of both streams.
    fn save_clip(&self, duration_ns: u64) -> Result<EncodedClip>;

    /// Decode a saved clip without releasing it.
    fn export_clip(&self, clip: &EncodedClip) -> Result<ClipExport>;

    /// Return a saved clip's memory to the encoder.
    fn release_clip(&self, clip: EncodedClip) -> Result<()>;
}

const VIDEO_META_LEN: usize = 8;
const AUDIO_META_LEN: usize = 6;

/// Stores frames and audio unmodified in two clip buffers.
#[derive(Debug)]
pub struct RawEncoder {
    video: Mutex<ClipBuffer>,
    audio: Mutex<ClipBuffer>,
}

impl RawEncoder {
    /// Create an encoder with buffers sized from `config`.
    pub fn new(config: &ReplayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            video: Mutex::new(ClipBuffer::new(config.video_buffer_bytes)?),
            audio: Mutex::new(ClipBuffer::new(config.audio_buffer_bytes)?),
        })
    }

    pub fn video_frame_count(&self) -> usize {
        self.video.lock().packet_count()
    }

    pub fn audio_packet_count(&self) -> usize {
        self.audio.lock().packet_count()
    }
}

fn save_stream(buffer: &Mutex<ClipBuffer>, duration_ns: u64) -> Result<Option<SavedClip>> {
    let mut buffer = buffer.lock();
    if buffer.packet_count() == 0 {
        return Ok(None);
    }
    buffer.save_clip(duration_ns).map(Some)
}

fn decode_frame(packet: Packet) -> Result<VideoFrame> {
    if packet.payload.len() < VIDEO_META_LEN {
        return Err(ReplayError::CorruptPacket("video frame without size".into()));
    }
    let mut width = [0u8; 4];
    width.copy_from_slice(&packet.payload[..4]);
    let mut height = [0u8; 4];
    height.copy_from_slice(&packet.payload[4..VIDEO_META_LEN]);
    Ok(VideoFrame::new(
        packet.timestamp_ns,
        u32::from_le_bytes(width),
        u32::from_le_bytes(height),
        packet.payload[VIDEO_META_LEN..].to_vec(),
    ))
}

fn decode_audio(packet: Packet) -> Result<AudioPacket> {
    if packet.payload.len() < AUDIO_META_LEN {
        return Err(ReplayError::CorruptPacket("audio packet without format".into()));
    }
    let mut rate = [0u8; 4];
    rate.copy_from_slice(&packet.payload[..4]);
    let mut channels = [0u8; 2];
    channels.copy_from_slice(&packet.payload[4..AUDIO_META_LEN]);
    Ok(AudioPacket::new(
        packet.timestamp_ns,
        u32::from_le_bytes(rate),
        u16::from_le_bytes(channels),
        packet.payload[AUDIO_META_LEN..].to_vec(),
    ))
}

impl ClipEncoder for RawEncoder {
    fn encode_frame(&self, frame: &VideoFrame) -> Result<()> {
        let mut payload = Vec::with_capacity(VIDEO_META_LEN + frame.size());
        payload.extend_from_slice(&frame.width.to_le_bytes());
        payload.extend_from_slice(&frame.height.to_le_bytes());
        payload.extend_from_slice(&frame.data);
        self.video.lock().push_packet(frame.timestamp_ns, &payload)
    }

    fn encode_audio_packet(&self, packet: &AudioPacket) -> Result<()> {
        let mut payload = Vec::with_capacity(AUDIO_META_LEN + packet.size());
        payload.extend_from_slice(&packet.sample_rate.to_le_bytes());
        payload.extend_from_slice(&packet.channels.to_le_bytes());
        payload.extend_from_slice(&packet.data);
        self.audio.lock().push_packet(packet.timestamp_ns, &payload)
    }

    fn save_clip(&self, duration_ns: u64) -> Result<EncodedClip> {
        let video = save_stream(&self.video, duration_ns)?;
        let audio = match save_stream(&self.audio, duration_ns) {
            Ok(audio) => audio,
            Err(err) => {
                if let Some(video) = video {
                    self.video.lock().release_clip(video)?;
                }
                return Err(err);
            }
        };
        if video.is_none() && audio.is_none() {
            return Err(ReplayError::NotFound("no media buffered".into()));
        }
        let clip = EncodedClip { video, audio };
        debug!(
            frames = clip.video_frames(),
            audio_packets = clip.audio_packets(),
            "Raw clip saved"
        );
        Ok(clip)
    }

    fn export_clip(&self, clip: &EncodedClip) -> Result<ClipExport> {
        let mut export = ClipExport::default();
        if let Some(video) = &clip.video {
            for packet in self.video.lock().read_clip(video)? {
                export.frames.push(decode_frame(packet)?);
            }
        }
        if let Some(audio) = &clip.audio {
            for packet in self.audio.lock().read_clip(audio)? {
                export.audio.push(decode_audio(packet)?);
            }
        }
        Ok(export)
    }

    fn release_clip(&self, clip: EncodedClip) -> Result<()> {
        if let Some(video) = clip.video {
            self.video.lock().release_clip(video)?;
        }
        if let Some(audio) = clip.audio {
            self.audio.lock().release_clip(audio)?;
        }
        Ok(())
    }
}
