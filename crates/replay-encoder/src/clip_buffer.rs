//! Packet-framed byte buffer on top of the block circular buffer.
//!
//! Each packet is stored as a little-endian `u32` payload length, a
//! little-endian `u64` timestamp, then the payload. The buffer keeps a
//! handle on every packet start so a clip can be frozen on packet
//! boundaries, and it never leaves the tail in the middle of a packet.

use std::collections::VecDeque;

use replay_buffer::{BlockCirclebuf, BufferStats, HandleId, ProtectedRange};
use replay_core::{ReplayError, Result};
use tracing::{debug, info, trace};

/// Bytes of framing in front of every payload.
pub const PACKET_HEADER_LEN: usize = 12;

#[derive(Debug)]
struct PacketMark {
    start: HandleId,
    timestamp_ns: u64,
    len: usize,
}

/// A packet read back out of a clip buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub timestamp_ns: u64,
    pub payload: Vec<u8>,
}

/// Packets frozen out of the rotation by [`ClipBuffer::save_clip`].
#[derive(Debug)]
pub struct SavedClip {
    range: ProtectedRange,
    pub packet_count: usize,
    pub first_timestamp_ns: u64,
    pub last_timestamp_ns: u64,
}

impl SavedClip {
    /// Frozen bytes, framing included.
    pub fn len(&self) -> usize {
        self.range.len
    }

    pub fn is_empty(&self) -> bool {
        self.range.len == 0
    }

    /// Timestamp span covered by the clip.
    pub fn duration_ns(&self) -> u64 {
        self.last_timestamp_ns.saturating_sub(self.first_timestamp_ns)
    }
}

/// Circular buffer of timestamped variable-length packets.
#[derive(Debug)]
pub struct ClipBuffer {
    buffer: BlockCirclebuf<u8>,
    packets: VecDeque<PacketMark>,
    tracked_bytes: usize,
}

fn encode_header(len: u32, timestamp_ns: u64) -> [u8; PACKET_HEADER_LEN] {
    let mut header = [0u8; PACKET_HEADER_LEN];
    header[..4].copy_from_slice(&len.to_le_bytes());
    header[4..].copy_from_slice(&timestamp_ns.to_le_bytes());
    header
}

fn decode_header(header: &[u8]) -> Result<(usize, u64)> {
    if header.len() < PACKET_HEADER_LEN {
        return Err(ReplayError::CorruptPacket(format!(
            "truncated header of {} bytes",
            header.len()
        )));
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&header[..4]);
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&header[4..PACKET_HEADER_LEN]);
    Ok((u32::from_le_bytes(len) as usize, u64::from_le_bytes(timestamp)))
}

/// Split a run of framed packets back into packets.
pub fn parse_packets(mut bytes: &[u8]) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    while !bytes.is_empty() {
        let (len, timestamp_ns) = decode_header(bytes)?;
        let end = PACKET_HEADER_LEN + len;
        if bytes.len() < end {
            return Err(ReplayError::CorruptPacket(format!(
                "payload of {} bytes runs past the end of the clip",
                len
            )));
        }
        packets.push(Packet {
            timestamp_ns,
            payload: bytes[PACKET_HEADER_LEN..end].to_vec(),
        });
        bytes = &bytes[end..];
    }
    Ok(packets)
}

impl ClipBuffer {
    /// Create a clip buffer holding `capacity` bytes of framed packets.
    pub fn new(capacity: usize) -> Result<Self> {
        let buffer = BlockCirclebuf::new(capacity)?;
        info!(capacity, "Clip buffer created");
        Ok(Self {
            buffer,
            packets: VecDeque::new(),
            tracked_bytes: 0,
        })
    }

    /// Number of whole packets currently buffered.
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// Buffered bytes, framing included.
    pub fn buffered_bytes(&self) -> usize {
        self.tracked_bytes
    }

    pub fn newest_timestamp(&self) -> Option<u64> {
        self.packets.back().map(|p| p.timestamp_ns)
    }

    pub fn oldest_timestamp(&self) -> Option<u64> {
        self.packets.front().map(|p| p.timestamp_ns)
    }

    pub fn stats(&self) -> &BufferStats {
        self.buffer.stats()
    }

    /// The underlying byte buffer.
    pub fn buffer(&self) -> &BlockCirclebuf<u8> {
        &self.buffer
    }

    /// Append a packet, dropping the oldest whole packets if it does not fit.
    pub fn push_packet(&mut self, timestamp_ns: u64, payload: &[u8]) -> Result<()> {
        let len = PACKET_HEADER_LEN + payload.len();
        let writable = self.buffer.writable_capacity();
        if len > writable {
            return Err(ReplayError::InvalidParameter(format!(
                "packet of {} bytes does not fit in {} writable bytes",
                len, writable
            )));
        }
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            ReplayError::InvalidParameter(format!("payload of {} bytes", payload.len()))
        })?;

        let displaced_before = self.buffer.stats().displaced;
        let start = self.buffer.track_head();
        self.buffer.write(&encode_header(payload_len, timestamp_ns));
        self.buffer.write(payload);

        self.packets.push_back(PacketMark {
            start,
            timestamp_ns,
            len,
        });
        self.tracked_bytes += len;

        if self.buffer.stats().displaced != displaced_before {
            self.drop_displaced()?;
        }
        trace!(timestamp_ns, len, "Packet buffered");
        Ok(())
    }

    /// Forget packets the head has overwritten and move the tail to the next
    /// packet boundary.
    fn drop_displaced(&mut self) -> Result<()> {
        let live = self.buffer.buffer_health();
        let mut dropped = 0;
        while self.tracked_bytes > live {
            let Some(mark) = self.packets.pop_front() else {
                break;
            };
            self.tracked_bytes -= mark.len;
            self.buffer.release_handle(mark.start)?;
            dropped += 1;
        }

        let partial = live - self.tracked_bytes;
        if partial > 0 {
            self.buffer.skip(partial);
        }
        debug!(dropped, partial, "Dropped displaced packets");
        Ok(())
    }

    /// Drop the oldest packet unread.
    fn discard_oldest(&mut self) -> Result<()> {
        let Some(mark) = self.packets.pop_front() else {
            return Ok(());
        };
        self.tracked_bytes -= mark.len;
        self.buffer.release_handle(mark.start)?;
        let skipped = self.buffer.skip(mark.len);
        if skipped != mark.len {
            return Err(ReplayError::CorruptPacket(format!(
                "only {} of {} packet bytes left to discard",
                skipped, mark.len
            )));
        }
        Ok(())
    }

    /// Remove and return the oldest packet.
    pub fn pop_packet(&mut self) -> Result<Option<Packet>> {
        let Some(mark) = self.packets.pop_front() else {
            return Ok(None);
        };
        self.tracked_bytes -= mark.len;
        self.buffer.release_handle(mark.start)?;

        let mut header = [0u8; PACKET_HEADER_LEN];
        let read = self.buffer.read(&mut header);
        let (len, timestamp_ns) = decode_header(&header[..read])?;
        if PACKET_HEADER_LEN + len != mark.len || timestamp_ns != mark.timestamp_ns {
            return Err(ReplayError::CorruptPacket(format!(
                "header says {} bytes at {}, expected {} bytes at {}",
                len,
                timestamp_ns,
                mark.len - PACKET_HEADER_LEN,
                mark.timestamp_ns
            )));
        }

        let mut payload = vec![0u8; len];
        let read = self.buffer.read(&mut payload);
        if read != len {
            return Err(ReplayError::CorruptPacket(format!(
                "payload truncated to {} of {} bytes",
                read, len
            )));
        }
        Ok(Some(Packet {
            timestamp_ns,
            payload,
        }))
    }

    /// Freeze every buffered packet no older than `max_age_ns` relative to
    /// the newest one. The frozen bytes stay out of the write rotation until
    /// [`release_clip`](Self::release_clip).
    ///
    /// Packets frozen by an earlier clip can be saved again. When the ring is
    /// exactly full and the clip would take all of it, the oldest packet is
    /// dropped so the head keeps room to write.
    pub fn save_clip(&mut self, max_age_ns: u64) -> Result<SavedClip> {
        let newest = self
            .newest_timestamp()
            .ok_or_else(|| ReplayError::NotFound("no packets buffered".into()))?;
        let cutoff = newest.saturating_sub(max_age_ns);

        let mut first = self
            .packets
            .iter()
            .position(|p| p.timestamp_ns >= cutoff)
            .unwrap_or(self.packets.len() - 1);
        let mut from = self.buffer.handle_position(self.packets[first].start)?;
        let to = self.buffer.head();
        if from == to {
            // Only the oldest packet can start at the head of a full ring.
            self.discard_oldest()?;
            first = first.saturating_sub(1);
            let mark = self.packets.get(first).ok_or_else(|| {
                ReplayError::InvalidParameter("a single packet fills the whole buffer".into())
            })?;
            from = self.buffer.handle_position(mark.start)?;
            debug!("Dropped the oldest packet to keep the head writable");
        }
        let first_timestamp_ns = self.packets[first].timestamp_ns;

        let range = self.buffer.protect_range(from, to)?;
        let clip = SavedClip {
            range,
            packet_count: self.packets.len() - first,
            first_timestamp_ns,
            last_timestamp_ns: newest,
        };
        info!(
            packets = clip.packet_count,
            bytes = clip.len(),
            "Clip saved"
        );
        Ok(clip)
    }

    /// Copy a saved clip's packets out without touching the stream.
    pub fn read_clip(&self, clip: &SavedClip) -> Result<Vec<Packet>> {
        let mut bytes = Vec::with_capacity(clip.len());
        self.buffer.read_range(&clip.range, &mut bytes)?;
        parse_packets(&bytes)
    }

    /// Return a saved clip's memory to the rotation.
    pub fn release_clip(&mut self, clip: SavedClip) -> Result<()> {
        let bytes = clip.len();
        self.buffer.release_range(clip.range)?;
        info!(bytes, "Clip released");
        Ok(())
    }
}
