//! Identifiers and the per-session id allocator.

use serde::Serialize;

/// Capture frame number of a packet.
pub type PacketId = u64;
/// Session-unique HTTP/2 frame id.
pub type FrameId = u64;
/// Session-unique TLS record id.
pub type RecordId = u64;
/// Session-unique physical segment id.
pub type SegmentId = u64;
/// HTTP/2 stream identifier.
pub type StreamId = u32;

/// Hands out monotonically increasing ids, starting at 1, per entity kind.
///
/// Owned by a session, so two captures never share counters.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    frames: u64,
    records: u64,
    segments: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_frame(&mut self) -> FrameId {
        self.frames += 1;
        self.frames
    }

    pub fn next_record(&mut self) -> RecordId {
        self.records += 1;
        self.records
    }

    pub fn next_segment(&mut self) -> SegmentId {
        self.segments += 1;
        self.segments
    }
}

/// Position of an item inside a packet's layer tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Location {
    pub packet_id: PacketId,
    pub layer_id: u32,
    pub sublayer_id: u32,
}

impl Location {
    pub fn new(packet_id: PacketId, layer_id: u32, sublayer_id: u32) -> Self {
        Self {
            packet_id,
            layer_id,
            sublayer_id,
        }
    }

    /// Ordering key on the packet's interleaved timeline.
    pub fn timeline_key(&self) -> (u32, u32) {
        (self.layer_id, self.sublayer_id)
    }
}
