//! HTTP/2 stream state machine and priority tree (RFC 7540 Section 5).
//!
//! Streams are built up during ingestion and replayed once the whole capture
//! is in: their frames are sorted by timestamp and fed through
//! [`Stream::process_frame`]. Invalid transitions leave the state untouched.
//!
//! Parent and child links are stream ids resolved through the session's
//! stream table, so the priority tree never holds references into itself.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameKind, PrioritySpec};
use crate::h2::{Direction, ErrorCode, StreamState};
use crate::ids::{FrameId, PacketId, StreamId};
use crate::object::WebObject;
use crate::packet::Packet;
use crate::statistics::Statistics;

/// Weight of a stream that never received priority information.
pub const DEFAULT_WEIGHT: i64 = 16;

/// One HTTP/2 stream.
#[derive(Debug, Clone, Serialize)]
pub struct Stream {
    pub id: StreamId,
    /// Packet whose frame created the stream.
    pub packet_id: PacketId,
    /// Source address of that packet.
    pub endpoint: String,
    pub direction: Direction,
    pub state: StreamState,
    pub weight: i64,
    /// Error code of the last RST_STREAM.
    pub error: ErrorCode,
    pub parent: Option<StreamId>,
    pub children: BTreeSet<StreamId>,
    pub window_size: Option<u64>,
    pub first_seen: Option<f64>,
    pub last_seen: Option<f64>,
    /// Sum of declared frame lengths.
    pub length: u64,
    pub statistics: Statistics,
    /// Frame ids, in timestamp order once the session is finished.
    pub frames: Vec<FrameId>,
    pub objects: Vec<WebObject>,
}

impl Stream {
    /// Open a stream on the packet that carried its first frame.
    pub fn new(id: StreamId, packet: &Packet, server_port: u16) -> Self {
        Self {
            id,
            packet_id: packet.id,
            endpoint: packet.source.clone(),
            direction: packet.direction(server_port),
            state: StreamState::Idle,
            weight: DEFAULT_WEIGHT,
            error: ErrorCode::NoError,
            parent: None,
            children: BTreeSet::new(),
            window_size: None,
            first_seen: None,
            last_seen: None,
            length: 0,
            statistics: Statistics::new(),
            frames: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn insert_frame(&mut self, frame: &Frame) {
        self.frames.push(frame.id);
        self.length += frame.length;
        self.statistics.insert_frame(frame);
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// The stream's time window contains `timestamp`.
    pub fn active_at(&self, timestamp: f64) -> bool {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => first <= timestamp && timestamp <= last,
            _ => false,
        }
    }

    pub fn last_object(&self) -> Result<&WebObject> {
        self.objects
            .last()
            .ok_or(Error::PrematureFrame { stream_id: self.id })
    }

    fn last_object_mut(&mut self) -> Result<&mut WebObject> {
        let stream_id = self.id;
        self.objects
            .last_mut()
            .ok_or(Error::PrematureFrame { stream_id })
    }

    /// Apply one frame to the stream's state. Exclusive reprioritization
    /// needs the whole stream table and is left to [`replay`].
    pub fn process_frame(&mut self, frame: &Frame) -> Result<()> {
        match &frame.kind {
            FrameKind::Data { .. } => self.handle_data(frame)?,
            FrameKind::Headers { .. } => self.handle_headers(frame)?,
            FrameKind::Priority(_) => self.handle_priority(frame),
            FrameKind::WindowUpdate { window_size } => {
                let window = self.window_size.get_or_insert(0);
                *window += u64::from(*window_size);
            }
            FrameKind::PushPromise { .. } => self.handle_push_promise(frame),
            FrameKind::RstStream { error } => self.handle_rst_stream(*error),
            _ => {}
        }
        Ok(())
    }

    fn handle_data(&mut self, frame: &Frame) -> Result<()> {
        if frame.end_stream() {
            self.handle_end_stream(frame);
        }
        self.ensure_object(frame);
        self.last_object_mut()?.handle_data(frame);
        Ok(())
    }

    fn handle_headers(&mut self, frame: &Frame) -> Result<()> {
        let own = frame.endpoint == self.endpoint;
        self.state = match self.state {
            StreamState::Idle => StreamState::Open,
            StreamState::ReservedLocal if own => StreamState::HalfClosedRemote,
            StreamState::ReservedRemote if !own => StreamState::HalfClosedLocal,
            state => state,
        };

        self.handle_priority(frame);

        if frame.end_stream() {
            self.handle_end_stream(frame);
        }
        self.ensure_object(frame);
        self.last_object_mut()?.handle_headers(frame);
        Ok(())
    }

    fn handle_push_promise(&mut self, frame: &Frame) {
        if self.state == StreamState::Idle {
            self.state = if frame.endpoint == self.endpoint {
                StreamState::ReservedLocal
            } else {
                StreamState::ReservedRemote
            };
        }
    }

    fn handle_priority(&mut self, frame: &Frame) {
        if let Some(spec) = effective_priority(frame) {
            if spec.weight >= 0 {
                self.weight = spec.weight;
            }
        }
    }

    fn handle_rst_stream(&mut self, error: ErrorCode) {
        self.error = error;
        if matches!(
            self.state,
            StreamState::ReservedLocal
                | StreamState::ReservedRemote
                | StreamState::HalfClosedLocal
                | StreamState::HalfClosedRemote
        ) {
            self.state = StreamState::Closed;
        }
    }

    fn handle_end_stream(&mut self, frame: &Frame) {
        let own = frame.endpoint == self.endpoint;
        self.state = match self.state {
            StreamState::Open if own => StreamState::HalfClosedLocal,
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal if !own => StreamState::Closed,
            StreamState::HalfClosedRemote if own => StreamState::Closed,
            state => state,
        };
    }

    fn ensure_object(&mut self, frame: &Frame) {
        if self.objects.last().map_or(true, |object| object.finished) {
            self.objects.push(WebObject::new(frame));
        }
    }
}

/// Priority a frame applies to its stream: every PRIORITY frame, and
/// HEADERS carrying a non-negative weight.
fn effective_priority(frame: &Frame) -> Option<&PrioritySpec> {
    match &frame.kind {
        FrameKind::Priority(spec) => Some(spec),
        FrameKind::Headers {
            priority: Some(spec), ..
        } if spec.weight >= 0 => Some(spec),
        _ => None,
    }
}

/// Make `child` depend on `parent`, detaching it from its previous parent.
pub(crate) fn link(streams: &mut BTreeMap<StreamId, Stream>, child: StreamId, parent: StreamId) {
    if child == parent {
        debug!(stream = child, "stream declared a dependency on itself; ignored");
        return;
    }
    if !streams.contains_key(&parent) {
        debug!(stream = child, parent, "priority parent unknown; dependency not linked");
        return;
    }

    let previous = streams.get_mut(&child).and_then(|s| s.parent.replace(parent));
    if let Some(previous) = previous.filter(|&p| p != parent) {
        if let Some(old) = streams.get_mut(&previous) {
            old.children.remove(&child);
        }
    }
    if let Some(stream) = streams.get_mut(&parent) {
        stream.children.insert(child);
    }
    trace!(stream = child, parent, "priority dependency linked");
}

/// Exclusive reprioritization: `id` adopts every sibling under its parent.
pub(crate) fn take_siblings(streams: &mut BTreeMap<StreamId, Stream>, id: StreamId) {
    let Some(parent) = streams.get(&id).and_then(|s| s.parent) else {
        return;
    };
    let siblings: BTreeSet<StreamId> = match streams.get_mut(&parent) {
        Some(parent) => {
            let siblings: BTreeSet<StreamId> =
                parent.children.iter().copied().filter(|&c| c != id).collect();
            parent.children.retain(|c| !siblings.contains(c));
            siblings
        }
        None => return,
    };

    let children: Vec<StreamId> = match streams.get_mut(&id) {
        Some(stream) => {
            stream.children.extend(siblings.iter().copied());
            stream.children.iter().copied().collect()
        }
        None => return,
    };
    for child in children {
        if let Some(stream) = streams.get_mut(&child) {
            stream.parent = Some(id);
        }
    }
    debug!(stream = id, parent, adopted = siblings.len(), "exclusive reprioritization");
}

/// Replay a stream's frames, already sorted by timestamp.
pub(crate) fn replay(
    streams: &mut BTreeMap<StreamId, Stream>,
    id: StreamId,
    frames: &[&Frame],
    initial_window: u32,
) -> Result<()> {
    let Some(stream) = streams.get_mut(&id) else {
        return Ok(());
    };
    stream.frames = frames.iter().map(|f| f.id).collect();
    stream.window_size.get_or_insert(u64::from(initial_window));
    stream.first_seen = frames.first().map(|f| f.timestamp);
    stream.last_seen = frames.last().map(|f| f.timestamp);

    for frame in frames {
        if let Some(stream) = streams.get_mut(&id) {
            stream.process_frame(frame)?;
        }
        if effective_priority(frame).map_or(false, |spec| spec.exclusive) {
            take_siblings(streams, id);
        }
    }
    Ok(())
}
