//! Session builder: ingests dissected packets and runs the analysis passes.
//!
//! Reconstruction is batch and two-phase. [`SessionBuilder::ingest`] takes
//! packets in capture order, registering frames with their streams and
//! associating each packet's frames with its TLS records right away.
//! [`SessionBuilder::finish`] then computes byte ranges, replays every stream
//! in timestamp order and derives which streams were active at each packet.
//!
//! The first failed ingest poisons the builder: later calls to `ingest` and
//! `finish` return that same error.
//!
//! ```
//! use h2_provenance::{FieldNode, Session, SessionConfig};
//!
//! let packet = FieldNode::layer("packet")
//!     .with(
//!         FieldNode::layer("frame")
//!             .with(FieldNode::leaf("frame.number", 1))
//!             .with(FieldNode::leaf("frame.len", 60))
//!             .with(FieldNode::leaf("frame.time_delta", "0.0"))
//!             .with(FieldNode::leaf("frame.time_relative", "0.0")),
//!     )
//!     .with(
//!         FieldNode::layer("ip")
//!             .with(FieldNode::leaf("ip.src", "10.0.0.1"))
//!             .with(FieldNode::leaf("ip.dst", "10.0.0.2")),
//!     )
//!     .with(
//!         FieldNode::layer("tcp")
//!             .with(FieldNode::leaf("tcp.srcport", 50000))
//!             .with(FieldNode::leaf("tcp.dstport", 443)),
//!     );
//!
//! // no TLS or HTTP/2 layer: nothing to reconstruct
//! let session = Session::reconstruct(SessionConfig::default(), [&packet]).unwrap();
//! assert!(session.packets().next().is_none());
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::assoc;
use crate::config::{H2Settings, SessionConfig};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::field::FieldTree;
use crate::frame::{Frame, FrameKind};
use crate::h2::FrameType;
use crate::ids::{FrameId, IdAllocator, Location, PacketId, StreamId};
use crate::packet::{Packet, ReassemblyNotice};
use crate::record::TlsRecord;
use crate::statistics::Statistics;
use crate::stream::{self, Stream};

/// Layer wrapping the dissector's reassembly notices.
const NOTICE_LAYER: &str = "fake-field-wrapper";

/// A fully reconstructed capture.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    packets: BTreeMap<PacketId, Packet>,
    frame_index: BTreeMap<FrameId, PacketId>,
    streams: BTreeMap<StreamId, Stream>,
    connection: Connection,
    statistics: Statistics,
}

/// Accumulates packets until the capture is complete.
#[derive(Debug)]
pub struct SessionBuilder {
    session: Session,
    ids: IdAllocator,
    /// Session-wide count of application-data record bytes.
    application_bytes: u64,
    /// First fatal error seen while ingesting.
    failure: Option<Error>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        let connection = Connection::new(config.initial_settings.clone());
        Self {
            session: Session {
                config,
                packets: BTreeMap::new(),
                frame_index: BTreeMap::new(),
                streams: BTreeMap::new(),
                connection,
                statistics: Statistics::new(),
            },
            ids: IdAllocator::new(),
            application_bytes: 0,
            failure: None,
        }
    }

    /// Ingest one packet's layer tree.
    ///
    /// Returns the packet id, or `None` when the packet carried no TLS,
    /// HTTP/2 or reassembly layer and was dropped.
    pub fn ingest<T: FieldTree>(&mut self, tree: &T) -> Result<Option<PacketId>> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let result = self.ingest_packet(tree);
        if let Err(err) = &result {
            warn!(error = %err, "ingestion failed; session abandoned");
            self.failure = Some(err.clone());
        }
        result
    }

    fn ingest_packet<T: FieldTree>(&mut self, tree: &T) -> Result<Option<PacketId>> {
        let mut packet = Packet::parse(tree)?;
        let packet_id = packet.id;
        if self.session.packets.contains_key(&packet_id) {
            return Err(Error::DuplicatePacket { packet_id });
        }
        match self.ingest_layers(&mut packet, tree) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(err) => return Err(err.in_packet(packet_id)),
        }

        if !packet.frames.is_empty() {
            assoc::associate(&mut packet, &mut self.session.packets)
                .map_err(|err| err.in_packet(packet_id))?;
        }
        for handshake in packet.handshakes() {
            self.session
                .connection
                .process_handshake(&packet.source, handshake);
        }

        debug!(
            packet = packet_id,
            records = packet.records.len(),
            frames = packet.frames.len(),
            notices = packet.notices.len(),
            "packet ingested"
        );
        self.session.packets.insert(packet_id, packet);
        Ok(Some(packet_id))
    }

    fn ingest_layers<T: FieldTree>(&mut self, packet: &mut Packet, tree: &T) -> Result<bool> {
        let mut relevant = false;

        for (layer_id, layer) in tree.entries().into_iter().enumerate() {
            let layer_id = layer_id as u32;
            match layer.name() {
                prefix @ ("ssl" | "tls") => {
                    self.ingest_tls(packet, prefix, layer, layer_id)?;
                    relevant = true;
                }
                "http2" => {
                    for (sublayer_id, sublayer) in layer.entries().into_iter().enumerate() {
                        if sublayer.name() != "http2.stream" {
                            continue;
                        }
                        let location = Location::new(packet.id, layer_id, sublayer_id as u32);
                        let origin = packet.origin(self.session.config.server_port);
                        let frame = Frame::parse(&mut self.ids, origin, sublayer, location)?;
                        self.register_frame(packet, frame);
                    }
                    relevant = true;
                }
                NOTICE_LAYER => {
                    for (sublayer_id, sublayer) in layer.entries().into_iter().enumerate() {
                        let Some(prefix) = notice_prefix(sublayer.name()) else {
                            continue;
                        };
                        let location = Location::new(packet.id, layer_id, sublayer_id as u32);
                        let notice = ReassemblyNotice::parse(prefix, sublayer, location)?;
                        debug!(
                            packet = packet.id,
                            layer = layer_id,
                            sublayer = sublayer_id,
                            segments = notice.segments.len(),
                            "reassembly notice"
                        );
                        packet.insert_notice(notice);
                    }
                    relevant = true;
                }
                _ => {}
            }
        }
        Ok(relevant)
    }

    fn ingest_tls<T: FieldTree>(
        &mut self,
        packet: &mut Packet,
        prefix: &str,
        layer: &T,
        layer_id: u32,
    ) -> Result<()> {
        let record_name = format!("{prefix}.record");
        let segment_name = format!("{prefix}.segment.data");
        let mut last_record: Option<usize> = None;

        for (sublayer_id, sublayer) in layer.entries().into_iter().enumerate() {
            let name = sublayer.name();
            if name == record_name {
                let location = Location::new(packet.id, layer_id, sublayer_id as u32);
                let record = TlsRecord::parse(
                    &mut self.ids,
                    prefix,
                    sublayer,
                    location,
                    self.application_bytes,
                )?;
                if record.is_application_data() {
                    self.application_bytes = self.application_bytes.saturating_add(record.length);
                }
                debug!(
                    record = record.id,
                    packet = packet.id,
                    layer = layer_id,
                    sublayer = sublayer_id,
                    kind = ?record.content_type,
                    length = record.length,
                    "tls record"
                );
                packet.insert_record(record);
                last_record = Some(packet.records.len() - 1);
            } else if name == segment_name {
                let length = sublayer
                    .size()
                    .ok_or_else(|| Error::missing("size", &segment_name))?;
                match last_record {
                    Some(index) => packet.records[index].insert_segment(&mut self.ids, length),
                    None => debug!(packet = packet.id, length, "segment data before any record; skipped"),
                }
            }
        }
        Ok(())
    }

    fn register_frame(&mut self, packet: &mut Packet, frame: Frame) {
        let session = &mut self.session;
        session.statistics.insert_frame(&frame);
        session.frame_index.insert(frame.id, packet.id);

        let stream_id = frame.stream_id;
        if !session.streams.contains_key(&stream_id) {
            let stream = Stream::new(stream_id, packet, session.config.server_port);
            session.connection.process_stream(stream_id, stream.direction);
            packet.streams.push(stream_id);
            session.streams.insert(stream_id, stream);
        }

        if let Some(stream) = session.streams.get_mut(&stream_id) {
            stream.insert_frame(&frame);
            match &frame.kind {
                FrameKind::Settings { .. } => {
                    let latest = stream.statistics.last_timestamp(FrameType::Settings);
                    session.connection.handle_settings(&frame, latest);
                }
                FrameKind::GoAway { .. } => {
                    let latest = stream.statistics.last_timestamp(FrameType::GoAway);
                    session.connection.handle_goaway(&frame, latest);
                }
                _ => {}
            }
        }

        if let Some(priority) = frame.priority() {
            stream::link(&mut session.streams, stream_id, priority.stream_dependency);
        }

        packet.insert_frame(frame);
    }

    /// Run the analysis passes and hand out the finished session.
    pub fn finish(self) -> Result<Session> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        let mut session = self.session;
        assoc::compute_byte_ranges(&mut session.packets);
        session.replay_streams()?;
        session.derive_active_streams();

        info!(
            packets = session.packets.len(),
            frames = session.frame_index.len(),
            streams = session.streams.len(),
            terminated = session.connection.terminated,
            "session reconstructed"
        );
        Ok(session)
    }
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Ingest every packet tree in capture order, then finish.
    pub fn reconstruct<'a, T, I>(config: SessionConfig, packets: I) -> Result<Session>
    where
        T: FieldTree + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut builder = SessionBuilder::new(config);
        for tree in packets {
            builder.ingest(tree)?;
        }
        builder.finish()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.packets.values()
    }

    pub fn packet(&self, id: PacketId) -> Option<&Packet> {
        self.packets.get(&id)
    }

    /// Frames in id order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frame_index.keys().filter_map(move |&id| self.frame(id))
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        lookup(&self.packets, &self.frame_index, id)
    }

    pub fn records(&self) -> impl Iterator<Item = &TlsRecord> {
        self.packets.values().flat_map(|p| p.records.iter())
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn settings(&self) -> &H2Settings {
        &self.connection.settings
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Replay every stream, in ascending id order, over its frames sorted
    /// by timestamp.
    fn replay_streams(&mut self) -> Result<()> {
        let initial_window = self.connection.settings.initial_window_size;
        let ids: Vec<StreamId> = self.streams.keys().copied().collect();
        let mut closed: Vec<(PacketId, StreamId)> = Vec::new();

        for id in ids {
            let mut frames: Vec<&Frame> = self.streams[&id]
                .frames
                .iter()
                .filter_map(|&frame| lookup(&self.packets, &self.frame_index, frame))
                .collect();
            frames.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(Ordering::Equal));

            if let Some(last) = frames.last() {
                closed.push((last.packet_id, id));
            }
            stream::replay(&mut self.streams, id, &frames, initial_window)?;
        }

        for (packet_id, stream_id) in closed {
            if let Some(packet) = self.packets.get_mut(&packet_id) {
                packet.streams_closed.insert(stream_id);
            }
        }
        Ok(())
    }

    fn derive_active_streams(&mut self) {
        for packet in self.packets.values_mut() {
            packet.streams_active = self
                .streams
                .values()
                .filter(|s| s.active_at(packet.time_relative))
                .map(|s| s.id)
                .collect();
        }
    }
}

fn lookup<'a>(
    packets: &'a BTreeMap<PacketId, Packet>,
    index: &BTreeMap<FrameId, PacketId>,
    id: FrameId,
) -> Option<&'a Frame> {
    packets.get(index.get(&id)?)?.frame(id)
}

/// TLS dialect of a `<prefix>.segments` notice sublayer.
fn notice_prefix(name: &str) -> Option<&str> {
    match name.strip_suffix(".segments")? {
        prefix @ ("ssl" | "tls") => Some(prefix),
        _ => None,
    }
}
