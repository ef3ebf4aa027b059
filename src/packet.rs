//! One captured packet and the items it carried.
//!
//! A packet owns the TLS records, HTTP/2 frames and reassembly notices the
//! dissector reported for it. Notices signal that physical segments were
//! stitched into a logical unit; association uses them to map frames back
//! onto record segments.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::field::{parse_integer, FieldTree};
use crate::frame::{Frame, FrameOrigin};
use crate::h2::Direction;
use crate::ids::{FrameId, Location, PacketId, StreamId};
use crate::record::{non_negative, TlsHandshakeType, TlsRecord, TlsRecordType};

/// Cumulative byte counters of a packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PacketLengths {
    pub total: u64,
    pub frames: u64,
    pub records: u64,
    pub handshakes: u64,
    pub application_data: u64,
}

/// One physical contribution listed by a reassembly notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentRef {
    pub packet_id: PacketId,
    pub length: u64,
}

/// Where a notice sits inside its run of consecutive notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupPosition {
    /// Number of consecutive notices in the run.
    pub size: usize,
    /// Reverse position: the first notice of a run of N has index N - 1.
    pub index: usize,
}

/// Dissector signal that several physical segments formed one logical unit.
#[derive(Debug, Clone, Serialize)]
pub struct ReassemblyNotice {
    #[serde(flatten)]
    pub location: Location,
    pub count: u64,
    pub length: u64,
    pub segments: Vec<SegmentRef>,
    /// Layer of the frame that consumed this notice.
    pub frame_layer_id: Option<u32>,
    #[serde(skip)]
    pub group: Option<GroupPosition>,
}

impl ReassemblyNotice {
    /// Parse a `<prefix>.segments` sublayer.
    pub fn parse<T: FieldTree>(prefix: &str, tree: &T, location: Location) -> Result<Self> {
        let count_field = format!("{prefix}.segment.count");
        let length_field = format!("{prefix}.reassembled.length");
        let segment_field = format!("{prefix}.segment");

        let count = non_negative(&count_field, tree.integer(&count_field)?)?;
        let length = non_negative(&length_field, tree.integer(&length_field)?)?;

        let mut segments = Vec::new();
        for segment in tree.children(&segment_field) {
            let show = segment
                .show()
                .ok_or_else(|| Error::missing("show", &segment_field))?;
            let packet_id = parse_integer(&segment_field, show)?;
            let length = segment
                .size()
                .ok_or_else(|| Error::missing("size", &segment_field))?;
            segments.push(SegmentRef {
                packet_id: non_negative(&segment_field, packet_id)?,
                length,
            });
        }

        Ok(Self {
            location,
            count,
            length,
            segments,
            frame_layer_id: None,
            group: None,
        })
    }

    /// Two notices describe the same physical reassembly.
    pub fn same_reassembly(&self, other: &ReassemblyNotice) -> bool {
        self.count == other.count && self.length == other.length && self.segments == other.segments
    }
}

/// One captured frame-on-the-wire.
#[derive(Debug, Clone, Serialize)]
pub struct Packet {
    pub id: PacketId,
    pub source: String,
    pub destination: String,
    pub source_port: u16,
    pub destination_port: u16,
    pub time_delta: f64,
    pub time_relative: f64,
    pub lengths: PacketLengths,
    #[serde(serialize_with = "serialize_frame_ids")]
    pub frames: Vec<Frame>,
    pub records: Vec<TlsRecord>,
    #[serde(rename = "fake_segments")]
    pub notices: Vec<ReassemblyNotice>,
    /// Indices of the distinct notices kept after deduplication.
    #[serde(skip)]
    pub reassembled: Vec<usize>,
    /// Streams first seen in this packet.
    pub streams: Vec<StreamId>,
    pub streams_active: BTreeSet<StreamId>,
    pub streams_closed: BTreeSet<StreamId>,
}

impl Packet {
    /// Build the packet header from the `frame`, network and `tcp` layers.
    pub fn parse<T: FieldTree>(tree: &T) -> Result<Self> {
        let frame = tree.proto("frame")?;
        let id = non_negative("frame.number", frame.integer("frame.number")?)?;
        let total = non_negative("frame.len", frame.integer("frame.len")?)?;

        let (source, destination) = match tree.find_proto("ip") {
            Some(ip) => (ip.string("ip.src")?, ip.string("ip.dst")?),
            None => {
                let ipv6 = tree.proto("ipv6").map_err(|_| Error::missing("ip", tree.name()))?;
                (ipv6.string("ipv6.src")?, ipv6.string("ipv6.dst")?)
            }
        };

        let tcp = tree.proto("tcp")?;
        Ok(Self {
            id,
            source,
            destination,
            source_port: port("tcp.srcport", tcp.integer("tcp.srcport")?)?,
            destination_port: port("tcp.dstport", tcp.integer("tcp.dstport")?)?,
            time_delta: frame.real("frame.time_delta")?,
            time_relative: frame.real("frame.time_relative")?,
            lengths: PacketLengths {
                total,
                ..PacketLengths::default()
            },
            frames: Vec::new(),
            records: Vec::new(),
            notices: Vec::new(),
            reassembled: Vec::new(),
            streams: Vec::new(),
            streams_active: BTreeSet::new(),
            streams_closed: BTreeSet::new(),
        })
    }

    pub fn direction(&self, server_port: u16) -> Direction {
        Direction::from_source_port(self.source_port, server_port)
    }

    /// Capture context handed to frames parsed from this packet.
    pub fn origin(&self, server_port: u16) -> FrameOrigin<'_> {
        FrameOrigin {
            packet_id: self.id,
            source: &self.source,
            direction: self.direction(server_port),
            timestamp: self.time_relative,
        }
    }

    pub fn insert_record(&mut self, record: TlsRecord) {
        self.lengths.records += record.length;
        match record.content_type {
            TlsRecordType::Handshake => self.lengths.handshakes += record.length,
            TlsRecordType::ApplicationData => self.lengths.application_data += record.length,
            _ => {}
        }
        self.records.push(record);
    }

    pub fn insert_frame(&mut self, frame: Frame) {
        self.lengths.frames += frame.length;
        self.frames.push(frame);
    }

    pub fn insert_notice(&mut self, notice: ReassemblyNotice) {
        self.notices.push(notice);
    }

    pub fn frame(&self, frame_id: FrameId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == frame_id)
    }

    /// Handshake message types carried by this packet's records.
    pub fn handshakes(&self) -> impl Iterator<Item = TlsHandshakeType> + '_ {
        self.records.iter().filter_map(|r| r.handshake)
    }
}

fn port(name: &str, value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::invalid(name, value.to_string()))
}

fn serialize_frame_ids<S: serde::Serializer>(frames: &[Frame], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(frames.iter().map(|f| f.id))
}
