//! HTTP/2 frames as reported by the dissector.
//!
//! [`Frame::parse`] dispatches on the `http2.type` code to the matching
//! [`FrameKind`] variant and reads that variant's fixed fields. A frame
//! without a type code but carrying `http2.magic` is the 24-byte client
//! connection preface.
//!
//! The association fields (`record`, `reassembly`, `segment_indices`,
//! `bytecount_*`) are filled in later by the association engine.

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::field::FieldTree;
use crate::h2::{
    Direction, ErrorCode, FrameType, SettingId, FRAME_HEADER_LEN, PREFACE_LEN,
};
use crate::ids::{FrameId, IdAllocator, Location, PacketId, RecordId, StreamId};
use crate::record::non_negative;

/// Capture context a frame inherits from the packet that carried it.
#[derive(Debug, Clone, Copy)]
pub struct FrameOrigin<'a> {
    pub packet_id: PacketId,
    pub source: &'a str,
    pub direction: Direction,
    pub timestamp: f64,
}

/// Priority information of PRIORITY frames and prioritized HEADERS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrioritySpec {
    pub exclusive: bool,
    pub weight: i64,
    pub stream_dependency: StreamId,
}

impl PrioritySpec {
    fn parse<T: FieldTree>(tree: &T) -> Result<Self> {
        let dependency = tree.integer("http2.stream_dependency")?;
        Ok(Self {
            exclusive: tree.boolean("http2.exclusive")?,
            weight: tree.integer("http2.headers.weight_real")?,
            stream_dependency: parse_stream_id("http2.stream_dependency", dependency)?,
        })
    }
}

/// HTTP pseudo-headers summarized from a HEADERS frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpSummary {
    pub http_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_resource: Option<String>,
}

impl HttpSummary {
    fn parse<T: FieldTree>(tree: &T) -> Result<Self> {
        let mut summary = HttpSummary::default();
        for header in tree.children("http2.header") {
            if header.exists("http2.headers.status") {
                let status = header.integer("http2.headers.status")?;
                summary.http_response = true;
                summary.http_status = Some(
                    u16::try_from(status)
                        .map_err(|_| Error::invalid("http2.headers.status", status.to_string()))?,
                );
            } else if header.exists("http2.headers.method") {
                summary.http_method = Some(header.string("http2.headers.method")?);
            } else if header.exists("http2.headers.path") {
                summary.http_resource = Some(header.string("http2.headers.path")?);
            }
        }
        Ok(summary)
    }
}

/// Variant-specific frame fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameKind {
    Magic,
    Data {
        flags_padded: bool,
        flags_end_stream: bool,
    },
    Headers {
        flags_padded: bool,
        flags_eh: bool,
        flags_end_stream: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<PrioritySpec>,
        #[serde(flatten)]
        http: HttpSummary,
    },
    Priority(PrioritySpec),
    RstStream {
        error: ErrorCode,
    },
    Settings {
        flags_ack: bool,
        settings: Vec<(SettingId, u32)>,
    },
    PushPromise {
        flags_padded: bool,
        flags_eh: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        promised_stream: Option<StreamId>,
    },
    Ping {
        flags_ack: bool,
    },
    GoAway {
        error: ErrorCode,
        last_stream: StreamId,
    },
    WindowUpdate {
        window_size: u32,
    },
    Continuation {
        flags_eh: bool,
    },
}

/// Which record/segment carried part of a frame's bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentIndex {
    pub packet_id: PacketId,
    pub record_id: RecordId,
    /// Position of the physical segment within its record.
    pub segment: usize,
    pub byte_count: u64,
    pub content_length: u64,
    pub bytecount_start: u64,
    pub bytecount_finish: u64,
}

impl SegmentIndex {
    pub(crate) fn new(packet_id: PacketId, record_id: RecordId, segment: usize, byte_count: u64) -> Self {
        Self {
            packet_id,
            record_id,
            segment,
            byte_count,
            content_length: 0,
            bytecount_start: 0,
            bytecount_finish: 0,
        }
    }
}

/// One HTTP/2 frame.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub id: FrameId,
    #[serde(rename = "packet")]
    pub packet_id: PacketId,
    #[serde(skip)]
    pub location: Location,
    #[serde(rename = "stream")]
    pub stream_id: StreamId,
    pub direction: Direction,
    /// Source address of the carrying packet.
    pub endpoint: String,
    /// Relative capture time of the carrying packet.
    pub timestamp: f64,
    /// Declared payload length.
    pub body: u64,
    /// Declared length including the frame header.
    pub length: u64,
    #[serde(flatten)]
    pub kind: FrameKind,
    /// Last TLS record that carried this frame.
    pub record: Option<RecordId>,
    /// Index of the reassembly notice this frame consumed.
    #[serde(skip)]
    pub reassembly: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub segment_indices: Vec<SegmentIndex>,
    pub bytecount_start: Option<u64>,
    pub bytecount_finish: Option<u64>,
}

impl Frame {
    /// Parse one `http2.stream` sublayer.
    pub fn parse<T: FieldTree>(
        ids: &mut IdAllocator,
        origin: FrameOrigin<'_>,
        tree: &T,
        location: Location,
    ) -> Result<Self> {
        let (kind, stream_id, body, length) = if tree.exists("http2.type") {
            let code = tree.integer("http2.type")?;
            let frame_type = u8::try_from(code)
                .ok()
                .and_then(FrameType::from_code)
                .ok_or(Error::UnknownFrameType {
                    code: Some(code),
                    packet_id: origin.packet_id,
                })?;
            let stream = parse_stream_id("http2.streamid", tree.integer("http2.streamid")?)?;
            let body = non_negative("http2.length", tree.integer("http2.length")?)?;
            let kind = parse_kind(frame_type, tree, origin.packet_id)?;
            (kind, stream, body, body + FRAME_HEADER_LEN)
        } else if tree.exists("http2.magic") {
            (FrameKind::Magic, 0, 0, PREFACE_LEN)
        } else {
            return Err(Error::UnknownFrameType {
                code: None,
                packet_id: origin.packet_id,
            });
        };

        let id = ids.next_frame();
        debug!(
            frame = id,
            packet = origin.packet_id,
            stream = stream_id,
            layer = location.layer_id,
            sublayer = location.sublayer_id,
            kind = ?frame_kind_type(&kind),
            "http2 frame"
        );

        Ok(Self {
            id,
            packet_id: origin.packet_id,
            location,
            stream_id,
            direction: origin.direction,
            endpoint: origin.source.to_string(),
            timestamp: origin.timestamp,
            body,
            length,
            kind,
            record: None,
            reassembly: None,
            segment_indices: Vec::new(),
            bytecount_start: None,
            bytecount_finish: None,
        })
    }

    pub fn frame_type(&self) -> FrameType {
        frame_kind_type(&self.kind)
    }

    /// END_STREAM flag of DATA and HEADERS frames.
    pub fn end_stream(&self) -> bool {
        match self.kind {
            FrameKind::Data { flags_end_stream, .. } => flags_end_stream,
            FrameKind::Headers { flags_end_stream, .. } => flags_end_stream,
            _ => false,
        }
    }

    /// END_HEADERS flag of HEADERS, PUSH_PROMISE and CONTINUATION frames.
    pub fn end_headers(&self) -> bool {
        match self.kind {
            FrameKind::Headers { flags_eh, .. }
            | FrameKind::PushPromise { flags_eh, .. }
            | FrameKind::Continuation { flags_eh } => flags_eh,
            _ => false,
        }
    }

    /// Priority carried by a PRIORITY frame or a prioritized HEADERS frame.
    pub fn priority(&self) -> Option<&PrioritySpec> {
        match &self.kind {
            FrameKind::Priority(spec) => Some(spec),
            FrameKind::Headers { priority, .. } => priority.as_ref(),
            _ => None,
        }
    }

    /// Pseudo-header summary of a HEADERS frame.
    pub fn http(&self) -> Option<&HttpSummary> {
        match &self.kind {
            FrameKind::Headers { http, .. } => Some(http),
            _ => None,
        }
    }

    /// Byte range in the session's application-data byte space.
    pub fn byte_range(&self) -> Option<(u64, u64)> {
        self.bytecount_start.zip(self.bytecount_finish)
    }
}

fn frame_kind_type(kind: &FrameKind) -> FrameType {
    match kind {
        FrameKind::Magic => FrameType::Magic,
        FrameKind::Data { .. } => FrameType::Data,
        FrameKind::Headers { .. } => FrameType::Headers,
        FrameKind::Priority(_) => FrameType::Priority,
        FrameKind::RstStream { .. } => FrameType::RstStream,
        FrameKind::Settings { .. } => FrameType::Settings,
        FrameKind::PushPromise { .. } => FrameType::PushPromise,
        FrameKind::Ping { .. } => FrameType::Ping,
        FrameKind::GoAway { .. } => FrameType::GoAway,
        FrameKind::WindowUpdate { .. } => FrameType::WindowUpdate,
        FrameKind::Continuation { .. } => FrameType::Continuation,
    }
}

fn parse_kind<T: FieldTree>(frame_type: FrameType, tree: &T, packet_id: PacketId) -> Result<FrameKind> {
    let kind = match frame_type {
        FrameType::Data => {
            let flags = tree.nested("http2.flags")?;
            FrameKind::Data {
                flags_padded: flags.boolean("http2.flags.padded")?,
                flags_end_stream: flags.boolean("http2.flags.end_stream")?,
            }
        }
        FrameType::Headers => {
            let flags = tree.nested("http2.flags")?;
            let prioritized = flags.boolean("http2.flags.priority")?;
            FrameKind::Headers {
                flags_padded: flags.boolean("http2.flags.padded")?,
                flags_eh: flags.boolean("http2.flags.eh")?,
                flags_end_stream: flags.boolean("http2.flags.end_stream")?,
                priority: if prioritized {
                    Some(PrioritySpec::parse(tree)?)
                } else {
                    None
                },
                http: HttpSummary::parse(tree)?,
            }
        }
        FrameType::Priority => FrameKind::Priority(PrioritySpec::parse(tree)?),
        FrameType::RstStream => {
            let field = if tree.exists("http2.rst_stream.error") {
                "http2.rst_stream.error"
            } else {
                "http2.error"
            };
            FrameKind::RstStream {
                error: error_code(field, tree.integer(field)?)?,
            }
        }
        FrameType::Settings => {
            let flags = tree.nested("http2.flags")?;
            FrameKind::Settings {
                flags_ack: flags.boolean("http2.flags.ack.settings")?,
                settings: parse_settings(tree)?,
            }
        }
        FrameType::PushPromise => {
            let flags = tree.nested("http2.flags")?;
            let promised_stream = if tree.exists("http2.push_promise.promised_stream_id") {
                let raw = tree.integer("http2.push_promise.promised_stream_id")?;
                Some(parse_stream_id("http2.push_promise.promised_stream_id", raw)?)
            } else {
                None
            };
            FrameKind::PushPromise {
                flags_padded: flags.boolean("http2.flags.padded")?,
                flags_eh: flags.boolean("http2.flags.eh")?,
                promised_stream,
            }
        }
        FrameType::Ping => {
            let flags = tree.nested("http2.flags")?;
            let field = if flags.exists("http2.flags.ack.ping") {
                "http2.flags.ack.ping"
            } else {
                "http2.flags.ack.settings"
            };
            FrameKind::Ping {
                flags_ack: flags.boolean(field)?,
            }
        }
        FrameType::GoAway => {
            let last = tree.integer("http2.goaway.last_stream_id")?;
            FrameKind::GoAway {
                error: error_code("http2.goaway.error", tree.integer("http2.goaway.error")?)?,
                last_stream: parse_stream_id("http2.goaway.last_stream_id", last)?,
            }
        }
        FrameType::WindowUpdate => {
            let field = "http2.window_update.window_size_increment";
            let increment = tree.integer(field)?;
            FrameKind::WindowUpdate {
                window_size: u32::try_from(increment)
                    .map_err(|_| Error::invalid(field, increment.to_string()))?,
            }
        }
        FrameType::Continuation => {
            let flags = tree.nested("http2.flags")?;
            FrameKind::Continuation {
                flags_eh: flags.boolean("http2.flags.eh")?,
            }
        }
        FrameType::Magic => {
            return Err(Error::UnknownFrameType {
                code: None,
                packet_id,
            })
        }
    };
    Ok(kind)
}

fn parse_settings<T: FieldTree>(tree: &T) -> Result<Vec<(SettingId, u32)>> {
    let mut settings = Vec::new();
    for entry in tree.children("http2.settings") {
        let code = entry.integer("http2.settings.id")?;
        let Some(id) = u16::try_from(code).ok().and_then(SettingId::from_code) else {
            debug!(code, "unknown SETTINGS identifier skipped");
            continue;
        };
        let raw = entry.integer(id.value_field())?;
        let value = u32::try_from(raw).map_err(|_| Error::invalid(id.value_field(), raw.to_string()))?;
        settings.push((id, value));
    }
    Ok(settings)
}

fn parse_stream_id(name: &str, value: i64) -> Result<StreamId> {
    u32::try_from(value)
        .map(|id| id & 0x7FFF_FFFF)
        .map_err(|_| Error::invalid(name, value.to_string()))
}

fn error_code(name: &str, value: i64) -> Result<ErrorCode> {
    u32::try_from(value)
        .map(ErrorCode::from)
        .map_err(|_| Error::invalid(name, value.to_string()))
}
