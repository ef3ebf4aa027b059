//! TLS record framing and its physical segmentation.
//!
//! A [`TlsRecord`] is one record-layer unit. Its first [`SegmentData`] is the
//! record's own transmission; further segments are appended when the
//! dissector reports additional reassembly contributions for the record.
//! Each segment remembers which HTTP/2 frames consumed which part of it.

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::field::FieldTree;
use crate::ids::{FrameId, IdAllocator, Location, RecordId, SegmentId};

/// TLS record content types (RFC 8446 Section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TlsRecordType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Heartbeat,
}

impl TlsRecordType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            20 => Some(TlsRecordType::ChangeCipherSpec),
            21 => Some(TlsRecordType::Alert),
            22 => Some(TlsRecordType::Handshake),
            23 => Some(TlsRecordType::ApplicationData),
            24 => Some(TlsRecordType::Heartbeat),
            _ => None,
        }
    }
}

/// TLS handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TlsHandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    NewSessionTicket,
    EndOfEarlyData,
    EncryptedExtensions,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    KeyUpdate,
    Encrypted,
    Other(u8),
}

impl From<u8> for TlsHandshakeType {
    fn from(code: u8) -> Self {
        match code {
            0 => TlsHandshakeType::HelloRequest,
            1 => TlsHandshakeType::ClientHello,
            2 => TlsHandshakeType::ServerHello,
            4 => TlsHandshakeType::NewSessionTicket,
            5 => TlsHandshakeType::EndOfEarlyData,
            8 => TlsHandshakeType::EncryptedExtensions,
            11 => TlsHandshakeType::Certificate,
            12 => TlsHandshakeType::ServerKeyExchange,
            13 => TlsHandshakeType::CertificateRequest,
            14 => TlsHandshakeType::ServerHelloDone,
            15 => TlsHandshakeType::CertificateVerify,
            16 => TlsHandshakeType::ClientKeyExchange,
            20 => TlsHandshakeType::Finished,
            24 => TlsHandshakeType::KeyUpdate,
            255 => TlsHandshakeType::Encrypted,
            other => TlsHandshakeType::Other(other),
        }
    }
}

/// Bytes of a segment consumed by one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub frame_id: FrameId,
    pub byte_count: u64,
}

/// One physical byte-contribution unit of a record.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentData {
    pub id: SegmentId,
    pub length: u64,
    /// Frames that consumed this segment, in consumption order.
    pub frames: Vec<Contribution>,
}

impl SegmentData {
    pub fn new(id: SegmentId, length: u64) -> Self {
        Self {
            id,
            length,
            frames: Vec::new(),
        }
    }

    /// Bytes already attributed to frames.
    pub fn attributed(&self) -> u64 {
        self.frames.iter().map(|c| c.byte_count).sum()
    }

    pub fn can_absorb(&self, byte_count: u64) -> bool {
        self.attributed()
            .checked_add(byte_count)
            .map_or(false, |total| total <= self.length)
    }

    /// Attribute bytes to a frame; refuses to exceed the declared length.
    pub(crate) fn try_attribute(&mut self, frame_id: FrameId, byte_count: u64) -> bool {
        if !self.can_absorb(byte_count) {
            return false;
        }
        self.frames.push(Contribution {
            frame_id,
            byte_count,
        });
        true
    }

    /// Offset and size of a frame's `nth` contribution (zero-based), counted
    /// from the start of this segment's attributed bytes.
    pub fn position_of(&self, frame_id: FrameId, nth: usize) -> Option<(u64, u64)> {
        let mut offset = 0u64;
        let mut seen = 0;
        for contribution in &self.frames {
            if contribution.frame_id == frame_id {
                if seen == nth {
                    return Some((offset, contribution.byte_count));
                }
                seen += 1;
            }
            offset = offset.saturating_add(contribution.byte_count);
        }
        None
    }
}

/// One TLS record.
#[derive(Debug, Clone, Serialize)]
pub struct TlsRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub location: Location,
    /// Declared record length.
    pub length: u64,
    #[serde(rename = "type")]
    pub content_type: TlsRecordType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake: Option<TlsHandshakeType>,
    /// Observed decrypted content, i.e. bytes attributed to frames.
    pub content_length: u64,
    /// Offset of this record in the session's application-data byte stream.
    pub bytecount_index: u64,
    #[serde(rename = "segment_data")]
    pub segments: Vec<SegmentData>,
}

impl TlsRecord {
    /// Build a record from a `<prefix>.record` sublayer, where the prefix is
    /// the TLS layer's name (`ssl` or `tls`).
    pub fn parse<T: FieldTree>(
        ids: &mut IdAllocator,
        prefix: &str,
        tree: &T,
        location: Location,
        bytecount_index: u64,
    ) -> Result<Self> {
        let length_field = format!("{prefix}.record.length");
        let type_field = format!("{prefix}.record.content_type");

        let length = non_negative(&length_field, tree.integer(&length_field)?)?;
        let code = tree.integer(&type_field)?;
        let content_type = TlsRecordType::from_code(code)
            .ok_or_else(|| Error::invalid(&type_field, code.to_string()))?;

        let handshake = if content_type == TlsRecordType::Handshake {
            let handshake_field = format!("{prefix}.handshake");
            let message_field = format!("{prefix}.handshake.type");
            let message = tree.nested(&handshake_field)?.integer(&message_field)?;
            let message = u8::try_from(message)
                .map_err(|_| Error::invalid(&message_field, message.to_string()))?;
            Some(TlsHandshakeType::from(message))
        } else {
            None
        };

        let id = ids.next_record();
        let segments = vec![SegmentData::new(ids.next_segment(), length)];

        Ok(Self {
            id,
            location,
            length,
            content_type,
            handshake,
            content_length: 0,
            bytecount_index,
            segments,
        })
    }

    pub fn is_application_data(&self) -> bool {
        self.content_type == TlsRecordType::ApplicationData
    }

    /// Append a physical segment reported by the dissector's reassembly.
    pub fn insert_segment(&mut self, ids: &mut IdAllocator, length: u64) {
        debug!(record = self.id, length, "segment data appended");
        self.segments.push(SegmentData::new(ids.next_segment(), length));
    }

    /// Sum of all bytes attributed to frames across every segment.
    pub fn attributed_length(&self) -> u64 {
        self.segments.iter().map(SegmentData::attributed).sum()
    }

    pub(crate) fn refresh_content_length(&mut self) {
        self.content_length = self.attributed_length();
    }

    /// Declared bytes not yet attributed to any frame.
    pub fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.attributed_length())
    }

    /// Attribute a frame carried whole by this record to its own transmission.
    pub(crate) fn attribute_direct(&mut self, frame_id: FrameId, byte_count: u64) -> Result<usize> {
        let record_id = self.id;
        if byte_count > self.remaining() {
            return Err(Error::RecordCapacityExceeded { record_id });
        }
        let Some(segment) = self.segments.first_mut() else {
            return Err(Error::RecordCapacityExceeded { record_id });
        };
        if segment.try_attribute(frame_id, byte_count) {
            Ok(0)
        } else {
            Err(Error::RecordCapacityExceeded { record_id })
        }
    }

    /// Attribute a reassembled contribution to the first physical segment that
    /// can still absorb it. Additional segments are preferred; a record with a
    /// single transmission offers that one. Nothing is attributed past the
    /// record's declared length.
    pub(crate) fn attribute_reassembled(&mut self, frame_id: FrameId, byte_count: u64) -> Option<usize> {
        if byte_count > self.remaining() {
            return None;
        }
        let first = if self.segments.len() > 1 { 1 } else { 0 };
        for (index, segment) in self.segments.iter_mut().enumerate().skip(first) {
            if segment.try_attribute(frame_id, byte_count) {
                return Some(index);
            }
        }
        None
    }
}

pub(crate) fn non_negative(name: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::invalid(name, value.to_string()))
}
