//! Error types for capture reconstruction.
//!
//! Every structural failure is fatal to the session under reconstruction:
//! the engine does not skip frames or records mid-capture. Errors raised
//! while a packet is being ingested are wrapped in [`Error::Packet`] so the
//! caller learns which capture frame broke the run.

use thiserror::Error;

/// Main error type for reconstruction.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A mandatory field is absent from the dissector output
    #[error("mandatory field {name} missing from {context}")]
    MissingField { name: String, context: String },

    /// A field is present but its value cannot be coerced
    #[error("field {name} has malformed value {value:?}")]
    InvalidValue { name: String, value: String },

    /// Frame dispatch failed: no type field, no preface, or an unsupported code
    #[error("unknown HTTP/2 frame type {code:?} in packet {packet_id}")]
    UnknownFrameType { code: Option<i64>, packet_id: u64 },

    /// Attributed bytes would exceed what a TLS record physically carried
    #[error("attributed bytes exceed the capacity of TLS record {record_id}")]
    RecordCapacityExceeded { record_id: u64 },

    /// Two capture frames share a frame number
    #[error("packet {packet_id} was already ingested")]
    DuplicatePacket { packet_id: u64 },

    /// DATA/HEADERS frame observed before its web object exists
    #[error("frame on stream {stream_id} arrived before any web object was created")]
    PrematureFrame { stream_id: u32 },

    /// Failure while ingesting a specific packet
    #[error("packet {packet_id}: {source}")]
    Packet {
        packet_id: u64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn missing(name: &str, context: &str) -> Self {
        Error::MissingField {
            name: name.to_string(),
            context: context.to_string(),
        }
    }

    pub(crate) fn invalid(name: &str, value: impl Into<String>) -> Self {
        Error::InvalidValue {
            name: name.to_string(),
            value: value.into(),
        }
    }

    /// Attach the capture frame number, unless the error already carries one.
    pub(crate) fn in_packet(self, packet_id: u64) -> Self {
        match self {
            Error::Packet { .. } => self,
            other => Error::Packet {
                packet_id,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with packet context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Packet { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
