//! h2-provenance: HTTP/2-over-TLS reconstruction from dissected captures
//!
//! This crate rebuilds TLS records, HTTP/2 frames, streams, request/response
//! exchanges and the connection lifecycle from the field trees an external
//! packet dissector produces. Every HTTP/2 frame is traced back to the TLS
//! record segments that physically carried it, giving byte-accurate
//! positions in the connection's decrypted application-data stream.
//!
//! # Features
//!
//! - **No packet decoding**: consumes any dissector output through [`FieldTree`]
//! - **TLS dialects**: both `ssl` and `tls` layer naming
//! - **Byte provenance**: record/frame alignment across reassembled segments
//! - **RFC 7540 stream states**: timestamp-ordered replay, priority tree
//! - **Web objects**: request/response/payload timing per stream
//! - **Serialization view**: every entity implements `serde::Serialize`
//!
//! # Quick Start
//!
//! ```rust
//! use h2_provenance::{FieldNode, Session, SessionConfig};
//!
//! # fn packets() -> Vec<FieldNode> { Vec::new() }
//! let trees: Vec<FieldNode> = packets();
//! let session = Session::reconstruct(SessionConfig::default(), &trees).unwrap();
//!
//! for stream in session.streams() {
//!     println!("stream {} ended {:?}", stream.id, stream.state);
//!     for object in &stream.objects {
//!         println!("  {:?} -> {} body bytes", object.name, object.length);
//!     }
//! }
//! for frame in session.frames() {
//!     if let Some((start, finish)) = frame.byte_range() {
//!         println!("frame {} spans bytes {}..={}", frame.id, start, finish);
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! Reconstruction runs in two phases:
//! - Ingestion (packets in capture order → records, frames, streams, and
//!   per-packet record/frame association)
//! - Analysis (byte ranges, stream replay, active-stream windows)
//!
//! It does NOT provide:
//! - Packet capture or dissection (bring your own dissector output)
//! - TLS decryption (input is already decrypted)
//! - Output file formats (serialize the views however you like)

mod assoc;
pub mod config;
pub mod connection;
pub mod error;
pub mod field;
pub mod frame;
pub mod h2;
pub mod ids;
pub mod object;
pub mod packet;
pub mod record;
pub mod session;
pub mod statistics;
pub mod stream;

pub use config::{H2Settings, SessionConfig};
pub use connection::Connection;
pub use error::{Error, Result};
pub use field::{FieldNode, FieldTree, NodeKind};
pub use frame::{Frame, FrameKind, HttpSummary, PrioritySpec, SegmentIndex};
pub use h2::{error_code, frame_type, settings_id, Direction, ErrorCode, FrameType, SettingId, StreamState};
pub use ids::{FrameId, Location, PacketId, RecordId, StreamId};
pub use object::{WebObject, WebObjectState};
pub use packet::{Packet, ReassemblyNotice};
pub use record::{SegmentData, TlsHandshakeType, TlsRecord, TlsRecordType};
pub use session::{Session, SessionBuilder};
pub use statistics::Statistics;
pub use stream::Stream;
