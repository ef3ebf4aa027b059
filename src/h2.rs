//! HTTP/2 protocol vocabulary (RFC 7540).
//!
//! Frame type codes, SETTINGS identifiers and error codes as the dissector
//! reports them, plus the typed enums the reconstruction works with.

use serde::Serialize;

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// HTTP/2 error codes (RFC 7540 Section 7)
pub mod error_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const INTERNAL_ERROR: u32 = 0x2;
    pub const FLOW_CONTROL_ERROR: u32 = 0x3;
    pub const SETTINGS_TIMEOUT: u32 = 0x4;
    pub const STREAM_CLOSED: u32 = 0x5;
    pub const FRAME_SIZE_ERROR: u32 = 0x6;
    pub const REFUSED_STREAM: u32 = 0x7;
    pub const CANCEL: u32 = 0x8;
    pub const COMPRESSION_ERROR: u32 = 0x9;
    pub const CONNECT_ERROR: u32 = 0xa;
    pub const ENHANCE_YOUR_CALM: u32 = 0xb;
    pub const INADEQUATE_SECURITY: u32 = 0xc;
    pub const HTTP_1_1_REQUIRED: u32 = 0xd;
}

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_LEN: u64 = 9;

/// Size of the client connection preface (`PRI * HTTP/2.0...`).
pub const PREFACE_LEN: u64 = 24;

/// The kind of an HTTP/2 frame, including the connection preface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Magic,
}

impl FrameType {
    pub const ALL: [FrameType; 11] = [
        FrameType::Data,
        FrameType::Headers,
        FrameType::Priority,
        FrameType::RstStream,
        FrameType::Settings,
        FrameType::PushPromise,
        FrameType::Ping,
        FrameType::GoAway,
        FrameType::WindowUpdate,
        FrameType::Continuation,
        FrameType::Magic,
    ];

    /// Map a wire type code to a frame type. The preface has no code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            frame_type::DATA => Some(FrameType::Data),
            frame_type::HEADERS => Some(FrameType::Headers),
            frame_type::PRIORITY => Some(FrameType::Priority),
            frame_type::RST_STREAM => Some(FrameType::RstStream),
            frame_type::SETTINGS => Some(FrameType::Settings),
            frame_type::PUSH_PROMISE => Some(FrameType::PushPromise),
            frame_type::PING => Some(FrameType::Ping),
            frame_type::GOAWAY => Some(FrameType::GoAway),
            frame_type::WINDOW_UPDATE => Some(FrameType::WindowUpdate),
            frame_type::CONTINUATION => Some(FrameType::Continuation),
            _ => None,
        }
    }
}

/// HTTP/2 error code carried by RST_STREAM and GOAWAY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    #[default]
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
    #[serde(rename = "HTTP_1_1_REQUIRED")]
    Http11Required,
    Other(u32),
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            error_code::NO_ERROR => ErrorCode::NoError,
            error_code::PROTOCOL_ERROR => ErrorCode::ProtocolError,
            error_code::INTERNAL_ERROR => ErrorCode::InternalError,
            error_code::FLOW_CONTROL_ERROR => ErrorCode::FlowControlError,
            error_code::SETTINGS_TIMEOUT => ErrorCode::SettingsTimeout,
            error_code::STREAM_CLOSED => ErrorCode::StreamClosed,
            error_code::FRAME_SIZE_ERROR => ErrorCode::FrameSizeError,
            error_code::REFUSED_STREAM => ErrorCode::RefusedStream,
            error_code::CANCEL => ErrorCode::Cancel,
            error_code::COMPRESSION_ERROR => ErrorCode::CompressionError,
            error_code::CONNECT_ERROR => ErrorCode::ConnectError,
            error_code::ENHANCE_YOUR_CALM => ErrorCode::EnhanceYourCalm,
            error_code::INADEQUATE_SECURITY => ErrorCode::InadequateSecurity,
            error_code::HTTP_1_1_REQUIRED => ErrorCode::Http11Required,
            other => ErrorCode::Other(other),
        }
    }
}

/// SETTINGS parameter identifiers understood by the reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
}

impl SettingId {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            settings_id::HEADER_TABLE_SIZE => Some(SettingId::HeaderTableSize),
            settings_id::ENABLE_PUSH => Some(SettingId::EnablePush),
            settings_id::MAX_CONCURRENT_STREAMS => Some(SettingId::MaxConcurrentStreams),
            settings_id::INITIAL_WINDOW_SIZE => Some(SettingId::InitialWindowSize),
            settings_id::MAX_FRAME_SIZE => Some(SettingId::MaxFrameSize),
            settings_id::MAX_HEADER_LIST_SIZE => Some(SettingId::MaxHeaderListSize),
            _ => None,
        }
    }

    /// Dissector field holding this setting's value.
    pub fn value_field(&self) -> &'static str {
        match self {
            SettingId::HeaderTableSize => "http2.settings.header_table_size",
            SettingId::EnablePush => "http2.settings.enable_push",
            SettingId::MaxConcurrentStreams => "http2.settings.max_concurrent_streams",
            SettingId::InitialWindowSize => "http2.settings.initial_window_size",
            SettingId::MaxFrameSize => "http2.settings.max_frame_size",
            SettingId::MaxHeaderListSize => "http2.settings.max_header_list_size",
        }
    }
}

/// Which side sent a frame, judged by the server port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "C2S")]
    ClientToServer,
    #[serde(rename = "S2C")]
    ServerToClient,
}

impl Direction {
    pub fn from_source_port(source_port: u16, server_port: u16) -> Self {
        if source_port == server_port {
            Direction::ServerToClient
        } else {
            Direction::ClientToServer
        }
    }
}

/// Stream lifecycle states (RFC 7540 Section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamState {
    #[default]
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}
