//! Connection-level lifecycle: stream ids, endpoints, settings, termination.

use serde::Serialize;
use tracing::debug;

use crate::config::H2Settings;
use crate::frame::{Frame, FrameKind};
use crate::h2::{Direction, ErrorCode};
use crate::ids::StreamId;
use crate::record::TlsHandshakeType;

/// Connection summary of one capture.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Connection {
    pub first_stream: Option<StreamId>,
    pub last_stream: Option<StreamId>,
    pub terminated: bool,
    /// Error code of the GOAWAY that terminated the connection.
    pub error: ErrorCode,
    /// Source address of the CLIENT_HELLO.
    pub client_address: Option<String>,
    /// Source address of the SERVER_HELLO.
    pub server_address: Option<String>,
    pub client_streams: Vec<StreamId>,
    pub server_streams: Vec<StreamId>,
    /// Negotiated settings.
    pub settings: H2Settings,
}

impl Connection {
    pub fn new(settings: H2Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Account for a newly created stream.
    pub fn process_stream(&mut self, stream_id: StreamId, direction: Direction) {
        self.first_stream = Some(self.first_stream.map_or(stream_id, |s| s.min(stream_id)));
        self.last_stream = Some(self.last_stream.map_or(stream_id, |s| s.max(stream_id)));
        match direction {
            Direction::ClientToServer => self.client_streams.push(stream_id),
            Direction::ServerToClient => self.server_streams.push(stream_id),
        }
    }

    pub fn process_handshake(&mut self, source: &str, handshake: TlsHandshakeType) {
        match handshake {
            TlsHandshakeType::ClientHello => self.client_address = Some(source.to_string()),
            TlsHandshakeType::ServerHello => self.server_address = Some(source.to_string()),
            _ => {}
        }
    }

    /// Apply a GOAWAY frame.
    ///
    /// `latest` is the newest timestamp of GOAWAY frames seen on the frame's
    /// stream so far, including this one. Only GOAWAY on stream 0 that is not
    /// older than `latest` terminates the connection.
    pub fn handle_goaway(&mut self, frame: &Frame, latest: f64) {
        let FrameKind::GoAway { error, .. } = frame.kind else {
            return;
        };
        if frame.stream_id != 0 {
            return;
        }
        if frame.timestamp < latest {
            debug!(frame = frame.id, timestamp = frame.timestamp, latest, "stale GOAWAY ignored");
            return;
        }
        self.terminated = true;
        self.error = error;
    }

    /// Apply a SETTINGS frame under the same staleness guard as GOAWAY.
    pub fn handle_settings(&mut self, frame: &Frame, latest: f64) {
        let FrameKind::Settings { settings, .. } = &frame.kind else {
            return;
        };
        if settings.is_empty() {
            return;
        }
        if frame.timestamp < latest {
            debug!(frame = frame.id, timestamp = frame.timestamp, latest, "stale SETTINGS ignored");
            return;
        }
        for &(id, value) in settings {
            self.settings.apply(id, value);
        }
    }
}
