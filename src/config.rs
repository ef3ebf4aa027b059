//! Session configuration and the negotiated HTTP/2 settings.

use serde::{Deserialize, Serialize};

use crate::h2::SettingId;

/// Default TLS server port.
pub const DEFAULT_SERVER_PORT: u16 = 443;

/// Negotiated HTTP/2 SETTINGS values (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct H2Settings {
    pub header_table_size: u32,
    pub enable_push: u32,
    /// `None` means unlimited.
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    /// `None` means unlimited.
    pub max_header_list_size: Option<u32>,
}

impl Default for H2Settings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: 1,
            max_concurrent_streams: None,
            initial_window_size: 65535,
            max_frame_size: 16384,
            max_header_list_size: None,
        }
    }
}

impl H2Settings {
    pub fn apply(&mut self, id: SettingId, value: u32) {
        match id {
            SettingId::HeaderTableSize => self.header_table_size = value,
            SettingId::EnablePush => self.enable_push = value,
            SettingId::MaxConcurrentStreams => self.max_concurrent_streams = Some(value),
            SettingId::InitialWindowSize => self.initial_window_size = value,
            SettingId::MaxFrameSize => self.max_frame_size = value,
            SettingId::MaxHeaderListSize => self.max_header_list_size = Some(value),
        }
    }
}

/// Knobs for one reconstruction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Packets sent from this port travel server to client.
    pub server_port: u16,
    /// Settings in force before any SETTINGS frame is applied.
    pub initial_settings: H2Settings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            initial_settings: H2Settings::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }
}
