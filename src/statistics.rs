//! Per-frame-type counters.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::frame::Frame;
use crate::h2::FrameType;

/// Running totals for one frame type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameTypeStats {
    pub count: u64,
    pub length: u64,
    /// Latest timestamp seen for this type.
    pub timestamp: f64,
}

/// Frame counters, kept per session and per stream.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    per_type: BTreeMap<FrameType, FrameTypeStats>,
    total_count: u64,
    total_length: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_frame(&mut self, frame: &Frame) {
        self.record(frame.frame_type(), frame.length, frame.timestamp);
    }

    pub fn record(&mut self, frame_type: FrameType, length: u64, timestamp: f64) {
        self.total_count += 1;
        self.total_length += length;

        let entry = self.per_type.entry(frame_type).or_default();
        entry.count += 1;
        entry.length += length;
        if timestamp > entry.timestamp {
            entry.timestamp = timestamp;
        }
    }

    pub fn get(&self, frame_type: FrameType) -> FrameTypeStats {
        self.per_type.get(&frame_type).copied().unwrap_or_default()
    }

    /// Latest timestamp seen for a frame type, 0.0 when none was seen.
    pub fn last_timestamp(&self, frame_type: FrameType) -> f64 {
        self.get(frame_type).timestamp
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Share of all frames that had this type, in percent. Zero when
    /// nothing has been observed.
    pub fn relative_count(&self, frame_type: FrameType) -> f64 {
        percent(self.get(frame_type).count, self.total_count)
    }

    /// Share of all frame bytes that this type accounted for, in percent.
    pub fn relative_length(&self, frame_type: FrameType) -> f64 {
        percent(self.get(frame_type).length, self.total_length)
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

#[derive(Serialize)]
struct Entry {
    count: u64,
    length: u64,
    timestamp: f64,
    relative_count: f64,
    relative_length: f64,
}

impl Serialize for Statistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FrameType::ALL.len()))?;
        for frame_type in FrameType::ALL {
            let stats = self.get(frame_type);
            map.serialize_entry(
                &frame_type,
                &Entry {
                    count: stats.count,
                    length: stats.length,
                    timestamp: stats.timestamp,
                    relative_count: self.relative_count(frame_type),
                    relative_length: self.relative_length(frame_type),
                },
            )?;
        }
        map.end()
    }
}
