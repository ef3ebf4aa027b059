//! Request/response exchanges reconstructed on top of a stream.
//!
//! A [`WebObject`] walks `WAITING -> REQUEST_HEADERS -> RESPONSE_HEADERS ->
//! PAYLOAD_START -> PAYLOAD_FINISHED` as the owning stream replays its HEADERS
//! and DATA frames. Every transition is logged with its timestamp and the
//! delta since the previous one.

use std::cmp::Ordering;

use serde::Serialize;

use crate::frame::Frame;
use crate::ids::FrameId;

/// Request/response progress of a web object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebObjectState {
    #[default]
    Waiting,
    RequestHeaders,
    ResponseHeaders,
    PayloadStart,
    PayloadFinished,
}

/// A HEADERS frame that opened the request or the response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadersEntry {
    pub frame: FrameId,
    pub length: u64,
    pub timestamp: f64,
}

impl HeadersEntry {
    fn from_frame(frame: &Frame) -> Self {
        Self {
            frame: frame.id,
            length: frame.body,
            timestamp: frame.timestamp,
        }
    }
}

/// One DATA frame of the response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyChunk {
    pub frame: FrameId,
    pub length: u64,
    pub timestamp: f64,
    /// Time since the previous chunk, 0 for the first.
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub state: WebObjectState,
    pub timestamp: f64,
    pub delta: f64,
}

/// One logical request/response exchange inside a stream.
#[derive(Debug, Clone, Serialize)]
pub struct WebObject {
    /// Requested path, when the opening frame carried one.
    pub name: Option<String>,
    pub state: WebObjectState,
    pub request: HeadersEntry,
    pub response: Option<HeadersEntry>,
    pub status: Option<u16>,
    /// Accumulated body length.
    pub length: u64,
    pub body: Vec<BodyChunk>,
    pub finished: bool,
    pub transitions: Vec<Transition>,
}

impl WebObject {
    /// Open an object on the frame that created it.
    pub fn new(frame: &Frame) -> Self {
        Self {
            name: frame.http().and_then(|http| http.http_resource.clone()),
            state: WebObjectState::Waiting,
            request: HeadersEntry::from_frame(frame),
            response: None,
            status: None,
            length: 0,
            body: Vec::new(),
            finished: false,
            transitions: Vec::new(),
        }
    }

    pub fn handle_headers(&mut self, frame: &Frame) {
        if !frame.end_headers() {
            return;
        }
        match self.state {
            WebObjectState::Waiting | WebObjectState::PayloadFinished => {
                self.transition(WebObjectState::RequestHeaders, frame);
            }
            WebObjectState::RequestHeaders => {
                self.status = frame.http().and_then(|http| http.http_status);
                self.response = Some(HeadersEntry::from_frame(frame));
                if frame.end_stream() {
                    // response without a body
                    self.transition(WebObjectState::Waiting, frame);
                } else {
                    self.transition(WebObjectState::ResponseHeaders, frame);
                }
            }
            _ => {}
        }
    }

    pub fn handle_data(&mut self, frame: &Frame) {
        match self.state {
            WebObjectState::ResponseHeaders => {
                if frame.end_stream() {
                    self.transition(WebObjectState::PayloadFinished, frame);
                } else {
                    self.transition(WebObjectState::PayloadStart, frame);
                }
                self.receive_payload(frame);
            }
            WebObjectState::PayloadStart => {
                self.receive_payload(frame);
                if frame.end_stream() {
                    self.transition(WebObjectState::PayloadFinished, frame);
                }
            }
            _ => {}
        }
    }

    pub fn payload_start(&self) -> Option<&BodyChunk> {
        self.body.first()
    }

    pub fn payload_finish(&self) -> Option<&BodyChunk> {
        self.body.last()
    }

    /// Temporal ordering of this object's milestones against another's.
    ///
    /// For each of this object's request and response headers: the ordering
    /// against the other's request headers, response headers and payload
    /// interval. Then, when this object has a body, the ordering of its
    /// payload interval against the same three milestones. Overlapping
    /// intervals compare `Equal`. Empty unless both objects finished.
    pub fn compare(&self, other: &WebObject) -> Vec<Ordering> {
        if !self.finished || !other.finished {
            return Vec::new();
        }
        let (Some(response), Some(other_response)) = (&self.response, &other.response) else {
            return Vec::new();
        };
        let other_payload = other.payload_interval();

        let mut comparison = Vec::new();
        for this in [self.request.timestamp, response.timestamp] {
            comparison.push(order(this, other.request.timestamp));
            comparison.push(order(this, other_response.timestamp));
            if let Some(interval) = other_payload {
                comparison.push(against_interval(this, interval));
            }
        }

        if let Some((start, finish)) = self.payload_interval() {
            comparison.push(interval_against((start, finish), other.request.timestamp));
            comparison.push(interval_against((start, finish), other_response.timestamp));
            if let Some((other_start, other_finish)) = other_payload {
                comparison.push(if finish < other_start {
                    Ordering::Less
                } else if start > other_finish {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                });
            }
        }
        comparison
    }

    fn payload_interval(&self) -> Option<(f64, f64)> {
        Some((self.payload_start()?.timestamp, self.payload_finish()?.timestamp))
    }

    fn transition(&mut self, state: WebObjectState, frame: &Frame) {
        let delta = self
            .transitions
            .last()
            .map_or(0.0, |last| frame.timestamp - last.timestamp);
        self.transitions.push(Transition {
            state,
            timestamp: frame.timestamp,
            delta,
        });
        self.state = state;
    }

    fn receive_payload(&mut self, frame: &Frame) {
        if frame.end_stream() {
            self.finished = true;
        }
        let delta = self
            .body
            .last()
            .map_or(0.0, |last| frame.timestamp - last.timestamp);
        self.length += frame.body;
        self.body.push(BodyChunk {
            frame: frame.id,
            length: frame.body,
            timestamp: frame.timestamp,
            delta,
        });
    }
}

fn order(lhs: f64, rhs: f64) -> Ordering {
    lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal)
}

fn against_interval(point: f64, (start, finish): (f64, f64)) -> Ordering {
    if point < start {
        Ordering::Less
    } else if point > finish {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

fn interval_against((start, finish): (f64, f64), point: f64) -> Ordering {
    if finish < point {
        Ordering::Less
    } else if start > point {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}
