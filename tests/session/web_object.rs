//! Tests for request/response objects reconstructed on streams

use std::cmp::Ordering;

use h2_provenance::WebObjectState;

use crate::support::*;

#[test]
fn test_get_with_body_finishes_object() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/", true)]),
        server(2, 1.2).http2(vec![response(1, 10, 200, false)]),
        server(3, 1.5).http2(vec![data(1, 100, true)]),
    ]);

    let stream = session.stream(1).unwrap();
    assert_eq!(stream.objects.len(), 1);
    let object = &stream.objects[0];

    let states: Vec<_> = object.transitions.iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![
            WebObjectState::RequestHeaders,
            WebObjectState::ResponseHeaders,
            WebObjectState::PayloadFinished,
        ]
    );
    assert!(object.finished);
    assert_eq!(object.length, 100);
    assert_eq!(object.status, Some(200));
    assert_eq!(object.name.as_deref(), Some("/"));
    assert_eq!(object.body.len(), 1);
    assert_eq!(object.body[0].delta, 0.0);
    assert!((object.transitions[1].delta - 0.2).abs() < 1e-9);
}

#[test]
fn test_body_split_over_several_data_frames() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/app.js", true)]),
        server(2, 1.1).http2(vec![response(1, 10, 200, false), data(1, 16384, false)]),
        server(3, 1.3).http2(vec![data(1, 16384, false)]),
        server(4, 1.6).http2(vec![data(1, 1000, true)]),
    ]);

    let object = &session.stream(1).unwrap().objects[0];
    assert_eq!(object.state, WebObjectState::PayloadFinished);
    assert_eq!(object.length, 33768);
    let deltas: Vec<f64> = object.body.iter().map(|c| c.delta).collect();
    assert_eq!(deltas.len(), 3);
    assert_eq!(deltas[0], 0.0);
    assert!((deltas[1] - 0.2).abs() < 1e-9);
    assert!((deltas[2] - 0.3).abs() < 1e-9);
}

#[test]
fn test_empty_response_returns_to_waiting() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/favicon.ico", true)]),
        server(2, 1.1).http2(vec![response(1, 10, 204, true)]),
    ]);

    let object = &session.stream(1).unwrap().objects[0];
    assert_eq!(object.state, WebObjectState::Waiting);
    assert_eq!(object.status, Some(204));
    assert!(!object.finished);
    assert!(object.response.is_some());
}

#[test]
fn test_compare_objects_on_different_streams() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/", true)]),
        server(2, 1.1).http2(vec![response(1, 10, 200, false), data(1, 100, true)]),
        client(3, 2.0).http2(vec![request(3, 20, "/next", true)]),
        server(4, 2.1).http2(vec![response(3, 10, 200, false), data(3, 100, true)]),
    ]);

    let first = &session.stream(1).unwrap().objects[0];
    let second = &session.stream(3).unwrap().objects[0];
    let comparison = first.compare(second);
    assert!(!comparison.is_empty());
    assert!(comparison.iter().all(|o| *o == Ordering::Less));
}
