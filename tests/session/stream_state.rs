//! Tests for stream replay and the priority tree

use h2_provenance::{ErrorCode, StreamState};

use crate::support::*;

#[test]
fn test_replay_sorts_frames_by_timestamp() {
    // the DATA frame is captured before the response headers it follows
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/", true)]),
        server(2, 3.0).http2(vec![data(1, 100, true)]),
        server(3, 2.0).http2(vec![response(1, 10, 200, false)]),
    ]);

    let stream = session.stream(1).unwrap();
    assert_eq!(stream.state, StreamState::Closed);
    assert_eq!(stream.first_seen, Some(1.0));
    assert_eq!(stream.last_seen, Some(3.0));

    let timestamps: Vec<f64> = stream
        .frames
        .iter()
        .map(|&id| session.frame(id).unwrap().timestamp)
        .collect();
    assert_eq!(timestamps, vec![1.0, 2.0, 3.0]);
    assert!(stream.objects[0].finished);
}

#[test]
fn test_closed_and_active_streams_per_packet() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/", true)]),
        client(2, 1.5).http2(vec![request(3, 20, "/style.css", true)]),
        server(3, 2.0).http2(vec![response(1, 10, 200, true)]),
        server(4, 4.0).http2(vec![response(3, 10, 200, true)]),
    ]);

    assert_eq!(session.packet(1).unwrap().streams, vec![1]);
    assert_eq!(session.packet(2).unwrap().streams, vec![3]);
    assert!(session.packet(3).unwrap().streams_closed.contains(&1));
    assert!(session.packet(4).unwrap().streams_closed.contains(&3));

    let active: Vec<_> = session.packet(3).unwrap().streams_active.iter().copied().collect();
    assert_eq!(active, vec![1, 3]);
    let active: Vec<_> = session.packet(4).unwrap().streams_active.iter().copied().collect();
    assert_eq!(active, vec![3]);
}

#[test]
fn test_exclusive_priority_adopts_siblings() {
    let session = reconstruct(vec![client(1, 1.0).http2(vec![
        request(3, 20, "/", false),
        priority(7, 3, false, 15),
        priority(9, 3, false, 15),
        priority(5, 3, true, 255),
    ])]);

    let five = session.stream(5).unwrap();
    assert_eq!(five.parent, Some(3));
    assert!(five.children.contains(&7));
    assert!(five.children.contains(&9));
    assert_eq!(five.weight, 255);

    let three = session.stream(3).unwrap();
    assert_eq!(three.children.iter().copied().collect::<Vec<_>>(), vec![5]);
    assert_eq!(session.stream(7).unwrap().parent, Some(5));
    assert_eq!(session.stream(9).unwrap().parent, Some(5));
}

#[test]
fn test_negative_weight_leaves_default() {
    let session = reconstruct(vec![client(1, 1.0).http2(vec![
        request(1, 20, "/", false),
        priority(3, 1, false, -1),
    ])]);

    let stream = session.stream(3).unwrap();
    assert_eq!(stream.weight, 16);
    assert_eq!(stream.parent, Some(1));
    assert_eq!(stream.state, StreamState::Idle);
}

#[test]
fn test_window_starts_at_negotiated_size() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![magic(), settings(&[(4, 1_048_576)])]),
        client(2, 1.1).http2(vec![request(1, 20, "/", true), window_update(1, 1000)]),
    ]);

    assert_eq!(session.settings().initial_window_size, 1_048_576);
    assert_eq!(session.stream(1).unwrap().window_size, Some(1_049_576));
    assert_eq!(session.stream(0).unwrap().window_size, Some(1_048_576));
}

#[test]
fn test_push_promise_reserves_and_headers_half_close() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/", true)]),
        server(2, 1.1).http2(vec![push_promise(2, 2)]),
        server(3, 1.2).http2(vec![response(2, 10, 200, false)]),
    ]);

    // stream 2 was opened by the server, so its own endpoint sent both frames
    let pushed = session.stream(2).unwrap();
    assert_eq!(pushed.endpoint, SERVER);
    assert_eq!(pushed.state, StreamState::HalfClosedRemote);
}

#[test]
fn test_rst_stream_records_error_and_closes() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/", true)]),
        server(2, 1.1).http2(vec![rst_stream(1, 0x8)]),
    ]);

    let stream = session.stream(1).unwrap();
    assert_eq!(stream.state, StreamState::Closed);
    assert_eq!(stream.error, ErrorCode::Cancel);
}

#[test]
fn test_stream_length_sums_declared_frames() {
    let session = reconstruct(vec![
        client(1, 1.0).http2(vec![request(1, 20, "/", true)]),
        server(2, 1.1).http2(vec![response(1, 10, 200, false), data(1, 100, true)]),
    ]);

    assert_eq!(session.stream(1).unwrap().length, 29 + 19 + 109);
}
