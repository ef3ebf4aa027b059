//! Tests for connection lifecycle and settings negotiation

use h2_provenance::{error_code, settings_id, Direction, ErrorCode};

use crate::support::*;

#[test]
fn test_stale_goaway_is_ignored() {
    let session = reconstruct(vec![
        server(1, 10.0).http2(vec![goaway(5, error_code::ENHANCE_YOUR_CALM)]),
        server(2, 8.0).http2(vec![goaway(3, error_code::PROTOCOL_ERROR)]),
    ]);

    let connection = session.connection();
    assert!(connection.terminated);
    assert_eq!(connection.error, ErrorCode::EnhanceYourCalm);
}

#[test]
fn test_newer_goaway_overrides_older() {
    let session = reconstruct(vec![
        server(1, 8.0).http2(vec![goaway(3, error_code::NO_ERROR)]),
        server(2, 10.0).http2(vec![goaway(5, error_code::INTERNAL_ERROR)]),
    ]);

    assert!(session.connection().terminated);
    assert_eq!(session.connection().error, ErrorCode::InternalError);
}

#[test]
fn test_connection_open_without_goaway() {
    let session = reconstruct(vec![client(1, 1.0).http2(vec![magic(), ping(false)])]);
    assert!(!session.connection().terminated);
    assert_eq!(session.connection().error, ErrorCode::NoError);
}

#[test]
fn test_stale_settings_are_ignored() {
    let session = reconstruct(vec![
        client(1, 5.0).http2(vec![settings(&[(settings_id::MAX_CONCURRENT_STREAMS, 100)])]),
        client(2, 4.0).http2(vec![settings(&[
            (settings_id::MAX_CONCURRENT_STREAMS, 10),
            (settings_id::MAX_FRAME_SIZE, 32768),
        ])]),
    ]);

    let settings = session.settings();
    assert_eq!(settings.max_concurrent_streams, Some(100));
    assert_eq!(settings.max_frame_size, 16384);
    assert_eq!(settings.header_table_size, 4096);
}

#[test]
fn test_handshake_endpoints_and_stream_directions() {
    let session = reconstruct(vec![
        client(1, 0.1).ssl(vec![handshake(1, 512)]),
        server(2, 0.2).ssl(vec![handshake(2, 90)]),
        client(3, 0.3).http2(vec![magic(), request(1, 20, "/", true)]),
        server(4, 0.4).http2(vec![push_promise(2, 2)]),
    ]);

    let connection = session.connection();
    assert_eq!(connection.client_address.as_deref(), Some(CLIENT));
    assert_eq!(connection.server_address.as_deref(), Some(SERVER));
    assert_eq!(connection.first_stream, Some(0));
    assert_eq!(connection.last_stream, Some(2));
    assert_eq!(connection.client_streams, vec![0, 1]);
    assert_eq!(connection.server_streams, vec![2]);
    assert_eq!(session.stream(2).unwrap().direction, Direction::ServerToClient);
}

#[test]
fn test_priority_on_unknown_parent_is_not_linked() {
    let session = reconstruct(vec![client(1, 1.0).http2(vec![priority(5, 3, true, 32)])]);

    let stream = session.stream(5).unwrap();
    assert_eq!(stream.parent, None);
    assert_eq!(stream.weight, 32);
    assert!(session.stream(3).is_none());
}
