//! Tests for record/frame association and byte ranges

use h2_provenance::{Error, Frame, PacketId, Session, SessionConfig, TlsRecord};

use crate::support::*;

fn frames_in(session: &Session, packet: PacketId) -> Vec<&Frame> {
    session.frames().filter(|f| f.packet_id == packet).collect()
}

fn record_in(session: &Session, packet: PacketId) -> &TlsRecord {
    session
        .records()
        .find(|r| r.location.packet_id == packet && r.is_application_data())
        .unwrap()
}

/// Reconstruct, expecting a capacity failure; returns the offending record.
fn capacity_error(packets: Vec<PacketBuilder>) -> u64 {
    let trees: Vec<_> = packets.into_iter().map(PacketBuilder::build).collect();
    match Session::reconstruct(SessionConfig::default(), &trees).unwrap_err().root() {
        Error::RecordCapacityExceeded { record_id } => *record_id,
        other => panic!("Expected capacity error, got {:?}", other),
    }
}

/// Byte ranges are ordered, stay inside their records, and every record's
/// content length equals what was attributed to it.
fn assert_provenance(session: &Session) {
    for frame in session.frames() {
        for index in &frame.segment_indices {
            let record = session.records().find(|r| r.id == index.record_id).unwrap();
            assert!(index.bytecount_start <= index.bytecount_finish);
            assert!(index.bytecount_start >= record.bytecount_index);
            assert!(index.bytecount_finish < record.bytecount_index + record.length);
        }
        if let Some((start, finish)) = frame.byte_range() {
            assert!(start <= finish);
        }
    }
    for record in session.records() {
        let attributed: u64 = record
            .segments
            .iter()
            .flat_map(|s| s.frames.iter())
            .map(|c| c.byte_count)
            .sum();
        assert_eq!(attributed, record.content_length);
        for segment in &record.segments {
            assert!(segment.attributed() <= segment.length);
        }
    }
}

#[test]
fn test_single_segment_record_fully_consumed() {
    let session = reconstruct(vec![
        client(1, 0.1).ssl(vec![handshake(1, 512)]),
        client(2, 0.2)
            .ssl(vec![app_data(200)])
            .http2(vec![request(1, 200, "/", true)]),
        server(3, 0.3)
            .ssl(vec![app_data(1000)])
            .http2(vec![data(1, 1000, true)]),
    ]);

    let record = record_in(&session, 3);
    assert_eq!(record.bytecount_index, 200);
    assert_eq!(record.content_length, 1000);

    let frames = frames_in(&session, 3);
    assert_eq!(frames.len(), 1);
    let frame = frames[0];
    assert_eq!(frame.record, Some(record.id));
    assert_eq!(frame.segment_indices.len(), 1);
    assert_eq!(frame.segment_indices[0].segment, 0);
    assert_eq!(frame.segment_indices[0].byte_count, 1000);
    assert_eq!(frame.bytecount_start, Some(record.bytecount_index));
    assert_eq!(frame.bytecount_finish, Some(record.bytecount_index + 999));
    assert_provenance(&session);
}

#[test]
fn test_frames_sharing_a_record_split_its_span() {
    let session = reconstruct(vec![client(1, 0.1)
        .ssl(vec![app_data(100)])
        .http2(vec![request(1, 30, "/", false), data(1, 50, true)])]);

    let record = record_in(&session, 1);
    assert_eq!(record.content_length, 80);
    assert_eq!(record.segments[0].frames.len(), 2);

    let frames = frames_in(&session, 1);
    assert_eq!(frames[0].byte_range(), Some((0, 36)));
    assert_eq!(frames[1].byte_range(), Some((37, 99)));
    assert_provenance(&session);
}

#[test]
fn test_reassembled_frame_spans_two_packets() {
    let session = reconstruct(vec![
        server(10, 1.0).ssl(vec![app_data(1000)]),
        server(11, 1.1)
            .ssl(vec![app_data(500), segment_data(1000), segment_data(500)])
            .notices(vec![notice(&[(10, 1000), (11, 500)])])
            .http2(vec![data(1, 1491, false)]),
    ]);

    let first = record_in(&session, 10);
    let second = record_in(&session, 11);
    assert_eq!(second.segments.len(), 3);
    assert_eq!(second.bytecount_index, 1000);
    assert_eq!(first.content_length, 1000);
    assert_eq!(second.content_length, 500);

    let frame = frames_in(&session, 11)[0];
    let carried: Vec<_> = frame
        .segment_indices
        .iter()
        .map(|i| (i.packet_id, i.record_id, i.segment, i.byte_count))
        .collect();
    assert_eq!(carried, vec![(10, first.id, 0, 1000), (11, second.id, 1, 500)]);
    assert_eq!(frame.byte_range(), Some((0, 1499)));

    let packet = session.packet(11).unwrap();
    assert_eq!(packet.notices[0].frame_layer_id, Some(5));
    assert_provenance(&session);
}

#[test]
fn test_duplicate_reassembly_groups_attribute_once() {
    let group = [(5, 100), (5, 200)];
    let session = reconstruct(vec![client(5, 0.5)
        .ssl(vec![app_data(300), segment_data(100), segment_data(200)])
        .notices(vec![notice(&group), notice(&group)])
        .http2(vec![data(1, 141, false), data(1, 141, true)])]);

    let packet = session.packet(5).unwrap();
    assert_eq!(packet.notices.len(), 2);
    assert_eq!(packet.reassembled, vec![0]);
    assert!(packet.notices.iter().all(|n| n.frame_layer_id == Some(5)));

    let record = record_in(&session, 5);
    assert_eq!(record.content_length, 300);
    assert_eq!(record.segments[1].attributed(), 100);
    assert_eq!(record.segments[2].attributed(), 200);

    let frames = frames_in(&session, 5);
    assert_eq!(frames[0].segment_indices.len(), 2);
    assert_eq!(frames[1].segment_indices.len(), 1);
    assert_eq!(frames[0].byte_range(), Some((0, 149)));
    assert_eq!(frames[1].byte_range(), Some((150, 299)));
    assert_provenance(&session);
}

#[test]
fn test_notice_group_positions_are_reversed() {
    let group = [(5, 100), (5, 200)];
    let session = reconstruct(vec![client(5, 0.5)
        .ssl(vec![app_data(300), segment_data(100), segment_data(200)])
        .notices(vec![notice(&group), notice(&group)])
        .http2(vec![data(1, 141, false), data(1, 141, true)])]);

    let packet = session.packet(5).unwrap();
    let positions: Vec<_> = packet
        .notices
        .iter()
        .map(|n| n.group.map(|g| (g.size, g.index)))
        .collect();
    assert_eq!(positions, vec![Some((2, 1)), Some((2, 0))]);
}

#[test]
fn test_frame_without_record_has_no_range() {
    let session = reconstruct(vec![client(1, 0.1).http2(vec![magic(), settings(&[(4, 65535)])])]);

    for frame in session.frames() {
        assert_eq!(frame.record, None);
        assert!(frame.segment_indices.is_empty());
        assert_eq!(frame.byte_range(), None);
    }
}

#[test]
fn test_zero_byte_contribution_collapses_range() {
    let session = reconstruct(vec![client(1, 0.1)
        .ssl(vec![app_data(40)])
        .http2(vec![magic(), settings(&[(3, 100)])])]);

    let frames = frames_in(&session, 1);
    // the preface has no payload bytes of its own
    let (start, finish) = frames[0].byte_range().unwrap();
    assert_eq!(start, finish);
    assert_provenance(&session);
}

#[test]
fn test_repeated_segment_contributions_keep_their_own_spans() {
    let session = reconstruct(vec![client(5, 0.5)
        .ssl(vec![app_data(200), segment_data(150), segment_data(50)])
        .notices(vec![notice(&[(5, 50), (5, 50)])])
        .http2(vec![data(1, 91, true)])]);

    let frame = frames_in(&session, 5)[0];
    let spans: Vec<_> = frame
        .segment_indices
        .iter()
        .map(|i| (i.segment, i.bytecount_start, i.bytecount_finish))
        .collect();
    assert_eq!(spans, vec![(1, 0, 99), (1, 100, 199)]);
    assert_eq!(frame.byte_range(), Some((0, 199)));
    assert_provenance(&session);
}

#[test]
fn test_reassembled_piece_fitting_no_segment() {
    let record = capacity_error(vec![client(6, 0.6)
        .ssl(vec![app_data(300), segment_data(100), segment_data(100)])
        .notices(vec![notice(&[(6, 150)])])
        .http2(vec![data(1, 141, true)])]);
    assert_eq!(record, 1);
}

#[test]
fn test_reassembled_piece_overflowing_earlier_packet() {
    let record = capacity_error(vec![
        client(1, 0.1).ssl(vec![app_data(50)]),
        client(2, 0.2)
            .ssl(vec![app_data(100), segment_data(60), segment_data(40)])
            .notices(vec![notice(&[(1, 60), (2, 40)])])
            .http2(vec![data(1, 91, true)]),
    ]);
    assert_eq!(record, 1);
}
