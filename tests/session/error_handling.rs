//! Tests for fatal reconstruction errors

use h2_provenance::{Error, FieldNode, Session, SessionBuilder, SessionConfig};

use crate::support::*;

fn ingest_error(packets: Vec<PacketBuilder>) -> Error {
    let mut builder = SessionBuilder::new(SessionConfig::default());
    for packet in packets {
        if let Err(err) = builder.ingest(&packet.build()) {
            return err;
        }
    }
    panic!("Expected ingestion to fail");
}

#[test]
fn test_missing_record_length_names_packet() {
    let broken = FieldNode::field("ssl.record").with(FieldNode::leaf("ssl.record.content_type", 23));
    let err = ingest_error(vec![client(4, 0.4).ssl(vec![broken])]);

    match &err {
        Error::Packet { packet_id, source } => {
            assert_eq!(*packet_id, 4);
            assert!(matches!(**source, Error::MissingField { ref name, .. } if name == "ssl.record.length"));
        }
        _ => panic!("Expected packet context, got {:?}", err),
    }
    assert!(err.to_string().starts_with("packet 4:"));
}

#[test]
fn test_frame_without_type_or_magic() {
    let broken = FieldNode::field("http2.stream").with(FieldNode::leaf("http2.length", 4));
    let err = ingest_error(vec![client(2, 0.2).http2(vec![broken])]);
    assert!(matches!(
        err.root(),
        Error::UnknownFrameType {
            code: None,
            packet_id: 2
        }
    ));
}

#[test]
fn test_direct_frame_exceeding_record() {
    let err = ingest_error(vec![client(1, 0.1)
        .ssl(vec![app_data(100)])
        .http2(vec![data(1, 200, true)])]);
    assert!(matches!(err.root(), Error::RecordCapacityExceeded { record_id: 1 }));
}

#[test]
fn test_exhausted_reassembly_group() {
    let err = ingest_error(vec![client(7, 0.7)
        .ssl(vec![app_data(100), segment_data(50), segment_data(50)])
        .notices(vec![notice(&[(7, 50), (7, 50)])])
        .http2(vec![data(1, 41, false), data(1, 41, true)])]);
    assert!(matches!(err.root(), Error::RecordCapacityExceeded { record_id: 1 }));
}

#[test]
fn test_missing_packet_header_is_not_wrapped() {
    let tree = FieldNode::layer("packet").with(FieldNode::layer("frame"));
    let err = Session::reconstruct(SessionConfig::default(), [&tree]).unwrap_err();
    assert!(matches!(err, Error::MissingField { ref name, .. } if name == "frame.number"));
}

#[test]
fn test_malformed_flag_value() {
    let mut tree = client(3, 0.3).http2(vec![data(1, 10, false)]).build();
    // corrupt the END_STREAM flag of the only frame
    let http2 = tree.children.last_mut().unwrap();
    let flags = &mut http2.children[0].children[3];
    flags.children[1].show = Some("maybe".into());

    let err = Session::reconstruct(SessionConfig::default(), [&tree]).unwrap_err();
    assert!(matches!(err.root(), Error::InvalidValue { ref name, .. } if name == "http2.flags.end_stream"));
}

#[test]
fn test_failed_ingest_abandons_session() {
    let mut builder = SessionBuilder::new(SessionConfig::default());
    builder.ingest(&client(1, 0.1).http2(vec![magic()]).build()).unwrap();

    let broken = FieldNode::field("http2.stream").with(FieldNode::leaf("http2.length", 4));
    let terminating = server(2, 0.2).http2(vec![goaway(0, 0xb), broken]).build();
    let err = builder.ingest(&terminating).unwrap_err();
    assert!(matches!(
        err.root(),
        Error::UnknownFrameType {
            code: None,
            packet_id: 2
        }
    ));

    // the builder keeps failing with the first error
    let later = client(3, 0.3).http2(vec![ping(false)]).build();
    let again = builder.ingest(&later).unwrap_err();
    assert_eq!(again.to_string(), err.to_string());

    let finished = builder.finish().unwrap_err();
    assert_eq!(finished.to_string(), err.to_string());
}

#[test]
fn test_duplicate_frame_number_rejected() {
    let err = ingest_error(vec![
        client(4, 0.4).http2(vec![magic()]),
        client(4, 0.5).http2(vec![ping(false)]),
    ]);
    assert!(matches!(err, Error::DuplicatePacket { packet_id: 4 }));
}

#[test]
fn test_reassembly_beyond_record_length() {
    let err = ingest_error(vec![client(1, 0.1)
        .ssl(vec![app_data(100), segment_data(500)])
        .notices(vec![notice(&[(1, 400)])])
        .http2(vec![data(1, 391, true)])]);
    assert!(matches!(err.root(), Error::RecordCapacityExceeded { record_id: 1 }));
}
