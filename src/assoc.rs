//! Correlation of TLS record segments with HTTP/2 frame boundaries.
//!
//! TLS records and HTTP/2 frames are segmented independently, so a frame may
//! ride inside one record, several frames may share a record, or a frame may
//! be stitched together from segments spread over several records and
//! packets. The dissector reports records, frames and reassembly notices as
//! separate items; this module interleaves them into one timeline per packet
//! and works out which physical bytes carried which frame.
//!
//! Per packet, in order:
//! 1. consecutive reassembly notices form groups,
//! 2. frames are paired with the record before them, consuming group entries
//!    when that record was reassembled,
//! 3. duplicate groups are folded onto the first equal one,
//! 4. frame bytes are attributed to record segments under a capacity check.
//!
//! Once the whole capture is in, [`compute_byte_ranges`] turns the
//! attributions into inclusive byte ranges in the session's application-data
//! byte space.

use std::collections::{BTreeMap, HashMap};

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::frame::SegmentIndex;
use crate::ids::{FrameId, PacketId, RecordId};
use crate::packet::{GroupPosition, Packet, SegmentRef};
use crate::record::TlsRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Record(usize),
    Frame(usize),
    Notice(usize),
}

/// Run the per-packet association steps.
///
/// `earlier` holds the packets already ingested; reassembled contributions
/// naming one of them are attributed to its records.
pub(crate) fn associate(packet: &mut Packet, earlier: &mut BTreeMap<PacketId, Packet>) -> Result<()> {
    let timeline = timeline(packet);
    let groups = group_notices(packet, &timeline);
    pair_records_with_frames(packet, &timeline, &groups)?;
    let canonical = deduplicate(packet);
    attribute_bytes(packet, earlier, &canonical)
}

/// Application-data records, frames and notices ordered by position.
fn timeline(packet: &Packet) -> Vec<Item> {
    let mut entries: Vec<((u32, u32), Item)> = Vec::new();
    for (index, record) in packet.records.iter().enumerate() {
        if record.is_application_data() {
            entries.push((record.location.timeline_key(), Item::Record(index)));
        }
    }
    for (index, frame) in packet.frames.iter().enumerate() {
        entries.push((frame.location.timeline_key(), Item::Frame(index)));
    }
    for (index, notice) in packet.notices.iter().enumerate() {
        entries.push((notice.location.timeline_key(), Item::Notice(index)));
    }
    entries.sort_by_key(|(key, _)| *key);
    entries.into_iter().map(|(_, item)| item).collect()
}

/// Split runs of consecutive notices into groups and record each notice's
/// position within its group.
fn group_notices(packet: &mut Packet, timeline: &[Item]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut run: Vec<usize> = Vec::new();

    for item in timeline {
        match item {
            Item::Notice(index) => run.push(*index),
            _ if !run.is_empty() => groups.push(std::mem::take(&mut run)),
            _ => {}
        }
    }
    if !run.is_empty() {
        groups.push(run);
    }

    for group in &groups {
        let size = group.len();
        for (k, &notice) in group.iter().enumerate() {
            packet.notices[notice].group = Some(GroupPosition {
                size,
                index: size - 1 - k,
            });
        }
    }
    groups
}

/// Stamp every frame with the record that carried it, or with the notice
/// describing its reassembly.
fn pair_records_with_frames(packet: &mut Packet, timeline: &[Item], groups: &[Vec<usize>]) -> Result<()> {
    let group_of: HashMap<usize, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(g, members)| members.iter().map(move |&n| (n, g)))
        .collect();

    let mut current: Option<usize> = None;
    // (group, entries consumed so far)
    let mut pending: Option<(usize, usize)> = None;

    for item in timeline {
        match *item {
            Item::Record(index) => {
                current = Some(index);
                pending = None;
            }
            Item::Notice(index) => {
                let group = group_of[&index];
                if pending.map_or(true, |(g, _)| g != group) {
                    pending = Some((group, 0));
                }
            }
            Item::Frame(index) => {
                let Some(record_index) = current else {
                    trace!(frame = packet.frames[index].id, "frame precedes every record");
                    continue;
                };
                let record = &packet.records[record_index];
                let record_id = record.id;
                let reassembled = record.segments.len() > 1;

                match pending {
                    Some((group, consumed)) if reassembled => {
                        let members = &groups[group];
                        if consumed >= members.len() {
                            return Err(Error::RecordCapacityExceeded { record_id });
                        }
                        // the k-th frame consumes the notice at position N - 1 - k
                        let notice = members[members.len() - 1 - consumed];
                        let frame = &mut packet.frames[index];
                        frame.reassembly = Some(notice);
                        frame.record = Some(record_id);
                        packet.notices[notice].frame_layer_id = Some(frame.location.layer_id);
                        trace!(frame = frame.id, record = record_id, notice, "frame consumes reassembly");
                        pending = Some((group, consumed + 1));
                    }
                    _ => {
                        let frame = &mut packet.frames[index];
                        frame.record = Some(record_id);
                        trace!(frame = frame.id, record = record_id, "frame stamped with record");
                    }
                }
            }
        }
    }
    Ok(())
}

/// Map every notice to the first notice describing the same reassembly.
/// Distinct notices are remembered in `packet.reassembled`.
fn deduplicate(packet: &mut Packet) -> Vec<usize> {
    packet.reassembled.clear();
    let mut canonical = Vec::with_capacity(packet.notices.len());

    for index in 0..packet.notices.len() {
        let kept = packet
            .reassembled
            .iter()
            .copied()
            .find(|&k| packet.notices[k].same_reassembly(&packet.notices[index]));
        match kept {
            Some(k) => canonical.push(k),
            None => {
                packet.reassembled.push(index);
                canonical.push(index);
            }
        }
    }
    canonical
}

/// Record which segment bytes each frame consumed.
fn attribute_bytes(
    packet: &mut Packet,
    earlier: &mut BTreeMap<PacketId, Packet>,
    canonical: &[usize],
) -> Result<()> {
    let packet_id = packet.id;
    let mut by_group: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

    for index in 0..packet.frames.len() {
        if let Some(notice) = packet.frames[index].reassembly {
            by_group.entry(canonical[notice]).or_default().push(index);
            continue;
        }
        let Some(record_id) = packet.frames[index].record else {
            continue;
        };
        let (frame_id, body) = (packet.frames[index].id, packet.frames[index].body);
        let record = packet
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or(Error::RecordCapacityExceeded { record_id })?;
        let segment = record.attribute_direct(frame_id, body)?;
        packet.frames[index]
            .segment_indices
            .push(SegmentIndex::new(packet_id, record_id, segment, body));
    }

    for (notice, frames) in by_group {
        let lengths: Vec<u64> = frames.iter().map(|&f| packet.frames[f].length).collect();
        let pieces = split_segments(&packet.notices[notice].segments, &lengths);

        for (position, piece) in pieces {
            let index = frames[position];
            let frame_id = packet.frames[index].id;
            let records = if piece.packet_id == packet_id {
                &mut packet.records
            } else if let Some(other) = earlier.get_mut(&piece.packet_id) {
                &mut other.records
            } else {
                warn!(
                    frame = frame_id,
                    packet = piece.packet_id,
                    "reassembled segment names a packet that was never ingested"
                );
                continue;
            };

            match attribute_reassembled(records, frame_id, piece.length)? {
                Some((record_id, segment)) => {
                    trace!(frame = frame_id, record = record_id, segment, bytes = piece.length, "attributed");
                    packet.frames[index].segment_indices.push(SegmentIndex::new(
                        piece.packet_id,
                        record_id,
                        segment,
                        piece.length,
                    ));
                }
                None => warn!(
                    frame = frame_id,
                    packet = piece.packet_id,
                    "reassembled segment names a packet without application data"
                ),
            }
        }
    }
    Ok(())
}

/// Share a group's segments among the frames that consumed it. Frames take
/// their declared length in order; the last frame takes whatever remains.
fn split_segments(segments: &[SegmentRef], lengths: &[u64]) -> Vec<(usize, SegmentRef)> {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    let mut remaining = segments.first().map_or(0, |s| s.length);

    for (position, &length) in lengths.iter().enumerate() {
        let last = position + 1 == lengths.len();
        let mut need = if last { u64::MAX } else { length };
        let mut received = 0;

        while need > 0 && cursor < segments.len() {
            let take = need.min(remaining);
            if take > 0 {
                pieces.push((
                    position,
                    SegmentRef {
                        packet_id: segments[cursor].packet_id,
                        length: take,
                    },
                ));
                need -= take;
                remaining -= take;
                received += take;
            }
            if remaining == 0 {
                cursor += 1;
                remaining = segments.get(cursor).map_or(0, |s| s.length);
            }
        }

        if received == 0 && length > 0 {
            warn!(position, "reassembly group ran out of bytes before this frame");
        }
    }
    pieces
}

fn attribute_reassembled(
    records: &mut [TlsRecord],
    frame_id: FrameId,
    byte_count: u64,
) -> Result<Option<(RecordId, usize)>> {
    let mut last = None;
    for record in records.iter_mut().filter(|r| r.is_application_data()) {
        last = Some(record.id);
        if let Some(segment) = record.attribute_reassembled(frame_id, byte_count) {
            return Ok(Some((record.id, segment)));
        }
    }
    match last {
        Some(record_id) => Err(Error::RecordCapacityExceeded { record_id }),
        None => Ok(None),
    }
}

/// Compute every frame's inclusive byte range from its segment indices.
///
/// Refreshes each record's `content_length` first, since contributions from
/// later packets may have landed in earlier records.
pub(crate) fn compute_byte_ranges(packets: &mut BTreeMap<PacketId, Packet>) {
    for packet in packets.values_mut() {
        for record in &mut packet.records {
            record.refresh_content_length();
        }
    }

    let mut updates: Vec<(PacketId, usize, Vec<SegmentIndex>, Option<(u64, u64)>)> = Vec::new();
    {
        let records: HashMap<RecordId, &TlsRecord> = packets
            .values()
            .flat_map(|p| p.records.iter())
            .map(|r| (r.id, r))
            .collect();

        for packet in packets.values() {
            for (position, frame) in packet.frames.iter().enumerate() {
                if frame.segment_indices.is_empty() {
                    continue;
                }
                let mut indices = frame.segment_indices.clone();
                let mut range: Option<(u64, u64)> = None;
                // a frame may hold several contributions in one segment
                let mut occurrences: HashMap<(RecordId, usize), usize> = HashMap::new();

                for index in &mut indices {
                    let nth = occurrences.entry((index.record_id, index.segment)).or_insert(0);
                    let occurrence = *nth;
                    *nth += 1;
                    let Some(record) = records.get(&index.record_id) else {
                        continue;
                    };
                    let Some((start, finish)) = record_span(record, index.segment, frame.id, occurrence)
                    else {
                        continue;
                    };
                    index.content_length = record.content_length;
                    index.bytecount_start = start;
                    index.bytecount_finish = finish;
                    range = Some(match range {
                        Some((s, f)) => (s.min(start), f.max(finish)),
                        None => (start, finish),
                    });
                }
                updates.push((packet.id, position, indices, range));
            }
        }
    }

    for (packet_id, position, indices, range) in updates {
        if let Some(frame) = packets
            .get_mut(&packet_id)
            .and_then(|p| p.frames.get_mut(position))
        {
            frame.segment_indices = indices;
            frame.bytecount_start = range.map(|(s, _)| s);
            frame.bytecount_finish = range.map(|(_, f)| f);
        }
    }
}

/// Inclusive span of a frame's contribution to one segment, scaled from
/// attributed bytes onto the record's declared length.
fn record_span(record: &TlsRecord, segment: usize, frame_id: FrameId, nth: usize) -> Option<(u64, u64)> {
    let mut offset = 0u64;
    for (position, data) in record.segments.iter().enumerate() {
        if position == segment {
            let (within, size) = data.position_of(frame_id, nth)?;
            return Some(scale(record, offset.saturating_add(within), size));
        }
        offset = offset.saturating_add(data.attributed());
    }
    None
}

fn scale(record: &TlsRecord, offset: u64, size: u64) -> (u64, u64) {
    let length = record.length;
    let content = record.content_length;

    let (first, last) = if content > 0 {
        (
            mul_div(offset, length, content),
            mul_div(offset.saturating_add(size), length, content),
        )
    } else {
        (0, length)
    };
    let first = first.min(length.saturating_sub(1));
    let last = last.min(length);

    let start = record.bytecount_index.saturating_add(first);
    let finish = record
        .bytecount_index
        .saturating_add(last.saturating_sub(1))
        .max(start);
    (start, finish)
}

fn mul_div(value: u64, numerator: u64, denominator: u64) -> u64 {
    let scaled = u128::from(value) * u128::from(numerator) / u128::from(denominator);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}
