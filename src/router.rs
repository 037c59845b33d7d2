//! Per-packet classification: pass-through, TLV fragment, or reject.

use crate::header::FrameDescriptor;
use crate::{TLV_CARRIAGE_PID, TSMF_FRAME_PID, TS_SYNC_BYTE};

/// The subset of [`crate::driver::Demuxer`]'s state the router reads and
/// mutates. Kept separate from the public struct so the router can be unit
/// tested without going through `drive`.
#[derive(Debug)]
pub(crate) struct ParserState {
    pub packet_size: usize,
    pub slot_counter: i32,
    pub frame: Option<FrameDescriptor>,
}

impl Default for ParserState {
    /// `packet_size == 0` implies `slot_counter == -1`, per the invariant
    /// that the slot counter is only meaningful once synchronized.
    fn default() -> Self {
        Self {
            packet_size: 0,
            slot_counter: -1,
            frame: None,
        }
    }
}

impl ParserState {
    pub fn lose_sync(&mut self) {
        self.packet_size = 0;
        self.slot_counter = -1;
    }
}

/// Outcome of routing a single TS packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RouteDecision {
    /// Not emitted: sync loss, a TSMF header, an unmatched slot, or any
    /// other rejection in the decision procedure below.
    Reject,
    /// Emit the whole `packet_size`-byte packet verbatim.
    PassThrough,
    /// Append `buf[header_size..]` to the in-progress TLV reassembly.
    TlvContinuation { header_size: usize },
    /// Flush the in-progress TLV reassembly plus `buf[header_size..start]`,
    /// then begin a new reassembly from `buf[start..]`.
    TlvStart { header_size: usize, start: usize },
}

/// Classifies one TS packet: sync check, filter bypass, header consumption,
/// slot-counter bound, stream lookup, activity and slot-ownership checks,
/// and finally TLV start/continuation detection.
///
/// `buf` must be exactly `state.packet_size` bytes once synchronized.
pub(crate) fn route(
    state: &mut ParserState,
    buf: &[u8],
    onid: u16,
    tsid: u16,
    relative: bool,
) -> RouteDecision {
    if buf[0] != TS_SYNC_BYTE {
        log::debug!("TS sync lost mid-stream, resetting packet synchronization");
        state.lose_sync();
        return RouteDecision::Reject;
    }

    if tsid == 0xFFFF {
        return RouteDecision::PassThrough;
    }

    let pid = ((buf[1] as u16) << 8 | buf[2] as u16) & 0x1FFF;
    if pid == TSMF_FRAME_PID {
        if let Some(frame) = FrameDescriptor::decode(buf) {
            log::debug!("TSMF multiplex-frame header accepted, slot counter reset");
            state.frame = Some(frame);
            state.slot_counter = 0;
            return RouteDecision::Reject;
        }
        // A PID-0x002F packet that fails header validation (bad CRC, bad
        // frame sync, etc.) is simply not a header; it falls through to
        // the generic slot-routing below using whatever frame/slot state
        // is already in effect, and almost certainly fails the
        // slot-counter bound check there.
    }

    if !(0..=51).contains(&state.slot_counter) {
        log::trace!("dropping packet: not synchronized to a TSMF frame");
        return RouteDecision::Reject;
    }
    state.slot_counter += 1;
    let slot_index = (state.slot_counter - 1) as usize;

    let frame = match &state.frame {
        Some(frame) => frame,
        None => return RouteDecision::Reject,
    };

    let target = if relative {
        tsid as i32 + 1
    } else {
        frame
            .stream_info
            .iter()
            .position(|info| {
                info.stream_id == tsid && (onid == 0xFFFF || info.original_network_id == onid)
            })
            .map(|i| i as i32 + 1)
            .unwrap_or(0)
    };
    if !(1..=15).contains(&target) {
        log::trace!("dropping packet: no relative stream matches onid/tsid filter");
        return RouteDecision::Reject;
    }
    let target = target as usize;

    if !frame.stream_info[target - 1].stream_status {
        log::trace!("dropping packet: target stream is inactive");
        return RouteDecision::Reject;
    }

    if frame.relative_stream_number[slot_index] as i32 != target as i32 {
        log::trace!("dropping packet: slot belongs to a different sub-stream");
        return RouteDecision::Reject;
    }

    if frame.stream_info[target - 1].stream_type {
        return RouteDecision::PassThrough;
    }

    let transport_error = buf[1] & 0x80 != 0;
    let composite_ok = (buf[1] >> 5) & 0b101 == 0b000;
    let tlv_pid = ((buf[1] as u16) << 8 | buf[2] as u16) & 0x1FFF == TLV_CARRIAGE_PID;
    if transport_error || !composite_ok || !tlv_pid {
        log::trace!("dropping packet: malformed TLV carriage header");
        return RouteDecision::Reject;
    }

    let payload_unit_start = (buf[1] >> 6) & 0x01 != 0;
    if !payload_unit_start {
        return RouteDecision::TlvContinuation { header_size: 3 };
    }

    let start = buf[3] as usize + 4;
    if start > state.packet_size {
        log::trace!("dropping packet: TLV start offset exceeds packet size");
        return RouteDecision::Reject;
    }
    RouteDecision::TlvStart {
        header_size: 4,
        start,
    }
}
