//! The streaming driver: owns residual buffers, mediates reconfiguration,
//! and is the crate's public entry point.

use std::sync::{Arc, Mutex};

use crate::router::{self, ParserState, RouteDecision};
use crate::sync::{sync_packet, SyncResult};
use crate::NULL_PID;

/// The scalars guarded by the reconfiguration lock: the sub-stream filter
/// and the pending clear request.
#[derive(Debug)]
struct ReconfigState {
    selected_onid: u16,
    selected_tsid: u16,
    is_relative: bool,
    clear_requested: bool,
}

impl Default for ReconfigState {
    /// Pass-through: any ONID, any TSID, not relative, no pending clear.
    fn default() -> Self {
        Self {
            selected_onid: 0xFFFF,
            selected_tsid: 0xFFFF,
            is_relative: false,
            clear_requested: false,
        }
    }
}

/// A cloneable handle for reconfiguring a [`Demuxer`] from another thread.
///
/// Cloning shares the same underlying lock, so any clone's call is visible
/// to the `Demuxer`'s next (or in-flight) `drive`.
#[derive(Clone, Debug)]
pub struct StreamSelector(Arc<Mutex<ReconfigState>>);

impl StreamSelector {
    /// Updates the sub-stream filter and requests a resynchronization on
    /// the next `drive` call.
    ///
    /// `tsid == 0xFFFF` means pass-through (no slot tracking). When
    /// `relative` is true, `tsid` is taken as a zero-based relative stream
    /// index rather than a real transport stream id.
    pub fn set_stream(&self, onid: u16, tsid: u16, relative: bool) {
        let mut guard = self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.selected_onid = onid;
        guard.selected_tsid = tsid;
        guard.is_relative = relative;
        guard.clear_requested = true;
    }

    /// Equivalent to `set_stream(0xFFFF, 0xFFFF, false)`: becomes
    /// pass-through.
    pub fn disable(&self) {
        self.set_stream(0xFFFF, 0xFFFF, false);
    }
}

/// The streaming TSMF demultiplexer.
///
/// `Demuxer` owns the byte buffers and decoded frame state and is driven
/// exclusively by a single producer thread via [`Demuxer::drive`]. Stream
/// selection is mediated through the paired [`StreamSelector`], which may be
/// cloned and sent to other threads.
///
/// All failures inside `drive` are silent and recoverable: malformed
/// input is dropped or triggers resynchronization, so there is no
/// `Result` on the hot path.
pub struct Demuxer {
    config: Arc<Mutex<ReconfigState>>,
    state: ParserState,
    read_buf: Vec<u8>,
    tlv_buf: Vec<u8>,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new().0
    }
}

impl Demuxer {
    /// Creates a new demultiplexer paired with a [`StreamSelector`] handle.
    /// Initial configuration is pass-through (no filter applied).
    pub fn new() -> (Self, StreamSelector) {
        let config = Arc::new(Mutex::new(ReconfigState::default()));
        let demuxer = Self {
            config: Arc::clone(&config),
            state: ParserState::default(),
            read_buf: Vec::new(),
            tlv_buf: Vec::new(),
        };
        (demuxer, StreamSelector(config))
    }

    /// Feeds `input` through the parser and returns the next chunk of
    /// output bytes, if any were produced.
    ///
    /// `drop_nulls` additionally suppresses any accepted packet whose PID
    /// is `0x1FFF`. Calling `drive(a, ..); drive(b, ..)` is equivalent to
    /// `drive(a ++ b, ..)` as long as no reconfiguration happens between
    /// the two calls.
    pub fn drive(&mut self, input: &[u8], drop_nulls: bool) -> Option<Vec<u8>> {
        let (onid, tsid, relative) = self.snapshot_and_maybe_clear();

        self.read_buf.extend_from_slice(input);
        let mut pos = 0usize;
        let mut output = Vec::new();

        while self.read_buf.len().saturating_sub(pos) > self.state.packet_size {
            if self.state.packet_size == 0 {
                match sync_packet(&self.read_buf[pos..]) {
                    SyncResult::InsufficientData => break,
                    SyncResult::NotSynchronized { truncate } => {
                        pos += truncate;
                    }
                    SyncResult::Synchronized {
                        truncate,
                        packet_size,
                    } => {
                        pos += truncate;
                        self.state.packet_size = packet_size;
                        log::debug!("TS synchronization acquired at stride {packet_size}");
                    }
                }
                continue;
            }

            let packet = &self.read_buf[pos..pos + self.state.packet_size];
            let decision = router::route(&mut self.state, packet, onid, tsid, relative);
            if !(drop_nulls && is_null_packet(packet)) {
                apply_decision(decision, packet, &mut self.tlv_buf, &mut output);
            }
            pos += self.state.packet_size;
        }

        let discard = self.clear_requested();
        self.read_buf.drain(0..pos);

        if discard || output.is_empty() {
            None
        } else {
            Some(output)
        }
    }

    /// Snapshots the filter under the lock, atomically clearing
    /// `clear_requested`, and applies the clear to local state if it had
    /// been requested.
    fn snapshot_and_maybe_clear(&mut self) -> (u16, u16, bool) {
        let mut guard = self
            .config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let snapshot = (guard.selected_onid, guard.selected_tsid, guard.is_relative);
        let clear_requested = guard.clear_requested;
        guard.clear_requested = false;
        drop(guard);

        if clear_requested {
            log::debug!("reconfiguration applied: resetting parser state");
            self.state = ParserState::default();
            self.read_buf.clear();
            self.tlv_buf.clear();
        }
        snapshot
    }

    /// Re-reads `clear_requested` without consuming it: a reconfiguration
    /// that arrived mid-drive must still invalidate this call's output,
    /// and remains pending for the *next* `drive` to clear.
    fn clear_requested(&self) -> bool {
        let guard = self
            .config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.clear_requested
    }
}

fn is_null_packet(packet: &[u8]) -> bool {
    let pid = ((packet[1] as u16) << 8 | packet[2] as u16) & 0x1FFF;
    pid == NULL_PID
}

fn apply_decision(decision: RouteDecision, packet: &[u8], tlv_buf: &mut Vec<u8>, output: &mut Vec<u8>) {
    match decision {
        RouteDecision::Reject => {}
        RouteDecision::PassThrough => output.extend_from_slice(packet),
        RouteDecision::TlvContinuation { header_size } => {
            if !tlv_buf.is_empty() {
                tlv_buf.extend_from_slice(&packet[header_size..]);
            }
        }
        RouteDecision::TlvStart { header_size, start } => {
            if !tlv_buf.is_empty() {
                tlv_buf.extend_from_slice(&packet[header_size..start]);
                output.append(tlv_buf);
            }
            tlv_buf.clear();
            tlv_buf.extend_from_slice(&packet[start..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::test_support::build_header;

    fn junk(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 37 + 11) as u8).collect()
    }

    fn ts_packet(pid: u16, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        buf[0] = 0x47;
        buf[1] = (pid >> 8) as u8 & 0x1F;
        buf[2] = pid as u8;
        buf
    }

    // The driver only processes a packet once the buffer holds at least one
    // more byte beyond it, so a test that wants every "real" packet in its
    // input fully processed appends one extra trailing sentinel packet that
    // is itself left as residue.
    fn with_lookahead_sentinel(mut input: Vec<u8>, packet_size: usize, pid: u16) -> Vec<u8> {
        input.extend(ts_packet(pid, packet_size));
        input
    }

    #[test]
    fn passthrough_188_stride_drops_nulls() {
        let (mut demux, _sel) = Demuxer::new();
        let mut input = vec![0x00, 0xFF, 0x00];
        for pid in [0x100, 0x100, 0x1FFF, 0x100, 0x100] {
            input.extend(ts_packet(pid, 188));
        }
        let input = with_lookahead_sentinel(input, 188, 0x100);
        let out = demux.drive(&input, true).expect("expected output");
        assert_eq!(out.len(), 4 * 188);
    }

    #[test]
    fn syncs_on_204_byte_stride() {
        let (mut demux, _sel) = Demuxer::new();
        let mut input = junk(7);
        for _ in 0..4 {
            input.extend(ts_packet(0x100, 204));
        }
        let input = with_lookahead_sentinel(input, 204, 0x100);
        let out = demux.drive(&input, false).expect("expected output");
        assert_eq!(out.len(), 4 * 204);
    }

    #[test]
    fn header_and_slot_routing() {
        let (mut demux, sel) = Demuxer::new();
        sel.set_stream(0xFFFF, 0x0401, false);

        let mut input = build_header(
            &[(0, 1), (1, 2)],
            &[
                (0, 0x0401, 0x0401, true, true),
                (1, 0x0402, 0x0402, true, true),
            ],
        );
        input.extend(ts_packet(0x100, 188));
        input.extend(ts_packet(0x100, 188));
        let input = with_lookahead_sentinel(input, 188, 0x100);

        let out = demux.drive(&input, false).expect("expected output");
        assert_eq!(out.len(), 188);
    }

    #[test]
    fn reconfiguration_before_drive_discards_pending_residue() {
        let (mut demux, sel) = Demuxer::new();
        let mut input = vec![0x00, 0xFF, 0x00];
        input.extend(ts_packet(0x100, 188));
        input.extend(ts_packet(0x100, 188));

        sel.set_stream(0xFFFF, 0x0401, false);
        let out = demux.drive(&input, false);
        assert!(out.is_none());
    }

    #[test]
    fn tlv_reassembly_across_three_packets() {
        // A reassembled TLV payload is only handed to the caller once a
        // *subsequent* payload-start packet flushes it; until then it
        // stays in `tlv_buf` and may cross call
        // boundaries. So this drives: header, three fragments of payload A
        // (slots 0-2), then a fourth packet starting payload B (slot 3)
        // whose own pointer field is zero, which flushes A with no extra
        // prefix bytes.
        let (mut demux, sel) = Demuxer::new();
        sel.set_stream(0xFFFF, 0x0401, false);

        let mut input = build_header(
            &[(0, 1), (1, 1), (2, 1), (3, 1)],
            &[(0, 0x0401, 0x0401, true, false)],
        );

        let mut first = ts_packet(0x002D, 188);
        first[1] |= 0x40;
        first[3] = 10; // tlv_start = 14
        for (i, b) in first.iter_mut().enumerate().skip(14) {
            *b = i as u8;
        }
        input.extend(first.clone());

        let mut second = ts_packet(0x002D, 188);
        for (i, b) in second.iter_mut().enumerate().skip(3) {
            *b = (100 + i) as u8;
        }
        input.extend(second.clone());

        let mut third = ts_packet(0x002D, 188);
        for (i, b) in third.iter_mut().enumerate().skip(3) {
            *b = (200 + i) as u8;
        }
        input.extend(third.clone());

        let mut flush_trigger = ts_packet(0x002D, 188);
        flush_trigger[1] |= 0x40;
        flush_trigger[3] = 0; // tlv_start = 4, so no prefix bytes precede it
        input.extend(flush_trigger);

        let input = with_lookahead_sentinel(input, 188, 0x002D);

        let out = demux.drive(&input, false).expect("expected output");

        let mut expected = first[14..].to_vec();
        expected.extend_from_slice(&second[3..]);
        expected.extend_from_slice(&third[3..]);
        assert_eq!(out, expected);
    }

    #[test]
    fn mid_stream_sync_loss_recovers() {
        let (mut demux, _sel) = Demuxer::new();
        let mut input = Vec::new();
        for _ in 0..5 {
            input.extend(ts_packet(0x100, 188));
        }
        let input = with_lookahead_sentinel(input, 188, 0x100);
        let out = demux.drive(&input, false).expect("expected output");
        assert_eq!(out.len(), 5 * 188);

        // corrupt one packet's sync byte in a second call
        let mut more = Vec::new();
        let mut corrupted = ts_packet(0x100, 188);
        corrupted[0] = 0x00;
        more.extend(corrupted);
        // enough clean trailing data to resynchronize within this call
        for _ in 0..10 {
            more.extend(ts_packet(0x100, 188));
        }
        let out2 = demux.drive(&more, false).expect("expected recovered output");
        assert!(!out2.is_empty());
        assert_eq!(out2.len() % 188, 0);
    }

    #[test]
    fn chunking_invariance() {
        let mut input = vec![0x00, 0xFF, 0x00];
        for pid in [0x100, 0x101, 0x1FFF, 0x102, 0x103] {
            input.extend(ts_packet(pid, 188));
        }

        let (mut whole, _s1) = Demuxer::new();
        let combined = whole.drive(&input, false).unwrap_or_default();

        let (mut split, _s2) = Demuxer::new();
        let mid = input.len() / 2;
        let mut chunked = split.drive(&input[..mid], false).unwrap_or_default();
        if let Some(rest) = split.drive(&input[mid..], false) {
            chunked.extend(rest);
        }

        assert_eq!(combined, chunked);
    }

    #[test]
    fn reconfiguration_flag_is_visible_to_the_driver_thread_without_a_drive_call() {
        // Exercises the re-check in isolation: a `StreamSelector`
        // call from another thread must be observable through the shared
        // lock immediately, independent of whether `drive` happens to be
        // mid-loop when it lands.
        let (demux, sel) = Demuxer::new();
        assert!(!demux.clear_requested());
        sel.set_stream(0xFFFF, 0x0401, false);
        assert!(demux.clear_requested());
    }

    #[test]
    fn stream_selector_clones_share_one_lock() {
        let (demux, sel) = Demuxer::new();
        let sel2 = sel.clone();
        sel2.disable();
        assert!(demux.clear_requested());
    }
}
