//! Blind packet-size synchronization against the four TS stride lengths.

use crate::TS_SYNC_BYTE;

/// Number of leading bytes swept while searching for three consecutive sync
/// bytes at a consistent stride. Also the size reported as `truncate` when
/// the search window was exhausted without a match.
const SEARCH_WINDOW: usize = 208;

/// `SEARCH_WINDOW` plus two full strides of lookahead, plus one: the minimum
/// window length the synchronizer needs before it can attempt a search.
const MIN_SYNC_LEN: usize = SEARCH_WINDOW * 3 + 1;

/// Candidate strides, tried in this order so a timestamp byte that happens
/// to equal `0x47` does not steal a match from the native 188/204 sizes.
const CANDIDATE_STRIDES: [usize; 4] = [188, 204, 192, 208];

/// Outcome of a single synchronization attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncResult {
    /// Not enough bytes were available to attempt synchronization; the
    /// caller should retain `buf` and retry once more data arrives.
    InsufficientData,
    /// No consistent stride was found in the search window; discard
    /// `truncate` bytes and retry from there.
    NotSynchronized { truncate: usize },
    /// A stride was found. Discard `truncate` bytes; the packet at that
    /// offset (and every `packet_size`-th packet after it) is TS-aligned.
    Synchronized {
        truncate: usize,
        packet_size: usize,
    },
}

/// Inspects a byte window and determines the TS packet stride and the
/// offset of the first sync byte.
///
/// Requires at least `3 * 208 + 1` bytes before attempting a search, per the
/// rationale that three consecutive sync bytes at the same stride is
/// sufficient evidence; a false positive self-corrects on the next call
/// because a wrong stride desyncs within one packet.
pub fn sync_packet(buf: &[u8]) -> SyncResult {
    if buf.len() < MIN_SYNC_LEN {
        return SyncResult::InsufficientData;
    }

    for i in 0..SEARCH_WINDOW {
        if buf[i] != TS_SYNC_BYTE {
            continue;
        }
        for &stride in &CANDIDATE_STRIDES {
            if buf[i + stride] == TS_SYNC_BYTE && buf[i + 2 * stride] == TS_SYNC_BYTE {
                return SyncResult::Synchronized {
                    truncate: i,
                    packet_size: stride,
                };
            }
        }
    }

    SyncResult::NotSynchronized {
        truncate: SEARCH_WINDOW,
    }
}
