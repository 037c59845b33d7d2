//! Decoder for the ARIB TSMF multiplex-frame header carried on PID `0x002F`.

use byteorder::{BigEndian, ByteOrder};
use crc::{Crc, CRC_32_MPEG_2};

use crate::{TSMF_FRAME_PID, TS_SYNC_BYTE};

const FRAME_SYNC_MASK: u16 = 0x1FFF;
const FRAME_SYNC_F: u16 = 0x1A86;
const FRAME_SYNC_I: u16 = !FRAME_SYNC_F & FRAME_SYNC_MASK;

/// MPEG-2 CRC-32: polynomial `0x04C11DB7`, init `0xFFFFFFFF`, non-reflected,
/// no output XOR. A residue of zero over the header's covered bytes proves
/// validity, standing in for the external `crc32(buf, len)` collaborator.
static CRC32_MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Per-relative-stream entry of a decoded [`FrameDescriptor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamInfo {
    /// Whether this relative stream number is currently assigned.
    pub stream_status: bool,
    /// The real stream (transport stream) id this slot maps to.
    pub stream_id: u16,
    /// The original network id this stream belongs to.
    pub original_network_id: u16,
    /// 2-bit receive status (recorded but not acted on).
    pub receive_status: u8,
    /// `true` = plain TS carriage (emitted whole), `false` = TLV carriage
    /// on PID `0x002D` (reassembled from fragments).
    pub stream_type: bool,
}

/// A fully decoded TSMF multiplex-frame header, valid until the next header
/// or a loss of synchronization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub continuity_counter: u8,
    pub version_number: u8,
    pub frame_type: u8,
    pub emergency_indicator: bool,
    pub group_id: u8,
    pub number_of_carriers: u8,
    pub carrier_sequence: u8,
    pub number_of_frames: u8,
    pub frame_position: u8,
    /// Fifteen relative-stream slots, indexed `[0, 15)`.
    pub stream_info: [StreamInfo; 15],
    /// Slot-to-relative-stream-number map for the 52 slots following this
    /// header; `0` means the slot is unassigned.
    pub relative_stream_number: [u8; 52],
}

impl FrameDescriptor {
    /// Attempts to decode a TSMF header from a candidate 188-byte packet.
    ///
    /// Returns `None` for anything that fails validation — including a
    /// nonzero CRC residue — rather than raising, per the header decoder's
    /// "not a header, continue" contract.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 188 {
            return None;
        }
        if buf[0] != TS_SYNC_BYTE {
            return None;
        }
        let pid = BigEndian::read_u16(&buf[1..3]) & 0x1FFF;
        if pid != TSMF_FRAME_PID {
            return None;
        }
        if buf[3] & 0xF0 != 0x10 {
            return None;
        }

        let frame_sync = BigEndian::read_u16(&buf[4..6]) & FRAME_SYNC_MASK;
        if frame_sync != FRAME_SYNC_F && frame_sync != FRAME_SYNC_I {
            return None;
        }

        if CRC32_MPEG2.checksum(&buf[4..188]) != 0 {
            return None;
        }

        let relative_stream_number_mode = (buf[6] >> 4) & 0x1;
        if relative_stream_number_mode != 0 {
            return None;
        }

        let frame_type = buf[6] & 0x0F;
        if frame_type != 1 && frame_type != 2 {
            return None;
        }

        let continuity_counter = buf[3] & 0x0F;
        let version_number = (buf[6] >> 5) & 0x07;

        let mut stream_info = [StreamInfo::default(); 15];
        for (i, info) in stream_info.iter_mut().enumerate() {
            let stream_status = (buf[7 + i / 8] >> (7 - i % 8)) & 0x1 != 0;
            let stream_id = BigEndian::read_u16(&buf[9 + 4 * i..11 + 4 * i]);
            let original_network_id = BigEndian::read_u16(&buf[11 + 4 * i..13 + 4 * i]);
            let receive_status = (buf[69 + i / 4] >> ((3 - i % 4) * 2)) & 0x3;
            let stream_type = (buf[125 + i / 8] >> (7 - i % 8)) & 0x1 != 0;
            *info = StreamInfo {
                stream_status,
                stream_id,
                original_network_id,
                receive_status,
                stream_type,
            };
        }

        let emergency_indicator = buf[72] & 0x01 != 0;

        let mut relative_stream_number = [0u8; 52];
        for (i, slot) in relative_stream_number.iter_mut().enumerate() {
            let shift = (1 - i % 2) * 4;
            *slot = (buf[73 + i / 2] >> shift) & 0x0F;
        }

        let group_id = buf[127];
        let number_of_carriers = buf[128];
        let carrier_sequence = buf[129];
        let number_of_frames = (buf[130] >> 4) & 0x0F;
        let frame_position = buf[130] & 0x0F;

        Some(Self {
            continuity_counter,
            version_number,
            frame_type,
            emergency_indicator,
            group_id,
            number_of_carriers,
            carrier_sequence,
            number_of_frames,
            frame_position,
            stream_info,
            relative_stream_number,
        })
    }
}
