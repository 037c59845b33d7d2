#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

//! Streaming demultiplexer for the ARIB TSMF (Transport Stream Multiplexing
//! Frame) scheme: recovers MPEG Transport Stream packet framing from an
//! unframed byte stream, decodes the multiplex-frame header on PID
//! `0x002F`, and emits only the packets (or reassembled TLV payloads)
//! belonging to a caller-selected sub-stream.
//!
//! The tuner/driver producing bytes, the consumer of emitted packets, and
//! CRC computation beyond this crate's internal use are out of scope; see
//! [`Demuxer`](driver::Demuxer) for the single data-path entry point.

mod header;
mod router;
mod sync;

pub mod driver;
pub mod error;

#[cfg(any(feature = "async-codec", feature = "tokio-codec"))]
#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "async-codec", feature = "tokio-codec")))
)]
/// Sink/Stream adapters for driving a [`driver::Demuxer`] from
/// `asynchronous-codec` or `tokio-util::codec`.
pub mod codec;

pub use driver::{Demuxer, StreamSelector};
pub use error::{Result, TsmfError};
pub use header::{FrameDescriptor, StreamInfo};

/// MPEG Transport Stream sync byte.
pub const TS_SYNC_BYTE: u8 = 0x47;
/// PID carrying the TSMF multiplex-frame header.
pub const TSMF_FRAME_PID: u16 = 0x002F;
/// PID carrying fragmented TLV payloads.
pub const TLV_CARRIAGE_PID: u16 = 0x002D;
/// The MPEG-2 null packet PID, optionally filtered out of emitted output.
pub const NULL_PID: u16 = 0x1FFF;

/// Sentinel meaning "no filter" for `selected_onid`/`selected_tsid`.
pub const ANY_ID: u16 = 0xFFFF;
