//! Sink/Stream adapters wrapping [`crate::driver::Demuxer`] for use with
//! `asynchronous_codec::FramedRead` or `tokio_util::codec::FramedRead`.
//!
//! This protocol is receive-only: there is no operation that turns emitted
//! packets back into a TSMF-multiplexed byte stream, so only `Decoder` is
//! implemented here, not `Encoder`.

use bytes::{Buf, BytesMut};

use crate::driver::{Demuxer, StreamSelector};
use crate::error::TsmfError;

/// A `Decoder` wrapping a [`Demuxer`], for use with a `FramedRead` adapter.
///
/// Every call hands its entire input buffer to the demuxer and drains it:
/// residual bytes are tracked inside the `Demuxer` itself, not by the codec
/// buffer, so there is never anything left for the framing layer to retain
/// between calls.
pub struct TsmfCodec {
    demux: Demuxer,
    selector: StreamSelector,
    drop_nulls: bool,
}

impl TsmfCodec {
    /// Creates a codec paired with a [`StreamSelector`] for reconfiguring
    /// the wrapped demuxer from another task or thread.
    pub fn new(drop_nulls: bool) -> (Self, StreamSelector) {
        let (demux, selector) = Demuxer::new();
        (
            Self {
                demux,
                selector: selector.clone(),
                drop_nulls,
            },
            selector,
        )
    }

    /// A clone of this codec's [`StreamSelector`] handle.
    pub fn selector(&self) -> StreamSelector {
        self.selector.clone()
    }

    fn decode_helper(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, TsmfError> {
        let input = src.split();
        Ok(self.demux.drive(&input, self.drop_nulls))
    }
}

#[cfg(feature = "async-codec")]
mod non_tokio {
    use super::*;

    use asynchronous_codec::Decoder;

    impl Decoder for TsmfCodec {
        type Item = Vec<u8>;

        type Error = TsmfError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }
}

#[cfg(feature = "tokio-codec")]
mod tokio_codec {
    use super::*;

    use tokio_util::codec::Decoder;

    impl Decoder for TsmfCodec {
        type Item = Vec<u8>;

        type Error = TsmfError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }
}

#[cfg(all(test, feature = "async-codec"))]
mod test {
    use super::*;

    use asynchronous_codec::FramedRead;
    use futures::{executor, io::Cursor, TryStreamExt};

    #[test]
    fn framed_read_emits_passthrough_packets() {
        let mut stream = Vec::new();
        for _ in 0..4 {
            let mut packet = vec![0u8; 188];
            packet[0] = crate::TS_SYNC_BYTE;
            stream.extend(packet);
        }
        // one more packet of lookahead so the driver's strict lookahead
        // boundary releases every packet above
        let mut sentinel = vec![0u8; 188];
        sentinel[0] = crate::TS_SYNC_BYTE;
        stream.extend(sentinel);

        let cursor = Cursor::new(stream);
        let (codec, _selector) = TsmfCodec::new(false);
        let mut framed = FramedRead::new(cursor, codec);

        let chunk = executor::block_on(framed.try_next())
            .unwrap()
            .expect("at least one passthrough chunk expected");
        assert_eq!(chunk.len() % 188, 0);
        assert!(!chunk.is_empty());
    }
}
