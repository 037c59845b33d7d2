use thiserror::Error;

/// A TSMF demux `Result`, conveniently wrapping the [`TsmfError`].
pub type Result<T> = std::result::Result<T, TsmfError>;

/// Error types for the codec adapters in [`crate::codec`].
///
/// The core parser (`Demuxer::drive`) never fails — every malformed or
/// out-of-sync condition is handled per the silent-recovery policy described
/// on [`crate::driver::Demuxer`]. This type exists only because the
/// `Decoder`/`Encoder` traits implemented by the optional async codec
/// adapters require an associated `Error` type; it is never actually
/// constructed on the decode path.
#[derive(Error, Debug)]
pub enum TsmfError {
    /// Propagated I/O failure from the underlying transport when the
    /// `async-codec`/`tokio-codec` adapters are in use.
    #[error("I/O error while driving the TSMF demultiplexer")]
    Io(#[from] std::io::Error),
}
