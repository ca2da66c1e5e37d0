//! Crate-wide error type.

use thiserror::Error;

/// Errors produced by the BGZF reader, writer, and worker pool.
#[derive(Error, Debug)]
pub enum BgzfError {
    /// The framing codec could not make sense of the bytes it was given.
    ///
    /// Unlike [`BgzfError::InsufficientData`] this is not recoverable by reading more bytes: the
    /// window is gzip-shaped but not BGZF-shaped, or not gzip-shaped at all.
    #[error("not a valid BGZF member: {0}")]
    BadFormat(String),

    /// INFLATE failure, CRC mismatch, or length mismatch for the member at `index` within a batch.
    #[error("bad payload at batch index {index}: {source}")]
    BadPayload {
        index: usize,
        #[source]
        source: Box<BgzfError>,
    },

    /// An INFLATE/DEFLATE call from libdeflater failed.
    #[error("deflate codec error: {0}")]
    Codec(String),

    /// A member's CRC32 did not match its recorded trailer value.
    #[error("crc32 mismatch: found {found:#010x}, expected {expected:#010x}")]
    InvalidCrc { found: u32, expected: u32 },

    /// A single member's inflated size exceeds the reader's inflate buffer capacity. Raised as a
    /// hard error rather than looping forever on a buffer-wrap reset that can never fit it.
    #[error("member inflated size {needed} exceeds inflate buffer capacity {capacity}")]
    BlockTooLarge { needed: usize, capacity: usize },

    /// A requested buffer size was too small to be useful.
    #[error("buffer size {0} is smaller than the minimum of {1}")]
    BufferSize(usize, usize),

    /// Zero worker threads were requested.
    #[error("num_threads must be greater than 0, got {0}")]
    NumThreads(usize),

    /// Propagated I/O error from the source or sink.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Internal signal: the framing codec could not complete within the given window. Never
    /// surfaced to callers; the reader reacts by pulling more bytes from the source.
    #[error("insufficient data to parse a member")]
    InsufficientData,
}

impl From<BgzfError> for std::io::Error {
    fn from(e: BgzfError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}
