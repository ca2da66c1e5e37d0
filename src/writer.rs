//! Writer buffer manager: chops written bytes into fixed-size logical blocks, submits batches to
//! the worker pool, and writes framed members to the sink in order.

use std::io::{self, Write};

use libdeflater::CompressionLvl;

use crate::check::Crc32;
use crate::error::BgzfError;
use crate::framing::{self, TERMINATOR};
use crate::pool::WorkerPool;

/// The fixed logical uncompressed block size, `L`, per the BGZF recommendation.
pub const LOGICAL_BLOCK_SIZE: usize = 65280;
/// The pool's batch width, `K`.
pub const BATCH_WIDTH: usize = 32;
/// Worst-case deflated size of one `LOGICAL_BLOCK_SIZE` block: header/trailer overhead plus slack
/// for incompressible input.
const DEFLATE_BUFFER_SIZE: usize = LOGICAL_BLOCK_SIZE + 6 + 20 + 1024;

/// Builder for [`BgzfWriter`]. Defaults to `num_cpus::get()` worker threads and the library's
/// default compression level.
#[derive(Debug, Clone)]
pub struct BgzfWriterBuilder {
    num_threads: usize,
    compression_level: CompressionLvl,
}

impl Default for BgzfWriterBuilder {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            compression_level: CompressionLvl::new(6).unwrap(),
        }
    }
}

impl BgzfWriterBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count, `T`.
    pub fn num_threads(mut self, t: usize) -> Result<Self, BgzfError> {
        if t == 0 {
            return Err(BgzfError::NumThreads(t));
        }
        self.num_threads = t;
        Ok(self)
    }

    /// Set the DEFLATE compression level. Affects output bytes only, never round-trip
    /// correctness.
    pub fn compression_level(mut self, level: CompressionLvl) -> Self {
        self.compression_level = level;
        self
    }

    /// Build a writer over `sink`.
    pub fn build<W: Write>(self, sink: W) -> Result<BgzfWriter<W>, BgzfError> {
        let pool = WorkerPool::new(self.num_threads)?;
        Ok(BgzfWriter {
            sink,
            pool,
            accumulator: Vec::new(),
            buffers: (0..BATCH_WIDTH).map(|_| vec![0u8; DEFLATE_BUFFER_SIZE]).collect(),
            compression_level: self.compression_level,
            closed: false,
        })
    }
}

/// Streaming BGZF writer. Buffers written bytes into `LOGICAL_BLOCK_SIZE` blocks, deflates them
/// in parallel batches, and emits framed members to the sink in input order.
pub struct BgzfWriter<W: Write> {
    sink: W,
    pool: WorkerPool,
    accumulator: Vec<u8>,
    buffers: Vec<Vec<u8>>,
    compression_level: CompressionLvl,
    closed: bool,
}

impl<W: Write> BgzfWriter<W> {
    /// Construct a writer over `sink` with default settings.
    pub fn new(sink: W) -> Result<Self, BgzfError> {
        BgzfWriterBuilder::default().build(sink)
    }

    /// Start building a writer with non-default settings.
    pub fn builder() -> BgzfWriterBuilder {
        BgzfWriterBuilder::default()
    }

    /// Flush any remaining accumulator contents, write the terminator exactly once, and flush
    /// the sink. Safe to call only once; a second call is a logic error in the caller, not this
    /// type's concern to guard against beyond the `closed` flag preventing a duplicate
    /// terminator.
    ///
    /// # Errors
    /// - Whatever `flush_one_batch`/sink I/O produces.
    pub fn close(&mut self) -> Result<(), BgzfError> {
        if self.closed {
            return Ok(());
        }
        if !self.accumulator.is_empty() {
            self.flush_one_batch(true)?;
        }
        self.sink.write_all(&TERMINATOR)?;
        self.sink.flush()?;
        self.closed = true;
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), BgzfError> {
        self.accumulator.extend_from_slice(buf);
        while self.accumulator.len() > BATCH_WIDTH * LOGICAL_BLOCK_SIZE {
            self.flush_one_batch(false)?;
        }
        Ok(())
    }

    /// While the accumulator has at least one full logical block (or `final_call` and it is
    /// non-empty), chop off up to `BATCH_WIDTH` blocks, deflate them in parallel, and emit each
    /// as a framed member in order.
    fn flush_one_batch(&mut self, final_call: bool) -> Result<(), BgzfError> {
        loop {
            if self.accumulator.is_empty() {
                return Ok(());
            }
            if !final_call && self.accumulator.len() < LOGICAL_BLOCK_SIZE {
                return Ok(());
            }

            let full_blocks = self.accumulator.len() / LOGICAL_BLOCK_SIZE;
            let has_partial = final_call && self.accumulator.len() % LOGICAL_BLOCK_SIZE != 0;
            let num_blocks = (full_blocks + usize::from(has_partial)).min(BATCH_WIDTH);

            let mut sources: Vec<&[u8]> = Vec::with_capacity(num_blocks);
            let mut consumed = 0usize;
            for _ in 0..num_blocks {
                let len = LOGICAL_BLOCK_SIZE.min(self.accumulator.len() - consumed);
                sources.push(&self.accumulator[consumed..consumed + len]);
                consumed += len;
            }
            let crcs: Vec<u32> = sources.iter().map(|s| Crc32::of(s)).collect();
            let inflated_lens: Vec<u32> = sources.iter().map(|s| s.len() as u32).collect();

            let mut buf_refs: Vec<&mut [u8]> = self.buffers[..num_blocks]
                .iter_mut()
                .map(|b| b.as_mut_slice())
                .collect();
            let written = self
                .pool
                .deflate_batch(&sources, &mut buf_refs, self.compression_level)?;

            for i in 0..num_blocks {
                framing::emit_member(&mut self.sink, &self.buffers[i][..written[i]], inflated_lens[i], crcs[i])?;
            }

            self.accumulator.drain(0..consumed);

            if !final_call && self.accumulator.len() < LOGICAL_BLOCK_SIZE {
                return Ok(());
            }
            if final_call && self.accumulator.is_empty() {
                return Ok(());
            }
        }
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_one_batch(false)?;
        self.sink.flush()
    }
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pathological_close_emits_only_terminator() {
        let mut out = Vec::new();
        {
            let mut w = BgzfWriter::new(&mut out).unwrap();
            w.close().unwrap();
        }
        assert_eq!(out, TERMINATOR.to_vec());
    }

    #[test]
    fn close_is_idempotent() {
        let mut out = Vec::new();
        let mut w = BgzfWriter::new(&mut out).unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert_eq!(out, TERMINATOR.to_vec());
    }

    #[test]
    fn drop_without_explicit_close_still_emits_terminator() {
        let mut out = Vec::new();
        {
            let mut w = BgzfWriter::new(&mut out).unwrap();
            w.write_all(b"hello").unwrap();
        }
        assert!(out.ends_with(&TERMINATOR));
    }

    #[test]
    fn large_round_trip_produces_expected_member_count() {
        let total_blocks = 2 * BATCH_WIDTH + 1;
        let data = vec![0u8; total_blocks * LOGICAL_BLOCK_SIZE];
        let mut out = Vec::new();
        {
            let mut w = BgzfWriter::builder().num_threads(4).unwrap().build(&mut out).unwrap();
            w.write_all(&data).unwrap();
            w.close().unwrap();
        }

        let (members, remainder) = framing::parse_all(&out).unwrap();
        assert_eq!(remainder, out.len());
        // One terminator member plus one member per logical block.
        assert_eq!(members.len(), total_blocks + 1);
        assert_eq!(members.last().unwrap().inflated_size, 0);
        for m in &members[..total_blocks] {
            assert_eq!(m.inflated_size, LOGICAL_BLOCK_SIZE);
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(
            BgzfWriter::builder().num_threads(0),
            Err(BgzfError::NumThreads(0))
        ));
    }
}
