//! Reader buffer manager: pulls bytes from a byte source, drives the framing codec to discover
//! members, submits batches to the worker pool, and exposes a sequential read cursor over the
//! inflated output.
//!
//! The pending-members list keeps each unconsumed member's deflated payload alive as a
//! ref-counted [`bytes::Bytes`] slice, independent of whatever the accumulator does on later
//! `refill` iterations, so a member parsed out of one accumulator generation stays valid after
//! the accumulator is drained and refilled.

use std::io::Read;

use bytes::{Bytes, BytesMut};

use crate::error::BgzfError;
use crate::framing::{self, Member};
use crate::pool::WorkerPool;

/// Default inflate buffer size: 50 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 50 * 1024 * 1024;

const RAW_CHUNK_UNIT: usize = 4 * 16 * 1024;

/// Builder for [`BgzfReader`]. Defaults to a 50 MiB inflate buffer, `min(4, num_cpus)` worker
/// threads, and a source pull chunk sized off the thread count.
#[derive(Debug, Clone)]
pub struct BgzfReaderBuilder {
    buffer_size: usize,
    num_threads: usize,
    chunk_size: usize,
}

impl Default for BgzfReaderBuilder {
    fn default() -> Self {
        let threads = std::cmp::min(4, num_cpus::get());
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            num_threads: threads,
            chunk_size: RAW_CHUNK_UNIT * threads,
        }
    }
}

impl BgzfReaderBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inflate buffer's fixed capacity, `B`. Must be at least large enough to hold one
    /// terminator member's inflated output (0 bytes is fine, but the buffer itself must be
    /// nonzero or nothing could ever be inflated into it).
    pub fn buffer_size(mut self, n: usize) -> Result<Self, BgzfError> {
        if n == 0 {
            return Err(BgzfError::BufferSize(n, 1));
        }
        self.buffer_size = n;
        Ok(self)
    }

    /// Set the worker count, `T`. Also rescales the default chunk size if it has not been set
    /// explicitly, since the chunk size is derived from the thread count.
    pub fn num_threads(mut self, t: usize) -> Result<Self, BgzfError> {
        if t == 0 {
            return Err(BgzfError::NumThreads(t));
        }
        self.num_threads = t;
        self.chunk_size = RAW_CHUNK_UNIT * t;
        Ok(self)
    }

    /// Set the number of bytes pulled from the source per `refill` iteration.
    pub fn chunk_size(mut self, n: usize) -> Result<Self, BgzfError> {
        if n == 0 {
            return Err(BgzfError::BufferSize(n, 1));
        }
        self.chunk_size = n;
        Ok(self)
    }

    /// Build a reader over `source`.
    pub fn build<R: Read>(self, source: R) -> Result<BgzfReader<R>, BgzfError> {
        let pool = WorkerPool::new(self.num_threads)?;
        Ok(BgzfReader {
            source,
            pool,
            accumulator: BytesMut::new(),
            inflate_buf: vec![0u8; self.buffer_size],
            start: 0,
            stop: 0,
            pending: Vec::new(),
            raw_chunk: vec![0u8; self.chunk_size],
            eof: false,
        })
    }
}

/// Streaming BGZF reader. Owns a pre-allocated inflate buffer and drives batch inflation of
/// discovered members on demand.
pub struct BgzfReader<R> {
    source: R,
    pool: WorkerPool,
    accumulator: BytesMut,
    inflate_buf: Vec<u8>,
    start: usize,
    stop: usize,
    pending: Vec<(Member, Bytes)>,
    raw_chunk: Vec<u8>,
    eof: bool,
}

impl<R: Read> BgzfReader<R> {
    /// Construct a reader over `source` with default settings.
    pub fn new(source: R) -> Result<Self, BgzfError> {
        BgzfReaderBuilder::default().build(source)
    }

    /// Start building a reader with non-default settings.
    pub fn builder() -> BgzfReaderBuilder {
        BgzfReaderBuilder::default()
    }

    /// Return a view of up to `n` inflated bytes, advancing the read cursor past them. The
    /// returned slice is only valid until the next call to `read`/`read_into`/`read_all`.
    /// Returns an empty slice at end-of-stream.
    pub fn read(&mut self, n: usize) -> Result<&[u8], BgzfError> {
        if self.start == self.stop {
            self.refill()?;
        }
        let take = n.min(self.stop - self.start);
        let view_start = self.start;
        self.start += take;
        Ok(&self.inflate_buf[view_start..view_start + take])
    }

    /// Fill `buf` completely, or until end-of-stream, whichever comes first. Returns the number
    /// of bytes written.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, BgzfError> {
        let mut written = 0;
        while written < buf.len() {
            let remaining = buf.len() - written;
            let n = {
                let view = self.read(remaining)?;
                if view.is_empty() {
                    break;
                }
                buf[written..written + view.len()].copy_from_slice(view);
                view.len()
            };
            written += n;
        }
        Ok(written)
    }

    /// Read the entire remaining stream into an owned buffer.
    pub fn read_all(&mut self) -> Result<Vec<u8>, BgzfError> {
        let mut out = Vec::new();
        loop {
            let view = self.read(1024 * 1024)?;
            if view.is_empty() {
                break;
            }
            out.extend_from_slice(view);
        }
        Ok(out)
    }

    /// Wrap this reader for line-oriented iteration. Line iteration is delegated entirely to
    /// `std::io::BufReader`; the core reader only ever implements `read_into`.
    pub fn lines(self) -> std::io::Lines<std::io::BufReader<ReadAdapter<R>>> {
        use std::io::BufRead;
        std::io::BufReader::new(ReadAdapter(self)).lines()
    }

    /// Pull bytes from the source, parse whatever complete members it yields, and inflate as
    /// large a prefix of the pending-plus-newly-parsed members as fits in the remaining inflate
    /// buffer space, rounded down to a multiple of `T` when there is more work waiting than that.
    fn refill(&mut self) -> Result<(), BgzfError> {
        loop {
            let n = if self.eof {
                0
            } else {
                self.source.read(&mut self.raw_chunk)?
            };
            if n == 0 {
                self.eof = true;
            } else {
                self.accumulator.extend_from_slice(&self.raw_chunk[..n]);
            }

            let (new_members, remainder_offset) = framing::parse_all(&self.accumulator)?;
            let consumed = self.accumulator.split_to(remainder_offset).freeze();

            let mut candidates: Vec<(Member, Bytes)> = std::mem::take(&mut self.pending);
            candidates.extend(new_members.into_iter().map(|m| {
                let payload = consumed.slice(m.payload_offset..m.payload_offset + m.payload_len);
                (m, payload)
            }));

            let threads = self.pool.num_threads();
            let mut capacity = self.inflate_buf.len() - self.stop;
            let mut fit = fit_prefix(&candidates, capacity, threads);

            if fit == 0 && !candidates.is_empty() {
                if self.start == self.stop {
                    self.start = 0;
                    self.stop = 0;
                    capacity = self.inflate_buf.len();
                    fit = fit_prefix(&candidates, capacity, threads);
                    if fit == 0 {
                        return Err(BgzfError::BlockTooLarge {
                            needed: candidates[0].0.inflated_size,
                            capacity,
                        });
                    }
                } else {
                    self.pending = candidates;
                    return Ok(());
                }
            }

            if fit > 0 {
                let batch = &candidates[..fit];
                let mut payload_refs: Vec<&[u8]> = Vec::with_capacity(fit);
                let mut members: Vec<Member> = Vec::with_capacity(fit);
                let mut end = self.stop;
                for (m, payload) in batch {
                    payload_refs.push(payload.as_ref());
                    members.push(*m);
                    end += m.inflated_size;
                }

                let mut destinations: Vec<&mut [u8]> = Vec::with_capacity(fit);
                let mut rest = &mut self.inflate_buf[self.stop..end];
                for m in &members {
                    let (chunk, tail) = rest.split_at_mut(m.inflated_size);
                    destinations.push(chunk);
                    rest = tail;
                }

                self.pool.inflate_batch(&payload_refs, &members, &mut destinations)?;
                self.stop = end;
            }

            self.pending = candidates.split_off(fit);

            if fit > 0 || self.eof {
                return Ok(());
            }
        }
    }
}

/// The longest prefix of `candidates` whose cumulative `inflated_size` fits in `capacity`,
/// rounded down to a multiple of `threads` when there are more candidates waiting than
/// `threads`, so a later batch can pick up the remainder at full width.
fn fit_prefix(candidates: &[(Member, Bytes)], capacity: usize, threads: usize) -> usize {
    let mut fit = 0;
    let mut cum = 0usize;
    for (m, _) in candidates {
        if cum + m.inflated_size > capacity {
            break;
        }
        cum += m.inflated_size;
        fit += 1;
    }
    if candidates.len() > threads && fit > threads {
        fit -= fit % threads;
    }
    fit
}

/// Adapts a [`BgzfReader`] to `std::io::Read` so it can be wrapped in `std::io::BufReader` for
/// line iteration. Kept as a distinct type because `BgzfReader::read` already has a different
/// signature (`read(n) -> &[u8]`) that would otherwise collide with the trait method of the
/// same name.
pub struct ReadAdapter<R>(BgzfReader<R>);

impl<R: Read> std::io::Read for ReadAdapter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.0.read_into(buf)?)
    }
}
