//! Fixed-width worker pool applying INFLATE/DEFLATE to a batch of independent blocks in
//! parallel, preserving the input-order pairing between sources and destinations.
//!
//! Each call to [`WorkerPool::inflate_batch`]/[`WorkerPool::deflate_batch`] is a synchronous
//! barrier: it fans the batch out across up to `T` worker threads and does not return until every
//! block in the batch has been processed or one of them has failed. Workers never need to
//! synchronize with each other because the caller hands each one a non-overlapping slice of the
//! destination/output arrays before dispatch, via a per-batch `std::thread::scope` fan-out so that
//! each worker can write directly into a caller-borrowed slice rather than an owned, `'static`
//! buffer.

use libdeflater::{CompressionLvl, Compressor, Decompressor};

use crate::check::Crc32;
use crate::error::BgzfError;
use crate::framing::Member;

/// A fixed-width pool of `T` workers for parallel BGZF block (de)compression.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    /// Create a pool that will use up to `threads` workers per batch.
    ///
    /// # Errors
    /// - [`BgzfError::NumThreads`] if `threads == 0`.
    pub fn new(threads: usize) -> Result<Self, BgzfError> {
        if threads == 0 {
            return Err(BgzfError::NumThreads(threads));
        }
        Ok(Self { threads })
    }

    /// The configured worker count, `T`.
    pub fn num_threads(&self) -> usize {
        self.threads
    }

    /// Inflate every member in `members` into its paired entry in `destinations`, in parallel.
    ///
    /// `payloads[i]` is the deflated payload for `members[i]` (already sliced out of whatever
    /// window it lives in by the caller -- the pool has no opinion on how members are stored
    /// between batches). `destinations[i]` must be exactly `members[i].inflated_size` bytes long.
    ///
    /// # Errors
    /// - [`BgzfError::BadPayload`] wrapping the first failure encountered, identified by its
    ///   index within the batch (CRC mismatch, decoder error, or length mismatch).
    pub fn inflate_batch(
        &self,
        payloads: &[&[u8]],
        members: &[Member],
        destinations: &mut [&mut [u8]],
    ) -> Result<(), BgzfError> {
        assert_eq!(
            payloads.len(),
            members.len(),
            "payloads and members must be the same length"
        );
        assert_eq!(
            members.len(),
            destinations.len(),
            "members and destinations must be the same length"
        );
        if members.is_empty() {
            return Ok(());
        }
        let workers = self.threads.min(members.len());
        let ranges = split_ranges(members.len(), workers);

        let results: Vec<Result<(), BgzfError>> = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(ranges.len());
            let mut remaining: &mut [&mut [u8]] = destinations;
            for (start, end) in ranges {
                let len = end - start;
                let (dest_chunk, rest) = remaining.split_at_mut(len);
                remaining = rest;
                let members_chunk = &members[start..end];
                let payloads_chunk = &payloads[start..end];
                handles.push(scope.spawn(move || -> Result<(), BgzfError> {
                    let mut decompressor = Decompressor::new();
                    for (offset, ((payload, member), dest)) in payloads_chunk
                        .iter()
                        .zip(members_chunk.iter())
                        .zip(dest_chunk.iter_mut())
                        .enumerate()
                    {
                        inflate_one(&mut decompressor, payload, member, dest).map_err(|e| {
                            BgzfError::BadPayload {
                                index: start + offset,
                                source: Box::new(e),
                            }
                        })?;
                    }
                    Ok(())
                }));
            }
            handles.into_iter().map(|h| h.join().expect("pool worker panicked")).collect()
        });

        for result in results {
            result?;
        }
        Ok(())
    }

    /// Deflate every source slice in `sources` into its paired scratch buffer in `buffers`, in
    /// parallel, and return the number of bytes written to each buffer, in input order.
    ///
    /// `buffers[i]` must be large enough to hold the worst-case deflated output for `sources[i]`.
    ///
    /// # Errors
    /// - [`BgzfError::BadPayload`] wrapping the first encoder failure encountered.
    pub fn deflate_batch(
        &self,
        sources: &[&[u8]],
        buffers: &mut [&mut [u8]],
        compression_level: CompressionLvl,
    ) -> Result<Vec<usize>, BgzfError> {
        assert_eq!(
            sources.len(),
            buffers.len(),
            "sources and buffers must be the same length"
        );
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.threads.min(sources.len());
        let ranges = split_ranges(sources.len(), workers);
        let mut written = vec![0usize; sources.len()];

        let results: Vec<Result<(), BgzfError>> = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(ranges.len());
            let mut remaining_bufs: &mut [&mut [u8]] = buffers;
            let mut remaining_written: &mut [usize] = &mut written;
            for (start, end) in ranges {
                let len = end - start;
                let (buf_chunk, buf_rest) = remaining_bufs.split_at_mut(len);
                remaining_bufs = buf_rest;
                let (written_chunk, written_rest) = remaining_written.split_at_mut(len);
                remaining_written = written_rest;
                let sources_chunk = &sources[start..end];
                handles.push(scope.spawn(move || -> Result<(), BgzfError> {
                    let mut compressor = Compressor::new(compression_level);
                    for (offset, ((source, buf), out_len)) in sources_chunk
                        .iter()
                        .zip(buf_chunk.iter_mut())
                        .zip(written_chunk.iter_mut())
                        .enumerate()
                    {
                        let n = compressor.deflate_compress(source, buf).map_err(|e| {
                            BgzfError::BadPayload {
                                index: start + offset,
                                source: Box::new(BgzfError::Codec(e.to_string())),
                            }
                        })?;
                        *out_len = n;
                    }
                    Ok(())
                }));
            }
            handles.into_iter().map(|h| h.join().expect("pool worker panicked")).collect()
        });

        for result in results {
            result?;
        }
        Ok(written)
    }
}

/// Inflate one member's payload into `dest`, verifying both the decompressed length and its CRC32
/// against the member's trailer.
fn inflate_one(
    decompressor: &mut Decompressor,
    payload: &[u8],
    member: &Member,
    dest: &mut [u8],
) -> Result<(), BgzfError> {
    if dest.len() != member.inflated_size {
        return Err(BgzfError::Codec(format!(
            "destination length {} does not match member inflated size {}",
            dest.len(),
            member.inflated_size
        )));
    }
    if payload.len() != member.payload_len {
        return Err(BgzfError::Codec(format!(
            "payload length {} does not match member payload_len {}",
            payload.len(),
            member.payload_len
        )));
    }
    if member.inflated_size > 0 {
        let n = decompressor
            .deflate_decompress(payload, dest)
            .map_err(|e| BgzfError::Codec(e.to_string()))?;
        if n != member.inflated_size {
            return Err(BgzfError::Codec(format!(
                "decompressed {n} bytes, expected {}",
                member.inflated_size
            )));
        }
    }
    let crc = Crc32::of(dest);
    if crc != member.crc32 {
        return Err(BgzfError::InvalidCrc {
            found: crc,
            expected: member.crc32,
        });
    }
    Ok(())
}

/// Split `n` items into up to `workers` contiguous, as-even-as-possible ranges. Never produces
/// more ranges than `workers`, and never an empty range.
fn split_ranges(n: usize, workers: usize) -> Vec<(usize, usize)> {
    let base = n / workers;
    let rem = n % workers;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let len = base + usize::from(i < rem);
        if len == 0 {
            continue;
        }
        ranges.push((start, start + len));
        start += len;
    }
    ranges
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_ranges_covers_all_items_exactly_once() {
        for n in 0..20 {
            for workers in 1..=8 {
                let ranges = split_ranges(n, workers);
                let total: usize = ranges.iter().map(|(s, e)| e - s).sum();
                assert_eq!(total, n);
                assert!(ranges.len() <= workers);
                let mut expected_start = 0;
                for (s, e) in &ranges {
                    assert_eq!(*s, expected_start);
                    assert!(e > s);
                    expected_start = *e;
                }
            }
        }
    }

    fn deflate_one(pool: &WorkerPool, input: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; input.len() + 1024];
        let sources: Vec<&[u8]> = vec![input];
        let mut buf_refs: Vec<&mut [u8]> = vec![&mut buf];
        let lens = pool
            .deflate_batch(&sources, &mut buf_refs, CompressionLvl::new(6).unwrap())
            .unwrap();
        buf.truncate(lens[0]);
        buf
    }

    #[test]
    fn deflate_then_inflate_round_trips_a_batch() {
        let pool = WorkerPool::new(4).unwrap();
        let inputs: Vec<Vec<u8>> = vec![
            b"hello world".to_vec(),
            vec![],
            vec![7u8; 10_000],
            b"the quick brown fox jumps over the lazy dog".to_vec(),
        ];

        let mut payload_bufs: Vec<Vec<u8>> = Vec::new();
        let mut members = Vec::new();
        for input in &inputs {
            let deflated = deflate_one(&pool, input);
            members.push(Member {
                total_size: 0,
                payload_offset: 0,
                payload_len: deflated.len(),
                inflated_size: input.len(),
                crc32: Crc32::of(input),
            });
            payload_bufs.push(deflated);
        }
        let payloads: Vec<&[u8]> = payload_bufs.iter().map(|v| v.as_slice()).collect();

        let mut outputs: Vec<Vec<u8>> = inputs.iter().map(|i| vec![0u8; i.len()]).collect();
        let mut dest_refs: Vec<&mut [u8]> = outputs.iter_mut().map(|v| v.as_mut_slice()).collect();
        pool.inflate_batch(&payloads, &members, &mut dest_refs).unwrap();

        for (got, expected) in outputs.iter().zip(inputs.iter()) {
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn inflate_batch_reports_failing_index_on_crc_mismatch() {
        let pool = WorkerPool::new(2).unwrap();
        let input = b"abc123".to_vec();
        let deflated = deflate_one(&pool, &input);
        let member = Member {
            total_size: 0,
            payload_offset: 0,
            payload_len: deflated.len(),
            inflated_size: input.len(),
            crc32: Crc32::of(&input) ^ 0xffff_ffff, // deliberately wrong
        };
        let mut out = vec![0u8; input.len()];
        let mut dest_refs: Vec<&mut [u8]> = vec![&mut out];
        let payloads: Vec<&[u8]> = vec![&deflated];
        match pool.inflate_batch(&payloads, std::slice::from_ref(&member), &mut dest_refs) {
            Err(BgzfError::BadPayload { index, .. }) => assert_eq!(index, 0),
            other => panic!("expected BadPayload, got {other:?}"),
        }
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let pool = WorkerPool::new(4).unwrap();
        pool.inflate_batch(&[], &[], &mut []).unwrap();
        let lens = pool.deflate_batch(&[], &mut [], CompressionLvl::new(6).unwrap()).unwrap();
        assert!(lens.is_empty());
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(BgzfError::NumThreads(0))));
    }
}
