//! Parallel streaming codec for the BGZF (Blocked GZIP Format) container used by genomics tooling
//! (SAM/BAM, VCF/BCF, tabix-indexed files).
//!
//! BGZF is a concatenation of standard gzip members, each carrying an extra subfield that
//! declares the member's exact on-disk length. That makes the stream sliceable at member
//! boundaries, which is what lets many members be inflated or deflated in parallel while still
//! producing a bit-identical, gzip-compatible byte stream.
//!
//! This crate covers the parallel block codec and the two streaming buffer managers that front
//! it: [`BgzfReader`] and [`BgzfWriter`]. It does not implement virtual-offset random access, a
//! CLI, or a choice of DEFLATE backend beyond [`libdeflater`]; those are left to callers.
//!
//! # Examples
//!
//! ```
//! use std::io::Write;
//! use pbgzf::{BgzfReader, BgzfWriter};
//!
//! let mut compressed = Vec::new();
//! {
//!     let mut writer = BgzfWriter::new(&mut compressed).unwrap();
//!     writer.write_all(b"This is a first test line\n").unwrap();
//!     writer.write_all(b"This is a second test line\n").unwrap();
//!     writer.close().unwrap();
//! }
//!
//! let mut reader = BgzfReader::new(compressed.as_slice()).unwrap();
//! let out = reader.read_all().unwrap();
//! assert_eq!(&out, b"This is a first test line\nThis is a second test line\n");
//! ```

pub mod check;
pub mod error;
pub mod framing;
pub mod pool;
pub mod reader;
pub mod writer;

pub use error::BgzfError;
pub use framing::{Member, TERMINATOR};
pub use pool::WorkerPool;
pub use reader::{BgzfReader, BgzfReaderBuilder, DEFAULT_BUFFER_SIZE};
pub use writer::{BgzfWriter, BgzfWriterBuilder, BATCH_WIDTH, LOGICAL_BLOCK_SIZE};

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn crate_level_round_trip() {
        let mut compressed = Vec::new();
        {
            let mut writer = BgzfWriter::new(&mut compressed).unwrap();
            writer.write_all(b"one\ntwo\nthree\n").unwrap();
            writer.close().unwrap();
        }
        let mut reader = BgzfReader::new(compressed.as_slice()).unwrap();
        assert_eq!(reader.read_all().unwrap(), b"one\ntwo\nthree\n");
    }

    #[test]
    fn lines_delegates_to_buf_reader() {
        let mut compressed = Vec::new();
        {
            let mut writer = BgzfWriter::new(&mut compressed).unwrap();
            writer.write_all(b"one\ntwo\nthree").unwrap();
            writer.close().unwrap();
        }
        let reader = BgzfReader::new(compressed.as_slice()).unwrap();
        let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn round_trip_through_a_temp_file() {
        use std::fs::File;
        use std::io::{BufReader, BufWriter};
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let path = dir.path().join("fixture.bgzf");

        let input = b"This is a longer test than normal to come up with a bunch of text.\n\
                      We'll read just a few lines at a time.\n\
                      What if this is a longer string, does that then make\n\
                      things fail?\n"
            .repeat(50);

        {
            let out_writer = BufWriter::new(File::create(&path).unwrap());
            let mut writer = BgzfWriter::new(out_writer).unwrap();
            writer.write_all(&input).unwrap();
            writer.close().unwrap();
        }

        let mut reader = BgzfReader::new(BufReader::new(File::open(&path).unwrap())).unwrap();
        assert_eq!(reader.read_all().unwrap(), input);
    }

    #[test]
    fn writer_output_decodes_under_an_independent_gzip_decoder() {
        use flate2::bufread::MultiGzDecoder;

        let input = b"the quick brown fox jumps over the lazy dog\n".repeat(10_000);
        let mut compressed = Vec::new();
        {
            let mut writer = BgzfWriter::new(&mut compressed).unwrap();
            writer.write_all(&input).unwrap();
            writer.close().unwrap();
        }

        let mut decoder = MultiGzDecoder::new(compressed.as_slice());
        let mut decoded = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decoded).unwrap();
        assert_eq!(decoded, input);
    }

    proptest::proptest! {
        #[test]
        fn proptest_round_trip(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..200_000),
            num_threads in 1usize..8,
        ) {
            let mut compressed = Vec::new();
            {
                let mut writer = BgzfWriter::builder()
                    .num_threads(num_threads)
                    .unwrap()
                    .build(&mut compressed)
                    .unwrap();
                writer.write_all(&data).unwrap();
                writer.close().unwrap();
            }
            let mut reader = BgzfReader::builder()
                .num_threads(num_threads)
                .unwrap()
                .build(compressed.as_slice())
                .unwrap();
            let out = reader.read_all().unwrap();
            proptest::prop_assert_eq!(out, data);
        }
    }
}
