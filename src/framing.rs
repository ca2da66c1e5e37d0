//! BGZF member framing: pure, synchronous parsing and emission of the gzip-member-with-`BC`-
//! subfield wrapper that makes a BGZF stream block-sliceable.
//!
//! No I/O and no payload allocation happens here; this module only ever looks at byte windows it
//! is handed and reports offsets and lengths back into them.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;

use crate::error::BgzfError;

/// gzip magic + DEFLATE method + FEXTRA flag, fixed for every BGZF member.
const MAGIC: [u8; 4] = [0x1f, 0x8b, 0x08, 0x04];
/// Fixed-size portion of the header: magic(4) + mtime(4) + xfl(1) + os(1) + xlen(2).
const FIXED_HEADER_SIZE: usize = 12;
/// Size of the gzip trailer: crc32(4) + isize(4).
const TRAILER_SIZE: usize = 8;
/// Size of the `BC` extra subfield a BGZF member carries: id(2) + slen(2) + bsize(2).
const BC_SUBFIELD_SIZE: u16 = 6;
/// Largest value an on-wire BGZF member total size may take.
const MAX_TOTAL_SIZE: usize = 65536;

/// The canonical 28-byte empty-payload BGZF member that marks end-of-stream. Byte-for-byte
/// identical to what `emit_member` would produce for an empty, stored (non-compressed) payload.
pub const TERMINATOR: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// A parsed BGZF member descriptor. Offsets/lengths reference whatever byte window it was parsed
/// from; the descriptor itself owns no payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    /// Length in bytes of the entire member on the wire.
    pub total_size: usize,
    /// Start of the deflated payload within the window that was parsed.
    pub payload_offset: usize,
    /// Length of the deflated payload.
    pub payload_len: usize,
    /// Uncompressed payload length, as recorded in the trailer.
    pub inflated_size: usize,
    /// CRC32 of the uncompressed payload, as recorded in the trailer.
    pub crc32: u32,
}

/// Parse one BGZF member starting at offset 0 of `window`.
///
/// Returns the member descriptor and the number of bytes consumed (`== member.total_size`) on
/// success. Returns [`BgzfError::InsufficientData`] if `window` does not yet contain a complete
/// member -- callers should treat this as "read more and try again", never as a hard failure.
/// Returns [`BgzfError::BadFormat`] if the window is complete but not BGZF-shaped.
pub fn parse_member(window: &[u8]) -> Result<(Member, usize), BgzfError> {
    if window.len() < FIXED_HEADER_SIZE + BC_SUBFIELD_SIZE as usize {
        return Err(BgzfError::InsufficientData);
    }
    if window[0..4] != MAGIC {
        return Err(BgzfError::BadFormat("not gzip".to_string()));
    }
    // bytes 4..8 MTIME, 8 XFL, 9 OS are not validated: they are free-form on read.
    if window[3] & 0x04 == 0 {
        return Err(BgzfError::BadFormat(
            "FEXTRA flag not set, no extra subfields".to_string(),
        ));
    }
    let xlen = LittleEndian::read_u16(&window[10..12]);
    if xlen < BC_SUBFIELD_SIZE {
        return Err(BgzfError::BadFormat(
            "XLEN too small to hold a BC subfield".to_string(),
        ));
    }
    if window[12..14] != [b'B', b'C'] {
        return Err(BgzfError::BadFormat(
            "first extra subfield is not BC: not BGZF".to_string(),
        ));
    }
    let slen = LittleEndian::read_u16(&window[14..16]);
    if slen != 2 {
        return Err(BgzfError::BadFormat(format!(
            "BC subfield length {slen} != 2"
        )));
    }
    let bsize = LittleEndian::read_u16(&window[16..18]);
    let payload_len = (bsize as i64) + 1
        - FIXED_HEADER_SIZE as i64
        - xlen as i64
        - TRAILER_SIZE as i64;
    let total_size = bsize as usize + 1;
    if payload_len < 0 || total_size > window.len() {
        return Err(BgzfError::InsufficientData);
    }
    let payload_len = payload_len as usize;
    let payload_offset = FIXED_HEADER_SIZE + xlen as usize;
    let trailer_offset = payload_offset + payload_len;
    let crc32 = LittleEndian::read_u32(&window[trailer_offset..trailer_offset + 4]);
    let inflated_size = LittleEndian::read_u32(&window[trailer_offset + 4..trailer_offset + 8]);

    Ok((
        Member {
            total_size,
            payload_offset,
            payload_len,
            inflated_size: inflated_size as usize,
            crc32,
        },
        total_size,
    ))
}

/// Repeatedly call [`parse_member`] from the start of `window` until it runs out of complete
/// members. Returns every member found plus the offset of the first byte not yet consumed.
///
/// A [`BgzfError::BadFormat`] from any member aborts the whole scan and propagates; a trailing
/// [`BgzfError::InsufficientData`] just ends the scan, it is not an error.
pub fn parse_all(window: &[u8]) -> Result<(Vec<Member>, usize), BgzfError> {
    let mut members = Vec::new();
    let mut offset = 0usize;
    loop {
        match parse_member(&window[offset..]) {
            Ok((mut member, consumed)) => {
                member.payload_offset += offset;
                offset += consumed;
                members.push(member);
            }
            Err(BgzfError::InsufficientData) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((members, offset))
}

/// Write one BGZF member to `sink`: the 18-byte header/subfield prefix, the deflated payload
/// as-is, and the 8-byte trailer.
pub fn emit_member<W: Write>(
    sink: &mut W,
    deflated: &[u8],
    inflated_len: u32,
    crc32: u32,
) -> Result<(), BgzfError> {
    let total_size = FIXED_HEADER_SIZE + BC_SUBFIELD_SIZE as usize + deflated.len() + TRAILER_SIZE;
    if total_size > MAX_TOTAL_SIZE {
        return Err(BgzfError::BlockTooLarge {
            needed: total_size,
            capacity: MAX_TOTAL_SIZE,
        });
    }
    let bsize = (total_size - 1) as u16;

    sink.write_all(&MAGIC)?;
    sink.write_u32::<LittleEndian>(0)?; // MTIME
    sink.write_u8(0)?; // XFL
    sink.write_u8(0xff)?; // OS
    sink.write_u16::<LittleEndian>(BC_SUBFIELD_SIZE)?; // XLEN
    sink.write_all(b"BC")?;
    sink.write_u16::<LittleEndian>(2)?; // SLEN
    sink.write_u16::<LittleEndian>(bsize)?; // BSIZE
    sink.write_all(deflated)?;
    sink.write_u32::<LittleEndian>(crc32)?;
    sink.write_u32::<LittleEndian>(inflated_len)?;
    Ok(())
}
