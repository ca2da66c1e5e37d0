//! CRC32 checksum tracking shared by the framing codec and the worker pool.

/// Running CRC32 of the bytes fed to it, plus a running count of those bytes.
///
/// This is a thin wrapper around [`libdeflater::Crc`], kept as its own type (rather than using
/// `libdeflater::Crc` directly everywhere) so that callers outside this crate never need the
/// `libdeflater` dependency in scope just to check a member's checksum. `libdeflater::Crc` only
/// tracks the running sum, not the byte count, so `amount` is kept alongside it here as a plain
/// counter incremented on every `update`.
pub struct Crc32 {
    crc: libdeflater::Crc,
    amount: u32,
}

impl Crc32 {
    /// Create a fresh, zeroed CRC32 accumulator.
    #[inline]
    pub fn new() -> Self {
        Self {
            crc: libdeflater::Crc::new(),
            amount: 0,
        }
    }

    /// Fold `bytes` into the running checksum.
    #[inline]
    pub fn update(&mut self, bytes: &[u8]) {
        self.amount += bytes.len() as u32;
        self.crc.update(bytes);
    }

    /// The CRC32 of all bytes seen so far.
    #[inline]
    pub fn sum(&self) -> u32 {
        self.crc.sum()
    }

    /// The number of bytes seen so far.
    #[inline]
    pub fn amount(&self) -> u32 {
        self.amount
    }

    /// Compute the CRC32 of `bytes` in one shot.
    #[inline]
    pub fn of(bytes: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(bytes);
        crc.sum()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(Crc32::of(b""), 0);
    }

    #[test]
    fn matches_known_vector() {
        // CRC32 of "123456789" is the standard check value 0xCBF43926.
        assert_eq!(Crc32::of(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut crc = Crc32::new();
        crc.update(b"hello ");
        crc.update(b"world");
        assert_eq!(crc.sum(), Crc32::of(b"hello world"));
        assert_eq!(crc.amount(), 11);
    }
}
