//! Streaming CRC-32 for entry bodies.

use crc32fast::Hasher;

/// Running CRC-32 over an entry's uncompressed bytes.
///
/// `digest` consumes the accumulator, so every entry starts from a fresh one.
#[derive(Default, Clone)]
pub struct Crc32 {
    hasher: Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `chunk` into the running checksum.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Checksum of every byte seen so far.
    pub fn digest(self) -> u32 {
        self.hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_digest_is_zero() {
        assert_eq!(Crc32::new().digest(), 0);
    }

    #[test]
    fn test_check_value() {
        let mut crc = Crc32::new();
        crc.update(b"123456789");
        assert_eq!(crc.digest(), 0xCBF43926);
    }

    #[test]
    fn test_chunking_does_not_matter() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();

        let mut whole = Crc32::new();
        whole.update(&data);

        let mut chunked = Crc32::new();
        for chunk in data.chunks(7) {
            chunked.update(chunk);
        }

        assert_eq!(whole.digest(), chunked.digest());
    }
}
