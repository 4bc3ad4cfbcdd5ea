//! Bit-level input and output
//!
//! Brotli packs every field least significant bit first. [`BitReader`] reads
//! from a byte slice and can record provenance markers, [`BitSink`] is the
//! output side with a byte-producing [`BitWriter`] and a size-only
//! [`BitCounter`].

mod path;
mod reader;
mod writer;

pub use path::{BitPath, MAX_PATH_BITS};
pub use reader::BitReader;
pub use writer::{BitCounter, BitSink, BitWriter};

/// Number of bits needed to store values in `0..alphabet_size`
pub fn alphabet_bits(alphabet_size: u32) -> u8 {
    if alphabet_size <= 1 {
        0
    } else {
        (32 - (alphabet_size - 1).leading_zeros()) as u8
    }
}

/// Index of the highest set bit of a non-zero value
pub fn floor_log2(value: u32) -> u32 {
    31 - value.max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_bits() {
        assert_eq!(alphabet_bits(256), 8);
        assert_eq!(alphabet_bits(704), 10);
        assert_eq!(alphabet_bits(26), 5);
        assert_eq!(alphabet_bits(2), 1);
        assert_eq!(alphabet_bits(64), 6);
        assert_eq!(alphabet_bits(65), 7);
    }

    #[test]
    fn test_floor_log2() {
        assert_eq!(floor_log2(1), 0);
        assert_eq!(floor_log2(2), 1);
        assert_eq!(floor_log2(1023), 9);
        assert_eq!(floor_log2(1024), 10);
    }
}
