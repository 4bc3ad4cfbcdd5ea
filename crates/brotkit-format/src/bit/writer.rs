//! LSB-first bit sinks: a byte-producing writer and a counting sink

use super::path::BitPath;

/// Destination for serialized bits
///
/// Writes are infallible; structural validation happens before bits are
/// emitted.
pub trait BitSink {
    /// Append `count` (at most 32) bits of `value`, least significant first
    fn write_bits(&mut self, count: u8, value: u32);

    /// Pad with zero bits to the next byte boundary
    fn align_to_byte(&mut self);

    /// Append whole bytes; the sink must be byte aligned
    fn write_aligned_bytes(&mut self, bytes: &[u8]);

    /// Number of bits written so far
    fn bit_length(&self) -> usize;

    /// Append a single bit
    fn write_bit(&mut self, bit: bool) {
        self.write_bits(1, u32::from(bit));
    }

    /// Append a prefix code path
    fn write_path(&mut self, path: &BitPath) {
        self.write_bits(path.len(), path.bits());
    }
}

/// Packs bits into a growing byte vector
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `bytes` bytes
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    /// Finish writing; a partial last byte is zero padded
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Bytes written so far, including a partial last byte
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl BitSink for BitWriter {
    fn write_bits(&mut self, count: u8, value: u32) {
        debug_assert!(count <= 32);
        let mut remaining = usize::from(count);
        let mut value = if count == 32 {
            u64::from(value)
        } else {
            u64::from(value) & ((1u64 << count) - 1)
        };
        while remaining > 0 {
            let offset = self.bit_len & 7;
            if offset == 0 {
                self.bytes.push(0);
            }
            let take = (8 - offset).min(remaining);
            let chunk = (value & ((1u64 << take) - 1)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= chunk << offset;
            }
            value >>= take;
            remaining -= take;
            self.bit_len += take;
        }
    }

    fn align_to_byte(&mut self) {
        self.bit_len = self.bit_len.div_ceil(8) * 8;
    }

    fn write_aligned_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(self.bit_len & 7 == 0);
        self.bytes.extend_from_slice(bytes);
        self.bit_len += bytes.len() * 8;
    }

    fn bit_length(&self) -> usize {
        self.bit_len
    }
}

/// Counts bits without storing them, for size estimation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BitCounter {
    bit_len: usize,
}

impl BitCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Size in whole bytes, rounding up
    pub fn byte_length(&self) -> usize {
        self.bit_len.div_ceil(8)
    }
}

impl BitSink for BitCounter {
    fn write_bits(&mut self, count: u8, _value: u32) {
        self.bit_len += usize::from(count);
    }

    fn align_to_byte(&mut self) {
        self.bit_len = self.bit_len.div_ceil(8) * 8;
    }

    fn write_aligned_bytes(&mut self, bytes: &[u8]) {
        self.bit_len += bytes.len() * 8;
    }

    fn bit_length(&self) -> usize {
        self.bit_len
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::BitReader;

    #[test]
    fn test_writer_packs_lsb_first() {
        let mut writer = BitWriter::new();
        writer.write_bit(false);
        writer.write_bit(true);
        writer.write_bits(3, 0b001);
        writer.write_bits(3, 0b101);
        writer.write_bits(8, 0xFF);
        assert_eq!(writer.into_bytes(), vec![0b1010_0110, 0xFF]);
    }

    #[test]
    fn test_alignment_and_raw_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bits(3, 0b111);
        writer.align_to_byte();
        assert_eq!(writer.bit_length(), 8);
        writer.write_aligned_bytes(&[1, 2, 3]);
        writer.write_bits(1, 1);
        assert_eq!(writer.into_bytes(), vec![0b111, 1, 2, 3, 1]);
    }

    #[test]
    fn test_counter_matches_writer() {
        let mut writer = BitWriter::new();
        let mut counter = BitCounter::new();
        for sink in [&mut writer as &mut dyn BitSink, &mut counter] {
            sink.write_bits(13, 0x1ABC);
            sink.align_to_byte();
            sink.write_aligned_bytes(&[9; 4]);
            sink.write_path(&BitPath::new(0b10, 2));
        }
        assert_eq!(writer.bit_length(), counter.bit_length());
        assert_eq!(writer.as_bytes().len(), counter.byte_length());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn write_then_read_fields(fields in prop::collection::vec((1u8..=32, any::<u32>()), 0..64)) {
                let mut writer = BitWriter::new();
                for &(count, value) in &fields {
                    writer.write_bits(count, value);
                }
                let bytes = writer.into_bytes();
                let mut reader = BitReader::new(&bytes);
                for &(count, value) in &fields {
                    let mask = if count == 32 { u32::MAX } else { (1u32 << count) - 1 };
                    let read = reader.read_bits(count).map_err(|e| TestCaseError::fail(e.to_string()))?;
                    prop_assert_eq!(read, value & mask);
                }
            }
        }
    }
}
