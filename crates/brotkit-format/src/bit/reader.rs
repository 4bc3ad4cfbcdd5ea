//! LSB-first bit reader over a byte slice

use std::borrow::Cow;
use std::fmt;

use crate::error::{FormatError, FormatResult};
use crate::markers::{MarkerBuilder, MarkerRoot};

/// Reads bits least significant first, as Brotli streams are packed
///
/// The reader optionally records provenance markers; recording never changes
/// what is read.
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    markers: Option<MarkerBuilder>,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            markers: None,
        }
    }

    /// Create a reader that records provenance markers
    pub fn with_markers(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            markers: Some(MarkerBuilder::default()),
        }
    }

    /// Current position in bits from the start of the input
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bits left before the end of the input
    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position)
    }

    /// Whether marker recording is enabled
    pub fn records_markers(&self) -> bool {
        self.markers.is_some()
    }

    /// Read one bit
    pub fn read_bit(&mut self) -> FormatResult<bool> {
        let byte = self
            .data
            .get(self.position >> 3)
            .ok_or(FormatError::UnexpectedEof {
                bit_position: self.position,
            })?;
        let bit = (byte >> (self.position & 7)) & 1 == 1;
        self.position += 1;
        Ok(bit)
    }

    /// Read `count` bits (at most 32) as an LSB-first integer
    pub fn read_bits(&mut self, count: u8) -> FormatResult<u32> {
        debug_assert!(count <= 32);
        let count = usize::from(count);
        if count > self.remaining_bits() {
            return Err(FormatError::UnexpectedEof {
                bit_position: self.data.len() * 8,
            });
        }
        let mut value = 0u64;
        let mut filled = 0usize;
        while filled < count {
            let byte = self.data[self.position >> 3];
            let offset = self.position & 7;
            let take = (8 - offset).min(count - filled);
            let chunk = (u64::from(byte) >> offset) & ((1u64 << take) - 1);
            value |= chunk << filled;
            filled += take;
            self.position += take;
        }
        Ok(value as u32)
    }

    /// Skip to the next byte boundary; the skipped bits must be zero
    pub fn align_to_byte(&mut self) -> FormatResult<()> {
        let start = self.position;
        let padding = (8 - (self.position & 7)) & 7;
        if padding > 0 && self.read_bits(padding as u8)? != 0 {
            return Err(FormatError::NonZeroPadding {
                bit_position: start,
            });
        }
        Ok(())
    }

    /// Borrow `len` whole bytes; the reader must be byte aligned
    pub fn read_aligned_bytes(&mut self, len: usize) -> FormatResult<&'a [u8]> {
        if self.position & 7 != 0 {
            return Err(FormatError::InvalidModel(format!(
                "byte read at unaligned bit position {}",
                self.position
            )));
        }
        let start = self.position >> 3;
        let bytes = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or(FormatError::UnexpectedEof {
                bit_position: self.data.len() * 8,
            })?;
        self.position += len * 8;
        Ok(bytes)
    }

    /// Number of whole bytes after the current (aligned) position
    pub fn trailing_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.position.div_ceil(8))
    }

    /// Run `f` inside a marker titled `title`
    pub fn mark<T>(
        &mut self,
        title: impl Into<Cow<'static, str>>,
        f: impl FnOnce(&mut Self) -> FormatResult<T>,
    ) -> FormatResult<T> {
        if self.markers.is_none() {
            return f(self);
        }
        self.begin_marker(title.into());
        let result = f(self);
        self.end_marker(None);
        result
    }

    /// Run `f` inside a marker that also records the decoded value
    pub fn mark_value<T: fmt::Display>(
        &mut self,
        title: impl Into<Cow<'static, str>>,
        f: impl FnOnce(&mut Self) -> FormatResult<T>,
    ) -> FormatResult<T> {
        if self.markers.is_none() {
            return f(self);
        }
        self.begin_marker(title.into());
        let result = f(self);
        let value = result.as_ref().ok().map(ToString::to_string);
        self.end_marker(value);
        result
    }

    /// Finish reading and hand out the collected markers
    pub fn into_markers(self) -> Option<MarkerRoot> {
        let end = self.position;
        self.markers.map(|builder| builder.finish(end))
    }

    fn begin_marker(&mut self, title: Cow<'static, str>) {
        let start = self.position;
        if let Some(builder) = self.markers.as_mut() {
            builder.begin(title, start);
        }
    }

    fn end_marker(&mut self, value: Option<String>) {
        let end = self.position;
        if let Some(builder) = self.markers.as_mut() {
            builder.end(end, value);
        }
    }
}

impl fmt::Debug for BitReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitReader")
            .field("len", &self.data.len())
            .field("position", &self.position)
            .field("markers", &self.markers.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lsb_first_order() {
        let mut reader = BitReader::new(&[0b1010_0110, 0xFF]);
        assert!(!reader.read_bit().unwrap());
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(3).unwrap(), 0b001);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
    }

    #[test]
    fn test_read_across_bytes() {
        let mut reader = BitReader::new(&[0x34, 0x12, 0xCD, 0xAB, 0x01]);
        assert_eq!(reader.read_bits(4).unwrap(), 0x4);
        assert_eq!(reader.read_bits(32).unwrap(), 0x1ABC_D123);
        assert_eq!(reader.remaining_bits(), 4);
    }

    #[test]
    fn test_eof_is_error() {
        let mut reader = BitReader::new(&[0x00]);
        assert!(reader.read_bits(7).is_ok());
        assert!(matches!(
            reader.read_bits(2),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_alignment_checks_padding() {
        let mut reader = BitReader::new(&[0b0000_0001, 0xAA]);
        reader.read_bit().unwrap();
        reader.align_to_byte().unwrap();
        assert_eq!(reader.read_aligned_bytes(1).unwrap(), &[0xAA]);

        let mut reader = BitReader::new(&[0b1000_0001]);
        reader.read_bit().unwrap();
        assert!(matches!(
            reader.align_to_byte(),
            Err(FormatError::NonZeroPadding { bit_position: 1 })
        ));
    }

    #[test]
    fn test_markers_do_not_change_reads() {
        let data = [0x5A, 0xC3];
        let mut plain = BitReader::new(&data);
        let mut marked = BitReader::with_markers(&data);
        let a = plain.read_bits(5).unwrap();
        let b = marked
            .mark("outer", |r| r.mark_value("inner", |r| r.read_bits(5)))
            .unwrap();
        assert_eq!(a, b);
        let root = marked.into_markers().unwrap();
        assert_eq!(root.nodes[0].children[0].value.as_deref(), Some("26"));
        assert_eq!(root.nodes[0].bit_range(), 0..5);
    }
}
