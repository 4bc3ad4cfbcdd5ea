//! Meta-block headers and the four meta-block kinds

use std::fmt;

use tracing::debug;

use super::data::CompressedData;
use super::header::CompressedHeader;
use crate::bit::{BitCounter, BitReader, BitSink};
use crate::error::{FormatError, FormatResult};
use crate::params::SerializationParameters;
use crate::state::{GlobalState, OutputCapture};

/// Largest MLEN, and largest metadata block
pub const MAX_META_BLOCK_LENGTH: u32 = 1 << 24;

/// Uncompressed length of a meta-block (MLEN)
///
/// Always coded with the fewest nibbles that hold `MLEN - 1`, since a zero
/// top nibble above four nibbles is rejected by decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataLength(u32);

impl DataLength {
    /// Validate a length in `1..=16 MiB`
    pub fn new(length: u32) -> FormatResult<Self> {
        crate::error::ensure_range("MLEN", u64::from(length), 1, u64::from(MAX_META_BLOCK_LENGTH))?;
        Ok(Self(length))
    }

    /// MLEN
    pub fn get(self) -> u32 {
        self.0
    }

    /// MLEN as a buffer length
    pub fn bytes(self) -> usize {
        self.0 as usize
    }

    /// Number of nibbles used for `MLEN - 1`
    pub fn nibbles(self) -> u8 {
        match self.0 - 1 {
            0..=0xFFFF => 4,
            0x1_0000..=0xF_FFFF => 5,
            _ => 6,
        }
    }

    fn read(reader: &mut BitReader<'_>, nibbles: u8) -> FormatResult<Self> {
        reader.mark_value("MLEN", |r| {
            let value = r.read_bits(nibbles * 4)?;
            if nibbles > 4 && value >> ((nibbles - 1) * 4) == 0 {
                return Err(FormatError::ExuberantLength { field: "MLEN" });
            }
            Ok(Self(value + 1))
        })
    }

    fn write<W: BitSink>(self, writer: &mut W) {
        let nibbles = self.nibbles();
        writer.write_bits(2, u32::from(nibbles - 4));
        writer.write_bits(nibbles * 4, self.0 - 1);
    }
}

impl fmt::Display for DataLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A meta-block holding insert&copy commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedMetaBlock {
    /// ISLAST: no meta-block follows
    pub is_last: bool,
    /// Bytes the commands produce
    pub data_length: DataLength,
    /// Block types, context maps and prefix codes
    pub header: CompressedHeader,
    /// Commands and block switches
    pub data: CompressedData,
}

/// One meta-block of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaBlock {
    /// Final empty meta-block terminating the stream
    LastEmpty,
    /// Metadata block: produces no output, carries skipped bytes
    PaddedEmpty {
        /// Skipped bytes (at most 16 MiB)
        hidden: Vec<u8>,
    },
    /// Raw bytes stored after byte alignment
    Uncompressed {
        /// Stored bytes (1 to 16 MiB)
        data: Vec<u8>,
    },
    /// Prefix-coded commands
    Compressed(Box<CompressedMetaBlock>),
}

impl MetaBlock {
    /// Whether this meta-block ends the stream
    pub fn is_last(&self) -> bool {
        match self {
            Self::LastEmpty => true,
            Self::Compressed(block) => block.is_last,
            Self::PaddedEmpty { .. } | Self::Uncompressed { .. } => false,
        }
    }

    /// Short name of the kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LastEmpty => "last-empty",
            Self::PaddedEmpty { .. } => "padded-empty",
            Self::Uncompressed { .. } => "uncompressed",
            Self::Compressed(_) => "compressed",
        }
    }

    /// Bytes the meta-block adds to the output
    pub fn output_length(&self) -> usize {
        match self {
            Self::LastEmpty | Self::PaddedEmpty { .. } => 0,
            Self::Uncompressed { data } => data.len(),
            Self::Compressed(block) => block.data_length.bytes(),
        }
    }

    /// Read one meta-block, updating `state` with its output
    pub(crate) fn read(reader: &mut BitReader<'_>, state: &mut GlobalState) -> FormatResult<Self> {
        let start = reader.position();
        let block = reader.mark_value("meta-block", |r| Self::read_body(r, state))?;
        debug!(
            "Read {} meta-block: {} bytes of output from bits {}..{}",
            block.kind(),
            block.output_length(),
            start,
            reader.position()
        );
        Ok(block)
    }

    fn read_body(reader: &mut BitReader<'_>, state: &mut GlobalState) -> FormatResult<Self> {
        let is_last = reader.mark_value("ISLAST", BitReader::read_bit)?;
        if is_last && reader.mark_value("ISLASTEMPTY", BitReader::read_bit)? {
            return Ok(Self::LastEmpty);
        }
        let nibbles_code = reader.mark_value("MNIBBLES", |r| r.read_bits(2))?;
        if nibbles_code == 3 {
            if is_last {
                return Err(FormatError::InvalidMetaBlock(
                    "metadata meta-block marked as last".to_string(),
                ));
            }
            return Self::read_metadata(reader);
        }
        let data_length = DataLength::read(reader, nibbles_code as u8 + 4)?;

        if !is_last && reader.mark_value("ISUNCOMPRESSED", BitReader::read_bit)? {
            reader.align_to_byte()?;
            let data = reader.mark("uncompressed data", |r| r.read_aligned_bytes(data_length.bytes()))?;
            state.output_bytes(data);
            return Ok(Self::Uncompressed { data: data.to_vec() });
        }

        let header = reader.mark("compressed header", CompressedHeader::read)?;
        let data = reader.mark("compressed data", |r| {
            CompressedData::read(r, &header, state, data_length.bytes())
        })?;
        Ok(Self::Compressed(Box::new(CompressedMetaBlock {
            is_last,
            data_length,
            header,
            data,
        })))
    }

    fn read_metadata(reader: &mut BitReader<'_>) -> FormatResult<Self> {
        let position = reader.position();
        if reader.read_bit()? {
            return Err(FormatError::ReservedBit {
                field: "metadata reserved",
                bit_position: position,
            });
        }
        let skip_bytes = reader.mark_value("MSKIPBYTES", |r| r.read_bits(2))?;
        let skip_length = if skip_bytes == 0 {
            0
        } else {
            reader.mark_value("MSKIPLEN", |r| {
                let value = r.read_bits(skip_bytes as u8 * 8)?;
                if skip_bytes > 1 && value >> ((skip_bytes - 1) * 8) == 0 {
                    return Err(FormatError::ExuberantLength { field: "MSKIPLEN" });
                }
                Ok(value + 1)
            })?
        };
        reader.align_to_byte()?;
        let hidden = reader.mark("metadata", |r| r.read_aligned_bytes(skip_length as usize))?;
        Ok(Self::PaddedEmpty {
            hidden: hidden.to_vec(),
        })
    }

    /// Write one meta-block, updating `state` with its output
    pub(crate) fn write<W: BitSink>(
        &self,
        writer: &mut W,
        state: &mut GlobalState,
        params: &SerializationParameters,
    ) -> FormatResult<()> {
        let start = writer.bit_length();
        match self {
            Self::LastEmpty => {
                writer.write_bit(true);
                writer.write_bit(true);
            }
            Self::PaddedEmpty { hidden } => {
                let length = hidden.len() as u64;
                crate::error::ensure_range("metadata length", length, 0, u64::from(MAX_META_BLOCK_LENGTH))?;
                writer.write_bit(false);
                writer.write_bits(2, 3);
                writer.write_bit(false);
                if length == 0 {
                    writer.write_bits(2, 0);
                } else {
                    let value = (length - 1) as u32;
                    let bytes = (32 - value.leading_zeros()).div_ceil(8).max(1);
                    writer.write_bits(2, bytes);
                    writer.write_bits((bytes * 8) as u8, value);
                }
                writer.align_to_byte();
                writer.write_aligned_bytes(hidden);
            }
            Self::Uncompressed { data } => {
                let data_length = DataLength::new(data.len() as u32)?;
                writer.write_bit(false);
                data_length.write(writer);
                writer.write_bit(true);
                writer.align_to_byte();
                writer.write_aligned_bytes(data);
                state.output_bytes(data);
            }
            Self::Compressed(block) => {
                writer.write_bit(block.is_last);
                if block.is_last {
                    writer.write_bit(false);
                }
                block.data_length.write(writer);
                if !block.is_last {
                    writer.write_bit(false);
                }
                block.header.write(writer, params)?;
                block
                    .data
                    .write(writer, &block.header, state, block.data_length.bytes())?;
            }
        }
        debug!(
            "Wrote {} meta-block: {} bytes of output in {} bits",
            self.kind(),
            self.output_length(),
            writer.bit_length() - start
        );
        Ok(())
    }

    /// Size of the meta-block in bits when written after `state`
    ///
    /// `state` advances past the block's output. Byte alignment inside the
    /// block is counted from the state's own bit position of zero, so the
    /// result is exact only for blocks without aligned sections.
    pub fn serialized_bit_length(
        &self,
        state: &mut GlobalState,
        params: &SerializationParameters,
    ) -> FormatResult<usize> {
        let mut counter = BitCounter::new();
        self.write(&mut counter, state, params)?;
        Ok(counter.bit_length())
    }

    /// Replay the meta-block against `state`, appending its output to `out`
    pub fn decompress_into(&self, state: &mut GlobalState, out: &mut Vec<u8>) -> FormatResult<()> {
        match self {
            Self::LastEmpty | Self::PaddedEmpty { .. } => Ok(()),
            Self::Uncompressed { data } => {
                state.output_bytes(data);
                out.extend_from_slice(data);
                Ok(())
            }
            Self::Compressed(block) => {
                block.header.validate()?;
                let capture = OutputCapture::new();
                let id = state.add_observer(Box::new(capture.clone()));
                let result = block.data.write(
                    &mut BitCounter::new(),
                    &block.header,
                    state,
                    block.data_length.bytes(),
                );
                state.remove_observer(id);
                result?;
                out.extend_from_slice(&capture.take());
                Ok(())
            }
        }
    }
}

impl fmt::Display for MetaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastEmpty => f.write_str("last-empty"),
            Self::PaddedEmpty { hidden } => write!(f, "padded-empty ({} hidden bytes)", hidden.len()),
            Self::Uncompressed { data } => write!(f, "uncompressed ({} bytes)", data.len()),
            Self::Compressed(block) => write!(
                f,
                "compressed ({} bytes, {} commands{})",
                block.data_length,
                block.data.commands.len(),
                if block.is_last { ", last" } else { "" }
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::BitWriter;
    use crate::params::WindowSize;
    use pretty_assertions::assert_eq;

    fn state() -> GlobalState {
        GlobalState::new(WindowSize::default())
    }

    fn round_trip(block: &MetaBlock) -> MetaBlock {
        let mut writer = BitWriter::new();
        block
            .write(&mut writer, &mut state(), &SerializationParameters::default())
            .unwrap();
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let back = MetaBlock::read(&mut reader, &mut state()).unwrap();
        reader.align_to_byte().unwrap();
        assert_eq!(reader.trailing_bytes(), 0);
        back
    }

    #[test]
    fn test_data_length_nibbles() {
        assert_eq!(DataLength::new(1).unwrap().nibbles(), 4);
        assert_eq!(DataLength::new(0x1_0000).unwrap().nibbles(), 4);
        assert_eq!(DataLength::new(0x1_0001).unwrap().nibbles(), 5);
        assert_eq!(DataLength::new(0x10_0001).unwrap().nibbles(), 6);
        assert!(DataLength::new(0).is_err());
        assert!(DataLength::new(MAX_META_BLOCK_LENGTH + 1).is_err());
    }

    #[test]
    fn test_exuberant_length_rejected() {
        // ISLAST=0, MNIBBLES=5 (code 1), MLEN-1 = 0 with a zero top nibble
        let mut writer = BitWriter::new();
        writer.write_bit(false);
        writer.write_bits(2, 1);
        writer.write_bits(20, 0);
        writer.write_bit(true);
        let bytes = writer.into_bytes();
        let result = MetaBlock::read(&mut BitReader::new(&bytes), &mut state());
        assert!(matches!(result, Err(FormatError::ExuberantLength { .. })));
    }

    #[test]
    fn test_simple_kinds_round_trip() {
        for block in [
            MetaBlock::LastEmpty,
            MetaBlock::PaddedEmpty { hidden: Vec::new() },
            MetaBlock::PaddedEmpty {
                hidden: b"hidden payload".to_vec(),
            },
            MetaBlock::PaddedEmpty { hidden: vec![9; 300] },
            MetaBlock::Uncompressed {
                data: b"stored bytes".to_vec(),
            },
        ] {
            assert_eq!(round_trip(&block), block);
        }
    }

    #[test]
    fn test_last_empty_is_two_bits() {
        let mut writer = BitWriter::new();
        MetaBlock::LastEmpty
            .write(&mut writer, &mut state(), &SerializationParameters::default())
            .unwrap();
        assert_eq!(writer.bit_length(), 2);
        assert!(MetaBlock::LastEmpty.is_last());
    }

    #[test]
    fn test_last_metadata_rejected() {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bits(2, 3);
        writer.write_bits(4, 0);
        let bytes = writer.into_bytes();
        let result = MetaBlock::read(&mut BitReader::new(&bytes), &mut state());
        assert!(matches!(result, Err(FormatError::InvalidMetaBlock(_))));
    }

    #[test]
    fn test_uncompressed_output() {
        let block = MetaBlock::Uncompressed { data: b"abc".to_vec() };
        let mut out = Vec::new();
        let mut state = state();
        block.decompress_into(&mut state, &mut out).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(state.total_output(), 3);
        assert!(
            MetaBlock::Uncompressed { data: Vec::new() }
                .write(&mut BitWriter::new(), &mut GlobalState::new(WindowSize::default()), &SerializationParameters::default())
                .is_err()
        );
    }
}
