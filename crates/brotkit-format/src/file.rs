//! Whole Brotli streams

use tracing::debug;

use crate::bit::{BitCounter, BitReader, BitSink, BitWriter};
use crate::error::{FormatError, FormatResult};
use crate::markers::MarkerRoot;
use crate::model::MetaBlock;
use crate::params::{SerializationParameters, WindowSize};
use crate::state::GlobalState;

/// Symmetric decode/serialize for stream models
pub trait BrotliFormat: Sized {
    /// Decode from bytes
    fn parse(data: &[u8]) -> FormatResult<Self>;

    /// Serialize with default parameters
    fn build(&self) -> FormatResult<Vec<u8>>;

    /// Check that parsing the rebuilt bytes yields the same model
    ///
    /// Streams from other encoders rarely rebuild byte for byte, so the
    /// models are compared instead of the bytes.
    fn verify_round_trip(data: &[u8]) -> FormatResult<()>
    where
        Self: PartialEq,
    {
        let parsed = Self::parse(data)?;
        let rebuilt = parsed.build()?;
        let reparsed = Self::parse(&rebuilt)?;
        if reparsed != parsed {
            return Err(FormatError::RoundTripMismatch(format!(
                "model changed after rebuilding {} bytes as {} bytes",
                data.len(),
                rebuilt.len()
            )));
        }
        Ok(())
    }
}

/// A decoded stream: window size and meta-blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrotliFile {
    /// Sliding window (WBITS)
    pub window_size: WindowSize,
    /// Meta-blocks; the last one has ISLAST set
    pub meta_blocks: Vec<MetaBlock>,
}

impl BrotliFile {
    /// Stream of meta-blocks
    pub fn new(window_size: WindowSize, meta_blocks: Vec<MetaBlock>) -> Self {
        Self {
            window_size,
            meta_blocks,
        }
    }

    /// Stream producing no output
    pub fn empty(window_size: WindowSize) -> Self {
        Self::new(window_size, vec![MetaBlock::LastEmpty])
    }

    /// Decode a complete stream
    pub fn decode(data: &[u8]) -> FormatResult<Self> {
        let mut reader = BitReader::new(data);
        Self::decode_from(&mut reader)
    }

    /// Decode a complete stream, recording a marker for every field
    pub fn decode_with_markers(data: &[u8]) -> FormatResult<(Self, MarkerRoot)> {
        let mut reader = BitReader::with_markers(data);
        let file = Self::decode_from(&mut reader)?;
        let markers = reader.into_markers().unwrap_or_default();
        Ok((file, markers))
    }

    fn decode_from(reader: &mut BitReader<'_>) -> FormatResult<Self> {
        let window_size = WindowSize::read(reader)?;
        let mut state = GlobalState::new(window_size);
        let mut meta_blocks = Vec::new();
        loop {
            let block = MetaBlock::read(reader, &mut state)?;
            let is_last = block.is_last();
            meta_blocks.push(block);
            if is_last {
                break;
            }
        }
        reader.align_to_byte()?;
        let trailing = reader.trailing_bytes();
        if trailing > 0 {
            return Err(FormatError::TrailingData(trailing));
        }
        debug!(
            "Decoded stream: WBITS={}, {} meta-blocks, {} bytes of output",
            window_size.bits(),
            meta_blocks.len(),
            state.total_output()
        );
        Ok(Self {
            window_size,
            meta_blocks,
        })
    }

    /// Check the meta-block sequence: exactly one last block, at the end
    pub fn validate(&self) -> FormatResult<()> {
        let Some(last) = self.meta_blocks.last() else {
            return Err(FormatError::InvalidModel("stream has no meta-blocks".to_string()));
        };
        if !last.is_last() {
            return Err(FormatError::InvalidModel(format!(
                "final {} meta-block is not marked last",
                last.kind()
            )));
        }
        if let Some(index) = self.meta_blocks[..self.meta_blocks.len() - 1]
            .iter()
            .position(MetaBlock::is_last)
        {
            return Err(FormatError::InvalidModel(format!(
                "meta-block {index} is marked last but is followed by more"
            )));
        }
        Ok(())
    }

    fn write_to<W: BitSink>(&self, writer: &mut W, params: &SerializationParameters) -> FormatResult<()> {
        self.validate()?;
        self.window_size.write(writer);
        let mut state = GlobalState::new(self.window_size);
        for block in &self.meta_blocks {
            block.write(writer, &mut state, params)?;
        }
        writer.align_to_byte();
        Ok(())
    }

    /// Serialize the stream
    ///
    /// Identical models and parameters always give identical bytes.
    pub fn serialize(&self, params: &SerializationParameters) -> FormatResult<Vec<u8>> {
        let mut writer = BitWriter::new();
        self.write_to(&mut writer, params)?;
        let bytes = writer.into_bytes();
        debug!(
            "Serialized stream: {} meta-blocks in {} bytes",
            self.meta_blocks.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Size of the serialized stream in bits, without producing it
    pub fn serialized_bit_length(&self, params: &SerializationParameters) -> FormatResult<usize> {
        let mut counter = BitCounter::new();
        self.write_to(&mut counter, params)?;
        Ok(counter.bit_length())
    }

    /// Decompressed contents
    pub fn decompress(&self) -> FormatResult<Vec<u8>> {
        self.validate()?;
        let mut state = GlobalState::new(self.window_size);
        let mut out = Vec::new();
        for block in &self.meta_blocks {
            block.decompress_into(&mut state, &mut out)?;
        }
        Ok(out)
    }
}

impl BrotliFormat for BrotliFile {
    fn parse(data: &[u8]) -> FormatResult<Self> {
        Self::decode(data)
    }

    fn build(&self) -> FormatResult<Vec<u8>> {
        self.serialize(&SerializationParameters::default())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_stream() {
        let file = BrotliFile::empty(WindowSize::new(16).unwrap());
        let bytes = file.serialize(&SerializationParameters::default()).unwrap();
        // WBITS=16 is a single zero bit, then ISLAST and ISLASTEMPTY
        assert_eq!(bytes, vec![0x06]);
        assert_eq!(BrotliFile::decode(&bytes).unwrap(), file);
        assert_eq!(file.decompress().unwrap(), Vec::<u8>::new());
        assert_eq!(file.serialized_bit_length(&SerializationParameters::default()).unwrap(), 8);
    }

    #[test]
    fn test_stored_stream() {
        let file = BrotliFile::new(
            WindowSize::default(),
            vec![
                MetaBlock::PaddedEmpty {
                    hidden: b"note".to_vec(),
                },
                MetaBlock::Uncompressed {
                    data: b"hello world".to_vec(),
                },
                MetaBlock::LastEmpty,
            ],
        );
        let bytes = file.build().unwrap();
        assert_eq!(BrotliFile::decode(&bytes).unwrap(), file);
        assert_eq!(file.decompress().unwrap(), b"hello world");
        BrotliFile::verify_round_trip(&bytes).unwrap();
    }

    #[test]
    fn test_trailing_data_rejected() {
        let mut bytes = BrotliFile::empty(WindowSize::default()).build().unwrap();
        bytes.push(0);
        assert!(matches!(BrotliFile::decode(&bytes), Err(FormatError::TrailingData(1))));
    }

    #[test]
    fn test_nonzero_padding_rejected() {
        // WBITS=16, ISLAST, ISLASTEMPTY, then a set padding bit
        assert!(matches!(
            BrotliFile::decode(&[0x0E]),
            Err(FormatError::NonZeroPadding { .. })
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let file = BrotliFile::new(
            WindowSize::default(),
            vec![
                MetaBlock::Uncompressed {
                    data: b"some bytes".to_vec(),
                },
                MetaBlock::LastEmpty,
            ],
        );
        let bytes = file.build().unwrap();
        let result = BrotliFile::decode(&bytes[..bytes.len() - 2]);
        assert!(result.unwrap_err().is_structural());
    }

    #[test]
    fn test_validate_sequence() {
        let missing_last = BrotliFile::new(
            WindowSize::default(),
            vec![MetaBlock::Uncompressed { data: b"x".to_vec() }],
        );
        assert!(missing_last.build().is_err());
        let early_last = BrotliFile::new(
            WindowSize::default(),
            vec![MetaBlock::LastEmpty, MetaBlock::LastEmpty],
        );
        assert!(early_last.validate().is_err());
        assert!(BrotliFile::new(WindowSize::default(), Vec::new()).decompress().is_err());
    }

    #[test]
    fn test_markers_cover_stream() {
        let file = BrotliFile::new(
            WindowSize::default(),
            vec![
                MetaBlock::Uncompressed { data: b"abc".to_vec() },
                MetaBlock::LastEmpty,
            ],
        );
        let bytes = file.build().unwrap();
        let (decoded, markers) = BrotliFile::decode_with_markers(&bytes).unwrap();
        assert_eq!(decoded, file);
        let wbits = markers.find("WBITS").unwrap();
        assert!(wbits.value.as_deref().unwrap().starts_with("22 "));
        assert_eq!(markers.iter().filter(|(_, node)| node.title == "meta-block").count(), 2);
    }
}
