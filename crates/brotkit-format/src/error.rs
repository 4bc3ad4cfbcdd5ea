//! Error types for Brotli stream parsing, building and decompression

use thiserror::Error;

/// Error raised while decoding, serializing or constructing Brotli structures
///
/// Variants fall in two groups: structural errors (the bitstream does not
/// follow the format) and parameter errors (a model value or argument is
/// outside the range the format can express).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Input ended before a field could be read
    #[error("unexpected end of stream at bit {bit_position}")]
    UnexpectedEof {
        /// Bit offset of the failed read
        bit_position: usize,
    },

    /// Window size header uses a reserved or unsupported code
    #[error("invalid window size code: {0}")]
    InvalidWindowBits(String),

    /// A reserved bit was set
    #[error("reserved bit set in {field} at bit {bit_position}")]
    ReservedBit {
        /// Field the reserved bit belongs to
        field: &'static str,
        /// Bit offset of the reserved bit
        bit_position: usize,
    },

    /// Padding bits before a byte boundary were not zero
    #[error("non-zero padding before byte boundary at bit {bit_position}")]
    NonZeroPadding {
        /// Bit offset where padding started
        bit_position: usize,
    },

    /// A length field used more nibbles or bytes than its value needs
    #[error("length field {field} has a zero most significant unit")]
    ExuberantLength {
        /// Field with the redundant encoding
        field: &'static str,
    },

    /// A prefix code description is malformed
    #[error("invalid Huffman code: {0}")]
    InvalidHuffmanCode(String),

    /// A code length table is not a complete prefix code
    #[error("invalid code lengths: {0}")]
    InvalidCodeLengths(String),

    /// A meta-block header combines flags the format forbids
    #[error("invalid meta-block header: {0}")]
    InvalidMetaBlock(String),

    /// A context map is malformed or inconsistent with its tree count
    #[error("invalid context map: {0}")]
    InvalidContextMap(String),

    /// A block type code or block switch is invalid
    #[error("invalid block switch: {0}")]
    InvalidBlockSwitch(String),

    /// A distance code resolves to a non-positive or oversized distance
    #[error("invalid distance from code {code}: {reason}")]
    InvalidDistance {
        /// Distance code symbol
        code: u32,
        /// What went wrong
        reason: String,
    },

    /// A copy beyond the history does not name a valid dictionary word
    #[error("invalid dictionary reference: copy length {copy_length}, word id {word_id}")]
    InvalidDictionaryReference {
        /// Copy length of the command
        copy_length: u32,
        /// Word id derived from the distance
        word_id: u32,
    },

    /// Commands produced a different number of bytes than the header declared
    #[error("data length mismatch: expected {expected} bytes, produced {actual}")]
    DataLengthMismatch {
        /// Declared meta-block length
        expected: usize,
        /// Bytes produced by the commands
        actual: usize,
    },

    /// A block switch was needed but the model has none left
    #[error("missing {category} block switch command")]
    MissingBlockSwitch {
        /// Category name
        category: &'static str,
    },

    /// Block switch commands were left over after all commands were written
    #[error("{count} unused {category} block switch commands")]
    UnusedBlockSwitch {
        /// Category name
        category: &'static str,
        /// Number of unused commands
        count: usize,
    },

    /// Bytes follow the final meta-block
    #[error("{0} trailing bytes after final meta-block")]
    TrailingData(usize),

    /// The model is internally inconsistent
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A value lies outside the range the format can express
    #[error("{name} = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Name of the parameter
        name: &'static str,
        /// Offending value
        value: u64,
        /// Smallest accepted value
        min: u64,
        /// Largest accepted value
        max: u64,
    },

    /// A symbol has no code in the tree it must be written with
    #[error("symbol {symbol} has no code in the {tree} tree")]
    SymbolNotInTree {
        /// Tree description
        tree: &'static str,
        /// Symbol value
        symbol: u32,
    },

    /// A round trip produced different output
    #[error("round trip mismatch: {0}")]
    RoundTripMismatch(String),
}

/// Result type for format operations
pub type FormatResult<T> = Result<T, FormatError>;

impl FormatError {
    /// Shorthand for [`FormatError::OutOfRange`]
    pub(crate) fn out_of_range(name: &'static str, value: u64, min: u64, max: u64) -> Self {
        Self::OutOfRange {
            name,
            value,
            min,
            max,
        }
    }

    /// Whether the error describes malformed stream content
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            Self::OutOfRange { .. }
                | Self::SymbolNotInTree { .. }
                | Self::InvalidModel(_)
                | Self::UnusedBlockSwitch { .. }
                | Self::MissingBlockSwitch { .. }
                | Self::RoundTripMismatch(_)
        )
    }
}

/// Check that `value` lies in `min..=max`
pub(crate) fn ensure_range(name: &'static str, value: u64, min: u64, max: u64) -> FormatResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(FormatError::out_of_range(name, value, min, max))
    }
}
