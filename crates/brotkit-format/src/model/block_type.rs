//! Block types, block switch commands and their codes

use super::Category;
use crate::bit::{BitReader, BitSink, floor_log2};
use crate::error::{FormatError, FormatResult};
use crate::huffman::{HuffmanTree, alphabet_newtype};
use crate::params::SerializationParameters;

/// Largest number of block types per category
pub const MAX_BLOCK_TYPES: u16 = 256;

/// Size of the block length code alphabet
pub const BLOCK_LENGTH_CODES: u32 = 26;

/// `(base, extra bits)` per block length code
const BLOCK_LENGTH_PREFIX: [(u32, u8); 26] = [
    (1, 2),
    (5, 2),
    (9, 2),
    (13, 2),
    (17, 3),
    (25, 3),
    (33, 3),
    (41, 3),
    (49, 4),
    (65, 4),
    (81, 4),
    (97, 4),
    (113, 5),
    (145, 5),
    (177, 5),
    (209, 5),
    (241, 6),
    (305, 6),
    (369, 7),
    (497, 8),
    (753, 9),
    (1265, 10),
    (2289, 11),
    (4337, 12),
    (8433, 13),
    (16625, 24),
];

/// Block type code: 0 = second-to-last type, 1 = last type + 1, n = type n - 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockTypeCode(pub u16);
alphabet_newtype!(BlockTypeCode, u16);

/// Block length prefix code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockLengthCode(pub u8);
alphabet_newtype!(BlockLengthCode, u8);

impl BlockLengthCode {
    /// Smallest length the code represents
    pub fn base(self) -> u32 {
        BLOCK_LENGTH_PREFIX[usize::from(self.0)].0
    }

    /// Number of extra bits following the code
    pub fn extra_bits(self) -> u8 {
        BLOCK_LENGTH_PREFIX[usize::from(self.0)].1
    }

    /// Code and extra bits value for a block length
    pub fn for_length(length: u32) -> FormatResult<(Self, u32)> {
        let index = BLOCK_LENGTH_PREFIX
            .iter()
            .rposition(|&(base, _)| base <= length)
            .ok_or_else(|| FormatError::out_of_range("block length", u64::from(length), 1, u64::from(Self::max_length())))?;
        let (base, extra) = BLOCK_LENGTH_PREFIX[index];
        if length - base >= 1 << extra {
            return Err(FormatError::out_of_range(
                "block length",
                u64::from(length),
                1,
                u64::from(Self::max_length()),
            ));
        }
        Ok((Self(index as u8), length - base))
    }

    /// Largest representable block length
    pub fn max_length() -> u32 {
        16625 + (1 << 24) - 1
    }
}

/// Read a block length (code plus extra bits)
pub(crate) fn read_block_length(reader: &mut BitReader<'_>, tree: &HuffmanTree<BlockLengthCode>) -> FormatResult<u32> {
    let code = tree.read(reader)?;
    Ok(code.base() + reader.read_bits(code.extra_bits())?)
}

/// Write a block length (code plus extra bits)
pub(crate) fn write_block_length<W: BitSink>(
    writer: &mut W,
    tree: &HuffmanTree<BlockLengthCode>,
    length: u32,
) -> FormatResult<()> {
    let (code, extra) = BlockLengthCode::for_length(length)?;
    tree.write(writer, code)?;
    writer.write_bits(code.extra_bits(), extra);
    Ok(())
}

/// Read a count in `1..=256` (NBLTYPES, NTREES)
pub(crate) fn read_type_count(reader: &mut BitReader<'_>) -> FormatResult<u16> {
    if !reader.read_bit()? {
        return Ok(1);
    }
    let n = reader.read_bits(3)?;
    if n == 0 {
        return Ok(2);
    }
    Ok(((1u32 << n) + 1 + reader.read_bits(n as u8)?) as u16)
}

/// Write a count in `1..=256` (NBLTYPES, NTREES)
pub(crate) fn write_type_count<W: BitSink>(writer: &mut W, count: u16) -> FormatResult<()> {
    crate::error::ensure_range("type count", u64::from(count), 1, u64::from(MAX_BLOCK_TYPES))?;
    if count == 1 {
        writer.write_bit(false);
        return Ok(());
    }
    let value = u32::from(count) - 1;
    let n = floor_log2(value);
    writer.write_bit(true);
    writer.write_bits(3, n);
    writer.write_bits(n as u8, value - (1 << n));
    Ok(())
}

/// A switch to a new block type for the next `block_length` symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSwitchCommand {
    /// New block type
    pub block_type: u16,
    /// Number of symbols in the new block
    pub block_length: u32,
}

impl BlockSwitchCommand {
    /// Create a switch command
    pub fn new(block_type: u16, block_length: u32) -> Self {
        Self {
            block_type,
            block_length,
        }
    }
}

/// Prefix codes used to switch block types within one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSwitchCoding {
    /// Code over block type codes (alphabet `NBLTYPES + 2`)
    pub type_code_tree: HuffmanTree<BlockTypeCode>,
    /// Code over the 26 block length codes
    pub length_code_tree: HuffmanTree<BlockLengthCode>,
    /// Length of the first block (type 0)
    pub initial_length: u32,
}

/// Block type count of one category and, when above one, its switch codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTypeInfo {
    count: u16,
    switching: Option<BlockSwitchCoding>,
}

impl Default for BlockTypeInfo {
    fn default() -> Self {
        Self::single()
    }
}

impl BlockTypeInfo {
    /// One block type; no switches are ever coded
    pub fn single() -> Self {
        Self {
            count: 1,
            switching: None,
        }
    }

    /// Several block types with their switch codes
    pub fn new(count: u16, switching: BlockSwitchCoding) -> FormatResult<Self> {
        crate::error::ensure_range("block type count", u64::from(count), 2, u64::from(MAX_BLOCK_TYPES))?;
        if let Some(code) = switching
            .type_code_tree
            .symbols()
            .find(|code| code.0 >= count + 2)
        {
            return Err(FormatError::out_of_range(
                "block type code",
                u64::from(code.0),
                0,
                u64::from(count + 1),
            ));
        }
        BlockLengthCode::for_length(switching.initial_length)?;
        Ok(Self {
            count,
            switching: Some(switching),
        })
    }

    /// Number of block types (NBLTYPES)
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Switch codes, present when there are at least two block types
    pub fn switching(&self) -> Option<&BlockSwitchCoding> {
        self.switching.as_ref()
    }

    /// Read NBLTYPES and, when needed, the switch codes and first length
    pub(crate) fn read(reader: &mut BitReader<'_>, category: Category) -> FormatResult<Self> {
        reader.mark(format!("{category} block types"), |r| {
            let count = r.mark_value("NBLTYPES", read_type_count)?;
            if count == 1 {
                return Ok(Self::single());
            }
            let type_code_tree = r.mark("block type code tree", |r| {
                HuffmanTree::read_description(r, u32::from(count) + 2)
            })?;
            let length_code_tree = r.mark("block length code tree", |r| {
                HuffmanTree::read_description(r, BLOCK_LENGTH_CODES)
            })?;
            let initial_length = r.mark_value("first block length", |r| {
                read_block_length(r, &length_code_tree)
            })?;
            Ok(Self {
                count,
                switching: Some(BlockSwitchCoding {
                    type_code_tree,
                    length_code_tree,
                    initial_length,
                }),
            })
        })
    }

    /// Write NBLTYPES and, when needed, the switch codes and first length
    pub(crate) fn write<W: BitSink>(&self, writer: &mut W, params: &SerializationParameters) -> FormatResult<()> {
        write_type_count(writer, self.count)?;
        if let Some(coding) = &self.switching {
            coding.type_code_tree.write_description(
                writer,
                u32::from(self.count) + 2,
                params.huffman_tree_rle,
            )?;
            coding
                .length_code_tree
                .write_description(writer, BLOCK_LENGTH_CODES, params.huffman_tree_rle)?;
            write_block_length(writer, &coding.length_code_tree, coding.initial_length)?;
        }
        Ok(())
    }
}

/// Translates block type codes to block types and back
///
/// Keeps the last two block types; the initial state is last = 0,
/// second-to-last = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTypeTracker {
    count: u16,
    last: u16,
    second_last: u16,
}

impl BlockTypeTracker {
    /// Tracker for a category with `count` block types
    pub fn new(count: u16) -> Self {
        Self {
            count,
            last: 0,
            second_last: 1,
        }
    }

    /// Block type currently in effect
    pub fn current(&self) -> u16 {
        self.last
    }

    fn advance(&mut self, block_type: u16) {
        self.second_last = self.last;
        self.last = block_type;
    }

    /// Apply a decoded block type code
    pub fn next_type(&mut self, code: BlockTypeCode) -> FormatResult<u16> {
        let count = u32::from(self.count);
        let raw = match code.0 {
            0 => u32::from(self.second_last),
            1 => u32::from(self.last) + 1,
            n => u32::from(n) - 2,
        };
        let block_type = if raw >= count { raw - count } else { raw };
        if block_type >= count {
            return Err(FormatError::InvalidBlockSwitch(format!(
                "block type code {} gives type {block_type} of {count}",
                code.0
            )));
        }
        self.advance(block_type as u16);
        Ok(block_type as u16)
    }

    /// Codes that produce `block_type` from the current state, preferred first
    ///
    /// The first entry follows the reference encoder: `1` for last + 1
    /// (without wrap-around), then `0` for second-to-last, then `type + 2`.
    pub fn candidate_codes(&self, block_type: u16) -> Vec<BlockTypeCode> {
        let mut codes = Vec::with_capacity(3);
        if block_type == self.last + 1 {
            codes.push(BlockTypeCode(1));
        }
        if block_type == self.second_last {
            codes.push(BlockTypeCode(0));
        }
        codes.push(BlockTypeCode(block_type + 2));
        if self.count > 0
            && (self.last + 1) % self.count == block_type
            && !codes.contains(&BlockTypeCode(1))
        {
            codes.push(BlockTypeCode(1));
        }
        codes
    }

    /// Choose the preferred code for `block_type` and advance
    pub fn next_code(&mut self, block_type: u16) -> FormatResult<BlockTypeCode> {
        self.check_type(block_type)?;
        let code = self.candidate_codes(block_type)[0];
        self.advance(block_type);
        Ok(code)
    }

    /// Choose the first code for `block_type` that `tree` can write, and advance
    pub fn next_code_in(&mut self, block_type: u16, tree: &HuffmanTree<BlockTypeCode>) -> FormatResult<BlockTypeCode> {
        self.check_type(block_type)?;
        let code = self
            .candidate_codes(block_type)
            .into_iter()
            .find(|&code| tree.contains(code))
            .ok_or(FormatError::SymbolNotInTree {
                tree: "block type code",
                symbol: u32::from(block_type) + 2,
            })?;
        self.advance(block_type);
        Ok(code)
    }

    fn check_type(&self, block_type: u16) -> FormatResult<()> {
        if block_type >= self.count {
            return Err(FormatError::out_of_range(
                "block type",
                u64::from(block_type),
                0,
                u64::from(self.count) - 1,
            ));
        }
        Ok(())
    }
}

/// Per-category block cursor used while reading or writing commands
///
/// Counts down the current block; at zero the next symbol of the category
/// first reads (or writes) a block switch.
#[derive(Debug)]
pub(crate) struct BlockSwitchTracker<'h> {
    category: Category,
    info: &'h BlockTypeInfo,
    types: BlockTypeTracker,
    remaining: u32,
}

impl<'h> BlockSwitchTracker<'h> {
    pub(crate) fn new(category: Category, info: &'h BlockTypeInfo) -> Self {
        Self {
            category,
            info,
            types: BlockTypeTracker::new(info.count()),
            remaining: info.switching().map_or(0, |coding| coding.initial_length),
        }
    }

    /// Block type for the next symbol, reading a switch if the block ended
    pub(crate) fn next_read(
        &mut self,
        reader: &mut BitReader<'_>,
        switches: &mut Vec<BlockSwitchCommand>,
    ) -> FormatResult<u16> {
        let info = self.info;
        let Some(coding) = info.switching() else {
            return Ok(0);
        };
        if self.remaining == 0 {
            let types = &mut self.types;
            let command = reader.mark(format!("{} block switch", self.category), |r| {
                let code = coding.type_code_tree.read(r)?;
                let block_type = types.next_type(code)?;
                let block_length = read_block_length(r, &coding.length_code_tree)?;
                Ok(BlockSwitchCommand::new(block_type, block_length))
            })?;
            self.remaining = command.block_length;
            switches.push(command);
        }
        self.remaining -= 1;
        Ok(self.types.current())
    }

    /// Block type for the next symbol, writing the next switch if the block ended
    pub(crate) fn next_write<W: BitSink>(
        &mut self,
        writer: &mut W,
        switches: &mut std::slice::Iter<'_, BlockSwitchCommand>,
    ) -> FormatResult<u16> {
        let info = self.info;
        let Some(coding) = info.switching() else {
            return Ok(0);
        };
        if self.remaining == 0 {
            let command = switches.next().ok_or(FormatError::MissingBlockSwitch {
                category: self.category.name(),
            })?;
            let code = self.types.next_code_in(command.block_type, &coding.type_code_tree)?;
            coding.type_code_tree.write(writer, code)?;
            write_block_length(writer, &coding.length_code_tree, command.block_length)?;
            self.remaining = command.block_length;
        }
        self.remaining -= 1;
        Ok(self.types.current())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::BitWriter;

    #[test]
    fn test_type_count_round_trip() {
        for count in 1..=256u16 {
            let mut writer = BitWriter::new();
            write_type_count(&mut writer, count).unwrap();
            let bytes = writer.into_bytes();
            assert_eq!(read_type_count(&mut BitReader::new(&bytes)).unwrap(), count);
        }
        assert!(write_type_count(&mut BitWriter::new(), 0).is_err());
        assert!(write_type_count(&mut BitWriter::new(), 257).is_err());
    }

    #[test]
    fn test_block_length_codes() {
        assert_eq!(BlockLengthCode::for_length(1).unwrap(), (BlockLengthCode(0), 0));
        assert_eq!(BlockLengthCode::for_length(4).unwrap(), (BlockLengthCode(0), 3));
        assert_eq!(BlockLengthCode::for_length(5).unwrap(), (BlockLengthCode(1), 0));
        assert_eq!(BlockLengthCode::for_length(16625).unwrap(), (BlockLengthCode(25), 0));
        let max = BlockLengthCode::max_length();
        assert_eq!(BlockLengthCode::for_length(max).unwrap().0, BlockLengthCode(25));
        assert!(BlockLengthCode::for_length(0).is_err());
        assert!(BlockLengthCode::for_length(max + 1).is_err());
        // Every code's range ends where the next begins
        for pair in BLOCK_LENGTH_PREFIX.windows(2) {
            assert_eq!(pair[0].0 + (1 << pair[0].1), pair[1].0);
        }
    }

    #[test]
    fn test_type_codes_follow_ring() {
        let mut tracker = BlockTypeTracker::new(3);
        assert_eq!(tracker.next_type(BlockTypeCode(1)).unwrap(), 1);
        assert_eq!(tracker.next_type(BlockTypeCode(1)).unwrap(), 2);
        // last + 1 wraps around
        assert_eq!(tracker.next_type(BlockTypeCode(1)).unwrap(), 0);
        // second-to-last
        assert_eq!(tracker.next_type(BlockTypeCode(0)).unwrap(), 2);
        assert_eq!(tracker.next_type(BlockTypeCode(3)).unwrap(), 1);
        assert!(tracker.next_type(BlockTypeCode(9)).is_err());
    }

    #[test]
    fn test_preferred_codes_decode_back() {
        let sequence = [1u16, 0, 2, 2, 1, 3, 0, 3, 1, 2];
        let mut encoder = BlockTypeTracker::new(4);
        let mut decoder = BlockTypeTracker::new(4);
        for &block_type in &sequence {
            let code = encoder.next_code(block_type).unwrap();
            assert_eq!(decoder.next_type(code).unwrap(), block_type);
        }
        assert!(encoder.next_code(4).is_err());
    }

    #[test]
    fn test_candidates_fall_back_to_tree_contents() {
        let tree = HuffmanTree::from_lengths([(BlockTypeCode(2), 1), (BlockTypeCode(3), 1)]).unwrap();
        let mut tracker = BlockTypeTracker::new(2);
        // Type 1 prefers code 1 (last + 1) but only explicit codes exist
        assert_eq!(tracker.next_code_in(1, &tree).unwrap(), BlockTypeCode(3));
        assert_eq!(tracker.next_code_in(0, &tree).unwrap(), BlockTypeCode(2));
    }

    #[test]
    fn test_block_type_info_round_trip() {
        let info = BlockTypeInfo::new(
            3,
            BlockSwitchCoding {
                type_code_tree: HuffmanTree::from_lengths([(BlockTypeCode(0), 1), (BlockTypeCode(1), 1)]).unwrap(),
                length_code_tree: HuffmanTree::from_lengths([(BlockLengthCode(4), 1), (BlockLengthCode(9), 1)]).unwrap(),
                initial_length: 20,
            },
        )
        .unwrap();
        let mut writer = BitWriter::new();
        info.write(&mut writer, &SerializationParameters::default()).unwrap();
        let bytes = writer.into_bytes();
        let back = BlockTypeInfo::read(&mut BitReader::new(&bytes), Category::Literal).unwrap();
        assert_eq!(back, info);

        let mut writer = BitWriter::new();
        BlockTypeInfo::single().write(&mut writer, &SerializationParameters::default()).unwrap();
        assert_eq!(writer.bit_length(), 1);
    }

    #[test]
    fn test_block_type_info_validation() {
        let coding = BlockSwitchCoding {
            type_code_tree: HuffmanTree::single(BlockTypeCode(9)),
            length_code_tree: HuffmanTree::single(BlockLengthCode(0)),
            initial_length: 1,
        };
        assert!(BlockTypeInfo::new(2, coding.clone()).is_err());
        assert!(BlockTypeInfo::new(1, coding).is_err());
    }
}
