//! Compressed meta-block header: block types, context maps and prefix codes

use super::block_type::BlockTypeInfo;
use super::context::{ContextMap, DISTANCE_CONTEXTS, LITERAL_CONTEXTS, LiteralContextMode};
use super::distance::{DistanceCode, DistanceParameters};
use super::insert_copy::{INSERT_COPY_CODES, InsertCopyLengthCode};
use super::{Category, PerCategory};
use crate::bit::{BitReader, BitSink};
use crate::error::{FormatError, FormatResult};
use crate::huffman::HuffmanTree;
use crate::params::SerializationParameters;

/// Size of the literal alphabet
pub const LITERAL_CODES: u32 = 256;

/// Everything a compressed meta-block declares before its commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedHeader {
    /// Block type count and switch codes per category
    pub block_types: PerCategory<BlockTypeInfo>,
    /// NPOSTFIX and NDIRECT
    pub distance_parameters: DistanceParameters,
    /// Context mode per literal block type
    pub literal_context_modes: Vec<LiteralContextMode>,
    /// Literal `(block type, context) -> tree` map
    pub literal_context_map: ContextMap,
    /// Distance `(block type, context) -> tree` map
    pub distance_context_map: ContextMap,
    /// Literal prefix codes, one per literal tree index
    pub literal_trees: Vec<HuffmanTree<u8>>,
    /// Insert&copy prefix codes, one per insert&copy block type
    pub insert_copy_trees: Vec<HuffmanTree<InsertCopyLengthCode>>,
    /// Distance prefix codes, one per distance tree index
    pub distance_trees: Vec<HuffmanTree<DistanceCode>>,
}

impl CompressedHeader {
    /// Header with one block type per category and one tree per category
    pub fn simple(
        distance_parameters: DistanceParameters,
        literal_context_mode: LiteralContextMode,
        literal_tree: HuffmanTree<u8>,
        insert_copy_tree: HuffmanTree<InsertCopyLengthCode>,
        distance_tree: HuffmanTree<DistanceCode>,
    ) -> Self {
        Self {
            block_types: PerCategory::default(),
            distance_parameters,
            literal_context_modes: vec![literal_context_mode],
            literal_context_map: ContextMap::zeroed(LITERAL_CONTEXTS, 1),
            distance_context_map: ContextMap::zeroed(DISTANCE_CONTEXTS, 1),
            literal_trees: vec![literal_tree],
            insert_copy_trees: vec![insert_copy_tree],
            distance_trees: vec![distance_tree],
        }
    }

    /// Check that counts, maps and tree lists agree with each other
    pub fn validate(&self) -> FormatResult<()> {
        let literal_types = self.block_types.literal.count();
        let insert_copy_types = self.block_types.insert_copy.count();
        let distance_types = self.block_types.distance.count();
        let mismatch = |what: &str, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(FormatError::InvalidModel(format!(
                    "{what}: expected {expected}, found {actual}"
                )))
            }
        };
        mismatch(
            "literal context modes",
            usize::from(literal_types),
            self.literal_context_modes.len(),
        )?;
        mismatch(
            "literal context map block types",
            usize::from(literal_types),
            self.literal_context_map.block_types(),
        )?;
        mismatch(
            "distance context map block types",
            usize::from(distance_types),
            self.distance_context_map.block_types(),
        )?;
        mismatch(
            "literal trees",
            usize::from(self.literal_context_map.tree_count()),
            self.literal_trees.len(),
        )?;
        mismatch(
            "insert&copy trees",
            usize::from(insert_copy_types),
            self.insert_copy_trees.len(),
        )?;
        mismatch(
            "distance trees",
            usize::from(self.distance_context_map.tree_count()),
            self.distance_trees.len(),
        )?;
        if self.literal_context_map.contexts() != LITERAL_CONTEXTS
            || self.distance_context_map.contexts() != DISTANCE_CONTEXTS
        {
            return Err(FormatError::InvalidModel("context map width".to_string()));
        }
        let alphabet = self.distance_parameters.alphabet_size();
        for tree in &self.distance_trees {
            if let Some(code) = tree.symbols().find(|code| code.0 >= alphabet) {
                return Err(FormatError::out_of_range(
                    "distance code",
                    u64::from(code.0),
                    0,
                    u64::from(alphabet - 1),
                ));
            }
        }
        for tree in &self.insert_copy_trees {
            if let Some(code) = tree.symbols().find(|code| u32::from(code.0) >= INSERT_COPY_CODES) {
                return Err(FormatError::out_of_range(
                    "insert&copy code",
                    u64::from(code.0),
                    0,
                    u64::from(INSERT_COPY_CODES - 1),
                ));
            }
        }
        Ok(())
    }

    /// Read the header that follows a compressed meta-block's length fields
    pub(crate) fn read(reader: &mut BitReader<'_>) -> FormatResult<Self> {
        let block_types = PerCategory::try_from_fn(|category| BlockTypeInfo::read(reader, category))?;
        let distance_parameters = DistanceParameters::read(reader)?;
        let literal_context_modes = reader.mark("literal context modes", |r| {
            (0..block_types.literal.count())
                .map(|_| Ok(LiteralContextMode::from_code(r.read_bits(2)?)))
                .collect::<FormatResult<Vec<_>>>()
        })?;
        let literal_context_map = reader.mark("literal context map", |r| {
            ContextMap::read(r, LITERAL_CONTEXTS, block_types.literal.count())
        })?;
        let distance_context_map = reader.mark("distance context map", |r| {
            ContextMap::read(r, DISTANCE_CONTEXTS, block_types.distance.count())
        })?;
        let literal_trees = read_trees(
            reader,
            Category::Literal,
            literal_context_map.tree_count(),
            LITERAL_CODES,
        )?;
        let insert_copy_trees = read_trees(
            reader,
            Category::InsertCopy,
            block_types.insert_copy.count(),
            INSERT_COPY_CODES,
        )?;
        let distance_trees = read_trees(
            reader,
            Category::Distance,
            distance_context_map.tree_count(),
            distance_parameters.alphabet_size(),
        )?;
        Ok(Self {
            block_types,
            distance_parameters,
            literal_context_modes,
            literal_context_map,
            distance_context_map,
            literal_trees,
            insert_copy_trees,
            distance_trees,
        })
    }

    /// Write the header in stream order
    pub(crate) fn write<W: BitSink>(&self, writer: &mut W, params: &SerializationParameters) -> FormatResult<()> {
        self.validate()?;
        for (_, info) in self.block_types.iter() {
            info.write(writer, params)?;
        }
        self.distance_parameters.write(writer);
        for mode in &self.literal_context_modes {
            writer.write_bits(2, mode.code());
        }
        self.literal_context_map.write(writer, params)?;
        self.distance_context_map.write(writer, params)?;
        for tree in &self.literal_trees {
            tree.write_description(writer, LITERAL_CODES, params.huffman_tree_rle)?;
        }
        for tree in &self.insert_copy_trees {
            tree.write_description(writer, INSERT_COPY_CODES, params.huffman_tree_rle)?;
        }
        let alphabet = self.distance_parameters.alphabet_size();
        for tree in &self.distance_trees {
            tree.write_description(writer, alphabet, params.huffman_tree_rle)?;
        }
        Ok(())
    }
}

fn read_trees<T: crate::huffman::AlphabetSymbol>(
    reader: &mut BitReader<'_>,
    category: Category,
    count: u16,
    alphabet_size: u32,
) -> FormatResult<Vec<HuffmanTree<T>>> {
    reader.mark(format!("{category} prefix codes"), |r| {
        (0..count)
            .map(|_| HuffmanTree::read_description(r, alphabet_size))
            .collect()
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::BitWriter;
    use crate::model::{BlockLengthCode, BlockSwitchCoding, BlockTypeCode};
    use pretty_assertions::assert_eq;

    fn sample_header() -> CompressedHeader {
        let mut header = CompressedHeader::simple(
            DistanceParameters::new(1, 2).unwrap(),
            LiteralContextMode::Utf8,
            HuffmanTree::from_frequencies((0..=255u8).map(|b| (b, u32::from(b % 7) + 1)), 15).unwrap(),
            HuffmanTree::from_lengths([(InsertCopyLengthCode(130), 1), (InsertCopyLengthCode(3), 1)]).unwrap(),
            HuffmanTree::single(DistanceCode(17)),
        );
        header.block_types.literal = BlockTypeInfo::new(
            2,
            BlockSwitchCoding {
                type_code_tree: HuffmanTree::single(BlockTypeCode(1)),
                length_code_tree: HuffmanTree::single(BlockLengthCode(2)),
                initial_length: 10,
            },
        )
        .unwrap();
        header.literal_context_modes.push(LiteralContextMode::Signed);
        let mut map = vec![0u8; 128];
        map[64..].fill(1);
        header.literal_context_map = ContextMap::literal(2, map).unwrap();
        header.literal_trees.push(HuffmanTree::from_lengths([(b'a', 1), (b'b', 1)]).unwrap());
        header
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample_header();
        header.validate().unwrap();
        for params in SerializationParameters::all_combinations() {
            let mut writer = BitWriter::new();
            header.write(&mut writer, &params).unwrap();
            let bits = writer.bit_length();
            let bytes = writer.into_bytes();
            let mut reader = BitReader::new(&bytes);
            assert_eq!(CompressedHeader::read(&mut reader).unwrap(), header);
            assert_eq!(reader.position(), bits);
        }
    }

    #[test]
    fn test_validation_catches_mismatches() {
        let mut header = sample_header();
        header.literal_trees.pop();
        assert!(matches!(header.validate(), Err(FormatError::InvalidModel(_))));

        let mut header = sample_header();
        header.distance_trees = vec![HuffmanTree::single(DistanceCode(500))];
        assert!(header.validate().is_err());
        assert!(header.write(&mut BitWriter::new(), &SerializationParameters::default()).is_err());
    }
}
