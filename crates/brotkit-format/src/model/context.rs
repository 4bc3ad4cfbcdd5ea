//! Literal context modes and context maps

use serde::{Deserialize, Serialize};

use crate::bit::{BitReader, BitSink, floor_log2};
use crate::error::{FormatError, FormatResult};
use crate::huffman::HuffmanTree;
use crate::params::{ContextMapRle, SerializationParameters};

use super::block_type::{read_type_count, write_type_count};

/// Literal contexts per literal block type
pub const LITERAL_CONTEXTS: usize = 64;

/// Distance contexts per distance block type
pub const DISTANCE_CONTEXTS: usize = 4;

/// Largest run-length prefix the writer declares
const MAX_RLE_PREFIX: u32 = 6;

/// UTF-8 class of the last byte
#[rustfmt::skip]
static UTF8_LAST: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 4, 4, 0, 0, 4, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    8, 12, 16, 12, 12, 20, 12, 16, 24, 28, 12, 12, 32, 12, 36, 12,
    44, 44, 44, 44, 44, 44, 44, 44, 44, 44, 32, 32, 24, 40, 28, 12,
    12, 48, 52, 52, 52, 48, 52, 52, 52, 48, 52, 52, 52, 52, 52, 48,
    52, 52, 52, 52, 52, 48, 52, 52, 52, 52, 52, 24, 12, 28, 12, 12,
    12, 56, 60, 60, 60, 56, 60, 60, 60, 56, 60, 60, 60, 60, 60, 56,
    60, 60, 60, 60, 60, 56, 60, 60, 60, 60, 60, 24, 12, 28, 12, 0,
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3,
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3,
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3,
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3,
];
/// UTF-8 class of the second-to-last byte
#[rustfmt::skip]
static UTF8_SECOND_LAST: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1,
    1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1,
    1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 1, 1, 1, 1, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
];
/// Signed magnitude bucket of a byte
#[rustfmt::skip]
static SIGNED_BUCKET: [u8; 256] = [
    0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 7,
];

/// How the two previous output bytes select a literal context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralContextMode {
    /// Low six bits of the last byte
    #[default]
    Lsb6,
    /// High six bits of the last byte
    Msb6,
    /// UTF-8 character classes of the last two bytes
    Utf8,
    /// Signed magnitude buckets of the last two bytes
    Signed,
}

impl LiteralContextMode {
    /// All modes in stream code order
    pub const ALL: [Self; 4] = [Self::Lsb6, Self::Msb6, Self::Utf8, Self::Signed];

    /// Mode for a 2-bit stream code
    pub fn from_code(code: u32) -> Self {
        Self::ALL[(code & 3) as usize]
    }

    /// 2-bit stream code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Context id in `0..64` from the last (`p1`) and second-to-last (`p2`) bytes
    pub fn context_id(self, p1: u8, p2: u8) -> u8 {
        match self {
            Self::Lsb6 => p1 & 0x3F,
            Self::Msb6 => p1 >> 2,
            Self::Utf8 => UTF8_LAST[usize::from(p1)] | UTF8_SECOND_LAST[usize::from(p2)],
            Self::Signed => (SIGNED_BUCKET[usize::from(p1)] << 3) | SIGNED_BUCKET[usize::from(p2)],
        }
    }
}

impl std::fmt::Display for LiteralContextMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Lsb6 => "LSB6",
            Self::Msb6 => "MSB6",
            Self::Utf8 => "UTF8",
            Self::Signed => "Signed",
        })
    }
}

/// Distance context id from a copy length: 2, 3, 4 map to 0, 1, 2 and longer
/// copies to 3
pub fn distance_context_id(copy_length: u32) -> u8 {
    (copy_length.clamp(2, 5) - 2) as u8
}

/// Move-to-front transform over the byte alphabet
pub fn move_to_front(values: &[u8]) -> Vec<u8> {
    let mut list: [u8; 256] = std::array::from_fn(|i| i as u8);
    let mut output = Vec::with_capacity(values.len());
    for &value in values {
        let position = list.iter().position(|&b| b == value).unwrap_or(0);
        output.push(position as u8);
        if position > 0 {
            list.copy_within(..position, 1);
            list[0] = value;
        }
    }
    output
}

/// Inverse move-to-front transform, in place
pub fn inverse_move_to_front(values: &mut [u8]) {
    let mut list: [u8; 256] = std::array::from_fn(|i| i as u8);
    for value in values.iter_mut() {
        let position = usize::from(*value);
        let byte = list[position];
        if position > 0 {
            list.copy_within(..position, 1);
            list[0] = byte;
        }
        *value = byte;
    }
}

/// Maps `(block type, context id)` to a prefix code index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMap {
    contexts: usize,
    tree_count: u16,
    data: Vec<u8>,
}

impl ContextMap {
    /// Create a map with `contexts` entries per block type
    ///
    /// The data length must be a non-zero multiple of `contexts`, the tree
    /// count must lie in `1..=256`, and every entry must be below it.
    pub fn new(contexts: usize, tree_count: u16, data: Vec<u8>) -> FormatResult<Self> {
        crate::error::ensure_range("tree count", u64::from(tree_count), 1, 256)?;
        if contexts == 0 || data.is_empty() || data.len() % contexts != 0 {
            return Err(FormatError::InvalidContextMap(format!(
                "{} entries is not a multiple of {contexts} contexts",
                data.len()
            )));
        }
        if let Some(&value) = data.iter().find(|&&value| u16::from(value) >= tree_count) {
            return Err(FormatError::InvalidContextMap(format!(
                "entry {value} refers past {tree_count} trees"
            )));
        }
        Ok(Self {
            contexts,
            tree_count,
            data,
        })
    }

    /// Literal context map (64 contexts per block type)
    pub fn literal(tree_count: u16, data: Vec<u8>) -> FormatResult<Self> {
        Self::new(LITERAL_CONTEXTS, tree_count, data)
    }

    /// Distance context map (4 contexts per block type)
    pub fn distance(tree_count: u16, data: Vec<u8>) -> FormatResult<Self> {
        Self::new(DISTANCE_CONTEXTS, tree_count, data)
    }

    /// Map sending every context of every block type to tree 0
    pub fn zeroed(contexts: usize, block_types: u16) -> Self {
        Self {
            contexts,
            tree_count: 1,
            data: vec![0; contexts * usize::from(block_types.max(1))],
        }
    }

    /// Map giving each block type its own tree
    pub fn per_block_type(contexts: usize, block_types: u16) -> Self {
        let block_types = block_types.max(1);
        let data = (0..block_types)
            .flat_map(|block_type| std::iter::repeat_n(block_type as u8, contexts))
            .collect();
        Self {
            contexts,
            tree_count: block_types,
            data,
        }
    }

    /// Number of prefix codes the map refers to (NTREES)
    pub fn tree_count(&self) -> u16 {
        self.tree_count
    }

    /// Contexts per block type
    pub fn contexts(&self) -> usize {
        self.contexts
    }

    /// Number of block types covered
    pub fn block_types(&self) -> usize {
        self.data.len() / self.contexts
    }

    /// Raw table, block type major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Tree index for a block type and context id
    pub fn tree_index(&self, block_type: u16, context_id: u8) -> usize {
        usize::from(self.data[usize::from(block_type) * self.contexts + usize::from(context_id)])
    }

    /// Read NTREES and the map for `block_types` block types
    pub(crate) fn read(reader: &mut BitReader<'_>, contexts: usize, block_types: u16) -> FormatResult<Self> {
        let size = contexts * usize::from(block_types);
        let tree_count = reader.mark_value("NTREES", read_type_count)?;
        if tree_count == 1 {
            return Ok(Self::zeroed(contexts, block_types));
        }
        let rle_max = reader.mark_value("RLEMAX", |r| {
            Ok(if r.read_bit()? { r.read_bits(4)? + 1 } else { 0 })
        })?;
        let tree: HuffmanTree<u16> = HuffmanTree::read_description(reader, u32::from(tree_count) + rle_max)?;
        let mut data = vec![0u8; size];
        reader.mark("context map entries", |r| {
            let mut index = 0usize;
            while index < size {
                let symbol = u32::from(tree.read(r)?);
                if symbol == 0 {
                    index += 1;
                } else if symbol <= rle_max {
                    let run = (1usize << symbol) + r.read_bits(symbol as u8)? as usize;
                    if index + run > size {
                        return Err(FormatError::InvalidContextMap(format!(
                            "zero run of {run} overruns {size} entries"
                        )));
                    }
                    index += run;
                } else {
                    data[index] = (symbol - rle_max) as u8;
                    index += 1;
                }
            }
            Ok(())
        })?;
        if reader.mark_value("IMTF", BitReader::read_bit)? {
            inverse_move_to_front(&mut data);
        }
        Self::new(contexts, tree_count, data)
    }

    /// Write NTREES and the map
    pub(crate) fn write<W: BitSink>(&self, writer: &mut W, params: &SerializationParameters) -> FormatResult<()> {
        write_type_count(writer, self.tree_count)?;
        if self.tree_count == 1 {
            return Ok(());
        }
        let values = if params.context_map_mtf {
            move_to_front(&self.data)
        } else {
            self.data.clone()
        };
        let (rle_max, tokens) = run_length_tokens(&values, params.context_map_rle);
        writer.write_bit(rle_max > 0);
        if rle_max > 0 {
            writer.write_bits(4, rle_max - 1);
        }

        let alphabet = u32::from(self.tree_count) + rle_max;
        let mut histogram = vec![0u32; alphabet as usize];
        for &(symbol, _) in &tokens {
            histogram[symbol as usize] += 1;
        }
        let tree: HuffmanTree<u16> = crate::huffman::tree_from_histogram(&histogram)?;
        tree.write_description(writer, alphabet, params.huffman_tree_rle)?;
        for &(symbol, extra) in &tokens {
            tree.write(writer, symbol as u16)?;
            if symbol > 0 && symbol <= rle_max {
                writer.write_bits(symbol as u8, extra);
            }
        }
        writer.write_bit(params.context_map_mtf);
        Ok(())
    }
}

/// Run-length tokens `(symbol, extra)` and the chosen `RLEMAX`
fn run_length_tokens(values: &[u8], policy: ContextMapRle) -> (u32, Vec<(u32, u32)>) {
    let longest_run = {
        let mut longest = 0usize;
        let mut current = 0usize;
        for &value in values {
            current = if value == 0 { current + 1 } else { 0 };
            longest = longest.max(current);
        }
        longest
    };
    let (rle_max, split) = match policy {
        ContextMapRle::Disable => (0, false),
        ContextMapRle::KeepAll | ContextMapRle::SplitOneAboveBoundary if longest_run == 0 => (0, false),
        ContextMapRle::KeepAll => (floor_log2(longest_run as u32).min(MAX_RLE_PREFIX), false),
        ContextMapRle::SplitOneAboveBoundary => (floor_log2(longest_run as u32).min(MAX_RLE_PREFIX), true),
    };

    let mut tokens = Vec::with_capacity(values.len());
    let mut i = 0usize;
    while i < values.len() {
        if values[i] != 0 {
            tokens.push((u32::from(values[i]) + rle_max, 0));
            i += 1;
            continue;
        }
        let run = values[i..].iter().take_while(|&&v| v == 0).count();
        i += run;
        if rle_max == 0 {
            tokens.extend(std::iter::repeat_n((0, 0), run));
            continue;
        }
        let mut reps = run as u32;
        while reps != 0 {
            if split && reps == 2 << rle_max {
                tokens.push((0, 0));
                reps -= 1;
            } else if reps < 2 << rle_max {
                let prefix = floor_log2(reps);
                tokens.push((prefix, reps - (1 << prefix)));
                break;
            } else {
                tokens.push((rle_max, (1 << rle_max) - 1));
                reps -= (2 << rle_max) - 1;
            }
        }
    }
    (rle_max, tokens)
}
