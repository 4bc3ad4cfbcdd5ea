//! Greedy block splitting of symbol streams
//!
//! Symbols are gathered into blocks of at least `min_block_size`. A finished
//! block either becomes a new block type, joins the second-to-last type, or
//! extends the last one, whichever the entropy of the combined histograms
//! favours.

use brotkit_format::FormatResult;
use brotkit_format::huffman::tree_from_histogram;
use brotkit_format::model::{
    BLOCK_LENGTH_CODES, BlockLengthCode, BlockSwitchCoding, BlockSwitchCommand, BlockTypeInfo,
    BlockTypeTracker, MAX_BLOCK_TYPES,
};

use crate::histogram::Histogram;

/// Entropy difference below which a block rejoins the second-to-last type
const SECOND_LAST_MARGIN: f64 = 20.0;

/// Thresholds of the greedy splitter for one symbol category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitParameters {
    /// Symbols per block before a split is considered
    pub min_block_size: usize,
    /// Bits a new block type must save against both recent types
    pub split_threshold: f64,
}

/// Literal splitting thresholds
pub const LITERAL_SPLIT: SplitParameters = SplitParameters {
    min_block_size: 512,
    split_threshold: 400.0,
};

/// Insert&copy splitting thresholds
pub const INSERT_COPY_SPLIT: SplitParameters = SplitParameters {
    min_block_size: 1024,
    split_threshold: 500.0,
};

/// Distance splitting thresholds
pub const DISTANCE_SPLIT: SplitParameters = SplitParameters {
    min_block_size: 512,
    split_threshold: 100.0,
};

/// Block types of one symbol stream as runs of `(block type, length)`
///
/// Block types are numbered in order of first use, so the first run is
/// always type 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSplit {
    type_count: u16,
    runs: Vec<(u16, u32)>,
}

impl BlockSplit {
    /// A single block type covering `length` symbols
    pub fn single(length: usize) -> Self {
        Self {
            type_count: 1,
            runs: if length == 0 {
                Vec::new()
            } else {
                vec![(0, length as u32)]
            },
        }
    }

    /// Number of block types
    pub fn type_count(&self) -> u16 {
        self.type_count
    }

    /// Runs of `(block type, length)`
    pub fn runs(&self) -> &[(u16, u32)] {
        &self.runs
    }

    /// Block type of every symbol, in order
    pub fn symbol_types(&self) -> Vec<u16> {
        self.runs
            .iter()
            .flat_map(|&(block_type, length)| std::iter::repeat_n(block_type, length as usize))
            .collect()
    }

    /// Block type information and switch commands for the header and data
    pub fn coding(&self) -> FormatResult<(BlockTypeInfo, Vec<BlockSwitchCommand>)> {
        let Some((&(_, initial_length), rest)) = self.runs.split_first() else {
            return Ok((BlockTypeInfo::single(), Vec::new()));
        };
        if self.type_count < 2 {
            return Ok((BlockTypeInfo::single(), Vec::new()));
        }
        let mut tracker = BlockTypeTracker::new(self.type_count);
        let mut type_histogram = vec![0u32; usize::from(self.type_count) + 2];
        let mut length_histogram = vec![0u32; BLOCK_LENGTH_CODES as usize];
        length_histogram[usize::from(BlockLengthCode::for_length(initial_length)?.0.0)] += 1;

        let mut switches = Vec::with_capacity(rest.len());
        for &(block_type, length) in rest {
            let code = tracker.next_code(block_type)?;
            type_histogram[usize::from(code.0)] += 1;
            length_histogram[usize::from(BlockLengthCode::for_length(length)?.0.0)] += 1;
            switches.push(BlockSwitchCommand::new(block_type, length));
        }
        let info = BlockTypeInfo::new(
            self.type_count,
            BlockSwitchCoding {
                type_code_tree: tree_from_histogram(&type_histogram)?,
                length_code_tree: tree_from_histogram(&length_histogram)?,
                initial_length,
            },
        )?;
        Ok((info, switches))
    }
}

/// Greedy splitter state
struct Splitter {
    params: SplitParameters,
    alphabet_size: usize,
    max_types: u16,
    histograms: Vec<Histogram>,
    current: Histogram,
    block_size: usize,
    target_block_size: usize,
    merge_last_count: usize,
    last_types: [u16; 2],
    last_entropy: [f64; 2],
    runs: Vec<(u16, u32)>,
}

impl Splitter {
    fn new(alphabet_size: usize, params: SplitParameters, max_types: u16) -> Self {
        Self {
            params,
            alphabet_size,
            max_types,
            histograms: Vec::new(),
            current: Histogram::new(alphabet_size),
            block_size: 0,
            target_block_size: params.min_block_size,
            merge_last_count: 0,
            last_types: [0, 0],
            last_entropy: [0.0, 0.0],
            runs: Vec::new(),
        }
    }

    fn add(&mut self, symbol: usize) {
        self.current.add(symbol);
        self.block_size += 1;
        if self.block_size == self.target_block_size {
            self.finish_block();
        }
    }

    fn finish_block(&mut self) {
        if self.block_size == 0 {
            return;
        }
        let length = self.block_size as u32;
        let current = std::mem::replace(&mut self.current, Histogram::new(self.alphabet_size));
        self.block_size = 0;

        if self.runs.is_empty() {
            let entropy = current.bits_entropy();
            self.histograms.push(current);
            self.runs.push((0, length));
            self.last_entropy = [entropy, entropy];
            return;
        }

        let entropy = current.bits_entropy();
        let combined = self
            .last_types
            .map(|block_type| current.merged(&self.histograms[usize::from(block_type)]));
        let combined_entropy = [combined[0].bits_entropy(), combined[1].bits_entropy()];
        let diff = [
            combined_entropy[0] - entropy - self.last_entropy[0],
            combined_entropy[1] - entropy - self.last_entropy[1],
        ];
        let [combined_last, combined_second_last] = combined;

        if (self.histograms.len() as u16) < self.max_types
            && diff[0] > self.params.split_threshold
            && diff[1] > self.params.split_threshold
        {
            let block_type = self.histograms.len() as u16;
            self.histograms.push(current);
            self.runs.push((block_type, length));
            self.last_types = [block_type, self.last_types[0]];
            self.last_entropy = [entropy, self.last_entropy[0]];
            self.merge_last_count = 0;
            self.target_block_size = self.params.min_block_size;
        } else if diff[1] < diff[0] - SECOND_LAST_MARGIN {
            let block_type = self.last_types[1];
            self.histograms[usize::from(block_type)] = combined_second_last;
            self.runs.push((block_type, length));
            self.last_types = [block_type, self.last_types[0]];
            self.last_entropy = [combined_entropy[1], self.last_entropy[0]];
            self.merge_last_count = 0;
            self.target_block_size = self.params.min_block_size;
        } else {
            self.histograms[usize::from(self.last_types[0])] = combined_last;
            if let Some(run) = self.runs.last_mut() {
                run.1 += length;
            }
            self.last_entropy[0] = combined_entropy[0];
            if self.histograms.len() == 1 {
                self.last_entropy[1] = self.last_entropy[0];
            }
            self.merge_last_count += 1;
            if self.merge_last_count > 1 {
                self.target_block_size += self.params.min_block_size;
            }
        }
    }

    fn finish(mut self) -> BlockSplit {
        self.finish_block();
        BlockSplit {
            type_count: (self.histograms.len() as u16).max(1),
            runs: self.runs,
        }
    }
}

/// Split a symbol stream into block types
///
/// `max_types` is clamped to the format limit of 256 block types.
pub fn split_symbols(
    symbols: &[usize],
    alphabet_size: usize,
    params: SplitParameters,
    max_types: u16,
) -> BlockSplit {
    let mut splitter = Splitter::new(alphabet_size, params, max_types.clamp(1, MAX_BLOCK_TYPES));
    for &symbol in symbols {
        splitter.add(symbol);
    }
    splitter.finish()
}
