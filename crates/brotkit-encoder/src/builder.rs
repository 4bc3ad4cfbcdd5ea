//! Compressed meta-block assembly
//!
//! [`Prepared`] replays a meta-block's commands against a copy of the stream
//! state once, recording every symbol together with what selects its prefix
//! code. [`Prepared::build`] then turns those symbols into block splits,
//! context maps and prefix codes for one literal context mode and one set of
//! distance parameters.

use brotkit_format::huffman::{AlphabetSymbol, HuffmanTree, tree_from_histogram};
use brotkit_format::model::{
    BlockSwitchCommand, BlockTypeInfo, CompressedData, CompressedHeader, CompressedMetaBlock, ContextMap,
    DISTANCE_CONTEXTS, DataLength, DistanceInfo, DistanceParameters, DistanceRingBuffer, INSERT_COPY_CODES,
    InsertCopyCommand, LITERAL_CODES, LITERAL_CONTEXTS, LiteralContextMode, MAX_BLOCK_TYPES, MetaBlock,
    PerCategory, distance_context_id,
};
use brotkit_format::{FormatError, FormatResult, GlobalState};

use crate::cluster::cluster_histograms;
use crate::histogram::{Histogram, bits_entropy};
use crate::splitter::{BlockSplit, DISTANCE_SPLIT, INSERT_COPY_SPLIT, LITERAL_SPLIT, split_symbols};
use crate::strategy::EncoderStrategy;

/// Every n-th byte is sampled by the compressibility check
const SAMPLE_RATE: usize = 13;

/// Sampled bits per byte above which a literal-only block is stored
const MIN_ENTROPY: f64 = 7.92;

/// Share of literals above which a block counts as literal-only
const LITERAL_RATIO: f64 = 0.99;

/// Share of valid UTF-8 bytes above which text context modelling is used
const MIN_UTF8_RATIO: f64 = 0.75;

/// `NDIRECT >> NPOSTFIX` values tried by the distance parameter sweep
const DIRECT_CODE_BITS: [u8; 4] = [0, 2, 4, 8];

#[derive(Debug, Clone, Copy)]
struct LiteralSymbol {
    byte: u8,
    p1: u8,
    p2: u8,
}

#[derive(Debug, Clone, Copy)]
struct DistanceSymbol {
    info: DistanceInfo,
    context: u8,
    ring: DistanceRingBuffer,
    max_distance: u32,
}

/// Block splits that do not depend on the distance parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splits {
    literal: BlockSplit,
    insert_copy: BlockSplit,
}

/// Commands of one meta-block with the symbols they produce
#[derive(Debug, Clone)]
pub struct Prepared {
    commands: Vec<InsertCopyCommand>,
    literals: Vec<LiteralSymbol>,
    insert_copy_codes: Vec<usize>,
    distances: Vec<DistanceSymbol>,
    length: usize,
}

impl Prepared {
    /// Replay `commands` after `state` without changing it
    ///
    /// A copy from the last distance becomes distance code zero, implicit
    /// when an insert&copy code without a distance exists for its lengths.
    pub fn new(commands: Vec<InsertCopyCommand>, state: &GlobalState) -> FormatResult<Self> {
        let mut state = state.clone();
        let mut prepared = Self {
            commands: Vec::with_capacity(commands.len()),
            literals: Vec::new(),
            insert_copy_codes: Vec::with_capacity(commands.len()),
            distances: Vec::new(),
            length: 0,
        };

        for mut command in commands {
            for &byte in &command.literals {
                let (p1, p2) = state.last_bytes();
                prepared.literals.push(LiteralSymbol { byte, p1, p2 });
                state.output_literal(byte);
            }
            prepared.length += command.literals.len();

            let max_distance = state.max_distance();
            if let DistanceInfo::Value(distance) = command.copy_distance
                && distance == state.distances().last()
                && distance <= max_distance
            {
                command.copy_distance = DistanceInfo::ImplicitCodeZero;
                if command.candidate_codes().is_err() {
                    command.copy_distance = DistanceInfo::ExplicitCodeZero;
                }
            }
            let code = command.candidate_codes()?[0];
            prepared.insert_copy_codes.push(usize::from(code.0));

            if command.copy_distance.reads_distance_code() {
                prepared.distances.push(DistanceSymbol {
                    info: command.copy_distance,
                    context: distance_context_id(command.copy_length),
                    ring: *state.distances(),
                    max_distance,
                });
            }
            prepared.length += state.apply_copy(command.copy_distance, command.copy_length)?;
            prepared.commands.push(command);
        }
        Ok(prepared)
    }

    /// Commands after last-distance rewriting
    pub fn commands(&self) -> &[InsertCopyCommand] {
        &self.commands
    }

    /// Bytes the commands produce
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of literals
    pub fn literal_count(&self) -> usize {
        self.literals.len()
    }

    /// Block splits for literals and insert&copy codes
    pub fn splits(&self, strategy: &EncoderStrategy) -> Splits {
        if !strategy.split_blocks {
            return Splits {
                literal: BlockSplit::single(self.literals.len()),
                insert_copy: BlockSplit::single(self.insert_copy_codes.len()),
            };
        }
        let bytes: Vec<usize> = self.literals.iter().map(|symbol| usize::from(symbol.byte)).collect();
        Splits {
            literal: split_symbols(&bytes, LITERAL_CODES as usize, LITERAL_SPLIT, MAX_BLOCK_TYPES),
            insert_copy: split_symbols(
                &self.insert_copy_codes,
                INSERT_COPY_CODES as usize,
                INSERT_COPY_SPLIT,
                MAX_BLOCK_TYPES,
            ),
        }
    }

    /// Build the compressed meta-block for one context mode and distance parameters
    ///
    /// Fails with a range error when a distance has no code under `params`.
    pub fn build(
        &self,
        mode: LiteralContextMode,
        params: DistanceParameters,
        splits: &Splits,
        strategy: &EncoderStrategy,
    ) -> FormatResult<MetaBlock> {
        let distance_codes = self.distance_codes(params)?;
        let distance_split = if strategy.split_blocks {
            split_symbols(
                &distance_codes,
                params.alphabet_size() as usize,
                DISTANCE_SPLIT,
                MAX_BLOCK_TYPES,
            )
        } else {
            BlockSplit::single(distance_codes.len())
        };

        let literal_types = splits.literal.type_count();
        let mut literal_histograms =
            vec![Histogram::new(LITERAL_CODES as usize); usize::from(literal_types) * LITERAL_CONTEXTS];
        for (symbol, block_type) in self.literals.iter().zip(splits.literal.symbol_types()) {
            let context = mode.context_id(symbol.p1, symbol.p2);
            literal_histograms[usize::from(block_type) * LITERAL_CONTEXTS + usize::from(context)]
                .add(usize::from(symbol.byte));
        }
        let literal_clusters =
            cluster_histograms(&literal_histograms, LITERAL_CONTEXTS, usize::from(strategy.max_literal_trees));

        let mut insert_copy_histograms =
            vec![Histogram::new(INSERT_COPY_CODES as usize); usize::from(splits.insert_copy.type_count())];
        for (&code, block_type) in self.insert_copy_codes.iter().zip(splits.insert_copy.symbol_types()) {
            insert_copy_histograms[usize::from(block_type)].add(code);
        }

        let distance_types = distance_split.type_count();
        let mut distance_histograms =
            vec![Histogram::new(params.alphabet_size() as usize); usize::from(distance_types) * DISTANCE_CONTEXTS];
        for ((&code, symbol), block_type) in distance_codes
            .iter()
            .zip(&self.distances)
            .zip(distance_split.symbol_types())
        {
            distance_histograms[usize::from(block_type) * DISTANCE_CONTEXTS + usize::from(symbol.context)].add(code);
        }
        let distance_clusters = cluster_histograms(
            &distance_histograms,
            DISTANCE_CONTEXTS,
            usize::from(strategy.max_distance_trees),
        );

        let (literal_info, literal_switches) = splits.literal.coding()?;
        let (insert_copy_info, insert_copy_switches) = splits.insert_copy.coding()?;
        let (distance_info, distance_switches) = distance_split.coding()?;
        let header = CompressedHeader {
            block_types: PerCategory::<BlockTypeInfo>::new(literal_info, insert_copy_info, distance_info),
            distance_parameters: params,
            literal_context_modes: vec![mode; usize::from(literal_types)],
            literal_context_map: ContextMap::literal(
                literal_clusters.histograms.len() as u16,
                literal_clusters.map,
            )?,
            distance_context_map: ContextMap::distance(
                distance_clusters.histograms.len() as u16,
                distance_clusters.map,
            )?,
            literal_trees: trees(&literal_clusters.histograms)?,
            insert_copy_trees: trees(&insert_copy_histograms)?,
            distance_trees: trees(&distance_clusters.histograms)?,
        };
        let data = CompressedData {
            commands: self.commands.clone(),
            block_switches: PerCategory::<Vec<BlockSwitchCommand>>::new(
                literal_switches,
                insert_copy_switches,
                distance_switches,
            ),
        };
        Ok(MetaBlock::Compressed(Box::new(CompressedMetaBlock {
            is_last: false,
            data_length: DataLength::new(self.length as u32)?,
            header,
            data,
        })))
    }

    /// Preferred distance code of every distance symbol
    fn distance_codes(&self, params: DistanceParameters) -> FormatResult<Vec<usize>> {
        self.distances
            .iter()
            .map(|symbol| {
                symbol
                    .info
                    .candidate_codes(params, &symbol.ring, symbol.max_distance)
                    .first()
                    .map(|&(code, _)| code.0 as usize)
                    .ok_or_else(|| FormatError::OutOfRange {
                        name: "distance",
                        value: match symbol.info {
                            DistanceInfo::Value(distance) => u64::from(distance),
                            _ => 0,
                        },
                        min: 1,
                        max: u64::from(params.max_distance()),
                    })
            })
            .collect()
    }

    /// Whether entropy coding can beat storing the block
    ///
    /// Blocks that are nearly all literals are sampled; when the sample looks
    /// like noise the block is stored without trying to compress it.
    pub fn should_compress(&self, data: &[u8]) -> bool {
        let bytes = data.len();
        if self.commands.len() < (bytes >> 8) + 2 && self.literals.len() as f64 > LITERAL_RATIO * bytes as f64 {
            let mut counts = [0u32; 256];
            for &byte in data.iter().step_by(SAMPLE_RATE) {
                counts[usize::from(byte)] += 1;
            }
            let threshold = bytes as f64 * MIN_ENTROPY / SAMPLE_RATE as f64;
            if bits_entropy(&counts) > threshold {
                return false;
            }
        }
        true
    }
}

fn trees<T: AlphabetSymbol>(histograms: &[Histogram]) -> FormatResult<Vec<HuffmanTree<T>>> {
    histograms
        .iter()
        .map(|histogram| tree_from_histogram(histogram.counts()))
        .collect()
}

/// Literal context mode for data: UTF-8 classes for text, signed buckets otherwise
pub fn guess_context_mode(data: &[u8]) -> LiteralContextMode {
    let valid: usize = data.utf8_chunks().map(|chunk| chunk.valid().len()).sum();
    if valid as f64 >= MIN_UTF8_RATIO * data.len() as f64 {
        LiteralContextMode::Utf8
    } else {
        LiteralContextMode::Signed
    }
}

/// Context modes a strategy tries for `data`
pub fn context_mode_candidates(data: &[u8], strategy: &EncoderStrategy) -> Vec<LiteralContextMode> {
    if strategy.sweep_context_modes {
        LiteralContextMode::ALL.to_vec()
    } else {
        vec![guess_context_mode(data)]
    }
}

/// Distance parameters a strategy tries
pub fn distance_parameter_candidates(strategy: &EncoderStrategy) -> FormatResult<Vec<DistanceParameters>> {
    if !strategy.sweep_distance_parameters {
        return Ok(vec![DistanceParameters::default()]);
    }
    (0..=3u8)
        .flat_map(|postfix_bits| DIRECT_CODE_BITS.map(|direct_code_bits| (postfix_bits, direct_code_bits)))
        .map(|(postfix_bits, direct_code_bits)| DistanceParameters::new(postfix_bits, direct_code_bits))
        .collect()
}
