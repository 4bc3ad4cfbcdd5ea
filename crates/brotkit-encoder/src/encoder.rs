//! Whole-stream encoding

use brotkit_format::model::{DistanceParameters, InsertCopyCommand, MetaBlock};
use brotkit_format::{BrotliFile, FileParameters, GlobalState, SerializationParameters};
use tracing::{debug, warn};

use crate::builder::{Prepared, context_mode_candidates, distance_parameter_candidates};
use crate::error::{EncodeError, EncodeResult};
use crate::matcher::Matcher;
use crate::selection::pick_smallest;
use crate::strategy::{EncoderStrategy, MatchMode};

/// Encode `input` into a stream model
///
/// The input is cut into meta-blocks of at most
/// [`EncoderStrategy::meta_block_size`] bytes. Every meta-block is replayed
/// against the stream state before it is kept, and the stream ends with a
/// [`MetaBlock::LastEmpty`].
pub fn encode(input: &[u8], params: FileParameters, strategy: &EncoderStrategy) -> EncodeResult<BrotliFile> {
    strategy.validate()?;
    let window_size = params.window_size;
    let mut state = GlobalState::new(window_size);
    let mut matcher = matches!(strategy.mode, MatchMode::Greedy | MatchMode::Lazy)
        .then(|| Matcher::new(input, strategy, window_size.window_bytes()));
    let mut meta_blocks = Vec::new();
    let mut position = 0;

    while position < input.len() {
        let limit = input.len().min(position + strategy.meta_block_size());
        let (block, end) = match (strategy.mode, matcher.as_mut()) {
            (MatchMode::Uncompressed, _) => (
                MetaBlock::Uncompressed {
                    data: input[position..limit].to_vec(),
                },
                limit,
            ),
            (_, Some(matcher)) => {
                let (commands, end) = matcher.commands(position, limit, *state.distances());
                (encode_block(&input[position..end], commands, &state, strategy)?, end)
            }
            (_, None) => {
                let commands = vec![InsertCopyCommand::literals_only(input[position..limit].to_vec())];
                (encode_block(&input[position..limit], commands, &state, strategy)?, limit)
            }
        };

        let mut out = Vec::with_capacity(end - position);
        block.decompress_into(&mut state, &mut out)?;
        if let Some(offset) = first_difference(&out, &input[position..end]) {
            return Err(EncodeError::OutputMismatch {
                offset: position + offset,
            });
        }
        debug!(
            "Encoded {} meta-block: input bytes {}..{}",
            block.kind(),
            position,
            end
        );
        meta_blocks.push(block);
        position = end;
    }

    meta_blocks.push(MetaBlock::LastEmpty);
    Ok(BrotliFile::new(window_size, meta_blocks))
}

/// Encode and serialize `input` with the default window
///
/// With [`EncoderStrategy::sweep_serialization`] the smallest of all
/// serialization parameter combinations is written.
pub fn compress(input: &[u8], strategy: &EncoderStrategy) -> EncodeResult<Vec<u8>> {
    let file = encode(input, FileParameters::default(), strategy)?;
    if !strategy.sweep_serialization {
        return Ok(file.serialize(&SerializationParameters::default())?);
    }
    let selected = pick_smallest(
        "serialization parameters",
        &SerializationParameters::all_combinations(),
        |params| Ok(file.serialize(params)?),
        |bytes| Ok(bytes.len()),
    )?;
    Ok(selected.value)
}

/// Turn one meta-block's commands into the cheapest block that stores them
fn encode_block(
    data: &[u8],
    commands: Vec<InsertCopyCommand>,
    state: &GlobalState,
    strategy: &EncoderStrategy,
) -> EncodeResult<MetaBlock> {
    let stored = || MetaBlock::Uncompressed { data: data.to_vec() };
    let prepared = Prepared::new(commands, state)?;
    if !prepared.should_compress(data) {
        debug!("Storing {} bytes that sample as incompressible", data.len());
        return Ok(stored());
    }

    let splits = prepared.splits(strategy);
    let measure = |block: &MetaBlock| -> EncodeResult<usize> {
        Ok(block.serialized_bit_length(&mut state.clone(), &SerializationParameters::default())?)
    };
    let modes = context_mode_candidates(data, strategy);
    let by_mode = pick_smallest(
        "literal context mode",
        &modes,
        |&mode| Ok(prepared.build(mode, DistanceParameters::default(), &splits, strategy)?),
        measure,
    )?;
    let best = if strategy.sweep_distance_parameters {
        let mode = by_mode.candidate;
        let selected = pick_smallest(
            "distance parameters",
            &distance_parameter_candidates(strategy)?,
            |&params| Ok(prepared.build(mode, params, &splits, strategy)?),
            measure,
        )?;
        (selected.value, selected.cost)
    } else {
        (by_mode.value, by_mode.cost)
    };

    let raw = stored();
    let raw_cost = measure(&raw)?;
    if best.1 > raw_cost {
        warn!(
            "Compressed meta-block needs {} bits, storing {} bytes raw in {} bits",
            best.1,
            data.len(),
            raw_cost
        );
        return Ok(raw);
    }
    Ok(best.0)
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then_some(a.len().min(b.len())))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use brotkit_format::WindowSize;
    use brotkit_format::test_utils::{Corpus, noise, text};
    use pretty_assertions::assert_eq;

    fn strategies() -> Vec<EncoderStrategy> {
        vec![
            EncoderStrategy::uncompressed(),
            EncoderStrategy::literals_only(),
            EncoderStrategy::greedy(),
            EncoderStrategy::lazy(),
            EncoderStrategy::best(),
        ]
    }

    #[test]
    fn test_empty_input_is_one_last_empty_block() {
        for strategy in strategies() {
            let file = encode(&[], FileParameters::default(), &strategy).unwrap();
            assert_eq!(file.meta_blocks, vec![MetaBlock::LastEmpty]);
            let bytes = compress(&[], &strategy).unwrap();
            assert_eq!(BrotliFile::decode(&bytes).unwrap().decompress().unwrap(), Vec::<u8>::new());
        }
    }

    #[test]
    fn test_repeated_bytes_every_strategy() {
        let input = vec![b'A'; 1000];
        for strategy in strategies() {
            let bytes = compress(&input, &strategy).unwrap();
            assert_eq!(BrotliFile::decode(&bytes).unwrap().decompress().unwrap(), input);
        }
        let lazy = compress(&input, &EncoderStrategy::lazy()).unwrap();
        assert!(lazy.len() < 32, "1000 equal bytes took {} bytes", lazy.len());
    }

    #[test]
    fn test_corpora_round_trip() {
        for corpus in Corpus::ALL {
            let input = corpus.generate(40_000, 17);
            for strategy in strategies() {
                let file = encode(&input, FileParameters::default(), &strategy).unwrap();
                assert_eq!(file.decompress().unwrap(), input, "{corpus:?} with {:?}", strategy.mode);
                let bytes = file.serialize(&SerializationParameters::default()).unwrap();
                assert_eq!(BrotliFile::decode(&bytes).unwrap(), file);
            }
        }
    }

    #[test]
    fn test_small_blocks_and_window() {
        let input = text(200_000, 4);
        let strategy = EncoderStrategy::lazy().with_block_size_bits(16);
        let params = FileParameters::new(WindowSize::new(16).unwrap());
        let file = encode(&input, params, &strategy).unwrap();
        assert!(file.meta_blocks.len() >= 4);
        assert_eq!(file.decompress().unwrap(), input);
    }

    #[test]
    fn test_noise_is_stored() {
        let input = noise(100_000, 6);
        let file = encode(&input, FileParameters::default(), &EncoderStrategy::lazy()).unwrap();
        assert!(
            file.meta_blocks
                .iter()
                .all(|block| matches!(block, MetaBlock::Uncompressed { .. } | MetaBlock::LastEmpty))
        );
    }

    #[test]
    fn test_compression_beats_storage_on_text() {
        let input = text(100_000, 8);
        let stored = compress(&input, &EncoderStrategy::uncompressed()).unwrap();
        let greedy = compress(&input, &EncoderStrategy::greedy()).unwrap();
        let best = compress(&input, &EncoderStrategy::best()).unwrap();
        assert!(greedy.len() < stored.len() / 2);
        assert!(best.len() < stored.len() / 2);
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let strategy = EncoderStrategy {
            hash_len: 9,
            ..EncoderStrategy::default()
        };
        assert!(matches!(
            encode(b"abc", FileParameters::default(), &strategy),
            Err(EncodeError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"ab", b"abc"), Some(2));
    }
}
