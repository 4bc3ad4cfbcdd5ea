//! Command section of a compressed meta-block

use super::block_type::{BlockSwitchCommand, BlockSwitchTracker};
use super::context::distance_context_id;
use super::distance::DistanceInfo;
use super::header::CompressedHeader;
use super::insert_copy::InsertCopyCommand;
use super::{Category, PerCategory};
use crate::bit::{BitReader, BitSink};
use crate::error::{FormatError, FormatResult};
use crate::state::GlobalState;

/// Commands of a compressed meta-block and the block switches between them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedData {
    /// Insert&copy commands in stream order
    pub commands: Vec<InsertCopyCommand>,
    /// Block switches per category, in the order they are consumed
    pub block_switches: PerCategory<Vec<BlockSwitchCommand>>,
}

impl CompressedData {
    /// Data with the given commands and no block switches
    pub fn new(commands: Vec<InsertCopyCommand>) -> Self {
        Self {
            commands,
            block_switches: PerCategory::default(),
        }
    }

    /// Bytes the commands produce, counting dictionary words as their copy length
    pub fn nominal_length(&self) -> usize {
        self.commands.iter().map(InsertCopyCommand::output_length).sum()
    }

    /// Read commands until `data_length` bytes are produced
    pub(crate) fn read(
        reader: &mut BitReader<'_>,
        header: &CompressedHeader,
        state: &mut GlobalState,
        data_length: usize,
    ) -> FormatResult<Self> {
        let mut data = Self::default();
        let mut trackers = header.block_types.as_ref().map(BlockSwitchTracker::new);
        let mut produced = 0usize;

        while produced < data_length {
            let command = reader.mark_value("command", |r| {
                let insert_copy_type =
                    trackers.insert_copy.next_read(r, &mut data.block_switches.insert_copy)?;
                let tree = &header.insert_copy_trees[usize::from(insert_copy_type)];
                let (code, insert_length, copy_length) = InsertCopyCommand::read_lengths(r, tree)?;

                if produced + insert_length as usize > data_length {
                    return Err(FormatError::DataLengthMismatch {
                        expected: data_length,
                        actual: produced + insert_length as usize,
                    });
                }
                let mut literals = Vec::with_capacity(insert_length as usize);
                for _ in 0..insert_length {
                    let literal_type = trackers.literal.next_read(r, &mut data.block_switches.literal)?;
                    let (p1, p2) = state.last_bytes();
                    let context = header.literal_context_modes[usize::from(literal_type)].context_id(p1, p2);
                    let tree = &header.literal_trees[header.literal_context_map.tree_index(literal_type, context)];
                    let literal = tree.read(r)?;
                    state.output_literal(literal);
                    literals.push(literal);
                }
                produced += literals.len();
                if produced == data_length {
                    return Ok(InsertCopyCommand::new(literals, copy_length, DistanceInfo::EndsAfterLiterals));
                }

                let info = if code.implicit_zero() {
                    DistanceInfo::ImplicitCodeZero
                } else {
                    let distance_type = trackers.distance.next_read(r, &mut data.block_switches.distance)?;
                    let context = distance_context_id(copy_length);
                    let tree = &header.distance_trees[header.distance_context_map.tree_index(distance_type, context)];
                    DistanceInfo::read(r, tree, header.distance_parameters, state.distances())?.0
                };
                produced += state.apply_copy(info, copy_length)?;
                if produced > data_length {
                    return Err(FormatError::DataLengthMismatch {
                        expected: data_length,
                        actual: produced,
                    });
                }
                Ok(InsertCopyCommand::new(literals, copy_length, info))
            })?;
            data.commands.push(command);
        }
        Ok(data)
    }

    /// Write the commands, replaying them against `state`
    pub(crate) fn write<W: BitSink>(
        &self,
        writer: &mut W,
        header: &CompressedHeader,
        state: &mut GlobalState,
        data_length: usize,
    ) -> FormatResult<()> {
        let mut trackers = header.block_types.as_ref().map(BlockSwitchTracker::new);
        let mut switches = self.block_switches.as_ref().map(|_, list| list.iter());
        let mut produced = 0usize;

        for (index, command) in self.commands.iter().enumerate() {
            if produced >= data_length {
                return Err(FormatError::InvalidModel(format!(
                    "command {index} starts after all {data_length} bytes were produced"
                )));
            }
            let insert_copy_type = trackers.insert_copy.next_write(writer, &mut switches.insert_copy)?;
            command.write_lengths(writer, &header.insert_copy_trees[usize::from(insert_copy_type)])?;

            if produced + command.literals.len() > data_length {
                return Err(FormatError::DataLengthMismatch {
                    expected: data_length,
                    actual: produced + command.literals.len(),
                });
            }
            for &literal in &command.literals {
                let literal_type = trackers.literal.next_write(writer, &mut switches.literal)?;
                let (p1, p2) = state.last_bytes();
                let context = header.literal_context_modes[usize::from(literal_type)].context_id(p1, p2);
                header.literal_trees[header.literal_context_map.tree_index(literal_type, context)]
                    .write(writer, literal)?;
                state.output_literal(literal);
            }
            produced += command.literals.len();

            if command.copy_distance == DistanceInfo::EndsAfterLiterals {
                if produced != data_length {
                    return Err(FormatError::InvalidModel(format!(
                        "command {index} ends the meta-block after {produced} of {data_length} bytes"
                    )));
                }
                continue;
            }
            if produced == data_length {
                return Err(FormatError::InvalidModel(format!(
                    "command {index} copies after the meta-block is complete"
                )));
            }
            if command.copy_distance.reads_distance_code() {
                let distance_type = trackers.distance.next_write(writer, &mut switches.distance)?;
                let context = distance_context_id(command.copy_length);
                let tree = &header.distance_trees[header.distance_context_map.tree_index(distance_type, context)];
                command.copy_distance.write(
                    writer,
                    tree,
                    header.distance_parameters,
                    state.distances(),
                    state.max_distance(),
                )?;
            }
            produced += state.apply_copy(command.copy_distance, command.copy_length)?;
            if produced > data_length {
                return Err(FormatError::DataLengthMismatch {
                    expected: data_length,
                    actual: produced,
                });
            }
        }

        if produced != data_length {
            return Err(FormatError::DataLengthMismatch {
                expected: data_length,
                actual: produced,
            });
        }
        for category in Category::ALL {
            let count = switches[category].len();
            if count > 0 {
                return Err(FormatError::UnusedBlockSwitch {
                    category: category.name(),
                    count,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::BitWriter;
    use crate::huffman::HuffmanTree;
    use crate::model::{
        BlockLengthCode, BlockSwitchCoding, BlockTypeCode, BlockTypeInfo, DistanceCode, DistanceParameters,
        InsertCopyLengthCode, LiteralContextMode,
    };
    use crate::params::WindowSize;
    use pretty_assertions::assert_eq;

    fn full_trees_header() -> CompressedHeader {
        let flat = |n: u32| (0..n).map(|s| (s, 1u32)).collect::<Vec<_>>();
        CompressedHeader::simple(
            DistanceParameters::default(),
            LiteralContextMode::Lsb6,
            HuffmanTree::from_frequencies(flat(256).into_iter().map(|(s, c)| (s as u8, c)), 15).unwrap(),
            HuffmanTree::from_frequencies(
                flat(704).into_iter().map(|(s, c)| (InsertCopyLengthCode(s as u16), c)),
                15,
            )
            .unwrap(),
            HuffmanTree::from_frequencies(flat(64).into_iter().map(|(s, c)| (DistanceCode(s), c)), 15).unwrap(),
        )
    }

    fn state() -> GlobalState {
        GlobalState::new(WindowSize::new(16).unwrap())
    }

    fn round_trip(header: &CompressedHeader, data: &CompressedData, length: usize) -> (CompressedData, Vec<u8>) {
        let mut writer = BitWriter::new();
        data.write(&mut writer, header, &mut state(), length).unwrap();
        let bytes = writer.into_bytes();
        let mut decode_state = state();
        let capture = crate::state::OutputCapture::new();
        decode_state.add_observer(Box::new(capture.clone()));
        let back = CompressedData::read(&mut BitReader::new(&bytes), header, &mut decode_state, length).unwrap();
        (back, capture.take())
    }

    #[test]
    fn test_commands_round_trip() {
        let header = full_trees_header();
        let data = CompressedData::new(vec![
            InsertCopyCommand::new(b"abcd".to_vec(), 8, DistanceInfo::Value(4)),
            // Implicit and explicit code zero reuse distance 4
            InsertCopyCommand::new(b"x".to_vec(), 3, DistanceInfo::ImplicitCodeZero),
            InsertCopyCommand::new(Vec::new(), 2, DistanceInfo::ExplicitCodeZero),
            InsertCopyCommand::literals_only(b"yz".to_vec()),
        ]);
        let (back, output) = round_trip(&header, &data, 20);
        assert_eq!(back, data);
        assert_eq!(output, b"abcdabcdabcdxbcdxbyz");
    }

    #[test]
    fn test_dictionary_reference() {
        let header = full_trees_header();
        // One byte of history, so distance 2 is word id 0: "time"
        let data = CompressedData::new(vec![InsertCopyCommand::new(b"a".to_vec(), 4, DistanceInfo::Value(2))]);
        let (back, output) = round_trip(&header, &data, 5);
        assert_eq!(back, data);
        assert_eq!(output, b"atime");
    }

    #[test]
    fn test_length_mismatch() {
        let header = full_trees_header();
        let data = CompressedData::new(vec![InsertCopyCommand::new(b"ab".to_vec(), 4, DistanceInfo::Value(1))]);
        let mut writer = BitWriter::new();
        let result = data.write(&mut writer, &header, &mut state(), 5);
        assert!(matches!(result, Err(FormatError::DataLengthMismatch { .. })));

        let early_end = CompressedData::new(vec![InsertCopyCommand::literals_only(b"ab".to_vec())]);
        assert!(
            early_end
                .write(&mut BitWriter::new(), &header, &mut state(), 3)
                .is_err()
        );
    }

    #[test]
    fn test_block_switches_round_trip() {
        let mut header = full_trees_header();
        header.block_types.insert_copy = BlockTypeInfo::new(
            2,
            BlockSwitchCoding {
                type_code_tree: HuffmanTree::from_lengths([(BlockTypeCode(1), 1), (BlockTypeCode(0), 1)]).unwrap(),
                length_code_tree: HuffmanTree::single(BlockLengthCode(0)),
                initial_length: 1,
            },
        )
        .unwrap();
        header.insert_copy_trees.push(header.insert_copy_trees[0].clone());

        let mut data = CompressedData::new(vec![
            InsertCopyCommand::new(b"ab".to_vec(), 2, DistanceInfo::Value(2)),
            InsertCopyCommand::new(b"c".to_vec(), 2, DistanceInfo::Value(1)),
            InsertCopyCommand::literals_only(b"d".to_vec()),
        ]);
        data.block_switches.insert_copy = vec![BlockSwitchCommand::new(1, 1), BlockSwitchCommand::new(0, 4)];
        let (back, output) = round_trip(&header, &data, 8);
        assert_eq!(back, data);
        assert_eq!(output, b"ababcccd");

        data.block_switches.insert_copy.push(BlockSwitchCommand::new(1, 1));
        let result = data.write(&mut BitWriter::new(), &header, &mut state(), 8);
        assert!(matches!(result, Err(FormatError::UnusedBlockSwitch { count: 1, .. })));
    }

    #[test]
    fn test_missing_block_switch() {
        let mut header = full_trees_header();
        header.block_types.insert_copy = BlockTypeInfo::new(
            2,
            BlockSwitchCoding {
                type_code_tree: HuffmanTree::single(BlockTypeCode(1)),
                length_code_tree: HuffmanTree::single(BlockLengthCode(0)),
                initial_length: 1,
            },
        )
        .unwrap();
        header.insert_copy_trees.push(header.insert_copy_trees[0].clone());
        let data = CompressedData::new(vec![
            InsertCopyCommand::new(b"ab".to_vec(), 2, DistanceInfo::Value(2)),
            InsertCopyCommand::literals_only(b"c".to_vec()),
        ]);
        let result = data.write(&mut BitWriter::new(), &header, &mut state(), 5);
        assert!(matches!(result, Err(FormatError::MissingBlockSwitch { .. })));
    }
}
