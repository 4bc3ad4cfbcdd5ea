//! Insert&copy length codes and commands

use std::fmt;

use super::distance::DistanceInfo;
use crate::bit::{BitReader, BitSink};
use crate::error::{FormatError, FormatResult};
use crate::huffman::{HuffmanTree, alphabet_newtype};

/// `(base, extra bits)` per insert length code
const INSERT_LENGTH_PREFIX: [(u32, u8); 24] = [
    (0, 0),
    (1, 0),
    (2, 0),
    (3, 0),
    (4, 0),
    (5, 0),
    (6, 1),
    (8, 1),
    (10, 2),
    (14, 2),
    (18, 3),
    (26, 3),
    (34, 4),
    (50, 4),
    (66, 5),
    (98, 5),
    (130, 6),
    (194, 7),
    (322, 8),
    (578, 9),
    (1090, 10),
    (2114, 12),
    (6210, 14),
    (22594, 24),
];

/// `(base, extra bits)` per copy length code
const COPY_LENGTH_PREFIX: [(u32, u8); 24] = [
    (2, 0),
    (3, 0),
    (4, 0),
    (5, 0),
    (6, 0),
    (7, 0),
    (8, 0),
    (9, 0),
    (10, 1),
    (12, 1),
    (14, 2),
    (18, 2),
    (22, 3),
    (30, 3),
    (38, 4),
    (54, 4),
    (70, 5),
    (102, 5),
    (134, 6),
    (198, 7),
    (326, 8),
    (582, 9),
    (1094, 10),
    (2118, 24),
];

/// `(insert code base, copy code base)` per 64-symbol cell
const CELLS: [(u8, u8); 11] = [
    (0, 0),
    (0, 8),
    (0, 0),
    (0, 8),
    (8, 0),
    (8, 8),
    (0, 16),
    (16, 0),
    (8, 16),
    (16, 8),
    (16, 16),
];

/// Cells whose commands use the last distance without reading a distance code
const IMPLICIT_ZERO_CELLS: u16 = 2;

/// Size of the insert&copy alphabet
pub const INSERT_COPY_CODES: u32 = 704;

/// Symbol of the insert&copy alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsertCopyLengthCode(pub u16);
alphabet_newtype!(InsertCopyLengthCode, u16);

impl InsertCopyLengthCode {
    /// Combine insert and copy length codes into a symbol
    ///
    /// `implicit_zero` selects the cells that reuse the last distance; those
    /// only exist for insert codes below 8 and copy codes below 16.
    pub fn new(insert_code: u8, copy_code: u8, implicit_zero: bool) -> Option<Self> {
        if insert_code >= 24 || copy_code >= 24 {
            return None;
        }
        let wanted = (insert_code & !7, copy_code & !7);
        let mut cells = if implicit_zero { 0..IMPLICIT_ZERO_CELLS } else { IMPLICIT_ZERO_CELLS..11 };
        let cell = cells.find(|&cell| CELLS[usize::from(cell)] == wanted)?;
        Some(Self(
            (cell << 6) | (u16::from(insert_code & 7) << 3) | u16::from(copy_code & 7),
        ))
    }

    /// Insert length code
    pub fn insert_code(self) -> u8 {
        CELLS[usize::from(self.0 >> 6)].0 + ((self.0 >> 3) & 7) as u8
    }

    /// Copy length code
    pub fn copy_code(self) -> u8 {
        CELLS[usize::from(self.0 >> 6)].1 + (self.0 & 7) as u8
    }

    /// Whether the command reuses the last distance without a distance code
    pub fn implicit_zero(self) -> bool {
        self.0 >> 6 < IMPLICIT_ZERO_CELLS
    }
}

/// Insert length code, extra bit count and extra value for a length
pub fn insert_length_code(length: u32) -> FormatResult<(u8, u8, u32)> {
    length_code(&INSERT_LENGTH_PREFIX, "insert length", length)
}

/// Copy length code, extra bit count and extra value for a length
pub fn copy_length_code(length: u32) -> FormatResult<(u8, u8, u32)> {
    length_code(&COPY_LENGTH_PREFIX, "copy length", length)
}

fn length_code(table: &[(u32, u8); 24], name: &'static str, length: u32) -> FormatResult<(u8, u8, u32)> {
    let (min, max) = (table[0].0, table[23].0 + (1 << table[23].1) - 1);
    let index = table
        .iter()
        .rposition(|&(base, _)| base <= length)
        .filter(|_| length <= max)
        .ok_or_else(|| FormatError::out_of_range(name, u64::from(length), u64::from(min), u64::from(max)))?;
    let (base, extra_bits) = table[index];
    Ok((index as u8, extra_bits, length - base))
}

/// Inserted literals followed by a copy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InsertCopyCommand {
    /// Literal bytes inserted before the copy
    pub literals: Vec<u8>,
    /// Copy length; still coded when the meta-block ends after the literals
    pub copy_length: u32,
    /// Copy distance
    pub copy_distance: DistanceInfo,
}

impl InsertCopyCommand {
    /// Command inserting `literals` and copying `copy_length` bytes from `copy_distance`
    pub fn new(literals: Vec<u8>, copy_length: u32, copy_distance: DistanceInfo) -> Self {
        Self {
            literals,
            copy_length,
            copy_distance,
        }
    }

    /// Final command of a meta-block that only inserts literals
    ///
    /// The unused copy length is coded as the shortest one.
    pub fn literals_only(literals: Vec<u8>) -> Self {
        Self::new(literals, 4, DistanceInfo::EndsAfterLiterals)
    }

    /// Output bytes produced by the command
    pub fn output_length(&self) -> usize {
        match self.copy_distance {
            DistanceInfo::EndsAfterLiterals => self.literals.len(),
            _ => self.literals.len() + self.copy_length as usize,
        }
    }

    /// Symbols that can start this command, preferred first
    pub fn candidate_codes(&self) -> FormatResult<Vec<InsertCopyLengthCode>> {
        let (insert_code, _, _) = insert_length_code(self.literals.len() as u32)?;
        let (copy_code, _, _) = copy_length_code(self.copy_length)?;
        let implicit = InsertCopyLengthCode::new(insert_code, copy_code, true);
        let explicit = InsertCopyLengthCode::new(insert_code, copy_code, false);
        let codes = match self.copy_distance {
            DistanceInfo::ImplicitCodeZero => vec![implicit],
            DistanceInfo::ExplicitCodeZero | DistanceInfo::Value(_) => vec![explicit],
            DistanceInfo::EndsAfterLiterals => vec![explicit, implicit],
        };
        let codes: Vec<_> = codes.into_iter().flatten().collect();
        if codes.is_empty() {
            return Err(FormatError::InvalidModel(format!(
                "no insert&copy code for insert {} / copy {} with an implicit last distance",
                self.literals.len(),
                self.copy_length
            )));
        }
        Ok(codes)
    }

    /// Read the insert&copy symbol and both lengths
    ///
    /// Returns the symbol, insert length and copy length.
    pub(crate) fn read_lengths(
        reader: &mut BitReader<'_>,
        tree: &HuffmanTree<InsertCopyLengthCode>,
    ) -> FormatResult<(InsertCopyLengthCode, u32, u32)> {
        let code = tree.read(reader)?;
        let (insert_base, insert_extra) = INSERT_LENGTH_PREFIX[usize::from(code.insert_code())];
        let (copy_base, copy_extra) = COPY_LENGTH_PREFIX[usize::from(code.copy_code())];
        let insert_length = insert_base + reader.read_bits(insert_extra)?;
        let copy_length = copy_base + reader.read_bits(copy_extra)?;
        Ok((code, insert_length, copy_length))
    }

    /// Write the insert&copy symbol and both lengths
    pub(crate) fn write_lengths<W: BitSink>(
        &self,
        writer: &mut W,
        tree: &HuffmanTree<InsertCopyLengthCode>,
    ) -> FormatResult<()> {
        let candidates = self.candidate_codes()?;
        let code = candidates
            .iter()
            .copied()
            .find(|&code| tree.contains(code))
            .ok_or(FormatError::SymbolNotInTree {
                tree: "insert&copy",
                symbol: u32::from(candidates[0].0),
            })?;
        let (_, insert_extra_bits, insert_extra) = insert_length_code(self.literals.len() as u32)?;
        let (_, copy_extra_bits, copy_extra) = copy_length_code(self.copy_length)?;
        tree.write(writer, code)?;
        writer.write_bits(insert_extra_bits, insert_extra);
        writer.write_bits(copy_extra_bits, copy_extra);
        Ok(())
    }
}

impl fmt::Display for InsertCopyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insert {}", self.literals.len())?;
        if self.copy_distance != DistanceInfo::EndsAfterLiterals {
            write!(f, ", copy {} from {}", self.copy_length, self.copy_distance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::BitWriter;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cells_cover_alphabet() {
        for symbol in 0..INSERT_COPY_CODES as u16 {
            let code = InsertCopyLengthCode(symbol);
            let back = InsertCopyLengthCode::new(code.insert_code(), code.copy_code(), code.implicit_zero());
            assert_eq!(back, Some(code));
        }
        assert_eq!(InsertCopyLengthCode::new(8, 0, true), None);
        assert_eq!(InsertCopyLengthCode::new(0, 16, true), None);
        assert_eq!(InsertCopyLengthCode::new(24, 0, false), None);
    }

    #[test]
    fn test_known_symbols() {
        assert_eq!(InsertCopyLengthCode::new(0, 0, true), Some(InsertCopyLengthCode(0)));
        assert_eq!(InsertCopyLengthCode::new(0, 0, false), Some(InsertCopyLengthCode(128)));
        assert_eq!(InsertCopyLengthCode::new(0, 16, false), Some(InsertCopyLengthCode(384)));
        assert_eq!(InsertCopyLengthCode::new(23, 23, false), Some(InsertCopyLengthCode(703)));
    }

    #[test]
    fn test_length_codes() {
        assert_eq!(insert_length_code(0).unwrap(), (0, 0, 0));
        assert_eq!(insert_length_code(7).unwrap(), (6, 1, 1));
        assert_eq!(insert_length_code(22594).unwrap(), (23, 24, 0));
        assert_eq!(copy_length_code(2).unwrap(), (0, 0, 0));
        assert_eq!(copy_length_code(11).unwrap(), (8, 1, 1));
        assert_eq!(copy_length_code(2118 + (1 << 24) - 1).unwrap(), (23, 24, (1 << 24) - 1));
        assert!(copy_length_code(1).is_err());
        assert!(copy_length_code(2118 + (1 << 24)).is_err());
    }

    #[test]
    fn test_command_lengths_round_trip() {
        let command = InsertCopyCommand::new(vec![7; 300], 1000, DistanceInfo::Value(42));
        let code = command.candidate_codes().unwrap()[0];
        let tree = HuffmanTree::single(code);
        let mut writer = BitWriter::new();
        command.write_lengths(&mut writer, &tree).unwrap();
        let bytes = writer.into_bytes();
        let (read_code, insert, copy) = InsertCopyCommand::read_lengths(&mut BitReader::new(&bytes), &tree).unwrap();
        assert_eq!(read_code, code);
        assert_eq!((insert, copy), (300, 1000));
        assert!(!code.implicit_zero());
    }

    #[test]
    fn test_ends_after_literals_falls_back_to_implicit_cell() {
        let command = InsertCopyCommand::literals_only(vec![1, 2, 3]);
        let candidates = command.candidate_codes().unwrap();
        assert_eq!(candidates.len(), 2);
        let tree = HuffmanTree::single(candidates[1]);
        command.write_lengths(&mut BitWriter::new(), &tree).unwrap();
        assert_eq!(command.output_length(), 3);
    }

    #[test]
    fn test_implicit_zero_requires_short_codes() {
        let command = InsertCopyCommand::new(vec![0; 20], 4, DistanceInfo::ImplicitCodeZero);
        assert!(command.candidate_codes().is_err());
    }
}
