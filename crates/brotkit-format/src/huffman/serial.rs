//! Prefix code descriptions as they appear in the bitstream
//!
//! A description is either *simple* (up to four listed symbols with a fixed
//! length shape) or *complex* (code lengths run-length coded with a second,
//! 18-symbol prefix code).

use super::symbol::AlphabetSymbol;
use super::tree::{HuffmanTree, MAX_CODE_LENGTH};
use crate::bit::{BitReader, BitSink, alphabet_bits};
use crate::error::{FormatError, FormatResult};
use crate::params::HuffmanTreeRle;

/// Storage order of the code length code lengths
pub const CODE_LENGTH_ORDER: [usize; 18] = [1, 2, 3, 4, 0, 5, 17, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15];

const CODE_LENGTH_CODES: usize = 18;
const REPEAT_PREVIOUS: u8 = 16;
const REPEAT_ZERO: u8 = 17;
const INITIAL_REPEATED_LENGTH: u8 = 8;
const MAX_CODE_LENGTH_CODE_LENGTH: u8 = 5;
/// Alphabets at most this long never use repeat codes under the reference heuristic
const RLE_MIN_ALPHABET: usize = 50;

/// Fixed prefix code for code length code lengths: `(bits, count)` indexed by
/// length, bits packed in stream order
const CODE_LENGTH_LENGTH_CODES: [(u32, u8); 6] = [
    (0b00, 2),
    (0b0111, 4),
    (0b011, 3),
    (0b10, 2),
    (0b01, 2),
    (0b1111, 4),
];

impl<T: AlphabetSymbol> HuffmanTree<T> {
    /// Read a prefix code description over `0..alphabet_size`
    pub fn read_description(reader: &mut BitReader<'_>, alphabet_size: u32) -> FormatResult<Self> {
        reader.mark("prefix code", |r| {
            let hskip = r.mark_value("HSKIP", |r| r.read_bits(2))?;
            if hskip == 1 {
                read_simple(r, alphabet_size)
            } else {
                read_complex(r, hskip as usize, alphabet_size)
            }
        })
    }

    /// Write the description of this tree over `0..alphabet_size`
    ///
    /// Trees with at most four symbols use the simple form; larger trees use
    /// the complex form with the given run-length policy.
    pub fn write_description<W: BitSink>(
        &self,
        writer: &mut W,
        alphabet_size: u32,
        policy: HuffmanTreeRle,
    ) -> FormatResult<()> {
        if let Some(symbol) = self.symbols().find(|s| s.to_index() >= alphabet_size) {
            return Err(FormatError::out_of_range(
                "tree symbol",
                u64::from(symbol.to_index()),
                0,
                u64::from(alphabet_size) - 1,
            ));
        }
        if self.len() <= 4 {
            write_simple(self, writer, alphabet_size);
            Ok(())
        } else {
            write_complex(self, writer, alphabet_size, policy)
        }
    }
}

fn read_simple<T: AlphabetSymbol>(reader: &mut BitReader<'_>, alphabet_size: u32) -> FormatResult<HuffmanTree<T>> {
    let count = reader.mark_value("NSYM", |r| Ok(r.read_bits(2)? + 1))?;
    let bits = alphabet_bits(alphabet_size);
    let mut symbols = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let symbol = reader.mark_value("symbol", |r| r.read_bits(bits))?;
        if symbol >= alphabet_size {
            return Err(FormatError::InvalidHuffmanCode(format!(
                "simple code symbol {symbol} outside alphabet of {alphabet_size}"
            )));
        }
        if symbols.contains(&symbol) {
            return Err(FormatError::InvalidHuffmanCode(format!(
                "simple code lists symbol {symbol} twice"
            )));
        }
        symbols.push(symbol);
    }
    let lengths: &[u8] = match count {
        1 => return Ok(HuffmanTree::single(T::from_index(symbols[0]))),
        2 => &[1, 1],
        3 => &[1, 2, 2],
        _ => {
            if reader.mark_value("tree-select", BitReader::read_bit)? {
                &[1, 2, 3, 3]
            } else {
                &[2, 2, 2, 2]
            }
        }
    };
    HuffmanTree::from_lengths(
        symbols
            .iter()
            .map(|&s| T::from_index(s))
            .zip(lengths.iter().copied()),
    )
}

fn write_simple<T: AlphabetSymbol, W: BitSink>(tree: &HuffmanTree<T>, writer: &mut W, alphabet_size: u32) {
    let bits = alphabet_bits(alphabet_size);
    writer.write_bits(2, 1);
    writer.write_bits(2, tree.len() as u32 - 1);
    // Canonical order lists the shortest code first, ties by symbol value
    for symbol in tree.symbols() {
        writer.write_bits(bits, symbol.to_index());
    }
    if tree.len() == 4 {
        writer.write_bit(tree.max_code_length() == 3);
    }
}

fn read_code_length_code_length(reader: &mut BitReader<'_>) -> FormatResult<u8> {
    let first = reader.read_bit()?;
    let second = reader.read_bit()?;
    Ok(match (first, second) {
        (false, false) => 0,
        (true, false) => 4,
        (false, true) => 3,
        (true, true) => {
            if !reader.read_bit()? {
                2
            } else if reader.read_bit()? {
                5
            } else {
                1
            }
        }
    })
}

fn read_complex<T: AlphabetSymbol>(
    reader: &mut BitReader<'_>,
    hskip: usize,
    alphabet_size: u32,
) -> FormatResult<HuffmanTree<T>> {
    let length_code = reader.mark("code length code", |r| {
        let mut lengths = [0u8; CODE_LENGTH_CODES];
        let mut space = 32i32;
        let mut codes = 0usize;
        for &symbol in &CODE_LENGTH_ORDER[hskip..] {
            let len = read_code_length_code_length(r)?;
            lengths[symbol] = len;
            if len != 0 {
                space -= 32 >> len;
                codes += 1;
                if space <= 0 {
                    break;
                }
            }
        }
        if codes != 1 && space != 0 {
            return Err(FormatError::InvalidCodeLengths(format!(
                "code length code leaves {space} of 32 units"
            )));
        }
        HuffmanTree::<u8>::from_lengths((0..CODE_LENGTH_CODES as u8).zip(lengths))
    })?;

    let lengths = reader.mark("symbol code lengths", |r| {
        read_symbol_lengths(r, &length_code, alphabet_size as usize)
    })?;
    HuffmanTree::from_lengths(
        lengths
            .iter()
            .enumerate()
            .map(|(index, &len)| (T::from_index(index as u32), len)),
    )
}

fn read_symbol_lengths(
    reader: &mut BitReader<'_>,
    length_code: &HuffmanTree<u8>,
    alphabet_size: usize,
) -> FormatResult<Vec<u8>> {
    let mut lengths = vec![0u8; alphabet_size];
    let mut symbol = 0usize;
    let mut previous = INITIAL_REPEATED_LENGTH;
    let mut repeat = 0u32;
    let mut repeat_len = 0u8;
    let mut space = 1i32 << MAX_CODE_LENGTH;
    while symbol < alphabet_size && space > 0 {
        let code = length_code.read(reader)?;
        if code < REPEAT_PREVIOUS {
            repeat = 0;
            lengths[symbol] = code;
            symbol += 1;
            if code != 0 {
                previous = code;
                space -= (1i32 << MAX_CODE_LENGTH) >> code;
            }
            continue;
        }
        let (extra_bits, new_len) = if code == REPEAT_PREVIOUS {
            (2, previous)
        } else {
            (3, 0)
        };
        if repeat_len != new_len {
            repeat = 0;
            repeat_len = new_len;
        }
        let old_repeat = repeat;
        if repeat > 0 {
            repeat = (repeat - 2) << extra_bits;
        }
        repeat += reader.read_bits(extra_bits)? + 3;
        let delta = (repeat - old_repeat) as usize;
        if symbol + delta > alphabet_size {
            return Err(FormatError::InvalidCodeLengths(format!(
                "repeat of {delta} overruns alphabet of {alphabet_size} at symbol {symbol}"
            )));
        }
        lengths[symbol..symbol + delta].fill(repeat_len);
        symbol += delta;
        if repeat_len != 0 {
            space -= (delta as i32) << (MAX_CODE_LENGTH - repeat_len);
        }
    }
    if space != 0 {
        return Err(FormatError::InvalidCodeLengths(format!(
            "symbol code lengths leave {space} of 32768 units"
        )));
    }
    Ok(lengths)
}

/// Run-length tokens `(symbol, extra bits value)` for a code length table
pub(crate) fn code_length_tokens(lengths: &[u8], alphabet_size: usize, policy: HuffmanTreeRle) -> Vec<(u8, u8)> {
    let end = lengths.iter().rposition(|&len| len != 0).map_or(0, |i| i + 1);
    let lengths = &lengths[..end];
    let (rle_zero, rle_nonzero, split) = match policy {
        HuffmanTreeRle::Disable => (false, false, false),
        HuffmanTreeRle::KeepAll => (true, true, false),
        HuffmanTreeRle::SplitOneAboveBoundary => (true, true, true),
        HuffmanTreeRle::OfficialHeuristic => {
            let (zero, nonzero) = if alphabet_size > RLE_MIN_ALPHABET {
                decide_rle_use(lengths)
            } else {
                (false, false)
            };
            (zero, nonzero, true)
        }
    };

    let mut tokens = Vec::with_capacity(lengths.len());
    let mut previous = INITIAL_REPEATED_LENGTH;
    let mut i = 0usize;
    while i < lengths.len() {
        let value = lengths[i];
        let run = lengths[i..].iter().take_while(|&&len| len == value).count();
        let use_rle = if value == 0 { rle_zero } else { rle_nonzero };
        let reps = if use_rle { run } else { 1 };
        if value == 0 {
            push_zero_repetitions(&mut tokens, reps, split);
        } else {
            push_repetitions(&mut tokens, previous, value, reps, split);
            previous = value;
        }
        i += reps;
    }
    tokens
}

fn decide_rle_use(lengths: &[u8]) -> (bool, bool) {
    let mut total_zero = 0usize;
    let mut total_nonzero = 0usize;
    let mut count_zero = 1usize;
    let mut count_nonzero = 1usize;
    let mut i = 0usize;
    while i < lengths.len() {
        let value = lengths[i];
        let reps = lengths[i..].iter().take_while(|&&len| len == value).count();
        if value == 0 && reps >= 3 {
            total_zero += reps;
            count_zero += 1;
        }
        if value != 0 && reps >= 4 {
            total_nonzero += reps;
            count_nonzero += 1;
        }
        i += reps;
    }
    (total_zero > count_zero * 2, total_nonzero > count_nonzero * 2)
}

fn push_repetitions(tokens: &mut Vec<(u8, u8)>, previous: u8, value: u8, mut reps: usize, split: bool) {
    if previous != value {
        tokens.push((value, 0));
        reps -= 1;
    }
    if split && reps == 7 {
        tokens.push((value, 0));
        reps -= 1;
    }
    if reps < 3 {
        tokens.extend(std::iter::repeat_n((value, 0), reps));
        return;
    }
    let start = tokens.len();
    reps -= 3;
    loop {
        tokens.push((REPEAT_PREVIOUS, (reps & 3) as u8));
        reps >>= 2;
        if reps == 0 {
            break;
        }
        reps -= 1;
    }
    tokens[start..].reverse();
}

fn push_zero_repetitions(tokens: &mut Vec<(u8, u8)>, mut reps: usize, split: bool) {
    if split && reps == 11 {
        tokens.push((0, 0));
        reps -= 1;
    }
    if reps < 3 {
        tokens.extend(std::iter::repeat_n((0, 0), reps));
        return;
    }
    let start = tokens.len();
    reps -= 3;
    loop {
        tokens.push((REPEAT_ZERO, (reps & 7) as u8));
        reps >>= 3;
        if reps == 0 {
            break;
        }
        reps -= 1;
    }
    tokens[start..].reverse();
}

fn write_complex<T: AlphabetSymbol, W: BitSink>(
    tree: &HuffmanTree<T>,
    writer: &mut W,
    alphabet_size: u32,
    policy: HuffmanTreeRle,
) -> FormatResult<()> {
    let mut lengths = vec![0u8; alphabet_size as usize];
    for (symbol, path) in tree.iter() {
        lengths[symbol.to_index() as usize] = path.len();
    }
    let tokens = code_length_tokens(&lengths, alphabet_size as usize, policy);

    let mut histogram = [0u32; CODE_LENGTH_CODES];
    for &(symbol, _) in &tokens {
        histogram[usize::from(symbol)] += 1;
    }
    let length_code = HuffmanTree::<u8>::from_frequencies(
        (0..CODE_LENGTH_CODES as u8).zip(histogram),
        MAX_CODE_LENGTH_CODE_LENGTH,
    )?;
    let mut stored = [0u8; CODE_LENGTH_CODES];
    for (symbol, path) in length_code.iter() {
        // A lone code length symbol is stored with length 1 and read as a
        // zero-bit code
        stored[usize::from(symbol)] = path.len().max(1);
    }

    let mut codes_to_store = CODE_LENGTH_CODES;
    if length_code.len() > 1 {
        while codes_to_store > 0 && stored[CODE_LENGTH_ORDER[codes_to_store - 1]] == 0 {
            codes_to_store -= 1;
        }
    }
    let mut skip = 0usize;
    if stored[CODE_LENGTH_ORDER[0]] == 0 && stored[CODE_LENGTH_ORDER[1]] == 0 {
        skip = 2;
        if stored[CODE_LENGTH_ORDER[2]] == 0 {
            skip = 3;
        }
    }
    writer.write_bits(2, skip as u32);
    for &symbol in &CODE_LENGTH_ORDER[skip..codes_to_store] {
        let (bits, count) = CODE_LENGTH_LENGTH_CODES[usize::from(stored[symbol])];
        writer.write_bits(count, bits);
    }

    for &(symbol, extra) in &tokens {
        length_code.write(writer, symbol)?;
        match symbol {
            REPEAT_PREVIOUS => writer.write_bits(2, u32::from(extra)),
            REPEAT_ZERO => writer.write_bits(3, u32::from(extra)),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::{BitReader, BitWriter};
    use pretty_assertions::assert_eq;

    const POLICIES: [HuffmanTreeRle; 4] = [
        HuffmanTreeRle::Disable,
        HuffmanTreeRle::KeepAll,
        HuffmanTreeRle::SplitOneAboveBoundary,
        HuffmanTreeRle::OfficialHeuristic,
    ];

    fn round_trip<T: AlphabetSymbol>(tree: &HuffmanTree<T>, alphabet: u32, policy: HuffmanTreeRle) -> HuffmanTree<T> {
        let mut writer = BitWriter::new();
        tree.write_description(&mut writer, alphabet, policy).unwrap();
        let bits = writer.bit_length();
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let back = HuffmanTree::read_description(&mut reader, alphabet).unwrap();
        assert_eq!(reader.position(), bits);
        back
    }

    /// Expand tokens the way the decoder does, for checking the encoder
    fn expand(tokens: &[(u8, u8)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut previous = INITIAL_REPEATED_LENGTH;
        let mut repeat = 0u32;
        let mut repeat_len = 0u8;
        for &(code, extra) in tokens {
            if code < REPEAT_PREVIOUS {
                repeat = 0;
                out.push(code);
                if code != 0 {
                    previous = code;
                }
                continue;
            }
            let (bits, len) = if code == REPEAT_PREVIOUS { (2, previous) } else { (3, 0) };
            if repeat_len != len {
                repeat = 0;
                repeat_len = len;
            }
            let old = repeat;
            if repeat > 0 {
                repeat = (repeat - 2) << bits;
            }
            repeat += u32::from(extra) + 3;
            out.extend(std::iter::repeat_n(len, (repeat - old) as usize));
        }
        out
    }

    #[test]
    fn test_simple_shapes() {
        for lengths in [
            vec![(3u16, 1), (9, 1)],
            vec![(3, 1), (1, 2), (2, 2)],
            vec![(0, 2), (1, 2), (2, 2), (3, 2)],
            vec![(7, 1), (6, 2), (5, 3), (4, 3)],
        ] {
            let tree = HuffmanTree::from_lengths(lengths).unwrap();
            assert_eq!(round_trip(&tree, 10, HuffmanTreeRle::default()), tree);
        }
        let single = HuffmanTree::single(42u8);
        assert_eq!(round_trip(&single, 256, HuffmanTreeRle::default()), single);
    }

    #[test]
    fn test_simple_rejects_duplicates_and_range() {
        // HSKIP=1, NSYM-1=1, symbols 5 and 5 over 4 bits
        let mut writer = BitWriter::new();
        writer.write_bits(2, 1);
        writer.write_bits(2, 1);
        writer.write_bits(4, 5);
        writer.write_bits(4, 5);
        let bytes = writer.into_bytes();
        let err = HuffmanTree::<u8>::read_description(&mut BitReader::new(&bytes), 16).unwrap_err();
        assert!(matches!(err, FormatError::InvalidHuffmanCode(_)));

        let mut writer = BitWriter::new();
        writer.write_bits(2, 1);
        writer.write_bits(2, 0);
        writer.write_bits(4, 12);
        let bytes = writer.into_bytes();
        assert!(HuffmanTree::<u8>::read_description(&mut BitReader::new(&bytes), 10).is_err());
    }

    #[test]
    fn test_complex_round_trip_all_policies() {
        let freqs: Vec<(u16, u32)> = (0..704u16)
            .map(|s| (s, if s % 7 == 0 { 0 } else { u32::from(s % 13) * 17 + 1 }))
            .collect();
        let tree = HuffmanTree::from_frequencies(freqs, 15).unwrap();
        for policy in POLICIES {
            assert_eq!(round_trip(&tree, 704, policy), tree);
        }
    }

    #[test]
    fn test_flat_tree_with_single_length_symbol() {
        // Eight symbols of length 3 without RLE use only the "3" length symbol
        let tree = HuffmanTree::from_lengths((0..8u8).map(|s| (s, 3))).unwrap();
        assert_eq!(round_trip(&tree, 256, HuffmanTreeRle::Disable), tree);
        assert_eq!(round_trip(&tree, 256, HuffmanTreeRle::KeepAll), tree);
    }

    #[test]
    fn test_tokens_expand_to_lengths() {
        let mut lengths = vec![0u8; 300];
        for (i, len) in lengths.iter_mut().enumerate() {
            *len = match i {
                0..=40 => 8,
                41..=51 => 0,
                52..=59 => 7,
                100..=110 => 9,
                111..=117 => 9,
                _ => 0,
            };
        }
        for policy in POLICIES {
            let tokens = code_length_tokens(&lengths, 300, policy);
            let expanded = expand(&tokens);
            assert_eq!(expanded, lengths[..118].to_vec(), "{policy:?}");
        }
    }

    #[test]
    fn test_split_rule() {
        let lengths = [4u8, 4, 4, 4, 4, 4, 4, 4];
        let keep = code_length_tokens(&lengths, 8, HuffmanTreeRle::KeepAll);
        let split = code_length_tokens(&lengths, 8, HuffmanTreeRle::SplitOneAboveBoundary);
        // 1 literal then 7 repeats: split writes two literals and one repeat code
        assert_eq!(keep, vec![(4, 0), (16, 0), (16, 0)]);
        assert_eq!(split, vec![(4, 0), (4, 0), (16, 3)]);

        let zeros = [0u8; 11].iter().copied().chain([1, 1]).collect::<Vec<_>>();
        let split = code_length_tokens(&zeros, 13, HuffmanTreeRle::SplitOneAboveBoundary);
        assert_eq!(split[..2], [(0, 0), (17, 7)]);
    }

    #[test]
    fn test_official_heuristic_skips_small_alphabets() {
        let lengths = [0u8, 0, 0, 0, 0, 1, 1];
        let tokens = code_length_tokens(&lengths, 7, HuffmanTreeRle::OfficialHeuristic);
        assert_eq!(tokens.len(), 7);
    }

    #[test]
    fn test_complex_rejects_incomplete_code() {
        // HSKIP=0 with every code length code length zero
        let mut writer = BitWriter::new();
        writer.write_bits(2, 0);
        for _ in 0..18 {
            writer.write_bits(2, 0);
        }
        let bytes = writer.into_bytes();
        assert!(matches!(
            HuffmanTree::<u8>::read_description(&mut BitReader::new(&bytes), 256),
            Err(FormatError::InvalidCodeLengths(_))
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn descriptions_round_trip(
                counts in prop::collection::vec(prop_oneof![3 => Just(0u32), 7 => 1u32..500], 2..704),
                policy in prop_oneof![
                    Just(HuffmanTreeRle::Disable),
                    Just(HuffmanTreeRle::KeepAll),
                    Just(HuffmanTreeRle::SplitOneAboveBoundary),
                    Just(HuffmanTreeRle::OfficialHeuristic),
                ],
            ) {
                prop_assume!(counts.iter().any(|&c| c > 0));
                let alphabet = counts.len() as u32;
                let tree = HuffmanTree::from_frequencies(
                    counts.iter().enumerate().map(|(i, &c)| (i as u16, c)),
                    15,
                ).map_err(|e| TestCaseError::fail(e.to_string()))?;
                let mut writer = BitWriter::new();
                tree.write_description(&mut writer, alphabet, policy)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let bytes = writer.into_bytes();
                let back = HuffmanTree::<u16>::read_description(&mut BitReader::new(&bytes), alphabet)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(back, tree);
            }
        }
    }
}
