//! Canonical prefix codes

use std::fmt;

use super::symbol::AlphabetSymbol;
use crate::bit::{BitPath, BitReader, BitSink};
use crate::error::{FormatError, FormatResult};

/// Longest code length Brotli allows
pub const MAX_CODE_LENGTH: u8 = 15;

#[derive(Debug, Clone, Copy)]
enum Node<T> {
    Leaf(T),
    Branch([u32; 2]),
}

/// A complete canonical prefix code over symbols of type `T`
///
/// Codes are assigned in order of increasing length, then increasing symbol
/// index. A tree with a single symbol assigns it the empty path, so reading or
/// writing that symbol consumes no bits.
#[derive(Clone)]
pub struct HuffmanTree<T: AlphabetSymbol> {
    /// Symbols with their paths in canonical order
    entries: Vec<(T, BitPath)>,
    /// Path per symbol index, for writing
    paths: Vec<Option<BitPath>>,
    /// Decoding trie; index 0 is the root
    nodes: Vec<Node<T>>,
}

impl<T: AlphabetSymbol> HuffmanTree<T> {
    /// Tree holding a single symbol with an empty path
    pub fn single(symbol: T) -> Self {
        let mut paths = vec![None; symbol.to_index() as usize + 1];
        paths[symbol.to_index() as usize] = Some(BitPath::EMPTY);
        Self {
            entries: vec![(symbol, BitPath::EMPTY)],
            paths,
            nodes: vec![Node::Leaf(symbol)],
        }
    }

    /// Build a canonical tree from `(symbol, length)` pairs
    ///
    /// Zero lengths are ignored. Exactly one non-zero length yields a
    /// single-symbol tree; otherwise the lengths must form a complete prefix
    /// code with no length above 15.
    pub fn from_lengths(lengths: impl IntoIterator<Item = (T, u8)>) -> FormatResult<Self> {
        let mut coded: Vec<(T, u8)> = lengths.into_iter().filter(|&(_, len)| len > 0).collect();
        coded.sort_by_key(|&(symbol, _)| symbol);
        if coded.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            return Err(FormatError::InvalidCodeLengths(
                "symbol listed twice".to_string(),
            ));
        }
        coded.sort_by_key(|&(symbol, len)| (len, symbol));
        match coded.as_slice() {
            [] => {
                return Err(FormatError::InvalidCodeLengths(
                    "no symbol has a code".to_string(),
                ));
            }
            [(symbol, _)] => return Ok(Self::single(*symbol)),
            _ => {}
        }

        let mut space = 0u64;
        for &(_, len) in &coded {
            if len > MAX_CODE_LENGTH {
                return Err(FormatError::InvalidCodeLengths(format!(
                    "code length {len} exceeds {MAX_CODE_LENGTH}"
                )));
            }
            space += 1u64 << (MAX_CODE_LENGTH - len);
        }
        if space != 1u64 << MAX_CODE_LENGTH {
            return Err(FormatError::InvalidCodeLengths(format!(
                "lengths fill {space} of {} code space units",
                1u32 << MAX_CODE_LENGTH
            )));
        }

        let mut entries = Vec::with_capacity(coded.len());
        let mut code = 0u32;
        let mut previous_len = coded[0].1;
        for &(symbol, len) in &coded {
            code <<= len - previous_len;
            previous_len = len;
            entries.push((symbol, BitPath::from_canonical_code(code, len)));
            code += 1;
        }
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<(T, BitPath)>) -> FormatResult<Self> {
        let max_index = entries
            .iter()
            .map(|(symbol, _)| symbol.to_index())
            .max()
            .unwrap_or(0) as usize;
        let mut paths = vec![None; max_index + 1];
        let mut nodes = vec![Node::Branch([0, 0])];
        for &(symbol, path) in &entries {
            paths[symbol.to_index() as usize] = Some(path);
            let mut index = 0usize;
            for (depth, bit) in path.iter().enumerate() {
                let last = depth + 1 == usize::from(path.len());
                let Node::Branch(children) = nodes[index] else {
                    return Err(FormatError::InvalidCodeLengths(
                        "code is a prefix of another code".to_string(),
                    ));
                };
                let child = children[usize::from(bit)];
                if child != 0 {
                    if last {
                        return Err(FormatError::InvalidCodeLengths(
                            "duplicate code".to_string(),
                        ));
                    }
                    index = child as usize;
                    continue;
                }
                let next = nodes.len() as u32;
                nodes.push(if last {
                    Node::Leaf(symbol)
                } else {
                    Node::Branch([0, 0])
                });
                if let Node::Branch(children) = &mut nodes[index] {
                    children[usize::from(bit)] = next;
                }
                index = next as usize;
            }
        }
        Ok(Self {
            entries,
            paths,
            nodes,
        })
    }

    /// Build a length-limited tree from symbol frequencies
    ///
    /// Uses the reference encoder construction: every count is raised to a
    /// minimum that starts at one and doubles until the tree fits in
    /// `max_depth`. Leaves are ordered by count, ties by descending symbol, and
    /// merged with two queues. Symbols with zero frequency get no code.
    pub fn from_frequencies(
        frequencies: impl IntoIterator<Item = (T, u32)>,
        max_depth: u8,
    ) -> FormatResult<Self> {
        let mut symbols: Vec<(T, u32)> = frequencies
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .collect();
        symbols.sort_by_key(|&(symbol, _)| symbol);
        symbols.dedup_by_key(|&mut (symbol, _)| symbol);
        match symbols.as_slice() {
            [] => {
                return Err(FormatError::InvalidCodeLengths(
                    "no symbol has a non-zero frequency".to_string(),
                ));
            }
            [(symbol, _)] => return Ok(Self::single(*symbol)),
            _ => {}
        }
        if max_depth > MAX_CODE_LENGTH || (1usize << max_depth) < symbols.len() {
            return Err(FormatError::out_of_range(
                "tree depth",
                u64::from(max_depth),
                u64::from(crate::bit::alphabet_bits(symbols.len() as u32)),
                u64::from(MAX_CODE_LENGTH),
            ));
        }

        let mut count_limit = 1u64;
        loop {
            if let Some(depths) = limited_depths(&symbols, count_limit, max_depth) {
                return Self::from_lengths(symbols.iter().map(|&(symbol, _)| symbol).zip(depths));
            }
            count_limit *= 2;
        }
    }

    /// Number of symbols with a code
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no symbols (never true for a constructed tree)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the tree holds one symbol with an empty path
    pub fn is_single_symbol(&self) -> bool {
        self.entries.len() == 1
    }

    /// Symbols and paths in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (T, BitPath)> + '_ {
        self.entries.iter().copied()
    }

    /// Symbols in canonical order
    pub fn symbols(&self) -> impl Iterator<Item = T> + '_ {
        self.entries.iter().map(|&(symbol, _)| symbol)
    }

    /// Path of `symbol`, if it has a code
    pub fn path(&self, symbol: T) -> Option<BitPath> {
        self.paths
            .get(symbol.to_index() as usize)
            .copied()
            .flatten()
    }

    /// Whether `symbol` has a code
    pub fn contains(&self, symbol: T) -> bool {
        self.path(symbol).is_some()
    }

    /// Code length of `symbol`
    pub fn code_length(&self, symbol: T) -> Option<u8> {
        self.path(symbol).map(|path| path.len())
    }

    /// Longest code length in the tree
    pub fn max_code_length(&self) -> u8 {
        self.entries
            .iter()
            .map(|(_, path)| path.len())
            .max()
            .unwrap_or(0)
    }

    /// Decode one symbol by walking the tree
    pub fn read(&self, reader: &mut BitReader<'_>) -> FormatResult<T> {
        let mut index = 0usize;
        loop {
            match self.nodes[index] {
                Node::Leaf(symbol) => return Ok(symbol),
                Node::Branch(children) => {
                    let bit = reader.read_bit()?;
                    let next = children[usize::from(bit)];
                    if next == 0 {
                        return Err(FormatError::InvalidHuffmanCode(format!(
                            "incomplete code at bit {}",
                            reader.position()
                        )));
                    }
                    index = next as usize;
                }
            }
        }
    }

    /// Encode one symbol
    pub fn write<W: BitSink>(&self, writer: &mut W, symbol: T) -> FormatResult<()> {
        let path = self.path(symbol).ok_or(FormatError::SymbolNotInTree {
            tree: std::any::type_name::<T>(),
            symbol: symbol.to_index(),
        })?;
        writer.write_path(&path);
        Ok(())
    }

    /// Bits needed to write `symbol`
    pub fn cost(&self, symbol: T) -> Option<usize> {
        self.code_length(symbol).map(usize::from)
    }
}

impl<T: AlphabetSymbol> PartialEq for HuffmanTree<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T: AlphabetSymbol> Eq for HuffmanTree<T> {}

impl<T: AlphabetSymbol> fmt::Debug for HuffmanTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(symbol, path)| (symbol, path.to_string())))
            .finish()
    }
}

impl<T: AlphabetSymbol> fmt::Display for HuffmanTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} symbols:", self.entries.len())?;
        for (symbol, path) in &self.entries {
            write!(f, " {symbol}={path}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct PoolNode {
    count: u64,
    /// Leaf position in `symbols`, or children for internal nodes
    leaf: Option<usize>,
    children: (usize, usize),
}

const SENTINEL: PoolNode = PoolNode {
    count: u64::MAX,
    leaf: None,
    children: (0, 0),
};

/// One attempt of the count-limited construction; `None` when too deep
fn limited_depths(symbols: &[(impl AlphabetSymbol, u32)], count_limit: u64, max_depth: u8) -> Option<Vec<u8>> {
    let n = symbols.len();
    let mut pool: Vec<PoolNode> = (0..n)
        .rev()
        .map(|i| PoolNode {
            count: u64::from(symbols[i].1).max(count_limit),
            leaf: Some(i),
            children: (0, 0),
        })
        .collect();
    pool.sort_by(|a, b| {
        a.count
            .cmp(&b.count)
            .then_with(|| b.leaf.cmp(&a.leaf))
    });
    pool.push(SENTINEL);
    pool.push(SENTINEL);

    let mut leaf_cursor = 0usize;
    let mut node_cursor = n + 1;
    let mut take = |pool: &[PoolNode]| {
        if pool[leaf_cursor].count <= pool[node_cursor].count {
            leaf_cursor += 1;
            leaf_cursor - 1
        } else {
            node_cursor += 1;
            node_cursor - 1
        }
    };
    for k in (1..n).rev() {
        let left = take(&pool);
        let right = take(&pool);
        let slot = 2 * n - k;
        pool[slot] = PoolNode {
            count: pool[left].count.saturating_add(pool[right].count),
            leaf: None,
            children: (left, right),
        };
        pool.push(SENTINEL);
    }

    let mut depths = vec![0u8; n];
    let mut stack = vec![(2 * n - 1, 0u32)];
    while let Some((index, depth)) = stack.pop() {
        let node = pool[index];
        if let Some(leaf) = node.leaf {
            if depth > u32::from(max_depth) {
                return None;
            }
            depths[leaf] = depth as u8;
        } else {
            stack.push((node.children.0, depth + 1));
            stack.push((node.children.1, depth + 1));
        }
    }
    Some(depths)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bit::{BitReader, BitWriter};

    #[test]
    fn test_canonical_assignment() {
        // Lengths from RFC 7932 section 3.2 example: A=2 B=1 C=3 D=3
        let tree = HuffmanTree::from_lengths([(0u8, 2), (1, 1), (2, 3), (3, 3)]).unwrap();
        assert_eq!(tree.path(1).unwrap().to_string(), "0");
        assert_eq!(tree.path(0).unwrap().to_string(), "10");
        assert_eq!(tree.path(2).unwrap().to_string(), "110");
        assert_eq!(tree.path(3).unwrap().to_string(), "111");
        assert_eq!(tree.symbols().collect::<Vec<_>>(), vec![1, 0, 2, 3]);
    }

    #[test]
    fn test_single_symbol_uses_no_bits() {
        let tree = HuffmanTree::from_lengths([(7u16, 1)]).unwrap();
        assert!(tree.is_single_symbol());
        let mut writer = BitWriter::new();
        tree.write(&mut writer, 7).unwrap();
        assert_eq!(writer.bit_length(), 0);
        let mut reader = BitReader::new(&[]);
        assert_eq!(tree.read(&mut reader).unwrap(), 7);
    }

    #[test]
    fn test_incomplete_and_oversubscribed_rejected() {
        assert!(HuffmanTree::from_lengths([(0u8, 1), (1, 2)]).is_err());
        assert!(HuffmanTree::from_lengths([(0u8, 1), (1, 1), (2, 1)]).is_err());
        assert!(HuffmanTree::<u8>::from_lengths([]).is_err());
        assert!(HuffmanTree::from_lengths([(0u8, 16), (1, 1)]).is_err());
    }

    #[test]
    fn test_write_then_read_all_symbols() {
        let tree = HuffmanTree::from_lengths([(0u8, 1), (5, 2), (9, 3), (200, 3)]).unwrap();
        let message = [9u8, 0, 200, 5, 5, 0, 9];
        let mut writer = BitWriter::new();
        for &symbol in &message {
            tree.write(&mut writer, symbol).unwrap();
        }
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        for &symbol in &message {
            assert_eq!(tree.read(&mut reader).unwrap(), symbol);
        }
        assert!(matches!(
            tree.write(&mut BitWriter::new(), 1),
            Err(FormatError::SymbolNotInTree { symbol: 1, .. })
        ));
    }

    #[test]
    fn test_frequencies_respect_depth_limit() {
        // Fibonacci counts force a degenerate tree without a limit
        let mut fib = vec![1u32, 1];
        while fib.len() < 20 {
            let next = fib[fib.len() - 1] + fib[fib.len() - 2];
            fib.push(next);
        }
        let freqs: Vec<(u16, u32)> = fib.iter().enumerate().map(|(i, &c)| (i as u16, c)).collect();
        let unlimited = limited_depths(&freqs, 1, 19).unwrap();
        assert_eq!(unlimited.iter().max(), Some(&19));
        assert!(limited_depths(&freqs, 1, 15).is_none());
        let limited = HuffmanTree::from_frequencies(freqs, 15).unwrap();
        assert!(limited.max_code_length() <= 15);
        assert_eq!(limited.len(), 20);
    }

    #[test]
    fn test_frequencies_prefer_short_codes_for_common_symbols() {
        let tree = HuffmanTree::from_frequencies([(b'a', 100), (b'b', 10), (b'c', 1), (b'd', 1)], 15).unwrap();
        assert_eq!(tree.code_length(b'a'), Some(1));
        assert_eq!(tree.code_length(b'b'), Some(2));
        assert_eq!(tree.code_length(b'c'), Some(3));
        assert_eq!(tree.code_length(b'd'), Some(3));
    }

    #[test]
    fn test_two_symbols_and_single_frequency() {
        let tree = HuffmanTree::from_frequencies([(3u8, 5), (4, 0), (9, 5)], 15).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.code_length(3), Some(1));
        let single = HuffmanTree::from_frequencies([(4u8, 0), (9, 5)], 15).unwrap();
        assert!(single.is_single_symbol());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn frequencies_give_complete_prefix_free_codes(
                counts in prop::collection::vec(0u32..10_000, 2..300),
                max_depth in 9u8..=15,
            ) {
                let nonzero = counts.iter().filter(|&&c| c > 0).count();
                prop_assume!(nonzero >= 2);
                let tree = HuffmanTree::from_frequencies(
                    counts.iter().enumerate().map(|(i, &c)| (i as u16, c)),
                    max_depth,
                ).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(tree.len(), nonzero);
                prop_assert!(tree.max_code_length() <= max_depth);
                let paths: Vec<BitPath> = tree.iter().map(|(_, p)| p).collect();
                for (i, a) in paths.iter().enumerate() {
                    for (j, b) in paths.iter().enumerate() {
                        if i != j {
                            prop_assert!(!a.is_prefix_of(b));
                        }
                    }
                }
                // Rebuilding from the resulting lengths gives the same tree
                let rebuilt = HuffmanTree::from_lengths(tree.iter().map(|(s, p)| (s, p.len())))
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(rebuilt, tree);
            }
        }
    }
}
