//! Canonical prefix codes and their stream descriptions
//!
//! [`HuffmanTree`] is generic over the alphabet symbol type so that literal,
//! insert&copy, distance, block switch and context map codes stay distinct
//! types. Trees are built from code lengths when decoding and from symbol
//! frequencies when encoding.

mod serial;
mod symbol;
mod tree;

pub use serial::CODE_LENGTH_ORDER;
pub(crate) use symbol::alphabet_newtype;
pub use symbol::AlphabetSymbol;
pub use tree::{HuffmanTree, MAX_CODE_LENGTH};

/// Build a tree from a dense histogram indexed by symbol
///
/// An empty histogram yields a single-symbol tree for symbol 0, which is the
/// cheapest placeholder for a tree that is never used.
pub fn tree_from_histogram<T: AlphabetSymbol>(histogram: &[u32]) -> crate::FormatResult<HuffmanTree<T>> {
    if histogram.iter().all(|&count| count == 0) {
        return Ok(HuffmanTree::single(T::from_index(0)));
    }
    HuffmanTree::from_frequencies(
        histogram
            .iter()
            .enumerate()
            .map(|(index, &count)| (T::from_index(index as u32), count)),
        MAX_CODE_LENGTH,
    )
}
