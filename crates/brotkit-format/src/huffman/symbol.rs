//! Alphabet symbol abstraction shared by all prefix codes

use std::fmt;
use std::hash::Hash;

/// A symbol of a prefix code alphabet
///
/// Symbols map to dense indices `0..alphabet_size`; canonical code assignment
/// orders symbols of equal length by that index.
pub trait AlphabetSymbol: Copy + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync {
    /// Dense index of the symbol
    fn to_index(self) -> u32;

    /// Symbol for a dense index
    ///
    /// Callers only pass indices below the alphabet size of the tree.
    fn from_index(index: u32) -> Self;
}

impl AlphabetSymbol for u8 {
    fn to_index(self) -> u32 {
        u32::from(self)
    }

    fn from_index(index: u32) -> Self {
        index as u8
    }
}

impl AlphabetSymbol for u16 {
    fn to_index(self) -> u32 {
        u32::from(self)
    }

    fn from_index(index: u32) -> Self {
        index as u16
    }
}

impl AlphabetSymbol for u32 {
    fn to_index(self) -> u32 {
        self
    }

    fn from_index(index: u32) -> Self {
        index
    }
}

/// Implement [`AlphabetSymbol`] and `Display` for a tuple newtype over an
/// unsigned integer
macro_rules! alphabet_newtype {
    ($name:ident, $inner:ty) => {
        impl $crate::huffman::AlphabetSymbol for $name {
            fn to_index(self) -> u32 {
                u32::from(self.0)
            }

            fn from_index(index: u32) -> Self {
                Self(index as $inner)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

pub(crate) use alphabet_newtype;
