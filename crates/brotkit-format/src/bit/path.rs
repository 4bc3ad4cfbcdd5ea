//! Immutable bit sequences used as prefix code paths

use std::fmt;

/// Maximum number of bits a path can hold
pub const MAX_PATH_BITS: u8 = 32;

/// An ordered sequence of bits in stream order
///
/// Bit `i` of the sequence is stored at bit `i` of the backing integer, so a
/// path can be emitted with a single LSB-first `write_bits` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BitPath {
    bits: u32,
    len: u8,
}

impl BitPath {
    /// The empty path (used by single-symbol prefix codes)
    pub const EMPTY: Self = Self { bits: 0, len: 0 };

    /// Create a path from `len` stream-ordered bits packed LSB first
    ///
    /// Bits above `len` are cleared.
    pub fn new(bits: u32, len: u8) -> Self {
        let len = len.min(MAX_PATH_BITS);
        let bits = if len == MAX_PATH_BITS {
            bits
        } else {
            bits & ((1u32 << len) - 1)
        };
        Self { bits, len }
    }

    /// Create a path from a canonical code written most significant bit first
    pub fn from_canonical_code(code: u32, len: u8) -> Self {
        if len == 0 {
            return Self::EMPTY;
        }
        let reversed = code.reverse_bits() >> (32 - u32::from(len));
        Self::new(reversed, len)
    }

    /// Number of bits in the path
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Whether the path holds no bits
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packed bits, first bit in the least significant position
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Bit at `index` in stream order
    pub fn bit(&self, index: u8) -> Option<bool> {
        (index < self.len).then(|| (self.bits >> index) & 1 == 1)
    }

    /// Return a new path with `bit` appended
    #[must_use]
    pub fn push(&self, bit: bool) -> Self {
        if self.len >= MAX_PATH_BITS {
            return *self;
        }
        Self {
            bits: self.bits | (u32::from(bit) << self.len),
            len: self.len + 1,
        }
    }

    /// Whether `self` is a (non-strict) prefix of `other`
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.len > other.len {
            return false;
        }
        Self::new(other.bits, self.len).bits == self.bits
    }

    /// Iterate over the bits in stream order
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| (self.bits >> i) & 1 == 1)
    }
}

impl fmt::Display for BitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}
