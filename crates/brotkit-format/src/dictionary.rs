//! Static dictionary words and word transforms
//!
//! Copies whose distance reaches past the available history refer to a word
//! of the built-in dictionary, optionally transformed. The dictionary bytes
//! come from `brotli-decompressor`; the per-length layout and the transform
//! table are defined here.

use std::collections::HashMap;
use std::sync::OnceLock;

use brotli_decompressor::dictionary::kBrotliDictionary;

use crate::error::{FormatError, FormatResult};

/// Shortest dictionary word
pub const MIN_WORD_LENGTH: u32 = 4;

/// Longest dictionary word
pub const MAX_WORD_LENGTH: u32 = 24;

/// Number of word transforms
pub const TRANSFORM_COUNT: u32 = 121;

/// log2 of the number of words per length, indexed by length
const SIZE_BITS_BY_LENGTH: [u8; 25] = [
    0, 0, 0, 0, 10, 10, 11, 11, 10, 10, 10, 10, 10, 9, 9, 8, 7, 7, 8, 7, 7, 6, 6, 5, 5,
];

/// Start of the words of each length
static OFFSETS_BY_LENGTH: OnceLock<[usize; 25]> = OnceLock::new();

fn offsets() -> &'static [usize; 25] {
    OFFSETS_BY_LENGTH.get_or_init(|| {
        let mut offsets = [0usize; 25];
        for length in MIN_WORD_LENGTH as usize..MAX_WORD_LENGTH as usize {
            offsets[length + 1] = offsets[length] + length * (1 << SIZE_BITS_BY_LENGTH[length]);
        }
        offsets
    })
}

/// Number of index bits for words of `length`
pub fn size_bits(length: u32) -> u8 {
    SIZE_BITS_BY_LENGTH.get(length as usize).copied().unwrap_or(0)
}

/// Dictionary word by length and index
pub fn word(length: u32, index: u32) -> Option<&'static [u8]> {
    if !(MIN_WORD_LENGTH..=MAX_WORD_LENGTH).contains(&length) || index >= 1 << size_bits(length) {
        return None;
    }
    let start = offsets()[length as usize] + length as usize * index as usize;
    kBrotliDictionary.get(start..start + length as usize)
}

/// Elementary transform applied to a word between prefix and suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordTransform {
    /// Word unchanged
    Identity,
    /// Drop the last `n` bytes
    OmitLast(u8),
    /// Uppercase the first character
    UppercaseFirst,
    /// Uppercase every character
    UppercaseAll,
    /// Drop the first `n` bytes
    OmitFirst(u8),
}

use WordTransform::{Identity, OmitFirst, OmitLast, UppercaseAll, UppercaseFirst};

/// `(prefix, transform, suffix)` per transform id
#[rustfmt::skip]
static TRANSFORMS: [(&[u8], WordTransform, &[u8]); TRANSFORM_COUNT as usize] = [
    (b"", Identity, b""),
    (b"", Identity, b" "),
    (b" ", Identity, b" "),
    (b"", OmitFirst(1), b""),
    (b"", UppercaseFirst, b" "),
    (b"", Identity, b" the "),
    (b" ", Identity, b""),
    (b"s ", Identity, b" "),
    (b"", Identity, b" of "),
    (b"", UppercaseFirst, b""),
    (b"", Identity, b" and "),
    (b"", OmitFirst(2), b""),
    (b"", OmitLast(1), b""),
    (b", ", Identity, b" "),
    (b"", Identity, b", "),
    (b" ", UppercaseFirst, b" "),
    (b"", Identity, b" in "),
    (b"", Identity, b" to "),
    (b"e ", Identity, b" "),
    (b"", Identity, b"\""),
    (b"", Identity, b"."),
    (b"", Identity, b"\">"),
    (b"", Identity, b"\n"),
    (b"", OmitLast(3), b""),
    (b"", Identity, b"]"),
    (b"", Identity, b" for "),
    (b"", OmitFirst(3), b""),
    (b"", OmitLast(2), b""),
    (b"", Identity, b" a "),
    (b"", Identity, b" that "),
    (b" ", UppercaseFirst, b""),
    (b"", Identity, b". "),
    (b".", Identity, b""),
    (b" ", Identity, b", "),
    (b"", OmitFirst(4), b""),
    (b"", Identity, b" with "),
    (b"", Identity, b"'"),
    (b"", Identity, b" from "),
    (b"", Identity, b" by "),
    (b"", OmitFirst(5), b""),
    (b"", OmitFirst(6), b""),
    (b" the ", Identity, b""),
    (b"", OmitLast(4), b""),
    (b"", Identity, b". The "),
    (b"", UppercaseAll, b""),
    (b"", Identity, b" on "),
    (b"", Identity, b" as "),
    (b"", Identity, b" is "),
    (b"", OmitLast(7), b""),
    (b"", OmitLast(1), b"ing "),
    (b"", Identity, b"\n\t"),
    (b"", Identity, b":"),
    (b" ", Identity, b". "),
    (b"", Identity, b"ed "),
    (b"", OmitFirst(9), b""),
    (b"", OmitFirst(7), b""),
    (b"", OmitLast(6), b""),
    (b"", Identity, b"("),
    (b"", UppercaseFirst, b", "),
    (b"", OmitLast(8), b""),
    (b"", Identity, b" at "),
    (b"", Identity, b"ly "),
    (b" the ", Identity, b" of "),
    (b"", OmitLast(5), b""),
    (b"", OmitLast(9), b""),
    (b" ", UppercaseFirst, b", "),
    (b"", UppercaseFirst, b"\""),
    (b".", Identity, b"("),
    (b"", UppercaseAll, b" "),
    (b"", UppercaseFirst, b"\">"),
    (b"", Identity, b"=\""),
    (b" ", Identity, b"."),
    (b".com/", Identity, b""),
    (b" the ", Identity, b" of the "),
    (b"", UppercaseFirst, b"'"),
    (b"", Identity, b". This "),
    (b"", Identity, b","),
    (b".", Identity, b" "),
    (b"", UppercaseFirst, b"("),
    (b"", UppercaseFirst, b"."),
    (b"", Identity, b" not "),
    (b" ", Identity, b"=\""),
    (b"", Identity, b"er "),
    (b" ", UppercaseAll, b" "),
    (b"", Identity, b"al "),
    (b" ", UppercaseAll, b""),
    (b"", Identity, b"='"),
    (b"", UppercaseAll, b"\""),
    (b"", UppercaseFirst, b". "),
    (b" ", Identity, b"("),
    (b"", Identity, b"ful "),
    (b" ", UppercaseFirst, b". "),
    (b"", Identity, b"ive "),
    (b"", Identity, b"less "),
    (b"", UppercaseAll, b"'"),
    (b"", Identity, b"est "),
    (b" ", UppercaseFirst, b"."),
    (b"", UppercaseAll, b"\">"),
    (b" ", Identity, b"='"),
    (b"", UppercaseFirst, b","),
    (b"", Identity, b"ize "),
    (b"", UppercaseAll, b"."),
    (b"\xc2\xa0", Identity, b""),
    (b" ", Identity, b","),
    (b"", UppercaseFirst, b"=\""),
    (b"", UppercaseAll, b"=\""),
    (b"", Identity, b"ous "),
    (b"", UppercaseAll, b", "),
    (b"", UppercaseFirst, b"='"),
    (b" ", UppercaseFirst, b","),
    (b" ", UppercaseAll, b"=\""),
    (b" ", UppercaseAll, b", "),
    (b"", UppercaseAll, b","),
    (b"", UppercaseAll, b"("),
    (b"", UppercaseAll, b". "),
    (b" ", UppercaseAll, b"."),
    (b"", UppercaseAll, b"='"),
    (b" ", UppercaseAll, b". "),
    (b" ", UppercaseFirst, b"=\""),
    (b" ", UppercaseAll, b"='"),
    (b" ", UppercaseFirst, b"='"),
];

/// Uppercase the character starting `bytes`, returning its byte length
///
/// Multi-byte steps that run past the end only touch the bytes present.
fn uppercase_step(bytes: &mut [u8]) -> usize {
    let Some(&first) = bytes.first() else {
        return 0;
    };
    if first < 0xC0 {
        if first.is_ascii_lowercase() {
            bytes[0] ^= 32;
        }
        return 1;
    }
    if first < 0xE0 {
        if let Some(byte) = bytes.get_mut(1) {
            *byte ^= 32;
        }
        return 2;
    }
    if let Some(byte) = bytes.get_mut(2) {
        *byte ^= 5;
    }
    3
}

/// A static dictionary reference: word length, index and transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictionaryReference {
    /// Word length (the copy length of the command)
    pub length: u32,
    /// Word index among words of that length
    pub index: u32,
    /// Transform id
    pub transform: u32,
}

impl DictionaryReference {
    /// Split a word id (distance beyond the history, minus one) for a copy length
    pub fn from_word_id(copy_length: u32, word_id: u32) -> FormatResult<Self> {
        let invalid = || FormatError::InvalidDictionaryReference { copy_length, word_id };
        if !(MIN_WORD_LENGTH..=MAX_WORD_LENGTH).contains(&copy_length) {
            return Err(invalid());
        }
        let bits = size_bits(copy_length);
        let reference = Self {
            length: copy_length,
            index: word_id & ((1 << bits) - 1),
            transform: word_id >> bits,
        };
        if reference.transform >= TRANSFORM_COUNT {
            return Err(invalid());
        }
        Ok(reference)
    }

    /// Word id as coded in the distance
    pub fn word_id(self) -> u32 {
        self.index | (self.transform << size_bits(self.length))
    }

    /// Untransformed word
    pub fn word(self) -> &'static [u8] {
        word(self.length, self.index).unwrap_or_default()
    }

    /// Append the transformed word to `out`
    pub fn write_into(self, out: &mut Vec<u8>) {
        let (prefix, transform, suffix) = TRANSFORMS[self.transform as usize % TRANSFORMS.len()];
        out.extend_from_slice(prefix);
        let mut body = self.word();
        match transform {
            OmitFirst(n) => body = body.get(usize::from(n)..).unwrap_or_default(),
            OmitLast(n) => body = &body[..body.len().saturating_sub(usize::from(n))],
            _ => {}
        }
        let start = out.len();
        out.extend_from_slice(body);
        match transform {
            UppercaseFirst => {
                uppercase_step(&mut out[start..]);
            }
            UppercaseAll => {
                let mut i = start;
                while i < out.len() {
                    i += uppercase_step(&mut out[i..]);
                }
            }
            _ => {}
        }
        out.extend_from_slice(suffix);
    }

    /// Transformed word
    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length as usize + 8);
        self.write_into(&mut out);
        out
    }
}

/// Index of every dictionary word under the identity transform
static IDENTITY_INDEX: OnceLock<HashMap<&'static [u8], DictionaryReference>> = OnceLock::new();

fn identity_index() -> &'static HashMap<&'static [u8], DictionaryReference> {
    IDENTITY_INDEX.get_or_init(|| {
        let mut index = HashMap::new();
        for length in MIN_WORD_LENGTH..=MAX_WORD_LENGTH {
            for word_index in 0..1u32 << size_bits(length) {
                if let Some(bytes) = word(length, word_index) {
                    index.entry(bytes).or_insert(DictionaryReference {
                        length,
                        index: word_index,
                        transform: 0,
                    });
                }
            }
        }
        index
    })
}

/// Longest word, used verbatim, that starts `data`
pub fn longest_identity_match(data: &[u8]) -> Option<DictionaryReference> {
    let index = identity_index();
    let longest = data.len().min(MAX_WORD_LENGTH as usize);
    (MIN_WORD_LENGTH as usize..=longest)
        .rev()
        .find_map(|length| index.get(&data[..length]).copied())
}
