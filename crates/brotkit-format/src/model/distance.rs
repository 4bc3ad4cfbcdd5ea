//! Distance parameters, distance codes and the last-distance ring buffer

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bit::{BitReader, BitSink};
use crate::error::{FormatError, FormatResult, ensure_range};
use crate::huffman::{HuffmanTree, alphabet_newtype};

/// Largest distance any code can express
pub const MAX_ALLOWED_DISTANCE: u32 = 0x7FFF_FFFC;

/// Number of codes referring to the ring buffer
const SHORT_CODES: u32 = 16;

/// Largest number of verbatim extra bits of a complex code
const MAX_EXTRA_BITS: u32 = 24;

/// `(ring slot, offset)` per short code
const SHORT_CODE_SOURCES: [(usize, i32); 16] = [
    (0, 0),
    (1, 0),
    (2, 0),
    (3, 0),
    (0, -1),
    (0, 1),
    (0, -2),
    (0, 2),
    (0, -3),
    (0, 3),
    (1, -1),
    (1, 1),
    (1, -2),
    (1, 2),
    (1, -3),
    (1, 3),
];

/// NPOSTFIX and NDIRECT of a compressed meta-block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawDistanceParameters", into = "RawDistanceParameters")]
pub struct DistanceParameters {
    postfix_bits: u8,
    direct_code_bits: u8,
}

#[derive(Serialize, Deserialize)]
struct RawDistanceParameters {
    postfix_bits: u8,
    direct_code_bits: u8,
}

impl TryFrom<RawDistanceParameters> for DistanceParameters {
    type Error = FormatError;

    fn try_from(raw: RawDistanceParameters) -> FormatResult<Self> {
        Self::new(raw.postfix_bits, raw.direct_code_bits)
    }
}

impl From<DistanceParameters> for RawDistanceParameters {
    fn from(params: DistanceParameters) -> Self {
        Self {
            postfix_bits: params.postfix_bits,
            direct_code_bits: params.direct_code_bits,
        }
    }
}

impl DistanceParameters {
    /// Create from NPOSTFIX (`0..=3`) and `NDIRECT >> NPOSTFIX` (`0..=15`)
    pub fn new(postfix_bits: u8, direct_code_bits: u8) -> FormatResult<Self> {
        ensure_range("NPOSTFIX", u64::from(postfix_bits), 0, 3)?;
        ensure_range("NDIRECT >> NPOSTFIX", u64::from(direct_code_bits), 0, 15)?;
        Ok(Self {
            postfix_bits,
            direct_code_bits,
        })
    }

    /// Every valid combination, NPOSTFIX major
    pub fn all() -> impl Iterator<Item = Self> {
        (0..=3u8).flat_map(|postfix_bits| {
            (0..=15u8).map(move |direct_code_bits| Self {
                postfix_bits,
                direct_code_bits,
            })
        })
    }

    /// NPOSTFIX
    pub fn postfix_bits(self) -> u8 {
        self.postfix_bits
    }

    /// `NDIRECT >> NPOSTFIX` as stored in the stream
    pub fn direct_code_bits(self) -> u8 {
        self.direct_code_bits
    }

    /// NDIRECT
    pub fn direct_code_count(self) -> u32 {
        u32::from(self.direct_code_bits) << self.postfix_bits
    }

    /// Distance alphabet size
    pub fn alphabet_size(self) -> u32 {
        SHORT_CODES + self.direct_code_count() + (48 << self.postfix_bits)
    }

    /// Largest distance a direct or complex code can express
    pub fn max_distance(self) -> u32 {
        let postfix = u32::from(self.postfix_bits);
        let offset = (3u64 << MAX_EXTRA_BITS) - 4;
        let top = ((offset + (1 << MAX_EXTRA_BITS) - 1) << postfix) + (1 << postfix) - 1;
        (top + u64::from(self.direct_code_count()) + 1).min(u64::from(MAX_ALLOWED_DISTANCE)) as u32
    }

    pub(crate) fn read(reader: &mut BitReader<'_>) -> FormatResult<Self> {
        reader.mark_value("distance parameters", |r| {
            let postfix_bits = r.read_bits(2)? as u8;
            let direct_code_bits = r.read_bits(4)? as u8;
            Ok(Self {
                postfix_bits,
                direct_code_bits,
            })
        })
    }

    pub(crate) fn write<W: BitSink>(self, writer: &mut W) {
        writer.write_bits(2, u32::from(self.postfix_bits));
        writer.write_bits(4, u32::from(self.direct_code_bits));
    }

    /// Direct or complex code and extra bits for a distance
    pub fn encode(self, distance: u32) -> FormatResult<(DistanceCode, u32)> {
        if distance == 0 || distance > self.max_distance() {
            return Err(FormatError::out_of_range(
                "distance",
                u64::from(distance),
                1,
                u64::from(self.max_distance()),
            ));
        }
        let direct = self.direct_code_count();
        if distance <= direct {
            return Ok((DistanceCode(SHORT_CODES + distance - 1), 0));
        }
        let postfix_bits = u32::from(self.postfix_bits);
        let dist = (1u64 << (postfix_bits + 2)) + u64::from(distance - direct - 1);
        let bucket = u64::from(63 - dist.leading_zeros()) - 1;
        let postfix = dist & ((1 << postfix_bits) - 1);
        let prefix = (dist >> bucket) & 1;
        let offset = (2 + prefix) << bucket;
        let extra_bits = bucket - u64::from(postfix_bits);
        let code = u64::from(SHORT_CODES + direct) + (((2 * (extra_bits - 1) + prefix) << postfix_bits) + postfix);
        Ok((DistanceCode(code as u32), ((dist - offset) >> postfix_bits) as u32))
    }
}

impl fmt::Display for DistanceParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NPOSTFIX={} NDIRECT={}", self.postfix_bits, self.direct_code_count())
    }
}

/// Symbol of the distance alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DistanceCode(pub u32);
alphabet_newtype!(DistanceCode, u32);

/// How a distance code derives its distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceCodeFamily {
    /// Codes 0..16: a ring buffer slot, optionally offset
    Recent {
        /// Ring slot, 0 = last distance
        slot: usize,
        /// Offset added to the slot's distance
        offset: i32,
    },
    /// Codes `16..16 + NDIRECT`: the distance itself
    Direct,
    /// Remaining codes: prefix plus verbatim extra bits
    Complex,
}

impl DistanceCode {
    /// Code zero: repeat the last distance
    pub const LAST: Self = Self(0);

    /// Family of this code under `params`
    pub fn family(self, params: DistanceParameters) -> DistanceCodeFamily {
        if self.0 < SHORT_CODES {
            let (slot, offset) = SHORT_CODE_SOURCES[self.0 as usize];
            DistanceCodeFamily::Recent { slot, offset }
        } else if self.0 < SHORT_CODES + params.direct_code_count() {
            DistanceCodeFamily::Direct
        } else {
            DistanceCodeFamily::Complex
        }
    }

    /// Number of extra bits following the code
    pub fn extra_bits(self, params: DistanceParameters) -> u8 {
        match self.family(params) {
            DistanceCodeFamily::Complex => {
                let index = self.0 - SHORT_CODES - params.direct_code_count();
                (1 + (index >> (params.postfix_bits + 1))) as u8
            }
            _ => 0,
        }
    }

    /// Distance for this code given its extra bits and the ring buffer
    pub fn resolve(self, params: DistanceParameters, extra: u32, ring: &DistanceRingBuffer) -> FormatResult<u32> {
        match self.family(params) {
            DistanceCodeFamily::Recent { slot, offset } => {
                let distance = i64::from(ring.get(slot)) + i64::from(offset);
                if distance <= 0 {
                    return Err(FormatError::InvalidDistance {
                        code: self.0,
                        reason: format!("resolves to {distance}"),
                    });
                }
                Ok(distance as u32)
            }
            DistanceCodeFamily::Direct => Ok(self.0 - SHORT_CODES + 1),
            DistanceCodeFamily::Complex => {
                let postfix_bits = u32::from(params.postfix_bits);
                let index = u64::from(self.0 - SHORT_CODES - params.direct_code_count());
                let extra_bits = 1 + (index >> (postfix_bits + 1));
                let hcode = index >> postfix_bits;
                let lcode = index & ((1 << postfix_bits) - 1);
                let offset = ((2 + (hcode & 1)) << extra_bits) - 4;
                let distance =
                    ((offset + u64::from(extra)) << postfix_bits) + lcode + u64::from(params.direct_code_count()) + 1;
                if distance > u64::from(MAX_ALLOWED_DISTANCE) {
                    return Err(FormatError::InvalidDistance {
                        code: self.0,
                        reason: format!("distance {distance} too large"),
                    });
                }
                Ok(distance as u32)
            }
        }
    }
}

/// Distance recorded in a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceInfo {
    /// The meta-block ends after this command's literals; no copy happens
    EndsAfterLiterals,
    /// Insert&copy code below 128: last distance, no distance code
    ImplicitCodeZero,
    /// Distance code 0 read from the distance tree
    ExplicitCodeZero,
    /// Any other distance
    Value(u32),
}

impl DistanceInfo {
    /// Whether a distance code is read for this command
    pub fn reads_distance_code(self) -> bool {
        matches!(self, Self::ExplicitCodeZero | Self::Value(_))
    }

    /// Whether the command repeats the last distance
    pub fn is_code_zero(self) -> bool {
        matches!(self, Self::ImplicitCodeZero | Self::ExplicitCodeZero)
    }

    /// Distance codes and extra values that write this distance, preferred first
    ///
    /// Empty when no distance code is read. The serializer uses the first
    /// candidate present in the distance tree.
    pub fn candidate_codes(
        self,
        params: DistanceParameters,
        ring: &DistanceRingBuffer,
        max_distance: u32,
    ) -> Vec<(DistanceCode, u32)> {
        match self {
            Self::ExplicitCodeZero => vec![(DistanceCode::LAST, 0)],
            Self::Value(distance) => candidate_codes(distance, params, ring, max_distance),
            Self::EndsAfterLiterals | Self::ImplicitCodeZero => Vec::new(),
        }
    }

    /// Read a distance code and its extra bits
    pub(crate) fn read(
        reader: &mut BitReader<'_>,
        tree: &HuffmanTree<DistanceCode>,
        params: DistanceParameters,
        ring: &DistanceRingBuffer,
    ) -> FormatResult<(Self, u32)> {
        let code = tree.read(reader)?;
        let extra = reader.read_bits(code.extra_bits(params))?;
        let distance = code.resolve(params, extra, ring)?;
        let info = if code == DistanceCode::LAST {
            Self::ExplicitCodeZero
        } else {
            Self::Value(distance)
        };
        Ok((info, distance))
    }

    /// Write the distance code for this command
    ///
    /// `max_distance` bounds back-references; larger values are dictionary
    /// references and only use a short code when no other code is available.
    pub(crate) fn write<W: BitSink>(
        self,
        writer: &mut W,
        tree: &HuffmanTree<DistanceCode>,
        params: DistanceParameters,
        ring: &DistanceRingBuffer,
        max_distance: u32,
    ) -> FormatResult<()> {
        if !self.reads_distance_code() {
            return Ok(());
        }
        let (code, extra) = self
            .candidate_codes(params, ring, max_distance)
            .into_iter()
            .find(|&(code, _)| tree.contains(code))
            .ok_or(FormatError::SymbolNotInTree {
                tree: "distance",
                symbol: match self {
                    Self::Value(distance) => distance,
                    _ => 0,
                },
            })?;
        tree.write(writer, code)?;
        writer.write_bits(code.extra_bits(params), extra);
        Ok(())
    }
}

impl fmt::Display for DistanceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndsAfterLiterals => f.write_str("end"),
            Self::ImplicitCodeZero => f.write_str("last (implicit)"),
            Self::ExplicitCodeZero => f.write_str("last"),
            Self::Value(distance) => write!(f, "{distance}"),
        }
    }
}

/// Codes (other than 0) that write `distance`, preferred first
///
/// Short codes come first in the reference encoder's order when the distance
/// is a back-reference, then the direct or complex code, then any short code
/// not yet listed.
fn candidate_codes(
    distance: u32,
    params: DistanceParameters,
    ring: &DistanceRingBuffer,
    max_distance: u32,
) -> Vec<(DistanceCode, u32)> {
    let mut codes: Vec<(DistanceCode, u32)> = Vec::with_capacity(4);
    let mut push = |code: u32| {
        if code != 0 && !codes.iter().any(|&(c, _)| c.0 == code) {
            codes.push((DistanceCode(code), 0));
        }
    };
    if distance <= max_distance {
        let plus_3 = i64::from(distance) + 3;
        let offset0 = plus_3 - i64::from(ring.get(0));
        let offset1 = plus_3 - i64::from(ring.get(1));
        if distance == ring.get(1) {
            push(1);
        }
        if (0..7).contains(&offset0) {
            push((0x975_0468u32 >> (4 * offset0 as u32)) & 0xF);
        }
        if (0..7).contains(&offset1) {
            push((0x0FDB_1ACEu32 >> (4 * offset1 as u32)) & 0xF);
        }
        if distance == ring.get(2) {
            push(2);
        }
        if distance == ring.get(3) {
            push(3);
        }
    }
    if let Ok((code, extra)) = params.encode(distance) {
        codes.push((code, extra));
    }
    for code in 1..SHORT_CODES {
        if DistanceCode(code).resolve(params, 0, ring).ok() == Some(distance)
            && !codes.iter().any(|&(c, _)| c.0 == code)
        {
            codes.push((DistanceCode(code), 0));
        }
    }
    codes
}

/// The last four distances, most recent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DistanceRingBuffer {
    distances: [u32; 4],
}

impl Default for DistanceRingBuffer {
    fn default() -> Self {
        Self {
            distances: [4, 11, 15, 16],
        }
    }
}

impl DistanceRingBuffer {
    /// Ring buffer in its initial stream state
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance `slot` steps back (0 = last)
    pub fn get(&self, slot: usize) -> u32 {
        self.distances[slot & 3]
    }

    /// Record a resolved distance
    pub fn push(&mut self, distance: u32) {
        self.distances.rotate_right(1);
        self.distances[0] = distance;
    }

    /// Last distance
    pub fn last(&self) -> u32 {
        self.distances[0]
    }
}
