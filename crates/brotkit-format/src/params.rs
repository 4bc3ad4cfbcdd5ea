//! Stream-level parameters: window size and serialization choices

use serde::{Deserialize, Serialize};

use crate::bit::{BitReader, BitSink};
use crate::error::{FormatError, FormatResult};

/// Sliding window size, stored as `WBITS`
///
/// The usable back-reference window is `(1 << WBITS) - 16` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct WindowSize(u8);

impl WindowSize {
    /// Smallest `WBITS` value
    pub const MIN_BITS: u8 = 10;
    /// Largest `WBITS` value without the large-window extension
    pub const MAX_BITS: u8 = 24;
    /// Bytes of the ring buffer a decoder may not reference
    pub const WINDOW_GAP: u32 = 16;

    /// Validate a `WBITS` value
    pub fn new(bits: u8) -> FormatResult<Self> {
        crate::error::ensure_range(
            "window bits",
            u64::from(bits),
            u64::from(Self::MIN_BITS),
            u64::from(Self::MAX_BITS),
        )?;
        Ok(Self(bits))
    }

    /// The `WBITS` value
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Largest back-reference distance
    pub fn window_bytes(self) -> u32 {
        (1u32 << self.0) - Self::WINDOW_GAP
    }

    /// Size of the history ring buffer
    pub fn buffer_bytes(self) -> usize {
        1usize << self.0
    }

    /// Decode the stream header
    pub fn read(reader: &mut BitReader<'_>) -> FormatResult<Self> {
        reader.mark_value("WBITS", |r| {
            if !r.read_bit()? {
                return Ok(Self(16));
            }
            let n = r.read_bits(3)? as u8;
            if n != 0 {
                return Ok(Self(17 + n));
            }
            match r.read_bits(3)? as u8 {
                0 => Ok(Self(17)),
                1 => Err(FormatError::InvalidWindowBits(
                    "large window code 1000001 is not supported".to_string(),
                )),
                m => Ok(Self(8 + m)),
            }
        })
    }

    /// Encode the stream header
    pub fn write<W: BitSink>(self, writer: &mut W) {
        match self.0 {
            16 => writer.write_bit(false),
            17 => {
                writer.write_bit(true);
                writer.write_bits(3, 0);
                writer.write_bits(3, 0);
            }
            bits @ 18..=24 => {
                writer.write_bit(true);
                writer.write_bits(3, u32::from(bits - 17));
            }
            bits => {
                writer.write_bit(true);
                writer.write_bits(3, 0);
                writer.write_bits(3, u32::from(bits - 8));
            }
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self(22)
    }
}

impl TryFrom<u8> for WindowSize {
    type Error = FormatError;

    fn try_from(bits: u8) -> FormatResult<Self> {
        Self::new(bits)
    }
}

impl From<WindowSize> for u8 {
    fn from(window: WindowSize) -> Self {
        window.0
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.0, self.window_bytes())
    }
}

/// Per-file parameters chosen before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileParameters {
    /// Sliding window size
    pub window_size: WindowSize,
}

impl FileParameters {
    /// Parameters with the given window size
    pub fn new(window_size: WindowSize) -> Self {
        Self { window_size }
    }

    /// Replace the window size
    pub fn with_window_size(mut self, window_size: WindowSize) -> Self {
        self.window_size = window_size;
        self
    }
}

/// Run-length coding policy for code length sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HuffmanTreeRle {
    /// Every code length is written as a literal length symbol
    Disable,
    /// Every run of three or more uses repeat codes
    KeepAll,
    /// Like `KeepAll`, but a run one longer than a single repeat code covers
    /// (7 copies of a length, 11 zeros) starts with a plain symbol
    SplitOneAboveBoundary,
    /// Reference encoder behaviour: repeat codes only for alphabets longer
    /// than 50 entries and only when they pay off, plus the split rule
    #[default]
    OfficialHeuristic,
}

/// Run-length coding policy for zero runs in context maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextMapRle {
    /// No run-length symbols (`RLEMAX = 0`)
    Disable,
    /// Greedy runs with `RLEMAX` sized to the longest zero run
    KeepAll,
    /// Like `KeepAll`, but a run of exactly `2 << RLEMAX` zeros starts with a
    /// plain zero so the rest fits one run symbol
    #[default]
    SplitOneAboveBoundary,
}

/// Choices that affect the bitstream but not the decoded model
///
/// Serialization is a pure function of the model and these parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationParameters {
    /// Code length run-length policy for complex prefix codes
    pub huffman_tree_rle: HuffmanTreeRle,
    /// Zero-run policy for context maps
    pub context_map_rle: ContextMapRle,
    /// Apply move-to-front to context maps before run-length coding
    pub context_map_mtf: bool,
}

impl Default for SerializationParameters {
    fn default() -> Self {
        Self {
            huffman_tree_rle: HuffmanTreeRle::default(),
            context_map_rle: ContextMapRle::default(),
            context_map_mtf: true,
        }
    }
}

impl SerializationParameters {
    /// Replace the code length policy
    pub fn with_huffman_tree_rle(mut self, policy: HuffmanTreeRle) -> Self {
        self.huffman_tree_rle = policy;
        self
    }

    /// Replace the context map policy
    pub fn with_context_map_rle(mut self, policy: ContextMapRle) -> Self {
        self.context_map_rle = policy;
        self
    }

    /// Enable or disable move-to-front for context maps
    pub fn with_context_map_mtf(mut self, enabled: bool) -> Self {
        self.context_map_mtf = enabled;
        self
    }

    /// Every combination of policies, for exhaustive size comparisons
    pub fn all_combinations() -> Vec<Self> {
        let huffman = [
            HuffmanTreeRle::Disable,
            HuffmanTreeRle::KeepAll,
            HuffmanTreeRle::SplitOneAboveBoundary,
            HuffmanTreeRle::OfficialHeuristic,
        ];
        let context = [
            ContextMapRle::Disable,
            ContextMapRle::KeepAll,
            ContextMapRle::SplitOneAboveBoundary,
        ];
        let mut out = Vec::with_capacity(huffman.len() * context.len() * 2);
        for &huffman_tree_rle in &huffman {
            for &context_map_rle in &context {
                for context_map_mtf in [true, false] {
                    out.push(Self {
                        huffman_tree_rle,
                        context_map_rle,
                        context_map_mtf,
                    });
                }
            }
        }
        out
    }
}
