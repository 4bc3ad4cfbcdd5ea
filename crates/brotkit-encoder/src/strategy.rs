//! Encoder strategies and their presets

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, EncodeResult};

/// Smallest hashed prefix
pub const MIN_HASH_LENGTH: u8 = 4;
/// Largest hashed prefix
pub const MAX_HASH_LENGTH: u8 = 8;
/// Smallest meta-block size exponent
pub const MIN_BLOCK_SIZE_BITS: u8 = 16;
/// Largest meta-block size exponent
pub const MAX_BLOCK_SIZE_BITS: u8 = 24;
/// Highest quality level
pub const MAX_QUALITY: u8 = 11;

/// How input positions are turned into commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Store every meta-block raw
    Uncompressed,
    /// One literal run per meta-block, no back-references
    LiteralsOnly,
    /// Take the best match at each position
    Greedy,
    /// Defer a match when the next position scores clearly better
    Lazy,
}

/// Tunables of the encoder
///
/// Every strategy succeeds on every input: a meta-block that cannot be
/// compressed, or would grow, is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderStrategy {
    /// Match search mode
    pub mode: MatchMode,
    /// Bytes hashed per position (4..=8)
    pub hash_len: u8,
    /// log2 of the number of hash buckets
    pub bucket_bits: u8,
    /// log2 of the positions kept per bucket
    pub block_bits: u8,
    /// log2 of the input bytes per meta-block (16..=24)
    pub block_size_bits: u8,
    /// Commands per meta-block before it is closed early
    pub max_commands: usize,
    /// Search the static dictionary when no back-reference is found
    pub use_dictionary: bool,
    /// Literal run after which positions are probed sparsely; 0 disables
    pub skip_window: usize,
    /// Split symbol streams into block types
    pub split_blocks: bool,
    /// Upper bound on literal prefix codes per meta-block
    pub max_literal_trees: u16,
    /// Upper bound on distance prefix codes per meta-block
    pub max_distance_trees: u16,
    /// Try every literal context mode instead of guessing one
    pub sweep_context_modes: bool,
    /// Try several NPOSTFIX / NDIRECT pairs
    pub sweep_distance_parameters: bool,
    /// Pick the smallest run-length policies when serializing
    pub sweep_serialization: bool,
}

impl Default for EncoderStrategy {
    fn default() -> Self {
        Self::lazy()
    }
}

impl EncoderStrategy {
    /// Store everything raw
    pub fn uncompressed() -> Self {
        Self {
            mode: MatchMode::Uncompressed,
            split_blocks: false,
            max_literal_trees: 1,
            max_distance_trees: 1,
            ..Self::lazy()
        }
    }

    /// Entropy-code literals without back-references
    pub fn literals_only() -> Self {
        Self {
            mode: MatchMode::LiteralsOnly,
            use_dictionary: false,
            ..Self::lazy()
        }
    }

    /// Greedy matching with a small table
    pub fn greedy() -> Self {
        Self {
            mode: MatchMode::Greedy,
            hash_len: 5,
            bucket_bits: 14,
            block_bits: 4,
            block_size_bits: 18,
            max_commands: 1 << 16,
            use_dictionary: false,
            skip_window: 64,
            split_blocks: false,
            max_literal_trees: 16,
            max_distance_trees: 4,
            sweep_context_modes: false,
            sweep_distance_parameters: false,
            sweep_serialization: false,
        }
    }

    /// Lazy matching, block splitting and context clustering
    pub fn lazy() -> Self {
        Self {
            mode: MatchMode::Lazy,
            bucket_bits: 15,
            block_bits: 5,
            block_size_bits: 20,
            use_dictionary: true,
            split_blocks: true,
            max_literal_trees: 64,
            max_distance_trees: 8,
            ..Self::greedy()
        }
    }

    /// Every search and every sweep
    pub fn best() -> Self {
        Self {
            hash_len: 4,
            bucket_bits: 15,
            block_bits: 6,
            block_size_bits: 22,
            skip_window: 512,
            max_literal_trees: 256,
            max_distance_trees: 16,
            sweep_context_modes: true,
            sweep_distance_parameters: true,
            sweep_serialization: true,
            ..Self::lazy()
        }
    }

    /// Preset for a quality level from 0 to 11
    pub fn quality(level: u8) -> EncodeResult<Self> {
        let strategy = match level {
            0 => Self {
                bucket_bits: 12,
                block_bits: 0,
                block_size_bits: 16,
                ..Self::greedy()
            },
            1 => Self {
                bucket_bits: 13,
                block_bits: 1,
                block_size_bits: 17,
                ..Self::greedy()
            },
            2 | 3 => Self {
                block_bits: 2 + level,
                ..Self::greedy()
            },
            4..=6 => Self {
                block_bits: level - 1,
                ..Self::lazy()
            },
            7..=9 => Self {
                block_bits: level - 3,
                sweep_context_modes: true,
                ..Self::lazy()
            },
            10 => Self {
                sweep_serialization: false,
                ..Self::best()
            },
            11 => Self::best(),
            _ => {
                return Err(EncodeError::InvalidStrategy(format!(
                    "quality {level} is above {MAX_QUALITY}"
                )));
            }
        };
        Ok(strategy)
    }

    /// Replace the match mode
    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the meta-block size exponent
    pub fn with_block_size_bits(mut self, bits: u8) -> Self {
        self.block_size_bits = bits;
        self
    }

    /// Enable or disable the static dictionary search
    pub fn with_dictionary(mut self, enabled: bool) -> Self {
        self.use_dictionary = enabled;
        self
    }

    /// Enable or disable block splitting
    pub fn with_block_splitting(mut self, enabled: bool) -> Self {
        self.split_blocks = enabled;
        self
    }

    /// Positions kept per hash bucket
    pub fn bucket_size(&self) -> usize {
        1 << self.block_bits
    }

    /// Input bytes per meta-block
    pub fn meta_block_size(&self) -> usize {
        1 << self.block_size_bits
    }

    /// Check every field against its range
    pub fn validate(&self) -> EncodeResult<()> {
        let check = |name: &str, value: usize, min: usize, max: usize| {
            if (min..=max).contains(&value) {
                Ok(())
            } else {
                Err(EncodeError::InvalidStrategy(format!(
                    "{name} = {value} is out of range [{min}, {max}]"
                )))
            }
        };
        check(
            "hash_len",
            usize::from(self.hash_len),
            usize::from(MIN_HASH_LENGTH),
            usize::from(MAX_HASH_LENGTH),
        )?;
        check("bucket_bits", usize::from(self.bucket_bits), 8, 24)?;
        check("block_bits", usize::from(self.block_bits), 0, 8)?;
        check(
            "block_size_bits",
            usize::from(self.block_size_bits),
            usize::from(MIN_BLOCK_SIZE_BITS),
            usize::from(MAX_BLOCK_SIZE_BITS),
        )?;
        check("max_commands", self.max_commands, 1, usize::MAX)?;
        check("max_literal_trees", usize::from(self.max_literal_trees), 1, 256)?;
        check("max_distance_trees", usize::from(self.max_distance_trees), 1, 256)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_presets_are_valid() {
        for strategy in [
            EncoderStrategy::uncompressed(),
            EncoderStrategy::literals_only(),
            EncoderStrategy::greedy(),
            EncoderStrategy::lazy(),
            EncoderStrategy::best(),
        ] {
            strategy.validate().unwrap();
        }
        for level in 0..=MAX_QUALITY {
            EncoderStrategy::quality(level).unwrap().validate().unwrap();
        }
        assert!(EncoderStrategy::quality(12).is_err());
    }

    #[test]
    fn test_validate_rejects_ranges() {
        let strategy = EncoderStrategy {
            hash_len: 3,
            ..EncoderStrategy::default()
        };
        assert!(matches!(strategy.validate(), Err(EncodeError::InvalidStrategy(_))));
        assert!(EncoderStrategy::default().with_block_size_bits(25).validate().is_err());
        assert!(EncoderStrategy::default().with_block_size_bits(15).validate().is_err());
    }

    #[test]
    fn test_json_config() {
        let strategy: EncoderStrategy =
            serde_json::from_str(r#"{"mode": "greedy", "block_size_bits": 16}"#).unwrap();
        assert_eq!(strategy.mode, MatchMode::Greedy);
        assert_eq!(strategy.block_size_bits, 16);
        assert_eq!(strategy.hash_len, EncoderStrategy::default().hash_len);

        let json = serde_json::to_string(&EncoderStrategy::best()).unwrap();
        let back: EncoderStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EncoderStrategy::best());
    }
}
