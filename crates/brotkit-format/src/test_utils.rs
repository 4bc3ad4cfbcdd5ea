//! Deterministic sample inputs
//!
//! Shared by unit tests, integration tests and benchmarks of the workspace so
//! that every crate compresses the same corpora.

/// Words used to build English-like text
const WORDS: &[&str] = &[
    "the", "of", "and", "to", "in", "time", "data", "stream", "block", "window", "code", "length",
    "distance", "literal", "context", "tree", "brotli", "format", "encoder", "decoder", "with",
    "from", "that", "this", "for", "is", "on", "as", "by", "table", "symbol", "bit",
];

/// Sample corpora by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corpus {
    /// Empty input
    Empty,
    /// One byte repeated
    Run,
    /// Space-separated words with punctuation
    Text,
    /// Pseudo-random bytes
    Noise,
    /// Small records with repeated keys, like JSON lines
    Records,
}

impl Corpus {
    /// Every corpus
    pub const ALL: [Self; 5] = [Self::Empty, Self::Run, Self::Text, Self::Noise, Self::Records];

    /// Generate `len` bytes (exactly, except for the empty corpus)
    pub fn generate(self, len: usize, seed: u64) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Run => vec![b'a'; len],
            Self::Text => text(len, seed),
            Self::Noise => noise(len, seed),
            Self::Records => records(len, seed),
        }
    }
}

/// xorshift64* generator
#[derive(Debug, Clone)]
pub struct SampleRng(u64);

impl SampleRng {
    /// Seeded generator; a zero seed is replaced by a fixed constant
    pub fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    /// Next value
    pub fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Value in `0..bound`
    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound.max(1) as u64) as usize
    }
}

/// English-like text
pub fn text(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SampleRng::new(seed);
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        out.extend_from_slice(WORDS[rng.below(WORDS.len())].as_bytes());
        out.push(match rng.below(12) {
            0 => b',',
            1 => b'.',
            _ => b' ',
        });
    }
    out.truncate(len);
    out
}

/// Pseudo-random bytes
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SampleRng::new(seed);
    (0..len).map(|_| rng.next_u64() as u8).collect()
}

/// JSON-like records
pub fn records(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SampleRng::new(seed);
    let mut out = Vec::with_capacity(len + 64);
    let mut id = 0u32;
    while out.len() < len {
        let line = format!(
            "{{\"id\":{id},\"name\":\"{}\",\"size\":{},\"hash\":\"{}\"}}\n",
            WORDS[rng.below(WORDS.len())],
            rng.below(100_000),
            hex::encode((rng.next_u64() as u32).to_be_bytes()),
        );
        out.extend_from_slice(line.as_bytes());
        id += 1;
    }
    out.truncate(len);
    out
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generators_are_deterministic() {
        for corpus in Corpus::ALL {
            assert_eq!(corpus.generate(500, 7), corpus.generate(500, 7));
        }
        assert_ne!(noise(64, 1), noise(64, 2));
    }

    #[test]
    fn test_generated_lengths() {
        assert_eq!(text(1000, 3).len(), 1000);
        assert_eq!(records(1000, 3).len(), 1000);
        assert!(Corpus::Empty.generate(10, 0).is_empty());
    }
}
