//! Bucketed hash table of earlier input positions
//!
//! Each bucket keeps the last `1 << block_bits` positions whose next
//! `hash_len` bytes hash to it, overwriting the oldest entry in a ring.

/// Score of a zero-length match at distance one
pub const SCORE_BASE: u64 = 1920;

/// Score a candidate must beat to become a match
pub const MIN_SCORE: u64 = SCORE_BASE + 100;

/// Score gain per matched byte
const LENGTH_SCORE: u64 = 135;

/// Score loss per bit of distance
const DISTANCE_SCORE: u64 = 30;

/// Bonus for reusing a last distance
const LAST_DISTANCE_BONUS: u64 = 15;

/// Penalty for last distance slots 0..4
const LAST_DISTANCE_PENALTY: [u64; 4] = [0, 39, 43, 43];

const HASH_MULTIPLIER: u64 = 0x1FE3_5A7B_D357_9BD3;

/// Score of a back-reference of `length` bytes at `distance`
pub fn backward_reference_score(length: usize, distance: usize) -> u64 {
    let log = u64::from(usize::BITS - 1 - distance.max(1).leading_zeros());
    SCORE_BASE + LENGTH_SCORE * length as u64 - DISTANCE_SCORE * log
}

/// Score of a copy of `length` bytes from last distance slot `slot`
pub fn last_distance_score(length: usize, slot: usize) -> u64 {
    SCORE_BASE + LENGTH_SCORE * length as u64 + LAST_DISTANCE_BONUS - LAST_DISTANCE_PENALTY[slot]
}

/// Number of equal bytes at `a` and `b`, at most `limit`
pub fn match_length(input: &[u8], a: usize, b: usize, limit: usize) -> usize {
    input[a..]
        .iter()
        .zip(&input[b..])
        .take(limit)
        .take_while(|(x, y)| x == y)
        .count()
}

/// Hash table keyed by the next `hash_len` input bytes
#[derive(Debug)]
pub struct HashTable {
    hash_len: usize,
    bucket_bits: u32,
    block_bits: u32,
    num: Vec<u32>,
    buckets: Vec<u32>,
    next_store: usize,
}

impl HashTable {
    /// Table with `1 << bucket_bits` buckets of `1 << block_bits` positions
    pub fn new(hash_len: usize, bucket_bits: u32, block_bits: u32) -> Self {
        Self {
            hash_len,
            bucket_bits,
            block_bits,
            num: vec![0; 1 << bucket_bits],
            buckets: vec![0; 1 << (bucket_bits + block_bits)],
            next_store: 0,
        }
    }

    /// Bytes hashed per position
    pub fn hash_len(&self) -> usize {
        self.hash_len
    }

    fn key(&self, input: &[u8], position: usize) -> usize {
        let mut bytes = [0u8; 8];
        bytes[..self.hash_len].copy_from_slice(&input[position..position + self.hash_len]);
        let value = u64::from_le_bytes(bytes) << (64 - 8 * self.hash_len as u32);
        (value.wrapping_mul(HASH_MULTIPLIER) >> (64 - self.bucket_bits)) as usize
    }

    /// Record `position`; positions must be stored in increasing order
    ///
    /// Positions already stored and positions too close to the end of
    /// `input` to hash are ignored.
    pub fn store(&mut self, input: &[u8], position: usize) {
        if position < self.next_store || position + self.hash_len > input.len() {
            return;
        }
        let key = self.key(input, position);
        let mask = (1u32 << self.block_bits) - 1;
        let slot = (key << self.block_bits) + (self.num[key] & mask) as usize;
        self.buckets[slot] = position as u32;
        self.num[key] = self.num[key].wrapping_add(1);
        self.next_store = position + 1;
    }

    /// Record every position in `range`
    pub fn store_range(&mut self, input: &[u8], range: std::ops::Range<usize>) {
        for position in range {
            self.store(input, position);
        }
    }

    /// Stored positions sharing the bucket of `position`, newest first
    pub fn candidates(&self, input: &[u8], position: usize) -> impl Iterator<Item = usize> + '_ {
        let (key, count) = if position + self.hash_len > input.len() {
            (0, 0)
        } else {
            let key = self.key(input, position);
            (key, self.num[key])
        };
        let mask = (1u32 << self.block_bits) - 1;
        let stored = count.min(1 << self.block_bits);
        (1..=stored).map(move |back| {
            let slot = (key << self.block_bits) + (count.wrapping_sub(back) & mask) as usize;
            self.buckets[slot] as usize
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scores() {
        assert_eq!(backward_reference_score(4, 1), 1920 + 540);
        assert_eq!(backward_reference_score(4, 1024), 1920 + 540 - 300);
        assert_eq!(last_distance_score(4, 0), 1920 + 540 + 15);
        assert_eq!(last_distance_score(4, 2), 1920 + 540 + 15 - 43);
        // A short match far away does not beat the minimum
        assert!(backward_reference_score(4, 1 << 20) < MIN_SCORE);
    }

    #[test]
    fn test_match_length() {
        let input = b"abcabcabd";
        assert_eq!(match_length(input, 3, 0, 10), 5);
        assert_eq!(match_length(input, 3, 0, 2), 2);
        assert_eq!(match_length(input, 1, 0, 10), 0);
    }

    #[test]
    fn test_candidates_newest_first() {
        let input = b"abcdXabcdYabcdZabcd";
        let mut table = HashTable::new(4, 16, 3);
        table.store_range(input, 0..15);
        let found: Vec<usize> = table
            .candidates(input, 15)
            .filter(|&position| input[position..position + 4] == input[15..19])
            .collect();
        assert_eq!(found, vec![10, 5, 0]);
    }

    #[test]
    fn test_bucket_keeps_latest() {
        let input = vec![b'a'; 64];
        let mut table = HashTable::new(4, 8, 1);
        table.store_range(&input, 0..10);
        let found: Vec<usize> = table.candidates(&input, 20).collect();
        assert_eq!(found, vec![9, 8]);
    }

    #[test]
    fn test_store_is_idempotent() {
        let input = vec![b'a'; 16];
        let mut table = HashTable::new(4, 8, 2);
        table.store(&input, 3);
        table.store(&input, 3);
        table.store(&input, 2);
        assert_eq!(table.candidates(&input, 5).collect::<Vec<_>>(), vec![3]);
        // Too close to the end to hash
        table.store(&input, 13);
        assert_eq!(table.candidates(&input, 5).count(), 1);
    }
}
