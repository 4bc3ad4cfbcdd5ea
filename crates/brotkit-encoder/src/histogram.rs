//! Symbol histograms and their bit costs

/// Estimated cost in bits of a prefix code description, by distinct symbol count
const SMALL_TREE_COST: [f64; 5] = [12.0, 12.0, 20.0, 28.0, 37.0];

/// Fixed part of a complex prefix code description
const COMPLEX_TREE_BASE_COST: f64 = 20.0;

/// Per-symbol part of a complex prefix code description
const COMPLEX_TREE_SYMBOL_COST: f64 = 2.0;

/// Symbol counts over a fixed alphabet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u32>,
    total: u64,
}

impl Histogram {
    /// Empty histogram over `alphabet_size` symbols
    pub fn new(alphabet_size: usize) -> Self {
        Self {
            counts: vec![0; alphabet_size],
            total: 0,
        }
    }

    /// Histogram of a symbol sequence
    pub fn from_symbols(alphabet_size: usize, symbols: impl IntoIterator<Item = usize>) -> Self {
        let mut histogram = Self::new(alphabet_size);
        for symbol in symbols {
            histogram.add(symbol);
        }
        histogram
    }

    /// Count one occurrence
    pub fn add(&mut self, symbol: usize) {
        self.counts[symbol] += 1;
        self.total += 1;
    }

    /// Add every count of `other`
    pub fn add_histogram(&mut self, other: &Self) {
        for (count, &more) in self.counts.iter_mut().zip(&other.counts) {
            *count += more;
        }
        self.total += other.total;
    }

    /// Sum of two histograms
    pub fn merged(&self, other: &Self) -> Self {
        let mut sum = self.clone();
        sum.add_histogram(other);
        sum
    }

    /// Reset every count
    pub fn clear(&mut self) {
        self.counts.fill(0);
        self.total = 0;
    }

    /// Counts indexed by symbol
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Number of counted symbols
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether nothing was counted
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of symbols with a non-zero count
    pub fn distinct(&self) -> usize {
        self.counts.iter().filter(|&&count| count > 0).count()
    }

    /// Shannon entropy of the data in bits, at least one bit per symbol
    pub fn bits_entropy(&self) -> f64 {
        bits_entropy(&self.counts)
    }

    /// Estimated bits for the data plus its prefix code description
    pub fn cost(&self) -> f64 {
        let distinct = self.distinct();
        match SMALL_TREE_COST.get(distinct) {
            Some(&tree) if distinct <= 1 => tree,
            Some(&tree) => tree + self.bits_entropy(),
            None => {
                COMPLEX_TREE_BASE_COST
                    + COMPLEX_TREE_SYMBOL_COST * distinct as f64
                    + self.bits_entropy()
            }
        }
    }
}

/// Shannon entropy of a population in bits, raised to one bit per symbol
///
/// A symbol costs at least one bit in a prefix code unless it is alone, which
/// the cost of its tree accounts for.
pub fn bits_entropy(counts: &[u32]) -> f64 {
    let total: u64 = counts.iter().map(|&count| u64::from(count)).sum();
    if total == 0 {
        return 0.0;
    }
    let total_f = total as f64;
    let mut entropy = total_f * total_f.log2();
    for &count in counts.iter().filter(|&&count| count > 0) {
        let count = f64::from(count);
        entropy -= count * count.log2();
    }
    entropy.max(total_f)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entropy_floor() {
        // One symbol: zero Shannon bits, floored to one bit each
        assert_eq!(bits_entropy(&[10, 0]), 10.0);
        // Two equally likely symbols: one bit each
        assert_eq!(bits_entropy(&[8, 8]), 16.0);
        // Four equally likely symbols: two bits each
        assert_eq!(bits_entropy(&[4, 4, 4, 4]), 32.0);
        assert_eq!(bits_entropy(&[0; 4]), 0.0);
    }

    #[test]
    fn test_merge() {
        let a = Histogram::from_symbols(4, [0, 0, 1]);
        let b = Histogram::from_symbols(4, [1, 3]);
        let sum = a.merged(&b);
        assert_eq!(sum.counts(), &[2, 2, 0, 1]);
        assert_eq!(sum.total(), 5);
        assert_eq!(sum.distinct(), 3);
    }

    #[test]
    fn test_cost_prefers_merging_similar() {
        let a = Histogram::from_symbols(256, (0..200).map(|i| i % 8));
        let b = Histogram::from_symbols(256, (0..200).map(|i| (i + 3) % 8));
        let merged = a.merged(&b);
        assert!(merged.cost() < a.cost() + b.cost());
    }
}
