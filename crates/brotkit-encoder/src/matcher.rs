//! Backward-reference search
//!
//! Turns a range of the input into insert&copy commands. Every position
//! first probes the last distances, then the hash table, then (when nothing
//! was found) the static dictionary. Lazy matching defers a match while the
//! next position scores clearly better.

use brotkit_format::dictionary::longest_identity_match;
use brotkit_format::model::{DistanceInfo, DistanceRingBuffer, InsertCopyCommand};

use crate::hasher::{HashTable, MIN_SCORE, backward_reference_score, last_distance_score, match_length};
use crate::strategy::{EncoderStrategy, MatchMode};

/// Score a deferred match must gain over the current one
const LAZY_COST: u64 = 175;

/// Consecutive deferrals before a match is taken anyway
const MAX_DEFERRALS: usize = 4;

/// Bytes kept clear of the range end while skipping
const SKIP_MARGIN: usize = 4;

/// A scored back-reference or dictionary word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Found {
    length: usize,
    distance: usize,
    score: u64,
}

fn consider(best: &mut Option<Found>, found: Found) {
    if found.score > best.map_or(MIN_SCORE, |best| best.score) {
        *best = Some(found);
    }
}

/// Match finder over one input, shared by all of its meta-blocks
#[derive(Debug)]
pub struct Matcher<'a> {
    input: &'a [u8],
    table: HashTable,
    window: usize,
    lazy: bool,
    use_dictionary: bool,
    skip_window: usize,
    max_commands: usize,
}

impl<'a> Matcher<'a> {
    /// Matcher for `input` with back-references limited to `window` bytes
    ///
    /// The hash table shrinks for inputs much smaller than it.
    pub fn new(input: &'a [u8], strategy: &EncoderStrategy, window: u32) -> Self {
        let input_bits = usize::BITS - input.len().max(1).leading_zeros();
        let bucket_bits = u32::from(strategy.bucket_bits).min(input_bits.max(8));
        Self {
            input,
            table: HashTable::new(usize::from(strategy.hash_len), bucket_bits, u32::from(strategy.block_bits)),
            window: window as usize,
            lazy: strategy.mode == MatchMode::Lazy,
            use_dictionary: strategy.use_dictionary,
            skip_window: strategy.skip_window,
            max_commands: strategy.max_commands,
        }
    }

    fn find_longest_match(&self, position: usize, limit: usize, ring: &DistanceRingBuffer) -> Option<Found> {
        let input = self.input;
        let max_length = limit - position;
        let max_distance = position.min(self.window);
        let mut best: Option<Found> = None;

        for slot in 0..4 {
            let distance = ring.get(slot) as usize;
            if distance == 0 || distance > max_distance {
                continue;
            }
            let length = match_length(input, position, position - distance, max_length);
            if length >= 3 || (length == 2 && slot < 2) {
                consider(&mut best, Found {
                    length,
                    distance,
                    score: last_distance_score(length, slot),
                });
            }
        }

        for previous in self.table.candidates(input, position) {
            if previous >= position || position - previous > max_distance {
                continue;
            }
            let distance = position - previous;
            let length = match_length(input, position, previous, max_length);
            if length >= 4 {
                consider(&mut best, Found {
                    length,
                    distance,
                    score: backward_reference_score(length, distance),
                });
            }
        }

        if best.is_none()
            && self.use_dictionary
            && let Some(word) = longest_identity_match(&input[position..limit])
        {
            let distance = max_distance + 1 + word.word_id() as usize;
            let length = word.length as usize;
            consider(&mut best, Found {
                length,
                distance,
                score: backward_reference_score(length, distance),
            });
        }
        best
    }

    /// Commands covering `start..limit`, starting from the last distances `ring`
    ///
    /// Returns the commands and the position they end at, which is `limit`
    /// unless the command limit closed the range early. The final command
    /// only inserts literals when the range does not end with a copy.
    pub fn commands(
        &mut self,
        start: usize,
        limit: usize,
        ring: DistanceRingBuffer,
    ) -> (Vec<InsertCopyCommand>, usize) {
        let input = self.input;
        let mut ring = ring;
        let mut commands = Vec::new();
        let mut position = start;
        let mut insert_start = start;
        let mut end = limit;
        let mut skip_after = self.skip_after(start, 0);

        while position + 2 <= limit {
            if !commands.is_empty() && commands.len() + 1 >= self.max_commands {
                end = position;
                break;
            }
            let Some(mut found) = self.find_longest_match(position, limit, &ring) else {
                self.table.store(input, position);
                position += 1;
                if position > skip_after {
                    let (step, span) = if position > skip_after + 4 * self.skip_window {
                        (4, 16)
                    } else {
                        (2, 8)
                    };
                    let jump = (position + span).min(limit.saturating_sub(SKIP_MARGIN));
                    while position < jump {
                        self.table.store(input, position);
                        position += step;
                    }
                }
                continue;
            };
            self.table.store(input, position);

            if self.lazy {
                let mut deferrals = 0;
                while deferrals < MAX_DEFERRALS && position + 3 <= limit {
                    let next = self.find_longest_match(position + 1, limit, &ring);
                    self.table.store(input, position + 1);
                    match next {
                        Some(next) if next.score >= found.score + LAZY_COST => {
                            position += 1;
                            found = next;
                            deferrals += 1;
                        }
                        _ => break,
                    }
                }
            }

            commands.push(InsertCopyCommand::new(
                input[insert_start..position].to_vec(),
                found.length as u32,
                DistanceInfo::Value(found.distance as u32),
            ));
            let distance = found.distance as u32;
            if found.distance <= position.min(self.window) && distance != ring.last() {
                ring.push(distance);
            }
            self.table.store_range(input, position + 1..position + found.length);
            skip_after = self.skip_after(position, found.length);
            position += found.length;
            insert_start = position;
        }

        if insert_start < end {
            commands.push(InsertCopyCommand::literals_only(input[insert_start..end].to_vec()));
        }
        (commands, end)
    }

    fn skip_after(&self, position: usize, length: usize) -> usize {
        if self.skip_window == 0 {
            usize::MAX
        } else {
            position + 2 * length + self.skip_window
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use brotkit_format::test_utils::{Corpus, text};
    use brotkit_format::{GlobalState, WindowSize};
    use pretty_assertions::assert_eq;

    /// Replay commands the way the decoder does and return the output
    fn replay(commands: &[InsertCopyCommand], state: &mut GlobalState) -> Vec<u8> {
        let mut out = Vec::new();
        for command in commands {
            for &literal in &command.literals {
                state.output_literal(literal);
                out.push(literal);
            }
            let start = state.total_output();
            let info = match command.copy_distance {
                DistanceInfo::Value(distance) if distance == state.distances().last() && distance <= state.max_distance() => {
                    DistanceInfo::ExplicitCodeZero
                }
                info => info,
            };
            state.apply_copy(info, command.copy_length).unwrap();
            let produced = (state.total_output() - start) as u32;
            for back in (1..=produced).rev() {
                out.push(state.byte_at_distance(back));
            }
        }
        out
    }

    fn check(input: &[u8], strategy: &EncoderStrategy) -> Vec<InsertCopyCommand> {
        let window = WindowSize::new(22).unwrap();
        let mut matcher = Matcher::new(input, strategy, window.window_bytes());
        let (commands, end) = matcher.commands(0, input.len(), DistanceRingBuffer::new());
        assert_eq!(end, input.len());
        let mut state = GlobalState::new(window);
        assert_eq!(replay(&commands, &mut state), input);
        commands
    }

    #[test]
    fn test_repeated_bytes_become_one_copy() {
        let input = vec![b'z'; 1000];
        let commands = check(&input, &EncoderStrategy::greedy());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].literals, b"z");
        assert_eq!(commands[0].copy_distance, DistanceInfo::Value(1));
        assert_eq!(commands[0].copy_length, 999);
    }

    #[test]
    fn test_corpora_replay() {
        for corpus in Corpus::ALL {
            let input = corpus.generate(20_000, 7);
            for strategy in [EncoderStrategy::greedy(), EncoderStrategy::lazy(), EncoderStrategy::best()] {
                check(&input, &strategy);
            }
        }
    }

    #[test]
    fn test_dictionary_word_at_start() {
        let strategy = EncoderStrategy::lazy();
        let commands = check(b"time", &strategy);
        // Word 0 of length 4, one past the (empty) history
        assert_eq!(commands, vec![InsertCopyCommand::new(Vec::new(), 4, DistanceInfo::Value(1))]);

        let plain = check(b"time", &strategy.with_dictionary(false));
        assert_eq!(plain, vec![InsertCopyCommand::literals_only(b"time".to_vec())]);
    }

    #[test]
    fn test_command_limit_closes_range() {
        let input = text(50_000, 3);
        let strategy = EncoderStrategy {
            max_commands: 10,
            ..EncoderStrategy::greedy()
        };
        let window = WindowSize::new(22).unwrap();
        let mut matcher = Matcher::new(&input, &strategy, window.window_bytes());
        let (commands, end) = matcher.commands(0, input.len(), DistanceRingBuffer::new());
        assert!(commands.len() <= 10);
        assert!(end < input.len());
        let mut state = GlobalState::new(window);
        assert_eq!(replay(&commands, &mut state), &input[..end]);
    }

    #[test]
    fn test_window_limits_distance() {
        let window = WindowSize::new(10).unwrap();
        let block: Vec<u8> = brotkit_format::test_utils::noise(600, 1);
        let mut input = block.clone();
        input.extend(brotkit_format::test_utils::noise(2000, 2));
        input.extend(&block);
        let mut matcher = Matcher::new(&input, &EncoderStrategy::greedy(), window.window_bytes());
        let (commands, _) = matcher.commands(0, input.len(), DistanceRingBuffer::new());
        let mut position = 0usize;
        for command in &commands {
            position += command.literals.len();
            if let DistanceInfo::Value(distance) = command.copy_distance {
                assert!(distance as usize <= position.min(window.window_bytes() as usize));
            }
            position += command.copy_length as usize;
        }
    }
}
