//! Running decode/encode state shared by the reader, writer and encoder

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dictionary::DictionaryReference;
use crate::error::{FormatError, FormatResult};
use crate::model::{DistanceInfo, DistanceRingBuffer};
use crate::params::WindowSize;

/// Receives every byte appended to the output
pub trait OutputObserver: Send + Sync {
    /// Called with each run of produced bytes, in order
    fn observe(&mut self, bytes: &[u8]);
}

/// Handle returned when registering an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Observer collecting all output into a shared buffer
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputCapture {
    /// Empty capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Take the captured bytes, leaving the capture empty
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.bytes.lock())
    }

    /// Number of captured bytes
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }
}

impl OutputObserver for OutputCapture {
    fn observe(&mut self, bytes: &[u8]) {
        self.bytes.lock().extend_from_slice(bytes);
    }
}

/// Output history, last distances and output observers
///
/// The history keeps the last `1 << WBITS` bytes. Cloning copies history and
/// distances but not observers.
pub struct GlobalState {
    window_size: WindowSize,
    history: Vec<u8>,
    total: u64,
    distances: DistanceRingBuffer,
    scratch: Vec<u8>,
    observers: Vec<(ObserverId, Box<dyn OutputObserver>)>,
    next_observer: u64,
}

impl GlobalState {
    /// Fresh state for a stream with the given window
    pub fn new(window_size: WindowSize) -> Self {
        Self {
            window_size,
            history: Vec::new(),
            total: 0,
            distances: DistanceRingBuffer::new(),
            scratch: Vec::new(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Stream window size
    pub fn window_size(&self) -> WindowSize {
        self.window_size
    }

    /// Bytes produced so far
    pub fn total_output(&self) -> u64 {
        self.total
    }

    /// Largest distance that is a back-reference rather than a dictionary word
    pub fn max_distance(&self) -> u32 {
        self.total.min(u64::from(self.window_size.window_bytes())) as u32
    }

    /// Last distances
    pub fn distances(&self) -> &DistanceRingBuffer {
        &self.distances
    }

    /// Last distances, mutably
    pub fn distances_mut(&mut self) -> &mut DistanceRingBuffer {
        &mut self.distances
    }

    /// Byte `distance` positions back, or zero before the stream start
    pub fn byte_at_distance(&self, distance: u32) -> u8 {
        if distance == 0 || u64::from(distance) > self.total || distance as usize > self.history.len() {
            return 0;
        }
        let mask = self.window_size.buffer_bytes() - 1;
        self.history[(self.total - u64::from(distance)) as usize & mask]
    }

    /// Last (`p1`) and second-to-last (`p2`) output bytes
    pub fn last_bytes(&self) -> (u8, u8) {
        (self.byte_at_distance(1), self.byte_at_distance(2))
    }

    /// Register an observer
    pub fn add_observer(&mut self, observer: Box<dyn OutputObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    /// Unregister an observer
    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Box<dyn OutputObserver>> {
        let index = self.observers.iter().position(|(entry, _)| *entry == id)?;
        Some(self.observers.remove(index).1)
    }

    fn append(&mut self, byte: u8) {
        let capacity = self.window_size.buffer_bytes();
        if self.history.len() < capacity {
            self.history.push(byte);
        } else {
            self.history[self.total as usize & (capacity - 1)] = byte;
        }
        self.total += 1;
    }

    fn notify(&mut self, bytes: &[u8]) {
        for (_, observer) in &mut self.observers {
            observer.observe(bytes);
        }
    }

    /// Append one literal
    pub fn output_literal(&mut self, byte: u8) {
        self.append(byte);
        self.notify(&[byte]);
    }

    /// Append raw bytes
    pub fn output_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.append(byte);
        }
        self.notify(bytes);
    }

    /// Append a back-reference copy and return the copied bytes
    ///
    /// The copy may overlap the bytes it produces.
    pub fn output_copy(&mut self, distance: u32, length: u32) -> FormatResult<&[u8]> {
        if distance == 0 || distance > self.max_distance() {
            return Err(FormatError::InvalidDistance {
                code: distance,
                reason: format!("beyond {} bytes of history", self.max_distance()),
            });
        }
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        for _ in 0..length {
            let byte = self.byte_at_distance(distance);
            self.append(byte);
            scratch.push(byte);
        }
        self.notify(&scratch);
        self.scratch = scratch;
        Ok(&self.scratch)
    }

    /// Append a transformed dictionary word and return it
    pub fn output_dictionary(&mut self, reference: DictionaryReference) -> &[u8] {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        reference.write_into(&mut scratch);
        for &byte in &scratch {
            self.append(byte);
        }
        self.notify(&scratch);
        self.scratch = scratch;
        &self.scratch
    }
    /// Run the copy half of a command and return the number of bytes produced
    ///
    /// Distances beyond the history select a static dictionary word and leave
    /// the last distances untouched, as does distance code zero.
    pub fn apply_copy(&mut self, info: DistanceInfo, copy_length: u32) -> FormatResult<usize> {
        let distance = match info {
            DistanceInfo::EndsAfterLiterals => return Ok(0),
            DistanceInfo::ImplicitCodeZero | DistanceInfo::ExplicitCodeZero => self.distances.last(),
            DistanceInfo::Value(distance) => distance,
        };
        let max_distance = self.max_distance();
        if distance > max_distance {
            let reference = DictionaryReference::from_word_id(copy_length, distance - max_distance - 1)?;
            return Ok(self.output_dictionary(reference).len());
        }
        if !info.is_code_zero() {
            self.distances.push(distance);
        }
        Ok(self.output_copy(distance, copy_length)?.len())
    }
}

impl Clone for GlobalState {
    fn clone(&self) -> Self {
        Self {
            window_size: self.window_size,
            history: self.history.clone(),
            total: self.total,
            distances: self.distances,
            scratch: Vec::new(),
            observers: Vec::new(),
            next_observer: self.next_observer,
        }
    }
}

impl fmt::Debug for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalState")
            .field("window_size", &self.window_size)
            .field("total", &self.total)
            .field("distances", &self.distances)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(bits: u8) -> GlobalState {
        GlobalState::new(WindowSize::new(bits).unwrap())
    }

    #[test]
    fn test_overlapping_copy() {
        let mut state = state(16);
        state.output_bytes(b"ab");
        assert_eq!(state.output_copy(2, 5).unwrap(), b"ababa");
        assert_eq!(state.total_output(), 7);
        assert_eq!(state.last_bytes(), (b'a', b'b'));
    }

    #[test]
    fn test_copy_beyond_history_fails() {
        let mut state = state(16);
        state.output_bytes(b"abc");
        assert!(state.output_copy(4, 1).is_err());
        assert!(state.output_copy(0, 1).is_err());
    }

    #[test]
    fn test_history_wraps() {
        let mut state = state(10);
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        state.output_bytes(&data);
        assert_eq!(state.max_distance(), 1024 - 16);
        assert_eq!(state.byte_at_distance(1000), data[3000 - 1000]);
        assert_eq!(state.byte_at_distance(1), data[2999]);
    }

    #[test]
    fn test_observers_and_clone() {
        let capture = OutputCapture::new();
        let mut state = state(16);
        let id = state.add_observer(Box::new(capture.clone()));
        state.output_literal(b'x');
        state.output_copy(1, 3).unwrap();

        let mut copy = state.clone();
        copy.output_literal(b'y');
        assert_eq!(capture.contents(), b"xxxx");
        assert_eq!(copy.total_output(), 5);

        assert!(state.remove_observer(id).is_some());
        state.output_literal(b'z');
        assert_eq!(capture.take(), b"xxxx");
        assert!(capture.is_empty());
    }

    #[test]
    fn test_empty_state_context_bytes() {
        let state = state(22);
        assert_eq!(state.last_bytes(), (0, 0));
        assert_eq!(state.max_distance(), 0);
    }
}
