//! Pick the cheapest of several candidate encodings
//!
//! Every candidate is built and measured; candidates that fail with a
//! recoverable error are dropped. With the `parallel` feature candidates are
//! evaluated on the rayon thread pool.

use std::fmt::Debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::trace;

use crate::error::{EncodeError, EncodeResult};

/// The winning candidate of a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected<C, T> {
    /// Candidate parameters
    pub candidate: C,
    /// What the candidate built
    pub value: T,
    /// Its cost
    pub cost: usize,
}

fn evaluate<C, T>(
    stage: &'static str,
    candidate: &C,
    build: &(impl Fn(&C) -> EncodeResult<T> + Sync),
    cost: &(impl Fn(&T) -> EncodeResult<usize> + Sync),
) -> EncodeResult<(T, usize)>
where
    C: Debug,
{
    let value = build(candidate)?;
    let size = cost(&value)?;
    trace!("{stage}: candidate {candidate:?} costs {size}");
    Ok((value, size))
}

/// Build every candidate and return the cheapest
///
/// Ties go to the earliest candidate. Recoverable failures are skipped;
/// any other failure is returned at once. When every candidate fails the
/// result is [`EncodeError::NoViableCandidate`].
pub fn pick_smallest<C, T>(
    stage: &'static str,
    candidates: &[C],
    build: impl Fn(&C) -> EncodeResult<T> + Sync,
    cost: impl Fn(&T) -> EncodeResult<usize> + Sync,
) -> EncodeResult<Selected<C, T>>
where
    C: Clone + Debug + Sync,
    T: Send,
{
    #[cfg(feature = "parallel")]
    let results: Vec<EncodeResult<(T, usize)>> = candidates
        .par_iter()
        .map(|candidate| evaluate(stage, candidate, &build, &cost))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<EncodeResult<(T, usize)>> = candidates
        .iter()
        .map(|candidate| evaluate(stage, candidate, &build, &cost))
        .collect();

    let mut best: Option<Selected<C, T>> = None;
    let mut last_error = None;
    for (candidate, result) in candidates.iter().zip(results) {
        match result {
            Ok((value, size)) => {
                if best.as_ref().is_none_or(|best| size < best.cost) {
                    best = Some(Selected {
                        candidate: candidate.clone(),
                        value,
                        cost: size,
                    });
                }
            }
            Err(error) if error.is_recoverable() => {
                trace!("{stage}: candidate {candidate:?} failed: {error}");
                last_error = Some(error);
            }
            Err(error) => return Err(error),
        }
    }
    best.ok_or_else(|| EncodeError::NoViableCandidate {
        stage,
        tried: candidates.len(),
        last_error: last_error.map_or_else(|| "no candidates".to_string(), |error| error.to_string()),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use brotkit_format::FormatError;
    use pretty_assertions::assert_eq;

    fn out_of_range() -> EncodeError {
        EncodeError::Format(FormatError::OutOfRange {
            name: "test",
            value: 9,
            min: 0,
            max: 1,
        })
    }

    #[test]
    fn test_smallest_wins_and_ties_keep_order() {
        let candidates = [5usize, 3, 8, 3];
        let selected = pick_smallest("test", &candidates, |&c| Ok(vec![0u8; c]), |v| Ok(v.len())).unwrap();
        assert_eq!(selected.cost, 3);
        assert_eq!(selected.candidate, 3);
        assert_eq!(selected.value.len(), 3);
    }

    #[test]
    fn test_failures_are_skipped() {
        let selected = pick_smallest(
            "test",
            &[1u32, 2, 3],
            |&c| if c == 1 { Err(out_of_range()) } else { Ok(c) },
            |&v| Ok(v as usize * 10),
        )
        .unwrap();
        assert_eq!(selected.candidate, 2);
        assert_eq!(selected.cost, 20);
    }

    #[test]
    fn test_all_failing() {
        let error = pick_smallest("stage", &[1u32, 2], |_| Err::<u32, _>(out_of_range()), |_| Ok(0)).unwrap_err();
        match error {
            EncodeError::NoViableCandidate { stage, tried, .. } => {
                assert_eq!(stage, "stage");
                assert_eq!(tried, 2);
            }
            other => panic!("unexpected error {other}"),
        }
        let empty: [u32; 0] = [];
        assert!(matches!(
            pick_smallest("empty", &empty, |&c| Ok(c), |_| Ok(0)),
            Err(EncodeError::NoViableCandidate { tried: 0, .. })
        ));
    }

    #[test]
    fn test_fatal_error_propagates() {
        let error = pick_smallest(
            "test",
            &[1u32, 2],
            |_| Err::<u32, _>(EncodeError::OutputMismatch { offset: 4 }),
            |_| Ok(0),
        )
        .unwrap_err();
        assert!(matches!(error, EncodeError::OutputMismatch { offset: 4 }));
    }
}
