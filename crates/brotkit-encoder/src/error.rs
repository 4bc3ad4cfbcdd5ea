//! Encoder error types

use brotkit_format::FormatError;
use thiserror::Error;

/// Error raised while encoding
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Format-level failure while building or measuring a model
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Every candidate of a selection step failed
    #[error("no viable candidate for {stage} ({tried} tried): {last_error}")]
    NoViableCandidate {
        /// Selection step
        stage: &'static str,
        /// Number of candidates evaluated
        tried: usize,
        /// Error of the last failing candidate
        last_error: String,
    },

    /// Strategy values outside their ranges
    #[error("invalid encoder strategy: {0}")]
    InvalidStrategy(String),

    /// Replaying an encoded meta-block did not reproduce the input
    #[error("encoded meta-block diverges from the input at byte {offset}")]
    OutputMismatch {
        /// Input offset of the first differing byte
        offset: usize,
    },
}

/// Result type for encoding
pub type EncodeResult<T> = Result<T, EncodeError>;

impl EncodeError {
    /// Whether the error came from a candidate that could not represent its input
    ///
    /// Such errors are recovered by trying other candidates.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Format(error) => !error.is_structural(),
            Self::NoViableCandidate { .. } => true,
            Self::InvalidStrategy(_) | Self::OutputMismatch { .. } => false,
        }
    }
}
