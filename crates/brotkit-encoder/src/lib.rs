//! Brotli encoder built on the brotkit-format stream model
//!
#![allow(clippy::cast_possible_truncation)] // Counts are bounded by the meta-block size
#![allow(clippy::cast_precision_loss)] // Entropy estimates work on f64
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::cast_sign_loss)] // Cost estimates are non-negative
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // RFC field names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::missing_errors_doc)] // Errors are documented on EncodeError
#![allow(clippy::missing_panics_doc)] // Indexing follows validated strategies
#![allow(clippy::must_use_candidate)] // Accessor noise
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! The encoder finds back-references with a bucketed hash table, turns them
//! into insert&copy commands, and builds a compressed meta-block model for
//! them: block splits, context maps, clustered prefix codes and distance
//! parameters. Every meta-block is replayed through the decoder state before
//! it is kept, so an encoded stream always decompresses to its input.
//!
//! # Pipeline
//!
//! - **Matching**: [`matcher::Matcher`] probes last distances, the hash
//!   table and the static dictionary
//! - **Modelling**: [`builder::Prepared`] derives histograms, block splits
//!   and clustered trees from the commands
//! - **Selection**: [`selection::pick_smallest`] keeps the cheapest of
//!   several candidate models, optionally in parallel
//!
//! # Example
//!
//! ```
//! use brotkit_encoder::{EncoderStrategy, compress};
//! use brotkit_format::BrotliFile;
//!
//! let input = b"one two one two one two one two".repeat(8);
//! let bytes = compress(&input, &EncoderStrategy::lazy()).unwrap();
//! assert!(bytes.len() < input.len());
//! assert_eq!(BrotliFile::decode(&bytes).unwrap().decompress().unwrap(), input);
//! ```

#![warn(missing_docs)]

/// Command preparation and meta-block construction
pub mod builder;
/// Histogram clustering
pub mod cluster;
/// Whole-stream encoding
pub mod encoder;
pub mod error;
/// Hash table and match scoring
pub mod hasher;
/// Symbol histograms and cost estimates
pub mod histogram;
pub mod matcher;
pub mod selection;
/// Block splitting of symbol streams
pub mod splitter;
/// Encoder strategies and quality presets
pub mod strategy;

pub use encoder::{compress, encode};
pub use error::{EncodeError, EncodeResult};
pub use selection::{Selected, pick_smallest};
pub use strategy::{EncoderStrategy, MatchMode};
