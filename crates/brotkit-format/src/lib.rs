//! Bit-exact model of Brotli (RFC 7932) streams
//!
#![allow(clippy::cast_possible_truncation)] // Bit fields are narrowed after range checks
#![allow(clippy::cast_possible_wrap)] // Intentional for distance arithmetic
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::cast_sign_loss)] // Signed distances are checked before narrowing
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // RFC field names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // p1/p2, code/codes and friends
#![allow(clippy::unreadable_literal)] // Packed lookup constants
#![allow(clippy::missing_errors_doc)] // Errors are documented on FormatError
#![allow(clippy::missing_panics_doc)] // Indexing follows validated headers
#![allow(clippy::must_use_candidate)] // Accessor noise
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
//! This crate turns Brotli bitstreams into a typed model and back. Every
//! meta-block, prefix code, context map and command is represented so that
//! a decoded stream can be inspected, modified and serialized again.
//!
//! # Layers
//!
//! - **Bit I/O**: LSB-first [`bit::BitReader`] and [`bit::BitSink`] with
//!   optional provenance [`markers`]
//! - **Huffman**: canonical prefix codes and their simple / complex
//!   descriptions
//! - **Model**: meta-blocks, block types, context maps, distances and
//!   insert&copy commands
//! - **State**: the output window and last distances shared by decoding,
//!   serialization and encoding
//!
//! # Example
//!
//! ```
//! use brotkit_format::{BrotliFile, MetaBlock, SerializationParameters, WindowSize};
//!
//! let file = BrotliFile::new(
//!     WindowSize::default(),
//!     vec![
//!         MetaBlock::Uncompressed { data: b"hello".to_vec() },
//!         MetaBlock::LastEmpty,
//!     ],
//! );
//! let bytes = file.serialize(&SerializationParameters::default()).unwrap();
//! assert_eq!(BrotliFile::decode(&bytes).unwrap().decompress().unwrap(), b"hello");
//! ```

#![warn(missing_docs)]

/// Bit reader, bit sinks and code paths
pub mod bit;
/// Static dictionary words and transforms
pub mod dictionary;
pub mod error;
/// Stream decoding, serialization and decompression
pub mod file;
/// Canonical prefix codes
pub mod huffman;
/// Bit-range provenance of decoded fields
pub mod markers;
pub mod model;
/// Window size and serialization parameters
pub mod params;
/// Output window, last distances and output observers
pub mod state;
/// Sample inputs for tests and benchmarks
pub mod test_utils;

pub use error::{FormatError, FormatResult};
pub use file::{BrotliFile, BrotliFormat};
pub use markers::{MarkerNode, MarkerRoot};
pub use model::MetaBlock;
pub use params::{ContextMapRle, FileParameters, HuffmanTreeRle, SerializationParameters, WindowSize};
pub use state::{GlobalState, ObserverId, OutputCapture, OutputObserver};
