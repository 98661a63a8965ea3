//! Error type shared by the codec, sequence and sketch layers.

use thiserror::Error;

/// Errors propagated synchronously by fallible operations.
///
/// An incomplete sketch decode is deliberately not represented here:
/// [`decode`](crate::sketch::Sketch::decode) always returns whatever it
/// peeled and callers compare against their expected count.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecomerError {
    /// Bad nucleotide character, empty input, or a zero sizing parameter.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A k-mer position outside the valid range.
    #[error("position {pos} out of bounds for length {len}")]
    OutOfBounds {
        /// The offending position.
        pos: usize,
        /// The length it was checked against.
        len: usize,
    },
    /// XOR of two packed k-mers with different lengths.
    #[error("length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),
}
