#![deny(missing_docs, clippy::unwrap_used)]
//! Arithmetic in the ideal class group of an imaginary quadratic field,
//! represented by primitive positive-definite binary quadratic forms.
//!
//! A form `(a, b, c)` stands for `ax² + bxy + cy²` with negative discriminant
//! `D = b² − 4ac`. Every class has a unique reduced representative, which
//! [`BinaryQuadraticForm::reduce`] computes. Composition uses NUCOMP with a
//! partial extended gcd to keep intermediates small, and exponentiation walks
//! a signed 2,3-addition-subtraction chain over specialized squaring and
//! cubing routines.
//!
//! Forms are immutable values; every operation returns a fresh reduced form.

use num_bigint::BigInt;

mod chain;
mod form;
mod partial_gcd;

pub use chain::{ChainTerm, expansion_chain};
pub use form::BinaryQuadraticForm;

/// Errors raised when constructing a binary quadratic form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The discriminant `b² − 4ac` must be negative for a positive-definite form.
    #[error("discriminant must be negative, got {0}")]
    NonNegativeDiscriminant(BigInt),
}
