//! Curve type aliases and hash-to-field / hash-to-curve helpers.
//!
//! The protocol runs over secp256k1. Scalars derived from digests use
//! SHA3-256 with rejection sampling: a digest that does not fall below the
//! group order is rehashed, up to a bounded number of retries.

use ark_ec::AffineRepr;
use ark_ff::PrimeField;
use num_bigint::BigUint;
use sha3::{Digest, Sha3_256};

use crate::Error;

pub use quorum_dkg_types::{Affine, BaseField, Curve, Projective, Scalar};

/// Retry bound for digest-to-scalar rejection sampling.
pub const MAX_HASH_RETRIES: usize = 128;

const HASH_TO_CURVE_LABEL: &[u8] = b"QUORUM_H2C_V1";

fn sha3_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derives a scalar from the SHA3-256 digest of the concatenated parts.
///
/// The digest is interpreted as a big-endian integer and rejected when it is
/// not below the group order; rejection rehashes the digest and retries.
///
/// # Errors
/// Returns [`Error::ExceedMaxRetry`] after [`MAX_HASH_RETRIES`] rejections.
pub fn hash_to_scalar(parts: &[&[u8]]) -> Result<Scalar, Error> {
    let modulus: BigUint = Scalar::MODULUS.into();
    let mut digest = sha3_parts(parts);
    for _ in 0..MAX_HASH_RETRIES {
        if BigUint::from_bytes_be(&digest) < modulus {
            return Ok(Scalar::from_be_bytes_mod_order(&digest));
        }
        digest = sha3_parts(&[&digest]);
    }
    Err(Error::ExceedMaxRetry)
}

/// Deterministically maps a byte string to a non-identity curve point by
/// try-and-increment over SHA3-256 candidates.
///
/// secp256k1 has cofactor 1, so any on-curve point is in the prime-order
/// group. Roughly half of all candidates yield a point; the counter loop
/// terminates after a handful of attempts in practice.
pub fn hash_to_curve(input: &[u8]) -> Affine {
    let mut counter: u64 = 0;
    loop {
        let digest = sha3_parts(&[HASH_TO_CURVE_LABEL, input, &counter.to_be_bytes()]);
        let x = BaseField::from_be_bytes_mod_order(&digest);
        if let Some(point) = Affine::get_point_from_x_unchecked(x, false) {
            if !point.is_zero() {
                debug_assert!(point.is_on_curve());
                return point;
            }
        }
        counter += 1;
    }
}

/// Serializes an affine point into canonical compressed bytes.
pub(crate) fn point_bytes(point: &Affine) -> Vec<u8> {
    use ark_serialize::CanonicalSerialize;
    let mut buf = Vec::with_capacity(point.compressed_size());
    point
        .serialize_compressed(&mut buf)
        .expect("compressed point serializes into a vec");
    buf
}

/// Serializes a scalar into its fixed-width big-endian byte representation.
pub(crate) fn scalar_bytes(scalar: &Scalar) -> Vec<u8> {
    use ark_ff::BigInteger;
    scalar.into_bigint().to_bytes_be()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::Zero;

    #[test]
    fn hash_to_scalar_is_deterministic() {
        let a = hash_to_scalar(&[b"password", b"salt"]).expect("derives");
        let b = hash_to_scalar(&[b"password", b"salt"]).expect("derives");
        assert_eq!(a, b);
        let c = hash_to_scalar(&[b"password", b"other"]).expect("derives");
        assert_ne!(a, c);
    }

    #[test]
    fn hash_to_scalar_is_sensitive_to_part_boundaries() {
        let a = hash_to_scalar(&[b"ab", b"c"]).expect("derives");
        let b = hash_to_scalar(&[b"a", b"bc"]).expect("derives");
        // SHA3 over the plain concatenation: both are hashes of "abc".
        assert_eq!(a, b);
    }

    #[test]
    fn hash_to_curve_lands_on_curve() {
        for input in [b"".as_slice(), b"edwin-haha", b"another password"] {
            let p = hash_to_curve(input);
            assert!(p.is_on_curve());
            assert!(!p.is_zero());
            assert_eq!(p, hash_to_curve(input));
        }
    }

    #[test]
    fn scalar_bytes_are_fixed_width() {
        assert_eq!(scalar_bytes(&Scalar::zero()).len(), 32);
        assert_eq!(scalar_bytes(&Scalar::from(1u64)).len(), 32);
    }
}
