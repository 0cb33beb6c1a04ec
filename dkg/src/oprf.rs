//! DH-OPRF over secp256k1 for the password-authenticated DKG mode.
//!
//! The user hashes its password to a curve point, blinds it with a random
//! scalar `r` and sends `α = r·H'(pw)`. The server answers `β = k·α` with
//! its OPRF key `k`. Unblinding yields `k·H'(pw)`, and the PRF output is
//! `H(pw ‖ H'(pw) ‖ k·H'(pw))` reduced into the scalar field. The server
//! learns nothing about the password; the user learns nothing about `k`
//! beyond the single PRF value.
//!
//! [`compute_share`] is the non-oblivious recomputation: with the server key
//! and the password in one place (e.g. a recovery flow) it reproduces the
//! same output without the blinding roundtrip.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{Field, UniformRand, Zero};
use rand::{CryptoRng, Rng};

use crate::curve::{hash_to_curve, hash_to_scalar, point_bytes, Affine, Scalar};
use crate::Error;

/// The user side of the OPRF exchange.
///
/// Holds the blinding scalar, so it is neither `Clone` nor `Debug`.
pub struct OprfRequester {
    password: Vec<u8>,
    blinding: Scalar,
    hashed_password: Affine,
}

impl OprfRequester {
    /// Blinds the password, returning the requester state and `α`.
    pub fn new<R: Rng + CryptoRng>(password: &[u8], rng: &mut R) -> (Self, Affine) {
        let blinding = loop {
            let candidate = Scalar::rand(rng);
            if !candidate.is_zero() {
                break candidate;
            }
        };
        let hashed_password = hash_to_curve(password);
        let alpha = (hashed_password * blinding).into_affine();
        (
            Self {
                password: password.to_vec(),
                blinding,
                hashed_password,
            },
            alpha,
        )
    }

    /// Unblinds the server response and derives the PRF output.
    ///
    /// # Errors
    /// Returns [`Error::IdentityPoint`] for an identity `β` and
    /// [`Error::ExceedMaxRetry`] if scalar derivation keeps rejecting.
    pub fn finalize(&self, beta: &Affine) -> Result<Scalar, Error> {
        if beta.is_zero() {
            return Err(Error::IdentityPoint);
        }
        let inverse = self
            .blinding
            .inverse()
            .expect("blinding scalar is nonzero by construction");
        let point = (*beta * inverse).into_affine();
        prf_output(&self.password, &self.hashed_password, &point)
    }
}

/// The server side of the OPRF exchange: holds the OPRF key `k`.
pub struct OprfEvaluator {
    key: Scalar,
}

impl OprfEvaluator {
    /// Samples a fresh OPRF key.
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let key = loop {
            let candidate = Scalar::rand(rng);
            if !candidate.is_zero() {
                break candidate;
            }
        };
        Self { key }
    }

    /// Uses a fixed OPRF key, for servers that evaluate the same PRF across
    /// sessions.
    ///
    /// # Errors
    /// Returns [`Error::IdentityPoint`] for a zero key.
    pub fn from_key(key: Scalar) -> Result<Self, Error> {
        if key.is_zero() {
            return Err(Error::IdentityPoint);
        }
        Ok(Self { key })
    }

    /// The OPRF key.
    pub fn key(&self) -> Scalar {
        self.key
    }

    /// Evaluates the blinded query: `β = k·α`.
    ///
    /// # Errors
    /// Returns [`Error::IdentityPoint`] if `α` is the identity.
    pub fn evaluate(&self, alpha: &Affine) -> Result<Affine, Error> {
        if alpha.is_zero() {
            return Err(Error::IdentityPoint);
        }
        Ok((*alpha * self.key).into_affine())
    }
}

fn prf_output(
    password: &[u8],
    hashed_password: &Affine,
    evaluated: &Affine,
) -> Result<Scalar, Error> {
    hash_to_scalar(&[
        password,
        &point_bytes(hashed_password),
        &point_bytes(evaluated),
    ])
}

/// Recomputes the PRF output directly from the server key and the password.
///
/// Matches what the OPRF roundtrip produces for the same `(k, pw)`; in the
/// password DKG this equals the joint secret.
///
/// # Errors
/// Returns [`Error::ExceedMaxRetry`] if scalar derivation keeps rejecting.
pub fn compute_share(key: &Scalar, password: &[u8]) -> Result<Scalar, Error> {
    let hashed_password = hash_to_curve(password);
    let evaluated = (hashed_password * key).into_affine();
    prf_output(password, &hashed_password, &evaluated)
}
