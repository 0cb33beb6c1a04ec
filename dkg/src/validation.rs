//! Pairwise equality validation of an agreed hash value.
//!
//! Each directed pair of parties checks that both hold the same value `h`
//! without revealing anything else about it. The prover A encrypts `−h_A`
//! under its own Paillier key; the responder B masks the homomorphic
//! difference with a fresh uniform `s` and binds itself to `s` with a hash
//! commitment:
//!
//! 1. A → B: `e₀ = Enc_A(−h_A)`.
//! 2. B → A: `e₀^r · Enc_A(r·h_B + s)` and `H(s ‖ h_B)`, with
//!    `s ∈ [−2^1280, 2^1280]` and `r ∈ [−2^128, 2^128]`.
//! 3. A decrypts `r·(h_B − h_A) + s`, recenters it into `(−n/2, n/2]`, and
//!    checks it against the commitment under its own `h_A`. The check can
//!    only pass when `h_A = h_B` (up to the negligible chance of `r = 0` or
//!    a mask collision).
//!
//! Prover sessions hold one-shot randomness and are not `Clone`; they do not
//! implement `Debug` either.

use std::sync::Arc;

use num_bigint::{BigInt, RandBigInt};
use rand::{CryptoRng, Rng};
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;

use crate::paillier::{pow_signed, PaillierKeyPair, PaillierPublicKey};
use crate::Error;
use quorum_dkg_types::{ValidationEncMsg, ValidationReplyMsg};

// Bit lengths of the responder's mask and multiplier.
const MASK_BITS: u64 = 1280;
const MULTIPLIER_BITS: u64 = 128;

const COMMIT_LABEL: &[u8] = b"QUORUM_VALIDATION_COMMIT_V1";

fn mask_commitment(mask: &BigInt, h: &BigInt) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(COMMIT_LABEL);
    hasher.update(mask.to_signed_bytes_be());
    hasher.update(h.to_signed_bytes_be());
    hasher.finalize().into()
}

// Uniform signed value in [-2^bits, 2^bits].
fn random_signed<R: Rng + CryptoRng>(bits: u64, rng: &mut R) -> BigInt {
    let magnitude = BigInt::from(rng.gen_biguint(bits));
    if rng.gen_bool(0.5) {
        -magnitude
    } else {
        magnitude
    }
}

/// The prover side of one directed validation pair.
///
/// Created per peer; holds the prover's claimed value and its ciphertext so
/// the reply can be checked in round 3.
pub struct EqualityProver {
    keys: Arc<PaillierKeyPair>,
    h: BigInt,
}

impl EqualityProver {
    /// Starts a validation exchange: encrypts `−h` under the prover's key
    /// and returns the message for the responder.
    pub fn new<R: Rng + CryptoRng>(
        keys: Arc<PaillierKeyPair>,
        h: BigInt,
        rng: &mut R,
    ) -> (Self, ValidationEncMsg) {
        let (ciphertext, _salt) = keys.public_key().encrypt(&-&h, rng);
        let msg = ValidationEncMsg {
            modulus: keys.public_key().n().clone(),
            ciphertext,
        };
        (Self { keys, h }, msg)
    }

    /// Round 3: decrypts the responder's reply and checks it against the
    /// binding commitment under the prover's own `h`.
    ///
    /// # Errors
    /// Returns [`Error::EncryptionMsgWrong`] for an out-of-range ciphertext
    /// and [`Error::VerifyFailure`] when the recovered mask does not match
    /// the commitment, i.e. when the two values differ.
    pub fn verify_reply(&self, reply: &ValidationReplyMsg) -> Result<(), Error> {
        let recovered = self.keys.decrypt_signed(&reply.ciphertext)?;
        let expected = mask_commitment(&recovered, &self.h);
        let matches: bool = expected.ct_eq(&reply.commitment).into();
        if !matches {
            return Err(Error::VerifyFailure("validation commitment"));
        }
        Ok(())
    }
}

/// The responder side: masks the homomorphic difference and commits to the
/// mask.
///
/// # Errors
/// Returns [`Error::EncryptionMsgWrong`] if the prover's ciphertext is not
/// in `[1, n²)`.
pub fn respond<R: Rng + CryptoRng>(
    enc: &ValidationEncMsg,
    h: &BigInt,
    rng: &mut R,
) -> Result<ValidationReplyMsg, Error> {
    let pk = PaillierPublicKey::new(enc.modulus.clone());
    pk.check_ciphertext(&enc.ciphertext)?;

    let s = random_signed(MASK_BITS, rng);
    let r = random_signed(MULTIPLIER_BITS, rng);

    // e₀^r · Enc(r·h + s) = Enc(r·(h − h_A) + s).
    let scaled = pow_signed(&enc.ciphertext, &r, pk.nn())?;
    let (masked, _salt) = pk.encrypt(&(&r * h + &s), rng);
    let ciphertext = scaled * masked % pk.nn();

    Ok(ValidationReplyMsg {
        ciphertext,
        commitment: mask_commitment(&s, h),
    })
}
