//! Schnorr proofs of knowledge for final shares.
//!
//! After round 3 every party can compute `sᵢG` for every other party from
//! the published Feldman commitments, so a plain Schnorr proof over the
//! share scalar demonstrates that the party actually holds `sᵢ`. The
//! challenge is a blake3 XOF squeezed to 64 bytes before reduction, which
//! keeps the modulo bias negligible.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{PrimeField, UniformRand};
use rand::{CryptoRng, Rng};

use crate::curve::{point_bytes, Affine, Scalar};
use crate::Error;
use quorum_dkg_types::SchnorrProof;

const SCHNORR_LABEL: &[u8] = b"QUORUM_SCHNORR_POK_V1";

fn challenge(context: &[u8], commitment: &Affine, public: &Affine) -> Scalar {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SCHNORR_LABEL);
    hasher.update(context);
    hasher.update(&point_bytes(&Affine::generator()));
    hasher.update(&point_bytes(commitment));
    hasher.update(&point_bytes(public));
    let mut output = hasher.finalize_xof();
    // 64 bytes keep the statistical distance from uniform negligible.
    let mut unreduced = [0u8; 64];
    output.fill(&mut unreduced);
    Scalar::from_le_bytes_mod_order(&unreduced)
}

/// Proves knowledge of `share` for the public value `share·G`.
///
/// `context` binds the proof to the session and prover identity.
pub fn prove_share<R: Rng + CryptoRng>(
    share: &Scalar,
    context: &[u8],
    rng: &mut R,
) -> SchnorrProof {
    let nonce = Scalar::rand(rng);
    let commitment = (Affine::generator() * nonce).into_affine();
    let public = (Affine::generator() * share).into_affine();
    let e = challenge(context, &commitment, &public);
    SchnorrProof {
        commitment,
        response: nonce + e * share,
    }
}

/// Verifies a proof of knowledge against the expected public share.
///
/// # Errors
/// Returns [`Error::VerifyFailure`] if the verification equation
/// `zG == V + e·S` does not hold.
pub fn verify_share_proof(
    proof: &SchnorrProof,
    public: &Affine,
    context: &[u8],
) -> Result<(), Error> {
    let e = challenge(context, &proof.commitment, public);
    let lhs = Affine::generator() * proof.response;
    let rhs = (*public * e) + proof.commitment;
    if lhs != rhs {
        return Err(Error::VerifyFailure("schnorr proof"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn valid_proof_verifies() {
        let mut rng = ChaCha12Rng::seed_from_u64(21);
        let share = Scalar::rand(&mut rng);
        let public = (Affine::generator() * share).into_affine();
        let proof = prove_share(&share, b"party-0", &mut rng);
        assert!(verify_share_proof(&proof, &public, b"party-0").is_ok());
    }

    #[test]
    fn wrong_context_fails() {
        let mut rng = ChaCha12Rng::seed_from_u64(22);
        let share = Scalar::rand(&mut rng);
        let public = (Affine::generator() * share).into_affine();
        let proof = prove_share(&share, b"party-0", &mut rng);
        assert!(verify_share_proof(&proof, &public, b"party-1").is_err());
    }

    #[test]
    fn wrong_public_value_fails() {
        let mut rng = ChaCha12Rng::seed_from_u64(23);
        let share = Scalar::rand(&mut rng);
        let other = (Affine::generator() * Scalar::rand(&mut rng)).into_affine();
        let proof = prove_share(&share, b"party-0", &mut rng);
        assert!(verify_share_proof(&proof, &other, b"party-0").is_err());
    }
}
