//! Commitments used by the DKG rounds.
//!
//! Round 1 hides each party's `u₀G` behind a salted hash commitment that
//! round 2 opens. Round 2 additionally publishes the Feldman commitment
//! vector `(f₀G, …, f_{t−1}G)`, against which every later share and public
//! share is verified.

use ark_ec::{AffineRepr, CurveGroup, VariableBaseMSM as _};
use rand::{CryptoRng, Rng};
use subtle::ConstantTimeEq;

use crate::birkhoff::birkhoff_weights;
use crate::curve::{point_bytes, Affine, Projective, Scalar};
use quorum_dkg_types::Bk;

const COMMIT_LABEL: &[u8] = b"QUORUM_POINT_COMMIT_V1";

fn commitment_digest(point: &Affine, salt: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(COMMIT_LABEL);
    hasher.update(salt);
    hasher.update(&point_bytes(point));
    *hasher.finalize().as_bytes()
}

/// A salted hash commitment to a curve point.
///
/// The committing party keeps this around until round 2, broadcasting the
/// digest first and the salt later.
#[derive(Debug, Clone)]
pub struct HashCommitter {
    point: Affine,
    salt: [u8; 32],
    digest: [u8; 32],
}

impl HashCommitter {
    /// Commits to a point with a fresh random salt.
    pub fn commit<R: Rng + CryptoRng>(point: Affine, rng: &mut R) -> Self {
        let mut salt = [0u8; 32];
        rng.fill_bytes(&mut salt);
        let digest = commitment_digest(&point, &salt);
        Self {
            point,
            salt,
            digest,
        }
    }

    /// The digest broadcast in round 1.
    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    /// The salt broadcast in round 2.
    pub fn salt(&self) -> [u8; 32] {
        self.salt
    }

    /// The committed point.
    pub fn point(&self) -> Affine {
        self.point
    }
}

/// Checks a commitment opening in constant time.
pub fn verify_opening(digest: &[u8; 32], salt: &[u8; 32], point: &Affine) -> bool {
    let expected = commitment_digest(point, salt);
    digest.ct_eq(&expected).into()
}

/// The Feldman commitment vector `(f₀G, f₁G, …, f_{t−1}G)` of a polynomial.
pub fn feldman_commit(coefficients: &[Scalar]) -> Vec<Affine> {
    coefficients
        .iter()
        .map(|c| (Affine::generator() * c).into_affine())
        .collect()
}

/// The public image of a party's share under a Feldman commitment: the
/// rank-aware evaluation `Σⱼ wⱼ(x, rank) · fⱼG`, computed by MSM.
pub fn feldman_expected_point(commitment: &[Affine], bk: &Bk) -> Projective {
    let weights = birkhoff_weights(bk, commitment.len());
    Projective::msm_unchecked(commitment, &weights)
}

/// Verifies a received share against the sender's Feldman commitment at the
/// recipient's Birkhoff parameter: `share·G == Σⱼ wⱼ fⱼG`.
pub fn feldman_verify(commitment: &[Affine], bk: &Bk, share: &Scalar) -> bool {
    let expected = feldman_expected_point(commitment, bk);
    Affine::generator() * share == expected
}
