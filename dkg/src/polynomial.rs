//! Secret-sharing polynomials over the curve's scalar field.
//!
//! The polynomial is `f(x) = a₀ + a₁x + … + a_{t−1}x^{t−1}` where `a₀` is
//! the party's secret contribution. Parties of rank `r` receive evaluations
//! of the `r`-th derivative, so evaluation is rank-aware.
//!
//! Coefficients are sensitive data: the type zeroizes on drop and does not
//! implement `Debug`.

use ark_ff::{UniformRand, Zero};
use itertools::izip;
use rand::{CryptoRng, Rng};
use zeroize::ZeroizeOnDrop;

use crate::birkhoff::birkhoff_weights;
use crate::curve::Scalar;
use quorum_dkg_types::Bk;

#[derive(Clone, ZeroizeOnDrop)]
pub(crate) struct Polynomial {
    coeffs: Vec<Scalar>,
}

impl Polynomial {
    // Samples a random polynomial of the given degree.
    pub(crate) fn random<R: Rng + CryptoRng>(degree: usize, rng: &mut R) -> Self {
        let secret = Scalar::rand(rng);
        Self::with_constant(secret, degree, rng)
    }

    // Samples a polynomial with a chosen constant term and random higher
    // coefficients. Password mode pins the constant term to the OPRF output
    // (user) or zero (server).
    pub(crate) fn with_constant<R: Rng + CryptoRng>(
        constant: Scalar,
        degree: usize,
        rng: &mut R,
    ) -> Self {
        let mut coeffs = Vec::with_capacity(degree + 1);
        coeffs.push(constant);
        for _ in 0..degree {
            coeffs.push(Scalar::rand(rng));
        }
        Self { coeffs }
    }

    #[cfg(test)]
    pub(crate) fn from_coefficients(coeffs: Vec<Scalar>) -> Self {
        Self { coeffs }
    }

    pub(crate) fn coefficients(&self) -> &[Scalar] {
        &self.coeffs
    }

    pub(crate) fn constant(&self) -> Scalar {
        self.coeffs[0]
    }

    // Evaluates the rank-th derivative at the Birkhoff point:
    // f^(r)(x) = Σ_{j ≥ r} j·(j−1)···(j−r+1) · aⱼ · x^{j−r}.
    pub(crate) fn birkhoff_evaluate(&self, bk: &Bk) -> Scalar {
        let weights = birkhoff_weights(bk, self.coeffs.len());
        let mut result = Scalar::zero();
        for (coeff, weight) in izip!(self.coeffs.iter(), weights.iter()) {
            result += *coeff * *weight;
        }
        result
    }
}
