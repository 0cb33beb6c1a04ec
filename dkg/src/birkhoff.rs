//! Birkhoff (Hermite-style) interpolation over the scalar field.
//!
//! Every party contributes an evaluation of the `rank`-th derivative of the
//! joint polynomial at its point `x`. Reconstructing the secret `f(0)` from
//! such mixed evaluations is Birkhoff interpolation: the evaluations relate
//! to the coefficient vector through a structured matrix, and the secret is
//! a fixed linear combination of the evaluations whose weights come from the
//! first row of the inverted interpolation matrix.
//!
//! With all ranks zero this degenerates to ordinary Lagrange interpolation
//! at zero.

use std::collections::BTreeMap;

use ark_ff::Zero;

use crate::curve::Scalar;
use crate::matrix::Matrix;
use crate::Error;
use quorum_dkg_types::{Bk, PartyId};

/// The row of weights relating a party's evaluation to the coefficient
/// vector: entry `j` is the coefficient of `aⱼ` in `f^(rank)(x)`, i.e.
/// `j·(j−1)···(j−rank+1) · x^{j−rank}` (zero for `j < rank`).
pub(crate) fn birkhoff_weights(bk: &Bk, len: usize) -> Vec<Scalar> {
    let mut weights = vec![Scalar::zero(); len];
    let rank = bk.rank as usize;
    let mut x_power = Scalar::from(1u64);
    for j in rank..len {
        // Falling factorial j! / (j - rank)!.
        let mut fall = Scalar::from(1u64);
        for i in 0..rank {
            fall *= Scalar::from((j - i) as u64);
        }
        weights[j] = fall * x_power;
        x_power *= bk.x;
    }
    weights
}

fn interpolation_matrix(bks: &[&Bk], threshold: usize) -> Matrix {
    Matrix::new(
        bks.iter()
            .map(|bk| birkhoff_weights(bk, threshold))
            .collect(),
    )
}

/// Checks that a set of Birkhoff parameters can reconstruct a secret shared
/// with the given threshold.
///
/// Requirements: at least `threshold` parties; all evaluation points
/// distinct and nonzero; every rank below the threshold; the ranks satisfy
/// the Pólya condition (the `i`-th smallest rank is at most `i`); and the
/// interpolation matrix has full column rank.
///
/// # Errors
/// Returns [`Error::InvalidBks`] naming the violated requirement.
pub fn check_bks(bks: &[&Bk], threshold: usize) -> Result<(), Error> {
    if bks.len() < threshold {
        return Err(Error::InvalidBks("fewer parties than the threshold"));
    }
    for (i, bk) in bks.iter().enumerate() {
        if bk.x.is_zero() {
            return Err(Error::InvalidBks("zero evaluation point"));
        }
        if bk.rank as usize >= threshold {
            return Err(Error::InvalidBks("rank not below threshold"));
        }
        for other in &bks[i + 1..] {
            if bk.x == other.x {
                return Err(Error::InvalidBks("duplicate evaluation point"));
            }
        }
    }
    let mut ranks: Vec<u32> = bks.iter().map(|bk| bk.rank).collect();
    ranks.sort_unstable();
    if ranks.iter().enumerate().any(|(i, &r)| r as usize > i) {
        return Err(Error::InvalidBks("ranks violate the polya condition"));
    }
    let matrix = interpolation_matrix(bks, threshold);
    if matrix.independent_rows(threshold).is_none() {
        return Err(Error::InvalidBks("interpolation matrix is rank-deficient"));
    }
    Ok(())
}

/// Computes the Birkhoff coefficient of every party for reconstructing
/// `f(0)` at the given threshold.
///
/// Deterministic across parties: rows are processed in party-id order and
/// the first `threshold` linearly independent ones carry the weights from
/// the inverted submatrix; all remaining parties get weight zero. The
/// secret is then `Σᵢ bᵢ · sᵢ` over the parties' shares `sᵢ`.
///
/// # Errors
/// Returns [`Error::InvalidBks`] if the set cannot interpolate.
pub fn birkhoff_coefficients(
    bks: &BTreeMap<PartyId, Bk>,
    threshold: usize,
) -> Result<BTreeMap<PartyId, Scalar>, Error> {
    let ordered: Vec<(&PartyId, &Bk)> = bks.iter().collect();
    let refs: Vec<&Bk> = ordered.iter().map(|(_, bk)| *bk).collect();
    check_bks(&refs, threshold)?;

    let matrix = interpolation_matrix(&refs, threshold);
    let rows = matrix
        .independent_rows(threshold)
        .ok_or(Error::InvalidBks("interpolation matrix is rank-deficient"))?;
    let submatrix = matrix.select_rows(&rows);
    let inverse = submatrix
        .inverse()
        .ok_or(Error::InvalidBks("interpolation matrix is rank-deficient"))?;

    let mut coefficients: BTreeMap<PartyId, Scalar> = ordered
        .iter()
        .map(|(id, _)| (**id, Scalar::zero()))
        .collect();
    for (col, &row) in rows.iter().enumerate() {
        let (id, _) = ordered[row];
        coefficients.insert(*id, inverse.entry(0, col));
    }
    Ok(coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::Polynomial;
    use ark_ff::UniformRand;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn bk(x: u64, rank: u32) -> Bk {
        Bk::new(Scalar::from(x), rank)
    }

    fn reconstruct(bks: &BTreeMap<PartyId, Bk>, poly: &Polynomial, threshold: usize) -> Scalar {
        let coeffs = birkhoff_coefficients(bks, threshold).expect("valid bks");
        bks.iter().fold(Scalar::zero(), |acc, (id, bk)| {
            acc + coeffs[id] * poly.birkhoff_evaluate(bk)
        })
    }

    #[test]
    fn lagrange_special_case_reconstructs() {
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let poly = Polynomial::random(1, &mut rng);
        let bks: BTreeMap<PartyId, Bk> = [(PartyId(0), bk(1, 0)), (PartyId(1), bk(2, 0))].into();
        assert_eq!(reconstruct(&bks, &poly, 2), poly.constant());
    }

    #[test]
    fn ranked_parties_reconstruct() {
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        let poly = Polynomial::random(2, &mut rng);
        let bks: BTreeMap<PartyId, Bk> = [
            (PartyId(0), bk(1, 0)),
            (PartyId(1), bk(2, 1)),
            (PartyId(2), bk(3, 1)),
        ]
        .into();
        assert_eq!(reconstruct(&bks, &poly, 3), poly.constant());
    }

    #[test]
    fn more_parties_than_threshold_reconstruct() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let threshold = 3;
        let poly = Polynomial::random(threshold - 1, &mut rng);
        let bks: BTreeMap<PartyId, Bk> = (0..5)
            .map(|i| {
                (
                    PartyId(i),
                    Bk::new(Scalar::rand(&mut rng), 0),
                )
            })
            .collect();
        assert_eq!(reconstruct(&bks, &poly, threshold), poly.constant());
    }

    #[test]
    fn below_threshold_shares_are_consistent_with_any_secret() {
        // Perfect hiding: fix t−1 shares of a random degree t−1 sharing.
        // For every candidate secret there is exactly one polynomial that
        // matches the candidate and reproduces the observed shares, so the
        // shares carry no information about the secret (a distinguisher
        // between two candidate secrets has advantage zero).
        let mut rng = ChaCha12Rng::seed_from_u64(8);
        let threshold = 3;
        let poly = Polynomial::random(threshold - 1, &mut rng);
        let observed_bks = [bk(1, 0), bk(2, 1)];
        let observed: Vec<Scalar> = observed_bks
            .iter()
            .map(|bk| poly.birkhoff_evaluate(bk))
            .collect();

        for candidate in [Scalar::from(0u64), Scalar::from(1u64), Scalar::rand(&mut rng)] {
            // Solve for the unique completing polynomial: rows are the
            // constant-term selector plus the observed evaluations.
            let mut rows = vec![{
                let mut row = vec![Scalar::zero(); threshold];
                row[0] = Scalar::from(1u64);
                row
            }];
            rows.extend(
                observed_bks
                    .iter()
                    .map(|bk| birkhoff_weights(bk, threshold)),
            );
            let matrix = crate::matrix::Matrix::new(rows);
            let inverse = matrix.inverse().expect("system is uniquely solvable");
            let rhs: Vec<Scalar> = std::iter::once(candidate)
                .chain(observed.iter().copied())
                .collect();
            let coeffs: Vec<Scalar> = (0..threshold)
                .map(|i| {
                    (0..threshold).fold(Scalar::zero(), |acc, j| {
                        acc + inverse.entry(i, j) * rhs[j]
                    })
                })
                .collect();
            let completed = Polynomial::from_coefficients(coeffs);
            assert_eq!(completed.constant(), candidate);
            for (bk, share) in observed_bks.iter().zip(observed.iter()) {
                assert_eq!(completed.birkhoff_evaluate(bk), *share);
            }
        }
    }

    #[test]
    fn rejects_duplicate_points() {
        let bks = [bk(1, 0), bk(1, 0)];
        let refs: Vec<&Bk> = bks.iter().collect();
        assert!(matches!(
            check_bks(&refs, 2),
            Err(Error::InvalidBks("duplicate evaluation point"))
        ));
    }

    #[test]
    fn rejects_zero_point() {
        let bks = [bk(0, 0), bk(2, 0)];
        let refs: Vec<&Bk> = bks.iter().collect();
        assert!(matches!(check_bks(&refs, 2), Err(Error::InvalidBks(_))));
    }

    #[test]
    fn rejects_polya_violation() {
        // Two rank-1 parties cannot determine a degree-1 polynomial's
        // constant term: both only see f'(x).
        let bks = [bk(1, 1), bk(2, 1)];
        let refs: Vec<&Bk> = bks.iter().collect();
        assert!(matches!(check_bks(&refs, 2), Err(Error::InvalidBks(_))));
    }

    #[test]
    fn rejects_rank_at_threshold() {
        let bks = [bk(1, 0), bk(2, 2)];
        let refs: Vec<&Bk> = bks.iter().collect();
        assert!(matches!(
            check_bks(&refs, 2),
            Err(Error::InvalidBks("rank not below threshold"))
        ));
    }
}
