//! Partial extended Euclidean algorithm for NUCOMP.
//!
//! Runs the extended gcd of `(r2, r1)` only until the smaller remainder drops
//! to the caller's bound, tracking the second cofactor column. Remainder
//! pairs that fit a machine word are advanced in a 64-bit inner loop whose
//! 2×2 cofactor matrix is accumulated in `i128` and applied to the
//! arbitrary-precision cofactors in one batch; a checked-arithmetic guard
//! falls back to a single arbitrary-precision step and restarts the loop.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

// Advances (w2, w1) by Euclidean steps until w1 <= bound, accumulating the
// cofactor transform. Returns the final remainders, the matrix, and whether
// any step was taken; bails out early if a matrix entry would overflow.
fn word_steps(mut w2: u64, mut w1: u64, bound: u64) -> (u64, u64, (i128, i128, i128, i128), bool) {
    // (c2', c1') = (x0*c2 + x1*c1, y0*c2 + y1*c1)
    let (mut x0, mut x1, mut y0, mut y1) = (1i128, 0i128, 0i128, 1i128);
    let mut stepped = false;
    while w1 > bound {
        let q = (w2 / w1) as i128;
        let r = w2 % w1;
        let (Some(qy0), Some(qy1)) = (q.checked_mul(y0), q.checked_mul(y1)) else {
            break;
        };
        let (Some(ny0), Some(ny1)) = (x0.checked_sub(qy0), x1.checked_sub(qy1)) else {
            break;
        };
        x0 = y0;
        x1 = y1;
        y0 = ny0;
        y1 = ny1;
        w2 = w1;
        w1 = r;
        stepped = true;
    }
    (w2, w1, (x0, x1, y0, y1), stepped)
}

/// Partial extended gcd of `(r2, r1)` with cofactor seed `(c2, c1) = (0, −1)`.
///
/// Both inputs must be nonnegative. Returns `(r2, r1, c2, c1)` with
/// `r1 ≤ bound`, `r2 ≥ 0`, and the cofactor pair consistent with the final
/// remainders (each step maps `(c2, c1) ← (c1, c2 − q·c1)` in lockstep with
/// the remainders).
pub(crate) fn partial_gcd(
    mut r2: BigInt,
    mut r1: BigInt,
    bound: &BigInt,
) -> (BigInt, BigInt, BigInt, BigInt) {
    debug_assert!(!r2.is_negative() && !r1.is_negative());
    let mut c2 = BigInt::zero();
    let mut c1 = BigInt::from(-1);
    while r1 > *bound {
        let word_pair = r2.to_u64().zip(r1.to_u64());
        let advanced = match word_pair {
            Some((w2, w1)) => {
                // r1 > bound and r1 fits u64, so bound does as well.
                let wbound = bound.to_u64().unwrap_or(u64::MAX);
                let (nw2, nw1, (x0, x1, y0, y1), stepped) = word_steps(w2, w1, wbound);
                if stepped {
                    let nc2 = &c2 * x0 + &c1 * x1;
                    let nc1 = &c2 * y0 + &c1 * y1;
                    r2 = BigInt::from(nw2);
                    r1 = BigInt::from(nw1);
                    c2 = nc2;
                    c1 = nc1;
                }
                stepped
            }
            None => false,
        };
        if !advanced {
            // One arbitrary-precision step, then try the word loop again.
            let q = &r2 / &r1;
            let r = &r2 - &q * &r1;
            r2 = std::mem::replace(&mut r1, r);
            let nc1 = &c2 - &q * &c1;
            c2 = std::mem::replace(&mut c1, nc1);
        }
    }
    (r2, r1, c2, c1)
}
