//! Signed 2,3-addition-subtraction chains for class-group exponentiation.
//!
//! A nonnegative exponent `n` is decomposed as `Σᵢ sᵢ · 2^{e₂ᵢ} · 3^{e₃ᵢ}`
//! with `sᵢ ∈ {+1, −1}` and both exponent sequences non-decreasing, so an
//! exponentiation can advance a single running power by repeated squaring and
//! cubing while composing signed factors into an accumulator.
//!
//! Chain construction is a pure function. The ±1 branch at each step is
//! picked by a bounded breadth-limited lookahead (branching factor 2) over
//! the residual magnitude after stripping all factors of 2 and 3.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};

/// Lookahead width of the ±1 selection tree; the search depth is `NODES / 2`.
const NODES: u32 = 8;

/// One signed factor `sign · 2^e2 · 3^e3` of a 2,3-expansion chain.
///
/// Across a chain the `e2` and `e3` values are monotonically non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTerm {
    /// Cumulative exponent of 2.
    pub e2: u32,
    /// Cumulative exponent of 3.
    pub e3: u32,
    /// Sign of the term, `+1` or `−1`.
    pub sign: i8,
}

// Divides out all factors of 2 and 3, returning the cofactor and the two
// exponents removed.
fn strip_two_three(mut n: BigUint) -> (BigUint, u32, u32) {
    let mut e2 = 0u32;
    let mut e3 = 0u32;
    if n.is_zero() {
        return (n, e2, e3);
    }
    let three = BigUint::from(3u32);
    if let Some(tz) = n.trailing_zeros() {
        e2 = tz as u32;
        n >>= tz;
    }
    loop {
        let (q, r) = n.div_rem(&three);
        if !r.is_zero() {
            break;
        }
        n = q;
        e3 += 1;
    }
    (n, e2, e3)
}

// Residual magnitude after choosing `m ± 1` and recursing up to `depth`
// further choices, always taking the better branch. `m` is coprime to 6 and
// greater than 1.
fn lookahead_residue(m: &BigUint, add: bool, depth: u32) -> BigUint {
    let next = if add {
        m + BigUint::one()
    } else {
        m - BigUint::one()
    };
    let (stripped, _, _) = strip_two_three(next);
    if stripped.is_one() || depth == 0 {
        return stripped;
    }
    let up = lookahead_residue(&stripped, true, depth - 1);
    let down = lookahead_residue(&stripped, false, depth - 1);
    up.min(down)
}

/// Decomposes a positive integer into a signed 2,3-expansion chain.
///
/// The returned terms satisfy `n = Σᵢ signᵢ · 2^{e2ᵢ} · 3^{e3ᵢ}` with both
/// exponent sequences non-decreasing, which [`crate::BinaryQuadraticForm::exp`]
/// relies on. An empty chain is returned for `n = 0`.
pub fn expansion_chain(n: &BigUint) -> Vec<ChainTerm> {
    let mut terms = Vec::new();
    let mut rest = n.clone();
    let mut e2 = 0u32;
    let mut e3 = 0u32;
    while !rest.is_zero() {
        let (m, de2, de3) = strip_two_three(rest);
        e2 += de2;
        e3 += de3;
        if m.is_one() {
            terms.push(ChainTerm { e2, e3, sign: 1 });
            break;
        }
        // m is coprime to 6; peel off the ±1 that leaves the smaller
        // lookahead residue, preferring the positive term on ties.
        let depth = NODES / 2;
        if lookahead_residue(&m, false, depth) <= lookahead_residue(&m, true, depth) {
            terms.push(ChainTerm { e2, e3, sign: 1 });
            rest = m - BigUint::one();
        } else {
            terms.push(ChainTerm { e2, e3, sign: -1 });
            rest = m + BigUint::one();
        }
    }
    terms
}
