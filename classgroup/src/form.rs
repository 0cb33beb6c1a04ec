//! Binary quadratic forms and the class-group operations on them.
//!
//! The composition routine is NUCOMP (near-composition): instead of composing
//! and then reducing a form with coefficients of size `O(D)`, a partial
//! extended gcd truncates the intermediate values around `|D/4|^(1/4)` so the
//! output of composition is already close to reduced. Squaring is the
//! self-composition specialization of the same routine.

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::{ExtendedGcd, Integer, Roots};
use num_traits::{One, Signed, Zero};

use crate::chain::expansion_chain;
use crate::partial_gcd::partial_gcd;
use crate::Error;

/// A primitive positive-definite binary quadratic form `ax² + bxy + cy²`
/// with cached negative discriminant `b² − 4ac`.
///
/// Forms are value types: all group operations return fresh, reduced forms
/// and never mutate their inputs. Two forms compare equal iff their
/// coefficient triples are equal, so comparing reduced forms is exactly
/// class-group equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryQuadraticForm {
    a: BigInt,
    b: BigInt,
    c: BigInt,
    disc: BigInt,
}

impl BinaryQuadraticForm {
    /// Constructs a form from its three coefficients.
    ///
    /// # Errors
    /// Returns [`Error::NonNegativeDiscriminant`] if `b² − 4ac ≥ 0`.
    pub fn from_abc(a: BigInt, b: BigInt, c: BigInt) -> Result<Self, Error> {
        let disc = &b * &b - BigInt::from(4) * &a * &c;
        if disc.sign() != Sign::Minus {
            return Err(Error::NonNegativeDiscriminant(disc));
        }
        Ok(Self { a, b, c, disc })
    }

    /// Constructs a form from `a`, `b` and the discriminant, solving
    /// `c = (b² − D) / (4a)`.
    ///
    /// The caller is responsible for `4a` dividing `b² − D` exactly; the
    /// quotient is taken as-is otherwise (debug builds assert exactness).
    ///
    /// # Errors
    /// Returns [`Error::NonNegativeDiscriminant`] if `d ≥ 0`.
    pub fn from_abd(a: BigInt, b: BigInt, d: &BigInt) -> Result<Self, Error> {
        if d.sign() != Sign::Minus {
            return Err(Error::NonNegativeDiscriminant(d.clone()));
        }
        let num = &b * &b - d;
        let den = BigInt::from(4) * &a;
        debug_assert!((&num % &den).is_zero(), "4a must divide b^2 - D");
        let c = num / den;
        Ok(Self {
            a,
            b,
            c,
            disc: d.clone(),
        })
    }

    /// The principal form of discriminant `d`: the identity of the class group.
    ///
    /// Constructed directly as `(1, d mod 2, ((d mod 2)² − d)/4)`.
    ///
    /// # Errors
    /// Returns [`Error::NonNegativeDiscriminant`] if `d ≥ 0`.
    pub fn principal(d: &BigInt) -> Result<Self, Error> {
        let b0 = d.mod_floor(&BigInt::from(2));
        Self::from_abd(BigInt::one(), b0, d)
    }

    /// The `a` coefficient.
    pub fn a(&self) -> &BigInt {
        &self.a
    }

    /// The `b` coefficient.
    pub fn b(&self) -> &BigInt {
        &self.b
    }

    /// The `c` coefficient.
    pub fn c(&self) -> &BigInt {
        &self.c
    }

    /// The cached discriminant `b² − 4ac`. Always negative.
    pub fn discriminant(&self) -> &BigInt {
        &self.disc
    }

    /// The NUCOMP threshold `⌊(|D|/4)^(1/4)⌋` for this form's discriminant.
    pub fn nucomp_bound(&self) -> BigInt {
        (self.disc.abs() / BigInt::from(4)).nth_root(4)
    }

    /// Whether the form is in reduced normal form: `|b| ≤ a ≤ c`, and `b ≥ 0`
    /// whenever `a = |b|` or `a = c`.
    pub fn is_reduced(&self) -> bool {
        let b_abs = self.b.abs();
        if !(b_abs <= self.a && self.a <= self.c) {
            return false;
        }
        if (self.a == b_abs || self.a == self.c) && self.b.sign() == Sign::Minus {
            return false;
        }
        true
    }

    // One Euclidean step of Cohen Alg. 5.4.2: brings b into (-a, a] while
    // keeping the form in the same class.
    fn euclidean_step(a: &BigInt, b: &BigInt, c: &BigInt) -> (BigInt, BigInt) {
        let two_a = a << 1u32;
        let (mut q, mut r) = b.div_mod_floor(&two_a);
        if r > *a {
            r -= &two_a;
            q += 1;
        }
        let c = c - (b + &r) * &q / 2;
        (r, c)
    }

    /// Reduces the form to the unique canonical representative of its class.
    ///
    /// Idempotent; the result satisfies [`Self::is_reduced`].
    pub fn reduce(&self) -> Self {
        let mut a = self.a.clone();
        let mut b = self.b.clone();
        let mut c = self.c.clone();

        if !(-&a < b && b <= a) {
            let (nb, nc) = Self::euclidean_step(&a, &b, &c);
            b = nb;
            c = nc;
        }
        loop {
            let reduced = {
                let b_abs = b.abs();
                b_abs <= a && a <= c && !((a == b_abs || a == c) && b.sign() == Sign::Minus)
            };
            if reduced {
                break;
            }
            if a > c {
                std::mem::swap(&mut a, &mut c);
                b = -b;
            } else if a == c && b.sign() == Sign::Minus {
                b = -b;
            }
            if !(-&a < b && b <= a) {
                let (nb, nc) = Self::euclidean_step(&a, &b, &c);
                b = nb;
                c = nc;
            }
        }
        Self {
            a,
            b,
            c,
            disc: self.disc.clone(),
        }
    }

    /// The class-group inverse: `reduce((a, −b, c))`.
    pub fn inverse(&self) -> Self {
        Self {
            a: self.a.clone(),
            b: -&self.b,
            c: self.c.clone(),
            disc: self.disc.clone(),
        }
        .reduce()
    }

    // The principal form of this form's discriminant. A well-formed form
    // always has D < 0 with D ≡ 0, 1 (mod 4), so this cannot fail.
    fn identity(&self) -> Self {
        Self::principal(&self.disc).expect("form discriminant is negative")
    }

    /// NUCOMP composition of two forms of the same discriminant, reduced.
    ///
    /// `d_root4` is the switching threshold between the direct "small case"
    /// and the partial-gcd branch, normally [`Self::nucomp_bound`].
    /// Composing forms of different discriminants is undefined (debug builds
    /// assert equality).
    pub fn compose(&self, other: &Self, d_root4: &BigInt) -> Self {
        debug_assert_eq!(self.disc, other.disc, "mixed discriminants");
        // Order the operands so a1 >= a2.
        let (f1, f2) = if self.a >= other.a {
            (self, other)
        } else {
            (other, self)
        };
        let mut a1 = f1.a.clone();
        let b1 = &f1.b;
        let mut a2 = f2.a.clone();
        let b2 = f2.b.clone();
        let mut c2 = f2.c.clone();

        // b1 and b2 share the parity of D, so both halves are exact.
        let ss: BigInt = (b1 + &b2) >> 1u32;
        let m: BigInt = (b1 - &b2) >> 1u32;

        let ExtendedGcd {
            gcd: mut sp,
            x: mut v1,
            ..
        } = a2.extended_gcd(&a1);
        if sp.sign() == Sign::Minus {
            sp = -sp;
            v1 = -v1;
        }
        let mut k = (&m * &v1).mod_floor(&a1);
        if !sp.is_one() {
            let ExtendedGcd {
                gcd: mut s,
                x: mut u2,
                y: mut v2,
            } = sp.extended_gcd(&ss);
            if s.sign() == Sign::Minus {
                s = -s;
                u2 = -u2;
                v2 = -v2;
            }
            k = &k * &u2 - &v2 * &c2;
            if !s.is_one() {
                a1 /= &s;
                a2 /= &s;
                c2 *= &s;
            }
            k = k.mod_floor(&a1);
        }
        self.compose_tail(a1, a2, b2, c2, ss, m, k, d_root4)
    }

    /// Squares the form: the self-composition specialization of NUCOMP.
    ///
    /// With both operands equal, `ss = b`, `m = 0` and the first extended gcd
    /// collapses to `gcd(a, b)`, saving one full extended-gcd pass.
    pub fn square(&self, d_root4: &BigInt) -> Self {
        let mut a1 = self.a.clone();
        let mut a2 = self.a.clone();
        let b2 = self.b.clone();
        let mut c2 = self.c.clone();
        let ss = self.b.clone();

        let mut k = BigInt::zero();
        if !a1.is_one() {
            let ExtendedGcd {
                gcd: mut s,
                y: mut v2,
                ..
            } = a1.extended_gcd(&ss);
            if s.sign() == Sign::Minus {
                s = -s;
                v2 = -v2;
            }
            k = -&v2 * &c2;
            if !s.is_one() {
                a1 /= &s;
                a2 /= &s;
                c2 *= &s;
            }
            k = k.mod_floor(&a1);
        }
        self.compose_tail(a1, a2, b2, c2, ss, BigInt::zero(), k, d_root4)
    }

    /// Cubes the form.
    ///
    /// When `b ≡ 0 (mod a)` a reduced form is ambiguous (its own inverse), so
    /// its cube is the form itself and is returned unchanged. Otherwise the
    /// cube is assembled from one squaring and one composition.
    pub fn cube(&self, d_root4: &BigInt) -> Self {
        if (&self.b % &self.a).is_zero() {
            return self.clone();
        }
        self.square(d_root4).compose(self, d_root4)
    }

    // Shared tail of compose/square: the small case or the partial-gcd
    // branch, followed by reduction.
    #[allow(clippy::too_many_arguments)]
    fn compose_tail(
        &self,
        a1: BigInt,
        a2: BigInt,
        b2: BigInt,
        c2: BigInt,
        ss: BigInt,
        m: BigInt,
        k: BigInt,
        d_root4: &BigInt,
    ) -> Self {
        if a1 < *d_root4 {
            let t = &a2 * &k;
            let a = &a2 * &a1;
            let b = (&t << 1u32) + &b2;
            let c = ((&b2 + &t) * &k + &c2) / &a1;
            return Self {
                a,
                b,
                c,
                disc: self.disc.clone(),
            }
            .reduce();
        }

        let (_r2, r1, cap_c2, cap_c1) = partial_gcd(a1.clone(), k, d_root4);
        let m1 = (&m * &cap_c1 + &a2 * &r1) / &a1;
        let m2 = (&ss * &r1 - &c2 * &cap_c1) / &a1;
        let mut a = &r1 * &m1 - &cap_c1 * &m2;
        if cap_c1.sign() == Sign::Plus {
            a = -a;
        }
        let b_raw = ((&a2 * &r1 - &a * &cap_c2) << 1u32) / &cap_c1 - &b2;
        if a.sign() == Sign::Minus {
            a = -a;
        }
        let b = b_raw.mod_floor(&(&a << 1u32));
        Self::from_abd(a, b, &self.disc)
            .expect("composition preserves the discriminant")
            .reduce()
    }

    /// Raises the form to the nonnegative power `n` along a signed
    /// 2,3-addition-subtraction chain.
    ///
    /// `exp(f, 0)` is the principal form; `exp(f, 1)` is `reduce(f)`.
    pub fn exp(&self, n: &BigUint, d_root4: &BigInt) -> Self {
        let identity = self.identity().reduce();
        if n.is_zero() {
            return identity;
        }
        let terms = expansion_chain(n);
        let mut result = identity;
        let mut power = self.reduce();
        let mut prev_e2 = 0u32;
        let mut prev_e3 = 0u32;
        for term in terms {
            for _ in prev_e2..term.e2 {
                power = power.square(d_root4);
            }
            for _ in prev_e3..term.e3 {
                power = power.cube(d_root4);
            }
            prev_e2 = term.e2;
            prev_e3 = term.e3;
            let factor = if term.sign > 0 {
                power.clone()
            } else {
                power.inverse()
            };
            result = result.compose(&factor, d_root4);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    fn form(a: i64, b: i64, c: i64) -> BinaryQuadraticForm {
        BinaryQuadraticForm::from_abc(BigInt::from(a), BigInt::from(b), BigInt::from(c))
            .expect("test form has negative discriminant")
    }

    fn triple(f: &BinaryQuadraticForm) -> (BigInt, BigInt, BigInt) {
        (f.a().clone(), f.b().clone(), f.c().clone())
    }

    fn expect_triple(f: &BinaryQuadraticForm, a: i64, b: i64, c: i64) {
        assert_eq!(
            triple(f),
            (BigInt::from(a), BigInt::from(b), BigInt::from(c))
        );
    }

    // Draws a random reduced form of discriminant d by rejection on the
    // divisibility condition of from_abd.
    fn random_form(d: &BigInt, rng: &mut impl Rng) -> BinaryQuadraticForm {
        loop {
            let a_small = rng.gen_range(1i64..2000);
            let a = BigInt::from(a_small);
            let b = BigInt::from(rng.gen_range(-a_small..=a_small));
            let num = &b * &b - d;
            let den = BigInt::from(4) * &a;
            if (&num % &den).is_zero() {
                return BinaryQuadraticForm::from_abd(a, b, d)
                    .expect("negative discriminant")
                    .reduce();
            }
        }
    }

    #[test]
    fn rejects_nonnegative_discriminant() {
        let err = BinaryQuadraticForm::from_abc(BigInt::from(1), BigInt::from(3), BigInt::from(1));
        assert!(matches!(err, Err(Error::NonNegativeDiscriminant(_))));
    }

    #[test]
    fn reduce_vectors() {
        expect_triple(&form(33, 11, 5).reduce(), 5, -1, 27);
        expect_triple(&form(4, 5, 3).reduce(), 2, -1, 3);
    }

    #[test]
    fn reduce_is_idempotent_and_canonical() {
        let f = form(33, 11, 5);
        let r = f.reduce();
        assert!(r.is_reduced());
        assert_eq!(r, r.reduce());
        assert_eq!(f.discriminant(), r.discriminant());
    }

    #[test]
    fn compose_vector() {
        let f = form(31, 24, 15951);
        let bound = BigInt::from(26);
        expect_triple(&f.compose(&f, &bound), 517, 100, 961);
        assert_eq!(f.nucomp_bound(), bound);
    }

    #[test]
    fn square_vector() {
        let f = form(19, 18, 26022);
        expect_triple(&f.square(&BigInt::from(26)), 361, -286, 1426);
    }

    #[test]
    fn cube_vector() {
        let f = form(22, 6, 225);
        expect_triple(&f.cube(&BigInt::from(8)), 70, 54, 81);
    }

    #[test]
    fn exp_vector() {
        let f = form(31, 24, 15951);
        let bound = BigInt::from(26);
        expect_triple(&f.exp(&BigUint::from(200u32), &bound), 517, -276, 993);
        assert_eq!(f.exp(&BigUint::from(0u32), &bound), f.identity());
        assert_eq!(f.exp(&BigUint::from(1u32), &bound), f.reduce());
    }

    #[test]
    fn group_laws() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let d = BigInt::from(-1977348);
        let bound = BigInt::from(26);
        let id = BinaryQuadraticForm::principal(&d)
            .expect("negative discriminant")
            .reduce();
        for _ in 0..40 {
            let f = random_form(&d, &mut rng);
            let g = random_form(&d, &mut rng);
            assert_eq!(f.compose(&g, &bound), g.compose(&f, &bound));
            assert_eq!(f.compose(&id, &bound), f);
            assert_eq!(f.compose(&f.inverse(), &bound), id);
            assert_eq!(f.square(&bound), f.compose(&f, &bound));
            assert_eq!(
                f.cube(&bound),
                f.square(&bound).compose(&f, &bound),
                "cube must agree with square-then-compose for {f:?}"
            );
        }
    }

    #[test]
    fn exp_is_homomorphic() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let d = BigInt::from(-19764);
        let bound = BigInt::from(8);
        for _ in 0..25 {
            let f = random_form(&d, &mut rng);
            let m = rng.gen_range(0u32..60);
            let n = rng.gen_range(0u32..60);
            let lhs = f.exp(&BigUint::from(m + n), &bound);
            let rhs = f
                .exp(&BigUint::from(m), &bound)
                .compose(&f.exp(&BigUint::from(n), &bound), &bound);
            assert_eq!(lhs, rhs, "exp({m}+{n}) diverged for {f:?}");
        }
    }

    #[test]
    fn sl2_equivalent_forms_reduce_identically() {
        // Apply a few unimodular substitutions to a reduced form; all images
        // must come back to the same canonical triple.
        let f = form(5, -1, 27).reduce();
        let (a, b, c) = triple(&f);
        // x -> x + k y keeps a, shifts b by 2ak.
        for k in [-3i64, -1, 1, 4] {
            let k = BigInt::from(k);
            let b2 = &b + BigInt::from(2) * &a * &k;
            let c2 = &a * &k * &k + &b * &k + &c;
            let g = BinaryQuadraticForm::from_abc(a.clone(), b2, c2)
                .expect("equivalent form keeps the discriminant");
            assert_eq!(g.reduce(), f);
        }
        // (x, y) -> (-y, x) swaps a and c, negates b.
        let g = BinaryQuadraticForm::from_abc(c.clone(), -&b, a.clone())
            .expect("equivalent form keeps the discriminant");
        assert_eq!(g.reduce(), f);
    }
}
