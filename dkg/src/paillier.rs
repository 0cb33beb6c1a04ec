//! Paillier encryption for the validation sub-protocol.
//!
//! Standard Paillier with `g = n + 1`: `Enc(m; r) = (1 + m·n) · rⁿ mod n²`.
//! The salt `r` is exposed to the caller so protocols can prove statements
//! about their ciphertexts. Decryption offers a signed variant that recenters
//! plaintexts into `(−n/2, n/2]`, which the validation sub-protocol uses to
//! recover small signed masks.

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::{ExtendedGcd, Integer};
use num_traits::{One, Signed, Zero};
use rand::{CryptoRng, Rng};

use crate::Error;

/// Default modulus size in bits.
pub const DEFAULT_MODULUS_BITS: usize = 2048;

// Modular inverse via the extended gcd; `None` when not coprime.
pub(crate) fn mod_inverse(value: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let value = BigInt::from(value.clone());
    let modulus = BigInt::from(modulus.clone());
    let ExtendedGcd { mut gcd, mut x, .. } = value.extended_gcd(&modulus);
    if gcd.is_negative() {
        gcd = -gcd;
        x = -x;
    }
    if !gcd.is_one() {
        return None;
    }
    x.mod_floor(&modulus).to_biguint()
}

/// The public half of a Paillier key: the modulus `n` (with cached `n²`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaillierPublicKey {
    n: BigUint,
    nn: BigUint,
}

impl PaillierPublicKey {
    /// Wraps a modulus.
    pub fn new(n: BigUint) -> Self {
        let nn = &n * &n;
        Self { n, nn }
    }

    /// The modulus `n`.
    pub fn n(&self) -> &BigUint {
        &self.n
    }

    /// `n²`, the ciphertext modulus.
    pub fn nn(&self) -> &BigUint {
        &self.nn
    }

    /// Checks that a ciphertext lies in `[1, n²)` and is a unit.
    ///
    /// # Errors
    /// Returns [`Error::EncryptionMsgWrong`] otherwise.
    pub fn check_ciphertext(&self, ciphertext: &BigUint) -> Result<(), Error> {
        if ciphertext.is_zero() || *ciphertext >= self.nn {
            return Err(Error::EncryptionMsgWrong);
        }
        if !ciphertext.gcd(&self.n).is_one() {
            return Err(Error::EncryptionMsgWrong);
        }
        Ok(())
    }

    /// Samples an encryption salt: a unit modulo `n`.
    pub fn random_salt<R: Rng + CryptoRng>(&self, rng: &mut R) -> BigUint {
        loop {
            let candidate = rng.gen_biguint_below(&self.n);
            if !candidate.is_zero() && candidate.gcd(&self.n).is_one() {
                return candidate;
            }
        }
    }

    /// Encrypts a signed message with the given salt.
    ///
    /// The message is reduced into `[0, n)` first, so small negative values
    /// decrypt back through [`PaillierKeyPair::decrypt_signed`].
    pub fn encrypt_with_salt(&self, message: &BigInt, salt: &BigUint) -> BigUint {
        let reduced = message
            .mod_floor(&BigInt::from(self.n.clone()))
            .to_biguint()
            .expect("floor-reduced value is non-negative");
        let plaintext_part = (BigUint::one() + &reduced * &self.n) % &self.nn;
        let salt_part = salt.modpow(&self.n, &self.nn);
        plaintext_part * salt_part % &self.nn
    }

    /// Encrypts a signed message with a fresh salt, returning both.
    pub fn encrypt<R: Rng + CryptoRng>(
        &self,
        message: &BigInt,
        rng: &mut R,
    ) -> (BigUint, BigUint) {
        let salt = self.random_salt(rng);
        let ciphertext = self.encrypt_with_salt(message, &salt);
        (ciphertext, salt)
    }
}

/// A Paillier key pair.
///
/// Holds the factorization-derived trapdoor `(λ, μ)`; does not implement
/// `Debug` so the secret half is not printed by accident.
#[derive(Clone)]
pub struct PaillierKeyPair {
    public: PaillierPublicKey,
    lambda: BigUint,
    mu: BigUint,
}

impl PaillierKeyPair {
    /// Generates a fresh key with a modulus of `modulus_bits` bits.
    ///
    /// Prime generation uses `glass_pumpkin`; with the default 2048-bit
    /// modulus this takes a noticeable moment.
    pub fn generate<R: Rng + CryptoRng>(modulus_bits: usize, rng: &mut R) -> Self {
        let half = modulus_bits / 2;
        let p = glass_pumpkin::prime::from_rng(half, rng)
            .expect("prime generation with a valid bit length");
        let q = loop {
            let candidate = glass_pumpkin::prime::from_rng(half, rng)
                .expect("prime generation with a valid bit length");
            if candidate != p {
                break candidate;
            }
        };
        Self::from_primes(&p, &q)
    }

    /// Builds the key pair from two distinct primes.
    pub fn from_primes(p: &BigUint, q: &BigUint) -> Self {
        assert_ne!(p, q, "paillier primes must differ");
        let n = p * q;
        let public = PaillierPublicKey::new(n.clone());
        let lambda = (p - BigUint::one()).lcm(&(q - BigUint::one()));
        // With g = n + 1, L(g^λ mod n²) = λ mod n, so μ = λ⁻¹ mod n.
        let mu = mod_inverse(&(&lambda % &n), &n).expect("λ is a unit modulo n");
        Self { public, lambda, mu }
    }

    /// The public key.
    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.public
    }

    /// Decrypts a ciphertext into `[0, n)`.
    ///
    /// # Errors
    /// Returns [`Error::EncryptionMsgWrong`] if the ciphertext is out of
    /// range.
    pub fn decrypt(&self, ciphertext: &BigUint) -> Result<BigUint, Error> {
        self.public.check_ciphertext(ciphertext)?;
        let u = ciphertext.modpow(&self.lambda, &self.public.nn);
        let l = (u - BigUint::one()) / &self.public.n;
        Ok(l * &self.mu % &self.public.n)
    }

    /// Decrypts a ciphertext and recenters the plaintext into
    /// `(−n/2, n/2]`.
    ///
    /// # Errors
    /// Returns [`Error::EncryptionMsgWrong`] if the ciphertext is out of
    /// range.
    pub fn decrypt_signed(&self, ciphertext: &BigUint) -> Result<BigInt, Error> {
        let plain = self.decrypt(ciphertext)?;
        let n = &self.public.n;
        let half = n / 2u32;
        if plain > half {
            Ok(BigInt::from(plain) - BigInt::from(n.clone()))
        } else {
            Ok(BigInt::from(plain))
        }
    }
}

// Referenced by sibling modules that scale ciphertexts homomorphically.
pub(crate) fn pow_signed(
    base: &BigUint,
    exponent: &BigInt,
    modulus: &BigUint,
) -> Result<BigUint, Error> {
    if exponent.is_negative() {
        let inverse = mod_inverse(base, modulus).ok_or(Error::EncryptionMsgWrong)?;
        Ok(inverse.modpow(exponent.magnitude(), modulus))
    } else {
        Ok(base.modpow(exponent.magnitude(), modulus))
    }
}
