//! BIP32-style hardened derivation for shared keys.
//!
//! A master secret and chain code come out of HMAC-SHA512 over a seed; a
//! hardened child is derived from the parent key, chain code and index. In
//! the threshold setting the HMAC over the parent key is evaluated inside
//! the two-party circuit protocol (outside this crate); the functions here
//! are its cleartext counterpart, and [`HdShare`] applies the resulting
//! offset to share material.
//!
//! Child state is a value-typed copy of everything it needs (chain code,
//! depth, public key); shares never point back at their parent.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::PrimeField;
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use sha2::Sha512;

use crate::curve::{scalar_bytes, Affine, Scalar};
use crate::Error;

type HmacSha512 = Hmac<Sha512>;

const MASTER_KEY_LABEL: &[u8] = b"Bitcoin seed";
/// First hardened child index (`2³¹`).
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

fn hmac512(key: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut mac = HmacSha512::new_from_slice(key).expect("hmac accepts any key length");
    for part in parts {
        mac.update(part);
    }
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    digest
}

// Interprets 32 big-endian bytes as a scalar, rejecting zero and values at
// or above the group order as BIP32 does.
fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar, Error> {
    let value = BigUint::from_bytes_be(bytes);
    let modulus: BigUint = Scalar::MODULUS.into();
    if value.bits() == 0 || value >= modulus {
        return Err(Error::InvalidDerivation);
    }
    Ok(Scalar::from_be_bytes_mod_order(bytes))
}

/// Derives the master secret and chain code from a seed.
///
/// # Errors
/// Returns [`Error::InvalidDerivation`] for the (negligible) seeds whose
/// left HMAC half is zero or not below the group order.
pub fn master_from_seed(seed: &[u8]) -> Result<(Scalar, [u8; 32]), Error> {
    let digest = hmac512(MASTER_KEY_LABEL, &[seed]);
    let key = scalar_from_bytes(&digest[..32])?;
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&digest[32..]);
    Ok((key, chain_code))
}

/// The additive tweak and chain code of one hardened derivation step.
#[derive(Clone)]
pub struct ChildOffset {
    /// The tweak `IL`; the child key is `parent + offset mod N`.
    pub offset: Scalar,
    /// The child chain code.
    pub chain_code: [u8; 32],
}

/// Computes the hardened-child offset for `index ≥ 2³¹`.
///
/// Requires the full parent key, which in the threshold deployment only ever
/// exists inside the derivation circuit.
///
/// # Errors
/// Returns [`Error::InvalidDerivation`] for a non-hardened index or an
/// out-of-range tweak.
pub fn hardened_child_offset(
    parent_key: &Scalar,
    chain_code: &[u8; 32],
    index: u32,
) -> Result<ChildOffset, Error> {
    if index < HARDENED_OFFSET {
        return Err(Error::InvalidDerivation);
    }
    let digest = hmac512(
        chain_code,
        &[&[0u8], &scalar_bytes(parent_key), &index.to_be_bytes()],
    );
    let offset = scalar_from_bytes(&digest[..32])?;
    let mut child_chain = [0u8; 32];
    child_chain.copy_from_slice(&digest[32..]);
    Ok(ChildOffset {
        offset,
        chain_code: child_chain,
    })
}

/// A party's slice of a hierarchical key: its share of the key at this node
/// plus the public node metadata, all by value.
#[derive(Clone)]
pub struct HdShare {
    /// This party's share of the node key.
    pub share: Scalar,
    /// The node chain code.
    pub chain_code: [u8; 32],
    /// Depth below the master node.
    pub depth: u8,
    /// The child index this node was derived with (0 for the master).
    pub index: u32,
    /// The node's public key.
    pub public_key: Affine,
}

impl HdShare {
    /// Derives the child share for a hardened step.
    ///
    /// Exactly one party of the sharing applies the offset
    /// (`apply_offset = true`); the others keep their share, so the share
    /// sum moves by exactly `offset` and the public key by `offset·G`.
    pub fn derive_hardened(&self, child: &ChildOffset, index: u32, apply_offset: bool) -> HdShare {
        let share = if apply_offset {
            self.share + child.offset
        } else {
            self.share
        };
        let public_key =
            (Affine::generator() * child.offset + self.public_key).into_affine();
        HdShare {
            share,
            chain_code: child.chain_code,
            depth: self.depth + 1,
            index,
            public_key,
        }
    }
}
