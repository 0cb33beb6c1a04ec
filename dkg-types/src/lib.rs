#![deny(missing_docs, clippy::unwrap_used)]
//! Shared types exchanged between parties of the quorum DKG protocol.
//!
//! This crate defines the party identifiers, Birkhoff interpolation
//! parameters, and the tagged wire messages of every protocol round, together
//! with their canonical CBOR encoding. The encoding is deterministic:
//! re-serializing a decoded message reproduces the exact bytes, which the
//! echo-broadcast layer relies on when comparing payload hashes across peers.
//!
//! Main types:
//! * [`PartyId`]
//! * [`Bk`]
//! * [`MessageType`] / [`Message`] / [`Body`]
//! * [`SchnorrProof`]

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

pub mod compat;

/// The curve group used by the protocol (secp256k1, short Weierstrass).
pub type Curve = ark_secp256k1::Projective;
/// Affine representation of [`Curve`] points.
pub type Affine = ark_secp256k1::Affine;
/// Projective representation of [`Curve`] points.
pub type Projective = ark_secp256k1::Projective;
/// The scalar field of [`Curve`].
pub type Scalar = ark_secp256k1::Fr;
/// The base field of [`Curve`].
pub type BaseField = ark_secp256k1::Fq;

/// Errors raised when encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// CBOR encoding failed.
    #[error(transparent)]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
    /// CBOR decoding failed.
    #[error(transparent)]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
}

/// The identifier of a protocol party.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartyId(pub u16);

impl PartyId {
    /// Converts to a `u16`.
    pub fn into_inner(self) -> u16 {
        self.0
    }
}

impl From<u16> for PartyId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<PartyId> for u16 {
    fn from(value: PartyId) -> Self {
        value.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyId({})", self.0)
    }
}

/// A Birkhoff interpolation parameter: the evaluation point `x` together
/// with the party's rank (the derivative order it contributes).
///
/// Rank 0 parties hold plain polynomial evaluations; a rank `r` party holds
/// an evaluation of the `r`-th derivative, which lets hierarchies of parties
/// share one secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bk {
    /// The evaluation point. Must be nonzero.
    #[serde(with = "compat::scalar")]
    pub x: Scalar,
    /// The derivative order of this party's share.
    pub rank: u32,
}

impl Bk {
    /// Creates a new Birkhoff parameter.
    pub fn new(x: Scalar, rank: u32) -> Self {
        Self { x, rank }
    }
}

/// A Schnorr proof of knowledge of the discrete logarithm of a public share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProof {
    /// The prover's nonce commitment `vG`.
    #[serde(with = "compat::affine")]
    pub commitment: Affine,
    /// The response `z = v + e·s`.
    #[serde(with = "compat::scalar")]
    pub response: Scalar,
}

/// The type tag of a wire message.
///
/// The declaration order is the strict protocol order: a handler only ever
/// consumes its own type, rejects anything older, and leaves newer types
/// queued. The two OPRF types exist only in password mode and precede the
/// regular rounds; the two validation exchanges interleave after round 1
/// (against the agreed Birkhoff-set hash) and after round 4 (against the
/// joint public key hash).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum MessageType {
    /// Password mode: the user's blinded OPRF query.
    OprfRequest,
    /// Password mode: the server's OPRF evaluation.
    OprfResponse,
    /// Round 1: Birkhoff parameter and hash commitment.
    Peer,
    /// Validation of the agreed Birkhoff set: prover ciphertext.
    BkValidationEnc,
    /// Validation of the agreed Birkhoff set: responder ciphertext.
    BkValidationReply,
    /// Round 2: decommitment and Feldman commitment vector.
    Decommit,
    /// Round 3: the Feldman share evaluated at the recipient's parameter.
    Verify,
    /// Round 4: proof of knowledge of the final share.
    Result,
    /// Validation of the joint public key: prover ciphertext.
    KeyValidationEnc,
    /// Validation of the joint public key: responder ciphertext.
    KeyValidationReply,
}

impl MessageType {
    /// Every message type, in protocol order.
    pub const ALL: [MessageType; 10] = [
        MessageType::OprfRequest,
        MessageType::OprfResponse,
        MessageType::Peer,
        MessageType::BkValidationEnc,
        MessageType::BkValidationReply,
        MessageType::Decommit,
        MessageType::Verify,
        MessageType::Result,
        MessageType::KeyValidationEnc,
        MessageType::KeyValidationReply,
    ];
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Round 1 broadcast: the sender's Birkhoff parameter and its hash
/// commitment to `u₀G`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMsg {
    /// The sender's Birkhoff parameter.
    pub bk: Bk,
    /// Hash commitment to the sender's `u₀G`.
    pub commitment: [u8; 32],
}

/// Round 2 broadcast: opens the round 1 commitment and publishes the
/// Feldman commitment vector `(f₀G, …, f_{t−1}G)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecommitMsg {
    /// The salt that opens the round 1 hash commitment.
    pub salt: [u8; 32],
    /// Commitments to all polynomial coefficients; `feldman[0]` is `u₀G`.
    #[serde(with = "compat::affine_vec")]
    pub feldman: Vec<Affine>,
}

/// Round 3 direct message: the sender's polynomial evaluated at the
/// recipient's Birkhoff parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyMsg {
    /// The Feldman share for the recipient.
    #[serde(with = "compat::scalar")]
    pub share: Scalar,
}

/// Round 4 broadcast: proof of knowledge of the sender's final share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMsg {
    /// Schnorr proof for the share the recipients can recompute in public.
    pub proof: SchnorrProof,
}

/// Password mode: the user's OPRF request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OprfRequestMsg {
    /// The user's chosen Birkhoff evaluation point.
    #[serde(with = "compat::scalar")]
    pub x: Scalar,
    /// The blinded password point `r·H'(pw)`.
    #[serde(with = "compat::affine")]
    pub alpha: Affine,
}

/// Password mode: the server's OPRF response `β = k·α`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OprfResponseMsg {
    /// The evaluated point.
    #[serde(with = "compat::affine")]
    pub beta: Affine,
}

/// Validation sub-protocol, first flow: the prover's Paillier ciphertext of
/// `−h` together with its public modulus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEncMsg {
    /// The prover's Paillier modulus `n`.
    pub modulus: BigUint,
    /// `Enc(−h)` under the prover's key; must be below `n²`.
    pub ciphertext: BigUint,
}

/// Validation sub-protocol, second flow: the responder's masked ciphertext
/// and the binding commitment to its mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReplyMsg {
    /// `e₀^r · Enc(r·h + s) mod n²`.
    pub ciphertext: BigUint,
    /// `H(s ‖ h)`, binding the responder to its mask.
    pub commitment: [u8; 32],
}

/// The body of a wire message, tagged by round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// Password mode round 0, user to server.
    OprfRequest(OprfRequestMsg),
    /// Password mode round 0, server to user.
    OprfResponse(OprfResponseMsg),
    /// Round 1 broadcast.
    Peer(PeerMsg),
    /// Birkhoff-set validation, prover flow.
    BkValidationEnc(ValidationEncMsg),
    /// Birkhoff-set validation, responder flow.
    BkValidationReply(ValidationReplyMsg),
    /// Round 2 broadcast.
    Decommit(DecommitMsg),
    /// Round 3 direct message.
    Verify(VerifyMsg),
    /// Round 4 broadcast.
    Result(ResultMsg),
    /// Public-key validation, prover flow.
    KeyValidationEnc(ValidationEncMsg),
    /// Public-key validation, responder flow.
    KeyValidationReply(ValidationReplyMsg),
}

impl Body {
    /// The type tag of this body.
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::OprfRequest(_) => MessageType::OprfRequest,
            Body::OprfResponse(_) => MessageType::OprfResponse,
            Body::Peer(_) => MessageType::Peer,
            Body::BkValidationEnc(_) => MessageType::BkValidationEnc,
            Body::BkValidationReply(_) => MessageType::BkValidationReply,
            Body::Decommit(_) => MessageType::Decommit,
            Body::Verify(_) => MessageType::Verify,
            Body::Result(_) => MessageType::Result,
            Body::KeyValidationEnc(_) => MessageType::KeyValidationEnc,
            Body::KeyValidationReply(_) => MessageType::KeyValidationReply,
        }
    }
}

/// A wire message: the originating party and the round body.
///
/// `sender` is always the *originating* party, also for copies relayed by
/// the echo-broadcast layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The originating party.
    pub sender: PartyId,
    /// The round payload.
    pub body: Body,
}

impl Message {
    /// Creates a new message.
    pub fn new(sender: PartyId, body: Body) -> Self {
        Self { sender, body }
    }

    /// The type tag of this message.
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Encodes the message into its canonical CBOR byte representation.
    ///
    /// The encoding is stable: decoding and re-encoding yields identical
    /// bytes, so hashes of this representation can be compared across peers.
    ///
    /// # Errors
    /// Returns [`CodecError::Encode`] if CBOR serialization fails.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Decodes a message from its canonical byte representation.
    ///
    /// # Errors
    /// Returns [`CodecError::Decode`] if the bytes are not a valid message.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(ciborium::from_reader(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn message_type_order_is_the_protocol_order() {
        use MessageType::*;
        let order = [
            OprfRequest,
            OprfResponse,
            Peer,
            BkValidationEnc,
            BkValidationReply,
            Decommit,
            Verify,
            Result,
            KeyValidationEnc,
            KeyValidationReply,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn canonical_encoding_is_stable() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let msg = Message::new(
            PartyId(2),
            Body::Decommit(DecommitMsg {
                salt: [7u8; 32],
                feldman: vec![Affine::rand(&mut rng), Affine::rand(&mut rng)],
            }),
        );
        let bytes = msg.to_canonical_bytes().expect("encode");
        let decoded = Message::from_canonical_bytes(&bytes).expect("decode");
        assert_eq!(decoded, msg);
        let reencoded = decoded.to_canonical_bytes().expect("re-encode");
        assert_eq!(bytes, reencoded, "re-serialization must be byte-stable");
    }

    #[test]
    fn scalar_and_point_fields_roundtrip() {
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let msg = Message::new(
            PartyId(0),
            Body::Peer(PeerMsg {
                bk: Bk::new(Scalar::rand(&mut rng), 1),
                commitment: [9u8; 32],
            }),
        );
        let bytes = msg.to_canonical_bytes().expect("encode");
        assert_eq!(
            Message::from_canonical_bytes(&bytes).expect("decode"),
            msg
        );
    }
}
