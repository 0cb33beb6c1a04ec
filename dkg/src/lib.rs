#![deny(missing_docs, clippy::unwrap_used)]
//! Distributed key generation with Birkhoff (rank-aware) secret sharing,
//! an optional password-authenticated two-party mode, and a Paillier-backed
//! cross-validation sub-protocol.
//!
//! Each party runs a [`Dkg`] coordinator: a single message loop that drives
//! an ordered chain of round handlers. The transport pushes inbound
//! [`types::Message`]s through [`Dkg::add_message`] (or through an
//! [`echo::EchoBroadcast`] wrapper for the broadcast rounds); the loop
//! dispatches them to the current handler and advances when the round has
//! seen every peer. On completion [`Dkg::get_result`] yields the joint
//! public key, this party's secret share, and the Birkhoff parameters of
//! all parties.
//!
//! The password mode replaces round 1 with a DH-OPRF exchange so the user's
//! secret contribution is derived deterministically from its password and
//! the server's OPRF key; see [`oprf`].

use quorum_dkg_types::{CodecError, MessageType, PartyId};
use std::collections::BTreeMap;

pub mod birkhoff;
pub mod commitment;
pub mod coordinator;
pub mod curve;
pub mod echo;
pub mod hd;
pub mod oprf;
pub mod paillier;
pub mod peer;
pub mod proof;
pub mod validation;

mod handlers;
mod matrix;
mod polynomial;

pub use coordinator::Dkg;
pub use peer::PeerManager;
pub use quorum_dkg_types as types;

use curve::{Affine, Scalar};
use types::Bk;

/// All errors the DKG protocol may raise.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The collected Birkhoff parameters cannot interpolate a degree
    /// `threshold − 1` polynomial.
    #[error("invalid birkhoff parameters: {0}")]
    InvalidBks(&'static str),
    /// The threshold is outside `[2, number of parties]`.
    #[error("threshold {threshold} is invalid for {parties} parties")]
    LargeThreshold {
        /// The requested threshold.
        threshold: usize,
        /// The total number of parties.
        parties: usize,
    },
    /// The rank must stay below the threshold.
    #[error("rank {rank} is invalid for threshold {threshold}")]
    InvalidRank {
        /// The requested rank.
        rank: u32,
        /// The requested threshold.
        threshold: usize,
    },
    /// The password mode requires exactly one peer.
    #[error("password mode requires exactly one peer, got {0}")]
    InvalidPeerNum(usize),
    /// A message arrived from a party that is not part of this session.
    #[error("unknown peer {0}")]
    PeerNotFound(PartyId),
    /// A peer sent two messages for the same round.
    #[error("duplicate {mtype} message from {sender}")]
    DuplicateMessage {
        /// The offending party.
        sender: PartyId,
        /// The duplicated round.
        mtype: MessageType,
    },
    /// A message for an already-completed round was rejected.
    #[error("message type {got} is older than the current round {current}")]
    OldMessage {
        /// The rejected type.
        got: MessageType,
        /// The round the loop is currently in.
        current: MessageType,
    },
    /// A message body did not match its round or failed a schema check.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    /// The bounded channel for a message type is full.
    #[error("channel for {0} is full")]
    FullChannel(MessageType),
    /// A decommitment did not open the round 1 hash commitment.
    #[error("decommitment from {0} does not match its commitment")]
    DifferentDigest(PartyId),
    /// A Feldman share, Schnorr proof or validation exchange failed.
    #[error("verification failed: {0}")]
    VerifyFailure(&'static str),
    /// Parties computed different joint public keys.
    #[error("inconsistent public key")]
    InconsistentPubKey,
    /// Password mode: the user's evaluation point is invalid.
    #[error("invalid user evaluation point")]
    InvalidUserX,
    /// Password mode: a curve point that must not be the identity was.
    #[error("unexpected identity point")]
    IdentityPoint,
    /// Deriving a scalar from a digest exceeded the retry bound.
    #[error("exceeded maximum rehash retries")]
    ExceedMaxRetry,
    /// A Paillier ciphertext was outside `[0, n²)`.
    #[error("paillier ciphertext out of range")]
    EncryptionMsgWrong,
    /// HD derivation produced an out-of-range tweak.
    #[error("invalid hd derivation")]
    InvalidDerivation,
    /// The result was requested before the protocol finished.
    #[error("protocol is not done")]
    NotReady,
    /// A terminal state was entered twice or the loop was started twice.
    #[error("invalid state transition from {0}")]
    InvalidStateTransition(State),
    /// The loop was cancelled through [`Dkg::stop`].
    #[error("protocol cancelled")]
    Cancelled,
    /// An echoed broadcast did not match the first copy seen.
    #[error("broadcast {mtype} from {origin} differs between peers")]
    DifferentHash {
        /// The originating party of the broadcast.
        origin: PartyId,
        /// The broadcast round.
        mtype: MessageType,
    },
    /// Wire encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// The lifecycle state of a [`Dkg`] coordinator.
///
/// The only transitions are `Init → Done` and `Init → Failed`, each taken
/// at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The protocol is constructed or running.
    Init,
    /// The protocol finished; [`Dkg::get_result`] is available.
    Done,
    /// The protocol failed or was cancelled; [`Dkg::error`] describes why.
    Failed,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Observer for coordinator state changes.
///
/// Called exactly once per transition, from the message loop task.
pub trait StateListener: Send + Sync + 'static {
    /// Notification that the coordinator moved from `old` to `new`.
    fn on_state_changed(&self, old: State, new: State);
}

/// The output of a completed DKG run.
#[derive(Clone)]
pub struct DkgResult {
    /// The joint public key `Q`.
    pub public_key: Affine,
    /// This party's secret share of the joint key.
    pub share: Scalar,
    /// The Birkhoff parameters of every party, own included.
    pub bks: BTreeMap<PartyId, Bk>,
    /// The server's OPRF key; present only on the password server side.
    pub k: Option<Scalar>,
}
