//! The per-round message handlers of the DKG state machine.
//!
//! Handlers form a tagged variant rather than a trait object: the chain is
//! finite and each round hands the accumulated [`PartyState`] to its
//! successor by value. Every handler implements the same contract —
//! `message_type` / `required_count` / `is_handled` / `round_start` /
//! `handle` / `finalize` — which the coordinator loop drives.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::{BigInt, BigUint};
use rand::{CryptoRng, Rng};
use sha3::{Digest, Sha3_256};

use crate::commitment::{feldman_commit, feldman_expected_point, HashCommitter};
use crate::curve::{point_bytes, scalar_bytes, Affine, Projective, Scalar};
use crate::paillier::PaillierKeyPair;
use crate::peer::{broadcast, empty_records, PeerManager, PeerRecord};
use crate::polynomial::Polynomial;
use crate::{DkgResult, Error};
use ark_ff::{UniformRand, Zero};
use quorum_dkg_types::{Bk, Body, Message, MessageType, PartyId};

mod decommit;
mod oprf;
mod peer_round;
mod result;
mod validation;
mod verify;

pub(crate) use decommit::DecommitHandler;
pub(crate) use oprf::{OprfServerHandler, OprfUserHandler};
pub(crate) use peer_round::PeerHandler;
pub(crate) use result::ResultHandler;
pub(crate) use validation::{ValidationEncHandler, ValidationReplyHandler, ValidationStage};
pub(crate) use verify::VerifyHandler;

/// Everything a party accumulates over the protocol run, threaded through
/// the handler chain by value.
pub(crate) struct PartyState<P: PeerManager> {
    pub(crate) pm: Arc<P>,
    pub(crate) threshold: usize,
    pub(crate) bk: Bk,
    pub(crate) poly: Polynomial,
    pub(crate) feldman: Vec<Affine>,
    pub(crate) committer: HashCommitter,
    pub(crate) peers: BTreeMap<PartyId, PeerRecord>,
    pub(crate) paillier: Arc<PaillierKeyPair>,
    /// The server's OPRF key in password mode.
    pub(crate) oprf_key: Option<Scalar>,
    /// Filled by round 4, surfaced once the final validation passes.
    pub(crate) result: Option<DkgResult>,
}

impl<P: PeerManager> PartyState<P> {
    pub(crate) fn new<R: Rng + CryptoRng>(
        pm: Arc<P>,
        threshold: usize,
        rank: u32,
        poly: Polynomial,
        paillier: Arc<PaillierKeyPair>,
        rng: &mut R,
    ) -> Self {
        let x = loop {
            let candidate = Scalar::rand(rng);
            if !candidate.is_zero() {
                break candidate;
            }
        };
        let bk = Bk::new(x, rank);
        let feldman = feldman_commit(poly.coefficients());
        let committer = HashCommitter::commit(feldman[0], rng);
        let peers = empty_records(&pm.peer_ids());
        Self {
            pm,
            threshold,
            bk,
            poly,
            feldman,
            committer,
            peers,
            paillier,
            oprf_key: None,
            result: None,
        }
    }

    /// Swaps in a new sharing polynomial, recomputing the Feldman vector and
    /// the hash commitment. Password mode uses this after the OPRF round has
    /// fixed the constant term.
    pub(crate) fn replace_polynomial<R: Rng + CryptoRng>(&mut self, poly: Polynomial, rng: &mut R) {
        self.feldman = feldman_commit(poly.coefficients());
        self.committer = HashCommitter::commit(self.feldman[0], rng);
        self.poly = poly;
    }

    pub(crate) fn self_id(&self) -> PartyId {
        self.pm.self_id()
    }

    pub(crate) fn broadcast(&self, body: Body) {
        broadcast(self.pm.as_ref(), &Message::new(self.self_id(), body));
    }

    pub(crate) fn send(&self, to: PartyId, body: Body) {
        self.pm.must_send(to, Message::new(self.self_id(), body));
    }

    pub(crate) fn record_mut(&mut self, id: PartyId) -> Result<&mut PeerRecord, Error> {
        self.peers.get_mut(&id).ok_or(Error::PeerNotFound(id))
    }

    /// The Birkhoff parameters of every party, own included.
    pub(crate) fn bks(&self) -> Result<BTreeMap<PartyId, Bk>, Error> {
        let mut bks = BTreeMap::new();
        bks.insert(self.self_id(), self.bk.clone());
        for (id, record) in &self.peers {
            let bk = record
                .bk
                .clone()
                .ok_or(Error::InvalidBks("missing peer parameter"))?;
            bks.insert(*id, bk);
        }
        Ok(bks)
    }

    /// The public image `sᵢG` of the final share of the party at `bk`,
    /// assembled from every published Feldman commitment.
    pub(crate) fn public_share_point(&self, bk: &Bk) -> Result<Projective, Error> {
        let mut sum = feldman_expected_point(&self.feldman, bk);
        for (id, record) in &self.peers {
            let feldman = record
                .feldman
                .as_ref()
                .ok_or(Error::PeerNotFound(*id))?;
            sum += feldman_expected_point(feldman, bk);
        }
        Ok(sum)
    }
}

/// What `finalize` hands back to the loop.
pub(crate) enum Transition<P: PeerManager> {
    /// Advance to the next round.
    Next(Handler<P>),
    /// The protocol is complete.
    Complete(Box<DkgResult>),
}

/// The tagged round handler.
pub(crate) enum Handler<P: PeerManager> {
    OprfUser(OprfUserHandler<P>),
    OprfServer(OprfServerHandler<P>),
    Peer(PeerHandler<P>),
    ValidationEnc(ValidationEncHandler<P>),
    ValidationReply(ValidationReplyHandler<P>),
    Decommit(DecommitHandler<P>),
    Verify(VerifyHandler<P>),
    Result(ResultHandler<P>),
}

impl<P: PeerManager> Handler<P> {
    /// The message type this handler consumes.
    pub(crate) fn message_type(&self) -> MessageType {
        match self {
            Handler::OprfUser(_) => MessageType::OprfResponse,
            Handler::OprfServer(_) => MessageType::OprfRequest,
            Handler::Peer(_) => MessageType::Peer,
            Handler::ValidationEnc(h) => h.stage().enc_type(),
            Handler::ValidationReply(h) => h.stage().reply_type(),
            Handler::Decommit(_) => MessageType::Decommit,
            Handler::Verify(_) => MessageType::Verify,
            Handler::Result(_) => MessageType::Result,
        }
    }

    /// How many messages the round needs before it can finalize.
    pub(crate) fn required_count(&self) -> usize {
        match self {
            Handler::OprfUser(h) => h.state().pm.num_peers(),
            Handler::OprfServer(h) => h.state().pm.num_peers(),
            Handler::Peer(h) => h.state().pm.num_peers(),
            Handler::ValidationEnc(h) => h.state().pm.num_peers(),
            Handler::ValidationReply(h) => h.state().pm.num_peers(),
            Handler::Decommit(h) => h.state().pm.num_peers(),
            Handler::Verify(h) => h.state().pm.num_peers(),
            Handler::Result(h) => h.state().pm.num_peers(),
        }
    }

    /// Whether a sender's message for this round was already consumed.
    pub(crate) fn is_handled(&self, sender: PartyId) -> bool {
        match self {
            Handler::OprfUser(h) => h.is_handled(sender),
            Handler::OprfServer(h) => h.is_handled(sender),
            Handler::Peer(h) => h.is_handled(sender),
            Handler::ValidationEnc(h) => h.is_handled(sender),
            Handler::ValidationReply(h) => h.is_handled(sender),
            Handler::Decommit(h) => h.is_handled(sender),
            Handler::Verify(h) => h.is_handled(sender),
            Handler::Result(h) => h.is_handled(sender),
        }
    }

    /// Sends the round's outbound messages. Called once when the handler
    /// becomes current.
    pub(crate) fn round_start(&mut self) -> Result<(), Error> {
        match self {
            Handler::OprfUser(h) => h.round_start(),
            Handler::OprfServer(h) => h.round_start(),
            Handler::Peer(h) => h.round_start(),
            Handler::ValidationEnc(h) => h.round_start(),
            Handler::ValidationReply(h) => h.round_start(),
            Handler::Decommit(h) => h.round_start(),
            Handler::Verify(h) => h.round_start(),
            Handler::Result(h) => h.round_start(),
        }
    }

    /// Consumes one inbound message of this round's type.
    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        match self {
            Handler::OprfUser(h) => h.handle(message),
            Handler::OprfServer(h) => h.handle(message),
            Handler::Peer(h) => h.handle(message),
            Handler::ValidationEnc(h) => h.handle(message),
            Handler::ValidationReply(h) => h.handle(message),
            Handler::Decommit(h) => h.handle(message),
            Handler::Verify(h) => h.handle(message),
            Handler::Result(h) => h.handle(message),
        }
    }

    /// Completes the round and produces the next one (or the result).
    pub(crate) fn finalize(self) -> Result<Transition<P>, Error> {
        match self {
            Handler::OprfUser(h) => h.finalize(),
            Handler::OprfServer(h) => h.finalize(),
            Handler::Peer(h) => h.finalize(),
            Handler::ValidationEnc(h) => h.finalize(),
            Handler::ValidationReply(h) => h.finalize(),
            Handler::Decommit(h) => h.finalize(),
            Handler::Verify(h) => h.finalize(),
            Handler::Result(h) => h.finalize(),
        }
    }
}

/// The agreed hash of the full Birkhoff parameter set, validated pairwise
/// after round 1.
pub(crate) fn bk_set_hash(bks: &BTreeMap<PartyId, Bk>) -> BigInt {
    let mut hasher = Sha3_256::new();
    hasher.update(b"QUORUM_BK_SET_V1");
    for (id, bk) in bks {
        hasher.update(id.into_inner().to_be_bytes());
        hasher.update(scalar_bytes(&bk.x));
        hasher.update(bk.rank.to_be_bytes());
    }
    BigInt::from(BigUint::from_bytes_be(&hasher.finalize()))
}

/// The agreed hash of the joint public key, validated pairwise after
/// round 4.
pub(crate) fn joint_key_hash(public_key: &Affine) -> BigInt {
    let mut hasher = Sha3_256::new();
    hasher.update(b"QUORUM_JOINT_KEY_V1");
    hasher.update(point_bytes(public_key));
    BigInt::from(BigUint::from_bytes_be(&hasher.finalize()))
}

/// Context bytes binding a Schnorr proof to its prover.
pub(crate) fn proof_context(id: PartyId) -> [u8; 2] {
    id.into_inner().to_be_bytes()
}

macro_rules! impl_handler_from {
    ($($variant:ident => $ty:ident),* $(,)?) => {
        $(impl<P: PeerManager> From<$ty<P>> for Handler<P> {
            fn from(value: $ty<P>) -> Self {
                Handler::$variant(value)
            }
        })*
    };
}

impl_handler_from!(
    OprfUser => OprfUserHandler,
    OprfServer => OprfServerHandler,
    Peer => PeerHandler,
    ValidationEnc => ValidationEncHandler,
    ValidationReply => ValidationReplyHandler,
    Decommit => DecommitHandler,
    Verify => VerifyHandler,
    Result => ResultHandler,
);
