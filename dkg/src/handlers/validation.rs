//! The two interleaved validation exchanges.
//!
//! After round 1 every pair of parties cross-checks the agreed Birkhoff
//! parameter set; after round 4 they cross-check the joint public key. Both
//! use the Paillier equality sub-protocol from [`crate::validation`]: each
//! party is simultaneously the prover towards every peer (first flow) and a
//! responder for every peer's ciphertext (second flow).

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigInt;

use crate::handlers::{DecommitHandler, Handler, PartyState, Transition};
use crate::peer::PeerManager;
use crate::validation::{respond, EqualityProver};
use crate::Error;
use quorum_dkg_types::{Body, Message, MessageType, PartyId, ValidationEncMsg};

/// Which of the two validation points of the protocol is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValidationStage {
    /// After round 1, against the hash of the Birkhoff parameter set.
    BkSet,
    /// After round 4, against the hash of the joint public key.
    JointKey,
}

impl ValidationStage {
    pub(crate) fn enc_type(self) -> MessageType {
        match self {
            ValidationStage::BkSet => MessageType::BkValidationEnc,
            ValidationStage::JointKey => MessageType::KeyValidationEnc,
        }
    }

    pub(crate) fn reply_type(self) -> MessageType {
        match self {
            ValidationStage::BkSet => MessageType::BkValidationReply,
            ValidationStage::JointKey => MessageType::KeyValidationReply,
        }
    }

    fn wrap_enc(self, msg: ValidationEncMsg) -> Body {
        match self {
            ValidationStage::BkSet => Body::BkValidationEnc(msg),
            ValidationStage::JointKey => Body::KeyValidationEnc(msg),
        }
    }

    fn wrap_reply(self, msg: quorum_dkg_types::ValidationReplyMsg) -> Body {
        match self {
            ValidationStage::BkSet => Body::BkValidationReply(msg),
            ValidationStage::JointKey => Body::KeyValidationReply(msg),
        }
    }

    fn unwrap_enc(self, body: Body) -> Result<ValidationEncMsg, Error> {
        match (self, body) {
            (ValidationStage::BkSet, Body::BkValidationEnc(msg)) => Ok(msg),
            (ValidationStage::JointKey, Body::KeyValidationEnc(msg)) => Ok(msg),
            _ => Err(Error::InvalidMessage("expected a validation ciphertext")),
        }
    }

    fn unwrap_reply(self, body: Body) -> Result<quorum_dkg_types::ValidationReplyMsg, Error> {
        match (self, body) {
            (ValidationStage::BkSet, Body::BkValidationReply(msg)) => Ok(msg),
            (ValidationStage::JointKey, Body::KeyValidationReply(msg)) => Ok(msg),
            _ => Err(Error::InvalidMessage("expected a validation reply")),
        }
    }
}

/// First validation flow: send `Enc(−h)` to every peer, collect theirs.
pub(crate) struct ValidationEncHandler<P: PeerManager> {
    state: PartyState<P>,
    stage: ValidationStage,
    h: BigInt,
    provers: BTreeMap<PartyId, EqualityProver>,
    received: BTreeMap<PartyId, ValidationEncMsg>,
}

impl<P: PeerManager> ValidationEncHandler<P> {
    pub(crate) fn new(state: PartyState<P>, stage: ValidationStage, h: BigInt) -> Self {
        Self {
            state,
            stage,
            h,
            provers: BTreeMap::new(),
            received: BTreeMap::new(),
        }
    }

    pub(crate) fn state(&self) -> &PartyState<P> {
        &self.state
    }

    pub(crate) fn stage(&self) -> ValidationStage {
        self.stage
    }

    pub(crate) fn is_handled(&self, sender: PartyId) -> bool {
        self.received.contains_key(&sender)
    }

    pub(crate) fn round_start(&mut self) -> Result<(), Error> {
        let mut rng = rand::thread_rng();
        for peer in self.state.pm.peer_ids() {
            let (prover, msg) =
                EqualityProver::new(self.state.paillier.clone(), self.h.clone(), &mut rng);
            self.provers.insert(peer, prover);
            self.state.send(peer, self.stage.wrap_enc(msg));
        }
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let msg = self.stage.unwrap_enc(message.body)?;
        if !self.state.peers.contains_key(&message.sender) {
            return Err(Error::PeerNotFound(message.sender));
        }
        self.received.insert(message.sender, msg);
        Ok(())
    }

    pub(crate) fn finalize(self) -> Result<Transition<P>, Error> {
        Ok(Transition::Next(
            ValidationReplyHandler {
                state: self.state,
                stage: self.stage,
                h: self.h,
                provers: self.provers,
                pending: self.received,
                handled: BTreeSet::new(),
            }
            .into(),
        ))
    }
}

/// Second validation flow: answer every stored ciphertext, verify every
/// peer's reply against our own prover sessions.
pub(crate) struct ValidationReplyHandler<P: PeerManager> {
    state: PartyState<P>,
    stage: ValidationStage,
    h: BigInt,
    provers: BTreeMap<PartyId, EqualityProver>,
    pending: BTreeMap<PartyId, ValidationEncMsg>,
    handled: BTreeSet<PartyId>,
}

impl<P: PeerManager> ValidationReplyHandler<P> {
    pub(crate) fn state(&self) -> &PartyState<P> {
        &self.state
    }

    pub(crate) fn stage(&self) -> ValidationStage {
        self.stage
    }

    pub(crate) fn is_handled(&self, sender: PartyId) -> bool {
        self.handled.contains(&sender)
    }

    pub(crate) fn round_start(&mut self) -> Result<(), Error> {
        let mut rng = rand::thread_rng();
        for (peer, enc) in &self.pending {
            let reply = respond(enc, &self.h, &mut rng)?;
            self.state.send(*peer, self.stage.wrap_reply(reply));
        }
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let reply = self.stage.unwrap_reply(message.body)?;
        let prover = self
            .provers
            .get(&message.sender)
            .ok_or(Error::PeerNotFound(message.sender))?;
        prover.verify_reply(&reply)?;
        self.handled.insert(message.sender);
        Ok(())
    }

    pub(crate) fn finalize(mut self) -> Result<Transition<P>, Error> {
        match self.stage {
            ValidationStage::BkSet => Ok(Transition::Next(Handler::Decommit(
                DecommitHandler::new(self.state),
            ))),
            ValidationStage::JointKey => {
                let result = self
                    .state
                    .result
                    .take()
                    .expect("round 4 stores the result before the final validation");
                Ok(Transition::Complete(Box::new(result)))
            }
        }
    }
}
