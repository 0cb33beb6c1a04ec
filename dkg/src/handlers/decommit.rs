//! Round 2: open the hash commitments and distribute Feldman shares.

use std::collections::BTreeSet;

use crate::commitment::verify_opening;
use crate::handlers::{PartyState, Transition, VerifyHandler};
use crate::peer::PeerManager;
use crate::Error;
use quorum_dkg_types::{Body, DecommitMsg, Message, PartyId, VerifyMsg};

pub(crate) struct DecommitHandler<P: PeerManager> {
    state: PartyState<P>,
    handled: BTreeSet<PartyId>,
}

impl<P: PeerManager> DecommitHandler<P> {
    pub(crate) fn new(state: PartyState<P>) -> Self {
        Self {
            state,
            handled: BTreeSet::new(),
        }
    }

    pub(crate) fn state(&self) -> &PartyState<P> {
        &self.state
    }

    pub(crate) fn is_handled(&self, sender: PartyId) -> bool {
        self.handled.contains(&sender)
    }

    pub(crate) fn round_start(&mut self) -> Result<(), Error> {
        tracing::debug!(party = %self.state.self_id(), "round 2: opening commitment");
        self.state.broadcast(Body::Decommit(DecommitMsg {
            salt: self.state.committer.salt(),
            feldman: self.state.feldman.clone(),
        }));
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let Body::Decommit(decommit) = message.body else {
            return Err(Error::InvalidMessage("expected a decommit body"));
        };
        let sender = message.sender;
        let threshold = self.state.threshold;
        let record = self.state.record_mut(sender)?;
        if decommit.feldman.len() != threshold {
            return Err(Error::InvalidMessage("feldman vector length"));
        }
        let commitment = record
            .commitment
            .ok_or(Error::InvalidMessage("missing round 1 commitment"))?;
        // feldman[0] is the peer's u₀G; the round 1 digest must open to it.
        if !verify_opening(&commitment, &decommit.salt, &decommit.feldman[0]) {
            return Err(Error::DifferentDigest(sender));
        }
        let peer_bk = record
            .bk
            .clone()
            .ok_or(Error::InvalidMessage("missing round 1 parameter"))?;
        record.feldman = Some(decommit.feldman);
        self.handled.insert(sender);

        // Answer with this party's share for the peer, evaluated at the
        // peer's Birkhoff parameter.
        let share = self.state.poly.birkhoff_evaluate(&peer_bk);
        self.state.send(sender, Body::Verify(VerifyMsg { share }));
        Ok(())
    }

    pub(crate) fn finalize(self) -> Result<Transition<P>, Error> {
        Ok(Transition::Next(VerifyHandler::new(self.state).into()))
    }
}
