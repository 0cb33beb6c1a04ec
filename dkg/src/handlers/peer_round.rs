//! Round 1: exchange Birkhoff parameters and hash commitments.

use std::collections::BTreeSet;

use crate::birkhoff::check_bks;
use crate::handlers::{bk_set_hash, PartyState, Transition, ValidationEncHandler, ValidationStage};
use crate::peer::PeerManager;
use crate::Error;
use quorum_dkg_types::{Body, Message, PartyId, PeerMsg};

pub(crate) struct PeerHandler<P: PeerManager> {
    state: PartyState<P>,
    handled: BTreeSet<PartyId>,
}

impl<P: PeerManager> PeerHandler<P> {
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
        tracing::debug!(party = %self.state.self_id(), "round 1: broadcasting peer message");
        self.state.broadcast(Body::Peer(PeerMsg {
            bk: self.state.bk.clone(),
            commitment: self.state.committer.digest(),
        }));
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let Body::Peer(peer_msg) = message.body else {
            return Err(Error::InvalidMessage("expected a peer body"));
        };
        let record = self.state.record_mut(message.sender)?;
        record.bk = Some(peer_msg.bk);
        record.commitment = Some(peer_msg.commitment);
        self.handled.insert(message.sender);
        Ok(())
    }

    pub(crate) fn finalize(self) -> Result<Transition<P>, Error> {
        let bks = self.state.bks()?;
        let refs: Vec<_> = bks.values().collect();
        check_bks(&refs, self.state.threshold)?;
        let h = bk_set_hash(&bks);
        tracing::debug!(party = %self.state.self_id(), "round 1 complete, validating parameter set");
        Ok(Transition::Next(
            ValidationEncHandler::new(self.state, ValidationStage::BkSet, h).into(),
        ))
    }
}
