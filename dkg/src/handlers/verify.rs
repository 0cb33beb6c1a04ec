//! Round 3: verify received Feldman shares and assemble the final share.

use std::collections::BTreeSet;

use crate::commitment::feldman_verify;
use crate::handlers::{PartyState, ResultHandler, Transition};
use crate::peer::PeerManager;
use crate::Error;
use quorum_dkg_types::{Body, Message, PartyId};

pub(crate) struct VerifyHandler<P: PeerManager> {
    state: PartyState<P>,
    handled: BTreeSet<PartyId>,
}

impl<P: PeerManager> VerifyHandler<P> {
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
        // Shares for this round were already sent while handling round 2.
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let Body::Verify(verify) = message.body else {
            return Err(Error::InvalidMessage("expected a verify body"));
        };
        let own_bk = self.state.bk.clone();
        let record = self.state.record_mut(message.sender)?;
        let feldman = record
            .feldman
            .as_ref()
            .ok_or(Error::InvalidMessage("missing round 2 commitment vector"))?;
        if !feldman_verify(feldman, &own_bk, &verify.share) {
            return Err(Error::VerifyFailure("feldman share"));
        }
        record.share = Some(verify.share);
        self.handled.insert(message.sender);
        Ok(())
    }

    pub(crate) fn finalize(self) -> Result<Transition<P>, Error> {
        // The final share is this party's own evaluation plus every verified
        // peer share, all evaluations of the joint polynomial Σⱼ fⱼ.
        let mut share = self.state.poly.birkhoff_evaluate(&self.state.bk);
        for (id, record) in &self.state.peers {
            let peer_share = record.share.ok_or(Error::PeerNotFound(*id))?;
            share += peer_share;
        }
        tracing::debug!(party = %self.state.self_id(), "round 3 complete");
        Ok(Transition::Next(
            ResultHandler::new(self.state, share).into(),
        ))
    }
}
