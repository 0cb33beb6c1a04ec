//! Password mode round 0: the OPRF exchange that replaces random secret
//! sampling on the user side.
//!
//! The user blinds its password and learns `PRF_k(pw)`, which becomes the
//! constant term of its sharing polynomial. The server contributes no secret
//! of its own (its constant term is zero); its durable secret is the OPRF
//! key `k`, which it keeps so the same password always reproduces the same
//! joint key.

use std::collections::BTreeSet;

use ark_ff::Zero;
use rand::{CryptoRng, Rng};

use crate::curve::{Affine, Scalar};
use crate::handlers::{PartyState, PeerHandler, Transition};
use crate::oprf::{OprfEvaluator, OprfRequester};
use crate::peer::PeerManager;
use crate::polynomial::Polynomial;
use crate::Error;
use quorum_dkg_types::{Body, Message, OprfRequestMsg, OprfResponseMsg, PartyId};

pub(crate) struct OprfUserHandler<P: PeerManager> {
    state: PartyState<P>,
    requester: OprfRequester,
    alpha: Affine,
    derived: Option<Scalar>,
    handled: BTreeSet<PartyId>,
}

impl<P: PeerManager> OprfUserHandler<P> {
    pub(crate) fn new<R: Rng + CryptoRng>(
        state: PartyState<P>,
        password: &[u8],
        rng: &mut R,
    ) -> Self {
        let (requester, alpha) = OprfRequester::new(password, rng);
        Self {
            state,
            requester,
            alpha,
            derived: None,
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
        for peer in self.state.pm.peer_ids() {
            self.state.send(
                peer,
                Body::OprfRequest(OprfRequestMsg {
                    x: self.state.bk.x,
                    alpha: self.alpha,
                }),
            );
        }
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let Body::OprfResponse(response) = message.body else {
            return Err(Error::InvalidMessage("expected an oprf response"));
        };
        if !self.state.peers.contains_key(&message.sender) {
            return Err(Error::PeerNotFound(message.sender));
        }
        self.derived = Some(self.requester.finalize(&response.beta)?);
        self.handled.insert(message.sender);
        Ok(())
    }

    pub(crate) fn finalize(mut self) -> Result<Transition<P>, Error> {
        let derived = self
            .derived
            .expect("required count guarantees a processed response");
        let mut rng = rand::thread_rng();
        let degree = self.state.threshold - 1;
        self.state
            .replace_polynomial(Polynomial::with_constant(derived, degree, &mut rng), &mut rng);
        tracing::debug!(party = %self.state.self_id(), "oprf complete, entering round 1");
        Ok(Transition::Next(PeerHandler::new(self.state).into()))
    }
}

pub(crate) struct OprfServerHandler<P: PeerManager> {
    state: PartyState<P>,
    evaluator: OprfEvaluator,
    handled: BTreeSet<PartyId>,
}

impl<P: PeerManager> OprfServerHandler<P> {
    pub(crate) fn new(state: PartyState<P>, evaluator: OprfEvaluator) -> Self {
        Self {
            state,
            evaluator,
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
        // The server only answers; the user opens the exchange.
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let Body::OprfRequest(request) = message.body else {
            return Err(Error::InvalidMessage("expected an oprf request"));
        };
        if !self.state.peers.contains_key(&message.sender) {
            return Err(Error::PeerNotFound(message.sender));
        }
        if request.x.is_zero() {
            return Err(Error::InvalidUserX);
        }
        let beta = self.evaluator.evaluate(&request.alpha)?;
        self.state
            .send(message.sender, Body::OprfResponse(OprfResponseMsg { beta }));
        self.handled.insert(message.sender);
        Ok(())
    }

    pub(crate) fn finalize(mut self) -> Result<Transition<P>, Error> {
        // The server shares a zero constant term: the joint secret is
        // exactly the user's password-derived value, and the server's
        // durable secret is its OPRF key.
        let mut rng = rand::thread_rng();
        let degree = self.state.threshold - 1;
        self.state.replace_polynomial(
            Polynomial::with_constant(Scalar::zero(), degree, &mut rng),
            &mut rng,
        );
        self.state.oprf_key = Some(self.evaluator.key());
        tracing::debug!(party = %self.state.self_id(), "oprf served, entering round 1");
        Ok(Transition::Next(PeerHandler::new(self.state).into()))
    }
}
