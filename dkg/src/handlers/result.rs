//! Round 4: prove share knowledge and derive the joint public key.

use std::collections::BTreeSet;

use ark_ec::{AffineRepr, CurveGroup, VariableBaseMSM as _};

use crate::birkhoff::birkhoff_coefficients;
use crate::curve::{Affine, Projective, Scalar};
use crate::handlers::{
    joint_key_hash, proof_context, PartyState, Transition, ValidationEncHandler, ValidationStage,
};
use crate::peer::PeerManager;
use crate::{DkgResult, Error};
use quorum_dkg_types::{Body, Message, PartyId, ResultMsg};

pub(crate) struct ResultHandler<P: PeerManager> {
    state: PartyState<P>,
    share: Scalar,
    handled: BTreeSet<PartyId>,
}

impl<P: PeerManager> ResultHandler<P> {
    pub(crate) fn new(state: PartyState<P>, share: Scalar) -> Self {
        Self {
            state,
            share,
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
        let mut rng = rand::thread_rng();
        let proof = crate::proof::prove_share(
            &self.share,
            &proof_context(self.state.self_id()),
            &mut rng,
        );
        self.state.broadcast(Body::Result(ResultMsg { proof }));
        Ok(())
    }

    pub(crate) fn handle(&mut self, message: Message) -> Result<(), Error> {
        let Body::Result(result_msg) = message.body else {
            return Err(Error::InvalidMessage("expected a result body"));
        };
        let sender = message.sender;
        let record = self
            .state
            .peers
            .get(&sender)
            .ok_or(Error::PeerNotFound(sender))?;
        let bk = record
            .bk
            .clone()
            .ok_or(Error::InvalidMessage("missing round 1 parameter"))?;
        // Everyone can recompute the peer's public share from the published
        // Feldman vectors; the proof shows the peer holds its preimage.
        let expected = self.state.public_share_point(&bk)?.into_affine();
        crate::proof::verify_share_proof(&result_msg.proof, &expected, &proof_context(sender))?;
        let record = self.state.record_mut(sender)?;
        record.proof = Some(result_msg.proof);
        self.handled.insert(sender);
        Ok(())
    }

    pub(crate) fn finalize(mut self) -> Result<Transition<P>, Error> {
        let bks = self.state.bks()?;
        let coefficients = birkhoff_coefficients(&bks, self.state.threshold)?;

        // Q = Σᵢ bᵢ·sᵢG over every party, own included.
        let mut points = Vec::with_capacity(bks.len());
        let mut weights = Vec::with_capacity(bks.len());
        for (id, bk) in &bks {
            points.push(self.state.public_share_point(bk)?.into_affine());
            weights.push(coefficients[id]);
        }
        let public_key = Projective::msm_unchecked(&points, &weights);

        // The same key is Σⱼ u₀ⱼG directly from the commitment vectors;
        // parties that disagree here have diverging transcripts.
        let mut sum_u0 = Projective::from(self.state.feldman[0]);
        for (id, record) in &self.state.peers {
            let feldman = record.feldman.as_ref().ok_or(Error::PeerNotFound(*id))?;
            sum_u0 += feldman[0];
        }
        if public_key != sum_u0 {
            return Err(Error::InconsistentPubKey);
        }

        // Own share must be the preimage of our own public share point.
        let own_expected = self.state.public_share_point(&self.state.bk)?;
        if Affine::generator() * self.share != own_expected {
            return Err(Error::VerifyFailure("own share"));
        }

        let public_key = public_key.into_affine();
        if public_key.is_zero() {
            return Err(Error::IdentityPoint);
        }
        tracing::debug!(party = %self.state.self_id(), "round 4 complete, validating joint key");

        self.state.result = Some(DkgResult {
            public_key,
            share: self.share,
            bks,
            k: self.state.oprf_key,
        });
        let h = joint_key_hash(&public_key);
        Ok(Transition::Next(
            ValidationEncHandler::new(self.state, ValidationStage::JointKey, h).into(),
        ))
    }
}
