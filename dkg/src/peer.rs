//! The peer-manager seam and per-peer protocol records.
//!
//! Transport is a collaborator: the coordinator only ever asks it to send a
//! message to a peer, and the transport pushes inbound messages back through
//! [`crate::Dkg::add_message`]. Everything else (connections, retries,
//! encodings on the wire) lives behind this trait.

use std::collections::BTreeMap;

use crate::curve::{Affine, Scalar};
use quorum_dkg_types::{Bk, Message, PartyId, SchnorrProof};

/// Transport seam between a coordinator and its peers.
///
/// `must_send` is infallible at this boundary: an implementation that cannot
/// deliver must tear the session down through [`crate::Dkg::stop`] (or its
/// own supervision), not report per-message errors back into the protocol.
pub trait PeerManager: Send + Sync + 'static {
    /// This party's identifier.
    fn self_id(&self) -> PartyId;
    /// The number of remote parties.
    fn num_peers(&self) -> usize;
    /// The identifiers of all remote parties.
    fn peer_ids(&self) -> Vec<PartyId>;
    /// Delivers a message to one peer.
    fn must_send(&self, to: PartyId, message: Message);
}

/// Sends a message to every peer.
pub(crate) fn broadcast<P: PeerManager>(pm: &P, message: &Message) {
    for id in pm.peer_ids() {
        pm.must_send(id, message.clone());
    }
}

/// Everything learned about one remote party over the protocol run.
///
/// Created when the handler chain is constructed; each round fills in its
/// own fields and later rounds only read them.
#[derive(Debug, Clone, Default)]
pub(crate) struct PeerRecord {
    /// Round 1: the peer's Birkhoff parameter.
    pub bk: Option<Bk>,
    /// Round 1: the peer's hash commitment to its `u₀G`.
    pub commitment: Option<[u8; 32]>,
    /// Round 2: the peer's Feldman commitment vector.
    pub feldman: Option<Vec<Affine>>,
    /// Round 3: the verified share this party received from the peer.
    pub share: Option<Scalar>,
    /// Round 4: the peer's proof of knowledge.
    pub proof: Option<SchnorrProof>,
}

/// Creates the empty per-peer records for a peer set.
pub(crate) fn empty_records(ids: &[PartyId]) -> BTreeMap<PartyId, PeerRecord> {
    ids.iter().map(|id| (*id, PeerRecord::default())).collect()
}
