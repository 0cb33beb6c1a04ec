//! Echo-broadcast hardening for the broadcast rounds.
//!
//! A corrupted broadcaster could send different round payloads to different
//! peers; the commitment rounds would then diverge silently. The wrapper
//! re-transmits every first-seen broadcast to all other peers and only
//! releases a message to the coordinator once every peer has echoed a
//! byte-identical copy and the origin's own copy has been observed. Any
//! mismatch fails the whole session with [`Error::DifferentHash`].
//!
//! Canonical comparison hashes the deterministic wire encoding of the
//! message, so transports must hand the wrapper exactly what was received.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::peer::PeerManager;
use crate::{Dkg, Error};
use quorum_dkg_types::{Message, MessageType, PartyId};

/// The message types that are broadcasts in the main protocol.
pub const BROADCAST_TYPES: [MessageType; 3] = [
    MessageType::Peer,
    MessageType::Decommit,
    MessageType::Result,
];

struct EchoEntry {
    digest: [u8; 32],
    message: Option<Message>,
    forwarders: BTreeSet<PartyId>,
    seen_origin: bool,
    delivered: bool,
}

/// Decorator over [`Dkg::add_message`] enforcing echo-broadcast agreement
/// for a designated set of message types.
pub struct EchoBroadcast<P: PeerManager> {
    dkg: Dkg<P>,
    pm: Arc<P>,
    types: BTreeSet<MessageType>,
    entries: Mutex<HashMap<(PartyId, MessageType), EchoEntry>>,
}

impl<P: PeerManager> EchoBroadcast<P> {
    /// Wraps a coordinator. `types` is the broadcast subset; anything else
    /// passes straight through.
    pub fn new(dkg: Dkg<P>, pm: Arc<P>, types: impl IntoIterator<Item = MessageType>) -> Self {
        Self {
            dkg,
            pm,
            types: types.into_iter().collect(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped coordinator.
    pub fn dkg(&self) -> &Dkg<P> {
        &self.dkg
    }

    /// Routes one received message.
    ///
    /// `from` is the peer the transport received the bytes from, which for
    /// echoed copies differs from `message.sender` (the origin).
    ///
    /// # Errors
    /// [`Error::DifferentHash`] when a copy disagrees with the first one
    /// seen (this also fails the wrapped coordinator); otherwise whatever
    /// [`Dkg::add_message`] returns for the released message.
    pub fn add_message(&self, from: PartyId, message: Message) -> Result<(), Error> {
        let mtype = message.message_type();
        if !self.types.contains(&mtype) {
            return self.dkg.add_message(message);
        }
        let origin = message.sender;
        let digest = *blake3::hash(&message.to_canonical_bytes()?).as_bytes();

        let release = {
            let mut entries = self.entries.lock();
            let entry = entries.entry((origin, mtype)).or_insert_with(|| {
                // First sighting: re-transmit to everyone else so all peers
                // can compare copies. Fire-and-forget, off the caller.
                self.forward(from, &message);
                EchoEntry {
                    digest,
                    message: Some(message.clone()),
                    forwarders: BTreeSet::new(),
                    seen_origin: false,
                    delivered: false,
                }
            });
            if entry.digest != digest {
                drop(entries);
                // Propagate the conflicting copy so every honest peer can
                // observe the equivocation, then fail the session.
                self.forward(from, &message);
                self.dkg
                    .abort(Error::DifferentHash { origin, mtype });
                return Err(Error::DifferentHash { origin, mtype });
            }
            entry.forwarders.insert(from);
            if from == origin {
                entry.seen_origin = true;
            }
            if entry.seen_origin
                && entry.forwarders.len() >= self.pm.num_peers()
                && !entry.delivered
            {
                entry.delivered = true;
                entry.message.take()
            } else {
                None
            }
        };

        match release {
            Some(message) => self.dkg.add_message(message),
            None => Ok(()),
        }
    }

    // Re-transmits a broadcast to every peer that has not seen it through
    // us: everyone except the origin and whoever just delivered it.
    fn forward(&self, from: PartyId, message: &Message) {
        let origin = message.sender;
        let pm = self.pm.clone();
        let message = message.clone();
        tokio::spawn(async move {
            for peer in pm.peer_ids() {
                if peer == origin || peer == from {
                    continue;
                }
                pm.must_send(peer, message.clone());
            }
        });
    }
}
