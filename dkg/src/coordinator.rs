//! The per-party protocol driver.
//!
//! A [`Dkg`] owns one bounded FIFO channel per message type and a single
//! message loop task. The transport calls [`Dkg::add_message`] from any
//! context; the loop pops only the type the current round expects, so newer
//! messages wait in their channels and older ones are rejected at the door.
//! Handlers run exclusively on the loop task.
//!
//! Lifecycle: `Init → Done` on success, `Init → Failed` on the first error
//! or on [`Dkg::stop`]; either transition happens exactly once and is
//! reported through the [`StateListener`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::handlers::{
    Handler, OprfServerHandler, OprfUserHandler, PartyState, PeerHandler, Transition,
};
use crate::oprf::OprfEvaluator;
use crate::paillier::{PaillierKeyPair, DEFAULT_MODULUS_BITS};
use crate::peer::PeerManager;
use crate::polynomial::Polynomial;
use crate::{curve::Scalar, DkgResult, Error, State, StateListener};
use quorum_dkg_types::{Message, MessageType};

/// Threshold and rank of the two-party password mode.
const PASSWORD_THRESHOLD: usize = 2;
const PASSWORD_RANK: u32 = 0;

struct LoopSeed<P: PeerManager> {
    handler: Handler<P>,
    receivers: BTreeMap<MessageType, mpsc::Receiver<Message>>,
}

struct Inner<P: PeerManager> {
    state: Mutex<State>,
    error: Mutex<Option<Arc<Error>>>,
    result: Mutex<Option<DkgResult>>,
    current_type: Mutex<MessageType>,
    senders: BTreeMap<MessageType, mpsc::Sender<Message>>,
    seed: Mutex<Option<LoopSeed<P>>>,
    cancel: CancellationToken,
    listener: Box<dyn StateListener>,
    state_tx: watch::Sender<State>,
    state_rx: watch::Receiver<State>,
}

impl<P: PeerManager> Inner<P> {
    // Takes the single Init → terminal transition; later calls are no-ops.
    fn transition(&self, new: State) {
        {
            let mut state = self.state.lock();
            if *state != State::Init {
                return;
            }
            *state = new;
        }
        self.listener.on_state_changed(State::Init, new);
        let _ = self.state_tx.send(new);
    }

    fn fail(&self, error: Error) {
        {
            let mut slot = self.error.lock();
            if slot.is_none() {
                *slot = Some(Arc::new(error));
            }
        }
        self.transition(State::Failed);
        self.cancel.cancel();
    }
}

/// A per-party DKG coordinator.
///
/// Cheap to clone; all clones drive the same protocol instance.
pub struct Dkg<P: PeerManager> {
    inner: Arc<Inner<P>>,
}

impl<P: PeerManager> Clone for Dkg<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: PeerManager> Dkg<P> {
    fn from_handler(pm: &P, listener: Box<dyn StateListener>, handler: Handler<P>) -> Self {
        let capacity = pm.num_peers().max(1);
        let mut senders = BTreeMap::new();
        let mut receivers = BTreeMap::new();
        for mtype in MessageType::ALL {
            let (tx, rx) = mpsc::channel(capacity);
            senders.insert(mtype, tx);
            receivers.insert(mtype, rx);
        }
        let current_type = handler.message_type();
        let (state_tx, state_rx) = watch::channel(State::Init);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Init),
                error: Mutex::new(None),
                result: Mutex::new(None),
                current_type: Mutex::new(current_type),
                senders,
                seed: Mutex::new(Some(LoopSeed { handler, receivers })),
                cancel: CancellationToken::new(),
                listener,
                state_tx,
                state_rx,
            }),
        }
    }

    /// Creates a coordinator for the regular `n`-party mode.
    ///
    /// Generates a fresh Paillier key for the validation exchanges, which
    /// takes a noticeable moment; use [`Dkg::new_dkg_with_paillier`] to
    /// reuse one.
    ///
    /// # Errors
    /// [`Error::LargeThreshold`] if the threshold is outside
    /// `[2, number of parties]`, [`Error::InvalidRank`] if the rank is not
    /// below the threshold.
    pub fn new_dkg(
        pm: Arc<P>,
        threshold: usize,
        rank: u32,
        listener: Box<dyn StateListener>,
    ) -> Result<Self, Error> {
        let paillier = PaillierKeyPair::generate(DEFAULT_MODULUS_BITS, &mut rand::thread_rng());
        Self::new_dkg_with_paillier(pm, threshold, rank, listener, paillier)
    }

    /// [`Dkg::new_dkg`] with a caller-provided Paillier key.
    ///
    /// # Errors
    /// See [`Dkg::new_dkg`].
    pub fn new_dkg_with_paillier(
        pm: Arc<P>,
        threshold: usize,
        rank: u32,
        listener: Box<dyn StateListener>,
        paillier: PaillierKeyPair,
    ) -> Result<Self, Error> {
        let parties = pm.num_peers() + 1;
        if threshold < 2 || threshold > parties {
            return Err(Error::LargeThreshold { threshold, parties });
        }
        if rank as usize >= threshold {
            return Err(Error::InvalidRank { rank, threshold });
        }
        let mut rng = rand::thread_rng();
        let poly = Polynomial::random(threshold - 1, &mut rng);
        let state = PartyState::new(
            pm.clone(),
            threshold,
            rank,
            poly,
            Arc::new(paillier),
            &mut rng,
        );
        Ok(Self::from_handler(
            pm.as_ref(),
            listener,
            PeerHandler::new(state).into(),
        ))
    }

    /// Creates the user side of the two-party password mode.
    ///
    /// # Errors
    /// [`Error::InvalidPeerNum`] unless the peer manager reports exactly
    /// one peer (the server).
    pub fn new_password_user_dkg(
        pm: Arc<P>,
        listener: Box<dyn StateListener>,
        password: &[u8],
    ) -> Result<Self, Error> {
        let paillier = PaillierKeyPair::generate(DEFAULT_MODULUS_BITS, &mut rand::thread_rng());
        Self::new_password_user_dkg_with_paillier(pm, listener, password, paillier)
    }

    /// [`Dkg::new_password_user_dkg`] with a caller-provided Paillier key.
    ///
    /// # Errors
    /// See [`Dkg::new_password_user_dkg`].
    pub fn new_password_user_dkg_with_paillier(
        pm: Arc<P>,
        listener: Box<dyn StateListener>,
        password: &[u8],
        paillier: PaillierKeyPair,
    ) -> Result<Self, Error> {
        if pm.num_peers() != 1 {
            return Err(Error::InvalidPeerNum(pm.num_peers()));
        }
        let mut rng = rand::thread_rng();
        // Placeholder sharing; the OPRF round replaces it with the
        // password-derived polynomial before round 1 starts.
        let poly = Polynomial::random(PASSWORD_THRESHOLD - 1, &mut rng);
        let state = PartyState::new(
            pm.clone(),
            PASSWORD_THRESHOLD,
            PASSWORD_RANK,
            poly,
            Arc::new(paillier),
            &mut rng,
        );
        let handler = OprfUserHandler::new(state, password, &mut rng);
        Ok(Self::from_handler(pm.as_ref(), listener, handler.into()))
    }

    /// Creates the server side of the two-party password mode with a fresh
    /// OPRF key.
    ///
    /// # Errors
    /// [`Error::InvalidPeerNum`] unless the peer manager reports exactly
    /// one peer (the user).
    pub fn new_password_server_dkg(
        pm: Arc<P>,
        listener: Box<dyn StateListener>,
    ) -> Result<Self, Error> {
        let mut rng = rand::thread_rng();
        let evaluator = OprfEvaluator::random(&mut rng);
        let paillier = PaillierKeyPair::generate(DEFAULT_MODULUS_BITS, &mut rng);
        Self::new_password_server_dkg_with_key(pm, listener, paillier, evaluator.key())
    }

    /// Creates the password server with a fixed OPRF key, so repeated runs
    /// against the same password reproduce the same joint key.
    ///
    /// # Errors
    /// [`Error::InvalidPeerNum`] for a wrong peer count,
    /// [`Error::IdentityPoint`] for a zero key.
    pub fn new_password_server_dkg_with_key(
        pm: Arc<P>,
        listener: Box<dyn StateListener>,
        paillier: PaillierKeyPair,
        k: Scalar,
    ) -> Result<Self, Error> {
        if pm.num_peers() != 1 {
            return Err(Error::InvalidPeerNum(pm.num_peers()));
        }
        let evaluator = OprfEvaluator::from_key(k)?;
        let mut rng = rand::thread_rng();
        let poly = Polynomial::random(PASSWORD_THRESHOLD - 1, &mut rng);
        let state = PartyState::new(
            pm.clone(),
            PASSWORD_THRESHOLD,
            PASSWORD_RANK,
            poly,
            Arc::new(paillier),
            &mut rng,
        );
        let handler = OprfServerHandler::new(state, evaluator);
        Ok(Self::from_handler(pm.as_ref(), listener, handler.into()))
    }

    /// Launches the message loop and sends the first round's messages.
    ///
    /// Must be called from within a tokio runtime. Calling it twice is an
    /// [`Error::InvalidStateTransition`].
    ///
    /// # Errors
    /// [`Error::InvalidStateTransition`] if the loop already ran.
    pub fn start(&self) -> Result<(), Error> {
        let seed = self
            .inner
            .seed
            .lock()
            .take()
            .ok_or(Error::InvalidStateTransition(self.state()))?;
        let inner = self.inner.clone();
        tokio::spawn(run_loop(inner, seed));
        Ok(())
    }

    /// Cancels the message loop; the coordinator transitions to `Failed`.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// Routes one inbound message into the round channels.
    ///
    /// Thread-safe; may be called from any transport context.
    ///
    /// # Errors
    /// [`Error::OldMessage`] for a type below the current round,
    /// [`Error::FullChannel`] when the bounded channel overflows, and
    /// [`Error::InvalidStateTransition`] once the protocol is terminal.
    #[instrument(level = "trace", skip_all, fields(mtype = %message.message_type(), sender = %message.sender))]
    pub fn add_message(&self, message: Message) -> Result<(), Error> {
        if self.state() != State::Init {
            return Err(Error::InvalidStateTransition(self.state()));
        }
        let mtype = message.message_type();
        let current = *self.inner.current_type.lock();
        if mtype < current {
            tracing::warn!("rejecting stale message");
            return Err(Error::OldMessage {
                got: mtype,
                current,
            });
        }
        let sender = self
            .inner
            .senders
            .get(&mtype)
            .ok_or(Error::InvalidMessage("unroutable message type"))?;
        sender.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => Error::FullChannel(mtype),
            mpsc::error::TrySendError::Closed(_) => Error::InvalidStateTransition(self.state()),
        })
    }

    /// The current lifecycle state.
    pub fn state(&self) -> State {
        *self.inner.state.lock()
    }

    /// The error that moved the coordinator to `Failed`, if any.
    pub fn error(&self) -> Option<Arc<Error>> {
        self.inner.error.lock().clone()
    }

    /// The protocol output.
    ///
    /// # Errors
    /// [`Error::NotReady`] before the coordinator reaches `Done`.
    pub fn get_result(&self) -> Result<DkgResult, Error> {
        if self.state() != State::Done {
            return Err(Error::NotReady);
        }
        self.inner.result.lock().clone().ok_or(Error::NotReady)
    }

    /// Waits until the coordinator leaves `Init` and returns the terminal
    /// state.
    pub async fn wait(&self) -> State {
        let mut rx = self.inner.state_rx.clone();
        loop {
            let current = *rx.borrow();
            if current != State::Init {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Fails the protocol from outside the loop (used by the echo wrapper
    /// when broadcast payloads diverge).
    pub(crate) fn abort(&self, error: Error) {
        self.inner.fail(error);
    }
}

async fn run_loop<P: PeerManager>(inner: Arc<Inner<P>>, seed: LoopSeed<P>) {
    match drive(&inner, seed).await {
        Ok(result) => {
            *inner.result.lock() = Some(result);
            inner.transition(State::Done);
        }
        Err(error) => {
            tracing::warn!("dkg loop failed: {error}");
            inner.fail(error);
        }
    }
}

async fn drive<P: PeerManager>(
    inner: &Inner<P>,
    seed: LoopSeed<P>,
) -> Result<DkgResult, Error> {
    let LoopSeed {
        mut handler,
        mut receivers,
    } = seed;
    loop {
        let mtype = handler.message_type();
        *inner.current_type.lock() = mtype;
        handler.round_start()?;

        let required = handler.required_count();
        let mut processed = 0;
        while processed < required {
            let receiver = receivers
                .get_mut(&mtype)
                .expect("a channel exists for every message type");
            let message = tokio::select! {
                _ = inner.cancel.cancelled() => return Err(Error::Cancelled),
                received = receiver.recv() => received.ok_or(Error::Cancelled)?,
            };
            if handler.is_handled(message.sender) {
                return Err(Error::DuplicateMessage {
                    sender: message.sender,
                    mtype,
                });
            }
            handler.handle(message)?;
            processed += 1;
        }
        match handler.finalize()? {
            Transition::Next(next) => handler = next,
            Transition::Complete(result) => return Ok(*result),
        }
    }
}
