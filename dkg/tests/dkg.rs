//! End-to-end protocol runs over an in-memory loopback transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::Zero;
use num_bigint::BigUint;
use num_traits::Num;
use parking_lot::Mutex;

use quorum_dkg::birkhoff::birkhoff_coefficients;
use quorum_dkg::echo::{EchoBroadcast, BROADCAST_TYPES};
use quorum_dkg::oprf::compute_share;
use quorum_dkg::paillier::PaillierKeyPair;
use quorum_dkg::types::{
    Bk, Body, Message, MessageType, PartyId, PeerMsg,
};
use quorum_dkg::{Dkg, DkgResult, Error, PeerManager, State, StateListener};

type Affine = quorum_dkg::types::Affine;
type Scalar = quorum_dkg::types::Scalar;

const TIMEOUT: Duration = Duration::from_secs(60);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// Fixed 1024-bit primes so tests skip Paillier prime generation.
const P_HEX: &str = "a34e09b8ebdb84e2c9eb7e5d5cb550963971a22f0e3a33c3b8459be3eff2158e77b8440aaea0560f7197e57bafa2d7c69dc6c17ccdb49fc6f50ec95dfd4786755fcc423b77c6df03be523c6abb7145370606288f283e0853ec3d2be3b14ca8d6c1937f2e5d52105a15a99a3b40e2cb0575ffa7a737cded2f57d2982f23b22b39";
const Q_HEX: &str = "a7318e84988c92e7baa6b861fe6410f4bf9d03a82617755919470190e6b04596a7f94d8a1a264bd15d73628cc2e3d24597a6b1e00b41930de779d5a712951ed870869bf4d85fd7dd2d7a1ff03553ae39f1abd2c06264b1c9d0cb0b06fb75cfa3d0624cda63f3240b088668bda20fda4357f15b47f3cb4c5b96e84f25c1d70cff";

fn fixed_paillier() -> PaillierKeyPair {
    let p = BigUint::from_str_radix(P_HEX, 16).expect("valid prime hex");
    let q = BigUint::from_str_radix(Q_HEX, 16).expect("valid prime hex");
    PaillierKeyPair::from_primes(&p, &q)
}

// Delivers messages between in-process parties. `from` is threaded through
// so the echo wrapper can tell relays from originals.
type Route = Box<dyn Fn(PartyId, Message) + Send + Sync>;

#[derive(Default)]
struct Router {
    routes: Mutex<HashMap<PartyId, Route>>,
}

impl Router {
    fn register(&self, id: PartyId, route: Route) {
        self.routes.lock().insert(id, route);
    }

    fn route(&self, from: PartyId, to: PartyId, message: Message) {
        let routes = self.routes.lock();
        if let Some(route) = routes.get(&to) {
            route(from, message);
        }
    }
}

struct LoopbackPm {
    router: Arc<Router>,
    id: PartyId,
    peers: Vec<PartyId>,
}

impl PeerManager for LoopbackPm {
    fn self_id(&self) -> PartyId {
        self.id
    }

    fn num_peers(&self) -> usize {
        self.peers.len()
    }

    fn peer_ids(&self) -> Vec<PartyId> {
        self.peers.clone()
    }

    fn must_send(&self, to: PartyId, message: Message) {
        self.router.route(self.id, to, message);
    }
}

fn pm(router: &Arc<Router>, id: u16, all: &[u16]) -> Arc<LoopbackPm> {
    Arc::new(LoopbackPm {
        router: router.clone(),
        id: PartyId(id),
        peers: all
            .iter()
            .filter(|&&p| p != id)
            .map(|&p| PartyId(p))
            .collect(),
    })
}

struct NoopListener;

impl StateListener for NoopListener {
    fn on_state_changed(&self, _old: State, _new: State) {}
}

// Counts listener callbacks, to check the single-transition property.
struct CountingListener(Arc<Mutex<Vec<(State, State)>>>);

impl StateListener for CountingListener {
    fn on_state_changed(&self, old: State, new: State) {
        self.0.lock().push((old, new));
    }
}

// A peer manager whose sends go nowhere, for single-party error tests.
struct SilentPm {
    id: PartyId,
    peers: Vec<PartyId>,
}

impl PeerManager for SilentPm {
    fn self_id(&self) -> PartyId {
        self.id
    }

    fn num_peers(&self) -> usize {
        self.peers.len()
    }

    fn peer_ids(&self) -> Vec<PartyId> {
        self.peers.clone()
    }

    fn must_send(&self, _to: PartyId, _message: Message) {}
}

async fn wait_done(dkg: &Dkg<LoopbackPm>) {
    let state = tokio::time::timeout(TIMEOUT, dkg.wait())
        .await
        .expect("dkg finished in time");
    if state != State::Done {
        panic!("dkg ended in {state}: {:?}", dkg.error());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn three_party_dkg_completes_and_interpolates() {
    init_tracing();
    let router = Arc::new(Router::default());
    let all = [0u16, 1, 2];
    let threshold = 2;

    let mut dkgs = Vec::new();
    for &id in &all {
        let pm = pm(&router, id, &all);
        let dkg = Dkg::new_dkg_with_paillier(
            pm,
            threshold,
            0,
            Box::new(NoopListener),
            fixed_paillier(),
        )
        .expect("constructs");
        let clone = dkg.clone();
        router.register(
            PartyId(id),
            Box::new(move |_from, message| {
                clone.add_message(message).expect("routing");
            }),
        );
        dkgs.push(dkg);
    }
    for dkg in &dkgs {
        dkg.start().expect("starts");
    }
    for dkg in &dkgs {
        wait_done(dkg).await;
    }

    let results: Vec<DkgResult> = dkgs.iter().map(|d| d.get_result().expect("done")).collect();

    // All parties agree on the public key and the parameter set.
    for result in &results[1..] {
        assert_eq!(result.public_key, results[0].public_key);
        assert_eq!(result.bks, results[0].bks);
    }
    assert!(results.iter().all(|r| r.k.is_none()));

    // Any `threshold` shares interpolate to the secret behind the key.
    for pair in [[0usize, 1], [0, 2], [1, 2]] {
        let subset: BTreeMap<PartyId, Bk> = pair
            .iter()
            .map(|&i| {
                let id = PartyId(i as u16);
                (id, results[i].bks[&id].clone())
            })
            .collect();
        let coefficients = birkhoff_coefficients(&subset, threshold).expect("valid");
        let secret = pair.iter().fold(Scalar::zero(), |acc, &i| {
            acc + coefficients[&PartyId(i as u16)] * results[i].share
        });
        assert_eq!(
            (Affine::generator() * secret).into_affine(),
            results[0].public_key,
            "subset {pair:?} failed to interpolate"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn ranked_dkg_reconstructs_with_valid_subsets_only() {
    let router = Arc::new(Router::default());
    let all = [0u16, 1, 2];
    let threshold = 2;
    let ranks = [0u32, 1, 1];

    let mut dkgs = Vec::new();
    for (&id, &rank) in all.iter().zip(ranks.iter()) {
        let pm = pm(&router, id, &all);
        let dkg = Dkg::new_dkg_with_paillier(
            pm,
            threshold,
            rank,
            Box::new(NoopListener),
            fixed_paillier(),
        )
        .expect("constructs");
        let clone = dkg.clone();
        router.register(
            PartyId(id),
            Box::new(move |_from, message| {
                clone.add_message(message).expect("routing");
            }),
        );
        dkgs.push(dkg);
    }
    for dkg in &dkgs {
        dkg.start().expect("starts");
    }
    for dkg in &dkgs {
        wait_done(dkg).await;
    }
    let results: Vec<DkgResult> = dkgs.iter().map(|d| d.get_result().expect("done")).collect();

    // Rank-0 party plus either rank-1 party reconstructs.
    for pair in [[0usize, 1], [0, 2]] {
        let subset: BTreeMap<PartyId, Bk> = pair
            .iter()
            .map(|&i| {
                let id = PartyId(i as u16);
                (id, results[i].bks[&id].clone())
            })
            .collect();
        let coefficients = birkhoff_coefficients(&subset, threshold).expect("valid");
        let secret = pair.iter().fold(Scalar::zero(), |acc, &i| {
            acc + coefficients[&PartyId(i as u16)] * results[i].share
        });
        assert_eq!(
            (Affine::generator() * secret).into_affine(),
            results[0].public_key
        );
    }

    // Two rank-1 parties only see derivatives; they cannot reconstruct.
    let bad_subset: BTreeMap<PartyId, Bk> = [1usize, 2]
        .iter()
        .map(|&i| {
            let id = PartyId(i as u16);
            (id, results[i].bks[&id].clone())
        })
        .collect();
    assert!(matches!(
        birkhoff_coefficients(&bad_subset, threshold),
        Err(Error::InvalidBks(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn echoed_dkg_completes() {
    let router = Arc::new(Router::default());
    let all = [0u16, 1, 2];
    let threshold = 2;

    let mut dkgs = Vec::new();
    for &id in &all {
        let pm = pm(&router, id, &all);
        let dkg = Dkg::new_dkg_with_paillier(
            pm.clone(),
            threshold,
            0,
            Box::new(NoopListener),
            fixed_paillier(),
        )
        .expect("constructs");
        let echo = Arc::new(EchoBroadcast::new(dkg.clone(), pm, BROADCAST_TYPES));
        router.register(
            PartyId(id),
            Box::new(move |from, message| {
                echo.add_message(from, message).expect("routing");
            }),
        );
        dkgs.push(dkg);
    }
    for dkg in &dkgs {
        dkg.start().expect("starts");
    }
    for dkg in &dkgs {
        wait_done(dkg).await;
    }
    let results: Vec<DkgResult> = dkgs.iter().map(|d| d.get_result().expect("done")).collect();
    for result in &results[1..] {
        assert_eq!(result.public_key, results[0].public_key);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn equivocating_broadcaster_is_rejected_by_all_honest_parties() {
    let router = Arc::new(Router::default());
    let all = [0u16, 1, 2];
    let corrupt = PartyId(2);

    let mut dkgs = Vec::new();
    for &id in &all[..2] {
        let pm = pm(&router, id, &all);
        let dkg = Dkg::new_dkg_with_paillier(
            pm.clone(),
            2,
            0,
            Box::new(NoopListener),
            fixed_paillier(),
        )
        .expect("constructs");
        let echo = Arc::new(EchoBroadcast::new(dkg.clone(), pm, BROADCAST_TYPES));
        router.register(
            PartyId(id),
            Box::new(move |from, message| {
                // DifferentHash surfaces here once the equivocation is seen.
                let _ = echo.add_message(from, message);
            }),
        );
        dkgs.push(dkg);
    }
    // The corrupt party swallows everything sent to it.
    router.register(corrupt, Box::new(|_, _| {}));

    for dkg in &dkgs {
        dkg.start().expect("starts");
    }

    // The corrupt broadcaster sends two different round 1 payloads.
    let equivocation = |x: u64| {
        Message::new(
            corrupt,
            Body::Peer(PeerMsg {
                bk: Bk::new(Scalar::from(x), 0),
                commitment: [x as u8; 32],
            }),
        )
    };
    router.route(corrupt, PartyId(0), equivocation(1001));
    router.route(corrupt, PartyId(1), equivocation(1002));

    for dkg in &dkgs {
        let state = tokio::time::timeout(TIMEOUT, dkg.wait())
            .await
            .expect("settles in time");
        assert_eq!(state, State::Failed);
        let error = dkg.error().expect("has error");
        assert!(
            matches!(*error, Error::DifferentHash { origin, .. } if origin == corrupt),
            "unexpected error: {error}"
        );
        assert!(matches!(dkg.get_result(), Err(Error::NotReady)));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn password_dkg_is_deterministic_for_fixed_server_key() {
    init_tracing();
    let password = b"edwin-haha";
    let mut rng = rand::thread_rng();
    let server_key = {
        use ark_ff::UniformRand;
        Scalar::rand(&mut rng)
    };

    let mut public_keys = Vec::new();
    let mut secrets = Vec::new();
    for _run in 0..2 {
        let router = Arc::new(Router::default());
        let all = [0u16, 1];
        let user_pm = pm(&router, 0, &all);
        let server_pm = pm(&router, 1, &all);

        let user = Dkg::new_password_user_dkg_with_paillier(
            user_pm,
            Box::new(NoopListener),
            password,
            fixed_paillier(),
        )
        .expect("constructs");
        let server = Dkg::new_password_server_dkg_with_key(
            server_pm,
            Box::new(NoopListener),
            fixed_paillier(),
            server_key,
        )
        .expect("constructs");

        for (id, dkg) in [(0u16, &user), (1u16, &server)] {
            let clone = dkg.clone();
            router.register(
                PartyId(id),
                Box::new(move |_from, message| {
                    clone.add_message(message).expect("routing");
                }),
            );
        }
        user.start().expect("starts");
        server.start().expect("starts");
        wait_done(&user).await;
        wait_done(&server).await;

        let user_result = user.get_result().expect("done");
        let server_result = server.get_result().expect("done");
        assert_eq!(user_result.public_key, server_result.public_key);
        assert!(user_result.k.is_none());
        assert_eq!(server_result.k, Some(server_key));

        // Both shares together reconstruct the password-derived secret.
        let bks = user_result.bks.clone();
        let coefficients = birkhoff_coefficients(&bks, 2).expect("valid");
        let secret = coefficients[&PartyId(0)] * user_result.share
            + coefficients[&PartyId(1)] * server_result.share;
        assert_eq!(
            (Affine::generator() * secret).into_affine(),
            user_result.public_key
        );
        public_keys.push(user_result.public_key);
        secrets.push(secret);
    }

    // Fixed (password, k) reproduces the same joint key and secret.
    assert_eq!(public_keys[0], public_keys[1]);
    assert_eq!(secrets[0], secrets[1]);
    let expected = compute_share(&server_key, password).expect("derives");
    assert_eq!(secrets[0], expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_round_message_fails_the_protocol() {
    let pm = Arc::new(SilentPm {
        id: PartyId(0),
        peers: vec![PartyId(1), PartyId(2)],
    });
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let dkg = Dkg::new_dkg_with_paillier(
        pm,
        2,
        0,
        Box::new(CountingListener(transitions.clone())),
        fixed_paillier(),
    )
    .expect("constructs");

    let peer_msg = Message::new(
        PartyId(1),
        Body::Peer(PeerMsg {
            bk: Bk::new(Scalar::from(7u64), 0),
            commitment: [1u8; 32],
        }),
    );
    dkg.add_message(peer_msg.clone()).expect("queued");
    dkg.add_message(peer_msg).expect("queued");
    dkg.start().expect("starts");

    let state = tokio::time::timeout(TIMEOUT, dkg.wait())
        .await
        .expect("settles");
    assert_eq!(state, State::Failed);
    assert!(matches!(
        *dkg.error().expect("has error"),
        Error::DuplicateMessage { sender, .. } if sender == PartyId(1)
    ));
    // Exactly one transition, Init → Failed.
    assert_eq!(transitions.lock().as_slice(), &[(State::Init, State::Failed)]);
}

#[test]
fn old_messages_and_overflow_are_rejected_at_the_door() {
    let pm = Arc::new(SilentPm {
        id: PartyId(0),
        peers: vec![PartyId(1)],
    });
    let dkg =
        Dkg::new_dkg_with_paillier(pm, 2, 0, Box::new(NoopListener), fixed_paillier())
            .expect("constructs");

    // The first round is Peer; OPRF types are below it.
    let old = Message::new(
        PartyId(1),
        Body::OprfResponse(quorum_dkg::types::OprfResponseMsg {
            beta: Affine::generator(),
        }),
    );
    assert!(matches!(
        dkg.add_message(old),
        Err(Error::OldMessage { .. })
    ));

    // Channel capacity is the peer count (1 here): the second future-round
    // message overflows.
    let verify = |share: u64| {
        Message::new(
            PartyId(1),
            Body::Verify(quorum_dkg::types::VerifyMsg {
                share: Scalar::from(share),
            }),
        )
    };
    dkg.add_message(verify(1)).expect("queued");
    assert!(matches!(
        dkg.add_message(verify(2)),
        Err(Error::FullChannel(MessageType::Verify))
    ));

    assert!(matches!(dkg.get_result(), Err(Error::NotReady)));
}

#[test]
fn constructor_rejects_bad_parameters() {
    let pm = || {
        Arc::new(SilentPm {
            id: PartyId(0),
            peers: vec![PartyId(1), PartyId(2)],
        })
    };
    assert!(matches!(
        Dkg::new_dkg_with_paillier(pm(), 4, 0, Box::new(NoopListener), fixed_paillier()),
        Err(Error::LargeThreshold { threshold: 4, parties: 3 })
    ));
    assert!(matches!(
        Dkg::new_dkg_with_paillier(pm(), 1, 0, Box::new(NoopListener), fixed_paillier()),
        Err(Error::LargeThreshold { .. })
    ));
    assert!(matches!(
        Dkg::new_dkg_with_paillier(pm(), 2, 2, Box::new(NoopListener), fixed_paillier()),
        Err(Error::InvalidRank { .. })
    ));
    assert!(matches!(
        Dkg::new_password_user_dkg_with_paillier(
            pm(),
            Box::new(NoopListener),
            b"pw",
            fixed_paillier()
        ),
        Err(Error::InvalidPeerNum(2))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_cancels_into_failed() {
    let pm = Arc::new(SilentPm {
        id: PartyId(0),
        peers: vec![PartyId(1)],
    });
    let dkg =
        Dkg::new_dkg_with_paillier(pm, 2, 0, Box::new(NoopListener), fixed_paillier())
            .expect("constructs");
    dkg.start().expect("starts");
    dkg.stop();
    let state = tokio::time::timeout(TIMEOUT, dkg.wait())
        .await
        .expect("settles");
    assert_eq!(state, State::Failed);
    assert!(matches!(
        *dkg.error().expect("has error"),
        Error::Cancelled
    ));
    // A second start is rejected.
    assert!(matches!(
        dkg.start(),
        Err(Error::InvalidStateTransition(State::Failed))
    ));
}
