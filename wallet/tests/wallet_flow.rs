//! End-to-end tests against an in-memory node
//!
//! The node stores every atom it accepts, replays its history to each new
//! feed, and rejects atoms spending a particle that is already spent.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use radix_atom_feed::{
    AtomStream, AtomSubmitter, AtomTransport, StatusStream, SubmissionStatus, SubmissionUpdate,
};
use radix_ledger_core::{
    Address, Atom, KeyPair, Particle, ParticleId, TokenDefinition, TokenRef, TransferParticle,
};
use radix_wallet::{Config, Error, RadixWallet};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct NodeState {
    stored: Vec<Atom>,
    spent: HashSet<ParticleId>,
    feeds: Vec<(Address, mpsc::UnboundedSender<radix_atom_feed::Result<Atom>>)>,
}

#[derive(Default)]
struct MemoryNode {
    state: Mutex<NodeState>,
}

fn touches(atom: &Atom, address: &Address) -> bool {
    atom.particles.iter().any(|p| p.owned_by(address))
}

impl MemoryNode {
    fn store(&self, atom: Atom) -> SubmissionStatus {
        let mut state = self.state.lock();

        if atom.consumers().any(|t| state.spent.contains(&t.id())) {
            return SubmissionStatus::Collision;
        }
        if atom.verify_signatures().is_err() {
            return SubmissionStatus::ValidationError;
        }

        state.spent.extend(atom.consumers().map(TransferParticle::id));
        state
            .feeds
            .retain(|(address, tx)| !touches(&atom, address) || tx.send(Ok(atom.clone())).is_ok());
        state.stored.push(atom);
        SubmissionStatus::Stored
    }
}

#[async_trait]
impl AtomTransport for MemoryNode {
    async fn atom_stream(&self, address: Address) -> radix_atom_feed::Result<AtomStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        for atom in state.stored.iter().filter(|a| touches(a, &address)) {
            let _ = tx.send(Ok(atom.clone()));
        }
        state.feeds.push((address, tx));

        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }
}

#[async_trait]
impl AtomSubmitter for MemoryNode {
    async fn submit(&self, atom: Atom) -> radix_atom_feed::Result<StatusStream> {
        let status = self.store(atom);
        let updates = vec![
            SubmissionUpdate::new(SubmissionStatus::Submitting),
            SubmissionUpdate::new(SubmissionStatus::Submitted),
            SubmissionUpdate::new(status),
        ];
        Ok(stream::iter(updates).boxed())
    }
}

struct Fixture {
    node: Arc<MemoryNode>,
    wallet: RadixWallet,
    me: KeyPair,
    friend: KeyPair,
    token: TokenRef,
}

impl Fixture {
    fn new(funding: u64) -> Self {
        let issuer = KeyPair::from_seed(&[200u8; 32]);
        let me = KeyPair::from_seed(&[1u8; 32]);
        let token = TokenRef::new(issuer.address(), "XRD");

        let node = Arc::new(MemoryNode::default());
        let definition = TokenDefinition {
            token: token.clone(),
            name: "Radix".to_string(),
            description: "Native token".to_string(),
            granularity: 1,
            owners: me.address().key_set(),
        };
        let coin = TransferParticle::new(token.clone(), funding, me.address().key_set(), 1);
        node.store(Atom::new(
            vec![
                Particle::TokenDefinition(definition),
                Particle::Consumable(coin),
            ],
            1,
            None,
        ));

        let wallet = RadixWallet::new(Config::default(), node.clone(), node.clone()).unwrap();
        Self {
            node,
            wallet,
            me,
            friend: KeyPair::from_seed(&[2u8; 32]),
            token,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_balance_follows_transfers() {
    let f = Fixture::new(100);
    f.wallet.watch(f.me.address());
    f.wallet.watch(f.friend.address());

    let mut mine = f.wallet.balances(&f.me.address()).unwrap();
    assert_eq!(mine.next().await.unwrap().balance(&f.token), 100);

    let submission = f
        .wallet
        .transfer(&f.me, &f.token, f.friend.address().key_set(), 30)
        .unwrap();
    assert_eq!(submission.outcome().await.unwrap(), submission.atom_id());

    assert_eq!(mine.next().await.unwrap().balance(&f.token), 70);

    let mut theirs = f.wallet.balances(&f.friend.address()).unwrap();
    assert_eq!(theirs.next().await.unwrap().balance(&f.token), 30);

    let unconsumed = f.wallet.unconsumed(&f.me.address(), &f.token).unwrap();
    assert_eq!(unconsumed.len(), 1);
    assert_eq!(unconsumed[0].quantity, 70);
    assert_eq!(f.node.state.lock().stored.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_token_definitions_are_published() {
    let f = Fixture::new(100);
    f.wallet.watch(f.me.address());

    let mut definitions = f.wallet.token_definitions(&f.me.address()).unwrap();
    let snapshot = definitions.next().await.unwrap();
    assert_eq!(snapshot.get(&f.token).map(|d| d.name.as_str()), Some("Radix"));
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_submits_nothing() {
    let f = Fixture::new(100);
    f.wallet.watch(f.me.address());
    f.wallet.balances(&f.me.address()).unwrap().next().await.unwrap();

    let err = f
        .wallet
        .transfer(&f.me, &f.token, f.friend.address().key_set(), 500)
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Ledger(radix_ledger_core::Error::InsufficientFunds {
            available: 100,
            requested: 500
        })
    ));
    assert_eq!(f.node.state.lock().stored.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_double_spend_from_stale_snapshot_is_a_collision() {
    let f = Fixture::new(100);
    f.wallet.watch(f.me.address());
    f.wallet.balances(&f.me.address()).unwrap().next().await.unwrap();

    // Both built from the same snapshot, so both spend the same particle
    let to = f.friend.address().key_set();
    let first = f
        .wallet
        .build_transfer(&f.me.address(), &f.token, to.clone(), 10)
        .unwrap()
        .sign(&f.me)
        .unwrap();
    let second = f
        .wallet
        .build_transfer(&f.me.address(), &f.token, to, 20)
        .unwrap()
        .sign(&f.me)
        .unwrap();

    assert!(f.wallet.send(first).outcome().await.is_ok());

    match f.wallet.send(second).outcome().await {
        Err(radix_atom_feed::Error::Submission { status, .. }) => {
            assert_eq!(status, SubmissionStatus::Collision);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unwatched_address_is_unknown() {
    let f = Fixture::new(100);

    assert!(matches!(
        f.wallet.balances(&f.friend.address()),
        Err(Error::UnknownAddress(_))
    ));
    assert!(matches!(
        f.wallet.unconsumed(&f.friend.address(), &f.token),
        Err(Error::UnknownAddress(_))
    ));
    assert!(!f.wallet.is_watching(&f.me.address()));
}

#[tokio::test(start_paused = true)]
async fn test_watch_is_idempotent_and_counts_metrics() {
    let f = Fixture::new(100);
    f.wallet.watch(f.me.address());
    f.wallet.watch(f.me.address());
    assert!(f.wallet.is_watching(&f.me.address()));

    f.wallet.balances(&f.me.address()).unwrap().next().await.unwrap();

    let metrics = f.wallet.metrics();
    assert_eq!(metrics.atoms_received.get(), 1);
    assert_eq!(metrics.atoms_emitted.get(), 1);
    assert!(metrics.state_publications.get() >= 1);

    f.wallet.unwatch(&f.me.address());
    assert!(!f.wallet.is_watching(&f.me.address()));
}

#[tokio::test(start_paused = true)]
async fn test_wallets_keep_separate_metrics() {
    let f = Fixture::new(100);
    let other = RadixWallet::new(Config::default(), f.node.clone(), f.node.clone()).unwrap();

    f.wallet.watch(f.me.address());
    f.wallet.balances(&f.me.address()).unwrap().next().await.unwrap();

    assert_eq!(f.wallet.metrics().atoms_received.get(), 1);
    assert_eq!(other.metrics().atoms_received.get(), 0);
    assert!(other.metrics().render().unwrap().contains("atoms_received"));
}
