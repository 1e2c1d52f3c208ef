//! Debounced state reduction over validated atoms
//!
//! A [`Reducer`] is a pure fold from particles to some state. The
//! [`ReducerStore`] runs one fold per address:
//!
//! - the fold for an address is built on first request and cached; a cache
//!   hit takes only a read lock, a miss takes a construction lock and checks
//!   again before building
//! - every particle of every validated atom is folded as it arrives
//! - a snapshot is published only after the input has been quiet for the
//!   debounce window, so replaying a long backlog publishes once
//! - the last published snapshot is handed to every new subscriber
//!   immediately, without re-running the fold

use crate::metrics::Metrics;
use crate::types::{Address, Atom, AtomId, Particle};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// Source of validated atoms in causal order
pub trait AtomSource: Send + Sync {
    /// Every atom validated for the address from now on
    fn validated_atoms(&self, address: &Address) -> mpsc::UnboundedReceiver<Arc<Atom>>;
}

/// One particle of a validated atom, with the context a reducer may need
#[derive(Debug, Clone, Copy)]
pub struct ParticleEvent<'a> {
    /// Address whose feed delivered the atom
    pub address: &'a Address,
    /// Atom carrying the particle
    pub atom_id: AtomId,
    /// Atom timestamp (milliseconds)
    pub timestamp: u64,
    /// The particle
    pub particle: &'a Particle,
}

/// Pure fold from particles to state
pub trait Reducer: Send + Sync + 'static {
    /// Derived state
    type State: Clone + Send + Sync + 'static;

    /// Name used in logs
    fn name(&self) -> &'static str;

    /// State before any particle
    fn initial_state(&self) -> Self::State;

    /// Fold one particle into the state
    fn reduce(&self, state: Self::State, event: ParticleEvent<'_>) -> Self::State;
}

/// Running fold for one address
#[derive(Debug)]
pub struct ReducedState<S> {
    address: Address,
    snapshots: watch::Receiver<Option<Arc<S>>>,
    particles_folded: Arc<AtomicU64>,
    publications: Arc<AtomicU64>,
}

impl<S: Clone + Send + Sync + 'static> ReducedState<S> {
    /// Address this state belongs to
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Latest published snapshot, if one has been published
    pub fn latest(&self) -> Option<Arc<S>> {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to published snapshots
    pub fn subscribe(&self) -> StateSubscription<S> {
        StateSubscription {
            rx: self.snapshots.clone(),
            replayed: false,
        }
    }

    /// Particles folded so far
    pub fn particles_folded(&self) -> u64 {
        self.particles_folded.load(Ordering::Acquire)
    }

    /// Snapshots published so far
    pub fn publications(&self) -> u64 {
        self.publications.load(Ordering::Acquire)
    }
}

/// Stream of published snapshots
///
/// The first call to [`StateSubscription::next`] returns the cached snapshot
/// if one exists; later calls wait for the next publication.
#[derive(Debug)]
pub struct StateSubscription<S> {
    rx: watch::Receiver<Option<Arc<S>>>,
    replayed: bool,
}

impl<S> StateSubscription<S> {
    /// Next snapshot, or `None` once the fold has stopped
    pub async fn next(&mut self) -> Option<Arc<S>> {
        if !self.replayed {
            self.replayed = true;
            if let Some(current) = self.rx.borrow_and_update().clone() {
                return Some(current);
            }
        }

        loop {
            self.rx.changed().await.ok()?;
            if let Some(current) = self.rx.borrow_and_update().clone() {
                return Some(current);
            }
        }
    }
}

/// Per-address cache of running folds for one reducer
pub struct ReducerStore<R: Reducer> {
    reducer: Arc<R>,
    source: Arc<dyn AtomSource>,
    debounce: Duration,
    cache: RwLock<HashMap<Address, Arc<ReducedState<R::State>>>>,
    construction: Mutex<()>,
    metrics: Option<Metrics>,
}

impl<R: Reducer> std::fmt::Debug for ReducerStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducerStore")
            .field("reducer", &self.reducer.name())
            .field("debounce", &self.debounce)
            .field("addresses", &self.cache.read().len())
            .finish()
    }
}

impl<R: Reducer> ReducerStore<R> {
    /// Create new store
    pub fn new(reducer: R, source: Arc<dyn AtomSource>, debounce: Duration) -> Self {
        Self {
            reducer: Arc::new(reducer),
            source,
            debounce,
            cache: RwLock::new(HashMap::new()),
            construction: Mutex::new(()),
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Running fold for the address, started on first request.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn state(&self, address: &Address) -> Arc<ReducedState<R::State>> {
        if let Some(state) = self.cache.read().get(address) {
            return state.clone();
        }

        let _guard = self.construction.lock();
        if let Some(state) = self.cache.read().get(address) {
            return state.clone();
        }

        let state = Arc::new(self.start(address));
        self.cache.write().insert(*address, state.clone());
        state
    }

    /// Subscribe to the address's published snapshots
    pub fn subscribe(&self, address: &Address) -> StateSubscription<R::State> {
        self.state(address).subscribe()
    }

    /// Number of addresses with a running fold
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether no fold has been started
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn start(&self, address: &Address) -> ReducedState<R::State> {
        let atoms = self.source.validated_atoms(address);
        let (tx, rx) = watch::channel(None);
        let particles_folded = Arc::new(AtomicU64::new(0));
        let publications = Arc::new(AtomicU64::new(0));

        info!(reducer = self.reducer.name(), address = %address, "Starting state reduction");

        let fold = Fold {
            reducer: self.reducer.clone(),
            address: *address,
            atoms,
            snapshots: tx,
            debounce: self.debounce,
            particles_folded: particles_folded.clone(),
            publications: publications.clone(),
            metrics: self.metrics.clone(),
        };
        tokio::spawn(fold.run());

        ReducedState {
            address: *address,
            snapshots: rx,
            particles_folded,
            publications,
        }
    }
}

/// Background task folding one address
struct Fold<R: Reducer> {
    reducer: Arc<R>,
    address: Address,
    atoms: mpsc::UnboundedReceiver<Arc<Atom>>,
    snapshots: watch::Sender<Option<Arc<R::State>>>,
    debounce: Duration,
    particles_folded: Arc<AtomicU64>,
    publications: Arc<AtomicU64>,
    metrics: Option<Metrics>,
}

impl<R: Reducer> Fold<R> {
    async fn run(mut self) {
        let mut state = self.reducer.initial_state();
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                received = self.atoms.recv() => match received {
                    Some(atom) => {
                        state = self.fold_atom(state, &atom);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    None => {
                        if deadline.is_some() {
                            self.publish(&state);
                        }
                        debug!(reducer = self.reducer.name(), address = %self.address, "Atom source closed");
                        break;
                    }
                },

                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.publish(&state);
                    deadline = None;
                }
            }
        }
    }

    fn fold_atom(&self, mut state: R::State, atom: &Atom) -> R::State {
        let atom_id = atom.id();
        for particle in &atom.particles {
            state = self.reducer.reduce(
                state,
                ParticleEvent {
                    address: &self.address,
                    atom_id,
                    timestamp: atom.timestamp,
                    particle,
                },
            );
        }
        self.particles_folded
            .fetch_add(atom.particles.len() as u64, Ordering::AcqRel);
        state
    }

    fn publish(&self, state: &R::State) {
        self.snapshots.send_replace(Some(Arc::new(state.clone())));
        self.publications.fetch_add(1, Ordering::AcqRel);
        if let Some(metrics) = &self.metrics {
            metrics.state_publications.inc();
        }
        debug!(reducer = self.reducer.name(), address = %self.address, "Published state snapshot");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeySet, PublicKey, TokenRef, TransferParticle};

    /// Counts particles
    struct CountingReducer;

    impl Reducer for CountingReducer {
        type State = u64;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn initial_state(&self) -> u64 {
            0
        }

        fn reduce(&self, state: u64, _event: ParticleEvent<'_>) -> u64 {
            state + 1
        }
    }

    /// Hands out one channel per address and counts subscriptions
    #[derive(Default)]
    struct ChannelSource {
        senders: Mutex<HashMap<Address, mpsc::UnboundedSender<Arc<Atom>>>>,
        subscriptions: AtomicU64,
    }

    impl ChannelSource {
        fn send(&self, address: &Address, atom: Atom) {
            self.senders.lock()[address].send(Arc::new(atom)).unwrap();
        }
    }

    impl AtomSource for ChannelSource {
        fn validated_atoms(&self, address: &Address) -> mpsc::UnboundedReceiver<Arc<Atom>> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().insert(*address, tx);
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            rx
        }
    }

    fn address() -> Address {
        Address::from_public_key(PublicKey::from_bytes([1; 32]))
    }

    fn atom(nonce: u64) -> Atom {
        let token = TokenRef::new(address(), "XRD");
        let particle = TransferParticle::new(token, 1, KeySet::single(*address().public_key()), nonce);
        Atom::new(vec![crate::types::Particle::Consumable(particle)], nonce + 1, None)
    }

    fn store(source: Arc<ChannelSource>) -> ReducerStore<CountingReducer> {
        ReducerStore::new(CountingReducer, source, Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_published_once() {
        let source = Arc::new(ChannelSource::default());
        let store = store(source.clone());
        let state = store.state(&address());

        for nonce in 0..5 {
            source.send(&address(), atom(nonce));
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(state.publications(), 1);
        assert_eq!(state.latest().as_deref(), Some(&5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_published_inside_window() {
        let source = Arc::new(ChannelSource::default());
        let store = store(source.clone());
        let state = store.state(&address());

        source.send(&address(), atom(0));
        tokio::time::sleep(Duration::from_millis(600)).await;
        source.send(&address(), atom(1));
        tokio::time::sleep(Duration::from_millis(600)).await;

        // 1200ms since the first atom, but only 600ms of quiet
        assert_eq!(state.publications(), 0);
        assert!(state.latest().is_none());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(state.publications(), 1);
        assert_eq!(state.latest().as_deref(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_gets_cached_snapshot() {
        let source = Arc::new(ChannelSource::default());
        let store = store(source.clone());
        let state = store.state(&address());

        for nonce in 0..3 {
            source.send(&address(), atom(nonce));
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let folded = state.particles_folded();

        let mut late = store.subscribe(&address());
        assert_eq!(late.next().await.as_deref(), Some(&3));
        assert_eq!(state.particles_folded(), folded);
        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_waits_for_first_publication() {
        let source = Arc::new(ChannelSource::default());
        let store = store(source.clone());
        let mut subscription = store.subscribe(&address());

        source.send(&address(), atom(0));
        let snapshot = subscription.next().await;
        assert_eq!(snapshot.as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn test_state_is_built_once_per_address() {
        let source = Arc::new(ChannelSource::default());
        let store = Arc::new(store(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.state(&address()) })
            })
            .collect();

        let mut states = Vec::new();
        for handle in handles {
            states.push(handle.await.unwrap());
        }

        assert!(states.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }
}
