//! Causal reconciliation of the unordered atom feed
//!
//! The network delivers atoms at least once and in no particular order. A
//! [`ParticleReconciler`] turns that into a dependency-ordered stream for one
//! (address, token filter) pair:
//!
//! ```text
//!   accept(atom)
//!        │
//!        ▼
//!   any relevant DOWN particle missing from `unconsumed`?
//!        │ yes                              │ no
//!        ▼                                  ▼
//!   pending[missing] = atom            emit atom
//!   (no emission, no mutation)         remove consumed ids
//!                                      insert created ids
//!                                      re-run atoms pending on created ids
//! ```
//!
//! # Invariants
//!
//! - A particle is in `unconsumed` iff it was created and not yet spent
//! - An atom is in `pending` iff one of its relevant DOWN particles is missing
//! - An atom is emitted at most once, after every atom it depends on
//!
//! All state of one reconciler sits behind one mutex, and re-analysis of
//! unblocked atoms runs inside the same critical section, so subscribers see
//! atoms in dependency order. Distinct reconcilers never share a lock.

use crate::metrics::Metrics;
use crate::reducer::AtomSource;
use crate::types::{Address, Atom, AtomId, ParticleId, TokenRef, TransferParticle};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Which tokens a reconciler tracks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenFilter {
    /// Every token
    Any,
    /// A single token
    Only(TokenRef),
}

impl TokenFilter {
    /// Whether the token passes the filter
    pub fn matches(&self, token: &TokenRef) -> bool {
        match self {
            TokenFilter::Any => true,
            TokenFilter::Only(only) => only == token,
        }
    }
}

/// Mutable state of one reconciler
#[derive(Debug, Default)]
struct ReconcilerState {
    /// Created and not yet spent
    unconsumed: BTreeMap<ParticleId, TransferParticle>,

    /// Missing particle id -> atom blocked on it
    pending: HashMap<ParticleId, Arc<Atom>>,

    /// Atoms already emitted
    applied: HashSet<AtomId>,

    /// Set once a consistency violation is observed
    poisoned: Option<String>,

    /// Receivers of emitted atoms
    subscribers: Vec<mpsc::UnboundedSender<Arc<Atom>>>,
}

impl ReconcilerState {
    /// Accept an atom and everything it unblocks.
    ///
    /// Unblocked atoms are processed depth-first, exactly as if `accept` were
    /// re-entered for each of them in creation order.
    fn accept(
        &mut self,
        address: &Address,
        filter: &TokenFilter,
        atom: Arc<Atom>,
        emitted: &mut Vec<Arc<Atom>>,
    ) -> Result<()> {
        let relevant =
            |t: &TransferParticle| t.owned_by(address) && filter.matches(&t.token);

        let mut work = vec![atom];
        while let Some(atom) = work.pop() {
            let atom_id = atom.id();

            if self.applied.contains(&atom_id) {
                debug!(atom = %atom_id, "Atom already applied, ignoring");
                continue;
            }

            let consumed: Vec<ParticleId> = atom
                .consumers()
                .filter(|t| relevant(*t))
                .map(TransferParticle::id)
                .collect();

            if let Some(missing) = consumed
                .iter()
                .find(|id| !self.unconsumed.contains_key(*id))
            {
                match self.pending.get(missing) {
                    Some(blocked) if blocked.id() != atom_id => {
                        return Err(Error::ConsistencyViolation(format!(
                            "atoms {} and {} both wait on particle {}",
                            blocked.id(),
                            atom_id,
                            missing
                        )));
                    }
                    Some(_) => {
                        debug!(atom = %atom_id, "Atom already pending");
                    }
                    None => {
                        debug!(atom = %atom_id, missing = %missing, "Atom pending on missing particle");
                        self.pending.insert(*missing, atom);
                    }
                }
                continue;
            }

            let created: Vec<(ParticleId, &TransferParticle)> = atom
                .consumables()
                .filter(|t| relevant(*t))
                .map(|t| (t.id(), t))
                .collect();

            let mut seen = HashSet::new();
            for (id, _) in &created {
                if self.unconsumed.contains_key(id) || !seen.insert(*id) {
                    return Err(Error::ConsistencyViolation(format!(
                        "atom {} creates particle {} which already exists",
                        atom_id, id
                    )));
                }
            }

            for id in &consumed {
                self.unconsumed.remove(id);
            }

            let mut unblocked = Vec::new();
            for (id, transfer) in created {
                self.unconsumed.insert(id, transfer.clone());
                if let Some(waiting) = self.pending.remove(&id) {
                    debug!(atom = %waiting.id(), resolved = %id, "Dependency resolved, reanalysing");
                    unblocked.push(waiting);
                }
            }

            self.applied.insert(atom_id);
            emitted.push(atom.clone());

            // Reverse so the first unblocked atom is processed next
            work.extend(unblocked.into_iter().rev());
        }

        Ok(())
    }

    /// Deliver emitted atoms, dropping subscribers that went away
    fn publish(&mut self, emitted: &[Arc<Atom>]) {
        if emitted.is_empty() {
            return;
        }
        self.subscribers
            .retain(|tx| emitted.iter().all(|atom| tx.send(atom.clone()).is_ok()));
    }
}

/// Reconciler for one (address, token filter) pair
#[derive(Debug)]
pub struct ParticleReconciler {
    address: Address,
    filter: TokenFilter,
    state: Mutex<ReconcilerState>,
    metrics: Option<Metrics>,
}

impl ParticleReconciler {
    /// Create new reconciler
    pub fn new(address: Address, filter: TokenFilter) -> Self {
        Self {
            address,
            filter,
            state: Mutex::new(ReconcilerState::default()),
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Address this reconciler tracks
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Token filter this reconciler applies
    pub fn filter(&self) -> &TokenFilter {
        &self.filter
    }

    /// Accept an atom from the feed.
    ///
    /// Returns the atoms emitted by this call in dependency order: empty when
    /// the atom is blocked or was already applied, more than one when it
    /// unblocked pending atoms. A [`Error::ConsistencyViolation`] halts the
    /// reconciler; every later call fails with the same error.
    pub fn accept(&self, atom: Arc<Atom>) -> Result<Vec<Arc<Atom>>> {
        let mut state = self.state.lock();

        if let Some(reason) = &state.poisoned {
            return Err(Error::ConsistencyViolation(format!(
                "reconciler for {} halted: {}",
                self.address, reason
            )));
        }

        let pending_before = state.pending.len();
        let mut emitted = Vec::new();
        let result = state.accept(&self.address, &self.filter, atom, &mut emitted);

        // Atoms applied before a violation still reached the index
        state.publish(&emitted);

        if let Some(metrics) = &self.metrics {
            metrics.atoms_emitted.inc_by(emitted.len() as u64);
            metrics
                .atoms_pending
                .add(state.pending.len() as i64 - pending_before as i64);
        }

        if let Err(err) = result {
            error!(address = %self.address, error = %err, "Reconciler halted");
            state.poisoned = Some(err.to_string());
            return Err(err);
        }

        Ok(emitted)
    }

    /// Receive every atom emitted from now on, in emission order
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Arc<Atom>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(tx);
        rx
    }

    /// Point-in-time copy of the unconsumed index.
    ///
    /// The copy may be stale as soon as it is returned.
    pub fn snapshot(&self) -> Vec<TransferParticle> {
        self.state.lock().unconsumed.values().cloned().collect()
    }

    /// Point-in-time copy of the unconsumed particles of one token
    pub fn snapshot_for(&self, token: &TokenRef) -> Vec<TransferParticle> {
        self.state
            .lock()
            .unconsumed
            .values()
            .filter(|t| &t.token == token)
            .cloned()
            .collect()
    }

    /// Ids of the unconsumed particles
    pub fn unconsumed_ids(&self) -> Vec<ParticleId> {
        self.state.lock().unconsumed.keys().copied().collect()
    }

    /// Number of atoms waiting on a dependency
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether a consistency violation halted this reconciler
    pub fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned.is_some()
    }
}

/// Owns every reconciler of the client, keyed by (address, token filter)
#[derive(Debug, Default)]
pub struct ReconcilerRegistry {
    reconcilers: DashMap<(Address, TokenFilter), Arc<ParticleReconciler>>,
    metrics: Option<Metrics>,
}

impl ReconcilerRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach metrics shared by every reconciler created from now on
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Reconciler for the pair, created on first use
    pub fn get_or_create(&self, address: Address, filter: TokenFilter) -> Arc<ParticleReconciler> {
        self.reconcilers
            .entry((address, filter.clone()))
            .or_insert_with(|| {
                debug!(address = %address, filter = ?filter, "Creating reconciler");
                let reconciler = ParticleReconciler::new(address, filter);
                Arc::new(match &self.metrics {
                    Some(metrics) => reconciler.with_metrics(metrics.clone()),
                    None => reconciler,
                })
            })
            .clone()
    }

    /// Reconciler for the pair, if it exists
    pub fn get(&self, address: &Address, filter: &TokenFilter) -> Option<Arc<ParticleReconciler>> {
        self.reconcilers
            .get(&(*address, filter.clone()))
            .map(|entry| entry.value().clone())
    }

    /// Feed an atom to every reconciler of the address.
    ///
    /// A halted reconciler does not stop delivery to the others; the first
    /// error is returned after all of them have seen the atom.
    pub fn accept(&self, address: &Address, atom: Arc<Atom>) -> Result<()> {
        // Collect first so no map shard stays locked during `accept`
        let targets: Vec<Arc<ParticleReconciler>> = self
            .reconcilers
            .iter()
            .filter(|entry| &entry.key().0 == address)
            .map(|entry| entry.value().clone())
            .collect();

        if targets.is_empty() {
            warn!(address = %address, "No reconciler registered for address");
        }

        let mut first_error = None;
        for reconciler in targets {
            if let Err(err) = reconciler.accept(atom.clone()) {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl AtomSource for ReconcilerRegistry {
    fn validated_atoms(&self, address: &Address) -> mpsc::UnboundedReceiver<Arc<Atom>> {
        self.get_or_create(*address, TokenFilter::Any).subscribe()
    }
}
