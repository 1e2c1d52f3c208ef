//! Application context wiring the feed, reconcilers and reducers together
//!
//! ```text
//!   AtomTransport ─► AtomDeliveryFilter ─► pump ─► ReconcilerRegistry
//!                                                      │ causal order
//!                                      ┌───────────────┴───────────────┐
//!                                      ▼                               ▼
//!                           ReducerStore<Balance>        ReducerStore<TokenDefinition>
//! ```
//!
//! Every instance owns its own registry, stores and metrics; nothing is
//! shared between two wallets in the same process.

use crate::{Error, Result};
use parking_lot::Mutex;
use radix_atom_feed::{
    AtomDeliveryFilter, AtomSubmitter, AtomSubscription, AtomTransport, RetryPolicy,
    SignatureValidator, Submission,
};
use radix_ledger_core::{
    Address, AddressState, Atom, AtomSource, BalanceReducer, Config, KeyPair, KeySet, Metrics,
    Quantity, ReconcilerRegistry, ReducerStore, StateSubscription, TokenDefinitionReducer,
    TokenDefinitions, TokenFilter, TokenRef, TransferBuilder, TransferParticle, UnsignedAtom,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Ledger client for a set of watched addresses
pub struct RadixWallet {
    config: Config,
    metrics: Metrics,
    filter: AtomDeliveryFilter,
    registry: Arc<ReconcilerRegistry>,
    balances: ReducerStore<BalanceReducer>,
    token_definitions: ReducerStore<TokenDefinitionReducer>,
    submitter: Arc<dyn AtomSubmitter>,
    pumps: Mutex<HashMap<Address, JoinHandle<()>>>,
}

impl std::fmt::Debug for RadixWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadixWallet")
            .field("service", &self.config.service_name)
            .field("watched", &self.pumps.lock().len())
            .finish_non_exhaustive()
    }
}

impl RadixWallet {
    /// Create a wallet talking to the network through the given collaborators
    pub fn new(
        config: Config,
        transport: Arc<dyn AtomTransport>,
        submitter: Arc<dyn AtomSubmitter>,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        let registry = Arc::new(ReconcilerRegistry::new().with_metrics(metrics.clone()));
        let source: Arc<dyn AtomSource> = registry.clone();
        let debounce = config.reducer.debounce();

        let filter = AtomDeliveryFilter::new(
            transport,
            Arc::new(SignatureValidator),
            RetryPolicy::from_config(&config.delivery),
        )
        .with_metrics(metrics.clone());

        info!(
            service = %config.service_name,
            version = %config.service_version,
            debounce_ms = config.reducer.debounce_ms,
            "Wallet created"
        );

        Ok(Self {
            balances: ReducerStore::new(BalanceReducer, source.clone(), debounce)
                .with_metrics(metrics.clone()),
            token_definitions: ReducerStore::new(TokenDefinitionReducer, source, debounce)
                .with_metrics(metrics.clone()),
            config,
            metrics,
            filter,
            registry,
            submitter,
            pumps: Mutex::new(HashMap::new()),
        })
    }

    /// Start following the address. Watching an address twice is a no-op.
    ///
    /// A feed that gave up or a reconciler that halted stops the watch; call
    /// again to restart it. Must be called inside a Tokio runtime.
    pub fn watch(&self, address: Address) {
        let mut pumps = self.pumps.lock();
        if pumps.get(&address).is_some_and(|pump| !pump.is_finished()) {
            return;
        }

        // Reducers subscribe before the first atom can be emitted
        self.registry.get_or_create(address, TokenFilter::Any);
        self.balances.state(&address);
        self.token_definitions.state(&address);

        let subscription = self.filter.subscribe(address);
        let handle = tokio::spawn(pump(subscription, self.registry.clone()));
        pumps.insert(address, handle);

        info!(address = %address, "Watching address");
    }

    /// Stop following the address; its derived state is kept
    pub fn unwatch(&self, address: &Address) {
        if let Some(pump) = self.pumps.lock().remove(address) {
            pump.abort();
            info!(address = %address, "Stopped watching address");
        }
    }

    /// Whether the address has a live feed
    pub fn is_watching(&self, address: &Address) -> bool {
        self.pumps
            .lock()
            .get(address)
            .is_some_and(|pump| !pump.is_finished())
    }

    /// Debounced balance snapshots of a watched address
    pub fn balances(&self, address: &Address) -> Result<StateSubscription<AddressState>> {
        self.ensure_known(address)?;
        Ok(self.balances.subscribe(address))
    }

    /// Debounced token metadata seen by a watched address
    pub fn token_definitions(&self, address: &Address) -> Result<StateSubscription<TokenDefinitions>> {
        self.ensure_known(address)?;
        Ok(self.token_definitions.subscribe(address))
    }

    /// Spendable particles of one token, straight from the reconciler
    pub fn unconsumed(&self, address: &Address, token: &TokenRef) -> Result<Vec<TransferParticle>> {
        let reconciler = self
            .registry
            .get(address, &TokenFilter::Any)
            .ok_or(Error::UnknownAddress(*address))?;
        Ok(reconciler.snapshot_for(token))
    }

    /// Build an unsigned transfer from the address's current unconsumed set
    pub fn build_transfer(
        &self,
        from: &Address,
        token: &TokenRef,
        to: KeySet,
        amount: Quantity,
    ) -> Result<UnsignedAtom> {
        let unconsumed = self.unconsumed(from, token)?;
        Ok(TransferBuilder::new(token.clone(), to, amount).build(&unconsumed)?)
    }

    /// Submit a signed atom. Rejections are reported, never retried.
    pub fn send(&self, atom: Atom) -> Submission {
        Submission::start(atom, self.submitter.clone())
    }

    /// Build, sign and submit a transfer from the signer's address
    pub fn transfer(
        &self,
        signer: &KeyPair,
        token: &TokenRef,
        to: KeySet,
        amount: Quantity,
    ) -> Result<Submission> {
        let unsigned = self.build_transfer(&signer.address(), token, to, amount)?;
        let atom = unsigned.sign(signer)?;
        Ok(self.send(atom))
    }

    /// Metrics of this wallet
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration this wallet was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_known(&self, address: &Address) -> Result<()> {
        if self.registry.get(address, &TokenFilter::Any).is_some() {
            Ok(())
        } else {
            Err(Error::UnknownAddress(*address))
        }
    }
}

impl Drop for RadixWallet {
    fn drop(&mut self) {
        for (_, pump) in self.pumps.lock().drain() {
            pump.abort();
        }
    }
}

/// Forward filtered atoms into the reconcilers of one address
async fn pump(mut subscription: AtomSubscription, registry: Arc<ReconcilerRegistry>) {
    let address = *subscription.address();

    while let Some(item) = subscription.next().await {
        let atom = match item {
            Ok(atom) => atom,
            Err(err) => {
                error!(address = %address, error = %err, "Atom feed failed");
                return;
            }
        };

        if let Err(err) = registry.accept(&address, atom) {
            if err.is_fatal() {
                error!(address = %address, error = %err, "Reconciler halted, stopping feed");
                return;
            }
            warn!(address = %address, error = %err, "Atom not applied");
        }
    }
}
