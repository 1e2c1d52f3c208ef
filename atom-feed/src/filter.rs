//! Deduplicating, validating delivery of the raw atom feed
//!
//! One upstream stream is opened per address no matter how many
//! [`AtomSubscription`]s exist for it. The stream is closed when the last
//! subscription is dropped.
//!
//! ```text
//!   transport ──► seen? ──► validate ──► fan out to subscribers
//!       ▲          │dup        │reject
//!       │          ▼           ▼
//!   reconnect    drop        drop + log
//!   after n² s
//! ```
//!
//! Atom ids already delivered are remembered across reconnects, so an atom
//! redelivered after resubscription is dropped as well. A subscription that
//! joins a running feed sees atoms from that point on.

use crate::retry::RetryPolicy;
use crate::transport::AtomTransport;
use crate::validation::AtomValidator;
use crate::{Error, Result};
use futures::StreamExt;
use parking_lot::Mutex;
use radix_ledger_core::{Address, Atom, AtomId, Metrics};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What a feed hands to its subscribers
#[derive(Debug, Clone)]
enum FeedEvent {
    Atom(Arc<Atom>),
    Exhausted { attempts: u32, last: String },
}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<FeedEvent>>>>;

/// Shared upstream stream for one address
#[derive(Debug)]
struct Feed {
    address: Address,
    subscribers: Subscribers,
    task: JoinHandle<()>,
}

impl Feed {
    fn attach(&self) -> mpsc::UnboundedReceiver<FeedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        debug!(address = %self.address, "Last subscriber gone, closing feed");
        self.task.abort();
    }
}

/// Filtered atoms for one address
#[derive(Debug)]
pub struct AtomSubscription {
    address: Address,
    _feed: Arc<Feed>,
    events: mpsc::UnboundedReceiver<FeedEvent>,
    finished: bool,
}

impl AtomSubscription {
    /// Address this subscription follows
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Next unseen, valid atom.
    ///
    /// Yields [`Error::RetriesExhausted`] once if the feed gave up, then
    /// `None`; subscribe again to start a new feed.
    pub async fn next(&mut self) -> Option<Result<Arc<Atom>>> {
        if self.finished {
            return None;
        }
        match self.events.recv().await {
            Some(FeedEvent::Atom(atom)) => Some(Ok(atom)),
            Some(FeedEvent::Exhausted { attempts, last }) => {
                self.finished = true;
                Some(Err(Error::RetriesExhausted { attempts, last }))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Shares, deduplicates and validates atom feeds per address
pub struct AtomDeliveryFilter {
    transport: Arc<dyn AtomTransport>,
    validator: Arc<dyn AtomValidator>,
    policy: RetryPolicy,
    feeds: Mutex<HashMap<Address, Weak<Feed>>>,
    metrics: Option<Metrics>,
}

impl std::fmt::Debug for AtomDeliveryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomDeliveryFilter")
            .field("policy", &self.policy)
            .field("feeds", &self.feeds.lock().len())
            .finish_non_exhaustive()
    }
}

impl AtomDeliveryFilter {
    /// Create new filter
    pub fn new(
        transport: Arc<dyn AtomTransport>,
        validator: Arc<dyn AtomValidator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            validator,
            policy,
            feeds: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe to the address, joining its feed if one is running.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn subscribe(&self, address: Address) -> AtomSubscription {
        let mut feeds = self.feeds.lock();

        let running = feeds
            .get(&address)
            .and_then(Weak::upgrade)
            .filter(|feed| !feed.task.is_finished());

        let (feed, events) = match running {
            Some(feed) => {
                debug!(address = %address, "Joining running feed");
                let events = feed.attach();
                (feed, events)
            }
            None => {
                let (feed, events) = self.open(address);
                let feed = Arc::new(feed);
                feeds.insert(address, Arc::downgrade(&feed));
                (feed, events)
            }
        };

        // Forget feeds whose subscribers are all gone
        feeds.retain(|_, feed| feed.strong_count() > 0);

        AtomSubscription {
            address,
            events,
            _feed: feed,
            finished: false,
        }
    }

    /// Number of subscriptions sharing the address's feed
    pub fn subscriber_count(&self, address: &Address) -> usize {
        self.feeds
            .lock()
            .get(address)
            .map_or(0, Weak::strong_count)
    }

    /// Start a feed with its first subscriber already attached, so nothing
    /// the pump delivers can be marked seen without reaching someone
    fn open(&self, address: Address) -> (Feed, mpsc::UnboundedReceiver<FeedEvent>) {
        info!(address = %address, "Opening atom feed");
        let (first, events) = mpsc::unbounded_channel();
        let subscribers: Subscribers = Arc::new(Mutex::new(vec![first]));

        let pump = FeedPump {
            address,
            transport: self.transport.clone(),
            validator: self.validator.clone(),
            policy: self.policy,
            subscribers: subscribers.clone(),
            seen: HashSet::new(),
            metrics: self.metrics.clone(),
        };

        let feed = Feed {
            address,
            subscribers,
            task: tokio::spawn(pump.run()),
        };
        (feed, events)
    }
}

/// Background task owning one upstream connection
struct FeedPump {
    address: Address,
    transport: Arc<dyn AtomTransport>,
    validator: Arc<dyn AtomValidator>,
    policy: RetryPolicy,
    subscribers: Subscribers,
    seen: HashSet<AtomId>,
    metrics: Option<Metrics>,
}

impl FeedPump {
    async fn run(mut self) {
        let mut failures = 0u32;

        loop {
            let last = match self.transport.atom_stream(self.address).await {
                Ok(mut stream) => {
                    let mut last = "stream ended".to_string();
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(atom) => {
                                failures = 0;
                                self.deliver(atom);
                            }
                            Err(err) => {
                                last = err.to_string();
                                break;
                            }
                        }
                    }
                    last
                }
                Err(err) => err.to_string(),
            };

            failures += 1;
            if !self.policy.should_retry(failures) {
                error!(
                    address = %self.address,
                    attempts = failures,
                    error = %last,
                    "Giving up on atom feed"
                );
                self.broadcast(FeedEvent::Exhausted {
                    attempts: failures,
                    last,
                });
                return;
            }

            let delay = self.policy.delay(failures);
            warn!(
                address = %self.address,
                attempt = failures,
                max_attempts = self.policy.max_attempts,
                error = %last,
                "Atom feed disconnected, retrying in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn deliver(&mut self, atom: Atom) {
        let atom_id = atom.id();
        if let Some(metrics) = &self.metrics {
            metrics.atoms_received.inc();
        }

        if self.seen.contains(&atom_id) {
            debug!(atom = %atom_id, "Duplicate atom dropped");
            if let Some(metrics) = &self.metrics {
                metrics.atoms_duplicate.inc();
            }
            return;
        }

        // Only valid copies are remembered; a later correctly signed copy
        // shares the id
        if let Err(err) = self.validator.validate(&atom) {
            warn!(atom = %atom_id, error = %err, "Invalid atom dropped");
            if let Some(metrics) = &self.metrics {
                metrics.atoms_rejected.inc();
            }
            return;
        }

        self.seen.insert(atom_id);
        self.broadcast(FeedEvent::Atom(Arc::new(atom)));
    }

    fn broadcast(&self, event: FeedEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
