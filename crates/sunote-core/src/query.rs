//! Search-term driven live note list.
//!
//! The pipeline owns one mutable search term and one published list. Term
//! changes are debounced; each accepted term replaces the active store
//! subscription, so results computed for a superseded term are dropped with
//! their subscription and never published.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::{Error, Note, NoteFilter, SharedStore, Subscription};

/// Timing knobs for [`QueryPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Quiet period a term must survive before it is queried (default: 150ms)
    pub debounce: Duration,
    /// How long the subscription outlives its last observer (default: 5s)
    pub idle_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            idle_grace: Duration::from_secs(5),
        }
    }
}

/// What observers of the pipeline see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySnapshot {
    /// Term whose subscription produced `notes`.
    pub term: String,
    /// Incremented every time the pipeline switches to a new subscription.
    pub generation: u64,
    pub notes: Vec<Note>,
    /// Set when the active subscription ended with a store error.
    pub error: Option<Error>,
}

/// Live, ordered note list following a debounced search term.
///
/// Must be created inside a tokio runtime. The driver task stops when the
/// pipeline is dropped.
pub struct QueryPipeline {
    term: watch::Sender<String>,
    snapshot: Arc<watch::Sender<QuerySnapshot>>,
    wake: Arc<Notify>,
    driver: JoinHandle<()>,
}

impl QueryPipeline {
    pub fn new(store: SharedStore, config: PipelineConfig) -> Self {
        let (term, terms) = watch::channel(String::new());
        let (snapshot, _) = watch::channel(QuerySnapshot::default());
        let snapshot = Arc::new(snapshot);
        let wake = Arc::new(Notify::new());

        let driver = Driver {
            store,
            config,
            terms,
            snapshot: snapshot.clone(),
            wake: wake.clone(),
            accepted: String::new(),
            generation: 0,
            active: None,
        };
        let driver = tokio::spawn(driver.run());

        Self {
            term,
            snapshot,
            wake,
            driver,
        }
    }

    /// Replace the search term. Setting the current term again is a no-op.
    pub fn set_term(&self, term: impl Into<String>) {
        let term = term.into();
        self.term.send_if_modified(|current| {
            if *current == term {
                false
            } else {
                *current = term;
                true
            }
        });
    }

    /// The most recently set term, accepted or not.
    pub fn term(&self) -> String {
        self.term.borrow().clone()
    }

    /// Start observing the list. Re-establishes the store subscription if it
    /// was torn down while nobody was watching.
    pub fn observe(&self) -> watch::Receiver<QuerySnapshot> {
        let rx = self.snapshot.subscribe();
        self.wake.notify_one();
        rx
    }

    /// Latest published snapshot.
    pub fn current(&self) -> QuerySnapshot {
        self.snapshot.borrow().clone()
    }
}

impl Drop for QueryPipeline {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

struct Driver {
    store: SharedStore,
    config: PipelineConfig,
    terms: watch::Receiver<String>,
    snapshot: Arc<watch::Sender<QuerySnapshot>>,
    wake: Arc<Notify>,
    /// Last term that made it through the debounce.
    accepted: String,
    generation: u64,
    active: Option<Subscription>,
}

impl Driver {
    async fn run(mut self) {
        let mut debounce_deadline: Option<Instant> = None;
        let mut idle_deadline: Option<Instant> = None;

        loop {
            let observed = self.snapshot.receiver_count() > 0;
            if !observed && self.active.is_some() && idle_deadline.is_none() {
                idle_deadline = Some(Instant::now() + self.config.idle_grace);
            }

            tokio::select! {
                changed = self.terms.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // A newer candidate restarts the quiet period.
                    debounce_deadline = Some(Instant::now() + self.config.debounce);
                }
                _ = sleep_until(debounce_deadline.unwrap_or_else(Instant::now)), if debounce_deadline.is_some() => {
                    debounce_deadline = None;
                    let term = self.terms.borrow_and_update().clone();
                    self.accept(term, observed);
                }
                item = next_snapshot(&mut self.active), if self.active.is_some() => {
                    self.publish(item);
                }
                _ = self.wake.notified() => {
                    idle_deadline = None;
                    if self.active.is_none() {
                        self.switch();
                    }
                }
                _ = self.snapshot.closed(), if observed && self.active.is_some() && idle_deadline.is_none() => {
                    idle_deadline = Some(Instant::now() + self.config.idle_grace);
                }
                _ = sleep_until(idle_deadline.unwrap_or_else(Instant::now)), if idle_deadline.is_some() => {
                    idle_deadline = None;
                    if self.snapshot.receiver_count() == 0 && self.active.is_some() {
                        debug!("no observers for {:?}, dropping note subscription", self.accepted);
                        self.active = None;
                    }
                }
            }
        }
    }

    fn accept(&mut self, term: String, observed: bool) {
        if term == self.accepted && self.active.is_some() {
            return;
        }
        self.accepted = term;
        if observed || self.active.is_some() {
            self.switch();
        }
    }

    /// Replace the active subscription with one for the accepted term. The
    /// old subscription is dropped first, which cancels its task.
    fn switch(&mut self) {
        self.active = None;
        self.generation += 1;
        let filter = NoteFilter::from_term(&self.accepted);
        debug!("switching note query to {:?} (generation {})", filter, self.generation);
        self.active = Some(self.store.clone().subscribe(filter));
    }

    fn publish(&mut self, item: Option<Result<Vec<Note>, Error>>) {
        match item {
            Some(Ok(notes)) => {
                self.snapshot.send_replace(QuerySnapshot {
                    term: self.accepted.clone(),
                    generation: self.generation,
                    notes,
                    error: None,
                });
            }
            Some(Err(e)) => {
                error!("note query for {:?} failed: {}", self.accepted, e);
                let term = self.accepted.clone();
                let generation = self.generation;
                self.snapshot.send_modify(|snapshot| {
                    snapshot.term = term;
                    snapshot.generation = generation;
                    snapshot.error = Some(e);
                });
                self.active = None;
            }
            None => {
                debug!("note subscription for {:?} ended", self.accepted);
                self.active = None;
            }
        }
    }
}

async fn next_snapshot(active: &mut Option<Subscription>) -> Option<Result<Vec<Note>, Error>> {
    match active {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
