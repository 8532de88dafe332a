//! In-flight request sharing
//!
//! Identical intents (same de-duplication key) share one network call.
//! Every participant holds a [`Lease`]; the call is cancelled only when
//! the last lease is dropped. A user click that joins a prefetch therefore
//! keeps it alive after the prefetch itself lets go.

use super::{Completed, ExploreError};
use crate::segment::DedupKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// How a shared request ended
pub type Outcome = Result<Completed, ExploreError>;

#[derive(Clone)]
struct Shared {
    id: u64,
    token: CancellationToken,
    holders: Arc<AtomicUsize>,
    outcome: watch::Receiver<Option<Outcome>>,
}

impl Shared {
    /// A new lease, unless the request has already been abandoned
    fn lease(&self) -> Option<Lease> {
        if self.token.is_cancelled() {
            return None;
        }
        self.holders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == 0 {
                    None
                } else {
                    Some(n + 1)
                }
            })
            .ok()?;
        Some(Lease {
            shared: self.clone(),
        })
    }
}

/// One participant's hold on a shared in-flight request.
pub struct Lease {
    shared: Shared,
}

impl Lease {
    /// Wait for the request to finish and return its outcome.
    pub async fn outcome(&mut self) -> Outcome {
        match self.shared.outcome.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone().unwrap_or(Err(ExploreError::Interrupted)),
            Err(_) => Err(ExploreError::Interrupted),
        }
    }

    /// Whether the request has finished, successfully or not
    pub fn is_settled(&self) -> bool {
        self.shared.outcome.borrow().is_some()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.shared.holders.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.token.cancel();
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("request", &self.shared.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Handed to whoever must actually perform a newly started request.
pub(crate) struct Ticket {
    pub id: u64,
    pub token: CancellationToken,
    sender: watch::Sender<Option<Outcome>>,
}

impl Ticket {
    pub fn resolve(self, outcome: Outcome) {
        self.sender.send_replace(Some(outcome));
    }
}

pub(crate) enum Acquired {
    /// An identical request was already running
    Joined(Lease),
    /// No usable request was running; the caller must perform this one
    Started(Lease, Ticket),
}

/// Requests currently on the wire, keyed by de-duplication key
#[derive(Default)]
pub(crate) struct InFlight {
    requests: DashMap<DedupKey, Shared>,
    next_id: AtomicU64,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self) -> (Shared, Lease, Ticket) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let (sender, outcome) = watch::channel(None);
        let shared = Shared {
            id,
            token: token.clone(),
            holders: Arc::new(AtomicUsize::new(1)),
            outcome,
        };
        let lease = Lease {
            shared: shared.clone(),
        };
        (shared, lease, Ticket { id, token, sender })
    }

    /// Join the running request for `key`, or register a new one.
    pub fn acquire(&self, key: &DedupKey) -> Acquired {
        match self.requests.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if let Some(lease) = entry.get().lease() {
                    return Acquired::Joined(lease);
                }
                let (shared, lease, ticket) = self.fresh();
                entry.insert(shared);
                Acquired::Started(lease, ticket)
            }
            Entry::Vacant(entry) => {
                let (shared, lease, ticket) = self.fresh();
                entry.insert(shared);
                Acquired::Started(lease, ticket)
            }
        }
    }

    /// Forget request `id` under `key`; a newer request under the same key
    /// is left alone.
    pub fn finish(&self, key: &DedupKey, id: u64) {
        self.requests.remove_if(key, |_, shared| shared.id == id);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}
