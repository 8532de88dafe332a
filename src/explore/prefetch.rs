//! Visibility-driven prefetch
//!
//! Segments that stay on screen through a quiet period (no scrolling, no
//! visibility changes) get their expansion requested in the background.
//! Prefetches go through the explorer's history and in-flight paths, so a
//! later click on the same segment joins the running request instead of
//! issuing a second one. Prefetching never writes navigation state and
//! never reports errors.

use super::engine::Explorer;
use super::inflight::Lease;
use crate::segment::{Segment, SegmentId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

struct Watched {
    segment: Segment,
    since: Instant,
    lease: Option<Lease>,
    /// Prefetched or already answered; never requested again while visible
    done: bool,
}

struct Inner {
    visible: HashMap<SegmentId, Watched>,
    last_activity: Option<Instant>,
}

pub struct Prefetcher {
    explorer: Arc<Explorer>,
    quiet: Duration,
    inner: Mutex<Inner>,
}

impl Prefetcher {
    /// Uses the explorer's configured quiet period
    pub fn new(explorer: Arc<Explorer>) -> Self {
        let quiet = explorer.config().prefetch_quiet_period();
        Self {
            explorer,
            quiet,
            inner: Mutex::new(Inner {
                visible: HashMap::new(),
                last_activity: None,
            }),
        }
    }

    pub fn with_quiet_period(mut self, quiet: Duration) -> Self {
        self.quiet = quiet;
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_visible(&self, segment: &Segment) {
        self.mark_visible_at(segment, Instant::now());
    }

    pub fn mark_visible_at(&self, segment: &Segment, now: Instant) {
        let mut inner = self.inner();
        inner.last_activity = Some(now);
        inner.visible.entry(segment.id).or_insert_with(|| Watched {
            segment: segment.clone(),
            since: now,
            lease: None,
            done: false,
        });
    }

    /// Stop watching `id`, abandoning its prefetch unless a click joined it
    pub fn mark_hidden(&self, id: SegmentId) {
        self.mark_hidden_at(id, Instant::now());
    }

    pub fn mark_hidden_at(&self, id: SegmentId, now: Instant) {
        let mut inner = self.inner();
        inner.last_activity = Some(now);
        if let Some(watched) = inner.visible.remove(&id) {
            if watched.lease.is_some() {
                debug!(segment = %id, "prefetch released");
            }
        }
    }

    pub fn note_scroll(&self) {
        self.note_scroll_at(Instant::now());
    }

    pub fn note_scroll_at(&self, now: Instant) {
        self.inner().last_activity = Some(now);
    }

    /// Prefetch every segment that is due. Returns how many were started
    /// or joined.
    pub fn tick(&self, now: Instant) -> usize {
        let mut inner = self.inner();
        let quiet_since = inner
            .last_activity
            .map_or(true, |at| now.saturating_duration_since(at) >= self.quiet);

        let mut started = 0;
        for watched in inner.visible.values_mut() {
            // Finished leases are kept only until observed
            if watched.lease.as_ref().is_some_and(Lease::is_settled) {
                watched.lease = None;
            }
            if !quiet_since
                || watched.done
                || now.saturating_duration_since(watched.since) < self.quiet
            {
                continue;
            }
            watched.done = true;
            if let Some(lease) = self.explorer.prefetch(&watched.segment) {
                watched.lease = Some(lease);
                started += 1;
            }
        }
        started
    }

    /// Segments whose prefetch is still running
    pub fn pending(&self) -> usize {
        self.inner()
            .visible
            .values()
            .filter(|w| w.lease.as_ref().is_some_and(|l| !l.is_settled()))
            .count()
    }

    /// Forget everything on screen, e.g. when a new view replaces it
    pub fn clear(&self) {
        self.inner().visible.clear();
    }

    /// Drive `tick` every `period` until the handle is aborted
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                let now = interval.tick().await;
                self.tick(now.into_std());
            }
        })
    }
}
