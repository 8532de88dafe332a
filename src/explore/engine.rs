//! Explorer: the query state machine
//!
//! Each intent goes through three checks in order:
//! 1. the history store (answer synchronously, no network),
//! 2. the in-flight registry (share an identical running request),
//! 3. a fresh request on a spawned task.
//!
//! Only the waiter holding the current generation may write state. A
//! newer intent bumps the generation and cancels the old waiter, so a
//! late response can never overwrite newer state.

use super::inflight::{Acquired, InFlight, Lease, Outcome, Ticket};
use super::prompt;
use super::state::{ExplorerState, Phase};
use super::{Completed, ExploreError};
use crate::config::ExploreConfig;
use crate::context::ContextBuilder;
use crate::llm::{CompletionClient, CompletionRequest};
use crate::parser::parse_segments;
use crate::segment::{DedupKey, QueryRecord, RecordId, Segment, SegmentId};
use crate::storage::QueryStore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The request currently allowed to write state
struct Active {
    generation: u64,
    key: DedupKey,
    wait: CancellationToken,
}

/// Everything a spawned request task needs
struct Job {
    key: DedupKey,
    query: String,
    parent_id: Option<RecordId>,
    source_segment_id: Option<SegmentId>,
    request: CompletionRequest,
    /// Parent assigned to every parsed segment
    segment_parent: Option<SegmentId>,
    /// Segments already shown, kept ahead of new ones when extending
    prefix: Vec<Segment>,
    /// Total segment cap when extending
    cap: Option<usize>,
}

impl Job {
    async fn execute(
        self,
        client: &dyn CompletionClient,
        store: &QueryStore,
        max_attempts: usize,
    ) -> Outcome {
        let mut segments =
            fetch_segments(client, self.request, self.segment_parent, max_attempts).await?;

        if let Some(cap) = self.cap {
            if segments.is_empty() {
                return Err(ExploreError::Exhausted);
            }
            segments.truncate(cap.saturating_sub(self.prefix.len()));
            let mut combined = self.prefix;
            combined.append(&mut segments);
            segments = combined;
        }

        let record_id = store.save(
            &self.query,
            segments.clone(),
            self.parent_id,
            self.source_segment_id,
        );
        // An identical record saved meanwhile wins over ours
        let segments = store
            .get_by_id(record_id)
            .map(|r| r.segments)
            .unwrap_or(segments);

        info!(%record_id, segments = segments.len(), "query completed");
        Ok(Completed {
            record_id,
            query: self.query,
            segments,
        })
    }
}

/// Ask the model for segments, re-asking with a corrective instruction
/// while the answer is malformed. Transport failures are not retried.
pub(crate) async fn fetch_segments(
    client: &dyn CompletionClient,
    mut request: CompletionRequest,
    parent_id: Option<SegmentId>,
    max_attempts: usize,
) -> Result<Vec<Segment>, ExploreError> {
    let attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let text = client.complete(&request).await?;
        match parse_segments(&text, parent_id) {
            Ok(segments) => return Ok(segments),
            Err(e) => {
                warn!(attempt, attempts, error = %e, "malformed model output");
                request.push_exchange(text, prompt::corrective_instruction(&e));
                last_error = Some(e);
            }
        }
    }

    Err(ExploreError::MalformedOutput {
        attempts,
        reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Coordinates searches, expansions and extensions for one session.
pub struct Explorer {
    client: Arc<dyn CompletionClient>,
    store: Arc<QueryStore>,
    config: ExploreConfig,
    context: ContextBuilder,
    state: watch::Sender<ExplorerState>,
    active: Mutex<Option<Active>>,
    generation: AtomicU64,
    inflight: Arc<InFlight>,
}

impl Explorer {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        store: Arc<QueryStore>,
        config: ExploreConfig,
    ) -> Self {
        let context = ContextBuilder::new()
            .with_max_depth(config.max_context_depth)
            .with_char_budget(config.context_char_budget);
        let (state, _) = watch::channel(ExplorerState::default());

        Self {
            client,
            store,
            config,
            context,
            state,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            inflight: Arc::new(InFlight::new()),
        }
    }

    pub fn config(&self) -> &ExploreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<QueryStore> {
        &self.store
    }

    /// Current navigation state
    pub fn state(&self) -> ExplorerState {
        self.state.borrow().clone()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<ExplorerState> {
        self.state.subscribe()
    }

    /// Requests currently on the wire
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh root search
    pub async fn search(&self, query: &str) -> Result<Vec<Segment>, ExploreError> {
        self.run(query, None, None).await
    }

    /// Expand a segment of the current view into child segments
    pub async fn expand(&self, segment: &Segment) -> Result<Vec<Segment>, ExploreError> {
        let parent_id = self.state.borrow().record_id;
        let directive = prompt::expansion_directive(segment);
        self.run(&directive, Some(segment), parent_id).await
    }

    /// Run a query: a root search without `source`, an expansion of
    /// `source` (produced by record `parent_id`) otherwise.
    ///
    /// Resolves to the resulting segments; a cancelled or superseded
    /// request resolves to an empty list.
    pub async fn run(
        &self,
        query: &str,
        source: Option<&Segment>,
        parent_id: Option<RecordId>,
    ) -> Result<Vec<Segment>, ExploreError> {
        let key = DedupKey::new(query, source.map(|s| s.id), parent_id);
        if !key.is_well_formed() {
            warn!("query has only one of source segment and parent record; it will not be cached");
        }

        let (phase, expanding) = match source {
            Some(segment) => (Phase::Expanding, Some(segment.id)),
            None => (Phase::Searching, None),
        };

        self.dispatch(key, phase, expanding, |key| match source {
            Some(segment) => self.expansion_job(key, query, segment, parent_id),
            None => self.search_job(key, query, parent_id),
        })
        .await
    }

    /// Add more segments to the current view, up to the configured total.
    ///
    /// Resolves to the whole extended list, or to an empty list when the
    /// view is already full or the model has nothing more to add.
    pub async fn extend(&self) -> Result<Vec<Segment>, ExploreError> {
        let current = self.state();
        let cap = self.config.max_total_segments;
        let (Some(record_id), Some(last)) = (current.record_id, current.segments.last()) else {
            return Ok(Vec::new());
        };
        if current.segments.len() >= cap {
            debug!(cap, "view already at segment cap");
            return Ok(Vec::new());
        }

        let query = prompt::continuation_query(&current.query);
        let key = DedupKey::new(&query, Some(last.id), Some(record_id));
        let last_id = last.id;
        let segment_parent = last.parent_id;

        self.dispatch(key, Phase::Expanding, None, |key| Job {
            key,
            request: prompt::continuation_request(
                &current.query,
                &current.segments,
                cap - current.segments.len(),
            ),
            query,
            parent_id: Some(record_id),
            source_segment_id: Some(last_id),
            segment_parent,
            prefix: current.segments.clone(),
            cap: Some(cap),
        })
        .await
    }

    /// Stop whatever request is authoritative and return to idle.
    pub fn cancel(&self) {
        if let Some(active) = self.active().take() {
            debug!(generation = active.generation, "request cancelled");
            active.wait.cancel();
        }
        self.state.send_modify(ExplorerState::settle);
    }

    /// Show a stored record, or the empty home state when it is missing.
    ///
    /// Returns whether the record was found.
    pub fn restore(&self, record_id: Option<RecordId>) -> bool {
        self.supersede();
        match record_id.and_then(|id| self.store.get_by_id(id)) {
            Some(record) => {
                debug!(id = %record.id, "restored snapshot");
                self.adopt(record);
                true
            }
            None => {
                self.state.send_replace(ExplorerState::default());
                false
            }
        }
    }

    /// Start (or join) a background expansion of `segment` without
    /// touching state. `None` when the answer is already stored or there
    /// is no current record to hang it from.
    ///
    /// Dropping the lease abandons the request unless someone else joined.
    pub fn prefetch(&self, segment: &Segment) -> Option<Lease> {
        let parent_id = self.state.borrow().record_id?;
        let directive = prompt::expansion_directive(segment);
        let key = DedupKey::new(&directive, Some(segment.id), Some(parent_id));

        if self.store.find_by_key(&key).is_some() {
            return None;
        }

        match self.inflight.acquire(&key) {
            Acquired::Joined(lease) => Some(lease),
            Acquired::Started(lease, ticket) => {
                debug!(segment = %segment.id, "prefetching expansion");
                let job = self.expansion_job(key, &directive, segment, Some(parent_id));
                self.spawn(job, ticket);
                Some(lease)
            }
        }
    }

    async fn dispatch(
        &self,
        key: DedupKey,
        phase: Phase,
        expanding: Option<SegmentId>,
        job: impl FnOnce(DedupKey) -> Job,
    ) -> Result<Vec<Segment>, ExploreError> {
        if let Some(record) = self.store.find_by_key(&key) {
            debug!(id = %record.id, "answered from history");
            self.supersede();
            let segments = record.segments.clone();
            self.adopt(record);
            return Ok(segments);
        }

        let (generation, wait) = self.claim(&key, phase, expanding);

        let lease = match self.inflight.acquire(&key) {
            Acquired::Joined(lease) => {
                debug!(generation, "joined identical in-flight request");
                lease
            }
            Acquired::Started(lease, ticket) => {
                debug!(generation, "issuing request");
                self.spawn(job(key), ticket);
                lease
            }
        };

        self.await_outcome(generation, &wait, lease).await
    }

    /// Become the authoritative request for `key`.
    ///
    /// A repeat of the request that already holds the slot shares its
    /// generation, so only one of them commits.
    fn claim(
        &self,
        key: &DedupKey,
        phase: Phase,
        expanding: Option<SegmentId>,
    ) -> (u64, CancellationToken) {
        let mut active = self.active();
        if let Some(current) = active.as_ref() {
            if &current.key == key {
                return (current.generation, current.wait.clone());
            }
            debug!(generation = current.generation, "superseding in-flight request");
            current.wait.cancel();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let wait = CancellationToken::new();
        *active = Some(Active {
            generation,
            key: key.clone(),
            wait: wait.clone(),
        });
        self.state.send_modify(|s| s.begin(phase, expanding));
        (generation, wait)
    }

    /// Drop the authoritative request without touching state
    fn supersede(&self) {
        if let Some(active) = self.active().take() {
            debug!(generation = active.generation, "superseding in-flight request");
            active.wait.cancel();
        }
    }

    fn adopt(&self, record: QueryRecord) {
        self.state
            .send_modify(|s| s.adopt(&record.query, record.segments, record.id));
    }

    /// Take the slot if `generation` still holds it
    fn take_if_current(&self, generation: u64) -> bool {
        let mut active = self.active();
        if active.as_ref().map(|a| a.generation) == Some(generation) {
            *active = None;
            true
        } else {
            false
        }
    }

    async fn await_outcome(
        &self,
        generation: u64,
        wait: &CancellationToken,
        mut lease: Lease,
    ) -> Result<Vec<Segment>, ExploreError> {
        let outcome = tokio::select! {
            biased;
            _ = wait.cancelled() => None,
            outcome = lease.outcome() => Some(outcome),
        };
        drop(lease);

        match outcome {
            None => Ok(Vec::new()),
            Some(Ok(done)) => {
                if self.take_if_current(generation) {
                    self.state.send_modify(|s| {
                        s.adopt(&done.query, done.segments.clone(), done.record_id)
                    });
                } else {
                    debug!(generation, "result already committed or superseded");
                }
                Ok(done.segments)
            }
            Some(Err(ExploreError::Cancelled | ExploreError::Exhausted)) => {
                if self.take_if_current(generation) {
                    self.state.send_modify(ExplorerState::settle);
                }
                Ok(Vec::new())
            }
            Some(Err(e)) => {
                if self.take_if_current(generation) {
                    warn!(error = %e, "request failed");
                    self.state.send_modify(|s| s.fail(e.to_string()));
                }
                Err(e)
            }
        }
    }

    fn spawn(&self, job: Job, ticket: Ticket) {
        let client = self.client.clone();
        let store = self.store.clone();
        let inflight = self.inflight.clone();
        let attempts = self.config.max_parse_attempts;

        tokio::spawn(async move {
            let key = job.key.clone();
            let outcome = tokio::select! {
                biased;
                _ = ticket.token.cancelled() => Err(ExploreError::Cancelled),
                outcome = job.execute(client.as_ref(), &store, attempts) => outcome,
            };
            if let Err(ExploreError::Cancelled) = &outcome {
                debug!(request = ticket.id, "request abandoned");
            }
            inflight.finish(&key, ticket.id);
            ticket.resolve(outcome);
        });
    }

    fn search_job(&self, key: DedupKey, query: &str, parent_id: Option<RecordId>) -> Job {
        Job {
            key,
            query: query.trim().to_string(),
            parent_id,
            source_segment_id: None,
            request: prompt::search_request(query),
            segment_parent: None,
            prefix: Vec::new(),
            cap: None,
        }
    }

    fn expansion_job(
        &self,
        key: DedupKey,
        directive: &str,
        segment: &Segment,
        parent_id: Option<RecordId>,
    ) -> Job {
        let original_query = parent_id
            .and_then(|id| self.store.root_query(id))
            .unwrap_or_else(|| self.state.borrow().query.clone());
        let known = self.known_segments(parent_id);
        let context = self.context.build(segment, &known, &original_query);

        Job {
            key,
            query: directive.trim().to_string(),
            parent_id,
            source_segment_id: Some(segment.id),
            request: prompt::expansion_request(directive, &context),
            segment_parent: Some(segment.id),
            prefix: Vec::new(),
            cap: None,
        }
    }

    /// Segments reachable from `parent_id`'s lineage plus the current view
    fn known_segments(&self, parent_id: Option<RecordId>) -> Vec<Segment> {
        let lineage = parent_id
            .map(|id| self.store.lineage(id))
            .unwrap_or_default();
        let current = self.state.borrow().segments.clone();

        let mut seen = HashSet::new();
        lineage
            .into_iter()
            .flat_map(|record| record.segments)
            .chain(current)
            .filter(|segment| seen.insert(segment.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{mock_segment_list, LlmError, MockClient};
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn explorer(client: Arc<MockClient>) -> Explorer {
        let store = Arc::new(QueryStore::new(Arc::new(MemoryStore::new())));
        Explorer::new(client, store, ExploreConfig::default())
    }

    fn four_segments() -> String {
        mock_segment_list(&[
            ("Light reactions", "Capture light energy as ATP and NADPH."),
            ("Calvin cycle", "Uses ATP and NADPH to fix carbon."),
            ("Chlorophyll", "Pigment absorbing red and blue light."),
            ("Stomata", "Pores regulating gas exchange."),
        ])
    }

    // Expansion prompts embed the original search, so their rules are
    // registered ahead of the search rule: the first matching rule wins.

    /// Let spawned tasks run up to their next suspension point
    async fn settle_tasks() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn search_stores_and_adopts_result() {
        let client =
            Arc::new(MockClient::available().with_reply("photosynthesis", four_segments()));
        let explorer = explorer(client.clone());

        let segments = explorer.search("photosynthesis").await.unwrap();

        assert_eq!(segments.len(), 4);
        let state = explorer.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.segments, segments);
        let record = explorer.store().get_by_id(state.record_id.unwrap()).unwrap();
        assert_eq!(record.segments, segments);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn repeated_search_is_answered_from_history() {
        let client =
            Arc::new(MockClient::available().with_reply("photosynthesis", four_segments()));
        let explorer = explorer(client.clone());

        let first = explorer.search("photosynthesis").await.unwrap();
        let mut states = explorer.subscribe();
        states.mark_unchanged();
        let second = explorer.search("  Photosynthesis ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.call_count(), 1);
        // One state change: straight to the adopted snapshot
        assert!(states.has_changed().unwrap());
        assert_eq!(states.borrow_and_update().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn malformed_output_is_retried_with_correction() {
        let client = Arc::new(
            MockClient::available()
                .with_reply("photosynthesis", "Sorry, here you go: not json")
                .with_reply("photosynthesis", four_segments()),
        );
        let explorer = explorer(client.clone());

        let segments = explorer.search("photosynthesis").await.unwrap();

        assert_eq!(segments.len(), 4);
        assert_eq!(client.call_count(), 2);
        let retry = &client.requests()[1];
        assert_eq!(retry.messages.len(), 3);
        assert!(retry.messages[2].content.contains("could not be used"));
    }

    #[tokio::test]
    async fn malformed_output_fails_after_three_attempts() {
        let client = Arc::new(
            MockClient::available().with_reply("photosynthesis", r#"{"items": []}"#),
        );
        let explorer = explorer(client.clone());

        let err = explorer.search("photosynthesis").await.unwrap_err();

        assert!(matches!(err, ExploreError::MalformedOutput { attempts: 3, .. }));
        assert_eq!(client.call_count(), 3);
        let state = explorer.state();
        assert_eq!(state.phase, Phase::Error);
        assert!(state.error.is_some());
        assert!(explorer.store().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_not_retried_and_keeps_view() {
        let client = Arc::new(
            MockClient::available()
                .with_failure("Calvin", LlmError::Http { status: 429, body: "slow down".into() })
                .with_reply("photosynthesis", four_segments()),
        );
        let explorer = explorer(client.clone());
        let segments = explorer.search("photosynthesis").await.unwrap();

        let err = explorer.expand(&segments[1]).await.unwrap_err();

        assert!(matches!(err, ExploreError::Transport(LlmError::Http { status: 429, .. })));
        assert_eq!(client.call_count(), 2);
        let state = explorer.state();
        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.segments, segments, "failed expansion keeps the view");
        assert_eq!(state.expanding, None);
    }

    #[tokio::test]
    async fn expansion_records_source_and_parent() {
        let client = Arc::new(
            MockClient::available()
                .with_reply(
                    "Light reactions",
                    mock_segment_list(&[("Photosystem II", "Splits water.")]),
                )
                .with_reply("photosynthesis", four_segments()),
        );
        let explorer = explorer(client.clone());
        let roots = explorer.search("photosynthesis").await.unwrap();
        let root_record = explorer.state().record_id.unwrap();

        let children = explorer.expand(&roots[0]).await.unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].parent_id, Some(roots[0].id));
        let record = explorer.store().get_by_id(explorer.state().record_id.unwrap()).unwrap();
        assert_eq!(record.source_segment_id, Some(roots[0].id));
        assert_eq!(record.parent_id, Some(root_record));
        assert!(client.requests()[1]
            .first_user()
            .starts_with("Original search: \"photosynthesis\""));
    }

    #[tokio::test]
    async fn cancel_mid_search_returns_to_idle_with_view_unchanged() {
        let client = Arc::new(
            MockClient::available()
                .with_reply("photosynthesis", four_segments())
                .with_reply("mitochondria", four_segments()),
        );
        let gate = client.gate("mitochondria");
        let explorer = Arc::new(explorer(client.clone()));
        let before = explorer.search("photosynthesis").await.unwrap();

        let pending = {
            let explorer = explorer.clone();
            tokio::spawn(async move { explorer.search("mitochondria").await })
        };
        settle_tasks().await;
        assert_eq!(explorer.state().phase, Phase::Searching);

        explorer.cancel();
        let result = pending.await.unwrap().unwrap();
        gate.notify_one();

        assert!(result.is_empty());
        let state = explorer.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.error, None);
        assert_eq!(state.segments, before);
        settle_tasks().await;
        assert!(explorer.store().find_existing("mitochondria", None, None).is_none());
    }

    #[tokio::test]
    async fn superseded_result_never_lands() {
        let client = Arc::new(
            MockClient::available()
                .with_reply("first topic", mock_segment_list(&[("Old", "stale")]))
                .with_reply("second topic", mock_segment_list(&[("New", "fresh")])),
        );
        let first_gate = client.gate("first topic");
        let explorer = Arc::new(explorer(client.clone()));

        let r1 = {
            let explorer = explorer.clone();
            tokio::spawn(async move { explorer.search("first topic").await })
        };
        settle_tasks().await;

        let r2 = explorer.search("second topic").await.unwrap();
        assert_eq!(r2[0].title, "New");

        first_gate.notify_one();
        let r1 = r1.await.unwrap().unwrap();
        settle_tasks().await;

        assert!(r1.is_empty());
        assert_eq!(explorer.state().segments[0].title, "New");
    }

    #[tokio::test]
    async fn concurrent_identical_expansions_share_one_call() {
        let client = Arc::new(
            MockClient::available()
                .with_reply("Calvin cycle", mock_segment_list(&[("RuBisCO", "Fixes CO2.")]))
                .with_reply("photosynthesis", four_segments()),
        );
        let gate = client.gate("Calvin cycle");
        let explorer = Arc::new(explorer(client.clone()));
        let roots = explorer.search("photosynthesis").await.unwrap();
        let calvin = roots[1].clone();

        let a = {
            let (explorer, seg) = (explorer.clone(), calvin.clone());
            tokio::spawn(async move { explorer.expand(&seg).await })
        };
        let b = {
            let (explorer, seg) = (explorer.clone(), calvin.clone());
            tokio::spawn(async move { explorer.expand(&seg).await })
        };
        settle_tasks().await;
        assert_eq!(explorer.state().expanding, Some(calvin.id));

        gate.notify_one();
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(client.call_count(), 2, "one search + one shared expansion");
        assert_eq!(a, b);
        assert_eq!(explorer.state().phase, Phase::Idle);
        assert_eq!(explorer.store().len(), 2);
    }

    #[tokio::test]
    async fn identical_segments_under_different_parents_do_not_collide() {
        let client = Arc::new(
            MockClient::available()
                .with_reply("Twin", mock_segment_list(&[("Child", "of a twin")])),
        );
        let explorer = explorer(client.clone());
        let store = explorer.store().clone();

        let left = Segment::new("Twin", "same words");
        let right = Segment::new("Twin", "same words");
        let left_record = store.save("left", vec![left.clone()], None, None);
        let right_record = store.save("right", vec![right.clone()], None, None);

        let directive = prompt::expansion_directive(&left);
        explorer.run(&directive, Some(&left), Some(left_record)).await.unwrap();
        explorer.run(&directive, Some(&right), Some(right_record)).await.unwrap();

        assert_eq!(client.call_count(), 2, "distinct source segments are distinct keys");
    }

    #[tokio::test]
    async fn extend_appends_until_cap() {
        let client = Arc::new(
            MockClient::available()
                .with_reply(
                    "More on: photosynthesis",
                    mock_segment_list(&[
                        ("Cuticle", "Waxy."),
                        ("Xylem", "Water."),
                        ("Phloem", "Sugar."),
                    ]),
                )
                .with_reply("photosynthesis", four_segments()),
        );
        let store = Arc::new(QueryStore::new(Arc::new(MemoryStore::new())));
        let config = ExploreConfig {
            max_total_segments: 6,
            ..ExploreConfig::default()
        };
        let explorer = Explorer::new(client.clone(), store, config);
        let roots = explorer.search("photosynthesis").await.unwrap();
        let root_record = explorer.state().record_id.unwrap();

        let extended = explorer.extend().await.unwrap();

        assert_eq!(extended.len(), 6);
        assert_eq!(&extended[..4], &roots[..]);
        assert_eq!(extended[4].title, "Cuticle");
        let state = explorer.state();
        assert_eq!(state.segments, extended);
        let record = explorer.store().get_by_id(state.record_id.unwrap()).unwrap();
        assert_eq!(record.parent_id, Some(root_record));
        assert_eq!(record.source_segment_id, Some(roots[3].id));

        // Full view: no further request
        assert!(explorer.extend().await.unwrap().is_empty());
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn extend_with_nothing_more_leaves_view() {
        let client = Arc::new(
            MockClient::available()
                .with_reply("More on:", r#"{"list": []}"#)
                .with_reply("photosynthesis", four_segments()),
        );
        let explorer = explorer(client.clone());
        let roots = explorer.search("photosynthesis").await.unwrap();
        let record = explorer.state().record_id;

        assert!(explorer.extend().await.unwrap().is_empty());

        let state = explorer.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.segments, roots);
        assert_eq!(state.record_id, record);
    }

    #[tokio::test]
    async fn restore_adopts_record_or_goes_home() {
        let client =
            Arc::new(MockClient::available().with_reply("photosynthesis", four_segments()));
        let explorer = explorer(client);
        explorer.search("photosynthesis").await.unwrap();
        let id = explorer.state().record_id;

        assert!(!explorer.restore(Some(RecordId::new())));
        assert_eq!(explorer.state(), ExplorerState::default());

        assert!(explorer.restore(id));
        assert_eq!(explorer.state().segments.len(), 4);
        assert_eq!(explorer.state().query, "photosynthesis");
    }

    #[tokio::test]
    async fn prefetch_then_click_shares_request() {
        let client = Arc::new(
            MockClient::available()
                .with_reply(
                    "Stomata",
                    mock_segment_list(&[("Guard cells", "Open and close pores.")]),
                )
                .with_reply("photosynthesis", four_segments()),
        );
        let gate = client.gate("Stomata");
        let explorer = Arc::new(explorer(client.clone()));
        let roots = explorer.search("photosynthesis").await.unwrap();
        let stomata = roots[3].clone();

        let prefetch = explorer.prefetch(&stomata).expect("prefetch should start");
        settle_tasks().await;

        let click = {
            let (explorer, seg) = (explorer.clone(), stomata.clone());
            tokio::spawn(async move { explorer.expand(&seg).await })
        };
        settle_tasks().await;

        // Scrolling away releases the prefetch; the click keeps the call alive
        drop(prefetch);
        gate.notify_one();

        let children = tokio::time::timeout(Duration::from_secs(5), click)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(children[0].title, "Guard cells");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn abandoned_prefetch_is_silent() {
        let client = Arc::new(
            MockClient::available()
                .with_reply("Chlorophyll", mock_segment_list(&[("Chlorophyll a", "Main pigment.")]))
                .with_reply("photosynthesis", four_segments()),
        );
        let _gate = client.gate("Chlorophyll");
        let explorer = explorer(client.clone());
        let roots = explorer.search("photosynthesis").await.unwrap();
        let before = explorer.state();

        let lease = explorer.prefetch(&roots[2]).expect("prefetch should start");
        settle_tasks().await;
        drop(lease);
        settle_tasks().await;

        assert_eq!(explorer.state(), before);
        assert_eq!(explorer.in_flight(), 0);
        assert_eq!(explorer.store().len(), 1);
    }
}
