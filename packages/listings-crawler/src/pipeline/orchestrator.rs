//! Request orchestrator.
//!
//! Drives an enumeration with a fixed pool of workers pulling from one shared
//! [`WorkQueue`]:
//!
//! ```text
//! Orchestrator::run
//!     │
//!     ├─► worker × N ── claim ──► Pivot / SearchPage ──► Partitioner::decide
//!     │                    │            └─► enqueue next page / halves / details
//!     │                    └──────► DetailFetch ──► DetailMapper ──► budget ──► sink
//!     │
//!     └─► persister ── every persist_interval ──► StateStore
//! ```
//!
//! Failed units are re-enqueued with a bumped retry counter while retryable
//! attempts remain, then dead-lettered to the sink as a [`FailedWorkRecord`].

use chrono::Utc;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ApiEndpoints;
use crate::error::{CrawlError, CrawlResult, StoreResult};
use crate::fetchers::TimeoutFetcher;
use crate::stores::MemoryWorkQueue;
use crate::traits::{
    fetcher::Fetcher,
    queue::WorkQueue,
    sink::RecordSink,
    store::{RunState, StateStore},
};
use crate::types::config::{DetailOptions, EnumerationConfig};
use crate::types::listing::ListingSummary;
use crate::types::output::OutputRecord;
use crate::types::query::Query;
use crate::types::response::SearchPage;
use crate::types::work::{DetailContext, FailedWorkRecord, WorkKind, WorkUnit};

use super::budget::{BudgetController, EmitPermit};
use super::detail::{DetailMapper, DetailOutcome};
use super::partition::{Action, Partitioner};

/// Totals reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Listings emitted, including those emitted before a resume.
    pub emitted: u64,
    pub failed_units: u64,
    pub unavailable: u64,
    pub duplicates_skipped: u64,
    pub splits: u64,
    pub undercount_ranges: u64,
    /// Listings the undercounted ranges could not expose.
    pub undercount_listings: u64,
    pub aborted: bool,
}

#[derive(Default)]
struct RunStats {
    failed_units: AtomicU64,
    unavailable: AtomicU64,
    duplicates_skipped: AtomicU64,
    splits: AtomicU64,
    undercount_ranges: AtomicU64,
    undercount_listings: AtomicU64,
}

impl RunStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Orchestrator {
    queue: Arc<dyn WorkQueue>,
    fetcher: Arc<dyn Fetcher>,
    endpoints: ApiEndpoints,
    partitioner: Partitioner,
    budget: Arc<BudgetController>,
    sink: Arc<dyn RecordSink>,
    state_store: Option<Arc<dyn StateStore>>,
    details: DetailMapper,
    config: EnumerationConfig,
    seen: DashSet<String>,
    stats: RunStats,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with an in-memory queue and no persistence.
    ///
    /// Every call made through `fetcher` is bounded by
    /// `config.request_timeout`.
    pub fn new<F: Fetcher + 'static>(
        fetcher: F,
        endpoints: ApiEndpoints,
        sink: Arc<dyn RecordSink>,
        config: EnumerationConfig,
        detail_options: DetailOptions,
    ) -> Self {
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(TimeoutFetcher::new(fetcher, config.request_timeout));
        let details = DetailMapper::new(fetcher.clone(), endpoints.clone(), detail_options);

        Self {
            queue: Arc::new(MemoryWorkQueue::new()),
            fetcher,
            endpoints,
            partitioner: Partitioner::new(&config),
            budget: Arc::new(BudgetController::new(config.max_listings)),
            sink,
            state_store: None,
            details,
            config,
            seen: DashSet::new(),
            stats: RunStats::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Token that stops the run gracefully when cancelled (e.g. on Ctrl-C).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn budget(&self) -> &BudgetController {
        &self.budget
    }

    /// Enqueue initial work. Detail units claim their listing id up front so
    /// the same listing surfaced by a search later is skipped.
    pub async fn seed(&self, units: Vec<WorkUnit>) -> StoreResult<()> {
        let mut accepted = Vec::with_capacity(units.len());
        for unit in units {
            if let WorkKind::DetailFetch { listing, .. } = &unit.kind {
                if !self.claim_listing(&listing.id) {
                    continue;
                }
            }
            accepted.push(unit);
        }
        info!(units = accepted.len(), "seeding work queue");
        self.queue.enqueue_many(accepted).await
    }

    /// Restore budget, seen listings and pending work from the state store.
    ///
    /// Returns `false` (and changes nothing) when there is no store, no saved
    /// state, or the saved run had already finished.
    pub async fn resume(&mut self) -> StoreResult<bool> {
        let Some(store) = &self.state_store else {
            return Ok(false);
        };
        let Some(state) = store.load().await? else {
            return Ok(false);
        };
        if state.is_finished() {
            info!(saved_at = %state.saved_at, "previous run finished, starting over");
            return Ok(false);
        }

        info!(
            pending = state.pending.len(),
            emitted = state.budget.emitted_count,
            aborted = state.budget.aborted,
            saved_at = %state.saved_at,
            "resuming from saved run state"
        );

        self.budget = Arc::new(BudgetController::restore(self.config.max_listings, &state.budget));
        for id in state.seen_listings {
            self.seen.insert(id);
        }
        self.stats
            .failed_units
            .store(state.failed_units, Ordering::Relaxed);
        self.queue.enqueue_many(state.pending).await?;
        Ok(true)
    }

    /// Drain the queue with `worker_count` workers, persisting state along
    /// the way. Returns once the queue is empty, the budget is spent, or the
    /// shutdown token fires.
    pub async fn run(self: Arc<Self>) -> StoreResult<RunSummary> {
        let stop = self.shutdown.child_token();
        if self.budget.is_aborted() {
            info!("listing budget already spent, nothing to do");
            stop.cancel();
        }

        // Budget exhaustion stops claiming too.
        let budget_token = self.budget.cancellation();
        let stop_on_budget = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = budget_token.cancelled() => stop_on_budget.cancel(),
                _ = stop_on_budget.cancelled() => {}
            }
        });

        info!(
            workers = self.config.worker_count,
            max_listings = ?self.config.max_listings,
            "enumeration starting"
        );

        let persister_done = CancellationToken::new();
        let persister = {
            let this = self.clone();
            let done = persister_done.clone();
            tokio::spawn(async move { this.persist_periodically(done).await })
        };

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.worker_count {
            let this = self.clone();
            let stop = stop.clone();
            workers.spawn(async move { this.worker_loop(worker_id, stop).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task panicked");
            }
        }

        persister_done.cancel();
        let _ = persister.await;
        self.persist().await?;
        stop.cancel();

        let summary = self.summary();
        info!(
            emitted = summary.emitted,
            failed_units = summary.failed_units,
            unavailable = summary.unavailable,
            duplicates_skipped = summary.duplicates_skipped,
            splits = summary.splits,
            undercount_ranges = summary.undercount_ranges,
            undercount_listings = summary.undercount_listings,
            aborted = summary.aborted,
            "enumeration finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RunSummary {
            emitted: self.budget.emitted_count(),
            failed_units: load(&self.stats.failed_units),
            unavailable: load(&self.stats.unavailable),
            duplicates_skipped: load(&self.stats.duplicates_skipped),
            splits: load(&self.stats.splits),
            undercount_ranges: load(&self.stats.undercount_ranges),
            undercount_listings: load(&self.stats.undercount_listings),
            aborted: self.budget.is_aborted(),
        }
    }

    async fn worker_loop(&self, worker_id: usize, stop: CancellationToken) {
        debug!(worker_id, "worker started");
        loop {
            let unit = match self.queue.claim(&stop).await {
                Ok(Some(unit)) => unit,
                Ok(None) => break,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to claim work");
                    break;
                }
            };

            let id = unit.id;
            self.process(unit).await;
            if let Err(e) = self.queue.complete(id).await {
                error!(worker_id, unit_id = %id, error = %e, "failed to complete unit");
            }
        }
        debug!(worker_id, "worker stopped");
    }

    async fn process(&self, unit: WorkUnit) {
        let result = match &unit.kind {
            WorkKind::Pivot { query } | WorkKind::SearchPage { query } => {
                self.process_search(query).await
            }
            WorkKind::DetailFetch { listing, context } => {
                self.process_detail(listing, context).await
            }
        };

        if let Err(e) = result {
            self.handle_failure(unit, e).await;
        }
    }

    async fn process_search(&self, query: &Query) -> CrawlResult<()> {
        let url = self.endpoints.search(query, self.config.page_size);
        let raw = self.fetcher.fetch_json(&url).await?;
        let page = SearchPage::from_json(url.as_str(), raw, query.offset, self.config.cap_per_query)?;

        debug!(
            min_price = query.price.min(),
            max_price = query.price.max(),
            offset = query.offset,
            total = page.total_count,
            listings = page.listings.len(),
            "search page fetched"
        );

        let action = self.partitioner.decide(query, &page);
        let mut derived = Vec::new();

        match &action {
            Action::Split { lower, upper } => {
                RunStats::bump(&self.stats.splits);
                info!(
                    range = %query.price,
                    lower = %lower.price,
                    upper = %upper.price,
                    total = page.total_count,
                    "splitting price range"
                );
                derived.push(WorkUnit::pivot(lower.clone()));
                derived.push(WorkUnit::pivot(upper.clone()));
            }
            Action::Continue { next } => {
                derived.push(WorkUnit::search_page(next.clone()));
            }
            Action::LeafExhausted { undercount } => {
                if let Some(undercount) = undercount {
                    RunStats::bump(&self.stats.undercount_ranges);
                    self.stats
                        .undercount_listings
                        .fetch_add(undercount.missing(), Ordering::Relaxed);
                    warn!(
                        range = %query.price,
                        total = undercount.total_count,
                        reachable = undercount.reachable,
                        missing = undercount.missing(),
                        "price range cannot be split further, listings will be missed"
                    );
                }
            }
        }

        if action.keeps_page() {
            let context = DetailContext::from_query(query);
            for listing in page.listings {
                if self.claim_listing(&listing.id) {
                    derived.push(WorkUnit::detail(listing, context.clone()));
                } else {
                    RunStats::bump(&self.stats.duplicates_skipped);
                }
            }
        }

        self.queue.enqueue_many(derived).await?;
        Ok(())
    }

    async fn process_detail(&self, listing: &ListingSummary, context: &DetailContext) -> CrawlResult<()> {
        if self.budget.is_aborted() {
            debug!(listing_id = %listing.id, "budget spent, skipping detail");
            return Ok(());
        }

        match self.details.resolve(listing, context, self.sink.as_ref()).await? {
            DetailOutcome::Unavailable => {
                RunStats::bump(&self.stats.unavailable);
            }
            DetailOutcome::Listing(record) => match self.budget.try_emit() {
                EmitPermit::Allowed => {
                    if let Err(e) = self.sink.push(&OutputRecord::Listing(record)).await {
                        self.budget.release();
                        return Err(e.into());
                    }
                    self.budget.confirm();
                }
                EmitPermit::Exhausted => {
                    debug!(listing_id = %listing.id, "budget spent, dropping listing");
                }
            },
        }
        Ok(())
    }

    async fn handle_failure(&self, unit: WorkUnit, err: CrawlError) {
        let kind = err.kind();

        if kind.should_retry() && unit.retry_count < self.config.max_retries {
            warn!(
                unit_id = %unit.id,
                unit_kind = unit.kind.name(),
                attempt = unit.attempts(),
                error = %err,
                "unit failed, retrying"
            );
            let retry = unit.retried();
            let retry_id = retry.id;
            if let Err(e) = self.queue.enqueue(retry).await {
                error!(unit_id = %retry_id, error = %e, "failed to re-enqueue unit");
            }
            return;
        }

        RunStats::bump(&self.stats.failed_units);
        error!(
            unit_id = %unit.id,
            unit_kind = unit.kind.name(),
            attempts = unit.attempts(),
            error = %err,
            "unit failed permanently"
        );

        let record = FailedWorkRecord::new(unit, err.to_string(), kind);
        if let Err(e) = self.sink.push(&record.into()).await {
            error!(error = %e, "failed to write failed-work record");
        }
    }

    /// First claim of a listing id wins; later sightings are duplicates.
    fn claim_listing(&self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }

    async fn persist_periodically(&self, done: CancellationToken) {
        if self.state_store.is_none() {
            return;
        }

        let mut interval = tokio::time::interval(self.config.persist_interval);
        interval.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.persist().await {
                        warn!(error = %e, "failed to persist run state");
                    }
                }
            }
        }
    }

    /// Save budget, queue contents and seen ids, if a store is configured.
    pub async fn persist(&self) -> StoreResult<()> {
        let Some(store) = &self.state_store else {
            return Ok(());
        };

        // Ids are claimed before the units that emit them leave the queue, so
        // reading them first can only cost a duplicate on resume, never a loss.
        let seen_listings: Vec<String> = self.seen.iter().map(|id| id.key().clone()).collect();
        let budget = self.budget.snapshot();
        let pending = self.queue.snapshot().await?;

        let state = RunState {
            budget,
            pending,
            seen_listings,
            failed_units: self.stats.failed_units.load(Ordering::Relaxed),
            saved_at: Utc::now(),
        };
        store.save(&state).await?;
        info!(
            pending = state.pending.len(),
            emitted = state.budget.emitted_count,
            "run state persisted"
        );
        Ok(())
    }
}
