// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    LoadProgress, LoadingStage,
    buckets::LoaderState,
    view::{TestVariantFilter, ViewConfig},
};
use crate::{
    config::LoaderConfig,
    errors::{DisplayErrorChain, LoadTestVariantsError, LoadTestVariantsErrorKind},
    helpers::plural,
    service::QueryTestVariants,
};
use std::{
    collections::BTreeSet,
    fmt,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use test_variants_filtering::{
    GroupingKeys, SearchQuery, SortingKeys, errors::SearchQueryParseErrors,
};
use test_variants_metadata::{
    QueryTestVariantsRequest, QueryTestVariantsResponse, TestVariant, TestVariantStatus,
    invocation_name,
};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Where the next page will be read from.
#[derive(Clone, Debug, Eq, PartialEq)]
enum PageCursor {
    /// The token for the next page. The first page has an empty token.
    Next(String),
    /// Every page has been read.
    End,
}

/// Loads the test variants of an invocation page by page and sorts them into
/// status buckets.
///
/// The query endpoint returns test variants ordered by status, so once a test
/// variant of a later status arrives, every earlier bucket is complete. The
/// loader tracks this as its [`LoadingStage`].
///
/// Loads are serialized: at most one page fetch is in flight at any time, and
/// calls to [`load_next_test_variants`](Self::load_next_test_variants) run in
/// the order they were made, whichever of their futures is polled first. Reads never wait on the network; they see
/// whatever has been loaded so far through the current filter, sort order and
/// grouping.
pub struct TestLoader<S> {
    request: QueryTestVariantsRequest,
    service: S,
    fetch_timeout: Option<Duration>,
    // Loads take a ticket when they're called and wait for their turn.
    queue: watch::Sender<LoadQueue>,
    // Only locked by the load whose turn it is.
    cursor: tokio::sync::Mutex<PageCursor>,
    // Only ever held briefly, never across an await point.
    state: Mutex<LoaderState>,
    view: RwLock<ViewConfig>,
    loading_req_count: AtomicUsize,
    first_request_sent: AtomicBool,
    progress: watch::Sender<LoadProgress>,
}

impl<S: QueryTestVariants> TestLoader<S> {
    /// Creates a new loader for the query described by `request`.
    ///
    /// The invocations and predicate in `request` are fixed for the lifetime
    /// of the loader. If `request` doesn't set a page size, the one from
    /// `config` is used.
    pub fn new(mut request: QueryTestVariantsRequest, service: S, config: &LoaderConfig) -> Self {
        request.page_token.clear();
        // Zero is the protobuf default, and means the same as unset.
        if request.page_size.is_none_or(|page_size| page_size == 0) {
            request.page_size = Some(config.page_size().get());
        }

        Self {
            request,
            service,
            fetch_timeout: config.fetch_timeout(),
            queue: watch::Sender::new(LoadQueue::default()),
            cursor: tokio::sync::Mutex::new(PageCursor::Next(String::new())),
            state: Mutex::new(LoaderState::default()),
            view: RwLock::new(ViewConfig::new(config)),
            loading_req_count: AtomicUsize::new(0),
            first_request_sent: AtomicBool::new(false),
            progress: watch::Sender::new(LoadProgress::default()),
        }
    }

    /// Creates a new loader for every test variant in a single invocation.
    pub fn for_invocation(invocation_id: &str, service: S, config: &LoaderConfig) -> Self {
        Self::new(
            QueryTestVariantsRequest::new([invocation_name(invocation_id)]),
            service,
            config,
        )
    }

    /// Loads more test variants.
    ///
    /// With `until_status` unset, this loads pages until at least one new
    /// visible test variant has arrived. With `until_status` set, this also
    /// keeps loading until every test variant with that status (and every
    /// worse status) has been loaded. Either way, loading stops at the last
    /// page.
    ///
    /// The load is queued when this method is called, not when the future is
    /// first polled: [`first_request_sent`](Self::first_request_sent) and
    /// [`is_loading`](Self::is_loading) change immediately, and the load runs
    /// only after every load queued before it has finished or been dropped.
    /// If every page has already been loaded, the returned future completes
    /// without fetching anything.
    ///
    /// Dropping the future cancels the load. A page is applied all at once
    /// after its response arrives, so a cancelled or failed fetch leaves the
    /// loader as it was, and the next call retries the same page.
    pub fn load_next_test_variants(
        &self,
        until_status: Option<TestVariantStatus>,
    ) -> impl Future<Output = Result<(), LoadTestVariantsError>> + '_ {
        self.first_request_sent.store(true, Ordering::SeqCst);
        let guard = (!self.loaded_all_variants()).then(|| InFlightGuard::new(self));
        self.publish_progress();

        async move {
            let Some(guard) = guard else {
                return Ok(());
            };
            let mut turns = self.queue.subscribe();
            // The sender lives as long as `self`, so this can't fail.
            let _ = turns
                .wait_for(|queue| queue.serving == guard.ticket)
                .await;
            let mut cursor = self.cursor.lock().await;
            self.load_until(&mut cursor, until_status).await
        }
    }

    async fn load_until(
        &self,
        cursor: &mut PageCursor,
        until_status: Option<TestVariantStatus>,
    ) -> Result<(), LoadTestVariantsError> {
        let before_count = self.test_variant_count();
        let until_stage = until_status.map(LoadingStage::for_status);
        let mut pages = 0;

        loop {
            self.load_next_page(cursor).await?;
            pages += 1;

            let stage = self.stage();
            let needs_more_variants = !stage.is_done() && self.test_variant_count() == before_count;
            let needs_later_stage = until_stage.is_some_and(|until| stage < until);
            if !needs_more_variants && !needs_later_stage {
                break;
            }
        }

        // The loop above only guarantees progress on the count. If the last
        // page was the final full page of non-expected test variants, nothing
        // expected has arrived yet, so load one more page.
        let no_expected_yet = self
            .lock_state()
            .bucket(TestVariantStatus::Expected)
            .is_empty();
        if until_status == Some(TestVariantStatus::Expected) && no_expected_yet {
            self.load_next_page(cursor).await?;
            pages += 1;
        }

        debug!(
            "load finished after {pages} {}, stage is now {}",
            plural::pages_str(pages),
            self.stage(),
        );
        Ok(())
    }

    async fn load_next_page(&self, cursor: &mut PageCursor) -> Result<(), LoadTestVariantsError> {
        let PageCursor::Next(page_token) = &*cursor else {
            return Ok(());
        };

        let request = self.request.with_page_token(page_token.as_str());
        debug!(page_token = %request.page_token, "requesting page of test variants");

        let response = match self.fetch(&request).await {
            Ok(response) => response,
            Err(kind) => {
                let error = LoadTestVariantsError::new(request, kind);
                warn!("{}", DisplayErrorChain::new(&error));
                return Err(error);
            }
        };

        let next_page_token = response.next_page_token().map(str::to_owned);
        let has_next_page = next_page_token.is_some();
        *cursor = match next_page_token {
            Some(token) => PageCursor::Next(token),
            None => PageCursor::End,
        };

        self.lock_state().apply_page(
            response.test_variants,
            has_next_page,
            self.request.effective_page_size(),
        );
        self.publish_progress();
        Ok(())
    }

    async fn fetch(
        &self,
        request: &QueryTestVariantsRequest,
    ) -> Result<QueryTestVariantsResponse, LoadTestVariantsErrorKind> {
        let fut = self.service.query_test_variants(request);
        let result = match self.fetch_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| LoadTestVariantsErrorKind::TimedOut { timeout })?,
            None => fut.await,
        };
        result.map_err(|error| LoadTestVariantsErrorKind::Service(Box::new(error)))
    }
}

impl<S> TestLoader<S> {
    /// Returns the request used for the first page.
    pub fn request(&self) -> &QueryTestVariantsRequest {
        &self.request
    }

    /// Subscribes to progress updates.
    pub fn subscribe(&self) -> watch::Receiver<LoadProgress> {
        self.progress.subscribe()
    }

    /// Returns the current progress.
    pub fn progress(&self) -> LoadProgress {
        self.compute_progress()
    }

    // ---
    // Loading flags
    // ---

    /// Returns the current loading stage.
    pub fn stage(&self) -> LoadingStage {
        self.lock_state().stage()
    }

    /// True while a load is queued or running and there are more pages to
    /// load.
    pub fn is_loading(&self) -> bool {
        !self.loaded_all_variants() && self.loading_req_count.load(Ordering::SeqCst) != 0
    }

    /// True once a load has been requested.
    pub fn first_request_sent(&self) -> bool {
        self.first_request_sent.load(Ordering::SeqCst)
    }

    /// True once every page has been loaded.
    pub fn loaded_all_variants(&self) -> bool {
        self.stage().is_done()
    }

    /// True once every test variant with `status` has been loaded.
    pub fn loaded_all(&self, status: TestVariantStatus) -> bool {
        self.stage().has_loaded_all(status)
    }

    /// True once every unexpected test variant has been loaded.
    pub fn loaded_all_unexpected_variants(&self) -> bool {
        self.loaded_all(TestVariantStatus::Unexpected)
    }

    /// True once every unexpectedly skipped test variant has been loaded.
    pub fn loaded_all_unexpectedly_skipped_variants(&self) -> bool {
        self.loaded_all(TestVariantStatus::UnexpectedlySkipped)
    }

    /// True once every flaky test variant has been loaded.
    pub fn loaded_all_flaky_variants(&self) -> bool {
        self.loaded_all(TestVariantStatus::Flaky)
    }

    /// True once every exonerated test variant has been loaded.
    pub fn loaded_all_exonerated_variants(&self) -> bool {
        self.loaded_all(TestVariantStatus::Exonerated)
    }

    /// True once every expected test variant has been loaded.
    pub fn loaded_all_expected_variants(&self) -> bool {
        self.loaded_all(TestVariantStatus::Expected)
    }

    /// True once the first unexpected test variant has arrived, or it's known
    /// that there are none.
    pub fn first_page_loaded(&self) -> bool {
        self.lock_state().first_page_loaded()
    }

    /// True if it's known that there are no non-expected test variants.
    ///
    /// This is false while that is still unknown, even if nothing has
    /// arrived yet.
    pub fn first_page_is_empty(&self) -> bool {
        self.lock_state().first_page_is_empty()
    }

    // ---
    // Counts and buckets
    // ---

    /// The number of test variants received, regardless of filter or status.
    pub fn unfiltered_test_variant_count(&self) -> usize {
        self.lock_state().unfiltered_count()
    }

    /// The number of visible test variants across all status buckets.
    pub fn test_variant_count(&self) -> usize {
        let buckets: Vec<_> = self
            .lock_state()
            .status_buckets()
            .map(<[_]>::to_vec)
            .collect();
        let view = self.view();
        buckets
            .iter()
            .map(|bucket| view.count_visible(bucket))
            .sum()
    }

    /// Returns the visible test variants with `status`, in arrival order.
    pub fn test_variants(&self, status: TestVariantStatus) -> Vec<Arc<TestVariant>> {
        let bucket = self.lock_state().bucket(status).to_vec();
        self.view().filtered(&bucket)
    }

    /// Returns the visible unexpected test variants, in arrival order.
    pub fn unexpected_test_variants(&self) -> Vec<Arc<TestVariant>> {
        self.test_variants(TestVariantStatus::Unexpected)
    }

    /// Returns the visible unexpectedly skipped test variants, in arrival
    /// order.
    pub fn unexpectedly_skipped_test_variants(&self) -> Vec<Arc<TestVariant>> {
        self.test_variants(TestVariantStatus::UnexpectedlySkipped)
    }

    /// Returns the visible flaky test variants, in arrival order.
    pub fn flaky_test_variants(&self) -> Vec<Arc<TestVariant>> {
        self.test_variants(TestVariantStatus::Flaky)
    }

    /// Returns the visible exonerated test variants, in arrival order.
    pub fn exonerated_test_variants(&self) -> Vec<Arc<TestVariant>> {
        self.test_variants(TestVariantStatus::Exonerated)
    }

    /// Returns the visible expected test variants, in arrival order.
    pub fn expected_test_variants(&self) -> Vec<Arc<TestVariant>> {
        self.test_variants(TestVariantStatus::Expected)
    }

    /// Returns the visible test variants of every status except expected, in
    /// arrival order.
    pub fn non_expected_test_variants(&self) -> Vec<Arc<TestVariant>> {
        let bucket = self.lock_state().non_expected().to_vec();
        self.view().filtered(&bucket)
    }

    /// Returns the visible non-expected test variants, grouped by the
    /// grouping keys and sorted within each group.
    ///
    /// Expected test variants are never grouped; see
    /// [`sorted_expected_variants`](Self::sorted_expected_variants).
    pub fn grouped_non_expected_variants(&self) -> Vec<Vec<Arc<TestVariant>>> {
        let bucket = self.lock_state().non_expected().to_vec();
        self.view().grouped(&bucket)
    }

    /// Returns the visible expected test variants, sorted by the sorting
    /// keys.
    pub fn sorted_expected_variants(&self) -> Vec<Arc<TestVariant>> {
        let bucket = self
            .lock_state()
            .bucket(TestVariantStatus::Expected)
            .to_vec();
        self.view().sorted(&bucket)
    }

    // ---
    // View configuration
    // ---

    /// Shows only test variants matching `filter`. Replaces any search
    /// query.
    pub fn set_filter(&self, filter: impl Fn(&TestVariant) -> bool + Send + Sync + 'static) {
        let filter: TestVariantFilter = Arc::new(filter);
        self.write_view().set_filter(filter);
    }

    /// Shows only test variants matching a search query, such as
    /// `STATUS:unexpected,flaky -V:os=mac`. An empty query shows everything.
    ///
    /// On a parse error the current filter is left in place.
    pub fn set_search_query(&self, input: &str) -> Result<(), SearchQueryParseErrors> {
        let query = SearchQuery::parse(input)?;
        self.write_view().set_search_query(query);
        Ok(())
    }

    /// Returns the active search query, if the filter was set from one.
    pub fn search_query(&self) -> Option<SearchQuery> {
        self.read_view().search_query().cloned()
    }

    /// Shows every test variant.
    pub fn clear_filter(&self) {
        self.write_view().clear_filter();
    }

    /// Returns the sorting keys.
    pub fn sorting_keys(&self) -> SortingKeys {
        self.read_view().sorting_keys().clone()
    }

    /// Replaces the sorting keys.
    pub fn set_sorting_keys(&self, sorting_keys: SortingKeys) {
        self.write_view().set_sorting_keys(sorting_keys);
    }

    /// Returns the grouping keys.
    pub fn grouping_keys(&self) -> GroupingKeys {
        self.read_view().grouping_keys().clone()
    }

    /// Replaces the grouping keys.
    pub fn set_grouping_keys(&self, grouping_keys: GroupingKeys) {
        self.write_view().set_grouping_keys(grouping_keys);
    }

    // ---
    // Helpers
    // ---

    // None of the critical sections below can panic partway through an
    // update, so a poisoned lock still guards consistent data.
    fn lock_state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Reads filter a copy of the view, so that a filter can call back into
    // the loader.
    fn view(&self) -> ViewConfig {
        self.read_view().clone()
    }

    fn read_view(&self) -> RwLockReadGuard<'_, ViewConfig> {
        self.view.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_view(&self) -> RwLockWriteGuard<'_, ViewConfig> {
        self.view.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn compute_progress(&self) -> LoadProgress {
        let (stage, unfiltered_test_variant_count) = {
            let state = self.lock_state();
            (state.stage(), state.unfiltered_count())
        };
        LoadProgress {
            stage,
            is_loading: !stage.is_done() && self.loading_req_count.load(Ordering::SeqCst) != 0,
            first_request_sent: self.first_request_sent(),
            unfiltered_test_variant_count,
        }
    }

    fn publish_progress(&self) {
        let progress = self.compute_progress();
        self.progress.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress;
                true
            }
        });
    }
}

impl<S> fmt::Debug for TestLoader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestLoader")
            .field("request", &self.request)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("progress", &self.compute_progress())
            .finish_non_exhaustive()
    }
}

/// The order loads run in.
///
/// Tickets are handed out in call order. A ticket whose load is dropped
/// before its turn is skipped once the turn reaches it.
#[derive(Debug, Default)]
struct LoadQueue {
    next_ticket: u64,
    serving: u64,
    abandoned: BTreeSet<u64>,
}

impl LoadQueue {
    fn take_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Releases `ticket`. Returns true if the turn moved on.
    fn release(&mut self, ticket: u64) -> bool {
        if ticket != self.serving {
            self.abandoned.insert(ticket);
            return false;
        }
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
        true
    }
}

/// Holds a load's place in the queue and counts it as in flight for as long
/// as it's alive.
///
/// Dropped when the load finishes, fails or is cancelled.
struct InFlightGuard<'a, S> {
    loader: &'a TestLoader<S>,
    ticket: u64,
}

impl<'a, S> InFlightGuard<'a, S> {
    fn new(loader: &'a TestLoader<S>) -> Self {
        let mut ticket = 0;
        // Taking a ticket doesn't change whose turn it is.
        loader.queue.send_if_modified(|queue| {
            ticket = queue.take_ticket();
            false
        });
        loader.loading_req_count.fetch_add(1, Ordering::SeqCst);
        Self { loader, ticket }
    }
}

impl<S> Drop for InFlightGuard<'_, S> {
    fn drop(&mut self) {
        let ticket = self.ticket;
        self.loader
            .queue
            .send_if_modified(|queue| queue.release(ticket));
        self.loader.loading_req_count.fetch_sub(1, Ordering::SeqCst);
        self.loader.publish_progress();
    }
}
