//! Crawl engine — frontier state machine and worker pool.
//!
//! A bounded pool of workers drains the frontier. Each worker leases one
//! request, checks out a session, fetches, and routes the page by kind:
//! listings admit new profile candidates (bounded by the remaining quota)
//! and enqueue their next page; details run the extraction pipeline and
//! emit records. Retryable failures re-enter the frontier with backoff and
//! a penalized session; meeting the quota cancels all queued work
//! cooperatively. Only dataset failures abort the run.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use scraper::Html;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use agencyscout_extract::{self as extract, MergeContext, MergeError};
use agencyscout_shared::{
    CrawlConfig, CrawlRequest, PageKind, Result, RunSnapshot, ScoutError, ScrapeProgress, norm,
};
use agencyscout_storage::Dataset;

use crate::fetch::{self, FetchFailure, RawPage};
use crate::frontier::{Frontier, Visited, VisitedKind};
use crate::session::{SessionHandle, SessionPool};

/// Exponential backoff for retryable failures, capped at ten seconds.
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 10_000;

/// Process-wide counters for one run. Mutated only by the engine.
#[derive(Default)]
pub struct RunStats {
    saved: AtomicUsize,
    list_pages: AtomicUsize,
    detail_pages: AtomicUsize,
    blocked: AtomicUsize,
    failed: AtomicUsize,
}

impl RunStats {
    fn saved(&self) -> usize {
        self.saved.load(Ordering::Relaxed)
    }

    fn add_saved(&self) -> usize {
        self.saved.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn add_list_page(&self) {
        self.list_pages.fetch_add(1, Ordering::Relaxed);
    }

    fn add_detail_page(&self) {
        self.detail_pages.fetch_add(1, Ordering::Relaxed);
    }

    fn add_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            saved: self.saved.load(Ordering::Relaxed),
            list_pages: self.list_pages.load(Ordering::Relaxed),
            detail_pages: self.detail_pages.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of handling a fetched page, fed back to the session pool.
enum SessionVerdict {
    Good,
    Bad,
}

/// The crawl orchestrator. Construct once per run.
pub struct Engine {
    config: CrawlConfig,
    client: Client,
    sessions: SessionPool,
    frontier: Frontier,
    visited: Visited,
    stats: RunStats,
    cancel: CancellationToken,
    dataset: Dataset,
    progress: Arc<dyn ScrapeProgress>,
    source: String,
}

impl Engine {
    pub fn new(
        config: CrawlConfig,
        dataset: Dataset,
        progress: Arc<dyn ScrapeProgress>,
    ) -> Result<Self> {
        let client = fetch::build_client().map_err(|e| ScoutError::Network(e.to_string()))?;
        let sessions = SessionPool::new(config.sessions);
        let source = config.source_host();

        Ok(Self {
            config,
            client,
            sessions,
            frontier: Frontier::new(),
            visited: Visited::new(),
            stats: RunStats::default(),
            cancel: CancellationToken::new(),
            dataset,
            progress,
            source,
        })
    }

    /// Run the crawl to completion: frontier drained, quota met, or
    /// page-depth ceiling reached on every branch, whichever comes first.
    pub async fn run(self: Arc<Self>) -> Result<RunSnapshot> {
        for url in self.config.start_urls() {
            let Some(key) = norm::listing_key(url.as_str()) else {
                tracing::warn!(%url, "unparsable start URL, skipping");
                self.stats.add_failed();
                continue;
            };
            if self.visited.admit(VisitedKind::Listing, &key) {
                self.frontier
                    .push(CrawlRequest::listing(url, 1, None), Duration::ZERO);
            }
        }

        tracing::info!(
            workers = self.config.concurrency,
            seeds = self.frontier.len(),
            "starting crawl"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.concurrency {
            let engine = Arc::clone(&self);
            workers.spawn(async move { engine.worker(worker_id).await });
        }

        let mut failure: Option<ScoutError> = None;
        while let Some(joined) = workers.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(ScoutError::validation(format!("worker task failed: {e}"))),
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "worker aborted the run");
                self.cancel.cancel();
                self.frontier.clear();
                failure.get_or_insert(e);
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            saved = snapshot.saved,
            list_pages = snapshot.list_pages,
            detail_pages = snapshot.detail_pages,
            blocked = snapshot.blocked,
            failed = snapshot.failed,
            "crawl finished"
        );
        self.progress.done(&snapshot);
        Ok(snapshot)
    }

    async fn worker(&self, worker_id: usize) -> Result<()> {
        while let Some(lease) = self.frontier.next().await {
            // Leftovers leased between cancellation and the queue clear are
            // discarded without work.
            if self.cancel.is_cancelled() {
                continue;
            }
            let request = lease.request().clone();
            tracing::debug!(worker = worker_id, url = %request.url, kind = %request.kind, "processing");
            self.handle(&request).await?;
        }
        Ok(())
    }

    async fn handle(&self, request: &CrawlRequest) -> Result<()> {
        if request.kind == PageKind::Detail && self.quota_met() {
            tracing::debug!(url = %request.url, "quota already met, skipping detail fetch");
            return Ok(());
        }

        self.politeness_delay().await;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let session = self.sessions.acquire();
        let fetched = fetch::fetch_page(
            &self.client,
            request,
            &session,
            self.config.request_timeout,
            self.config.min_body_bytes,
        )
        .await;

        match fetched {
            Ok(page) => {
                let verdict = match request.kind {
                    PageKind::Listing => self.process_listing(request, &page).await?,
                    PageKind::Detail => self.process_detail(request, &page).await?,
                };
                match verdict {
                    SessionVerdict::Good => self.sessions.mark_good(&session),
                    SessionVerdict::Bad => self.sessions.mark_bad(&session),
                }
                self.progress
                    .page_processed(request.kind, request.url.as_str(), &self.stats.snapshot());
            }
            Err(failure) => self.on_fetch_failure(request, &session, failure),
        }
        Ok(())
    }

    /// Listing pages: admit profile candidates up to the remaining quota,
    /// then advance the branch below its depth ceiling.
    async fn process_listing(
        &self,
        request: &CrawlRequest,
        page: &RawPage,
    ) -> Result<SessionVerdict> {
        // Confine the (non-Send) parsed document to a synchronous scope so it
        // is dropped before any await below, keeping the worker future Send.
        let (candidates, next_page) = {
            let doc = Html::parse_document(&page.body);
            let candidates = extract::discover_profile_candidates(&doc, &page.body, &request.url);
            let next_page = extract::resolve_next(&doc, &request.url, request.page_no);
            (candidates, next_page)
        };
        tracing::info!(
            url = %request.url,
            page = request.page_no,
            candidates = candidates.len(),
            "listing processed"
        );

        let remaining = self.config.results_wanted.saturating_sub(self.stats.saved());
        if remaining == 0 {
            tracing::debug!(url = %request.url, "result quota reached, not admitting candidates");
        } else if self.config.collect_details {
            let mut admitted = 0usize;
            for candidate in &candidates {
                if admitted >= remaining || self.cancel.is_cancelled() {
                    break;
                }
                let Some(key) = norm::profile_key(candidate.as_str()) else {
                    continue;
                };
                if !self.visited.admit(VisitedKind::Detail, &key) {
                    continue;
                }
                self.frontier.push(
                    CrawlRequest::detail(candidate.clone(), request.url.as_str()),
                    Duration::ZERO,
                );
                admitted += 1;
            }
            if admitted > 0 {
                tracing::info!(admitted, "enqueued detail pages");
            }
        } else {
            for candidate in &candidates {
                if self.quota_met() {
                    break;
                }
                let Some(key) = norm::profile_key(candidate.as_str()) else {
                    continue;
                };
                if !self.visited.admit(VisitedKind::PushedLink, &key) {
                    continue;
                }
                self.dataset
                    .insert_listing_link(
                        candidate.as_str(),
                        &self.source,
                        self.config.category.as_deref(),
                        self.config.location.as_deref(),
                    )
                    .await?;
                let saved = self.stats.add_saved();
                if saved >= self.config.results_wanted {
                    self.abort_outstanding();
                    break;
                }
            }
        }

        if request.page_no >= self.config.max_pages {
            tracing::debug!(
                url = %request.url,
                max_pages = self.config.max_pages,
                "page-depth ceiling reached, stopping branch"
            );
        } else if !self.cancel.is_cancelled() {
            match next_page {
                Some(next) => {
                    if let Some(key) = norm::listing_key(next.as_str()) {
                        if self.visited.admit(VisitedKind::Listing, &key) {
                            tracing::debug!(next = %next, "enqueued next listing page");
                            self.frontier.push(
                                CrawlRequest::listing(
                                    next,
                                    request.page_no + 1,
                                    Some(request.url.to_string()),
                                ),
                                Duration::ZERO,
                            );
                        }
                    }
                }
                None => tracing::debug!(url = %request.url, "no next page, branch complete"),
            }
        }

        self.stats.add_list_page();
        Ok(SessionVerdict::Good)
    }

    /// Detail pages: run the three extractors and the merge; emit on
    /// success. A nameless page is a permanent per-URL failure and a bad
    /// sign for the serving session.
    async fn process_detail(
        &self,
        request: &CrawlRequest,
        page: &RawPage,
    ) -> Result<SessionVerdict> {
        if self.quota_met() {
            tracing::debug!(url = %request.url, "quota met after fetch, discarding detail page");
            return Ok(SessionVerdict::Good);
        }

        // Confine the (non-Send) parsed document to a synchronous scope so it
        // is dropped before the insert await below, keeping the worker Send.
        let (structured, dom) = {
            let doc = Html::parse_document(&page.body);
            (
                extract::sources::schema_org::extract(&doc),
                extract::sources::dom::extract(&doc),
            )
        };
        let state = extract::sources::embedded_state::extract(&page.body);

        let ctx = MergeContext {
            url: request.url.clone(),
            source: self.source.clone(),
            category: self.config.category.clone(),
            location: self.config.location.clone(),
        };

        self.stats.add_detail_page();
        match extract::merge(structured, state, dom, &ctx) {
            Ok(record) => {
                self.dataset.insert_record(&record).await?;
                let saved = self.stats.add_saved();
                tracing::info!(name = %record.name, saved, "extracted agency");
                if saved >= self.config.results_wanted {
                    self.abort_outstanding();
                }
                Ok(SessionVerdict::Good)
            }
            Err(MergeError::NoName) => {
                self.stats.add_failed();
                tracing::warn!(url = %request.url, "no agency name extractable, discarding page");
                Ok(SessionVerdict::Bad)
            }
        }
    }

    fn on_fetch_failure(
        &self,
        request: &CrawlRequest,
        session: &SessionHandle,
        failure: FetchFailure,
    ) {
        // Any retryable failure penalizes the serving session so rotation
        // drifts away from blocked identities.
        self.sessions.mark_bad(session);
        if matches!(failure, FetchFailure::Blocked(_)) {
            self.stats.add_blocked();
        }

        if failure.is_retryable()
            && request.retries < self.config.max_retries
            && !self.cancel.is_cancelled()
        {
            let delay = backoff_delay(request.retries);
            tracing::warn!(
                url = %request.url,
                attempt = request.retries + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "retryable failure, requeueing"
            );
            self.frontier.push(request.retry(), delay);
        } else {
            self.stats.add_failed();
            tracing::warn!(url = %request.url, error = %failure, "permanent failure, continuing");
        }
    }

    fn quota_met(&self) -> bool {
        self.stats.saved() >= self.config.results_wanted
    }

    /// Cooperative abort: queued work is discarded, in-flight work
    /// completes but enqueues nothing further.
    fn abort_outstanding(&self) {
        tracing::info!(saved = self.stats.saved(), "result quota met, discarding outstanding work");
        self.cancel.cancel();
        self.frontier.clear();
    }

    /// Randomized pre-fetch delay against request-pattern fingerprinting.
    async fn politeness_delay(&self) {
        let (min, max) = self.config.delay_ms;
        if max == 0 {
            return;
        }
        let jitter = if max > min { fastrand::u64(min..=max) } else { min };
        if jitter > 0 {
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
    }
}

fn backoff_delay(retries: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(1u64 << retries.min(8));
    Duration::from_millis(exp.min(BACKOFF_CAP_MS))
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use agencyscout_shared::{SessionLimits, SilentProgress};
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_dataset() -> Dataset {
        let tmp = std::env::temp_dir().join(format!("scout_engine_{}.db", Uuid::now_v7()));
        Dataset::open(&tmp).await.expect("open test db")
    }

    // max_pages of 1 keeps the synthetic-pagination fallback from walking
    // past the mocked listing; tests that exercise pagination raise it.
    fn test_config(start: Url, quota: usize) -> CrawlConfig {
        CrawlConfig {
            results_wanted: quota,
            max_pages: 1,
            concurrency: 1,
            collect_details: true,
            category: None,
            location: None,
            start_urls: vec![start],
            base_url: Url::parse("https://clutch.co/agencies").unwrap(),
            request_timeout: Duration::from_secs(5),
            max_retries: 2,
            min_body_bytes: 10,
            delay_ms: (0, 0),
            sessions: SessionLimits {
                max_pool_size: 5,
                max_usage_count: 3,
                max_error_score: 1,
            },
        }
    }

    async fn run_engine(config: CrawlConfig, dataset: Dataset) -> RunSnapshot {
        let engine = Engine::new(config, dataset, Arc::new(SilentProgress)).expect("engine");
        Arc::new(engine).run().await.expect("run succeeds")
    }

    fn listing_page(n_links: usize, next_href: Option<&str>) -> String {
        let mut links = String::new();
        for i in 0..n_links {
            links.push_str(&format!(
                r#"<a href="/profile/agency-{i}">Agency {i}</a>"#
            ));
        }
        let next = next_href
            .map(|href| format!(r#"<a rel="next" href="{href}">Next</a>"#))
            .unwrap_or_default();
        format!("<html><body><h2>Agencies</h2>{links}{next}</body></html>")
    }

    fn detail_page(name: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">
            {{"@type":"Organization","name":"{name}",
              "aggregateRating":{{"ratingValue":"4.5","reviewCount":"10"}}}}
            </script></head><body><h1>{name}</h1><p>About the team.</p></body></html>"#
        )
    }

    // -----------------------------------------------------------------------
    // Scenario: quota bounds detail admission and stops pagination
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn quota_caps_detail_requests_and_listing_depth() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/agencies"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(listing_page(20, Some("/agencies?page=2"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        // Quota is 15: the first 15 discovered profiles are fetched once…
        for i in 0..15 {
            Mock::given(method("GET"))
                .and(path(format!("/profile/agency-{i}")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_string(detail_page(&format!("Agency {i}"))),
                )
                .expect(1)
                .mount(&server)
                .await;
        }
        // …the remaining 5 are never admitted…
        for i in 15..20 {
            Mock::given(method("GET"))
                .and(path(format!("/profile/agency-{i}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("never")))
                .expect(0)
                .mount(&server)
                .await;
        }
        // …and page 2 is discarded once the quota is met.
        Mock::given(method("GET"))
            .and(path("/agencies"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(5, None)))
            .expect(0)
            .mount(&server)
            .await;

        let start = Url::parse(&format!("{}/agencies?page=1", server.uri())).unwrap();
        let dataset = test_dataset().await;
        let mut config = test_config(start, 15);
        config.max_pages = 25; // quota, not the ceiling, must stop this branch
        let snapshot = run_engine(config, dataset.clone()).await;

        assert_eq!(snapshot.saved, 15);
        assert_eq!(snapshot.list_pages, 1);
        assert_eq!(snapshot.detail_pages, 15);
        assert_eq!(dataset.record_count().await.unwrap(), 15);
    }

    // -----------------------------------------------------------------------
    // Scenario: 403 retries to the bound, then permanent failure
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn blocked_detail_retries_to_the_bound_then_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/agencies"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(listing_page(1, None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        // max_retries = 2 → initial attempt + 2 retries = 3 fetches.
        Mock::given(method("GET"))
            .and(path("/profile/agency-0"))
            .respond_with(ResponseTemplate::new(403))
            .expect(3)
            .mount(&server)
            .await;

        let start = Url::parse(&format!("{}/agencies", server.uri())).unwrap();
        let dataset = test_dataset().await;
        let snapshot = run_engine(test_config(start, 10), dataset.clone()).await;

        assert_eq!(snapshot.saved, 0);
        assert_eq!(snapshot.blocked, 3);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(dataset.record_count().await.unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Scenario: machine sources malformed, DOM name still yields a record
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn dom_name_rescues_malformed_machine_sources() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/agencies"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(listing_page(1, None)),
            )
            .mount(&server)
            .await;

        let broken_detail = r#"<html><head>
            <script type="application/ld+json">{not json at all</script>
            <script>window.__INITIAL_STATE__ = {oops: [};</script>
            </head><body><h1>Acme Agency</h1><p>Still a real profile.</p></body></html>"#;

        Mock::given(method("GET"))
            .and(path("/profile/agency-0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(broken_detail))
            .expect(1)
            .mount(&server)
            .await;

        let start = Url::parse(&format!("{}/agencies", server.uri())).unwrap();
        let dataset = test_dataset().await;
        let snapshot = run_engine(test_config(start, 10), dataset.clone()).await;

        assert_eq!(snapshot.saved, 1);
        let payloads = dataset.list_records().await.unwrap();
        let record: agencyscout_shared::AgencyRecord =
            serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(record.name, "Acme Agency");
        assert_eq!(record.rating, None);
        assert_eq!(record.website, None);
    }

    // -----------------------------------------------------------------------
    // Scenario: nameless pages are permanent failures, run continues
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn nameless_detail_is_discarded_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/agencies"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(listing_page(2, None)),
            )
            .mount(&server)
            .await;

        // Profile 0 has no name anywhere — exactly one fetch, no retries.
        Mock::given(method("GET"))
            .and(path("/profile/agency-0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><p>An empty shell of a page, no heading.</p></body></html>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/profile/agency-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(detail_page("Beta Works")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let start = Url::parse(&format!("{}/agencies", server.uri())).unwrap();
        let dataset = test_dataset().await;
        let snapshot = run_engine(test_config(start, 10), dataset.clone()).await;

        assert_eq!(snapshot.saved, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.detail_pages, 2);
    }

    // -----------------------------------------------------------------------
    // Scenario: link-only mode emits without detail fetches
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn link_only_mode_emits_listing_links() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/agencies"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(listing_page(4, None)),
            )
            .mount(&server)
            .await;

        // No detail fetch may ever happen in link-only mode.
        Mock::given(method("GET"))
            .and(path("/profile/agency-0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let start = Url::parse(&format!("{}/agencies", server.uri())).unwrap();
        let mut config = test_config(start, 3);
        config.collect_details = false;

        let dataset = test_dataset().await;
        let snapshot = run_engine(config, dataset.clone()).await;

        // Quota of 3 caps the 4 candidates.
        assert_eq!(snapshot.saved, 3);
        assert_eq!(snapshot.detail_pages, 0);
        assert_eq!(dataset.record_count().await.unwrap(), 3);
    }

    // -----------------------------------------------------------------------
    // Scenario: repeated raw URL forms are admitted once
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn duplicate_candidates_are_fetched_once() {
        let server = MockServer::start().await;

        let listing = r#"<html><body>
            <a href="/profile/acme">Acme</a>
            <a href="/profile/acme/">Acme again</a>
            <a href="/profile/acme?utm_source=listing">Acme tracked</a>
            <a href="/profile/acme#reviews">Acme anchored</a>
            </body></html>"#;

        Mock::given(method("GET"))
            .and(path("/agencies"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/profile/acme"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(detail_page("Acme")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let start = Url::parse(&format!("{}/agencies", server.uri())).unwrap();
        let dataset = test_dataset().await;
        let snapshot = run_engine(test_config(start, 10), dataset).await;

        assert_eq!(snapshot.saved, 1);
        assert_eq!(snapshot.detail_pages, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(10), Duration::from_millis(10_000));
    }
}
