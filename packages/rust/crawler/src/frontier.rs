//! Frontier queue and visited-set bookkeeping.
//!
//! The frontier holds not-yet-resolved crawl requests, optionally delayed
//! for backoff. Workers lease requests; a lease tracks in-flight work so
//! that draining is only declared when the queue is empty *and* nothing is
//! still being processed. Dedup admission ("check-not-seen-then-insert")
//! is a single atomic operation behind one lock.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use agencyscout_shared::CrawlRequest;

/// Which dedup set a URL is admitted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitedKind {
    /// Listing pages (dedup key keeps the query — `page=N` matters).
    Listing,
    /// Detail pages fetched for full extraction.
    Detail,
    /// Profile links emitted directly without a detail fetch.
    PushedLink,
}

/// Normalized-URL sets, one per [`VisitedKind`]. Grow monotonically for
/// the lifetime of a run.
#[derive(Default)]
pub struct Visited {
    sets: Mutex<[HashSet<String>; 3]>,
}

impl Visited {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a normalized URL into the given set. Returns `false` if it
    /// was already there; check-and-insert is one atomic step.
    pub fn admit(&self, kind: VisitedKind, normalized: &str) -> bool {
        let mut sets = self.sets.lock().unwrap();
        sets[kind as usize].insert(normalized.to_string())
    }

    /// How many URLs a set has admitted so far.
    pub fn count(&self, kind: VisitedKind) -> usize {
        self.sets.lock().unwrap()[kind as usize].len()
    }
}

struct Delayed {
    request: CrawlRequest,
    ready_at: Instant,
}

struct Inner {
    queue: VecDeque<Delayed>,
    in_flight: usize,
}

/// Shared work queue drained by the worker pool.
pub struct Frontier {
    inner: Mutex<Inner>,
}

/// Dequeue poll tick. All delays in this system are politeness-scale.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl Frontier {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                in_flight: 0,
            }),
        }
    }

    /// Enqueue a request, optionally delayed for backoff.
    pub fn push(&self, request: CrawlRequest, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(Delayed {
            request,
            ready_at: Instant::now() + delay,
        });
    }

    /// Discard all queued (not yet leased) work. In-flight leases are
    /// unaffected.
    pub fn clear(&self) {
        self.inner.lock().unwrap().queue.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lease the next ready request. Resolves to `None` only once the
    /// queue is empty and no lease is outstanding — the drain condition
    /// that terminates the run.
    pub async fn next(&self) -> Option<Lease<'_>> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                let now = Instant::now();
                if let Some(pos) = inner.queue.iter().position(|d| d.ready_at <= now) {
                    let delayed = inner.queue.remove(pos).expect("position is in bounds");
                    inner.in_flight += 1;
                    return Some(Lease {
                        frontier: self,
                        request: delayed.request,
                    });
                }
                if inner.queue.is_empty() && inner.in_flight == 0 {
                    return None;
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

/// A leased request; dropping the lease releases the in-flight slot.
pub struct Lease<'a> {
    frontier: &'a Frontier,
    request: CrawlRequest,
}

impl Lease<'_> {
    pub fn request(&self) -> &CrawlRequest {
        &self.request
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut inner = self.frontier.inner.lock().unwrap();
        inner.in_flight -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyscout_shared::norm;
    use url::Url;

    fn request(url: &str) -> CrawlRequest {
        CrawlRequest::listing(Url::parse(url).unwrap(), 1, None)
    }

    #[tokio::test]
    async fn drains_when_queue_and_leases_are_done() {
        let frontier = Frontier::new();
        frontier.push(request("https://clutch.co/agencies"), Duration::ZERO);

        let lease = frontier.next().await.expect("one queued request");
        assert_eq!(lease.request().url.path(), "/agencies");
        drop(lease);

        assert!(frontier.next().await.is_none());
    }

    #[tokio::test]
    async fn in_flight_work_blocks_the_drain() {
        let frontier = std::sync::Arc::new(Frontier::new());
        frontier.push(request("https://clutch.co/agencies"), Duration::ZERO);

        let lease = frontier.next().await.expect("leased");
        // While the lease is alive, a second worker must keep waiting, not
        // conclude the run — give it a short window to (not) finish.
        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.next().await.map(|l| l.request().url.clone()) })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!waiter.is_finished(), "drain declared with a live lease");

        // The lease enqueues a follow-up, then completes.
        frontier.push(request("https://clutch.co/agencies?page=2"), Duration::ZERO);
        drop(lease);

        let followed = waiter.await.unwrap().expect("follow-up request");
        assert_eq!(followed.query(), Some("page=2"));
    }

    #[tokio::test]
    async fn delayed_requests_wait_their_turn() {
        let frontier = Frontier::new();
        frontier.push(request("https://clutch.co/agencies?page=2"), Duration::from_millis(80));
        frontier.push(request("https://clutch.co/agencies"), Duration::ZERO);

        let first = frontier.next().await.unwrap();
        assert!(first.request().url.query().is_none(), "ready request first");
        drop(first);

        let second = frontier.next().await.unwrap();
        assert_eq!(second.request().url.query(), Some("page=2"));
    }

    #[tokio::test]
    async fn clear_discards_queued_work() {
        let frontier = Frontier::new();
        frontier.push(request("https://clutch.co/agencies"), Duration::ZERO);
        frontier.push(request("https://clutch.co/agencies?page=2"), Duration::ZERO);
        frontier.clear();
        assert!(frontier.next().await.is_none());
    }

    #[test]
    fn visited_admits_each_normal_form_once() {
        let visited = Visited::new();
        let raw_forms = [
            "https://clutch.co/profile/acme",
            "https://clutch.co/profile/acme/",
            "https://clutch.co/profile/acme#reviews",
            "https://clutch.co/profile/acme?utm_source=listing",
        ];

        let mut admitted = 0;
        for raw in raw_forms {
            let key = norm::profile_key(raw).unwrap();
            if visited.admit(VisitedKind::Detail, &key) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1, "all raw forms share one normal form");
        assert_eq!(visited.count(VisitedKind::Detail), 1);
    }

    #[test]
    fn visited_sets_are_independent() {
        let visited = Visited::new();
        assert!(visited.admit(VisitedKind::Listing, "https://clutch.co/agencies"));
        assert!(visited.admit(VisitedKind::Detail, "https://clutch.co/agencies"));
        assert!(!visited.admit(VisitedKind::Listing, "https://clutch.co/agencies"));
    }
}
