//! Bounded fetch worker pool.
//!
//! Fetches run as tokio tasks gated by a semaphore and report back on a
//! completion channel, so the controller keeps matching finished
//! documents while others are still downloading. A pool of size 0 spawns
//! nothing; callers fetch inline through [`FetchPool::fetch_direct`].

use super::{FetchRequest, FetchedDocument, Fetcher};
use crate::errors::FetchError;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, trace};

/// Identifies a submitted fetch.
pub type FetchTicket = u64;

/// A finished fetch.
#[derive(Debug)]
pub struct FetchCompletion {
    /// The ticket returned by [`FetchPool::submit`].
    pub ticket: FetchTicket,
    /// The outcome.
    pub result: Result<FetchedDocument, FetchError>,
}

/// A bounded pool of fetch tasks.
#[derive(Debug)]
pub struct FetchPool {
    fetcher: Arc<dyn Fetcher>,
    size: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    tx: mpsc::UnboundedSender<FetchCompletion>,
    rx: mpsc::UnboundedReceiver<FetchCompletion>,
    in_flight: usize,
    next_ticket: FetchTicket,
}

impl FetchPool {
    /// Creates a pool running at most `size` fetches at once.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
            tx,
            rx,
            in_flight: 0,
            next_ticket: 0,
        }
    }

    /// Returns whether fetches run inline.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        self.size == 0
    }

    /// Returns whether another fetch may be submitted.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.size > 0 && self.in_flight < self.size
    }

    /// Number of submitted fetches whose completion was not yet taken.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Starts fetching `request` in the background.
    pub fn submit(&mut self, request: FetchRequest) -> FetchTicket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight += 1;
        let fetcher = Arc::clone(&self.fetcher);
        let semaphore = Arc::clone(&self.semaphore);
        let tx = self.tx.clone();
        trace!(ticket, location = %request.location, "fetch submitted");
        self.tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let result = fetcher.fetch(&request).await;
            let _ = tx.send(FetchCompletion { ticket, result });
        });
        ticket
    }

    /// Waits for the next fetch to finish, in completion order.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<FetchCompletion> {
        while self.tasks.try_join_next().is_some() {}
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.rx.recv().await?;
        self.in_flight -= 1;
        Some(completion)
    }

    /// Fetches `request` on the calling task, holding a pool slot.
    pub async fn fetch_direct(&self, request: &FetchRequest) -> Result<FetchedDocument, FetchError> {
        if self.is_inline() {
            return self.fetcher.fetch(request).await;
        }
        let _permit = self.semaphore.acquire().await;
        self.fetcher.fetch(request).await
    }

    /// Aborts every in-flight fetch and discards pending completions.
    pub fn shutdown(&mut self) {
        if self.in_flight > 0 {
            debug!(in_flight = self.in_flight, "aborting in-flight fetches");
        }
        self.tasks.abort_all();
        while self.rx.try_recv().is_ok() {}
        self.in_flight = 0;
    }
}

impl Drop for FetchPool {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentKind;
    use crate::testing::mocks::StaticFetcher;
    use std::time::Duration;

    fn request(location: &str) -> FetchRequest {
        FetchRequest::link(DocumentKind::Url, location)
    }

    #[tokio::test]
    async fn test_completions_arrive_in_completion_order() {
        let fetcher = StaticFetcher::new()
            .with_document("slow", "s")
            .with_delay("slow", Duration::from_millis(200))
            .with_document("fast", "f");
        let mut pool = FetchPool::new(Arc::new(fetcher), 2);

        let slow = pool.submit(request("slow"));
        let fast = pool.submit(request("fast"));
        assert!(!pool.has_capacity());
        assert_eq!(pool.in_flight(), 2);

        let first = pool.next_completion().await.unwrap();
        assert_eq!(first.ticket, fast);
        let second = pool.next_completion().await.unwrap();
        assert_eq!(second.ticket, slow);
        assert_eq!(second.result.unwrap().bytes, b"s");
        assert!(pool.next_completion().await.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let mut pool = FetchPool::new(Arc::new(StaticFetcher::new()), 1);
        pool.submit(request("missing"));
        let completion = pool.next_completion().await.unwrap();
        assert!(completion.result.is_err());
    }

    #[tokio::test]
    async fn test_inline_pool() {
        let fetcher = StaticFetcher::new().with_document("a", "x");
        let pool = FetchPool::new(Arc::new(fetcher.clone()), 0);
        assert!(pool.is_inline());
        assert!(!pool.has_capacity());
        assert_eq!(pool.fetch_direct(&request("a")).await.unwrap().bytes, b"x");
        assert_eq!(fetcher.fetch_count("a"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_discards_in_flight() {
        let fetcher = StaticFetcher::new()
            .with_document("slow", "s")
            .with_delay("slow", Duration::from_secs(30));
        let mut pool = FetchPool::new(Arc::new(fetcher), 1);
        pool.submit(request("slow"));
        pool.shutdown();
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.next_completion().await.is_none());
    }
}
