//! At most one in-flight render per cache key.
//!
//! The first caller for a key registers a shared future; later callers clone it and wait
//! on the same outcome. Registration is a single locked check-then-insert with no await
//! in between, so two tasks can never both believe they are first.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::Result;
use crate::normalize::CacheKey;
use crate::render::Artifact;

type SharedRender = Shared<BoxFuture<'static, Result<Artifact>>>;

struct InFlightRender {
    /// Distinguishes this render from a later one registered under the same key.
    id: u64,
    outcome: SharedRender,
    waiters: usize,
}

#[derive(Default)]
struct InFlightTable {
    renders: HashMap<CacheKey, InFlightRender>,
    next_id: u64,
}

impl InFlightTable {
    /// Drops the entry for `key` only if it is still render `id`.
    fn retire(&mut self, key: &CacheKey, id: u64) -> bool {
        match self.renders.get(key) {
            Some(flight) if flight.id == id => {
                self.renders.remove(key);
                true
            }
            _ => false,
        }
    }
}

/// Deduplicates concurrent renders of the same key.
///
/// A render closure that caches its own result does so before its entry here is
/// retired. Both steps happen within one poll of the render, so a cooperative caller
/// never sees them apart; on a multi-threaded runtime another thread can briefly find
/// the key both cached and in flight, and joining then yields the same artifact.
#[derive(Default)]
pub struct Coalescer {
    table: Arc<Mutex<InFlightTable>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the render of `key`, starting it with `render` if none is in flight.
    ///
    /// Every caller attached before the render settles gets the same success or failure.
    /// The in-flight entry is removed before any waiter observes the outcome, so a call
    /// made after settlement starts fresh. Dropping the returned future detaches this
    /// caller only; the render is abandoned once nobody is waiting for it.
    pub async fn get_or_render<F, Fut>(&self, key: &CacheKey, render: F) -> Result<Artifact>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact>> + Send + 'static,
    {
        let (outcome, _waiter) = self.join(key, render);
        outcome.await
    }

    fn join<F, Fut>(&self, key: &CacheKey, render: F) -> (SharedRender, Waiter)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact>> + Send + 'static,
    {
        let mut table = self.table.lock();
        if let Some(flight) = table.renders.get_mut(key) {
            flight.waiters += 1;
            trace!(key = ?key, waiters = flight.waiters, "Joined in-flight QR render");
            let joined = (flight.outcome.clone(), self.waiter(key, flight.id));
            return joined;
        }

        table.next_id += 1;
        let id = table.next_id;
        let settle_table = Arc::clone(&self.table);
        let settle_key = key.clone();
        let render = render();
        let outcome = async move {
            let result = render.await;
            settle_table.lock().retire(&settle_key, id);
            result
        }
        .boxed()
        .shared();

        table.renders.insert(
            key.clone(),
            InFlightRender {
                id,
                outcome: outcome.clone(),
                waiters: 1,
            },
        );
        trace!(key = ?key, "Started QR render");
        (outcome, self.waiter(key, id))
    }

    fn waiter(&self, key: &CacheKey, id: u64) -> Waiter {
        Waiter {
            table: Arc::clone(&self.table),
            key: key.clone(),
            id,
        }
    }

    /// Number of renders currently in flight.
    pub fn in_flight(&self) -> usize {
        self.table.lock().renders.len()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.table.lock().renders.contains_key(key)
    }

    /// Forgets every in-flight render. Current waiters still receive their outcomes;
    /// new callers start fresh renders.
    pub fn abandon_all(&self) -> usize {
        let mut table = self.table.lock();
        let abandoned = table.renders.len();
        table.renders.clear();
        abandoned
    }
}

/// One caller's attachment to an in-flight render.
struct Waiter {
    table: Arc<Mutex<InFlightTable>>,
    key: CacheKey,
    id: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        let remaining = match table.renders.get_mut(&self.key) {
            Some(flight) if flight.id == self.id => {
                flight.waiters -= 1;
                flight.waiters
            }
            // Already settled or abandoned
            _ => return,
        };
        if remaining == 0 && table.retire(&self.key, self.id) {
            debug!(key = ?self.key, "Abandoned QR render with no remaining waiters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeBounds;
    use crate::error::QrError;
    use crate::normalize::normalize;
    use crate::request::GenerationRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(value: &str) -> CacheKey {
        normalize(&GenerationRequest::new(value, 300), &SizeBounds::default()).unwrap().0
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        result: Result<Artifact>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Artifact>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_render() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("a");
        let artifact = Artifact::from_data_uri("data:image/png;base64,AAAA");

        let results = futures::future::join_all(
            (0..5).map(|_| coalescer.get_or_render(&k, counted(&calls, Ok(artifact.clone())))),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_ref() == Ok(&artifact)));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("a");
        let failure = QrError::EncodingFailure("too long".into());

        let (a, b) = tokio::join!(
            coalescer.get_or_render(&k, counted(&calls, Err(failure.clone()))),
            coalescer.get_or_render(&k, counted(&calls, Err(failure.clone()))),
        );
        assert_eq!(a, Err(failure.clone()));
        assert_eq!(b, Err(failure));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coalescer.is_in_flight(&k));
    }

    #[tokio::test]
    async fn test_settled_render_is_not_reused() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("a");
        let artifact = Artifact::from_data_uri("data:image/png;base64,AAAA");

        coalescer.get_or_render(&k, counted(&calls, Ok(artifact.clone()))).await.unwrap();
        coalescer.get_or_render(&k, counted(&calls, Ok(artifact))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_render_independently() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let artifact = Artifact::from_data_uri("data:image/png;base64,AAAA");
        let (ka, kb) = (key("a"), key("b"));

        let (a, b) = tokio::join!(
            coalescer.get_or_render(&ka, counted(&calls, Ok(artifact.clone()))),
            coalescer.get_or_render(&kb, counted(&calls, Ok(artifact.clone()))),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_abort_others() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("a");
        let artifact = Artifact::from_data_uri("data:image/png;base64,AAAA");

        let mut first = Box::pin(coalescer.get_or_render(&k, counted(&calls, Ok(artifact.clone()))));
        let mut second = Box::pin(coalescer.get_or_render(&k, counted(&calls, Ok(artifact.clone()))));

        // Both attach, then the first caller gives up
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(futures::poll!(second.as_mut()).is_pending());
        drop(first);
        assert!(coalescer.is_in_flight(&k));

        assert_eq!(second.await, Ok(artifact));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_waiter_leaving_abandons_render() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("a");
        let artifact = Artifact::from_data_uri("data:image/png;base64,AAAA");

        let mut only = Box::pin(coalescer.get_or_render(&k, counted(&calls, Ok(artifact.clone()))));
        assert!(futures::poll!(only.as_mut()).is_pending());
        drop(only);
        assert!(!coalescer.is_in_flight(&k));

        assert_eq!(coalescer.get_or_render(&k, counted(&calls, Ok(artifact.clone()))).await, Ok(artifact));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
