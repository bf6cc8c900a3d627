//! Memoized, single-flight connection establishment keyed by address.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::utils::PipelineResult;

/// Opens a connection to an address.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Connection: Clone + Send + Sync + 'static;

    async fn dial(&self, address: &str) -> PipelineResult<Self::Connection>;
}

type PendingDial<C> = Shared<BoxFuture<'static, PipelineResult<C>>>;

struct CacheState<C> {
    ready: HashMap<String, C>,
    inflight: HashMap<String, PendingDial<C>>,
}

/// Connections cached for the life of the cache, one dial per address.
///
/// Concurrent first callers for an address share a single in-flight dial and
/// all observe its result. A failed dial is handed to its waiters and then
/// forgotten, so the next call dials again.
pub struct ConnectionCache<D: Dialer> {
    dialer: Arc<D>,
    state: Mutex<CacheState<D::Connection>>,
}

impl<D: Dialer> ConnectionCache<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer: Arc::new(dialer),
            state: Mutex::new(CacheState {
                ready: HashMap::new(),
                inflight: HashMap::new(),
            }),
        }
    }

    pub async fn get(&self, address: &str) -> PipelineResult<D::Connection> {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(conn) = state.ready.get(address) {
                return Ok(conn.clone());
            }
            match state.inflight.get(address) {
                Some(pending) => pending.clone(),
                None => {
                    debug!("Dialing {}", address);
                    let dialer = Arc::clone(&self.dialer);
                    let target = address.to_string();
                    let pending = async move { dialer.dial(&target).await }.boxed().shared();
                    state.inflight.insert(address.to_string(), pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let owns_entry = state
            .inflight
            .get(address)
            .is_some_and(|current| current.ptr_eq(&pending));
        if owns_entry {
            state.inflight.remove(address);
            match &result {
                Ok(conn) => {
                    state.ready.insert(address.to_string(), conn.clone());
                }
                Err(e) => warn!("Dial to {} failed: {}", address, e),
            }
        }
        result
    }

    /// Whether a ready connection is cached for `address`
    pub fn is_cached(&self, address: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready
            .contains_key(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::PipelineError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hands out increasing ids; the first `failures` dials fail.
    struct CountingDialer {
        dials: Arc<AtomicUsize>,
        failures: usize,
    }

    #[async_trait]
    impl Dialer for CountingDialer {
        type Connection = usize;

        async fn dial(&self, address: &str) -> PipelineResult<usize> {
            let attempt = self.dials.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if attempt < self.failures {
                return Err(PipelineError::backend(format!("refused: {}", address)));
            }
            Ok(attempt)
        }
    }

    fn cache(failures: usize) -> (Arc<ConnectionCache<CountingDialer>>, Arc<AtomicUsize>) {
        let dials = Arc::new(AtomicUsize::new(0));
        let dialer = CountingDialer { dials: Arc::clone(&dials), failures };
        (Arc::new(ConnectionCache::new(dialer)), dials)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_dial_once() {
        let (cache, dials) = cache(0);
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get("10.0.0.1:9000").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(0));
        }
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert!(cache.is_cached("10.0.0.1:9000"));

        assert_eq!(cache.get("10.0.0.1:9000").await, Ok(0));
        assert_eq!(dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn addresses_are_dialed_independently() {
        let (cache, dials) = cache(0);
        let (a, b) = futures::join!(cache.get("a:1"), cache.get("b:1"));
        assert_ne!(a.unwrap(), b.unwrap());
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_shared_but_not_cached() {
        let (cache, dials) = cache(1);
        let (first, second) = futures::join!(cache.get("a:1"), cache.get("a:1"));
        assert!(matches!(first, Err(PipelineError::Backend(_))));
        assert_eq!(first, second);
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert!(!cache.is_cached("a:1"));

        assert_eq!(cache.get("a:1").await, Ok(1));
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }
}
