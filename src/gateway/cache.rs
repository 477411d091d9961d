//! Bounded LRU cache of service providers.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;

use crate::discovery::ServiceProvider;
use crate::observability::metrics::{record_cache_event, CacheEvent};

/// Service name → provider, evicting the least recently used entry when full.
///
/// The mutex is only held for map operations; providers are built outside it.
pub struct ProviderCache {
    inner: Mutex<LruCache<String, Arc<dyn ServiceProvider>>>,
}

impl ProviderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached provider, promoted to most recently used.
    pub fn get(&self, service: &str) -> Option<Arc<dyn ServiceProvider>> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(service).cloned()
    }

    /// Insert unconditionally, replacing any previous entry.
    pub fn insert(&self, service: &str, provider: Arc<dyn ServiceProvider>) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::put(&mut cache, service, provider);
    }

    /// Insert `built` unless another caller already cached a provider that
    /// `keep` accepts; returns whichever provider ends up cached.
    pub fn insert_or_reuse(
        &self,
        service: &str,
        built: Arc<dyn ServiceProvider>,
        keep: impl Fn(&Arc<dyn ServiceProvider>) -> bool,
    ) -> Arc<dyn ServiceProvider> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cache.get(service) {
            if keep(existing) {
                return Arc::clone(existing);
            }
        }
        Self::put(&mut cache, service, Arc::clone(&built));
        built
    }

    pub fn remove(&self, service: &str) -> Option<Arc<dyn ServiceProvider>> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.pop(service)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).cap().get()
    }

    fn put(
        cache: &mut LruCache<String, Arc<dyn ServiceProvider>>,
        service: &str,
        provider: Arc<dyn ServiceProvider>,
    ) {
        if let Some((evicted, _)) = cache.push(service.to_string(), provider) {
            if evicted != service {
                record_cache_event(CacheEvent::Evict);
                tracing::debug!(service = %evicted, "Provider evicted from cache");
            }
        }
    }
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
