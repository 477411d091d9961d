//! Path parameters and their reusable storage.
//!
//! # Design Decisions
//! - `Params` owns a buffer checked out of a [`ParamPool`] and hands it back on drop,
//!   so the buffer is released after the handler future finishes or unwinds
//! - Buffers are cleared before they re-enter the pool
//! - Static routes get an unpooled, non-allocating empty set

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// Idle buffers kept per capacity bucket.
const MAX_IDLE_PER_BUCKET: usize = 256;

/// A single named path segment captured during matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// Pool of parameter buffers keyed by capacity.
#[derive(Debug, Default)]
pub struct ParamPool {
    buckets: Mutex<HashMap<usize, Vec<Vec<Param>>>>,
}

impl ParamPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Check out an empty buffer able to hold `capacity` params without reallocating.
    pub fn acquire(self: &Arc<Self>, capacity: usize) -> Params {
        let recycled = self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&capacity)
            .and_then(Vec::pop);

        Params {
            buf: recycled.unwrap_or_else(|| Vec::with_capacity(capacity)),
            capacity,
            pool: Some(self.clone()),
        }
    }

    fn release(&self, capacity: usize, mut buf: Vec<Param>) {
        buf.clear();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(capacity).or_default();
        if bucket.len() < MAX_IDLE_PER_BUCKET {
            bucket.push(buf);
        }
    }

    /// Number of idle buffers currently held for `capacity`.
    pub fn idle(&self, capacity: usize) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&capacity)
            .map_or(0, Vec::len)
    }
}

/// Ordered parameter set passed to route handlers.
#[derive(Debug, Default)]
pub struct Params {
    buf: Vec<Param>,
    capacity: usize,
    pool: Option<Arc<ParamPool>>,
}

impl Params {
    /// Empty set that does not belong to any pool.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value of the first param named `key`, or `""`.
    pub fn by_name(&self, key: &str) -> &str {
        self.buf
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
            .unwrap_or("")
    }

    pub(crate) fn push(&mut self, key: &str, value: &str) {
        self.buf.push(Param {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Deref for Params {
    type Target = [Param];

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl Drop for Params {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(self.capacity, std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name_returns_first_match() {
        let pool = ParamPool::new();
        let mut params = pool.acquire(2);
        params.push("id", "1");
        params.push("id", "2");

        assert_eq!(params.by_name("id"), "1");
        assert_eq!(params.by_name("missing"), "");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_buffer_returns_to_pool_cleared() {
        let pool = ParamPool::new();
        {
            let mut params = pool.acquire(3);
            params.push("a", "x");
            assert_eq!(pool.idle(3), 0);
        }
        assert_eq!(pool.idle(3), 1);

        let reused = pool.acquire(3);
        assert!(reused.is_empty());
        assert_eq!(pool.idle(3), 0);
    }

    #[test]
    fn test_buffer_released_on_panic() {
        let pool = ParamPool::new();
        let cloned = pool.clone();
        let result = std::panic::catch_unwind(move || {
            let mut params = cloned.acquire(1);
            params.push("k", "v");
            panic!("handler blew up");
        });

        assert!(result.is_err());
        assert_eq!(pool.idle(1), 1);
    }

    #[test]
    fn test_empty_params_are_unpooled() {
        let params = Params::empty();
        assert!(params.is_empty());
        assert_eq!(params.by_name("anything"), "");
    }
}
