//! # TTL Cache
//! Generic time-boxed key→value store shared by the learning pipeline
//! (topic results, 1h) and the LLM handle (response cache).
//!
//! An expired entry is indistinguishable from a missing one: `get`
//! drops it on read, and `evict_expired` sweeps the rest. Callers never
//! observe a value older than the TTL.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace. The entry's clock starts now.
    pub fn put(&self, key: K, value: V) {
        let mut map = self.inner.lock().expect("cache mutex poisoned");
        map.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Fresh hit → clone of the value. Expired or absent → `None`;
    /// an expired entry is removed so a later sweep has less to do.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut map = self.inner.lock().expect("cache mutex poisoned");
        match map.get(key) {
            Some(e) if e.stored_at.elapsed() < self.ttl => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Drop every entry past its TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut map = self.inner.lock().expect("cache mutex poisoned");
        let before = map.len();
        map.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        before - map.len()
    }

    pub fn clear(&self) {
        self.inner.lock().expect("cache mutex poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
