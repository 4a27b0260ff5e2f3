//! Signature Cache: bounded LRU keyed by (schema, exact call text). Shared
//! across all call-statement instances on a connection (or a pool scope) and
//! guarded by its own lock, distinct from the connection-activity lock, so a
//! cache lookup never blocks on an unrelated in-flight query. Eviction is a
//! memory policy only: in-flight holders keep their own `Arc` reference.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::signature::RoutineSignature;

type CacheKey = (String, String);

struct CacheInner {
    capacity: usize,
    map: HashMap<CacheKey, Arc<RoutineSignature>>,
    // Front = least recently used
    recency: VecDeque<CacheKey>,
}

pub struct SignatureCache {
    inner: Mutex<CacheInner>,
}

impl SignatureCache {
    /// A cache holding at most `capacity` signatures. Zero disables storage
    /// entirely (every lookup misses).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity,
                map: HashMap::new(),
                recency: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, schema: &str, call_text: &str) -> Option<Arc<RoutineSignature>> {
        let mut g = self.inner.lock();
        let key = (schema.to_string(), call_text.to_string());
        let hit = g.map.get(&key).cloned();
        if hit.is_some() {
            touch(&mut g.recency, &key);
        }
        hit
    }

    pub fn put(&self, schema: &str, call_text: &str, signature: Arc<RoutineSignature>) {
        let mut g = self.inner.lock();
        if g.capacity == 0 {
            return;
        }
        let key = (schema.to_string(), call_text.to_string());
        if g.map.insert(key.clone(), signature).is_some() {
            touch(&mut g.recency, &key);
            return;
        }
        if g.map.len() > g.capacity {
            let evicted = g.recency.pop_front();
            if let Some(evicted) = evicted {
                g.map.remove(&evicted);
                debug!(schema = %evicted.0, "evicted least-recently-used signature");
            }
        }
        g.recency.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Drop all entries; outstanding references stay valid.
    pub fn clear(&self) {
        let mut g = self.inner.lock();
        g.map.clear();
        g.recency.clear();
    }
}

fn touch(recency: &mut VecDeque<CacheKey>, key: &CacheKey) {
    if let Some(pos) = recency.iter().position(|k| k == key) {
        recency.remove(pos);
    }
    recency.push_back(key.clone());
}
