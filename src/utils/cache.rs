use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Best-effort keyed cache. Implementations may drop entries at any time.
pub trait ResponseCache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: &str, value: V, ttl: Duration);
    fn expire(&self, key: &str);
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Process-local TTL map. Not shared across instances.
#[derive(Debug)]
pub struct InMemoryTtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> InMemoryTtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> Default for InMemoryTtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> ResponseCache<V> for InMemoryTtlCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.entries.lock().ok()?;
        let now = Instant::now();
        match guard.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        if let Ok(mut guard) = self.entries.lock() {
            let now = Instant::now();
            guard.retain(|_, entry| entry.expires_at > now);
            guard.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: now + ttl,
                },
            );
        }
    }

    fn expire(&self, key: &str) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.remove(key);
        }
    }
}
