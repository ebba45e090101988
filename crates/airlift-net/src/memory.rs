use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One cached index response.
#[derive(Debug, Clone)]
struct Entry {
    body: Vec<u8>,
    cached_at: Instant,
    ttl: Duration,
    last_used: u64,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Bounded in-memory cache for index responses, evicting the least
/// recently used entry once the entry-count limit is reached.
///
/// Entries are immutable after insertion; a refresh replaces the entry.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<(HashMap<String, Entry>, u64)>,
    capacity: usize,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new((HashMap::new(), 0)),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut guard = self.entries.lock().unwrap();
        let (map, clock) = &mut *guard;
        match map.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                *clock += 1;
                entry.last_used = *clock;
                Some(entry.body.clone())
            }
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, body: Vec<u8>, ttl: Duration) {
        let mut guard = self.entries.lock().unwrap();
        let (map, clock) = &mut *guard;
        *clock += 1;
        map.insert(
            key.to_string(),
            Entry {
                body,
                cached_at: Instant::now(),
                ttl,
                last_used: *clock,
            },
        );
        while map.len() > self.capacity {
            if let Some(lru_key) = map
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                map.remove(&lru_key);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn get_after_put() {
        let cache = MemoryCache::new(4);
        cache.put("k", b"body".to_vec(), HOUR);
        assert_eq!(cache.get("k").as_deref(), Some(b"body".as_ref()));
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = MemoryCache::new(4);
        cache.put("k", b"body".to_vec(), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        cache.put("a", b"1".to_vec(), HOUR);
        cache.put("b", b"2".to_vec(), HOUR);
        // touch "a" so "b" becomes the eviction candidate
        let _ = cache.get("a");
        cache.put("c", b"3".to_vec(), HOUR);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn refresh_replaces_entry() {
        let cache = MemoryCache::new(4);
        cache.put("k", b"old".to_vec(), HOUR);
        cache.put("k", b"new".to_vec(), HOUR);
        assert_eq!(cache.get("k").as_deref(), Some(b"new".as_ref()));
        assert_eq!(cache.len(), 1);
    }
}
