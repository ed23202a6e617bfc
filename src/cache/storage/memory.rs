//! Bounded in-process store with least-recently-used eviction.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

struct Item {
    value: String,
    expires_at: Instant,
}

/// In-memory key/value store holding at most `capacity` items.
///
/// Each item carries its own expiry deadline; an expired item is dropped the
/// first time it is touched. Inserting into a full store evicts the least
/// recently read or written item.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Item>>,
}

impl MemoryStore {
    /// Creates a store for `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(item) if item.expires_at > now => return Some(item.value.clone()),
            Some(_) => {}
            None => return None,
        }
        trace!(key, "expired in-process entry");
        entries.pop(key);
        None
    }

    pub fn set(&self, key: &str, value: String, ttl_secs: u64) {
        let item = Item {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        if let Some((evicted, _)) = self.entries.lock().push(key.to_owned(), item) {
            if evicted != key {
                trace!(key = %evicted, "evicted least recently used entry");
            }
        }
    }

    /// Removes `key`, returning how many live items were removed (0 or 1).
    pub fn delete(&self, key: &str) -> usize {
        let now = Instant::now();
        match self.entries.lock().pop(key) {
            Some(item) if item.expires_at > now => 1,
            _ => 0,
        }
    }

    /// Removes every key matching the glob `pattern`, returning how many live
    /// items were removed. Matching expired items are dropped uncounted.
    pub fn flush(&self, pattern: &str) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let keys: Vec<String> = entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| entries.pop(key))
            .filter(|item| item.expires_at > now)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Redis-style glob matching: `*` (any run), `?` (one char) and `\` escapes.
///
/// Character classes (`[abc]`) are matched literally.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` and the text index it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
            continue;
        }
        if pi < p.len() {
            let (matched, width) = match p[pi] {
                '?' => (true, 1),
                '\\' if pi + 1 < p.len() => (p[pi + 1] == t[ti], 2),
                c => (c == t[ti], 1),
            };
            if matched {
                pi += width;
                ti += 1;
                continue;
            }
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob() {
        assert!(glob_match("ns:*", "ns:http://a/:data"));
        assert!(!glob_match("ns:*", "other:http://a/:data"));
        assert!(glob_match("ns:*:headers", "ns:http://a/b:headers"));
        assert!(!glob_match("ns:*:headers", "ns:http://a/b:data"));
        assert!(glob_match("k?y", "key"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("ns:*", "ns"));
    }

    #[tokio::test]
    async fn least_recently_used_is_evicted() {
        let store = MemoryStore::new(2);
        store.set("a", "1".into(), 60);
        store.set("b", "2".into(), 60);
        // touch `a` so `b` becomes the eviction candidate
        assert_eq!(store.get("a").as_deref(), Some("1"));
        store.set("c", "3".into(), 60);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("b"), None);
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.get("c").as_deref(), Some("3"));
    }

    #[tokio::test(start_paused = true)]
    async fn items_expire_individually() {
        let store = MemoryStore::new(10);
        store.set("short", "s".into(), 5);
        store.set("long", "l".into(), 60);

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("short"), None);
        assert_eq!(store.get("long").as_deref(), Some("l"));
        assert_eq!(store.delete("short"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_does_not_count_expired_items() {
        let store = MemoryStore::new(10);
        store.set("ns:stale", "s".into(), 1);
        store.set("ns:live", "l".into(), 60);

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(store.flush("ns:*"), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn flush_only_touches_matching_keys() {
        let store = MemoryStore::new(10);
        store.set("ns:a:headers", "1".into(), 60);
        store.set("ns:a:data", "1".into(), 60);
        store.set("other:a:data", "1".into(), 60);

        assert_eq!(store.flush("ns:*"), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete("other:a:data"), 1);
        assert!(store.is_empty());
    }
}
