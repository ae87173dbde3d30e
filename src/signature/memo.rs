use super::compute_signature;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Messages longer than this are hashed every time instead of memoized.
pub const MAX_MEMO_MESSAGE_LEN: usize = 1024;

/// Bounded LRU from raw message to signature.
///
/// Repeated messages skip the rule set entirely. A capacity of zero turns
/// the memo off.
pub struct SignatureMemo {
    entries: Option<Mutex<LruCache<String, String>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SignatureMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Same result as [`compute_signature`], served from the memo when the
    /// message was seen recently.
    pub fn signature(&self, message: &str) -> String {
        let Some(entries) = &self.entries else {
            return compute_signature(message);
        };

        let cached = entries.lock().get(message).cloned();
        if let Some(signature) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return signature;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let signature = compute_signature(message);
        if message.len() <= MAX_MEMO_MESSAGE_LEN {
            entries.lock().put(message.to_string(), signature.clone());
        }
        signature
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SignatureMemo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureMemo")
            .field("len", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
