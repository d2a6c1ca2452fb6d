//! Per-node cache replacement policies.
//!
//! Every policy separates a pure membership test ([`Cache::has`]) from an
//! access ([`Cache::get`]) that updates replacement state. Only the network
//! controller performs accesses; views go through `has` and `dump`.
//!
//! Policies are selected by name with [`cache_by_name`]:
//! - `lru`: least recently used
//! - `fifo`: first in, first out
//! - `lfu`: least frequently used among cached items (ties evict the oldest)
//! - `null`: stores nothing

use crate::config::ConfigError;
use cachesim_strategies::{Args, ContentId};
use std::collections::{HashMap, VecDeque};

/// A bounded content cache.
pub trait Cache: Send + std::fmt::Debug {
    /// Whether `content` is stored. Never changes replacement state.
    fn has(&self, content: ContentId) -> bool;

    /// Look up `content`, updating replacement state on a hit.
    fn get(&mut self, content: ContentId) -> bool;

    /// Insert `content`, returning the evicted item if one had to go.
    ///
    /// Inserting an item already present only refreshes it.
    fn put(&mut self, content: ContentId) -> Option<ContentId>;

    /// Remove `content` if present.
    fn remove(&mut self, content: ContentId) -> bool;

    /// Stored items, next-to-be-evicted last.
    fn dump(&self) -> Vec<ContentId>;

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Policy name for reports.
    fn policy(&self) -> &'static str;
}

/// Least-recently-used cache.
#[derive(Debug, Clone)]
pub struct LruCache {
    capacity: usize,
    /// Front = most recently used.
    order: VecDeque<ContentId>,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn position(&self, content: ContentId) -> Option<usize> {
        self.order.iter().position(|&c| c == content)
    }

    fn touch(&mut self, index: usize) {
        if let Some(content) = self.order.remove(index) {
            self.order.push_front(content);
        }
    }
}

impl Cache for LruCache {
    fn has(&self, content: ContentId) -> bool {
        self.position(content).is_some()
    }

    fn get(&mut self, content: ContentId) -> bool {
        match self.position(content) {
            Some(index) => {
                self.touch(index);
                true
            }
            None => false,
        }
    }

    fn put(&mut self, content: ContentId) -> Option<ContentId> {
        if self.capacity == 0 {
            return None;
        }
        if let Some(index) = self.position(content) {
            self.touch(index);
            return None;
        }
        self.order.push_front(content);
        if self.order.len() > self.capacity {
            self.order.pop_back()
        } else {
            None
        }
    }

    fn remove(&mut self, content: ContentId) -> bool {
        match self.position(content) {
            Some(index) => {
                self.order.remove(index);
                true
            }
            None => false,
        }
    }

    fn dump(&self) -> Vec<ContentId> {
        self.order.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn policy(&self) -> &'static str {
        "lru"
    }
}

/// First-in-first-out cache. Hits do not change eviction order.
#[derive(Debug, Clone)]
pub struct FifoCache {
    capacity: usize,
    /// Front = newest.
    order: VecDeque<ContentId>,
}

impl FifoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
        }
    }
}

impl Cache for FifoCache {
    fn has(&self, content: ContentId) -> bool {
        self.order.contains(&content)
    }

    fn get(&mut self, content: ContentId) -> bool {
        self.has(content)
    }

    fn put(&mut self, content: ContentId) -> Option<ContentId> {
        if self.capacity == 0 || self.has(content) {
            return None;
        }
        self.order.push_front(content);
        if self.order.len() > self.capacity {
            self.order.pop_back()
        } else {
            None
        }
    }

    fn remove(&mut self, content: ContentId) -> bool {
        match self.order.iter().position(|&c| c == content) {
            Some(index) => {
                self.order.remove(index);
                true
            }
            None => false,
        }
    }

    fn dump(&self) -> Vec<ContentId> {
        self.order.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn policy(&self) -> &'static str {
        "fifo"
    }
}

/// In-cache least-frequently-used cache.
///
/// Frequencies are forgotten on eviction. Among equally frequent items the
/// one inserted earliest is evicted.
#[derive(Debug, Clone)]
pub struct LfuCache {
    capacity: usize,
    /// content -> (hit count, insertion sequence)
    entries: HashMap<ContentId, (u64, u64)>,
    sequence: u64,
}

impl LfuCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            sequence: 0,
        }
    }

    /// Items ordered most valuable first.
    fn ranked(&self) -> Vec<(ContentId, u64, u64)> {
        let mut ranked: Vec<_> = self
            .entries
            .iter()
            .map(|(&c, &(count, seq))| (c, count, seq))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
        ranked
    }
}

impl Cache for LfuCache {
    fn has(&self, content: ContentId) -> bool {
        self.entries.contains_key(&content)
    }

    fn get(&mut self, content: ContentId) -> bool {
        match self.entries.get_mut(&content) {
            Some(entry) => {
                entry.0 += 1;
                true
            }
            None => false,
        }
    }

    fn put(&mut self, content: ContentId) -> Option<ContentId> {
        if self.capacity == 0 {
            return None;
        }
        if let Some(entry) = self.entries.get_mut(&content) {
            entry.0 += 1;
            return None;
        }
        let evicted = if self.entries.len() >= self.capacity {
            let victim = self.ranked().last().map(|(c, _, _)| *c);
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
            victim
        } else {
            None
        };
        self.entries.insert(content, (1, self.sequence));
        self.sequence += 1;
        evicted
    }

    fn remove(&mut self, content: ContentId) -> bool {
        self.entries.remove(&content).is_some()
    }

    fn dump(&self) -> Vec<ContentId> {
        self.ranked().into_iter().map(|(c, _, _)| c).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn policy(&self) -> &'static str {
        "lfu"
    }
}

/// A cache that never stores anything.
#[derive(Debug, Clone, Default)]
pub struct NullCache;

impl Cache for NullCache {
    fn has(&self, _content: ContentId) -> bool {
        false
    }

    fn get(&mut self, _content: ContentId) -> bool {
        false
    }

    fn put(&mut self, _content: ContentId) -> Option<ContentId> {
        None
    }

    fn remove(&mut self, _content: ContentId) -> bool {
        false
    }

    fn dump(&self) -> Vec<ContentId> {
        Vec::new()
    }

    fn len(&self) -> usize {
        0
    }

    fn capacity(&self) -> usize {
        0
    }

    fn policy(&self) -> &'static str {
        "null"
    }
}

/// Create a cache of the named policy.
///
/// None of the built-in policies take arguments; any supplied are rejected
/// so that a typo in a configuration does not pass silently.
pub fn cache_by_name(
    name: &str,
    capacity: usize,
    args: &Args,
) -> Result<Box<dyn Cache>, ConfigError> {
    let cache: Box<dyn Cache> = match name {
        "lru" => Box::new(LruCache::new(capacity)),
        "fifo" => Box::new(FifoCache::new(capacity)),
        "lfu" => Box::new(LfuCache::new(capacity)),
        "null" => Box::new(NullCache),
        other => return Err(ConfigError::UnknownCachePolicy(other.to_string())),
    };
    if let Some(arg) = args.keys().next() {
        return Err(ConfigError::Validation(format!(
            "cache policy `{}` takes no argument `{}`",
            name, arg
        )));
    }
    Ok(cache)
}

/// List all available cache policy names.
pub fn available_cache_policies() -> Vec<&'static str> {
    vec!["lru", "fifo", "lfu", "null"]
}
