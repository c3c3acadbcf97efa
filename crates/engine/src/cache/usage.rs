use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::num::NonZeroUsize;

#[derive(Debug, Clone)]
struct UsageEntry<V> {
    value: V,
    usages: usize,
}

/// Approximate LRU. Every hit or insert pushes the key onto a bounded usage queue; when the
/// queue overflows, the oldest queued key loses one usage and is evicted at zero.
#[derive(Debug, Clone)]
pub struct CacheDictionary<K, V> {
    max_queue_count: NonZeroUsize,
    entries: HashMap<K, UsageEntry<V>>,
    usage_queue: VecDeque<K>,
}

impl<K, V> CacheDictionary<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(max_queue_count: NonZeroUsize) -> Self {
        Self {
            max_queue_count,
            entries: HashMap::new(),
            usage_queue: VecDeque::with_capacity(max_queue_count.get() + 1),
        }
    }

    pub fn max_queue_count(&self) -> usize {
        self.max_queue_count.get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn queued_usages(&self) -> usize {
        self.usage_queue.len()
    }

    /// Counts as a usage on hit; a miss leaves the queue untouched.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let owned = self.entries.get_key_value(key).map(|(owned, _)| owned.clone())?;
        self.touch(owned);
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Does not count as a usage.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Replacing a value keeps the usage credit the key already earned.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = match self.entries.get_mut(&key) {
            Some(entry) => Some(std::mem::replace(&mut entry.value, value)),
            None => {
                self.entries
                    .insert(key.clone(), UsageEntry { value, usages: 0 });
                None
            }
        };
        self.touch(key);
        previous
    }

    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> Option<&V> {
        if self.entries.contains_key(&key) {
            self.touch(key.clone());
        } else {
            self.insert(key.clone(), make());
        }
        self.entries.get(&key).map(|entry| &entry.value)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let removed = self.entries.remove(key)?;
        self
            .usage_queue
            .retain(|queued| <K as Borrow<Q>>::borrow(queued) != key);
        Some(removed.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.usage_queue.clear();
    }

    fn touch(&mut self, key: K) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.usages += 1;
        }
        self.usage_queue.push_back(key);
        while self.usage_queue.len() > self.max_queue_count.get() {
            let Some(removed_key) = self.usage_queue.pop_front() else {
                break;
            };
            // The dequeued key pays for the overflow, not the key that was just pushed.
            if let Some(entry) = self.entries.get_mut(&removed_key) {
                entry.usages = entry.usages.saturating_sub(1);
                if entry.usages == 0 {
                    self.entries.remove(&removed_key);
                }
            }
        }
    }
}
