use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::keys::{Key, KeyKind};
use crate::uid::{Handle, UidArena, UidSlot};

/// Answers whether a generation handle still names a live, undeleted object.
pub trait LivenessOracle {
    fn is_live(&self, handle: Handle) -> bool;
}

impl<T: UidSlot> LivenessOracle for UidArena<T> {
    fn is_live(&self, handle: Handle) -> bool {
        UidArena::is_live(self, handle)
    }
}

/// A key or value stored in a `WeakRefDictionary`.
pub trait WeakEntry {
    fn is_live(&self, oracle: &dyn LivenessOracle) -> bool;
}

impl WeakEntry for Handle {
    fn is_live(&self, oracle: &dyn LivenessOracle) -> bool {
        oracle.is_live(*self)
    }
}

impl WeakEntry for String {
    fn is_live(&self, _oracle: &dyn LivenessOracle) -> bool {
        true
    }
}

impl<K: KeyKind> WeakEntry for Key<K> {
    fn is_live(&self, _oracle: &dyn LivenessOracle) -> bool {
        true
    }
}

impl<A: WeakEntry, B: WeakEntry> WeakEntry for (A, B) {
    fn is_live(&self, oracle: &dyn LivenessOracle) -> bool {
        self.0.is_live(oracle) && self.1.is_live(oracle)
    }
}

pub trait Purge {
    fn purge(&mut self, oracle: &dyn LivenessOracle) -> usize;
}

/// Map whose keys and values may die independently. Dead entries are skipped by lookups
/// and only reclaimed by `purge`. Only built through `registered`, so every
/// dictionary is swept by its `PurgeRegistry`.
#[derive(Debug)]
pub struct WeakRefDictionary<K, V> {
    name: &'static str,
    entries: HashMap<K, V>,
}

impl<K, V> WeakRefDictionary<K, V>
where
    K: Eq + Hash + WeakEntry,
    V: WeakEntry,
{
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    /// Creates a shared dictionary reachable from `registry.purge_all`.
    pub fn registered(name: &'static str, registry: &mut PurgeRegistry) -> Rc<RefCell<Self>>
    where
        K: 'static,
        V: 'static,
    {
        let cache = Rc::new(RefCell::new(Self::new(name)));
        registry.register(&cache);
        cache
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn try_get_value(&self, key: &K, oracle: &dyn LivenessOracle) -> Option<&V> {
        if !key.is_live(oracle) {
            return None;
        }
        self.entries.get(key).filter(|value| value.is_live(oracle))
    }

    pub fn contains_key(&self, key: &K, oracle: &dyn LivenessOracle) -> bool {
        self.try_get_value(key, oracle).is_some()
    }

    /// Entry count after purging.
    pub fn len(&mut self, oracle: &dyn LivenessOracle) -> usize {
        self.purge(oracle);
        self.entries.len()
    }

    pub fn is_empty(&mut self, oracle: &dyn LivenessOracle) -> bool {
        self.len(oracle) == 0
    }

    /// Purges, then yields the surviving entries.
    pub fn iter(&mut self, oracle: &dyn LivenessOracle) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.purge(oracle);
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V> Purge for WeakRefDictionary<K, V>
where
    K: Eq + Hash + WeakEntry,
    V: WeakEntry,
{
    fn purge(&mut self, oracle: &dyn LivenessOracle) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, value| key.is_live(oracle) && value.is_live(oracle));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(cache = self.name, removed, "weak_cache_purged");
        }
        removed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub caches: usize,
    pub removed_entries: usize,
    pub dropped_caches: usize,
}

/// Weakly holds every registered cache; registration never keeps a cache alive.
#[derive(Default)]
pub struct PurgeRegistry {
    caches: Vec<Weak<RefCell<dyn Purge>>>,
}

impl PurgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Purge + 'static>(&mut self, cache: &Rc<RefCell<P>>) {
        let shared: Rc<RefCell<dyn Purge>> = cache.clone();
        self.caches.push(Rc::downgrade(&shared));
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn purge_all(&mut self, oracle: &dyn LivenessOracle) -> PurgeSummary {
        let mut summary = PurgeSummary::default();
        self.caches.retain(|weak| {
            let Some(cache) = weak.upgrade() else {
                summary.dropped_caches += 1;
                return false;
            };
            match cache.try_borrow_mut() {
                Ok(mut cache) => {
                    summary.caches += 1;
                    summary.removed_entries += cache.purge(oracle);
                }
                Err(_) => warn!("weak cache busy during purge_all; skipped"),
            }
            true
        });
        summary
    }
}

impl std::fmt::Debug for PurgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeRegistry")
            .field("caches", &self.caches.len())
            .finish()
    }
}
