use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::warn;

static KEY_REGISTRY_POISON_WARNED: AtomicBool = AtomicBool::new(false);
static GLOBAL_KEY_REGISTRY: OnceLock<Arc<KeyRegistry>> = OnceLock::new();
// Shared by every registry so keys from different registries never compare equal.
static NEXT_KEY_UID: AtomicU32 = AtomicU32::new(0);

fn warn_key_registry_poison_once(operation: &'static str) {
    if KEY_REGISTRY_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "key registry lock poisoned; recovered inner value");
    }
}

pub trait KeyKind: 'static {
    const KIND: &'static str;
}

#[derive(Debug)]
pub enum TagKind {}
#[derive(Debug)]
pub enum TimerKind {}
#[derive(Debug)]
pub enum PluginKind {}
#[derive(Debug)]
pub enum TriggerKind {}

impl KeyKind for TagKind {
    const KIND: &'static str = "tag";
}
impl KeyKind for TimerKind {
    const KIND: &'static str = "timer";
}
impl KeyKind for PluginKind {
    const KIND: &'static str = "plugin";
}
impl KeyKind for TriggerKind {
    const KIND: &'static str = "trigger";
}

pub type TagKey = Key<TagKind>;
pub type TimerKey = Key<TimerKind>;
pub type PluginKey = Key<PluginKind>;
pub type TriggerKey = Key<TriggerKind>;

#[derive(Debug)]
struct KeyInner {
    name: String,
    uid: u32,
}

/// Interned name token. Two keys are equal iff they came from the same registry entry;
/// uids are process-wide, so keys from separate registries always differ.
pub struct Key<K: KeyKind> {
    inner: Arc<KeyInner>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: KeyKind> Key<K> {
    /// Acquires through the process-wide registry.
    pub fn acquire(name: &str) -> Self {
        KeyRegistry::global().acquire(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn uid(&self) -> u32 {
        self.inner.uid
    }
}

impl<K: KeyKind> Clone for Key<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _kind: PhantomData,
        }
    }
}

impl<K: KeyKind> PartialEq for Key<K> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.uid == other.inner.uid
    }
}

impl<K: KeyKind> Eq for Key<K> {}

impl<K: KeyKind> Hash for Key<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.uid.hash(state);
    }
}

impl<K: KeyKind> PartialOrd for Key<K> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<K: KeyKind> Ord for Key<K> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.inner.uid.cmp(&other.inner.uid)
    }
}

impl<K: KeyKind> fmt::Display for Key<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl<K: KeyKind> fmt::Debug for Key<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}#{})", K::KIND, self.inner.name, self.inner.uid)
    }
}

#[derive(Debug, Default)]
pub struct KeyRegistry {
    entries: RwLock<HashMap<(&'static str, String), Arc<KeyInner>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static KeyRegistry {
        GLOBAL_KEY_REGISTRY.get_or_init(|| Arc::new(KeyRegistry::new()))
    }

    pub fn shared() -> Arc<KeyRegistry> {
        Arc::clone(GLOBAL_KEY_REGISTRY.get_or_init(|| Arc::new(KeyRegistry::new())))
    }

    pub fn acquire<K: KeyKind>(&self, name: &str) -> Key<K> {
        let lookup = (K::KIND, name.to_ascii_lowercase());
        if let Some(inner) = self.read_entry(&lookup) {
            return Key {
                inner,
                _kind: PhantomData,
            };
        }

        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_key_registry_poison_once("write");
                poisoned.into_inner()
            }
        };
        // Another thread may have won the race between the read and write locks.
        let inner = entries
            .entry(lookup)
            .or_insert_with(|| {
                Arc::new(KeyInner {
                    name: name.to_string(),
                    uid: NEXT_KEY_UID.fetch_add(1, Ordering::Relaxed),
                })
            })
            .clone();
        Key {
            inner,
            _kind: PhantomData,
        }
    }

    pub fn get<K: KeyKind>(&self, name: &str) -> Option<Key<K>> {
        self.read_entry(&(K::KIND, name.to_ascii_lowercase()))
            .map(|inner| Key {
                inner,
                _kind: PhantomData,
            })
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => {
                warn_key_registry_poison_once("read");
                poisoned.into_inner().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entry(&self, lookup: &(&'static str, String)) -> Option<Arc<KeyInner>> {
        match self.entries.read() {
            Ok(guard) => guard.get(lookup).cloned(),
            Err(poisoned) => {
                warn_key_registry_poison_once("read");
                poisoned.into_inner().get(lookup).cloned()
            }
        }
    }
}
