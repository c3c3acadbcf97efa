use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::keys::{PluginKey, TriggerKey};
use crate::tags::TagHolder;
use crate::uid::{Uid, UidSlot};
use crate::value::{ScriptArgs, ScriptValue};

use super::{TriggerContext, TriggerError, TriggerGroup, TriggerResult};

/// Shared definition of a plugin: an optional scripted group and an optional compiled one.
pub struct PluginDef<C: TriggerContext> {
    name: String,
    scripted: Option<Arc<TriggerGroup<C>>>,
    compiled: Option<Arc<TriggerGroup<C>>>,
}

impl<C: TriggerContext> PluginDef<C> {
    pub fn new(
        name: impl Into<String>,
        scripted: Option<Arc<TriggerGroup<C>>>,
        compiled: Option<Arc<TriggerGroup<C>>>,
    ) -> Self {
        Self {
            name: name.into(),
            scripted,
            compiled,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scripted(&self) -> Option<&Arc<TriggerGroup<C>>> {
        self.scripted.as_ref()
    }

    pub fn compiled(&self) -> Option<&Arc<TriggerGroup<C>>> {
        self.compiled.as_ref()
    }

    /// Scripted layer first, then compiled. When both produce a value the compiled one wins.
    pub fn run(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, TriggerError> {
        let mut result = None;
        for layer in self.layers() {
            if let Some(value) = layer.run(ctx, subject, key, args)? {
                result = Some(value);
            }
        }
        Ok(result)
    }

    /// A failure in the scripted layer does not stop the compiled layer.
    pub fn try_run(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Option<ScriptValue> {
        let mut result = None;
        for layer in self.layers() {
            if let Some(value) = layer.try_run(ctx, subject, key, args) {
                result = Some(value);
            }
        }
        result
    }

    pub fn cancellable(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<TriggerResult, TriggerError> {
        for layer in self.layers() {
            if layer
                .run(ctx, subject, key, args)?
                .is_some_and(|value| value.is_one())
            {
                return Ok(TriggerResult::Cancel);
            }
        }
        Ok(TriggerResult::Continue)
    }

    pub fn try_cancellable(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> TriggerResult {
        for layer in self.layers() {
            if layer
                .try_run(ctx, subject, key, args)
                .is_some_and(|value| value.is_one())
            {
                return TriggerResult::Cancel;
            }
        }
        TriggerResult::Continue
    }

    fn layers(&self) -> impl Iterator<Item = &Arc<TriggerGroup<C>>> + '_ {
        self.scripted.iter().chain(self.compiled.iter())
    }
}

impl<C: TriggerContext> fmt::Debug for PluginDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDef")
            .field("name", &self.name)
            .field("scripted", &self.scripted.as_ref().map(|g| g.name()))
            .field("compiled", &self.compiled.as_ref().map(|g| g.name()))
            .finish()
    }
}

/// Plugin instance. Lives in its own uid arena and is attached to at most one holder.
pub struct Plugin<C: TriggerContext> {
    uid: Option<Uid>,
    def: Arc<PluginDef<C>>,
    holder: Option<Uid>,
    key: Option<PluginKey>,
    simple: bool,
    deleted: bool,
    pub tags: TagHolder,
}

impl<C: TriggerContext> Plugin<C> {
    pub fn new(def: Arc<PluginDef<C>>) -> Self {
        Self {
            uid: None,
            def,
            holder: None,
            key: None,
            simple: false,
            deleted: false,
            tags: TagHolder::default(),
        }
    }

    pub fn def(&self) -> &Arc<PluginDef<C>> {
        &self.def
    }

    pub fn holder(&self) -> Option<Uid> {
        self.holder
    }

    pub fn key(&self) -> Option<&PluginKey> {
        self.key.as_ref()
    }

    /// Simple plugins are reachable by key but skipped by holder-wide dispatch.
    pub fn is_simple(&self) -> bool {
        self.simple
    }

    pub fn attach(&mut self, holder: Uid, key: PluginKey, simple: bool) {
        self.holder = Some(holder);
        self.key = Some(key);
        self.simple = simple;
    }

    pub fn detach(&mut self) {
        self.holder = None;
        self.key = None;
        self.simple = false;
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn remap_holder(&mut self, map: impl Fn(Uid) -> Uid) {
        self.holder = self.holder.map(map);
    }
}

impl<C: TriggerContext> UidSlot for Plugin<C> {
    fn uid(&self) -> Option<Uid> {
        self.uid
    }

    fn set_uid(&mut self, uid: Option<Uid>) {
        self.uid = uid;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl<C: TriggerContext> fmt::Debug for Plugin<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("uid", &self.uid)
            .field("def", &self.def.name())
            .field("holder", &self.holder)
            .field("key", &self.key)
            .field("simple", &self.simple)
            .field("deleted", &self.deleted)
            .finish()
    }
}

/// Per-holder plugin bookkeeping: key lookup plus the dispatch order of non-simple plugins.
#[derive(Debug, Clone, Default)]
pub struct PluginSlots {
    by_key: HashMap<PluginKey, Uid>,
    linked: VecDeque<Uid>,
}

impl PluginSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the plugin displaced from `key`, if any. Newly linked plugins dispatch first.
    pub fn insert(&mut self, key: PluginKey, plugin: Uid, simple: bool) -> Option<Uid> {
        let displaced = self.by_key.insert(key, plugin);
        if let Some(old) = displaced {
            self.linked.retain(|linked| *linked != old);
        }
        self.linked.retain(|linked| *linked != plugin);
        if !simple {
            self.linked.push_front(plugin);
        }
        displaced.filter(|old| *old != plugin)
    }

    pub fn remove_key(&mut self, key: &PluginKey) -> Option<Uid> {
        let plugin = self.by_key.remove(key)?;
        self.linked.retain(|linked| *linked != plugin);
        Some(plugin)
    }

    pub fn remove_plugin(&mut self, plugin: Uid) -> Option<PluginKey> {
        let key = self.key_of(plugin)?;
        self.remove_key(&key);
        Some(key)
    }

    pub fn get(&self, key: &PluginKey) -> Option<Uid> {
        self.by_key.get(key).copied()
    }

    pub fn key_of(&self, plugin: Uid) -> Option<PluginKey> {
        self.by_key
            .iter()
            .find(|(_, attached)| **attached == plugin)
            .map(|(key, _)| key.clone())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Sorted by key name.
    pub fn entries(&self) -> Vec<(PluginKey, Uid)> {
        let mut entries = self
            .by_key
            .iter()
            .map(|(key, plugin)| (key.clone(), *plugin))
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        entries
    }

    /// Snapshot of non-simple plugins in dispatch order.
    pub fn linked(&self) -> Vec<Uid> {
        self.linked.iter().copied().collect()
    }

    pub fn drain(&mut self) -> Vec<Uid> {
        self.linked.clear();
        let mut plugins = self.by_key.drain().map(|(_, plugin)| plugin).collect::<Vec<_>>();
        plugins.sort();
        plugins
    }
}
