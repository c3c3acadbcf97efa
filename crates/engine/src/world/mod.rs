mod dispatch;
mod save;
mod thing;
#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{Purge, PurgeRegistry, PurgeSummary, WeakRefDictionary};
use crate::config::CoreConfig;
use crate::containment::{
    find_component, ComponentOffset, ContainmentError, IntrusiveList, LinkStore, MultiComponent,
};
use crate::content::{DefDatabase, ThingDefId, ThingKind};
use crate::keys::{KeyRegistry, TimerKey, TriggerKey};
use crate::persist::PersistError;
use crate::tags::{BoundTimer, TagHolder};
use crate::trigger::{
    DefTriggerGroupHolder, Plugin, PluginDef, TriggerError, TriggerGroup, TriggerGroupList,
    TriggerGroupRegistry,
};
use crate::uid::{Handle, Uid, UidArena, UidError, UidSlot};
use crate::value::ScriptArgs;
use crate::visibility::{ContainerClosed, OpenedContainers, Reach, VisibilityError};

pub use thing::Thing;
use thing::top_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub z: i8,
    pub map: u8,
}

impl Point {
    pub fn new(x: i32, y: i32, z: i8, map: u8) -> Self {
        Self { x, y, z, map }
    }

    /// Chebyshev distance on the ground plane; `None` across maps.
    pub fn distance(&self, other: &Point) -> Option<u32> {
        if self.map != other.map {
            return None;
        }
        Some(self.x.abs_diff(other.x).max(self.y.abs_diff(other.y)))
    }
}

/// Who a handler is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSubject {
    Root,
    Thing(Uid),
    Plugin(Uid),
}

/// Outbound notices for the network layer, drained with `World::take_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    ContainerClosed(ContainerClosed),
    FailureNotice { actor: Uid, message: String },
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("invalid core config: {0}")]
    Config(String),
    #[error(transparent)]
    Uid(#[from] UidError),
    #[error(transparent)]
    Containment(#[from] ContainmentError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Visibility(#[from] VisibilityError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("unknown thing {uid}")]
    UnknownThing { uid: Uid },
    #[error("thing {uid} is deleted")]
    DeletedThing { uid: Uid },
    #[error("unknown plugin {uid}")]
    UnknownPlugin { uid: Uid },
    #[error("unknown thing def '{def_name}'")]
    UnknownDef { def_name: String },
    #[error("unknown plugin def '{def_name}'")]
    UnknownPluginDef { def_name: String },
    #[error("unknown trigger group '{name}'")]
    UnknownTriggerGroup { name: String },
    #[error("{uid} ({def_name}) cannot hold things")]
    NotAContainer { uid: Uid, def_name: String },
    #[error("cannot put {thing} into {container}: it would end up inside itself")]
    ContainmentCycle { thing: Uid, container: Uid },
}

/// Trigger keys the world fires on its own.
#[derive(Debug, Clone)]
struct DispatchKeys {
    create: TriggerKey,
    destroy: TriggerKey,
    after_load: TriggerKey,
    assign: TriggerKey,
    unassign: TriggerKey,
}

impl DispatchKeys {
    fn new(keys: &KeyRegistry) -> Self {
        Self {
            create: keys.acquire("create"),
            destroy: keys.acquire("destroy"),
            after_load: keys.acquire("afterLoad"),
            assign: keys.acquire("assign"),
            unassign: keys.acquire("unassign"),
        }
    }
}

struct ThingReach<'a> {
    things: &'a UidArena<Thing>,
    range: u32,
}

impl Reach for ThingReach<'_> {
    fn is_live(&self, uid: Uid) -> bool {
        self.things.get(uid).is_some_and(|thing| !thing.is_deleted())
    }

    /// Anything inside the observer's own tree is reachable; otherwise the outermost
    /// holders must stand within range on the same map.
    fn can_reach(&self, observer: Uid, container: Uid) -> bool {
        let observer_top = top_of(self.things, observer);
        let container_top = top_of(self.things, container);
        if container_top == observer || container_top == observer_top {
            return true;
        }
        let point_of = |uid: Uid| self.things.get(uid).and_then(Thing::point);
        match (point_of(observer_top), point_of(container_top)) {
            (Some(a), Some(b)) => a.distance(&b).is_some_and(|distance| distance <= self.range),
            _ => false,
        }
    }
}

pub struct World {
    config: CoreConfig,
    keys: Arc<KeyRegistry>,
    defs: DefDatabase,
    registry: TriggerGroupRegistry<World>,
    def_holders: Vec<DefTriggerGroupHolder<World>>,
    plugin_defs: Vec<Arc<PluginDef<World>>>,
    things: UidArena<Thing>,
    plugins: UidArena<Plugin<World>>,
    components: UidArena<MultiComponent>,
    registered_groups: TriggerGroupList<World>,
    root_groups: TriggerGroupList<World>,
    root_tags: TagHolder,
    visibility: OpenedContainers,
    purge: PurgeRegistry,
    thing_names: Rc<RefCell<WeakRefDictionary<String, Handle>>>,
    events: Vec<WorldEvent>,
    tick: u64,
    dispatch_keys: DispatchKeys,
}

impl World {
    /// Resolves every def's trigger-group names against `registry`. Groups named
    /// `*_global` are attached to the world root.
    pub fn new(
        config: CoreConfig,
        defs: DefDatabase,
        registry: TriggerGroupRegistry<World>,
    ) -> Result<Self, WorldError> {
        config.validate().map_err(WorldError::Config)?;
        let keys = KeyRegistry::shared();
        let dispatch_keys = DispatchKeys::new(&keys);

        let mut unresolved = 0;
        let mut def_holders = Vec::with_capacity(defs.thing_defs().len());
        for def in defs.thing_defs() {
            let mut holder = DefTriggerGroupHolder::new();
            unresolved += holder.resolve_names(
                &def.def_name,
                def.trigger_groups.iter().map(String::as_str),
                &registry,
            );
            def_holders.push(holder);
        }

        let mut plugin_defs = Vec::with_capacity(defs.plugin_defs().len());
        for def in defs.plugin_defs() {
            let mut resolve = |name: Option<&str>| {
                let name = name?;
                let group = registry.get(name).map(Arc::clone);
                if group.is_none() {
                    unresolved += 1;
                    warn!(owner = %def.def_name, group = name, "trigger_group_unresolved");
                }
                group
            };
            let scripted = resolve(def.trigger_group.as_deref());
            let compiled = resolve(def.compiled.as_deref());
            plugin_defs.push(Arc::new(PluginDef::new(def.def_name.clone(), scripted, compiled)));
        }

        let mut root_groups = TriggerGroupList::new();
        for group in registry.globals() {
            root_groups.append(Arc::clone(group));
        }

        let mut purge = PurgeRegistry::new();
        let thing_names = WeakRefDictionary::registered("thing_names", &mut purge);

        info!(
            thing_defs = def_holders.len(),
            plugin_defs = plugin_defs.len(),
            trigger_groups = registry.len(),
            global_groups = root_groups.len(),
            unresolved_groups = unresolved,
            "world_created"
        );

        Ok(Self {
            things: UidArena::new(&config),
            plugins: UidArena::new(&config),
            components: UidArena::new(&config),
            config,
            keys,
            defs,
            registry,
            def_holders,
            plugin_defs,
            registered_groups: TriggerGroupList::new(),
            root_groups,
            root_tags: TagHolder::new(),
            visibility: OpenedContainers::new(),
            purge,
            thing_names,
            events: Vec::new(),
            tick: 0,
            dispatch_keys,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyRegistry> {
        &self.keys
    }

    pub fn defs(&self) -> &DefDatabase {
        &self.defs
    }

    pub fn trigger_group(&self, name: &str) -> Option<Arc<TriggerGroup<World>>> {
        self.registry.get(name).map(Arc::clone)
    }

    pub fn now(&self) -> u64 {
        self.tick
    }

    pub fn thing(&self, uid: Uid) -> Option<&Thing> {
        self.things.get(uid)
    }

    pub fn thing_mut(&mut self, uid: Uid) -> Option<&mut Thing> {
        self.things.get_mut(uid)
    }

    pub fn thing_count(&self) -> usize {
        self.things.len()
    }

    pub fn thing_uids(&self) -> Vec<Uid> {
        self.things.uids()
    }

    pub fn highest_uid(&self) -> u32 {
        self.things.highest_uid()
    }

    pub fn is_live(&self, uid: Uid) -> bool {
        self.things.get(uid).is_some_and(|thing| !thing.is_deleted())
    }

    pub fn handle(&self, uid: Uid) -> Option<Handle> {
        self.things.handle(uid).filter(|_| self.is_live(uid))
    }

    /// `None` once the thing behind `handle` is gone, even if its uid was recycled.
    pub fn resolve(&self, handle: Handle) -> Option<Uid> {
        self.things.is_live(handle).then_some(handle.uid)
    }

    pub fn def_name(&self, uid: Uid) -> Option<&str> {
        let thing = self.things.get(uid)?;
        self.defs
            .thing_def(thing.def())
            .map(|def| def.def_name.as_str())
    }

    pub fn def_holder(&self, def: ThingDefId) -> Option<&DefTriggerGroupHolder<World>> {
        self.def_holders.get(def.0 as usize)
    }

    pub fn def_holder_mut(&mut self, def: ThingDefId) -> Option<&mut DefTriggerGroupHolder<World>> {
        self.def_holders.get_mut(def.0 as usize)
    }

    pub fn root_tags(&self) -> &TagHolder {
        &self.root_tags
    }

    pub fn root_tags_mut(&mut self) -> &mut TagHolder {
        &mut self.root_tags
    }

    pub fn get_fake_uid(&mut self) -> Result<u32, WorldError> {
        Ok(self.things.get_fake_uid()?)
    }

    pub fn dispose_fake_uid(&mut self, uid: u32) -> Result<(), WorldError> {
        Ok(self.things.dispose_fake_uid(uid)?)
    }

    pub fn is_fake_uid(&self, uid: u32) -> bool {
        self.things.is_fake_uid(uid)
    }

    pub fn create_thing(&mut self, def_name: &str) -> Result<Uid, WorldError> {
        let (def, kind) = self.lookup_def(def_name)?;
        let uid = self.things.add(Thing::new(def, kind))?;
        self.init_thing(uid)?;
        debug!(uid = %uid, def = def_name, "thing_created");
        let create = self.dispatch_keys.create.clone();
        self.dispatch_try(uid, &create, &ScriptArgs::empty());
        Ok(uid)
    }

    /// Re-creates a saved thing under its old uid. Does not fire `create`.
    pub fn load_thing(&mut self, def_name: &str, uid: u32) -> Result<Uid, WorldError> {
        let (def, kind) = self.lookup_def(def_name)?;
        let uid = self.things.add_loaded(Thing::new(def, kind), uid)?;
        self.init_thing(uid)?;
        Ok(uid)
    }

    /// Seals the arena against further loads and fires `afterLoad` on every thing.
    pub fn loading_finished(&mut self) {
        self.things.loading_finished();
        let after_load = self.dispatch_keys.after_load.clone();
        let uids = self.things.uids();
        for uid in &uids {
            if self.is_live(*uid) {
                self.dispatch_try(*uid, &after_load, &ScriptArgs::empty());
            }
        }
        info!(things = uids.len(), "world_loading_finished");
    }

    /// Deletes every top-level thing (so `destroy` runs down each tree), then any plugin
    /// left without a holder, and drops root state. Returns the number of things that
    /// were live.
    pub fn unload(mut self) -> Result<usize, WorldError> {
        let live = self.things.len();
        for uid in self.things.uids() {
            if self.is_live(uid) && self.container_of(uid).is_none() {
                self.delete_thing(uid)?;
            }
        }
        for plugin in self.plugins.uids() {
            if self.plugins.get(plugin).is_some() {
                self.delete_plugin(plugin)?;
            }
        }
        self.root_groups.clear();
        self.registered_groups.clear();
        self.root_tags.clear_tags();
        self.root_tags.delete_timers();
        let purged = self.purge_caches();
        info!(
            things = live,
            remaining = self.things.len(),
            purged_entries = purged.removed_entries,
            "world_unloaded"
        );
        Ok(live)
    }

    /// Deletes `uid` and everything inside it. Contents go first, then views on it are
    /// closed, it leaves its container, `destroy` fires, and its plugins are deleted.
    pub fn delete_thing(&mut self, uid: Uid) -> Result<(), WorldError> {
        let thing = self
            .things
            .get_mut(uid)
            .ok_or(WorldError::UnknownThing { uid })?;
        if thing.is_deleted() {
            return Ok(());
        }
        thing.mark_deleted();
        let contents = thing.contents;
        let components = thing.components.take();

        if let Some(contents) = contents {
            let mut cursor = contents.cursor();
            while let Some(member) = cursor.advance(&self.things) {
                let still_inside = self
                    .things
                    .get(member)
                    .is_some_and(|child| child.container() == Some(uid) && !child.is_deleted());
                if still_inside {
                    self.delete_thing(member)?;
                }
            }
        }
        if let Some(components) = components {
            let mut cursor = components.cursor();
            while let Some(component) = cursor.advance(&self.components) {
                self.components.remove_at(component);
            }
        }

        self.visibility.forget(uid);
        self.unlink_from_container(uid)?;
        let destroy = self.dispatch_keys.destroy.clone();
        self.dispatch_try(uid, &destroy, &ScriptArgs::empty());
        self.delete_plugins_of(uid)?;

        if let Some(thing) = self.things.get_mut(uid) {
            thing.trigger_groups.clear();
            thing.tags.clear_tags();
            thing.tags.delete_timers();
        }
        self.things.remove_at(uid);
        debug!(uid = %uid, "thing_deleted");
        Ok(())
    }

    /// Strict insert: `thing` must not already be in a container.
    pub fn add_to_container(&mut self, container: Uid, thing: Uid) -> Result<(), WorldError> {
        self.check_insert(container, thing)?;
        let mut list = self.contents_list(container)?;
        list.add(&mut self.things, thing)?;
        self.store_contents(container, list);
        if let Some(thing) = self.things.get_mut(thing) {
            thing.point = None;
        }
        Ok(())
    }

    /// Takes `thing` out of wherever it is and puts it at the head of `container`.
    pub fn move_to_container(&mut self, thing: Uid, container: Uid) -> Result<(), WorldError> {
        self.check_insert(container, thing)?;
        self.unlink_from_container(thing)?;
        self.add_to_container(container, thing)
    }

    /// Returns the container `thing` was taken out of.
    pub fn remove_from_container(&mut self, thing: Uid) -> Result<Option<Uid>, WorldError> {
        self.live_thing(thing)?;
        self.unlink_from_container(thing)
    }

    /// Leaves any container and stands at `point`.
    pub fn move_to_point(&mut self, thing: Uid, point: Point) -> Result<(), WorldError> {
        self.live_thing(thing)?;
        self.unlink_from_container(thing)?;
        if let Some(thing) = self.things.get_mut(thing) {
            thing.point = Some(point);
        }
        Ok(())
    }

    pub fn container_of(&self, thing: Uid) -> Option<Uid> {
        self.things.get(thing).and_then(Thing::container)
    }

    pub fn top_obj(&self, thing: Uid) -> Result<Uid, WorldError> {
        self.live_thing(thing)?;
        Ok(top_of(&self.things, thing))
    }

    /// Head first, which is the most recently inserted.
    pub fn contents(&self, container: Uid) -> Result<Vec<Uid>, WorldError> {
        let list = self.contents_list(container)?;
        Ok(list.iter(&self.things).collect())
    }

    pub fn components(&self, multi: Uid) -> Vec<Uid> {
        self.things
            .get(multi)
            .and_then(|thing| thing.components)
            .map(|list| list.iter(&self.components).collect())
            .unwrap_or_default()
    }

    pub fn component(&self, component: Uid) -> Option<&MultiComponent> {
        self.components.get(component)
    }

    /// Component of `multi` at a relative offset, optionally of a given model.
    pub fn find_component(
        &self,
        multi: Uid,
        offset: ComponentOffset,
        model: Option<u16>,
    ) -> Result<Option<Uid>, WorldError> {
        let thing = self.live_thing(multi)?;
        Ok(thing
            .components
            .and_then(|list| find_component(&list, &self.components, offset, model)))
    }

    pub fn open_container(&mut self, observer: Uid, container: Uid) -> Result<(), WorldError> {
        self.live_thing(observer)?;
        self.contents_list(container)?;
        self.visibility.set_container_opened(observer, container);
        Ok(())
    }

    pub fn close_container(&mut self, observer: Uid, container: Uid) -> bool {
        self.visibility.set_container_closed(observer, container)
    }

    pub fn close_container_for_all(&mut self, container: Uid) -> usize {
        self.visibility.close_container_for_all(container)
    }

    /// Also re-checks reach; a view that is out of reach is closed and reported false.
    pub fn has_container_open(&mut self, observer: Uid, container: Uid) -> Result<bool, WorldError> {
        let reach = ThingReach {
            things: &self.things,
            range: self.config.reach_range,
        };
        Ok(self
            .visibility
            .has_container_open(&reach, observer, container)?)
    }

    pub fn opened_containers(&mut self, observer: Uid) -> Result<Vec<Uid>, WorldError> {
        let reach = ThingReach {
            things: &self.things,
            range: self.config.reach_range,
        };
        Ok(self.visibility.opened_containers(&reach, observer)?)
    }

    pub fn container_viewers(&mut self, container: Uid) -> Result<Vec<Uid>, WorldError> {
        let reach = ThingReach {
            things: &self.things,
            range: self.config.reach_range,
        };
        Ok(self.visibility.viewers(&reach, container)?)
    }

    pub fn add_timer(&mut self, uid: Uid, key: TimerKey, timer: BoundTimer) -> Result<Option<BoundTimer>, WorldError> {
        self.live_thing(uid)?;
        Ok(self
            .things
            .get_mut(uid)
            .and_then(|thing| thing.tags.add_timer(key, timer)))
    }

    /// Advances the clock one tick and fires every due timer. Returns how many fired.
    pub fn tick(&mut self) -> usize {
        self.tick += 1;
        let now = self.tick;
        let mut fired = 0;

        for (timer, trigger) in self.root_tags.take_due_timers(now) {
            debug!(timer = %timer, trigger = %trigger, "root_timer_fired");
            self.try_trigger_root(&trigger, &ScriptArgs::empty());
            fired += 1;
        }

        for uid in self.things.uids() {
            let due = match self.things.get_mut(uid) {
                Some(thing) if !thing.is_deleted() && thing.tags.has_timers() => {
                    thing.tags.take_due_timers(now)
                }
                _ => continue,
            };
            for (_, trigger) in due {
                if !self.is_live(uid) {
                    break;
                }
                self.dispatch_try(uid, &trigger, &ScriptArgs::empty());
                fired += 1;
            }
        }
        fired
    }

    /// Compacts thing uids into `1..=thing_count()` and rewrites every stored reference.
    /// Handles taken before the call no longer resolve.
    pub fn reset_all_uids(&mut self) -> usize {
        let remapped = self.things.reindex_all();
        if remapped.is_empty() {
            return 0;
        }
        let table = remapped.iter().copied().collect::<HashMap<Uid, Uid>>();
        let map = |uid: Uid| table.get(&uid).copied().unwrap_or(uid);

        for uid in self.things.uids() {
            if let Some(thing) = self.things.get_mut(uid) {
                thing.link.remap(map, map);
                if let Some(list) = thing.contents.as_mut() {
                    list.remap(map, map);
                }
                if let Some(list) = thing.components.as_mut() {
                    list.remap(|component| component, map);
                }
                thing.tags.remap_things(map);
            }
        }
        for component in self.components.uids() {
            if let Some(link) = self.components.link_mut(component) {
                link.remap(|member| member, map);
            }
        }
        for plugin in self.plugins.uids() {
            if let Some(plugin) = self.plugins.get_mut(plugin) {
                plugin.remap_holder(map);
                plugin.tags.remap_things(map);
            }
        }
        self.root_tags.remap_things(map);
        self.visibility.remap(map);
        info!(remapped = remapped.len(), highest = self.things.highest_uid(), "uids_reset");
        remapped.len()
    }

    /// Sweeps dead entries out of every registered weak cache.
    pub fn purge_caches(&mut self) -> PurgeSummary {
        let summary = self.purge.purge_all(&self.things);
        info!(
            caches = summary.caches,
            removed = summary.removed_entries,
            dropped = summary.dropped_caches,
            "caches_purged"
        );
        summary
    }

    pub fn register_cache<P: Purge + 'static>(&mut self, cache: &Rc<RefCell<P>>) {
        self.purge.register(cache);
    }

    /// Names are case-insensitive. The entry dies with the thing.
    pub fn set_thing_name(&mut self, name: &str, uid: Uid) -> Result<(), WorldError> {
        let handle = self.handle(uid).ok_or(WorldError::UnknownThing { uid })?;
        self.thing_names
            .borrow_mut()
            .insert(name.to_ascii_lowercase(), handle);
        Ok(())
    }

    pub fn find_thing_by_name(&self, name: &str) -> Option<Uid> {
        self.thing_names
            .borrow()
            .try_get_value(&name.to_ascii_lowercase(), &self.things)
            .map(|handle| handle.uid)
    }

    pub fn take_events(&mut self) -> Vec<WorldEvent> {
        let mut events = self
            .visibility
            .take_closed()
            .into_iter()
            .map(WorldEvent::ContainerClosed)
            .collect::<Vec<_>>();
        events.append(&mut self.events);
        events
    }

    fn lookup_def(&self, def_name: &str) -> Result<(ThingDefId, ThingKind), WorldError> {
        let id = self
            .defs
            .thing_def_id_by_name(def_name)
            .ok_or_else(|| WorldError::UnknownDef {
                def_name: def_name.to_string(),
            })?;
        let def = self.defs.thing_def(id).ok_or_else(|| WorldError::UnknownDef {
            def_name: def_name.to_string(),
        })?;
        Ok((id, def.kind))
    }

    fn init_thing(&mut self, uid: Uid) -> Result<(), WorldError> {
        let thing = self
            .things
            .get_mut(uid)
            .ok_or(WorldError::UnknownThing { uid })?;
        thing.init_lists(uid);
        let Some(mut list) = thing.components else {
            return Ok(());
        };
        let specs = self
            .defs
            .thing_def(thing.def())
            .map(|def| def.components.clone())
            .unwrap_or_default();
        // Head insertion; walk backwards so the list keeps declaration order.
        for spec in specs.iter().rev() {
            let component = self
                .components
                .add(MultiComponent::new(spec.model, spec.offset))?;
            list.add(&mut self.components, component)?;
        }
        if let Some(thing) = self.things.get_mut(uid) {
            thing.components = Some(list);
        }
        Ok(())
    }

    fn live_thing(&self, uid: Uid) -> Result<&Thing, WorldError> {
        let thing = self.things.get(uid).ok_or(WorldError::UnknownThing { uid })?;
        if thing.is_deleted() {
            return Err(WorldError::DeletedThing { uid });
        }
        Ok(thing)
    }

    fn contents_list(&self, container: Uid) -> Result<IntrusiveList<Uid>, WorldError> {
        let thing = self
            .things
            .get(container)
            .ok_or(WorldError::UnknownThing { uid: container })?;
        thing.contents.ok_or_else(|| WorldError::NotAContainer {
            uid: container,
            def_name: self.def_name(container).unwrap_or("?").to_string(),
        })
    }

    fn store_contents(&mut self, container: Uid, list: IntrusiveList<Uid>) {
        if let Some(thing) = self.things.get_mut(container) {
            thing.contents = Some(list);
        }
    }

    fn check_insert(&self, container: Uid, thing: Uid) -> Result<(), WorldError> {
        self.live_thing(container)?;
        self.live_thing(thing)?;
        let mut current = Some(container);
        for _ in 0..=self.things.len() {
            let Some(ancestor) = current else {
                break;
            };
            if ancestor == thing {
                return Err(WorldError::ContainmentCycle { thing, container });
            }
            current = self.container_of(ancestor);
        }
        Ok(())
    }

    fn unlink_from_container(&mut self, thing: Uid) -> Result<Option<Uid>, WorldError> {
        let Some(container) = self.container_of(thing) else {
            return Ok(None);
        };
        let mut list = self.contents_list(container)?;
        list.remove(&mut self.things, thing)?;
        self.store_contents(container, list);
        Ok(Some(container))
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("things", &self.things.len())
            .field("plugins", &self.plugins.len())
            .field("components", &self.components.len())
            .field("open_views", &self.visibility.open_count())
            .finish()
    }
}
