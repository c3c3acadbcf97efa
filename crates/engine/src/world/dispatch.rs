use std::sync::Arc;

use tracing::debug;

use crate::keys::{PluginKey, TriggerKey};
use crate::trigger::{
    DefTriggerGroupHolder, Plugin, PluginDef, TriggerContext, TriggerError, TriggerGroup,
    TriggerGroupList, TriggerResult,
};
use crate::uid::{Handle, Uid, UidSlot};
use crate::value::{ScriptArgs, ScriptValue};

use super::{TriggerSubject, World, WorldError, WorldEvent};

impl TriggerContext for World {
    type Subject = TriggerSubject;

    fn handler_failed(&mut self, _subject: TriggerSubject, args: &ScriptArgs, error: &TriggerError) {
        if let Some(actor) = args.actor {
            self.events.push(WorldEvent::FailureNotice {
                actor,
                message: error.to_string(),
            });
        }
    }
}

/// Everything that answers a trigger on one thing, captured before any handler runs so
/// handlers can attach or detach groups without disturbing the walk in progress.
struct ThingDispatch {
    registered: TriggerGroupList<World>,
    own: TriggerGroupList<World>,
    plugins: Vec<Uid>,
    def: DefTriggerGroupHolder<World>,
}

fn keep_last(result: &mut Option<ScriptValue>, value: Option<ScriptValue>) {
    if value.is_some() {
        *result = value;
    }
}

impl World {
    /// Runs `key` on a thing: world-registered groups, the thing's own groups, its linked
    /// plugins, then its def's groups. The first handler error aborts the walk.
    pub fn trigger(
        &mut self,
        uid: Uid,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, WorldError> {
        self.live_thing(uid)?;
        let plan = self.thing_dispatch(uid)?;
        let subject = TriggerSubject::Thing(uid);

        let mut result = plan.registered.run(self, subject, key, args)?;
        keep_last(&mut result, plan.own.run(self, subject, key, args)?);
        for plugin in plan.plugins {
            if let Some(def) = self.attached_plugin_def(plugin, uid) {
                keep_last(
                    &mut result,
                    def.run(self, TriggerSubject::Plugin(plugin), key, args)?,
                );
            }
        }
        keep_last(&mut result, plan.def.trigger(self, subject, key, args)?);
        Ok(result)
    }

    /// Like `trigger`, but handler failures are logged and skipped.
    pub fn try_trigger(
        &mut self,
        uid: Uid,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, WorldError> {
        self.live_thing(uid)?;
        Ok(self.dispatch_try(uid, key, args))
    }

    /// Stops at the first group or plugin that answers one.
    pub fn cancellable_trigger(
        &mut self,
        uid: Uid,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<TriggerResult, WorldError> {
        self.live_thing(uid)?;
        let plan = self.thing_dispatch(uid)?;
        let subject = TriggerSubject::Thing(uid);

        if plan.registered.cancellable(self, subject, key, args)?.is_cancelled()
            || plan.own.cancellable(self, subject, key, args)?.is_cancelled()
        {
            return Ok(TriggerResult::Cancel);
        }
        for plugin in plan.plugins {
            if let Some(def) = self.attached_plugin_def(plugin, uid) {
                if def
                    .cancellable(self, TriggerSubject::Plugin(plugin), key, args)?
                    .is_cancelled()
                {
                    return Ok(TriggerResult::Cancel);
                }
            }
        }
        Ok(plan.def.cancellable_trigger(self, subject, key, args)?)
    }

    pub fn try_cancellable_trigger(
        &mut self,
        uid: Uid,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<TriggerResult, WorldError> {
        self.live_thing(uid)?;
        let plan = self.thing_dispatch(uid)?;
        let subject = TriggerSubject::Thing(uid);

        if plan.registered.try_cancellable(self, subject, key, args).is_cancelled()
            || plan.own.try_cancellable(self, subject, key, args).is_cancelled()
        {
            return Ok(TriggerResult::Cancel);
        }
        for plugin in plan.plugins {
            if let Some(def) = self.attached_plugin_def(plugin, uid) {
                if def
                    .try_cancellable(self, TriggerSubject::Plugin(plugin), key, args)
                    .is_cancelled()
                {
                    return Ok(TriggerResult::Cancel);
                }
            }
        }
        Ok(plan.def.try_cancellable_trigger(self, subject, key, args))
    }

    /// Fires on a thing that may already be marked deleted; used for lifecycle triggers.
    pub(super) fn dispatch_try(
        &mut self,
        uid: Uid,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Option<ScriptValue> {
        let plan = self.thing_dispatch(uid).ok()?;
        let subject = TriggerSubject::Thing(uid);

        let mut result = plan.registered.try_run(self, subject, key, args);
        keep_last(&mut result, plan.own.try_run(self, subject, key, args));
        for plugin in plan.plugins {
            if let Some(def) = self.attached_plugin_def(plugin, uid) {
                keep_last(
                    &mut result,
                    def.try_run(self, TriggerSubject::Plugin(plugin), key, args),
                );
            }
        }
        keep_last(&mut result, plan.def.try_trigger(self, subject, key, args));
        result
    }

    /// Handle for dispatching to a live plugin; goes stale once the plugin is deleted.
    pub fn plugin_handle(&self, plugin: Uid) -> Option<Handle> {
        self.plugins
            .handle(plugin)
            .filter(|handle| self.plugins.is_live(*handle))
    }

    /// Stale handles and deleted plugins answer `Ok(None)`.
    pub fn trigger_plugin(
        &mut self,
        plugin: Handle,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, WorldError> {
        let Some(def) = self.live_plugin_def(plugin) else {
            return Ok(None);
        };
        Ok(def.run(self, TriggerSubject::Plugin(plugin.uid), key, args)?)
    }

    pub fn try_trigger_plugin(
        &mut self,
        plugin: Handle,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Option<ScriptValue> {
        let def = self.live_plugin_def(plugin)?;
        def.try_run(self, TriggerSubject::Plugin(plugin.uid), key, args)
    }

    /// Runs the `_global` groups attached to the world root.
    pub fn trigger_root(
        &mut self,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, WorldError> {
        let groups = self.root_groups.clone();
        Ok(groups.run(self, TriggerSubject::Root, key, args)?)
    }

    pub fn try_trigger_root(&mut self, key: &TriggerKey, args: &ScriptArgs) -> Option<ScriptValue> {
        let groups = self.root_groups.clone();
        groups.try_run(self, TriggerSubject::Root, key, args)
    }

    /// Attaches `group` to every thing, ahead of their own groups.
    pub fn register_thing_trigger_group(&mut self, group: Arc<TriggerGroup<World>>) -> bool {
        self.registered_groups.append(group)
    }

    pub fn unregister_thing_trigger_group(&mut self, group: &Arc<TriggerGroup<World>>) -> bool {
        self.registered_groups.remove(group)
    }

    /// Newest group runs first. Fires `assign` on the group when it was not attached yet.
    pub fn add_trigger_group(
        &mut self,
        uid: Uid,
        group: &Arc<TriggerGroup<World>>,
    ) -> Result<bool, WorldError> {
        let thing = self.live_thing(uid)?;
        if thing.trigger_groups.contains(group) {
            return Ok(false);
        }
        if let Some(thing) = self.things.get_mut(uid) {
            thing.trigger_groups.prepend(Arc::clone(group));
        }
        debug!(uid = %uid, group = group.name(), "trigger_group_added");
        let assign = self.dispatch_keys.assign.clone();
        group.try_run(self, TriggerSubject::Thing(uid), &assign, &ScriptArgs::empty());
        Ok(true)
    }

    pub fn add_trigger_group_by_name(&mut self, uid: Uid, name: &str) -> Result<bool, WorldError> {
        let group = self
            .trigger_group(name)
            .ok_or_else(|| WorldError::UnknownTriggerGroup {
                name: name.to_string(),
            })?;
        self.add_trigger_group(uid, &group)
    }

    /// Fires `unassign` on the group after it has been detached.
    pub fn remove_trigger_group(
        &mut self,
        uid: Uid,
        group: &Arc<TriggerGroup<World>>,
    ) -> Result<bool, WorldError> {
        self.live_thing(uid)?;
        let removed = self
            .things
            .get_mut(uid)
            .is_some_and(|thing| thing.trigger_groups.remove(group));
        if removed {
            debug!(uid = %uid, group = group.name(), "trigger_group_removed");
            let unassign = self.dispatch_keys.unassign.clone();
            group.try_run(self, TriggerSubject::Thing(uid), &unassign, &ScriptArgs::empty());
        }
        Ok(removed)
    }

    pub fn has_trigger_group(&self, uid: Uid, group: &Arc<TriggerGroup<World>>) -> bool {
        self.things
            .get(uid)
            .is_some_and(|thing| thing.trigger_groups.contains(group))
    }

    pub fn clear_trigger_groups(&mut self, uid: Uid) -> Result<(), WorldError> {
        self.live_thing(uid)?;
        if let Some(thing) = self.things.get_mut(uid) {
            thing.trigger_groups.clear();
        }
        Ok(())
    }

    /// New unattached plugin instance of `def_name`.
    pub fn create_plugin(&mut self, def_name: &str) -> Result<Uid, WorldError> {
        let def = self
            .defs
            .plugin_def_id_by_name(def_name)
            .and_then(|id| self.plugin_defs.get(id.0 as usize))
            .map(Arc::clone)
            .ok_or_else(|| WorldError::UnknownPluginDef {
                def_name: def_name.to_string(),
            })?;
        Ok(self.plugins.add(Plugin::new(def))?)
    }

    pub fn plugin(&self, plugin: Uid) -> Option<&Plugin<World>> {
        self.plugins.get(plugin)
    }

    pub fn plugin_mut(&mut self, plugin: Uid) -> Option<&mut Plugin<World>> {
        self.plugins.get_mut(plugin)
    }

    /// Attaches `plugin` under `key`. Whatever held the key before is deleted.
    pub fn add_plugin(&mut self, holder: Uid, key: PluginKey, plugin: Uid) -> Result<(), WorldError> {
        self.attach_plugin(holder, key, plugin, false, true)
    }

    /// Reachable by key only; holder-wide triggers skip it.
    pub fn add_plugin_as_simple(
        &mut self,
        holder: Uid,
        key: PluginKey,
        plugin: Uid,
    ) -> Result<(), WorldError> {
        self.attach_plugin(holder, key, plugin, true, true)
    }

    /// Detaches the plugin under `key` without deleting it and fires `unassign` on it.
    pub fn remove_plugin(&mut self, holder: Uid, key: &PluginKey) -> Result<Option<Uid>, WorldError> {
        self.live_thing(holder)?;
        let Some(plugin) = self.get_plugin(holder, key) else {
            return Ok(None);
        };
        self.detach_plugin(plugin);
        Ok(Some(plugin))
    }

    /// Detaches, fires `destroy` on, and frees a plugin.
    pub fn delete_plugin(&mut self, plugin: Uid) -> Result<(), WorldError> {
        let existing = self
            .plugins
            .get(plugin)
            .ok_or(WorldError::UnknownPlugin { uid: plugin })?;
        if existing.is_deleted() {
            return Ok(());
        }
        self.detach_plugin(plugin);
        let destroy = self.dispatch_keys.destroy.clone();
        self.fire_plugin_try(plugin, &destroy);
        if let Some(existing) = self.plugins.get_mut(plugin) {
            existing.mark_deleted();
        }
        self.plugins.remove_at(plugin);
        debug!(plugin = %plugin, "plugin_deleted");
        Ok(())
    }

    pub fn delete_plugins(&mut self, holder: Uid) -> Result<usize, WorldError> {
        self.live_thing(holder)?;
        self.delete_plugins_of(holder)
    }

    pub fn get_plugin(&self, holder: Uid, key: &PluginKey) -> Option<Uid> {
        self.things.get(holder)?.plugins.get(key)
    }

    pub fn has_plugin(&self, holder: Uid, key: &PluginKey) -> bool {
        self.get_plugin(holder, key).is_some()
    }

    /// Every attached plugin, sorted by key name.
    pub fn plugins_of(&self, holder: Uid) -> Vec<(PluginKey, Uid)> {
        self.things
            .get(holder)
            .map(|thing| thing.plugins.entries())
            .unwrap_or_default()
    }

    /// Non-simple plugins in dispatch order.
    pub fn linked_plugins(&self, holder: Uid) -> Vec<Uid> {
        self.things
            .get(holder)
            .map(|thing| thing.plugins.linked())
            .unwrap_or_default()
    }

    pub(super) fn attach_plugin(
        &mut self,
        holder: Uid,
        key: PluginKey,
        plugin: Uid,
        simple: bool,
        fire_assign: bool,
    ) -> Result<(), WorldError> {
        self.live_thing(holder)?;
        let (current_holder, current_key) = self
            .plugins
            .get(plugin)
            .filter(|existing| !existing.is_deleted())
            .map(|existing| (existing.holder(), existing.key().cloned()))
            .ok_or(WorldError::UnknownPlugin { uid: plugin })?;
        match (current_holder, current_key) {
            (Some(current), Some(current_key)) if current == holder && current_key != key => {
                return Err(TriggerError::PluginKeyConflict {
                    plugin,
                    existing: current_key.name().to_string(),
                    requested: key.name().to_string(),
                }
                .into());
            }
            (Some(current), _) if current != holder => {
                self.detach_plugin(plugin);
            }
            _ => {}
        }

        let displaced = match self.things.get_mut(holder) {
            Some(thing) => thing.plugins.insert(key.clone(), plugin, simple),
            None => return Err(WorldError::UnknownThing { uid: holder }),
        };
        if let Some(attached) = self.plugins.get_mut(plugin) {
            attached.attach(holder, key.clone(), simple);
        }
        debug!(holder = %holder, plugin = %plugin, key = %key, simple, "plugin_attached");
        if let Some(old) = displaced {
            self.delete_plugin(old)?;
        }
        if fire_assign {
            let assign = self.dispatch_keys.assign.clone();
            self.fire_plugin_try(plugin, &assign);
        }
        Ok(())
    }

    pub(super) fn delete_plugins_of(&mut self, holder: Uid) -> Result<usize, WorldError> {
        let drained = match self.things.get_mut(holder) {
            Some(thing) => thing.plugins.drain(),
            None => return Ok(0),
        };
        for plugin in &drained {
            // Drained slots no longer list the plugin; clear its side before deleting.
            if let Some(attached) = self.plugins.get_mut(*plugin) {
                attached.detach();
            }
            let unassign = self.dispatch_keys.unassign.clone();
            self.fire_plugin_try(*plugin, &unassign);
            self.delete_plugin(*plugin)?;
        }
        Ok(drained.len())
    }

    fn detach_plugin(&mut self, plugin: Uid) -> bool {
        let Some(holder) = self.plugins.get(plugin).and_then(Plugin::holder) else {
            return false;
        };
        if let Some(thing) = self.things.get_mut(holder) {
            thing.plugins.remove_plugin(plugin);
        }
        if let Some(attached) = self.plugins.get_mut(plugin) {
            attached.detach();
        }
        debug!(holder = %holder, plugin = %plugin, "plugin_detached");
        let unassign = self.dispatch_keys.unassign.clone();
        self.fire_plugin_try(plugin, &unassign);
        true
    }

    fn fire_plugin_try(&mut self, plugin: Uid, key: &TriggerKey) -> Option<ScriptValue> {
        let def = self.plugins.get(plugin).map(|p| Arc::clone(p.def()))?;
        def.try_run(self, TriggerSubject::Plugin(plugin), key, &ScriptArgs::empty())
    }

    fn live_plugin_def(&self, plugin: Handle) -> Option<Arc<PluginDef<World>>> {
        self.plugins
            .resolve(plugin)
            .filter(|existing| !existing.is_deleted())
            .map(|existing| Arc::clone(existing.def()))
    }

    fn attached_plugin_def(&self, plugin: Uid, holder: Uid) -> Option<Arc<PluginDef<World>>> {
        self.plugins
            .get(plugin)
            .filter(|existing| !existing.is_deleted() && existing.holder() == Some(holder))
            .map(|existing| Arc::clone(existing.def()))
    }

    fn thing_dispatch(&self, uid: Uid) -> Result<ThingDispatch, WorldError> {
        let thing = self.things.get(uid).ok_or(WorldError::UnknownThing { uid })?;
        Ok(ThingDispatch {
            registered: self.registered_groups.clone(),
            own: thing.trigger_groups.clone(),
            plugins: thing.plugins.linked(),
            def: self
                .def_holders
                .get(thing.def().0 as usize)
                .cloned()
                .unwrap_or_default(),
        })
    }
}
