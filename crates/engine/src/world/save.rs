use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::content::DefDatabase;
use crate::persist::{
    PersistError, SavedThing, WorldSnapshot, PLUGIN_PREFIX, SIMPLE_PLUGIN_SUFFIX,
    SNAPSHOT_FORMAT_VERSION, TRIGGER_GROUP_PROPERTY,
};
use crate::trigger::TriggerGroupRegistry;
use crate::uid::{Uid, UidSlot};

use super::{World, WorldError};

impl World {
    /// Captures every live thing. Containers precede their contents and siblings keep
    /// list order, so restoring in reverse rebuilds identical lists.
    pub fn snapshot(&mut self) -> WorldSnapshot {
        let live = self
            .things
            .uids()
            .into_iter()
            .filter(|uid| self.is_live(*uid))
            .collect::<HashSet<_>>();
        let is_live = |uid: Uid| live.contains(&uid);

        let mut things = Vec::with_capacity(live.len());
        for uid in self.snapshot_order() {
            let Some(thing) = self.things.get_mut(uid) else {
                continue;
            };
            let mut properties = Vec::<(String, String)>::new();
            for name in thing.trigger_groups.names() {
                properties.push((TRIGGER_GROUP_PROPERTY.to_string(), name));
            }
            thing.tags.save(&mut properties, is_live);

            // Linked plugins oldest first, then simple ones; re-attaching in this order
            // restores dispatch order.
            let linked = thing.plugins.linked();
            let mut ordered = linked
                .iter()
                .rev()
                .filter_map(|plugin| thing.plugins.key_of(*plugin).map(|key| (key, *plugin)))
                .collect::<Vec<_>>();
            ordered.extend(
                thing
                    .plugins
                    .entries()
                    .into_iter()
                    .filter(|(_, plugin)| !linked.contains(plugin)),
            );
            for (key, plugin) in ordered {
                let Some(plugin) = self.plugins.get_mut(plugin) else {
                    continue;
                };
                let suffix = if plugin.is_simple() { SIMPLE_PLUGIN_SUFFIX } else { "" };
                properties.push((
                    format!("{PLUGIN_PREFIX}{}{suffix}", key.name()),
                    plugin.def().name().to_string(),
                ));
                let mut plugin_properties = Vec::<(String, String)>::new();
                plugin.tags.save(&mut plugin_properties, is_live);
                for (name, value) in plugin_properties {
                    properties.push((format!("{PLUGIN_PREFIX}{}:{name}", key.name()), value));
                }
            }

            let def = self
                .defs
                .thing_def(thing.def())
                .map(|def| def.def_name.clone())
                .unwrap_or_default();
            things.push(SavedThing {
                uid: uid.get(),
                def,
                container: thing.container().map(Uid::get),
                point: thing.point,
                properties,
            });
        }

        let mut root = Vec::<(String, String)>::new();
        self.root_tags.save(&mut root, is_live);

        info!(things = things.len(), tick = self.tick, "world_snapshot_taken");
        WorldSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            content_fingerprint: self.defs.fingerprint().to_string(),
            tick: self.tick,
            things,
            root,
        }
    }

    /// Rebuilds a world from `snapshot`, then finishes loading so `afterLoad` fires.
    pub fn restore(
        config: CoreConfig,
        defs: DefDatabase,
        registry: TriggerGroupRegistry<World>,
        snapshot: &WorldSnapshot,
    ) -> Result<World, WorldError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::FormatVersion {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            }
            .into());
        }
        let mut world = World::new(config, defs, registry)?;
        if snapshot.content_fingerprint != world.defs.fingerprint() {
            warn!(
                saved = %snapshot.content_fingerprint,
                current = %world.defs.fingerprint(),
                "snapshot_content_changed"
            );
        }

        let mut loaded = Vec::with_capacity(snapshot.things.len());
        for saved in &snapshot.things {
            let uid = world
                .load_thing(&saved.def, saved.uid)
                .map_err(|error| match error {
                    WorldError::UnknownDef { def_name } => PersistError::UnknownDef {
                        uid: saved.uid,
                        def_name,
                    }
                    .into(),
                    other => other,
                })?;
            if let Some(thing) = world.things.get_mut(uid) {
                thing.point = saved.point;
            }
            loaded.push(uid);
        }

        for (saved, uid) in snapshot.things.iter().zip(&loaded).rev() {
            let Some(raw_container) = saved.container else {
                continue;
            };
            let container = Uid::new(raw_container)
                .filter(|container| world.things.contains(*container))
                .ok_or(PersistError::MissingContainer {
                    uid: saved.uid,
                    container: raw_container,
                })?;
            world.add_to_container(container, *uid)?;
        }

        for (saved, uid) in snapshot.things.iter().zip(&loaded) {
            for (name, value) in &saved.properties {
                world.load_property(*uid, name, value)?;
            }
        }

        let keys = Arc::clone(&world.keys);
        for (name, value) in &snapshot.root {
            if !world.root_tags.load_line(name, value, &keys)? {
                return Err(PersistError::UnknownProperty {
                    name: name.clone(),
                    owner: "root".to_string(),
                }
                .into());
            }
        }

        world.tick = snapshot.tick;
        world.loading_finished();
        info!(things = loaded.len(), tick = world.tick, "world_restored");
        Ok(world)
    }

    fn snapshot_order(&self) -> Vec<Uid> {
        let mut order = Vec::with_capacity(self.things.len());
        for uid in self.things.uids() {
            let top_level = self
                .things
                .get(uid)
                .is_some_and(|thing| !thing.is_deleted() && thing.container().is_none());
            if !top_level {
                continue;
            }
            let mut stack = vec![uid];
            while let Some(current) = stack.pop() {
                order.push(current);
                if let Some(list) = self.things.get(current).and_then(|thing| thing.contents) {
                    let members = list.iter(&self.things).collect::<Vec<_>>();
                    stack.extend(members.into_iter().rev());
                }
            }
        }
        order
    }

    fn load_property(&mut self, uid: Uid, name: &str, value: &str) -> Result<(), WorldError> {
        let unknown = || PersistError::UnknownProperty {
            name: name.to_string(),
            owner: uid.to_string(),
        };

        if name.eq_ignore_ascii_case(TRIGGER_GROUP_PROPERTY) {
            match self.trigger_group(value.trim()) {
                Some(group) => {
                    if let Some(thing) = self.things.get_mut(uid) {
                        thing.trigger_groups.append(group);
                    }
                }
                None => warn!(uid = %uid, group = value, "trigger_group_unresolved"),
            }
            return Ok(());
        }

        if let Some(rest) = name.strip_prefix(PLUGIN_PREFIX) {
            if let Some((key_name, inner)) = rest.split_once(':') {
                let key = self.keys.acquire(key_name);
                let plugin = self.get_plugin(uid, &key).ok_or_else(unknown)?;
                let keys = Arc::clone(&self.keys);
                let plugin = self
                    .plugins
                    .get_mut(plugin)
                    .ok_or(WorldError::UnknownPlugin { uid: plugin })?;
                if !plugin.tags.load_line(inner, value, &keys)? {
                    return Err(unknown().into());
                }
                return Ok(());
            }
            let (key_name, simple) = match rest.strip_suffix(SIMPLE_PLUGIN_SUFFIX) {
                Some(key_name) => (key_name, true),
                None => (rest, false),
            };
            if key_name.is_empty() {
                return Err(unknown().into());
            }
            let plugin = self.create_plugin(value.trim())?;
            let key = self.keys.acquire(key_name);
            return self.attach_plugin(uid, key, plugin, simple, false);
        }

        let keys = Arc::clone(&self.keys);
        let thing = self
            .things
            .get_mut(uid)
            .ok_or(WorldError::UnknownThing { uid })?;
        if !thing.tags.load_line(name, value, &keys)? {
            return Err(unknown().into());
        }
        Ok(())
    }
}
