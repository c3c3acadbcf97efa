use world_engine::{
    BoundTimer, ScriptArgs, ScriptError, ScriptValue, TagKey, TimerKey, TriggerError,
    TriggerGroup, TriggerGroupRegistry, TriggerKey, TriggerSubject, World,
};

const REGEN_PERIOD_TICKS: u64 = 20;
const REGEN_PLUGIN_KEY: &str = "regen";

/// Handlers compiled into the server, registered under the names content refers to.
pub(crate) fn build_trigger_groups() -> Result<TriggerGroupRegistry<World>, TriggerError> {
    let mut registry = TriggerGroupRegistry::new();
    registry.register(container_group())?;
    registry.register(character_group())?;
    registry.register(regen_group())?;
    registry.register(world_global_group())?;
    Ok(registry)
}

fn container_group() -> TriggerGroup<World> {
    TriggerGroup::<World>::builder("t_container")
        .at("scripts.rs", line!())
        .on(TriggerKey::acquire("create"), |world, subject, _args| {
            let TriggerSubject::Thing(uid) = subject else {
                return Ok(ScriptValue::None);
            };
            let now = world.now() as i64;
            let thing = world
                .thing_mut(uid)
                .ok_or_else(|| ScriptError::new(format!("container {uid} vanished")))?;
            thing
                .tags
                .set_tag(TagKey::acquire("created_tick"), ScriptValue::Int(now));
            Ok(ScriptValue::None)
        })
        .on(TriggerKey::acquire("open"), |world, subject, args| {
            let (TriggerSubject::Thing(container), Some(actor)) = (subject, args.actor) else {
                return Ok(ScriptValue::Int(1));
            };
            world
                .open_container(actor, container)
                .map_err(|error| ScriptError::new(error.to_string()))?;
            Ok(ScriptValue::None)
        })
        .build()
}

fn character_group() -> TriggerGroup<World> {
    TriggerGroup::<World>::builder("t_character")
        .at("scripts.rs", line!())
        .on(TriggerKey::acquire("create"), |world, subject, _args| {
            let TriggerSubject::Thing(uid) = subject else {
                return Ok(ScriptValue::None);
            };
            let plugin = world
                .create_plugin("p_regen")
                .map_err(|error| ScriptError::new(error.to_string()))?;
            let key = world.keys().acquire(REGEN_PLUGIN_KEY);
            world
                .add_plugin(uid, key, plugin)
                .map_err(|error| ScriptError::new(error.to_string()))?;
            let timer = BoundTimer {
                due_tick: world.now() + REGEN_PERIOD_TICKS,
                period: Some(REGEN_PERIOD_TICKS),
                trigger: TriggerKey::acquire("regen"),
            };
            world
                .add_timer(uid, TimerKey::acquire("regen"), timer)
                .map_err(|error| ScriptError::new(error.to_string()))?;
            Ok(ScriptValue::None)
        })
        .build()
}

fn regen_group() -> TriggerGroup<World> {
    TriggerGroup::<World>::builder("t_regen")
        .at("scripts.rs", line!())
        .on(TriggerKey::acquire("regen"), |world, subject, _args| {
            let TriggerSubject::Plugin(plugin) = subject else {
                return Ok(ScriptValue::None);
            };
            let pulses = TagKey::acquire("pulses");
            let plugin = world
                .plugin_mut(plugin)
                .ok_or_else(|| ScriptError::new(format!("regen plugin {plugin} vanished")))?;
            let next = plugin
                .tags
                .get_tag(&pulses)
                .and_then(ScriptValue::as_int)
                .unwrap_or(0)
                + 1;
            plugin.tags.set_tag(pulses, ScriptValue::Int(next));
            Ok(ScriptValue::Int(next))
        })
        .build()
}

fn world_global_group() -> TriggerGroup<World> {
    TriggerGroup::<World>::builder("t_world_global")
        .at("scripts.rs", line!())
        .on(TriggerKey::acquire("save"), |world, _subject, _args: &ScriptArgs| {
            let now = world.now() as i64;
            world
                .root_tags_mut()
                .set_tag(TagKey::acquire("last_save_tick"), ScriptValue::Int(now));
            Ok(ScriptValue::None)
        })
        .build()
}

#[cfg(test)]
mod tests {
    use world_engine::{CoreConfig, DefDatabase};

    use super::*;

    #[test]
    fn compiled_groups_register_once() {
        let registry = build_trigger_groups().expect("groups");
        assert_eq!(registry.len(), 4);
        assert!(registry.get("T_CONTAINER").is_some());
        assert_eq!(
            registry.globals().map(|group| group.name().to_string()).collect::<Vec<_>>(),
            vec!["t_world_global".to_string()]
        );
    }

    #[test]
    fn save_trigger_stamps_the_root() {
        let mut world = World::new(
            CoreConfig::default(),
            DefDatabase::default(),
            build_trigger_groups().expect("groups"),
        )
        .expect("world");
        world.tick();
        world.tick();
        world.try_trigger_root(&TriggerKey::acquire("save"), &ScriptArgs::empty());
        assert_eq!(
            world.root_tags().get_tag(&TagKey::acquire("last_save_tick")),
            Some(&ScriptValue::Int(2))
        );
    }
}
