use std::sync::{Arc, Mutex};

use super::*;
use crate::content::test_support::{database, plugin, thing};
use crate::content::ComponentDef;
use crate::keys::{PluginKey, TagKey};
use crate::persist::{PersistError, SNAPSHOT_FORMAT_VERSION};
use crate::trigger::{ScriptError, TriggerResult};
use crate::value::ScriptValue;

type Log = Arc<Mutex<Vec<String>>>;

fn key(name: &str) -> TriggerKey {
    TriggerKey::acquire(name)
}

fn subject_tag(subject: TriggerSubject) -> String {
    match subject {
        TriggerSubject::Root => "root".to_string(),
        TriggerSubject::Thing(uid) => uid.get().to_string(),
        TriggerSubject::Plugin(uid) => format!("p{}", uid.get()),
    }
}

fn logging_group(name: &str, log: &Log, triggers: &[&str]) -> TriggerGroup<World> {
    let mut builder = TriggerGroup::builder(name);
    for trigger in triggers {
        let log = Arc::clone(log);
        let label = format!("{name}:{trigger}");
        builder = builder.on(
            key(trigger),
            move |_world: &mut World, subject: TriggerSubject, _args: &ScriptArgs| {
                log.lock()
                    .expect("log")
                    .push(format!("{label}:{}", subject_tag(subject)));
                Ok(ScriptValue::None)
            },
        );
    }
    builder.build()
}

fn defs() -> DefDatabase {
    let mut house = thing("m_house", ThingKind::Multi, &[]);
    house.components = vec![
        ComponentDef {
            model: 0x64,
            offset: ComponentOffset { x: 0, y: 0, z: 0 },
        },
        ComponentDef {
            model: 0x65,
            offset: ComponentOffset { x: 1, y: 0, z: 0 },
        },
    ];
    database(
        vec![
            thing("i_chest", ThingKind::Container, &["t_chest"]),
            thing("i_gold", ThingKind::Item, &[]),
            thing("c_man", ThingKind::Character, &["t_char", "t_missing"]),
            house,
        ],
        vec![
            plugin("p_regen", Some("t_regen"), Some("t_regen_native")),
            plugin("p_marker", Some("t_marker"), None),
        ],
    )
}

fn registry(log: &Log) -> TriggerGroupRegistry<World> {
    let mut registry = TriggerGroupRegistry::new();
    let groups: [(&str, &[&str]); 8] = [
        ("t_chest", &["create", "destroy", "open"]),
        ("t_char", &["open"]),
        ("t_regen", &["assign", "unassign", "destroy", "open"]),
        ("t_regen_native", &["open"]),
        ("t_marker", &["open"]),
        ("t_world", &["open"]),
        ("t_own", &["open", "assign", "unassign"]),
        ("t_world_global", &["tick_event"]),
    ];
    for (name, triggers) in groups {
        registry
            .register(logging_group(name, log, triggers))
            .expect("register");
    }
    registry
}

fn new_world(log: &Log) -> World {
    World::new(CoreConfig::default(), defs(), registry(log)).expect("world")
}

fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().expect("log"))
}

fn create(world: &mut World, def_name: &str) -> Uid {
    world.create_thing(def_name).expect("create")
}

#[test]
fn containment_is_strict_and_lists_newest_first() {
    let log = Log::default();
    let mut world = new_world(&log);
    let chest = create(&mut world, "i_chest");
    let first = create(&mut world, "i_gold");
    let second = create(&mut world, "i_gold");

    world.add_to_container(chest, first).expect("add first");
    world.add_to_container(chest, second).expect("add second");
    assert_eq!(world.contents(chest).expect("contents"), vec![second, first]);
    assert_eq!(world.container_of(first), Some(chest));
    assert!(matches!(
        world.add_to_container(chest, first),
        Err(WorldError::Containment(ContainmentError::AlreadyLinked { .. }))
    ));

    let bag = create(&mut world, "i_chest");
    world.move_to_container(first, bag).expect("move");
    assert_eq!(world.contents(chest).expect("contents"), vec![second]);
    assert_eq!(world.contents(bag).expect("contents"), vec![first]);

    world.move_to_container(bag, chest).expect("nest bag");
    assert_eq!(world.top_obj(first).expect("top"), chest);
    assert!(matches!(
        world.move_to_container(chest, bag),
        Err(WorldError::ContainmentCycle { .. })
    ));
    assert!(matches!(
        world.add_to_container(first, second),
        Err(WorldError::NotAContainer { .. })
    ));
    assert_eq!(world.container_of(bag), Some(chest));

    assert_eq!(world.remove_from_container(second).expect("remove"), Some(chest));
    assert_eq!(world.container_of(second), None);
    world
        .move_to_point(first, Point::new(10, 12, 0, 0))
        .expect("drop");
    assert_eq!(world.container_of(first), None);
    assert_eq!(
        world.thing(first).and_then(Thing::point),
        Some(Point::new(10, 12, 0, 0))
    );
    assert!(world.contents(bag).expect("contents").is_empty());
}

#[test]
fn delete_cascades_through_contents_and_closes_views() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    let chest = create(&mut world, "i_chest");
    let bag = create(&mut world, "i_chest");
    let gold = create(&mut world, "i_gold");
    assert_eq!(
        drain(&log),
        vec![format!("t_chest:create:{}", chest.get()), format!("t_chest:create:{}", bag.get())]
    );

    world.add_to_container(bag, gold).expect("gold");
    world.add_to_container(chest, bag).expect("bag");
    world.open_container(man, bag).expect("open");
    world.take_events();

    world.delete_thing(chest).expect("delete");
    for uid in [chest, bag, gold] {
        assert!(!world.is_live(uid));
        assert!(world.thing(uid).is_none());
    }
    assert_eq!(world.thing_count(), 1);
    assert_eq!(
        drain(&log),
        vec![format!("t_chest:destroy:{}", bag.get()), format!("t_chest:destroy:{}", chest.get())]
    );
    assert_eq!(
        world.take_events(),
        vec![WorldEvent::ContainerClosed(ContainerClosed {
            observer: man,
            container: bag,
        })]
    );
    assert!(matches!(
        world.delete_thing(chest),
        Err(WorldError::UnknownThing { .. })
    ));
}

#[test]
fn destroy_handler_may_delete_a_sibling_mid_walk() {
    let log = Log::default();
    let mut registry = registry(&log);
    let victim_key = TagKey::acquire("victim");
    let handler_key = victim_key.clone();
    registry
        .register(
            TriggerGroup::builder("t_vengeful")
                .on(
                    key("destroy"),
                    move |world: &mut World, subject: TriggerSubject, _args: &ScriptArgs| {
                        let TriggerSubject::Thing(uid) = subject else {
                            return Ok(ScriptValue::None);
                        };
                        let victim = world
                            .thing(uid)
                            .and_then(|thing| thing.tags.get_tag(&handler_key))
                            .and_then(ScriptValue::as_thing);
                        if let Some(victim) = victim {
                            world
                                .delete_thing(victim)
                                .map_err(|error| ScriptError::new(error.to_string()))?;
                        }
                        // Deleting ourselves again is a no-op.
                        world
                            .delete_thing(uid)
                            .map_err(|error| ScriptError::new(error.to_string()))?;
                        Ok(ScriptValue::None)
                    },
                )
                .build(),
        )
        .expect("register");
    let mut world = World::new(CoreConfig::default(), defs(), registry).expect("world");

    let chest = create(&mut world, "i_chest");
    let gold = create(&mut world, "i_gold");
    let bag = create(&mut world, "i_chest");
    world.add_to_container(chest, gold).expect("gold");
    world.add_to_container(chest, bag).expect("bag");
    world.add_trigger_group_by_name(bag, "t_vengeful").expect("group");
    if let Some(bag) = world.thing_mut(bag) {
        bag.tags.set_tag(victim_key, ScriptValue::Thing(gold));
    }

    world.delete_thing(chest).expect("delete");
    assert_eq!(world.thing_count(), 0);
}

#[test]
fn dispatch_runs_registered_own_plugins_then_def_groups() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    let world_group = world.trigger_group("t_world").expect("t_world");
    assert!(world.register_thing_trigger_group(world_group));
    assert!(world.add_trigger_group_by_name(man, "T_OWN").expect("own"));
    assert!(!world.add_trigger_group_by_name(man, "t_own").expect("own again"));

    let regen = world.create_plugin("p_regen").expect("regen");
    world
        .add_plugin(man, PluginKey::acquire("regen"), regen)
        .expect("attach regen");
    let marker = world.create_plugin("p_marker").expect("marker");
    world
        .add_plugin_as_simple(man, PluginKey::acquire("marker"), marker)
        .expect("attach marker");
    assert_eq!(
        drain(&log),
        vec![
            format!("t_own:assign:{}", man.get()),
            format!("t_regen:assign:p{}", regen.get()),
        ]
    );

    let result = world
        .trigger(man, &key("open"), &ScriptArgs::empty())
        .expect("trigger");
    assert_eq!(result, Some(ScriptValue::None));
    let m = man.get();
    let r = regen.get();
    assert_eq!(
        drain(&log),
        vec![
            format!("t_world:open:{m}"),
            format!("t_own:open:{m}"),
            format!("t_regen:open:p{r}"),
            format!("t_regen_native:open:p{r}"),
            format!("t_char:open:{m}"),
        ]
    );

    let marker_handle = world.plugin_handle(marker).expect("marker handle");
    world
        .trigger_plugin(marker_handle, &key("open"), &ScriptArgs::empty())
        .expect("plugin trigger");
    assert_eq!(drain(&log), vec![format!("t_marker:open:p{}", marker.get())]);

    assert_eq!(
        world.trigger(man, &key("never_handled"), &ScriptArgs::empty()).expect("quiet"),
        None
    );
}

#[test]
fn cancellable_trigger_stops_at_first_cancel() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    let world_group = world.trigger_group("t_world").expect("t_world");
    world.register_thing_trigger_group(world_group);
    let veto = Arc::new(
        TriggerGroup::builder("t_veto")
            .on(key("open"), |_world: &mut World, _subject: TriggerSubject, _args: &ScriptArgs| {
                Ok(ScriptValue::Int(1))
            })
            .build(),
    );

    assert_eq!(
        world
            .cancellable_trigger(man, &key("open"), &ScriptArgs::empty())
            .expect("no veto"),
        TriggerResult::Continue
    );
    drain(&log);

    world.add_trigger_group(man, &veto).expect("veto");
    assert_eq!(
        world
            .try_cancellable_trigger(man, &key("open"), &ScriptArgs::empty())
            .expect("veto"),
        TriggerResult::Cancel
    );
    assert_eq!(drain(&log), vec![format!("t_world:open:{}", man.get())]);

    assert!(world.remove_trigger_group(man, &veto).expect("remove"));
    assert!(!world.has_trigger_group(man, &veto));
}

#[test]
fn gold_lives_through_link_veto_unlink_and_release() {
    let log = Log::default();
    let mut world = new_world(&log);
    let gold = create(&mut world, "i_gold");
    assert_eq!(gold.get(), 1);
    let chest = create(&mut world, "i_chest");
    world.add_to_container(chest, gold).expect("link");
    assert_eq!(world.contents(chest).expect("contents").len(), 1);

    let create_veto = Arc::new(
        TriggerGroup::builder("t_create_veto")
            .on(key("create"), |_world: &mut World, _subject: TriggerSubject, _args: &ScriptArgs| {
                Ok(ScriptValue::Int(1))
            })
            .build(),
    );
    world.add_trigger_group(gold, &create_veto).expect("attach");
    assert_eq!(
        world
            .cancellable_trigger(gold, &key("create"), &ScriptArgs::empty())
            .expect("create"),
        TriggerResult::Cancel
    );
    assert_eq!(world.contents(chest).expect("contents").len(), 1);

    assert_eq!(world.remove_from_container(gold).expect("unlink"), Some(chest));
    assert!(world.contents(chest).expect("contents").is_empty());
    assert_eq!(world.container_of(gold), None);

    world.delete_thing(gold).expect("release");
    assert!(world.thing(gold).is_none());
    assert!(world.is_live(chest));
}

#[test]
fn failed_handler_notifies_actor_and_later_groups_still_run() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    let broken = Arc::new(
        TriggerGroup::builder("t_broken")
            .at("scripts/broken.scp", 12)
            .on(key("open"), |_world: &mut World, _subject: TriggerSubject, _args: &ScriptArgs| {
                Err(ScriptError::new("missing tag").at("scripts/broken.scp", 14))
            })
            .build(),
    );
    world.add_trigger_group(man, &broken).expect("broken");

    let args = ScriptArgs::empty().with_actor(man);
    let result = world.try_trigger(man, &key("open"), &args).expect("try");
    assert_eq!(result, Some(ScriptValue::None));
    assert_eq!(drain(&log), vec![format!("t_char:open:{}", man.get())]);
    let events = world.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        WorldEvent::FailureNotice { actor, message } if *actor == man && message.contains("missing tag")
    ));

    let error = world
        .trigger(man, &key("open"), &args)
        .expect_err("strict trigger fails");
    assert!(matches!(
        error,
        WorldError::Trigger(TriggerError::Handler { ref group, .. }) if group == "t_broken"
    ));
    assert!(drain(&log).is_empty());
    assert!(world.take_events().is_empty());
}

#[test]
fn replacing_a_plugin_key_deletes_the_old_plugin() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    let regen_key = PluginKey::acquire("regen");

    let first = world.create_plugin("p_regen").expect("first");
    world.add_plugin(man, regen_key.clone(), first).expect("first");
    let second = world.create_plugin("p_regen").expect("second");
    world.add_plugin(man, regen_key.clone(), second).expect("second");
    assert!(world.plugin(first).is_none());
    assert_eq!(world.get_plugin(man, &regen_key), Some(second));
    assert_eq!(
        drain(&log),
        vec![
            format!("t_regen:assign:p{}", first.get()),
            format!("t_regen:unassign:p{}", first.get()),
            format!("t_regen:destroy:p{}", first.get()),
            format!("t_regen:assign:p{}", second.get()),
        ]
    );

    assert!(matches!(
        world.add_plugin(man, PluginKey::acquire("other"), second),
        Err(WorldError::Trigger(TriggerError::PluginKeyConflict { .. }))
    ));
    assert!(matches!(
        world.create_plugin("p_missing"),
        Err(WorldError::UnknownPluginDef { .. })
    ));

    assert_eq!(world.remove_plugin(man, &regen_key).expect("remove"), Some(second));
    assert_eq!(world.plugin(second).and_then(Plugin::holder), None);
    assert!(!world.has_plugin(man, &regen_key));

    world.add_plugin(man, regen_key.clone(), second).expect("again");
    assert_eq!(world.plugins_of(man).len(), 1);
    world.delete_thing(man).expect("delete holder");
    assert!(world.plugin(second).is_none());
}

#[test]
fn deleted_plugins_go_quiet_even_after_their_uid_is_reused() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    let marker = world.create_plugin("p_marker").expect("marker");
    world
        .add_plugin_as_simple(man, PluginKey::acquire("marker"), marker)
        .expect("attach marker");
    let stale = world.plugin_handle(marker).expect("handle");
    world.delete_plugin(marker).expect("delete");
    assert_eq!(world.plugin_handle(marker), None);
    drain(&log);

    let open = key("open");
    assert_eq!(
        world.trigger_plugin(stale, &open, &ScriptArgs::empty()).expect("quiet"),
        None
    );
    assert_eq!(world.try_trigger_plugin(stale, &open, &ScriptArgs::empty()), None);

    let reused = (0..4096)
        .map(|_| world.create_plugin("p_marker").expect("create"))
        .find(|uid| *uid == marker)
        .expect("slot reused");
    assert_ne!(world.plugin_handle(reused), Some(stale));
    drain(&log);
    assert_eq!(
        world.trigger_plugin(stale, &open, &ScriptArgs::empty()).expect("still quiet"),
        None
    );
    assert!(drain(&log).is_empty());

    let fresh = world.plugin_handle(reused).expect("fresh handle");
    world
        .trigger_plugin(fresh, &open, &ScriptArgs::empty())
        .expect("fresh trigger");
    assert_eq!(drain(&log), vec![format!("t_marker:open:p{}", reused.get())]);
}

#[test]
fn moving_a_plugin_between_holders_detaches_it_first() {
    let log = Log::default();
    let mut world = new_world(&log);
    let alice = create(&mut world, "c_man");
    let bob = create(&mut world, "c_man");
    let regen_key = PluginKey::acquire("regen");
    let regen = world.create_plugin("p_regen").expect("regen");

    world.add_plugin(alice, regen_key.clone(), regen).expect("alice");
    world.add_plugin(bob, regen_key.clone(), regen).expect("bob");
    assert!(!world.has_plugin(alice, &regen_key));
    assert_eq!(world.linked_plugins(bob), vec![regen]);
    assert_eq!(world.plugin(regen).and_then(Plugin::holder), Some(bob));
}

#[test]
fn reset_all_uids_compacts_and_rewrites_references() {
    let log = Log::default();
    let mut world = new_world(&log);
    let chest = create(&mut world, "i_chest");
    let doomed_a = create(&mut world, "i_gold");
    let doomed_b = create(&mut world, "i_gold");
    let bag = create(&mut world, "i_chest");
    let coin = create(&mut world, "i_gold");
    world.add_to_container(bag, coin).expect("coin");
    world.add_to_container(chest, bag).expect("bag");
    let loot = TagKey::acquire("loot");
    if let Some(chest) = world.thing_mut(chest) {
        chest.tags.set_tag(loot.clone(), ScriptValue::Thing(coin));
    }
    let coin_handle = world.handle(coin).expect("handle");
    let chest_handle = world.handle(chest).expect("handle");
    world.delete_thing(doomed_a).expect("delete");
    world.delete_thing(doomed_b).expect("delete");

    assert_eq!(world.reset_all_uids(), 2);
    assert_eq!(world.thing_count(), 3);
    assert_eq!(world.highest_uid(), 3);

    let new_bag = Uid::new(2).expect("uid");
    let new_coin = Uid::new(3).expect("uid");
    assert_eq!(world.contents(chest).expect("contents"), vec![new_bag]);
    assert_eq!(world.contents(new_bag).expect("contents"), vec![new_coin]);
    assert_eq!(world.container_of(new_coin), Some(new_bag));
    assert_eq!(
        world.thing(chest).and_then(|thing| thing.tags.get_tag(&loot)),
        Some(&ScriptValue::Thing(new_coin))
    );
    assert_eq!(world.resolve(coin_handle), None);
    assert_eq!(world.resolve(chest_handle), Some(chest));
    assert_eq!(world.reset_all_uids(), 0);
}

#[test]
fn snapshot_round_trip_preserves_structure_and_properties() {
    let log = Log::default();
    let mut world = new_world(&log);
    let chest = create(&mut world, "i_chest");
    let first = create(&mut world, "i_gold");
    let second = create(&mut world, "i_gold");
    let man = create(&mut world, "c_man");
    world
        .move_to_point(chest, Point::new(100, 200, 5, 1))
        .expect("place chest");
    world.add_to_container(chest, first).expect("first");
    world.add_to_container(chest, second).expect("second");
    world.add_trigger_group_by_name(man, "t_own").expect("own");
    if let Some(thing) = world.thing_mut(man) {
        thing
            .tags
            .set_tag(TagKey::acquire("friend"), ScriptValue::Thing(chest));
        thing.tags.set_tag(TagKey::acquire("title"), ScriptValue::from("the brave"));
    }
    world
        .add_timer(
            man,
            TimerKey::acquire("regen_tick"),
            BoundTimer {
                due_tick: 40,
                period: Some(20),
                trigger: key("open"),
            },
        )
        .expect("timer");
    let regen = world.create_plugin("p_regen").expect("regen");
    world
        .add_plugin(man, PluginKey::acquire("regen"), regen)
        .expect("regen");
    let marker = world.create_plugin("p_marker").expect("marker");
    world
        .add_plugin(man, PluginKey::acquire("poison"), marker)
        .expect("poison");
    if let Some(plugin) = world.plugin_mut(regen) {
        plugin.tags.set_tag(TagKey::acquire("rate"), ScriptValue::Int(3));
    }
    world
        .root_tags_mut()
        .set_tag(TagKey::acquire("season"), ScriptValue::Int(2));
    world.tick();

    let saved = world.snapshot();
    assert_eq!(saved.format_version, SNAPSHOT_FORMAT_VERSION);
    assert_eq!(saved.tick, 1);
    let order = saved.things.iter().map(|thing| thing.uid).collect::<Vec<_>>();
    assert_eq!(order, vec![chest.get(), second.get(), first.get(), man.get()]);

    let restored_log = Log::default();
    let mut restored = World::restore(
        CoreConfig::default(),
        defs(),
        registry(&restored_log),
        &saved,
    )
    .expect("restore");
    assert_eq!(
        restored.contents(chest).expect("contents"),
        vec![second, first]
    );
    assert_eq!(
        restored.thing(chest).and_then(Thing::point),
        Some(Point::new(100, 200, 5, 1))
    );
    assert_eq!(
        restored
            .linked_plugins(man)
            .iter()
            .filter_map(|plugin| restored.plugin(*plugin).map(|p| p.def().name().to_string()))
            .collect::<Vec<_>>(),
        vec!["p_marker", "p_regen"]
    );
    // Loading attaches groups and plugins without firing assign.
    assert!(drain(&restored_log).is_empty());
    assert_eq!(restored.snapshot(), saved);
}

#[test]
fn restore_rejects_unknown_defs_and_versions() {
    let log = Log::default();
    let mut world = new_world(&log);
    create(&mut world, "i_chest");
    let mut saved = world.snapshot();

    saved.format_version = SNAPSHOT_FORMAT_VERSION + 1;
    assert!(matches!(
        World::restore(CoreConfig::default(), defs(), registry(&log), &saved),
        Err(WorldError::Persist(PersistError::FormatVersion { .. }))
    ));

    saved.format_version = SNAPSHOT_FORMAT_VERSION;
    saved.things[0].def = "i_vanished".to_string();
    assert!(matches!(
        World::restore(CoreConfig::default(), defs(), registry(&log), &saved),
        Err(WorldError::Persist(PersistError::UnknownDef { uid: 1, .. }))
    ));

    saved.things[0].def = "i_chest".to_string();
    saved.things[0]
        .properties
        .push(("color".to_string(), "blue".to_string()));
    assert!(matches!(
        World::restore(CoreConfig::default(), defs(), registry(&log), &saved),
        Err(WorldError::Persist(PersistError::UnknownProperty { .. }))
    ));
}

#[test]
fn thing_names_die_with_the_thing_and_purge_sweeps_them() {
    let log = Log::default();
    let mut world = new_world(&log);
    let gate = create(&mut world, "i_chest");
    world.set_thing_name("North Gate", gate).expect("name");
    assert_eq!(world.find_thing_by_name("north gate"), Some(gate));

    world.delete_thing(gate).expect("delete");
    assert_eq!(world.find_thing_by_name("NORTH GATE"), None);
    let summary = world.purge_caches();
    assert_eq!(summary.caches, 1);
    assert_eq!(summary.removed_entries, 1);
}

#[test]
fn timers_fire_on_their_tick() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    world
        .add_timer(
            man,
            TimerKey::acquire("wake"),
            BoundTimer {
                due_tick: 2,
                period: None,
                trigger: key("open"),
            },
        )
        .expect("timer");
    world.root_tags_mut().add_timer(
        TimerKey::acquire("daily"),
        BoundTimer {
            due_tick: 1,
            period: None,
            trigger: key("tick_event"),
        },
    );

    assert_eq!(world.tick(), 1);
    assert_eq!(drain(&log), vec!["t_world_global:tick_event:root".to_string()]);
    assert_eq!(world.tick(), 1);
    assert_eq!(drain(&log), vec![format!("t_char:open:{}", man.get())]);
    assert_eq!(world.tick(), 0);
    assert_eq!(world.now(), 3);
}

#[test]
fn global_groups_answer_root_triggers() {
    let log = Log::default();
    let mut world = new_world(&log);
    assert_eq!(
        world
            .trigger_root(&key("tick_event"), &ScriptArgs::empty())
            .expect("root"),
        Some(ScriptValue::None)
    );
    assert_eq!(drain(&log), vec!["t_world_global:tick_event:root".to_string()]);
}

#[test]
fn views_close_when_the_container_leaves_reach() {
    let log = Log::default();
    let mut world = new_world(&log);
    let man = create(&mut world, "c_man");
    let chest = create(&mut world, "i_chest");
    let backpack = create(&mut world, "i_chest");
    let gold = create(&mut world, "i_gold");
    world.move_to_point(man, Point::new(0, 0, 0, 0)).expect("man");
    world.move_to_point(chest, Point::new(1, 2, 0, 0)).expect("chest");
    world.add_to_container(man, backpack).expect("backpack");

    world.open_container(man, chest).expect("open chest");
    world.open_container(man, backpack).expect("open backpack");
    assert!(matches!(
        world.open_container(man, gold),
        Err(WorldError::NotAContainer { .. })
    ));
    assert!(world.has_container_open(man, chest).expect("open"));

    world.move_to_point(chest, Point::new(1, 2, 0, 1)).expect("other map");
    assert!(!world.has_container_open(man, chest).expect("closed"));
    assert_eq!(world.opened_containers(man).expect("opened"), vec![backpack]);
    assert_eq!(world.container_viewers(backpack).expect("viewers"), vec![man]);
    assert_eq!(
        world.take_events(),
        vec![WorldEvent::ContainerClosed(ContainerClosed {
            observer: man,
            container: chest,
        })]
    );
    assert!(world.close_container(man, backpack));
    assert!(!world.close_container(man, backpack));
}

#[test]
fn multis_spawn_components_in_declaration_order() {
    let log = Log::default();
    let mut world = new_world(&log);
    let house = create(&mut world, "m_house");
    let components = world.components(house);
    assert_eq!(components.len(), 2);
    assert_eq!(world.component(components[0]).map(|c| c.model), Some(0x64));

    let east = ComponentOffset { x: 1, y: 0, z: 0 };
    assert_eq!(
        world.find_component(house, east, None).expect("find"),
        Some(components[1])
    );
    assert_eq!(world.find_component(house, east, Some(0x64)).expect("find"), None);

    world.delete_thing(house).expect("delete");
    assert!(components.iter().all(|component| world.component(*component).is_none()));
}

#[test]
fn fake_uids_sit_above_real_ones() {
    let log = Log::default();
    let mut world = new_world(&log);
    let fake = world.get_fake_uid().expect("fake");
    assert!(fake > world.config().max_real_uid());
    assert!(world.is_fake_uid(fake));
    world.dispose_fake_uid(fake).expect("dispose");
    assert!(!world.is_fake_uid(fake));
}

#[test]
fn construction_rejects_bad_config_and_unknown_defs() {
    let log = Log::default();
    let config = CoreConfig {
        uid_queue_max_count: 0,
        ..CoreConfig::default()
    };
    assert!(matches!(
        World::new(config, defs(), registry(&log)),
        Err(WorldError::Config(_))
    ));

    let mut world = new_world(&log);
    assert!(matches!(
        world.create_thing("i_unicorn"),
        Err(WorldError::UnknownDef { .. })
    ));
    let gold = create(&mut world, "i_gold");
    world.delete_thing(gold).expect("delete");
    assert!(matches!(
        world.trigger(gold, &key("open"), &ScriptArgs::empty()),
        Err(WorldError::UnknownThing { .. })
    ));
}

#[test]
fn unload_destroys_every_tree_and_loose_plugin() {
    let log = Log::default();
    let mut world = new_world(&log);
    let chest = create(&mut world, "i_chest");
    let gold = create(&mut world, "i_gold");
    world.add_to_container(chest, gold).expect("add");
    let man = create(&mut world, "c_man");
    let regen = world.create_plugin("p_regen").expect("regen");
    world
        .add_plugin(man, PluginKey::acquire("regen"), regen)
        .expect("attach");
    world.create_plugin("p_marker").expect("loose marker");
    drain(&log);

    assert_eq!(world.unload().expect("unload"), 3);
    let calls = drain(&log);
    assert!(calls.contains(&format!("t_chest:destroy:{}", chest.get())), "{calls:?}");
    assert!(calls.contains(&format!("t_regen:destroy:p{}", regen.get())), "{calls:?}");
}
