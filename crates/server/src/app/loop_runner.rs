use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use world_engine::{
    read_snapshot, write_snapshot, CommandProcessor, CommandRegistry, HostCommand, ScriptArgs,
    TriggerKey, World, WorldEvent,
};

use super::admin_console::{self, AdminConsole};
use super::bootstrap::ServerWiring;

pub(crate) fn run(wiring: ServerWiring) -> ExitCode {
    let mut server = match ServerLoop::from_wiring(wiring, admin_console::initialize()) {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    loop {
        let started = Instant::now();
        match server.step() {
            StepOutcome::Continue => {}
            StepOutcome::Shutdown => break,
        }
        thread::sleep(server.tick_interval.saturating_sub(started.elapsed()));
    }

    match server.save_world() {
        Ok(()) => {
            info!(tick = server.world.now(), "server_shutdown");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "final_save_failed");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Continue,
    Shutdown,
}

struct ServerLoop {
    world: World,
    commands: CommandProcessor,
    console: AdminConsole,
    snapshot_path: PathBuf,
    tick_interval: Duration,
    autosave_every_ticks: u64,
}

impl ServerLoop {
    fn from_wiring(wiring: ServerWiring, console: AdminConsole) -> Result<Self, String> {
        let ServerWiring {
            paths,
            config,
            defs,
            registry,
        } = wiring;
        let snapshot_path = paths.world_snapshot_path();
        let cache_size = NonZeroUsize::new(config.core.usage_cache_max_queue)
            .ok_or_else(|| "usage_cache_max_queue must be >= 1".to_string())?;

        let world = match read_snapshot(&snapshot_path).map_err(|error| error.to_string())? {
            Some(snapshot) => {
                info!(path = %snapshot_path.display(), "world_snapshot_found");
                World::restore(config.core.clone(), defs, registry, &snapshot)
            }
            None => {
                info!(path = %snapshot_path.display(), "world_snapshot_missing_starting_fresh");
                World::new(config.core.clone(), defs, registry)
            }
        }
        .map_err(|error| error.to_string())?;

        let registry = CommandRegistry::with_builtins()?;
        Ok(Self {
            world,
            commands: CommandProcessor::new(registry, cache_size),
            console,
            snapshot_path,
            tick_interval: Duration::from_millis(config.tick_millis),
            autosave_every_ticks: config.autosave_every_ticks,
        })
    }

    fn step(&mut self) -> StepOutcome {
        let mut lines = Vec::new();
        self.console.poll_lines(&mut lines);
        self.apply_lines(&lines);

        let fired = self.world.tick();
        if fired > 0 {
            debug!(tick = self.world.now(), fired, "timers_fired");
        }
        self.report_events();

        let mut host_commands = Vec::new();
        self.commands.drain_host_commands_into(&mut host_commands);
        let mut outcome = StepOutcome::Continue;
        let mut save_requested = self.autosave_due();
        for command in host_commands {
            match command {
                HostCommand::Save => save_requested = true,
                HostCommand::Shutdown => outcome = StepOutcome::Shutdown,
            }
        }
        // Shutdown saves on the way out.
        if save_requested && outcome == StepOutcome::Continue {
            let reply = match self.save_world() {
                Ok(()) => format!("saved at tick {}", self.world.now()),
                Err(err) => {
                    error!(error = %err, "world_save_failed");
                    format!("error: save failed: {err}")
                }
            };
            self.console.send_output_lines(&[reply]);
        }
        outcome
    }

    fn apply_lines(&mut self, lines: &[String]) {
        for line in lines {
            let output = self.commands.execute(&mut self.world, line);
            if !output.is_empty() {
                self.console.send_output_lines(&output);
            }
        }
    }

    fn autosave_due(&self) -> bool {
        self.autosave_every_ticks > 0 && self.world.now() % self.autosave_every_ticks == 0
    }

    fn report_events(&mut self) {
        for event in self.world.take_events() {
            match event {
                WorldEvent::ContainerClosed(closed) => debug!(
                    observer = %closed.observer,
                    container = %closed.container,
                    "container_closed"
                ),
                WorldEvent::FailureNotice { actor, message } => {
                    warn!(actor = %actor, message = %message, "script_failure_notice");
                    self.console
                        .send_output_lines(&[format!("failure for {actor}: {message}")]);
                }
            }
        }
    }

    /// Save point: give scripts a look first, sweep dead cache entries, then write.
    fn save_world(&mut self) -> Result<(), String> {
        let save_key: TriggerKey = self.world.keys().acquire("save");
        self.world.try_trigger_root(&save_key, &ScriptArgs::empty());
        let purged = self.world.purge_caches();
        let snapshot = self.world.snapshot();
        write_snapshot(&self.snapshot_path, &snapshot).map_err(|error| error.to_string())?;
        info!(
            path = %self.snapshot_path.display(),
            things = snapshot.things.len(),
            purged_entries = purged.removed_entries,
            "world_saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use world_engine::{compile_def_database, AppPaths, TagKey, ScriptValue};

    use super::*;
    use crate::app::bootstrap::ServerConfig;
    use crate::app::scripts::build_trigger_groups;

    fn wiring(root: &TempDir) -> ServerWiring {
        let paths = AppPaths::under_root(root.path().to_path_buf());
        fs::create_dir_all(&paths.base_content_dir).expect("content dir");
        fs::create_dir_all(&paths.mods_dir).expect("mods dir");
        fs::create_dir_all(&paths.save_dir).expect("save dir");
        fs::write(
            paths.base_content_dir.join("defs.xml"),
            r#"<Defs>
                <ThingDef><defName>i_chest</defName><kind>container</kind>
                    <triggerGroups><li>t_container</li></triggerGroups></ThingDef>
                <ThingDef><defName>i_gold</defName><kind>item</kind></ThingDef>
                <ThingDef><defName>c_man</defName><kind>character</kind>
                    <triggerGroups><li>t_character</li></triggerGroups></ThingDef>
                <PluginDef><defName>p_regen</defName><triggerGroup>t_regen</triggerGroup></PluginDef>
            </Defs>"#,
        )
        .expect("defs");
        let defs = compile_def_database(&paths, &[]).expect("compile");
        ServerWiring {
            paths,
            config: ServerConfig {
                autosave_every_ticks: 0,
                ..ServerConfig::default()
            },
            defs,
            registry: build_trigger_groups().expect("groups"),
        }
    }

    #[test]
    fn save_command_writes_a_snapshot_that_restores() {
        let root = TempDir::new().expect("temp");
        let mut server = ServerLoop::from_wiring(wiring(&root), AdminConsole::Disabled)
            .expect("server");
        server.apply_lines(&[
            "spawn i_chest".to_string(),
            "spawn i_gold 1".to_string(),
            "save".to_string(),
        ]);
        assert_eq!(server.step(), StepOutcome::Continue);
        assert!(server.snapshot_path.is_file());

        let restored = ServerLoop::from_wiring(wiring(&root), AdminConsole::Disabled)
            .expect("restored");
        assert_eq!(restored.world.thing_count(), 2);
        assert_eq!(restored.world.now(), 1);
        assert_eq!(
            restored
                .world
                .root_tags()
                .get_tag(&TagKey::acquire("last_save_tick")),
            Some(&ScriptValue::Int(1))
        );
    }

    #[test]
    fn shutdown_stops_the_loop_without_an_extra_save() {
        let root = TempDir::new().expect("temp");
        let mut server = ServerLoop::from_wiring(wiring(&root), AdminConsole::Disabled)
            .expect("server");
        server.apply_lines(&["shutdown".to_string()]);
        assert_eq!(server.step(), StepOutcome::Shutdown);
        assert!(!server.snapshot_path.exists());
    }

    #[test]
    fn character_regen_timer_pulses_its_plugin() {
        let root = TempDir::new().expect("temp");
        let mut server = ServerLoop::from_wiring(wiring(&root), AdminConsole::Disabled)
            .expect("server");
        server.apply_lines(&["spawn c_man".to_string()]);
        for _ in 0..40 {
            server.step();
        }
        let man = server.world.thing_uids()[0];
        let regen = server
            .world
            .get_plugin(man, &server.world.keys().acquire("regen"))
            .expect("regen plugin");
        let pulses = server
            .world
            .plugin(regen)
            .and_then(|plugin| plugin.tags.get_tag(&TagKey::acquire("pulses")).cloned());
        assert_eq!(pulses, Some(ScriptValue::Int(2)));
    }

    #[test]
    fn autosave_follows_the_configured_cadence() {
        let root = TempDir::new().expect("temp");
        let mut wiring = wiring(&root);
        wiring.config.autosave_every_ticks = 3;
        let mut server = ServerLoop::from_wiring(wiring, AdminConsole::Disabled).expect("server");
        server.step();
        server.step();
        assert!(!server.snapshot_path.exists());
        server.step();
        assert!(server.snapshot_path.is_file());
    }
}
