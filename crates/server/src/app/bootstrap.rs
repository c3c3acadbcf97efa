use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use world_engine::{
    compile_def_database, resolve_app_paths, AppPaths, CoreConfig, DefDatabase, TriggerGroupRegistry,
    World,
};

use super::scripts::build_trigger_groups;

const ENABLED_MODS_ENV_VAR: &str = "WORLD_ENGINE_ENABLED_MODS";
const DEFAULT_TICK_MILLIS: u64 = 250;
const DEFAULT_AUTOSAVE_EVERY_TICKS: u64 = 2400;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) core: CoreConfig,
    pub(crate) tick_millis: u64,
    /// 0 disables autosave.
    pub(crate) autosave_every_ticks: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            tick_millis: DEFAULT_TICK_MILLIS,
            autosave_every_ticks: DEFAULT_AUTOSAVE_EVERY_TICKS,
        }
    }
}

pub(crate) struct ServerWiring {
    pub(crate) paths: AppPaths,
    pub(crate) config: ServerConfig,
    pub(crate) defs: DefDatabase,
    pub(crate) registry: TriggerGroupRegistry<World>,
}

pub(crate) fn build_server() -> Result<ServerWiring, String> {
    init_tracing();
    info!("=== World Server Startup ===");

    let paths = resolve_app_paths().map_err(|error| error.to_string())?;
    let config = load_server_config(&paths.config_path)?;
    let enabled_mods = parse_enabled_mods_from_env();
    let defs = compile_def_database(&paths, &enabled_mods).map_err(|error| error.to_string())?;
    let registry = build_trigger_groups().map_err(|error| error.to_string())?;
    info!(
        thing_defs = defs.thing_defs().len(),
        plugin_defs = defs.plugin_defs().len(),
        trigger_groups = registry.len(),
        mods = enabled_mods.len(),
        "server_content_ready"
    );

    Ok(ServerWiring {
        paths,
        config,
        defs,
        registry,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// A missing file means defaults.
pub(crate) fn load_server_config(path: &Path) -> Result<ServerConfig, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "server_config_missing_using_defaults");
            return Ok(ServerConfig::default());
        }
        Err(error) => return Err(format!("read config '{}': {error}", path.display())),
    };
    parse_server_config_json(&raw)
}

fn parse_server_config_json(raw: &str) -> Result<ServerConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let config = match serde_path_to_error::deserialize::<_, ServerConfig>(&mut deserializer) {
        Ok(config) => config,
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            return if path.is_empty() || path == "." {
                Err(format!("parse config json: {source}"))
            } else {
                Err(format!("parse config json at {path}: {source}"))
            };
        }
    };
    config
        .core
        .validate()
        .map_err(|reason| format!("validation failed at core: {reason}"))?;
    if config.tick_millis == 0 {
        return Err("validation failed at tick_millis: must be >= 1".to_string());
    }
    Ok(config)
}

fn parse_enabled_mods_from_env() -> Vec<String> {
    std::env::var(ENABLED_MODS_ENV_VAR)
        .ok()
        .map(|raw| parse_enabled_mods(&raw))
        .unwrap_or_default()
}

fn parse_enabled_mods(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
}
