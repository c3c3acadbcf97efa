pub mod cache;
pub mod commands;
pub mod config;
pub mod containment;
pub mod content;
pub mod keys;
pub mod paths;
pub mod persist;
pub mod tags;
pub mod trigger;
pub mod uid;
pub mod value;
pub mod visibility;
pub mod world;

pub use cache::{CacheDictionary, PurgeRegistry, PurgeSummary, WeakRefDictionary};
pub use commands::{
    AdminCommand, CommandParseError, CommandProcessor, CommandRegistry, HostCommand,
    ParsedCommand,
};
pub use config::CoreConfig;
pub use content::{
    compile_def_database, ContentCompileError, ContentErrorCode, DefDatabase, SourceLocation,
    ThingKind,
};
pub use keys::{Key, KeyRegistry, PluginKey, TagKey, TimerKey, TriggerKey};
pub use paths::{resolve_app_paths, AppPaths, StartupError, ROOT_ENV_VAR};
pub use persist::{read_snapshot, write_snapshot, PersistError, WorldSnapshot};
pub use tags::{BoundTimer, TagHolder};
pub use trigger::{
    ScriptError, TriggerContext, TriggerError, TriggerGroup, TriggerGroupBuilder,
    TriggerGroupRegistry, TriggerResult,
};
pub use uid::{Handle, Uid, UidArena, UidError};
pub use value::{ScriptArgs, ScriptValue};
pub use visibility::{ContainerClosed, OpenedContainers};
pub use world::{Point, Thing, TriggerSubject, World, WorldError, WorldEvent};
