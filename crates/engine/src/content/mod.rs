mod compiler;
mod database;
mod discovery;
mod hashing;

pub use compiler::{compile_def_database, ContentCompileError, ContentErrorCode, SourceLocation};
pub use database::{
    ComponentDef, DefDatabase, PluginDefId, PluginDefRecord, ThingDefId, ThingDefRecord, ThingKind,
};
pub use discovery::ContentDiscoveryError;

#[cfg(test)]
pub(crate) use database::test_support;
