mod group;
mod holder;
mod list;
mod plugin;

use std::fmt;

use thiserror::Error;

use crate::uid::Uid;
use crate::value::ScriptArgs;

pub use group::{TriggerFn, TriggerGroup, TriggerGroupBuilder, TriggerGroupRegistry};
pub use holder::DefTriggerGroupHolder;
pub use list::TriggerGroupList;
pub use plugin::{Plugin, PluginDef, PluginSlots};

pub const GLOBAL_GROUP_SUFFIX: &str = "_global";
pub const NO_TRIGGER_GROUP: &str = "0";

/// Whatever handlers get mutable access to while they run, plus the subject type that tells
/// them who they are running for.
pub trait TriggerContext {
    type Subject: Copy + fmt::Debug;

    /// Called after a `try_*` dispatch has logged a handler failure.
    fn handler_failed(&mut self, _subject: Self::Subject, _args: &ScriptArgs, _error: &TriggerError) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    Continue,
    Cancel,
}

impl TriggerResult {
    pub fn is_cancelled(self) -> bool {
        self == Self::Cancel
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLocation {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for ScriptLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub message: String,
    pub location: Option<ScriptLocation>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = Some(ScriptLocation {
            file: file.into(),
            line,
        });
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({location})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ScriptError {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger @{trigger} failed in group {group}: {source}")]
    Handler {
        group: String,
        trigger: String,
        #[source]
        source: ScriptError,
    },
    #[error("duplicate trigger group registration: {name}")]
    DuplicateTriggerGroup { name: String },
    #[error("plugin {plugin} is already attached under key {existing}; cannot also attach it as {requested}")]
    PluginKeyConflict {
        plugin: Uid,
        existing: String,
        requested: String,
    },
}
