use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::world::Point;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

pub const TAG_PREFIX: &str = "tag.";
pub const TIMER_PREFIX: &str = "%";
pub const PLUGIN_PREFIX: &str = "@@";
pub const SIMPLE_PLUGIN_SUFFIX: &str = "*";
pub const TRIGGER_GROUP_PROPERTY: &str = "TriggerGroup";

/// Receives `name = value` pairs from the save hooks.
pub trait SaveSink {
    fn save_value(&mut self, name: &str, value: &str);
}

impl SaveSink for Vec<(String, String)> {
    fn save_value(&mut self, name: &str, value: &str) {
        self.push((name.to_string(), value.to_string()));
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("unknown property {name} on {owner}")]
    UnknownProperty { name: String, owner: String },
    #[error("saved thing {uid} references missing container {container}")]
    MissingContainer { uid: u32, container: u32 },
    #[error("unknown def '{def_name}' for saved thing {uid}")]
    UnknownDef { uid: u32, def_name: String },
    #[error("unsupported snapshot format version {found}; expected {expected}")]
    FormatVersion { found: u32, expected: u32 },
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
    #[error("failed to write snapshot {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error("failed to read snapshot {path}: {reason}")]
    Read { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub format_version: u32,
    pub content_fingerprint: String,
    pub tick: u64,
    pub things: Vec<SavedThing>,
    #[serde(default)]
    pub root: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedThing {
    pub uid: u32,
    pub def: String,
    #[serde(default)]
    pub container: Option<u32>,
    #[serde(default)]
    pub point: Option<Point>,
    #[serde(default)]
    pub properties: Vec<(String, String)>,
}

/// Writes `<name>.tmp`, moves the previous save to `<name>.bak`, then renames the new
/// file into place. A crash mid-save leaves either the old save or the backup intact.
pub fn write_snapshot(path: &Path, snapshot: &WorldSnapshot) -> Result<(), PersistError> {
    let text = serde_json::to_string_pretty(snapshot)
        .map_err(|error| PersistError::Encode(error.to_string()))?;
    let write_error = |error: io::Error| PersistError::Write {
        path: path.to_path_buf(),
        reason: error.to_string(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    let tmp_path = sibling_path(path, "tmp");
    fs::write(&tmp_path, text.as_bytes()).map_err(write_error)?;

    if path.is_file() {
        let backup_path = sibling_path(path, "bak");
        let rotated = match fs::remove_file(&backup_path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
            _ => fs::rename(path, &backup_path),
        };
        if let Err(error) = rotated {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_error(error));
        }
    }
    fs::rename(&tmp_path, path).map_err(|error| {
        let _ = fs::remove_file(&tmp_path);
        write_error(error)
    })
}

fn sibling_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("world.json"));
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

/// `Ok(None)` when nothing has been saved yet.
pub fn read_snapshot(path: &Path) -> Result<Option<WorldSnapshot>, PersistError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(PersistError::Read {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|error| PersistError::Read {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })
}
