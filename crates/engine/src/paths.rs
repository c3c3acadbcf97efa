use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const ROOT_ENV_VAR: &str = "WORLD_ENGINE_ROOT";

/// Directory layout of a server root.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub base_content_dir: PathBuf,
    pub mods_dir: PathBuf,
    pub save_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn under_root(root: PathBuf) -> Self {
        Self {
            base_content_dir: root.join("content").join("base"),
            mods_dir: root.join("mods"),
            save_dir: root.join("saves"),
            config_path: root.join("config").join("world.json"),
            root,
        }
    }

    pub fn world_snapshot_path(&self) -> PathBuf {
        self.save_dir.join("world.json")
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("WORLD_ENGINE_ROOT is not valid unicode")]
    EnvRootNotUnicode,
    #[error("WORLD_ENGINE_ROOT={path} is not a server root (expected content/base/ or Cargo.toml with crates/)")]
    EnvRootInvalid { path: PathBuf },
    #[error("cannot locate {what}: {source}")]
    Locate {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("no server root above {searched}; set WORLD_ENGINE_ROOT to the directory holding content/base/")]
    RootNotFound { searched: String },
    #[error("failed to create save directory at {path}: {source}")]
    CreateSaveDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolves the server root and makes sure the save directory exists.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = match env::var(ROOT_ENV_VAR) {
        Ok(raw) => {
            let path = canonical_or_raw(Path::new(&raw));
            if !looks_like_server_root(&path) {
                return Err(StartupError::EnvRootInvalid { path });
            }
            path
        }
        Err(env::VarError::NotPresent) => search_for_root(&search_starts()?)?,
        Err(env::VarError::NotUnicode(_)) => return Err(StartupError::EnvRootNotUnicode),
    };
    debug!(root = %root.display(), "server_root_resolved");

    let paths = AppPaths::under_root(root);
    fs::create_dir_all(&paths.save_dir).map_err(|source| StartupError::CreateSaveDir {
        path: paths.save_dir.clone(),
        source,
    })?;
    Ok(paths)
}

/// Working directory first, then the executable's directory.
fn search_starts() -> Result<Vec<PathBuf>, StartupError> {
    let cwd = env::current_dir().map_err(|source| StartupError::Locate {
        what: "working directory",
        source,
    })?;
    let exe = env::current_exe().map_err(|source| StartupError::Locate {
        what: "server executable",
        source,
    })?;
    let mut starts = vec![cwd];
    if let Some(exe_dir) = exe.parent() {
        starts.push(exe_dir.to_path_buf());
    }
    Ok(starts)
}

fn search_for_root(starts: &[PathBuf]) -> Result<PathBuf, StartupError> {
    starts
        .iter()
        .flat_map(|start| start.ancestors())
        .find(|candidate| looks_like_server_root(candidate))
        .map(canonical_or_raw)
        .ok_or_else(|| StartupError::RootNotFound {
            searched: starts
                .iter()
                .map(|start| start.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// A deployed root holds `content/base/`; a source checkout holds `Cargo.toml` and `crates/`.
fn looks_like_server_root(path: &Path) -> bool {
    path.join("content").join("base").is_dir()
        || (path.join("Cargo.toml").is_file() && path.join("crates").is_dir())
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
