use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::AppPaths;

#[derive(Debug, Error)]
pub enum ContentDiscoveryError {
    #[error("enabled mod list contains an empty mod id")]
    EmptyEnabledMod,
    #[error("mod id '{mod_id}' must be a plain directory name")]
    InvalidModId { mod_id: String },
    #[error("enabled mod list contains duplicate mod id: {mod_id}")]
    DuplicateEnabledMod { mod_id: String },
    #[error("enabled mod '{mod_id}' not found at {expected_dir}")]
    EnabledModMissing {
        mod_id: String,
        expected_dir: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct ModSource {
    pub mod_id: String,
    pub source_dir: PathBuf,
}

/// Base content first, then enabled mods in the order given. The whole list is
/// validated before any directory is looked at.
pub(crate) fn discover_mod_sources(
    app_paths: &AppPaths,
    enabled_mods: &[String],
) -> Result<Vec<ModSource>, ContentDiscoveryError> {
    let mod_ids = validated_mod_ids(enabled_mods)?;
    let mut sources = vec![ModSource {
        mod_id: "base".to_string(),
        source_dir: app_paths.base_content_dir.clone(),
    }];
    for mod_id in mod_ids {
        let mod_dir = app_paths.mods_dir.join(mod_id);
        ensure_dir_exists(mod_id, &mod_dir)?;
        sources.push(ModSource {
            mod_id: mod_id.to_string(),
            source_dir: mod_dir,
        });
    }
    Ok(sources)
}

fn validated_mod_ids(enabled_mods: &[String]) -> Result<Vec<&str>, ContentDiscoveryError> {
    let mut seen = HashSet::<String>::new();
    let mut mod_ids = Vec::with_capacity(enabled_mods.len());
    for mod_id in enabled_mods {
        let trimmed = mod_id.trim();
        if trimmed.is_empty() {
            return Err(ContentDiscoveryError::EmptyEnabledMod);
        }
        if !is_plain_dir_name(trimmed) {
            return Err(ContentDiscoveryError::InvalidModId {
                mod_id: trimmed.to_string(),
            });
        }
        if trimmed.eq_ignore_ascii_case("base") || !seen.insert(trimmed.to_ascii_lowercase()) {
            return Err(ContentDiscoveryError::DuplicateEnabledMod {
                mod_id: trimmed.to_string(),
            });
        }
        mod_ids.push(trimmed);
    }
    Ok(mod_ids)
}

fn is_plain_dir_name(mod_id: &str) -> bool {
    mod_id != "."
        && mod_id != ".."
        && !mod_id.contains(['/', '\\', ':'])
}

fn ensure_dir_exists(mod_id: &str, path: &Path) -> Result<(), ContentDiscoveryError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ContentDiscoveryError::EnabledModMissing {
            mod_id: mod_id.to_string(),
            expected_dir: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn app_paths(root: &Path) -> AppPaths {
        AppPaths::under_root(root.to_path_buf())
    }

    #[test]
    fn base_is_first_then_enabled_order() {
        let temp = TempDir::new().expect("tempdir");
        let app_paths = app_paths(temp.path());
        fs::create_dir_all(&app_paths.base_content_dir).expect("create base");
        fs::create_dir_all(app_paths.mods_dir.join("b")).expect("create mod b");
        fs::create_dir_all(app_paths.mods_dir.join("a")).expect("create mod a");

        let sources = discover_mod_sources(&app_paths, &["b".to_string(), " a ".to_string()])
            .expect("discover");
        assert_eq!(sources[0].mod_id, "base");
        assert_eq!(sources[1].mod_id, "b");
        assert_eq!(sources[2].mod_id, "a");
        assert_eq!(sources.len(), 3);
    }

    #[test]
    fn missing_and_duplicate_mods_are_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let app_paths = app_paths(temp.path());
        fs::create_dir_all(app_paths.mods_dir.join("a")).expect("create mod a");

        let err = discover_mod_sources(&app_paths, &["ghost".to_string()]).expect_err("missing");
        assert!(matches!(err, ContentDiscoveryError::EnabledModMissing { ref mod_id, .. } if mod_id == "ghost"));

        let err = discover_mod_sources(&app_paths, &["a".to_string(), "a".to_string()])
            .expect_err("duplicate");
        assert!(matches!(err, ContentDiscoveryError::DuplicateEnabledMod { .. }));

        let err = discover_mod_sources(&app_paths, &["  ".to_string()]).expect_err("empty");
        assert!(matches!(err, ContentDiscoveryError::EmptyEnabledMod));
    }

    #[test]
    fn list_errors_win_over_missing_directories() {
        let temp = TempDir::new().expect("tempdir");
        let app_paths = app_paths(temp.path());
        fs::create_dir_all(app_paths.mods_dir.join("a")).expect("create mod a");

        let err = discover_mod_sources(&app_paths, &["A".to_string(), "a".to_string()])
            .expect_err("case duplicate");
        assert!(matches!(err, ContentDiscoveryError::DuplicateEnabledMod { ref mod_id } if mod_id == "a"));

        let err = discover_mod_sources(&app_paths, &["ghost".to_string(), "../up".to_string()])
            .expect_err("invalid after missing");
        assert!(matches!(err, ContentDiscoveryError::InvalidModId { .. }));
    }

    #[test]
    fn mod_ids_cannot_leave_the_mods_dir() {
        let temp = TempDir::new().expect("tempdir");
        let app_paths = app_paths(temp.path());
        for bad in ["..", "../base", "a/b", "c:\\x"] {
            let err = discover_mod_sources(&app_paths, &[bad.to_string()]).expect_err(bad);
            assert!(
                matches!(err, ContentDiscoveryError::InvalidModId { .. }),
                "{bad}: {err:?}"
            );
        }
        let err = discover_mod_sources(&app_paths, &["BASE".to_string()]).expect_err("base");
        assert!(matches!(err, ContentDiscoveryError::DuplicateEnabledMod { .. }));
    }
}
