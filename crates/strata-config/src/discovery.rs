//! Locating config files and folding them into one [`StrataConfig`].
//!
//! Two files are consulted, each overriding whole sections of the one before:
//! the per-user `config.toml` and the working directory's `strata.toml`.
//! `--config <path>` bypasses discovery and reads a single file.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, StrataConfig};

const PROJECT_FILE: &str = "strata.toml";
const USER_FILE: &str = "config.toml";
const USER_DIR_ENV: &str = "STRATA_CONFIG_DIR";

/// Which role a config file played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    User,
    Project,
    /// Named on the command line.
    Explicit,
}

/// One file that discovery looked at.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    /// False when the file was absent or rejected.
    pub loaded: bool,
}

/// The merged configuration and how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: StrataConfig,
    /// Lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Files that exist but could not be used.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Read exactly one file. Unlike discovery, any failure is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = load_config_file(path)?;
        config.validate()?;
        Ok(Self {
            config,
            sources: vec![ConfigSource {
                layer: ConfigLayer::Explicit,
                path: path.to_path_buf(),
                loaded: true,
            }],
            warnings: Vec::new(),
        })
    }

    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover config relative to `project_dir` (default: the working directory).
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Discover config, reading the user file from `user_dir` when given.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    user_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = user_dir
        .map(Path::to_path_buf)
        .or_else(user_config_dir)
        .map(|dir| (ConfigLayer::User, dir.join(USER_FILE)));
    let project = (
        ConfigLayer::Project,
        project_dir.map_or_else(|| PathBuf::from(PROJECT_FILE), |d| d.join(PROJECT_FILE)),
    );

    let mut loaded = LoadedConfig {
        config: StrataConfig::new(),
        sources: Vec::new(),
        warnings: Vec::new(),
    };
    for (layer, path) in user.into_iter().chain(std::iter::once(project)) {
        let ok = path.is_file() && apply_layer(&mut loaded, &path);
        loaded.sources.push(ConfigSource {
            layer,
            path,
            loaded: ok,
        });
    }

    // Ranges are checked on the merged result, so a later layer can fix an earlier one.
    loaded.config.validate()?;
    Ok(loaded)
}

/// Parse one file without validating it.
pub fn load_config_file(path: &Path) -> Result<StrataConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    StrataConfig::from_toml(&text)
}

/// The user file location, if one can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join(USER_FILE))
}

/// `$STRATA_CONFIG_DIR` when set and non-empty, else `<platform config dir>/strata`.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(USER_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|dir| dir.join("strata")),
    }
}

fn apply_layer(loaded: &mut LoadedConfig, path: &Path) -> bool {
    match load_config_file(path) {
        Ok(layer) => {
            loaded.config.merge(layer);
            true
        }
        Err(e) => {
            loaded
                .warnings
                .push(format!("Ignoring {}: {}", path.display(), e));
            false
        }
    }
}
