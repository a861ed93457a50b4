use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::updater::Result;

const CONFIG_FILE: &str = "config.toml";

/// Representation of user configuration. Command line arguments take
/// precedence over everything configured here.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name recorded as the author of uploads
    pub author_name: Option<String>,
    /// Contact address recorded alongside uploads
    pub author_address: Option<String>,
    /// Default installation root
    pub root: Option<String>,
    /// Default update site for uploads
    pub update_site: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parses the user's rups config, if it exists
pub fn load_config() -> Result<Config> {
    if let Some(config_file) = config_path() {
        if config_file.exists() {
            return parse_config(&config_file);
        }
    }
    Ok(Config::new())
}

/// The path to the rups config file, or None if the config directory cannot
/// be resolved. The file may not exist.
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Reference to the rups project directories. These directories do **not**
/// necessarily exist
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "spectra", "rups")
}

fn parse_config(config_file: impl AsRef<Path>) -> Result<Config> {
    let mut buffer = Vec::new();
    fs::File::open(config_file.as_ref())?.read_to_end(&mut buffer)?;
    let config: Config = toml::from_slice(&buffer)
        .map_err(|e| crate::updater::UpdateError::InvalidConfiguration(e.to_string()))?;
    Ok(config)
}
