//! Configuration file discovery and loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roadmap_core::Config;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ROADMAP_CONFIG_PATH";

/// Directory holding the project's database and config.
pub const PROJECT_DIR: &str = ".roadmap";

const CONFIG_FILE: &str = "config.yaml";

/// Load the configuration for a command run from `working_dir`.
///
/// Looks at `$ROADMAP_CONFIG_PATH`, then `<working_dir>/.roadmap/config.yaml`,
/// then `~/.roadmap/config.yaml`. Without any file the defaults apply.
pub fn load(working_dir: &Path) -> Result<Config> {
    let explicit = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    load_with(explicit, working_dir, dirs::home_dir())
}

fn load_with(explicit: Option<PathBuf>, working_dir: &Path, home: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_file(&path).with_context(|| format!("failed to load config from {CONFIG_ENV}"));
    }

    let project = working_dir.join(PROJECT_DIR).join(CONFIG_FILE);
    if project.is_file() {
        return load_file(&project).context("failed to load project config");
    }

    if let Some(home) = home {
        let global = home.join(PROJECT_DIR).join(CONFIG_FILE);
        if global.is_file() {
            return load_file(&global).context("failed to load global config");
        }
    }

    debug!("no config file found, using defaults");
    Ok(Config::default())
}

/// Parse one YAML file. Missing keys keep their defaults.
pub fn load_file(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(Config::default());
    }
    let config = serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}
