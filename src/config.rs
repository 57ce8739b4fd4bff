use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

const APP_NAME: &str = "email-manager";
const SETTINGS_FILE: &str = "config.yaml";

/// User settings, read from `$XDG_CONFIG_HOME/email-manager/config.yaml`.
///
/// Every field is optional in the file; missing fields fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the OAuth client descriptor and the saved token
    pub credentials_dir: String,
    pub credentials_file: String,
    pub token_file: String,
    /// Loopback port for the OAuth redirect
    pub callback_port: u16,
    /// How long to wait for the browser callback, e.g. "3m" or "90s"
    pub auth_timeout: String,
    pub download_dir: String,
    pub max_results: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials_dir: "~/.credentials".to_string(),
            credentials_file: "google_credentials.json".to_string(),
            token_file: "token_gmail.json".to_string(),
            callback_port: 8080,
            auth_timeout: "3m".to_string(),
            download_dir: "~/Downloads".to_string(),
            max_results: 10,
        }
    }
}

impl Settings {
    /// Load settings from the config file, or defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = get_config_file_path(SETTINGS_FILE)?;
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn path() -> Result<PathBuf> {
        get_config_file_path(SETTINGS_FILE)
    }

    pub fn credentials_path(&self) -> Result<PathBuf> {
        Ok(expand_path(&self.credentials_dir)?.join(&self.credentials_file))
    }

    pub fn token_path(&self) -> Result<PathBuf> {
        Ok(expand_path(&self.credentials_dir)?.join(&self.token_file))
    }

    pub fn auth_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.auth_timeout)
            .with_context(|| format!("Invalid auth_timeout '{}'", self.auth_timeout))
    }
}

/// Get the application config directory path
pub fn get_app_config_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME)
        .map_err(|e| anyhow::anyhow!("Failed to initialize XDG base directories: {}", e))?;

    Ok(xdg_dirs.get_config_home())
}

/// Get the path to a configuration file
pub fn get_config_file_path(filename: &str) -> Result<PathBuf> {
    let config_dir = get_app_config_dir()?;
    Ok(config_dir.join(filename))
}

/// Expand environment variables and a leading `~` in a user-supplied path.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    expand_path_with(path, home.as_deref(), |name| std::env::var(name).ok())
}

/// Same as [`expand_path`] with the home directory and variable lookup
/// supplied by the caller. Unset variables expand to an empty string.
pub fn expand_path_with<F>(path: &str, home: Option<&Path>, lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    static VAR_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = VAR_PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("variable pattern is valid")
    });

    let expanded = pattern.replace_all(path, |caps: &Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        lookup(name).unwrap_or_default()
    });

    if expanded == "~" || expanded.starts_with("~/") {
        let home = home.ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        let rest = expanded.trim_start_matches('~').trim_start_matches('/');
        return Ok(if rest.is_empty() {
            home.to_path_buf()
        } else {
            home.join(rest)
        });
    }

    Ok(PathBuf::from(expanded.into_owned()))
}
