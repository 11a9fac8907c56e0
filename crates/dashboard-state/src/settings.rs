//! User settings: gateway URL, auth token, and theme.
//!
//! Stored as TOML:
//! - `$XDG_CONFIG_HOME/clawdeck/settings.toml` when set
//! - `~/.config/clawdeck/settings.toml` otherwise
//!
//! The file holds the auth token, so it is written with `0600` on Unix.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use clawdeck_gateway::ClientOptions;

/// Gateway URL used when nothing else is configured.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789/ws";

/// Environment variable overriding the gateway URL.
pub const ENV_GATEWAY_URL: &str = "CLAWDECK_GATEWAY_URL";

/// Environment variable overriding the auth token.
pub const ENV_GATEWAY_TOKEN: &str = "CLAWDECK_GATEWAY_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration directory (HOME is not set)")]
    NoConfigDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Empty means no token is sent.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub theme: Theme,
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            token: String::new(),
            theme: Theme::default(),
        }
    }
}

/// Partial update for [`Settings::merge`]. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub gateway_url: Option<String>,
    pub token: Option<String>,
    pub theme: Option<Theme>,
}

impl Settings {
    /// Loads settings from the default path, creating the file if missing.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&settings_path()?)
    }

    /// Loads settings from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
            Ok(toml::from_str(&content)?)
        } else {
            let settings = Self::default();
            settings.save_to(path)?;
            Ok(settings)
        }
    }

    /// Saves to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::io(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ConfigError::io(path, e))?;
        }

        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Applies `CLAWDECK_GATEWAY_URL` and `CLAWDECK_GATEWAY_TOKEN`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_GATEWAY_URL).filter(|v| !v.is_empty()) {
            self.gateway_url = url;
        }
        if let Some(token) = lookup(ENV_GATEWAY_TOKEN).filter(|v| !v.is_empty()) {
            self.token = token;
        }
    }

    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(url) = patch.gateway_url {
            self.gateway_url = url;
        }
        if let Some(token) = patch.token {
            self.token = token;
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
    }

    /// Client options for these settings.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::new(&self.gateway_url).with_token(&self.token)
    }
}

/// Returns the settings file path.
pub fn settings_path() -> Result<PathBuf, ConfigError> {
    config_dir().map(|dir| dir.join("clawdeck").join("settings.toml"))
}

fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return Ok(PathBuf::from(appdata));
        }
    }

    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(|home| PathBuf::from(home).join(".config"))
        .ok_or(ConfigError::NoConfigDir)
}
