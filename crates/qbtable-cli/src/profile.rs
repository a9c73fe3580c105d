//! Connection profile loaded from TOML.
//!
//! Read from `--config PATH`, or `$XDG_CONFIG_HOME/qbtable/config.toml`
//! when present. Command-line flags and `QB_*` environment variables take
//! precedence over the file.
//!
//! ## Example Profile
//!
//! ```toml
//! realm = "example.quickbase.com"
//! table = "bqx7xre7a"
//! app_token = "c4zb9qxbr3..."
//!
//! [settings]
//! timeout_seconds = 30
//! token_ttl_seconds = 300
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use qbtable_common::Config;

/// Values read from the profile file.
///
/// Tokens are held as [`SecretString`] and print as `[REDACTED]`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Profile {
    /// Realm hostname.
    pub realm: Option<String>,
    /// Table id.
    pub table: Option<String>,
    /// Pre-issued user token.
    pub token: Option<SecretString>,
    /// Application token for the temporary-auth flow.
    pub app_token: Option<SecretString>,
    /// API base URL override.
    pub base_url: Option<String>,
    /// Optional client settings.
    #[serde(default)]
    pub settings: Settings,
}

/// Optional client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Request timeout in seconds.
    pub timeout_seconds: Option<u64>,
    /// Lifetime assumed for temporary tokens.
    pub token_ttl_seconds: Option<u64>,
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub realm: Option<String>,
    pub table: Option<String>,
    pub token: Option<SecretString>,
    pub app_token: Option<SecretString>,
}

impl Profile {
    /// Loads the profile at `path`, or the default profile if it exists.
    ///
    /// A missing default file yields an empty profile; a missing explicit
    /// file is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No profile file found; using flags and environment only");
                    return Ok(Self::default());
                }
            },
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        let profile: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse profile {}", path.display()))?;
        debug!("Loaded profile from {}", path.display());
        Ok(profile)
    }

    /// Builds the client configuration, applying `overrides` on top.
    ///
    /// # Errors
    ///
    /// Returns an error if no realm or table is known.
    pub fn into_config(self, overrides: Overrides) -> Result<Config> {
        let realm = overrides
            .realm
            .or(self.realm)
            .context("No realm given; pass --realm, set QB_REALM or add `realm` to the profile")?;
        let table = overrides
            .table
            .or(self.table)
            .context("No table given; pass --table, set QB_TABLE or add `table` to the profile")?;

        let mut config = Config::new(table, realm);
        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(token) = overrides.token.or(self.token) {
            config = config.with_user_token(token.expose_secret());
        }
        if let Some(app_token) = overrides.app_token.or(self.app_token) {
            config = config.with_app_token(app_token.expose_secret());
        }
        if let Some(timeout) = self.settings.timeout_seconds {
            config = config.with_timeout(timeout);
        }
        if let Some(ttl) = self.settings.token_ttl_seconds {
            config = config.with_token_ttl(ttl);
        }

        config.validate()?;
        Ok(config)
    }
}

/// `$XDG_CONFIG_HOME/qbtable/config.toml`, falling back to `~/.config`.
pub fn default_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|dir| dir.join("qbtable").join("config.toml"))
}
