use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DOMAIN: &str = "backlog.com";
pub const DEFAULT_TOKEN_CACHE_FILE: &str = "backlog_oauth2cache.json";
const CONFIG_FILE: &str = "config.toml";

/// Connection settings for one Backlog space/project pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub space_key: String,
    pub domain: String,
    pub project_key: String,
    pub client_id: String,
    pub client_secret: String,
    /// Must match the redirect URI registered on the Backlog developer site.
    pub redirect_uri: String,
    /// Token cache location; relative paths live next to the config file.
    pub token_cache_path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            space_key: String::new(),
            domain: DEFAULT_DOMAIN.to_owned(),
            project_key: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            token_cache_path: PathBuf::from(DEFAULT_TOKEN_CACHE_FILE),
        }
    }
}

impl Configuration {
    /// Base URL of the space, e.g. `https://acme.backlog.com`.
    pub fn space_url(&self) -> String {
        format!("https://{}.{}", self.space_key, self.domain)
    }

    pub fn token_cache_file(&self, base: &Path) -> PathBuf {
        if self.token_cache_path.is_absolute() {
            self.token_cache_path.clone()
        } else {
            base.join(&self.token_cache_path)
        }
    }

    /// Check the fields every remote call depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("space_key", &self.space_key),
            ("domain", &self.domain),
            ("project_key", &self.project_key),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingFields(missing.join(", ")))
        }
    }

    /// Assign a field by its settings name. Used by the settings surface.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim().to_owned();
        match name {
            "space_key" => self.space_key = value,
            "domain" => self.domain = value,
            "project_key" => self.project_key = value,
            "client_id" => self.client_id = value,
            "client_secret" => self.client_secret = value,
            "redirect_uri" => self.redirect_uri = value,
            "token_cache_path" => self.token_cache_path = PathBuf::from(value),
            other => return Err(ConfigError::UnknownField(other.to_owned())),
        }
        Ok(())
    }
}

/// Application-specific configuration helpers.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("com", "backlog", "backlog-rs")
            .ok_or(ConfigError::MissingProjectDirs)?;
        let config_dir = dirs.config_dir();
        fs::create_dir_all(config_dir).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(config_dir)?;
        Ok(Self {
            root: config_dir.to_path_buf(),
        })
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}

/// Loads and persists the single configuration record.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    locator: ConfigLocator,
}

impl ConfigStore {
    pub fn new(locator: ConfigLocator) -> Self {
        Self { locator }
    }

    pub fn with_default_locator() -> Result<Self, ConfigError> {
        Ok(Self::new(ConfigLocator::new()?))
    }

    pub fn locator(&self) -> &ConfigLocator {
        &self.locator
    }

    pub fn path(&self) -> PathBuf {
        self.locator.config_file()
    }

    /// Return the persisted configuration, writing a default one first if none exists.
    pub fn load(&self) -> Result<Configuration, ConfigError> {
        let path = self.path();
        if !path.exists() {
            let config = Configuration::default();
            self.save(&config)?;
            tracing::info!(path = %path.display(), "created default configuration");
            return Ok(config);
        }
        let raw = fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn save(&self, config: &Configuration) -> Result<(), ConfigError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::CreateDir)?;
        }
        let payload = toml::to_string_pretty(config)?;
        fs::write(&path, payload)?;
        Ok(())
    }

    /// Absolute location of the OAuth2 token cache for `config`.
    pub fn token_cache_file(&self, config: &Configuration) -> PathBuf {
        config.token_cache_file(self.locator.root())
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Errors that can occur when working with configuration directories.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for backlog-rs")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("configuration is missing required fields: {0}")]
    MissingFields(String),
    #[error("unknown configuration field '{0}'")]
    UnknownField(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
