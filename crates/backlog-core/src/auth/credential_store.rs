use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigStore, Configuration};

use super::{AuthError, AuthSession};

/// Persistence abstraction for the cached OAuth2 credentials.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<AuthSession>, AuthError>;
    fn save(&self, session: &AuthSession) -> Result<(), AuthError>;
    fn delete(&self) -> Result<(), AuthError>;
}

/// Token cache stored as a JSON file (the configured `token_cache_path`).
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn for_config(store: &ConfigStore, config: &Configuration) -> Self {
        Self::new(store.token_cache_file(config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<AuthSession>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let envelope: SessionEnvelope = serde_json::from_str(&raw)?;
        Ok(Some(envelope.session))
    }

    fn save(&self, session: &AuthSession) -> Result<(), AuthError> {
        let envelope = SessionEnvelope {
            session: session.clone(),
            version: 1,
        };
        let payload = serde_json::to_string_pretty(&envelope)?;
        Self::write_file(&self.path, &payload)
    }

    fn delete(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    version: u32,
    session: AuthSession,
}
