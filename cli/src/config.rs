use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Managed-service connection settings, from flags or `LARDER_*` env vars.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub url: Option<String>,
    pub key: Option<String>,
    pub bucket: String,
    pub store_quota: usize,
}

impl BackendSettings {
    /// `(url, key)` when both are present and non-blank.
    pub fn remote(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let key = self.key.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((url, key))
    }
}

/// Signed-in session persisted between CLI runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "larder").context("Could not determine home directory")?;
        Self::at(proj_dirs.data_dir())
    }

    pub fn at(data_dir: &Path) -> Result<Self> {
        let data_dir = data_dir.to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("larder.db");

        Ok(Config { db_path, data_dir })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        write_private(&path, &key).context("Failed to write API key file")?;
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    /// The stored session, if any. An unreadable file counts as signed out.
    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).context("Failed to read session file")?;
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(session) if !session.access_token.trim().is_empty() => Ok(Some(session)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    pub fn save_session(&self, session: &StoredSession) -> Result<()> {
        let raw = serde_json::to_string_pretty(session)?;
        write_private(&self.session_path(), &raw).context("Failed to write session file")
    }

    /// Returns true if a session was removed.
    pub fn clear_session(&self) -> Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).context("Failed to remove session file")?;
        Ok(true)
    }
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
