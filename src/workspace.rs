//! Workspace and credential resolution.
//!
//! The selected workspace and the user's API credentials are persisted to a
//! small TOML file (by default `~/.skyport/mcp-server.toml`). MCP servers are
//! often launched in sandboxes without a writable home directory, so every
//! workspace operation degrades to an in-memory value when the file cannot be
//! read or written.
//!
//! The in-memory value is seeded once from the startup workspace and from then
//! on only tracks selections that could not be persisted. It is not a cache of
//! the file and the two are never reconciled.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::{Config, DEFAULT_API_HOST};
use crate::error::AppError;

/// Schema version written to new config files.
pub const CURRENT_VERSION: u32 = 1;

/// The durable record stored in the persisted config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub api: ApiConfig,
}

impl PersistedConfig {
    /// A fresh record at the current schema version.
    pub fn fresh() -> Self {
        Self {
            version: CURRENT_VERSION,
            ..Default::default()
        }
    }
}

/// Credential block of the persisted config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// Unix timestamp (seconds); zero when the key does not expire.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Resolves and persists the active workspace and API credentials.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
#[derive(Debug)]
pub struct WorkspaceResolver {
    path: PathBuf,
    api_key_override: Option<String>,
    api_host: String,
    fallback: Mutex<Option<String>>,
}

impl WorkspaceResolver {
    /// Creates a resolver over the config file at `path`, seeding the
    /// in-memory fallback with `seed`.
    pub fn new(path: impl Into<PathBuf>, seed: Option<String>) -> Self {
        Self {
            path: path.into(),
            api_key_override: None,
            api_host: DEFAULT_API_HOST.to_string(),
            fallback: Mutex::new(seed.filter(|s| !s.is_empty())),
        }
    }

    /// Sets the API key override and host used by [`default_api_config`](Self::default_api_config).
    pub fn with_api_override(mut self, api_key: Option<String>, host: impl Into<String>) -> Self {
        self.api_key_override = api_key.filter(|k| !k.is_empty());
        self.api_host = host.into();
        self
    }

    /// Builds a resolver from server configuration.
    pub fn from_config(config: &Config) -> Self {
        let path = match config.config_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
            None => default_config_path(),
        };

        tracing::debug!(path = %path.display(), "Using persisted config file");

        Self::new(path, config.workspace_seed().map(str::to_string))
            .with_api_override(config.api_key().map(str::to_string), &config.api_host)
    }

    /// Location of the persisted config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the active workspace.
    ///
    /// Prefers the persisted file, then the in-memory fallback.
    pub fn workspace_id(&self) -> Result<String, AppError> {
        let workspace = match self.load() {
            Ok(config) if !config.workspace.is_empty() => Some(config.workspace),
            _ => self.fallback().clone(),
        };

        workspace
            .filter(|w| !w.is_empty())
            .ok_or(AppError::NoWorkspaceSelected)
    }

    /// Records `workspace_id` as the active workspace.
    ///
    /// Never fails: when the file cannot be loaded or written the selection is
    /// kept in memory for the rest of the process.
    pub fn select_workspace(&self, workspace_id: &str) {
        let persisted = self.load().and_then(|mut config| {
            config.workspace = workspace_id.to_string();
            self.persist(&config)
        });

        if let Err(e) = persisted {
            tracing::warn!(
                error = %e,
                path = %self.path.display(),
                "Could not persist workspace, keeping it in memory"
            );
            *self.fallback() = Some(workspace_id.to_string());
        }
    }

    /// Resolves the credentials for platform calls.
    ///
    /// An API key override beats the persisted credentials.
    pub fn default_api_config(&self) -> Result<ApiConfig, AppError> {
        if let Some(api_key) = &self.api_key_override {
            return Ok(ApiConfig {
                api_key: api_key.clone(),
                host: self.api_host.clone(),
                ..Default::default()
            });
        }

        let api = self.load()?.api;
        if api.api_key.is_empty() {
            return Err(AppError::AuthenticationRequired);
        }

        Ok(api)
    }

    /// Replaces the persisted credential block, keeping the rest of the file.
    pub fn set_api_config(&self, input: ApiConfig) -> Result<(), AppError> {
        let mut config = self.load()?;
        config.api = input;
        self.persist(&config)
    }

    /// Loads the persisted config. A missing file yields a fresh record.
    pub fn load(&self) -> Result<PersistedConfig, AppError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PersistedConfig::fresh()),
            Err(e) => return Err(e.into()),
        };

        Ok(toml::from_str(&data)?)
    }

    /// Overwrites the persisted config with `config`.
    pub fn persist(&self, config: &PersistedConfig) -> Result<(), AppError> {
        let data = toml::to_string(config)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_private_dir(dir)?;
        }

        write_owner_only(&self.path, data.as_bytes())?;
        Ok(())
    }

    fn fallback(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.fallback.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Default persisted config path.
///
/// MCP servers may be launched without a home directory, so fall back to the
/// executable's directory and finally the temp dir.
pub fn default_config_path() -> PathBuf {
    let base = dirs::home_dir()
        .or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
        })
        .unwrap_or_else(std::env::temp_dir);

    base.join(".skyport").join("mcp-server.toml")
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_owner_only(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver_in(dir: &TempDir) -> WorkspaceResolver {
        WorkspaceResolver::new(dir.path().join("nested").join("mcp-server.toml"), None)
    }

    /// A resolver whose config path sits below a regular file, so every read
    /// and write fails with something other than NotFound.
    fn resolver_without_disk(dir: &TempDir, seed: Option<&str>) -> WorkspaceResolver {
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        WorkspaceResolver::new(blocker.join("mcp-server.toml"), seed.map(String::from))
    }

    #[test]
    fn test_missing_file_loads_fresh_record() {
        let dir = TempDir::new().unwrap();
        let config = resolver_in(&dir).load().unwrap();
        assert_eq!(config, PersistedConfig::fresh());
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        let mut config = PersistedConfig::fresh();
        config.workspace = "ws-9".to_string();
        resolver.persist(&config).unwrap();

        assert_eq!(resolver.load().unwrap().workspace, "ws-9");
    }

    #[cfg(unix)]
    #[test]
    fn test_persisted_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);
        resolver.persist(&PersistedConfig::fresh()).unwrap();

        let mode = fs::metadata(resolver.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_no_workspace_anywhere() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolver_in(&dir).workspace_id(),
            Err(AppError::NoWorkspaceSelected)
        ));
    }

    #[test]
    fn test_select_workspace_persists_to_disk() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        resolver.select_workspace("ws-1");

        assert_eq!(resolver.load().unwrap().workspace, "ws-1");
        assert_eq!(resolver.workspace_id().unwrap(), "ws-1");
    }

    #[test]
    fn test_select_workspace_without_disk_falls_back_to_memory() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_without_disk(&dir, None);

        resolver.select_workspace("ws-2");

        assert_eq!(resolver.workspace_id().unwrap(), "ws-2");
    }

    #[test]
    fn test_seed_is_used_when_disk_has_no_workspace() {
        let dir = TempDir::new().unwrap();
        let resolver = WorkspaceResolver::new(dir.path().join("mcp-server.toml"), Some("seed".into()));
        assert_eq!(resolver.workspace_id().unwrap(), "seed");
    }

    #[test]
    fn test_disk_workspace_beats_seed() {
        let dir = TempDir::new().unwrap();
        let resolver = WorkspaceResolver::new(dir.path().join("mcp-server.toml"), Some("seed".into()));

        resolver.select_workspace("ws-3");

        assert_eq!(resolver.workspace_id().unwrap(), "ws-3");
    }

    #[test]
    fn test_instances_are_independent() {
        let dir = TempDir::new().unwrap();
        let first = resolver_without_disk(&dir, None);
        let second = WorkspaceResolver::new(dir.path().join("blocker").join("x.toml"), None);

        first.select_workspace("ws-4");

        assert!(matches!(
            second.workspace_id(),
            Err(AppError::NoWorkspaceSelected)
        ));
    }

    #[test]
    fn test_api_key_override_beats_persisted() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);
        resolver
            .set_api_config(ApiConfig {
                api_key: "from-disk".into(),
                ..Default::default()
            })
            .unwrap();

        let resolver = resolver.with_api_override(Some("from-env".into()), "https://api.example");
        let api = resolver.default_api_config().unwrap();

        assert_eq!(api.api_key, "from-env");
        assert_eq!(api.host, "https://api.example");
    }

    #[test]
    fn test_persisted_api_key_is_used() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);
        resolver.select_workspace("ws-5");
        resolver
            .set_api_config(ApiConfig {
                api_key: "rnd_key".into(),
                expires_at: 1_700_000_000,
                ..Default::default()
            })
            .unwrap();

        let api = resolver.default_api_config().unwrap();
        assert_eq!(api.api_key, "rnd_key");
        assert_eq!(api.expires_at, 1_700_000_000);
        // Credential writes keep the selected workspace
        assert_eq!(resolver.workspace_id().unwrap(), "ws-5");
    }

    #[test]
    fn test_missing_api_key_requires_authentication() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolver_in(&dir).default_api_config(),
            Err(AppError::AuthenticationRequired)
        ));
    }

    #[test]
    fn test_malformed_file_falls_back_to_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp-server.toml");
        fs::write(&path, "workspace = [").unwrap();
        let resolver = WorkspaceResolver::new(&path, Some("seed".into()));

        assert_eq!(resolver.workspace_id().unwrap(), "seed");
        resolver.select_workspace("ws-6");
        assert_eq!(resolver.workspace_id().unwrap(), "ws-6");
    }
}
