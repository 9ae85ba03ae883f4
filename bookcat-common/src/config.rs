//! Configuration loading and root folder resolution
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_ENV_VAR: &str = "BOOKCAT_ROOT";
/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BOOKCATALOG_CONFIG";
/// Environment variable naming the server-side export directory
pub const BACKUP_DIR_ENV_VAR: &str = "CATALOG_BACKUP_DIR";
/// Environment variable for the session idle timeout, in minutes
pub const SESSION_IDLE_ENV_VAR: &str = "BOOKCAT_SESSION_IDLE_MINUTES";
/// Idle minutes before a session lapses (PHP's default session GC lifetime)
pub const DEFAULT_SESSION_IDLE_MINUTES: u64 = 24;

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub root_folder: Option<String>,
    pub bind: Option<String>,
    pub dist_dir: Option<String>,
    pub backup_dir: Option<String>,
    pub session_idle_minutes: Option<u64>,
}

impl FileConfig {
    /// Load the config file.
    ///
    /// An explicitly named file (argument or `BOOKCATALOG_CONFIG`) must exist
    /// and parse. The platform default locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().filter(|v| !v.trim().is_empty()).map(PathBuf::from));

        let path = match named {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!("Config file not found: {}", path.display())));
                }
                path
            }
            None => match default_config_file() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }
}

/// First existing platform config file, if any
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("bookcat").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/bookcat/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// Resolve a string setting: CLI > env > TOML > default
pub fn resolve_setting(
    cli_arg: Option<&str>,
    env_var_name: &str,
    file_value: Option<&str>,
    default: &str,
) -> String {
    if let Some(value) = cli_arg {
        return value.to_string();
    }
    if let Ok(value) = std::env::var(env_var_name) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    if let Some(value) = file_value {
        return value.to_string();
    }
    default.to_string()
}

/// Resolve the session idle timeout: CLI > env > TOML > default
///
/// Zero or unparsable values fall through to the next source.
pub fn resolve_session_idle_minutes(cli_arg: Option<u64>, file_config: &FileConfig) -> u64 {
    let from_env = std::env::var(SESSION_IDLE_ENV_VAR)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok());
    [cli_arg, from_env, file_config.session_idle_minutes]
        .into_iter()
        .flatten()
        .find(|minutes| *minutes > 0)
        .unwrap_or(DEFAULT_SESSION_IDLE_MINUTES)
}

/// Resolve the root folder holding the database and uploaded files
pub fn resolve_root_folder(cli_arg: Option<&str>, file_config: &FileConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(path) = &file_config.root_folder {
        return PathBuf::from(path);
    }
    get_default_root_folder()
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/bookcat (or /var/lib/bookcat for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("bookcat"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/bookcat"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/bookcat
        dirs::data_dir()
            .map(|d| d.join("bookcat"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/bookcat"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("bookcat"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\bookcat"))
    } else {
        PathBuf::from("./bookcat_data")
    }
}

/// Files and folders under the root folder
#[derive(Debug, Clone)]
pub struct RootLayout {
    root: PathBuf,
}

impl RootLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `bookcat.db`
    pub fn database_path(&self) -> PathBuf {
        self.root.join("bookcat.db")
    }

    /// Book covers, one numeric folder per book
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// Per-user assets (logos), one numeric folder per user
    pub fn user_assets_dir(&self) -> PathBuf {
        self.root.join("user-assets")
    }

    /// Create the root, uploads and user-assets folders if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root.clone(), self.uploads_dir(), self.user_assets_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                tracing::info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

/// State of the server-side export directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupDirStatus {
    /// Not configured: exports stream to the client
    Disabled,
    Missing(PathBuf),
    NotDir(PathBuf),
    NotWritable(PathBuf),
    Ready(PathBuf),
}

impl BackupDirStatus {
    /// Inspect a configured directory (value of `CATALOG_BACKUP_DIR`)
    pub fn inspect(raw: Option<&str>) -> Self {
        let raw = raw.map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return Self::Disabled;
        }
        let trimmed = raw.trim_end_matches(|c: char| c == '/' || c == '\\');
        let dir = PathBuf::from(if trimmed.is_empty() { raw } else { trimmed });
        if !dir.exists() {
            Self::Missing(dir)
        } else if !dir.is_dir() {
            Self::NotDir(dir)
        } else if !is_writable(&dir) {
            Self::NotWritable(dir)
        } else {
            Self::Ready(dir)
        }
    }

    /// Resolve from env, falling back to the config file's `backup_dir`
    pub fn resolve(file_config: &FileConfig) -> Self {
        let env_value = std::env::var(BACKUP_DIR_ENV_VAR).ok();
        Self::inspect(env_value.as_deref().or(file_config.backup_dir.as_deref()))
    }

    pub fn enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Missing(_) => "missing",
            Self::NotDir(_) => "not_dir",
            Self::NotWritable(_) => "not_writable",
            Self::Ready(_) => "ready",
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        match self {
            Self::Disabled => None,
            Self::Missing(d) | Self::NotDir(d) | Self::NotWritable(d) | Self::Ready(d) => Some(d),
        }
    }

    /// Operator-facing explanation for an unusable directory
    pub fn error_message(&self) -> Option<String> {
        let dir = self.dir()?.display().to_string();
        let base = format!("{} is set to '{}'", BACKUP_DIR_ENV_VAR, dir);
        let hint = "Fix it or remove the env var for streaming mode.";
        match self {
            Self::Missing(_) => Some(format!("{}, but it does not exist. {}", base, hint)),
            Self::NotDir(_) => Some(format!("{}, but it is not a directory. {}", base, hint)),
            Self::NotWritable(_) => Some(format!(
                "{}, but it is not writable by the web server. {}",
                base, hint
            )),
            Self::Disabled | Self::Ready(_) => None,
        }
    }
}

/// Check writability by creating and removing a marker file
fn is_writable(dir: &Path) -> bool {
    let marker = dir.join(format!(".bookcat-write-check-{}", std::process::id()));
    match std::fs::File::create(&marker) {
        Ok(_) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}
