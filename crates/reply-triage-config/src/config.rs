// crates/reply-triage-config/src/config.rs
// ============================================================================
// Module: Reply Triage Configuration
// Description: Configuration loading and validation for reply triage hosts.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: reply-triage-core, reply-triage-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown keys and out-of-range values fail closed; nothing falls back to a
//! default once a value is present but invalid.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use reply_triage_core::DEFAULT_BASE_PATH;
use reply_triage_core::ValidationSettings;
use reply_triage_core::WizardConfig;
use reply_triage_store_sqlite::SqliteStoreConfig;
use reply_triage_store_sqlite::SqliteStoreMode;
use reply_triage_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "reply-triage.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "REPLY_TRIAGE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default busy timeout for the sqlite store in milliseconds.
pub(crate) const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum busy timeout for the sqlite store in milliseconds.
pub(crate) const MAX_STORE_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default number of sqlite read connections.
pub(crate) const DEFAULT_READ_POOL_SIZE: usize = 2;
/// Maximum number of sqlite read connections.
pub(crate) const MAX_READ_POOL_SIZE: usize = 32;
/// Maximum staleness window in months.
pub(crate) const MAX_STALENESS_MONTHS: u32 = 12;
/// Maximum configurable file number length.
pub(crate) const MAX_FILE_NUMBER_MAX_LEN: usize = 4096;
/// Maximum length of the navigation base path.
pub(crate) const MAX_BASE_PATH_LENGTH: usize = 256;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Reply triage host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriageConfig {
    /// Wizard store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Step validation limits.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Step address configuration.
    #[serde(default)]
    pub navigation: NavigationConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl TriageConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is taken from `path`, then from [`CONFIG_ENV_VAR`], then the
    /// default filename in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content =
            std::str::from_utf8(&bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.audit.validate()?;
        self.validation.validate()?;
        self.navigation.validate()
    }

    /// Returns the wizard driver configuration.
    #[must_use]
    pub fn wizard_config(&self) -> WizardConfig {
        WizardConfig {
            settings: self.validation.settings(),
            ..WizardConfig::default()
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Wizard store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Optional max versions to retain per instance.
    #[serde(default)]
    pub max_versions: Option<u64>,
    /// Number of read-only connections.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_versions: None,
            read_pool_size: default_read_pool_size(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_store_path(path)?;
                if self.max_versions == Some(0) {
                    return Err(ConfigError::Invalid("store max_versions must be greater than zero".to_string()));
                }
                if self.busy_timeout_ms > MAX_STORE_BUSY_TIMEOUT_MS {
                    return Err(ConfigError::Invalid(format!(
                        "store busy_timeout_ms must be at most {MAX_STORE_BUSY_TIMEOUT_MS}"
                    )));
                }
                if self.read_pool_size == 0 || self.read_pool_size > MAX_READ_POOL_SIZE {
                    return Err(ConfigError::Invalid(format!(
                        "store read_pool_size must be between 1 and {MAX_READ_POOL_SIZE}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Returns the sqlite store configuration when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
                max_versions: self.max_versions,
                read_pool_size: self.read_pool_size,
            }),
            _ => None,
        }
    }
}

/// Wizard store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Audit sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Audit log path (JSON lines) for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => validate_path_string("audit.path", path),
            (AuditSinkType::File, None) => Err(ConfigError::Invalid("file audit sink requires path".to_string())),
            (_, Some(_)) => Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string())),
            (_, None) => Ok(()),
        }
    }
}

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append-only JSON lines file.
    File,
    /// Audit disabled.
    None,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Step validation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// How many calendar months back a reply date may lie.
    #[serde(default = "default_staleness_months")]
    pub staleness_months: u32,
    /// Maximum file number length in characters.
    #[serde(default = "default_file_number_max_len")]
    pub file_number_max_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            staleness_months: default_staleness_months(),
            file_number_max_len: default_file_number_max_len(),
        }
    }
}

impl ValidationConfig {
    /// Validates limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.staleness_months == 0 || self.staleness_months > MAX_STALENESS_MONTHS {
            return Err(ConfigError::Invalid(format!(
                "validation.staleness_months must be between 1 and {MAX_STALENESS_MONTHS}"
            )));
        }
        if self.file_number_max_len == 0 || self.file_number_max_len > MAX_FILE_NUMBER_MAX_LEN {
            return Err(ConfigError::Invalid(format!(
                "validation.file_number_max_len must be between 1 and {MAX_FILE_NUMBER_MAX_LEN}"
            )));
        }
        Ok(())
    }

    /// Returns the driver validation settings.
    #[must_use]
    pub const fn settings(&self) -> ValidationSettings {
        ValidationSettings {
            staleness_months: self.staleness_months,
            file_number_max_len: self.file_number_max_len,
        }
    }
}

// ============================================================================
// SECTION: Navigation
// ============================================================================

/// Step address configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NavigationConfig {
    /// Base path step addresses are formed under.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

impl NavigationConfig {
    /// Validates the base path.
    fn validate(&self) -> Result<(), ConfigError> {
        let base = self.base_path.as_str();
        if !base.starts_with('/') {
            return Err(ConfigError::Invalid("navigation.base_path must start with '/'".to_string()));
        }
        if base.len() > MAX_BASE_PATH_LENGTH {
            return Err(ConfigError::Invalid("navigation.base_path exceeds max length".to_string()));
        }
        if base.chars().any(|ch| ch.is_whitespace() || ch == '?' || ch == '#') {
            return Err(ConfigError::Invalid(
                "navigation.base_path must not contain whitespace, '?' or '#'".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(ConfigError::Invalid("config path component too long".to_string()));
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    if Path::new(trimmed).components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(ConfigError::Invalid(format!("{field} path component too long")));
    }
    Ok(())
}

/// Validates the sqlite store path.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("store path must be non-empty".to_string()));
    }
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store path exceeds max length".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(ConfigError::Invalid("store path component too long".to_string()));
    }
    Ok(())
}

/// Default sqlite busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Default sqlite read pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

/// Default staleness window.
fn default_staleness_months() -> u32 {
    ValidationSettings::default().staleness_months
}

/// Default file number length limit.
fn default_file_number_max_len() -> usize {
    ValidationSettings::default().file_number_max_len
}

/// Default navigation base path.
fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
