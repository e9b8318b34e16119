//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$ATTACHSORT_CONFIG` (environment variable)
//! 2. `~/.config/attachsort/config.toml` (Linux/macOS)
//!    `%APPDATA%\attachsort\config.toml` (Windows)
//! 3. Built-in defaults, only when no file exists

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SortError};
use crate::manifest::store::default_manifest_path;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "ATTACHSORT_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mailbox and attachment destination.
    pub mail: MailConfig,
    /// Manifest location and durability.
    pub manifest: ManifestConfig,
    /// Category names applied to messages.
    pub categories: CategoryConfig,
    /// Where credentials come from.
    pub credentials: CredentialsConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Mailbox and attachment destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Mailbox owner (user principal name).
    pub user_email: String,
    /// Display name of the folder to scan.
    pub folder: String,
    /// Directory attachments are saved into.
    pub destination: PathBuf,
    /// Lowercase extensions to process (e.g. `["pdf", "docx"]`). Empty means all.
    pub allowed_extensions: Vec<String>,
    /// Sender-domain → label appended to saved filenames.
    pub sender_labels: BTreeMap<String, String>,
    /// Mark a message read once it is categorized as new.
    pub mark_read_on_new: bool,
    /// Set the follow-up flag to complete on messages with no eligible
    /// attachment (all filtered out, or none of them files).
    pub flag_without_eligible: bool,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Manifest location and durability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest file path. Defaults to a file next to the executable.
    pub path: Option<PathBuf>,
    /// When the manifest is written during a run.
    pub save_mode: SaveMode,
}

/// When the orchestrator persists the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveMode {
    /// Once, after every message has been processed.
    #[default]
    EndOfRun,
    /// After every newly recorded attachment, and once more at the end.
    Incremental,
}

/// Category names applied to messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    /// Applied when every processed attachment was new.
    pub new: String,
    /// Applied when any processed attachment was already known.
    pub duplicate: String,
}

/// Where credentials come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Path to a TOML file with `tenant_id`, `client_id` and `client_secret`.
    pub file: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            user_email: String::new(),
            folder: "invoices".to_string(),
            destination: PathBuf::from("attachments"),
            allowed_extensions: Vec::new(),
            sender_labels: BTreeMap::new(),
            mark_read_on_new: false,
            flag_without_eligible: false,
            request_timeout_secs: 60,
        }
    }
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            new: "Attachment Extracted".to_string(),
            duplicate: "Doubled up".to_string(),
        }
    }
}

impl Config {
    /// Effective manifest path.
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .path
            .clone()
            .unwrap_or_else(default_manifest_path)
    }

    /// Reject settings that would make a run misbehave.
    ///
    /// The two category names must be non-empty and distinct, otherwise new
    /// and repeated content could not be told apart in the mailbox.
    pub fn validate(&self) -> Result<()> {
        let new = self.categories.new.trim();
        let duplicate = self.categories.duplicate.trim();
        if new.is_empty() || duplicate.is_empty() {
            return Err(SortError::InvalidConfig(
                "category names must not be empty".to_string(),
            ));
        }
        if new.eq_ignore_ascii_case(duplicate) {
            return Err(SortError::InvalidConfig(format!(
                "categories.new and categories.duplicate are both '{new}'"
            )));
        }
        if self.mail.request_timeout_secs == 0 {
            return Err(SortError::InvalidConfig(
                "mail.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective credentials file path.
    pub fn credentials_file(&self) -> PathBuf {
        self.credentials.file.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("attachsort")
                .join("credentials.toml")
        })
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration when no file exists. A file that exists
/// but cannot be read or parsed is an error: falling back to defaults would
/// silently swap the manifest path and destination.
pub fn load_config() -> Result<Config> {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Ok(Config::default()),
    }
}

/// Load configuration from one file.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| SortError::io(path, e))?;
    let cfg = toml::from_str::<Config>(&contents).map_err(|e| {
        SortError::InvalidConfig(format!("{}: {}", path.display(), e.message()))
    })?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("attachsort").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attachsort")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.mail.folder, "invoices");
        assert_eq!(cfg.categories.new, "Attachment Extracted");
        assert_eq!(cfg.categories.duplicate, "Doubled up");
        assert_eq!(cfg.manifest.save_mode, SaveMode::EndOfRun);
        assert!(cfg.mail.allowed_extensions.is_empty());
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.mail.folder, cfg.mail.folder);
        assert_eq!(parsed.categories.duplicate, cfg.categories.duplicate);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[mail]
user_email = "accounts@example.com"
allowed_extensions = ["pdf", "docx"]

[mail.sender_labels]
"country-care.com.au" = "country care"

[manifest]
save_mode = "incremental"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.mail.user_email, "accounts@example.com");
        assert_eq!(cfg.mail.allowed_extensions, vec!["pdf", "docx"]);
        assert_eq!(
            cfg.mail.sender_labels.get("country-care.com.au").map(String::as_str),
            Some("country care")
        );
        assert_eq!(cfg.manifest.save_mode, SaveMode::Incremental);
        // Other fields use defaults
        assert_eq!(cfg.mail.folder, "invoices");
        assert_eq!(cfg.categories.new, "Attachment Extracted");
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut cfg = Config::default();
        cfg.categories.duplicate = "attachment extracted".to_string();
        assert!(matches!(cfg.validate(), Err(SortError::InvalidConfig(_))));

        let mut cfg = Config::default();
        cfg.categories.new = "  ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.mail.request_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unparsable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[manifest]\npath = \"/srv/state/manifest.json\"\nsave_mode = \"incremntal\"\n",
        )
        .unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, SortError::InvalidConfig(_)));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[manifest]\npath = \"/srv/state/manifest.json\"\n").unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.manifest_path(), PathBuf::from("/srv/state/manifest.json"));
    }

    #[test]
    fn test_manifest_path_override() {
        let mut cfg = Config::default();
        cfg.manifest.path = Some(PathBuf::from("/srv/state/manifest.json"));
        assert_eq!(cfg.manifest_path(), PathBuf::from("/srv/state/manifest.json"));
    }
}
