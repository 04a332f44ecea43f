//! Configuration management for licacquire using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::naming::FilenamePolicy;
use crate::scrapers::{ContentEndpoint, DEFAULT_BASE_URL};

/// Default ledger filename inside a download directory.
pub const DEFAULT_LEDGER_FILENAME: &str = "facility_information_metadata.csv";

/// Config filenames looked for in the working directory when prefer finds nothing.
const LOCAL_CONFIG_FILES: [&str; 4] = [
    "licacquire.toml",
    "licacquire.yaml",
    "licacquire.yml",
    "licacquire.json",
];

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Scheme and host of the licensing-search site.
    pub base_url: String,
    /// User agent override (None = default, "impersonate" = browser UA).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay after each upstream request in milliseconds.
    pub request_delay_ms: u64,
    /// Skip TLS certificate validation.
    pub accept_invalid_certs: bool,
    /// Upstream surface used for document content.
    pub content_endpoint: ContentEndpoint,
    /// Naming policy for newly written files.
    pub filename_policy: FilenamePolicy,
    /// Ledger filename used when `--metadata-csv` is not given.
    pub ledger_filename: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            request_timeout: 60,
            request_delay_ms: 1000,
            accept_invalid_certs: false,
            content_endpoint: ContentEndpoint::default(),
            filename_policy: FilenamePolicy::default(),
            ledger_filename: DEFAULT_LEDGER_FILENAME.to_string(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Default ledger location for a download directory.
    pub fn ledger_path(&self, download_dir: &Path) -> PathBuf {
        download_dir.join(&self.ledger_filename)
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Licensing-search base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// User agent string, or "impersonate".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    /// Accept invalid TLS certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_invalid_certs: Option<bool>,
    /// "apex" or "viewer".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_endpoint: Option<String>,
    /// "rich" or "minimal".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_policy: Option<String>,
    /// Ledger filename inside the download directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_filename: Option<String>,
    /// Default download directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to `licacquire.*` in the working directory, then defaults.
    pub async fn load() -> Self {
        if let Ok(pref_config) = prefer::load("licacquire").await {
            if let Some(path) = pref_config.source_path() {
                match Self::load_from_path(path).await {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring config {}: {}", path.display(), e),
                }
            }
        }

        for name in LOCAL_CONFIG_FILES {
            let path = Path::new(name);
            if path.exists() {
                match Self::load_from_path(path).await {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring config {}: {}", path.display(), e),
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific file path.
    /// Format is chosen by extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConfigurationError::Invalid(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let invalid = |kind: &str, e: &dyn std::fmt::Display| {
            ConfigurationError::Invalid(format!(
                "failed to parse {} config {}: {}",
                kind,
                path.display(),
                e
            ))
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| invalid("TOML", &e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| invalid("YAML", &e))?,
            _ => serde_json::from_str(&contents).map_err(|e| invalid("JSON", &e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are joined onto `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Default download directory from the config, resolved against `base_dir`.
    pub fn download_dir(&self, base_dir: &Path) -> Option<PathBuf> {
        self.download_dir
            .as_deref()
            .map(|dir| self.resolve_path(dir, base_dir))
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) -> Result<(), ConfigurationError> {
        if let Some(ref base_url) = self.base_url {
            settings.base_url = base_url.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(accept) = self.accept_invalid_certs {
            settings.accept_invalid_certs = accept;
        }
        if let Some(ref endpoint) = self.content_endpoint {
            settings.content_endpoint = ContentEndpoint::from_str(endpoint).ok_or_else(|| {
                ConfigurationError::Invalid(format!("unknown content_endpoint {:?}", endpoint))
            })?;
        }
        if let Some(ref policy) = self.filename_policy {
            settings.filename_policy = FilenamePolicy::from_str(policy).ok_or_else(|| {
                ConfigurationError::Invalid(format!("unknown filename_policy {:?}", policy))
            })?;
        }
        if let Some(ref ledger) = self.ledger_filename {
            settings.ledger_filename = ledger.clone();
        }
        Ok(())
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Apply `LICACQUIRE_*` environment overrides.
fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigurationError> {
    if let Some(base_url) = env_var("LICACQUIRE_BASE_URL") {
        tracing::debug!("Using LICACQUIRE_BASE_URL from environment: {}", base_url);
        settings.base_url = base_url;
    }

    if let Some(delay) = env_var("LICACQUIRE_REQUEST_DELAY_MS") {
        tracing::debug!("Using LICACQUIRE_REQUEST_DELAY_MS from environment: {}", delay);
        settings.request_delay_ms = delay.parse().map_err(|_| {
            ConfigurationError::Invalid(format!(
                "LICACQUIRE_REQUEST_DELAY_MS must be an integer, got {:?}",
                delay
            ))
        })?;
    }

    if let Some(user_agent) = env_var("LICACQUIRE_USER_AGENT") {
        tracing::debug!("Using LICACQUIRE_USER_AGENT from environment: {}", user_agent);
        settings.user_agent = Some(user_agent);
    }

    Ok(())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
///
/// An explicit `--config` path that cannot be read is an error; a discovered
/// file that fails to parse is skipped with a warning.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigurationError> {
    let config = match options.config_path {
        Some(ref path) => {
            if !path.exists() {
                return Err(ConfigurationError::MissingInput(path.clone()));
            }
            Config::load_from_path(path).await?
        }
        None => Config::load().await,
    };

    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings)?;
    apply_env_overrides(&mut settings)?;

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("licacquire.toml");
        std::fs::write(
            &path,
            "request_delay_ms = 250\ncontent_endpoint = \"viewer\"\nfilename_policy = \"minimal\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.request_delay_ms, Some(250));
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings).unwrap();
        assert_eq!(settings.request_delay_ms, 250);
        assert_eq!(settings.content_endpoint, ContentEndpoint::Viewer);
        assert_eq!(settings.filename_policy, FilenamePolicy::Minimal);
        assert_eq!(settings.ledger_filename, DEFAULT_LEDGER_FILENAME);
    }

    #[tokio::test]
    async fn test_load_yaml_and_json_config() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("licacquire.yaml");
        std::fs::write(&yaml, "user_agent: impersonate\nrequest_timeout: 5\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.user_agent.as_deref(), Some("impersonate"));
        assert_eq!(config.request_timeout, Some(5));

        let json = dir.path().join("licacquire.json");
        std::fs::write(&json, r#"{"ledger_filename": "ledger.csv"}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.ledger_filename.as_deref(), Some("ledger.csv"));
    }

    #[tokio::test]
    async fn test_malformed_config_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("licacquire.toml");
        std::fs::write(&path, "request_delay_ms = \"soon\"").unwrap();
        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let config = Config {
            content_endpoint: Some("ftp".to_string()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        assert!(config.apply_to_settings(&mut settings).is_err());
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::default();
        let base = Path::new("/srv/licensing");
        assert_eq!(
            config.resolve_path("pdfs", base),
            PathBuf::from("/srv/licensing/pdfs")
        );
        assert_eq!(config.resolve_path("/data/pdfs", base), PathBuf::from("/data/pdfs"));
        assert!(!config.resolve_path("~/pdfs", base).starts_with("~"));
    }

    #[tokio::test]
    async fn test_missing_explicit_config_is_error() {
        let dir = tempdir().unwrap();
        let options = LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
        };
        let err = load_settings_with_options(options).await.unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingInput(_)));
    }

    #[test]
    fn test_ledger_path() {
        let settings = Settings::default();
        assert_eq!(
            settings.ledger_path(Path::new("/pdfs")),
            PathBuf::from("/pdfs/facility_information_metadata.csv")
        );
    }
}
