use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/";
const DEFAULT_REFRESH_PATH: &str = "auth/updateAcessToken/";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_BASE_URL: &str = "FINSHEET_API_BASE_URL";
pub const ENV_ACCESS_TOKEN: &str = "FINSHEET_ACCESS_TOKEN";
pub const ENV_CSRF_TOKEN: &str = "FINSHEET_CSRF_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub access_token: Option<String>,
    pub csrf_token: Option<String>,
    pub refresh_path: String,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            csrf_token: None,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Defaults, then `config.toml` from the platform config dir, then env.
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        let mut config = Self::load_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        if config.api_base_url.trim().is_empty() {
            anyhow::bail!("api_base_url must not be empty")
        }
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN).filter(|v| !v.is_empty()) {
            self.access_token = Some(token);
        }
        if let Some(token) = lookup(ENV_CSRF_TOKEN).filter(|v| !v.is_empty()) {
            self.csrf_token = Some(token);
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "finsheet", "finsheet")
        .ok_or_else(|| anyhow!("unable to resolve data directory"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

fn ensure_webview_data_dir(base_data_dir: &Path) -> Result<PathBuf> {
    let webview_data_dir = base_data_dir.join("webview2");
    std::fs::create_dir_all(&webview_data_dir).with_context(|| {
        format!(
            "failed to create webview dir: {}",
            webview_data_dir.display()
        )
    })?;
    Ok(webview_data_dir)
}

pub fn default_webview_data_dir() -> Result<PathBuf> {
    ensure_webview_data_dir(project_dirs()?.data_local_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_test_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("finsheet-{prefix}-{nanos}"))
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml("api_base_url = \"https://api.example.com/\"\n")
            .expect("config should parse");
        assert_eq!(config.api_base_url, "https://api.example.com/");
        assert_eq!(config.refresh_path, DEFAULT_REFRESH_PATH);
        assert_eq!(config.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(AppConfig::from_toml("api_base_url = \"\"").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_BASE_URL, "https://override.example.com/"),
            (ENV_ACCESS_TOKEN, "token-1"),
            (ENV_CSRF_TOKEN, ""),
        ]);

        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_base_url, "https://override.example.com/");
        assert_eq!(config.access_token.as_deref(), Some("token-1"));
        assert_eq!(config.csrf_token, None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = unique_test_dir("missing").join("config.toml");
        let config = AppConfig::load_file(&path).expect("missing file should not fail");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let temp_dir = unique_test_dir("config");
        std::fs::create_dir_all(&temp_dir).expect("should create temp dir");
        let path = temp_dir.join("config.toml");
        std::fs::write(
            &path,
            "api_base_url = \"http://localhost:9000/\"\nrequest_timeout_secs = 5\n",
        )
        .expect("should write config fixture");

        let config = AppConfig::load_file(&path).expect("config should load");
        assert_eq!(config.api_base_url, "http://localhost:9000/");
        assert_eq!(config.request_timeout_secs, 5);

        std::fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
    }
}
