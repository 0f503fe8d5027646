//! Client settings: defaults, then `client.toml`, then environment.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:4000";
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 1000;
pub const DEFAULT_LOGOUT_DELAY_MS: u64 = 500;
pub const SETTINGS_FILE: &str = "client.toml";
const DATA_DIR_NAME: &str = ".todo_client";
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub session_file: PathBuf,
    pub redirect_delay_ms: u64,
    pub logout_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            session_file: default_session_file(),
            redirect_delay_ms: DEFAULT_REDIRECT_DELAY_MS,
            logout_delay_ms: DEFAULT_LOGOUT_DELAY_MS,
        }
    }
}

impl ClientSettings {
    pub fn api_url(&self) -> anyhow::Result<Url> {
        parse_api_url(&self.api_base_url)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn logout_delay(&self) -> Duration {
        Duration::from_millis(self.logout_delay_ms)
    }
}

pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(Path::new(SETTINGS_FILE), |name| std::env::var(name).ok())
}

pub fn load_settings_from(
    settings_file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(settings_file) {
        let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(&raw)
            .with_context(|| format!("failed to parse '{}'", settings_file.display()))?;
        if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
            settings.api_base_url = v.to_string();
        }
        if let Some(v) = file_cfg.get("session_file").and_then(toml::Value::as_str) {
            settings.session_file = PathBuf::from(v);
        }
        if let Some(v) = file_delay(&file_cfg, "redirect_delay_ms")? {
            settings.redirect_delay_ms = v;
        }
        if let Some(v) = file_delay(&file_cfg, "logout_delay_ms")? {
            settings.logout_delay_ms = v;
        }
    }

    let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("TODO_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = non_empty("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = non_empty("TODO_SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }
    if let Some(v) = non_empty("APP__SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }

    if let Some(v) = non_empty("APP__REDIRECT_DELAY_MS") {
        settings.redirect_delay_ms = env_delay("APP__REDIRECT_DELAY_MS", &v)?;
    }
    if let Some(v) = non_empty("APP__LOGOUT_DELAY_MS") {
        settings.logout_delay_ms = env_delay("APP__LOGOUT_DELAY_MS", &v)?;
    }

    settings.api_url()?;
    Ok(settings)
}

fn file_delay(
    file_cfg: &HashMap<String, toml::Value>,
    key: &str,
) -> anyhow::Result<Option<u64>> {
    file_cfg
        .get(key)
        .and_then(toml::Value::as_integer)
        .map(|v| {
            u64::try_from(v).with_context(|| format!("{key} must not be negative, got {v}"))
        })
        .transpose()
}

fn env_delay(name: &str, raw: &str) -> anyhow::Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{name} is not a number: {raw}"))
}

/// Accepts absolute http(s) URLs only; a trailing slash is dropped.
pub fn parse_api_url(raw: &str) -> anyhow::Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("API base URL is empty");
    }
    let url = Url::parse(trimmed).with_context(|| format!("invalid API base URL '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("API base URL must use http or https, got '{}'", url.scheme());
    }
    Ok(url)
}

fn default_session_file() -> PathBuf {
    let base = ["HOME", "USERPROFILE"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(DATA_DIR_NAME).join(SESSION_FILE_NAME)
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
