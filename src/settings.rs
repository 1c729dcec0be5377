use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;
use crate::providers::RetryPolicy;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_addr: String,
    pub cache_dir: PathBuf,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub overlay_font_path: Option<PathBuf>,
    pub overlay_font_family: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8000".to_string(),
            cache_dir: paths::cache_dir(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.6,
            request_timeout: Duration::from_secs(45),
            retry: RetryPolicy::default(),
            overlay_font_path: None,
            overlay_font_family: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    cache: Option<CacheSettings>,
    gemini: Option<GeminiSettings>,
    retry: Option<RetrySettings>,
    overlay: Option<OverlaySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSettings {
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiSettings {
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrySettings {
    max_attempts: Option<usize>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_elapsed_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_path: Option<String>,
    font_family: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(dir) = paths::settings_dir() {
        ordered_paths.push(dir.join("settings.toml"));
        ordered_paths.push(dir.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr.filter(|value| !value.trim().is_empty()) {
                self.server_addr = addr;
            }
        }
        if let Some(cache) = incoming.cache {
            if let Some(dir) = cache.dir.as_deref().and_then(paths::normalize_dir) {
                self.cache_dir = dir;
            }
        }
        if let Some(gemini) = incoming.gemini {
            if let Some(model) = gemini.model.filter(|value| !value.trim().is_empty()) {
                self.model = model;
            }
            if let Some(temperature) = gemini.temperature {
                if (0.0..=2.0).contains(&temperature) {
                    self.temperature = temperature;
                }
            }
            if let Some(secs) = gemini.timeout_secs {
                if secs > 0 {
                    self.request_timeout = Duration::from_secs(secs);
                }
            }
        }
        if let Some(retry) = incoming.retry {
            if let Some(attempts) = retry.max_attempts {
                if attempts > 0 {
                    self.retry.max_attempts = attempts;
                }
            }
            if let Some(ms) = retry.base_delay_ms {
                self.retry.base_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = retry.max_delay_ms {
                self.retry.max_delay = Duration::from_millis(ms);
            }
            if let Some(secs) = retry.max_elapsed_secs {
                self.retry.max_elapsed = Duration::from_secs(secs);
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(path) = overlay.font_path.as_deref().and_then(paths::normalize_dir) {
                self.overlay_font_path = Some(path);
            }
            if let Some(family) = overlay.font_family.filter(|value| !value.trim().is_empty()) {
                self.overlay_font_family = Some(family);
            }
        }
    }
}
