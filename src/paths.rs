use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "VERBABRIDGE_DIR";
const DEFAULT_DIR_NAME: &str = ".verbabridge";

pub(crate) fn settings_dir() -> Option<PathBuf> {
    if let Some(dir) = base_dir_override() {
        return Some(dir);
    }
    default_base_dir()
}

pub(crate) fn cache_dir() -> PathBuf {
    if let Some(dir) = base_dir_override() {
        return dir.join("cache");
    }
    default_base_dir()
        .map(|dir| dir.join("cache"))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR_NAME).join("cache"))
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn default_base_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(DEFAULT_DIR_NAME))
        }
    })
}

pub(crate) fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    let mut normalized = PathBuf::new();
    for component in Path::new(&expanded).components() {
        normalized.push(component.as_os_str());
    }
    Some(normalized)
}

fn expand_tilde(value: &str) -> String {
    if value == "~" || value.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let home = home.trim();
            if home.is_empty() {
                return value.to_string();
            }
            if value == "~" {
                return home.to_string();
            }
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}
