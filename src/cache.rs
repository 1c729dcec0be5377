//! On-disk result cache keyed by the md5 digest of normalized input text.
//!
//! Entries live as `<dir>/<digest>.json`. The cache is best effort: read and
//! write failures are logged and surface as a miss or a no-op.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
}

/// Lowercased, whitespace-trimmed form of `text`. No Unicode normalization.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Hex md5 of the normalized text.
pub fn key_for(text: &str) -> String {
    format!("{:x}", md5::compute(normalize(text).as_bytes()))
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let cache = Self { dir: dir.into() };
        if let Err(err) = cache.ensure_dir() {
            warn!("cache directory unavailable: {:#}", err);
        }
        cache
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, text: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_for(text)))
    }

    pub fn get(&self, text: &str) -> Option<Value> {
        let path = self.entry_path(text);
        if !path.exists() {
            return None;
        }
        match read_entry(&path) {
            Ok(value) => {
                debug!("cache hit: {}", path.display());
                Some(value)
            }
            Err(err) => {
                warn!("cache read error: {:#}", err);
                None
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, text: &str, value: &T) {
        if let Err(err) = self.write_entry(text, value) {
            warn!("cache write error: {:#}", err);
        }
    }

    fn write_entry<T: Serialize + ?Sized>(&self, text: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let path = self.entry_path(text);
        let body = serde_json::to_string_pretty(value)
            .with_context(|| "failed to serialize cache entry")?;
        let mut file = tempfile::Builder::new()
            .prefix(".entry-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .with_context(|| format!("failed to create temp file in {}", self.dir.display()))?;
        file.write_all(body.as_bytes())
            .with_context(|| "failed to write cache entry")?;
        file.persist(&path)
            .with_context(|| format!("failed to persist cache entry {}", path.display()))?;
        debug!("cache stored: {}", path.display());
        Ok(())
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir {}", self.dir.display()))?;
        info!("created cache directory: {}", self.dir.display());
        Ok(())
    }
}

fn read_entry(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}
