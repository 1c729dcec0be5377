use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::providers::Provider;
use crate::romanize;
use crate::translations::SlangReport;
use crate::translator::Translator;

pub const GENERATION_FAILED: &str = "AI generation failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LookupResponse {
    Success {
        source: Source,
        is_ambiguous: bool,
        results: Vec<Value>,
    },
    Error {
        message: String,
    },
}

/// Cache-then-model slang lookup.
#[derive(Debug, Clone)]
pub struct Lookup<P: Provider + Clone> {
    translator: Translator<P>,
    cache: ResultCache,
}

impl<P: Provider + Clone> Lookup<P> {
    pub fn new(translator: Translator<P>, cache: ResultCache) -> Self {
        Self { translator, cache }
    }

    pub fn translator(&self) -> &Translator<P> {
        &self.translator
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn process_text(&self, text: &str) -> Result<LookupResponse> {
        if text.trim().is_empty() {
            bail!("text is empty");
        }

        if let Some(cached) = self.cached_report(text) {
            info!("cache hit for {:?}", text.trim());
            return Ok(LookupResponse::Success {
                source: Source::Cache,
                is_ambiguous: cached.ambiguous(),
                results: cached.results,
            });
        }

        let mut report = self.translator.slang(text).await?;
        if report.results.is_empty() {
            return Ok(LookupResponse::Error {
                message: GENERATION_FAILED.to_string(),
            });
        }
        romanize::apply_to_results(&mut report.results);
        report.is_ambiguous = Some(report.ambiguous());
        self.cache.set(text, &report);

        Ok(LookupResponse::Success {
            source: Source::Gemini,
            is_ambiguous: report.ambiguous(),
            results: report.results,
        })
    }

    fn cached_report(&self, text: &str) -> Option<SlangReport> {
        let value = self.cache.get(text)?;
        match serde_json::from_value::<SlangReport>(value) {
            Ok(report) if !report.results.is_empty() => Some(report),
            Ok(_) => None,
            Err(err) => {
                warn!("ignoring cache entry with unexpected shape: {}", err);
                None
            }
        }
    }
}
