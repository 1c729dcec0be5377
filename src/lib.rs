use anyhow::{Context, Result, anyhow};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod annotate;
pub mod cache;
pub mod error;
pub mod logging;
pub mod lookup;
mod paths;
pub mod providers;
pub mod romanize;
pub mod server;
pub mod settings;
pub mod translations;
mod translator;

#[cfg(test)]
mod test_util;

pub use annotate::{AnnotationItem, Canvas, ImageAnnotator, OverlayFont, RemixOutcome};
pub use cache::ResultCache;
pub use error::CallError;
pub use lookup::{Lookup, LookupResponse};
pub use providers::{Gemini, Provider, ProviderUsage};
pub use translator::Translator;

#[derive(Debug, Clone)]
pub enum Command {
    Serve {
        addr: Option<String>,
    },
    Text {
        text: String,
    },
    Style {
        text: String,
        style: String,
    },
    Read {
        image: PathBuf,
    },
    Remix {
        image: PathBuf,
        items: Option<PathBuf>,
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub key: Option<String>,
    pub settings_path: Option<String>,
}

/// Runs one command and returns what should be printed.
pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let key = config.key.as_deref();

    match config.command {
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| settings.server_addr.clone());
            let lookup = Lookup::new(
                build_translator(&settings, key)?,
                ResultCache::new(&settings.cache_dir),
            );
            server::run_server(lookup, build_annotator(&settings), &addr).await?;
            Ok(String::new())
        }
        Command::Text { text } => {
            let lookup = Lookup::new(
                build_translator(&settings, key)?,
                ResultCache::new(&settings.cache_dir),
            );
            let response = lookup.process_text(&text).await?;
            to_pretty(&response)
        }
        Command::Style { text, style } => {
            if text.trim().is_empty() {
                return Err(anyhow!("text is empty"));
            }
            let rewrite = build_translator(&settings, key)?
                .style(&text, &style)
                .await?;
            to_pretty(&rewrite)
        }
        Command::Read { image } => {
            let canvas = load_canvas(&image).await?;
            let png = canvas.to_png()?;
            let reading = build_translator(&settings, key)?.read_image(png).await?;
            to_pretty(&reading)
        }
        Command::Remix {
            image,
            items,
            output,
        } => {
            let canvas = load_canvas(&image).await?;
            let items = match items {
                Some(path) => load_items(&path)?,
                None => {
                    let png = canvas.to_png()?;
                    build_translator(&settings, key)?
                        .read_image(png)
                        .await?
                        .regions
                }
            };
            remix(build_annotator(&settings), canvas, items, output).await
        }
    }
}

fn build_translator(
    settings: &settings::Settings,
    key: Option<&str>,
) -> Result<Translator<Gemini>> {
    let key = providers::resolve_key(key).with_context(|| "no API key found for Gemini")?;
    let provider = Gemini::new(key)
        .with_model(settings.model.clone())
        .with_temperature(settings.temperature)
        .with_timeout(settings.request_timeout)
        .with_retry(settings.retry.clone());
    Ok(Translator::new(provider))
}

fn build_annotator(settings: &settings::Settings) -> ImageAnnotator {
    let font = OverlayFont::resolve(
        settings.overlay_font_path.as_deref(),
        settings.overlay_font_family.as_deref(),
    );
    ImageAnnotator::new(font)
}

async fn load_canvas(path: &Path) -> Result<Canvas> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image: {}", path.display()))?;
    tokio::task::spawn_blocking(move || Canvas::decode(&bytes))
        .await
        .with_context(|| "image decode task failed")?
        .map_err(|err| anyhow!(annotate::invalid_image_message(&err)))
}

fn load_items(path: &Path) -> Result<Vec<AnnotationItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read items: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse items: {}", path.display()))
}

async fn remix(
    annotator: ImageAnnotator,
    canvas: Canvas,
    items: Vec<AnnotationItem>,
    output: Option<PathBuf>,
) -> Result<String> {
    let Some(output) = output else {
        let outcome = tokio::task::spawn_blocking(move || annotator.remix(&canvas, &items))
            .await
            .with_context(|| "remix task failed")?;
        return match outcome {
            RemixOutcome::Failed { error } => Err(anyhow!(error)),
            remixed => to_pretty(&remixed),
        };
    };

    let annotated = tokio::task::spawn_blocking(move || annotator.annotate_canvas(&canvas, &items))
        .await
        .with_context(|| "remix task failed")??;
    let png = annotated.canvas.to_png()?;
    tokio::fs::write(&output, png)
        .await
        .with_context(|| format!("failed to write remixed image: {}", output.display()))?;
    info!("wrote {}", output.display());
    to_pretty(&json!({
        "itemCount": annotated.item_count,
        "originalText": annotated.original_text,
        "translatedText": annotated.translated_text,
        "output": output.display().to_string(),
    }))
}

fn to_pretty<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| "failed to serialize output")
}
