use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};
use tracing::warn;

use crate::annotate::AnnotationItem;
use crate::error::CallError;
use crate::providers::ToolSpec;

pub const SLANG_TOOL: &str = "deliver_slang_report";
pub const STYLE_TOOL: &str = "deliver_style";
pub const LENS_TOOL: &str = "deliver_reading";

pub const DIALECTS: [&str; 6] = ["hokkien", "cantonese", "hakka", "hainan", "malay", "kelate"];
pub const DEFAULT_LENS_LANGUAGE: &str = "English and Standard Malay";

const SLANG_TEMPLATE: &str = include_str!("templates/slang.tera");
const STYLE_TEMPLATE: &str = include_str!("templates/style.tera");
const LENS_TEMPLATE: &str = include_str!("templates/lens.tera");

/// Meanings found for one input. `results` are kept as raw JSON so cached
/// entries round-trip verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlangReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ambiguous: Option<bool>,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl SlangReport {
    /// Older entries may lack the flag; more than one meaning implies it.
    pub fn ambiguous(&self) -> bool {
        self.is_ambiguous.unwrap_or(self.results.len() > 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRewrite {
    pub original: String,
    pub style: String,
    pub translated_text: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuTranslation {
    pub original: String,
    pub meaning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReading {
    pub detected_text: String,
    pub translations: Vec<MenuTranslation>,
    pub regions: Vec<AnnotationItem>,
}

pub fn slang_tool() -> ToolSpec {
    let hokkien = json!({
        "type": "object",
        "properties": {
            "hanzi": {"type": "string"},
            "english_meaning": {"type": "string"},
            "tone": {"type": "string"},
            "tailo": {"type": "string"}
        },
        "required": ["hanzi", "english_meaning", "tone", "tailo"]
    });
    let scripted = json!({
        "type": "object",
        "properties": {
            "script": {"type": "string"},
            "romanization": {"type": "string"},
            "tone": {"type": "string"}
        },
        "required": ["script", "romanization", "tone"]
    });
    let mut dialects = serde_json::Map::new();
    for dialect in DIALECTS {
        let schema = if dialect == "hokkien" {
            hokkien.clone()
        } else {
            scripted.clone()
        };
        dialects.insert(dialect.to_string(), schema);
    }

    ToolSpec {
        name: SLANG_TOOL.to_string(),
        description: "Return every meaning of the input with dialect renderings.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "is_ambiguous": {"type": "boolean"},
                "results": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "translations": {
                                "type": "object",
                                "properties": Value::Object(dialects),
                                "required": DIALECTS
                            }
                        },
                        "required": ["title", "description", "translations"]
                    }
                }
            },
            "required": ["is_ambiguous", "results"]
        }),
    }
}

pub fn style_tool() -> ToolSpec {
    ToolSpec {
        name: STYLE_TOOL.to_string(),
        description: "Return the persona rewrite with a short explanation.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "original": {"type": "string"},
                "style": {"type": "string"},
                "translated_text": {"type": "string"},
                "explanation": {"type": "string"}
            },
            "required": ["original", "style", "translated_text", "explanation"]
        }),
    }
}

pub fn lens_tool() -> ToolSpec {
    ToolSpec {
        name: LENS_TOOL.to_string(),
        description: "Return the text read from the image, translations and text regions."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "detected_text": {"type": "string"},
                "translations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "original": {"type": "string"},
                            "meaning": {"type": "string"}
                        },
                        "required": ["original", "meaning"]
                    }
                },
                "regions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "original_text": {"type": "string"},
                            "translated_text": {"type": "string"},
                            "box_2d": {
                                "type": "array",
                                "items": {"type": "number"}
                            }
                        },
                        "required": ["original_text", "translated_text", "box_2d"]
                    }
                }
            },
            "required": ["detected_text", "translations", "regions"]
        }),
    }
}

pub fn render_slang_prompt(text: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("text", text.trim());
    context.insert("dialects", &DIALECTS);
    context.insert("tool_name", SLANG_TOOL);
    Tera::one_off(SLANG_TEMPLATE, &context, false).with_context(|| "failed to render slang prompt")
}

pub fn render_style_prompt(text: &str, style: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("text", text.trim());
    context.insert("style", style.trim());
    context.insert("tool_name", STYLE_TOOL);
    Tera::one_off(STYLE_TEMPLATE, &context, false).with_context(|| "failed to render style prompt")
}

pub fn render_lens_prompt(target_language: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("target_language", target_language);
    context.insert("tool_name", LENS_TOOL);
    Tera::one_off(LENS_TEMPLATE, &context, false).with_context(|| "failed to render lens prompt")
}

pub fn parse_slang_args(value: Value) -> Result<SlangReport> {
    let report: SlangReport = serde_json::from_value(value)
        .map_err(|err| CallError::parse(format!("slang report: {}", err)))?;
    if let Some(index) = report.results.iter().position(|result| !result.is_object()) {
        return Err(CallError::parse(format!("slang result {} is not an object", index)).into());
    }
    Ok(report)
}

pub fn parse_style_args(value: Value) -> Result<StyleRewrite> {
    let rewrite: StyleRewrite = serde_json::from_value(value)
        .map_err(|err| CallError::parse(format!("style rewrite: {}", err)))?;
    if rewrite.translated_text.trim().is_empty() {
        return Err(CallError::parse("style rewrite is empty").into());
    }
    Ok(rewrite)
}

/// Regions that do not deserialize are dropped so one bad box cannot sink
/// the whole reading.
pub fn parse_lens_args(value: Value) -> Result<ImageReading> {
    #[derive(Deserialize)]
    struct LensArgs {
        #[serde(default)]
        detected_text: String,
        #[serde(default)]
        translations: Vec<MenuTranslation>,
        #[serde(default)]
        regions: Vec<Value>,
    }

    let args: LensArgs = serde_json::from_value(value)
        .map_err(|err| CallError::parse(format!("image reading: {}", err)))?;
    let mut regions = Vec::with_capacity(args.regions.len());
    for (index, region) in args.regions.into_iter().enumerate() {
        match serde_json::from_value::<AnnotationItem>(region) {
            Ok(item) => regions.push(item),
            Err(err) => warn!("dropping region {}: {}", index, err),
        }
    }
    Ok(ImageReading {
        detected_text: args.detected_text,
        translations: args.translations,
        regions,
    })
}
