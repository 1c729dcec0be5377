use anyhow::Result;
use tracing::debug;

use crate::providers::{DataAttachment, Provider, ProviderResponse, ToolSpec};
use crate::translations::{
    self, DEFAULT_LENS_LANGUAGE, ImageReading, SlangReport, StyleRewrite,
};

/// Model-backed operations over an injected provider.
#[derive(Debug, Clone)]
pub struct Translator<P: Provider + Clone> {
    provider: P,
    lens_language: String,
}

impl<P: Provider + Clone> Translator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            lens_language: DEFAULT_LENS_LANGUAGE.to_string(),
        }
    }

    pub fn with_lens_language(mut self, language: impl Into<String>) -> Self {
        self.lens_language = language.into();
        self
    }

    pub async fn call_tool_with_data(
        &self,
        tool: ToolSpec,
        system_prompt: String,
        user_input: String,
        data: Option<DataAttachment>,
    ) -> Result<ProviderResponse> {
        let tool_name = tool.name.clone();
        let mut provider = self
            .provider
            .clone()
            .register_tool(tool)
            .append_system_input(system_prompt);
        if let Some(data) = data {
            provider = provider.append_user_data(data);
        }
        let response = provider
            .append_user_input(user_input)
            .call_tool(&tool_name)
            .await?;
        if let Some(usage) = &response.usage {
            debug!(
                "{} usage: prompt={:?} completion={:?} total={:?}",
                tool_name, usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
        Ok(response)
    }

    /// Every meaning of `text` with its dialect renderings.
    pub async fn slang(&self, text: &str) -> Result<SlangReport> {
        let prompt = translations::render_slang_prompt(text)?;
        let response = self
            .call_tool_with_data(
                translations::slang_tool(),
                prompt,
                text.trim().to_string(),
                None,
            )
            .await?;
        translations::parse_slang_args(response.args)
    }

    pub async fn style(&self, text: &str, style: &str) -> Result<StyleRewrite> {
        let prompt = translations::render_style_prompt(text, style)?;
        let response = self
            .call_tool_with_data(
                translations::style_tool(),
                prompt,
                text.trim().to_string(),
                None,
            )
            .await?;
        translations::parse_style_args(response.args)
    }

    /// Reads text regions off a PNG. Boxes refer to that PNG's pixels.
    pub async fn read_image(&self, png: Vec<u8>) -> Result<ImageReading> {
        let prompt = translations::render_lens_prompt(&self.lens_language)?;
        let data = DataAttachment {
            bytes: png,
            mime: "image/png".to_string(),
        };
        let response = self
            .call_tool_with_data(
                translations::lens_tool(),
                prompt,
                "Read this image.".to_string(),
                Some(data),
            )
            .await?;
        translations::parse_lens_args(response.args)
    }
}
