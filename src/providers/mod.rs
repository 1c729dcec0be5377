use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod gemini;
mod retry;

pub use gemini::Gemini;
pub use retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub args: serde_json::Value,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

/// Binary payload attached to a user turn, e.g. the canvas PNG.
#[derive(Debug, Clone)]
pub struct DataAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[derive(Debug, Clone, Copy)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone)]
pub enum MessagePart {
    Text(String),
    Data(DataAttachment),
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            parts: vec![MessagePart::Text(content)],
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::Text(content)],
        }
    }

    pub fn user_data(data: DataAttachment) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::Data(data)],
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn append_user_data(self, data: DataAttachment) -> Self;
    fn register_tool(self, tool: ToolSpec) -> Self;
    fn call_tool(self, tool_name: &str) -> ProviderFuture;
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|value| !value.trim().is_empty()) {
        return Ok(key.to_string());
    }
    get_env("GEMINI_API_KEY")
        .or_else(|| get_env("GOOGLE_API_KEY"))
        .ok_or_else(|| anyhow!("API key missing (checked --key, GEMINI_API_KEY, GOOGLE_API_KEY)"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
