use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};

use super::retry::{
    RetryPolicy, is_retryable_status, is_retryable_transport, retry_after, wait_before_retry,
};
use super::{
    DataAttachment, Message, MessagePart, MessageRole, Provider, ProviderFuture, ProviderResponse,
    ProviderUsage, ToolSpec,
};
use crate::error::CallError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
    retry: RetryPolicy,
    client: reqwest::Client,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            base_url: BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            timeout: Duration::from_secs(45),
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    /// Points requests at another `.../models` endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn find_tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    fn request_body(&self, tool: &ToolSpec) -> Value {
        let (system_inputs, user_inputs): (Vec<&Message>, Vec<&Message>) = self
            .messages
            .iter()
            .partition(|message| matches!(message.role, MessageRole::System));

        let system_instruction = system_inputs
            .into_iter()
            .flat_map(|message| message.parts.iter())
            .filter_map(|part| match part {
                MessagePart::Text(text) => Some(text.as_str()),
                MessagePart::Data(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let contents = user_inputs
            .into_iter()
            .map(|message| {
                let parts = message
                    .parts
                    .iter()
                    .map(|part| match part {
                        MessagePart::Text(text) => json!({"text": text}),
                        MessagePart::Data(data) => json!({
                            "inline_data": {
                                "mime_type": data.mime,
                                "data": BASE64.encode(&data.bytes)
                            }
                        }),
                    })
                    .collect::<Vec<_>>();
                json!({"role": "user", "parts": parts})
            })
            .collect::<Vec<_>>();

        let safety_settings = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": "BLOCK_NONE"}))
            .collect::<Vec<_>>();

        let mut generation_config = json!({});
        if let Some(temperature) = self.temperature {
            generation_config["temperature"] = json!(temperature);
        }

        json!({
            "contents": contents,
            "systemInstruction": if system_instruction.trim().is_empty() { Value::Null } else { json!({"parts": [{"text": system_instruction}]}) },
            "generationConfig": generation_config,
            "safetySettings": safety_settings,
            "tools": [
                {
                    "function_declarations": [
                        {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters
                        }
                    ]
                }
            ],
            "tool_config": {
                "function_calling_config": {
                    "mode": "ANY",
                    "allowed_function_names": [tool.name]
                }
            }
        })
    }
}

impl Provider for Gemini {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn append_user_data(mut self, data: DataAttachment) -> Self {
        self.messages.push(Message::user_data(data));
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self
                .find_tool(&tool_name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("tool '{}' not registered", tool_name))?;
            let url = format!("{}/{}:generateContent", self.base_url, self.model);
            let body = self.request_body(&tool);

            let started = Instant::now();
            let mut attempt = 0usize;
            loop {
                attempt += 1;
                let failure = match send_once(&self, &url, &body).await {
                    Attempt::Success(text) => {
                        return extract_tool_response(&text, &tool_name, &self.model);
                    }
                    Attempt::Fatal(err) => return Err(err.into()),
                    Attempt::Retryable(failure) => failure,
                };
                let wait = self.retry.delay_for(attempt, failure.retry_after);
                if !self.retry.has_budget(attempt, started.elapsed(), wait) {
                    let err = if failure.timed_out {
                        CallError::Timeout { attempts: attempt }
                    } else {
                        CallError::Unavailable {
                            attempts: attempt,
                            message: failure.message,
                        }
                    };
                    return Err(err.into());
                }
                wait_before_retry("Gemini", attempt, self.retry.max_attempts, wait).await;
            }
        })
    }
}

struct RetryableFailure {
    timed_out: bool,
    message: String,
    retry_after: Option<Duration>,
}

enum Attempt {
    Success(String),
    Retryable(RetryableFailure),
    Fatal(CallError),
}

async fn send_once(gemini: &Gemini, url: &str, body: &Value) -> Attempt {
    let sent = gemini
        .client
        .post(url)
        .header("x-goog-api-key", gemini.key.as_str())
        .timeout(gemini.timeout)
        .json(body)
        .send()
        .await;
    let response = match sent {
        Ok(response) => response,
        Err(err) => return transport_failure(err),
    };

    let status = response.status();
    let retry_after = retry_after(response.headers());
    let text = match response.text().await {
        Ok(text) => text,
        Err(err) => return transport_failure(err),
    };
    if status.is_success() {
        return Attempt::Success(text);
    }
    let retryable = is_retryable_status(status, &text);
    let message = extract_gemini_error(&text).unwrap_or(text);
    if retryable {
        Attempt::Retryable(RetryableFailure {
            timed_out: false,
            message: format!("Gemini API error ({}): {}", status, message),
            retry_after,
        })
    } else {
        Attempt::Fatal(CallError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport_failure(err: reqwest::Error) -> Attempt {
    if is_retryable_transport(&err) {
        Attempt::Retryable(RetryableFailure {
            timed_out: err.is_timeout(),
            message: err.to_string(),
            retry_after: None,
        })
    } else {
        Attempt::Fatal(CallError::Unavailable {
            attempts: 1,
            message: err.to_string(),
        })
    }
}

fn extract_tool_response(
    text: &str,
    tool_name: &str,
    fallback_model: &str,
) -> Result<ProviderResponse> {
    let payload: GeminiResponse = serde_json::from_str(text)
        .map_err(|err| CallError::parse(format!("invalid Gemini response JSON: {}", err)))?;
    let candidate = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| CallError::parse("no candidate returned from Gemini"))?;

    for part in &candidate.parts {
        if let Some(function_call) = &part.function_call
            && function_call.name == tool_name
        {
            let model = payload
                .model_version
                .filter(|value| !value.trim().is_empty())
                .or_else(|| Some(fallback_model.to_string()));
            let usage = payload.usage_metadata.map(|usage| ProviderUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            });
            return Ok(ProviderResponse {
                args: function_call.args.clone(),
                model,
                usage,
            });
        }
    }

    Err(CallError::parse("no tool call returned from Gemini").into())
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(status) = error.status.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", status));
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
    #[serde(rename = "modelVersion")]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}
