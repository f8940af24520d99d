//! OpenAI-compatible chat completions client for the vision-language model.

use crate::errors::{PilotError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything the model sees for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// System prompt, goal, parsed elements and history as one text block
    pub prompt_text: String,
    /// Base64 PNG of the current screen
    pub image_base64: String,
}

/// Produces the next-action reply for a request.
pub trait ModelService {
    fn next_action(&self, request: &ModelRequest) -> Result<String>;
}

impl<T: ModelService + ?Sized> ModelService for &T {
    fn next_action(&self, request: &ModelRequest) -> Result<String> {
        (**self).next_action(request)
    }
}

/// API key that never shows up in Debug output.
#[derive(Clone, Default, PartialEq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "ApiKey(<empty>)")
        } else {
            write!(f, "ApiKey(***)")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VlmConfig {
    /// e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub api_key: ApiKey,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Option<Duration>,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: ApiKey::default(),
            model: String::new(),
            temperature: 0.0,
            request_timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Blocking client for `POST {base_url}/chat/completions`.
pub struct VlmClient {
    config: VlmConfig,
    http: reqwest::blocking::Client,
}

impl VlmClient {
    pub fn new(config: VlmConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(PilotError::Config("VLM base URL is empty".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(PilotError::Config("VLM model name is empty".to_string()));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    pub fn request_body(&self, request: &ModelRequest) -> Value {
        chat_request_body(&self.config.model, self.config.temperature, request)
    }
}

/// Single user message with a text part and an inline PNG part.
pub fn chat_request_body(model: &str, temperature: f32, request: &ModelRequest) -> Value {
    json!({
        "model": model,
        "temperature": temperature,
        "messages": [
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": request.prompt_text },
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/png;base64,{}", request.image_base64)
                        }
                    }
                ]
            }
        ]
    })
}

/// `choices[0].message.content` of a chat completions response body.
pub fn content_from_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| PilotError::Model("response contained no message content".to_string()))
}

impl ModelService for VlmClient {
    fn next_action(&self, request: &ModelRequest) -> Result<String> {
        info!(
            "Calling VLM {} ({} prompt chars, {} image bytes)",
            self.config.model,
            request.prompt_text.len(),
            request.image_base64.len()
        );

        let mut req = self.http.post(self.endpoint()).json(&self.request_body(request));
        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(self.config.api_key.as_str());
        }
        let resp = req.send()?;

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            warn!("VLM API error: {} - {}", status, text);
            return Err(PilotError::Model(format!("API error ({status}): {text}")));
        }

        let content = content_from_response(&text)?;
        debug!("VLM response: {}", content);
        Ok(content)
    }
}
