use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::HandlerError;

/// Thin OpenAI-compatible chat-completions client: one `reqwest::Client`,
/// `bearer_auth`, a single POST, non-2xx becomes an error the caller
/// classifies. No streaming, no tool calling — handlers only need a
/// single text response.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url, api_key }
    }

    /// Plain text completion: one system + one user message.
    pub async fn complete(&self, model: &str, system: &str, user: &str) -> Result<String, HandlerError> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        self.send(body).await
    }

    /// Vision completion: a text prompt plus a base64-encoded image, sent
    /// as an OpenAI-compatible multi-part content array — the standard
    /// wire shape for vision-capable chat-completions endpoints.
    pub async fn complete_vision(&self, model: &str, prompt: &str, image_base64: &str, mime_type: &str) -> Result<String, HandlerError> {
        let data_uri = format!("data:{mime_type};base64,{image_base64}");
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": prompt},
                        {"type": "image_url", "image_url": {"url": data_uri}},
                    ],
                },
            ],
        });
        self.send(body).await
    }

    async fn send(&self, body: serde_json::Value) -> Result<String, HandlerError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(%url, "sending llm request");

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                HandlerError::Unavailable(e.to_string())
            } else {
                HandlerError::Unavailable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, body = %text, "llm server error");
            return Err(HandlerError::Unavailable(format!("http {status}")));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, body = %text, "llm client error");
            return Err(HandlerError::InvalidResponse(format!("http {status}: {text}")));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| HandlerError::InvalidResponse(format!("undecodable response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| HandlerError::InvalidResponse("no choices in llm response".into()))
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Parse a handler's expected JSON object out of the model's raw text
/// reply, tolerating a ```json fenced block (a common model habit).
pub fn parse_json_reply<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, HandlerError> {
    let trimmed = raw.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    serde_json::from_str(candidate)
        .map_err(|e| HandlerError::InvalidResponse(format!("could not parse model output as json: {e}")))
}
