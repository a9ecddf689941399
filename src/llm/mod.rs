pub mod sse;

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Incremental completion output, one text delta per item.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// A chat completion provider. Both calls send a single user message.
pub trait ChatBackend: Send + Sync {
    /// Non-streaming completion, returned whole.
    fn complete(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Streaming completion. The stream ends when the provider signals
    /// completion; a transport failure surfaces as an `Err` item.
    fn stream(&self, prompt: &str) -> impl Future<Output = Result<ChunkStream>> + Send;
}

/// OpenAI-compatible chat completions client.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let api_key = dotenv::var("LLM_API_KEY")
            .or_else(|_| dotenv::var("API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());

        // No overall request timeout: streamed bodies can run long. Callers
        // bound each call with RunConfig::call_timeout instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    async fn send(
        &self,
        prompt: &str,
        stream: bool,
        temperature: Option<f32>,
    ) -> Result<reqwest::Response> {
        let messages = [Message::user(prompt)];
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream,
            temperature,
        };

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        debug!(
            model = %self.model,
            stream,
            prompt_len = prompt.len(),
            "Sending chat completion"
        );
        let resp = req.send().await.context("LLM request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("LLM API returned {}: {}", status, body.trim());
        }
        Ok(resp)
    }
}

/// Text of `choices[0].message.content` in a non-streamed completion.
fn message_content(json: &serde_json::Value) -> Result<String> {
    match json["choices"].get(0).map(|c| &c["message"]["content"]) {
        Some(serde_json::Value::String(content)) => Ok(content.clone()),
        Some(_) => bail!("LLM response has no message content"),
        None => bail!("LLM response has no choices"),
    }
}

impl ChatBackend for LlmClient {
    async fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
        let resp = self.send(prompt, false, temperature).await?;
        let text = resp.text().await.context("Failed to read LLM response")?;
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse LLM JSON")?;
        message_content(&json)
    }

    async fn stream(&self, prompt: &str) -> Result<ChunkStream> {
        let resp = self.send(prompt, true, None).await?;
        Ok(sse::text_chunks(resp.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> LlmClient {
        LlmClient {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            client("https://api.openai.com/v1").endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            client("http://localhost:1234/").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client("https://proxy.internal/v1/chat/completions").endpoint(),
            "https://proxy.internal/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_omits_missing_temperature() {
        let messages = [Message::user("Bonjour")];
        let streamed = serde_json::to_value(ChatRequest {
            model: "m",
            messages: &messages,
            stream: true,
            temperature: None,
        })
        .unwrap();
        assert!(streamed.get("temperature").is_none());
        assert_eq!(streamed["stream"], true);
        assert_eq!(streamed["messages"][0]["role"], "user");

        let extraction = serde_json::to_value(ChatRequest {
            model: "m",
            messages: &messages,
            stream: false,
            temperature: Some(0.0),
        })
        .unwrap();
        assert_eq!(extraction["temperature"], 0.0);
    }

    #[test]
    fn test_message_content() {
        let ok = serde_json::json!({"choices": [{"message": {"content": "[]"}}]});
        assert_eq!(message_content(&ok).unwrap(), "[]");

        let null = serde_json::json!({"choices": [{"message": {"content": null}}]});
        assert!(message_content(&null).is_err());

        let empty = serde_json::json!({"choices": []});
        let err = message_content(&empty).unwrap_err();
        assert_eq!(err.to_string(), "LLM response has no choices");

        let missing = serde_json::json!({"id": "x"});
        assert!(message_content(&missing).is_err());
    }
}
