//! LLM provider client.
//!
//! One plain request per quiz, no retries. HTTP failures are classified into
//! [`ProviderError`] so the caller can show a useful card.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ProviderError;

const GEMINI_MODEL: &str = "gemma-3-27b-it";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const CLAUDE_MODEL: &str = "claude-3-haiku-20240307";
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Gemini,
    OpenAi,
    Claude,
}

impl Provider {
    /// Human-readable vendor name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::OpenAi => "OpenAI",
            Provider::Claude => "Claude",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
        };
        f.write_str(id)
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            "claude" | "anthropic" => Ok(Provider::Claude),
            other => Err(format!("unknown provider '{}' (gemini, openai, claude)", other)),
        }
    }
}

/// Text generation collaborator used by the quiz scheduler.
pub trait QuizGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        prompt: &str,
        provider: Provider,
        api_key: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

impl<T: QuizGenerator> QuizGenerator for Arc<T> {
    fn generate(
        &self,
        prompt: &str,
        provider: Provider,
        api_key: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send {
        (**self).generate(prompt, provider, api_key)
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: u16, provider: Provider) -> ProviderError {
    let name = provider.label().to_string();
    match status {
        401 | 403 => ProviderError::Auth(name),
        429 => ProviderError::RateLimited,
        404 => ProviderError::NotFound(name),
        400 => ProviderError::BadRequest(name),
        status => ProviderError::Unknown {
            provider: name,
            status,
        },
    }
}

/// Pull the generated text out of a provider's response body.
pub fn response_text(provider: Provider, body: &Value) -> Option<String> {
    match provider {
        Provider::Gemini => {
            let parts = body["candidates"].get(0)?["content"]["parts"].as_array()?;
            let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
            Some(text)
        }
        Provider::OpenAi => body["choices"].get(0)?["message"]["content"]
            .as_str()
            .map(str::to_string),
        Provider::Claude => body["content"].get(0)?["text"].as_str().map(str::to_string),
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpGenerator {
    client: Client,
}

impl HttpGenerator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn request(&self, prompt: &str, provider: Provider, api_key: &str) -> RequestBuilder {
        match provider {
            Provider::Gemini => {
                let url = format!(
                    "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                    GEMINI_MODEL
                );
                self.client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .json(&json!({
                        "contents": [{ "parts": [{ "text": prompt }] }],
                        "generationConfig": {
                            "temperature": TEMPERATURE,
                            "maxOutputTokens": MAX_TOKENS
                        }
                    }))
            }
            Provider::OpenAi => self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(api_key)
                .json(&json!({
                    "model": OPENAI_MODEL,
                    "messages": [{ "role": "user", "content": prompt }],
                    "temperature": TEMPERATURE,
                    "max_tokens": MAX_TOKENS
                })),
            Provider::Claude => self
                .client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": CLAUDE_MODEL,
                    "max_tokens": MAX_TOKENS,
                    "messages": [{ "role": "user", "content": prompt }]
                })),
        }
    }
}

impl QuizGenerator for HttpGenerator {
    async fn generate(
        &self,
        prompt: &str,
        provider: Provider,
        api_key: &str,
    ) -> Result<String, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Auth(provider.label().to_string()));
        }

        debug!("Sending {} char prompt to {}", prompt.len(), provider);
        let response = self
            .request(prompt, provider, api_key.trim())
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} API error {}: {}", provider.label(), status, body);
            return Err(classify_status(status.as_u16(), provider));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| ProviderError::InvalidResponse(provider.label().to_string()))?;
        response_text(provider, &body)
            .ok_or_else(|| ProviderError::InvalidResponse(provider.label().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_provider() {
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Claude);
        assert!("mistral".parse::<Provider>().is_err());
        assert_eq!(Provider::OpenAi.to_string(), "openai");
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(401, Provider::Claude), ProviderError::Auth("Claude".into()));
        assert_eq!(classify_status(403, Provider::Gemini), ProviderError::Auth("Gemini".into()));
        assert_eq!(classify_status(429, Provider::OpenAi), ProviderError::RateLimited);
        assert_eq!(classify_status(404, Provider::OpenAi), ProviderError::NotFound("OpenAI".into()));
        assert_eq!(classify_status(400, Provider::Gemini), ProviderError::BadRequest("Gemini".into()));
        assert_eq!(
            classify_status(503, Provider::Gemini),
            ProviderError::Unknown { provider: "Gemini".into(), status: 503 }
        );
        assert_eq!(
            classify_status(500, Provider::Claude).to_string(),
            "Claude API error: 500"
        );
    }

    #[test]
    fn response_shapes() {
        let gemini = json!({ "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }] });
        assert_eq!(response_text(Provider::Gemini, &gemini).as_deref(), Some("ab"));

        let openai = json!({ "choices": [{ "message": { "content": "hi" } }] });
        assert_eq!(response_text(Provider::OpenAi, &openai).as_deref(), Some("hi"));

        let claude = json!({ "content": [{ "type": "text", "text": "yo" }] });
        assert_eq!(response_text(Provider::Claude, &claude).as_deref(), Some("yo"));

        assert_eq!(response_text(Provider::Claude, &json!({ "error": "x" })), None);
    }
}
