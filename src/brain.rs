use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::config::{AiConfig, Provider};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// A text-completion model: prompt in, free text out.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// `provider/model`, stamped onto generated command lists.
    fn label(&self) -> String;
}

/// HTTP client for the configured language model.
pub struct Brain {
    client: Client,
    provider: Provider,
    model: String,
    api_key: String,
    base_url: String,
}

impl Brain {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| anyhow!("no API key configured for {}", config.provider.as_str()))?
            .to_string();
        let base_url = match config.provider {
            Provider::Gemini => GEMINI_BASE_URL,
            Provider::OpenAi => OPENAI_BASE_URL,
        };

        Ok(Self {
            client: Client::new(),
            provider: config.provider,
            model: config.model.clone(),
            api_key,
            base_url: base_url.to_string(),
        })
    }

    /// Point the client at a different host (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            error!(%status, reason = message, provider = self.provider.as_str(), "model API error");
            return Err(anyhow!(
                "{} API error ({}): {}",
                self.provider.as_str(),
                status,
                message
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl TextModel for Brain {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let (body, pointer) = match self.provider {
            Provider::Gemini => {
                let url = format!(
                    "{}/v1beta/models/{}:generateContent?key={}",
                    self.base_url, self.model, self.api_key
                );
                let request = self
                    .client
                    .post(url)
                    .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }));
                (self.post(request).await?, "/candidates/0/content/parts/0/text")
            }
            Provider::OpenAi => {
                let request = self
                    .client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .bearer_auth(&self.api_key)
                    .json(&json!({
                        "model": self.model,
                        "messages": [{ "role": "user", "content": prompt }],
                        "temperature": 0.2,
                    }));
                (self.post(request).await?, "/choices/0/message/content")
            }
        };

        let content = body
            .pointer(pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("No content in model response: {}", body))?;
        debug!(chars = content.len(), "model replied");
        Ok(content.to_string())
    }

    fn label(&self) -> String {
        format!("{}/{}", self.provider.as_str(), self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ai(provider: Provider, model: &str) -> AiConfig {
        AiConfig {
            provider,
            model: model.to_string(),
            gemini_api_key: Some("gemini-key".into()),
            openai_api_key: Some("openai-key".into()),
        }
    }

    #[tokio::test]
    async fn gemini_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "gemini-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "```json\n[]\n```" }] } }]
            })))
            .mount(&server)
            .await;

        let brain = Brain::new(&ai(Provider::Gemini, "gemini-1.5-flash"))
            .unwrap()
            .with_base_url(server.uri());
        assert_eq!(brain.complete("hi").await.unwrap(), "```json\n[]\n```");
        assert_eq!(brain.label(), "google/gemini-1.5-flash");
    }

    #[tokio::test]
    async fn openai_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer openai-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "ok" } }]
            })))
            .mount(&server)
            .await;

        let brain = Brain::new(&ai(Provider::OpenAi, "gpt-4o-mini"))
            .unwrap()
            .with_base_url(server.uri());
        assert_eq!(brain.complete("hi").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn api_errors_carry_the_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "quota exceeded" }
            })))
            .mount(&server)
            .await;

        let brain = Brain::new(&ai(Provider::OpenAi, "gpt-4o-mini"))
            .unwrap()
            .with_base_url(server.uri());
        let err = brain.complete("hi").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"), "{err}");
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut config = ai(Provider::Gemini, "gemini-1.5-flash");
        config.gemini_api_key = None;
        assert!(Brain::new(&config).is_err());
    }
}
