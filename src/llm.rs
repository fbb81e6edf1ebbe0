use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// System and user message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// The service answered with a non-success HTTP status.
    #[error("{0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),

    #[error("invalid response format: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SynthesisError::Status(status.as_u16()),
            None => SynthesisError::Transport(err.to_string()),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw completion text, which may be empty.
    async fn generate(&self, prompt: &Prompt) -> Result<String, SynthesisError>;
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SynthesisError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String, SynthesisError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
        };

        tracing::debug!(
            model = %self.model,
            prompt_length = prompt.user.len(),
            "Calling text generation service"
        );

        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let json: serde_json::Value = res.json().await?;
        completion_text(&json)
    }
}

fn completion_text(json: &serde_json::Value) -> Result<String, SynthesisError> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| SynthesisError::Malformed("no choices in response".to_string()))?;

    // A null content (e.g. a refusal) counts as an empty completion.
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_text() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}]});
        assert_eq!(completion_text(&json).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_null_content_is_empty() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": null}}]});
        assert_eq!(completion_text(&json).unwrap(), "");
    }

    #[test]
    fn test_missing_choices_is_malformed() {
        let json = json!({"error": {"message": "overloaded"}});
        assert!(matches!(completion_text(&json), Err(SynthesisError::Malformed(_))));
    }

    #[test]
    fn test_status_display_is_bare_code() {
        assert_eq!(SynthesisError::Status(429).to_string(), "429");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = ChatCompletionsClient::new(
            "key",
            "https://api.openai.com/v1/",
            "gpt-4o-mini",
            0.7,
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![
                Message { role: "system", content: "sys" },
                Message { role: "user", content: "usr" },
            ],
            temperature: 0.5,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "usr");
        assert_eq!(value["temperature"], 0.5);
    }
}
