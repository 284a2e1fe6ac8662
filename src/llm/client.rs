// Chat-completions client for LLM providers
//
// Every configured provider speaks the OpenAI chat-completions wire format,
// so one request/response codec covers the whole fallback chain. The
// transport is a trait seam so the gateway can be exercised without a
// network in tests.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use super::LlmError;
use crate::config::ProviderConfig;

/// Per-call timeout for a single provider request
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling temperature for structured-output calls. Low but not zero; the
/// prompts ask for JSON and some creativity in the content fields.
const CHAT_TEMPERATURE: f32 = 0.4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

static RATE_LIMIT_REGEX: OnceLock<Regex> = OnceLock::new();

/// Whether an error body reads like a rate-limit rejection. Some providers
/// return 400/503 with a quota message instead of a clean 429.
pub fn is_rate_limit_message(body: &str) -> bool {
    let re = RATE_LIMIT_REGEX.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|quota exceeded|too many requests|overloaded")
            .expect("rate limit regex must compile")
    });
    re.is_match(body)
}

/// Seam between the gateway and the wire. The production implementation is
/// HttpChatTransport; tests substitute canned responses.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(
        &self,
        provider: &ProviderConfig,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError>;
}

pub struct HttpChatTransport {
    client: reqwest::Client,
}

impl HttpChatTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(CHAT_TIMEOUT)
            .build()
            .unwrap_or_default();
        HttpChatTransport { client }
    }
}

impl Default for HttpChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn complete(
        &self,
        provider: &ProviderConfig,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let api_key = provider.api_key().ok_or_else(|| LlmError::MissingKey {
            provider: provider.id.clone(),
            env: provider.api_key_env.clone(),
        })?;

        let url = format!("{}/chat/completions", provider.base_url);
        let request = ChatRequest {
            model: &provider.model,
            messages,
            temperature: CHAT_TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                provider: provider.id.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| LlmError::Transport {
            provider: provider.id.clone(),
            message: e.to_string(),
        })?;

        if status.as_u16() == 429 || (!status.is_success() && is_rate_limit_message(&body)) {
            return Err(LlmError::RateLimited {
                provider: provider.id.clone(),
            });
        }
        if !status.is_success() {
            return Err(LlmError::Transport {
                provider: provider.id.clone(),
                message: format!("HTTP {}: {}", status, truncate_body(&body)),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Transport {
                provider: provider.id.clone(),
                message: format!("unparseable completion response: {}", e),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: provider.id.clone(),
            });
        }
        Ok(content)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let msg = ChatMessage::user("classify this");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, "classify this");

        let msg = ChatMessage::assistant("{}");
        assert_eq!(msg.role, "assistant");
    }

    #[test]
    fn test_chat_request_serialization() {
        let messages = vec![ChatMessage::user("hello")];
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.4,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"gpt-4o-mini\""));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_chat_response_deserialization() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"ok\":true}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"ok\":true}")
        );
    }

    #[test]
    fn test_chat_response_missing_choices() {
        let parsed: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn test_rate_limit_message_detection() {
        assert!(is_rate_limit_message("Error: rate limit exceeded"));
        assert!(is_rate_limit_message("RATE-LIMITED, retry later"));
        assert!(is_rate_limit_message("Your quota exceeded for this month"));
        assert!(is_rate_limit_message("too many requests"));
        assert!(is_rate_limit_message("model is overloaded"));
        assert!(!is_rate_limit_message("invalid request body"));
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");
        let long = "x".repeat(500);
        let cut = truncate_body(&long);
        assert!(cut.chars().count() < 500);
        assert!(cut.ends_with('…'));
    }
}
