//! Chat-completions client for OpenAI-compatible endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AiCollaborator, AiError, AiPrompt};
use crate::util::{compact_text, normalize_base_url, normalize_text_option};

pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_MODEL: &str = "gpt-3.5-turbo";
const AI_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct OpenAiCollaborator {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCollaborator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OpenAiCollaborator")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCollaborator {
    pub fn new(base_url: Option<&str>, api_key: &str, model: Option<&str>) -> Result<Self, AiError> {
        let api_key = normalize_text_option(Some(api_key.to_string())).ok_or(AiError::Disabled)?;
        let base_url = match base_url {
            Some(raw) => normalize_base_url(raw).ok_or_else(|| {
                AiError::Request(format!("AI URL '{raw}' must include http:// or https://"))
            })?,
            None => DEFAULT_AI_BASE_URL.to_string(),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(AI_HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| AiError::Request(error.to_string()))?;

        Ok(Self {
            endpoint: format!("{base_url}/chat/completions"),
            api_key,
            model: model.unwrap_or(DEFAULT_AI_MODEL).to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

fn extract_reply(response: ChatResponse) -> Result<String, AiError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .and_then(|content| normalize_text_option(Some(content)))
        .ok_or_else(|| AiError::InvalidResponse("response contained no message".to_string()))
}

fn parse_api_error(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|payload| payload.error)
        .and_then(|detail| detail.message)
        .map_or_else(|| compact_text(body), |message| compact_text(&message))
}

#[async_trait]
impl AiCollaborator for OpenAiCollaborator {
    async fn request(&self, prompt: &AiPrompt) -> Result<String, AiError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| AiError::Request(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status,
                message: parse_api_error(&body),
            });
        }

        let payload = response
            .json::<ChatResponse>()
            .await
            .map_err(|error| AiError::InvalidResponse(error.to_string()))?;
        extract_reply(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_api_key_disables_collaborator() {
        assert_eq!(
            OpenAiCollaborator::new(None, "  ", None).unwrap_err(),
            AiError::Disabled
        );
    }

    #[test]
    fn endpoint_defaults_to_openai() {
        let ai = OpenAiCollaborator::new(None, "sk-test", None).unwrap();
        assert_eq!(ai.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert!(!format!("{ai:?}").contains("sk-test"));
    }

    #[test]
    fn extract_reply_trims_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  Be gentle today. "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(response).unwrap(), "Be gentle today.");
    }

    #[test]
    fn extract_reply_rejects_empty_choices() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            extract_reply(response),
            Err(AiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn api_error_message_is_extracted() {
        assert_eq!(
            parse_api_error(r#"{"error": {"message": "Invalid API key"}}"#),
            "Invalid API key"
        );
        assert_eq!(parse_api_error("gateway down"), "gateway down");
    }
}
