//! Gemini REST client for text generation.

use crate::generator::{
    Attachment, ConversationMessage, Credentials, GenerateOptions, Role, TextGenerator,
};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Point the client at a different endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn send_request(&self, request: &GenerateContentRequest, api_key: &str) -> Result<Option<String>> {
        debug!(
            "Sending request to Gemini: model={}, turns={}",
            self.model,
            request.contents.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to send request to Gemini")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, error_text);
        }

        let response: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        if let Some(usage) = &response.usage_metadata {
            info!(
                "Gemini response: {} tokens (prompt: {}, completion: {})",
                usage.total_token_count, usage.prompt_token_count, usage.candidates_token_count
            );
        }

        Ok(extract_text(response))
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        messages: &[ConversationMessage],
        system_prompt: &str,
        credentials: &Credentials,
        options: GenerateOptions<'_>,
    ) -> Result<Option<String>> {
        let request = build_request(messages, system_prompt, options);
        self.send_request(&request, &credentials.api_key).await
    }
}

/// Map conversation turns onto Gemini contents. Attachments ride on the last user turn.
fn build_request(
    messages: &[ConversationMessage],
    system_prompt: &str,
    options: GenerateOptions<'_>,
) -> GenerateContentRequest {
    let last_user = messages.iter().rposition(|m| m.role == Role::User);

    let contents = messages
        .iter()
        .enumerate()
        .map(|(idx, message)| {
            let mut parts = vec![Part::Text {
                text: message.text.clone(),
            }];
            if Some(idx) == last_user {
                parts.extend(options.attachments.iter().map(inline_part));
            }
            Content {
                role: match message.role {
                    Role::User => "user",
                    Role::Model => "model",
                },
                parts,
            }
        })
        .collect();

    GenerateContentRequest {
        contents,
        system_instruction: (!system_prompt.is_empty()).then(|| SystemInstruction {
            parts: vec![Part::Text {
                text: system_prompt.to_string(),
            }],
        }),
        generation_config: options.json_mode.then(|| GenerationConfig {
            response_mime_type: "application/json".to_string(),
        }),
    }
}

fn inline_part(attachment: &Attachment) -> Part {
    Part::InlineData {
        inline_data: InlineData {
            mime_type: attachment.mime_type.clone(),
            data: attachment.data.clone(),
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let candidate = response.candidates.into_iter().next()?;
    let text: String = candidate
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    (!text.is_empty()).then_some(text)
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let attachments = vec![Attachment {
            mime_type: "image/png".to_string(),
            data: "aGVsbG8=".to_string(),
        }];
        let messages = vec![
            ConversationMessage::user("earlier"),
            ConversationMessage::model("reply"),
            ConversationMessage::user("now"),
        ];
        let request = build_request(
            &messages,
            "be precise",
            GenerateOptions {
                json_mode: true,
                attachments: &attachments,
            },
        );

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], json!("be precise"));
        assert_eq!(value["generationConfig"]["responseMimeType"], json!("application/json"));
        assert_eq!(value["contents"][1]["role"], json!("model"));
        assert_eq!(value["contents"][0]["parts"].as_array().unwrap().len(), 1);
        assert_eq!(
            value["contents"][2]["parts"][1],
            json!({"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}})
        );
    }

    #[test]
    fn test_plain_request_omits_optional_sections() {
        let request = build_request(&[ConversationMessage::user("hi")], "", GenerateOptions::default());
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("systemInstruction").is_none());
        assert!(value.get("generationConfig").is_none());
    }

    #[tokio::test]
    async fn test_failed_request_does_not_leak_api_key() {
        let client = GeminiClient::new("m").with_base_url("http://127.0.0.1:1");
        let err = client
            .generate(
                &[ConversationMessage::user("hi")],
                "",
                &Credentials::new("SECRET-KEY-123"),
                GenerateOptions::default(),
            )
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Failed to send request to Gemini"));
        assert!(!message.contains("SECRET-KEY-123"));
    }

    #[test]
    fn test_extract_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "Hola "}, {"text": "mundo"}]}}],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        }))
        .unwrap();
        assert_eq!(extract_text(response).as_deref(), Some("Hola mundo"));

        let empty: GenerateContentResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert_eq!(extract_text(empty), None);
    }
}
