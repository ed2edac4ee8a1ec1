//! Text-generation collaborator abstraction.
//!
//! The pipeline talks to the language model only through [`TextGenerator`], so the
//! batch analyzer and orchestrator can be driven by any backend (see
//! [`crate::gemini`]) or by a scripted double in tests.

use serde::{Deserialize, Serialize};

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of the conversation, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            report_id: None,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            report_id: None,
        }
    }

    pub fn with_report(mut self, report_id: impl Into<String>) -> Self {
        self.report_id = Some(report_id.into());
        self
    }
}

/// Binary attachment (e.g. a brand reference image), base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    pub data: String,
}

/// Credentials forwarded to the model endpoint on every call.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("api_key", &"***").finish()
    }
}

/// Optional knobs for a single generation call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions<'a> {
    /// Ask the model to answer with JSON only.
    pub json_mode: bool,
    pub attachments: &'a [Attachment],
}

/// A language-model backend.
///
/// Hard failures (network, auth, rate limits) are errors. `Ok(None)` means the
/// model produced no usable answer.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        messages: &[ConversationMessage],
        system_prompt: &str,
        credentials: &Credentials,
        options: GenerateOptions<'_>,
    ) -> anyhow::Result<Option<String>>;
}
