//! Per-question chat pipeline.
//!
//! One call to [`Orchestrator::handle`] turns a user question plus the loaded datasets
//! into the new conversation messages: the narrative goes to the model either in a
//! single request or through sequential batch analysis, and an answer that looks like
//! an infographic is validated, repaired if needed and delivered to the [`ReportSink`].

use crate::batch::{analyze_batches, synthesize};
use crate::config::AnalystProfile;
use crate::dataset::Dataset;
use crate::error::PipelineError;
use crate::generator::{Attachment, ConversationMessage, Credentials, GenerateOptions, TextGenerator};
use crate::narrative::{build_narrative, split_narrative, CHUNK_LIMIT};
use crate::report::{self, IdentifiedReport, ReportDocument};
use crate::sink::ReportSink;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Number of prior messages sent along with a single-shot request.
const HISTORY_WINDOW: usize = 5;

const NO_CREDENTIALS_REPLY: &str = "Configure your API key in settings.";
const REPORT_READY_REPLY: &str = "Report generated!";

/// Everything needed to answer one question.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub question: String,
    pub datasets: Vec<Dataset>,
    /// Conversation so far, excluding `question`.
    pub history: Vec<ConversationMessage>,
    /// Reference images. Only sent on the single-shot path.
    pub attachments: Vec<Attachment>,
    pub credentials: Option<Credentials>,
}

/// Messages produced for one question, in order, starting with the user's own message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub messages: Vec<ConversationMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IdentifiedReport>,
}

/// How a model answer should be presented.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Report(ReportDocument),
    Text(String),
}

pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    sink: Arc<dyn ReportSink>,
    profile: AnalystProfile,
    chunk_limit: usize,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        sink: Arc<dyn ReportSink>,
        profile: AnalystProfile,
    ) -> Self {
        Self {
            generator,
            sink,
            profile,
            chunk_limit: CHUNK_LIMIT,
        }
    }

    /// Override the narrative chunk size.
    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit;
        self
    }

    /// Answer `request`. Failures never escape: they become an `Error: ...` model message.
    ///
    /// `on_progress(current, total)` is called once per analyzed chunk when the
    /// narrative is too large for a single request.
    pub async fn handle<F>(&self, request: ChatRequest, on_progress: F) -> ChatOutcome
    where
        F: FnMut(usize, usize) + Send,
    {
        let mut outcome = ChatOutcome {
            messages: vec![ConversationMessage::user(request.question.clone())],
            report: None,
        };

        let is_report = self.profile.is_report_request(&request.question);
        let final_prompt = if is_report {
            &self.profile.prompts.architect
        } else {
            &self.profile.prompts.analyst
        };

        let Some(credentials) = request.credentials.as_ref() else {
            warn!("No API key configured, skipping model call");
            outcome
                .messages
                .push(ConversationMessage::model(NO_CREDENTIALS_REPLY));
            return outcome;
        };

        let narrative = build_narrative(&request.datasets);
        let chunks = split_narrative(&narrative, self.chunk_limit);

        info!(
            "Handling question (report={}, datasets={}, narrative={} chars, chunks={})",
            is_report,
            request.datasets.len(),
            narrative.chars().count(),
            chunks.len()
        );

        let answer = if chunks.len() > 1 {
            outcome.messages.push(ConversationMessage::model(format!(
                "Large dataset detected ({} characters). Processing in {} sequential blocks...",
                narrative.chars().count(),
                chunks.len()
            )));
            self.answer_in_batches(&chunks, &request.question, final_prompt, credentials, on_progress)
                .await
        } else {
            self.answer_single_shot(&request, &chunks[0], final_prompt, is_report, credentials)
                .await
        };

        match answer {
            Ok(Some(text)) if !text.trim().is_empty() => self.deliver(text, &mut outcome).await,
            Ok(_) => debug!("Model returned no answer, nothing appended"),
            Err(e) => {
                error!("Chat pipeline failed: {}", e);
                outcome
                    .messages
                    .push(ConversationMessage::model(format!("Error: {}", e)));
            }
        }

        outcome
    }

    async fn answer_in_batches<F>(
        &self,
        chunks: &[String],
        question: &str,
        final_prompt: &str,
        credentials: &Credentials,
        on_progress: F,
    ) -> Result<Option<String>, PipelineError>
    where
        F: FnMut(usize, usize) + Send,
    {
        let accumulated = analyze_batches(
            self.generator.as_ref(),
            chunks,
            &self.profile.prompts.chunk_analysis,
            credentials,
            on_progress,
        )
        .await?;

        synthesize(
            self.generator.as_ref(),
            &accumulated,
            question,
            final_prompt,
            credentials,
        )
        .await
    }

    async fn answer_single_shot(
        &self,
        request: &ChatRequest,
        chunk: &str,
        final_prompt: &str,
        is_report: bool,
        credentials: &Credentials,
    ) -> Result<Option<String>, PipelineError> {
        let window_start = request.history.len().saturating_sub(HISTORY_WINDOW);
        let mut messages = request.history[window_start..].to_vec();
        messages.push(ConversationMessage::user(format!(
            "DATA CONTEXT:\n{}\n\nUSER QUESTION: {}",
            chunk, request.question
        )));

        let system_prompt = if request.attachments.is_empty() {
            final_prompt.to_string()
        } else {
            format!(
                "{}\n\nBRANDING:\n{} reference image(s) are attached. Extract the primary and \
                 secondary corporate colors and the visual style, and apply them to your answer.",
                final_prompt,
                request.attachments.len()
            )
        };

        self.generator
            .generate(
                &messages,
                &system_prompt,
                credentials,
                GenerateOptions {
                    json_mode: is_report,
                    attachments: &request.attachments,
                },
            )
            .await
            .map_err(PipelineError::SingleShot)
    }

    async fn deliver(&self, answer: String, outcome: &mut ChatOutcome) {
        let document = match interpret_response(&answer) {
            Interpretation::Text(text) => {
                outcome.messages.push(ConversationMessage::model(text));
                return;
            }
            Interpretation::Report(document) => document,
        };

        let report = IdentifiedReport::new(document);
        if let Err(e) = self.sink.deliver(&report).await {
            error!("Failed to deliver report {}: {:#}", report.id, e);
            outcome
                .messages
                .push(ConversationMessage::model(format!("Error: {:#}", e)));
            return;
        }

        outcome
            .messages
            .push(ConversationMessage::model(REPORT_READY_REPLY).with_report(report.id.clone()));
        outcome.report = Some(report);
    }
}

/// Decide whether `answer` is an infographic report or plain text.
///
/// Code fences are stripped before the check. Anything that does not start with `{`,
/// mention `infographic`, parse as JSON and carry an `infographic` key is returned
/// unchanged as text.
pub fn interpret_response(answer: &str) -> Interpretation {
    let cleaned = answer.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    if !cleaned.starts_with('{') || !cleaned.contains("infographic") {
        return Interpretation::Text(answer.to_string());
    }

    let candidate: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => {
            debug!("Answer looked like a report but is not JSON: {}", e);
            return Interpretation::Text(answer.to_string());
        }
    };

    if matches!(candidate.get("infographic"), None | Some(Value::Null)) {
        return Interpretation::Text(answer.to_string());
    }

    let validation = report::validate(&candidate);
    for warning in &validation.warnings {
        debug!("Report warning: {}", warning);
    }

    if validation.is_valid {
        return Interpretation::Report(ReportDocument::from(candidate));
    }

    warn!(
        "Report failed validation with {} error(s), repairing",
        validation.errors.len()
    );
    Interpretation::Report(report::repair(candidate))
}
