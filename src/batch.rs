//! Sequential batch analysis of narrative chunks and final answer synthesis.
//!
//! Chunks are analyzed strictly one after another: each request is awaited before
//! the next is issued, and results are folded into the accumulation in chunk order.
//! Any failure aborts the batch and the partial accumulation is dropped.

use crate::error::PipelineError;
use crate::generator::{ConversationMessage, Credentials, GenerateOptions, TextGenerator};
use tracing::{debug, info};

/// Section text used when the model returns nothing for a chunk.
const NO_FINDINGS: &str = "(no findings returned for this chunk)";

/// Analyze every chunk in order and return the combined analysis.
///
/// `on_progress(current, total)` fires once per chunk after its request resolves,
/// with a 1-based `current`.
pub async fn analyze_batches<F>(
    generator: &dyn TextGenerator,
    chunks: &[String],
    system_prompt: &str,
    credentials: &Credentials,
    mut on_progress: F,
) -> Result<String, PipelineError>
where
    F: FnMut(usize, usize) + Send,
{
    if chunks.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }

    let total = chunks.len();
    info!("Starting batch analysis: {} chunks", total);

    let mut accumulated = String::new();

    for (idx, chunk) in chunks.iter().enumerate() {
        let index = idx + 1;
        let prompt = chunk_prompt(chunk, index, total);

        debug!(
            "Analyzing chunk {}/{} ({} chars)",
            index,
            total,
            chunk.chars().count()
        );

        let analysis = generator
            .generate(
                &[ConversationMessage::user(prompt)],
                system_prompt,
                credentials,
                GenerateOptions::default(),
            )
            .await
            .map_err(|source| PipelineError::ChunkAnalysis {
                index,
                total,
                source,
            })?;

        let analysis = analysis
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| NO_FINDINGS.to_string());

        accumulated.push_str(&format!(
            "--- ANALYSIS OF CHUNK {}/{} ---\n{}\n\n",
            index, total, analysis
        ));

        on_progress(index, total);
    }

    info!(
        "Batch analysis complete: {} chunks, {} chars accumulated",
        total,
        accumulated.chars().count()
    );

    Ok(accumulated)
}

fn chunk_prompt(chunk: &str, index: usize, total: usize) -> String {
    format!(
        "You are reading block {index} of {total} of a larger dataset. \
         Extract every relevant fact, figure, total and pattern from this block with exact values. \
         Do not speculate about blocks you have not seen.\n\n\
         --- DATA BLOCK {index}/{total} START ---\n{chunk}\n--- DATA BLOCK {index}/{total} END ---"
    )
}

/// Ask the model for one comprehensive answer to `question` given the accumulated analysis.
pub async fn synthesize(
    generator: &dyn TextGenerator,
    accumulated_analysis: &str,
    question: &str,
    system_prompt: &str,
    credentials: &Credentials,
) -> Result<Option<String>, PipelineError> {
    let prompt = format!(
        "Here is the accumulated analysis of all file chunks:\n{}\n\nUSER QUESTION: {}\n\n\
         Provide a final comprehensive answer.",
        accumulated_analysis, question
    );

    debug!("Requesting final synthesis ({} chars)", prompt.chars().count());

    generator
        .generate(
            &[ConversationMessage::user(prompt)],
            system_prompt,
            credentials,
            GenerateOptions::default(),
        )
        .await
        .map_err(PipelineError::Synthesis)
}
