//! Model interaction: send the rider pages and collect the raw answer.
//!
//! One request per document: the system prompt, then a single user turn
//! carrying every rendered page. The patch list frequently continues across a
//! page break, so pages are never split across requests.
//!
//! ## Retry Strategy
//!
//! Failed or timed-out attempts are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`). Retrying lives here, around the
//! network call; the normalizer never retries.

use crate::config::ExtractionConfig;
use crate::error::IngestError;
use crate::output::RawExtraction;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Ask the model for the patch list of one document.
pub async fn request_extraction(
    provider: &Arc<dyn LLMProvider>,
    images: Vec<ImageData>,
    manifest: &str,
    config: &ExtractionConfig,
) -> Result<RawExtraction, IngestError> {
    let start = Instant::now();
    let messages = build_messages(images, manifest, config);
    let options = build_options(config);
    let per_call = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<String> = None;
    let mut timed_out_every_attempt = true;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Extraction: retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(per_call, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                debug!(
                    "Extraction: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens, response.completion_tokens, duration
                );
                return Ok(RawExtraction {
                    text: response.content,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                timed_out_every_attempt = false;
                let err_msg = e.to_string();
                warn!("Extraction: attempt {} failed: {}", attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
            Err(_) => {
                warn!(
                    "Extraction: attempt {} timed out after {}s",
                    attempt + 1,
                    config.api_timeout_secs
                );
            }
        }
    }

    if timed_out_every_attempt {
        return Err(IngestError::ApiTimeout {
            secs: config.api_timeout_secs,
            retries: config.max_retries,
        });
    }

    Err(IngestError::LlmFailed {
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// System prompt, then one user turn with the manifest and every page image.
fn build_messages(
    images: Vec<ImageData>,
    manifest: &str,
    config: &ExtractionConfig,
) -> Vec<ChatMessage> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACTION_PROMPT);

    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(manifest, images),
    ]
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Delay before retry number `attempt` (1-based). Saturates instead of
/// overflowing for large retry counts.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn build_messages_is_system_then_user() {
        let config = ExtractionConfig::builder()
            .system_prompt("just the JSON please")
            .build()
            .unwrap();
        let messages = build_messages(Vec::new(), "1 page", &config);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn backoff_doubles_per_retry() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
    }

    #[test]
    fn backoff_saturates_for_large_retry_counts() {
        assert_eq!(backoff_ms(500, 64), u64::MAX);
        assert_eq!(backoff_ms(500, 200), u64::MAX);
        assert_eq!(backoff_ms(0, 200), 0);
    }
}
