//! Feature extraction: one OCR table in, one candidate out.
//!
//! [`LlmFeatureExtractor`] sends the recognised text of a page to the
//! provider and parses the line-based answer
//!
//! ```text
//! Document Date: 2023-01-15 (0.9)
//! Document Type: rechnung (0.8)
//! Sender: Test GmbH (0.95)
//! Invoice Number: 12345 (0.7)
//! ```
//!
//! into four [`Feature`]s. All prompt wording lives in [`crate::prompts`].
//!
//! Calls are spaced by a `governor` limiter so that a batch of hundreds of
//! pages stays under the provider's per-minute quota.

use crate::config::ClassifyConfig;
use crate::error::CollaboratorError;
use crate::features::{ExtractionCandidate, Feature, FeatureKey};
use crate::pipeline::ocr::OcrTable;
use crate::prompts::{build_extraction_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Quality reported for every key when the answer cannot be used.
pub const FALLBACK_QUALITY: f64 = 0.1;

static RESPONSE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Document Date|Document Type|Sender|Invoice Number):\s*([^(]+)\s*\(([0-9.]+)\)")
        .unwrap()
});

/// Turns the OCR table of one page into an extraction candidate.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, table: &OcrTable) -> Result<ExtractionCandidate, CollaboratorError>;
}

/// The default extractor, backed by an `edgequake_llm` provider.
pub struct LlmFeatureExtractor {
    provider: Arc<dyn LLMProvider>,
    limiter: Option<DirectLimiter>,
    options: CompletionOptions,
    system_prompt: String,
}

impl LlmFeatureExtractor {
    /// An extractor issuing at most one call per `throttle`.
    /// A zero `throttle` disables spacing.
    pub fn new(provider: Arc<dyn LLMProvider>, throttle: Duration) -> Self {
        Self {
            provider,
            limiter: Quota::with_period(throttle).map(RateLimiter::direct),
            options: CompletionOptions {
                temperature: Some(0.0),
                max_tokens: Some(512),
                ..Default::default()
            },
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Extractor with throttle, sampling options and prompt taken from `config`.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &ClassifyConfig) -> Self {
        let mut extractor = Self::new(provider, Duration::from_millis(config.throttle_ms));
        extractor.options = build_options(config);
        if let Some(prompt) = &config.system_prompt {
            extractor.system_prompt = prompt.clone();
        }
        extractor
    }
}

#[async_trait]
impl FeatureExtractor for LlmFeatureExtractor {
    async fn extract(&self, table: &OcrTable) -> Result<ExtractionCandidate, CollaboratorError> {
        if table.is_empty() {
            return Ok(ExtractionCandidate::default());
        }

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(build_extraction_prompt(&table.text())),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| CollaboratorError::new("llm", e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(parse_response(&response.content))
    }
}

/// Parse the provider's answer.
///
/// Lines that do not match `Key: value (quality)` are skipped. Unless exactly
/// four lines parse, every key is reported with an empty value and
/// [`FALLBACK_QUALITY`].
pub fn parse_response(text: &str) -> ExtractionCandidate {
    let mut features = Vec::new();

    for line in text.trim().lines() {
        let Some(caps) = RESPONSE_LINE.captures(line) else {
            debug!("skipping line: {line}");
            continue;
        };
        let Some(key) = FeatureKey::from_label(&caps[1]) else {
            continue;
        };
        let Ok(quality) = caps[3].parse::<f64>() else {
            debug!("skipping line with unreadable quality: {line}");
            continue;
        };
        let value = caps[2].trim().replace([' ', '(', ')'], "-");
        features.push(Feature::new(key, value, quality));
    }

    if features.len() != FeatureKey::ALL.len() {
        warn!("received invalid response: {text}");
        return fallback_candidate();
    }
    ExtractionCandidate::new(features)
}

fn fallback_candidate() -> ExtractionCandidate {
    ExtractionCandidate::new(
        FeatureKey::ALL
            .into_iter()
            .map(|k| Feature::new(k, "", FALLBACK_QUALITY))
            .collect(),
    )
}

/// Build `CompletionOptions` from the classification config.
fn build_options(config: &ClassifyConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
