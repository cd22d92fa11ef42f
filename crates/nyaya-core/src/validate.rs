//! Response validation and the per-type rewrite passes.

use std::time::Duration;

use tracing::{debug, warn};

use crate::llm::{generate, Generator};
use crate::prompts;

/// Validator output shorter than this (after trimming) is treated as a
/// failed re-prompt and the draft is kept.
pub const MIN_VALIDATED_LEN: usize = 50;

/// Ask the generator to correct `draft` against `query`. Returns the draft
/// unchanged on provider failure or a degenerate answer.
pub async fn validate_response(gen: &dyn Generator, query: &str, draft: &str, timeout: Duration) -> String {
    match generate(gen, &prompts::validation(query, draft), timeout).await {
        Ok(validated) if validated.trim().chars().count() >= MIN_VALIDATED_LEN => validated,
        Ok(validated) => {
            debug!(output_len = validated.len(), "validator output too short; keeping draft");
            draft.to_string()
        }
        Err(e) => {
            warn!("validation error: {e:#}");
            draft.to_string()
        }
    }
}

/// Shape-specific rewrite applied after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// 2-3 paragraph summary (static queries).
    Summary,
    /// Numbered list of at most 8 steps (how-to queries).
    NumberedGuide,
    /// At most 150 words (general queries).
    Concise,
}

fn truncated(text: &str, max_chars: usize) -> String {
    let mut s: String = text.chars().take(max_chars).collect();
    s.push_str("...");
    s
}

impl Rewrite {
    pub fn prompt(&self, text: &str) -> String {
        match self {
            Self::Summary => prompts::summary(text),
            Self::NumberedGuide => prompts::numbered_guide(text),
            Self::Concise => prompts::concise(text),
        }
    }

    /// What to serve when the rewrite call fails.
    pub fn fallback(&self, text: &str) -> String {
        match self {
            Self::Summary => truncated(text, 250),
            Self::NumberedGuide => text.to_string(),
            Self::Concise => truncated(text, 300),
        }
    }

    /// Rewrite `text`, falling back locally on provider failure or an empty
    /// answer. `None` means there was nothing to fall back on either.
    pub async fn apply(&self, gen: &dyn Generator, text: &str, timeout: Duration) -> Option<String> {
        let failure = match generate(gen, &self.prompt(text), timeout).await {
            Ok(out) if !out.trim().is_empty() => return Some(out),
            Ok(_) => "empty rewrite".to_string(),
            Err(e) => format!("{e:#}"),
        };
        warn!(rewrite = ?self, "rewrite failed: {failure}");
        if text.trim().is_empty() {
            None
        } else {
            Some(self.fallback(text))
        }
    }
}
