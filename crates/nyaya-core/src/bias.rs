//! Bias scoring and hallucination mitigation.
//!
//! Both passes ask a generator for a JSON report. Model output is rarely
//! clean JSON, so the first `{ ... }` span is parsed leniently (common key
//! variants accepted). Anything still unparseable becomes an explicit error
//! report that keeps the raw text; provider failures become an error report
//! with a neutral score. Neither pass ever returns `Err`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::llm::{generate, Generator};
use crate::prompts;
use crate::types::{BiasFinding, BiasReport, FlaggedStatement, HallucinationReport};

/// Neutral midpoint reported whenever a score cannot be derived.
pub const NEUTRAL_BIAS_SCORE: u8 = 5;

pub const PARSE_FAILURE: &str = "parse failure";
pub const PROVIDER_FAILURE: &str = "provider failure";
pub const CORRECTION_FAILURE: &str = "correction failure";

/// Slice from the first `{` to the last `}`. Skips prose and code fences.
fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn clamp_score(v: f64) -> u8 {
    v.round().clamp(1.0, 10.0) as u8
}

#[derive(Deserialize)]
struct RawFinding {
    #[serde(default, alias = "type", alias = "bias_type", alias = "dimension")]
    category: String,
    #[serde(default, alias = "bias_score")]
    score: Option<f64>,
    #[serde(default, alias = "description")]
    explanation: String,
    #[serde(default, alias = "recommendation", alias = "suggestion", alias = "rewrite")]
    rewrite_suggestion: String,
}

#[derive(Deserialize)]
struct RawBiasReport {
    #[serde(default)]
    overall_score: Option<f64>,
    #[serde(default, alias = "findings", alias = "biases_identified")]
    biases: Option<Vec<RawFinding>>,
}

/// Parse a bias report out of model output. `None` if no JSON object with
/// the expected shape is present: an object carrying neither a score nor a
/// findings list is not a report.
pub fn parse_bias_report(raw: &str) -> Option<BiasReport> {
    let parsed: RawBiasReport = serde_json::from_str(json_object_span(raw)?).ok()?;
    if parsed.overall_score.is_none() && parsed.biases.is_none() {
        return None;
    }
    let biases: Vec<BiasFinding> = parsed
        .biases
        .unwrap_or_default()
        .into_iter()
        .map(|f| BiasFinding {
            category: f.category,
            score: f.score.map(clamp_score).unwrap_or(NEUTRAL_BIAS_SCORE),
            explanation: f.explanation,
            rewrite_suggestion: f.rewrite_suggestion,
        })
        .collect();
    let overall_score = match parsed.overall_score {
        Some(v) => clamp_score(v),
        None => biases.iter().map(|b| b.score).max().unwrap_or(1),
    };
    Some(BiasReport {
        overall_score,
        biases,
        error: None,
        error_details: None,
        raw_result: None,
    })
}

#[derive(Deserialize)]
struct RawFlag {
    #[serde(default, alias = "problematic_statement", alias = "text")]
    statement: String,
    #[serde(default, alias = "explanation")]
    reason: String,
    #[serde(default, alias = "suggestion", alias = "suggested_correction")]
    correction: String,
}

#[derive(Deserialize)]
struct RawHallucinationReport {
    #[serde(default)]
    hallucinations_detected: Option<bool>,
    #[serde(default, alias = "potential_hallucinations", alias = "issues")]
    hallucinations: Option<Vec<RawFlag>>,
}

/// Parse the detection half of a hallucination report. A missing flag is
/// inferred from whether any statements were listed; an object with
/// neither is not a report.
pub fn parse_hallucination_report(raw: &str) -> Option<(bool, Vec<FlaggedStatement>)> {
    let parsed: RawHallucinationReport = serde_json::from_str(json_object_span(raw)?).ok()?;
    if parsed.hallucinations_detected.is_none() && parsed.hallucinations.is_none() {
        return None;
    }
    let flagged: Vec<FlaggedStatement> = parsed
        .hallucinations
        .unwrap_or_default()
        .into_iter()
        .map(|f| FlaggedStatement {
            statement: f.statement,
            reason: f.reason,
            correction: f.correction,
        })
        .collect();
    let detected = parsed.hallucinations_detected.unwrap_or(!flagged.is_empty());
    Some((detected, flagged))
}

pub struct BiasDetector {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl BiasDetector {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn detect_bias(&self, text: &str) -> BiasReport {
        let raw = match generate(self.generator.as_ref(), &prompts::bias(text), self.timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("bias detection failed: {e:#}");
                return BiasReport {
                    overall_score: NEUTRAL_BIAS_SCORE,
                    biases: Vec::new(),
                    error: Some(PROVIDER_FAILURE.into()),
                    error_details: Some(e.to_string()),
                    raw_result: None,
                };
            }
        };
        match parse_bias_report(&raw) {
            Some(report) => {
                info!(overall_score = report.overall_score, flagged = report.biases.len(), "bias analysis complete");
                report
            }
            None => {
                warn!(output_len = raw.len(), "bias analysis was not parseable");
                BiasReport {
                    overall_score: NEUTRAL_BIAS_SCORE,
                    biases: Vec::new(),
                    error: Some(PARSE_FAILURE.into()),
                    error_details: None,
                    raw_result: Some(raw),
                }
            }
        }
    }

    /// Check `text` against `sources`; rewrite it when unsupported claims
    /// are found.
    pub async fn mitigate_hallucinations(&self, text: &str, sources: &[String]) -> HallucinationReport {
        let mut report = HallucinationReport {
            hallucinations_detected: false,
            hallucinations: Vec::new(),
            original_text: text.to_string(),
            corrected_text: None,
            error: None,
            error_details: None,
            raw_result: None,
        };

        let prompt = prompts::hallucination(text, sources);
        let raw = match generate(self.generator.as_ref(), &prompt, self.timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("hallucination check failed: {e:#}");
                report.error = Some(PROVIDER_FAILURE.into());
                report.error_details = Some(e.to_string());
                return report;
            }
        };

        let Some((detected, flagged)) = parse_hallucination_report(&raw) else {
            warn!(output_len = raw.len(), "hallucination analysis was not parseable");
            report.error = Some(PARSE_FAILURE.into());
            report.raw_result = Some(raw);
            return report;
        };
        report.hallucinations_detected = detected;
        report.hallucinations = flagged;
        if !detected {
            return report;
        }

        let flagged_json = serde_json::to_string(&report.hallucinations).unwrap_or_else(|_| "[]".into());
        match generate(self.generator.as_ref(), &prompts::correction(text, &flagged_json), self.timeout).await {
            Ok(corrected) if !corrected.trim().is_empty() => {
                info!(flagged = report.hallucinations.len(), "advice corrected for hallucinations");
                report.corrected_text = Some(corrected.trim().to_string());
            }
            Ok(_) => {
                warn!("hallucination correction returned nothing");
                report.error = Some(CORRECTION_FAILURE.into());
            }
            Err(e) => {
                warn!("hallucination correction failed: {e:#}");
                report.error = Some(CORRECTION_FAILURE.into());
                report.error_details = Some(e.to_string());
            }
        }
        report
    }
}
