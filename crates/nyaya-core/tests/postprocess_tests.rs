mod common;

use std::time::Duration;

use common::{failing, FnGenerator, LONG_ANSWER};
use nyaya_core::bias::{BiasDetector, NEUTRAL_BIAS_SCORE, PARSE_FAILURE, PROVIDER_FAILURE};
use nyaya_core::validate::{validate_response, Rewrite};

const TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Validator
// =============================================================================

#[tokio::test]
async fn test_short_validation_keeps_draft() {
    let gen = FnGenerator::new(|_: &str| Ok("Looks fine.".into()));
    let out = validate_response(gen.as_ref(), "What is tort?", "Draft answer", TIMEOUT).await;
    assert_eq!(out, "Draft answer");
}

#[tokio::test]
async fn test_long_validation_replaces_draft() {
    let gen = FnGenerator::new(|_: &str| Ok(LONG_ANSWER.into()));
    let out = validate_response(gen.as_ref(), "What is a contract breach?", "Draft", TIMEOUT).await;
    assert_eq!(out, LONG_ANSWER);
}

#[tokio::test]
async fn test_validation_failure_keeps_draft() {
    let gen = failing();
    let out = validate_response(gen.as_ref(), "q", "Draft answer", TIMEOUT).await;
    assert_eq!(out, "Draft answer");
}

#[tokio::test]
async fn test_rewrite_failure_uses_local_fallback() {
    let gen = failing();
    let draft = "d".repeat(400);
    let out = Rewrite::Summary.apply(gen.as_ref(), &draft, TIMEOUT).await.unwrap();
    assert_eq!(out, format!("{}...", "d".repeat(250)));
    assert!(Rewrite::Concise.apply(gen.as_ref(), "", TIMEOUT).await.is_none());
}

#[tokio::test]
async fn test_rewrite_prompt_matches_shape() {
    let gen = FnGenerator::new(|prompt: &str| {
        assert!(prompt.contains("max 8 steps"));
        Ok("1. File\n2. Serve".into())
    });
    let out = Rewrite::NumberedGuide.apply(gen.as_ref(), "how-to text", TIMEOUT).await;
    assert_eq!(out.as_deref(), Some("1. File\n2. Serve"));
}

// =============================================================================
// Bias detector
// =============================================================================

#[tokio::test]
async fn test_unparseable_bias_output_is_neutral() {
    let gen = FnGenerator::new(|_: &str| Ok("The text seems balanced overall.".into()));
    let detector = BiasDetector::new(gen, TIMEOUT);
    let report = detector.detect_bias("Some advice").await;
    assert_eq!(report.overall_score, NEUTRAL_BIAS_SCORE);
    assert!(report.biases.is_empty());
    assert_eq!(report.error.as_deref(), Some(PARSE_FAILURE));
    assert_eq!(report.raw_result.as_deref(), Some("The text seems balanced overall."));
}

#[tokio::test]
async fn test_bias_json_of_another_shape_is_neutral() {
    const REPLY: &str = r#"{"analysis": "Strong gender bias in the eviction advice", "severity": "high"}"#;
    let gen = FnGenerator::new(|_: &str| Ok(REPLY.into()));
    let report = BiasDetector::new(gen, TIMEOUT).detect_bias("He must leave the flat.").await;
    assert_eq!(report.overall_score, NEUTRAL_BIAS_SCORE);
    assert!(report.biases.is_empty());
    assert_eq!(report.error.as_deref(), Some(PARSE_FAILURE));
    assert_eq!(report.raw_result.as_deref(), Some(REPLY));
}

#[tokio::test]
async fn test_bias_provider_failure_is_neutral() {
    let detector = BiasDetector::new(failing(), TIMEOUT);
    let report = detector.detect_bias("Some advice").await;
    assert_eq!(report.overall_score, 5);
    assert!(report.biases.is_empty());
    assert_eq!(report.error.as_deref(), Some(PROVIDER_FAILURE));
}

#[tokio::test]
async fn test_bias_report_parsed() {
    let gen = FnGenerator::new(|prompt: &str| {
        assert!(prompt.contains("Language accessibility issues"));
        Ok(r#"{"overall_score": 6, "biases": [{"category": "demographic", "score": 6,
              "explanation": "assumes a male tenant", "rewrite_suggestion": "use neutral pronouns"}]}"#
            .into())
    });
    let report = BiasDetector::new(gen, TIMEOUT).detect_bias("He should pay rent.").await;
    assert_eq!(report.overall_score, 6);
    assert_eq!(report.biases.len(), 1);
    assert_eq!(report.biases[0].category, "demographic");
    assert!(report.error.is_none());
}

// =============================================================================
// Hallucination mitigator
// =============================================================================

#[tokio::test]
async fn test_detected_hallucinations_are_corrected() {
    let gen = FnGenerator::new(|prompt: &str| {
        if prompt.starts_with("Review the following legal advice") {
            Ok(r#"{"hallucinations_detected": true, "hallucinations": [
                {"statement": "Section 999 applies", "reason": "no such section", "correction": "remove it"}]}"#
                .into())
        } else {
            assert!(prompt.contains("Section 999 applies"));
            Ok("Corrected advice. This is general information only.".into())
        }
    });
    let report = BiasDetector::new(gen, TIMEOUT)
        .mitigate_hallucinations("Section 999 applies.", &["Section 12 applies.".into()])
        .await;
    assert!(report.hallucinations_detected);
    assert_eq!(report.hallucinations.len(), 1);
    assert_eq!(report.original_text, "Section 999 applies.");
    assert_eq!(report.effective_text(), "Corrected advice. This is general information only.");
}

#[tokio::test]
async fn test_clean_advice_is_not_rewritten() {
    let gen = FnGenerator::new(|_: &str| Ok(r#"{"hallucinations_detected": false, "hallucinations": []}"#.into()));
    let report = BiasDetector::new(gen.clone(), TIMEOUT)
        .mitigate_hallucinations("Grounded advice.", &[])
        .await;
    assert!(!report.hallucinations_detected);
    assert!(report.corrected_text.is_none());
    assert_eq!(report.effective_text(), "Grounded advice.");
    assert_eq!(gen.calls(), 1);
}

#[tokio::test]
async fn test_unparseable_hallucination_report_keeps_raw() {
    let gen = FnGenerator::new(|_: &str| Ok("Everything checks out.".into()));
    let report = BiasDetector::new(gen, TIMEOUT)
        .mitigate_hallucinations("Advice.", &["Source.".into()])
        .await;
    assert!(!report.hallucinations_detected);
    assert_eq!(report.error.as_deref(), Some(PARSE_FAILURE));
    assert_eq!(report.raw_result.as_deref(), Some("Everything checks out."));
}

#[tokio::test]
async fn test_hallucination_json_of_another_shape_keeps_raw() {
    const REPLY: &str = r#"{"analysis": [{"claim": "Bail is automatic", "issue": "not in sources"}]}"#;
    let gen = FnGenerator::new(|_: &str| Ok(REPLY.into()));
    let report = BiasDetector::new(gen.clone(), TIMEOUT)
        .mitigate_hallucinations("Bail is automatic.", &["Bail is discretionary.".into()])
        .await;
    assert!(!report.hallucinations_detected);
    assert!(report.hallucinations.is_empty());
    assert_eq!(report.error.as_deref(), Some(PARSE_FAILURE));
    assert_eq!(report.raw_result.as_deref(), Some(REPLY));
    assert_eq!(gen.calls(), 1);
}
