use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Classification Enums ─────────────────────────────────────────────────

/// Legal system a query is answered under. Selects the retrieval store and
/// the jurisdiction-specific prompts and resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jurisdiction {
    Usa,
    Uk,
    India,
    Default,
}

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 4] = [Self::Usa, Self::Uk, Self::India, Self::Default];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usa => "usa",
            Self::Uk => "uk",
            Self::India => "india",
            Self::Default => "default",
        }
    }

    /// Parse an exact (case-insensitive) tag. Free-form model output goes
    /// through `classify::parse_jurisdiction` instead.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "usa" => Some(Self::Usa),
            "uk" => Some(Self::Uk),
            "india" => Some(Self::India),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Definitions and explanations of settled law.
    Static,
    /// Procedural "how do I" questions.
    HowTo,
    /// Requests for an ordered roadmap of a case.
    Pathway,
    /// Alternative dispute resolution options.
    Adr,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::HowTo => "how_to",
            Self::Pathway => "pathway",
            Self::Adr => "adr",
            Self::General => "general",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Query ────────────────────────────────────────────────────────────────

/// A classified inbound query. Built once per request and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// ISO 639-1 code ("en", "hi").
    pub language: String,
    pub jurisdiction: Jurisdiction,
    pub query_type: QueryType,
}

/// Caller-supplied knobs for a single query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Free-form case constraints (budget, deadline, ...) forwarded to pathway prompts.
    #[serde(default)]
    pub constraints: HashMap<String, String>,
    #[serde(default)]
    pub detect_bias: bool,
    #[serde(default)]
    pub check_hallucinations: bool,
}

// ── Retrieval ────────────────────────────────────────────────────────────

/// A bounded slice of an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub source: String,
    pub jurisdiction: Jurisdiction,
    /// Position of this chunk within its parent document, starting at 0.
    pub chunk_index: usize,
    /// Cosine similarity to the query; only set on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    /// Parent document metadata, inherited by every chunk.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Result of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub status: String,
    pub chunks_indexed: usize,
    pub jurisdiction: Jurisdiction,
}

// ── Agent ────────────────────────────────────────────────────────────────

/// One tool call made by the agent and the observation it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub input: String,
    pub observation: String,
}

/// Output of the tool-augmented generator for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
    pub trace: Vec<ToolInvocation>,
    /// Generation rounds consumed by the reasoning loop.
    pub iterations: usize,
    /// True when the answer came from the direct (non-agentic) prompt.
    pub used_fallback: bool,
}

impl AgentResponse {
    /// Observations produced by the named tool, in call order.
    pub fn observations<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.trace
            .iter()
            .filter(move |t| t.tool == tool)
            .map(|t| t.observation.as_str())
    }
}

// ── Responses ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegalPathway {
    pub steps: Vec<String>,
    pub resources: Vec<String>,
}

/// Terminal artifact returned to the caller. Every container is always
/// present, even on refusal and degraded paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegalResponse {
    pub advice: String,
    pub sources: Vec<String>,
    pub legal_pathway: LegalPathway,
    pub bias_report: Option<BiasReport>,
    pub adr_options: Vec<String>,
}

impl LegalResponse {
    pub fn advice(advice: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            advice: advice.into(),
            sources,
            ..Self::default()
        }
    }
}

/// A single flagged bias dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasFinding {
    pub category: String,
    /// 1 (minimal) to 10 (highly biased).
    pub score: u8,
    pub explanation: String,
    pub rewrite_suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub overall_score: u8,
    pub biases: Vec<BiasFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// Unparsed model output, kept whenever parsing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedStatement {
    pub statement: String,
    pub reason: String,
    pub correction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationReport {
    pub hallucinations_detected: bool,
    pub hallucinations: Vec<FlaggedStatement>,
    pub original_text: String,
    /// Full rewrite, present only when hallucinations were detected and the
    /// correction re-prompt succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<String>,
}

impl HallucinationReport {
    /// The text a caller should serve: the correction if one exists.
    pub fn effective_text(&self) -> &str {
        self.corrected_text.as_deref().unwrap_or(&self.original_text)
    }
}
