//! Query gating and classification.
//!
//! The legal-topic filter and the query-type classifier are pure rule
//! tables evaluated top to bottom, first match wins. Jurisdiction detection
//! asks a generator for a tag and confirms it against a regex table, so the
//! result is always one of the four known jurisdictions.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::llm::{generate, Generator};
use crate::prompts;
use crate::types::{Jurisdiction, QueryType};

// ── Legal-topic filter ───────────────────────────────────────────────────

pub const LEGAL_KEYWORDS: &[&str] = &[
    "law", "legal", "court", "rights", "lawsuit", "sue", "attorney", "lawyer",
    "judge", "criminal", "civil", "plaintiff", "defendant", "case", "trial",
    "verdict", "settlement", "appeal", "contract", "tort", "damages", "liability",
    "statute", "regulation", "constitution", "amendment", "prosecution", "defense",
    "charge", "bail", "warrant", "injunction", "jurisdiction", "mediation", "arbitration",
    "divorce", "custody", "property", "bankruptcy", "will", "trust", "estate", "probate",
    "copyright", "patent", "trademark", "immigration", "visa", "asylum", "deportation",
    "tax", "irs", "income", "audit", "refund", "deduction", "employment", "wrongful",
    "discrimination", "harassment", "compensation", "rent", "lease", "eviction", "tenant",
    "landlord", "mortgage", "foreclosure",
];

pub const REFUSAL_MESSAGE: &str =
    "I can only answer legal-related questions. Please provide a query related to legal topics.";

/// Case-insensitive substring match against [`LEGAL_KEYWORDS`].
pub fn is_legal_query(query: &str) -> bool {
    let q = query.to_lowercase();
    LEGAL_KEYWORDS.iter().any(|k| q.contains(k))
}

// ── Query-type classifier ────────────────────────────────────────────────

/// One row of the query-type table. `matches` receives the lower-cased query.
pub struct TypeRule {
    pub label: QueryType,
    pub matches: fn(&str) -> bool,
}

fn starts_with_any(q: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| q.starts_with(p))
}

fn contains_any(q: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| q.contains(n))
}

fn is_static(q: &str) -> bool {
    starts_with_any(q, &["what is", "what are", "define"])
        || contains_any(q, &["meaning of", "definition of", "explain"])
}

fn is_how_to(q: &str) -> bool {
    starts_with_any(
        q,
        &["how to", "how do i", "how can i", "what's the process", "what is the process"],
    ) || contains_any(q, &["steps to", "procedure for", "guide to"])
}

fn is_pathway(q: &str) -> bool {
    contains_any(q, &["pathway", "roadmap", "steps", "process", "timeline"])
}

fn is_adr(q: &str) -> bool {
    contains_any(
        q,
        &["adr", "alternative dispute", "mediation", "arbitration", "resolution"],
    )
}

/// Evaluated in order. "What is the process ..." lands in `Static` because
/// the static prefix "what is" is checked before the how-to prefixes.
pub const QUERY_TYPE_RULES: &[TypeRule] = &[
    TypeRule { label: QueryType::Static, matches: is_static },
    TypeRule { label: QueryType::HowTo, matches: is_how_to },
    TypeRule { label: QueryType::Pathway, matches: is_pathway },
    TypeRule { label: QueryType::Adr, matches: is_adr },
];

pub fn classify_query_type(query: &str) -> QueryType {
    let q = query.trim().to_lowercase();
    QUERY_TYPE_RULES
        .iter()
        .find(|rule| (rule.matches)(&q))
        .map(|rule| rule.label)
        .unwrap_or(QueryType::General)
}

// ── Language ─────────────────────────────────────────────────────────────

/// Script-based language tag: Devanagari text is "hi", everything else "en".
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c)) {
        "hi"
    } else {
        "en"
    }
}

// ── Jurisdiction ─────────────────────────────────────────────────────────

static JURISDICTION_PATTERNS: LazyLock<Vec<(Regex, Jurisdiction)>> = LazyLock::new(|| {
    [
        (r"\b(usa|united\s?states)\b", Jurisdiction::Usa),
        (r"\b(uk|united\s?kingdom)\b", Jurisdiction::Uk),
        (r"\b(india|indian)\b", Jurisdiction::India),
    ]
    .into_iter()
    .map(|(pattern, j)| (Regex::new(pattern).expect("jurisdiction pattern"), j))
    .collect()
});

/// Map free-form generator output onto a jurisdiction. First pattern wins;
/// anything unrecognised is `Default`.
pub fn parse_jurisdiction(output: &str) -> Jurisdiction {
    let clean = output.trim().to_lowercase();
    JURISDICTION_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(&clean))
        .map(|(_, j)| *j)
        .unwrap_or(Jurisdiction::Default)
}

/// Never fails: provider errors and timeouts resolve to `Default`.
pub async fn detect_jurisdiction(gen: &dyn Generator, query: &str, timeout: Duration) -> Jurisdiction {
    match generate(gen, &prompts::jurisdiction(query), timeout).await {
        Ok(output) => {
            let j = parse_jurisdiction(&output);
            debug!(jurisdiction = %j, raw = %output.trim(), "jurisdiction detected");
            j
        }
        Err(e) => {
            warn!("jurisdiction detection fallback: {e:#}");
            Jurisdiction::Default
        }
    }
}
