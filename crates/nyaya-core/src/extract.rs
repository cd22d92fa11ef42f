//! Heuristic post-processors that pull structured lists out of free text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::llm::stable_hash;
use crate::types::{AgentResponse, Jurisdiction};

pub const MAX_PATHWAY_STEPS: usize = 10;
pub const MAX_ADR_OPTIONS: usize = 5;

pub const ADR_KEYWORDS: &[&str] = &[
    "mediation",
    "arbitration",
    "negotiation",
    "conciliation",
    "settlement conference",
    "neutral evaluation",
    "mini-trial",
    "summary jury trial",
    "private judging",
    "dispute resolution",
];

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s+").expect("numbered line pattern"));
static BULLET_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[•\-\*]\s+").expect("bullet line pattern"));
static STEP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\.\-\*•]+\s+").expect("step marker pattern"));

/// Split after `.`, `!` or `?` when followed by whitespace. The whitespace
/// run is dropped; the terminator stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            out.push(&text[start..i]);
            while let Some(&(_, next)) = iter.peek() {
                if !next.is_whitespace() {
                    break;
                }
                iter.next();
            }
            start = iter.peek().map(|&(j, _)| j).unwrap_or(text.len());
            prev = None;
            continue;
        }
        prev = Some(c);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Ordered steps from numbered or bulleted lines, markers stripped. Without
/// any such lines, sentences longer than 10 characters are used instead.
pub fn extract_pathway_steps(output: &str) -> Vec<String> {
    let mut steps: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| NUMBERED_LINE.is_match(line) || BULLET_LINE.is_match(line))
        .map(|line| STEP_MARKER.replace(line, "").trim().to_string())
        .filter(|step| !step.is_empty())
        .collect();

    if steps.is_empty() {
        steps = split_sentences(output)
            .into_iter()
            .map(str::trim)
            .filter(|s| s.chars().count() > 10)
            .map(str::to_string)
            .collect();
    }
    steps.truncate(MAX_PATHWAY_STEPS);
    steps
}

fn mentions_adr(text: &str) -> bool {
    let lower = text.to_lowercase();
    ADR_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Lines (or, failing that, sentences) that mention an ADR mechanism.
/// First occurrence order is kept; duplicates are dropped.
pub fn extract_adr_options(output: &str) -> Vec<String> {
    let mut candidates: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| mentions_adr(line))
        .collect();
    if candidates.is_empty() {
        candidates = split_sentences(output)
            .into_iter()
            .map(str::trim)
            .filter(|s| mentions_adr(s))
            .collect();
    }

    let mut options: Vec<String> = Vec::new();
    for c in candidates {
        if options.len() == MAX_ADR_OPTIONS {
            break;
        }
        if !options.iter().any(|o| o == c) {
            options.push(c.to_string());
        }
    }
    options
}

/// Split a comma-separated model answer into trimmed, non-empty items.
pub fn parse_comma_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `source` fields of the outermost JSON array in `text`, if any.
fn sources_from_json(text: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Value>>(&text[start..=end]) {
        Ok(items) => items
            .iter()
            .filter_map(|item| item.get("source").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            debug!("no source list in text: {e}");
            Vec::new()
        }
    }
}

/// Deterministic reference identifiers used when no real source was found.
pub fn default_sources(query: &str, jurisdiction: Jurisdiction) -> Vec<String> {
    let h = stable_hash(query);
    let tag = jurisdiction.as_str().to_uppercase();
    vec![
        format!("Legal Database Reference #LC-{tag}-{:03}", h % 1000),
        format!("Legal Precedent Collection #{:03}", h % 500),
    ]
}

/// Sources cited by the agent's research observations and final output,
/// deduplicated in first-seen order, with [`default_sources`] as fallback.
pub fn extract_sources(response: &AgentResponse, query: &str, jurisdiction: Jurisdiction) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    let found = response
        .observations(crate::agent::LEGAL_RESEARCH)
        .flat_map(sources_from_json)
        .chain(sources_from_json(&response.output));
    for s in found {
        if !sources.contains(&s) {
            sources.push(s);
        }
    }
    if sources.is_empty() {
        return default_sources(query, jurisdiction);
    }
    sources
}

pub fn pro_bono_resources(jurisdiction: Jurisdiction) -> Vec<String> {
    let tag = jurisdiction.as_str().to_uppercase();
    vec![
        format!("{tag} Legal Aid Foundation"),
        format!("{tag} Pro Bono Network"),
    ]
}
