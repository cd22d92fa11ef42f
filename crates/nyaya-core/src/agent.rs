//! Bounded tool-using reasoning loop.
//!
//! The loop is an explicit state machine ([`AgentMachine`]) driven by
//! [`LegalAgent::run`]. Each generation round consumes one iteration. A
//! round either names a tool (the tool runs, its observation is appended to
//! the scratchpad), gives a final answer, or is malformed (the parse error is
//! appended as an observation so the model can correct itself). When the
//! iteration cap is reached, or generation itself fails, the agent answers
//! with a single direct prompt instead, seeded with whatever it observed.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::extract::{parse_comma_list, pro_bono_resources};
use crate::llm::{generate, Generator};
use crate::prompts;
use crate::store::{StoreRegistry, PLACEHOLDER_SOURCE};
use crate::types::{AgentResponse, Jurisdiction, LegalPathway, Query, ToolInvocation};

pub const LEGAL_RESEARCH: &str = "LegalResearch";
pub const PATHWAY_ANALYSIS: &str = "PathwayAnalysis";
pub const ADR_ANALYSIS: &str = "ADRAnalysis";

// ── Tools ────────────────────────────────────────────────────────────────

/// A capability the agent can call by name. Tools never fail: errors are
/// logged and reported to the model as a fixed observation string.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn call(&self, input: &str) -> String;
}

#[derive(Serialize)]
struct ResearchHit<'a> {
    content: &'a str,
    source: &'a str,
    relevance: f32,
}

/// Similarity search over the store of one jurisdiction.
pub struct LegalResearch {
    pub stores: Arc<StoreRegistry>,
    pub jurisdiction: Jurisdiction,
    pub k: usize,
}

#[async_trait]
impl Tool for LegalResearch {
    fn name(&self) -> &'static str {
        LEGAL_RESEARCH
    }

    fn description(&self) -> &'static str {
        "Search for relevant legal information in our database."
    }

    async fn call(&self, input: &str) -> String {
        let chunks = match self.stores.similarity_search(self.jurisdiction, input, self.k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(jurisdiction = %self.jurisdiction, "legal research tool error: {e:#}");
                return "Error performing legal research.".into();
            },
        };
        let hits: Vec<ResearchHit> = chunks
            .iter()
            .filter(|c| c.source != PLACEHOLDER_SOURCE)
            .map(|c| ResearchHit {
                content: &c.content,
                source: &c.source,
                relevance: c.score.unwrap_or(0.0),
            })
            .collect();
        if hits.is_empty() {
            return "No relevant legal documents found for this jurisdiction.".into();
        }
        serde_json::to_string_pretty(&hits).unwrap_or_else(|_| "Error performing legal research.".into())
    }
}

/// Roadmap generation for the caller's situation and constraints.
pub struct PathwayAnalysis {
    pub generator: Arc<dyn Generator>,
    pub jurisdiction: Jurisdiction,
    pub constraints: HashMap<String, String>,
    pub timeout: Duration,
}

#[async_trait]
impl Tool for PathwayAnalysis {
    fn name(&self) -> &'static str {
        PATHWAY_ANALYSIS
    }

    fn description(&self) -> &'static str {
        "Generate a step-by-step legal pathway for a given situation."
    }

    async fn call(&self, input: &str) -> String {
        let prompt = prompts::pathway(input, self.jurisdiction, &self.constraints);
        match generate(self.generator.as_ref(), &prompt, self.timeout).await {
            Ok(text) => {
                let pathway = LegalPathway {
                    steps: text
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect(),
                    resources: pro_bono_resources(self.jurisdiction),
                };
                serde_json::to_string(&pathway).unwrap_or_else(|_| "Error generating legal pathway.".into())
            },
            Err(e) => {
                warn!(jurisdiction = %self.jurisdiction, "pathway analysis tool error: {e:#}");
                "Error generating legal pathway.".into()
            },
        }
    }
}

/// Legal analysis followed by extraction of the ADR options it mentions.
pub struct AdrAnalysis {
    pub generator: Arc<dyn Generator>,
    pub jurisdiction: Jurisdiction,
    pub timeout: Duration,
}

#[async_trait]
impl Tool for AdrAnalysis {
    fn name(&self) -> &'static str {
        ADR_ANALYSIS
    }

    fn description(&self) -> &'static str {
        "Analyze alternative dispute resolution options for a given case."
    }

    async fn call(&self, input: &str) -> String {
        let gen = self.generator.as_ref();
        let analysis = match generate(gen, &prompts::legal_analysis(input, self.jurisdiction), self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                warn!(jurisdiction = %self.jurisdiction, "ADR analysis tool error: {e:#}");
                return "Error analyzing ADR options.".into();
            },
        };
        let options = match generate(gen, &prompts::adr_extraction(&analysis, self.jurisdiction), self.timeout).await {
            Ok(list) => parse_comma_list(&list),
            Err(e) => {
                warn!(jurisdiction = %self.jurisdiction, "ADR extraction failed: {e:#}");
                Vec::new()
            },
        };
        serde_json::to_string(&options).unwrap_or_else(|_| "Error analyzing ADR options.".into())
    }
}

/// The standard tool set, bound to one request's jurisdiction and constraints.
pub fn default_tools(
    generator: &Arc<dyn Generator>,
    stores: &Arc<StoreRegistry>,
    jurisdiction: Jurisdiction,
    constraints: &HashMap<String, String>,
    k: usize,
    timeout: Duration,
) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(LegalResearch {
            stores: Arc::clone(stores),
            jurisdiction,
            k,
        }),
        Box::new(PathwayAnalysis {
            generator: Arc::clone(generator),
            jurisdiction,
            constraints: constraints.clone(),
            timeout,
        }),
        Box::new(AdrAnalysis {
            generator: Arc::clone(generator),
            jurisdiction,
            timeout,
        }),
    ]
}

// ── Step parsing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Action { tool: String, input: String },
    Final(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid Format: Missing 'Action:' after 'Thought:'")]
    MissingAction,
    #[error("Invalid Format: Missing 'Action Input:' after 'Action:'")]
    MissingActionInput,
}

const FINAL_ANSWER: &str = "Final Answer:";
const OBSERVATION: &str = "Observation:";

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
        .expect("action pattern")
});
static ACTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Action\s*\d*\s*:").expect("action line pattern"));

/// Parse one generation round. Anything from the first `Observation:` on is
/// ignored, since observations come from tools, never from the model. When
/// both an action and a final answer are present, whichever comes first wins.
pub fn parse_step(text: &str) -> Result<Step, ParseError> {
    let text = text.find(OBSERVATION).map_or(text, |i| &text[..i]);
    let final_at = text.find(FINAL_ANSWER);

    if let Some(caps) = ACTION.captures(text) {
        let action_start = caps.get(0).map_or(0, |m| m.start());
        if final_at.map_or(true, |f| action_start < f) {
            let tool = caps[1]
                .trim()
                .trim_matches(|c: char| matches!(c, '*' | '`' | '[' | ']'))
                .trim()
                .to_string();
            let input = caps[2].trim().trim_matches('"').to_string();
            return Ok(Step::Action { tool, input });
        }
    }
    if let Some(f) = final_at {
        return Ok(Step::Final(text[f + FINAL_ANSWER.len()..].trim().to_string()));
    }
    if ACTION_LINE.is_match(text) {
        Err(ParseError::MissingActionInput)
    } else {
        Err(ParseError::MissingAction)
    }
}

// ── State machine ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    /// Waiting for the next generation round.
    SelectingTool,
    /// A tool call was parsed; waiting for its observation.
    AwaitingToolResult { tool: String, input: String },
    /// Terminal: the model gave a final answer.
    Finalizing { answer: String },
    /// Terminal: the iteration cap was reached without a final answer.
    Exhausted,
}

pub struct AgentMachine {
    state: AgentState,
    max_iterations: usize,
    iterations: usize,
    scratchpad: String,
    trace: Vec<ToolInvocation>,
    tools: Vec<&'static str>,
}

impl AgentMachine {
    pub fn new(max_iterations: usize, tools: Vec<&'static str>) -> Self {
        Self {
            state: AgentState::SelectingTool,
            max_iterations: max_iterations.max(1),
            iterations: 0,
            scratchpad: String::new(),
            trace: Vec::new(),
            tools,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn scratchpad(&self) -> &str {
        &self.scratchpad
    }

    pub fn trace(&self) -> &[ToolInvocation] {
        &self.trace
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, AgentState::Finalizing { .. } | AgentState::Exhausted)
    }

    /// Feed one generation round. Ignored unless in `SelectingTool`.
    pub fn on_generation(&mut self, text: &str) -> &AgentState {
        if self.state != AgentState::SelectingTool {
            return &self.state;
        }
        self.iterations += 1;
        let kept = text.find(OBSERVATION).map_or(text, |i| &text[..i]).trim_end();

        match parse_step(kept) {
            Ok(Step::Final(answer)) => {
                self.state = AgentState::Finalizing { answer };
            },
            Ok(Step::Action { tool, input }) if self.tools.contains(&tool.as_str()) => {
                self.scratchpad.push_str(kept);
                self.state = AgentState::AwaitingToolResult { tool, input };
            },
            Ok(Step::Action { tool, .. }) => {
                debug!(tool = %tool, iteration = self.iterations, "agent named an unknown tool");
                let note = format!(
                    "{tool} is not a valid tool, try one of [{}].",
                    self.tools.join(", ")
                );
                self.observe(kept, &note);
                self.advance();
            },
            Err(e) => {
                debug!(iteration = self.iterations, "agent output could not be parsed: {e}");
                self.observe(kept, &e.to_string());
                self.advance();
            },
        }
        &self.state
    }

    /// Record the observation for the pending tool call. Ignored unless in
    /// `AwaitingToolResult`.
    pub fn on_tool_result(&mut self, observation: String) -> &AgentState {
        let AgentState::AwaitingToolResult { tool, input } = &self.state else {
            return &self.state;
        };
        self.trace.push(ToolInvocation {
            tool: tool.clone(),
            input: input.clone(),
            observation: observation.clone(),
        });
        self.observe("", &observation);
        self.advance();
        &self.state
    }

    fn observe(&mut self, generated: &str, observation: &str) {
        self.scratchpad.push_str(generated);
        self.scratchpad.push_str("\nObservation: ");
        self.scratchpad.push_str(observation);
        self.scratchpad.push_str("\nThought:");
    }

    fn advance(&mut self) {
        self.state = if self.iterations >= self.max_iterations {
            AgentState::Exhausted
        } else {
            AgentState::SelectingTool
        };
    }
}

// ── Runner ───────────────────────────────────────────────────────────────

pub struct LegalAgent {
    generator: Arc<dyn Generator>,
    tools: Vec<Box<dyn Tool>>,
    max_iterations: usize,
    timeout: Duration,
}

impl LegalAgent {
    pub fn new(
        generator: Arc<dyn Generator>,
        tools: Vec<Box<dyn Tool>>,
        max_iterations: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            tools,
            max_iterations,
            timeout,
        }
    }

    /// Answer `query`. Always produces a response; provider failures end up
    /// as an empty `output` on the fallback path.
    pub async fn run(&self, query: &Query) -> AgentResponse {
        let names: Vec<&'static str> = self.tools.iter().map(|t| t.name()).collect();
        let described: Vec<(&str, &str)> = self.tools.iter().map(|t| (t.name(), t.description())).collect();
        let mut machine = AgentMachine::new(self.max_iterations, names);

        loop {
            match machine.state().clone() {
                AgentState::SelectingTool => {
                    let prompt = prompts::agent(&query.text, &described, machine.scratchpad());
                    match generate(self.generator.as_ref(), &prompt, self.timeout).await {
                        Ok(text) => {
                            machine.on_generation(&text);
                        },
                        Err(e) => {
                            warn!(iteration = machine.iterations() + 1, "agent generation failed: {e:#}");
                            break;
                        },
                    }
                },
                AgentState::AwaitingToolResult { tool, input } => {
                    debug!(tool = %tool, iteration = machine.iterations(), "agent calling tool");
                    let observation = match self.tools.iter().find(|t| t.name() == tool) {
                        Some(t) => t.call(&input).await,
                        None => format!("{tool} is not available."),
                    };
                    machine.on_tool_result(observation);
                },
                AgentState::Finalizing { answer } => {
                    info!(
                        iterations = machine.iterations(),
                        tools_used = machine.trace().len(),
                        output_len = answer.len(),
                        "agent finished"
                    );
                    return AgentResponse {
                        output: answer,
                        trace: machine.trace().to_vec(),
                        iterations: machine.iterations(),
                        used_fallback: false,
                    };
                },
                AgentState::Exhausted => {
                    info!(iterations = machine.iterations(), "agent stopped at iteration limit");
                    break;
                },
            }
        }

        self.fallback(query, &machine).await
    }

    async fn fallback(&self, query: &Query, machine: &AgentMachine) -> AgentResponse {
        let observations: Vec<String> = machine.trace().iter().map(|t| t.observation.clone()).collect();
        let prompt = prompts::with_observations(
            prompts::direct(query.query_type, &query.text, query.jurisdiction),
            &observations,
        );
        let output = match generate(self.generator.as_ref(), &prompt, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                warn!(query_type = %query.query_type, "direct generation failed: {e:#}");
                String::new()
            },
        };
        AgentResponse {
            output,
            trace: machine.trace().to_vec(),
            iterations: machine.iterations(),
            used_fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_and_input() {
        let step = parse_step("I should search.\nAction: LegalResearch\nAction Input: \"breach of contract\"").unwrap();
        assert_eq!(
            step,
            Step::Action {
                tool: "LegalResearch".into(),
                input: "breach of contract".into()
            }
        );
    }

    #[test]
    fn parses_final_answer() {
        let step = parse_step("I now know the final answer\nFinal Answer: A breach is a failure to perform.").unwrap();
        assert_eq!(step, Step::Final("A breach is a failure to perform.".into()));
    }

    #[test]
    fn hallucinated_observation_is_ignored() {
        let step = parse_step(
            "Action: LegalResearch\nAction Input: tort\nObservation: made up\nFinal Answer: made up too",
        )
        .unwrap();
        assert!(matches!(step, Step::Action { .. }));
    }

    #[test]
    fn malformed_output_reports_what_is_missing() {
        assert_eq!(parse_step("just rambling"), Err(ParseError::MissingAction));
        assert_eq!(parse_step("Action: LegalResearch"), Err(ParseError::MissingActionInput));
    }
}
