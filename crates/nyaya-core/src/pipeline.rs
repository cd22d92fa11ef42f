//! The query pipeline facade.
//!
//! `process_query` runs: legal-topic gate, classification, the agent, a
//! type-specific handler, then the optional hallucination and bias passes.
//! Provider failures are absorbed at each step; the only errors returned
//! are caller mistakes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::agent::{default_tools, LegalAgent};
use crate::bias::BiasDetector;
use crate::classify::{classify_query_type, detect_jurisdiction, detect_language, is_legal_query, REFUSAL_MESSAGE};
use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::{extract_adr_options, extract_pathway_steps, extract_sources, pro_bono_resources};
use crate::llm::{Embedder, Generator};
use crate::splitter::TextSplitter;
use crate::store::{StoreRegistry, PLACEHOLDER_SOURCE};
use crate::types::{
    AgentResponse, BiasReport, HallucinationReport, IndexOutcome, Jurisdiction, LegalPathway, LegalResponse,
    Query, QueryOptions, QueryType,
};
use crate::validate::{validate_response, Rewrite};

pub const DEGRADED_MESSAGE: &str =
    "The legal assistant is temporarily unable to answer this question. Please try again later.";

pub struct LegalAssistant {
    generator: Arc<dyn Generator>,
    stores: Arc<StoreRegistry>,
    bias: BiasDetector,
    timeout: Duration,
    max_iterations: usize,
    retrieval_k: usize,
}

impl LegalAssistant {
    pub fn new(config: &Config, generator: Arc<dyn Generator>, embedder: Arc<dyn Embedder>) -> Self {
        let timeout = config.generation_timeout();
        let stores = StoreRegistry::new(&config.data_dir, embedder, timeout)
            .with_splitter(TextSplitter::new(config.chunk_size, config.chunk_overlap));
        Self {
            bias: BiasDetector::new(Arc::clone(&generator), timeout),
            generator,
            stores: Arc::new(stores),
            timeout,
            max_iterations: config.agent_max_iterations,
            retrieval_k: config.retrieval_k,
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn stores(&self) -> &Arc<StoreRegistry> {
        &self.stores
    }

    /// Gate and classify a query. `None` when it is not a legal question.
    pub async fn classify(&self, text: &str) -> Result<Option<Query>, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }
        if !is_legal_query(text) {
            return Ok(None);
        }
        let jurisdiction = detect_jurisdiction(self.generator.as_ref(), text, self.timeout).await;
        Ok(Some(Query {
            text: text.to_string(),
            language: detect_language(text).to_string(),
            jurisdiction,
            query_type: classify_query_type(text),
        }))
    }

    pub async fn process_query(&self, text: &str, options: &QueryOptions) -> Result<LegalResponse, PipelineError> {
        let Some(query) = self.classify(text).await? else {
            info!("refusing non-legal query");
            return Ok(LegalResponse::advice(REFUSAL_MESSAGE, Vec::new()));
        };
        info!(
            jurisdiction = %query.jurisdiction,
            query_type = %query.query_type,
            language = %query.language,
            "processing legal query"
        );

        let tools = default_tools(
            &self.generator,
            &self.stores,
            query.jurisdiction,
            &options.constraints,
            self.retrieval_k,
            self.timeout,
        );
        let agent = LegalAgent::new(Arc::clone(&self.generator), tools, self.max_iterations, self.timeout);
        let agent_response = agent.run(&query).await;

        let mut response = match query.query_type {
            QueryType::Static => self.handle_rewritten(&query, &agent_response, Rewrite::Summary).await,
            QueryType::HowTo => self.handle_rewritten(&query, &agent_response, Rewrite::NumberedGuide).await,
            QueryType::General => self.handle_rewritten(&query, &agent_response, Rewrite::Concise).await,
            QueryType::Pathway => handle_pathway(&query, &agent_response),
            QueryType::Adr => handle_adr(&agent_response),
        };

        if options.check_hallucinations && answerable(&response.advice) {
            if let Some(report) = self.check_against_store(&query, &response.advice).await {
                if report.hallucinations_detected {
                    response.advice = report.effective_text().to_string();
                }
            }
        }
        if options.detect_bias {
            if let Some(text) = bias_subject(&response) {
                response.bias_report = Some(self.bias.detect_bias(&text).await);
            }
        }
        Ok(response)
    }

    /// Validate, then rewrite into the shape for this query type.
    async fn handle_rewritten(&self, query: &Query, agent: &AgentResponse, rewrite: Rewrite) -> LegalResponse {
        let gen = self.generator.as_ref();
        let validated = validate_response(gen, &query.text, &agent.output, self.timeout).await;
        let advice = match rewrite.apply(gen, &validated, self.timeout).await {
            Some(advice) => advice,
            None => {
                error!(query_type = %query.query_type, "no answer could be produced");
                DEGRADED_MESSAGE.to_string()
            },
        };
        LegalResponse::advice(advice, extract_sources(agent, &query.text, query.jurisdiction))
    }

    async fn check_against_store(&self, query: &Query, advice: &str) -> Option<HallucinationReport> {
        let chunks = match self
            .stores
            .similarity_search(query.jurisdiction, &query.text, self.retrieval_k)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(jurisdiction = %query.jurisdiction, "skipping hallucination check: {e:#}");
                return None;
            },
        };
        let sources: Vec<String> = chunks
            .into_iter()
            .filter(|c| c.source != PLACEHOLDER_SOURCE)
            .map(|c| c.content)
            .collect();
        if sources.is_empty() {
            debug!(jurisdiction = %query.jurisdiction, "no indexed sources; skipping hallucination check");
            return None;
        }
        Some(self.bias.mitigate_hallucinations(advice, &sources).await)
    }

    /// Split, embed and persist a document into the store for `jurisdiction`.
    pub async fn index_document(
        &self,
        jurisdiction: &str,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<IndexOutcome, PipelineError> {
        let j = Jurisdiction::from_tag(jurisdiction)
            .ok_or_else(|| PipelineError::UnknownJurisdiction(jurisdiction.to_string()))?;
        if content.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        self.stores.add_document(j, content, metadata).await.map_err(|e| {
            error!(jurisdiction = %j, "document indexing failed: {e:#}");
            PipelineError::Indexing(format!("{e:#}"))
        })
    }

    pub async fn detect_bias(&self, text: &str) -> BiasReport {
        self.bias.detect_bias(text).await
    }

    pub async fn mitigate_hallucinations(&self, text: &str, sources: &[String]) -> HallucinationReport {
        self.bias.mitigate_hallucinations(text, sources).await
    }
}

fn answerable(advice: &str) -> bool {
    !advice.trim().is_empty() && advice != DEGRADED_MESSAGE
}

/// The text a bias pass should read: the advice, or for pathway and ADR
/// answers the listed steps or options.
fn bias_subject(response: &LegalResponse) -> Option<String> {
    if answerable(&response.advice) {
        Some(response.advice.clone())
    } else if response.advice.trim().is_empty() && !response.legal_pathway.steps.is_empty() {
        Some(response.legal_pathway.steps.join("\n"))
    } else if response.advice.trim().is_empty() && !response.adr_options.is_empty() {
        Some(response.adr_options.join("\n"))
    } else {
        None
    }
}

fn handle_pathway(query: &Query, agent: &AgentResponse) -> LegalResponse {
    if agent.output.trim().is_empty() {
        return LegalResponse::advice(DEGRADED_MESSAGE, Vec::new());
    }
    LegalResponse {
        legal_pathway: LegalPathway {
            steps: extract_pathway_steps(&agent.output),
            resources: pro_bono_resources(query.jurisdiction),
        },
        ..LegalResponse::default()
    }
}

fn handle_adr(agent: &AgentResponse) -> LegalResponse {
    if agent.output.trim().is_empty() {
        return LegalResponse::advice(DEGRADED_MESSAGE, Vec::new());
    }
    LegalResponse {
        adr_options: extract_adr_options(&agent.output),
        ..LegalResponse::default()
    }
}
