//! Prompt builders for every generation call the pipeline makes.
//!
//! Keeping them in one place keeps the wording consistent across the agent,
//! the direct fallback path and the post-processing passes.

use std::collections::HashMap;

use crate::types::{Jurisdiction, QueryType};

pub fn jurisdiction(query: &str) -> String {
    format!(
        "Analyze this legal query and return ONLY the jurisdiction code (usa, uk, india):\n\
         Query: {query}\n\
         Answer must be exactly one of: usa, uk, india, or default"
    )
}

/// Reasoning-loop prompt. `tools` are `(name, description)` pairs;
/// `scratchpad` holds the transcript of earlier rounds.
pub fn agent(query: &str, tools: &[(&str, &str)], scratchpad: &str) -> String {
    let descriptions = tools
        .iter()
        .map(|(name, desc)| format!("{name}: {desc}"))
        .collect::<Vec<_>>()
        .join("\n");
    let names = tools.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ");
    format!(
        "You are a specialized legal assistant. Answer the following query using the tools available to you:\n\n\
         {query}\n\n\
         You have access to the following tools:\n\n\
         {descriptions}\n\n\
         Use the following format:\n\n\
         Thought: you should always think about what to do\n\
         Action: the action to take, should be one of [{names}]\n\
         Action Input: the input to the action\n\
         Observation: the result of the action\n\
         ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
         Thought: I now know the final answer\n\
         Final Answer: the final answer to the original query\n\n\
         Think step by step about the best approach. Use the most relevant tool for the job.\n\n\
         Begin!\n\n\
         Thought:{scratchpad}"
    )
}

/// Structured analysis prompt; also the direct prompt for pathway, ADR and
/// general queries.
pub fn legal_analysis(query: &str, jurisdiction: Jurisdiction) -> String {
    format!(
        "As an unbiased {jurisdiction} legal assistant, provide:\n\
         1. Analysis of: {query}\n\
         2. Relevant citations\n\
         3. Pro bono resources\n\
         4. ADR options\n\
         Use clear headings and bullet points."
    )
}

pub fn static_answer(query: &str, jurisdiction: Jurisdiction) -> String {
    format!(
        "Provide a clear, factual explanation for the following legal question for {jurisdiction} jurisdiction:\n\n\
         {query}\n\n\
         Provide only verified information with proper context. Focus on established legal principles, \
         constitutional provisions, or statutory laws without speculation. Include key legal references where applicable."
    )
}

pub fn how_to_answer(query: &str, jurisdiction: Jurisdiction) -> String {
    format!(
        "Provide a general step-by-step guide for the following legal procedure in {jurisdiction} jurisdiction:\n\n\
         {query}\n\n\
         Include:\n\
         1. Initial considerations and prerequisites\n\
         2. Required documentation\n\
         3. Filing procedures or formal steps\n\
         4. Expected timeline\n\
         5. Potential costs\n\
         6. When professional legal assistance is recommended\n\n\
         Focus on providing general process information without speculation, using verified legal procedures. \
         Emphasize that this is general guidance and specific cases may vary."
    )
}

/// Prompt for the non-agentic path, chosen by query type.
pub fn direct(query_type: QueryType, query: &str, jurisdiction: Jurisdiction) -> String {
    match query_type {
        QueryType::Static => static_answer(query, jurisdiction),
        QueryType::HowTo => how_to_answer(query, jurisdiction),
        _ => legal_analysis(query, jurisdiction),
    }
}

pub fn pathway(query: &str, jurisdiction: Jurisdiction, constraints: &HashMap<String, String>) -> String {
    let constraints = serde_json::to_string(constraints).unwrap_or_else(|_| "{}".into());
    format!(
        "Create legal roadmap for {jurisdiction}:\n\
         Case: {query}\n\
         Constraints: {constraints}\n\
         Include steps, documents, pro bono options, and ADR timeline."
    )
}

pub fn adr_extraction(text: &str, jurisdiction: Jurisdiction) -> String {
    format!(
        "Extract ADR options from this {jurisdiction} text:\n\
         {text}\n\
         Return as comma-separated list"
    )
}

pub fn validation(query: &str, draft: &str) -> String {
    format!(
        "Review this legal response for factual accuracy and potential hallucinations:\n\n\
         Query: {query}\n\
         Response: {draft}\n\n\
         If you find any potential inaccuracies, generalized claims without proper legal basis, or speculative \
         statements, please correct them. Be particularly careful with specific laws, cases, and procedures. \
         If information seems questionable, qualify it appropriately. Return the corrected response."
    )
}

pub fn summary(text: &str) -> String {
    format!(
        "Summarize this legal information in 2-3 concise paragraphs, focusing on the most important points:\n\n{text}"
    )
}

pub fn numbered_guide(text: &str) -> String {
    format!(
        "Convert this how-to legal information into a concise, numbered list of steps (max 8 steps):\n\n{text}"
    )
}

pub fn concise(text: &str) -> String {
    format!(
        "Rewrite this legal advice in a more concise form (max 150 words), focusing on the most important points:\n\n{text}"
    )
}

pub fn bias(text: &str) -> String {
    format!(
        "Analyze the following legal text for potential biases:\n\n\
         {text}\n\n\
         Please identify any biases related to:\n\
         1. Demographic factors (race, gender, age, socioeconomic status)\n\
         2. Jurisdictional assumptions or preferences\n\
         3. Political or ideological leanings\n\
         4. Language accessibility issues\n\n\
         For each bias identified, provide:\n\
         - A bias score from 1-10 (1 being minimal bias, 10 being highly biased)\n\
         - A specific explanation of the bias\n\
         - A recommendation for how to rewrite the text to reduce this bias\n\n\
         Output your analysis in JSON format with the shape \
         {{\"overall_score\": <1-10>, \"biases\": [{{\"category\": \"...\", \"score\": <1-10>, \
         \"explanation\": \"...\", \"rewrite_suggestion\": \"...\"}}]}}."
    )
}

pub fn hallucination(text: &str, sources: &[String]) -> String {
    let sources = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("SOURCE {}:\n{}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Review the following legal advice for potential hallucinations or factual inaccuracies:\n\n\
         LEGAL ADVICE:\n{text}\n\n\
         SOURCE DOCUMENTS:\n{sources}\n\n\
         Identify any statements in the legal advice that:\n\
         1. Contradict the source documents\n\
         2. Make claims not supported by the source documents\n\
         3. Cite non-existent statutes, cases, or regulations\n\
         4. Misinterpret legal principles from the source documents\n\n\
         For each potential hallucination, provide:\n\
         - The problematic statement\n\
         - The reason it may be a hallucination\n\
         - A suggestion for correction based on the source documents\n\n\
         If no hallucinations are detected, confirm that the advice appears well-grounded in the provided sources.\n\
         Output your analysis in JSON format with the shape \
         {{\"hallucinations_detected\": true|false, \"hallucinations\": [{{\"statement\": \"...\", \
         \"reason\": \"...\", \"correction\": \"...\"}}]}}."
    )
}

pub fn correction(text: &str, flagged_json: &str) -> String {
    format!(
        "Revise the following legal advice to correct identified hallucinations:\n\n\
         ORIGINAL ADVICE:\n{text}\n\n\
         IDENTIFIED HALLUCINATIONS:\n{flagged_json}\n\n\
         Please provide a corrected version that:\n\
         1. Removes or corrects any misleading information\n\
         2. Clearly indicates where information is uncertain or not fully supported\n\
         3. Maintains a helpful tone while being accurate\n\
         4. Adds appropriate disclaimers where needed\n\n\
         OUTPUT THE CORRECTED ADVICE ONLY."
    )
}

/// Append observations gathered by the agent before it gave up.
pub fn with_observations(prompt: String, observations: &[String]) -> String {
    if observations.is_empty() {
        return prompt;
    }
    let mut s = prompt;
    s.push_str("\n\n---\nResearch gathered so far:\n");
    for obs in observations {
        s.push('\n');
        s.push_str(obs);
        s.push('\n');
    }
    s
}
