//! Instruction builders and response parsing.

use once_cell::sync::Lazy;
use regex::Regex;

use super::client::Categorization;
use super::AIError;
use crate::core::{DocFormat, DocTypeProfile};
use crate::ingest::SourceContent;

pub(crate) const SYSTEM_ENHANCE: &str = "You are an editor preparing raw notes as source \
material for documentation. Fix grammar, expand abbreviations, group related points and keep \
every fact. Do not invent features or details.";

pub(crate) const SYSTEM_CLEANUP: &str = "You are a meticulous copy editor. Tidy the given \
document: fix spelling, grammar, inconsistent formatting and broken markup. Preserve meaning, \
structure and all content.";

pub(crate) const SYSTEM_CATEGORIZE: &str = "You analyse release material. Decide whether it \
describes more than one distinct feature. If it does, reorganise it so each feature has its \
own clearly headed section, keeping every detail.";

pub(crate) const SYSTEM_QUESTIONS: &str = "You help technical writers prepare documentation. \
Identify the most important gaps in the source material that would prevent writing accurate \
documents, and ask short, specific questions to fill them.";

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```$").unwrap());
static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•]|Q\d*[:.])\s*").unwrap());

fn output_rules(format: DocFormat) -> &'static str {
    match format {
        DocFormat::Html => {
            "Output raw HTML body markup only: no <html>, <head> or <body> tags, \
             no preamble, no explanation and no Markdown code fences."
        }
        DocFormat::Markdown => {
            "Output Markdown only: no preamble, no explanation and no surrounding code fences."
        }
        DocFormat::Text => "Output plain text only: no markup, no preamble and no explanation.",
    }
}

/// User instruction for drafting one document.
pub(crate) fn generate_instruction(profile: &DocTypeProfile, source: &SourceContent) -> String {
    format!(
        "Create a {label} ({description}) from the source material below.\n\n\
         {rules}\n\n\
         SOURCE MATERIAL:\n{source}",
        label = profile.label,
        description = profile.description,
        rules = output_rules(profile.format),
        source = source.as_str()
    )
}

pub(crate) fn enhance_instruction(raw: &str) -> String {
    format!(
        "Improve the following notes so they can be used as documentation source material.\n\n\
         {}\n\nNOTES:\n{}",
        output_rules(DocFormat::Text),
        raw
    )
}

pub(crate) fn cleanup_instruction(html: &str) -> String {
    format!("Clean up this document.\n\n{}\n\nDOCUMENT:\n{}", output_rules(DocFormat::Html), html)
}

pub(crate) fn categorize_instruction(source: &SourceContent) -> String {
    format!(
        "Analyse the source material below. Respond with a JSON object only, shaped as\n\
         {{\"hasMultipleFeatures\": boolean, \"organizedContent\": string}}.\n\
         When there is a single feature, set organizedContent to an empty string.\n\n\
         SOURCE MATERIAL:\n{}",
        source.as_str()
    )
}

pub(crate) fn questions_instruction(
    source: &SourceContent,
    labels: &[&str],
    max_questions: usize,
) -> String {
    format!(
        "The user wants to produce: {}.\n\
         Ask at most {} clarifying questions that would most improve these documents. \
         Respond with a JSON array of question strings only. \
         Respond with [] if the material is already sufficient.\n\n\
         SOURCE MATERIAL:\n{}",
        labels.join(", "),
        max_questions,
        source.as_str()
    )
}

/// Remove a Markdown code fence wrapped around an entire response.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    match FENCE_RE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Parse a categorization response.
pub fn parse_categorization(text: &str) -> Result<Categorization, AIError> {
    let text = strip_code_fences(text);
    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(AIError::InvalidResponse("expected a JSON object".to_string())),
    };

    serde_json::from_str(json).map_err(|e| AIError::InvalidResponse(e.to_string()))
}

/// Parse clarifying questions from a JSON array or a numbered/bulleted list.
pub fn parse_questions(text: &str, max_questions: usize) -> Vec<String> {
    let text = strip_code_fences(text);

    let parsed: Vec<String> = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Array(items)) => {
            items.iter().filter_map(|v| v.as_str().map(String::from)).collect()
        }
        Ok(serde_json::Value::Object(map)) => map
            .get("questions")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default(),
        _ => text.lines().filter_map(list_question).collect(),
    };

    let mut questions: Vec<String> = Vec::new();
    for question in parsed.into_iter().map(|q| q.trim().to_string()) {
        if !question.is_empty() && !questions.contains(&question) {
            questions.push(question);
        }
    }
    questions.truncate(max_questions);
    questions
}

/// A list line counts as a question when it carries a list marker or ends in `?`.
fn list_question(line: &str) -> Option<String> {
    let stripped = LIST_MARKER_RE.replace(line, "");
    let has_marker = stripped.len() != line.len();
    (has_marker || line.trim_end().ends_with('?')).then(|| stripped.into_owned())
}
