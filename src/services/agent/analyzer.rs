//! Analyzer
//!
//! Stage-2 reasoner: synthesizes a structured answer from the summaries of
//! the fetched products. Summaries are concatenated with section markers and
//! bounded by the configured input budget. Full artifacts are never sent.

use std::sync::Arc;

use super::llm::LanguageModel;
use super::models::{AccessLog, AgentError, AnalysisResult};
use super::prompts;
use crate::services::artifact_store::Summary;

pub struct Analyzer {
    llm: Arc<dyn LanguageModel>,
    input_budget_chars: usize,
}

impl Analyzer {
    pub fn new(llm: Arc<dyn LanguageModel>, input_budget_chars: usize) -> Self {
        Self { llm, input_budget_chars }
    }

    pub async fn analyze(
        &self,
        question: &str,
        access_log: &AccessLog,
        summaries: &[Arc<Summary>],
    ) -> Result<AnalysisResult, AgentError> {
        let mut sections = describe_access_log(access_log);
        sections.push_str(&build_sections(summaries, self.input_budget_chars));
        let prompt = prompts::build_analyzer_prompt(question, &sections);
        let value = self.llm.generate_json(&prompt, prompts::ANALYZER_SCHEMA_HINT).await?;

        let result: AnalysisResult = serde_json::from_value(value)
            .map_err(|e| AgentError::LlmParse(format!("analyzer output: {}", e)))?;

        if result.answer.trim().is_empty() {
            return Err(AgentError::LlmParse("analyzer returned an empty answer".to_string()));
        }
        if result.rationale.is_empty() {
            return Err(AgentError::LlmParse("analyzer returned no rationale".to_string()));
        }

        Ok(result)
    }
}

fn describe_access_log(access_log: &AccessLog) -> String {
    if access_log.entries.is_empty() {
        return String::new();
    }
    let mut out = String::from("Products consulted:\n");
    for entry in &access_log.entries {
        out.push_str("- ");
        out.push_str(&entry.product_id);
        if let Some((rows, cols)) = entry.shape {
            out.push_str(&format!(" ({} rows x {} columns)", rows, cols));
        }
        out.push_str(if entry.used_summary { " [summary]" } else { " [full]" });
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Concatenate summaries with clear section markers, bounded by `budget`
/// characters. The store's own preview truncation keeps the "(of N total)"
/// marker; this bound is the last line of defense for the prompt size.
fn build_sections(summaries: &[Arc<Summary>], budget: usize) -> String {
    let mut out = String::new();
    for summary in summaries {
        let marker = format!("=== {} ===\n", summary.product_id);
        if out.len() + marker.len() >= budget {
            break;
        }
        out.push_str(&marker);

        let remaining = budget - out.len();
        if summary.text.len() <= remaining {
            out.push_str(&summary.text);
        } else {
            let mut cut = remaining;
            while cut > 0 && !summary.text.is_char_boundary(cut) {
                cut -= 1;
            }
            out.push_str(&summary.text[..cut]);
            break;
        }
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(id: &str, text: &str) -> Arc<Summary> {
        Arc::new(Summary {
            product_id: id.to_string(),
            generated_at: Utc::now(),
            text: text.to_string(),
            shape: None,
            used_precomputed: false,
        })
    }

    #[test]
    fn sections_carry_markers_in_order() {
        let sections =
            build_sections(&[summary("a", "alpha\n"), summary("b", "beta\n")], 10_000);
        let a_pos = sections.find("=== a ===").unwrap();
        let b_pos = sections.find("=== b ===").unwrap();
        assert!(a_pos < b_pos);
        assert!(sections.contains("alpha"));
        assert!(sections.contains("beta"));
    }

    #[test]
    fn sections_respect_budget() {
        let long = "x".repeat(500);
        let sections = build_sections(&[summary("a", &long), summary("b", &long)], 120);
        assert!(sections.len() <= 120);
        assert!(sections.contains("=== a ==="));
        assert!(!sections.contains("=== b ==="));
    }

    #[test]
    fn budget_cut_respects_char_boundaries() {
        let text = "répétition ".repeat(50);
        let sections = build_sections(&[summary("a", &text)], 64);
        assert!(sections.len() <= 64);
        // would panic above if sliced mid-codepoint
    }
}
