//! Planner
//!
//! Stage-1 reasoner: chooses 1-3 data products from the catalog given a
//! question and a short sample of the underlying data. Selection is
//! post-validated against the catalog; there is no default fallback: if
//! the model cannot plan, the caller is told.

use serde::Deserialize;
use std::sync::Arc;

use super::llm::LanguageModel;
use super::models::{AgentError, Plan, PlanEntry, MAX_PLAN_PRODUCTS};
use super::prompts;
use crate::services::catalog::Catalog;

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    products: Vec<PlannerChoice>,
}

#[derive(Debug, Deserialize)]
struct PlannerChoice {
    product_id: String,
    #[serde(default)]
    reason: String,
}

pub struct Planner {
    llm: Arc<dyn LanguageModel>,
    catalog: Arc<Catalog>,
    /// Short preview of a canonical artifact used to ground the model
    sample_context: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LanguageModel>, catalog: Arc<Catalog>, sample_context: String) -> Self {
        Self { llm, catalog, sample_context }
    }

    pub async fn plan(&self, question: &str) -> Result<Plan, AgentError> {
        let prompt = prompts::build_planner_prompt(
            &self.catalog.describe_for_planner(),
            &self.sample_context,
            question,
        );
        let value = self.llm.generate_json(&prompt, prompts::PLANNER_SCHEMA_HINT).await?;
        let output: PlannerOutput = serde_json::from_value(value)
            .map_err(|e| AgentError::LlmParse(format!("planner output: {}", e)))?;

        let mut entries = Vec::new();
        for choice in output.products {
            if !self.catalog.contains(&choice.product_id) {
                tracing::warn!("planner selected unknown product {}, dropping", choice.product_id);
                continue;
            }
            entries.push(PlanEntry { product_id: choice.product_id, reason: choice.reason });
            if entries.len() == MAX_PLAN_PRODUCTS {
                break;
            }
        }

        if entries.is_empty() {
            return Err(AgentError::PlanningFailed);
        }

        Ok(Plan { entries })
    }
}
