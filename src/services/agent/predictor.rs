//! Cluster Predictor
//!
//! question -> keyword extraction -> embedding -> nearest-centroid lookup.
//! Extracting keywords first narrows the embedding to request-relevant terms
//! instead of the whole question, which improves centroid locality.

use std::sync::Arc;

use super::llm::LanguageModel;
use super::models::{AgentError, ClusterPrediction};
use crate::services::embedding_index::EmbeddingIndex;

pub struct ClusterPredictor {
    llm: Arc<dyn LanguageModel>,
    index: Arc<EmbeddingIndex>,
}

impl ClusterPredictor {
    pub fn new(llm: Arc<dyn LanguageModel>, index: Arc<EmbeddingIndex>) -> Self {
        Self { llm, index }
    }

    pub async fn predict(&self, question: &str) -> Result<ClusterPrediction, AgentError> {
        // Keyword extraction failure falls back to embedding the raw question
        let text = match self.llm.generate_search_keywords(question).await {
            Ok(keywords) if !keywords.trim().is_empty() => keywords,
            Ok(_) => question.to_string(),
            Err(e) => {
                tracing::warn!("keyword extraction failed, embedding raw question: {}", e);
                question.to_string()
            },
        };

        let embedding = self.llm.embed(&text).await?;
        let (parent_id, child_id, confidence) = self.index.predict(&embedding)?;

        tracing::debug!(
            "cluster prediction for '{}': parent {}, child {} ({:.3})",
            text,
            parent_id,
            child_id,
            confidence
        );

        Ok(ClusterPrediction { parent_id, child_id, confidence })
    }
}
