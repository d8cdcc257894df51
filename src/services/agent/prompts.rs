//! Prompt Templates
//!
//! Static prompt foundations plus dynamic builders for the planner, the
//! analyzer, the keyword extractor, the chat persona, and the cluster
//! discussion text.

/// Assistant persona used by chat mode and the analytics-visit discussion
pub const PERSONA_BASE: &str = "\
You are Meridian, the analytics assistant for a municipal service-request \
dashboard. You help city staff understand request volumes, backlogs, and \
neighbourhood patterns. Answer in a friendly, concise tone. When a question \
needs numbers you do not have, say so instead of guessing.";

const PLANNER_BASE: &str = "\
You are the planning stage of an analytics assistant. You are given a \
catalog of pre-computed data products and a user question. Select the 1 to 3 \
products most likely to answer the question.

Rules:
- Select ONLY ids that appear in the catalog below.
- Give a one-sentence reason per choice.
- Order choices from most to least relevant.";

pub const PLANNER_SCHEMA_HINT: &str = "\
Respond with a JSON object of the shape \
{\"products\": [{\"product_id\": \"<id>\", \"reason\": \"<one sentence>\"}]}.";

const ANALYZER_BASE: &str = "\
You are the analysis stage of an analytics assistant. You are given a user \
question and summaries of the data products that were fetched for it.

Rules:
- Ground every claim in the data below; cite concrete numbers.
- Do not invent products, columns, or values that are not present.
- answer: exactly one concise sentence.
- rationale: 3 to 7 bullets, each referencing a number from the data.
- key_metrics: short metric strings; may be empty.";

pub const ANALYZER_SCHEMA_HINT: &str = "\
Respond with a JSON object of the shape \
{\"answer\": \"<sentence>\", \"rationale\": [\"<bullet>\"], \
\"key_metrics\": [\"<metric>\"]}.";

pub fn build_planner_prompt(catalog_description: &str, sample_context: &str, question: &str) -> String {
    let mut prompt = String::from(PLANNER_BASE);
    prompt.push_str("\n\n## Catalog\n");
    prompt.push_str(catalog_description);
    if !sample_context.is_empty() {
        prompt.push_str("\n## Sample of the underlying data\n");
        prompt.push_str(sample_context);
        prompt.push('\n');
    }
    prompt.push_str("\n## Question\n");
    prompt.push_str(question);
    prompt
}

pub fn build_analyzer_prompt(question: &str, sections: &str) -> String {
    let mut prompt = String::from(ANALYZER_BASE);
    prompt.push_str("\n\n## Question\n");
    prompt.push_str(question);
    prompt.push_str("\n\n## Data\n");
    prompt.push_str(sections);
    prompt
}

pub fn build_keyword_prompt(question: &str) -> String {
    format!(
        "Extract the 3-6 most search-relevant keywords from the question \
         below. Reply with a single comma-separated line, no explanations.\n\n\
         Question: {}",
        question
    )
}

pub fn build_chat_prompt(message: &str) -> String {
    format!("{}\n\nUser: {}", PERSONA_BASE, message)
}

pub fn build_discussion_prompt(parent_label: &str, child_label: &str) -> String {
    format!(
        "{}\n\nThe user is looking at the \"{}\" request cluster, specifically \
         the \"{}\" sub-cluster. In 2-3 sentences, describe what this cluster \
         covers and what the dashboard page for it shows. The text will be \
         read aloud and shown as subtitles.",
        PERSONA_BASE, parent_label, child_label
    )
}
