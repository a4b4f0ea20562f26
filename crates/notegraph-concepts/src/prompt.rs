//! Extraction prompts.
//!
//! The system prompt fixes the output contract (a JSON object with a
//! `concepts` array); the user prompt carries the note itself.

use notegraph_core::{defaults, markdown, ConceptLanguage, ExtractionConfig, ExtractionMode};

/// System prompt for the configured mode and language.
pub fn system_prompt(config: &ExtractionConfig) -> String {
    let style = match config.mode {
        ExtractionMode::Abstract => {
            "Identify the core ideas of the note at the highest level of abstraction the text \
             still supports. Prefer a general, reusable concept (\"Idempotency\") over a \
             specific instance (\"Retrying Kafka consumers\"). Name disciplines, \
             methodologies and frameworks of thought, not proper nouns or technology names: \
             write \"Message Queue\" rather than \"Kafka\", \"Relational Database\" rather \
             than \"PostgreSQL\". When an existing concept expresses the same idea, reuse its \
             exact name instead of inventing a variant."
        }
        ExtractionMode::Literal => {
            "Identify the main topics of the note as concrete noun phrases that appear in or \
             follow directly from the text. Do not generalize beyond what the note says."
        }
    };

    let language = match &config.language {
        ConceptLanguage::Auto => {
            "Write each concept in the dominant language of the note.".to_string()
        }
        ConceptLanguage::Code(code) => format!(
            "Write every concept in the language with code '{}', translating when the note uses another language.",
            code
        ),
    };

    format!(
        r#"You extract concepts from personal knowledge-base notes.

{style}

Rules:
- Each concept is 2 to 30 characters, a short noun phrase without trailing punctuation.
- Skip generic labels such as "summary", "overview", "introduction" or "conclusion".
- {language}
- Give each concept a confidence between 0.0 and 1.0 and a one-sentence reason.

Respond with JSON only, in exactly this shape:
{{"concepts": [{{"name": "<concept>", "confidence": 0.9, "reason": "<why this concept applies>"}}]}}"#
    )
}

/// User prompt for one note.
///
/// The body is truncated to `max_prompt_chars`; at most
/// `MAX_EXISTING_CONCEPTS_IN_PROMPT` existing names are offered for reuse.
pub fn user_prompt(
    title: Option<&str>,
    body: &str,
    existing_concepts: &[String],
    max_concepts: usize,
    config: &ExtractionConfig,
) -> String {
    let body = markdown::truncate_chars(body.trim(), config.max_prompt_chars);

    let title_line = match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => format!("Title: {}\n\n", t),
        None => String::new(),
    };

    let existing = if existing_concepts.is_empty() {
        String::new()
    } else {
        let listed: Vec<&str> = existing_concepts
            .iter()
            .take(defaults::MAX_EXISTING_CONCEPTS_IN_PROMPT)
            .map(String::as_str)
            .collect();
        format!(
            "Existing concepts (reuse these names when they fit):\n{}\n\n",
            listed.join(", ")
        )
    };

    format!(
        r#"{existing}Extract at most {max_concepts} concepts from this note.

{title_line}Note:
{body}"#
    )
}
