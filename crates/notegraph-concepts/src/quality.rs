//! Quality filter applied to every extraction result.

use notegraph_core::{defaults, ExtractedConcept, ExtractionConfig};

/// Drop weak, generic, badly sized and duplicate concepts, then cap the list.
///
/// Returns the kept concepts and the overall confidence: their mean, or
/// `FALLBACK_OVERALL_CONFIDENCE` when nothing survives.
pub fn filter_concepts(
    concepts: Vec<ExtractedConcept>,
    config: &ExtractionConfig,
    max_concepts: usize,
) -> (Vec<ExtractedConcept>, f32) {
    let generic: Vec<String> = config
        .generic_terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut kept: Vec<ExtractedConcept> = Vec::new();
    for mut concept in concepts {
        concept.name = concept.name.split_whitespace().collect::<Vec<_>>().join(" ");
        if concept.confidence < config.min_confidence {
            continue;
        }
        let lower = concept.name.to_lowercase();
        if generic.iter().any(|term| lower.contains(term.as_str())) {
            continue;
        }
        let len = concept.name.chars().count();
        if !(defaults::CONCEPT_MIN_CHARS..=defaults::CONCEPT_MAX_CHARS).contains(&len) {
            continue;
        }
        if kept.iter().any(|k| k.name.to_lowercase() == lower) {
            continue;
        }
        kept.push(concept);
    }
    kept.truncate(max_concepts);

    let confidence = if kept.is_empty() {
        defaults::FALLBACK_OVERALL_CONFIDENCE
    } else {
        kept.iter().map(|c| c.confidence).sum::<f32>() / kept.len() as f32
    };
    (kept, confidence)
}
