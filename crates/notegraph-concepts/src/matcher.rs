//! Dictionary matching of extracted terms.
//!
//! Used when no vector registry is configured. Terms are compared after
//! normalization: an equal concept name is an exact match, an equal alias is
//! an alias match, anything else is new.

use notegraph_core::{defaults, ConceptDictionary, ConceptMatch, ExtractedConcept, MatchType};

/// Lowercase, treat `-` and `_` as spaces, and collapse whitespace.
pub fn normalize_term(term: &str) -> String {
    term.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves extracted terms against a [`ConceptDictionary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConceptMatcher;

impl ConceptMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn match_concept(
        &self,
        dictionary: &ConceptDictionary,
        concept: &ExtractedConcept,
    ) -> ConceptMatch {
        let key = normalize_term(&concept.name);

        if let Some((name, _)) = dictionary.iter().find(|(name, _)| normalize_term(name) == key) {
            return ConceptMatch {
                original_term: concept.name.clone(),
                matched_concept: name.clone(),
                match_type: MatchType::Exact,
                confidence: defaults::MATCH_EXACT_CONFIDENCE,
            };
        }

        if let Some((name, _)) = dictionary
            .iter()
            .find(|(_, entry)| entry.aliases.iter().any(|a| normalize_term(a) == key))
        {
            return ConceptMatch {
                original_term: concept.name.clone(),
                matched_concept: name.clone(),
                match_type: MatchType::Alias,
                confidence: defaults::MATCH_ALIAS_CONFIDENCE,
            };
        }

        ConceptMatch {
            original_term: concept.name.clone(),
            matched_concept: concept.name.trim().to_string(),
            match_type: MatchType::New,
            confidence: concept.confidence,
        }
    }

    pub fn match_concepts(
        &self,
        dictionary: &ConceptDictionary,
        concepts: &[ExtractedConcept],
    ) -> Vec<ConceptMatch> {
        concepts
            .iter()
            .map(|c| self.match_concept(dictionary, c))
            .collect()
    }
}
