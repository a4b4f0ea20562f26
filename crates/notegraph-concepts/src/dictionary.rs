//! Alias dictionary maintenance.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use notegraph_core::{ConceptDictionary, ConceptMatch};

use crate::matcher::normalize_term;

/// Fold one note's matches into the dictionary.
///
/// Each matched concept counts once for the note however many terms resolved
/// to it. Concepts in `already_counted` (the note's previously stored
/// concepts) only gain aliases, so re-syncing a note leaves `note_count`
/// unchanged. Terms that differ from the canonical name become aliases.
pub fn record_matches(
    dictionary: &mut ConceptDictionary,
    matches: &[ConceptMatch],
    already_counted: &[String],
    now: DateTime<Utc>,
) {
    let mut per_concept: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for m in matches {
        let aliases = per_concept.entry(m.matched_concept.as_str()).or_default();
        if normalize_term(&m.original_term) != normalize_term(&m.matched_concept) {
            aliases.push(m.original_term.trim().to_string());
        }
    }
    for (concept, aliases) in per_concept {
        if already_counted.iter().any(|c| c == concept) {
            dictionary.merge_aliases(concept, &aliases, now);
        } else {
            dictionary.record(concept, &aliases, now);
        }
    }
}
