//! Rule-based concept extraction, used when the LLM is unavailable.

use once_cell::sync::Lazy;
use regex::Regex;

use notegraph_core::{defaults, markdown, ExtractedConcept};

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").unwrap());
static BOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+)\*\*|__([^_\n]+)__").unwrap());

const EDGE_PUNCTUATION: &[char] = &[
    '*', '_', '#', ':', ',', '.', ';', '!', '?', '(', ')', '[', ']', '"', '\'', '`', '-',
    '。', '，', '、', '；', '：', '！', '？', '（', '）', '【', '】', '「', '」',
];

/// Tidy a candidate concept: trim edge punctuation and collapse whitespace.
/// Returns `None` when nothing is left.
pub fn normalize_concept(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| EDGE_PUNCTUATION.contains(&c) || c.is_whitespace());
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Heuristic concepts from the title, headings, wikilinks, hashtags and bold
/// spans, highest confidence first.
///
/// Duplicates (case-insensitive) keep their highest confidence.
pub fn rule_based_concepts(content: &str, title: Option<&str>) -> Vec<ExtractedConcept> {
    let body = markdown::strip_code(markdown::strip_frontmatter(content));
    let mut found: Vec<ExtractedConcept> = Vec::new();

    if let Some(title) = title {
        push(&mut found, title, defaults::RULE_TITLE_CONFIDENCE, "note title");
    }
    for caps in HEADING_RE.captures_iter(&body) {
        push(&mut found, &caps[1], defaults::RULE_HEADING_CONFIDENCE, "heading");
    }
    for link in markdown::extract_wikilinks(&body) {
        let target = link.rsplit('/').next().unwrap_or(&link);
        push(&mut found, target, defaults::RULE_WIKILINK_CONFIDENCE, "linked note");
    }
    for tag in markdown::extract_inline_hashtags(&body) {
        let leaf = tag.rsplit('/').next().unwrap_or(&tag);
        let words = leaf.replace(['-', '_'], " ");
        push(&mut found, &words, defaults::RULE_HASHTAG_CONFIDENCE, "hashtag");
    }
    for caps in BOLD_RE.captures_iter(&body) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            push(&mut found, m.as_str(), defaults::RULE_BOLD_CONFIDENCE, "emphasized term");
        }
    }

    found.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    found
}

fn push(found: &mut Vec<ExtractedConcept>, raw: &str, confidence: f32, reason: &str) {
    let Some(name) = normalize_concept(raw) else {
        return;
    };
    let key = name.to_lowercase();
    match found.iter_mut().find(|c| c.name.to_lowercase() == key) {
        Some(existing) => {
            if confidence > existing.confidence {
                existing.confidence = confidence;
                existing.reason = reason.to_string();
            }
        }
        None => found.push(ExtractedConcept::new(name, confidence, reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_concept() {
        assert_eq!(normalize_concept("  **Event   Sourcing:** "), Some("Event Sourcing".to_string()));
        assert_eq!(normalize_concept("「幂等性」。"), Some("幂等性".to_string()));
        assert_eq!(normalize_concept(" ** "), None);
    }

    #[test]
    fn test_sources_and_confidences() {
        let content = "---\ntags: [x]\n---\n# Message Delivery\n\nConsumers must be **idempotent** and \
                       see [[notes/Exactly Once]] semantics. #distributed-systems\n";
        let concepts = rule_based_concepts(content, Some("Kafka Notes"));
        let get = |name: &str| concepts.iter().find(|c| c.name == name).map(|c| c.confidence);

        assert_eq!(get("Kafka Notes"), Some(defaults::RULE_TITLE_CONFIDENCE));
        assert_eq!(get("Message Delivery"), Some(defaults::RULE_HEADING_CONFIDENCE));
        assert_eq!(get("Exactly Once"), Some(defaults::RULE_WIKILINK_CONFIDENCE));
        assert_eq!(get("distributed systems"), Some(defaults::RULE_HASHTAG_CONFIDENCE));
        assert_eq!(get("idempotent"), Some(defaults::RULE_BOLD_CONFIDENCE));
        assert_eq!(concepts[0].name, "Kafka Notes");
    }

    #[test]
    fn test_duplicates_keep_highest_confidence() {
        let content = "## Idempotency\n\nWhy **idempotency** matters.";
        let concepts = rule_based_concepts(content, None);
        let matching: Vec<_> = concepts
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case("idempotency"))
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].confidence, defaults::RULE_HEADING_CONFIDENCE);
    }

    #[test]
    fn test_code_blocks_ignored() {
        let content = "```\n# not a heading\n**nor bold**\n```\nplain text";
        assert!(rule_based_concepts(content, None).is_empty());
    }

    #[test]
    fn test_sorted_by_confidence_descending() {
        let content = "**bold term**\n\n# Heading Term\n";
        let concepts = rule_based_concepts(content, None);
        assert!(concepts
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
    }
}
