//! Centralized default constants for notegraph.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration structs and backends reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// NOTE TYPE DETECTION
// =============================================================================

/// Minimum stripped-text length (chars) before a note is worth extracting.
pub const MIN_TEXT_LENGTH: usize = 100;

/// Maximum tolerated image ratio before a note counts as an image collection.
pub const MAX_IMAGE_RATIO: f32 = 0.5;

/// Image embeds at or below this count never trigger the image-collection rule.
pub const IMAGE_COUNT_THRESHOLD: usize = 5;

/// Weight applied to each embedded image when computing the image ratio.
pub const IMAGE_WEIGHT_CHARS: usize = 50;

/// Line count above which the flat-list heuristic applies.
pub const FLAT_LIST_MIN_LINES: usize = 20;

/// Average line length (chars) below which a long note reads as a flat list.
pub const FLAT_LIST_MAX_AVG_LINE_LEN: f32 = 30.0;

// =============================================================================
// CONCEPT EXTRACTION
// =============================================================================

/// Default number of concepts requested per note.
pub const MAX_CONCEPTS: usize = 5;

/// Default minimum per-concept confidence kept by the quality filter.
pub const MIN_CONCEPT_CONFIDENCE: f32 = 0.6;

/// Overall confidence reported when no concept survives filtering.
pub const FALLBACK_OVERALL_CONFIDENCE: f32 = 0.6;

/// Confidence assigned to AI concepts that omit one.
pub const DEFAULT_CONCEPT_CONFIDENCE: f32 = 0.7;

/// Shortest accepted concept name (chars).
pub const CONCEPT_MIN_CHARS: usize = 2;

/// Longest accepted concept name (chars).
pub const CONCEPT_MAX_CHARS: usize = 30;

/// Maximum note characters placed into an extraction prompt.
pub const MAX_PROMPT_CHARS: usize = 6000;

/// Substrings that mark a concept as too generic to keep.
pub const GENERIC_CONCEPT_TERMS: &[&str] = &[
    "summary",
    "overview",
    "introduction",
    "conclusion",
    "概述",
    "总结",
];

/// Rule-based confidence for the note title.
pub const RULE_TITLE_CONFIDENCE: f32 = 0.85;

/// Rule-based confidence for headings.
pub const RULE_HEADING_CONFIDENCE: f32 = 0.8;

/// Rule-based confidence for existing wikilinks.
pub const RULE_WIKILINK_CONFIDENCE: f32 = 0.8;

/// Rule-based confidence for hashtags.
pub const RULE_HASHTAG_CONFIDENCE: f32 = 0.75;

/// Rule-based confidence for bold spans.
pub const RULE_BOLD_CONFIDENCE: f32 = 0.7;

// =============================================================================
// CONCEPT REGISTRY
// =============================================================================

/// Concept-name-only similarity required for a strict registry match.
pub const STRICT_MATCH_THRESHOLD: f32 = 0.90;

/// Fused name+reason similarity required for a loose registry match.
pub const SIMILARITY_THRESHOLD: f32 = 0.85;

/// Folder prefix used in minted concept links (`[[prefix/name]]`).
pub const CONCEPT_LINK_PREFIX: &str = "concepts";

/// Page size used when scrolling the whole registry.
pub const REGISTRY_SCROLL_PAGE: usize = 100;

// =============================================================================
// DICTIONARY MATCHING
// =============================================================================

/// Confidence reported for a term equal to a dictionary concept.
pub const MATCH_EXACT_CONFIDENCE: f32 = 1.0;

/// Confidence reported for a term equal to a dictionary alias.
pub const MATCH_ALIAS_CONFIDENCE: f32 = 0.9;

/// Existing concept names offered to the model per extraction prompt.
pub const MAX_EXISTING_CONCEPTS_IN_PROMPT: usize = 200;

// =============================================================================
// ASSOCIATIONS
// =============================================================================

/// Default minimum number of shared concepts for an association.
pub const MIN_SHARED_CONCEPTS: usize = 1;

/// Default minimum association confidence.
pub const MIN_ASSOCIATION_CONFIDENCE: f32 = 0.5;

/// Default cap on returned associations.
pub const MAX_ASSOCIATIONS: usize = 100;

/// Shared-concept count divisor for the association size bonus.
pub const SIZE_BONUS_DIVISOR: f32 = 5.0;

/// Upper bound of the association size bonus.
pub const SIZE_BONUS_CAP: f32 = 0.2;

/// Confidence given to concepts re-indexed from note metadata, which does
/// not record per-concept confidence.
pub const METADATA_CONCEPT_CONFIDENCE: f32 = 0.7;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Abort window for a concept-extraction LLM call in seconds.
pub const LLM_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// STORAGE
// =============================================================================

/// Folder (relative to the vault root) for generated concept pages.
pub const CONCEPT_PAGE_DIR: &str = "concepts";

/// Key under which preference state is stored in key/value backends.
pub const PREFERENCES_KEY: &str = "association_preferences";

/// PostgreSQL pool size. Notes are registered one at a time.
pub const DB_MAX_CONNECTIONS: u32 = 4;

/// Seconds to wait for a PostgreSQL connection before reporting the
/// concept store unavailable.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 10;
