//! Structured logging schema and field name constants for notegraph.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Backend unreachable, batch aborted |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, batch completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (per concept, per pair) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "concepts", "graph", "jobs", "inference", "db", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "detector", "extractor", "registry", "engine", "overlay", "ollama"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "extract", "register_or_match", "discover", "sync_all"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Note identifier (vault-relative path) being operated on.
pub const NOTE_ID: &str = "note_id";

/// Concept name being operated on.
pub const CONCEPT: &str = "concept";

/// Canonical pair key of an association.
pub const PAIR_KEY: &str = "pair_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of concepts produced or processed.
pub const CONCEPT_COUNT: &str = "concept_count";

/// Number of associations produced.
pub const ASSOCIATION_COUNT: &str = "association_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

/// Similarity score of a registry hit.
pub const SIMILARITY: &str = "similarity";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Which response-recovery tier produced the concepts ("strict", "repaired", "fragments").
pub const PARSE_TIER: &str = "parse_tier";

/// Where concepts came from ("ai", "rule_based", "skipped").
pub const SOURCE: &str = "source";

/// Error message attached to a failure event.
pub const ERROR: &str = "error";
