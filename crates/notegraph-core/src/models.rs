//! Core data models for notegraph.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dense embedding vector.
pub type Vector = Vec<f32>;

/// Separator used in canonical pair keys.
pub const PAIR_KEY_SEPARATOR: char = '|';

/// Deterministic key for an unordered note pair: `min(id) + "|" + max(id)`.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}{PAIR_KEY_SEPARATOR}{b}")
    } else {
        format!("{b}{PAIR_KEY_SEPARATOR}{a}")
    }
}

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Classification of a note for extraction gating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteType {
    /// Regular prose note.
    #[default]
    Normal,
    /// Lives under a template path.
    Template,
    /// Vocabulary list or flat enumeration.
    Vocabulary,
    /// Mostly embedded images.
    ImageCollection,
}

impl std::fmt::Display for NoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Template => write!(f, "template"),
            Self::Vocabulary => write!(f, "vocabulary"),
            Self::ImageCollection => write!(f, "image-collection"),
        }
    }
}

impl std::str::FromStr for NoteType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "template" => Ok(Self::Template),
            "vocabulary" => Ok(Self::Vocabulary),
            "image-collection" | "image_collection" => Ok(Self::ImageCollection),
            _ => Err(format!("Invalid note type: {}", s)),
        }
    }
}

/// Input to note type detection.
#[derive(Debug, Clone, Default)]
pub struct NoteInput {
    /// Vault-relative path.
    pub path: String,
    /// Raw markdown content, frontmatter included.
    pub content: String,
    /// Tags from frontmatter and inline hashtags.
    pub tags: Vec<String>,
}

/// Outcome of note type detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub should_skip: bool,
    pub note_type: NoteType,
    /// Human-readable reason, logged and surfaced to the caller.
    pub reason: String,
}

impl DetectionResult {
    /// A detection result that skips extraction.
    pub fn skip(note_type: NoteType, reason: impl Into<String>) -> Self {
        Self {
            should_skip: true,
            note_type,
            reason: reason.into(),
        }
    }

    /// A detection result that lets extraction proceed.
    pub fn keep(reason: impl Into<String>) -> Self {
        Self {
            should_skip: false,
            note_type: NoteType::Normal,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// A concept produced by the extractor, before registry resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedConcept {
    pub name: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    #[serde(default)]
    pub reason: String,
}

impl ExtractedConcept {
    pub fn new(name: impl Into<String>, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Where an extraction result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Parsed from an LLM response.
    Ai,
    /// Heuristic fallback (headings, bold, wikilinks, hashtags, title).
    RuleBased,
    /// Detector skipped the note.
    Skipped,
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ai => write!(f, "ai"),
            Self::RuleBased => write!(f, "rule_based"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-call extraction options.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOptions {
    /// Concept names already in use, offered to the model for reuse.
    pub existing_concepts: Vec<String>,
    /// Overrides the configured concept cap for this call.
    pub max_concepts: Option<usize>,
    /// Note path for skip-rule evaluation. Falls back to the title.
    pub path: Option<String>,
    /// Note tags for skip-rule evaluation.
    pub tags: Vec<String>,
}

/// Result of extracting concepts from one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub concepts: Vec<ExtractedConcept>,
    pub note_type: NoteType,
    pub skip_reason: Option<String>,
    /// Mean confidence of kept concepts, or the fallback constant when none survive.
    pub confidence: f32,
    pub source: ExtractionSource,
}

impl ExtractionOutcome {
    pub fn skipped(detection: DetectionResult) -> Self {
        Self {
            concepts: Vec::new(),
            note_type: detection.note_type,
            skip_reason: Some(detection.reason),
            confidence: 0.0,
            source: ExtractionSource::Skipped,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.source == ExtractionSource::Skipped
    }
}

// =============================================================================
// MATCHING
// =============================================================================

/// How an extracted term resolved against the dictionary or registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Alias,
    New,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Alias => write!(f, "alias"),
            Self::New => write!(f, "new"),
        }
    }
}

/// Resolution of one extracted concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMatch {
    pub original_term: String,
    pub matched_concept: String,
    pub match_type: MatchType,
    pub confidence: f32,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// A registry entry, one per semantically distinct concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: Uuid,
    pub concept: String,
    pub summary: String,
    /// Cross-reference link, e.g. `[[concepts/Idempotency]]`.
    pub link: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registry search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredConcept {
    pub record: ConceptRecord,
    /// Cosine similarity in [-1, 1]; higher is closer.
    pub score: f32,
}

/// Options for similarity searches against the concept store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub limit: usize,
    /// Hits scoring below this are discarded by the store.
    pub threshold: f32,
}

/// A new registry record with both vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConcept {
    pub concept: String,
    pub summary: String,
    pub link: String,
    pub concept_vector: Vector,
    pub summary_vector: Vector,
}

/// Paging request for scrolling the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub limit: usize,
    pub offset: usize,
}

/// One page of registry records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConceptPage {
    pub records: Vec<ConceptRecord>,
    /// Offset of the next page, `None` once exhausted.
    pub next_offset: Option<usize>,
}

/// Which registry tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryMatchKind {
    /// Concept-name vector alone cleared the strict threshold.
    Strict,
    /// Fused name+reason similarity cleared the loose threshold.
    Loose,
    /// Nothing matched; a record was minted.
    New,
}

/// Result of `ConceptRegistry::register_or_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryMatch {
    pub matched: bool,
    /// Canonical concept name (the existing one on a match).
    pub concept: String,
    pub summary: String,
    pub link: String,
    pub similarity: f32,
    pub is_new: bool,
    pub kind: RegistryMatchKind,
}

// =============================================================================
// DICTIONARY
// =============================================================================

/// Lightweight alias-dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryEntry {
    #[serde(default)]
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub note_count: u64,
}

/// Concept name → dictionary entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptDictionary {
    entries: BTreeMap<String, DictionaryEntry>,
}

impl ConceptDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, concept: &str) -> Option<&DictionaryEntry> {
        self.entries.get(concept)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DictionaryEntry)> {
        self.entries.iter()
    }

    /// Concept names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Record one note's use of `concept`.
    ///
    /// A new concept gets `note_count = 1`; an existing one is incremented and
    /// its aliases merged (case-insensitively, never aliasing itself).
    pub fn record(&mut self, concept: &str, aliases: &[String], now: DateTime<Utc>) {
        self.merge_aliases(concept, aliases, now).note_count += 1;
    }

    /// Merge aliases into `concept`, creating it with `note_count = 0` when
    /// absent. Used when the note was already counted on an earlier sync.
    pub fn merge_aliases(
        &mut self,
        concept: &str,
        aliases: &[String],
        now: DateTime<Utc>,
    ) -> &mut DictionaryEntry {
        let entry = self
            .entries
            .entry(concept.to_string())
            .or_insert_with(|| DictionaryEntry {
                aliases: Vec::new(),
                created_at: now,
                note_count: 0,
            });
        for alias in aliases {
            let alias = alias.trim();
            if alias.is_empty() || alias.eq_ignore_ascii_case(concept) {
                continue;
            }
            if !entry
                .aliases
                .iter()
                .any(|a| a.to_lowercase() == alias.to_lowercase())
            {
                entry.aliases.push(alias.to_string());
            }
        }
        entry
    }
}

// =============================================================================
// NOTE STORAGE
// =============================================================================

/// Plain content of a stored note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteContent {
    pub id: String,
    pub title: String,
    /// Full markdown text, frontmatter included.
    pub text: String,
    pub tags: Vec<String>,
}

/// Structured metadata the pipeline writes back to a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMetadata {
    pub concepts: Vec<String>,
    pub indexed_at: DateTime<Utc>,
}

// =============================================================================
// ASSOCIATIONS
// =============================================================================

/// Undirected association between two notes evidenced by shared concepts.
///
/// `source_note_id <= target_note_id` always holds, so the pair has one
/// canonical orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAssociation {
    pub source_note_id: String,
    pub target_note_id: String,
    pub shared_concepts: Vec<String>,
    pub confidence: f32,
    pub discovered_at: DateTime<Utc>,
}

impl NoteAssociation {
    pub fn pair_key(&self) -> String {
        pair_key(&self.source_note_id, &self.target_note_id)
    }

    pub fn involves(&self, note_id: &str) -> bool {
        self.source_note_id == note_id || self.target_note_id == note_id
    }
}

/// Inverted-index entry for one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptIndexEntry {
    pub concept: String,
    /// Unique note ids in insertion order.
    pub note_ids: Vec<String>,
    pub avg_confidence: f32,
    pub last_updated: DateTime<Utc>,
}

/// Index statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationStats {
    pub total_notes: usize,
    pub total_concepts: usize,
    pub avg_concepts_per_note: f32,
    pub avg_notes_per_concept: f32,
    /// Theoretical pair count `n * (n - 1) / 2`, not the filtered count.
    pub total_associations: usize,
}

// =============================================================================
// PREFERENCES
// =============================================================================

/// Persisted user overrides applied over discovered associations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferenceState {
    pub ignored_associations: BTreeSet<String>,
    pub deleted_concepts: BTreeMap<String, BTreeSet<String>>,
}
