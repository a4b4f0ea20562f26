//! Core traits for notegraph collaborators.
//!
//! The concept and association logic depends only on these interfaces;
//! concrete backends live in `notegraph-inference` and `notegraph-db`.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;

    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::Error::Embedding("backend returned no vectors".to_string()))
    }
}

/// Backend for text generation (LLM).
///
/// Implementations make no promise about output format; callers must expect
/// fenced, truncated or otherwise malformed text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate text, asking the backend to constrain output to JSON when it can.
    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// STORAGE TRAITS
// =============================================================================

/// Vector-indexed concept registry storage.
///
/// Every method reports an unreachable backend as an error. None of them may
/// turn an outage into an empty result.
#[async_trait]
pub trait ConceptStore: Send + Sync {
    /// Insert a concept, or replace summary, link and vectors of the record
    /// with the same name.
    async fn upsert_concept(&self, concept: NewConcept) -> Result<ConceptRecord>;

    /// Search by concept-name vector only.
    async fn search_strict(
        &self,
        concept_vector: &[f32],
        opts: SearchOptions,
    ) -> Result<Vec<ScoredConcept>>;

    /// Search by the mean of concept-name and summary cosine similarity.
    async fn search_loose(
        &self,
        concept_vector: &[f32],
        summary_vector: &[f32],
        opts: SearchOptions,
    ) -> Result<Vec<ScoredConcept>>;

    /// Page through all records ordered by concept name.
    async fn scroll(&self, req: ScrollRequest) -> Result<ConceptPage>;

    /// Fetch a record by exact concept name.
    async fn get_concept(&self, name: &str) -> Result<Option<ConceptRecord>>;

    /// Increment usage of an existing concept and refresh its vectors.
    ///
    /// The summary vector is always replaced. The concept-name vector is only
    /// replaced when given, so a loose match under a different surface name
    /// never moves the canonical name vector. Fails with `NotFound` when no
    /// record has this name.
    async fn update_usage_with_vectors(
        &self,
        name: &str,
        concept_vector: Option<&[f32]>,
        summary_vector: &[f32],
    ) -> Result<()>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<bool>;
}

/// Persistence for the association preference overlay.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Load persisted state. A store that was never written returns the default.
    async fn load(&self) -> Result<PreferenceState>;

    async fn save(&self, state: &PreferenceState) -> Result<()>;
}

/// Persistence for the lightweight alias dictionary.
#[async_trait]
pub trait DictionaryStore: Send + Sync {
    async fn load(&self) -> Result<ConceptDictionary>;

    async fn save(&self, dictionary: &ConceptDictionary) -> Result<()>;
}

/// Access to the note collection.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// All note ids in stable order.
    async fn list_note_ids(&self) -> Result<Vec<String>>;

    /// Read text and tags of one note.
    async fn read_note(&self, note_id: &str) -> Result<NoteContent>;

    /// Read the structured metadata block, `None` when the note was never indexed.
    async fn read_metadata(&self, note_id: &str) -> Result<Option<NoteMetadata>>;

    /// Write the structured metadata block, preserving everything else in the note.
    async fn write_metadata(&self, note_id: &str, metadata: &NoteMetadata) -> Result<()>;

    /// Create a page for a concept unless one exists. Returns whether a page was created.
    async fn ensure_concept_page(&self, concept: &str, summary: &str) -> Result<bool>;
}

// =============================================================================
// SYNC NOTIFICATION TRAITS
// =============================================================================

/// Consumer of sync progress events.
#[async_trait]
pub trait SyncListener: Send + Sync {
    /// Called after a note's concepts were written and indexed.
    async fn on_note_indexed(&self, note_id: &str, concepts: &[String]);

    /// Called when detection skipped a note.
    async fn on_note_skipped(&self, note_id: &str, reason: &str);

    /// Called when processing a note failed.
    async fn on_note_failed(&self, note_id: &str, error: &str);

    /// Called at the end of a batch with processed, skipped and failed counts.
    async fn on_sync_finished(&self, processed: usize, skipped: usize, failed: usize);
}

/// No-op listener for when notifications aren't needed.
pub struct NoOpListener;

#[async_trait]
impl SyncListener for NoOpListener {
    async fn on_note_indexed(&self, _note_id: &str, _concepts: &[String]) {}
    async fn on_note_skipped(&self, _note_id: &str, _reason: &str) {}
    async fn on_note_failed(&self, _note_id: &str, _error: &str) {}
    async fn on_sync_finished(&self, _processed: usize, _skipped: usize, _failed: usize) {}
}
