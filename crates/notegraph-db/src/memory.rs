//! In-memory stores.
//!
//! Used when no database is configured and throughout the test suites. The
//! concept store does brute-force cosine similarity over every record.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use notegraph_core::{
    ConceptDictionary, ConceptPage, ConceptRecord, ConceptStore, DictionaryStore, Error,
    NewConcept, NoteContent, NoteMetadata, NoteStore, PreferenceState, PreferenceStore, Result,
    ScoredConcept, ScrollRequest, SearchOptions, Vector,
};

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct StoredConcept {
    record: ConceptRecord,
    concept_vector: Vector,
    summary_vector: Vector,
}

/// In-memory [`ConceptStore`].
#[derive(Default)]
pub struct MemoryConceptStore {
    records: RwLock<BTreeMap<String, StoredConcept>>,
    offline: AtomicBool,
}

impl MemoryConceptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `BackendUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::BackendUnavailable(
                "in-memory concept store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn ranked(
        records: &BTreeMap<String, StoredConcept>,
        opts: SearchOptions,
        score: impl Fn(&StoredConcept) -> f32,
    ) -> Vec<ScoredConcept> {
        let mut hits: Vec<ScoredConcept> = records
            .values()
            .map(|stored| ScoredConcept {
                record: stored.record.clone(),
                score: score(stored),
            })
            .filter(|hit| hit.score >= opts.threshold)
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.concept.cmp(&b.record.concept))
        });
        hits.truncate(opts.limit);
        hits
    }
}

#[async_trait]
impl ConceptStore for MemoryConceptStore {
    async fn upsert_concept(&self, concept: NewConcept) -> Result<ConceptRecord> {
        self.check_online()?;
        let now = Utc::now();
        let mut records = self.records.write().await;
        let stored = records
            .entry(concept.concept.clone())
            .or_insert_with(|| StoredConcept {
                record: ConceptRecord {
                    id: Uuid::now_v7(),
                    concept: concept.concept.clone(),
                    summary: String::new(),
                    link: String::new(),
                    usage_count: 1,
                    created_at: now,
                    updated_at: now,
                },
                concept_vector: Vec::new(),
                summary_vector: Vec::new(),
            });
        stored.record.summary = concept.summary;
        stored.record.link = concept.link;
        stored.record.updated_at = now;
        stored.concept_vector = concept.concept_vector;
        stored.summary_vector = concept.summary_vector;
        Ok(stored.record.clone())
    }

    async fn search_strict(
        &self,
        concept_vector: &[f32],
        opts: SearchOptions,
    ) -> Result<Vec<ScoredConcept>> {
        self.check_online()?;
        let records = self.records.read().await;
        Ok(Self::ranked(&records, opts, |stored| {
            cosine_similarity(&stored.concept_vector, concept_vector)
        }))
    }

    async fn search_loose(
        &self,
        concept_vector: &[f32],
        summary_vector: &[f32],
        opts: SearchOptions,
    ) -> Result<Vec<ScoredConcept>> {
        self.check_online()?;
        let records = self.records.read().await;
        Ok(Self::ranked(&records, opts, |stored| {
            (cosine_similarity(&stored.concept_vector, concept_vector)
                + cosine_similarity(&stored.summary_vector, summary_vector))
                / 2.0
        }))
    }

    async fn scroll(&self, req: ScrollRequest) -> Result<ConceptPage> {
        self.check_online()?;
        let records = self.records.read().await;
        let page: Vec<ConceptRecord> = records
            .values()
            .skip(req.offset)
            .take(req.limit)
            .map(|stored| stored.record.clone())
            .collect();
        let next = req.offset + page.len();
        Ok(ConceptPage {
            next_offset: (page.len() == req.limit && next < records.len()).then_some(next),
            records: page,
        })
    }

    async fn get_concept(&self, name: &str) -> Result<Option<ConceptRecord>> {
        self.check_online()?;
        Ok(self
            .records
            .read()
            .await
            .get(name)
            .map(|stored| stored.record.clone()))
    }

    async fn update_usage_with_vectors(
        &self,
        name: &str,
        concept_vector: Option<&[f32]>,
        summary_vector: &[f32],
    ) -> Result<()> {
        self.check_online()?;
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("concept '{}'", name)))?;
        stored.record.usage_count += 1;
        stored.record.updated_at = Utc::now();
        if let Some(v) = concept_vector {
            stored.concept_vector = v.to_vec();
        }
        stored.summary_vector = summary_vector.to_vec();
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.offline.load(Ordering::SeqCst))
    }
}

/// In-memory [`PreferenceStore`].
#[derive(Default)]
pub struct MemoryPreferenceStore {
    state: RwLock<PreferenceState>,
    fail_saves: AtomicBool,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PreferenceState) -> Self {
        Self {
            state: RwLock::new(state),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Make subsequent saves fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved state.
    pub async fn saved(&self) -> PreferenceState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self) -> Result<PreferenceState> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &PreferenceState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "preference store rejected write",
            )));
        }
        *self.state.write().await = state.clone();
        Ok(())
    }
}

/// In-memory [`DictionaryStore`].
#[derive(Default)]
pub struct MemoryDictionaryStore {
    dictionary: RwLock<ConceptDictionary>,
}

impl MemoryDictionaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DictionaryStore for MemoryDictionaryStore {
    async fn load(&self) -> Result<ConceptDictionary> {
        Ok(self.dictionary.read().await.clone())
    }

    async fn save(&self, dictionary: &ConceptDictionary) -> Result<()> {
        *self.dictionary.write().await = dictionary.clone();
        Ok(())
    }
}

#[derive(Default)]
struct NoteEntries {
    notes: BTreeMap<String, NoteContent>,
    metadata: BTreeMap<String, NoteMetadata>,
    pages: BTreeMap<String, String>,
    unreadable: BTreeSet<String>,
}

/// In-memory [`NoteStore`].
#[derive(Default)]
pub struct MemoryNoteStore {
    inner: RwLock<NoteEntries>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a note. The title is the file stem of the id.
    pub async fn insert_note(&self, id: &str, text: &str, tags: &[&str]) {
        let title = std::path::Path::new(id)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());
        self.inner.write().await.notes.insert(
            id.to_string(),
            NoteContent {
                id: id.to_string(),
                title,
                text: text.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
        );
    }

    /// Make reads of this note fail, for batch error-path tests.
    pub async fn mark_unreadable(&self, id: &str) {
        self.inner.write().await.unreadable.insert(id.to_string());
    }

    pub async fn remove_note(&self, id: &str) {
        let mut inner = self.inner.write().await;
        inner.notes.remove(id);
        inner.metadata.remove(id);
    }

    /// Concept pages created so far (concept → summary).
    pub async fn pages(&self) -> BTreeMap<String, String> {
        self.inner.read().await.pages.clone()
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn list_note_ids(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().await.notes.keys().cloned().collect())
    }

    async fn read_note(&self, note_id: &str) -> Result<NoteContent> {
        let inner = self.inner.read().await;
        if inner.unreadable.contains(note_id) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot read {}", note_id),
            )));
        }
        inner
            .notes
            .get(note_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("note '{}'", note_id)))
    }

    async fn read_metadata(&self, note_id: &str) -> Result<Option<NoteMetadata>> {
        Ok(self.inner.read().await.metadata.get(note_id).cloned())
    }

    async fn write_metadata(&self, note_id: &str, metadata: &NoteMetadata) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.notes.contains_key(note_id) {
            return Err(Error::NotFound(format!("note '{}'", note_id)));
        }
        inner
            .metadata
            .insert(note_id.to_string(), metadata.clone());
        Ok(())
    }

    async fn ensure_concept_page(&self, concept: &str, summary: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.pages.contains_key(concept) {
            return Ok(false);
        }
        inner
            .pages
            .insert(concept.to_string(), summary.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_concept(name: &str, cv: Vec<f32>, sv: Vec<f32>) -> NewConcept {
        NewConcept {
            concept: name.to_string(),
            summary: format!("{} summary", name),
            link: format!("[[concepts/{}]]", name),
            concept_vector: cv,
            summary_vector: sv,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_strict_search_threshold_and_order() {
        let store = MemoryConceptStore::new();
        store
            .upsert_concept(new_concept("A", vec![1.0, 0.0], vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert_concept(new_concept("B", vec![0.8, 0.6], vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store
            .search_strict(
                &[1.0, 0.0],
                SearchOptions {
                    limit: 5,
                    threshold: 0.7,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.concept, "A");

        let hits = store
            .search_strict(
                &[1.0, 0.0],
                SearchOptions {
                    limit: 5,
                    threshold: 0.9,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_loose_search_averages_both_vectors() {
        let store = MemoryConceptStore::new();
        store
            .upsert_concept(new_concept("A", vec![1.0, 0.0], vec![0.0, 1.0]))
            .await
            .unwrap();
        let hits = store
            .search_loose(
                &[1.0, 0.0],
                &[1.0, 0.0],
                SearchOptions {
                    limit: 1,
                    threshold: 0.0,
                },
            )
            .await
            .unwrap();
        assert!((hits[0].score - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_update_usage_keeps_name_vector_unless_given() {
        let store = MemoryConceptStore::new();
        store
            .upsert_concept(new_concept("A", vec![1.0, 0.0], vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .update_usage_with_vectors("A", None, &[0.0, 1.0])
            .await
            .unwrap();

        let record = store.get_concept("A").await.unwrap().unwrap();
        assert_eq!(record.usage_count, 2);
        let strict = store
            .search_strict(
                &[1.0, 0.0],
                SearchOptions {
                    limit: 1,
                    threshold: 0.99,
                },
            )
            .await
            .unwrap();
        assert_eq!(strict.len(), 1);

        let err = store
            .update_usage_with_vectors("missing", None, &[1.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scroll_pages() {
        let store = MemoryConceptStore::new();
        for name in ["a", "b", "c"] {
            store
                .upsert_concept(new_concept(name, vec![1.0], vec![1.0]))
                .await
                .unwrap();
        }
        let first = store
            .scroll(ScrollRequest {
                limit: 2,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.next_offset, Some(2));

        let second = store
            .scroll(ScrollRequest {
                limit: 2,
                offset: 2,
            })
            .await
            .unwrap();
        assert_eq!(second.records[0].concept, "c");
        assert_eq!(second.next_offset, None);
    }

    #[tokio::test]
    async fn test_offline_store_reports_backend_unavailable() {
        let store = MemoryConceptStore::new();
        store.set_offline(true);
        let err = store
            .search_strict(
                &[1.0],
                SearchOptions {
                    limit: 1,
                    threshold: 0.0,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        assert!(!store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_preference_store_failing_saves() {
        let store = MemoryPreferenceStore::new();
        let mut state = PreferenceState::default();
        state.ignored_associations.insert("a|b".to_string());

        store.set_fail_saves(true);
        assert!(store.save(&state).await.is_err());
        assert!(store.saved().await.ignored_associations.is_empty());

        store.set_fail_saves(false);
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_note_store_metadata_and_pages() {
        let store = MemoryNoteStore::new();
        store.insert_note("dev/kafka.md", "text", &["mq"]).await;
        let note = store.read_note("dev/kafka.md").await.unwrap();
        assert_eq!(note.title, "kafka");
        assert_eq!(note.tags, vec!["mq"]);

        assert!(store.read_metadata("dev/kafka.md").await.unwrap().is_none());
        let meta = NoteMetadata {
            concepts: vec!["幂等性".to_string()],
            indexed_at: Utc::now(),
        };
        store.write_metadata("dev/kafka.md", &meta).await.unwrap();
        assert_eq!(
            store.read_metadata("dev/kafka.md").await.unwrap(),
            Some(meta)
        );

        assert!(store.ensure_concept_page("幂等性", "s").await.unwrap());
        assert!(!store.ensure_concept_page("幂等性", "s").await.unwrap());
        assert!(store.write_metadata("missing.md", &NoteMetadata {
            concepts: vec![],
            indexed_at: Utc::now(),
        }).await.is_err());
    }
}
