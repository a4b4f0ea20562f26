//! Concept graph mediator.
//!
//! `ConceptGraph` is the single writer of the association index. Sync
//! operations run the pipeline one note at a time and feed the engine;
//! queries read the engine and filter through the preference overlay.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use notegraph_core::{
    defaults, AssociationConfig, AssociationStats, Error, NoteAssociation, PreferenceState,
    Result, StopFlag, SyncListener,
};
use notegraph_graph::{AssociationEngine, EngineSnapshot, PreferenceOverlay};

use crate::pipeline::{ExtractionPipeline, NoteAnalysis};

/// Outcome of a batch sync or rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The batch ended early because the stop flag fired.
    pub stopped: bool,
    /// `(note_id, error)` for every failed note.
    pub failures: Vec<(String, String)>,
}

impl SyncReport {
    fn record_failure(&mut self, note_id: &str, error: &Error) {
        self.failed += 1;
        self.failures.push((note_id.to_string(), error.to_string()));
    }
}

/// Owns the pipeline, the association index and the preference overlay.
pub struct ConceptGraph {
    pipeline: ExtractionPipeline,
    engine: RwLock<AssociationEngine>,
    overlay: Mutex<PreferenceOverlay>,
    listeners: Vec<Arc<dyn SyncListener>>,
}

impl ConceptGraph {
    pub fn new(
        pipeline: ExtractionPipeline,
        engine: AssociationEngine,
        overlay: PreferenceOverlay,
    ) -> Self {
        Self {
            pipeline,
            engine: RwLock::new(engine),
            overlay: Mutex::new(overlay),
            listeners: Vec::new(),
        }
    }

    /// Register a progress listener.
    pub fn with_listener(mut self, listener: Arc<dyn SyncListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn pipeline(&self) -> &ExtractionPipeline {
        &self.pipeline
    }

    // =========================================================================
    // SYNC
    // =========================================================================

    /// Process one note and (re)index it. A note that is now skipped is
    /// dropped from the index.
    #[instrument(
        skip_all,
        fields(subsystem = "jobs", component = "graph", op = "sync_note", note_id = %note_id)
    )]
    pub async fn sync_note(&self, note_id: &str, stop: &StopFlag) -> Result<NoteAnalysis> {
        let analysis = match self.pipeline.process(note_id, stop).await {
            Ok(analysis) => analysis,
            Err(e) => {
                if !matches!(e, Error::Cancelled(_)) {
                    for listener in &self.listeners {
                        listener.on_note_failed(note_id, &e.to_string()).await;
                    }
                }
                return Err(e);
            }
        };

        if analysis.is_skipped() {
            self.engine.write().await.remove_note(note_id);
            let reason = analysis.outcome.skip_reason.clone().unwrap_or_default();
            for listener in &self.listeners {
                listener.on_note_skipped(note_id, &reason).await;
            }
            return Ok(analysis);
        }

        let (concepts, confidences) = analysis.resolved_concepts();
        self.engine
            .write()
            .await
            .index_note_concepts(note_id, &concepts, &confidences)?;
        for listener in &self.listeners {
            listener.on_note_indexed(note_id, &concepts).await;
        }
        Ok(analysis)
    }

    /// Sync every note in the store, in store order.
    ///
    /// Per-note failures are counted and the batch continues. An unreachable
    /// backend aborts the batch and is returned. Notes that disappeared from
    /// the store leave the index once a batch completes.
    #[instrument(skip_all, fields(subsystem = "jobs", component = "graph", op = "sync_all"))]
    pub async fn sync_all(&self, stop: &StopFlag) -> Result<SyncReport> {
        let start = Instant::now();
        let note_ids = self.pipeline.notes().list_note_ids().await?;
        info!(note_count = note_ids.len(), "Sync started");

        let mut report = SyncReport::default();
        for note_id in &note_ids {
            if stop.is_stopped() {
                report.stopped = true;
                break;
            }
            match self.sync_note(note_id, stop).await {
                Ok(analysis) if analysis.is_skipped() => report.skipped += 1,
                Ok(_) => report.processed += 1,
                Err(Error::Cancelled(_)) => {
                    report.stopped = true;
                    break;
                }
                Err(e) if e.is_backend_unavailable() => {
                    error!(note_id = %note_id, error = %e, "Backend unavailable, sync aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(note_id = %note_id, error = %e, "Note failed, continuing");
                    report.record_failure(note_id, &e);
                }
            }
        }

        if !report.stopped {
            let present: BTreeSet<&String> = note_ids.iter().collect();
            let mut engine = self.engine.write().await;
            for stale in engine.note_ids() {
                if !present.contains(&stale) {
                    engine.remove_note(&stale);
                    debug!(note_id = %stale, "Removed note no longer in store");
                }
            }
        }

        self.finish(&report, start, "Sync finished").await;
        Ok(report)
    }

    /// Rebuild the index from stored note metadata without calling the model.
    ///
    /// The new index replaces the current one only when the pass completes;
    /// a stopped rebuild leaves the current index untouched.
    #[instrument(skip_all, fields(subsystem = "jobs", component = "graph", op = "rebuild_index"))]
    pub async fn rebuild_index(&self, stop: &StopFlag) -> Result<SyncReport> {
        let start = Instant::now();
        let note_ids = self.pipeline.notes().list_note_ids().await?;
        let config = self.engine.read().await.config().clone();
        let mut fresh = AssociationEngine::new(config)?;

        let mut report = SyncReport::default();
        for note_id in &note_ids {
            if stop.is_stopped() {
                report.stopped = true;
                break;
            }
            let metadata = match self.pipeline.notes().read_metadata(note_id).await {
                Ok(metadata) => metadata,
                Err(e) if e.is_backend_unavailable() => return Err(e),
                Err(e) => {
                    warn!(note_id = %note_id, error = %e, "Could not read note metadata");
                    for listener in &self.listeners {
                        listener.on_note_failed(note_id, &e.to_string()).await;
                    }
                    report.record_failure(note_id, &e);
                    continue;
                }
            };
            let Some(metadata) = metadata.filter(|m| !m.concepts.is_empty()) else {
                report.skipped += 1;
                for listener in &self.listeners {
                    listener.on_note_skipped(note_id, "no stored concepts").await;
                }
                continue;
            };

            let confidences = vec![defaults::METADATA_CONCEPT_CONFIDENCE; metadata.concepts.len()];
            match fresh.index_note_concepts_at(note_id, &metadata.concepts, &confidences, metadata.indexed_at) {
                Ok(()) => {
                    report.processed += 1;
                    for listener in &self.listeners {
                        listener.on_note_indexed(note_id, &metadata.concepts).await;
                    }
                }
                Err(e) => report.record_failure(note_id, &e),
            }
        }

        if report.stopped {
            info!(processed = report.processed, "Rebuild stopped, index unchanged");
        } else {
            *self.engine.write().await = fresh;
        }
        self.finish(&report, start, "Rebuild finished").await;
        Ok(report)
    }

    async fn finish(&self, report: &SyncReport, start: Instant, message: &str) {
        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            stopped = report.stopped,
            duration_ms = start.elapsed().as_millis() as u64,
            "{}",
            message
        );
        for listener in &self.listeners {
            listener
                .on_sync_finished(report.processed, report.skipped, report.failed)
                .await;
        }
    }

    /// Drop a note from the index. Returns whether it was indexed.
    pub async fn remove_note(&self, note_id: &str) -> bool {
        self.engine.write().await.remove_note(note_id)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// All associations, with user overrides applied.
    pub async fn associations(&self) -> Vec<NoteAssociation> {
        let discovered = self.engine.read().await.discover_associations();
        self.overlay.lock().await.apply(discovered)
    }

    /// Associations touching `note_id`, with user overrides applied.
    pub async fn associations_for_note(&self, note_id: &str) -> Vec<NoteAssociation> {
        let discovered = self.engine.read().await.discover_associations_for_note(note_id);
        self.overlay.lock().await.apply(discovered)
    }

    pub async fn stats(&self) -> AssociationStats {
        self.engine.read().await.get_stats()
    }

    pub async fn note_concepts(&self, note_id: &str) -> Vec<String> {
        self.engine.read().await.get_note_concepts(note_id)
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.read().await.snapshot()
    }

    /// Replace the index with a snapshot. On error the index is unchanged.
    pub async fn restore(&self, snapshot: &EngineSnapshot) -> Result<()> {
        self.engine.write().await.restore(snapshot)
    }

    pub async fn update_association_config(&self, config: AssociationConfig) -> Result<()> {
        self.engine.write().await.update_config(config)
    }

    // =========================================================================
    // PREFERENCES
    // =========================================================================

    pub async fn preferences(&self) -> PreferenceState {
        self.overlay.lock().await.state().clone()
    }

    pub async fn ignore_association(&self, a: &str, b: &str) -> Result<()> {
        self.overlay.lock().await.ignore(a, b).await
    }

    pub async fn unignore_association(&self, a: &str, b: &str) -> Result<bool> {
        self.overlay.lock().await.unignore(a, b).await
    }

    pub async fn delete_shared_concept(&self, a: &str, b: &str, concept: &str) -> Result<()> {
        self.overlay.lock().await.delete_concept(a, b, concept).await
    }

    pub async fn restore_shared_concept(&self, a: &str, b: &str, concept: &str) -> Result<bool> {
        self.overlay.lock().await.restore_concept(a, b, concept).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_concepts::ConceptExtractor;
    use notegraph_core::{ExtractionConfig, NoteMetadata, NoteStore, PipelineConfig, SkipRules};
    use notegraph_db::{MemoryDictionaryStore, MemoryNoteStore, MemoryPreferenceStore};
    use notegraph_inference::mock::ScriptedGenerator;

    const BODY: &str = "Kafka delivers messages at least once, so a consumer may see the same \
                        message twice. Handlers must be idempotent so duplicates do no harm.";

    async fn graph(notes: Arc<MemoryNoteStore>, generator: ScriptedGenerator) -> ConceptGraph {
        let extractor = ConceptExtractor::new(
            Arc::new(generator),
            ExtractionConfig::default(),
            SkipRules::default(),
        )
        .unwrap();
        let pipeline = ExtractionPipeline::new(
            notes,
            Arc::new(MemoryDictionaryStore::new()),
            extractor,
            None,
            PipelineConfig::default(),
        )
        .unwrap();
        let overlay = PreferenceOverlay::load(Arc::new(MemoryPreferenceStore::new()))
            .await
            .unwrap();
        ConceptGraph::new(pipeline, AssociationEngine::new(Default::default()).unwrap(), overlay)
    }

    #[tokio::test]
    async fn test_sync_note_indexes_resolved_concepts() {
        let notes = Arc::new(MemoryNoteStore::new());
        notes.insert_note("kafka.md", BODY, &[]).await;
        let generator = ScriptedGenerator::new().with_reply(r#"["Idempotency","Message Queue"]"#);
        let graph = graph(notes, generator).await;

        graph.sync_note("kafka.md", &StopFlag::new()).await.unwrap();
        assert_eq!(graph.note_concepts("kafka.md").await, vec!["Idempotency", "Message Queue"]);
    }

    #[tokio::test]
    async fn test_note_that_becomes_skipped_leaves_index() {
        let notes = Arc::new(MemoryNoteStore::new());
        notes.insert_note("kafka.md", BODY, &[]).await;
        let graph = graph(notes.clone(), ScriptedGenerator::new().with_reply(r#"["Idempotency"]"#)).await;
        graph.sync_note("kafka.md", &StopFlag::new()).await.unwrap();

        notes.insert_note("kafka.md", BODY, &["vocabulary"]).await;
        let analysis = graph.sync_note("kafka.md", &StopFlag::new()).await.unwrap();
        assert!(analysis.is_skipped());
        assert!(graph.note_concepts("kafka.md").await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_prunes_deleted_notes() {
        let notes = Arc::new(MemoryNoteStore::new());
        notes.insert_note("a.md", BODY, &[]).await;
        notes.insert_note("b.md", BODY, &[]).await;
        let generator = ScriptedGenerator::new().with_default_reply(r#"["Idempotency"]"#);
        let graph = graph(notes.clone(), generator).await;

        graph.sync_all(&StopFlag::new()).await.unwrap();
        assert_eq!(graph.stats().await.total_notes, 2);

        notes.remove_note("b.md").await;
        graph.sync_all(&StopFlag::new()).await.unwrap();
        assert_eq!(graph.stats().await.total_notes, 1);
        assert!(graph.associations().await.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_uses_stored_metadata_only() {
        let notes = Arc::new(MemoryNoteStore::new());
        notes.insert_note("a.md", BODY, &[]).await;
        notes.insert_note("b.md", BODY, &[]).await;
        notes.insert_note("c.md", BODY, &[]).await;
        for id in ["a.md", "b.md"] {
            notes
                .write_metadata(
                    id,
                    &NoteMetadata {
                        concepts: vec!["Idempotency".to_string()],
                        indexed_at: chrono::Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
        let generator = ScriptedGenerator::new();
        let graph = graph(notes, generator.clone()).await;

        let report = graph.rebuild_index(&StopFlag::new()).await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(generator.call_count(), 0);

        let associations = graph.associations().await;
        assert_eq!(associations.len(), 1);
        // 0.7 base + 0.2 single-concept bonus
        assert!((associations[0].confidence - 0.9).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_stopped_rebuild_keeps_current_index() {
        let notes = Arc::new(MemoryNoteStore::new());
        notes.insert_note("a.md", BODY, &[]).await;
        let graph = graph(notes, ScriptedGenerator::new().with_reply(r#"["Idempotency"]"#)).await;
        graph.sync_note("a.md", &StopFlag::new()).await.unwrap();

        let stop = StopFlag::new();
        stop.stop();
        let report = graph.rebuild_index(&stop).await.unwrap();
        assert!(report.stopped);
        assert_eq!(graph.note_concepts("a.md").await, vec!["Idempotency"]);
    }

    #[tokio::test]
    async fn test_association_config_update_validates() {
        let notes = Arc::new(MemoryNoteStore::new());
        let graph = graph(notes, ScriptedGenerator::new()).await;
        let bad = AssociationConfig {
            min_shared_concepts: 0,
            ..Default::default()
        };
        assert!(graph.update_association_config(bad).await.is_err());
        assert_eq!(graph.snapshot().await, EngineSnapshot::default());
    }
}
