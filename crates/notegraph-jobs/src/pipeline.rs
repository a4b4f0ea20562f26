//! Per-note extraction pipeline.
//!
//! `analyze` is side-effect free apart from registry bookkeeping: it reads
//! the note, runs detection and extraction, and resolves every concept to
//! its canonical name. `apply` persists the result.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use notegraph_concepts::{record_matches, to_concept_match, ConceptExtractor, ConceptMatcher, ConceptRegistry};
use notegraph_core::{
    ConceptMatch, DictionaryStore, Error, ExtractionOptions, ExtractionOutcome, MatchType,
    NoteMetadata, NoteStore, PipelineConfig, Result, StopFlag,
};

/// Result of analysing one note, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct NoteAnalysis {
    pub note_id: String,
    pub title: String,
    pub outcome: ExtractionOutcome,
    /// Index-aligned with `outcome.concepts`.
    pub matches: Vec<ConceptMatch>,
}

impl NoteAnalysis {
    pub fn is_skipped(&self) -> bool {
        self.outcome.is_skipped()
    }

    /// Canonical concept names with the highest extraction confidence seen
    /// for each, in first-seen order.
    pub fn resolved_concepts(&self) -> (Vec<String>, Vec<f32>) {
        let mut names: Vec<String> = Vec::new();
        let mut confidences: Vec<f32> = Vec::new();
        for (m, extracted) in self.matches.iter().zip(&self.outcome.concepts) {
            match names.iter().position(|n| n == &m.matched_concept) {
                Some(i) => confidences[i] = confidences[i].max(extracted.confidence),
                None => {
                    names.push(m.matched_concept.clone());
                    confidences.push(extracted.confidence);
                }
            }
        }
        (names, confidences)
    }
}

/// Detector → extractor → resolver → persistence, for one note at a time.
pub struct ExtractionPipeline {
    notes: Arc<dyn NoteStore>,
    dictionary: Arc<dyn DictionaryStore>,
    extractor: ConceptExtractor,
    registry: Option<ConceptRegistry>,
    matcher: ConceptMatcher,
    config: PipelineConfig,
}

impl ExtractionPipeline {
    /// Build a pipeline. With a registry, concepts are resolved by vector
    /// similarity; without one, by the alias dictionary.
    pub fn new(
        notes: Arc<dyn NoteStore>,
        dictionary: Arc<dyn DictionaryStore>,
        extractor: ConceptExtractor,
        registry: Option<ConceptRegistry>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            notes,
            dictionary,
            extractor,
            registry,
            matcher: ConceptMatcher::new(),
            config,
        })
    }

    pub fn notes(&self) -> &Arc<dyn NoteStore> {
        &self.notes
    }

    pub fn extractor(&self) -> &ConceptExtractor {
        &self.extractor
    }

    pub fn uses_registry(&self) -> bool {
        self.registry.is_some()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Detect, extract and resolve one note without writing anything back.
    ///
    /// Returns `Cancelled` when `stop` fired while the note was in flight, so
    /// an interrupted note is never persisted with fallback concepts.
    #[instrument(
        skip_all,
        fields(subsystem = "jobs", component = "pipeline", op = "analyze", note_id = %note_id)
    )]
    pub async fn analyze(&self, note_id: &str, stop: &StopFlag) -> Result<NoteAnalysis> {
        let note = self.notes.read_note(note_id).await?;
        let dictionary = self.dictionary.load().await?;

        let options = ExtractionOptions {
            existing_concepts: dictionary.names(),
            max_concepts: None,
            path: Some(note_id.to_string()),
            tags: note.tags.clone(),
        };
        let outcome = self
            .extractor
            .extract_cancellable(&note.text, Some(&note.title), &options, stop)
            .await;
        if stop.is_stopped() {
            return Err(Error::Cancelled(format!("stop requested while processing '{}'", note_id)));
        }

        let matches = match &self.registry {
            Some(registry) => {
                let mut matches = Vec::with_capacity(outcome.concepts.len());
                for concept in &outcome.concepts {
                    let resolved = registry
                        .register_or_match(&concept.name, &concept.reason)
                        .await?;
                    matches.push(to_concept_match(concept, &resolved));
                }
                matches
            }
            None => self.matcher.match_concepts(&dictionary, &outcome.concepts),
        };

        debug!(
            source = %outcome.source,
            concept_count = matches.len(),
            new_concepts = matches.iter().filter(|m| m.match_type == MatchType::New).count(),
            "Note analysed"
        );
        Ok(NoteAnalysis {
            note_id: note_id.to_string(),
            title: note.title,
            outcome,
            matches,
        })
    }

    /// Persist an analysis: note metadata, concept pages for new concepts,
    /// and the alias dictionary. A skipped note writes nothing and yields `None`.
    #[instrument(
        skip_all,
        fields(subsystem = "jobs", component = "pipeline", op = "apply", note_id = %note_id)
    )]
    pub async fn apply(&self, note_id: &str, analysis: &NoteAnalysis) -> Result<Option<NoteMetadata>> {
        if analysis.is_skipped() {
            return Ok(None);
        }

        let (concepts, _) = analysis.resolved_concepts();
        let previous = self
            .notes
            .read_metadata(note_id)
            .await?
            .map(|m| m.concepts)
            .unwrap_or_default();
        let now = Utc::now();
        let metadata = NoteMetadata {
            concepts,
            indexed_at: now,
        };
        self.notes.write_metadata(note_id, &metadata).await?;

        if self.config.create_concept_pages {
            for (m, extracted) in analysis.matches.iter().zip(&analysis.outcome.concepts) {
                if m.match_type != MatchType::New {
                    continue;
                }
                if self
                    .notes
                    .ensure_concept_page(&m.matched_concept, &extracted.reason)
                    .await?
                {
                    info!(concept = %m.matched_concept, "Concept page created");
                }
            }
        }

        if !analysis.matches.is_empty() {
            let mut dictionary = self.dictionary.load().await?;
            record_matches(&mut dictionary, &analysis.matches, &previous, now);
            self.dictionary.save(&dictionary).await?;
        }

        debug!(concept_count = metadata.concepts.len(), "Analysis applied");
        Ok(Some(metadata))
    }

    /// [`analyze`](Self::analyze) then [`apply`](Self::apply).
    pub async fn process(&self, note_id: &str, stop: &StopFlag) -> Result<NoteAnalysis> {
        let analysis = self.analyze(note_id, stop).await?;
        self.apply(note_id, &analysis).await?;
        Ok(analysis)
    }
}
