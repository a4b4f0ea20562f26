//! Concept registry: vector deduplication of concept names.
//!
//! Each concept is stored with two embeddings, one of its name and one of its
//! summary. Resolution runs in two tiers:
//!
//! - **Strict**: name-vector cosine ≥ `strict_threshold` (default 0.90)
//! - **Loose**: mean of name and summary cosines ≥ `similarity_threshold`
//!   (default 0.85)
//!
//! A miss on both tiers registers a new concept. An unreachable store is an
//! error, never a miss.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use notegraph_core::{
    defaults, ConceptMatch, ConceptRecord, ConceptStore, EmbeddingBackend, Error, ExtractedConcept,
    MatchType, NewConcept, RegistryConfig, RegistryMatch, RegistryMatchKind, Result, ScoredConcept,
    ScrollRequest, SearchOptions, Vector,
};

/// Resolves concept names against a vector-backed `ConceptStore`.
pub struct ConceptRegistry {
    store: Arc<dyn ConceptStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    config: RegistryConfig,
}

impl ConceptRegistry {
    pub fn new(
        store: Arc<dyn ConceptStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        config: RegistryConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: RegistryConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Match `name` against the registry, registering it when nothing is
    /// close enough.
    ///
    /// `reason` doubles as the summary of a newly registered concept. When
    /// empty, the name itself is embedded as the summary.
    #[instrument(
        skip_all,
        fields(subsystem = "concepts", component = "registry", op = "register_or_match", concept = %name)
    )]
    pub async fn register_or_match(&self, name: &str, reason: &str) -> Result<RegistryMatch> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("concept name is empty".to_string()));
        }
        let reason = reason.trim();
        let summary_text = if reason.is_empty() { name } else { reason };

        let (concept_vector, summary_vector) = self.embed_pair(name, summary_text).await?;

        let strict = self
            .store
            .search_strict(
                &concept_vector,
                SearchOptions {
                    limit: 1,
                    threshold: self.config.strict_threshold,
                },
            )
            .await
            .map_err(unreachable_store)?;
        if let Some(hit) = strict.into_iter().next() {
            self.store
                .update_usage_with_vectors(&hit.record.concept, Some(&concept_vector), &summary_vector)
                .await
                .map_err(unreachable_store)?;
            debug!(matched = %hit.record.concept, similarity = hit.score, "Strict registry match");
            return Ok(matched(hit, RegistryMatchKind::Strict));
        }

        let loose = self
            .store
            .search_loose(
                &concept_vector,
                &summary_vector,
                SearchOptions {
                    limit: 1,
                    threshold: self.config.similarity_threshold,
                },
            )
            .await
            .map_err(unreachable_store)?;
        if let Some(hit) = loose.into_iter().next() {
            self.store
                .update_usage_with_vectors(&hit.record.concept, None, &summary_vector)
                .await
                .map_err(unreachable_store)?;
            debug!(matched = %hit.record.concept, similarity = hit.score, "Loose registry match");
            return Ok(matched(hit, RegistryMatchKind::Loose));
        }

        let record = self
            .store
            .upsert_concept(NewConcept {
                concept: name.to_string(),
                summary: reason.to_string(),
                link: self.config.link_for(name),
                concept_vector,
                summary_vector,
            })
            .await
            .map_err(unreachable_store)?;
        info!(link = %record.link, "Registered new concept");

        Ok(RegistryMatch {
            matched: false,
            concept: record.concept,
            summary: record.summary,
            link: record.link,
            similarity: 0.0,
            is_new: true,
            kind: RegistryMatchKind::New,
        })
    }

    /// Every registered concept, in store order.
    pub async fn list_concepts(&self) -> Result<Vec<ConceptRecord>> {
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .store
                .scroll(ScrollRequest {
                    limit: defaults::REGISTRY_SCROLL_PAGE,
                    offset,
                })
                .await
                .map_err(unreachable_store)?;
            records.extend(page.records);
            match page.next_offset {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }
        Ok(records)
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.store.health_check().await.map_err(unreachable_store)
    }

    async fn embed_pair(&self, name: &str, summary: &str) -> Result<(Vector, Vector)> {
        let vectors = self
            .embedder
            .embed_texts(&[name.to_string(), summary.to_string()])
            .await?;
        let [concept_vector, summary_vector]: [Vector; 2] =
            vectors.try_into().map_err(|v: Vec<Vector>| {
                Error::Embedding(format!("expected 2 embeddings, got {}", v.len()))
            })?;
        Ok((concept_vector, summary_vector))
    }
}

fn matched(hit: ScoredConcept, kind: RegistryMatchKind) -> RegistryMatch {
    RegistryMatch {
        matched: true,
        concept: hit.record.concept,
        summary: hit.record.summary,
        link: hit.record.link,
        similarity: hit.score,
        is_new: false,
        kind,
    }
}

/// Rewrap connection-level store failures so callers can tell an outage from
/// an ordinary miss.
fn unreachable_store(e: Error) -> Error {
    match e {
        Error::BackendUnavailable(_) => e,
        e if e.is_backend_unavailable() => {
            Error::BackendUnavailable(format!("concept registry store unreachable: {}", e))
        }
        e => e,
    }
}

/// Express a registry resolution as a dictionary-style match.
///
/// Strict matches count as exact, loose matches as aliases. A new concept
/// keeps the extractor's confidence.
pub fn to_concept_match(extracted: &ExtractedConcept, resolved: &RegistryMatch) -> ConceptMatch {
    let (match_type, confidence) = match resolved.kind {
        RegistryMatchKind::Strict => (MatchType::Exact, resolved.similarity),
        RegistryMatchKind::Loose => (MatchType::Alias, resolved.similarity),
        RegistryMatchKind::New => (MatchType::New, extracted.confidence),
    };
    ConceptMatch {
        original_term: extracted.name.clone(),
        matched_concept: resolved.concept.clone(),
        match_type,
        confidence: confidence.clamp(0.0, 1.0),
    }
}
