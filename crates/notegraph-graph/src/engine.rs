//! Association engine.
//!
//! Keeps two indices over the notes it has seen:
//!
//! - note → concepts (with index-aligned per-concept confidences)
//! - concept → [`ConceptIndexEntry`] (notes carrying it, average confidence)
//!
//! Discovery pivots on concepts: only notes that co-occur under some concept
//! are ever paired, so cost follows concept popularity rather than the square
//! of the note count. Every call recomputes the full set.
//!
//! # Confidence
//!
//! For a pair sharing concepts `S`:
//!
//! ```text
//! base  = mean over c in S of (conf_a(c) + conf_b(c)) / 2
//! bonus = min(|S| / 5, 0.2)
//! confidence = min(base + bonus, 1.0)
//! ```
//!
//! # Ordering
//!
//! Shared-concept count descending, then confidence descending, then recency
//! (`discovered_at`, the later index time of the two notes) descending, then
//! canonical pair key ascending.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use notegraph_core::{
    defaults, pair_key, AssociationConfig, AssociationStats, ConceptIndexEntry, Error,
    ExtractedConcept, NoteAssociation, Result,
};

/// One note's slice of the index, as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedNote {
    pub note_id: String,
    pub concepts: Vec<String>,
    pub confidences: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

/// Serializable copy of the engine's indices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub notes: Vec<IndexedNote>,
}

/// Note ↔ concept index with pairwise association discovery.
#[derive(Debug, Clone)]
pub struct AssociationEngine {
    config: AssociationConfig,
    note_concepts: BTreeMap<String, Vec<String>>,
    note_confidences: BTreeMap<String, Vec<f32>>,
    indexed_at: BTreeMap<String, DateTime<Utc>>,
    concept_index: BTreeMap<String, ConceptIndexEntry>,
}

impl AssociationEngine {
    pub fn new(config: AssociationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            note_concepts: BTreeMap::new(),
            note_confidences: BTreeMap::new(),
            indexed_at: BTreeMap::new(),
            concept_index: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Replace the discovery config. On error the current config is kept.
    pub fn update_config(&mut self, config: AssociationConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Index a note from extracted (or resolved) concepts.
    pub fn index_note(&mut self, note_id: &str, concepts: &[ExtractedConcept]) -> Result<()> {
        let names: Vec<String> = concepts.iter().map(|c| c.name.clone()).collect();
        let confidences: Vec<f32> = concepts.iter().map(|c| c.confidence).collect();
        self.index_note_concepts(note_id, &names, &confidences)
    }

    /// Index a note, replacing whatever was indexed for it before.
    ///
    /// `confidences` must be index-aligned with `concepts`. Repeated names
    /// keep their highest confidence. An empty list removes the note.
    pub fn index_note_concepts(
        &mut self,
        note_id: &str,
        concepts: &[String],
        confidences: &[f32],
    ) -> Result<()> {
        self.index_note_concepts_at(note_id, concepts, confidences, Utc::now())
    }

    /// [`index_note_concepts`](Self::index_note_concepts) with an explicit
    /// index time, used when rebuilding from stored metadata.
    #[instrument(
        skip_all,
        fields(subsystem = "graph", component = "engine", op = "index_note", note_id = %note_id)
    )]
    pub fn index_note_concepts_at(
        &mut self,
        note_id: &str,
        concepts: &[String],
        confidences: &[f32],
        at: DateTime<Utc>,
    ) -> Result<()> {
        if note_id.is_empty() {
            return Err(Error::InvalidInput("note id is empty".to_string()));
        }
        if concepts.len() != confidences.len() {
            return Err(Error::InvalidInput(format!(
                "{} concepts but {} confidences for note '{}'",
                concepts.len(),
                confidences.len(),
                note_id
            )));
        }

        let mut names: Vec<String> = Vec::with_capacity(concepts.len());
        let mut scores: Vec<f32> = Vec::with_capacity(concepts.len());
        for (name, confidence) in concepts.iter().zip(confidences) {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let confidence = if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            match names.iter().position(|n| n == name) {
                Some(i) => scores[i] = scores[i].max(confidence),
                None => {
                    names.push(name.to_string());
                    scores.push(confidence);
                }
            }
        }

        self.remove_note(note_id);
        if names.is_empty() {
            debug!("Note has no concepts, left out of the index");
            return Ok(());
        }

        for (name, confidence) in names.iter().zip(&scores) {
            let entry = self
                .concept_index
                .entry(name.clone())
                .or_insert_with(|| ConceptIndexEntry {
                    concept: name.clone(),
                    note_ids: Vec::new(),
                    avg_confidence: 0.0,
                    last_updated: at,
                });
            let n = entry.note_ids.len() as f32;
            entry.avg_confidence = (entry.avg_confidence * n + confidence) / (n + 1.0);
            entry.note_ids.push(note_id.to_string());
            entry.last_updated = at;
        }

        debug!(concept_count = names.len(), "Note indexed");
        self.note_concepts.insert(note_id.to_string(), names);
        self.note_confidences.insert(note_id.to_string(), scores);
        self.indexed_at.insert(note_id.to_string(), at);
        Ok(())
    }

    /// Drop a note from both indices. Returns whether it was indexed.
    pub fn remove_note(&mut self, note_id: &str) -> bool {
        let Some(concepts) = self.note_concepts.remove(note_id) else {
            return false;
        };
        self.note_confidences.remove(note_id);
        self.indexed_at.remove(note_id);

        let now = Utc::now();
        for concept in concepts {
            let Some(entry) = self.concept_index.get_mut(&concept) else {
                continue;
            };
            entry.note_ids.retain(|id| id != note_id);
            if entry.note_ids.is_empty() {
                self.concept_index.remove(&concept);
                continue;
            }
            let remaining: Vec<f32> = entry
                .note_ids
                .iter()
                .filter_map(|id| confidence_in(&self.note_concepts, &self.note_confidences, id, &concept))
                .collect();
            entry.avg_confidence = remaining.iter().sum::<f32>() / remaining.len().max(1) as f32;
            entry.last_updated = now;
        }
        true
    }

    pub fn clear(&mut self) {
        self.note_concepts.clear();
        self.note_confidences.clear();
        self.indexed_at.clear();
        self.concept_index.clear();
    }

    pub fn contains_note(&self, note_id: &str) -> bool {
        self.note_concepts.contains_key(note_id)
    }

    /// Ids of all indexed notes, sorted.
    pub fn note_ids(&self) -> Vec<String> {
        self.note_concepts.keys().cloned().collect()
    }

    /// Concepts indexed for a note, empty when the note is unknown.
    pub fn get_note_concepts(&self, note_id: &str) -> Vec<String> {
        self.note_concepts.get(note_id).cloned().unwrap_or_default()
    }

    pub fn get_notes_for_concept(&self, concept: &str) -> Vec<String> {
        self.concept_index
            .get(concept)
            .map(|e| e.note_ids.clone())
            .unwrap_or_default()
    }

    /// The concept index, sorted by concept name.
    pub fn export_concept_index(&self) -> Vec<ConceptIndexEntry> {
        self.concept_index.values().cloned().collect()
    }

    /// All associations passing the configured filters, ranked and truncated.
    #[instrument(skip_all, fields(subsystem = "graph", component = "engine", op = "discover"))]
    pub fn discover_associations(&self) -> Vec<NoteAssociation> {
        let mut processed: HashSet<String> = HashSet::new();
        let mut found: Vec<(String, NoteAssociation)> = Vec::new();

        for entry in self.concept_index.values() {
            if entry.note_ids.len() < 2 {
                continue;
            }
            for (i, a) in entry.note_ids.iter().enumerate() {
                for b in &entry.note_ids[i + 1..] {
                    if self.config.exclude_self_associations && a == b {
                        continue;
                    }
                    let key = pair_key(a, b);
                    if !processed.insert(key.clone()) {
                        continue;
                    }
                    if let Some(association) = self.score_pair(a, b) {
                        found.push((key, association));
                    }
                }
            }
        }

        found.sort_by(|(ka, a), (kb, b)| {
            b.shared_concepts
                .len()
                .cmp(&a.shared_concepts.len())
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| b.discovered_at.cmp(&a.discovered_at))
                .then_with(|| ka.cmp(kb))
        });
        found.truncate(self.config.max_associations);

        debug!(
            pairs_considered = processed.len(),
            association_count = found.len(),
            "Associations discovered"
        );
        found.into_iter().map(|(_, a)| a).collect()
    }

    /// Associations touching `note_id`, filtered from the full discovery.
    pub fn discover_associations_for_note(&self, note_id: &str) -> Vec<NoteAssociation> {
        self.discover_associations()
            .into_iter()
            .filter(|a| a.involves(note_id))
            .collect()
    }

    /// Index statistics.
    ///
    /// `total_associations` is the theoretical pair count `n * (n - 1) / 2`
    /// over indexed notes, not the number that pass the filters.
    pub fn get_stats(&self) -> AssociationStats {
        let total_notes = self.note_concepts.len();
        let total_concepts = self.concept_index.len();
        let concept_refs: usize = self.note_concepts.values().map(Vec::len).sum();
        let note_refs: usize = self.concept_index.values().map(|e| e.note_ids.len()).sum();

        AssociationStats {
            total_notes,
            total_concepts,
            avg_concepts_per_note: ratio(concept_refs, total_notes),
            avg_notes_per_concept: ratio(note_refs, total_concepts),
            total_associations: total_notes * total_notes.saturating_sub(1) / 2,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            notes: self
                .note_concepts
                .iter()
                .map(|(id, concepts)| IndexedNote {
                    note_id: id.clone(),
                    concepts: concepts.clone(),
                    confidences: self.note_confidences.get(id).cloned().unwrap_or_default(),
                    indexed_at: self.indexed_at.get(id).copied().unwrap_or_else(Utc::now),
                })
                .collect(),
        }
    }

    /// Replace the indices with a snapshot. On error the engine is unchanged.
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> Result<()> {
        let mut rebuilt = Self::new(self.config.clone())?;
        for note in &snapshot.notes {
            rebuilt.index_note_concepts_at(&note.note_id, &note.concepts, &note.confidences, note.indexed_at)?;
        }
        *self = rebuilt;
        Ok(())
    }

    fn score_pair(&self, a: &str, b: &str) -> Option<NoteAssociation> {
        let (source, target) = if a <= b { (a, b) } else { (b, a) };
        let source_concepts = self.note_concepts.get(source)?;
        let source_scores = self.note_confidences.get(source)?;
        let target_concepts = self.note_concepts.get(target)?;
        let target_scores = self.note_confidences.get(target)?;

        let target_lookup: BTreeMap<&str, f32> = target_concepts
            .iter()
            .map(String::as_str)
            .zip(target_scores.iter().copied())
            .collect();

        let mut shared = Vec::new();
        let mut pair_total = 0.0f32;
        for (concept, score) in source_concepts.iter().zip(source_scores) {
            if let Some(other) = target_lookup.get(concept.as_str()) {
                shared.push(concept.clone());
                pair_total += (score + other) / 2.0;
            }
        }
        if shared.is_empty() || shared.len() < self.config.min_shared_concepts {
            return None;
        }

        let base = pair_total / shared.len() as f32;
        let bonus = (shared.len() as f32 / defaults::SIZE_BONUS_DIVISOR).min(defaults::SIZE_BONUS_CAP);
        let confidence = (base + bonus).clamp(0.0, 1.0);
        if confidence < self.config.min_confidence {
            return None;
        }

        let discovered_at = match (self.indexed_at.get(source), self.indexed_at.get(target)) {
            (Some(x), Some(y)) => *x.max(y),
            (Some(x), None) | (None, Some(x)) => *x,
            (None, None) => Utc::now(),
        };

        Some(NoteAssociation {
            source_note_id: source.to_string(),
            target_note_id: target.to_string(),
            shared_concepts: shared,
            confidence,
            discovered_at,
        })
    }

    /// Distinct concept names across all indexed notes.
    pub fn concept_names(&self) -> BTreeSet<String> {
        self.concept_index.keys().cloned().collect()
    }
}

fn confidence_in(
    note_concepts: &BTreeMap<String, Vec<String>>,
    note_confidences: &BTreeMap<String, Vec<f32>>,
    note_id: &str,
    concept: &str,
) -> Option<f32> {
    let position = note_concepts.get(note_id)?.iter().position(|c| c == concept)?;
    note_confidences.get(note_id)?.get(position).copied()
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn engine() -> AssociationEngine {
        AssociationEngine::new(AssociationConfig::default()).unwrap()
    }

    fn kafka_and_order(engine: &mut AssociationEngine) {
        engine
            .index_note_concepts("kafka.md", &names(&["幂等性", "事件驱动"]), &[0.9, 0.8])
            .unwrap();
        engine
            .index_note_concepts("order.md", &names(&["幂等性", "数据一致性"]), &[0.85, 0.8])
            .unwrap();
    }

    #[test]
    fn test_single_shared_concept_scenario() {
        let mut engine = AssociationEngine::new(AssociationConfig {
            min_shared_concepts: 1,
            min_confidence: 0.5,
            ..Default::default()
        })
        .unwrap();
        kafka_and_order(&mut engine);

        let associations = engine.discover_associations();
        assert_eq!(associations.len(), 1);
        let a = &associations[0];
        assert_eq!(a.shared_concepts, vec!["幂等性"]);
        assert!(a.confidence > 0.5);
        assert!(a.confidence <= 1.0);
        assert_eq!(a.source_note_id, "kafka.md");
        assert_eq!(a.target_note_id, "order.md");
    }

    #[test]
    fn test_min_shared_two_yields_nothing() {
        let mut engine = AssociationEngine::new(AssociationConfig {
            min_shared_concepts: 2,
            min_confidence: 0.5,
            ..Default::default()
        })
        .unwrap();
        kafka_and_order(&mut engine);
        assert!(engine.discover_associations().is_empty());
    }

    #[test]
    fn test_confidence_formula() {
        let mut engine = AssociationEngine::new(AssociationConfig {
            min_confidence: 0.0,
            ..Default::default()
        })
        .unwrap();
        engine
            .index_note_concepts("a.md", &names(&["x"]), &[0.4])
            .unwrap();
        engine
            .index_note_concepts("b.md", &names(&["x"]), &[0.2])
            .unwrap();
        let a = &engine.discover_associations()[0];
        // base 0.3 + bonus min(1/5, 0.2)
        assert!((a.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_capped_at_one() {
        let mut engine = engine();
        let shared = names(&["a", "b", "c", "d", "e", "f"]);
        engine
            .index_note_concepts("a.md", &shared, &[1.0; 6])
            .unwrap();
        engine
            .index_note_concepts("b.md", &shared, &[1.0; 6])
            .unwrap();
        let a = &engine.discover_associations()[0];
        assert_eq!(a.confidence, 1.0);
        assert_eq!(a.shared_concepts.len(), 6);
    }

    #[test]
    fn test_pair_reported_once_regardless_of_order() {
        let mut forward = engine();
        forward
            .index_note_concepts("b.md", &names(&["x", "y"]), &[0.9, 0.9])
            .unwrap();
        forward
            .index_note_concepts("a.md", &names(&["x", "y"]), &[0.9, 0.9])
            .unwrap();

        let associations = forward.discover_associations();
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].pair_key(), "a.md|b.md");
        assert_eq!(associations[0].shared_concepts, vec!["x", "y"]);
    }

    #[test]
    fn test_ranking_prefers_more_shared_concepts_then_confidence() {
        let mut engine = AssociationEngine::new(AssociationConfig {
            min_confidence: 0.0,
            ..Default::default()
        })
        .unwrap();
        engine
            .index_note_concepts("hub.md", &names(&["x", "y"]), &[0.9, 0.9])
            .unwrap();
        engine
            .index_note_concepts("two.md", &names(&["x", "y"]), &[0.3, 0.3])
            .unwrap();
        engine
            .index_note_concepts("strong.md", &names(&["x"]), &[1.0])
            .unwrap();
        engine
            .index_note_concepts("weak.md", &names(&["x"]), &[0.1])
            .unwrap();

        let ranked = engine.discover_associations();
        assert_eq!(ranked[0].pair_key(), "hub.md|two.md");
        assert!(ranked
            .windows(2)
            .all(|w| w[0].shared_concepts.len() >= w[1].shared_concepts.len()));
        let singles: Vec<_> = ranked.iter().filter(|a| a.shared_concepts.len() == 1).collect();
        assert!(singles
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_recency_then_pair_key_break_ties() {
        let mut engine = engine();
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = Utc::now();
        engine
            .index_note_concepts_at("a.md", &names(&["x"]), &[0.8], t0)
            .unwrap();
        engine
            .index_note_concepts_at("b.md", &names(&["x"]), &[0.8], t0)
            .unwrap();
        engine
            .index_note_concepts_at("c.md", &names(&["y"]), &[0.8], t0)
            .unwrap();
        engine
            .index_note_concepts_at("d.md", &names(&["y"]), &[0.8], t1)
            .unwrap();
        engine
            .index_note_concepts_at("e.md", &names(&["z"]), &[0.8], t0)
            .unwrap();
        engine
            .index_note_concepts_at("f.md", &names(&["z"]), &[0.8], t0)
            .unwrap();

        let keys: Vec<String> = engine
            .discover_associations()
            .iter()
            .map(NoteAssociation::pair_key)
            .collect();
        assert_eq!(keys, vec!["c.md|d.md", "a.md|b.md", "e.md|f.md"]);
    }

    #[test]
    fn test_max_associations_truncates_and_zero_is_empty() {
        let mut engine = engine();
        for id in ["a.md", "b.md", "c.md", "d.md"] {
            engine.index_note_concepts(id, &names(&["x"]), &[0.9]).unwrap();
        }
        assert_eq!(engine.discover_associations().len(), 6);

        engine
            .update_config(AssociationConfig {
                max_associations: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(engine.discover_associations().len(), 2);

        engine
            .update_config(AssociationConfig {
                max_associations: 0,
                ..Default::default()
            })
            .unwrap();
        assert!(engine.discover_associations().is_empty());
    }

    #[test]
    fn test_reindex_replaces_entries() {
        let mut engine = engine();
        engine
            .index_note_concepts("a.md", &names(&["x", "y"]), &[0.9, 0.7])
            .unwrap();
        engine
            .index_note_concepts("a.md", &names(&["x", "y"]), &[0.9, 0.7])
            .unwrap();
        assert_eq!(engine.get_notes_for_concept("x"), vec!["a.md"]);

        engine
            .index_note_concepts("a.md", &names(&["z"]), &[0.6])
            .unwrap();
        assert!(engine.get_notes_for_concept("x").is_empty());
        assert_eq!(engine.get_note_concepts("a.md"), vec!["z"]);
        let concepts: Vec<_> = engine
            .export_concept_index()
            .into_iter()
            .map(|e| e.concept)
            .collect();
        assert_eq!(concepts, vec!["z"]);
    }

    #[test]
    fn test_remove_note_recomputes_average_and_drops_empty_concepts() {
        let mut engine = engine();
        engine
            .index_note_concepts("a.md", &names(&["x", "solo"]), &[1.0, 0.7])
            .unwrap();
        engine
            .index_note_concepts("b.md", &names(&["x"]), &[0.6])
            .unwrap();
        engine
            .index_note_concepts("c.md", &names(&["x"]), &[0.8])
            .unwrap();

        let avg = |engine: &AssociationEngine| {
            engine
                .export_concept_index()
                .into_iter()
                .find(|e| e.concept == "x")
                .map(|e| e.avg_confidence)
        };
        assert!((avg(&engine).unwrap() - 0.8).abs() < 1e-6);

        assert!(engine.remove_note("a.md"));
        assert!((avg(&engine).unwrap() - 0.7).abs() < 1e-6);
        assert!(engine.get_note_concepts("a.md").is_empty());
        assert!(engine
            .export_concept_index()
            .iter()
            .all(|e| e.concept != "solo"));
        assert!(!engine.remove_note("a.md"));
    }

    #[test]
    fn test_index_rejects_misaligned_confidences() {
        let mut engine = engine();
        let err = engine
            .index_note_concepts("a.md", &names(&["x", "y"]), &[0.9])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!engine.contains_note("a.md"));
    }

    #[test]
    fn test_duplicate_names_keep_highest_confidence() {
        let mut engine = engine();
        engine
            .index_note_concepts("a.md", &names(&["x", "x"]), &[0.2, 0.9])
            .unwrap();
        assert_eq!(engine.get_note_concepts("a.md"), vec!["x"]);
        assert!((engine.export_concept_index()[0].avg_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_empty_concept_list_removes_note() {
        let mut engine = engine();
        engine.index_note_concepts("a.md", &names(&["x"]), &[0.9]).unwrap();
        engine.index_note_concepts("a.md", &[], &[]).unwrap();
        assert!(!engine.contains_note("a.md"));
        assert_eq!(engine.get_stats().total_concepts, 0);
    }

    #[test]
    fn test_stats_report_theoretical_pair_count() {
        let mut engine = AssociationEngine::new(AssociationConfig {
            min_confidence: 0.99,
            ..Default::default()
        })
        .unwrap();
        engine
            .index_note_concepts("a.md", &names(&["x", "y"]), &[0.6, 0.6])
            .unwrap();
        engine
            .index_note_concepts("b.md", &names(&["y", "z"]), &[0.6, 0.6])
            .unwrap();
        engine
            .index_note_concepts("c.md", &names(&["z", "w"]), &[0.6, 0.6])
            .unwrap();

        let stats = engine.get_stats();
        assert_eq!(stats.total_notes, 3);
        assert_eq!(stats.total_concepts, 4);
        assert_eq!(stats.total_associations, 3);
        assert!((stats.avg_concepts_per_note - 2.0).abs() < 1e-6);
        assert!((stats.avg_notes_per_concept - 1.5).abs() < 1e-6);
        assert!(engine.discover_associations().is_empty());
    }

    #[test]
    fn test_stats_on_empty_engine() {
        let stats = engine().get_stats();
        assert_eq!(stats.total_notes, 0);
        assert_eq!(stats.total_associations, 0);
        assert_eq!(stats.avg_concepts_per_note, 0.0);
    }

    #[test]
    fn test_for_note_filters_full_result() {
        let mut engine = engine();
        engine.index_note_concepts("a.md", &names(&["x"]), &[0.9]).unwrap();
        engine.index_note_concepts("b.md", &names(&["x"]), &[0.9]).unwrap();
        engine.index_note_concepts("c.md", &names(&["y"]), &[0.9]).unwrap();
        engine.index_note_concepts("d.md", &names(&["y"]), &[0.9]).unwrap();

        let for_a = engine.discover_associations_for_note("a.md");
        assert_eq!(for_a.len(), 1);
        assert!(for_a[0].involves("b.md"));
        assert!(engine.discover_associations_for_note("zzz.md").is_empty());
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut engine = engine();
        kafka_and_order(&mut engine);
        let snapshot = engine.snapshot();

        let mut restored = self::engine();
        restored.restore(&snapshot).unwrap();
        assert_eq!(restored.export_concept_index(), engine.export_concept_index());
        assert_eq!(restored.discover_associations(), engine.discover_associations());

        restored.clear();
        assert_eq!(restored.get_stats().total_notes, 0);
    }

    #[test]
    fn test_restore_failure_leaves_engine_unchanged() {
        let mut engine = engine();
        kafka_and_order(&mut engine);
        let bad = EngineSnapshot {
            notes: vec![IndexedNote {
                note_id: "x.md".to_string(),
                concepts: names(&["a", "b"]),
                confidences: vec![0.5],
                indexed_at: Utc::now(),
            }],
        };
        assert!(engine.restore(&bad).is_err());
        assert_eq!(engine.get_stats().total_notes, 2);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let mut engine = engine();
        let bad = AssociationConfig {
            min_shared_concepts: 0,
            ..Default::default()
        };
        assert!(engine.update_config(bad).is_err());
        assert_eq!(engine.config().min_shared_concepts, 1);
    }
}
