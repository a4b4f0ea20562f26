//! Preference overlay: user overrides applied over discovered associations.
//!
//! Ignored pairs are dropped entirely; deleted concepts are removed from a
//! pair's shared list, dropping the pair once nothing is left. Every
//! mutation is saved before it becomes visible. A failed save leaves the
//! in-memory state as it was.

use std::sync::Arc;

use tracing::{info, warn};

use notegraph_core::{pair_key, Error, NoteAssociation, PreferenceState, PreferenceStore, Result};

/// Persisted ignore/delete filter.
pub struct PreferenceOverlay {
    store: Arc<dyn PreferenceStore>,
    state: PreferenceState,
}

impl PreferenceOverlay {
    /// Load the current state from `store`.
    pub async fn load(store: Arc<dyn PreferenceStore>) -> Result<Self> {
        let state = store.load().await?;
        info!(
            subsystem = "graph",
            component = "overlay",
            ignored = state.ignored_associations.len(),
            edited_pairs = state.deleted_concepts.len(),
            "Preference overlay loaded"
        );
        Ok(Self { store, state })
    }

    pub fn state(&self) -> &PreferenceState {
        &self.state
    }

    pub fn is_ignored(&self, a: &str, b: &str) -> bool {
        self.state.ignored_associations.contains(&pair_key(a, b))
    }

    /// Filter discovered associations. Never touches the engine's indices.
    pub fn apply(&self, associations: Vec<NoteAssociation>) -> Vec<NoteAssociation> {
        associations
            .into_iter()
            .filter_map(|mut association| {
                let key = association.pair_key();
                if self.state.ignored_associations.contains(&key) {
                    return None;
                }
                if let Some(deleted) = self.state.deleted_concepts.get(&key) {
                    association.shared_concepts.retain(|c| !deleted.contains(c));
                }
                (!association.shared_concepts.is_empty()).then_some(association)
            })
            .collect()
    }

    /// Hide the association between `a` and `b`.
    pub async fn ignore(&mut self, a: &str, b: &str) -> Result<()> {
        let key = checked_key(a, b)?;
        let mut next = self.state.clone();
        if !next.ignored_associations.insert(key.clone()) {
            return Ok(());
        }
        self.commit(next).await?;
        info!(pair_key = %key, "Association ignored");
        Ok(())
    }

    /// Undo [`ignore`](Self::ignore). Returns whether the pair was ignored.
    pub async fn unignore(&mut self, a: &str, b: &str) -> Result<bool> {
        let key = checked_key(a, b)?;
        let mut next = self.state.clone();
        if !next.ignored_associations.remove(&key) {
            return Ok(false);
        }
        self.commit(next).await?;
        info!(pair_key = %key, "Association restored");
        Ok(true)
    }

    /// Remove `concept` from the shared concepts of the `a`/`b` association.
    pub async fn delete_concept(&mut self, a: &str, b: &str, concept: &str) -> Result<()> {
        let key = checked_key(a, b)?;
        let concept = concept.trim();
        if concept.is_empty() {
            return Err(Error::InvalidInput("concept name is empty".to_string()));
        }
        let mut next = self.state.clone();
        if !next
            .deleted_concepts
            .entry(key.clone())
            .or_default()
            .insert(concept.to_string())
        {
            return Ok(());
        }
        self.commit(next).await?;
        info!(pair_key = %key, concept = %concept, "Shared concept deleted");
        Ok(())
    }

    /// Undo [`delete_concept`](Self::delete_concept). Returns whether anything changed.
    pub async fn restore_concept(&mut self, a: &str, b: &str, concept: &str) -> Result<bool> {
        let key = checked_key(a, b)?;
        let mut next = self.state.clone();
        let Some(deleted) = next.deleted_concepts.get_mut(&key) else {
            return Ok(false);
        };
        if !deleted.remove(concept.trim()) {
            return Ok(false);
        }
        if deleted.is_empty() {
            next.deleted_concepts.remove(&key);
        }
        self.commit(next).await?;
        Ok(true)
    }

    /// Forget every override.
    pub async fn reset(&mut self) -> Result<()> {
        self.commit(PreferenceState::default()).await?;
        info!("Preference overlay reset");
        Ok(())
    }

    async fn commit(&mut self, next: PreferenceState) -> Result<()> {
        if let Err(e) = self.store.save(&next).await {
            warn!(error = %e, "Failed to save preferences, change discarded");
            return Err(e);
        }
        self.state = next;
        Ok(())
    }
}

fn checked_key(a: &str, b: &str) -> Result<String> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::InvalidInput("note id is empty".to_string()));
    }
    if a == b {
        return Err(Error::InvalidInput(format!(
            "'{}' cannot be associated with itself",
            a
        )));
    }
    Ok(pair_key(a, b))
}
