//! Wiring of stores and backends for one vault.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use notegraph_concepts::{ConceptExtractor, ConceptRegistry};
use notegraph_core::{NoteGraphConfig, PreferenceStore, StopFlag};
use notegraph_db::{
    create_pool, json_file, JsonFileDictionaryStore, JsonFilePreferenceStore, PgConceptStore,
    PgPreferenceStore, VaultNoteStore,
};
use notegraph_graph::{AssociationEngine, EngineSnapshot, PreferenceOverlay};
use notegraph_inference::OllamaBackend;
use notegraph_jobs::{ConceptGraph, ExtractionPipeline};

use crate::output::ConsoleListener;

/// Hidden per-vault state directory.
const STATE_DIR: &str = ".notegraph";
const DICTIONARY_FILE: &str = "dictionary.json";
const PREFERENCES_FILE: &str = "preferences.json";
const INDEX_FILE: &str = "index.json";

pub struct App {
    pub graph: ConceptGraph,
    index_path: PathBuf,
}

impl App {
    /// Build the graph for `vault`.
    ///
    /// With `DATABASE_URL` set, concepts resolve through the PostgreSQL
    /// registry and preferences live in the database. Otherwise the alias
    /// dictionary and JSON files under `.notegraph/` are used.
    pub async fn open(vault: &Path, config: NoteGraphConfig) -> anyhow::Result<Self> {
        let state_dir = vault.join(STATE_DIR);
        let notes = Arc::new(
            VaultNoteStore::new(vault).with_concept_dir(config.pipeline.concept_page_dir.clone()),
        );
        let ollama = Arc::new(ollama_backend(&config));

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let (registry, preferences): (Option<ConceptRegistry>, Arc<dyn PreferenceStore>) =
            match database_url {
                Some(url) => {
                    let pool = create_pool(&url)
                        .await
                        .context("failed to connect to DATABASE_URL")?;
                    let concepts = PgConceptStore::new(pool.clone());
                    concepts.ensure_schema().await?;
                    let pg_preferences = PgPreferenceStore::new(pool);
                    pg_preferences.ensure_schema().await?;
                    let preferences: Arc<dyn PreferenceStore> = Arc::new(pg_preferences);
                    info!(subsystem = "cli", "Using PostgreSQL concept registry");
                    let registry =
                        ConceptRegistry::new(Arc::new(concepts), ollama.clone(), config.registry.clone())?;
                    (Some(registry), preferences)
                }
                None => {
                    info!(subsystem = "cli", "DATABASE_URL not set, using the alias dictionary");
                    let preferences: Arc<dyn PreferenceStore> =
                        Arc::new(JsonFilePreferenceStore::new(state_dir.join(PREFERENCES_FILE)));
                    (None, preferences)
                }
            };

        let extractor = ConceptExtractor::new(
            ollama,
            config.extraction.clone(),
            config.skip_rules.clone(),
        )?;
        let pipeline = ExtractionPipeline::new(
            notes,
            Arc::new(JsonFileDictionaryStore::new(state_dir.join(DICTIONARY_FILE))),
            extractor,
            registry,
            config.pipeline.clone(),
        )?;
        let overlay = PreferenceOverlay::load(preferences).await?;
        let engine = AssociationEngine::new(config.associations.clone())?;

        let graph = ConceptGraph::new(pipeline, engine, overlay).with_listener(Arc::new(ConsoleListener));
        Ok(Self {
            graph,
            index_path: state_dir.join(INDEX_FILE),
        })
    }

    /// Load the saved index, rebuilding it from note metadata when none exists.
    pub async fn load_index(&self, stop: &StopFlag) -> anyhow::Result<()> {
        let snapshot: EngineSnapshot = json_file::read_or_default(&self.index_path)
            .await
            .with_context(|| format!("failed to read {}", self.index_path.display()))?;
        if snapshot.notes.is_empty() {
            info!(subsystem = "cli", "No saved index, rebuilding from note metadata");
            self.graph.rebuild_index(stop).await?;
            return Ok(());
        }
        self.graph.restore(&snapshot).await?;
        Ok(())
    }

    pub async fn save_index(&self) -> anyhow::Result<()> {
        let snapshot = self.graph.snapshot().await;
        json_file::write_atomic(&self.index_path, &snapshot)
            .await
            .with_context(|| format!("failed to write {}", self.index_path.display()))?;
        Ok(())
    }
}

/// Ollama connection settings come from the environment; timeouts come from
/// the loaded config so the transport never ends a call before the extractor.
fn ollama_backend(config: &NoteGraphConfig) -> OllamaBackend {
    OllamaBackend::from_env()
        .with_gen_timeout(config.extraction.llm_timeout_secs)
        .with_embed_timeout(config.registry.embed_timeout_secs)
}

/// Config file if given, otherwise `NOTEGRAPH_*` environment variables.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<NoteGraphConfig> {
    let config = match path {
        Some(path) => NoteGraphConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => NoteGraphConfig::from_env()?,
    };
    Ok(config)
}
