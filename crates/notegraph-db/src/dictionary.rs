//! Alias dictionary stores.

use std::path::PathBuf;

use async_trait::async_trait;

use notegraph_core::{ConceptDictionary, DictionaryStore, Result};

use crate::json_file;

/// Alias dictionary as a pretty-printed JSON file (concept → entry map).
#[derive(Debug, Clone)]
pub struct JsonFileDictionaryStore {
    path: PathBuf,
}

impl JsonFileDictionaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DictionaryStore for JsonFileDictionaryStore {
    async fn load(&self) -> Result<ConceptDictionary> {
        json_file::read_or_default(&self.path).await
    }

    async fn save(&self, dictionary: &ConceptDictionary) -> Result<()> {
        json_file::write_atomic(&self.path, dictionary).await
    }
}
