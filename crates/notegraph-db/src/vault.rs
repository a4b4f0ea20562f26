//! Note store over a directory of markdown files.
//!
//! Note ids are vault-relative paths with `/` separators. Concept metadata
//! lives in the YAML frontmatter under `concepts` and `indexedAt`; every other
//! frontmatter key is preserved on write.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use notegraph_core::markdown::{extract_inline_hashtags, split_frontmatter};
use notegraph_core::{defaults, Error, NoteContent, NoteMetadata, NoteStore, Result};

const CONCEPTS_KEY: &str = "concepts";
const INDEXED_AT_KEY: &str = "indexedAt";

/// Markdown vault [`NoteStore`].
#[derive(Debug, Clone)]
pub struct VaultNoteStore {
    root: PathBuf,
    concept_dir: String,
}

impl VaultNoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            concept_dir: defaults::CONCEPT_PAGE_DIR.to_string(),
        }
    }

    /// Folder for generated concept pages, relative to the root.
    pub fn with_concept_dir(mut self, dir: impl Into<String>) -> Self {
        self.concept_dir = dir.into().trim_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a note id to a path inside the vault.
    fn resolve(&self, note_id: &str) -> Result<PathBuf> {
        let relative = Path::new(note_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if note_id.is_empty() || escapes {
            return Err(Error::InvalidInput(format!(
                "note id '{}' is not a path inside the vault",
                note_id
            )));
        }
        Ok(self.root.join(relative))
    }

    fn page_path(&self, concept: &str) -> PathBuf {
        let file: String = concept
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
                c => c,
            })
            .collect();
        self.root
            .join(&self.concept_dir)
            .join(format!("{}.md", file.trim()))
    }

    async fn read_text(&self, note_id: &str) -> Result<String> {
        let path = self.resolve(note_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("note '{}'", note_id)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse a frontmatter block into a mapping. An empty block is an empty mapping.
fn parse_mapping(yaml: &str) -> Result<Mapping> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(Error::Serialization(
            "frontmatter is not a key/value mapping".to_string(),
        )),
    }
}

/// Strings from a scalar or sequence value.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().trim_start_matches('#').to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("md.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl NoteStore for VaultNoteStore {
    async fn list_note_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if dir == self.root && name == self.concept_dir {
                        continue;
                    }
                    pending.push(path);
                } else if file_type.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
                {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        let id = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/");
                        ids.push(id);
                    }
                }
            }
        }

        ids.sort();
        debug!(subsystem = "db", component = "vault", count = ids.len(), "Listed vault notes");
        Ok(ids)
    }

    async fn read_note(&self, note_id: &str) -> Result<NoteContent> {
        let text = self.read_text(note_id).await?;
        let (yaml, body) = split_frontmatter(&text);

        let mapping = match yaml.map(parse_mapping).transpose() {
            Ok(mapping) => mapping.unwrap_or_default(),
            Err(e) => {
                warn!(note_id, error = %e, "Ignoring unparseable frontmatter");
                Mapping::new()
            }
        };

        let mut tags = string_list(mapping.get("tags"));
        for tag in extract_inline_hashtags(body) {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                tags.push(tag);
            }
        }

        let title = match mapping.get("title") {
            Some(Value::String(t)) if !t.trim().is_empty() => t.trim().to_string(),
            _ => Path::new(note_id)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| note_id.to_string()),
        };

        Ok(NoteContent {
            id: note_id.to_string(),
            title,
            text,
            tags,
        })
    }

    async fn read_metadata(&self, note_id: &str) -> Result<Option<NoteMetadata>> {
        let text = self.read_text(note_id).await?;
        let Some(yaml) = split_frontmatter(&text).0 else {
            return Ok(None);
        };
        let mapping = parse_mapping(yaml)?;

        let indexed_at = match mapping.get(INDEXED_AT_KEY) {
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    Error::Serialization(format!("{} in {}: {}", INDEXED_AT_KEY, note_id, e))
                })?,
            _ => return Ok(None),
        };

        Ok(Some(NoteMetadata {
            concepts: string_list(mapping.get(CONCEPTS_KEY)),
            indexed_at,
        }))
    }

    async fn write_metadata(&self, note_id: &str, metadata: &NoteMetadata) -> Result<()> {
        let path = self.resolve(note_id)?;
        let text = self.read_text(note_id).await?;
        let (yaml, body) = split_frontmatter(&text);

        // Refuse to rewrite frontmatter we cannot parse rather than clobber it.
        let mut mapping = yaml.map(parse_mapping).transpose()?.unwrap_or_default();
        mapping.insert(
            Value::String(CONCEPTS_KEY.to_string()),
            Value::Sequence(
                metadata
                    .concepts
                    .iter()
                    .map(|c| Value::String(c.clone()))
                    .collect(),
            ),
        );
        mapping.insert(
            Value::String(INDEXED_AT_KEY.to_string()),
            Value::String(metadata.indexed_at.to_rfc3339()),
        );

        let yaml = serde_yaml::to_string(&Value::Mapping(mapping))?;
        let updated = format!("---\n{}---\n{}", yaml, body);
        write_atomic(&path, &updated).await?;

        debug!(
            subsystem = "db",
            component = "vault",
            note_id,
            concept_count = metadata.concepts.len(),
            "Wrote note metadata"
        );
        Ok(())
    }

    async fn ensure_concept_page(&self, concept: &str, summary: &str) -> Result<bool> {
        let path = self.page_path(concept);
        if tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut front = Mapping::new();
        front.insert(
            Value::String("tags".to_string()),
            Value::Sequence(vec![Value::String("concept".to_string())]),
        );
        let yaml = serde_yaml::to_string(&Value::Mapping(front))?;
        let page = format!("---\n{}---\n# {}\n\n{}\n", yaml, concept, summary.trim());
        write_atomic(&path, &page).await?;

        debug!(subsystem = "db", component = "vault", concept, "Created concept page");
        Ok(true)
    }
}
