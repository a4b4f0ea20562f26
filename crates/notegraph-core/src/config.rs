//! Configuration for the concept graph components.
//!
//! Each component receives its own struct at construction time and accepts a
//! replacement through `update_config`, which validates before swapping.
//! [`NoteGraphConfig`] aggregates them and can be loaded from `NOTEGRAPH_*`
//! environment variables or a YAML file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults;
use crate::error::{Error, Result};

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(Error::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

// =============================================================================
// DETECTION
// =============================================================================

/// Rules deciding which notes skip extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipRules {
    /// Path prefixes whose notes are templates.
    pub skip_paths: Vec<String>,
    /// Tags marking vocabulary notes.
    pub skip_tags: Vec<String>,
    /// Minimum stripped text length in chars.
    pub min_text_length: usize,
    /// Maximum weighted image-to-content ratio.
    pub max_image_ratio: f32,
}

impl Default for SkipRules {
    fn default() -> Self {
        Self {
            skip_paths: vec!["templates/".to_string()],
            skip_tags: vec!["vocabulary".to_string()],
            min_text_length: defaults::MIN_TEXT_LENGTH,
            max_image_ratio: defaults::MAX_IMAGE_RATIO,
        }
    }
}

impl SkipRules {
    pub fn validate(&self) -> Result<()> {
        if self.max_image_ratio.is_nan() || self.max_image_ratio <= 0.0 {
            return Err(Error::Config(format!(
                "max_image_ratio must be positive, got {}",
                self.max_image_ratio
            )));
        }
        Ok(())
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Prompt style for concept extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Highest defensible abstraction level, reusing existing concepts.
    #[default]
    Abstract,
    /// Concrete noun-phrase topics.
    Literal,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abstract => write!(f, "abstract"),
            Self::Literal => write!(f, "literal"),
        }
    }
}

impl FromStr for ExtractionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abstract" => Ok(Self::Abstract),
            "literal" => Ok(Self::Literal),
            _ => Err(Error::Config(format!("Invalid extraction mode: {}", s))),
        }
    }
}

/// Output language of extracted concepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConceptLanguage {
    /// Keep the note's dominant language.
    #[default]
    Auto,
    /// Translate concepts into this language code (e.g. `en`, `zh`).
    Code(String),
}

impl From<String> for ConceptLanguage {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Self::Auto
        } else {
            Self::Code(trimmed.to_string())
        }
    }
}

impl From<ConceptLanguage> for String {
    fn from(lang: ConceptLanguage) -> Self {
        lang.to_string()
    }
}

impl fmt::Display for ConceptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Code(code) => write!(f, "{}", code),
        }
    }
}

/// Concept extractor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub mode: ExtractionMode,
    pub language: ConceptLanguage,
    pub max_concepts: usize,
    /// Concepts below this confidence are dropped.
    pub min_confidence: f32,
    /// Case-insensitive substrings that mark a concept as too generic.
    pub generic_terms: Vec<String>,
    /// Abort window for one LLM call.
    pub llm_timeout_secs: u64,
    /// Maximum note characters placed into the prompt.
    pub max_prompt_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::default(),
            language: ConceptLanguage::default(),
            max_concepts: defaults::MAX_CONCEPTS,
            min_confidence: defaults::MIN_CONCEPT_CONFIDENCE,
            generic_terms: defaults::GENERIC_CONCEPT_TERMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            llm_timeout_secs: defaults::LLM_TIMEOUT_SECS,
            max_prompt_chars: defaults::MAX_PROMPT_CHARS,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit("min_confidence", self.min_confidence)?;
        if self.max_concepts == 0 {
            return Err(Error::Config("max_concepts must be at least 1".to_string()));
        }
        if self.llm_timeout_secs == 0 {
            return Err(Error::Config(
                "llm_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_prompt_chars == 0 {
            return Err(Error::Config(
                "max_prompt_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Concept registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name-vector threshold for a strict match.
    pub strict_threshold: f32,
    /// Fused-score threshold for a loose match.
    pub similarity_threshold: f32,
    /// Folder prefix of minted links.
    pub link_prefix: String,
    /// Transport timeout for one embedding call.
    pub embed_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strict_threshold: defaults::STRICT_MATCH_THRESHOLD,
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            link_prefix: defaults::CONCEPT_LINK_PREFIX.to_string(),
            embed_timeout_secs: defaults::EMBED_TIMEOUT_SECS,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit("strict_threshold", self.strict_threshold)?;
        check_unit("similarity_threshold", self.similarity_threshold)?;
        if self.strict_threshold < self.similarity_threshold {
            return Err(Error::Config(format!(
                "strict_threshold ({}) must not be below similarity_threshold ({})",
                self.strict_threshold, self.similarity_threshold
            )));
        }
        if self.link_prefix.trim().is_empty() {
            return Err(Error::Config("link_prefix cannot be empty".to_string()));
        }
        if self.embed_timeout_secs == 0 {
            return Err(Error::Config(
                "embed_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Cross-reference link for a concept, e.g. `[[concepts/Idempotency]]`.
    pub fn link_for(&self, concept: &str) -> String {
        format!("[[{}/{}]]", self.link_prefix.trim_matches('/'), concept)
    }
}

// =============================================================================
// ASSOCIATIONS
// =============================================================================

/// Association discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    pub min_shared_concepts: usize,
    pub min_confidence: f32,
    /// Results beyond this count are truncated. Zero yields nothing.
    pub max_associations: usize,
    pub exclude_self_associations: bool,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            min_shared_concepts: defaults::MIN_SHARED_CONCEPTS,
            min_confidence: defaults::MIN_ASSOCIATION_CONFIDENCE,
            max_associations: defaults::MAX_ASSOCIATIONS,
            exclude_self_associations: true,
        }
    }
}

impl AssociationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_shared_concepts < 1 {
            return Err(Error::Config(
                "min_shared_concepts must be at least 1".to_string(),
            ));
        }
        check_unit("min_confidence", self.min_confidence)
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Extraction pipeline side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Create a page for every newly minted concept.
    pub create_concept_pages: bool,
    /// Vault folder holding concept pages.
    pub concept_page_dir: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            create_concept_pages: false,
            concept_page_dir: defaults::CONCEPT_PAGE_DIR.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.create_concept_pages && self.concept_page_dir.trim().is_empty() {
            return Err(Error::Config(
                "concept_page_dir cannot be empty when concept pages are enabled".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// AGGREGATE
// =============================================================================

/// Complete notegraph configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteGraphConfig {
    pub skip_rules: SkipRules,
    pub extraction: ExtractionConfig,
    pub registry: RegistryConfig,
    pub associations: AssociationConfig,
    pub pipeline: PipelineConfig,
}

impl NoteGraphConfig {
    pub fn validate(&self) -> Result<()> {
        self.skip_rules.validate()?;
        self.extraction.validate()?;
        self.registry.validate()?;
        self.associations.validate()?;
        self.pipeline.validate()
    }

    /// Load from `NOTEGRAPH_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a YAML file. Missing sections take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&raw)?;
        debug!(path = %path.display(), "Loaded notegraph config file");
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
        ) -> Result<Option<T>> {
            match lookup(key) {
                Some(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse::<T>()
                    .map(Some)
                    .map_err(|_| Error::Config(format!("{} has invalid value: {}", key, raw))),
                _ => Ok(None),
            }
        }

        fn list(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
            lookup(key).map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let mut config = Self::default();

        if let Some(paths) = list(lookup, "NOTEGRAPH_SKIP_PATHS") {
            config.skip_rules.skip_paths = paths;
        }
        if let Some(tags) = list(lookup, "NOTEGRAPH_SKIP_TAGS") {
            config.skip_rules.skip_tags = tags;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_MIN_TEXT_LENGTH")? {
            config.skip_rules.min_text_length = v;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_MAX_IMAGE_RATIO")? {
            config.skip_rules.max_image_ratio = v;
        }

        if let Some(v) = parsed(lookup, "NOTEGRAPH_EXTRACTION_MODE")? {
            config.extraction.mode = v;
        }
        if let Some(lang) = lookup("NOTEGRAPH_LANGUAGE") {
            config.extraction.language = ConceptLanguage::from(lang);
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_MAX_CONCEPTS")? {
            config.extraction.max_concepts = v;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_MIN_CONFIDENCE")? {
            config.extraction.min_confidence = v;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_LLM_TIMEOUT_SECS")? {
            config.extraction.llm_timeout_secs = v;
        }

        if let Some(v) = parsed(lookup, "NOTEGRAPH_STRICT_THRESHOLD")? {
            config.registry.strict_threshold = v;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_SIMILARITY_THRESHOLD")? {
            config.registry.similarity_threshold = v;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_EMBED_TIMEOUT_SECS")? {
            config.registry.embed_timeout_secs = v;
        }

        if let Some(v) = parsed(lookup, "NOTEGRAPH_MIN_SHARED_CONCEPTS")? {
            config.associations.min_shared_concepts = v;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_MIN_ASSOCIATION_CONFIDENCE")? {
            config.associations.min_confidence = v;
        }
        if let Some(v) = parsed(lookup, "NOTEGRAPH_MAX_ASSOCIATIONS")? {
            config.associations.max_associations = v;
        }

        if let Some(v) = parsed(lookup, "NOTEGRAPH_CREATE_CONCEPT_PAGES")? {
            config.pipeline.create_concept_pages = v;
        }

        config.validate()?;
        Ok(config)
    }
}
