//! # notegraph-concepts
//!
//! Turning a note into a set of canonical concepts.
//!
//! This crate provides:
//! - `NoteTypeDetector`: skip rules for templates, vocabulary lists and image dumps
//! - `ConceptExtractor`: LLM extraction with malformed-JSON recovery and a
//!   rule-based fallback
//! - `ConceptRegistry`: two-tier vector deduplication against a `ConceptStore`
//! - `ConceptMatcher`: exact/alias resolution against the alias dictionary
//!
//! ## Example
//!
//! ```rust,ignore
//! use notegraph_concepts::{ConceptExtractor, ConceptRegistry};
//!
//! let extractor = ConceptExtractor::new(generator, config.extraction, config.skip_rules)?;
//! let outcome = extractor.extract(&note.text, Some(&note.title), &options).await;
//! for concept in &outcome.concepts {
//!     let resolved = registry.register_or_match(&concept.name, &concept.reason).await?;
//!     println!("{} -> {}", concept.name, resolved.concept);
//! }
//! ```

pub mod detector;
pub mod dictionary;
pub mod extractor;
pub mod matcher;
pub mod parse;
pub mod prompt;
pub mod quality;
pub mod registry;
pub mod rules;

pub use detector::NoteTypeDetector;
pub use dictionary::record_matches;
pub use extractor::ConceptExtractor;
pub use matcher::{normalize_term, ConceptMatcher};
pub use parse::{parse_concepts, ParseTier, ParsedConcepts};
pub use registry::{to_concept_match, ConceptRegistry};
