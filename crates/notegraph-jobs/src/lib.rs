//! # notegraph-jobs
//!
//! Note processing and graph maintenance for notegraph.
//!
//! This crate provides:
//! - `ExtractionPipeline`: detect, extract and resolve one note, then write
//!   the result back (metadata, concept pages, alias dictionary)
//! - `ConceptGraph`: single owner of the association index, driving batch
//!   sync and rebuild with a cooperative stop flag
//! - Progress notifications through `SyncListener`
//!
//! ## Example
//!
//! ```rust,ignore
//! use notegraph_jobs::{ConceptGraph, ExtractionPipeline};
//! use notegraph_core::StopFlag;
//!
//! let pipeline = ExtractionPipeline::new(notes.clone(), dictionary, extractor, None, config.pipeline)?;
//! let graph = ConceptGraph::new(pipeline, engine, overlay).with_listener(listener);
//!
//! let stop = StopFlag::new();
//! let report = graph.sync_all(&stop).await?;
//! println!("{} processed, {} failed", report.processed, report.failed);
//!
//! for association in graph.associations().await {
//!     println!("{} <-> {}", association.source_note_id, association.target_note_id);
//! }
//! ```

pub mod graph;
pub mod pipeline;

pub use graph::{ConceptGraph, SyncReport};
pub use pipeline::{ExtractionPipeline, NoteAnalysis};
