//! # notegraph-graph
//!
//! Association discovery over the note ↔ concept index.
//!
//! This crate provides:
//! - `AssociationEngine`: inverted index and ranked pairwise associations
//! - `PreferenceOverlay`: persisted ignore/delete filter over discovered associations
//!
//! ## Example
//!
//! ```rust,ignore
//! use notegraph_graph::{AssociationEngine, PreferenceOverlay};
//!
//! let mut engine = AssociationEngine::new(config.associations)?;
//! engine.index_note_concepts("kafka.md", &concepts, &confidences)?;
//! let overlay = PreferenceOverlay::load(preference_store).await?;
//! let visible = overlay.apply(engine.discover_associations());
//! ```

pub mod engine;
pub mod overlay;

pub use engine::{AssociationEngine, EngineSnapshot, IndexedNote};
pub use overlay::PreferenceOverlay;
