//! # notegraph-core
//!
//! Core types, traits, and abstractions for the notegraph concept graph.
//!
//! This crate provides the foundational data structures, collaborator trait
//! definitions, and configuration that the other notegraph crates depend on.
//! Apart from reading a config file it performs no I/O. The `markdown`
//! module holds the text scanning shared by note detection, rule-based
//! extraction and the vault store.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod markdown;
pub mod models;
pub mod stop;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::*;
pub use error::{Error, Result};
pub use models::*;
pub use stop::StopFlag;
pub use traits::*;
