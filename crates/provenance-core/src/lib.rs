//! provenance-core: shared types, configuration, and error handling for the
//! provenance scanner workspace.
//!
//! This crate provides the foundational types used across all scanner
//! components:
//! - Per-host extractor record sections (OS, hardware, network, ...)
//! - The snapshot and phase-1 discovery result types
//! - The graph entity/edge vocabulary shared by the graph builder and sinks
//! - Layered configuration
//! - The common error type

pub mod config;
pub mod error;
pub mod graph;
pub mod snapshot;

pub use error::ProvenanceError;
