//! provenance-graph — the in-memory provenance graph builder, its derived
//! metrics, and its pluggable sinks.
//!
//! [`builder::GraphBuilder`] is the single mutation point for the graph:
//! it consumes one [`provenance_core::snapshot::Snapshot`] per run and
//! produces a [`builder::Graph`] with stable node identity and
//! de-duplicated edges. [`sink::GraphSink`] implementations push that graph
//! to an external store without the builder depending on their internals.

pub mod builder;
pub mod file_sink;
pub mod metrics;
pub mod neo4j_sink;
pub mod sink;

pub use builder::{Graph, GraphBuilder};
pub use sink::GraphSink;
