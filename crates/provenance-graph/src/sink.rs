//! The Graph Sink contract (§4.10): `clear`, `push`, `close`. A sink is an
//! adapter; the builder never depends on its internals.

use async_trait::async_trait;
use provenance_core::ProvenanceError;

use crate::builder::Graph;

#[async_trait]
pub trait GraphSink: Send + Sync {
    /// Removes all prior data from the sink.
    async fn clear(&self) -> Result<(), ProvenanceError>;

    /// Idempotently writes every node and edge in `graph`. Each node is
    /// upserted by its identity key; each edge by (src, dst, rel_type).
    async fn push(&self, graph: &Graph) -> Result<(), ProvenanceError>;

    /// Releases any held resources (connections, file handles).
    async fn close(&self) -> Result<(), ProvenanceError>;
}
