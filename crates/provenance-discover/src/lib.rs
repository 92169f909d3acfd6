//! provenance-discover: the four-phase discovery pipeline and its CLI.
//!
//! Phase 0 inventories the scanner itself, the Interface Selector ranks its
//! interfaces for active probing, Phase 1 sweeps each selected interface's
//! subnet, and Phase 2 extracts from the reachable remote targets. The
//! Snapshot Formatter folds all three into one immutable record that
//! [`provenance_graph::GraphBuilder`] consumes.

pub mod formatter;
pub mod interface_selector;
pub mod persist;
pub mod phase0;
pub mod phase1;
pub mod phase2;
pub mod topology;
