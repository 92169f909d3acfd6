//! provenance-extract: per-subject host-state extractors.
//!
//! Each extractor is a pure function `() -> Record` (no arguments besides
//! what it reads from the live host). Every extractor tolerates permission
//! errors and missing tools: on failure it returns a partial record with its
//! `error` field set rather than propagating a [`ProvenanceError`]. Platform
//! dispatch happens inside each module via `cfg(target_os = ...)`, never in
//! the caller.

pub mod hardware;
pub mod network;
pub mod os;
pub mod routing;
pub mod services;
pub mod software;
pub mod users;
pub mod virtualization;

use provenance_core::snapshot::ExtractorRecord;

/// Runs every extractor in the fixed order mandated for the remote agent:
/// OS, hardware, network, users, packages, services, routing, virtualization.
pub fn run_all() -> ExtractorRecord {
    ExtractorRecord {
        schema_version: provenance_core::snapshot::SCHEMA_VERSION,
        os: os::extract(),
        hardware: hardware::extract(),
        network: network::extract(),
        users: users::extract(),
        software: software::extract(),
        services: services::extract(),
        routing: routing::extract(),
        virtualization: virtualization::extract(),
    }
}
