//! provenance-transport: the Agent Transport contract and its two variants.
//!
//! Both [`ssh::SshTransport`] (POSIX, key authentication, host-key checking
//! disabled) and [`winrm::WinrmTransport`] (Windows, NTLM username/password)
//! implement the same four-operation [`AgentTransport`] trait: detect OS,
//! deploy, execute, collect, cleanup.

pub mod ssh;
pub mod winrm;

use async_trait::async_trait;
use provenance_core::ProvenanceError;
use provenance_core::snapshot::ExtractorRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOs {
    Linux,
    Macos,
    Windows,
}

impl RemoteOs {
    pub fn agent_build_dir(&self) -> &'static str {
        match self {
            RemoteOs::Linux => "build/linux/provenance_agent",
            RemoteOs::Macos => "build/macos/provenance_agent",
            RemoteOs::Windows => "build/windows/provenance_agent.exe",
        }
    }

    pub fn remote_dir(&self) -> &'static str {
        match self {
            RemoteOs::Linux | RemoteOs::Macos => "/tmp/provenance_agent",
            RemoteOs::Windows => r"C:\tmp\provenance_agent",
        }
    }

    pub fn remote_binary(&self) -> &'static str {
        match self {
            RemoteOs::Linux | RemoteOs::Macos => "agent",
            RemoteOs::Windows => "agent.exe",
        }
    }
}

/// The common contract implemented by both SSH and WinRM variants.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Host or address this transport targets, for logging and file naming.
    fn target(&self) -> &str;

    /// Probes the remote with a short platform-identifying command;
    /// classifies the family. Fails with [`ProvenanceError::RemoteOsUnknown`]
    /// if neither POSIX nor Windows responds.
    async fn detect_os(&self) -> Result<RemoteOs, ProvenanceError>;

    /// Creates the remote working directory, uploads the OS-appropriate
    /// agent binary, marks it executable.
    async fn deploy(&self, os: RemoteOs) -> Result<(), ProvenanceError>;

    /// Runs the agent synchronously with a hard timeout; surfaces any
    /// non-zero exit as [`ProvenanceError::ExecuteFailed`].
    async fn execute(&self, os: RemoteOs) -> Result<(), ProvenanceError>;

    /// Downloads the result files to a local directory under a per-host,
    /// timestamped name and parses the JSON for the pipeline.
    async fn collect(&self, os: RemoteOs, local_dir: &std::path::Path) -> Result<ExtractorRecord, ProvenanceError>;

    /// Best-effort removal of the remote working directory; failures here
    /// never propagate.
    async fn cleanup(&self, os: RemoteOs);
}

/// Runs the full deploy → execute → collect → cleanup sequence for one
/// target, matching the orchestration every transport variant shares.
pub async fn extract_from(
    transport: &dyn AgentTransport,
    local_dir: &std::path::Path,
) -> Result<ExtractorRecord, ProvenanceError> {
    let os = transport.detect_os().await?;
    transport.deploy(os).await?;
    let result = async {
        transport.execute(os).await?;
        transport.collect(os, local_dir).await
    }
    .await;
    transport.cleanup(os).await;
    result
}

/// Builds the local collected-file stem `phase2_<host>_<YYYYmmdd_HHMMSS>`.
pub fn collected_file_stem(host: &str, at: chrono::DateTime<chrono::Utc>) -> String {
    format!("phase2_{host}_{}", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_dirs_match_the_documented_layout() {
        assert_eq!(RemoteOs::Linux.remote_dir(), "/tmp/provenance_agent");
        assert_eq!(RemoteOs::Windows.remote_dir(), r"C:\tmp\provenance_agent");
        assert_eq!(RemoteOs::Windows.remote_binary(), "agent.exe");
        assert_eq!(RemoteOs::Linux.remote_binary(), "agent");
    }

    #[test]
    fn collected_file_stem_matches_naming_convention() {
        let at = chrono::DateTime::parse_from_rfc3339("2026-07-31T10:15:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(collected_file_stem("10.0.0.20", at), "phase2_10.0.0.20_20260731_101500");
    }
}
