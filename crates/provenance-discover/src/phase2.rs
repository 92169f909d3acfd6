//! Phase 2 — remote extraction. Selects eligible targets out of Phase 1's
//! results, dispatches an [`AgentTransport`] to each (sequential by default,
//! optionally a bounded pool), and always runs the scanner's own extractors
//! for the local node.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use provenance_core::config::Phase2Config;
use provenance_core::snapshot::{ExtractorRecord, HostType, OsRecord, PhaseOneResult};
use provenance_transport::ssh::SshTransport;
use provenance_transport::winrm::WinrmTransport;
use provenance_transport::{extract_from, AgentTransport};
use tokio::sync::Semaphore;

use crate::interface_selector::SelectedInterface;

/// SSH/WinRM credentials the target agent is reachable with. Not named by
/// the source scanner's config surface; this scanner reads them from the
/// environment with lab-sensible defaults.
pub struct Credentials {
    pub ssh_user: String,
    pub ssh_key_path: String,
    pub winrm_user: String,
    pub winrm_password: String,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            ssh_user: std::env::var("PROVENANCE_SSH_USER").unwrap_or_else(|_| "lab".to_string()),
            ssh_key_path: std::env::var("PROVENANCE_SSH_KEY").unwrap_or_else(|_| "~/.ssh/id_ed25519".to_string()),
            winrm_user: std::env::var("PROVENANCE_WINRM_USER").unwrap_or_else(|_| "Administrator".to_string()),
            winrm_password: std::env::var("PROVENANCE_WINRM_PASSWORD").unwrap_or_default(),
        }
    }
}

/// A target is eligible when its owning interface was selected for a
/// "host-only" reason, its IP isn't the scanner itself, its inferred role
/// isn't a gateway/network device, and it exposes SSH or WinRM.
fn is_eligible(
    ip: &str,
    detail_ports: &std::collections::BTreeSet<u16>,
    host_type: Option<HostType>,
    selected: &SelectedInterface,
    local_ips: &[String],
    local_hostname: &str,
) -> bool {
    if !selected.is_laboratory() {
        return false;
    }
    if local_ips.iter().any(|local| local == ip) || ip == local_hostname {
        return false;
    }
    if matches!(host_type, Some(HostType::Gateway) | Some(HostType::NetworkDevice)) {
        return false;
    }
    detail_ports.contains(&22) || detail_ports.contains(&5985) || detail_ports.contains(&5986)
}

fn choose_transport(ip: &str, detail_ports: &std::collections::BTreeSet<u16>, creds: &Credentials) -> Arc<dyn AgentTransport> {
    if detail_ports.contains(&5985) || detail_ports.contains(&5986) {
        Arc::new(WinrmTransport::new(ip, creds.winrm_user.clone(), creds.winrm_password.clone()))
    } else {
        Arc::new(SshTransport::new(ip, creds.ssh_user.clone(), creds.ssh_key_path.clone()))
    }
}

/// Selects and extracts from every eligible target across `phase1_results`,
/// plus the local node via `provenance_extract::run_all`. Per-target
/// failures are folded into that host's [`ExtractorRecord::error`] rather
/// than aborting the phase.
pub async fn run(
    phase1_results: &BTreeMap<String, (SelectedInterface, PhaseOneResult)>,
    local_ips: &[String],
    local_hostname: &str,
    local_dir: &Path,
    cfg: &Phase2Config,
    creds: &Credentials,
) -> BTreeMap<String, ExtractorRecord> {
    let mut targets: Vec<(String, std::collections::BTreeSet<u16>)> = Vec::new();
    for (selected, result) in phase1_results.values() {
        for (ip, detail) in &result.details {
            if is_eligible(ip, &detail.tcp, detail.host_type, selected, local_ips, local_hostname) {
                targets.push((ip.clone(), detail.tcp.clone()));
            }
        }
    }

    let mut records = BTreeMap::new();
    records.insert(local_hostname.to_string(), provenance_extract::run_all());

    if cfg.concurrency <= 1 {
        for (ip, ports) in targets {
            let record = extract_one(&ip, &ports, local_dir, creds).await;
            records.insert(ip, record);
        }
        return records;
    }

    let semaphore = Arc::new(Semaphore::new(cfg.concurrency));
    let local_dir = local_dir.to_path_buf();
    let mut handles = Vec::with_capacity(targets.len());
    for (ip, ports) in targets {
        let semaphore = semaphore.clone();
        let local_dir = local_dir.clone();
        let ssh_user = creds.ssh_user.clone();
        let ssh_key_path = creds.ssh_key_path.clone();
        let winrm_user = creds.winrm_user.clone();
        let winrm_password = creds.winrm_password.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let creds = Credentials { ssh_user, ssh_key_path, winrm_user, winrm_password };
            let record = extract_one(&ip, &ports, &local_dir, &creds).await;
            (ip, record)
        }));
    }
    for handle in handles {
        if let Ok((ip, record)) = handle.await {
            records.insert(ip, record);
        }
    }
    records
}

async fn extract_one(
    ip: &str,
    ports: &std::collections::BTreeSet<u16>,
    local_dir: &Path,
    creds: &Credentials,
) -> ExtractorRecord {
    let transport = choose_transport(ip, ports, creds);
    match extract_from(transport.as_ref(), local_dir).await {
        Ok(record) => record,
        Err(err) => ExtractorRecord {
            os: OsRecord {
                error: Some(err.to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn host_only_interface() -> SelectedInterface {
        SelectedInterface {
            name: "eth1".to_string(),
            ip: "192.168.56.1".to_string(),
            netmask: "255.255.255.0".to_string(),
            score: 100,
            reasons: vec!["Vagrant Host-Only".to_string()],
        }
    }

    #[test]
    fn rejects_non_laboratory_interfaces() {
        let selected = SelectedInterface {
            name: "eth0".to_string(),
            ip: "10.0.0.5".to_string(),
            netmask: "255.255.255.0".to_string(),
            score: 4,
            reasons: vec!["Private network".to_string()],
        };
        let ports = BTreeSet::from([22]);
        assert!(!is_eligible("10.0.0.20", &ports, None, &selected, &[], "scanner"));
    }

    #[test]
    fn rejects_the_scanner_itself() {
        let selected = host_only_interface();
        let ports = BTreeSet::from([22]);
        assert!(!is_eligible(
            "192.168.56.1",
            &ports,
            None,
            &selected,
            &["192.168.56.1".to_string()],
            "scanner"
        ));
    }

    #[test]
    fn rejects_gateways_and_network_devices() {
        let selected = host_only_interface();
        let ports = BTreeSet::from([22]);
        assert!(!is_eligible("192.168.56.254", &ports, Some(HostType::Gateway), &selected, &[], "scanner"));
        assert!(!is_eligible("192.168.56.10", &ports, Some(HostType::NetworkDevice), &selected, &[], "scanner"));
    }

    #[test]
    fn requires_ssh_or_winrm_exposure() {
        let selected = host_only_interface();
        let no_match = BTreeSet::from([80]);
        assert!(!is_eligible("192.168.56.20", &no_match, None, &selected, &[], "scanner"));
        let ssh = BTreeSet::from([22]);
        assert!(is_eligible("192.168.56.20", &ssh, None, &selected, &[], "scanner"));
    }

    #[test]
    fn transport_choice_prefers_winrm_when_exposed() {
        let creds = Credentials {
            ssh_user: "lab".to_string(),
            ssh_key_path: "/key".to_string(),
            winrm_user: "Administrator".to_string(),
            winrm_password: "hunter2".to_string(),
        };
        let winrm_ports = BTreeSet::from([5985]);
        let transport = choose_transport("192.168.56.21", &winrm_ports, &creds);
        assert_eq!(transport.target(), "192.168.56.21");
    }
}
