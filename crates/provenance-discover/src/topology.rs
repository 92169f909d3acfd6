//! System Construction — derives an inferred topology from the assembled
//! snapshot: virtualization/provider confidence at the system level, a
//! network summary, and one node per discovered host with an inferred
//! role and its resources/services/users. This is a read-only view over
//! the snapshot, persisted as its own artifact rather than folded back
//! into it.

use std::collections::BTreeSet;

use provenance_core::snapshot::{ExtractorRecord, HypervisorProvider, Snapshot};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderGuess {
    pub name: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemTopology {
    #[serde(rename = "type")]
    pub system_type: String,
    pub confidence: f64,
    pub provider: ProviderGuess,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkTopology {
    pub cidrs: Vec<String>,
    pub gateway: Option<String>,
    pub dns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeResources {
    pub cpus: Option<u32>,
    pub memory_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeServices {
    pub open_ports: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeTopology {
    pub name: String,
    pub hostname: String,
    pub ip: String,
    pub os: Option<String>,
    pub role: String,
    pub resources: NodeResources,
    pub services: NodeServices,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    pub system: SystemTopology,
    pub network: NetworkTopology,
    pub nodes: Vec<NodeTopology>,
}

/// Builds the inferred topology for one snapshot.
pub fn build(snapshot: &Snapshot) -> Topology {
    let local_ip = snapshot.scanner_host.ip.as_deref();
    let local_record = local_ip.and_then(|ip| snapshot.phase2.get(ip));

    Topology {
        system: system_topology(snapshot, local_record),
        network: network_topology(snapshot),
        nodes: node_topologies(snapshot, local_ip),
    }
}

fn system_topology(snapshot: &Snapshot, local_record: Option<&ExtractorRecord>) -> SystemTopology {
    let (virtualized, evidence) = detect_virtualization(local_record);
    let (provider, prov_evidence, prov_confidence) = detect_provider(snapshot, local_record);

    SystemTopology {
        system_type: if virtualized { "virtual_machine" } else { "bare_metal" }.to_string(),
        confidence: if virtualized { 0.95 } else { 0.8 },
        provider: ProviderGuess {
            name: provider,
            confidence: prov_confidence,
            evidence: prov_evidence,
        },
        evidence,
    }
}

/// Evidence for "is this the scanner's own host running inside a VM",
/// drawn from the local node's virtualization extractor record.
fn detect_virtualization(local_record: Option<&ExtractorRecord>) -> (bool, Vec<String>) {
    let mut evidence = Vec::new();
    let Some(record) = local_record else {
        return (false, evidence);
    };
    let virt = &record.virtualization;
    if virt.virtualized {
        evidence.push("hardware virtualization markers present".to_string());
    }
    if let Some(hypervisor) = &virt.hypervisor {
        evidence.push(format!("dmi product name '{hypervisor}'"));
    }
    if !virt.guest_tools.is_empty() {
        evidence.push(format!("guest tools present: {}", virt.guest_tools.join(", ")));
    }
    (virt.virtualized || !evidence.is_empty(), evidence)
}

/// Scores which hypervisor/cloud provider the scanner is most likely
/// running under, combining the local node's own virtualization record
/// with lab-topology evidence (a `vagrant` account, the conventional
/// VirtualBox host-only subnet, the VirtualBox NAT gateway address).
fn detect_provider(snapshot: &Snapshot, local_record: Option<&ExtractorRecord>) -> (String, Vec<String>, f64) {
    let mut evidence = Vec::new();
    let mut score: f64 = 0.0;

    if let Some(record) = local_record {
        if record.virtualization.provider == Some(HypervisorProvider::Virtualbox) {
            score += 0.5;
            evidence.push("virtualization extractor reported VirtualBox".to_string());
        }
        if record.users.accounts.iter().any(|a| a.username == "vagrant") {
            score += 0.4;
            evidence.push("vagrant account present".to_string());
        }
    }

    if snapshot
        .local_network_discovery
        .values()
        .any(|r| r.network.starts_with("192.168.56."))
    {
        score += 0.3;
        evidence.push("192.168.56.0/24 private network".to_string());
    }

    if snapshot.scanner_host.gateway.as_deref() == Some("10.0.2.2") {
        score += 0.2;
        evidence.push("VirtualBox NAT gateway 10.0.2.2".to_string());
    }

    let provider = if score >= 0.6 { "virtualbox" } else { "unknown" };
    (provider.to_string(), evidence, (score.min(1.0) * 100.0).round() / 100.0)
}

fn network_topology(snapshot: &Snapshot) -> NetworkTopology {
    NetworkTopology {
        cidrs: snapshot.local_network_discovery.values().map(|r| r.network.clone()).collect(),
        gateway: snapshot.scanner_host.gateway.clone(),
        dns: snapshot.scanner_host.dns.clone(),
    }
}

fn node_topologies(snapshot: &Snapshot, local_ip: Option<&str>) -> Vec<NodeTopology> {
    let mut discovered: BTreeSet<String> = snapshot
        .local_network_discovery
        .values()
        .flat_map(|r| r.discovered_hosts.iter().cloned())
        .collect();
    if discovered.is_empty() {
        if let Some(ip) = local_ip {
            discovered.insert(ip.to_string());
        }
    }

    discovered.into_iter().map(|ip| build_node(snapshot, local_ip, &ip)).collect()
}

fn build_node(snapshot: &Snapshot, local_ip: Option<&str>, ip: &str) -> NodeTopology {
    let record = snapshot.phase2.get(ip);
    let hostname = if Some(ip) == local_ip {
        snapshot.scanner_host.hostname.clone()
    } else {
        ip.to_string()
    };

    let services = node_services(record);
    NodeTopology {
        name: hostname.clone(),
        hostname,
        ip: ip.to_string(),
        os: record.and_then(|r| r.os.system.clone()),
        role: infer_role(ip, Some(snapshot), &services),
        resources: node_resources(record),
        services,
        users: node_users(record),
    }
}

fn node_resources(record: Option<&ExtractorRecord>) -> NodeResources {
    let Some(record) = record else {
        return NodeResources::default();
    };
    NodeResources {
        cpus: record.hardware.cpu_logical_cores,
        memory_mb: record.hardware.memory_total_bytes.map(|bytes| bytes / 1024 / 1024),
    }
}

fn node_services(record: Option<&ExtractorRecord>) -> NodeServices {
    let Some(record) = record else {
        return NodeServices::default();
    };
    let mut open_ports: Vec<u16> = record
        .services
        .listening_sockets
        .iter()
        .filter_map(|s| (s.status == "LISTEN").then_some(s.lport).flatten())
        .collect();
    open_ports.sort_unstable();
    open_ports.dedup();
    NodeServices {
        open_ports: (!open_ports.is_empty()).then_some(open_ports),
    }
}

fn node_users(record: Option<&ExtractorRecord>) -> Vec<String> {
    let Some(record) = record else {
        return Vec::new();
    };
    let mut users: BTreeSet<String> = record.users.sessions.iter().map(|s| s.username.clone()).collect();
    users.extend(record.users.accounts.iter().filter(|a| a.roles.contains(&provenance_core::snapshot::AccountRole::Human)).map(|a| a.username.clone()));
    users.into_iter().collect()
}

fn infer_role(ip: &str, snapshot: Option<&Snapshot>, services: &NodeServices) -> String {
    let ports = services.open_ports.as_deref().unwrap_or(&[]);
    if let Some(snapshot) = snapshot {
        if snapshot.scanner_host.gateway.as_deref() == Some(ip) {
            return "gateway".to_string();
        }
    }
    if ports.contains(&53) {
        return "dns".to_string();
    }
    if ports.contains(&9100) || ports.contains(&631) {
        return "printer".to_string();
    }
    if ports.contains(&22) {
        return "linux_node".to_string();
    }
    "generic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::snapshot::{AccountRole, ScannerHost, SystemAccount, UsersRecord};
    use std::collections::BTreeMap;

    fn bare_snapshot() -> Snapshot {
        Snapshot::new(
            ScannerHost {
                hostname: "scanner1".to_string(),
                ip: Some("10.0.0.5".to_string()),
                ..Default::default()
            },
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn bare_metal_with_no_evidence_has_low_confidence() {
        let topology = build(&bare_snapshot());
        assert_eq!(topology.system.system_type, "bare_metal");
        assert_eq!(topology.system.confidence, 0.8);
        assert_eq!(topology.system.provider.name, "unknown");
    }

    #[test]
    fn vagrant_account_and_nat_gateway_push_provider_to_virtualbox() {
        let mut snapshot = bare_snapshot();
        snapshot.scanner_host.gateway = Some("10.0.2.2".to_string());
        let mut record = ExtractorRecord::default();
        record.users = UsersRecord {
            sessions: vec![],
            accounts: vec![SystemAccount {
                username: "vagrant".to_string(),
                uid: Some(1000),
                shell: None,
                roles: vec![AccountRole::Human],
                groups: vec![],
                domain: None,
            }],
            error: None,
        };
        snapshot.phase2.insert("10.0.0.5".to_string(), record);

        let topology = build(&snapshot);
        assert_eq!(topology.system.provider.name, "virtualbox");
        assert!(topology.system.provider.confidence >= 0.6);
    }

    #[test]
    fn falls_back_to_local_node_when_nothing_was_discovered() {
        let topology = build(&bare_snapshot());
        assert_eq!(topology.nodes.len(), 1);
        assert_eq!(topology.nodes[0].ip, "10.0.0.5");
        assert_eq!(topology.nodes[0].hostname, "scanner1");
    }

    #[test]
    fn node_role_prefers_gateway_over_service_ports() {
        let mut snapshot = bare_snapshot();
        snapshot.scanner_host.gateway = Some("10.0.0.5".to_string());
        let topology = build(&snapshot);
        assert_eq!(topology.nodes[0].role, "gateway");
    }
}
