//! Snapshot Formatter — folds Phase 0, Phase 1, and Phase 2 into one
//! immutable [`Snapshot`], collapsing VirtualBox NAT noise when it appears.

use std::collections::BTreeMap;

use provenance_core::snapshot::{
    ExtractorRecord, Infrastructure, NatInfrastructure, PhaseOneResult, ScannerHost, Snapshot,
};

const NAT_CIDR: &str = "10.0.2.0/24";
const NAT_PREFIX: &str = "10.0.2.";
const NAT_GATEWAY: &str = "10.0.2.2";

/// Assembles the final snapshot, removing any `10.0.2.0/24` Phase 1 entries
/// and recording their removal as a single `infrastructure.nat` fact.
pub fn format(
    scanner_host: ScannerHost,
    mut local_network_discovery: BTreeMap<String, PhaseOneResult>,
    phase2: BTreeMap<String, ExtractorRecord>,
) -> Snapshot {
    let mut nat_present = false;
    let mut nat_gateway = None;

    for result in local_network_discovery.values_mut() {
        let network_is_nat = result.network == NAT_CIDR;
        let removed: Vec<String> = result
            .discovered_hosts
            .iter()
            .filter(|ip| network_is_nat || ip.starts_with(NAT_PREFIX))
            .cloned()
            .collect();

        if removed.is_empty() && !network_is_nat {
            continue;
        }
        nat_present = true;
        if removed.iter().any(|ip| ip == NAT_GATEWAY) {
            nat_gateway = Some(NAT_GATEWAY.to_string());
        }
        for ip in &removed {
            result.discovered_hosts.remove(ip);
            result.details.remove(ip);
        }
    }

    let mut snapshot = Snapshot::new(scanner_host, local_network_discovery, phase2);
    if nat_present {
        snapshot.infrastructure = Some(Infrastructure {
            nat: Some(NatInfrastructure {
                present: true,
                cidr: NAT_CIDR.to_string(),
                gateway: nat_gateway,
                role: "egress".to_string(),
                nat_type: "virtualbox_nat".to_string(),
            }),
        });
    }
    snapshot
}
