//! Interface Selector — ranks scanner interfaces by suitability for active
//! probing. Rejection rules are absolute (any one disqualifies); the
//! remaining interfaces are scored by a small rule cascade and returned
//! sorted descending by score.

use std::fs;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use provenance_core::snapshot::{ArpEntry, InterfaceInfo, InterfaceType};

const IGNORED_PREFIXES: &[&str] = &[
    "lo", "docker", "br-", "veth", "virbr", "vboxnet", "vmnet", "tap", "tun", "zt", "tailscale",
];

/// Docker, Hyper-V, VirtualBox, then VMware's three OUI blocks.
const VIRTUAL_MAC_PREFIXES: &[&str] = &["02:42", "00:15:5d", "08:00:27", "00:0c:29", "00:05:69", "00:50:56"];

#[derive(Debug, Clone)]
pub struct SelectedInterface {
    pub name: String,
    pub ip: String,
    pub netmask: String,
    pub score: i32,
    pub reasons: Vec<String>,
}

impl SelectedInterface {
    /// Phase 2's target-selection rule treats an interface's subnet as
    /// "laboratory" when its selection reason mentions a host-only network.
    pub fn is_laboratory(&self) -> bool {
        self.reasons.iter().any(|r| r.to_lowercase().contains("host-only"))
    }
}

fn running_inside_vm() -> bool {
    fs::read_to_string("/sys/class/dmi/id/product_name")
        .map(|s| {
            let lower = s.to_lowercase();
            lower.contains("virtualbox") || lower.contains("vmware") || lower.contains("kvm") || lower.contains("virtual machine")
        })
        .unwrap_or(false)
}

fn is_vagrant_virtualbox_guest() -> bool {
    fs::read_to_string("/sys/class/dmi/id/product_name")
        .map(|s| s.to_lowercase().contains("virtualbox"))
        .unwrap_or(false)
}

fn is_apipa(ip: &Ipv4Addr) -> bool {
    ip.octets()[0] == 169 && ip.octets()[1] == 254
}

fn is_ignored_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    IGNORED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn is_virtual_mac(mac: &str) -> bool {
    let lower = mac.to_lowercase();
    VIRTUAL_MAC_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Placeholder for the host-OS NAT adapter check (e.g. a Windows "Default
/// Switch" virtual NIC); this scanner targets POSIX hosts primarily, so the
/// rule is evaluated but never trips on the platforms this ships to.
fn is_host_nat_adapter(_name: &str) -> bool {
    false
}

fn is_public_wifi(iface: &InterfaceInfo, net: &Ipv4Net, dns_suffix_present: bool) -> bool {
    iface.iface_type == Some(InterfaceType::Wireless) && (net.prefix_len() <= 20 || !dns_suffix_present)
}

fn netmask_to_prefix(netmask: &str) -> Option<u8> {
    let mask = Ipv4Addr::from_str(netmask).ok()?;
    Some(u32::from(mask).count_ones() as u8)
}

fn arp_neighbor_count_same_octet(arp: &[ArpEntry], ip: &Ipv4Addr) -> usize {
    let octet = ip.octets()[0];
    arp.iter()
        .filter(|entry| {
            entry
                .ip
                .parse::<Ipv4Addr>()
                .map(|a| a.octets()[0] == octet)
                .unwrap_or(false)
        })
        .count()
}

/// Ranks `interfaces` for active probing. `dns_suffix_present` reflects
/// whether the host resolved any DNS servers (Phase 0's `dns` field is
/// non-empty) — the public-Wi-Fi heuristic treats an empty list as "no DNS
/// suffix".
pub fn select(
    interfaces: &[InterfaceInfo],
    arp_cache: &[ArpEntry],
    gateway: Option<&str>,
    dns_suffix_present: bool,
) -> Vec<SelectedInterface> {
    if is_vagrant_virtualbox_guest() {
        let mut selected: Vec<SelectedInterface> = interfaces
            .iter()
            .filter_map(|iface| {
                let ip = iface.ipv4.as_deref()?;
                let netmask = iface.netmask.as_deref()?.to_string();
                if ip.starts_with("192.168.56.") {
                    Some(SelectedInterface {
                        name: iface.name.clone(),
                        ip: ip.to_string(),
                        netmask,
                        score: 100,
                        reasons: vec!["Vagrant Host-Only".to_string()],
                    })
                } else if ip.starts_with("10.0.2.") {
                    Some(SelectedInterface {
                        name: iface.name.clone(),
                        ip: ip.to_string(),
                        netmask,
                        score: 80,
                        reasons: vec!["Vagrant NAT".to_string()],
                    })
                } else {
                    None
                }
            })
            .collect();
        selected.sort_by(|a, b| b.score.cmp(&a.score));
        return selected;
    }

    let in_vm = running_inside_vm();
    let mut selected = Vec::new();

    for iface in interfaces {
        let Some(ip_str) = &iface.ipv4 else { continue };
        let Some(netmask_str) = &iface.netmask else { continue };
        let Ok(ip) = ip_str.parse::<Ipv4Addr>() else { continue };

        if is_apipa(&ip) {
            continue;
        }
        if is_ignored_name(&iface.name) {
            continue;
        }
        if let Some(mac) = &iface.mac {
            if is_virtual_mac(mac) && !in_vm {
                continue;
            }
        }
        if is_host_nat_adapter(&iface.name) {
            continue;
        }
        let Some(prefix) = netmask_to_prefix(netmask_str) else { continue };
        let Ok(net) = Ipv4Net::new(ip, prefix) else { continue };
        if is_public_wifi(iface, &net, dns_suffix_present) {
            continue;
        }

        let mut score = 0i32;
        let mut reasons = Vec::new();

        let octets = ip.octets();
        let is_rfc1918 = octets[0] == 10
            || (octets[0] == 172 && (16..=31).contains(&octets[1]))
            || (octets[0] == 192 && octets[1] == 168);
        if is_rfc1918 {
            score += 4;
            reasons.push("Private network".to_string());
        }

        let neighbors = arp_neighbor_count_same_octet(arp_cache, &ip);
        if neighbors >= 3 {
            score += 3;
            reasons.push("Active neighbors".to_string());
        } else if arp_cache.is_empty() {
            score -= 2;
            reasons.push("No ARP neighbors".to_string());
        }

        if let Some(gw) = gateway {
            if let Ok(gw_ip) = gw.parse::<Ipv4Addr>() {
                if net.contains(&gw_ip) {
                    score += 3;
                    reasons.push("Hosts default gateway".to_string());
                }
            }
        }

        if net.prefix_len() <= 20 {
            score -= 3;
            reasons.push("Large subnet".to_string());
        }

        selected.push(SelectedInterface {
            name: iface.name.clone(),
            ip: ip_str.clone(),
            netmask: netmask_str.clone(),
            score,
            reasons,
        });
    }

    selected.sort_by(|a, b| b.score.cmp(&a.score));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, ip: &str, netmask: &str, iface_type: InterfaceType) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            ipv4: Some(ip.to_string()),
            netmask: Some(netmask.to_string()),
            ipv6: vec![],
            mac: None,
            iface_type: Some(iface_type),
        }
    }

    #[test]
    fn apipa_and_loopback_are_rejected() {
        let interfaces = vec![
            iface("lo", "127.0.0.1", "255.0.0.0", InterfaceType::Virtual),
            iface("eth1", "169.254.1.2", "255.255.0.0", InterfaceType::Physical),
        ];
        let selected = select(&interfaces, &[], None, true);
        assert!(selected.is_empty());
    }

    #[test]
    fn scenario_2_private_network_selected_over_rejected_interfaces() {
        let interfaces = vec![
            iface("lo", "127.0.0.1", "255.0.0.0", InterfaceType::Virtual),
            iface("docker0", "172.17.0.1", "255.255.0.0", InterfaceType::Bridge),
            iface("eth0", "10.0.0.5", "255.255.255.0", InterfaceType::Physical),
            iface("wlan0", "10.0.0.6", "255.255.0.0", InterfaceType::Wireless),
        ];
        let selected = select(&interfaces, &[], None, false);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "eth0");
        assert!(selected[0].reasons.iter().any(|r| r.contains("Private network")));
    }

    #[test]
    fn is_laboratory_matches_case_insensitively() {
        let iface = SelectedInterface {
            name: "eth0".to_string(),
            ip: "192.168.56.10".to_string(),
            netmask: "255.255.255.0".to_string(),
            score: 100,
            reasons: vec!["Vagrant Host-Only".to_string()],
        };
        assert!(iface.is_laboratory());
    }
}
