//! Phase 0 — self-discovery. Inventories the scanner's own hostname,
//! interfaces, IPs/masks, gateway, DNS, and ARP cache. No side effects on
//! the network: every read here is a local system query.

use std::fs;
use std::net::Ipv4Addr;
use std::process::Command;

use provenance_core::snapshot::{
    ActiveConnection, ArpEntry, InterfaceInfo, InterfaceType, ScannerHost,
};

/// Active-connection preview length, matching the reference scanner's
/// `conns[:10]`.
const ACTIVE_CONNECTION_PREVIEW: usize = 10;

fn hostname() -> String {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// FQDN minus hostname, or "No domain" when the host has no domain suffix.
fn domain(hostname: &str) -> String {
    let domainname = fs::read_to_string("/proc/sys/kernel/domainname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "(none)");
    if let Some(d) = domainname {
        return d;
    }
    let Ok(hosts) = fs::read_to_string("/etc/hosts") else {
        return "No domain".to_string();
    };
    for line in hosts.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields.iter().any(|f| *f == hostname) {
            if let Some(fqdn) = fields.iter().find(|f| f.contains('.') && f.starts_with(hostname)) {
                if let Some(rest) = fqdn.strip_prefix(hostname) {
                    return rest.trim_start_matches('.').to_string();
                }
            }
        }
    }
    "No domain".to_string()
}

fn classify_interface_name(name: &str) -> InterfaceType {
    let lower = name.to_lowercase();
    if lower == "lo" {
        InterfaceType::Virtual
    } else if lower.starts_with("docker") || lower.starts_with("br-") || lower.starts_with("virbr") {
        InterfaceType::Bridge
    } else if lower.starts_with("wl") {
        InterfaceType::Wireless
    } else if lower.starts_with("veth")
        || lower.starts_with("vboxnet")
        || lower.starts_with("vmnet")
        || lower.starts_with("tap")
        || lower.starts_with("tun")
    {
        InterfaceType::Virtual
    } else {
        InterfaceType::Physical
    }
}

fn prefix_to_netmask(prefix: u32) -> String {
    let mask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    Ipv4Addr::from(mask.to_be_bytes()).to_string()
}

#[cfg(target_os = "linux")]
fn interfaces() -> Vec<InterfaceInfo> {
    let Ok(output) = Command::new("ip").args(["-o", "-4", "addr", "show"]).output() else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let mut result = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let name = fields[1].to_string();
        let cidr = fields[3];
        let (ip, mask_bits) = cidr.split_once('/').unwrap_or((cidr, "32"));
        let mac = fs::read_to_string(format!("/sys/class/net/{name}/address"))
            .ok()
            .map(|s| s.trim().to_string());
        result.push(InterfaceInfo {
            name: name.clone(),
            ipv4: Some(ip.to_string()),
            netmask: Some(prefix_to_netmask(mask_bits.parse().unwrap_or(32))),
            ipv6: Vec::new(),
            mac,
            iface_type: Some(classify_interface_name(&name)),
        });
    }
    result
}

#[cfg(not(target_os = "linux"))]
fn interfaces() -> Vec<InterfaceInfo> {
    Vec::new()
}

/// First non-loopback interface's (ip, netmask) pair.
fn primary_ip(ifaces: &[InterfaceInfo]) -> (Option<String>, Option<String>) {
    ifaces
        .iter()
        .find(|i| i.iface_type != Some(InterfaceType::Virtual) && i.ipv4.as_deref() != Some("127.0.0.1"))
        .map(|i| (i.ipv4.clone(), i.netmask.clone()))
        .unwrap_or((None, None))
}

/// The kernel's default route, read from `/proc/net/route`: the row whose
/// destination field is `00000000`, gateway bytes reversed to dotted-quad.
#[cfg(target_os = "linux")]
fn gateway() -> Option<String> {
    let contents = fs::read_to_string("/proc/net/route").ok()?;
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            continue;
        }
        let bytes = u32::from_str_radix(fields[2], 16).ok()?;
        return Some(Ipv4Addr::from(bytes.to_le_bytes()).to_string());
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn gateway() -> Option<String> {
    None
}

fn dns_servers() -> Vec<String> {
    let Ok(contents) = fs::read_to_string("/etc/resolv.conf") else {
        return Vec::new();
    };
    contents
        .lines()
        .filter_map(|line| line.strip_prefix("nameserver"))
        .map(|rest| rest.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `/proc/net/arp`: `IP address HW type Flags HW address Mask Device`.
/// Flags `0x0` means no resolved hardware address; those rows are dropped.
fn arp_cache() -> Vec<ArpEntry> {
    let Ok(contents) = fs::read_to_string("/proc/net/arp") else {
        return Vec::new();
    };
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 || fields[2] == "0x0" {
                return None;
            }
            Some(ArpEntry {
                ip: fields[0].to_string(),
                mac: fields[3].to_string(),
                iface: Some(fields[5].to_string()),
            })
        })
        .collect()
}

/// Preview of active TCP connections via `ss`, since this is a one-shot
/// diagnostic read rather than the kernel-table parse the network extractor
/// needs for full socket enumeration.
fn active_connections() -> Vec<ActiveConnection> {
    let Ok(output) = Command::new("ss").args(["-tn", "state", "established"]).output() else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .skip(1)
        .take(ACTIVE_CONNECTION_PREVIEW)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(ActiveConnection {
                laddr: Some(fields[3].to_string()),
                raddr: fields.get(4).map(|s| s.to_string()),
                status: Some(fields[0].to_string()),
            })
        })
        .collect()
}

/// Runs the full self-discovery pass. Never fails: any unreadable source
/// just yields an empty/`None` field rather than aborting the pipeline.
pub fn discover() -> ScannerHost {
    let hostname = hostname();
    let domain = domain(&hostname);
    let ifaces = interfaces();
    let (ip, netmask) = primary_ip(&ifaces);

    ScannerHost {
        hostname,
        domain,
        ip,
        netmask,
        gateway: gateway(),
        dns: dns_servers(),
        interfaces: ifaces,
        active_connections: active_connections(),
        arp_cache: arp_cache(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_falls_back_to_no_domain_literal() {
        assert_eq!(domain("host-with-no-hosts-entry-xyz"), "No domain".to_string());
    }

    #[test]
    fn prefix_24_yields_standard_netmask() {
        assert_eq!(prefix_to_netmask(24), "255.255.255.0");
    }

    #[test]
    fn primary_ip_skips_loopback() {
        let ifaces = vec![
            InterfaceInfo {
                name: "lo".to_string(),
                ipv4: Some("127.0.0.1".to_string()),
                netmask: Some("255.0.0.0".to_string()),
                ipv6: vec![],
                mac: None,
                iface_type: Some(InterfaceType::Virtual),
            },
            InterfaceInfo {
                name: "eth0".to_string(),
                ipv4: Some("10.0.0.5".to_string()),
                netmask: Some("255.255.255.0".to_string()),
                ipv6: vec![],
                mac: None,
                iface_type: Some(InterfaceType::Physical),
            },
        ];
        let (ip, netmask) = primary_ip(&ifaces);
        assert_eq!(ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(netmask.as_deref(), Some("255.255.255.0"));
    }

    #[test]
    fn discover_never_panics() {
        let host = discover();
        assert!(!host.hostname.is_empty());
    }
}
