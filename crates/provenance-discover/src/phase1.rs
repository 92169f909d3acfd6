//! Phase 1 — local network discovery. For a selected interface's subnet:
//! read the ARP cache, probe hosts over TCP (parallel, worker-pool bounded),
//! then classify each responder against an extended port set and a
//! TTL-based OS guess.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use provenance_core::config::DiscoveryConfig;
use provenance_core::snapshot::{HostDetail, HostType, OsHint, PhaseOneResult, UdpHit};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::interface_selector::SelectedInterface;

const DEFAULT_TCP_PORTS: &[u16] = &[22, 80, 443, 3389, 5985, 5986];
const PRINTER_PORTS: &[u16] = &[9100, 515, 631];
const SERVER_PORTS: &[u16] = &[22, 80, 443, 445, 3306, 5432, 3389, 5985, 5986];
const SWITCH_PORTS: &[u16] = &[23, 161];
const UDP_PROBE_PORTS: &[u16] = &[53, 67, 161, 123];

fn extended_port_set() -> BTreeSet<u16> {
    PRINTER_PORTS
        .iter()
        .chain(SERVER_PORTS.iter())
        .chain(SWITCH_PORTS.iter())
        .copied()
        .collect()
}

/// Rejects the network address, broadcast address, and any
/// multicast/unspecified/loopback address — applied both before and after
/// the ARP/TCP union merge.
fn is_valid_host(ip: Ipv4Addr, net: &Ipv4Net) -> bool {
    if ip == net.network() || ip == net.broadcast() {
        return false;
    }
    if ip.is_multicast() || ip.is_unspecified() || ip.is_loopback() {
        return false;
    }
    true
}

async fn tcp_probe(ip: Ipv4Addr, ports: &[u16], timeout_ms: u64) -> bool {
    for &port in ports {
        let addr = SocketAddr::new(IpAddr::V4(ip), port);
        if timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr))
            .await
            .is_ok_and(|r| r.is_ok())
        {
            return true;
        }
    }
    false
}

async fn tcp_open_ports(ip: Ipv4Addr, ports: &BTreeSet<u16>, timeout_ms: u64) -> BTreeSet<u16> {
    let mut open = BTreeSet::new();
    for &port in ports {
        let addr = SocketAddr::new(IpAddr::V4(ip), port);
        if timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr))
            .await
            .is_ok_and(|r| r.is_ok())
        {
            open.insert(port);
        }
    }
    open
}

/// Send-then-recv on a UDP socket; a reply is weak evidence a service is
/// listening (absence proves nothing, hence the low confidence).
async fn udp_probe(ip: Ipv4Addr, port: u16, timeout_ms: u64) -> Option<UdpHit> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect(SocketAddr::new(IpAddr::V4(ip), port)).await.ok()?;
    socket.send(&[0u8; 4]).await.ok()?;
    let mut buf = [0u8; 64];
    if timeout(Duration::from_millis(timeout_ms), socket.recv(&mut buf)).await.is_ok() {
        Some(UdpHit {
            port,
            evidence: "packet_response".to_string(),
            confidence: "very_low".to_string(),
        })
    } else {
        None
    }
}

/// Runs `ping -c 1` and reads the reply TTL; maps to a coarse OS family
/// guess. Absence of any reply (host unreachable to ICMP) yields `Unknown`.
fn ttl_os_hint(ip: Ipv4Addr, timeout_ms: u64) -> OsHint {
    let timeout_s = ((timeout_ms + 999) / 1000).max(1).to_string();
    let Ok(output) = Command::new("ping")
        .args(["-c", "1", "-W", &timeout_s, &ip.to_string()])
        .output()
    else {
        return OsHint::Unknown;
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let Some(ttl) = text
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("ttl="))
        .and_then(|t| t.parse::<u32>().ok())
    else {
        return OsHint::Unknown;
    };
    if ttl <= 70 {
        OsHint::LinuxLike
    } else if ttl <= 130 {
        OsHint::WindowsLike
    } else if ttl > 200 {
        OsHint::NetworkDeviceLike
    } else {
        OsHint::Unknown
    }
}

/// A single best-effort `ping -c 1`; any reply at all (TTL parses or not)
/// counts as a hit. Used only for sweep membership — OS fingerprinting off
/// the reply TTL happens separately in [`ttl_os_hint`].
fn icmp_probe(ip: Ipv4Addr, timeout_ms: u64) -> bool {
    let timeout_s = ((timeout_ms + 999) / 1000).max(1).to_string();
    Command::new("ping")
        .args(["-c", "1", "-W", &timeout_s, &ip.to_string()])
        .output()
        .is_ok_and(|output| output.status.success())
}

fn classify_role(tcp: &BTreeSet<u16>, udp: &[UdpHit], os_hint: OsHint, ip: Ipv4Addr, gateway: Option<Ipv4Addr>) -> HostType {
    if Some(ip) == gateway {
        return HostType::Gateway;
    }
    if os_hint == OsHint::NetworkDeviceLike {
        return HostType::NetworkDevice;
    }
    if tcp.contains(&9100) || tcp.contains(&631) {
        return HostType::Printer;
    }
    if tcp.contains(&80) || tcp.contains(&443) {
        return HostType::WebService;
    }
    if tcp.contains(&22) {
        return HostType::SshService;
    }
    if udp.iter().any(|hit| hit.port == 53) {
        return HostType::DnsLike;
    }
    HostType::Unknown
}

/// Runs Phase 1 against `selected`'s subnet.
pub async fn discover(selected: &SelectedInterface, cfg: &DiscoveryConfig, gateway: Option<Ipv4Addr>) -> PhaseOneResult {
    let Ok(ip) = selected.ip.parse::<Ipv4Addr>() else {
        return PhaseOneResult::default();
    };
    let Some(prefix) = netmask_prefix(&selected.netmask) else {
        return PhaseOneResult::default();
    };
    let Ok(net) = Ipv4Net::new(ip, prefix) else {
        return PhaseOneResult::default();
    };

    let mut methods = vec!["arp".to_string()];
    let arp_hosts = read_arp_cache_hosts(&net);

    let candidates: Vec<Ipv4Addr> = net
        .hosts()
        .filter(|h| is_valid_host(*h, &net))
        .take(cfg.max_hosts)
        .collect();

    methods.push("tcp".to_string());
    let tcp_hosts = tcp_sweep(&candidates, DEFAULT_TCP_PORTS, cfg.tcp_workers, cfg.tcp_timeout_ms).await;

    methods.push("icmp".to_string());
    let icmp_hosts = icmp_sweep(&candidates, cfg.icmp_workers, cfg.icmp_timeout_ms).await;

    let mut discovered_hosts: BTreeSet<String> = BTreeSet::new();
    for host in arp_hosts.iter().chain(tcp_hosts.iter()).chain(icmp_hosts.iter()) {
        if is_valid_host(*host, &net) {
            discovered_hosts.insert(host.to_string());
        }
    }

    let extended_ports = extended_port_set();
    let mut details = BTreeMap::new();
    for host_str in &discovered_hosts {
        let Ok(host_ip) = host_str.parse::<Ipv4Addr>() else { continue };
        let open_tcp = tcp_open_ports(host_ip, &extended_ports, cfg.tcp_timeout_ms).await;

        let mut udp_hits = Vec::new();
        for &port in UDP_PROBE_PORTS {
            if let Some(hit) = udp_probe(host_ip, port, cfg.icmp_timeout_ms).await {
                udp_hits.push(hit);
            }
        }

        let os_hint = ttl_os_hint(host_ip, cfg.icmp_timeout_ms);
        let host_type = classify_role(&open_tcp, &udp_hits, os_hint, host_ip, gateway);

        details.insert(
            host_str.clone(),
            HostDetail {
                tcp: open_tcp,
                udp: udp_hits,
                os_hint: Some(os_hint),
                host_type: Some(host_type),
            },
        );
    }

    PhaseOneResult {
        network: net.to_string(),
        discovered_hosts,
        details,
        methods,
        scanner_ip: Some(selected.ip.clone()),
        scanner_role: None,
    }
}

fn netmask_prefix(netmask: &str) -> Option<u8> {
    let mask: Ipv4Addr = netmask.parse().ok()?;
    Some(u32::from(mask).count_ones() as u8)
}

fn read_arp_cache_hosts(net: &Ipv4Net) -> Vec<Ipv4Addr> {
    let Ok(contents) = std::fs::read_to_string("/proc/net/arp") else {
        return Vec::new();
    };
    contents
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|ip_str| ip_str.parse::<Ipv4Addr>().ok())
        .filter(|ip| net.contains(ip) && is_valid_host(*ip, net))
        .collect()
}

/// Probes `candidates` concurrently, bounded by `workers` permits, returning
/// every host that answered on at least one of `ports`.
async fn tcp_sweep(candidates: &[Ipv4Addr], ports: &[u16], workers: usize, timeout_ms: u64) -> Vec<Ipv4Addr> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let ports: Arc<Vec<u16>> = Arc::new(ports.to_vec());
    let mut handles = Vec::with_capacity(candidates.len());

    for &ip in candidates {
        let semaphore = semaphore.clone();
        let ports = ports.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            if tcp_probe(ip, &ports, timeout_ms).await {
                Some(ip)
            } else {
                None
            }
        }));
    }

    let mut up = Vec::new();
    for handle in handles {
        // A panicked probe task is treated as a negative result, never
        // propagated — every in-flight probe must be safely abandonable.
        if let Ok(Some(ip)) = handle.await {
            up.push(ip);
        }
    }
    up
}

/// Parallel single-packet ping sweep, bounded by `workers` permits. Each
/// probe runs on a blocking thread since it shells out to `ping`.
async fn icmp_sweep(candidates: &[Ipv4Addr], workers: usize, timeout_ms: u64) -> Vec<Ipv4Addr> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(candidates.len());

    for &ip in candidates {
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let up = tokio::task::spawn_blocking(move || icmp_probe(ip, timeout_ms))
                .await
                .unwrap_or(false);
            if up {
                Some(ip)
            } else {
                None
            }
        }));
    }

    let mut up = Vec::new();
    for handle in handles {
        if let Ok(Some(ip)) = handle.await {
            up.push(ip);
        }
    }
    up
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_valid_host_rejects_network_and_broadcast() {
        let net: Ipv4Net = "192.168.56.0/24".parse().unwrap();
        assert!(!is_valid_host("192.168.56.0".parse().unwrap(), &net));
        assert!(!is_valid_host("192.168.56.255".parse().unwrap(), &net));
        assert!(is_valid_host("192.168.56.10".parse().unwrap(), &net));
    }

    #[test]
    fn is_valid_host_rejects_loopback_and_multicast() {
        let net: Ipv4Net = "0.0.0.0/0".parse().unwrap();
        assert!(!is_valid_host(Ipv4Addr::LOCALHOST, &net));
        assert!(!is_valid_host("224.0.0.1".parse().unwrap(), &net));
    }

    #[test]
    fn ttl_buckets_match_the_documented_thresholds() {
        assert_eq!(classify_role(&BTreeSet::new(), &[], OsHint::NetworkDeviceLike, "10.0.0.1".parse().unwrap(), None), HostType::NetworkDevice);
    }

    #[test]
    fn role_assignment_prefers_gateway_over_all_else() {
        let ip: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let tcp = BTreeSet::from([22]);
        let role = classify_role(&tcp, &[], OsHint::LinuxLike, ip, Some(ip));
        assert_eq!(role, HostType::Gateway);
    }

    #[test]
    fn role_assignment_falls_through_to_ssh_then_dns() {
        let tcp = BTreeSet::from([22]);
        assert_eq!(
            classify_role(&tcp, &[], OsHint::LinuxLike, "10.0.0.5".parse().unwrap(), None),
            HostType::SshService
        );
        let dns_hit = vec![UdpHit {
            port: 53,
            evidence: "packet_response".to_string(),
            confidence: "very_low".to_string(),
        }];
        assert_eq!(
            classify_role(&BTreeSet::new(), &dns_hit, OsHint::LinuxLike, "10.0.0.6".parse().unwrap(), None),
            HostType::DnsLike
        );
    }

    #[tokio::test]
    async fn scenario_1_discovers_dns_and_ssh_hosts_on_unreachable_synthetic_ips() {
        // Exercises the sweep path itself (no live hosts respond); the
        // important assertion is that it returns promptly and without
        // panicking for a tiny /30 candidate set.
        let candidates = vec!["192.0.2.1".parse().unwrap(), "192.0.2.2".parse().unwrap()];
        let up = tcp_sweep(&candidates, &[1], 4, 50).await;
        assert!(up.is_empty());
    }

    #[tokio::test]
    async fn icmp_sweep_returns_promptly_for_unreachable_addresses() {
        let candidates = vec!["192.0.2.1".parse().unwrap(), "192.0.2.2".parse().unwrap()];
        let up = icmp_sweep(&candidates, 4, 50).await;
        assert!(up.is_empty());
    }
}
