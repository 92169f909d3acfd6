//! Network extractor: interfaces, listening/connected sockets, process
//! enrichment, and NAT-suspected classification.
//!
//! Socket enumeration on Linux reads `/proc/net/{tcp,udp}[6]` directly and
//! joins owning pids by walking `/proc/<pid>/fd/*` looking for
//! `socket:[<inode>]` symlinks — the kernel-table approach the component
//! design calls for, rather than shelling out to `ss`/`netstat`.

use std::collections::HashMap;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::process::Command;

use provenance_core::snapshot::{
    BindClass, InterfaceInfo, InterfaceType, NetworkRecord, SocketDirection, SocketRecord,
};
use serde_json::Map;

/// Linux's `/proc/net/tcp` encodes addresses as little-endian hex per u32
/// limb; IPv6 stores four such limbs.
fn parse_hex_ipv4(hex: &str) -> Option<Ipv4Addr> {
    let bytes = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(bytes.to_le_bytes()))
}

fn parse_hex_ipv6(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 {
        return None;
    }
    let mut octets = [0u8; 16];
    for limb in 0..4 {
        let chunk = &hex[limb * 8..limb * 8 + 8];
        let word = u32::from_str_radix(chunk, 16).ok()?;
        let le = word.to_le_bytes();
        octets[limb * 4..limb * 4 + 4].copy_from_slice(&le);
    }
    Some(Ipv6Addr::from(octets))
}

fn hex_addr_port(field: &str, v6: bool) -> Option<(String, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let addr = if v6 {
        parse_hex_ipv6(addr_hex)?.to_string()
    } else {
        parse_hex_ipv4(addr_hex)?.to_string()
    };
    Some((addr, port))
}

fn tcp_state_name(code: &str) -> &'static str {
    match code {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => "UNKNOWN",
    }
}

struct RawSocket {
    proto: &'static str,
    laddr: String,
    lport: u16,
    raddr: String,
    rport: u16,
    status: String,
    inode: u64,
}

fn parse_proc_net_table(path: &str, proto: &'static str, v6: bool) -> Vec<RawSocket> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let is_tcp = proto.starts_with("tcp");
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let (laddr, lport) = hex_addr_port(fields[1], v6)?;
            let (raddr, rport) = hex_addr_port(fields[2], v6)?;
            let status = if is_tcp {
                tcp_state_name(fields[3]).to_string()
            } else {
                "STATELESS".to_string()
            };
            let inode: u64 = fields[9].parse().ok()?;
            Some(RawSocket {
                proto,
                laddr,
                lport,
                raddr,
                rport,
                status,
                inode,
            })
        })
        .collect()
}

/// Walks every `/proc/<pid>/fd/*` symlink looking for `socket:[<inode>]`
/// targets, building an inode -> pid map.
fn socket_inode_to_pid() -> HashMap<u64, u32> {
    let mut map = HashMap::new();
    let Ok(proc_dir) = fs::read_dir("/proc") else {
        return map;
    };
    for entry in proc_dir.flatten() {
        let name = entry.file_name();
        let Some(pid_str) = name.to_str() else {
            continue;
        };
        let Ok(pid) = pid_str.parse::<u32>() else {
            continue;
        };
        let fd_dir = entry.path().join("fd");
        let Ok(fds) = fs::read_dir(&fd_dir) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(target) = fs::read_link(fd.path()) {
                if let Some(target) = target.to_str() {
                    if let Some(inode_str) = target
                        .strip_prefix("socket:[")
                        .and_then(|s| s.strip_suffix(']'))
                    {
                        if let Ok(inode) = inode_str.parse::<u64>() {
                            map.insert(inode, pid);
                        }
                    }
                }
            }
        }
    }
    map
}

fn process_identity(pid: u32) -> (Option<String>, Option<String>, Option<String>) {
    let exe = fs::read_link(format!("/proc/{pid}/exe"))
        .ok()
        .map(|p| p.to_string_lossy().to_string());
    let name = fs::read_to_string(format!("/proc/{pid}/comm"))
        .ok()
        .map(|s| s.trim().to_string());
    let user = fs::read_to_string(format!("/proc/{pid}/status")).ok().and_then(|status| {
        status
            .lines()
            .find(|l| l.starts_with("Uid:"))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|uid| uid.parse::<u32>().ok())
            .and_then(uid_to_username)
    });
    (name, exe, user)
}

fn uid_to_username(uid: u32) -> Option<String> {
    let passwd = fs::read_to_string("/etc/passwd").ok()?;
    passwd.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 3 && fields[2].parse::<u32>().ok() == Some(uid) {
            Some(fields[0].to_string())
        } else {
            None
        }
    })
}

fn is_rfc1918(addr: &str) -> bool {
    let Ok(ip) = addr.parse::<Ipv4Addr>() else {
        return false;
    };
    let octets = ip.octets();
    octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
}

#[cfg(target_os = "linux")]
fn enumerate_sockets() -> Vec<RawSocket> {
    let mut all = Vec::new();
    all.extend(parse_proc_net_table("/proc/net/tcp", "tcp", false));
    all.extend(parse_proc_net_table("/proc/net/tcp6", "tcp6", true));
    all.extend(parse_proc_net_table("/proc/net/udp", "udp", false));
    all.extend(parse_proc_net_table("/proc/net/udp6", "udp6", true));
    all
}

#[cfg(not(target_os = "linux"))]
fn enumerate_sockets() -> Vec<RawSocket> {
    Vec::new()
}

fn classify(raw: &RawSocket, pid_map: &HashMap<u64, u32>) -> SocketRecord {
    let pid = pid_map.get(&raw.inode).copied();
    let direction = if raw.status == "LISTEN" {
        SocketDirection::Listening
    } else if raw.status == "ESTABLISHED" && raw.rport != 0 {
        SocketDirection::Outbound
    } else {
        SocketDirection::Unknown
    };

    let (bind, exposure) = if direction == SocketDirection::Listening {
        let (b, e) = BindClass::classify(&raw.laddr);
        (Some(b), Some(e))
    } else {
        (None, None)
    };

    let nat_suspected = direction == SocketDirection::Outbound
        && is_rfc1918(&raw.laddr)
        && !is_rfc1918(&raw.raddr)
        && raw.raddr != "0.0.0.0";

    let (process_name, process_exe, process_user) = match pid {
        Some(pid) => process_identity(pid),
        None => (None, None, None),
    };

    SocketRecord {
        proto: raw.proto.to_string(),
        laddr: Some(raw.laddr.clone()),
        lport: Some(raw.lport),
        raddr: if raw.rport == 0 {
            None
        } else {
            Some(raw.raddr.clone())
        },
        rport: if raw.rport == 0 { None } else { Some(raw.rport) },
        status: raw.status.clone(),
        pid,
        direction,
        bind,
        exposure,
        nat_suspected,
        process_name,
        process_exe,
        process_user,
    }
}

#[cfg(target_os = "linux")]
fn interfaces() -> Vec<InterfaceInfo> {
    // `ip` ships on every modern Linux distribution; absence is tolerated.
    let Ok(output) = Command::new("ip").args(["-o", "-4", "addr", "show"]).output() else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let mut interfaces = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let name = fields[1].to_string();
        let cidr = fields[3];
        let (ip, mask_bits) = cidr.split_once('/').unwrap_or((cidr, "32"));
        let netmask = prefix_to_netmask(mask_bits.parse().unwrap_or(32));
        let mac = fs::read_to_string(format!("/sys/class/net/{name}/address"))
            .ok()
            .map(|s| s.trim().to_string());
        let iface_type = classify_interface_name(&name);
        interfaces.push(InterfaceInfo {
            name,
            ipv4: Some(ip.to_string()),
            netmask: Some(netmask),
            ipv6: Vec::new(),
            mac,
            iface_type: Some(iface_type),
        });
    }
    interfaces
}

#[cfg(not(target_os = "linux"))]
fn interfaces() -> Vec<InterfaceInfo> {
    Vec::new()
}

fn prefix_to_netmask(prefix: u32) -> String {
    let mask: u32 = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    Ipv4Addr::from(mask.to_be_bytes()).to_string()
}

fn classify_interface_name(name: &str) -> InterfaceType {
    if name == "lo" {
        InterfaceType::Virtual
    } else if name.starts_with("docker") || name.starts_with("br-") || name.starts_with("virbr") {
        InterfaceType::Bridge
    } else if name.starts_with("wl") {
        InterfaceType::Wireless
    } else if name.starts_with("veth")
        || name.starts_with("vboxnet")
        || name.starts_with("vmnet")
        || name.starts_with("tap")
        || name.starts_with("tun")
    {
        InterfaceType::Virtual
    } else {
        InterfaceType::Physical
    }
}

pub fn extract() -> NetworkRecord {
    let pid_map = socket_inode_to_pid();
    let sockets = enumerate_sockets()
        .iter()
        .map(|raw| classify(raw, &pid_map))
        .collect();

    NetworkRecord {
        interfaces: interfaces(),
        sockets,
        extras: Map::new(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_little_endian_hex_ipv4() {
        // 0100007F is 127.0.0.1 little-endian hex encoded.
        assert_eq!(parse_hex_ipv4("0100007F").unwrap(), Ipv4Addr::new(127, 0, 0, 1));
    }

    #[test]
    fn tcp_state_codes_map_to_names() {
        assert_eq!(tcp_state_name("0A"), "LISTEN");
        assert_eq!(tcp_state_name("01"), "ESTABLISHED");
    }

    #[test]
    fn rfc1918_detection() {
        assert!(is_rfc1918("10.0.0.5"));
        assert!(is_rfc1918("192.168.1.1"));
        assert!(is_rfc1918("172.16.0.1"));
        assert!(!is_rfc1918("172.32.0.1"));
        assert!(!is_rfc1918("8.8.8.8"));
    }

    #[test]
    fn nat_suspected_flag_requires_outbound_private_to_public() {
        let raw = RawSocket {
            proto: "tcp",
            laddr: "10.0.0.5".to_string(),
            lport: 54321,
            raddr: "8.8.8.8".to_string(),
            rport: 443,
            status: "ESTABLISHED".to_string(),
            inode: 1,
        };
        let record = classify(&raw, &HashMap::new());
        assert!(record.nat_suspected);
    }

    #[test]
    fn prefix_24_yields_standard_netmask() {
        assert_eq!(prefix_to_netmask(24), "255.255.255.0");
    }
}
