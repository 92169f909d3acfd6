//! Routing extractor: IP forwarding flag, routing table, NAT rules.

use std::fs;

use provenance_core::snapshot::{RouteEntry, RoutingRecord};

#[cfg(target_os = "linux")]
fn ip_forwarding() -> bool {
    fs::read_to_string("/proc/sys/net/ipv4/ip_forward")
        .map(|s| s.trim() == "1")
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn ip_forwarding() -> bool {
    false
}

/// `/proc/net/route` rows are tab-separated; the destination and gateway
/// columns are little-endian hex, matching the phase-0 gateway parse.
#[cfg(target_os = "linux")]
fn routes() -> Vec<RouteEntry> {
    let Ok(contents) = fs::read_to_string("/proc/net/route") else {
        return Vec::new();
    };
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return None;
            }
            let iface = fields[0].to_string();
            let dest_hex = fields[1];
            let gw_hex = fields[2];
            let dest = hex_to_ipv4(dest_hex)?;
            let gateway = hex_to_ipv4(gw_hex).filter(|g| g != "0.0.0.0");
            Some(RouteEntry {
                destination: dest,
                gateway,
                interface: Some(iface),
            })
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn hex_to_ipv4(hex: &str) -> Option<String> {
    let bytes = u32::from_str_radix(hex, 16).ok()?;
    let octets = bytes.to_le_bytes();
    Some(format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]))
}

#[cfg(not(target_os = "linux"))]
fn routes() -> Vec<RouteEntry> {
    Vec::new()
}

#[cfg(target_os = "linux")]
fn default_routes(all_routes: &[RouteEntry]) -> Vec<RouteEntry> {
    all_routes
        .iter()
        .filter(|r| r.destination == "0.0.0.0")
        .cloned()
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn default_routes(_all_routes: &[RouteEntry]) -> Vec<RouteEntry> {
    Vec::new()
}

#[cfg(target_os = "linux")]
fn nat_rules() -> Vec<String> {
    let Ok(output) = std::process::Command::new("iptables")
        .args(["-t", "nat", "-L", "-n"])
        .output()
    else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn nat_rules() -> Vec<String> {
    Vec::new()
}

pub fn extract() -> RoutingRecord {
    let all_routes = routes();
    RoutingRecord {
        ip_forwarding: ip_forwarding(),
        default_routes: default_routes(&all_routes),
        nat_rules: nat_rules(),
        routes: all_routes,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn hex_route_decodes_as_little_endian() {
        assert_eq!(hex_to_ipv4("00000000"), Some("0.0.0.0".to_string()));
    }

    #[test]
    fn extract_never_panics() {
        let record = extract();
        assert!(record.error.is_none());
    }
}
