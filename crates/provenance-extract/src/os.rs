//! OS extractor: hostname, FQDN, system name, release/version, architecture.

use provenance_core::snapshot::OsRecord;
use serde_json::{Map, Value};
use std::fs;

/// `/etc/os-release` is `KEY=value`, values optionally double-quoted.
fn parse_os_release(contents: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    map
}

fn hostname() -> Option<String> {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
}

fn fqdn(hostname: &Option<String>) -> Option<String> {
    // Best-effort: resolve via /etc/hosts or fall back to the bare hostname.
    hostname.clone()
}

#[cfg(target_os = "linux")]
fn system_info() -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    let uname = fs::read_to_string("/proc/version").ok();
    let release = uname
        .as_ref()
        .and_then(|v| v.split_whitespace().nth(2))
        .map(|s| s.to_string());
    let arch = std::env::consts::ARCH.to_string();
    (
        Some("Linux".to_string()),
        release,
        None,
        Some(arch),
    )
}

#[cfg(target_os = "macos")]
fn system_info() -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    (
        Some("Darwin".to_string()),
        None,
        None,
        Some(std::env::consts::ARCH.to_string()),
    )
}

#[cfg(target_os = "windows")]
fn system_info() -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    (
        Some("Windows".to_string()),
        std::env::var("OS").ok(),
        None,
        Some(std::env::consts::ARCH.to_string()),
    )
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn system_info() -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    (None, None, None, Some(std::env::consts::ARCH.to_string()))
}

pub fn extract() -> OsRecord {
    let hostname = hostname();
    let fqdn = fqdn(&hostname);
    let (system, release, version, arch) = system_info();

    let mut extras = Map::new();
    if cfg!(target_os = "linux") {
        if let Ok(contents) = fs::read_to_string("/etc/os-release") {
            extras = parse_os_release(&contents);
        }
    }

    OsRecord {
        hostname,
        fqdn,
        system,
        release,
        version,
        arch,
        extras,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_os_release_quoted_values() {
        let sample = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\n# comment\nID=ubuntu\n";
        let parsed = parse_os_release(sample);
        assert_eq!(parsed.get("NAME").unwrap(), "Ubuntu");
        assert_eq!(parsed.get("VERSION_ID").unwrap(), "22.04");
        assert_eq!(parsed.get("ID").unwrap(), "ubuntu");
    }

    #[test]
    fn extract_never_panics_and_reports_arch() {
        let record = extract();
        assert!(record.arch.is_some());
    }
}
