//! Hardware extractor: CPU, memory, disks, boot time, virtualization heuristic.

use provenance_core::snapshot::{DiskInfo, HardwareRecord};
use serde_json::Map;
use std::fs;

#[cfg(target_os = "linux")]
fn cpu_counts() -> (Option<u32>, Option<u32>) {
    let Ok(contents) = fs::read_to_string("/proc/cpuinfo") else {
        return (None, None);
    };
    let logical = contents
        .lines()
        .filter(|l| l.starts_with("processor"))
        .count() as u32;
    let physical_ids: std::collections::HashSet<_> = contents
        .lines()
        .filter(|l| l.starts_with("physical id"))
        .filter_map(|l| l.split(':').nth(1))
        .map(|s| s.trim().to_string())
        .collect();
    let physical = if physical_ids.is_empty() {
        logical
    } else {
        physical_ids.len() as u32
    };
    (Some(physical), Some(logical))
}

#[cfg(not(target_os = "linux"))]
fn cpu_counts() -> (Option<u32>, Option<u32>) {
    (None, std::thread::available_parallelism().ok().map(|n| n.get() as u32))
}

#[cfg(target_os = "linux")]
fn memory_stats() -> (Option<u64>, Option<u64>, Option<u64>, Option<f64>) {
    let Ok(contents) = fs::read_to_string("/proc/meminfo") else {
        return (None, None, None, None);
    };
    let mut fields = std::collections::HashMap::new();
    for line in contents.lines() {
        if let Some((key, rest)) = line.split_once(':') {
            if let Some(kb) = rest.trim().split_whitespace().next() {
                if let Ok(v) = kb.parse::<u64>() {
                    fields.insert(key.to_string(), v * 1024);
                }
            }
        }
    }
    let total = fields.get("MemTotal").copied();
    let available = fields.get("MemAvailable").copied();
    let used = match (total, available) {
        (Some(t), Some(a)) => Some(t.saturating_sub(a)),
        _ => None,
    };
    let percent = match (total, used) {
        (Some(t), Some(u)) if t > 0 => Some(u as f64 / t as f64 * 100.0),
        _ => None,
    };
    (total, available, used, percent)
}

#[cfg(not(target_os = "linux"))]
fn memory_stats() -> (Option<u64>, Option<u64>, Option<u64>, Option<f64>) {
    (None, None, None, None)
}

#[cfg(target_os = "linux")]
fn disks() -> Vec<DiskInfo> {
    let Ok(contents) = fs::read_to_string("/proc/mounts") else {
        return Vec::new();
    };
    contents
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let _device = parts.next()?;
            let mount = parts.next()?.to_string();
            let fstype = parts.next()?;
            if !matches!(fstype, "ext4" | "ext3" | "xfs" | "btrfs" | "ntfs" | "apfs" | "zfs") {
                return None;
            }
            Some(DiskInfo {
                mount,
                total_bytes: None,
                used_bytes: None,
            })
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn disks() -> Vec<DiskInfo> {
    Vec::new()
}

#[cfg(target_os = "linux")]
fn boot_time_epoch() -> Option<i64> {
    let uptime = fs::read_to_string("/proc/uptime").ok()?;
    let seconds: f64 = uptime.split_whitespace().next()?.parse().ok()?;
    let now = chrono::Utc::now().timestamp();
    Some(now - seconds as i64)
}

#[cfg(not(target_os = "linux"))]
fn boot_time_epoch() -> Option<i64> {
    None
}

/// Cheap VM heuristic: DMI product name or hypervisor CPU flag.
#[cfg(target_os = "linux")]
fn virtualized_heuristic() -> bool {
    if let Ok(product) = fs::read_to_string("/sys/class/dmi/id/product_name") {
        let lower = product.to_lowercase();
        if ["virtualbox", "vmware", "kvm", "qemu", "virtual machine"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            return true;
        }
    }
    if let Ok(cpuinfo) = fs::read_to_string("/proc/cpuinfo") {
        if cpuinfo.contains("hypervisor") {
            return true;
        }
    }
    false
}

#[cfg(not(target_os = "linux"))]
fn virtualized_heuristic() -> bool {
    false
}

pub fn extract() -> HardwareRecord {
    let (cpu_physical_cores, cpu_logical_cores) = cpu_counts();
    let (memory_total_bytes, memory_available_bytes, memory_used_bytes, memory_percent) =
        memory_stats();

    HardwareRecord {
        cpu_physical_cores,
        cpu_logical_cores,
        cpu_arch: Some(std::env::consts::ARCH.to_string()),
        memory_total_bytes,
        memory_available_bytes,
        memory_used_bytes,
        memory_percent,
        disks: disks(),
        boot_time_epoch: boot_time_epoch(),
        virtualized: virtualized_heuristic(),
        extras: Map::new(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_never_panics() {
        let record = extract();
        assert!(record.cpu_arch.is_some());
    }
}
