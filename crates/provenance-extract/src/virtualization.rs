//! Virtualization extractor: hypervisor detection and guest-tool presence.

use std::fs;

use provenance_core::snapshot::{HypervisorProvider, VirtualizationRecord};

#[cfg(target_os = "linux")]
fn product_name() -> Option<String> {
    fs::read_to_string("/sys/class/dmi/id/product_name")
        .ok()
        .map(|s| s.trim().to_string())
}

#[cfg(not(target_os = "linux"))]
fn product_name() -> Option<String> {
    None
}

fn classify_provider(product: &Option<String>) -> Option<HypervisorProvider> {
    let product = product.as_deref()?.to_lowercase();
    if product.contains("virtualbox") {
        Some(HypervisorProvider::Virtualbox)
    } else if product.contains("vmware") {
        Some(HypervisorProvider::Vmware)
    } else if product.contains("kvm") || product.contains("qemu") {
        Some(HypervisorProvider::Kvm)
    } else if product.contains("virtual machine") {
        Some(HypervisorProvider::Hyperv)
    } else {
        None
    }
}

#[cfg(target_os = "linux")]
fn guest_tools() -> Vec<String> {
    let candidates = [
        ("/usr/sbin/VBoxService", "virtualbox-guest-additions"),
        ("/usr/bin/vmtoolsd", "open-vm-tools"),
        ("/usr/sbin/qemu-ga", "qemu-guest-agent"),
    ];
    candidates
        .iter()
        .filter(|(path, _)| std::path::Path::new(path).exists())
        .map(|(_, name)| name.to_string())
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn guest_tools() -> Vec<String> {
    Vec::new()
}

pub fn extract() -> VirtualizationRecord {
    let product = product_name();
    let provider = classify_provider(&product);
    let tools = guest_tools();

    VirtualizationRecord {
        virtualized: provider.is_some() || !tools.is_empty(),
        hypervisor: product,
        provider,
        vm_uuid: None,
        guest_tools: tools,
        error: None,
    }
}
