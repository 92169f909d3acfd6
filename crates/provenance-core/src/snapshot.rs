//! Wire types for the scanner's snapshot and its constituent phase results.
//!
//! These mirror the data model directly: one immutable [`Snapshot`] per run,
//! built from a [`ScannerHost`] (phase 0), a map of [`PhaseOneResult`] keyed
//! by interface name (phase 1), and a map of [`ExtractorRecord`] keyed by
//! target IP (phase 2). Every section carries an `extras` catch-all map so
//! that fields unknown to this version of the schema survive a
//! deserialize/reserialize round trip, and most leaf records carry an
//! `error` field so a failed extractor still produces a valid, partial
//! record rather than aborting the pipeline.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn extras_default() -> Map<String, Value> {
    Map::new()
}

/// The schema version stamped by the remote agent into every extractor
/// record it produces. The graph builder accepts this version only;
/// anything else is rejected rather than guessed at.
pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------
// Phase 0 — self-discovery
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArpEntry {
    pub ip: String,
    pub mac: String,
    pub iface: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Virtual,
    Wireless,
    Bridge,
    Physical,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub ipv4: Option<String>,
    pub netmask: Option<String>,
    pub ipv6: Vec<String>,
    pub mac: Option<String>,
    pub iface_type: Option<InterfaceType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveConnection {
    pub laddr: Option<String>,
    pub raddr: Option<String>,
    pub status: Option<String>,
}

/// Output of Phase 0 (self-discovery). No side effects on the network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerHost {
    pub hostname: String,
    pub domain: String,
    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
    pub dns: Vec<String>,
    pub interfaces: Vec<InterfaceInfo>,
    pub active_connections: Vec<ActiveConnection>,
    pub arp_cache: Vec<ArpEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------
// Phase 1 — local network discovery
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsHint {
    LinuxLike,
    WindowsLike,
    NetworkDeviceLike,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostType {
    Gateway,
    NetworkDevice,
    Printer,
    WebService,
    SshService,
    DnsLike,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpHit {
    pub port: u16,
    pub evidence: String,
    pub confidence: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDetail {
    #[serde(default)]
    pub tcp: BTreeSet<u16>,
    #[serde(default)]
    pub udp: Vec<UdpHit>,
    pub os_hint: Option<OsHint>,
    #[serde(rename = "type")]
    pub host_type: Option<HostType>,
}

/// Result of Phase 1 for a single interface's subnet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseOneResult {
    pub network: String,
    #[serde(default)]
    pub discovered_hosts: BTreeSet<String>,
    #[serde(default)]
    pub details: BTreeMap<String, HostDetail>,
    #[serde(default)]
    pub methods: Vec<String>,
    pub scanner_ip: Option<String>,
    pub scanner_role: Option<String>,
}

// ---------------------------------------------------------------------
// Phase 2 — per-host extractor record
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsRecord {
    pub hostname: Option<String>,
    pub fqdn: Option<String>,
    pub system: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub arch: Option<String>,
    /// Parsed `/etc/os-release` contents on POSIX; Windows edition tuple on Windows.
    #[serde(default = "extras_default")]
    pub extras: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskInfo {
    pub mount: String,
    pub total_bytes: Option<u64>,
    pub used_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareRecord {
    pub cpu_physical_cores: Option<u32>,
    pub cpu_logical_cores: Option<u32>,
    pub cpu_arch: Option<String>,
    pub memory_total_bytes: Option<u64>,
    pub memory_available_bytes: Option<u64>,
    pub memory_used_bytes: Option<u64>,
    pub memory_percent: Option<f64>,
    #[serde(default)]
    pub disks: Vec<DiskInfo>,
    pub boot_time_epoch: Option<i64>,
    #[serde(default)]
    pub virtualized: bool,
    #[serde(default = "extras_default")]
    pub extras: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketDirection {
    Listening,
    Outbound,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindClass {
    AllInterfaces,
    Loopback,
    Specific,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    Public,
    Local,
    Internal,
}

impl BindClass {
    pub fn classify(bind_ip: &str) -> (BindClass, Exposure) {
        if bind_ip == "0.0.0.0" || bind_ip == "::" {
            (BindClass::AllInterfaces, Exposure::Public)
        } else if bind_ip.starts_with("127.") || bind_ip == "::1" {
            (BindClass::Loopback, Exposure::Local)
        } else {
            (BindClass::Specific, Exposure::Internal)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketRecord {
    pub proto: String,
    pub laddr: Option<String>,
    pub lport: Option<u16>,
    pub raddr: Option<String>,
    pub rport: Option<u16>,
    pub status: String,
    pub pid: Option<u32>,
    pub direction: SocketDirection,
    pub bind: Option<BindClass>,
    pub exposure: Option<Exposure>,
    #[serde(default)]
    pub nat_suspected: bool,
    pub process_name: Option<String>,
    pub process_exe: Option<String>,
    pub process_user: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkRecord {
    #[serde(default)]
    pub interfaces: Vec<InterfaceInfo>,
    #[serde(default)]
    pub sockets: Vec<SocketRecord>,
    #[serde(default = "extras_default")]
    pub extras: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Root,
    Admin,
    System,
    Service,
    Human,
    Rdp,
    Backup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedSession {
    pub username: String,
    pub terminal: Option<String>,
    pub source_host: Option<String>,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAccount {
    pub username: String,
    pub uid: Option<i64>,
    pub shell: Option<String>,
    #[serde(default)]
    pub roles: Vec<AccountRole>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersRecord {
    #[serde(default)]
    pub sessions: Vec<LoggedSession>,
    #[serde(default)]
    pub accounts: Vec<SystemAccount>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    System,
    User,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    Scanner,
    Shell,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub parent_name: Option<String>,
    pub exe: Option<String>,
    pub user: Option<String>,
    pub cmdline: Option<String>,
    pub create_time: Option<i64>,
    pub process_type: ProcessType,
    pub process_role: ProcessRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformService {
    pub name: String,
    pub main_pid: Option<u32>,
    pub exec_start: Option<String>,
    pub user: Option<String>,
    pub state: Option<String>,
    pub start_mode: Option<String>,
    pub path_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesRecord {
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub listening_sockets: Vec<SocketRecord>,
    #[serde(default)]
    pub services: Vec<PlatformService>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwarePackage {
    pub name: String,
    pub version: Option<String>,
    pub source: String,
    pub scope: String,
    pub confidence: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoftwareRecord {
    #[serde(default)]
    pub packages: Vec<SoftwarePackage>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: String,
    pub gateway: Option<String>,
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingRecord {
    #[serde(default)]
    pub ip_forwarding: bool,
    #[serde(default)]
    pub default_routes: Vec<RouteEntry>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub nat_rules: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypervisorProvider {
    Virtualbox,
    Vmware,
    Kvm,
    Hyperv,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualizationRecord {
    #[serde(default)]
    pub virtualized: bool,
    pub hypervisor: Option<String>,
    pub provider: Option<HypervisorProvider>,
    pub vm_uuid: Option<String>,
    #[serde(default)]
    pub guest_tools: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One target's full extraction result, as produced by the remote agent
/// (or, for the scanner's own node, run in-process).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub os: OsRecord,
    #[serde(default)]
    pub hardware: HardwareRecord,
    #[serde(default)]
    pub network: NetworkRecord,
    #[serde(default)]
    pub users: UsersRecord,
    #[serde(default)]
    pub services: ServicesRecord,
    #[serde(default)]
    pub software: SoftwareRecord,
    #[serde(default)]
    pub routing: RoutingRecord,
    #[serde(default)]
    pub virtualization: VirtualizationRecord,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Default for ExtractorRecord {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            os: OsRecord::default(),
            hardware: HardwareRecord::default(),
            network: NetworkRecord::default(),
            users: UsersRecord::default(),
            services: ServicesRecord::default(),
            software: SoftwareRecord::default(),
            routing: RoutingRecord::default(),
            virtualization: VirtualizationRecord::default(),
        }
    }
}

// ---------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatInfrastructure {
    pub present: bool,
    pub cidr: String,
    pub gateway: Option<String>,
    pub role: String,
    #[serde(rename = "type")]
    pub nat_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Infrastructure {
    pub nat: Option<NatInfrastructure>,
}

/// The immutable union of all phase outputs for one scanner run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    pub collected_at: DateTime<Utc>,
    pub scanner_host: ScannerHost,
    pub local_network_discovery: BTreeMap<String, PhaseOneResult>,
    pub phase2: BTreeMap<String, ExtractorRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<Infrastructure>,
}

impl Snapshot {
    pub fn new(
        scanner_host: ScannerHost,
        local_network_discovery: BTreeMap<String, PhaseOneResult>,
        phase2: BTreeMap<String, ExtractorRecord>,
    ) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            collected_at: Utc::now(),
            scanner_host,
            local_network_discovery,
            phase2,
            infrastructure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_classification_matches_exposure_rule() {
        assert_eq!(
            BindClass::classify("0.0.0.0"),
            (BindClass::AllInterfaces, Exposure::Public)
        );
        assert_eq!(
            BindClass::classify("::"),
            (BindClass::AllInterfaces, Exposure::Public)
        );
        assert_eq!(
            BindClass::classify("127.0.0.1"),
            (BindClass::Loopback, Exposure::Local)
        );
        assert_eq!(
            BindClass::classify("::1"),
            (BindClass::Loopback, Exposure::Local)
        );
        assert_eq!(
            BindClass::classify("10.0.0.20"),
            (BindClass::Specific, Exposure::Internal)
        );
    }

    #[test]
    fn extractor_record_defaults_carry_schema_version() {
        let record = ExtractorRecord::default();
        assert_eq!(record.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let snap = Snapshot::new(ScannerHost::default(), BTreeMap::new(), BTreeMap::new());
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap.snapshot_id, back.snapshot_id);
    }
}
