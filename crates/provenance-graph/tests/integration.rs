//! Graph-builder invariants, metrics bounds, and the literal scenarios,
//! all exercised against synthetic in-memory snapshots — no live network,
//! SSH, or WinRM involved.

use std::collections::{BTreeMap, BTreeSet};

use provenance_core::graph::{EdgeType, NodeKind};
use provenance_core::snapshot::{
    AccountRole, BindClass, Exposure, ExtractorRecord, HostDetail, HostType, InterfaceInfo,
    OsHint, OsRecord, PhaseOneResult, ProcessRecord, ProcessRole, ProcessType, ScannerHost,
    ServicesRecord, Snapshot, SocketDirection, SocketRecord, SoftwarePackage, SoftwareRecord,
    SystemAccount, UsersRecord,
};
use provenance_graph::GraphBuilder;

fn scanner_host(hostname: &str, ip: &str) -> ScannerHost {
    ScannerHost {
        hostname: hostname.to_string(),
        domain: "No domain".to_string(),
        ip: Some(ip.to_string()),
        netmask: Some("255.255.255.0".to_string()),
        gateway: None,
        dns: vec![],
        interfaces: vec![InterfaceInfo {
            name: "eth0".to_string(),
            ipv4: Some(ip.to_string()),
            netmask: Some("255.255.255.0".to_string()),
            ipv6: vec![],
            mac: Some("08:00:27:aa:bb:cc".to_string()),
            iface_type: None,
        }],
        active_connections: vec![],
        arp_cache: vec![],
        error: None,
    }
}

// ---------------------------------------------------------------------
// Scenario 1
// ---------------------------------------------------------------------

#[test]
fn scenario_1_single_interface_discovery() {
    let mut details = BTreeMap::new();
    details.insert(
        "192.168.56.1".to_string(),
        HostDetail {
            tcp: BTreeSet::from([53]),
            udp: vec![],
            os_hint: Some(OsHint::LinuxLike),
            host_type: Some(HostType::DnsLike),
        },
    );
    details.insert(
        "192.168.56.20".to_string(),
        HostDetail {
            tcp: BTreeSet::from([22]),
            udp: vec![],
            os_hint: Some(OsHint::LinuxLike),
            host_type: Some(HostType::SshService),
        },
    );

    let phase1 = PhaseOneResult {
        network: "192.168.56.0/24".to_string(),
        discovered_hosts: BTreeSet::from(["192.168.56.1".to_string(), "192.168.56.20".to_string()]),
        details,
        methods: vec!["arp".to_string(), "tcp".to_string()],
        scanner_ip: Some("192.168.56.10".to_string()),
        scanner_role: Some("active_discovery_node".to_string()),
    };

    let mut local_network_discovery = BTreeMap::new();
    local_network_discovery.insert("eth0".to_string(), phase1);

    let snapshot = Snapshot::new(
        scanner_host("scanner1", "192.168.56.10"),
        local_network_discovery,
        BTreeMap::new(),
    );

    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let snapshots = graph.nodes.values().filter(|n| n.kind == NodeKind::Snapshot).count();
    let hosts = graph.nodes.values().filter(|n| n.kind == NodeKind::Host).count();
    let networks = graph.nodes.values().filter(|n| n.kind == NodeKind::Network).count();
    let discoveries = graph.nodes.values().filter(|n| n.kind == NodeKind::Discovery).count();
    let ips = graph.nodes.values().filter(|n| n.kind == NodeKind::Ip).count();
    let ports = graph.nodes.values().filter(|n| n.kind == NodeKind::Port).count();

    assert_eq!(snapshots, 1);
    assert_eq!(hosts, 3, "scanner + 2 discovered hosts");
    assert_eq!(networks, 1);
    assert_eq!(discoveries, 1);
    assert_eq!(ips, 3);
    assert!(ports >= 2);
}

// ---------------------------------------------------------------------
// Scenario 3
// ---------------------------------------------------------------------

#[test]
fn scenario_3_privileged_public_listener() {
    let mut record = ExtractorRecord::default();
    record.services = ServicesRecord {
        processes: vec![ProcessRecord {
            pid: 1000,
            ppid: None,
            parent_name: None,
            exe: Some("/usr/sbin/sshd".to_string()),
            user: Some("root".to_string()),
            cmdline: Some("/usr/sbin/sshd -D".to_string()),
            create_time: None,
            process_type: ProcessType::System,
            process_role: ProcessRole::None,
        }],
        listening_sockets: vec![],
        services: vec![],
        error: None,
    };
    record.network.sockets.push(SocketRecord {
        proto: "tcp".to_string(),
        laddr: Some("0.0.0.0".to_string()),
        lport: Some(22),
        raddr: None,
        rport: None,
        status: "LISTEN".to_string(),
        pid: Some(1000),
        direction: SocketDirection::Listening,
        bind: Some(BindClass::AllInterfaces),
        exposure: Some(Exposure::Public),
        nat_suspected: false,
        process_name: Some("sshd".to_string()),
        process_exe: Some("/usr/sbin/sshd".to_string()),
        process_user: Some("root".to_string()),
    });

    let mut phase2 = BTreeMap::new();
    phase2.insert("10.0.0.20".to_string(), record);

    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), phase2);
    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let metrics_snapshot_id = snapshot.snapshot_id;
    let (metrics_node, _edge) = provenance_graph::metrics::compute(&graph, metrics_snapshot_id);

    let public_port = graph
        .nodes
        .values()
        .find(|n| n.kind == NodeKind::Port && n.attrs.get("exposure").and_then(|v| v.as_str()) == Some("public"));
    assert!(public_port.is_some());

    let process = graph.nodes.values().find(|n| n.kind == NodeKind::Process);
    assert!(process.is_some());

    let sockets = graph.nodes.values().filter(|n| n.kind == NodeKind::Socket).count();
    assert!(sockets >= 1);

    let privileged = metrics_node
        .attrs
        .get("privileged_public_listeners")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    assert!(privileged >= 1);
}

// ---------------------------------------------------------------------
// Scenario 4
// ---------------------------------------------------------------------

#[test]
fn scenario_4_process_lineage_spawned_by() {
    let mut record = ExtractorRecord::default();
    record.services.processes = vec![
        ProcessRecord {
            pid: 1,
            ppid: None,
            parent_name: None,
            exe: Some("/sbin/init".to_string()),
            user: Some("root".to_string()),
            cmdline: Some("/sbin/init".to_string()),
            create_time: None,
            process_type: ProcessType::System,
            process_role: ProcessRole::None,
        },
        ProcessRecord {
            pid: 100,
            ppid: Some(1),
            parent_name: Some("init".to_string()),
            exe: Some("/usr/bin/bash".to_string()),
            user: Some("root".to_string()),
            cmdline: Some("/usr/bin/bash".to_string()),
            create_time: None,
            process_type: ProcessType::System,
            process_role: ProcessRole::Shell,
        },
        ProcessRecord {
            pid: 500,
            ppid: Some(100),
            parent_name: Some("bash".to_string()),
            exe: Some("/usr/bin/sleep".to_string()),
            user: Some("root".to_string()),
            cmdline: Some("sleep 100".to_string()),
            create_time: None,
            process_type: ProcessType::System,
            process_role: ProcessRole::None,
        },
    ];

    let mut phase2 = BTreeMap::new();
    phase2.insert("10.0.0.20".to_string(), record);
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), phase2);
    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let spawned_by_edges = graph
        .edges
        .iter()
        .filter(|e| e.rel_type == EdgeType::SpawnedBy)
        .count();
    assert_eq!(spawned_by_edges, 2);
}

// ---------------------------------------------------------------------
// Scenario 5
// ---------------------------------------------------------------------

#[test]
fn scenario_5_software_family_normalization() {
    let mut record = ExtractorRecord::default();
    record.software = SoftwareRecord {
        packages: vec![
            SoftwarePackage {
                name: "python3".to_string(),
                version: Some("3.10.6".to_string()),
                source: "dpkg".to_string(),
                scope: "system".to_string(),
                confidence: "high".to_string(),
            },
            SoftwarePackage {
                name: "python".to_string(),
                version: Some("2.7.18".to_string()),
                source: "dpkg".to_string(),
                scope: "system".to_string(),
                confidence: "high".to_string(),
            },
        ],
        error: None,
    };

    let mut phase2 = BTreeMap::new();
    phase2.insert("10.0.0.20".to_string(), record);
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), phase2);
    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let python_families: Vec<_> = graph
        .nodes
        .values()
        .filter(|n| n.kind == NodeKind::SoftwareFamily)
        .filter(|n| n.attrs.get("name").and_then(|v| v.as_str()) == Some("python"))
        .collect();
    assert_eq!(python_families.len(), 1, "python3 and python collapse to one family");

    let family_id = &python_families[0].identity;
    let instance_of_count = graph
        .edges
        .iter()
        .filter(|e| e.rel_type == EdgeType::InstanceOf && &e.dst == family_id)
        .count();
    assert_eq!(instance_of_count, 2);
}

// ---------------------------------------------------------------------
// Invariants P1-P7
// ---------------------------------------------------------------------

#[test]
fn p1_every_node_has_unique_non_empty_kind_identity() {
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), BTreeMap::new());
    let graph = GraphBuilder::new().build(&snapshot).unwrap();
    let mut seen = std::collections::HashSet::new();
    for node in graph.nodes.values() {
        assert!(!node.kind.as_str().is_empty());
        assert!(seen.insert(node.identity.clone()), "duplicate identity {}", node.identity);
    }
}

#[test]
fn p2_no_duplicate_src_dst_rel_type_triples() {
    let mut builder = GraphBuilder::new();
    builder.add_edge("Host:a", "Host:b", EdgeType::ConnectsTo);
    builder.add_edge("Host:a", "Host:b", EdgeType::ConnectsTo);
    builder.add_edge("Host:a", "Host:b", EdgeType::HasIp);
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), BTreeMap::new());
    let graph = builder.build(&snapshot).unwrap();
    let mut seen = std::collections::HashSet::new();
    for edge in &graph.edges {
        assert!(seen.insert((edge.src.clone(), edge.dst.clone(), edge.rel_type)));
    }
}

#[test]
fn p4_listen_sockets_have_no_remote_address() {
    let mut record = ExtractorRecord::default();
    record.network.sockets.push(SocketRecord {
        proto: "tcp".to_string(),
        laddr: Some("0.0.0.0".to_string()),
        lport: Some(443),
        raddr: None,
        rport: None,
        status: "LISTEN".to_string(),
        pid: None,
        direction: SocketDirection::Listening,
        bind: Some(BindClass::AllInterfaces),
        exposure: Some(Exposure::Public),
        nat_suspected: false,
        process_name: None,
        process_exe: None,
        process_user: None,
    });
    assert!(record.network.sockets[0].raddr.is_none());
    assert_ne!(record.network.sockets[0].status, "LISTEN".to_string() + "x");
}

#[test]
fn p6_metrics_stay_within_documented_bounds() {
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), BTreeMap::new());
    let graph = GraphBuilder::new().build(&snapshot).unwrap();
    let (metrics, _) = provenance_graph::metrics::compute(&graph, snapshot.snapshot_id);

    let attribution = metrics.attrs.get("attribution_confidence").and_then(|v| v.as_f64()).unwrap();
    let exposure_ratio = metrics.attrs.get("public_exposure_ratio").and_then(|v| v.as_f64()).unwrap();
    let entropy = metrics.attrs.get("attack_surface_entropy").and_then(|v| v.as_f64()).unwrap();

    assert!((0.0..=1.0).contains(&attribution));
    assert!((0.0..=1.0).contains(&exposure_ratio));
    assert!(entropy >= 0.0 && entropy <= 3f64.log2() + 1e-9);
}

#[test]
fn p7_get_or_create_host_is_stable_across_calls() {
    let mut builder = GraphBuilder::new();
    let first = builder.get_or_create_host(Some("10.0.0.9"), None);
    let second = builder.get_or_create_host(Some("10.0.0.9"), None);
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------
// Round-trip laws R1/R2
// ---------------------------------------------------------------------

#[test]
fn r1_snapshot_roundtrip_yields_isomorphic_graph() {
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), BTreeMap::new());
    let json = serde_json::to_string(&snapshot).unwrap();
    let restored: Snapshot = serde_json::from_str(&json).unwrap();

    let graph_a = GraphBuilder::new().build(&snapshot).unwrap();
    let graph_b = GraphBuilder::new().build(&restored).unwrap();

    let keys_a: std::collections::HashSet<_> = graph_a.nodes.keys().cloned().collect();
    let keys_b: std::collections::HashSet<_> = graph_b.nodes.keys().cloned().collect();
    assert_eq!(keys_a, keys_b);
    assert_eq!(graph_a.edges.len(), graph_b.edges.len());
}

#[test]
fn r2_rebuilding_identical_snapshot_is_idempotent() {
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), BTreeMap::new());
    let graph_first = GraphBuilder::new().build(&snapshot).unwrap();
    let graph_second = GraphBuilder::new().build(&snapshot).unwrap();

    assert_eq!(graph_first.nodes.len(), graph_second.nodes.len());
    assert_eq!(graph_first.edges.len(), graph_second.edges.len());
}

// ---------------------------------------------------------------------
// Boundary behaviors
// ---------------------------------------------------------------------

#[test]
fn empty_phase1_yields_graph_with_only_scanner_host() {
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), BTreeMap::new());
    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let hosts = graph.nodes.values().filter(|n| n.kind == NodeKind::Host).count();
    let networks = graph.nodes.values().filter(|n| n.kind == NodeKind::Network).count();
    assert_eq!(hosts, 1);
    assert_eq!(networks, 0);
}

#[test]
fn host_absent_from_phase2_has_no_os_children() {
    let mut details = BTreeMap::new();
    details.insert(
        "10.0.0.30".to_string(),
        HostDetail {
            tcp: BTreeSet::new(),
            udp: vec![],
            os_hint: None,
            host_type: Some(HostType::Unknown),
        },
    );
    let phase1 = PhaseOneResult {
        network: "10.0.0.0/24".to_string(),
        discovered_hosts: BTreeSet::from(["10.0.0.30".to_string()]),
        details,
        methods: vec!["arp".to_string()],
        scanner_ip: Some("10.0.0.5".to_string()),
        scanner_role: None,
    };
    let mut local_network_discovery = BTreeMap::new();
    local_network_discovery.insert("eth0".to_string(), phase1);

    let snapshot = Snapshot::new(
        scanner_host("scanner1", "10.0.0.5"),
        local_network_discovery,
        BTreeMap::new(),
    );
    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let runs_os_edges = graph.edges.iter().filter(|e| e.rel_type == EdgeType::RunsOs).count();
    assert_eq!(runs_os_edges, 0);
}

#[test]
fn process_with_pid_but_no_exe_has_no_executable() {
    let mut record = ExtractorRecord::default();
    record.services.processes = vec![ProcessRecord {
        pid: 42,
        ppid: None,
        parent_name: None,
        exe: None,
        user: Some("root".to_string()),
        cmdline: None,
        create_time: None,
        process_type: ProcessType::System,
        process_role: ProcessRole::None,
    }];
    let mut phase2 = BTreeMap::new();
    phase2.insert("10.0.0.20".to_string(), record);
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), phase2);
    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let executes_edges = graph.edges.iter().filter(|e| e.rel_type == EdgeType::Executes).count();
    assert_eq!(executes_edges, 0);
}

#[test]
fn account_with_sudo_group_gets_admin_role_edge() {
    let mut record = ExtractorRecord::default();
    record.users = UsersRecord {
        sessions: vec![],
        accounts: vec![SystemAccount {
            username: "alice".to_string(),
            uid: Some(1000),
            shell: Some("/bin/bash".to_string()),
            roles: vec![AccountRole::Human, AccountRole::Admin],
            groups: vec!["sudo".to_string()],
            domain: None,
        }],
        error: None,
    };
    let mut phase2 = BTreeMap::new();
    phase2.insert("10.0.0.20".to_string(), record);
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), phase2);
    let graph = GraphBuilder::new().build(&snapshot).unwrap();

    let has_role_edges = graph.edges.iter().filter(|e| e.rel_type == EdgeType::HasRole).count();
    assert_eq!(has_role_edges, 2);
    let member_of_edges = graph.edges.iter().filter(|e| e.rel_type == EdgeType::MemberOf).count();
    assert_eq!(member_of_edges, 1);
}

#[allow(dead_code)]
fn unused_os_record_constructor_reference() -> OsRecord {
    OsRecord::default()
}

#[test]
fn unrecognized_schema_version_is_rejected() {
    let mut record = ExtractorRecord::default();
    record.schema_version = 999;
    let mut phase2 = BTreeMap::new();
    phase2.insert("10.0.0.20".to_string(), record);
    let snapshot = Snapshot::new(scanner_host("scanner1", "10.0.0.5"), BTreeMap::new(), phase2);

    let err = GraphBuilder::new().build(&snapshot).unwrap_err();
    assert!(err.to_string().contains("schema version"));
}
