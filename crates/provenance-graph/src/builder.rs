//! In-memory provenance graph builder (§4.9): consumes a [`Snapshot`] and
//! produces a directed multigraph with stable node identity and
//! de-duplicated edges. Nodes live in an arena keyed by identity string so
//! the graph's cycles (Host → IP → Network ← IP ← Host) never need
//! pointers or lifetimes — just hashmap lookups.

use std::collections::{BTreeMap, HashMap, HashSet};

use provenance_core::graph::{identity, EdgeType, GraphEdge, GraphNode, NodeKind};
use provenance_core::snapshot::{Snapshot, SocketDirection, SoftwarePackage, SCHEMA_VERSION};
use provenance_core::ProvenanceError;

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Normalizes a software family name: lowercase, strip trailing digits and
/// `-`/`.` separators, collapse a handful of common aliases.
pub fn normalize_family(name: &str) -> String {
    let lower = name.to_lowercase();
    let trimmed = lower.trim_end_matches(|c: char| c.is_ascii_digit() || c == '-' || c == '.');
    match trimmed {
        "python3" | "python" => "python".to_string(),
        "nodejs" | "node" => "node".to_string(),
        other if other.is_empty() => lower,
        other => other.to_string(),
    }
}

pub struct GraphBuilder {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    edge_keys: HashSet<(String, String, EdgeType)>,
    /// IP -> Host identity, for get_or_create_host's IP-first lookup.
    host_by_ip: HashMap<String, String>,
    /// hostname -> Host identity, for the hostname fallback lookup.
    host_by_hostname: HashMap<String, String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            edge_keys: HashSet::new(),
            host_by_ip: HashMap::new(),
            host_by_hostname: HashMap::new(),
        }
    }

    fn upsert_node(&mut self, kind: NodeKind, key: &str) -> String {
        let id = identity(kind, key);
        self.nodes.entry(id.clone()).or_insert_with(|| GraphNode::new(kind, key));
        id
    }

    fn node_mut(&mut self, id: &str) -> &mut GraphNode {
        self.nodes.get_mut(id).expect("node must exist before mutation")
    }

    /// Looks up a Host by IP first, hostname second; never duplicates
    /// (invariant I1, P7).
    pub fn get_or_create_host(&mut self, ip: Option<&str>, hostname: Option<&str>) -> String {
        if let Some(ip) = ip {
            if let Some(existing) = self.host_by_ip.get(ip) {
                return existing.clone();
            }
        }
        if let Some(hostname) = hostname {
            if let Some(existing) = self.host_by_hostname.get(hostname) {
                if let Some(ip) = ip {
                    self.host_by_ip.insert(ip.to_string(), existing.clone());
                }
                return existing.clone();
            }
        }

        let key = ip.or(hostname).unwrap_or("unknown").to_string();
        let id = self.upsert_node(NodeKind::Host, &key);
        if let Some(ip) = ip {
            self.node_mut(&id).set("ip", ip);
            self.host_by_ip.insert(ip.to_string(), id.clone());
        }
        if let Some(hostname) = hostname {
            self.node_mut(&id).set("hostname", hostname);
            self.host_by_hostname.insert(hostname.to_string(), id.clone());
        }
        id
    }

    /// Inserts an edge unless an identical (src, dst, rel_type) triple
    /// already exists (invariant I2).
    pub fn add_edge(&mut self, src: &str, dst: &str, rel_type: EdgeType) {
        let key = (src.to_string(), dst.to_string(), rel_type);
        if self.edge_keys.insert(key) {
            self.edges.push(GraphEdge::new(src, dst, rel_type));
        }
    }

    fn ip_node(&mut self, ip: &str) -> String {
        self.upsert_node(NodeKind::Ip, ip)
    }

    fn network_node(&mut self, cidr: &str) -> String {
        self.upsert_node(NodeKind::Network, cidr)
    }

    fn attach_ip_to_host(&mut self, host_id: &str, ip: &str) {
        let ip_id = self.ip_node(ip);
        self.add_edge(host_id, &ip_id, EdgeType::HasIp);
    }

    fn attach_ip_to_network(&mut self, ip: &str, cidr: &str) {
        let ip_id = self.ip_node(ip);
        let net_id = self.network_node(cidr);
        self.add_edge(&ip_id, &net_id, EdgeType::InNetwork);
    }

    fn build_phase0(&mut self, snapshot: &Snapshot, scanner_host_id: &str) {
        let host = &snapshot.scanner_host;
        if let Some(ip) = &host.ip {
            self.attach_ip_to_host(scanner_host_id, ip);
        }
        for iface in &host.interfaces {
            let iface_key = format!("{}:{}", host.hostname, iface.name);
            let iface_id = self.upsert_node(NodeKind::Interface, &iface_key);
            {
                let node = self.node_mut(&iface_id);
                node.set("name", iface.name.clone());
                if let Some(mac) = &iface.mac {
                    node.set("mac", mac.clone());
                }
            }
            self.add_edge(scanner_host_id, &iface_id, EdgeType::HasInterface);
            if let Some(ip) = &iface.ipv4 {
                let ip_id = self.ip_node(ip);
                self.add_edge(&iface_id, &ip_id, EdgeType::HasIp);
                self.add_edge(scanner_host_id, &ip_id, EdgeType::HasIp);
            }
        }
    }

    fn build_phase1(&mut self, snapshot: &Snapshot, scanner_host_id: &str, scanner_hostname: &str) {
        for (iface_name, result) in &snapshot.local_network_discovery {
            let cidr = &result.network;
            self.network_node(cidr);

            if let Some(scanner_ip) = &result.scanner_ip {
                self.attach_ip_to_network(scanner_ip, cidr);
            }

            let discovery_key = format!("{iface_name}:{cidr}");
            let discovery_id = self.upsert_node(NodeKind::Discovery, &discovery_key);
            self.node_mut(&discovery_id).set("interface", iface_name.clone());
            self.add_edge(scanner_host_id, &discovery_id, EdgeType::Performed);

            for ip in &result.discovered_hosts {
                let discovered_id = self.get_or_create_host(Some(ip), None);
                self.attach_ip_to_host(&discovered_id, ip);
                self.attach_ip_to_network(ip, cidr);
                self.add_edge(&discovery_id, &discovered_id, EdgeType::Discovered);

                if let Some(detail) = result.details.get(ip) {
                    {
                        let host_node = self.node_mut(&discovered_id);
                        if let Some(hint) = detail.os_hint {
                            host_node.set("os_hint", format!("{hint:?}"));
                        }
                        if let Some(host_type) = detail.host_type {
                            host_node.set("host_type", format!("{host_type:?}"));
                        }
                    }

                    // A bare TCP-connect probe only proves a port is open,
                    // not which local address it is bound to; record it as
                    // a Port observed directly on the responding IP.
                    for port in &detail.tcp {
                        let port_key = format!("{ip}:tcp:{ip}:{port}");
                        let port_id = self.upsert_node(NodeKind::Port, &port_key);
                        {
                            let node = self.node_mut(&port_id);
                            node.set("proto", "tcp");
                            node.set("port", *port as i64);
                            node.set("bind_ip", ip.clone());
                            node.set("exposure", "internal");
                        }
                        self.add_edge(&discovered_id, &port_id, EdgeType::Exposes);
                    }
                }
            }
        }
        let _ = scanner_hostname;
    }

    fn build_phase2(&mut self, snapshot: &Snapshot) -> Result<(), ProvenanceError> {
        for (ip, record) in &snapshot.phase2 {
            if record.schema_version != SCHEMA_VERSION {
                return Err(ProvenanceError::InvalidSnapshot(format!(
                    "{ip}: unsupported extractor schema version {} (expected {SCHEMA_VERSION})",
                    record.schema_version
                )));
            }

            let host_id = self.get_or_create_host(Some(ip), record.os.hostname.as_deref());
            self.attach_ip_to_host(&host_id, ip);

            self.build_os(&host_id, record);
            self.build_hardware(&host_id, record);
            let pid_index = self.build_processes(&host_id, record);
            self.build_sockets(&host_id, record, &pid_index);
            self.build_software(&host_id, record, &pid_index);
            self.build_users(&host_id, record, &pid_index);
        }
        Ok(())
    }

    fn build_os(&mut self, host_id: &str, record: &provenance_core::snapshot::ExtractorRecord) {
        let Some(name) = record.os.system.clone() else {
            return;
        };
        let family_key = name.to_lowercase();
        let family_id = self.upsert_node(NodeKind::OsFamily, &family_key);
        self.node_mut(&family_id).set("name", name.clone());

        let version = record.os.version.clone().or_else(|| record.os.release.clone()).unwrap_or_default();
        let host_key = host_id.trim_start_matches("Host:");
        let instance_key = format!("{host_key}:{name}:{version}");
        let instance_id = self.upsert_node(NodeKind::OsInstance, &instance_key);
        {
            let node = self.node_mut(&instance_id);
            node.set("name", name);
            node.set("version", version);
        }
        self.add_edge(host_id, &instance_id, EdgeType::RunsOs);
        self.add_edge(&instance_id, &family_id, EdgeType::InstanceOf);
    }

    fn build_hardware(&mut self, host_id: &str, record: &provenance_core::snapshot::ExtractorRecord) {
        let host_key = host_id.trim_start_matches("Host:");
        let hw = &record.hardware;

        if hw.cpu_logical_cores.is_some() || hw.cpu_arch.is_some() {
            let cpu_id = self.upsert_node(NodeKind::Executable, &format!("{host_key}:cpu"));
            let node = self.node_mut(&cpu_id);
            node.set("component", "cpu");
            if let Some(cores) = hw.cpu_logical_cores {
                node.set("logical_cores", cores as i64);
            }
            if let Some(arch) = &hw.cpu_arch {
                node.set("arch", arch.clone());
            }
            self.add_edge(host_id, &cpu_id, EdgeType::HasHardware);
        }

        if hw.memory_total_bytes.is_some() {
            let mem_id = self.upsert_node(NodeKind::Executable, &format!("{host_key}:memory"));
            let node = self.node_mut(&mem_id);
            node.set("component", "memory");
            if let Some(total) = hw.memory_total_bytes {
                node.set("total_bytes", total as i64);
            }
            self.add_edge(host_id, &mem_id, EdgeType::HasHardware);
        }

        for (i, disk) in hw.disks.iter().enumerate() {
            let disk_id = self.upsert_node(NodeKind::Executable, &format!("{host_key}:disk:{i}"));
            let node = self.node_mut(&disk_id);
            node.set("component", "disk");
            node.set("mount", disk.mount.clone());
            self.add_edge(host_id, &disk_id, EdgeType::HasHardware);
        }
    }

    /// Builds Process nodes and returns a pid -> Process identity index.
    fn build_processes(
        &mut self,
        host_id: &str,
        record: &provenance_core::snapshot::ExtractorRecord,
    ) -> HashMap<u32, String> {
        let host_key = host_id.trim_start_matches("Host:").to_string();
        let mut index = HashMap::new();

        for process in &record.services.processes {
            let key = format!("{host_key}:{}", process.pid);
            let proc_id = self.upsert_node(NodeKind::Process, &key);
            {
                let node = self.node_mut(&proc_id);
                node.set("pid", process.pid as i64);
                if let Some(ppid) = process.ppid {
                    node.set("ppid", ppid as i64);
                }
                if let Some(exe) = &process.exe {
                    node.set("exe", exe.clone());
                }
                if let Some(user) = &process.user {
                    node.set("user", user.clone());
                }
                if let Some(cmdline) = &process.cmdline {
                    node.set("cmdline", cmdline.clone());
                }
                node.set("process_type", format!("{:?}", process.process_type));
                node.set("process_role", format!("{:?}", process.process_role));
            }
            self.add_edge(host_id, &proc_id, EdgeType::Runs);
            index.insert(process.pid, proc_id.clone());

            if let Some(exe) = &process.exe {
                let basename = exe.rsplit('/').next().unwrap_or(exe);
                let exec_key = format!("{host_key}:{basename}");
                let exec_id = self.upsert_node(NodeKind::Executable, &exec_key);
                self.node_mut(&exec_id).set("basename", basename.to_string());
                self.add_edge(&proc_id, &exec_id, EdgeType::Executes);

                let family_name = normalize_family(basename);
                if !family_name.is_empty() {
                    let family_id = self.upsert_node(NodeKind::SoftwareFamily, &family_name);
                    self.node_mut(&family_id).set("name", family_name);
                    self.add_edge(&exec_id, &family_id, EdgeType::PartOf);
                }
            }
        }

        for process in &record.services.processes {
            if let (Some(ppid), Some(child_id)) = (process.ppid, index.get(&process.pid)) {
                if let Some(parent_id) = index.get(&ppid) {
                    self.add_edge(child_id, parent_id, EdgeType::SpawnedBy);
                }
            }
        }

        index
    }

    fn build_sockets(
        &mut self,
        host_id: &str,
        record: &provenance_core::snapshot::ExtractorRecord,
        pid_index: &HashMap<u32, String>,
    ) {
        let host_key = host_id.trim_start_matches("Host:").to_string();

        for socket in &record.network.sockets {
            let laddr = socket.laddr.clone().unwrap_or_default();
            let lport = socket.lport.unwrap_or(0);

            if socket.direction == SocketDirection::Listening {
                let port_key = format!("{host_key}:{}:{laddr}:{lport}", socket.proto);
                let port_id = self.upsert_node(NodeKind::Port, &port_key);
                {
                    let node = self.node_mut(&port_id);
                    node.set("proto", socket.proto.clone());
                    node.set("port", lport as i64);
                    node.set("bind_ip", laddr.clone());
                    if let Some(exposure) = socket.exposure {
                        node.set("exposure", format!("{exposure:?}").to_lowercase());
                    }
                }
                self.add_edge(host_id, &port_id, EdgeType::Exposes);

                if let Some(pid) = socket.pid {
                    if let Some(proc_id) = pid_index.get(&pid) {
                        let sock_key = format!(
                            "{host_key}:{pid}:{}:{laddr}:{}:{}",
                            socket.proto, "-", socket.status
                        );
                        let sock_id = self.upsert_node(NodeKind::Socket, &sock_key);
                        self.node_mut(&sock_id).set("status", socket.status.clone());
                        self.add_edge(proc_id, &sock_id, EdgeType::UsesSocket);
                        self.add_edge(&sock_id, &port_id, EdgeType::BindsTo);
                    }
                }
            } else if let (Some(raddr), Some(pid)) = (&socket.raddr, socket.pid) {
                if let Some(proc_id) = pid_index.get(&pid) {
                    let sock_key = format!(
                        "{host_key}:{pid}:{}:{laddr}:{raddr}:{}",
                        socket.proto, socket.status
                    );
                    let sock_id = self.upsert_node(NodeKind::Socket, &sock_key);
                    {
                        let node = self.node_mut(&sock_id);
                        node.set("status", socket.status.clone());
                        node.set("nat_suspected", socket.nat_suspected);
                    }
                    self.add_edge(proc_id, &sock_id, EdgeType::UsesSocket);
                    let remote_ip_id = self.ip_node(raddr);
                    self.add_edge(&sock_id, &remote_ip_id, EdgeType::ConnectsTo);
                }
            }
        }
    }

    fn build_software(
        &mut self,
        host_id: &str,
        record: &provenance_core::snapshot::ExtractorRecord,
        _pid_index: &HashMap<u32, String>,
    ) {
        let host_key = host_id.trim_start_matches("Host:").to_string();
        for pkg in &record.software.packages {
            let SoftwarePackage { name, version, .. } = pkg;
            let family_name = normalize_family(name);
            let family_id = self.upsert_node(NodeKind::SoftwareFamily, &family_name);
            self.node_mut(&family_id).set("name", family_name.clone());

            let version_key = version.clone().unwrap_or_default();
            let instance_key = format!("{host_key}:{name}:{version_key}");
            let instance_id = self.upsert_node(NodeKind::SoftwareInstance, &instance_key);
            {
                let node = self.node_mut(&instance_id);
                node.set("name", name.clone());
                if let Some(v) = version {
                    node.set("version", v.clone());
                }
                node.set("source", pkg.source.clone());
                node.set("scope", pkg.scope.clone());
                node.set("confidence", pkg.confidence.clone());
            }
            self.add_edge(host_id, &instance_id, EdgeType::HasInstalled);
            self.add_edge(&instance_id, &family_id, EdgeType::InstanceOf);
        }
    }

    fn build_users(
        &mut self,
        host_id: &str,
        record: &provenance_core::snapshot::ExtractorRecord,
        pid_index: &HashMap<u32, String>,
    ) {
        let host_key = host_id.trim_start_matches("Host:").to_string();
        let mut user_ids: HashMap<String, String> = HashMap::new();

        for account in &record.users.accounts {
            let key = format!("{host_key}:{}", account.username);
            let user_id = self.upsert_node(NodeKind::User, &key);
            {
                let node = self.node_mut(&user_id);
                node.set("username", account.username.clone());
                if let Some(uid) = account.uid {
                    node.set("uid", uid);
                }
            }
            self.add_edge(host_id, &user_id, EdgeType::HasAccount);

            for role in &account.roles {
                let role_key = format!("{role:?}").to_lowercase();
                let role_id = self.upsert_node(NodeKind::Role, &role_key);
                self.node_mut(&role_id).set("name", role_key);
                self.add_edge(&user_id, &role_id, EdgeType::HasRole);
            }
            for group in &account.groups {
                let group_id = self.upsert_node(NodeKind::Group, group);
                self.node_mut(&group_id).set("name", group.clone());
                self.add_edge(&user_id, &group_id, EdgeType::MemberOf);
            }
            user_ids.insert(account.username.clone(), user_id);
        }

        for session in &record.users.sessions {
            let tty = session.terminal.clone().unwrap_or_default();
            let src = session.source_host.clone().unwrap_or_default();
            let started = session.started_at.clone().unwrap_or_default();
            let session_key = format!("{host_key}:{}:{tty}:{src}:{started}", session.username);
            let session_id = self.upsert_node(NodeKind::Session, &session_key);
            {
                let node = self.node_mut(&session_id);
                node.set("username", session.username.clone());
                node.set("terminal", tty);
            }
            self.add_edge(host_id, &session_id, EdgeType::HasSession);
            if let Some(user_id) = user_ids.get(&session.username) {
                self.add_edge(&session_id, user_id, EdgeType::SessionUser);
            }
        }

        for process in &record.services.processes {
            let Some(username) = &process.user else {
                continue;
            };
            if let (Some(user_id), Some(proc_id)) = (user_ids.get(username), pid_index.get(&process.pid)) {
                self.add_edge(user_id, proc_id, EdgeType::RunsProcess);
            }
        }
    }

    /// Consumes `snapshot` and assembles the graph. Rejects a snapshot
    /// carrying an extractor schema version this builder doesn't recognize
    /// rather than guessing at its shape.
    pub fn build(mut self, snapshot: &Snapshot) -> Result<Graph, ProvenanceError> {
        let snapshot_id = self.upsert_node(NodeKind::Snapshot, &snapshot.snapshot_id.to_string());
        self.node_mut(&snapshot_id).set("collected_at", snapshot.collected_at.to_rfc3339());

        let scanner_host_id = self.get_or_create_host(
            snapshot.scanner_host.ip.as_deref(),
            Some(&snapshot.scanner_host.hostname),
        );
        self.add_edge(&snapshot_id, &scanner_host_id, EdgeType::OnHost);

        self.build_phase0(snapshot, &scanner_host_id);
        self.build_phase1(snapshot, &scanner_host_id, &snapshot.scanner_host.hostname);
        self.build_phase2(snapshot)?;

        Ok(Graph {
            nodes: self.nodes.into_iter().collect(),
            edges: self.edges,
        })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_host_is_idempotent_on_ip() {
        let mut builder = GraphBuilder::new();
        let a = builder.get_or_create_host(Some("10.0.0.5"), None);
        let b = builder.get_or_create_host(Some("10.0.0.5"), Some("box1"));
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_edges_are_suppressed() {
        let mut builder = GraphBuilder::new();
        builder.add_edge("Host:a", "Host:b", EdgeType::ConnectsTo);
        builder.add_edge("Host:a", "Host:b", EdgeType::ConnectsTo);
        assert_eq!(builder.edges.len(), 1);
    }

    #[test]
    fn normalize_family_collapses_known_aliases() {
        assert_eq!(normalize_family("python3"), "python");
        assert_eq!(normalize_family("python"), "python");
        assert_eq!(normalize_family("nodejs"), "node");
    }
}
