//! The provenance graph's node/edge vocabulary and identity scheme.
//!
//! Every node carries a globally unique string identity of the form
//! `Kind:key`; host-scoped kinds fold the host identifier into the key so
//! two hosts never collide. Nodes carry only scalar attributes — strings,
//! numbers, booleans, or null — so a [`GraphSink`](crate) implementation
//! never has to flatten nested structures itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed set of node kinds in the provenance graph (§3 of the data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Snapshot,
    Host,
    Interface,
    Ip,
    Network,
    Discovery,
    Port,
    Process,
    Socket,
    User,
    Session,
    Role,
    Group,
    OsFamily,
    OsInstance,
    SoftwareFamily,
    SoftwareInstance,
    Executable,
    Metrics,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Snapshot => "Snapshot",
            NodeKind::Host => "Host",
            NodeKind::Interface => "Interface",
            NodeKind::Ip => "IP",
            NodeKind::Network => "Network",
            NodeKind::Discovery => "Discovery",
            NodeKind::Port => "Port",
            NodeKind::Process => "Process",
            NodeKind::Socket => "Socket",
            NodeKind::User => "User",
            NodeKind::Session => "Session",
            NodeKind::Role => "Role",
            NodeKind::Group => "Group",
            NodeKind::OsFamily => "OSFamily",
            NodeKind::OsInstance => "OSInstance",
            NodeKind::SoftwareFamily => "SoftwareFamily",
            NodeKind::SoftwareInstance => "SoftwareInstance",
            NodeKind::Executable => "Executable",
            NodeKind::Metrics => "Metrics",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The complete edge vocabulary (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    OnHost,
    HasInterface,
    HasIp,
    InNetwork,
    Performed,
    Discovered,
    RunsOs,
    InstanceOf,
    HasHardware,
    Runs,
    Exposes,
    BindsTo,
    BindsIp,
    UsesSocket,
    ConnectsTo,
    SpawnedBy,
    HasInstalled,
    Executes,
    PartOf,
    HasAccount,
    HasSession,
    SessionUser,
    HasRole,
    MemberOf,
    RunsProcess,
    Observed,
    HasMetrics,
}

impl EdgeType {
    /// Relationship name as used on the wire: uppercase with underscores.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::OnHost => "ON_HOST",
            EdgeType::HasInterface => "HAS_INTERFACE",
            EdgeType::HasIp => "HAS_IP",
            EdgeType::InNetwork => "IN_NETWORK",
            EdgeType::Performed => "PERFORMED",
            EdgeType::Discovered => "DISCOVERED",
            EdgeType::RunsOs => "RUNS_OS",
            EdgeType::InstanceOf => "INSTANCE_OF",
            EdgeType::HasHardware => "HAS_HARDWARE",
            EdgeType::Runs => "RUNS",
            EdgeType::Exposes => "EXPOSES",
            EdgeType::BindsTo => "BINDS_TO",
            EdgeType::BindsIp => "BINDS_IP",
            EdgeType::UsesSocket => "USES_SOCKET",
            EdgeType::ConnectsTo => "CONNECTS_TO",
            EdgeType::SpawnedBy => "SPAWNED_BY",
            EdgeType::HasInstalled => "HAS_INSTALLED",
            EdgeType::Executes => "EXECUTES",
            EdgeType::PartOf => "PART_OF",
            EdgeType::HasAccount => "HAS_ACCOUNT",
            EdgeType::HasSession => "HAS_SESSION",
            EdgeType::SessionUser => "SESSION_USER",
            EdgeType::HasRole => "HAS_ROLE",
            EdgeType::MemberOf => "MEMBER_OF",
            EdgeType::RunsProcess => "RUNS_PROCESS",
            EdgeType::Observed => "OBSERVED",
            EdgeType::HasMetrics => "HAS_METRICS",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builds the `Kind:key` identity string for a node.
pub fn identity(kind: NodeKind, key: &str) -> String {
    format!("{}:{}", kind.as_str(), key)
}

/// A scalar attribute value. Node attributes are always scalar; anything
/// else is stringified before insertion (see `GraphNode::set`).
pub type AttrValue = Value;

/// A node in the provenance graph, keyed by its stable identity string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub identity: String,
    pub kind: NodeKind,
    pub attrs: std::collections::BTreeMap<String, AttrValue>,
}

impl GraphNode {
    pub fn new(kind: NodeKind, key: &str) -> Self {
        Self {
            identity: identity(kind, key),
            kind,
            attrs: std::collections::BTreeMap::new(),
        }
    }

    /// Sets a scalar attribute. Non-scalar values (objects/arrays) are
    /// rejected by flattening them to their JSON string form, matching the
    /// sink contract that non-scalar attributes are never pushed as-is.
    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) -> &mut Self {
        let value = value.into();
        let scalar = match &value {
            Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
            other => other.clone(),
        };
        self.attrs.insert(key.to_string(), scalar);
        self
    }
}

/// A directed, typed edge between two node identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub src: String,
    pub dst: String,
    pub rel_type: EdgeType,
    pub props: std::collections::BTreeMap<String, AttrValue>,
}

impl GraphEdge {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, rel_type: EdgeType) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            rel_type,
            props: std::collections::BTreeMap::new(),
        }
    }

    /// The (src, dst, rel_type) triple that uniquely identifies this edge
    /// under invariant I2.
    pub fn dedup_key(&self) -> (String, String, EdgeType) {
        (self.src.clone(), self.dst.clone(), self.rel_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_kind_colon_key() {
        assert_eq!(identity(NodeKind::Host, "10.0.0.5"), "Host:10.0.0.5");
        assert_eq!(
            identity(NodeKind::Port, "10.0.0.5:tcp:0.0.0.0:22"),
            "Port:10.0.0.5:tcp:0.0.0.0:22"
        );
    }

    #[test]
    fn edge_type_serializes_to_screaming_snake_case() {
        assert_eq!(EdgeType::UsesSocket.as_str(), "USES_SOCKET");
        assert_eq!(EdgeType::BindsTo.as_str(), "BINDS_TO");
    }

    #[test]
    fn non_scalar_attribute_is_stringified() {
        let mut node = GraphNode::new(NodeKind::Metrics, "abc");
        node.set("edge_histogram", serde_json::json!({"RUNS": 3}));
        assert!(matches!(
            node.attrs.get("edge_histogram"),
            Some(Value::String(_))
        ));
    }
}
