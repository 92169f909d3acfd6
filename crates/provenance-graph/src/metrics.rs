//! Derived metrics computed once per snapshot and attached to the graph as
//! a single `Metrics` node (§4.9).

use std::collections::HashMap;

use provenance_core::graph::{identity, EdgeType, GraphEdge, GraphNode, NodeKind};
use uuid::Uuid;

use crate::builder::Graph;

fn shannon_entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Computes the Metrics node for `graph` and attaches it to the snapshot
/// node via `HAS_METRICS`. Returns the metrics node and its attaching edge
/// so callers can fold them into the graph.
pub fn compute(graph: &Graph, snapshot_id: Uuid) -> (GraphNode, GraphEdge) {
    let total_nodes = graph.nodes.len();
    let total_edges = graph.edges.len();

    let mut exposure_counts: HashMap<String, usize> = HashMap::new();
    for node in graph.nodes.values() {
        if node.kind == NodeKind::Port {
            if let Some(exposure) = node.attrs.get("exposure").and_then(|v| v.as_str()) {
                *exposure_counts.entry(exposure.to_string()).or_insert(0) += 1;
            }
        }
    }
    let public_ports = *exposure_counts.get("public").unwrap_or(&0);
    let local_ports = *exposure_counts.get("local").unwrap_or(&0);
    let internal_ports = *exposure_counts.get("internal").unwrap_or(&0);
    let total_ports = public_ports + local_ports + internal_ports;

    let host_count = graph.nodes.values().filter(|n| n.kind == NodeKind::Host).count();
    let process_count = graph.nodes.values().filter(|n| n.kind == NodeKind::Process).count();
    let system_processes = graph
        .nodes
        .values()
        .filter(|n| n.kind == NodeKind::Process)
        .filter(|n| n.attrs.get("process_type").and_then(|v| v.as_str()) == Some("System"))
        .count();
    let processes_without_user = graph
        .nodes
        .values()
        .filter(|n| n.kind == NodeKind::Process)
        .filter(|n| !n.attrs.contains_key("user"))
        .count();

    let ports_with_pid = graph
        .edges
        .iter()
        .filter(|e| e.rel_type == EdgeType::BindsTo)
        .count();

    let pid_coverage = if total_ports > 0 {
        ports_with_pid as f64 / total_ports as f64
    } else {
        0.0
    };
    let process_density = if host_count > 0 {
        process_count as f64 / host_count as f64
    } else {
        0.0
    };
    let public_exposure_ratio = if total_ports > 0 {
        public_ports as f64 / total_ports as f64
    } else {
        0.0
    };

    let privileged_public_listeners = graph
        .edges
        .iter()
        .filter(|e| e.rel_type == EdgeType::UsesSocket)
        .filter_map(|e| {
            let process = graph.nodes.get(&e.src)?;
            if process.kind != NodeKind::Process {
                return None;
            }
            let user = process.attrs.get("user").and_then(|v| v.as_str())?;
            if user != "root" && user != "SYSTEM" {
                return None;
            }
            let socket = graph.nodes.get(&e.dst)?;
            let port_edge = graph
                .edges
                .iter()
                .find(|pe| pe.rel_type == EdgeType::BindsTo && pe.src == socket.identity)?;
            let port = graph.nodes.get(&port_edge.dst)?;
            if port.attrs.get("exposure").and_then(|v| v.as_str()) == Some("public") {
                Some(())
            } else {
                None
            }
        })
        .count();

    let attack_surface_entropy = shannon_entropy(&[public_ports, local_ports, internal_ports]);

    let user_coverage = if process_count > 0 {
        1.0 - (processes_without_user as f64 / process_count as f64)
    } else {
        0.0
    };
    let attribution_confidence = (pid_coverage + user_coverage) / 2.0;

    let mut edge_histogram: HashMap<String, usize> = HashMap::new();
    for edge in &graph.edges {
        *edge_histogram.entry(edge.rel_type.as_str().to_string()).or_insert(0) += 1;
    }

    let mut node = GraphNode::new(NodeKind::Metrics, &snapshot_id.to_string());
    node.set("total_nodes", total_nodes as i64);
    node.set("total_edges", total_edges as i64);
    node.set("public_ports", public_ports as i64);
    node.set("local_ports", local_ports as i64);
    node.set("internal_ports", internal_ports as i64);
    node.set("process_count", process_count as i64);
    node.set("system_process_count", system_processes as i64);
    node.set("pid_coverage", pid_coverage);
    node.set("process_density", process_density);
    node.set("public_exposure_ratio", public_exposure_ratio);
    node.set("privileged_public_listeners", privileged_public_listeners as i64);
    node.set("attack_surface_entropy", attack_surface_entropy);
    node.set("attribution_confidence", attribution_confidence);
    node.set("edge_histogram", serde_json::to_value(&edge_histogram).unwrap_or_default());

    let snapshot_identity = identity(NodeKind::Snapshot, &snapshot_id.to_string());
    let edge = GraphEdge::new(snapshot_identity, node.identity.clone(), EdgeType::HasMetrics);

    (node, edge)
}
