//! CLI entry point for the provenance-discover scanner: a single-shot run
//! of the full four-phase pipeline, ending in an optional Neo4j push.

use clap::Parser;
use provenance_core::config::ScannerConfig;
use provenance_discover::phase2::Credentials;
use provenance_discover::{formatter, interface_selector, persist, phase0, phase1, phase2, topology};
use provenance_graph::file_sink::FileSink;
use provenance_graph::neo4j_sink::Neo4jSink;
use provenance_graph::{GraphBuilder, GraphSink};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "provenance-discover")]
#[command(about = "Discovers the local network topology and pushes a provenance graph")]
struct Cli {
    /// Override the configured persisted-state directory.
    #[arg(long)]
    data_dir: Option<String>,

    /// Skip the Neo4j push step even if credentials are configured.
    #[arg(long)]
    no_push: bool,
}

/// `NEO4J_URI`/`NEO4J_USER`/`NEO4J_PASSWORD` are the literal env vars this
/// scanner documents; they take precedence over the `PROVENANCE__NEO4J__*`
/// layered form the `config` crate source reads.
fn apply_raw_neo4j_env(mut cfg: ScannerConfig) -> ScannerConfig {
    if let Ok(uri) = std::env::var("NEO4J_URI") {
        cfg.neo4j.uri = Some(uri);
    }
    if let Ok(user) = std::env::var("NEO4J_USER") {
        cfg.neo4j.user = Some(user);
    }
    if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
        cfg.neo4j.password = Some(password);
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let cfg = apply_raw_neo4j_env(ScannerConfig::load()?);
    let data_dir = PathBuf::from(cli.data_dir.unwrap_or_else(|| cfg.discovery.data_dir.clone()));

    tracing::info!("running phase 0: self-discovery");
    let scanner_host = phase0::discover();
    persist::write(&data_dir, "phase0", &scanner_host)?;

    let selected = interface_selector::select(
        &scanner_host.interfaces,
        &scanner_host.arp_cache,
        scanner_host.gateway.as_deref(),
        !scanner_host.dns.is_empty(),
    );
    let best = selected
        .first()
        .ok_or_else(|| anyhow::anyhow!("no suitable interface found for active probing"))?;
    tracing::info!(interface = %best.name, ip = %best.ip, score = best.score, "interface selected");

    tracing::info!("running phase 1: local network discovery");
    let gateway = scanner_host.gateway.as_deref().and_then(|g| g.parse().ok());
    let phase1_result = phase1::discover(best, &cfg.discovery, gateway).await;
    let mut local_network_discovery = BTreeMap::new();
    local_network_discovery.insert(best.name.clone(), phase1_result.clone());
    persist::write(&data_dir, "phase1", &local_network_discovery)?;

    tracing::info!(hosts = phase1_result.discovered_hosts.len(), "phase 1 complete");

    tracing::info!("running phase 2: remote extraction");
    let mut phase1_by_interface = BTreeMap::new();
    phase1_by_interface.insert(best.name.clone(), (best.clone(), phase1_result));
    let local_ips: Vec<String> = vec![best.ip.clone()];
    let creds = Credentials::from_env();
    let phase2_records = phase2::run(
        &phase1_by_interface,
        &local_ips,
        &scanner_host.hostname,
        &data_dir,
        &cfg.phase2,
        &creds,
    )
    .await;
    persist::write(&data_dir, "phase2_distributed", &phase2_records)?;

    let snapshot = formatter::format(scanner_host, local_network_discovery, phase2_records);

    tracing::info!("running phase 3: system construction");
    let system_model = topology::build(&snapshot);
    persist::write(&data_dir, "system_construction", &system_model)?;

    tracing::info!("building graph");
    let mut graph = GraphBuilder::new().build(&snapshot)?;
    let (metrics_node, metrics_edge) = provenance_graph::metrics::compute(&graph, snapshot.snapshot_id);
    graph.nodes.insert(metrics_node.identity.clone(), metrics_node);
    graph.edges.push(metrics_edge);

    tracing::info!(nodes = graph.nodes.len(), edges = graph.edges.len(), "graph built");

    let file_sink = FileSink::new(data_dir.clone(), "graph");
    file_sink.push(&graph).await?;

    if !cli.no_push && cfg.neo4j.is_enabled() {
        let uri = cfg.neo4j.uri.as_deref().unwrap();
        let user = cfg.neo4j.user.as_deref().unwrap();
        let password = cfg.neo4j.password.as_deref().unwrap();
        tracing::info!("pushing graph to neo4j");
        let sink = Neo4jSink::connect(uri, user, password).await?;
        sink.push(&graph).await?;
        sink.close().await?;
    } else {
        tracing::info!("neo4j credentials not configured, skipping push");
    }

    Ok(())
}
