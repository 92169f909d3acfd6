//! File graph sink: dumps the graph as `<label>_<timestamp>.json` and
//! `.yml` with identical content, matching the persisted-state convention
//! used for every other phase artifact.

use std::path::PathBuf;

use async_trait::async_trait;
use provenance_core::ProvenanceError;
use serde::Serialize;

use crate::builder::Graph;
use crate::sink::GraphSink;

#[derive(Serialize)]
struct SerializableGraph<'a> {
    nodes: Vec<&'a provenance_core::graph::GraphNode>,
    edges: Vec<SerializableEdge<'a>>,
}

#[derive(Serialize)]
struct SerializableEdge<'a> {
    src: &'a str,
    dst: &'a str,
    rel_type: &'static str,
}

pub struct FileSink {
    dir: PathBuf,
    label: String,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
        }
    }
}

#[async_trait]
impl GraphSink for FileSink {
    async fn clear(&self) -> Result<(), ProvenanceError> {
        // Nothing persists between runs in the file sink; each push starts
        // from a clean slate via its own timestamped filename.
        Ok(())
    }

    async fn push(&self, graph: &Graph) -> Result<(), ProvenanceError> {
        std::fs::create_dir_all(&self.dir)?;
        let serializable = SerializableGraph {
            nodes: graph.nodes.values().collect(),
            edges: graph
                .edges
                .iter()
                .map(|e| SerializableEdge {
                    src: &e.src,
                    dst: &e.dst,
                    rel_type: e.rel_type.as_str(),
                })
                .collect(),
        };

        let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let json_path = self.dir.join(format!("{}_{ts}.json", self.label));
        let yml_path = self.dir.join(format!("{}_{ts}.yml", self.label));

        let json = serde_json::to_string_pretty(&serializable)?;
        std::fs::write(&json_path, json)?;

        let yaml = serde_yaml::to_string(&serializable)
            .map_err(|e| ProvenanceError::SinkUnavailable(e.to_string()))?;
        std::fs::write(&yml_path, yaml)?;

        Ok(())
    }

    async fn close(&self) -> Result<(), ProvenanceError> {
        Ok(())
    }
}
