//! Neo4j graph sink: MERGE-semantic upserts keyed by `neo_id`, the node's
//! identity string. Relationship names are the edge's `rel_type` as-is
//! (already uppercase with underscores).

use async_trait::async_trait;
use neo4rs::{query, Graph as Neo4jGraph};
use provenance_core::ProvenanceError;
use serde_json::Value;

use crate::builder::Graph;
use crate::sink::GraphSink;

pub struct Neo4jSink {
    graph: Neo4jGraph,
}

impl Neo4jSink {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, ProvenanceError> {
        let graph = Neo4jGraph::new(uri, user, password)
            .await
            .map_err(|e| ProvenanceError::SinkUnavailable(e.to_string()))?;
        Ok(Self { graph })
    }

    fn props_as_map(attrs: &std::collections::BTreeMap<String, Value>) -> neo4rs::BoltMap {
        let mut builder = neo4rs::BoltMap::new();
        for (k, v) in attrs {
            let bolt_value = match v {
                Value::String(s) => neo4rs::BoltType::String(s.as_str().into()),
                Value::Number(n) if n.is_i64() => neo4rs::BoltType::Integer(n.as_i64().unwrap().into()),
                Value::Number(n) if n.is_f64() => neo4rs::BoltType::Float(neo4rs::BoltFloat::new(n.as_f64().unwrap())),
                Value::Bool(b) => neo4rs::BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
                _ => neo4rs::BoltType::String(v.to_string().into()),
            };
            builder.put(k.as_str().into(), bolt_value);
        }
        builder
    }
}

#[async_trait]
impl GraphSink for Neo4jSink {
    async fn clear(&self) -> Result<(), ProvenanceError> {
        self.graph
            .run(query("MATCH (n) DETACH DELETE n"))
            .await
            .map_err(|e| ProvenanceError::SinkUnavailable(e.to_string()))
    }

    async fn push(&self, graph: &Graph) -> Result<(), ProvenanceError> {
        for node in graph.nodes.values() {
            let label = node.kind.as_str();
            let cypher = format!(
                "MERGE (n:{label} {{neo_id: $neo_id}}) ON CREATE SET n += $props ON MATCH SET n += $props"
            );
            let props: std::collections::BTreeMap<String, Value> = node.attrs.clone();
            self.graph
                .run(
                    query(&cypher)
                        .param("neo_id", node.identity.clone())
                        .param("props", neo4rs::BoltType::Map(Self::props_as_map(&props))),
                )
                .await
                .map_err(|e| ProvenanceError::SinkUnavailable(e.to_string()))?;
        }

        for edge in &graph.edges {
            let rel = edge.rel_type.as_str();
            let cypher = format!(
                "MATCH (a {{neo_id: $src}}) MATCH (b {{neo_id: $dst}}) MERGE (a)-[r:{rel}]->(b)"
            );
            self.graph
                .run(
                    query(&cypher)
                        .param("src", edge.src.clone())
                        .param("dst", edge.dst.clone()),
                )
                .await
                .map_err(|e| ProvenanceError::SinkUnavailable(e.to_string()))?;
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), ProvenanceError> {
        Ok(())
    }
}
