use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Edge, Node};
use crate::CollectError;

/// Destination of committed subgraphs. One call carries one commit.
#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn add_batch(&self, nodes: Vec<Node>, edges: Vec<Edge>);
}

#[derive(Default)]
struct GraphInner {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

/// In-memory OpenGraph. Nodes are unique by id, the latest write wins
/// and keeps the original position. Edges are appended as given.
pub struct OpenGraph {
    source_kind: String,
    inner: Mutex<GraphInner>,
}

#[derive(Serialize)]
struct Metadata<'a> {
    source_kind: &'a str,
}

#[derive(Serialize)]
struct GraphBody<'a> {
    nodes: &'a [Node],
    edges: &'a [Edge],
}

#[derive(Serialize)]
struct Document<'a> {
    metadata: Metadata<'a>,
    graph: GraphBody<'a>,
}

impl OpenGraph {
    pub fn new<S: Into<String>>(source_kind: S) -> Self {
        Self {
            source_kind: source_kind.into(),
            inner: Mutex::new(GraphInner::default()),
        }
    }

    pub fn source_kind(&self) -> &str {
        &self.source_kind
    }

    pub async fn node_count(&self) -> usize {
        self.inner.lock().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.inner.lock().await.edges.len()
    }

    pub async fn node(&self, id: &str) -> Option<Node> {
        let inner = self.inner.lock().await;
        inner.index.get(id).map(|i| inner.nodes[*i].clone())
    }

    pub async fn edges(&self) -> Vec<Edge> {
        self.inner.lock().await.edges.clone()
    }

    pub async fn to_json(&self) -> Result<String, CollectError> {
        let inner = self.inner.lock().await;
        let document = Document {
            metadata: Metadata {
                source_kind: &self.source_kind,
            },
            graph: GraphBody {
                nodes: &inner.nodes,
                edges: &inner.edges,
            },
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub async fn export(&self, path: &Path) -> Result<(), CollectError> {
        let json = self.to_json().await?;
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), "Graph exported");
        Ok(())
    }
}

#[async_trait]
impl GraphSink for OpenGraph {
    async fn add_batch(&self, nodes: Vec<Node>, edges: Vec<Edge>) {
        let mut inner = self.inner.lock().await;
        for node in nodes {
            match inner.index.get(&node.id).copied() {
                Some(i) => inner.nodes[i] = node,
                None => {
                    let i = inner.nodes.len();
                    inner.index.insert(node.id.clone(), i);
                    inner.nodes.push(node);
                }
            }
        }
        inner.edges.extend(edges);
    }
}
