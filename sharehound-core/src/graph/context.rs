use std::collections::HashSet;

use sharehound_common::kinds::{
    RightKind, EDGE_KIND_CONTAINS, EDGE_KIND_HAS_NETWORK_SHARE, EDGE_KIND_HOSTS_NETWORK_SHARE,
};
use sharehound_protocol_smb::path;
use tracing::debug;

use super::{Edge, EdgeEndpoint, GraphSink, Node};
use crate::acl::RightsMap;

#[derive(Default)]
struct Batch {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// Traversal state of one host: the host, the current share, the stack of
/// directories walked into and the element being looked at. `commit`
/// turns the current state into nodes and edges.
///
/// Each node and its structural and rights edges are emitted once. Setting
/// a different host forgets everything emitted so far, setting a different
/// share forgets the share and its entries.
#[derive(Default)]
pub struct OpenGraphContext {
    host: Option<Node>,
    share: Option<(Node, RightsMap)>,
    path: Vec<(Node, RightsMap)>,
    element: Option<(Node, RightsMap)>,
    total_edges_created: usize,
    host_emitted: bool,
    share_emitted: bool,
    /// Directory and file ids already emitted under the current share
    emitted_entries: HashSet<String>,
}

impl OpenGraphContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host(&mut self, host: Node) {
        if self.host.as_ref().map(|h| &h.id) != Some(&host.id) {
            self.forget_host();
        }
        self.host = Some(host);
    }

    pub fn host(&self) -> Option<&Node> {
        self.host.as_ref()
    }

    pub fn clear_host(&mut self) {
        self.host = None;
        self.forget_host();
    }

    fn forget_host(&mut self) {
        self.host_emitted = false;
        self.forget_share();
    }

    pub fn set_share(&mut self, share: Node, rights: RightsMap) {
        if self.share().map(|s| &s.id) != Some(&share.id) {
            self.forget_share();
        }
        self.share = Some((share, rights));
    }

    pub fn share(&self) -> Option<&Node> {
        self.share.as_ref().map(|(node, _)| node)
    }

    pub fn share_rights(&self) -> Option<&RightsMap> {
        self.share.as_ref().map(|(_, rights)| rights)
    }

    pub fn set_share_rights(&mut self, rights: RightsMap) {
        if let Some((_, current)) = &mut self.share {
            *current = rights;
        }
    }

    pub fn clear_share(&mut self) {
        self.share = None;
        self.forget_share();
    }

    fn forget_share(&mut self) {
        self.share_emitted = false;
        self.emitted_entries.clear();
    }

    pub fn push_path(&mut self, node: Node, rights: RightsMap) {
        self.path.push((node, rights));
    }

    pub fn pop_path(&mut self) -> Option<Node> {
        self.path.pop().map(|(node, _)| node)
    }

    pub fn path_depth(&self) -> usize {
        self.path.len()
    }

    /// Replaces the rights of the innermost directory
    pub fn set_directory_rights(&mut self, rights: RightsMap) {
        if let Some((_, current)) = self.path.last_mut() {
            *current = rights;
        }
    }

    pub fn clear_path(&mut self) {
        self.path.clear();
    }

    /// Share-relative path of the innermost directory
    pub fn path_from_root(&self) -> String {
        self.path
            .iter()
            .filter_map(|(node, _)| node.property_str("name"))
            .fold(String::new(), |acc, name| path::join(&acc, name))
    }

    pub fn set_element(&mut self, element: Node, rights: RightsMap) {
        self.element = Some((element, rights));
    }

    pub fn element(&self) -> Option<&Node> {
        self.element.as_ref().map(|(node, _)| node)
    }

    pub fn clear_element(&mut self) {
        self.element = None;
    }

    pub fn total_edges_created(&self) -> usize {
        self.total_edges_created
    }

    /// Emits host, share, path and element with their rights and structural
    /// edges, stopping at the first unset slot and skipping whatever an
    /// earlier commit already emitted. Returns the number of edges emitted.
    pub async fn commit(&mut self, sink: &dyn GraphSink) -> usize {
        let batch = self.build_batch();
        let count = batch.edges.len();
        if !batch.nodes.is_empty() || count > 0 {
            sink.add_batch(batch.nodes, batch.edges).await;
        }
        self.total_edges_created += count;
        count
    }

    /// Emits only the rights edges of `target`, for rights learned after
    /// the structure was committed
    pub async fn add_rights_to_graph(
        &mut self,
        sink: &dyn GraphSink,
        target: &str,
        rights: &RightsMap,
    ) -> usize {
        let mut batch = Batch::default();
        add_rights(&mut batch, target, rights);
        let count = batch.edges.len();
        if count > 0 {
            sink.add_batch(vec![], batch.edges).await;
        }
        self.total_edges_created += count;
        count
    }

    fn build_batch(&mut self) -> Batch {
        let mut batch = Batch::default();

        let Some(host) = &self.host else {
            debug!("Host is not set, nothing to commit");
            return batch;
        };
        if !self.host_emitted {
            self.host_emitted = true;
            batch.nodes.push(host.clone());
            batch.edges.push(Edge::between(
                EdgeEndpoint::name(host.id.to_uppercase()),
                EdgeEndpoint::id(host.id.as_str()),
                EDGE_KIND_HOSTS_NETWORK_SHARE,
            ));
        }

        let Some((share, share_rights)) = &self.share else {
            debug!(host = %host.id, "Share is not set, committing host only");
            return batch;
        };
        if !self.share_emitted {
            self.share_emitted = true;
            batch.nodes.push(share.clone());
            add_rights(&mut batch, &share.id, share_rights);
            batch.edges.push(Edge::new(
                host.id.as_str(),
                share.id.as_str(),
                EDGE_KIND_HAS_NETWORK_SHARE,
            ));
        }

        let mut parent = share.id.as_str();
        for (directory, rights) in &self.path {
            if self.emitted_entries.insert(directory.id.clone()) {
                batch.nodes.push(directory.clone());
                add_rights(&mut batch, &directory.id, rights);
                batch
                    .edges
                    .push(Edge::new(parent, directory.id.as_str(), EDGE_KIND_CONTAINS));
            }
            parent = directory.id.as_str();
        }

        let Some((element, rights)) = &self.element else {
            return batch;
        };
        if !self.emitted_entries.insert(element.id.clone()) {
            return batch;
        }
        batch.nodes.push(element.clone());
        add_rights(&mut batch, &element.id, rights);
        batch
            .edges
            .push(Edge::new(parent, element.id.as_str(), EDGE_KIND_CONTAINS));
        batch
    }
}

fn add_rights(batch: &mut Batch, target: &str, rights: &RightsMap) {
    let mut seen: HashSet<(&str, RightKind)> = HashSet::new();
    let before = batch.edges.len();
    for (principal, kinds) in rights {
        for kind in kinds {
            if seen.insert((principal.as_str(), *kind)) {
                batch
                    .edges
                    .push(Edge::new(principal.as_str(), target, kind.as_str()));
            }
        }
    }
    if batch.edges.len() > before {
        debug!(
            target_id = target,
            principals = rights.len(),
            edges = batch.edges.len() - before,
            "Added rights edges"
        );
    }
}

#[cfg(test)]
mod tests {
    use sharehound_protocol_smb::DirEntry;

    use super::*;
    use crate::graph::OpenGraph;

    fn dir(path: &str) -> Node {
        let entry = DirEntry {
            name: path::file_name(path).into(),
            is_directory: true,
            size: 0,
            created_at: None,
            modified_at: None,
        };
        Node::entry("fs01", "DATA", path, &entry)
    }

    fn rights(sid: &str, kinds: &[RightKind]) -> RightsMap {
        RightsMap::from([(sid.to_owned(), kinds.to_vec())])
    }

    fn share() -> Node {
        Node::new("fs01\\DATA", &["NetworkShareSMB", "NetworkShareBase"])
            .with_property("name", "DATA")
    }

    fn shape(edges: &[Edge]) -> Vec<(String, String, String)> {
        edges
            .iter()
            .map(|e| (e.start.value.clone(), e.kind.clone(), e.end.value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_commit_order() {
        let graph = OpenGraph::new("NetworkShareBase");
        let mut ctx = OpenGraphContext::new();
        ctx.set_host(Node::host("fs01"));
        ctx.set_share(share(), rights("S-1-1-0", &[RightKind::CanGenericRead]));
        ctx.push_path(dir("Finance"), RightsMap::new());
        ctx.push_path(dir("Finance\\Q1"), rights("S-1-5-11", &[RightKind::CanDelete]));
        ctx.set_element(dir("Finance\\Q1\\Old"), RightsMap::new());

        let count = ctx.commit(&graph).await;
        let edges = graph.edges().await;
        assert_eq!(count, edges.len());
        let s = |a: &str, k: &str, b: &str| (a.to_owned(), k.to_owned(), b.to_owned());
        assert_eq!(
            shape(&edges),
            vec![
                s("FS01", "HostsNetworkShare", "fs01"),
                s("S-1-1-0", "CanGenericRead", "fs01\\DATA"),
                s("fs01", "HasNetworkShare", "fs01\\DATA"),
                s("fs01\\DATA", "Contains", "\\\\fs01\\DATA\\Finance"),
                s("S-1-5-11", "CanDelete", "\\\\fs01\\DATA\\Finance\\Q1"),
                s("\\\\fs01\\DATA\\Finance", "Contains", "\\\\fs01\\DATA\\Finance\\Q1"),
                s("\\\\fs01\\DATA\\Finance\\Q1", "Contains", "\\\\fs01\\DATA\\Finance\\Q1\\Old"),
            ]
        );
        assert_eq!(edges[0].start.match_by, crate::graph::MatchBy::Name);
        assert_eq!(graph.node_count().await, 5);
        assert_eq!(ctx.path_from_root(), "Finance\\Q1");
    }

    #[tokio::test]
    async fn test_commit_stops_at_missing_share() {
        let graph = OpenGraph::new("NetworkShareBase");
        let mut ctx = OpenGraphContext::new();
        ctx.set_host(Node::host("fs01"));
        ctx.push_path(dir("Finance"), RightsMap::new());
        assert_eq!(ctx.commit(&graph).await, 1);
        assert_eq!(graph.node_count().await, 1);

        ctx.clear_host();
        assert_eq!(ctx.commit(&graph).await, 0);
        assert_eq!(ctx.total_edges_created(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rights_emitted_once() {
        let graph = OpenGraph::new("NetworkShareBase");
        let mut ctx = OpenGraphContext::new();
        ctx.set_host(Node::host("fs01"));
        ctx.set_share(
            share(),
            rights(
                "S-1-1-0",
                &[RightKind::CanReadControl, RightKind::CanReadControl, RightKind::CanDelete],
            ),
        );
        assert_eq!(ctx.commit(&graph).await, 4);
    }

    #[tokio::test]
    async fn test_commits_are_idempotent_for_nodes() {
        let graph = OpenGraph::new("NetworkShareBase");
        let mut a = OpenGraphContext::new();
        let mut b = OpenGraphContext::new();
        for ctx in [&mut a, &mut b] {
            ctx.set_host(Node::host("fs01"));
            ctx.set_share(share(), RightsMap::new());
            ctx.set_element(dir("Finance"), RightsMap::new());
            ctx.commit(&graph).await;
        }
        assert_eq!(graph.node_count().await, 3);
    }

    #[tokio::test]
    async fn test_structure_emitted_once() {
        let graph = OpenGraph::new("NetworkShareBase");
        let mut ctx = OpenGraphContext::new();
        ctx.set_host(Node::host("fs01"));
        ctx.set_share(share(), rights("S-1-1-0", &[RightKind::CanGenericRead]));
        ctx.push_path(dir("Finance"), rights("S-1-5-11", &[RightKind::CanDelete]));
        ctx.set_element(dir("Finance\\a.txt"), RightsMap::new());
        assert_eq!(ctx.commit(&graph).await, 6);

        ctx.set_element(dir("Finance\\b.txt"), RightsMap::new());
        assert_eq!(ctx.commit(&graph).await, 1);
        ctx.set_share(share(), RightsMap::new());
        assert_eq!(ctx.commit(&graph).await, 0);
        assert_eq!(graph.edge_count().await, 7);
        assert_eq!(ctx.total_edges_created(), 7);

        let other = Node::new("fs01\\HOME", &["NetworkShareSMB"]).with_property("name", "HOME");
        ctx.clear_path();
        ctx.clear_element();
        ctx.set_share(other, RightsMap::new());
        let edges_before = graph.edge_count().await;
        assert_eq!(ctx.commit(&graph).await, 1);
        let edges = graph.edges().await;
        assert_eq!(edges[edges_before].kind, "HasNetworkShare");
        assert_eq!(edges[edges_before].end.value, "fs01\\HOME");

        ctx.set_host(Node::host("fs02"));
        assert_eq!(ctx.commit(&graph).await, 2);
    }

    #[tokio::test]
    async fn test_push_pop_balance() {
        let mut ctx = OpenGraphContext::new();
        ctx.push_path(dir("A"), RightsMap::new());
        ctx.push_path(dir("A\\B"), RightsMap::new());
        ctx.set_directory_rights(rights("S-1-1-0", &[RightKind::CanDelete]));
        assert_eq!(ctx.pop_path().unwrap().id, "\\\\fs01\\DATA\\A\\B");
        assert_eq!(ctx.path_depth(), 1);
        ctx.clear_path();
        assert!(ctx.pop_path().is_none());
        assert_eq!(ctx.path_from_root(), "");
    }

    #[tokio::test]
    async fn test_add_rights_to_graph() {
        let graph = OpenGraph::new("NetworkShareBase");
        let mut ctx = OpenGraphContext::new();
        let count = ctx.add_rights_to_graph(
            &graph,
            "fs01\\DATA",
            &rights("S-1-1-0", &[RightKind::CanGenericAll, RightKind::CanGenericAll]),
        )
        .await;
        assert_eq!(count, 1);
        assert_eq!(ctx.total_edges_created(), 1);
        assert_eq!(graph.node_count().await, 0);
    }
}
