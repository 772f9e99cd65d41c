use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use sharehound_protocol_smb::{path, SmbConnector, SmbSession};
use tracing::debug;

use super::{collect_entry_rights, EntryFilter};
use crate::graph::{GraphSink, Node, OpenGraphContext};
use crate::CollectError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalCounts {
    pub total_shares: usize,
    pub processed_shares: usize,
    pub skipped_shares: usize,
    pub total_directories: usize,
    pub processed_directories: usize,
    pub skipped_directories: usize,
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
}

impl AddAssign for TraversalCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.total_shares += rhs.total_shares;
        self.processed_shares += rhs.processed_shares;
        self.skipped_shares += rhs.skipped_shares;
        self.total_directories += rhs.total_directories;
        self.processed_directories += rhs.processed_directories;
        self.skipped_directories += rhs.skipped_directories;
        self.total_files += rhs.total_files;
        self.processed_files += rhs.processed_files;
        self.skipped_files += rhs.skipped_files;
    }
}

struct ShareWalk<'a, C: SmbConnector> {
    session: &'a mut SmbSession<C>,
    ctx: &'a mut OpenGraphContext,
    sink: &'a dyn GraphSink,
    filter: &'a dyn EntryFilter,
    host: String,
    share: String,
    max_depth: usize,
    cancel: &'a AtomicBool,
}

impl<C: SmbConnector> ShareWalk<'_, C> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Lists the directory at the top of the context's path stack, commits
    /// its entries, then descends into each accepted subdirectory
    fn walk(&mut self, depth: usize) -> BoxFuture<'_, Result<TraversalCounts, CollectError>> {
        Box::pin(async move {
            let mut counts = TraversalCounts::default();
            if self.cancelled() {
                debug!("Host timeout reached, stopping traversal");
                return Ok(counts);
            }
            if self.max_depth > 0 && depth >= self.max_depth {
                return Ok(counts);
            }

            let dir = self.ctx.path_from_root();
            let entries = match self.session.list_contents(&format!("\\{dir}")).await {
                Ok(entries) => entries,
                Err(error) => {
                    debug!(%error, share = %self.share, dir = %dir, "Could not list directory");
                    return Ok(counts);
                }
            };

            let mut subdirectories = vec![];
            for entry in entries {
                if self.cancelled() {
                    debug!("Host timeout reached, stopping enumeration");
                    break;
                }
                let entry_path = path::join(&dir, &entry.name);

                if entry.is_directory {
                    if !self.filter.can_explore(&entry_path, &entry, depth) {
                        counts.skipped_directories += 1;
                        continue;
                    }
                    counts.total_directories += 1;
                    let rights = collect_entry_rights(&mut *self.session, &dir, &entry).await?;
                    let node = Node::entry(&self.host, &self.share, &entry_path, &entry);
                    if self.filter.can_process(&entry_path, &entry, depth) {
                        self.ctx.set_element(node.clone(), rights.clone());
                        self.ctx.commit(self.sink).await;
                        self.ctx.clear_element();
                        counts.processed_directories += 1;
                    }
                    subdirectories.push((node, rights));
                } else {
                    if !self.filter.can_process(&entry_path, &entry, depth) {
                        counts.skipped_files += 1;
                        continue;
                    }
                    counts.total_files += 1;
                    let rights = collect_entry_rights(&mut *self.session, &dir, &entry).await?;
                    let node = Node::entry(&self.host, &self.share, &entry_path, &entry);
                    self.ctx.set_element(node, rights);
                    self.ctx.commit(self.sink).await;
                    self.ctx.clear_element();
                    counts.processed_files += 1;
                }
            }

            for (node, rights) in subdirectories {
                if self.cancelled() {
                    debug!("Host timeout reached, skipping remaining directories");
                    break;
                }
                self.ctx.push_path(node, rights);
                let nested = self.walk(depth + 1).await;
                self.ctx.pop_path();
                counts += nested?;
            }
            Ok(counts)
        })
    }
}

/// Walks one share depth-first from its root. The context must hold the
/// host and share nodes. `max_depth` 0 means unlimited. Only a corrupt
/// descriptor aborts the walk.
pub async fn collect_contents_in_share<C: SmbConnector>(
    session: &mut SmbSession<C>,
    ctx: &mut OpenGraphContext,
    sink: &dyn GraphSink,
    filter: &dyn EntryFilter,
    max_depth: usize,
    cancel: &AtomicBool,
) -> Result<TraversalCounts, CollectError> {
    let Some(share) = ctx
        .share()
        .and_then(|node| node.property_str("name"))
        .map(str::to_owned)
    else {
        debug!("Share is not set in the graph context");
        return Ok(TraversalCounts::default());
    };

    if let Err(error) = session.set_share(&share).await {
        debug!(%error, "Error setting share");
        return Ok(TraversalCounts::default());
    }

    let host = session.host().to_owned();
    let path_depth = ctx.path_depth();
    let mut walk = ShareWalk {
        session,
        ctx,
        sink,
        filter,
        host,
        share,
        max_depth,
        cancel,
    };
    walk.walk(path_depth).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sharehound_common::kinds::RightKind;
    use sharehound_common::Credentials;
    use sharehound_protocol_smb::testing::MockServer;
    use sharehound_protocol_smb::{DirEntry, SmbTarget};

    use super::*;
    use crate::acl::{Ace, Acl, RightsMap, SecurityDescriptor};
    use crate::collector::AllowAll;
    use crate::graph::OpenGraph;

    fn descriptor(sid: &str, mask: u32) -> Vec<u8> {
        SecurityDescriptor::new(None, None, Some(Acl::new(vec![Ace::allowed(sid.parse().unwrap(), mask)])))
            .to_bytes()
    }

    fn server() -> MockServer {
        let server = MockServer::new();
        server.add_share("DATA", 0, None);
        server.add_dir("DATA", "Finance", Some(&descriptor("S-1-5-11", 0x8000_0000)));
        server.add_file("DATA", "Finance\\budget.xlsx", 1024, Some(&descriptor("S-1-1-0", 0x0001_0000)));
        server.add_dir("DATA", "Finance\\Archive", None);
        server.add_file("DATA", "Finance\\Archive\\2019.pdf", 10, None);
        server.add_file("DATA", "readme.txt", 5, None);
        server
    }

    async fn setup(server: &MockServer) -> (SmbSession<MockServer>, OpenGraphContext) {
        let mut session = SmbSession::new(
            server.clone(),
            SmbTarget::new("fs01", 445, Duration::from_secs(2)),
            Credentials::new("CORP", "alice").with_password("pw"),
        );
        session.init_session().await.unwrap();
        let mut ctx = OpenGraphContext::new();
        ctx.set_host(Node::host("fs01"));
        ctx.set_share(
            Node::new("fs01\\DATA", &["NetworkShareSMB"]).with_property("name", "DATA"),
            RightsMap::new(),
        );
        (session, ctx)
    }

    #[tokio::test]
    async fn test_walk_whole_share() {
        let server = server();
        let (mut session, mut ctx) = setup(&server).await;
        let graph = OpenGraph::new("NetworkShareBase");
        let cancel = AtomicBool::new(false);

        let counts =
            collect_contents_in_share(&mut session, &mut ctx, &graph, &AllowAll, 0, &cancel)
                .await
                .unwrap();
        assert_eq!(counts.processed_directories, 2);
        assert_eq!(counts.processed_files, 3);
        assert_eq!(ctx.path_depth(), 0);

        let budget = graph
            .node("\\\\fs01\\DATA\\Finance\\budget.xlsx")
            .await
            .unwrap();
        assert_eq!(budget.property_str("extension"), Some("xlsx"));
        assert!(graph.node("\\\\fs01\\DATA\\Finance\\Archive\\2019.pdf").await.is_some());

        let edges = graph.edges().await;
        let has = |start: &str, kind: &str, end: &str| {
            edges
                .iter()
                .any(|e| e.start.value == start && e.kind == kind && e.end.value == end)
        };
        assert!(has("S-1-5-11", RightKind::CanGenericRead.as_str(), "\\\\fs01\\DATA\\Finance"));
        assert!(has("S-1-1-0", "CanDelete", "\\\\fs01\\DATA\\Finance\\budget.xlsx"));
        assert!(has(
            "\\\\fs01\\DATA\\Finance\\Archive",
            "Contains",
            "\\\\fs01\\DATA\\Finance\\Archive\\2019.pdf"
        ));
        assert_eq!(server.with_state(|st| st.open_files), 0);
    }

    #[tokio::test]
    async fn test_walk_emits_each_edge_once() {
        let server = server();
        let (mut session, mut ctx) = setup(&server).await;
        let graph = OpenGraph::new("NetworkShareBase");
        let cancel = AtomicBool::new(false);

        collect_contents_in_share(&mut session, &mut ctx, &graph, &AllowAll, 0, &cancel)
            .await
            .unwrap();

        let edges = graph.edges().await;
        let distinct: std::collections::HashSet<_> = edges
            .iter()
            .map(|e| (e.start.value.clone(), e.kind.clone(), e.end.value.clone()))
            .collect();
        // host bridge, share, 5 Contains, 2 rights
        assert_eq!(edges.len(), 9);
        assert_eq!(distinct.len(), edges.len());
        assert_eq!(ctx.total_edges_created(), 9);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let server = server();
        let (mut session, mut ctx) = setup(&server).await;
        let graph = OpenGraph::new("NetworkShareBase");
        let cancel = AtomicBool::new(false);

        let counts =
            collect_contents_in_share(&mut session, &mut ctx, &graph, &AllowAll, 1, &cancel)
                .await
                .unwrap();
        assert_eq!(counts.processed_directories, 1);
        assert_eq!(counts.processed_files, 1);
        assert!(graph.node("\\\\fs01\\DATA\\Finance\\budget.xlsx").await.is_none());
    }

    struct NoArchives;

    impl EntryFilter for NoArchives {
        fn can_explore(&self, _path: &str, dir: &DirEntry, _depth: usize) -> bool {
            dir.name != "Archive"
        }

        fn can_process(&self, _path: &str, entry: &DirEntry, _depth: usize) -> bool {
            entry.extension() != Some("txt")
        }
    }

    #[tokio::test]
    async fn test_filter() {
        let server = server();
        let (mut session, mut ctx) = setup(&server).await;
        let graph = OpenGraph::new("NetworkShareBase");
        let cancel = AtomicBool::new(false);

        let counts =
            collect_contents_in_share(&mut session, &mut ctx, &graph, &NoArchives, 0, &cancel)
                .await
                .unwrap();
        assert_eq!(counts.skipped_directories, 1);
        assert_eq!(counts.skipped_files, 1);
        assert_eq!(counts.processed_files, 1);
        assert!(graph.node("\\\\fs01\\DATA\\Finance\\Archive").await.is_none());
        assert!(server
            .with_state(|st| st.list_calls.iter().all(|c| !c.contains("Archive"))));
    }

    #[tokio::test]
    async fn test_cancelled_walk_does_nothing() {
        let server = server();
        let (mut session, mut ctx) = setup(&server).await;
        let graph = OpenGraph::new("NetworkShareBase");
        let cancel = AtomicBool::new(true);

        let counts =
            collect_contents_in_share(&mut session, &mut ctx, &graph, &AllowAll, 0, &cancel)
                .await
                .unwrap();
        assert_eq!(counts, TraversalCounts::default());
        assert_eq!(graph.node_count().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_descriptor_aborts() {
        let server = server();
        server.add_file("DATA", "Finance\\broken.bin", 1, Some(&[1, 0, 4, 0x80]));
        let (mut session, mut ctx) = setup(&server).await;
        let graph = OpenGraph::new("NetworkShareBase");
        let cancel = AtomicBool::new(false);

        let result =
            collect_contents_in_share(&mut session, &mut ctx, &graph, &AllowAll, 0, &cancel).await;
        assert!(matches!(result, Err(CollectError::CorruptDescriptor(_))));
        assert_eq!(ctx.path_depth(), 0);
    }

    #[tokio::test]
    async fn test_unknown_share() {
        let server = server();
        let (mut session, mut ctx) = setup(&server).await;
        ctx.set_share(
            Node::new("fs01\\NOPE", &["NetworkShareSMB"]).with_property("name", "NOPE"),
            RightsMap::new(),
        );
        let graph = OpenGraph::new("NetworkShareBase");
        let cancel = AtomicBool::new(false);

        let counts =
            collect_contents_in_share(&mut session, &mut ctx, &graph, &AllowAll, 0, &cancel)
                .await
                .unwrap();
        assert_eq!(counts, TraversalCounts::default());
    }
}
