use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sharehound_common::ShareHoundConfig;
use sharehound_protocol_smb::{SmbConnector, SmbSession, SmbTarget};
use tokio::sync::Semaphore;
use tracing::{debug, info_span, warn, Instrument};

use crate::collector::{collect_host, EntryFilter, ShareSelection, TraversalCounts};
use crate::graph::{GraphSink, OpenGraphContext};
use crate::CollectError;

/// Per-operation timeouts granted past the host budget before a host that
/// ignores cancellation is abandoned
const HARD_DEADLINE_GRACE_OPS: u32 = 2;

#[derive(Debug)]
pub struct HostOutcome {
    pub host: String,
    pub counts: TraversalCounts,
    pub edges_created: usize,
    pub error: Option<CollectError>,
}

impl HostOutcome {
    fn failed(host: String, error: CollectError) -> Self {
        Self {
            host,
            counts: TraversalCounts::default(),
            edges_created: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs one session and one graph context per host, at most
/// `scan.max_workers` hosts at a time. All hosts share the sink.
pub struct HostPool<C: SmbConnector + Clone + 'static> {
    connector: C,
    config: Arc<ShareHoundConfig>,
    sink: Arc<dyn GraphSink>,
    filter: Arc<dyn EntryFilter>,
}

struct HostJob<C: SmbConnector> {
    host: String,
    connector: C,
    config: Arc<ShareHoundConfig>,
    sink: Arc<dyn GraphSink>,
    filter: Arc<dyn EntryFilter>,
}

impl<C: SmbConnector + Clone + 'static> HostPool<C> {
    pub fn new(connector: C, config: ShareHoundConfig, sink: Arc<dyn GraphSink>) -> Self {
        let filter = Arc::new(ShareSelection::new(config.scan.clone()));
        Self {
            connector,
            config: Arc::new(config),
            sink,
            filter,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn EntryFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Collects every host and returns one outcome per host, in input order
    pub async fn run<I>(&self, hosts: I) -> Vec<HostOutcome>
    where
        I: IntoIterator<Item = String>,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.scan.max_workers.max(1)));

        let mut handles = vec![];
        for host in hosts {
            let job = HostJob {
                host: host.clone(),
                connector: self.connector.clone(),
                config: self.config.clone(),
                sink: self.sink.clone(),
                filter: self.filter.clone(),
            };
            let semaphore = semaphore.clone();
            let span = info_span!("host", host = %host);
            let handle = tokio::spawn(
                async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(error) => {
                            return HostOutcome::failed(job.host, CollectError::other(error))
                        }
                    };
                    job.run().await
                }
                .instrument(span),
            );
            handles.push((host, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(error) => HostOutcome::failed(host, CollectError::other(error)),
            });
        }
        outcomes
    }
}

impl<C: SmbConnector> HostJob<C> {
    async fn run(self) -> HostOutcome {
        let scan = &self.config.scan;
        let mut target = SmbTarget::new(self.host.as_str(), scan.port, scan.timeout);
        target.advertised_name = self.config.advertised_name.clone();

        let mut session = SmbSession::new(self.connector, target, self.config.credentials.clone())
            .with_negotiate_timeout(scan.negotiate_timeout);
        let mut ctx = OpenGraphContext::new();

        let cancel = Arc::new(AtomicBool::new(false));
        let timer = scan.host_timeout.map(|budget| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                cancel.store(true, Ordering::Relaxed);
            })
        });

        let work = async {
            if let Err(error) = session.init_session().await {
                return Err(CollectError::from(error));
            }
            collect_host(
                &mut session,
                &mut ctx,
                self.sink.as_ref(),
                self.filter.as_ref(),
                scan.depth,
                &cancel,
            )
            .await
        };

        let result = match scan.host_timeout {
            Some(budget) => {
                let deadline = budget + scan.timeout * HARD_DEADLINE_GRACE_OPS;
                match tokio::time::timeout(deadline, work).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(?deadline, "Host did not stop in time, abandoning it");
                        Err(CollectError::HostTimeout(self.host.clone()))
                    }
                }
            }
            None => work.await,
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        session.close().await;

        let (counts, mut error) = match result {
            Ok(counts) => (counts, None),
            Err(error) => {
                debug!(%error, "Host collection failed");
                (TraversalCounts::default(), Some(error))
            }
        };
        if error.is_none() && cancel.load(Ordering::Relaxed) {
            warn!("Host timeout reached, results are partial");
            error = Some(CollectError::HostTimeout(self.host.clone()));
        }

        HostOutcome {
            host: self.host,
            counts,
            edges_created: ctx.total_edges_created(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sharehound_protocol_smb::testing::MockServer;
    use sharehound_protocol_smb::SmbError;

    use super::*;
    use crate::collector::AllowAll;
    use crate::graph::OpenGraph;

    fn config() -> ShareHoundConfig {
        let mut config = ShareHoundConfig::default();
        config.scan.timeout = Duration::from_secs(5);
        config.scan.max_workers = 2;
        config
    }

    #[tokio::test]
    async fn test_collects_every_host() {
        let server = MockServer::new();
        server.add_share("DATA", 0, None);
        server.add_file("DATA", "a.txt", 1, None);
        let graph = Arc::new(OpenGraph::new("NetworkShareBase"));

        let pool = HostPool::new(server.clone(), config(), graph.clone());
        let outcomes = pool
            .run(["fs01", "fs02", "fs03"].map(String::from))
            .await;

        assert_eq!(
            outcomes.iter().map(|o| o.host.as_str()).collect::<Vec<_>>(),
            vec!["fs01", "fs02", "fs03"]
        );
        assert!(outcomes.iter().all(HostOutcome::is_success));
        assert!(outcomes.iter().all(|o| o.counts.processed_files == 1));
        assert!(graph.node("fs02\\DATA").await.is_some());
        assert!(graph.node("\\\\fs03\\DATA\\a.txt").await.is_some());
        server.with_state(|st| {
            assert_eq!(st.connections_opened, 3);
            assert_eq!(st.connections_closed, 3);
        });
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let server = MockServer::new();
        server.with_state(|st| st.unreachable = true);
        let graph = Arc::new(OpenGraph::new("NetworkShareBase"));

        let pool = HostPool::new(server.clone(), config(), graph.clone());
        let outcomes = pool.run(vec!["fs01".to_owned()]).await;

        assert!(matches!(
            outcomes[0].error,
            Some(CollectError::Smb(SmbError::Unreachable { .. }))
        ));
        assert_eq!(graph.node_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_timeout_stops_walk() {
        let server = MockServer::new();
        server.add_share("DATA", 0, None);
        for i in 0..10 {
            server.add_dir("DATA", &format!("d{i}"), None);
            server.add_file("DATA", &format!("d{i}\\f.txt"), 1, None);
        }
        server.with_state(|st| st.listing_delay = Some(Duration::from_millis(600)));

        let mut config = config();
        config.scan.host_timeout = Some(Duration::from_secs(1));
        let graph = Arc::new(OpenGraph::new("NetworkShareBase"));

        let pool = HostPool::new(server.clone(), config, graph).with_filter(Arc::new(AllowAll));
        let outcomes = pool.run(vec!["fs01".to_owned()]).await;

        let outcome = &outcomes[0];
        assert!(matches!(outcome.error, Some(CollectError::HostTimeout(_))));
        server.with_state(|st| {
            assert_eq!(st.connections_opened, st.connections_closed);
            assert!(st.list_calls.len() < 11);
        });
    }
}
