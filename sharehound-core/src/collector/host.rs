use std::sync::atomic::{AtomicBool, Ordering};

use sharehound_protocol_smb::{SmbConnector, SmbSession};
use tracing::{debug, info};

use super::{collect_contents_in_share, collect_share_rights, EntryFilter, TraversalCounts};
use crate::graph::{GraphSink, Node, OpenGraphContext};
use crate::CollectError;

/// Collects one authenticated host: host node, then for every accepted
/// share its rights, its node and its contents. A corrupt descriptor
/// aborts the host.
pub async fn collect_host<C: SmbConnector>(
    session: &mut SmbSession<C>,
    ctx: &mut OpenGraphContext,
    sink: &dyn GraphSink,
    filter: &dyn EntryFilter,
    max_depth: usize,
    cancel: &AtomicBool,
) -> Result<TraversalCounts, CollectError> {
    let host = session.host().to_owned();
    ctx.set_host(Node::host(&host));

    let shares = session.list_shares().await?;
    debug!(host = %host, count = shares.len(), "Enumerated shares");

    let mut counts = TraversalCounts::default();
    for share in shares.values() {
        if cancel.load(Ordering::Relaxed) {
            debug!(host = %host, "Host timeout reached, skipping remaining shares");
            break;
        }
        if !filter.can_process_share(share) {
            debug!(host = %host, share = %share.name, "Skipping share");
            counts.skipped_shares += 1;
            continue;
        }
        counts.total_shares += 1;

        let rights =
            collect_share_rights(session, &share.name, share.security_descriptor.clone()).await?;
        if rights.is_fallback() {
            debug!(share = %share.name, "Share rights taken from the root folder");
        }

        ctx.set_share(Node::share(&host, share), rights.rights);
        ctx.commit(sink).await;
        counts.processed_shares += 1;

        if share.is_disk() {
            counts +=
                collect_contents_in_share(session, ctx, sink, filter, max_depth, cancel).await?;
        }

        ctx.clear_element();
        ctx.clear_path();
        ctx.clear_share();
    }
    session.clear_share().await;

    info!(
        host = %host,
        shares = counts.processed_shares,
        directories = counts.processed_directories,
        files = counts.processed_files,
        edges = ctx.total_edges_created(),
        "Host collected"
    );
    Ok(counts)
}
