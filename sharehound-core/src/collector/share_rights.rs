use bytes::Bytes;
use sharehound_protocol_smb::{DescriptorSource, SmbConnector, SmbSession};
use tracing::{debug, enabled, warn, Level};

use crate::acl::{decode_dacl, describe_descriptor, RightsMap, SecurityDescriptor};
use crate::CollectError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShareRights {
    pub rights: RightsMap,
    /// Where the decoded descriptor came from, `None` when no tier had one
    pub source: Option<DescriptorSource>,
}

impl ShareRights {
    /// Rights come from the root folder's NTFS descriptor rather than the
    /// share's own descriptor
    pub fn is_fallback(&self) -> bool {
        self.source == Some(DescriptorSource::RootFolder)
    }
}

pub(crate) async fn log_descriptor<C: SmbConnector>(
    session: &mut SmbSession<C>,
    descriptor: &SecurityDescriptor,
) {
    if !enabled!(Level::DEBUG) {
        return;
    }
    let sids: Vec<String> = descriptor
        .owner
        .iter()
        .chain(descriptor.group.iter())
        .chain(
            descriptor
                .dacl
                .iter()
                .flat_map(|dacl| dacl.aces.iter().filter_map(|ace| ace.sid.as_ref())),
        )
        .map(ToString::to_string)
        .collect();
    session.resolve_sids(sids.iter().map(String::as_str)).await;
    debug!(
        "Security descriptor:\n{}",
        describe_descriptor(descriptor, |sid| session.sid_display_name(sid))
    );
}

/// Share permissions: share-level descriptor (NetrShareGetInfo, then the
/// registry), falling back to the root folder's NTFS descriptor. Rights
/// found through the fallback are still attributed to the share.
///
/// `enumerated` is the descriptor returned by level-502 share enumeration.
/// When present it is used as is and no further query is made.
pub async fn collect_share_rights<C: SmbConnector>(
    session: &mut SmbSession<C>,
    share: &str,
    enumerated: Option<Bytes>,
) -> Result<ShareRights, CollectError> {
    let share_level = match enumerated.filter(|sd| !sd.is_empty()) {
        Some(bytes) => Some((bytes, DescriptorSource::ShareInfo)),
        None => session
            .get_share_security_descriptor(share)
            .await
            .map(|retrieved| (retrieved.bytes, retrieved.source)),
    };
    let (bytes, source) = match share_level {
        Some(found) => found,
        None => {
            debug!(
                share,
                "Share-level security descriptor unavailable, trying root folder fallback"
            );
            match session.get_share_root_security_descriptor(share).await {
                Some(bytes) => (bytes, DescriptorSource::RootFolder),
                None => {
                    warn!(
                        host = %session.host(),
                        share,
                        "Could not retrieve a security descriptor for the share, no share rights will be created"
                    );
                    return Ok(ShareRights::default());
                }
            }
        }
    };
    debug!(share, len = bytes.len(), source = ?source, "Security descriptor retrieved");

    let descriptor = SecurityDescriptor::parse(&bytes)?;
    log_descriptor(session, &descriptor).await;

    let rights = descriptor
        .dacl
        .as_ref()
        .map(decode_dacl)
        .unwrap_or_default();
    Ok(ShareRights {
        rights,
        source: Some(source),
    })
}
