use sharehound_protocol_smb::{DirEntry, SmbConnector, SmbSession};

use super::share_rights::log_descriptor;
use crate::acl::{decode_dacl, RightsMap, SecurityDescriptor};
use crate::CollectError;

/// NTFS rights of one entry in directory `dir` of the current share.
/// A descriptor that cannot be retrieved yields no rights, a corrupt one
/// is an error.
pub async fn collect_entry_rights<C: SmbConnector>(
    session: &mut SmbSession<C>,
    dir: &str,
    entry: &DirEntry,
) -> Result<RightsMap, CollectError> {
    let Some(bytes) = session.get_entry_security_descriptor(dir, entry).await else {
        return Ok(RightsMap::new());
    };
    let descriptor = SecurityDescriptor::parse(&bytes)?;
    log_descriptor(session, &descriptor).await;
    Ok(descriptor
        .dacl
        .as_ref()
        .map(decode_dacl)
        .unwrap_or_default())
}
