use std::time::Duration;

use bytes::Bytes;
use tracing::*;

use crate::session::bounded;
use crate::{
    path, CreateRequest, DirEntry, RegistryKey, RpcHandle, RpcPipe, SecurityQuery, SmbConnection,
    SmbConnector, SmbError, SmbSession, TreeId,
};

const SHARES_SECURITY_KEY: &str = r"SYSTEM\CurrentControlSet\Services\LanmanServer\Shares\Security";
const DEFAULT_SECURITY_KEY: &str = r"SYSTEM\CurrentControlSet\Services\LanmanServer\DefaultSecurity";

const ADMIN_SHARES: [&str; 4] = ["ADMIN$", "C$", "IPC$", "PRINT$"];

/// Where a share-level descriptor came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    /// NetrShareGetInfo at level 502
    ShareInfo,
    /// Binary value under the LanmanServer registry keys
    Registry { key: &'static str, value: String },
    /// NTFS descriptor of the share's root folder
    RootFolder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedDescriptor {
    pub bytes: Bytes,
    pub source: DescriptorSource,
}

/// Registry values holding a share's descriptor, most specific first
fn registry_lookups(share: &str) -> Vec<(&'static str, String)> {
    let mut lookups = vec![(SHARES_SECURITY_KEY, share.to_owned())];
    if ADMIN_SHARES.contains(&share.to_uppercase().as_str()) {
        lookups.push((DEFAULT_SECURITY_KEY, "SrvsvcShareAdminConnect".to_owned()));
    }
    lookups.push((DEFAULT_SECURITY_KEY, "SrvsvcDefaultShareInfo".to_owned()));
    lookups
}

/// Opens `path` for reading its security, queries owner, group and DACL,
/// and closes the handle whatever the query returned
async fn query_descriptor<T: SmbConnection>(
    conn: &mut T,
    tree: TreeId,
    path: &str,
    directory: bool,
    timeout: Duration,
) -> Result<Bytes, SmbError> {
    let file = bounded(
        timeout,
        "create",
        conn.create(tree, path, CreateRequest::read_security(directory)),
    )
    .await?;
    let result = bounded(
        timeout,
        "query info",
        conn.query_security_info(tree, file, SecurityQuery::default()),
    )
    .await;
    if let Err(error) = bounded(timeout, "close", conn.close(tree, file)).await {
        debug!(%error, path, "Failed to close file handle");
    }
    result
}

async fn close_key<T: SmbConnection>(
    conn: &mut T,
    winreg: RpcHandle,
    key: RegistryKey,
    timeout: Duration,
) {
    if let Err(error) = bounded(timeout, "close key", conn.reg_close_key(winreg, key)).await {
        debug!(%error, "Failed to close registry key");
    }
}

async fn query_binary_value<T: SmbConnection>(
    conn: &mut T,
    winreg: RpcHandle,
    hklm: RegistryKey,
    key: &str,
    value: &str,
    timeout: Duration,
) -> Option<Bytes> {
    let subkey = match bounded(timeout, "open key", conn.reg_open_key(winreg, hklm, key)).await {
        Ok(subkey) => subkey,
        Err(error) => {
            debug!("Registry query failed for {key}\\{value}: {error}");
            return None;
        }
    };
    let data = bounded(
        timeout,
        "query value",
        conn.reg_query_value(winreg, subkey, value),
    )
    .await;
    close_key(conn, winreg, subkey, timeout).await;

    match data {
        Ok(Some(bytes)) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(error) => {
            debug!("Registry query failed for {key}\\{value}: {error}");
            None
        }
    }
}

async fn lookup_registry<T: SmbConnection>(
    conn: &mut T,
    winreg: RpcHandle,
    share: &str,
    timeout: Duration,
) -> Option<RetrievedDescriptor> {
    let hklm = match bounded(timeout, "OpenLocalMachine", conn.reg_open_local_machine(winreg)).await
    {
        Ok(hklm) => hklm,
        Err(error) => {
            debug!(%error, "Could not open HKLM");
            return None;
        }
    };

    let mut found = None;
    for (key, value) in registry_lookups(share) {
        if let Some(bytes) = query_binary_value(conn, winreg, hklm, key, &value, timeout).await {
            found = Some(RetrievedDescriptor {
                bytes,
                source: DescriptorSource::Registry { key, value },
            });
            break;
        }
    }
    close_key(conn, winreg, hklm, timeout).await;
    found
}

impl<C: SmbConnector> SmbSession<C> {
    /// Share-level descriptor: NetrShareGetInfo first, then the remote
    /// registry. `None` when neither has one.
    pub async fn get_share_security_descriptor(
        &mut self,
        share: &str,
    ) -> Option<RetrievedDescriptor> {
        let share = share.trim_end_matches('\0');
        if let Some(bytes) = self.share_info_descriptor(share).await {
            return Some(RetrievedDescriptor {
                bytes,
                source: DescriptorSource::ShareInfo,
            });
        }
        self.registry_descriptor(share).await
    }

    async fn share_info_descriptor(&mut self, share: &str) -> Option<Bytes> {
        let timeout = self.target.timeout;
        let Some(srvsvc) = self.srvsvc else {
            debug!("srvsvc is not bound, skipping NetrShareGetInfo");
            return None;
        };
        let conn = self.conn.as_mut()?;
        match bounded(
            timeout,
            "NetrShareGetInfo",
            conn.netr_share_get_info(srvsvc, share),
        )
        .await
        {
            Ok(entry) => entry.security_descriptor.filter(|sd| !sd.is_empty()),
            Err(error) => {
                debug!(%error, share, "NetrShareGetInfo failed");
                None
            }
        }
    }

    async fn registry_descriptor(&mut self, share: &str) -> Option<RetrievedDescriptor> {
        let timeout = self.target.timeout;
        let conn = self.conn.as_mut()?;
        let winreg = match bounded(timeout, "winreg bind", conn.rpc_bind(RpcPipe::Winreg)).await {
            Ok(winreg) => winreg,
            Err(error) => {
                debug!(%error, "Could not bind to winreg");
                return None;
            }
        };

        let result = lookup_registry(conn, winreg, share, timeout).await;

        if let Err(error) = bounded(timeout, "winreg unbind", conn.rpc_unbind(winreg)).await {
            debug!(%error, "Failed to release winreg binding");
        }
        result
    }

    /// NTFS descriptor of the share's root folder. The share is attached
    /// temporarily and the previous attachment is restored on every path.
    pub async fn get_share_root_security_descriptor(&mut self, share: &str) -> Option<Bytes> {
        let timeout = self.target.timeout;
        let conn = self.conn.as_mut()?;

        let tree = match bounded(timeout, "tree connect", conn.tree_connect(share)).await {
            Ok(tree) => tree,
            Err(error) => {
                debug!("Could not connect to share '{share}' for root SD: {error}");
                return None;
            }
        };
        let saved_tree = self.tree.replace(tree);

        let result = query_descriptor(conn, tree, "", true, timeout).await;

        if let Err(error) = bounded(timeout, "tree disconnect", conn.tree_disconnect(tree)).await {
            debug!(%error, "Failed to disconnect temporary tree");
        }
        self.tree = saved_tree;

        match result {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(error) => {
                debug!("Could not get root folder security descriptor for share '{share}': {error}");
                None
            }
        }
    }

    /// Descriptor of one file or directory under the current share.
    /// Any failure yields `None`.
    pub async fn get_entry_security_descriptor(
        &mut self,
        path: &str,
        entry: &DirEntry,
    ) -> Option<Bytes> {
        let timeout = self.target.timeout;
        let Some(tree) = self.tree else {
            debug!("SMB tree ID is not set, please set it first.");
            return None;
        };
        let conn = self.conn.as_mut()?;
        let full_path = path::join(&path::normalize(path), &entry.name);

        match query_descriptor(conn, tree, &full_path, entry.is_directory, timeout).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(error) => {
                let kind = if entry.is_directory { "directory" } else { "file" };
                debug!("Could not get attributes for {kind} '{full_path}': {error}");
                None
            }
        }
    }
}
