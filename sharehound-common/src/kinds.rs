//! Node and edge kind labels of the share graph. These names are consumed by
//! BloodHound OpenGraph and must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const NODE_KIND_NETWORK_SHARE_BASE: &str = "NetworkShareBase";
pub const NODE_KIND_NETWORK_SHARE_HOST: &str = "NetworkShareHost";
pub const NODE_KIND_NETWORK_SHARE_SMB: &str = "NetworkShareSMB";
pub const NODE_KIND_NETWORK_SHARE_DFS: &str = "NetworkShareDFS";
pub const NODE_KIND_DIRECTORY: &str = "Directory";
pub const NODE_KIND_FILE: &str = "File";

pub const EDGE_KIND_HOSTS_NETWORK_SHARE: &str = "HostsNetworkShare";
pub const EDGE_KIND_HAS_NETWORK_SHARE: &str = "HasNetworkShare";
pub const EDGE_KIND_CONTAINS: &str = "Contains";

/// Permission edge from a principal to a share, directory or file.
/// One variant per decoded access mask bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RightKind {
    CanDsCreateChild,
    CanDsDeleteChild,
    CanDsListContents,
    CanDsWriteExtendedProperties,
    CanDsReadProperty,
    CanDsWriteProperty,
    CanDsDeleteTree,
    CanDsListObject,
    CanDsControlAccess,
    CanDelete,
    CanReadControl,
    CanWriteDacl,
    CanWriteOwner,
    CanGenericAll,
    CanGenericExecute,
    CanGenericWrite,
    CanGenericRead,
}

impl RightKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CanDsCreateChild => "CanDsCreateChild",
            Self::CanDsDeleteChild => "CanDsDeleteChild",
            Self::CanDsListContents => "CanDsListContents",
            Self::CanDsWriteExtendedProperties => "CanDsWriteExtendedProperties",
            Self::CanDsReadProperty => "CanDsReadProperty",
            Self::CanDsWriteProperty => "CanDsWriteProperty",
            Self::CanDsDeleteTree => "CanDsDeleteTree",
            Self::CanDsListObject => "CanDsListObject",
            Self::CanDsControlAccess => "CanDsControlAccess",
            Self::CanDelete => "CanDelete",
            Self::CanReadControl => "CanReadControl",
            Self::CanWriteDacl => "CanWriteDacl",
            Self::CanWriteOwner => "CanWriteOwner",
            Self::CanGenericAll => "CanGenericAll",
            Self::CanGenericExecute => "CanGenericExecute",
            Self::CanGenericWrite => "CanGenericWrite",
            Self::CanGenericRead => "CanGenericRead",
        }
    }
}

impl fmt::Display for RightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
