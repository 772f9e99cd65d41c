use sharehound_common::ScanConfig;
use sharehound_protocol_smb::{DirEntry, ShareInfo};

/// Decides what the share walk visits and what it commits to the graph.
/// `path` is the share-relative path of the entry, `depth` the nesting
/// level of its parent directory (0 for the share root).
pub trait EntryFilter: Send + Sync {
    fn can_process_share(&self, _share: &ShareInfo) -> bool {
        true
    }

    fn can_explore(&self, _path: &str, _dir: &DirEntry, _depth: usize) -> bool {
        true
    }

    fn can_process(&self, _path: &str, _entry: &DirEntry, _depth: usize) -> bool {
        true
    }
}

pub struct AllowAll;

impl EntryFilter for AllowAll {}

/// Share selection from the scan configuration
pub struct ShareSelection {
    scan: ScanConfig,
}

impl ShareSelection {
    pub fn new(scan: ScanConfig) -> Self {
        Self { scan }
    }
}

impl EntryFilter for ShareSelection {
    fn can_process_share(&self, share: &ShareInfo) -> bool {
        !share.is_ipc() && self.scan.is_share_selected(&share.name)
    }
}
