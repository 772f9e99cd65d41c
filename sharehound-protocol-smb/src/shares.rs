use bytes::Bytes;

pub const STYPE_DISKTREE: u32 = 0x0;
pub const STYPE_PRINTQ: u32 = 0x1;
pub const STYPE_DEVICE: u32 = 0x2;
pub const STYPE_IPC: u32 = 0x3;
pub const STYPE_TEMPORARY: u32 = 0x4000_0000;
pub const STYPE_SPECIAL: u32 = 0x8000_0000;

const STYPE_BASE_MASK: u32 = 0b11;

/// Names of the share type flags present in `value`: the base type from
/// the low two bits followed by the modifier bits.
pub fn stype_mask(value: u32) -> Vec<&'static str> {
    let mut flags = vec![match value & STYPE_BASE_MASK {
        STYPE_DISKTREE => "STYPE_DISKTREE",
        STYPE_PRINTQ => "STYPE_PRINTQ",
        STYPE_DEVICE => "STYPE_DEVICE",
        _ => "STYPE_IPC",
    }];
    if value & STYPE_SPECIAL == STYPE_SPECIAL {
        flags.push("STYPE_SPECIAL");
    }
    if value & STYPE_TEMPORARY == STYPE_TEMPORARY {
        flags.push("STYPE_TEMPORARY");
    }
    flags
}

/// Share as reported by the server (SHARE_INFO_1 or SHARE_INFO_502)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareEntry {
    pub name: String,
    pub share_type: u32,
    pub remark: String,
    pub security_descriptor: Option<Bytes>,
    pub dfs_root: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInfo {
    /// Name as advertised by the server, case preserved
    pub name: String,
    pub types: Vec<&'static str>,
    pub raw_type: u32,
    pub comment: String,
    pub security_descriptor: Option<Bytes>,
    pub is_dfs: bool,
}

impl ShareInfo {
    pub fn is_disk(&self) -> bool {
        self.raw_type & STYPE_BASE_MASK == STYPE_DISKTREE
    }

    pub fn is_ipc(&self) -> bool {
        self.raw_type & STYPE_BASE_MASK == STYPE_IPC
    }

    pub fn is_special(&self) -> bool {
        self.raw_type & STYPE_SPECIAL == STYPE_SPECIAL
    }
}

impl From<ShareEntry> for ShareInfo {
    fn from(entry: ShareEntry) -> Self {
        let trim = |s: String| s.trim_end_matches('\0').to_owned();
        Self {
            name: trim(entry.name),
            types: stype_mask(entry.share_type),
            raw_type: entry.share_type,
            comment: trim(entry.remark),
            security_descriptor: entry.security_descriptor.filter(|sd| !sd.is_empty()),
            is_dfs: entry.dfs_root,
        }
    }
}
