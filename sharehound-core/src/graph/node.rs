use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sharehound_common::kinds::{
    NODE_KIND_DIRECTORY, NODE_KIND_FILE, NODE_KIND_NETWORK_SHARE_BASE,
    NODE_KIND_NETWORK_SHARE_DFS, NODE_KIND_NETWORK_SHARE_HOST, NODE_KIND_NETWORK_SHARE_SMB,
};
use sharehound_protocol_smb::{path, DirEntry, ShareInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareFlavour {
    Smb,
    Dfs,
}

impl ShareFlavour {
    pub fn of(share: &ShareInfo) -> Self {
        if share.is_dfs {
            Self::Dfs
        } else {
            Self::Smb
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Smb => NODE_KIND_NETWORK_SHARE_SMB,
            Self::Dfs => NODE_KIND_NETWORK_SHARE_DFS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kinds: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Node {
    pub fn new<S: Into<String>>(id: S, kinds: &[&str]) -> Self {
        Self {
            id: id.into(),
            kinds: kinds.iter().map(|k| (*k).to_owned()).collect(),
            properties: Map::new(),
        }
    }

    pub fn with_property<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }

    pub fn host(host: &str) -> Self {
        Self::new(host, &[NODE_KIND_NETWORK_SHARE_HOST]).with_property("name", host)
    }

    pub fn share(host: &str, share: &ShareInfo) -> Self {
        let flavour = ShareFlavour::of(share);
        Self::new(
            share_id(host, &share.name),
            &[flavour.kind(), NODE_KIND_NETWORK_SHARE_BASE],
        )
        .with_property("name", share.name.as_str())
        .with_property("displayName", share.name.as_str())
        .with_property("type", share.types.clone())
        .with_property("rawType", share.raw_type)
        .with_property("comment", share.comment.as_str())
        .with_property("hidden", share.name.ends_with('$'))
    }

    /// Directory or file under a share. `path` is the share-relative path
    /// of the entry itself.
    pub fn entry(host: &str, share: &str, path: &str, entry: &DirEntry) -> Self {
        let path = path::normalize(path);
        let unc = path::unc_path(host, share, &path);
        let kind = if entry.is_directory {
            NODE_KIND_DIRECTORY
        } else {
            NODE_KIND_FILE
        };

        let mut node = Self::new(unc.clone(), &[kind])
            .with_property("name", entry.name.as_str())
            .with_property("path", path.as_str())
            .with_property("uncPath", unc);
        if !entry.is_directory {
            node = node
                .with_property("fileSize", entry.size)
                .with_property(
                    "extension",
                    entry.extension().map(str::to_lowercase).unwrap_or_default(),
                );
        }
        if let Some(created) = entry.created_at {
            node = node.with_property("createdAt", created);
        }
        if let Some(modified) = entry.modified_at {
            node = node.with_property("modifiedAt", modified);
        }
        node
    }
}

pub fn share_id(host: &str, share: &str) -> String {
    format!("{host}\\{share}")
}
