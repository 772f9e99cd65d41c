use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sharehound_common::Credentials;
use tokio::net::TcpStream;

use crate::{Dialect, ShareEntry, SmbError};

pub const READ_CONTROL: u32 = 0x0002_0000;
pub const FILE_READ_ATTRIBUTES: u32 = 0x0000_0080;

pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;
pub const FILE_NON_DIRECTORY_FILE: u32 = 0x0000_0040;

pub const FILE_OPEN: u32 = 0x0000_0001;

pub const SMB2_0_INFO_SECURITY: u8 = 0x03;

pub const OWNER_SECURITY_INFORMATION: u32 = 0x0000_0001;
pub const GROUP_SECURITY_INFORMATION: u32 = 0x0000_0002;
pub const DACL_SECURITY_INFORMATION: u32 = 0x0000_0004;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryKey(pub u32);

/// Named pipes the session binds DCE/RPC interfaces on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcPipe {
    Srvsvc,
    Winreg,
    Lsarpc,
}

impl RpcPipe {
    pub fn pipe_name(&self) -> &'static str {
        match self {
            Self::Srvsvc => r"\srvsvc",
            Self::Winreg => r"\winreg",
            Self::Lsarpc => r"\lsarpc",
        }
    }
}

impl fmt::Display for RpcPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pipe_name())
    }
}

/// Parameters of an SMB2 CREATE request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateRequest {
    pub desired_access: u32,
    pub share_access: u32,
    pub create_options: u32,
    pub disposition: u32,
}

impl CreateRequest {
    /// Minimal rights needed to read a security descriptor
    pub fn read_security(directory: bool) -> Self {
        Self {
            desired_access: READ_CONTROL | FILE_READ_ATTRIBUTES,
            share_access: 0,
            create_options: if directory {
                FILE_DIRECTORY_FILE
            } else {
                FILE_NON_DIRECTORY_FILE
            },
            disposition: FILE_OPEN,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.create_options & FILE_DIRECTORY_FILE != 0
    }
}

/// Parameters of an SMB2 QUERY_INFO request for a security descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityQuery {
    pub info_type: u8,
    pub additional_information: u32,
}

impl Default for SecurityQuery {
    fn default() -> Self {
        Self {
            info_type: SMB2_0_INFO_SECURITY,
            additional_information: OWNER_SECURITY_INFORMATION
                | GROUP_SECURITY_INFORMATION
                | DACL_SECURITY_INFORMATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    /// Unix timestamps
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
}

impl DirEntry {
    pub fn extension(&self) -> Option<&str> {
        if self.is_directory {
            return None;
        }
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmbTarget {
    pub host: String,
    pub remote_name: String,
    pub port: u16,
    pub advertised_name: Option<String>,
    pub timeout: Duration,
}

impl SmbTarget {
    pub fn new<S: Into<String>>(host: S, port: u16, timeout: Duration) -> Self {
        let host = host.into();
        Self {
            remote_name: host.clone(),
            host,
            port,
            advertised_name: None,
            timeout,
        }
    }
}

pub async fn is_port_open(host: &str, port: u16, timeout: Duration) -> Result<(), SmbError> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(SmbError::Unreachable {
            host: host.to_owned(),
            port,
            reason: e.to_string(),
        }),
        Err(_) => Err(SmbError::Unreachable {
            host: host.to_owned(),
            port,
            reason: "timed out".into(),
        }),
    }
}

/// Opens transport connections to a host with a given dialect
#[async_trait]
pub trait SmbConnector: Send + Sync {
    type Connection: SmbConnection;

    async fn probe(&self, target: &SmbTarget) -> Result<(), SmbError> {
        is_port_open(&target.host, target.port, target.timeout).await
    }

    async fn connect(
        &self,
        target: &SmbTarget,
        dialect: Dialect,
    ) -> Result<Self::Connection, SmbError>;
}

/// One negotiated SMB connection. RPC calls run over named pipes of the
/// same connection.
///
/// File methods follow SMB2 commands one to one: SESSION_SETUP (`login`),
/// ECHO, LOGOFF (`disconnect`), TREE_CONNECT, TREE_DISCONNECT, CREATE,
/// QUERY_INFO, CLOSE and QUERY_DIRECTORY (`list_path`). The RPC methods are
/// DCE/RPC requests sent with IOCTL FSCTL_PIPE_TRANSCEIVE.
#[async_trait]
pub trait SmbConnection: Send + Sync {
    /// `Ok(false)` means the server rejected the credentials without a
    /// protocol error
    async fn login(&mut self, credentials: &Credentials) -> Result<bool, SmbError>;
    async fn echo(&mut self) -> Result<(), SmbError>;
    async fn disconnect(&mut self) -> Result<(), SmbError>;

    async fn tree_connect(&mut self, share: &str) -> Result<TreeId, SmbError>;
    async fn tree_disconnect(&mut self, tree: TreeId) -> Result<(), SmbError>;

    async fn create(
        &mut self,
        tree: TreeId,
        path: &str,
        request: CreateRequest,
    ) -> Result<FileId, SmbError>;
    async fn query_security_info(
        &mut self,
        tree: TreeId,
        file: FileId,
        query: SecurityQuery,
    ) -> Result<Bytes, SmbError>;
    async fn close(&mut self, tree: TreeId, file: FileId) -> Result<(), SmbError>;

    /// Lists entries matching `pattern`, a share-relative path whose last
    /// component may be `*`
    async fn list_path(&mut self, share: &str, pattern: &str) -> Result<Vec<DirEntry>, SmbError>;

    /// Share enumeration at info level 1 (no security descriptors)
    async fn list_shares(&mut self) -> Result<Vec<ShareEntry>, SmbError>;

    async fn rpc_bind(&mut self, pipe: RpcPipe) -> Result<RpcHandle, SmbError>;
    async fn rpc_unbind(&mut self, handle: RpcHandle) -> Result<(), SmbError>;

    /// NetrShareEnum at info level 502
    async fn netr_share_enum(
        &mut self,
        srvsvc: RpcHandle,
        server_name: &str,
    ) -> Result<Vec<ShareEntry>, SmbError>;
    /// NetrShareGetInfo at info level 502
    async fn netr_share_get_info(
        &mut self,
        srvsvc: RpcHandle,
        net_name: &str,
    ) -> Result<ShareEntry, SmbError>;

    async fn reg_open_local_machine(&mut self, winreg: RpcHandle) -> Result<RegistryKey, SmbError>;
    async fn reg_open_key(
        &mut self,
        winreg: RpcHandle,
        parent: RegistryKey,
        subkey: &str,
    ) -> Result<RegistryKey, SmbError>;
    async fn reg_query_value(
        &mut self,
        winreg: RpcHandle,
        key: RegistryKey,
        value_name: &str,
    ) -> Result<Option<Bytes>, SmbError>;
    async fn reg_close_key(&mut self, winreg: RpcHandle, key: RegistryKey) -> Result<(), SmbError>;

    /// LsarLookupSids, returns `(sid, "DOMAIN\name")` pairs for the SIDs the
    /// server could translate
    async fn lsa_lookup_sids(
        &mut self,
        lsa: RpcHandle,
        sids: &[String],
    ) -> Result<Vec<(String, String)>, SmbError>;
}
