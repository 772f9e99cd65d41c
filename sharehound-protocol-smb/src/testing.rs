//! Scriptable in-memory SMB server for tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sharehound_common::Credentials;

use crate::{
    path, CreateRequest, Dialect, DirEntry, FileId, NtStatus, RegistryKey, RpcHandle, RpcPipe,
    SecurityQuery, ShareEntry, SmbConnection, SmbConnector, SmbError, SmbTarget, TreeId,
};

/// What happens when a client tries a dialect
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Accept,
    /// Login returns `false`
    Reject,
    LoginStatus(NtStatus),
    ConnectStatus(NtStatus),
    ConnectIo,
    /// Login never completes
    Hang,
}

#[derive(Debug, Clone)]
pub struct MockFile {
    /// Share-relative path, original case
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub descriptor: Option<Bytes>,
}

#[derive(Debug)]
pub struct MockState {
    pub unreachable: bool,
    pub outcomes: HashMap<Dialect, AttemptOutcome>,
    pub failing_pipes: HashSet<RpcPipe>,
    /// `None` makes NetrShareEnum fail
    pub detailed_shares: Option<Vec<ShareEntry>>,
    pub basic_shares: Vec<ShareEntry>,
    /// Keyed by lower-cased share name
    pub share_info_descriptors: HashMap<String, Bytes>,
    pub root_descriptors: HashMap<String, Bytes>,
    pub registry: HashMap<(String, String), Bytes>,
    pub denied_shares: HashSet<String>,
    /// Keyed by lower-cased `share\path`
    pub files: BTreeMap<String, MockFile>,
    pub sid_names: HashMap<String, String>,
    /// Delay added to every directory listing
    pub listing_delay: Option<Duration>,

    pub attempts: Vec<Dialect>,
    pub connections_opened: usize,
    pub connections_closed: usize,
    pub open_trees: HashMap<u32, String>,
    pub open_files: usize,
    pub bound_pipes: HashMap<u32, RpcPipe>,
    pub open_keys: usize,
    pub share_enum_calls: usize,
    pub share_info_calls: usize,
    pub last_server_name: Option<String>,
    pub registry_queries: Vec<(String, String)>,
    pub list_calls: Vec<String>,
    pub create_requests: Vec<(String, CreateRequest)>,
    pub lsa_lookups: Vec<usize>,

    next_handle: u32,
    handles: HashMap<u64, (String, String)>,
    keys: HashMap<u32, String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            unreachable: false,
            outcomes: HashMap::new(),
            failing_pipes: HashSet::new(),
            detailed_shares: Some(vec![]),
            basic_shares: vec![],
            share_info_descriptors: HashMap::new(),
            root_descriptors: HashMap::new(),
            registry: HashMap::new(),
            denied_shares: HashSet::new(),
            files: BTreeMap::new(),
            sid_names: HashMap::new(),
            listing_delay: None,
            attempts: vec![],
            connections_opened: 0,
            connections_closed: 0,
            open_trees: HashMap::new(),
            open_files: 0,
            bound_pipes: HashMap::new(),
            open_keys: 0,
            share_enum_calls: 0,
            share_info_calls: 0,
            last_server_name: None,
            registry_queries: vec![],
            list_calls: vec![],
            create_requests: vec![],
            lsa_lookups: vec![],
            next_handle: 1,
            handles: HashMap::new(),
            keys: HashMap::new(),
        }
    }
}

impl MockState {
    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn share_known(&self, share: &str) -> bool {
        let lower = share.to_lowercase();
        self.basic_shares
            .iter()
            .chain(self.detailed_shares.iter().flatten())
            .any(|s| s.name.trim_end_matches('\0').to_lowercase() == lower)
    }

    fn entry(&self, file: &MockFile) -> DirEntry {
        DirEntry {
            name: path::file_name(&file.path).to_owned(),
            is_directory: file.is_directory,
            size: file.size,
            created_at: Some(1_700_000_000),
            modified_at: Some(1_700_000_100),
        }
    }
}

fn file_key(share: &str, path: &str) -> String {
    path::join(share, &path::normalize(path)).to_lowercase()
}

#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Adds a share to both enumeration levels. The descriptor is also
    /// served by NetrShareGetInfo.
    pub fn add_share(&self, name: &str, share_type: u32, descriptor: Option<Vec<u8>>) {
        self.with_state(|st| {
            let descriptor = descriptor.map(Bytes::from);
            if let Some(sd) = &descriptor {
                st.share_info_descriptors
                    .insert(name.to_lowercase(), sd.clone());
            }
            let entry = ShareEntry {
                name: format!("{name}\0"),
                share_type,
                remark: String::new(),
                security_descriptor: descriptor,
                dfs_root: false,
            };
            st.basic_shares.push(ShareEntry {
                security_descriptor: None,
                ..entry.clone()
            });
            st.detailed_shares.get_or_insert_with(Vec::new).push(entry);
        });
    }

    pub fn add_dir(&self, share: &str, path: &str, descriptor: Option<&[u8]>) {
        self.add(share, path, true, 0, descriptor);
    }

    pub fn add_file(&self, share: &str, path: &str, size: u64, descriptor: Option<&[u8]>) {
        self.add(share, path, false, size, descriptor);
    }

    fn add(&self, share: &str, path: &str, is_directory: bool, size: u64, descriptor: Option<&[u8]>) {
        self.with_state(|st| {
            st.files.insert(
                file_key(share, path),
                MockFile {
                    path: path::normalize(path),
                    is_directory,
                    size,
                    descriptor: descriptor.map(Bytes::copy_from_slice),
                },
            );
        });
    }
}

#[async_trait]
impl SmbConnector for MockServer {
    type Connection = MockConnection;

    async fn probe(&self, target: &SmbTarget) -> Result<(), SmbError> {
        if self.with_state(|st| st.unreachable) {
            return Err(SmbError::Unreachable {
                host: target.host.clone(),
                port: target.port,
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn connect(
        &self,
        _target: &SmbTarget,
        dialect: Dialect,
    ) -> Result<MockConnection, SmbError> {
        let outcome = self.with_state(|st| {
            st.attempts.push(dialect);
            st.outcomes
                .get(&dialect)
                .cloned()
                .unwrap_or(AttemptOutcome::Accept)
        });
        match outcome {
            AttemptOutcome::ConnectStatus(status) => Err(status.into()),
            AttemptOutcome::ConnectIo => Err(SmbError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            outcome => {
                self.with_state(|st| st.connections_opened += 1);
                Ok(MockConnection {
                    state: self.state.clone(),
                    outcome,
                    open: true,
                })
            }
        }
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    outcome: AttemptOutcome,
    open: bool,
}

impl MockConnection {
    fn st(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    fn tree_share(&self, tree: TreeId) -> Result<String, SmbError> {
        self.st()
            .open_trees
            .get(&tree.0)
            .cloned()
            .ok_or(SmbError::Status(NtStatus(0xc0000128)))
    }

    fn pipe(&self, handle: RpcHandle, expected: RpcPipe) -> Result<(), SmbError> {
        match self.st().bound_pipes.get(&handle.0) {
            Some(pipe) if *pipe == expected => Ok(()),
            _ => Err(SmbError::Rpc(format!("{expected} is not bound"))),
        }
    }
}

#[async_trait]
impl SmbConnection for MockConnection {
    async fn login(&mut self, _credentials: &Credentials) -> Result<bool, SmbError> {
        match self.outcome.clone() {
            AttemptOutcome::Reject => Ok(false),
            AttemptOutcome::LoginStatus(status) => Err(status.into()),
            AttemptOutcome::Hang => std::future::pending().await,
            _ => Ok(true),
        }
    }

    async fn echo(&mut self) -> Result<(), SmbError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SmbError> {
        if self.open {
            self.open = false;
            self.st().connections_closed += 1;
        }
        Ok(())
    }

    async fn tree_connect(&mut self, share: &str) -> Result<TreeId, SmbError> {
        let mut st = self.st();
        if st.denied_shares.contains(&share.to_lowercase()) {
            return Err(NtStatus::ACCESS_DENIED.into());
        }
        if !st.share_known(share) {
            return Err(NtStatus::BAD_NETWORK_NAME.into());
        }
        let id = st.handle();
        st.open_trees.insert(id, share.to_owned());
        Ok(TreeId(id))
    }

    async fn tree_disconnect(&mut self, tree: TreeId) -> Result<(), SmbError> {
        self.st().open_trees.remove(&tree.0);
        Ok(())
    }

    async fn create(
        &mut self,
        tree: TreeId,
        path: &str,
        request: CreateRequest,
    ) -> Result<FileId, SmbError> {
        let share = self.tree_share(tree)?;
        let mut st = self.st();
        st.create_requests.push((path.to_owned(), request));
        if !path.is_empty() {
            match st.files.get(&file_key(&share, path)) {
                Some(f) if f.is_directory == request.is_directory() => {}
                _ => return Err(NtStatus::OBJECT_NAME_NOT_FOUND.into()),
            }
        }
        let id = st.handle() as u64;
        st.handles.insert(id, (share, path.to_owned()));
        st.open_files += 1;
        Ok(FileId(id))
    }

    async fn query_security_info(
        &mut self,
        _tree: TreeId,
        file: FileId,
        _query: SecurityQuery,
    ) -> Result<Bytes, SmbError> {
        let st = self.st();
        let Some((share, path)) = st.handles.get(&file.0) else {
            return Err(NtStatus(0xc0000008).into());
        };
        let descriptor = if path.is_empty() {
            st.root_descriptors.get(&share.to_lowercase()).cloned()
        } else {
            st.files
                .get(&file_key(share, path))
                .and_then(|f| f.descriptor.clone())
        };
        descriptor.ok_or(NtStatus::ACCESS_DENIED.into())
    }

    async fn close(&mut self, _tree: TreeId, file: FileId) -> Result<(), SmbError> {
        let mut st = self.st();
        if st.handles.remove(&file.0).is_some() {
            st.open_files -= 1;
        }
        Ok(())
    }

    async fn list_path(&mut self, share: &str, pattern: &str) -> Result<Vec<DirEntry>, SmbError> {
        let delay = {
            let mut st = self.st();
            st.list_calls.push(pattern.to_owned());
            st.listing_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let st = self.st();
        if let Some(dir) = pattern.strip_suffix('*') {
            let dir = dir.trim_end_matches('\\');
            let parent = file_key(share, dir);
            let mut entries = vec![];
            for (key, file) in st.files.iter() {
                if path::parent(key) == parent {
                    entries.push(st.entry(file));
                }
            }
            if entries.is_empty() && !dir.is_empty() && !st.files.contains_key(&parent) {
                return Err(NtStatus::OBJECT_NAME_NOT_FOUND.into());
            }
            Ok(entries)
        } else {
            match st.files.get(&file_key(share, pattern)) {
                Some(file) => Ok(vec![st.entry(file)]),
                None => Err(NtStatus::OBJECT_NAME_NOT_FOUND.into()),
            }
        }
    }

    async fn list_shares(&mut self) -> Result<Vec<ShareEntry>, SmbError> {
        Ok(self.st().basic_shares.clone())
    }

    async fn rpc_bind(&mut self, pipe: RpcPipe) -> Result<RpcHandle, SmbError> {
        let mut st = self.st();
        if st.failing_pipes.contains(&pipe) {
            return Err(NtStatus::ACCESS_DENIED.into());
        }
        let id = st.handle();
        st.bound_pipes.insert(id, pipe);
        Ok(RpcHandle(id))
    }

    async fn rpc_unbind(&mut self, handle: RpcHandle) -> Result<(), SmbError> {
        self.st().bound_pipes.remove(&handle.0);
        Ok(())
    }

    async fn netr_share_enum(
        &mut self,
        srvsvc: RpcHandle,
        server_name: &str,
    ) -> Result<Vec<ShareEntry>, SmbError> {
        self.pipe(srvsvc, RpcPipe::Srvsvc)?;
        let mut st = self.st();
        st.share_enum_calls += 1;
        st.last_server_name = Some(server_name.to_owned());
        st.detailed_shares
            .clone()
            .ok_or(SmbError::Rpc("rpc_s_access_denied".into()))
    }

    async fn netr_share_get_info(
        &mut self,
        srvsvc: RpcHandle,
        net_name: &str,
    ) -> Result<ShareEntry, SmbError> {
        self.pipe(srvsvc, RpcPipe::Srvsvc)?;
        let mut st = self.st();
        st.share_info_calls += 1;
        Ok(ShareEntry {
            name: net_name.to_owned(),
            security_descriptor: st
                .share_info_descriptors
                .get(&net_name.to_lowercase())
                .cloned(),
            ..Default::default()
        })
    }

    async fn reg_open_local_machine(&mut self, winreg: RpcHandle) -> Result<RegistryKey, SmbError> {
        self.pipe(winreg, RpcPipe::Winreg)?;
        let mut st = self.st();
        let id = st.handle();
        st.keys.insert(id, "HKLM".into());
        st.open_keys += 1;
        Ok(RegistryKey(id))
    }

    async fn reg_open_key(
        &mut self,
        winreg: RpcHandle,
        _parent: RegistryKey,
        subkey: &str,
    ) -> Result<RegistryKey, SmbError> {
        self.pipe(winreg, RpcPipe::Winreg)?;
        let mut st = self.st();
        let id = st.handle();
        st.keys.insert(id, subkey.to_owned());
        st.open_keys += 1;
        Ok(RegistryKey(id))
    }

    async fn reg_query_value(
        &mut self,
        winreg: RpcHandle,
        key: RegistryKey,
        value_name: &str,
    ) -> Result<Option<Bytes>, SmbError> {
        self.pipe(winreg, RpcPipe::Winreg)?;
        let mut st = self.st();
        let key_path = st.keys.get(&key.0).cloned().unwrap_or_default();
        st.registry_queries
            .push((key_path.clone(), value_name.to_owned()));
        match st.registry.get(&(key_path, value_name.to_owned())) {
            Some(data) => Ok(Some(data.clone())),
            None => Err(NtStatus(0xc0000034).into()),
        }
    }

    async fn reg_close_key(&mut self, _winreg: RpcHandle, key: RegistryKey) -> Result<(), SmbError> {
        let mut st = self.st();
        if st.keys.remove(&key.0).is_some() {
            st.open_keys -= 1;
        }
        Ok(())
    }

    async fn lsa_lookup_sids(
        &mut self,
        lsa: RpcHandle,
        sids: &[String],
    ) -> Result<Vec<(String, String)>, SmbError> {
        self.pipe(lsa, RpcPipe::Lsarpc)?;
        let mut st = self.st();
        st.lsa_lookups.push(sids.len());
        Ok(sids
            .iter()
            .filter_map(|sid| st.sid_names.get(sid).map(|n| (sid.clone(), n.clone())))
            .collect())
    }
}
