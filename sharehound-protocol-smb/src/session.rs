use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use sharehound_common::{AuthScheme, Credentials};
use tokio::time::{timeout_at, Instant};
use tracing::*;

use crate::{
    classify_error, path, Classification, Dialect, DirEntry, ErrorCategory, RpcHandle, RpcPipe,
    ShareInfo, SidResolver, SmbConnection, SmbConnector, SmbError, SmbTarget, TreeId,
};

const DEFAULT_NEGOTIATE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Negotiating(Dialect),
    Authenticated(Dialect),
    Failed(ErrorCategory),
}

enum Attempt<T> {
    Authenticated(T),
    Rejected,
    Failed(Classification),
}

pub(crate) async fn bounded<T, F>(timeout: Duration, op: &'static str, fut: F) -> Result<T, SmbError>
where
    F: Future<Output = Result<T, SmbError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SmbError::Timeout(op)),
    }
}

async fn bounded_until<T, F>(
    deadline: Instant,
    timeout: Duration,
    op: &'static str,
    fut: F,
) -> Result<T, SmbError>
where
    F: Future<Output = Result<T, SmbError>>,
{
    let deadline = deadline.min(Instant::now() + timeout);
    match timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(SmbError::Timeout(op)),
    }
}

pub(crate) async fn release<T: SmbConnection>(conn: &mut T, timeout: Duration) {
    if let Err(error) = bounded(timeout, "disconnect", conn.disconnect()).await {
        debug!(%error, "Failed to close SMB connection");
    }
}

/// One authenticated connection to a host plus the share/directory the
/// session is currently attached to
pub struct SmbSession<C: SmbConnector> {
    connector: C,
    pub(crate) target: SmbTarget,
    credentials: Credentials,
    negotiate_timeout: Duration,
    state: SessionState,
    pub(crate) conn: Option<C::Connection>,
    pub(crate) shares: BTreeMap<String, ShareInfo>,
    pub(crate) share: Option<String>,
    pub(crate) cwd: String,
    pub(crate) tree: Option<TreeId>,
    pub(crate) srvsvc: Option<RpcHandle>,
    lsa: Option<RpcHandle>,
    sid_resolver: SidResolver,
}

impl<C: SmbConnector> SmbSession<C> {
    pub fn new(connector: C, target: SmbTarget, credentials: Credentials) -> Self {
        Self {
            connector,
            target,
            credentials,
            negotiate_timeout: DEFAULT_NEGOTIATE_TIMEOUT,
            state: SessionState::Disconnected,
            conn: None,
            shares: BTreeMap::new(),
            share: None,
            cwd: String::new(),
            tree: None,
            srvsvc: None,
            lsa: None,
            sid_resolver: SidResolver::new(),
        }
    }

    pub fn with_negotiate_timeout(mut self, timeout: Duration) -> Self {
        self.negotiate_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.target.host
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn dialect(&self) -> Option<Dialect> {
        match self.state {
            SessionState::Authenticated(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    pub fn current_share(&self) -> Option<&str> {
        self.share.as_deref()
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn tree_id(&self) -> Option<TreeId> {
        self.tree
    }

    pub fn has_share_rpc(&self) -> bool {
        self.srvsvc.is_some()
    }

    pub fn has_sid_rpc(&self) -> bool {
        self.lsa.is_some()
    }

    /// Negotiates a dialect and authenticates. Dialects are tried newest
    /// first; only protocol-level and unclassified failures move on to the
    /// next dialect.
    pub async fn init_session(&mut self) -> Result<Dialect, SmbError> {
        if self.conn.is_some() {
            self.close().await;
        }
        self.state = SessionState::Disconnected;

        debug!(host = %self.target.host, "Connecting to remote SMB server");

        if let Err(error) = bounded(
            self.target.timeout,
            "port probe",
            self.connector.probe(&self.target),
        )
        .await
        {
            debug!(host = %self.target.host, port = self.target.port, %error, "Port is not reachable");
            self.state = SessionState::Failed(ErrorCategory::Network);
            return Err(error);
        }

        let deadline = Instant::now() + self.negotiate_timeout;
        let mut last_failure: Option<Classification> = None;
        let mut timed_out = false;

        for dialect in Dialect::PREFERENCE {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            self.state = SessionState::Negotiating(dialect);
            debug!(host = %self.target.host, %dialect, "Trying connection");

            match self.attempt(dialect, deadline).await {
                Attempt::Authenticated(conn) => {
                    debug!(
                        host = %self.target.host,
                        %dialect,
                        "Successfully authenticated as '{}\\{}'",
                        self.credentials.domain,
                        self.credentials.username,
                    );
                    self.conn = Some(conn);
                    self.state = SessionState::Authenticated(dialect);
                    self.bootstrap_auxiliary().await;
                    return Ok(dialect);
                }
                Attempt::Rejected => {
                    debug!(
                        host = %self.target.host,
                        "Authentication failed as '{}\\{}'",
                        self.credentials.domain,
                        self.credentials.username,
                    );
                    self.state = SessionState::Failed(ErrorCategory::Auth);
                    return Err(SmbError::AuthenticationRejected(format!(
                        "{}\\{}",
                        self.credentials.domain, self.credentials.username
                    )));
                }
                Attempt::Failed(failure) => {
                    debug!(
                        host = %self.target.host,
                        "[{}] {} failed: {}",
                        failure.category,
                        dialect,
                        failure.message
                    );
                    if !failure.retry_with_other_dialect {
                        debug!("Not retrying due to {} error", failure.category);
                        self.state = SessionState::Failed(failure.category);
                        return Err(SmbError::ConnectionFailed {
                            category: failure.category,
                            message: failure.message,
                        });
                    }
                    last_failure = Some(failure);
                }
            }
        }

        if timed_out {
            debug!(host = %self.target.host, "Dialect negotiation ran out of time");
            self.state = SessionState::Failed(ErrorCategory::Network);
            return Err(SmbError::Timeout("dialect negotiation"));
        }

        let (category, message) = match last_failure {
            Some(failure) => (failure.category, failure.message),
            None => (ErrorCategory::Unknown, "unknown error".to_owned()),
        };
        debug!(
            host = %self.target.host,
            "Failed to connect after trying all SMB dialects. Last error [{category}]: {message}"
        );
        self.state = SessionState::Failed(category);
        Err(SmbError::ConnectionFailed { category, message })
    }

    /// One dialect attempt. A connection that does not end up authenticated
    /// is disconnected before returning.
    async fn attempt(&self, dialect: Dialect, deadline: Instant) -> Attempt<C::Connection> {
        let timeout = self.target.timeout;
        let mut conn = match bounded_until(
            deadline,
            timeout,
            "connect",
            self.connector.connect(&self.target, dialect),
        )
        .await
        {
            Ok(conn) => conn,
            Err(error) => return Attempt::Failed(classify_error(&error)),
        };

        let scheme = match self.credentials.auth_scheme() {
            AuthScheme::Kerberos => "kerberos",
            AuthScheme::PassTheHash => "NTLM pass-the-hash",
            AuthScheme::Password => "NTLM password",
        };
        debug!(
            "Authenticating as '{}\\{}' with {scheme}",
            self.credentials.domain, self.credentials.username
        );

        match bounded_until(deadline, timeout, "login", conn.login(&self.credentials)).await {
            Ok(true) => Attempt::Authenticated(conn),
            Ok(false) => {
                release(&mut conn, timeout).await;
                Attempt::Rejected
            }
            Err(error) => {
                release(&mut conn, timeout).await;
                Attempt::Failed(classify_error(&error))
            }
        }
    }

    async fn bootstrap_auxiliary(&mut self) {
        let timeout = self.target.timeout;
        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        match bounded(timeout, "lsarpc bind", conn.rpc_bind(RpcPipe::Lsarpc)).await {
            Ok(handle) => self.lsa = Some(handle),
            Err(error) => debug!(%error, "SID resolver could not be initialized"),
        }
        match bounded(timeout, "srvsvc bind", conn.rpc_bind(RpcPipe::Srvsvc)).await {
            Ok(handle) => self.srvsvc = Some(handle),
            Err(error) => debug!(%error, "Could not initialize connection to srvsvc"),
        }
    }

    /// Checks the port and sends an echo. A failure marks the session
    /// disconnected.
    pub async fn ping(&mut self) -> bool {
        let timeout = self.target.timeout;
        if bounded(timeout, "port probe", self.connector.probe(&self.target))
            .await
            .is_err()
        {
            self.state = SessionState::Disconnected;
            return false;
        }
        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        if let Err(error) = bounded(timeout, "echo", conn.echo()).await {
            debug!(%error, "Echo failed");
            self.state = SessionState::Disconnected;
            return false;
        }
        self.is_connected()
    }

    /// Releases the current tree, both RPC bindings and the connection.
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        let timeout = self.target.timeout;
        self.share = None;
        self.cwd.clear();
        self.shares.clear();
        self.state = SessionState::Disconnected;

        let Some(mut conn) = self.conn.take() else {
            self.tree = None;
            self.srvsvc = None;
            self.lsa = None;
            debug!("No active SMB connection to close");
            return;
        };

        if let Some(tree) = self.tree.take() {
            if let Err(error) = bounded(timeout, "tree disconnect", conn.tree_disconnect(tree)).await
            {
                debug!(%error, "Failed to disconnect tree");
            }
        }
        for handle in [self.srvsvc.take(), self.lsa.take()].into_iter().flatten() {
            if let Err(error) = bounded(timeout, "rpc unbind", conn.rpc_unbind(handle)).await {
                debug!(%error, "Failed to release RPC binding");
            }
        }
        release(&mut conn, timeout).await;
        debug!(host = %self.target.host, "SMB connection closed");
    }

    /// Enumerates shares, keyed by lower-cased name. Uses the level 502
    /// srvsvc enumeration when available and falls back to the basic one.
    pub async fn list_shares(&mut self) -> Result<BTreeMap<String, ShareInfo>, SmbError> {
        self.shares.clear();
        let timeout = self.target.timeout;
        let conn = self.conn.as_mut().ok_or(SmbError::NotConnected)?;

        let detailed = match self.srvsvc {
            Some(srvsvc) => {
                let server_name = format!(r"\\{}", self.target.host);
                bounded(
                    timeout,
                    "NetrShareEnum",
                    conn.netr_share_enum(srvsvc, &server_name),
                )
                .await
            }
            None => Err(SmbError::Rpc("srvsvc is not bound".into())),
        };

        let entries = match detailed {
            Ok(entries) => entries,
            Err(error) => {
                debug!(%error, "Could not get detailed share info");
                bounded(timeout, "share enumeration", conn.list_shares()).await?
            }
        };

        for entry in entries {
            let info = ShareInfo::from(entry);
            self.shares.insert(info.name.to_lowercase(), info);
        }
        Ok(self.shares.clone())
    }

    /// Attaches to a share. The name is matched case-insensitively against
    /// a fresh enumeration and the server's spelling is kept.
    pub async fn set_share(&mut self, name: &str) -> Result<(), SmbError> {
        self.list_shares().await?;
        let Some(info) = self.shares.get(&name.to_lowercase()) else {
            return Err(SmbError::ShareNotFound(name.to_owned()));
        };
        let remote_name = info.name.clone();

        let timeout = self.target.timeout;
        let conn = self.conn.as_mut().ok_or(SmbError::NotConnected)?;

        if let Some(previous) = self.tree.take() {
            if let Err(error) =
                bounded(timeout, "tree disconnect", conn.tree_disconnect(previous)).await
            {
                debug!(%error, "Failed to disconnect previous tree");
            }
        }

        self.share = Some(remote_name.clone());
        self.cwd.clear();

        match bounded(timeout, "tree connect", conn.tree_connect(&remote_name)).await {
            Ok(tree) => {
                self.tree = Some(tree);
                debug!(share = %remote_name, "Connected to share");
                Ok(())
            }
            Err(error) => {
                self.share = None;
                self.cwd.clear();
                Err(SmbError::ShareAccess {
                    share: name.to_owned(),
                    reason: error.to_string(),
                })
            }
        }
    }

    pub async fn clear_share(&mut self) {
        let timeout = self.target.timeout;
        self.share = None;
        self.cwd.clear();
        let (Some(tree), Some(conn)) = (self.tree.take(), self.conn.as_mut()) else {
            return;
        };
        if let Err(error) = bounded(timeout, "tree disconnect", conn.tree_disconnect(tree)).await {
            debug!(%error, "Failed to disconnect tree");
        }
    }

    /// Changes directory, relative to the current one unless `path` starts
    /// with a separator. The target must be an existing directory.
    pub async fn set_cwd(&mut self, path: &str) -> Result<(), SmbError> {
        let resolved = path::resolve(&self.cwd, path);
        if resolved.is_empty() {
            self.cwd.clear();
            return Ok(());
        }
        if self.path_isdir(&resolved).await? {
            self.cwd = resolved;
            Ok(())
        } else {
            debug!("Remote directory '{resolved}' does not exist.");
            Err(SmbError::NotADirectory(resolved))
        }
    }

    pub async fn path_exists(&mut self, path: &str) -> Result<bool, SmbError> {
        Ok(self.lookup_entry(path).await?.is_some())
    }

    pub async fn path_isdir(&mut self, path: &str) -> Result<bool, SmbError> {
        Ok(self
            .lookup_entry(path)
            .await?
            .map(|e| e.is_directory)
            .unwrap_or(false))
    }

    /// Looks up one share-relative path. Lookup failures count as absent.
    pub async fn lookup_entry(&mut self, path: &str) -> Result<Option<DirEntry>, SmbError> {
        let normalized = path::normalize(path);
        if normalized.is_empty() {
            return Ok(Some(DirEntry {
                name: String::new(),
                is_directory: true,
                size: 0,
                created_at: None,
                modified_at: None,
            }));
        }

        let timeout = self.target.timeout;
        let share = self.share.as_deref().ok_or(SmbError::ShareNotSet)?;
        let conn = self.conn.as_mut().ok_or(SmbError::NotConnected)?;

        match bounded(timeout, "list path", conn.list_path(share, &normalized)).await {
            Ok(entries) => {
                let name = path::file_name(&normalized);
                Ok(entries
                    .into_iter()
                    .find(|e| e.name.eq_ignore_ascii_case(name)))
            }
            Err(error) => {
                debug!(%error, path = %normalized, "Path lookup failed");
                Ok(None)
            }
        }
    }

    /// Lists a directory relative to the current working directory,
    /// without the `.` and `..` entries
    pub async fn list_contents(&mut self, path: &str) -> Result<Vec<DirEntry>, SmbError> {
        let timeout = self.target.timeout;
        let pattern = path::list_pattern(&path::resolve(&self.cwd, path));
        let share = self.share.as_deref().ok_or(SmbError::ShareNotSet)?;
        let conn = self.conn.as_mut().ok_or(SmbError::NotConnected)?;

        let entries = bounded(timeout, "list directory", conn.list_path(share, &pattern)).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.name != "." && e.name != "..")
            .collect())
    }

    /// Resolves SIDs through the LSA binding into the session's name cache.
    /// Best effort: unresolved SIDs keep displaying as themselves.
    pub async fn resolve_sids<'a, I>(&mut self, sids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pending = self.sid_resolver.unresolved(sids);
        if pending.is_empty() {
            return;
        }
        let timeout = self.target.timeout;
        let (Some(lsa), Some(conn)) = (self.lsa, self.conn.as_mut()) else {
            return;
        };
        match bounded(timeout, "LsarLookupSids", conn.lsa_lookup_sids(lsa, &pending)).await {
            Ok(names) => {
                for (sid, name) in names {
                    self.sid_resolver.insert(sid, name);
                }
            }
            Err(error) => debug!(%error, "Could not resolve SIDs"),
        }
    }

    pub fn sid_display_name(&self, sid: &str) -> String {
        self.sid_resolver.display_name(sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AttemptOutcome, MockServer};
    use crate::{NtStatus, ShareEntry};

    fn session(server: &MockServer) -> SmbSession<MockServer> {
        SmbSession::new(
            server.clone(),
            SmbTarget::new("fs01.corp.local", 445, Duration::from_secs(2)),
            Credentials::new("CORP", "alice").with_password("pw"),
        )
    }

    async fn connected(server: &MockServer) -> SmbSession<MockServer> {
        let mut s = session(server);
        s.init_session().await.unwrap();
        s
    }

    #[tokio::test]
    async fn test_auto_negotiate_succeeds_first() {
        let server = MockServer::new();
        let mut s = session(&server);
        assert_eq!(s.init_session().await.unwrap(), Dialect::Auto);
        assert!(s.is_connected());
        assert!(s.has_share_rpc() && s.has_sid_rpc());
        server.with_state(|st| assert_eq!(st.attempts, vec![Dialect::Auto]));
    }

    #[tokio::test]
    async fn test_protocol_errors_fall_back_to_older_dialects() {
        let server = MockServer::new();
        server.with_state(|st| {
            st.outcomes.insert(
                Dialect::Auto,
                AttemptOutcome::LoginStatus(NtStatus::NOT_SUPPORTED),
            );
            st.outcomes.insert(
                Dialect::Smb30,
                AttemptOutcome::LoginStatus(NtStatus::NOT_SUPPORTED),
            );
        });
        let mut s = session(&server);
        assert_eq!(s.init_session().await.unwrap(), Dialect::Smb21);
        assert_eq!(s.state(), SessionState::Authenticated(Dialect::Smb21));
        server.with_state(|st| {
            assert_eq!(
                st.attempts,
                vec![Dialect::Auto, Dialect::Smb30, Dialect::Smb21]
            );
            // The two failed attempts were released
            assert_eq!(st.connections_opened, 3);
            assert_eq!(st.connections_closed, 2);
        });
    }

    #[tokio::test]
    async fn test_auth_error_stops_immediately() {
        let server = MockServer::new();
        server.with_state(|st| {
            st.outcomes.insert(
                Dialect::Auto,
                AttemptOutcome::LoginStatus(NtStatus::LOGON_FAILURE),
            );
        });
        let mut s = session(&server);
        let err = s.init_session().await.unwrap_err();
        assert!(matches!(
            err,
            SmbError::ConnectionFailed {
                category: ErrorCategory::Auth,
                ..
            }
        ));
        assert_eq!(s.state(), SessionState::Failed(ErrorCategory::Auth));
        server.with_state(|st| {
            assert_eq!(st.attempts, vec![Dialect::Auto]);
            assert_eq!(st.connections_closed, 1);
        });
    }

    #[tokio::test]
    async fn test_rejected_login_does_not_retry() {
        let server = MockServer::new();
        server.with_state(|st| {
            st.outcomes.insert(Dialect::Auto, AttemptOutcome::Reject);
        });
        let mut s = session(&server);
        assert!(matches!(
            s.init_session().await,
            Err(SmbError::AuthenticationRejected(_))
        ));
        server.with_state(|st| assert_eq!(st.attempts.len(), 1));
    }

    #[tokio::test]
    async fn test_unreachable_port_uses_no_dialect() {
        let server = MockServer::new();
        server.with_state(|st| st.unreachable = true);
        let mut s = session(&server);
        assert!(matches!(
            s.init_session().await,
            Err(SmbError::Unreachable { .. })
        ));
        assert_eq!(s.state(), SessionState::Failed(ErrorCategory::Network));
        server.with_state(|st| assert!(st.attempts.is_empty()));
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let server = MockServer::new();
        server.with_state(|st| {
            st.outcomes.insert(Dialect::Auto, AttemptOutcome::ConnectIo);
        });
        let mut s = session(&server);
        assert!(s.init_session().await.is_err());
        assert_eq!(s.state(), SessionState::Failed(ErrorCategory::Network));
        server.with_state(|st| assert_eq!(st.attempts, vec![Dialect::Auto]));
    }

    #[tokio::test]
    async fn test_unknown_status_is_retried_until_exhaustion() {
        let server = MockServer::new();
        server.with_state(|st| {
            for dialect in Dialect::PREFERENCE {
                st.outcomes
                    .insert(dialect, AttemptOutcome::ConnectStatus(NtStatus(0xc0000001)));
            }
        });
        let mut s = session(&server);
        let err = s.init_session().await.unwrap_err();
        assert!(matches!(
            err,
            SmbError::ConnectionFailed {
                category: ErrorCategory::Unknown,
                ..
            }
        ));
        server.with_state(|st| assert_eq!(st.attempts.len(), 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_login_times_out_and_releases() {
        let server = MockServer::new();
        server.with_state(|st| {
            st.outcomes.insert(Dialect::Auto, AttemptOutcome::Hang);
        });
        let mut s = session(&server);
        assert!(s.init_session().await.is_err());
        server.with_state(|st| {
            assert_eq!(st.attempts, vec![Dialect::Auto]);
            assert_eq!(st.connections_opened, st.connections_closed);
        });
    }

    #[tokio::test]
    async fn test_failed_bootstrap_is_not_fatal() {
        let server = MockServer::new();
        server.add_share("DATA", 0, None);
        server.with_state(|st| {
            st.failing_pipes.insert(RpcPipe::Srvsvc);
            st.failing_pipes.insert(RpcPipe::Lsarpc);
        });
        let mut s = connected(&server).await;
        assert!(!s.has_share_rpc());
        assert!(!s.has_sid_rpc());

        // Falls back to the basic enumeration
        let shares = s.list_shares().await.unwrap();
        assert!(shares.contains_key("data"));
        server.with_state(|st| assert_eq!(st.share_enum_calls, 0));
    }

    #[tokio::test]
    async fn test_list_shares_detailed() {
        let server = MockServer::new();
        server.add_share("Finance", 0, Some(vec![1, 0, 4, 0x80]));
        server.add_share("IPC$", 0x8000_0003, None);
        let mut s = connected(&server).await;

        let shares = s.list_shares().await.unwrap();
        assert_eq!(shares.len(), 2);
        let finance = &shares["finance"];
        assert_eq!(finance.name, "Finance");
        assert_eq!(finance.types, vec!["STYPE_DISKTREE"]);
        assert!(finance.security_descriptor.is_some());
        assert_eq!(shares["ipc$"].types, vec!["STYPE_IPC", "STYPE_SPECIAL"]);
        server.with_state(|st| assert_eq!(st.last_server_name.as_deref(), Some(r"\\fs01.corp.local")));
    }

    #[tokio::test]
    async fn test_detailed_enumeration_failure_falls_back() {
        let server = MockServer::new();
        server.with_state(|st| {
            st.detailed_shares = None;
            st.basic_shares.push(ShareEntry {
                name: "Public\0".into(),
                share_type: 0,
                remark: "Everyone\0".into(),
                ..Default::default()
            });
        });
        let mut s = connected(&server).await;
        let shares = s.list_shares().await.unwrap();
        assert_eq!(shares["public"].name, "Public");
        assert_eq!(shares["public"].comment, "Everyone");
    }

    #[tokio::test]
    async fn test_set_share_keeps_remote_case() {
        let server = MockServer::new();
        server.add_share("Finance", 0, None);
        let mut s = connected(&server).await;

        s.set_share("FINANCE").await.unwrap();
        assert_eq!(s.current_share(), Some("Finance"));
        assert!(s.tree_id().is_some());
        assert_eq!(s.cwd(), "");
    }

    #[tokio::test]
    async fn test_set_share_unknown() {
        let server = MockServer::new();
        let mut s = connected(&server).await;
        let err = s.set_share("nope").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not set share 'nope', it does not exist remotely."
        );
        assert_eq!(s.current_share(), None);
    }

    #[tokio::test]
    async fn test_set_share_denied_clears_state() {
        let server = MockServer::new();
        server.add_share("Secret", 0, None);
        server.with_state(|st| {
            st.denied_shares.insert("secret".into());
        });
        let mut s = connected(&server).await;
        let err = s.set_share("secret").await.unwrap_err();
        assert!(err.to_string().starts_with("Could not access share 'secret'"));
        assert_eq!(s.current_share(), None);
        assert_eq!(s.tree_id(), None);
    }

    #[tokio::test]
    async fn test_set_cwd() {
        let server = MockServer::new();
        server.add_share("DATA", 0, None);
        server.add_dir("DATA", "Projects", None);
        server.add_dir("DATA", r"Projects\Alpha", None);
        server.add_file("DATA", r"Projects\notes.txt", 10, None);
        let mut s = connected(&server).await;
        s.set_share("data").await.unwrap();

        s.set_cwd("projects/alpha").await.unwrap();
        assert_eq!(s.cwd(), r"projects\alpha");
        s.set_cwd("..").await.unwrap();
        assert_eq!(s.cwd(), "projects");
        s.set_cwd(r"\Projects\\Alpha").await.unwrap();
        assert_eq!(s.cwd(), r"Projects\Alpha");

        let err = s.set_cwd(r"\Projects\notes.txt").await.unwrap_err();
        assert!(matches!(err, SmbError::NotADirectory(_)));
        // Rejected changes keep the previous directory
        assert_eq!(s.cwd(), r"Projects\Alpha");

        s.set_cwd(r"..\..").await.unwrap();
        assert_eq!(s.cwd(), "");
    }

    #[tokio::test]
    async fn test_list_contents_relative_to_cwd() {
        let server = MockServer::new();
        server.add_share("DATA", 0, None);
        server.add_dir("DATA", "Projects", None);
        server.add_dir("DATA", r"Projects\Alpha", None);
        server.add_file("DATA", r"Projects\Alpha\plan.docx", 2048, None);
        let mut s = connected(&server).await;
        s.set_share("DATA").await.unwrap();
        s.set_cwd("Projects").await.unwrap();

        let entries = s.list_contents("Alpha").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "plan.docx");
        assert_eq!(entries[0].size, 2048);
        server.with_state(|st| {
            assert_eq!(st.list_calls.last().map(String::as_str), Some(r"Projects\Alpha\*"))
        });
    }

    #[tokio::test]
    async fn test_list_contents_requires_share() {
        let server = MockServer::new();
        let mut s = connected(&server).await;
        assert!(matches!(
            s.list_contents("").await,
            Err(SmbError::ShareNotSet)
        ));
    }

    #[tokio::test]
    async fn test_close_releases_everything() {
        let server = MockServer::new();
        server.add_share("DATA", 0, None);
        let mut s = connected(&server).await;
        s.set_share("DATA").await.unwrap();

        s.close().await;
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.current_share(), None);
        server.with_state(|st| {
            assert!(st.open_trees.is_empty());
            assert!(st.bound_pipes.is_empty());
            assert_eq!(st.connections_opened, st.connections_closed);
        });

        // Second close is a no-op
        s.close().await;
        server.with_state(|st| assert_eq!(st.connections_closed, 1));
    }

    #[tokio::test]
    async fn test_ping() {
        let server = MockServer::new();
        let mut s = connected(&server).await;
        assert!(s.ping().await);

        server.with_state(|st| st.unreachable = true);
        assert!(!s.ping().await);
        assert!(!s.is_connected());
    }

    #[tokio::test]
    async fn test_resolve_sids_through_lsa() {
        let server = MockServer::new();
        server.with_state(|st| {
            st.sid_names
                .insert("S-1-5-21-1-2-3-1104".into(), "CORP\\alice".into());
        });
        let mut s = connected(&server).await;
        s.resolve_sids(["S-1-5-21-1-2-3-1104", "S-1-5-21-1-2-3-9999", "S-1-1-0"])
            .await;
        assert_eq!(s.sid_display_name("S-1-5-21-1-2-3-1104"), "CORP\\alice");
        assert_eq!(s.sid_display_name("S-1-5-21-1-2-3-9999"), "S-1-5-21-1-2-3-9999");
        assert_eq!(s.sid_display_name("S-1-1-0"), "Everyone");
        // Well-known SIDs never hit the wire
        server.with_state(|st| assert_eq!(st.lsa_lookups, vec![2]));
    }
}
