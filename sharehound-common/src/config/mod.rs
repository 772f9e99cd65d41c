mod defaults;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, Source};
use defaults::*;
use serde::Deserialize;
use tracing::*;

use crate::{Credentials, ShareHoundError};

/// Administrative shares skipped unless `include_common_shares` is set
pub const COMMON_SHARES: [&str; 4] = ["C$", "ADMIN$", "IPC$", "PRINT$"];

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "_default_smb_port")]
    pub port: u16,

    /// Budget for every single network operation
    #[serde(default = "_default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Budget for the whole dialect negotiation loop
    #[serde(default = "_default_negotiate_timeout", with = "humantime_serde")]
    pub negotiate_timeout: Duration,

    /// Budget for one host, unlimited when unset
    #[serde(default, with = "humantime_serde")]
    pub host_timeout: Option<Duration>,

    #[serde(default = "_default_max_workers")]
    pub max_workers: usize,

    /// Maximum directory depth, 0 means unlimited
    #[serde(default)]
    pub depth: usize,

    #[serde(default)]
    pub share: Option<String>,

    #[serde(default = "_default_false")]
    pub include_common_shares: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            port: _default_smb_port(),
            timeout: _default_timeout(),
            negotiate_timeout: _default_negotiate_timeout(),
            host_timeout: None,
            max_workers: _default_max_workers(),
            depth: 0,
            share: None,
            include_common_shares: false,
        }
    }
}

impl ScanConfig {
    pub fn is_share_selected(&self, name: &str) -> bool {
        if let Some(ref wanted) = self.share {
            return wanted.eq_ignore_ascii_case(name);
        }
        self.include_common_shares
            || !COMMON_SHARES.iter().any(|s| s.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShareHoundConfig {
    #[serde(default = "_default_false")]
    pub debug: bool,

    #[serde(default = "_default_false")]
    pub no_colors: bool,

    #[serde(default)]
    pub advertised_name: Option<String>,

    #[serde(default = "_default_source_kind")]
    pub source_kind: String,

    #[serde(default)]
    pub credentials: Credentials,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub targets: Vec<String>,
}

impl Default for ShareHoundConfig {
    fn default() -> Self {
        ShareHoundConfig {
            debug: false,
            no_colors: false,
            advertised_name: None,
            source_kind: _default_source_kind(),
            credentials: Default::default(),
            scan: Default::default(),
            targets: vec![],
        }
    }
}

impl ShareHoundConfig {
    pub fn validate(&self) -> Result<(), ShareHoundError> {
        if self.scan.max_workers == 0 {
            return Err(ShareHoundError::InvalidConfig(
                "scan.max_workers must be at least 1".into(),
            ));
        }
        if self.scan.timeout.is_zero() {
            return Err(ShareHoundError::InvalidConfig(
                "scan.timeout must not be zero".into(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<ShareHoundConfig> {
    let config = build_config(File::from(path))?;
    info!(
        "Using config: {path:?} (targets: {}, max workers: {})",
        config.targets.len(),
        config.scan.max_workers,
    );
    Ok(config)
}

fn build_config<S>(source: S) -> Result<ShareHoundConfig>
where
    S: Source + Send + Sync + 'static,
{
    let config: ShareHoundConfig = Config::builder()
        .add_source(source)
        .add_source(Environment::with_prefix("SHAREHOUND").separator("__"))
        .build()
        .context("Could not load config")?
        .try_deserialize()
        .context("Could not parse config")?;
    config.validate()?;
    Ok(config)
}
